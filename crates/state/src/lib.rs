/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! Shared runtime state for the bridge: the per-VM cache both protocol
//! front-ends read and write, the per-VM event/SEL store, and the task
//! registry. Built once at startup and handed to every listener.

mod events;
mod tasks;
mod vm;

use std::collections::HashMap;
use std::sync::Arc;

pub use events::{EventSeverity, EventStore, SelEntry};
pub use tasks::{Task, TaskAction, TaskMessage, TaskRegistry, TaskState, TaskStatus, TaskTimings};
use vbmc_config::Config;
pub use vm::{
    BootMode, BootOverride, BootTarget, ManagedVm, MediaDevice, MediaSlot, OverrideEnabled,
    PowerState,
};

/// Everything both listeners share. The VM map is immutable after startup;
/// all mutability lives behind per-VM locks inside [`ManagedVm`] and the
/// task registry's single lock.
#[derive(Debug)]
pub struct SharedState {
    vms: HashMap<String, Arc<ManagedVm>>,
    pub tasks: TaskRegistry,
}

impl SharedState {
    pub fn new(config: &Config) -> Self {
        let vms = config
            .vms
            .iter()
            .map(|vm| (vm.name.clone(), Arc::new(ManagedVm::new(vm.clone()))))
            .collect();
        let tasks = TaskRegistry::new();
        tasks.seed_history();
        Self { vms, tasks }
    }

    pub fn vm(&self, name: &str) -> Option<Arc<ManagedVm>> {
        self.vms.get(name).cloned()
    }

    pub fn vm_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vms.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn vms(&self) -> impl Iterator<Item = &Arc<ManagedVm>> {
        self.vms.values()
    }
}

#[cfg(test)]
mod tests {
    use vbmc_config::Config;

    use super::*;

    #[test]
    fn state_is_built_per_configured_vm() {
        let state = SharedState::new(&Config::example());
        assert_eq!(state.vm_names(), vec!["worker-1".to_string()]);
        assert!(state.vm("worker-1").is_some());
        assert!(state.vm("worker-2").is_none());
    }

    #[test]
    fn task_history_is_seeded() {
        let state = SharedState::new(&Config::example());
        let ids = state.tasks.task_ids();
        assert!(!ids.is_empty(), "first TaskService poll must not be empty");
        for id in ids {
            let task = state.tasks.get(&id).expect("seeded task must exist");
            assert_eq!(task.task_state, TaskState::Completed);
            assert_eq!(task.task_status, TaskStatus::Ok);
            assert_eq!(task.percent_complete, 100);
        }
    }
}

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

//! Redfish TaskService backing store and the driver that walks every task
//! through its simulated progress curve.
//!
//! Tasks never report failure: the orchestrator treats a failed task as a
//! hard inspection error, so an action that cannot reach vSphere still
//! completes `OK` and carries a Warning message instead.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    New,
    Starting,
    Running,
    Completed,
    Exception,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Exception | TaskState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    #[serde(rename = "OK")]
    Ok,
    Warning,
    Critical,
}

impl TaskStatus {
    pub fn as_redfish(self) -> &'static str {
        match self {
            TaskStatus::Ok => "OK",
            TaskStatus::Warning => "Warning",
            TaskStatus::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMessage {
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub task_state: TaskState,
    pub task_status: TaskStatus,
    pub percent_complete: u8,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub messages: Vec<TaskMessage>,
    /// Resource the task operates on, if any.
    pub target_uri: Option<String>,
    /// Seeded history entries are exempt from retention eviction so the
    /// task collection is never empty.
    #[serde(skip)]
    pinned: bool,
}

/// Progress-curve timing knobs. Tests shrink these to keep runtimes sane.
#[derive(Debug, Clone, Copy)]
pub struct TaskTimings {
    pub new_delay: Duration,
    pub starting_delay: Duration,
    pub tick: Duration,
    pub retention: Duration,
}

impl Default for TaskTimings {
    fn default() -> Self {
        Self {
            new_delay: Duration::from_millis(100),
            starting_delay: Duration::from_millis(400),
            tick: Duration::from_millis(500),
            retention: Duration::from_secs(3600),
        }
    }
}

/// Work performed while the task is `Running`. An `Err` message becomes a
/// Warning on the task; it never fails the task.
pub type TaskAction = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    timings: TaskTimings,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_timings(TaskTimings::default())
    }

    pub fn with_timings(timings: TaskTimings) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            timings,
        }
    }

    /// Create a task and start its driver. Returns the task id immediately;
    /// the task reaches `Completed`/`OK` after roughly `duration`.
    pub fn spawn(&self, name: &str, target_uri: Option<String>, duration: Duration) -> String {
        self.spawn_with_action(name, target_uri, duration, None)
    }

    pub fn spawn_with_action(
        &self,
        name: &str,
        target_uri: Option<String>,
        duration: Duration,
        action: Option<TaskAction>,
    ) -> String {
        let id = format!("{}", Uuid::new_v4().simple());
        let task = Task {
            id: id.clone(),
            name: name.to_string(),
            task_state: TaskState::New,
            task_status: TaskStatus::Ok,
            percent_complete: 0,
            start_time: Utc::now(),
            end_time: None,
            messages: Vec::new(),
            target_uri,
            pinned: false,
        };
        self.lock().insert(id.clone(), task);

        let registry = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            registry.drive(task_id, duration, action).await;
        });
        id
    }

    async fn drive(&self, id: String, duration: Duration, action: Option<TaskAction>) {
        let timings = self.timings;
        tokio::time::sleep(timings.new_delay).await;
        self.transition(&id, TaskState::Starting);
        tokio::time::sleep(timings.starting_delay).await;
        self.transition(&id, TaskState::Running);

        if let Some(action) = action {
            if let Err(message) = action.await {
                tracing::warn!(task = %id, "task action degraded: {message}");
                self.append_warning(&id, message);
            }
        }

        let ticks = (duration.as_millis() / timings.tick.as_millis()).max(1) as u32;
        let step = (100 / ticks).max(1) as u8;
        loop {
            tokio::time::sleep(timings.tick).await;
            if self.advance(&id, step) {
                break;
            }
        }

        tokio::time::sleep(timings.retention).await;
        let mut tasks = self.lock();
        if tasks.get(&id).is_some_and(|task| !task.pinned) {
            tasks.remove(&id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Task>> {
        self.tasks.lock().expect("BUG: task registry lock poisoned")
    }

    fn transition(&self, id: &str, state: TaskState) {
        let mut tasks = self.lock();
        if let Some(task) = tasks.get_mut(id) {
            if !task.task_state.is_terminal() {
                task.task_state = state;
            }
        }
    }

    /// Bump percent; returns true once the task reached its terminal state.
    fn advance(&self, id: &str, step: u8) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(id) else {
            return true;
        };
        if task.task_state.is_terminal() {
            return true;
        }
        task.percent_complete = task.percent_complete.saturating_add(step).min(100);
        if task.percent_complete == 100 {
            task.task_state = TaskState::Completed;
            task.end_time = Some(Utc::now());
            true
        } else {
            false
        }
    }

    fn append_warning(&self, id: &str, message: String) {
        let mut tasks = self.lock();
        if let Some(task) = tasks.get_mut(id) {
            task.messages.push(TaskMessage {
                message,
                severity: "Warning".to_string(),
            });
        }
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.lock().values().cloned().collect();
        tasks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Insert the deterministic set of already-completed historical tasks.
    /// The orchestrator's first TaskService poll must never see an empty
    /// collection.
    pub fn seed_history(&self) {
        let seeded = [
            ("0", "BIOS Update Task"),
            ("1", "RAID Configuration Task"),
        ];
        let completed_at = Utc::now();
        let mut tasks = self.lock();
        for (id, name) in seeded {
            tasks.insert(
                id.to_string(),
                Task {
                    id: id.to_string(),
                    name: name.to_string(),
                    task_state: TaskState::Completed,
                    task_status: TaskStatus::Ok,
                    percent_complete: 100,
                    start_time: completed_at,
                    end_time: Some(completed_at),
                    messages: Vec::new(),
                    target_uri: None,
                    pinned: true,
                },
            );
        }
    }
}

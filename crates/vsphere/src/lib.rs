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

//! Thin adapter over the vCenter Automation REST API.
//!
//! One logical vCenter session is shared by every listener in the process,
//! created lazily and re-established on authentication expiry or transport
//! failure. Mutating operations serialize per VM; reads go through
//! concurrently.

mod client;
pub mod model;

use async_trait::async_trait;
pub use client::VsphereClient;
pub use model::{VmDisk, VmFirmware, VmInventory, VmNic, VmPowerState};

/// Boot device in vCenter's boot-order terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    Disk,
    Cd,
    Network,
}

/// Operations the protocol front-ends need from vSphere.
///
/// The production implementation is [`VsphereClient`]; tests substitute a
/// scripted fake. All operations are idempotent with respect to observable
/// state: powering on an already-running VM and unmounting an absent ISO
/// both succeed.
#[async_trait]
pub trait VmBackend: Send + Sync {
    async fn power_on(&self, name: &str) -> Result<(), VsphereError>;
    async fn power_off(&self, name: &str, force: bool) -> Result<(), VsphereError>;
    async fn reset(&self, name: &str) -> Result<(), VsphereError>;
    async fn shutdown_guest(&self, name: &str) -> Result<(), VsphereError>;
    async fn reboot_guest(&self, name: &str) -> Result<(), VsphereError>;
    async fn get_power_state(&self, name: &str) -> Result<VmPowerState, VsphereError>;
    async fn set_boot_order(&self, name: &str, devices: &[BootDevice])
    -> Result<(), VsphereError>;
    async fn set_firmware(&self, name: &str, firmware: VmFirmware) -> Result<(), VsphereError>;
    /// Attach an ISO (`[datastore] path/image.iso`) to the VM's CD-ROM,
    /// creating an IDE CD-ROM device if the VM has none.
    async fn mount_iso(&self, name: &str, datastore_path: &str) -> Result<(), VsphereError>;
    async fn unmount_iso(&self, name: &str) -> Result<(), VsphereError>;
    async fn get_inventory(&self, name: &str) -> Result<VmInventory, VsphereError>;
    /// Drop the shared session. Called once at process shutdown.
    async fn disconnect(&self);
}

#[derive(thiserror::Error, Debug)]
pub enum VsphereError {
    /// vCenter could not be reached (or kept failing) within the retry
    /// budget. Protocol handlers translate this into their soft-success
    /// fallback; it must never surface to the orchestrator on a read path.
    #[error("vCenter unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("VM not found in vSphere inventory: {0}")]
    VmNotFound(String),
    #[error("vCenter rejected credentials")]
    AuthRejected,
    /// vCenter rejected the request itself (4xx). Power actions map the
    /// already-in-desired-state case here and treat it as success.
    #[error("vCenter rejected request: {0}")]
    InvalidRequest(String),
    #[error("Unexpected vCenter response: {0}")]
    MalformedResponse(String),
}

impl VsphereError {
    /// Whether a retry with the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VsphereError::UpstreamUnavailable(_))
    }
}

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

//! Serde models for the subset of the vCenter Automation API the bridge
//! consumes, plus the inventory snapshot handed to the protocol layers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum VmPowerState {
    #[serde(rename = "POWERED_ON")]
    PoweredOn,
    #[serde(rename = "POWERED_OFF")]
    PoweredOff,
    #[serde(rename = "SUSPENDED")]
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmFirmware {
    Bios,
    Efi,
}

impl VmFirmware {
    pub fn api_value(self) -> &'static str {
        match self {
            VmFirmware::Bios => "BIOS",
            VmFirmware::Efi => "EFI",
        }
    }
}

/// One entry from `GET /api/vcenter/vm?names=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmSummary {
    pub vm: String,
    pub name: String,
    pub power_state: VmPowerState,
}

/// The slice of `GET /api/vcenter/vm/{vm}` the bridge reads. vCenter keys
/// hardware devices by device id, hence the maps.
#[derive(Debug, Clone, Deserialize)]
pub struct VmDetail {
    #[serde(rename = "guest_OS")]
    pub guest_os: Option<String>,
    pub cpu: VmCpuInfo,
    pub memory: VmMemoryInfo,
    #[serde(default)]
    pub nics: HashMap<String, VmNicDetail>,
    #[serde(default)]
    pub disks: HashMap<String, VmDiskDetail>,
    #[serde(default)]
    pub cdroms: HashMap<String, VmCdromDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmCpuInfo {
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmMemoryInfo {
    #[serde(rename = "size_MiB")]
    pub size_mib: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmNicDetail {
    pub label: String,
    pub mac_address: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmDiskDetail {
    pub label: String,
    pub capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmCdromDetail {
    pub label: String,
    #[serde(default)]
    pub backing: Option<VmCdromBacking>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmCdromBacking {
    #[serde(rename = "type")]
    pub backing_type: String,
    #[serde(default)]
    pub iso_file: Option<String>,
}

/// One entry of `GET /api/vcenter/vm/{vm}/hardware/cdrom`.
#[derive(Debug, Clone, Deserialize)]
pub struct CdromSummary {
    pub cdrom: String,
}

/// Read-only snapshot handed to the Redfish and IPMI layers. Independent of
/// the wire model so the protocol crates never see vCenter device-id maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmInventory {
    pub cpu_count: u32,
    pub memory_mib: u64,
    pub guest_os: Option<String>,
    pub nics: Vec<VmNic>,
    pub disks: Vec<VmDisk>,
    /// ISO currently attached to the first CD-ROM device, if any.
    pub mounted_iso: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmNic {
    pub name: String,
    pub mac_address: Option<String>,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmDisk {
    pub label: String,
    pub capacity_bytes: u64,
}

impl From<VmDetail> for VmInventory {
    fn from(detail: VmDetail) -> Self {
        let mut nics: Vec<VmNic> = detail
            .nics
            .into_values()
            .map(|nic| VmNic {
                connected: nic.state.as_deref() == Some("CONNECTED"),
                name: nic.label,
                mac_address: nic.mac_address,
            })
            .collect();
        nics.sort_by(|a, b| a.name.cmp(&b.name));

        let mut disks: Vec<VmDisk> = detail
            .disks
            .into_values()
            .map(|disk| VmDisk {
                label: disk.label,
                capacity_bytes: disk.capacity.unwrap_or(0),
            })
            .collect();
        disks.sort_by(|a, b| a.label.cmp(&b.label));

        let mounted_iso = detail
            .cdroms
            .into_values()
            .filter_map(|cdrom| cdrom.backing)
            .find_map(|backing| {
                (backing.backing_type == "ISO_FILE")
                    .then_some(backing.iso_file)
                    .flatten()
            });

        Self {
            cpu_count: detail.cpu.count,
            memory_mib: detail.memory.size_mib,
            guest_os: detail.guest_os,
            nics,
            disks,
            mounted_iso,
        }
    }
}

/// Minimal-valid inventory served when vCenter has never been reachable.
/// Values are deterministic so repeated inspection runs see stable data.
impl Default for VmInventory {
    fn default() -> Self {
        Self {
            cpu_count: 2,
            memory_mib: 8192,
            guest_os: None,
            nics: vec![VmNic {
                name: "Network adapter 1".to_string(),
                mac_address: None,
                connected: false,
            }],
            disks: vec![VmDisk {
                label: "Hard disk 1".to_string(),
                capacity_bytes: 64 * 1024 * 1024 * 1024,
            }],
            mounted_iso: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn vm_detail_deserializes_and_flattens() {
        let raw = indoc! {r#"
            {
              "guest_OS": "RHEL_9_64",
              "cpu": { "count": 4, "cores_per_socket": 2 },
              "memory": { "size_MiB": 16384, "hot_add_enabled": false },
              "nics": {
                "4000": { "label": "Network adapter 1",
                          "mac_address": "00:50:56:aa:bb:cc",
                          "state": "CONNECTED" }
              },
              "disks": {
                "2000": { "label": "Hard disk 1", "capacity": 68719476736 }
              },
              "cdroms": {
                "3000": { "label": "CD/DVD drive 1",
                          "state": "CONNECTED",
                          "backing": { "type": "ISO_FILE",
                                       "iso_file": "[datastore1] isos/install.iso" } }
              }
            }
        "#};
        let detail: VmDetail = serde_json::from_str(raw).expect("detail didn't parse");
        let inventory = VmInventory::from(detail);
        assert_eq!(inventory.cpu_count, 4);
        assert_eq!(inventory.memory_mib, 16384);
        assert_eq!(inventory.guest_os.as_deref(), Some("RHEL_9_64"));
        assert_eq!(inventory.nics.len(), 1);
        assert!(inventory.nics[0].connected);
        assert_eq!(inventory.disks[0].capacity_bytes, 68719476736);
        assert_eq!(
            inventory.mounted_iso.as_deref(),
            Some("[datastore1] isos/install.iso")
        );
    }

    #[test]
    fn power_state_parses_wire_names() {
        let summary: VmSummary = serde_json::from_str(
            r#"{ "vm": "vm-42", "name": "worker-1", "power_state": "POWERED_OFF" }"#,
        )
        .expect("summary didn't parse");
        assert_eq!(summary.power_state, VmPowerState::PoweredOff);
    }

    #[test]
    fn default_inventory_is_minimal_but_valid() {
        let inventory = VmInventory::default();
        assert!(inventory.cpu_count > 0);
        assert!(!inventory.nics.is_empty());
        assert!(!inventory.disks.is_empty());
        assert!(inventory.mounted_iso.is_none());
    }
}

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

//! The IPMI command table: decode NetFn/Cmd, produce the response payload.
//!
//! A vSphere failure never surfaces as an IPMI error: the handler falls
//! back to cached state, logs, records a Warning event and reports
//! completion 0x00 with the best available payload.

use std::sync::Arc;

use vbmc_state::{
    BootMode, BootOverride, BootTarget, EventSeverity, ManagedVm, OverrideEnabled, PowerState,
};
use vbmc_vsphere::{BootDevice, VmBackend, VmPowerState};

use crate::message::IpmiRequest;

pub mod completion {
    pub const OK: u8 = 0x00;
    pub const INVALID_COMMAND: u8 = 0xC1;
    pub const REQUEST_DATA_LENGTH_INVALID: u8 = 0xC7;
    pub const RECORD_NOT_PRESENT: u8 = 0xCB;
    pub const INVALID_DATA_FIELD: u8 = 0xCC;
}

pub mod netfn {
    pub const CHASSIS: u8 = 0x00;
    pub const SENSOR: u8 = 0x04;
    pub const APP: u8 = 0x06;
    pub const STORAGE: u8 = 0x0A;
    pub const DCMI: u8 = 0x2C;
}

const DCMI_GROUP_EXTENSION: u8 = 0xDC;
const PRIV_ADMINISTRATOR: u8 = 0x04;

pub type CommandReply = (u8, Vec<u8>);

/// Commands a zero-session (pre-authentication) packet may carry. Open
/// Session and the RAKP messages travel as dedicated payload types, so the
/// only pre-session IPMI message is the authentication capability probe.
pub fn allowed_pre_session(netfn: u8, cmd: u8) -> bool {
    netfn == netfn::APP && cmd == 0x38
}

pub struct Dispatcher {
    vm: Arc<ManagedVm>,
    backend: Arc<dyn VmBackend>,
}

impl Dispatcher {
    pub fn new(vm: Arc<ManagedVm>, backend: Arc<dyn VmBackend>) -> Self {
        Self { vm, backend }
    }

    pub fn vm(&self) -> &Arc<ManagedVm> {
        &self.vm
    }

    pub async fn dispatch(&self, request: &IpmiRequest, privilege: u8) -> CommandReply {
        match (request.netfn, request.cmd) {
            (netfn::APP, 0x01) => self.get_device_id(),
            (netfn::APP, 0x38) => self.get_channel_auth_caps(request),
            (netfn::APP, 0x3B) => self.set_session_privilege(request, privilege),
            // Session teardown itself happens at the listener, which owns
            // the session table; the command just acknowledges.
            (netfn::APP, 0x3C) => (completion::OK, Vec::new()),
            (netfn::CHASSIS, 0x01) => self.get_chassis_status().await,
            (netfn::CHASSIS, 0x02) => self.chassis_control(request).await,
            (netfn::CHASSIS, 0x08) => self.set_boot_options(request).await,
            (netfn::CHASSIS, 0x09) => self.get_boot_options(request),
            (netfn::SENSOR, 0x20) => self.get_device_sdr_info(),
            (netfn::SENSOR, 0x22) => self.reserve_repository(),
            (netfn::SENSOR, 0x23) => (completion::RECORD_NOT_PRESENT, Vec::new()),
            (netfn::SENSOR, 0x2D) => self.get_sensor_reading(),
            // ipmitool reads the main SDR repository over the Storage
            // NetFn; it is as empty as the device one.
            (netfn::STORAGE, 0x20) => self.get_sdr_repository_info(),
            (netfn::STORAGE, 0x22) => self.reserve_repository(),
            (netfn::STORAGE, 0x23) => (completion::RECORD_NOT_PRESENT, Vec::new()),
            (netfn::STORAGE, 0x40) => self.get_sel_info(),
            (netfn::STORAGE, 0x42) => self.reserve_repository(),
            (netfn::STORAGE, 0x43) => self.get_sel_entry(request),
            (netfn::DCMI, 0x01) => self.get_dcmi_capabilities(request),
            _ => {
                tracing::debug!(
                    vm = %self.vm.name(),
                    "unsupported IPMI command netfn={:#04x} cmd={:#04x}",
                    request.netfn,
                    request.cmd,
                );
                (completion::INVALID_COMMAND, Vec::new())
            }
        }
    }

    /// Read power state through to vSphere, falling back to the cache when
    /// the upstream is unavailable.
    async fn current_power_state(&self) -> PowerState {
        match self.backend.get_power_state(self.vm.name()).await {
            Ok(state) => {
                let cached = match state {
                    VmPowerState::PoweredOn => PowerState::On,
                    VmPowerState::PoweredOff | VmPowerState::Suspended => PowerState::Off,
                };
                self.vm.set_power_state(cached);
                cached
            }
            Err(err) => {
                tracing::debug!(vm = %self.vm.name(), "power state read degraded: {err}");
                self.vm.power_state()
            }
        }
    }

    fn get_device_id(&self) -> CommandReply {
        let data = vec![
            0x00, // device id
            0x01, // device revision, no device SDRs
            0x02, // firmware major
            0x88, // firmware minor (BCD)
            0x02, // IPMI 2.0
            0x87, // chassis, SEL, SDR repository, sensor device
            0x00, 0x00, 0x00, // manufacturer id
            0x00, 0x00, // product id
        ];
        (completion::OK, data)
    }

    fn get_channel_auth_caps(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.len() < 2 {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        let channel = match request.data[0] & 0x0F {
            0x0E => 0x01, // "this channel"
            ch => ch,
        };
        let data = vec![
            channel,
            0x80, // IPMI 2.0 extended capabilities; no 1.5 auth types
            0x04, // user-level authentication enabled
            0x02, // channel supports IPMI 2.0 connections
            0x00, 0x00, 0x00, // OEM id
            0x00, // OEM auxiliary
        ];
        (completion::OK, data)
    }

    fn set_session_privilege(&self, request: &IpmiRequest, current: u8) -> CommandReply {
        if request.data.is_empty() {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        let requested = request.data[0] & 0x0F;
        let granted = match requested {
            0x00 => current,
            level => level.min(PRIV_ADMINISTRATOR),
        };
        (completion::OK, vec![granted])
    }

    async fn get_chassis_status(&self) -> CommandReply {
        let power = self.current_power_state().await;
        let power_byte = if power.is_on() { 0x01 } else { 0x00 };
        // current power state, last power event, misc chassis state
        (completion::OK, vec![power_byte, 0x00, 0x00])
    }

    async fn chassis_control(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.is_empty() {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        let name = self.vm.name().to_string();
        let (result, target_state, action) = match request.data[0] & 0x0F {
            0x00 => (
                self.backend.power_off(&name, true).await,
                PowerState::Off,
                "power down",
            ),
            0x01 => (
                self.backend.power_on(&name).await,
                PowerState::On,
                "power up",
            ),
            0x02 => {
                let off = self.backend.power_off(&name, true).await;
                let result = match off {
                    Ok(()) => self.backend.power_on(&name).await,
                    Err(err) => Err(err),
                };
                (result, PowerState::On, "power cycle")
            }
            0x03 => (self.backend.reset(&name).await, PowerState::On, "hard reset"),
            0x05 => (
                self.backend.shutdown_guest(&name).await,
                PowerState::Off,
                "soft shutdown",
            ),
            _ => return (completion::INVALID_DATA_FIELD, Vec::new()),
        };

        match result {
            Ok(()) => {
                self.vm.events.push(
                    EventSeverity::Ok,
                    "Chassis",
                    format!("Chassis Control: {action}"),
                );
            }
            Err(err) => {
                // Soft success: the cache tracks the intended state and the
                // orchestrator sees completion 0x00.
                tracing::warn!(vm = %name, "chassis control degraded: {err}");
                self.vm.events.push(
                    EventSeverity::Warning,
                    "Chassis",
                    format!("Chassis Control: {action} deferred, upstream unavailable"),
                );
            }
        }
        if target_state == PowerState::On {
            self.vm.note_power_on();
        } else {
            self.vm.set_power_state(target_state);
        }
        (completion::OK, Vec::new())
    }

    async fn set_boot_options(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.is_empty() {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        match request.data[0] & 0x7F {
            // Boot-info acknowledge and valid-bit clearing arrive from
            // ipmitool before the flags themselves; accept and ignore.
            0x03 | 0x04 => (completion::OK, Vec::new()),
            0x05 => self.set_boot_flags(request).await,
            _ => (completion::INVALID_DATA_FIELD, Vec::new()),
        }
    }

    async fn set_boot_flags(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.len() < 6 {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        let d1 = request.data[1];
        let selector = (request.data[2] >> 2) & 0x0F;
        let valid = d1 & 0x80 != 0;
        let persistent = d1 & 0x40 != 0;
        let uefi = d1 & 0x20 != 0;

        let target = match selector {
            0x00 => BootTarget::None,
            0x01 => BootTarget::Pxe,
            0x02 => BootTarget::Hdd,
            0x05 => BootTarget::Cd,
            0x06 => BootTarget::BiosSetup,
            0x0F => BootTarget::Floppy,
            _ => return (completion::INVALID_DATA_FIELD, Vec::new()),
        };

        let boot_override = if valid {
            BootOverride {
                target,
                enabled: if persistent {
                    OverrideEnabled::Continuous
                } else {
                    OverrideEnabled::Once
                },
                mode: if uefi { BootMode::Uefi } else { BootMode::Legacy },
            }
        } else {
            BootOverride::default()
        };
        self.vm.set_boot_override(boot_override);
        self.vm.events.push(
            EventSeverity::Ok,
            "Boot",
            format!("Boot override set to {target}"),
        );

        let name = self.vm.name().to_string();
        let order = match target {
            BootTarget::Pxe => Some([BootDevice::Network, BootDevice::Disk, BootDevice::Cd]),
            BootTarget::Hdd => Some([BootDevice::Disk, BootDevice::Cd, BootDevice::Network]),
            BootTarget::Cd => Some([BootDevice::Cd, BootDevice::Disk, BootDevice::Network]),
            _ => None,
        };
        if valid && let Some(order) = order {
            if let Err(err) = self.backend.set_boot_order(&name, &order).await {
                tracing::warn!(vm = %name, "boot order update degraded: {err}");
            }
        }

        // Booting from CD implies mounting the configured ISO.
        if valid && target == BootTarget::Cd {
            if let Some(iso) = self.vm.config.default_iso.clone() {
                match self.backend.mount_iso(&name, &iso.datastore_path()).await {
                    Ok(()) => {
                        self.vm.insert_media(
                            vbmc_state::MediaDevice::Cd,
                            iso.datastore_path(),
                            true,
                        );
                    }
                    Err(err) => {
                        tracing::warn!(vm = %name, "default ISO mount degraded: {err}");
                        self.vm.events.push(
                            EventSeverity::Warning,
                            "VirtualMedia",
                            "Default ISO mount deferred, upstream unavailable",
                        );
                    }
                }
            }
        }
        (completion::OK, Vec::new())
    }

    fn get_boot_options(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.is_empty() {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        let parameter = request.data[0] & 0x7F;
        match parameter {
            0x05 => {
                let boot_override = self.vm.boot_override();
                let mut d1 = 0u8;
                if boot_override.enabled != OverrideEnabled::Disabled {
                    d1 |= 0x80;
                }
                if boot_override.enabled == OverrideEnabled::Continuous {
                    d1 |= 0x40;
                }
                if boot_override.mode == BootMode::Uefi {
                    d1 |= 0x20;
                }
                let selector: u8 = match boot_override.target {
                    BootTarget::Pxe => 0x01,
                    BootTarget::Hdd => 0x02,
                    BootTarget::Cd => 0x05,
                    BootTarget::BiosSetup => 0x06,
                    BootTarget::Floppy => 0x0F,
                    _ => 0x00,
                };
                (
                    completion::OK,
                    vec![0x01, 0x05, d1, selector << 2, 0x00, 0x00, 0x00],
                )
            }
            parameter => (completion::OK, vec![0x01, parameter, 0x00]),
        }
    }

    fn get_device_sdr_info(&self) -> CommandReply {
        // Zero sensors, static population.
        (completion::OK, vec![0x00, 0x01])
    }

    fn get_sdr_repository_info(&self) -> CommandReply {
        let mut data = vec![0x51]; // SDR version
        data.extend_from_slice(&0u16.to_le_bytes()); // record count
        data.extend_from_slice(&0xFFFFu16.to_le_bytes()); // free space
        data.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // addition ts
        data.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // erase ts
        data.push(0x02); // reserve supported
        (completion::OK, data)
    }

    fn reserve_repository(&self) -> CommandReply {
        (completion::OK, vec![0x01, 0x00])
    }

    fn get_sensor_reading(&self) -> CommandReply {
        // Reading unavailable, scanning disabled.
        (completion::OK, vec![0x00, 0x20, 0x00, 0x00])
    }

    fn get_sel_info(&self) -> CommandReply {
        let entries = self.vm.events.snapshot();
        let count = entries.len() as u16;
        let last_add = entries
            .last()
            .map(|entry| entry.timestamp.timestamp() as u32)
            .unwrap_or(0xFFFF_FFFF);
        let mut data = vec![0x51];
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&0xFFFFu16.to_le_bytes()); // free space
        data.extend_from_slice(&last_add.to_le_bytes());
        data.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // last erase
        data.push(0x02); // reserve supported
        (completion::OK, data)
    }

    fn get_sel_entry(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.len() < 6 {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        let record_id = u16::from_le_bytes([request.data[2], request.data[3]]);
        let offset = request.data[4] as usize;
        let count = request.data[5] as usize;

        let Some((entry, next)) = self.vm.events.get_sel(record_id) else {
            return (completion::RECORD_NOT_PRESENT, Vec::new());
        };

        // System event record, 16 bytes.
        let mut record = Vec::with_capacity(16);
        record.extend_from_slice(&entry.record_id.to_le_bytes());
        record.push(0x02);
        record.extend_from_slice(&(entry.timestamp.timestamp() as u32).to_le_bytes());
        record.extend_from_slice(&0x0020u16.to_le_bytes()); // generator: BMC
        record.push(0x04); // event message revision
        record.push(0x12); // sensor type: system event
        record.push(0x01); // sensor number
        record.push(0x6F); // assertion, sensor-specific
        record.push(entry.severity.sel_event_type());
        record.push(0xFF);
        record.push(0xFF);

        if offset >= record.len() {
            return (completion::INVALID_DATA_FIELD, Vec::new());
        }
        let end = if count == 0xFF {
            record.len()
        } else {
            (offset + count).min(record.len())
        };
        let mut data = Vec::with_capacity(2 + end - offset);
        data.extend_from_slice(&next.to_le_bytes());
        data.extend_from_slice(&record[offset..end]);
        (completion::OK, data)
    }

    fn get_dcmi_capabilities(&self, request: &IpmiRequest) -> CommandReply {
        if request.data.len() < 2 {
            return (completion::REQUEST_DATA_LENGTH_INVALID, Vec::new());
        }
        if request.data[0] != DCMI_GROUP_EXTENSION {
            return (completion::INVALID_DATA_FIELD, Vec::new());
        }
        // DCMI 1.5, parameter revision 2, then the parameter body. The
        // capability bytes are synthetic but structurally valid.
        let parameter_body: &[u8] = match request.data[1] {
            0x01 => &[0x00, 0x01, 0x07], // mandatory platform capabilities
            0x02 => &[0x00, 0x00, 0x00, 0x00, 0x00],
            _ => &[0x00, 0x00, 0x00],
        };
        let mut data = vec![DCMI_GROUP_EXTENSION, 0x01, 0x05, 0x02];
        data.extend_from_slice(parameter_body);
        (completion::OK, data)
    }
}

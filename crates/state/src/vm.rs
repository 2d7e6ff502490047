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

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use vbmc_config::VmConfig;

use crate::events::EventStore;

/// Last known power state of the VM. `Unknown` only before the first
/// successful vCenter read; every external surface reports it as Off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }

    pub fn as_redfish(self) -> &'static str {
        match self {
            PowerState::On => "On",
            PowerState::Off | PowerState::Unknown => "Off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootTarget {
    None,
    Pxe,
    Cd,
    Hdd,
    Usb,
    Floppy,
    BiosSetup,
    UefiShell,
    UefiHttp,
    UefiTarget,
    Diags,
    Utilities,
}

impl BootTarget {
    pub const ALLOWABLE: [&'static str; 12] = [
        "None",
        "Pxe",
        "Floppy",
        "Cd",
        "Usb",
        "Hdd",
        "BiosSetup",
        "Utilities",
        "Diags",
        "UefiShell",
        "UefiTarget",
        "UefiHttp",
    ];
}

impl fmt::Display for BootTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for BootTarget {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(BootTarget::None),
            "Pxe" => Ok(BootTarget::Pxe),
            "Cd" => Ok(BootTarget::Cd),
            "Hdd" => Ok(BootTarget::Hdd),
            "Usb" => Ok(BootTarget::Usb),
            "Floppy" => Ok(BootTarget::Floppy),
            "BiosSetup" => Ok(BootTarget::BiosSetup),
            "UefiShell" => Ok(BootTarget::UefiShell),
            "UefiHttp" => Ok(BootTarget::UefiHttp),
            "UefiTarget" => Ok(BootTarget::UefiTarget),
            "Diags" => Ok(BootTarget::Diags),
            "Utilities" => Ok(BootTarget::Utilities),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideEnabled {
    Disabled,
    Once,
    Continuous,
}

impl fmt::Display for OverrideEnabled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for OverrideEnabled {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Disabled" => Ok(OverrideEnabled::Disabled),
            "Once" => Ok(OverrideEnabled::Once),
            "Continuous" => Ok(OverrideEnabled::Continuous),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootMode {
    #[serde(rename = "UEFI")]
    Uefi,
    Legacy,
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootMode::Uefi => write!(f, "UEFI"),
            BootMode::Legacy => write!(f, "Legacy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootOverride {
    pub target: BootTarget,
    pub enabled: OverrideEnabled,
    pub mode: BootMode,
}

impl Default for BootOverride {
    fn default() -> Self {
        Self {
            target: BootTarget::None,
            enabled: OverrideEnabled::Disabled,
            mode: BootMode::Uefi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaDevice {
    Cd,
    Floppy,
}

impl MediaDevice {
    pub fn redfish_id(self) -> &'static str {
        match self {
            MediaDevice::Cd => "CD",
            MediaDevice::Floppy => "Floppy",
        }
    }

    pub fn from_redfish_id(id: &str) -> Option<Self> {
        match id {
            "CD" => Some(MediaDevice::Cd),
            "Floppy" => Some(MediaDevice::Floppy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaSlot {
    pub image_uri: Option<String>,
    pub inserted: bool,
    pub write_protected: bool,
}

#[derive(Debug)]
struct VmCache {
    power_state: PowerState,
    boot_override: BootOverride,
    cd: MediaSlot,
    floppy: MediaSlot,
    bios_attributes: serde_json::Map<String, serde_json::Value>,
    secure_boot_enabled: bool,
    asset_tag: String,
}

/// One managed VM: its immutable configuration, the cached protocol-visible
/// state, and its event store. The cache is the source of truth for reads
/// until a vSphere operation invalidates it.
#[derive(Debug)]
pub struct ManagedVm {
    pub config: VmConfig,
    pub events: EventStore,
    cache: Mutex<VmCache>,
}

fn default_bios_attributes() -> serde_json::Map<String, serde_json::Value> {
    let attributes = serde_json::json!({
        "BootMode": "Uefi",
        "SecureBoot": "Disabled",
        "Hyperthreading": "Enabled",
        "SriovGlobalEnable": "Disabled",
        "ProcVirtualization": "Enabled",
        "BootOrderPolicy": "RetryIndefinitely",
    });
    match attributes {
        serde_json::Value::Object(map) => map,
        _ => unreachable!("attribute literal is an object"),
    }
}

impl ManagedVm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            events: EventStore::new(),
            cache: Mutex::new(VmCache {
                power_state: PowerState::Unknown,
                boot_override: BootOverride::default(),
                cd: MediaSlot::default(),
                floppy: MediaSlot::default(),
                bios_attributes: default_bios_attributes(),
                secure_boot_enabled: false,
                asset_tag: String::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VmCache> {
        self.cache.lock().expect("BUG: VM cache lock poisoned")
    }

    pub fn power_state(&self) -> PowerState {
        self.lock().power_state
    }

    pub fn set_power_state(&self, state: PowerState) {
        self.lock().power_state = state;
    }

    /// Record a power-on transition and consume a one-shot boot override if
    /// one is armed. Returns true when an override was consumed.
    pub fn note_power_on(&self) -> bool {
        let mut cache = self.lock();
        cache.power_state = PowerState::On;
        if cache.boot_override.enabled == OverrideEnabled::Once {
            cache.boot_override.enabled = OverrideEnabled::Disabled;
            true
        } else {
            false
        }
    }

    pub fn boot_override(&self) -> BootOverride {
        self.lock().boot_override
    }

    pub fn set_boot_override(&self, boot_override: BootOverride) {
        self.lock().boot_override = boot_override;
    }

    pub fn update_boot_override(&self, update: impl FnOnce(&mut BootOverride)) -> BootOverride {
        let mut cache = self.lock();
        update(&mut cache.boot_override);
        cache.boot_override
    }

    pub fn media(&self, device: MediaDevice) -> MediaSlot {
        let cache = self.lock();
        match device {
            MediaDevice::Cd => cache.cd.clone(),
            MediaDevice::Floppy => cache.floppy.clone(),
        }
    }

    pub fn insert_media(&self, device: MediaDevice, image_uri: String, write_protected: bool) {
        let mut cache = self.lock();
        let slot = match device {
            MediaDevice::Cd => &mut cache.cd,
            MediaDevice::Floppy => &mut cache.floppy,
        };
        slot.image_uri = Some(image_uri);
        slot.inserted = true;
        slot.write_protected = write_protected;
    }

    pub fn eject_media(&self, device: MediaDevice) {
        let mut cache = self.lock();
        let slot = match device {
            MediaDevice::Cd => &mut cache.cd,
            MediaDevice::Floppy => &mut cache.floppy,
        };
        *slot = MediaSlot::default();
    }

    pub fn bios_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        self.lock().bios_attributes.clone()
    }

    /// Merge a PATCHed attribute map into the cache. Unknown attributes are
    /// accepted and stored verbatim.
    pub fn merge_bios_attributes(&self, patch: &serde_json::Map<String, serde_json::Value>) {
        let mut cache = self.lock();
        for (key, value) in patch {
            cache.bios_attributes.insert(key.clone(), value.clone());
        }
    }

    pub fn reset_bios_attributes(&self) {
        self.lock().bios_attributes = default_bios_attributes();
    }

    pub fn secure_boot_enabled(&self) -> bool {
        self.lock().secure_boot_enabled
    }

    pub fn set_secure_boot_enabled(&self, enabled: bool) {
        let mut cache = self.lock();
        cache.secure_boot_enabled = enabled;
        let value = if enabled { "Enabled" } else { "Disabled" };
        cache
            .bios_attributes
            .insert("SecureBoot".to_string(), serde_json::json!(value));
    }

    pub fn asset_tag(&self) -> String {
        self.lock().asset_tag.clone()
    }

    pub fn set_asset_tag(&self, tag: String) {
        self.lock().asset_tag = tag;
    }
}

#[cfg(test)]
mod tests {
    use vbmc_config::Config;

    use super::*;

    fn vm() -> ManagedVm {
        ManagedVm::new(Config::example().vms[0].clone())
    }

    #[test]
    fn unknown_power_state_reads_as_off() {
        let vm = vm();
        assert_eq!(vm.power_state(), PowerState::Unknown);
        assert_eq!(vm.power_state().as_redfish(), "Off");
        assert!(!vm.power_state().is_on());
    }

    #[test]
    fn once_override_is_consumed_by_power_on() {
        let vm = vm();
        vm.set_boot_override(BootOverride {
            target: BootTarget::Pxe,
            enabled: OverrideEnabled::Once,
            mode: BootMode::Uefi,
        });

        assert!(vm.note_power_on());
        let after = vm.boot_override();
        assert_eq!(after.enabled, OverrideEnabled::Disabled);
        assert_eq!(after.target, BootTarget::Pxe);

        // A second power-on has nothing left to consume.
        assert!(!vm.note_power_on());
    }

    #[test]
    fn continuous_override_survives_power_on() {
        let vm = vm();
        vm.set_boot_override(BootOverride {
            target: BootTarget::Cd,
            enabled: OverrideEnabled::Continuous,
            mode: BootMode::Uefi,
        });
        assert!(!vm.note_power_on());
        assert_eq!(vm.boot_override().enabled, OverrideEnabled::Continuous);
    }

    #[test]
    fn media_insert_is_idempotent_and_eject_clears() {
        let vm = vm();
        vm.insert_media(MediaDevice::Cd, "http://repo/install.iso".to_string(), true);
        vm.insert_media(MediaDevice::Cd, "http://repo/install.iso".to_string(), true);

        let slot = vm.media(MediaDevice::Cd);
        assert!(slot.inserted);
        assert_eq!(slot.image_uri.as_deref(), Some("http://repo/install.iso"));
        // Inserted implies an image is present.
        assert!(slot.image_uri.is_some());

        vm.eject_media(MediaDevice::Cd);
        vm.eject_media(MediaDevice::Cd);
        let slot = vm.media(MediaDevice::Cd);
        assert!(!slot.inserted);
        assert!(slot.image_uri.is_none());

        // The floppy slot was never touched.
        assert_eq!(vm.media(MediaDevice::Floppy), MediaSlot::default());
    }

    #[test]
    fn bios_attribute_merge_and_reset() {
        let vm = vm();
        let patch = match serde_json::json!({"Hyperthreading": "Disabled", "CustomKnob": 3}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        vm.merge_bios_attributes(&patch);
        let attributes = vm.bios_attributes();
        assert_eq!(attributes["Hyperthreading"], "Disabled");
        assert_eq!(attributes["CustomKnob"], 3);
        assert_eq!(attributes["BootMode"], "Uefi");

        vm.reset_bios_attributes();
        let attributes = vm.bios_attributes();
        assert_eq!(attributes["Hyperthreading"], "Enabled");
        assert!(!attributes.contains_key("CustomKnob"));
    }

    #[test]
    fn secure_boot_flag_mirrors_into_attributes() {
        let vm = vm();
        vm.set_secure_boot_enabled(true);
        assert!(vm.secure_boot_enabled());
        assert_eq!(vm.bios_attributes()["SecureBoot"], "Enabled");
        vm.set_secure_boot_enabled(false);
        assert_eq!(vm.bios_attributes()["SecureBoot"], "Disabled");
    }

    #[test]
    fn boot_target_round_trips_redfish_names() {
        for name in BootTarget::ALLOWABLE {
            let target: BootTarget = name.parse().expect("allowable target must parse");
            assert_eq!(target.to_string(), name);
        }
        assert!("Cdrom".parse::<BootTarget>().is_err());
    }
}

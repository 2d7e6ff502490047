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

//! ComputerSystem resources: the single system, its reset action, boot
//! override PATCH, and the processor / memory / NIC sub-resources fed from
//! the vSphere inventory.

use std::str::FromStr;
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;
use vbmc_state::{
    BootMode, BootTarget, EventSeverity, MediaDevice, OverrideEnabled, PowerState,
};
use vbmc_vsphere::{BootDevice, VsphereError};

use crate::json::{JsonExt, JsonPatch, bad_request, no_content, no_content_with_etag, not_found};
use crate::resource::{Collection, Resource, status_ok};
use crate::state::AppState;

pub const UPSTREAM_DEFERRED_MESSAGE: &str = "Upstream unavailable; operation deferred.";

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/Systems", get(get_collection))
        .route(
            "/redfish/v1/Systems/{system_id}",
            get(get_system).patch(patch_system),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Actions/ComputerSystem.Reset",
            post(post_reset),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Processors",
            get(get_processors),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Processors/{processor_id}",
            get(get_processor),
        )
        .route("/redfish/v1/Systems/{system_id}/Memory", get(get_memory))
        .route(
            "/redfish/v1/Systems/{system_id}/Memory/{memory_id}",
            get(get_memory_module),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/EthernetInterfaces",
            get(get_ethernet_interfaces),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/EthernetInterfaces/{interface_id}",
            get(get_ethernet_interface),
        )
}

pub fn system_resource(vm_name: &str) -> Resource<'static> {
    Resource::new(
        format!("/redfish/v1/Systems/{vm_name}"),
        "#ComputerSystem.v1_13_0.ComputerSystem",
        "ComputerSystem.ComputerSystem",
        vm_name.to_string(),
        vm_name.to_string(),
    )
}

async fn get_collection(State(state): State<AppState>) -> Response {
    let members = vec![system_resource(state.vm_name()).entity_ref()];
    Collection::new(
        "/redfish/v1/Systems",
        "ComputerSystemCollection",
        "Computer System Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

async fn get_system(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let vm_name = state.vm_name().to_string();
    let power = state.current_power_state().await;
    let inventory = state.inventory().await;
    let manager_id = state.manager_id();
    let chassis_id = state.chassis_id();
    let base = format!("/redfish/v1/Systems/{vm_name}");

    system_resource(&vm_name)
        .json_patch()
        .patch(json!({
            "Description": format!("VMware Virtual Machine - {vm_name}"),
            "Status": status_ok(),
            "PowerState": power.as_redfish(),
            "BiosVersion": "VMW71.00V.16722896.B64.2008100651",
            "Manufacturer": "VMware, Inc.",
            "Model": "VMware Virtual Platform",
            "SKU": "VMware VM",
            "SerialNumber": format!("VMware-{vm_name}"),
            "AssetTag": state.vm.asset_tag(),
            "SystemType": "Virtual",
            "ProcessorSummary": {
                "Count": inventory.cpu_count,
                "Model": "Virtual CPU",
                "Status": status_ok(),
            },
            "MemorySummary": {
                "TotalSystemMemoryGiB": inventory.memory_mib / 1024,
                "Status": status_ok(),
            },
            "Boot": boot_payload(&state),
            "Actions": {
                "#ComputerSystem.Reset": {
                    "target": format!("{base}/Actions/ComputerSystem.Reset"),
                    "ResetType@Redfish.AllowableValues": [
                        "On", "ForceOff", "GracefulShutdown", "GracefulRestart",
                        "ForceRestart", "PushPowerButton", "PowerCycle",
                    ],
                },
            },
            "Processors": { "@odata.id": format!("{base}/Processors") },
            "Memory": { "@odata.id": format!("{base}/Memory") },
            "Storage": { "@odata.id": format!("{base}/Storage") },
            "EthernetInterfaces": { "@odata.id": format!("{base}/EthernetInterfaces") },
            "Bios": { "@odata.id": format!("{base}/Bios") },
            "SecureBoot": { "@odata.id": format!("{base}/SecureBoot") },
            "LogServices": {
                "@odata.id": format!("/redfish/v1/Managers/{manager_id}/LogServices"),
            },
            "Links": {
                "Chassis": [ { "@odata.id": format!("/redfish/v1/Chassis/{chassis_id}") } ],
                "ManagedBy": [ { "@odata.id": format!("/redfish/v1/Managers/{manager_id}") } ],
            },
        }))
        .into_ok_response()
}

fn boot_payload(state: &AppState) -> serde_json::Value {
    let boot = state.vm.boot_override();
    json!({
        "BootSourceOverrideEnabled": boot.enabled.to_string(),
        "BootSourceOverrideTarget": boot.target.to_string(),
        "BootSourceOverrideMode": boot.mode.to_string(),
        "BootSourceOverrideTarget@Redfish.AllowableValues": BootTarget::ALLOWABLE,
    })
}

async fn patch_system(
    State(state): State<AppState>,
    Path(system_id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }

    if let Some(tag) = patch.get("AssetTag").and_then(|v| v.as_str()) {
        state.vm.set_asset_tag(tag.to_string());
    }

    let Some(boot) = patch.get("Boot") else {
        return no_content_with_etag();
    };

    let target = match boot.get("BootSourceOverrideTarget").and_then(|v| v.as_str()) {
        Some(raw) => match BootTarget::from_str(raw) {
            Ok(target) => Some(target),
            Err(()) => return bad_request("Unsupported BootSourceOverrideTarget"),
        },
        None => None,
    };
    let enabled = match boot.get("BootSourceOverrideEnabled").and_then(|v| v.as_str()) {
        Some(raw) => match OverrideEnabled::from_str(raw) {
            Ok(enabled) => Some(enabled),
            Err(()) => return bad_request("Unsupported BootSourceOverrideEnabled"),
        },
        None => None,
    };
    let mode = match boot.get("BootSourceOverrideMode").and_then(|v| v.as_str()) {
        Some("UEFI") => Some(BootMode::Uefi),
        Some("Legacy") => Some(BootMode::Legacy),
        Some(_) => return bad_request("Unsupported BootSourceOverrideMode"),
        None => None,
    };

    let updated = state.vm.update_boot_override(|current| {
        if let Some(target) = target {
            current.target = target;
            // Setting a target arms the override unless the request
            // explicitly disables it.
            if enabled.is_none() && current.enabled == OverrideEnabled::Disabled {
                current.enabled = OverrideEnabled::Once;
            }
        }
        if let Some(enabled) = enabled {
            current.enabled = enabled;
        }
        if let Some(mode) = mode {
            current.mode = mode;
        }
    });
    state.vm.events.push(
        EventSeverity::Ok,
        "Boot",
        format!("Boot override set to {}", updated.target),
    );

    apply_boot_target_side_effects(&state, target).await;
    no_content_with_etag()
}

/// Boot-target changes ripple into vSphere: CD arms the configured ISO,
/// Hdd/None detach it, and the VM boot order follows the target. Upstream
/// failures degrade to cache-only updates.
async fn apply_boot_target_side_effects(state: &AppState, target: Option<BootTarget>) {
    let Some(target) = target else { return };
    let vm_name = state.vm_name().to_string();

    let order: Option<[BootDevice; 3]> = match target {
        BootTarget::Pxe => Some([BootDevice::Network, BootDevice::Disk, BootDevice::Cd]),
        BootTarget::Cd => Some([BootDevice::Cd, BootDevice::Disk, BootDevice::Network]),
        BootTarget::Hdd => Some([BootDevice::Disk, BootDevice::Cd, BootDevice::Network]),
        _ => None,
    };
    if let Some(order) = order {
        if let Err(err) = state.backend.set_boot_order(&vm_name, &order).await {
            tracing::warn!(vm = %vm_name, "boot order update degraded: {err}");
        }
    }

    match target {
        BootTarget::Cd => {
            if let Some(iso) = state.vm.config.default_iso.clone() {
                match state.backend.mount_iso(&vm_name, &iso.datastore_path()).await {
                    Ok(()) => {
                        state
                            .vm
                            .insert_media(MediaDevice::Cd, iso.datastore_path(), true);
                    }
                    Err(err) => {
                        tracing::warn!(vm = %vm_name, "default ISO mount degraded: {err}");
                        state.vm.events.push(
                            EventSeverity::Warning,
                            "VirtualMedia",
                            UPSTREAM_DEFERRED_MESSAGE,
                        );
                    }
                }
            }
        }
        BootTarget::Hdd | BootTarget::None => {
            if let Err(err) = state.backend.unmount_iso(&vm_name).await {
                tracing::debug!(vm = %vm_name, "ISO unmount degraded: {err}");
            }
            state.vm.eject_media(MediaDevice::Cd);
        }
        _ => {}
    }
}

async fn post_reset(
    State(state): State<AppState>,
    Path(system_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let Some(reset_type) = body.get("ResetType").and_then(|v| v.as_str()) else {
        return bad_request("ResetType is required");
    };
    let vm_name = state.vm_name().to_string();

    let (result, ends_on) = match reset_type {
        "On" => (state.backend.power_on(&vm_name).await, true),
        "ForceOff" => (state.backend.power_off(&vm_name, true).await, false),
        "GracefulShutdown" => (state.backend.shutdown_guest(&vm_name).await, false),
        "GracefulRestart" => (state.backend.reboot_guest(&vm_name).await, true),
        "ForceRestart" => (state.backend.reset(&vm_name).await, true),
        "PowerCycle" => {
            let off = state.backend.power_off(&vm_name, true).await;
            let result = match off {
                Ok(()) => state.backend.power_on(&vm_name).await,
                Err(err) => Err(err),
            };
            (result, true)
        }
        "PushPowerButton" => {
            if state.vm.power_state().is_on() {
                (state.backend.shutdown_guest(&vm_name).await, false)
            } else {
                (state.backend.power_on(&vm_name).await, true)
            }
        }
        other => {
            return bad_request(&format!("Unsupported ResetType: {other}"));
        }
    };

    if ends_on {
        state.vm.note_power_on();
    } else {
        state.vm.set_power_state(PowerState::Off);
    }

    match result {
        Ok(()) => {
            state.vm.events.push(
                EventSeverity::Ok,
                "Power",
                format!("ComputerSystem.Reset: {reset_type}"),
            );
        }
        Err(VsphereError::VmNotFound(_)) => return not_found(),
        Err(err) => {
            // The orchestrator must not see the outage: acknowledge, track
            // the intent in a task, and let the task complete OK with a
            // Warning.
            tracing::warn!(vm = %vm_name, "reset degraded: {err}");
            state.vm.events.push(
                EventSeverity::Warning,
                "Power",
                format!("ComputerSystem.Reset {reset_type} deferred"),
            );
            let target_uri = format!("/redfish/v1/Systems/{vm_name}");
            state.tasks.spawn_with_action(
                "System Reset Task",
                Some(target_uri),
                Duration::from_secs(2),
                Some(Box::pin(async { Err(UPSTREAM_DEFERRED_MESSAGE.to_string()) })),
            );
        }
    }

    state.push_event(
        "StatusChange",
        &format!("System power action {reset_type}"),
        &format!("/redfish/v1/Systems/{vm_name}"),
    );
    no_content()
}

async fn get_processors(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let inventory = state.inventory().await;
    let base = format!("/redfish/v1/Systems/{system_id}/Processors");
    let members: Vec<serde_json::Value> = (1..=inventory.cpu_count.max(1))
        .map(|index| json!({ "@odata.id": format!("{base}/CPU{index}") }))
        .collect();
    Collection::new(base, "ProcessorCollection", "Processor Collection")
        .with_members(&members)
        .into_ok_response()
}

async fn get_processor(
    State(state): State<AppState>,
    Path((system_id, processor_id)): Path<(String, String)>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let inventory = state.inventory().await;
    let valid = (1..=inventory.cpu_count.max(1)).any(|i| processor_id == format!("CPU{i}"));
    if !valid {
        return not_found();
    }
    Resource::new(
        format!("/redfish/v1/Systems/{system_id}/Processors/{processor_id}"),
        "#Processor.v1_9_0.Processor",
        "Processor.Processor",
        processor_id.clone(),
        processor_id.clone(),
    )
    .json_patch()
    .patch(json!({
        "Socket": processor_id,
        "ProcessorType": "CPU",
        "ProcessorArchitecture": "x86",
        "InstructionSet": "x86-64",
        "Manufacturer": "GenuineIntel",
        "Model": "Virtual CPU",
        "TotalCores": 1,
        "TotalThreads": 1,
        "Status": status_ok(),
    }))
    .into_ok_response()
}

async fn get_memory(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let base = format!("/redfish/v1/Systems/{system_id}/Memory");
    let members = vec![json!({ "@odata.id": format!("{base}/DIMM1") })];
    Collection::new(base, "MemoryCollection", "Memory Module Collection")
        .with_members(&members)
        .into_ok_response()
}

async fn get_memory_module(
    State(state): State<AppState>,
    Path((system_id, memory_id)): Path<(String, String)>,
) -> Response {
    if system_id != state.vm_name() || memory_id != "DIMM1" {
        return not_found();
    }
    let inventory = state.inventory().await;
    Resource::new(
        format!("/redfish/v1/Systems/{system_id}/Memory/{memory_id}"),
        "#Memory.v1_10_0.Memory",
        "Memory.Memory",
        memory_id.clone(),
        memory_id,
    )
    .json_patch()
    .patch(json!({
        "CapacityMiB": inventory.memory_mib,
        "MemoryType": "DRAM",
        "MemoryDeviceType": "DDR4",
        "Manufacturer": "VMware, Inc.",
        "Status": status_ok(),
    }))
    .into_ok_response()
}

async fn get_ethernet_interfaces(
    State(state): State<AppState>,
    Path(system_id): Path<String>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let inventory = state.inventory().await;
    let base = format!("/redfish/v1/Systems/{system_id}/EthernetInterfaces");
    let members: Vec<serde_json::Value> = (1..=inventory.nics.len().max(1))
        .map(|index| json!({ "@odata.id": format!("{base}/{index}") }))
        .collect();
    Collection::new(
        base,
        "EthernetInterfaceCollection",
        "Ethernet Interface Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

async fn get_ethernet_interface(
    State(state): State<AppState>,
    Path((system_id, interface_id)): Path<(String, String)>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let inventory = state.inventory().await;
    let Ok(index) = interface_id.parse::<usize>() else {
        return not_found();
    };
    let Some(nic) = index.checked_sub(1).and_then(|i| inventory.nics.get(i)) else {
        return not_found();
    };
    Resource::new(
        format!("/redfish/v1/Systems/{system_id}/EthernetInterfaces/{interface_id}"),
        "#EthernetInterface.v1_6_0.EthernetInterface",
        "EthernetInterface.EthernetInterface",
        interface_id.clone(),
        nic.name.clone(),
    )
    .json_patch()
    .patch(json!({
        "Description": "Virtual Network Interface",
        "MACAddress": nic.mac_address,
        "PermanentMACAddress": nic.mac_address,
        "LinkStatus": if nic.connected { "LinkUp" } else { "LinkDown" },
        "InterfaceEnabled": nic.connected,
        "SpeedMbps": 10000,
        "Status": status_ok(),
    }))
    .into_ok_response()
}

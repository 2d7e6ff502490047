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

//! UpdateService with a fixed firmware inventory and simulated updates.
//! Firmware is never really flashed: an update is a task that runs its
//! progress curve and completes OK.

use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;
use vbmc_state::EventSeverity;

use crate::json::{JsonExt, JsonPatch, accepted_with_task, not_found};
use crate::managers::BMC_FIRMWARE_VERSION;
use crate::resource::{Collection, Resource, status_ok, status_ok_rollup};
use crate::state::AppState;

const UPDATE_TASK_DURATION: Duration = Duration::from_secs(10);

/// The fixed firmware component set plus the versions they report.
const FIRMWARE_COMPONENTS: [(&str, &str, &str); 7] = [
    ("BIOS", "P89 v1.66", "System BIOS"),
    ("BMC", BMC_FIRMWARE_VERSION, "Baseboard Management Controller"),
    ("NIC.Slot.1", "18.8.9", "Network Interface Controller"),
    ("Storage", "51.14.0-3900", "Storage Controller Firmware"),
    ("CPU", "0x2F", "CPU Microcode"),
    ("PSU", "1.00", "Power Supply Firmware"),
    ("PCIe", "4.11", "PCIe Riser Firmware"),
];

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/UpdateService", get(get_update_service))
        .route(
            "/redfish/v1/UpdateService/FirmwareInventory",
            get(get_firmware_inventory),
        )
        .route(
            "/redfish/v1/UpdateService/FirmwareInventory/{component_id}",
            get(get_firmware_component),
        )
        .route(
            "/redfish/v1/UpdateService/FirmwareInventory/{component_id}/UpdateStatus",
            get(get_update_status),
        )
        .route(
            "/redfish/v1/UpdateService/SoftwareInventory",
            get(get_software_inventory),
        )
        .route(
            "/redfish/v1/UpdateService/SoftwareInventory/{component_id}",
            get(get_software_component),
        )
        .route(
            "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
            post(post_simple_update),
        )
        .route(
            "/redfish/v1/UpdateService/Actions/UpdateService.StartUpdate",
            post(post_start_update),
        )
}

async fn get_update_service() -> Response {
    Resource::new(
        "/redfish/v1/UpdateService",
        "#UpdateService.v1_5_0.UpdateService",
        "UpdateService.UpdateService",
        "UpdateService",
        "Update Service",
    )
    .json_patch()
    .patch(json!({
        "Description": "Service for updating firmware and software components",
        "Status": status_ok_rollup(),
        "ServiceEnabled": true,
        "HttpPushUri": "/redfish/v1/UpdateService/update",
        "HttpPushUriTargets": [],
        "HttpPushUriTargetsBusy": false,
        "FirmwareInventory": { "@odata.id": "/redfish/v1/UpdateService/FirmwareInventory" },
        "SoftwareInventory": { "@odata.id": "/redfish/v1/UpdateService/SoftwareInventory" },
        "Actions": {
            "#UpdateService.SimpleUpdate": {
                "target": "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
                "TransferProtocol@Redfish.AllowableValues": ["HTTP", "HTTPS", "FTP", "TFTP"],
            },
            "#UpdateService.StartUpdate": {
                "target": "/redfish/v1/UpdateService/Actions/UpdateService.StartUpdate",
            },
        },
    }))
    .into_ok_response()
}

async fn get_firmware_inventory() -> Response {
    let members: Vec<serde_json::Value> = FIRMWARE_COMPONENTS
        .iter()
        .map(|(id, _, _)| {
            json!({ "@odata.id": format!("/redfish/v1/UpdateService/FirmwareInventory/{id}") })
        })
        .collect();
    Collection::new(
        "/redfish/v1/UpdateService/FirmwareInventory",
        "SoftwareInventoryCollection",
        "Firmware Inventory Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

fn find_component(component_id: &str) -> Option<(&'static str, &'static str, &'static str)> {
    FIRMWARE_COMPONENTS
        .iter()
        .find(|(id, _, _)| *id == component_id)
        .copied()
}

async fn get_firmware_component(Path(component_id): Path<String>) -> Response {
    let Some((id, version, description)) = find_component(&component_id) else {
        return not_found();
    };
    Resource::new(
        format!("/redfish/v1/UpdateService/FirmwareInventory/{id}"),
        "#SoftwareInventory.v1_2_0.SoftwareInventory",
        "SoftwareInventory.SoftwareInventory",
        id,
        description,
    )
    .json_patch()
    .patch(json!({
        "Description": description,
        "Version": version,
        "Manufacturer": "VMware, Inc.",
        "ReleaseDate": "2024-01-15T00:00:00Z",
        "SoftwareId": format!("vmware-{}", id.to_lowercase()),
        "Updateable": true,
        "Status": status_ok(),
    }))
    .into_ok_response()
}

async fn get_update_status(Path(component_id): Path<String>) -> Response {
    if find_component(&component_id).is_none() {
        return not_found();
    }
    json!({
        "@odata.id": format!(
            "/redfish/v1/UpdateService/FirmwareInventory/{component_id}/UpdateStatus"
        ),
        "ComponentId": component_id,
        "UpdateStatus": "Ready",
        "InProgress": false,
    })
    .into_ok_response()
}

async fn get_software_inventory() -> Response {
    Collection::new(
        "/redfish/v1/UpdateService/SoftwareInventory",
        "SoftwareInventoryCollection",
        "Software Inventory Collection",
    )
    .with_members(&[])
    .into_ok_response()
}

// The software inventory has no members, so every member URL is unknown.
async fn get_software_component(Path(_component_id): Path<String>) -> Response {
    not_found()
}

async fn post_simple_update(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let image = body
        .get("ImageURI")
        .and_then(|v| v.as_str())
        .unwrap_or("<unspecified>");
    tracing::info!(vm = %state.vm_name(), image, "simulated firmware update requested");
    state.vm.events.push(
        EventSeverity::Ok,
        "UpdateService",
        format!("Firmware update started from {image}"),
    );
    let task_id = state.tasks.spawn(
        "Firmware Update Task",
        Some("/redfish/v1/UpdateService".to_string()),
        UPDATE_TASK_DURATION,
    );
    accepted_with_task(&task_id)
}

async fn post_start_update(State(state): State<AppState>) -> Response {
    tracing::info!(vm = %state.vm_name(), "simulated staged firmware update started");
    let task_id = state.tasks.spawn(
        "Firmware Update Task",
        Some("/redfish/v1/UpdateService".to_string()),
        UPDATE_TASK_DURATION,
    );
    accepted_with_task(&task_id)
}

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

//! Storage tree: one synthetic controller, drives from the inventory, and
//! simulated RAID volumes whose creation/deletion runs through tasks.

use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::get;
use serde_json::json;
use vbmc_state::EventSeverity;

use crate::json::{JsonExt, JsonPatch, accepted_with_task, not_found};
use crate::resource::{Collection, Resource, status_ok};
use crate::state::{AppState, Volume};

const STORAGE_ID: &str = "1";
/// Simulated RAID work takes 8-12 s; the driver settles at 10.
const VOLUME_TASK_DURATION: Duration = Duration::from_secs(10);
/// Collection updates land just after the task's progress curve finishes.
const VOLUME_APPLY_DELAY: Duration = Duration::from_secs(11);

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/Systems/{system_id}/Storage", get(get_collection))
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}",
            get(get_storage),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Drives/{drive_id}",
            get(get_drive),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Volumes",
            get(get_volumes).post(post_volume),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Volumes/{volume_id}",
            get(get_volume).delete(delete_volume),
        )
}

fn storage_base(system_id: &str) -> String {
    format!("/redfish/v1/Systems/{system_id}/Storage")
}

async fn get_collection(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let base = storage_base(&system_id);
    let members = vec![json!({ "@odata.id": format!("{base}/{STORAGE_ID}") })];
    Collection::new(base, "StorageCollection", "Storage Collection")
        .with_members(&members)
        .into_ok_response()
}

async fn get_storage(
    State(state): State<AppState>,
    Path((system_id, storage_id)): Path<(String, String)>,
) -> Response {
    if system_id != state.vm_name() || storage_id != STORAGE_ID {
        return not_found();
    }
    let inventory = state.inventory().await;
    let base = format!("{}/{storage_id}", storage_base(&system_id));
    let drives: Vec<serde_json::Value> = (1..=inventory.disks.len().max(1))
        .map(|index| json!({ "@odata.id": format!("{base}/Drives/{index}") }))
        .collect();

    Resource::new(
        base.clone(),
        "#Storage.v1_9_0.Storage",
        "Storage.Storage",
        storage_id.clone(),
        "Virtual Storage Controller",
    )
    .json_patch()
    .patch(json!({
        "Status": status_ok(),
        "StorageControllers": [{
            "@odata.id": format!("{base}#/StorageControllers/0"),
            "MemberId": "0",
            "Name": "VMware Virtual SCSI Controller",
            "Manufacturer": "VMware, Inc.",
            "Model": "PVSCSI",
            "FirmwareVersion": "1.0.4.0",
            "SupportedRAIDTypes": ["RAID0", "RAID1"],
            "Status": status_ok(),
        }],
        "Drives@odata.count": drives.len(),
        "Drives": drives,
        "Volumes": { "@odata.id": format!("{base}/Volumes") },
    }))
    .into_ok_response()
}

async fn get_drive(
    State(state): State<AppState>,
    Path((system_id, storage_id, drive_id)): Path<(String, String, String)>,
) -> Response {
    if system_id != state.vm_name() || storage_id != STORAGE_ID {
        return not_found();
    }
    let inventory = state.inventory().await;
    let Ok(index) = drive_id.parse::<usize>() else {
        return not_found();
    };
    let Some(disk) = index.checked_sub(1).and_then(|i| inventory.disks.get(i)) else {
        return not_found();
    };
    Resource::new(
        format!("{}/{storage_id}/Drives/{drive_id}", storage_base(&system_id)),
        "#Drive.v1_12_0.Drive",
        "Drive.Drive",
        drive_id.clone(),
        disk.label.clone(),
    )
    .json_patch()
    .patch(json!({
        "CapacityBytes": disk.capacity_bytes,
        "MediaType": "SSD",
        "Protocol": "SAS",
        "Manufacturer": "VMware, Inc.",
        "Model": "Virtual disk",
        "SerialNumber": format!("VMWARE-{system_id}-{drive_id}"),
        "Status": status_ok(),
    }))
    .into_ok_response()
}

fn volume_payload(system_id: &str, volume: &Volume) -> serde_json::Value {
    Resource::new(
        format!(
            "{}/{STORAGE_ID}/Volumes/{}",
            storage_base(system_id),
            volume.id
        ),
        "#Volume.v1_6_2.Volume",
        "Volume.Volume",
        volume.id.clone(),
        volume.name.clone(),
    )
    .json_patch()
    .patch(json!({
        "RAIDType": volume.raid_type,
        "CapacityBytes": volume.capacity_bytes,
        "Encrypted": false,
        "Status": status_ok(),
    }))
}

async fn get_volumes(
    State(state): State<AppState>,
    Path((system_id, storage_id)): Path<(String, String)>,
) -> Response {
    if system_id != state.vm_name() || storage_id != STORAGE_ID {
        return not_found();
    }
    let base = format!("{}/{storage_id}/Volumes", storage_base(&system_id));
    let members: Vec<serde_json::Value> = state
        .volumes
        .all()
        .iter()
        .map(|volume| json!({ "@odata.id": format!("{base}/{}", volume.id) }))
        .collect();
    Collection::new(base, "VolumeCollection", "Volume Collection")
        .with_members(&members)
        .into_ok_response()
}

async fn get_volume(
    State(state): State<AppState>,
    Path((system_id, storage_id, volume_id)): Path<(String, String, String)>,
) -> Response {
    if system_id != state.vm_name() || storage_id != STORAGE_ID {
        return not_found();
    }
    match state.volumes.get(&volume_id) {
        Some(volume) => volume_payload(&system_id, &volume).into_ok_response(),
        None => not_found(),
    }
}

async fn post_volume(
    State(state): State<AppState>,
    Path((system_id, storage_id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if system_id != state.vm_name() || storage_id != STORAGE_ID {
        return not_found();
    }
    let raid_type = body
        .get("RAIDType")
        .and_then(|v| v.as_str())
        .unwrap_or("RAID1")
        .to_string();
    let capacity_bytes = body
        .get("CapacityBytes")
        .and_then(|v| v.as_u64())
        .unwrap_or(40 * 1024 * 1024 * 1024);
    let volume_id = format!("volume-{}", uuid::Uuid::new_v4().simple());
    let name = body
        .get("Name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Volume {volume_id}"));

    let task_id = state.tasks.spawn(
        "Volume Creation Task",
        Some(format!(
            "{}/{storage_id}/Volumes/{volume_id}",
            storage_base(&system_id)
        )),
        VOLUME_TASK_DURATION,
    );

    // The volume joins the collection once the task has completed.
    let volumes = state.volumes.clone();
    let vm = state.vm.clone();
    let pending = Volume {
        id: volume_id,
        name,
        raid_type,
        capacity_bytes,
    };
    tokio::spawn(async move {
        tokio::time::sleep(VOLUME_APPLY_DELAY).await;
        vm.events.push(
            EventSeverity::Ok,
            "Storage",
            format!("RAID volume {} created", pending.id),
        );
        volumes.insert(pending);
    });

    accepted_with_task(&task_id)
}

async fn delete_volume(
    State(state): State<AppState>,
    Path((system_id, storage_id, volume_id)): Path<(String, String, String)>,
) -> Response {
    if system_id != state.vm_name() || storage_id != STORAGE_ID {
        return not_found();
    }
    if state.volumes.get(&volume_id).is_none() {
        return not_found();
    }

    let task_id = state.tasks.spawn(
        "Volume Deletion Task",
        Some(format!(
            "{}/{storage_id}/Volumes/{volume_id}",
            storage_base(&system_id)
        )),
        VOLUME_TASK_DURATION,
    );

    let volumes = state.volumes.clone();
    let vm = state.vm.clone();
    tokio::spawn(async move {
        tokio::time::sleep(VOLUME_APPLY_DELAY).await;
        if volumes.remove(&volume_id) {
            vm.events.push(
                EventSeverity::Ok,
                "Storage",
                format!("RAID volume {volume_id} deleted"),
            );
        }
    });

    accepted_with_task(&task_id)
}

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

//! Manager log services: the Redfish event log and the SEL view, both
//! backed by the per-VM event store.

use axum::Router;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;
use vbmc_state::{EventSeverity, SelEntry};

use crate::json::{JsonExt, JsonPatch, no_content, not_found};
use crate::resource::{Collection, Resource, status_ok};
use crate::state::AppState;

const LOG_SERVICES: [&str; 2] = ["EventLog", "SEL"];

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route(
        "/redfish/v1/Managers/{manager_id}/LogServices",
        get(get_collection),
    )
    .route(
        "/redfish/v1/Managers/{manager_id}/LogServices/{service_id}",
        get(get_service),
    )
    .route(
        "/redfish/v1/Managers/{manager_id}/LogServices/{service_id}/Entries",
        get(get_entries),
    )
    .route(
        "/redfish/v1/Managers/{manager_id}/LogServices/{service_id}/Entries/{entry_id}",
        get(get_entry),
    )
    .route(
        "/redfish/v1/Managers/{manager_id}/LogServices/{service_id}/Actions/LogService.ClearLog",
        post(post_clear_log),
    )
}

fn service_base(manager_id: &str, service_id: &str) -> String {
    format!("/redfish/v1/Managers/{manager_id}/LogServices/{service_id}")
}

fn known_service(service_id: &str) -> bool {
    LOG_SERVICES.contains(&service_id)
}

async fn get_collection(State(state): State<AppState>, Path(manager_id): Path<String>) -> Response {
    if manager_id != state.manager_id() {
        return not_found();
    }
    let members: Vec<serde_json::Value> = LOG_SERVICES
        .iter()
        .map(|id| json!({ "@odata.id": service_base(&manager_id, id) }))
        .collect();
    Collection::new(
        format!("/redfish/v1/Managers/{manager_id}/LogServices"),
        "LogServiceCollection",
        "Log Service Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

async fn get_service(
    State(state): State<AppState>,
    Path((manager_id, service_id)): Path<(String, String)>,
) -> Response {
    if manager_id != state.manager_id() || !known_service(&service_id) {
        return not_found();
    }
    let base = service_base(&manager_id, &service_id);
    let name = match service_id.as_str() {
        "SEL" => "System Event Log",
        _ => "Event Log Service",
    };
    Resource::new(
        base.clone(),
        "#LogService.v1_1_0.LogService",
        "LogService.LogService",
        service_id.clone(),
        name,
    )
    .json_patch()
    .patch(json!({
        "OverWritePolicy": "WrapsWhenFull",
        "ServiceEnabled": true,
        "MaxNumberOfRecords": 512,
        "DateTime": chrono::Utc::now().to_rfc3339(),
        "Status": status_ok(),
        "Entries": { "@odata.id": format!("{base}/Entries") },
        "Actions": {
            "#LogService.ClearLog": {
                "target": format!("{base}/Actions/LogService.ClearLog"),
            },
        },
    }))
    .into_ok_response()
}

fn entry_payload(base: &str, service_id: &str, entry: &SelEntry) -> serde_json::Value {
    let severity = match entry.severity {
        EventSeverity::Ok => "OK",
        EventSeverity::Warning => "Warning",
        EventSeverity::Critical => "Critical",
    };
    Resource::new(
        format!("{base}/Entries/{}", entry.record_id),
        "#LogEntry.v1_4_0.LogEntry",
        "LogEntry.LogEntry",
        entry.record_id.to_string(),
        format!("Log Entry {}", entry.record_id),
    )
    .json_patch()
    .patch(json!({
        "EntryType": if service_id == "SEL" { "SEL" } else { "Event" },
        "Severity": severity,
        "Created": entry.timestamp.to_rfc3339(),
        "SensorType": entry.source,
        "Message": entry.message,
        "MessageId": format!("Alert.1.0.{}", entry.source),
    }))
}

async fn get_entries(
    State(state): State<AppState>,
    Path((manager_id, service_id)): Path<(String, String)>,
) -> Response {
    if manager_id != state.manager_id() || !known_service(&service_id) {
        return not_found();
    }
    let base = service_base(&manager_id, &service_id);
    let entries = state.vm.events.snapshot();
    let members: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| entry_payload(&base, &service_id, entry))
        .collect();
    Collection::new(
        format!("{base}/Entries"),
        "LogEntryCollection",
        "Log Entry Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

async fn get_entry(
    State(state): State<AppState>,
    Path((manager_id, service_id, entry_id)): Path<(String, String, String)>,
) -> Response {
    if manager_id != state.manager_id() || !known_service(&service_id) {
        return not_found();
    }
    let Ok(record_id) = entry_id.parse::<u16>() else {
        return not_found();
    };
    let Some(entry) = state.vm.events.get(record_id) else {
        return not_found();
    };
    let base = service_base(&manager_id, &service_id);
    entry_payload(&base, &service_id, &entry).into_ok_response()
}

async fn post_clear_log(
    State(state): State<AppState>,
    Path((manager_id, service_id)): Path<(String, String)>,
) -> Response {
    if manager_id != state.manager_id() || !known_service(&service_id) {
        return not_found();
    }
    state.vm.events.clear();
    tracing::info!(vm = %state.vm_name(), service = %service_id, "log cleared");
    no_content()
}

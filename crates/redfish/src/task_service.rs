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

//! TaskService views over the shared task registry.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use serde_json::json;
use vbmc_state::{Task, TaskState};

use crate::json::{JsonExt, JsonPatch, not_found};
use crate::resource::{Collection, Resource, status_ok_rollup};
use crate::state::AppState;

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/TaskService", get(get_task_service))
        .route("/redfish/v1/TaskService/Tasks", get(get_tasks))
        .route("/redfish/v1/TaskService/Tasks/{task_id}", get(get_task))
        .route(
            "/redfish/v1/TaskService/Tasks/{task_id}/Monitor",
            get(get_task_monitor),
        )
}

async fn get_task_service() -> Response {
    Resource::new(
        "/redfish/v1/TaskService",
        "#TaskService.v1_1_3.TaskService",
        "TaskService.TaskService",
        "TaskService",
        "Task Service",
    )
    .json_patch()
    .patch(json!({
        "Description": "Task Service for long-running operations",
        "Status": status_ok_rollup(),
        "ServiceEnabled": true,
        "DateTime": chrono::Utc::now().to_rfc3339(),
        "CompletedTaskOverWritePolicy": "Oldest",
        "LifeCycleEventOnTaskStateChange": true,
        "Tasks": { "@odata.id": "/redfish/v1/TaskService/Tasks" },
    }))
    .into_ok_response()
}

async fn get_tasks(State(state): State<AppState>) -> Response {
    let members: Vec<serde_json::Value> = state
        .tasks
        .task_ids()
        .iter()
        .map(|id| json!({ "@odata.id": format!("/redfish/v1/TaskService/Tasks/{id}") }))
        .collect();
    Collection::new(
        "/redfish/v1/TaskService/Tasks",
        "TaskCollection",
        "Task Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

pub fn task_payload(task: &Task) -> serde_json::Value {
    let state_name = match task.task_state {
        TaskState::New => "New",
        TaskState::Starting => "Starting",
        TaskState::Running => "Running",
        TaskState::Completed => "Completed",
        TaskState::Exception => "Exception",
        TaskState::Cancelled => "Cancelled",
    };
    let messages: Vec<serde_json::Value> = task
        .messages
        .iter()
        .map(|m| {
            json!({
                "@odata.type": "#Message.v1_1_2.Message",
                "Message": m.message,
                "Severity": m.severity,
                "Resolution": "None",
            })
        })
        .collect();
    let mut payload = Resource::new(
        format!("/redfish/v1/TaskService/Tasks/{}", task.id),
        "#Task.v1_4_3.Task",
        "Task.Task",
        task.id.clone(),
        task.name.clone(),
    )
    .json_patch()
    .patch(json!({
        "TaskState": state_name,
        "TaskStatus": task.task_status.as_redfish(),
        "PercentComplete": task.percent_complete,
        "StartTime": task.start_time.to_rfc3339(),
        "TaskMonitor": format!("/redfish/v1/TaskService/Tasks/{}/Monitor", task.id),
        "Messages": messages,
        "HidePayload": true,
    }));
    if let Some(end_time) = task.end_time {
        payload = payload.patch(json!({ "EndTime": end_time.to_rfc3339() }));
    }
    if let Some(target) = &task.target_uri {
        payload = payload.patch(json!({
            "Payload": {
                "TargetUri": target,
                "HttpOperation": "POST",
            },
        }));
    }
    payload
}

async fn get_task(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.tasks.get(&task_id) {
        Some(task) => task_payload(&task).into_ok_response(),
        None => not_found(),
    }
}

/// Task monitor: 202 with a Location while the task runs, the final task
/// payload once it is terminal.
async fn get_task_monitor(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    let Some(task) = state.tasks.get(&task_id) else {
        return not_found();
    };
    if task.task_state.is_terminal() {
        task_payload(&task).into_ok_response()
    } else {
        let mut response = task_payload(&task).into_response(StatusCode::ACCEPTED);
        let location = format!("/redfish/v1/TaskService/Tasks/{task_id}/Monitor");
        response.headers_mut().insert(
            header::LOCATION,
            HeaderValue::from_str(&location).expect("BUG: task id is URL-safe"),
        );
        response
    }
}

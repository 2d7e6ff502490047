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

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde_json::json;

use crate::auth::check_credentials;
use crate::json::{JsonExt, JsonPatch, no_content, not_found, redfish_error};
use crate::resource::{Collection, Resource, status_ok};
use crate::state::AppState;

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/SessionService", get(get_session_service))
        .route(
            "/redfish/v1/SessionService/Sessions",
            get(get_sessions).post(post_session),
        )
        .route(
            "/redfish/v1/SessionService/Sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
}

fn sessions_collection() -> Collection<'static> {
    Collection::new(
        "/redfish/v1/SessionService/Sessions",
        "SessionCollection",
        "Session Collection",
    )
}

fn session_resource(session_id: &str) -> Resource<'static> {
    Resource::new(
        format!("/redfish/v1/SessionService/Sessions/{session_id}"),
        "#Session.v1_0_0.Session",
        "Session.Session",
        session_id.to_string(),
        "User Session",
    )
}

async fn get_session_service() -> Response {
    Resource::new(
        "/redfish/v1/SessionService",
        "#SessionService.v1_1_7.SessionService",
        "SessionService.SessionService",
        "SessionService",
        "Session Service",
    )
    .json_patch()
    .patch(json!({
        "Status": status_ok(),
        "ServiceEnabled": true,
        "SessionTimeout": 1800,
        "Sessions": { "@odata.id": "/redfish/v1/SessionService/Sessions" },
    }))
    .into_ok_response()
}

async fn get_sessions(State(state): State<AppState>) -> Response {
    let members: Vec<serde_json::Value> = state
        .sessions
        .ids()
        .iter()
        .map(|id| session_resource(id).entity_ref())
        .collect();
    sessions_collection().with_members(&members).into_ok_response()
}

#[derive(Deserialize)]
struct SessionRequest {
    #[serde(rename = "UserName")]
    username: String,
    #[serde(rename = "Password")]
    password: String,
}

async fn post_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Response {
    if !check_credentials(&state, &request.username, &request.password) {
        tracing::info!(vm = %state.vm_name(), user = %request.username, "session create rejected");
        return redfish_error("Base.1.8.NoValidSession", "Invalid username or password")
            .into_response(StatusCode::UNAUTHORIZED);
    }

    let token = state.sessions.create(&request.username);
    let location = format!("/redfish/v1/SessionService/Sessions/{token}");
    let mut response = session_resource(&token)
        .json_patch()
        .patch(json!({
            "UserName": request.username,
            "Password": null,
        }))
        .into_created_response(
            HeaderValue::from_str(&location).expect("BUG: token is URL-safe"),
        );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-auth-token"),
        HeaderValue::from_str(&token).expect("BUG: token is header-safe"),
    );
    response
}

async fn get_session(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.sessions.username(&session_id) {
        Some(username) => session_resource(&session_id)
            .json_patch()
            .patch(json!({ "UserName": username, "Password": null }))
            .into_ok_response(),
        None => not_found(),
    }
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if state.sessions.delete(&session_id) {
        no_content()
    } else {
        not_found()
    }
}

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
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;

use crate::json::{JsonExt, JsonPatch, no_content, not_found};
use crate::resource::Resource;
use crate::state::AppState;

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route(
        "/redfish/v1/Systems/{system_id}/SecureBoot",
        get(get_secure_boot).patch(patch_secure_boot),
    )
    .route(
        "/redfish/v1/Systems/{system_id}/SecureBoot/Actions/SecureBoot.ResetKeys",
        post(post_reset_keys),
    )
}

async fn get_secure_boot(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let enabled = state.vm.secure_boot_enabled();
    Resource::new(
        format!("/redfish/v1/Systems/{system_id}/SecureBoot"),
        "#SecureBoot.v1_1_0.SecureBoot",
        "SecureBoot.SecureBoot",
        "SecureBoot",
        "UEFI Secure Boot",
    )
    .json_patch()
    .patch(json!({
        "SecureBootEnable": enabled,
        "SecureBootMode": "UserMode",
        "SecureBootCurrentBoot": if enabled { "Enabled" } else { "Disabled" },
        "Actions": {
            "#SecureBoot.ResetKeys": {
                "target": format!(
                    "/redfish/v1/Systems/{system_id}/SecureBoot/Actions/SecureBoot.ResetKeys"
                ),
                "ResetKeysType@Redfish.AllowableValues": [
                    "ResetAllKeysToDefault", "DeleteAllKeys",
                ],
            },
        },
    }))
    .into_ok_response()
}

async fn patch_secure_boot(
    State(state): State<AppState>,
    Path(system_id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    if let Some(enable) = patch.get("SecureBootEnable").and_then(|v| v.as_bool()) {
        state.vm.set_secure_boot_enabled(enable);
    }
    no_content()
}

async fn post_reset_keys(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    // Key databases are not modeled; resetting them is a no-op.
    no_content()
}

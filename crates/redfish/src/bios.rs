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
use vbmc_vsphere::VmFirmware;

use crate::json::{JsonExt, JsonPatch, no_content, not_found};
use crate::resource::{Resource, status_ok};
use crate::state::AppState;

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route(
        "/redfish/v1/Systems/{system_id}/Bios",
        get(get_bios).patch(patch_bios),
    )
    .route(
        "/redfish/v1/Systems/{system_id}/Bios/Actions/Bios.ResetBios",
        post(post_reset_bios),
    )
}

async fn get_bios(State(state): State<AppState>, Path(system_id): Path<String>) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    Resource::new(
        format!("/redfish/v1/Systems/{system_id}/Bios"),
        "#Bios.v1_1_0.Bios",
        "Bios.Bios",
        "Bios",
        "BIOS Configuration Current Settings",
    )
    .json_patch()
    .patch(json!({
        "AttributeRegistry": "BiosAttributeRegistry.v1_0_0",
        "Status": status_ok(),
        "Attributes": state.vm.bios_attributes(),
        "Actions": {
            "#Bios.ResetBios": {
                "target": format!(
                    "/redfish/v1/Systems/{system_id}/Bios/Actions/Bios.ResetBios"
                ),
            },
        },
    }))
    .into_ok_response()
}

async fn patch_bios(
    State(state): State<AppState>,
    Path(system_id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    let Some(serde_json::Value::Object(attributes)) = patch.get("Attributes") else {
        return no_content();
    };
    state.vm.merge_bios_attributes(attributes);

    // A BootMode change flips the VM's firmware type upstream; the cache
    // keeps the requested value either way.
    if let Some(mode) = attributes.get("BootMode").and_then(|v| v.as_str()) {
        let firmware = match mode {
            "Bios" | "LegacyBios" => Some(VmFirmware::Bios),
            "Uefi" => Some(VmFirmware::Efi),
            _ => None,
        };
        if let Some(firmware) = firmware {
            if let Err(err) = state.backend.set_firmware(state.vm_name(), firmware).await {
                tracing::warn!(vm = %state.vm_name(), "firmware mode change degraded: {err}");
            }
        }
    }
    no_content()
}

async fn post_reset_bios(
    State(state): State<AppState>,
    Path(system_id): Path<String>,
) -> Response {
    if system_id != state.vm_name() {
        return not_found();
    }
    state.vm.reset_bios_attributes();
    no_content()
}

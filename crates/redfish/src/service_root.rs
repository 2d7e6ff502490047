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
use axum::response::Response;
use axum::routing::get;
use serde_json::json;

use crate::json::{JsonExt, JsonPatch};
use crate::resource::{Collection, Resource};
use crate::state::AppState;

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1", get(get_service_root))
        .route("/redfish/v1/", get(get_service_root))
}

async fn get_service_root() -> Response {
    let systems = Collection::new("/redfish/v1/Systems", "ComputerSystemCollection", "Systems");
    let chassis = Collection::new("/redfish/v1/Chassis", "ChassisCollection", "Chassis");
    let managers = Collection::new("/redfish/v1/Managers", "ManagerCollection", "Managers");
    Resource::new(
        "/redfish/v1/",
        "#ServiceRoot.v1_5_0.ServiceRoot",
        "ServiceRoot.ServiceRoot",
        "RootService",
        "Redfish Service",
    )
    .json_patch()
    .patch(systems.nav_property("Systems"))
    .patch(chassis.nav_property("Chassis"))
    .patch(managers.nav_property("Managers"))
    .patch(json!({
        "RedfishVersion": "1.6.0",
        "UUID": "92384634-2938-2342-8820-489239905423",
        "SessionService": { "@odata.id": "/redfish/v1/SessionService" },
        "UpdateService": { "@odata.id": "/redfish/v1/UpdateService" },
        "TaskService": { "@odata.id": "/redfish/v1/TaskService" },
        "EventService": { "@odata.id": "/redfish/v1/EventService" },
        "Links": {
            "Sessions": { "@odata.id": "/redfish/v1/SessionService/Sessions" },
        },
    }))
    .into_ok_response()
}

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

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;

pub const ODATA_VERSION: &str = "4.0";

pub trait JsonExt {
    fn patch(self, patch: impl JsonPatch) -> serde_json::Value
    where
        Self: Sized;

    fn into_response(self, status: StatusCode) -> Response<Body>
    where
        Self: Sized + ToString;

    fn into_ok_response(self) -> Response<Body>
    where
        Self: Sized + ToString,
    {
        self.into_response(StatusCode::OK)
    }

    fn into_created_response(self, location: HeaderValue) -> Response<Body>
    where
        Self: Sized + ToString,
    {
        let mut response = self.into_response(StatusCode::CREATED);
        response.headers_mut().insert(header::LOCATION, location);
        response
    }
}

impl JsonExt for serde_json::Value {
    fn patch(mut self, patch: impl JsonPatch) -> serde_json::Value {
        json_patch(&mut self, patch.json_patch());
        self
    }

    fn into_response(self, status: StatusCode) -> Response<Body> {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .header("OData-Version", ODATA_VERSION)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(self.to_string()))
            .expect("BUG: static response headers are valid")
    }
}

pub trait JsonPatch {
    fn json_patch(&self) -> serde_json::Value;
}

impl JsonPatch for serde_json::Value {
    fn json_patch(&self) -> serde_json::Value {
        self.clone()
    }
}

pub fn json_patch(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target_obj), serde_json::Value::Object(patch_obj)) => {
            for (k, v_patch) in patch_obj {
                match target_obj.get_mut(&k) {
                    Some(v_target) => json_patch(v_target, v_patch),
                    None => {
                        target_obj.insert(k, v_patch);
                    }
                }
            }
        }
        (target_slot, v_patch) => *target_slot = v_patch,
    }
}

/// 204 with an opaque entity tag, for PATCHes of mutable resources.
pub fn no_content_with_etag() -> Response<Body> {
    let etag = format!("W/\"{}\"", uuid::Uuid::new_v4().simple());
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ETAG, etag)
        .body(Body::empty())
        .expect("BUG: static response headers are valid")
}

pub fn no_content() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .expect("BUG: empty response must build")
}

pub fn not_found() -> Response<Body> {
    redfish_error("Base.1.8.ResourceMissingAtURI", "Resource not found")
        .into_response(StatusCode::NOT_FOUND)
}

pub fn bad_request(message: &str) -> Response<Body> {
    redfish_error("Base.1.8.MalformedJSON", message).into_response(StatusCode::BAD_REQUEST)
}

pub fn accepted_with_task(task_id: &str) -> Response<Body> {
    let location = format!("/redfish/v1/TaskService/Tasks/{task_id}");
    let mut response = serde_json::json!({
        "@odata.id": location,
        "@odata.type": "#Task.v1_4_3.Task",
        "Id": task_id,
        "TaskState": "New",
        "TaskStatus": "OK",
    })
    .into_response(StatusCode::ACCEPTED);
    response.headers_mut().insert(
        header::LOCATION,
        HeaderValue::from_str(&location).expect("BUG: task id is URL-safe"),
    );
    response
}

pub fn redfish_error(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_merges_nested_objects() {
        let merged = json!({"Boot": {"BootSourceOverrideTarget": "None", "Keep": 1}})
            .patch(json!({"Boot": {"BootSourceOverrideTarget": "Pxe"}, "PowerState": "On"}));
        assert_eq!(merged["Boot"]["BootSourceOverrideTarget"], "Pxe");
        assert_eq!(merged["Boot"]["Keep"], 1);
        assert_eq!(merged["PowerState"], "On");
    }

    #[test]
    fn responses_carry_odata_version() {
        let response = json!({"Id": "x"}).into_ok_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("OData-Version").unwrap(),
            ODATA_VERSION
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn accepted_response_points_at_the_task() {
        let response = accepted_with_task("abc123");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/redfish/v1/TaskService/Tasks/abc123"
        );
    }

    #[test]
    fn patch_etag_is_present() {
        let response = no_content_with_etag();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key(header::ETAG));
    }
}

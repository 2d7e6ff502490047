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

//! Request authentication: HTTP Basic against the VM's configured
//! credentials, or an `X-Auth-Token` minted by the session service.

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;

use crate::json::{JsonExt, redfish_error};
use crate::state::AppState;

/// Paths an unauthenticated client may always read. Session creation is
/// also public: that is how a client obtains a token.
fn is_public(method: &Method, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    match path {
        "/redfish/v1" | "/redfish/v1/Systems" | "/redfish/v1/Managers" | "/redfish/v1/Chassis"
        | "/redfish/v1/SessionService" => *method == Method::GET,
        "/redfish/v1/SessionService/Sessions" => *method == Method::POST,
        _ => false,
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    if let Some(token) = request
        .headers()
        .get("X-Auth-Token")
        .and_then(|value| value.to_str().ok())
    {
        if state.sessions.validate(token) {
            return next.run(request).await;
        }
    }

    if let Some(header_value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if check_basic(&state, header_value) {
            return next.run(request).await;
        }
    }

    tracing::debug!(path = request.uri().path(), "rejecting unauthenticated request");
    unauthorized()
}

pub fn check_basic(state: &AppState, header_value: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = decoded.split_once(':') else {
        return false;
    };
    let config = &state.vm.config;
    username == config.redfish_user && password == config.redfish_password
}

pub fn check_credentials(state: &AppState, username: &str, password: &str) -> bool {
    let config = &state.vm.config;
    username == config.redfish_user && password == config.redfish_password
}

fn unauthorized() -> Response {
    let mut response = redfish_error(
        "Base.1.8.NoValidSession",
        "Authentication required: provide HTTP Basic credentials or X-Auth-Token",
    )
    .into_response(StatusCode::UNAUTHORIZED);
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Basic realm=\"Redfish\""),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_allow_list_is_read_only() {
        assert!(is_public(&Method::GET, "/redfish/v1/"));
        assert!(is_public(&Method::GET, "/redfish/v1"));
        assert!(is_public(&Method::GET, "/redfish/v1/Systems"));
        assert!(is_public(&Method::GET, "/redfish/v1/Managers"));
        assert!(is_public(&Method::GET, "/redfish/v1/Chassis"));
        assert!(is_public(&Method::GET, "/redfish/v1/SessionService"));
        assert!(is_public(&Method::POST, "/redfish/v1/SessionService/Sessions"));

        assert!(!is_public(&Method::GET, "/redfish/v1/Systems/worker-1"));
        assert!(!is_public(&Method::POST, "/redfish/v1/Systems"));
        assert!(!is_public(&Method::GET, "/redfish/v1/UpdateService"));
        assert!(!is_public(&Method::GET, "/redfish/v1/SessionService/Sessions"));
        assert!(!is_public(&Method::GET, "/redfish/v1/TaskService"));
    }
}

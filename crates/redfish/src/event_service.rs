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

//! EventService: subscription management and best-effort push delivery.
//! Delivery is at-most-once with no backpressure; a slow subscriber just
//! loses events.

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;

use crate::json::{JsonExt, JsonPatch, bad_request, no_content, not_found};
use crate::resource::{Collection, Resource, status_ok_rollup};
use crate::state::AppState;

const EVENT_TYPES: [&str; 5] = [
    "StatusChange",
    "ResourceUpdated",
    "ResourceAdded",
    "ResourceRemoved",
    "Alert",
];

pub fn add_routes(r: Router<AppState>) -> Router<AppState> {
    r.route("/redfish/v1/EventService", get(get_event_service))
        .route(
            "/redfish/v1/EventService/Subscriptions",
            get(get_subscriptions).post(post_subscription),
        )
        .route(
            "/redfish/v1/EventService/Subscriptions/{subscription_id}",
            get(get_subscription).delete(delete_subscription),
        )
        .route(
            "/redfish/v1/EventService/Actions/EventService.SubmitTestEvent",
            post(post_test_event),
        )
}

async fn get_event_service() -> Response {
    Resource::new(
        "/redfish/v1/EventService",
        "#EventService.v1_3_0.EventService",
        "EventService.EventService",
        "EventService",
        "Event Service",
    )
    .json_patch()
    .patch(json!({
        "Description": "Event subscription and delivery service",
        "Status": status_ok_rollup(),
        "ServiceEnabled": true,
        "DeliveryRetryAttempts": 3,
        "DeliveryRetryIntervalSeconds": 60,
        "EventTypesForSubscription": EVENT_TYPES,
        "Subscriptions": { "@odata.id": "/redfish/v1/EventService/Subscriptions" },
        "Actions": {
            "#EventService.SubmitTestEvent": {
                "target": "/redfish/v1/EventService/Actions/EventService.SubmitTestEvent",
                "EventType@Redfish.AllowableValues": EVENT_TYPES,
            },
        },
    }))
    .into_ok_response()
}

fn subscription_resource(subscription_id: &str) -> Resource<'static> {
    Resource::new(
        format!("/redfish/v1/EventService/Subscriptions/{subscription_id}"),
        "#EventDestination.v1_6_0.EventDestination",
        "EventDestination.EventDestination",
        subscription_id.to_string(),
        "Event Subscription",
    )
}

async fn get_subscriptions(State(state): State<AppState>) -> Response {
    let members: Vec<serde_json::Value> = state
        .subscriptions
        .ids()
        .iter()
        .map(|id| subscription_resource(id).entity_ref())
        .collect();
    Collection::new(
        "/redfish/v1/EventService/Subscriptions",
        "EventDestinationCollection",
        "Event Subscriptions Collection",
    )
    .with_members(&members)
    .into_ok_response()
}

async fn post_subscription(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let Some(destination) = body.get("Destination").and_then(|v| v.as_str()) else {
        return bad_request("Destination is required");
    };
    if !destination.starts_with("http://") && !destination.starts_with("https://") {
        return bad_request("Destination must be an HTTP or HTTPS URL");
    }
    let event_types: Vec<String> = body
        .get("EventTypes")
        .and_then(|v| v.as_array())
        .map(|types| {
            types
                .iter()
                .filter_map(|t| t.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let context = body
        .get("Context")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let id = state
        .subscriptions
        .create(destination.to_string(), event_types.clone(), context.clone());
    tracing::info!(vm = %state.vm_name(), destination, "event subscription created");

    let location = format!("/redfish/v1/EventService/Subscriptions/{id}");
    subscription_resource(&id)
        .json_patch()
        .patch(json!({
            "Destination": destination,
            "EventTypes": event_types,
            "Context": context,
            "Protocol": "Redfish",
        }))
        .into_created_response(
            HeaderValue::from_str(&location).expect("BUG: subscription id is URL-safe"),
        )
}

async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Response {
    let Some(subscription) = state.subscriptions.get(&subscription_id) else {
        return not_found();
    };
    subscription_resource(&subscription_id)
        .json_patch()
        .patch(json!({
            "Destination": subscription.destination,
            "EventTypes": subscription.event_types,
            "Context": subscription.context,
            "Protocol": "Redfish",
        }))
        .into_ok_response()
}

async fn delete_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Response {
    if state.subscriptions.delete(&subscription_id) {
        no_content()
    } else {
        not_found()
    }
}

async fn post_test_event(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let event_type = body
        .get("EventType")
        .and_then(|v| v.as_str())
        .unwrap_or("Alert");
    if !EVENT_TYPES.contains(&event_type) {
        return bad_request(&format!("Unsupported EventType: {event_type}"));
    }
    let message = body
        .get("Message")
        .and_then(|v| v.as_str())
        .unwrap_or("Test event");
    state.push_event(
        event_type,
        message,
        &format!("/redfish/v1/Systems/{}", state.vm_name()),
    );
    no_content()
}

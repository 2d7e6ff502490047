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

//! Exercises the client against a minimal in-process mock of the vCenter
//! Automation API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use serde_json::json;
use vbmc_vsphere::{BootDevice, VmBackend, VmPowerState, VsphereClient, VsphereError};

#[derive(Default)]
struct MockVcenter {
    login_count: AtomicU32,
    power_actions: AtomicU32,
}

async fn create_session(State(state): State<Arc<MockVcenter>>) -> impl IntoResponse {
    state.login_count.fetch_add(1, Ordering::SeqCst);
    (StatusCode::CREATED, axum::Json(json!("mock-session-token")))
}

async fn list_vms() -> impl IntoResponse {
    axum::Json(json!([
        { "vm": "vm-42", "name": "worker-1", "power_state": "POWERED_OFF",
          "cpu_count": 2, "memory_size_MiB": 8192 }
    ]))
}

async fn get_power() -> impl IntoResponse {
    axum::Json(json!({ "state": "POWERED_OFF" }))
}

async fn power_action(State(state): State<Arc<MockVcenter>>) -> impl IntoResponse {
    state.power_actions.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn get_vm_detail() -> impl IntoResponse {
    axum::Json(json!({
        "guest_OS": "RHEL_9_64",
        "cpu": { "count": 2 },
        "memory": { "size_MiB": 8192 },
        "nics": { "4000": { "label": "Network adapter 1",
                            "mac_address": "00:50:56:01:02:03",
                            "state": "CONNECTED" } },
        "disks": { "2000": { "label": "Hard disk 1", "capacity": 10737418240u64 } },
        "cdroms": {}
    }))
}

async fn set_boot_devices() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn spawn_mock() -> eyre::Result<(SocketAddr, Arc<MockVcenter>)> {
    let state = Arc::new(MockVcenter::default());
    let app = Router::new()
        .route("/api/session", post(create_session))
        .route("/api/vcenter/vm", get(list_vms))
        .route("/api/vcenter/vm/vm-42", get(get_vm_detail))
        .route("/api/vcenter/vm/vm-42/power", get(get_power).post(power_action))
        .route("/api/vcenter/vm/vm-42/hardware/boot/device", put(set_boot_devices))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, state))
}

fn client_for(addr: SocketAddr) -> VsphereClient {
    VsphereClient::with_base_url(format!("http://{addr}"), "admin", "secret", true)
        .expect("client construction should not fail")
}

#[tokio::test]
async fn resolves_vm_and_reads_power_state() -> eyre::Result<()> {
    let (addr, mock) = spawn_mock().await?;
    let client = client_for(addr);

    let state = client.get_power_state("worker-1").await?;
    assert_eq!(state, VmPowerState::PoweredOff);
    // One login serves all subsequent requests.
    assert_eq!(mock.login_count.load(Ordering::SeqCst), 1);

    let state = client.get_power_state("worker-1").await?;
    assert_eq!(state, VmPowerState::PoweredOff);
    assert_eq!(mock.login_count.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_vm_is_not_found_not_transient() -> eyre::Result<()> {
    let (addr, _mock) = spawn_mock().await?;
    let client = client_for(addr);

    let err = client
        .get_power_state("no-such-vm")
        .await
        .expect_err("lookup should fail");
    assert!(matches!(err, VsphereError::VmNotFound(name) if name == "no-such-vm"));
    Ok(())
}

#[tokio::test]
async fn power_on_posts_action() -> eyre::Result<()> {
    let (addr, mock) = spawn_mock().await?;
    let client = client_for(addr);

    client.power_on("worker-1").await?;
    assert_eq!(mock.power_actions.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn inventory_snapshot_is_flattened() -> eyre::Result<()> {
    let (addr, _mock) = spawn_mock().await?;
    let client = client_for(addr);

    let inventory = client.get_inventory("worker-1").await?;
    assert_eq!(inventory.cpu_count, 2);
    assert_eq!(inventory.memory_mib, 8192);
    assert_eq!(inventory.nics.len(), 1);
    assert_eq!(
        inventory.nics[0].mac_address.as_deref(),
        Some("00:50:56:01:02:03")
    );
    assert!(inventory.mounted_iso.is_none());
    Ok(())
}

#[tokio::test]
async fn boot_order_mutation_succeeds() -> eyre::Result<()> {
    let (addr, _mock) = spawn_mock().await?;
    let client = client_for(addr);

    client
        .set_boot_order("worker-1", &[BootDevice::Cd, BootDevice::Disk, BootDevice::Network])
        .await?;
    Ok(())
}

#[tokio::test]
async fn unreachable_vcenter_reports_upstream_unavailable() {
    // Port 9 on localhost; nothing listens there.
    let client = VsphereClient::with_base_url(
        "http://127.0.0.1:9".to_string(),
        "admin",
        "secret",
        true,
    )
    .expect("client construction should not fail");

    let err = client
        .get_power_state("worker-1")
        .await
        .expect_err("request should fail");
    assert!(err.is_transient(), "expected transient error, got {err:?}");
}

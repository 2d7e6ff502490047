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

//! Drives the Redfish service over real TLS with reqwest, including the
//! no-failure contract under a scripted vSphere outage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vbmc_config::{Config, SslConfig};
use vbmc_redfish::{AppState, RedfishServer, server_config};
use vbmc_state::{ManagedVm, TaskRegistry, TaskTimings};
use vbmc_vsphere::{
    BootDevice, VmBackend, VmFirmware, VmInventory, VmPowerState, VsphereError,
};

struct FakeBackend {
    power: std::sync::Mutex<VmPowerState>,
    available: AtomicBool,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            power: std::sync::Mutex::new(VmPowerState::PoweredOff),
            available: AtomicBool::new(true),
        })
    }

    fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), VsphereError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VsphereError::UpstreamUnavailable("scripted outage".into()))
        }
    }

    fn set(&self, state: VmPowerState) -> Result<(), VsphereError> {
        self.check()?;
        *self.power.lock().unwrap() = state;
        Ok(())
    }
}

#[async_trait]
impl VmBackend for FakeBackend {
    async fn power_on(&self, _name: &str) -> Result<(), VsphereError> {
        self.set(VmPowerState::PoweredOn)
    }
    async fn power_off(&self, _name: &str, _force: bool) -> Result<(), VsphereError> {
        self.set(VmPowerState::PoweredOff)
    }
    async fn reset(&self, _name: &str) -> Result<(), VsphereError> {
        self.set(VmPowerState::PoweredOn)
    }
    async fn shutdown_guest(&self, _name: &str) -> Result<(), VsphereError> {
        self.set(VmPowerState::PoweredOff)
    }
    async fn reboot_guest(&self, _name: &str) -> Result<(), VsphereError> {
        self.set(VmPowerState::PoweredOn)
    }
    async fn get_power_state(&self, _name: &str) -> Result<VmPowerState, VsphereError> {
        self.check()?;
        Ok(*self.power.lock().unwrap())
    }
    async fn set_boot_order(&self, _n: &str, _d: &[BootDevice]) -> Result<(), VsphereError> {
        self.check()
    }
    async fn set_firmware(&self, _n: &str, _f: VmFirmware) -> Result<(), VsphereError> {
        self.check()
    }
    async fn mount_iso(&self, _n: &str, _p: &str) -> Result<(), VsphereError> {
        self.check()
    }
    async fn unmount_iso(&self, _n: &str) -> Result<(), VsphereError> {
        self.check()
    }
    async fn get_inventory(&self, _n: &str) -> Result<VmInventory, VsphereError> {
        self.check()?;
        Ok(VmInventory::default())
    }
    async fn disconnect(&self) {}
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    backend: Arc<FakeBackend>,
}

async fn spawn_server() -> eyre::Result<TestServer> {
    let vm_config = Config::example().vms[0].clone();
    let vm = Arc::new(ManagedVm::new(vm_config));
    let backend = FakeBackend::new();
    let tasks = TaskRegistry::with_timings(TaskTimings {
        new_delay: Duration::from_millis(5),
        starting_delay: Duration::from_millis(5),
        tick: Duration::from_millis(5),
        retention: Duration::from_secs(3600),
    });
    tasks.seed_history();
    let state = AppState::new(vm, backend.clone(), tasks);

    let tls = server_config(&SslConfig::default())?;
    let handle = RedfishServer::spawn(state, 0, tls).await?;
    let base = format!("https://127.0.0.1:{}", handle.local_addr.port());
    std::mem::forget(handle);

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5))
        .build()?;
    // TLS accept loop needs a moment on some machines.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(TestServer {
        base,
        client,
        backend,
    })
}

impl TestServer {
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base))
            .basic_auth("admin", Some("password"))
    }

    async fn get_json(&self, path: &str) -> eyre::Result<serde_json::Value> {
        let response = self.get(path).send().await?;
        eyre::ensure!(
            response.status().is_success(),
            "GET {path} returned {}",
            response.status()
        );
        Ok(response.json().await?)
    }

    fn post(&self, path: &str, body: serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base))
            .basic_auth("admin", Some("password"))
            .json(&body)
    }

    fn patch(&self, path: &str, body: serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .patch(format!("{}{path}", self.base))
            .basic_auth("admin", Some("password"))
            .json(&body)
    }
}

#[tokio::test]
async fn public_paths_do_not_require_auth() -> eyre::Result<()> {
    let server = spawn_server().await?;
    for path in [
        "/redfish/v1/",
        "/redfish/v1/Systems",
        "/redfish/v1/Managers",
        "/redfish/v1/Chassis",
        "/redfish/v1/SessionService",
    ] {
        let response = server
            .client
            .get(format!("{}{path}", server.base))
            .send()
            .await?;
        assert_eq!(response.status(), 200, "{path} should be public");
    }
    Ok(())
}

#[tokio::test]
async fn authenticated_paths_reject_anonymous_and_accept_basic() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let path = format!("{}/redfish/v1/Systems/worker-1", server.base);

    let response = server.client.get(&path).send().await?;
    assert_eq!(response.status(), 401);
    assert!(response.headers().contains_key("www-authenticate"));

    let response = server
        .client
        .get(&path)
        .basic_auth("admin", Some("password"))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = server
        .client
        .get(&path)
        .basic_auth("admin", Some("wrong"))
        .send()
        .await?;
    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn session_tokens_work_and_expire_on_delete() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let response = server
        .client
        .post(format!("{}/redfish/v1/SessionService/Sessions", server.base))
        .json(&serde_json::json!({"UserName": "admin", "Password": "password"}))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let token = response
        .headers()
        .get("x-auth-token")
        .expect("X-Auth-Token header")
        .to_str()?
        .to_string();
    let location = response
        .headers()
        .get("location")
        .expect("Location header")
        .to_str()?
        .to_string();

    let response = server
        .client
        .get(format!("{}/redfish/v1/Systems/worker-1", server.base))
        .header("X-Auth-Token", &token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = server
        .client
        .delete(format!("{}{location}", server.base))
        .basic_auth("admin", Some("password"))
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    let response = server
        .client
        .get(format!("{}/redfish/v1/Systems/worker-1", server.base))
        .header("X-Auth-Token", &token)
        .send()
        .await?;
    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn power_round_trip_via_reset_action() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["PowerState"], "Off");
    assert_eq!(system["Status"]["Health"], "OK");

    let response = server
        .post(
            "/redfish/v1/Systems/worker-1/Actions/ComputerSystem.Reset",
            serde_json::json!({"ResetType": "On"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 204);
    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["PowerState"], "On");

    let response = server
        .post(
            "/redfish/v1/Systems/worker-1/Actions/ComputerSystem.Reset",
            serde_json::json!({"ResetType": "ForceOff"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 204);
    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["PowerState"], "Off");

    let response = server
        .post(
            "/redfish/v1/Systems/worker-1/Actions/ComputerSystem.Reset",
            serde_json::json!({"ResetType": "SelfDestruct"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test]
async fn boot_override_persists_and_is_consumed_by_power_on() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let response = server
        .patch(
            "/redfish/v1/Systems/worker-1",
            serde_json::json!({
                "Boot": {
                    "BootSourceOverrideTarget": "Pxe",
                    "BootSourceOverrideEnabled": "Once",
                }
            }),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 204);
    assert!(response.headers().contains_key("etag"));

    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["Boot"]["BootSourceOverrideTarget"], "Pxe");
    assert_eq!(system["Boot"]["BootSourceOverrideEnabled"], "Once");

    let response = server
        .post(
            "/redfish/v1/Systems/worker-1/Actions/ComputerSystem.Reset",
            serde_json::json!({"ResetType": "ForceRestart"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["Boot"]["BootSourceOverrideEnabled"], "Disabled");
    assert_eq!(system["Boot"]["BootSourceOverrideTarget"], "Pxe");

    let response = server
        .patch(
            "/redfish/v1/Systems/worker-1",
            serde_json::json!({"Boot": {"BootSourceOverrideTarget": "FloppyDisk"}}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test]
async fn virtual_media_insert_is_idempotent() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let media_path = "/redfish/v1/Managers/worker-1-BMC/VirtualMedia/CD";
    let insert = serde_json::json!({"Image": "http://repo/install.iso", "Inserted": true});

    for _ in 0..2 {
        let response = server
            .post(
                &format!("{media_path}/Actions/VirtualMedia.InsertMedia"),
                insert.clone(),
            )
            .send()
            .await?;
        assert_eq!(response.status(), 204);
    }
    let media = server.get_json(media_path).await?;
    assert_eq!(media["Inserted"], true);
    assert_eq!(media["Image"], "http://repo/install.iso");
    assert_eq!(media["ImageName"], "install.iso");

    for _ in 0..2 {
        let response = server
            .post(
                &format!("{media_path}/Actions/VirtualMedia.EjectMedia"),
                serde_json::json!({}),
            )
            .send()
            .await?;
        assert_eq!(response.status(), 204);
    }
    let media = server.get_json(media_path).await?;
    assert_eq!(media["Inserted"], false);
    assert_eq!(media["Image"], serde_json::Value::Null);
    Ok(())
}

#[tokio::test]
async fn firmware_update_task_completes_ok_with_monotonic_progress() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let response = server
        .post(
            "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
            serde_json::json!({"ImageURI": "http://repo/fw.bin", "TransferProtocol": "HTTPS"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 202);
    let location = response
        .headers()
        .get("location")
        .expect("Location header")
        .to_str()?
        .to_string();

    let mut last_percent = 0i64;
    for _ in 0..600 {
        let task = server.get_json(&location).await?;
        let percent = task["PercentComplete"].as_i64().unwrap_or(0);
        assert!(percent >= last_percent, "progress must be monotonic");
        last_percent = percent;
        let state = task["TaskState"].as_str().unwrap_or("");
        assert_ne!(state, "Exception", "tasks never fail");
        if state == "Completed" {
            assert_eq!(task["TaskStatus"], "OK");
            assert_eq!(percent, 100);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    eyre::bail!("task never completed");
}

#[tokio::test]
async fn polled_read_paths_never_fail_even_during_outage() -> eyre::Result<()> {
    let server = spawn_server().await?;
    // Populate the power cache, then cut the backend.
    server.get_json("/redfish/v1/Systems/worker-1").await?;
    server.backend.set_available(false);

    for path in [
        "/redfish/v1/Systems/worker-1",
        "/redfish/v1/Systems/worker-1/Storage",
        "/redfish/v1/Systems/worker-1/Storage/1",
        "/redfish/v1/Systems/worker-1/Bios",
        "/redfish/v1/Systems/worker-1/SecureBoot",
        "/redfish/v1/Systems/worker-1/Processors",
        "/redfish/v1/Systems/worker-1/Memory",
        "/redfish/v1/Systems/worker-1/EthernetInterfaces",
        "/redfish/v1/Managers/worker-1-BMC",
        "/redfish/v1/Managers/worker-1-BMC/VirtualMedia/CD",
        "/redfish/v1/Managers/worker-1-BMC/LogServices/SEL/Entries",
        "/redfish/v1/Chassis/worker-1-Chassis",
        "/redfish/v1/Chassis/worker-1-Chassis/Power",
        "/redfish/v1/Chassis/worker-1-Chassis/Thermal",
        "/redfish/v1/UpdateService",
        "/redfish/v1/UpdateService/FirmwareInventory",
        "/redfish/v1/UpdateService/FirmwareInventory/BIOS",
        "/redfish/v1/TaskService",
        "/redfish/v1/TaskService/Tasks",
        "/redfish/v1/EventService",
    ] {
        let response = server.get(path).send().await?;
        assert!(
            response.status().is_success(),
            "{path} returned {} during outage",
            response.status()
        );
    }

    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["Status"]["Health"], "OK");
    assert_eq!(system["PowerState"], "Off", "cached value survives outage");
    Ok(())
}

#[tokio::test]
async fn reset_during_outage_returns_204_and_a_warning_task() -> eyre::Result<()> {
    let server = spawn_server().await?;
    server.backend.set_available(false);

    let response = server
        .post(
            "/redfish/v1/Systems/worker-1/Actions/ComputerSystem.Reset",
            serde_json::json!({"ResetType": "On"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    // The intent is visible immediately from the cache.
    let system = server.get_json("/redfish/v1/Systems/worker-1").await?;
    assert_eq!(system["PowerState"], "On");

    // A deferred-operation task exists and ends Completed/OK with the
    // warning message attached.
    for _ in 0..600 {
        let tasks = server.get_json("/redfish/v1/TaskService/Tasks").await?;
        let members = tasks["Members"].as_array().cloned().unwrap_or_default();
        for member in &members {
            let Some(task_path) = member["@odata.id"].as_str() else {
                continue;
            };
            let task = server.get_json(task_path).await?;
            if task["Name"] != "System Reset Task" {
                continue;
            }
            if task["TaskState"] == "Completed" {
                assert_eq!(task["TaskStatus"], "OK");
                let messages = task["Messages"].as_array().cloned().unwrap_or_default();
                assert!(
                    messages.iter().any(|m| {
                        m["Severity"] == "Warning"
                            && m["Message"]
                                .as_str()
                                .is_some_and(|s| s.contains("Upstream unavailable"))
                    }),
                    "expected a Warning message, got {messages:?}"
                );
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    eyre::bail!("deferred reset task never completed");
}

#[tokio::test]
async fn unknown_resources_return_404_and_wrong_methods_405() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let response = server.get("/redfish/v1/Systems/no-such-vm").send().await?;
    assert_eq!(response.status(), 404);

    let response = server
        .get("/redfish/v1/UpdateService/FirmwareInventory/NoSuchComponent")
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    // The software inventory is empty, so its members are unknown too.
    let inventory = server
        .get_json("/redfish/v1/UpdateService/SoftwareInventory")
        .await?;
    assert_eq!(inventory["Members@odata.count"], 0);
    let response = server
        .get("/redfish/v1/UpdateService/SoftwareInventory/AnyComponent")
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    let response = server
        .client
        .delete(format!("{}/redfish/v1/Systems/worker-1", server.base))
        .basic_auth("admin", Some("password"))
        .send()
        .await?;
    assert_eq!(response.status(), 405);
    assert!(response.headers().contains_key("allow"));
    Ok(())
}

#[tokio::test]
async fn task_service_history_is_prepopulated() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let tasks = server.get_json("/redfish/v1/TaskService/Tasks").await?;
    let count = tasks["Members@odata.count"].as_i64().unwrap_or(0);
    assert!(count >= 2, "first poll must not be empty");

    let task = server.get_json("/redfish/v1/TaskService/Tasks/0").await?;
    assert_eq!(task["TaskState"], "Completed");
    assert_eq!(task["TaskStatus"], "OK");
    assert_eq!(task["PercentComplete"], 100);
    Ok(())
}

#[tokio::test]
async fn event_subscriptions_are_created_and_listed() -> eyre::Result<()> {
    let server = spawn_server().await?;
    let response = server
        .post(
            "/redfish/v1/EventService/Subscriptions",
            serde_json::json!({
                "Destination": "https://127.0.0.1:1/sink",
                "EventTypes": ["StatusChange"],
                "Context": "test",
            }),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let location = response
        .headers()
        .get("location")
        .expect("Location header")
        .to_str()?
        .to_string();

    let listed = server.get_json("/redfish/v1/EventService/Subscriptions").await?;
    assert_eq!(listed["Members@odata.count"], 1);

    let subscription = server.get_json(&location).await?;
    assert_eq!(subscription["Destination"], "https://127.0.0.1:1/sink");

    // Push delivery is best-effort: an unreachable destination must not
    // break the action that triggers it.
    let response = server
        .post(
            "/redfish/v1/EventService/Actions/EventService.SubmitTestEvent",
            serde_json::json!({"EventType": "StatusChange", "Message": "hello"}),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 204);
    Ok(())
}

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

//! Whole-process test: both protocol surfaces come up from one config and
//! stay serviceable with vCenter unreachable from the start.

use std::time::Duration;

use vbmc_bridge::Bridge;
use vbmc_config::{Config, IsoConfig, SslConfig, VmConfig, VmwareConfig};

fn free_tcp_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral TCP");
    listener.local_addr().expect("local addr").port()
}

fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral UDP");
    socket.local_addr().expect("local addr").port()
}

fn vm_config(name: &str) -> VmConfig {
    VmConfig {
        name: name.to_string(),
        ipmi_port: free_udp_port(),
        redfish_port: free_tcp_port(),
        ipmi_user: "admin".to_string(),
        ipmi_password: "password".to_string(),
        redfish_user: "admin".to_string(),
        redfish_password: "password".to_string(),
        disable_ssl: None,
        default_iso: Some(IsoConfig {
            datastore: "datastore1".to_string(),
            path: "isos/discovery.iso".to_string(),
        }),
    }
}

fn test_config(vm_names: &[&str]) -> Config {
    Config {
        vmware: VmwareConfig {
            // Nothing listens on the discard port: the bridge must soft
            // start and serve cached defaults.
            host: "127.0.0.1".to_string(),
            user: "administrator@vsphere.local".to_string(),
            password: "secret".to_string(),
            port: 9,
            disable_ssl: true,
        },
        ssl: SslConfig::default(),
        vms: vm_names.iter().map(|name| vm_config(name)).collect(),
    }
}

fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client builds")
}

#[tokio::test]
async fn bridge_serves_both_protocols_with_vcenter_down() -> eyre::Result<()> {
    let config = test_config(&["worker-1"]);
    let bridge = Bridge::spawn(config).await?;
    let addrs = bridge.listener_addrs();
    let (_, ipmi_addr, redfish_addr) = addrs[0].clone();

    // Redfish over TLS: service root is public, the system payload is
    // healthy with deterministic defaults.
    let client = https_client();
    let base = format!("https://127.0.0.1:{}", redfish_addr.port());
    let root: serde_json::Value = client
        .get(format!("{base}/redfish/v1/"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(root["Systems"]["@odata.id"], "/redfish/v1/Systems");

    let system: serde_json::Value = client
        .get(format!("{base}/redfish/v1/Systems/worker-1"))
        .basic_auth("admin", Some("password"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(system["Status"]["Health"], "OK");
    assert_eq!(system["PowerState"], "Off");

    // IPMI: the session-less capability probe answers with RMCP+ support.
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(("127.0.0.1", ipmi_addr.port())).await?;
    let probe: &[u8] = &[
        0x06, 0x00, 0xFF, 0x07, // RMCP
        0x00, // auth type: none
        0x00, 0x00, 0x00, 0x00, // sequence
        0x00, 0x00, 0x00, 0x00, // session id
        0x09, // length
        0x20, 0x18, 0xC8, 0x81, 0x04, 0x38, 0x0E, 0x04, 0x31, // get auth caps
    ];
    socket.send(probe).await?;
    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf)).await??;
    let reply = &buf[..len];
    assert_eq!(&reply[0..4], &[0x06, 0x00, 0xFF, 0x07]);
    let payload = &reply[14..];
    assert_eq!(payload[6], 0x00, "completion code");
    assert_eq!(payload[8] & 0x80, 0x80, "IPMI 2.0 extended caps");

    bridge.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn vms_are_isolated_from_each_other() -> eyre::Result<()> {
    let config = test_config(&["worker-1", "worker-2"]);
    let bridge = Bridge::spawn(config).await?;
    let addrs = bridge.listener_addrs();
    let client = https_client();

    let base_for = |name: &str| {
        let (_, _, redfish) = addrs
            .iter()
            .find(|(vm, _, _)| vm == name)
            .expect("listener exists")
            .clone();
        format!("https://127.0.0.1:{}", redfish.port())
    };

    // Each listener serves only its own VM.
    let response = client
        .get(format!("{}/redfish/v1/Systems/worker-2", base_for("worker-1")))
        .basic_auth("admin", Some("password"))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    // Mutating A must not leak into B.
    let response = client
        .post(format!(
            "{}/redfish/v1/Managers/worker-1-BMC/VirtualMedia/CD/Actions/VirtualMedia.InsertMedia",
            base_for("worker-1")
        ))
        .basic_auth("admin", Some("password"))
        .json(&serde_json::json!({"Image": "http://repo/a.iso"}))
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    let media_b: serde_json::Value = client
        .get(format!(
            "{}/redfish/v1/Managers/worker-2-BMC/VirtualMedia/CD",
            base_for("worker-2")
        ))
        .basic_auth("admin", Some("password"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(media_b["Inserted"], false);

    let media_a: serde_json::Value = client
        .get(format!(
            "{}/redfish/v1/Managers/worker-1-BMC/VirtualMedia/CD",
            base_for("worker-1")
        ))
        .basic_auth("admin", Some("password"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(media_a["Inserted"], true);

    bridge.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn duplicate_ports_are_rejected_at_startup() {
    let mut config = test_config(&["worker-1", "worker-2"]);
    config.vms[1].ipmi_port = config.vms[0].ipmi_port;
    let error = Bridge::spawn(config)
        .await
        .expect_err("duplicate ports must be fatal");
    assert_eq!(error.exit_code(), 1);
}

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

//! The bridge process: one IPMI UDP listener and one Redfish TLS listener
//! per managed VM, all sharing a single vCenter session and one state
//! aggregate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use vbmc_config::Config;
use vbmc_ipmi::server::{IpmiServer, IpmiServerHandle};
use vbmc_redfish::{AppState, RedfishServer, RedfishServerHandle};
use vbmc_state::SharedState;
use vbmc_vsphere::{VmBackend, VsphereClient};

/// In-flight requests get this long to finish after the stop signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] vbmc_config::ConfigError),
    #[error(transparent)]
    Tls(#[from] vbmc_redfish::TlsError),
    #[error(transparent)]
    IpmiBind(#[from] vbmc_ipmi::SpawnError),
    #[error(transparent)]
    RedfishBind(#[from] vbmc_redfish::SpawnError),
    #[error("vSphere client setup failed: {0}")]
    Vsphere(#[from] vbmc_vsphere::VsphereError),
}

impl BridgeError {
    /// Process exit code: 1 for configuration problems, 2 for port binds.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) | BridgeError::Tls(_) | BridgeError::Vsphere(_) => 1,
            BridgeError::IpmiBind(_) | BridgeError::RedfishBind(_) => 2,
        }
    }
}

#[derive(Debug)]
struct VmListeners {
    vm_name: String,
    ipmi: IpmiServerHandle,
    redfish: RedfishServerHandle,
}

#[derive(Debug)]
pub struct Bridge {
    listeners: Vec<VmListeners>,
    backend: Arc<VsphereClient>,
    #[allow(dead_code)]
    state: Arc<SharedState>,
}

impl Bridge {
    /// Bind every configured listener. Configuration and bind failures are
    /// fatal; an unreachable vCenter is not (soft start: listeners serve
    /// cached defaults and the first operation retries the login).
    pub async fn spawn(config: Config) -> Result<Self, BridgeError> {
        config.validate()?;

        let backend = Arc::new(VsphereClient::new(&config.vmware)?);
        if let Err(err) = backend.try_connect().await {
            tracing::warn!("vCenter not reachable at startup, continuing degraded: {err}");
        }

        let state = Arc::new(SharedState::new(&config));
        let tls = vbmc_redfish::server_config(&config.ssl)?;

        let dyn_backend: Arc<dyn VmBackend> = backend.clone();
        let mut listeners = Vec::with_capacity(config.vms.len());
        for vm_config in &config.vms {
            let vm = state
                .vm(&vm_config.name)
                .expect("BUG: state is built from the same config");
            let ipmi =
                IpmiServer::spawn(vm.clone(), dyn_backend.clone(), vm_config.ipmi_port).await?;
            let app_state = AppState::new(vm, dyn_backend.clone(), state.tasks.clone());
            let redfish =
                RedfishServer::spawn(app_state, vm_config.redfish_port, tls.clone()).await?;
            listeners.push(VmListeners {
                vm_name: vm_config.name.clone(),
                ipmi,
                redfish,
            });
        }

        tracing::info!(
            vms = listeners.len(),
            "bridge is up; serving IPMI and Redfish for all configured VMs"
        );
        Ok(Self {
            listeners,
            backend,
            state,
        })
    }

    pub fn listener_addrs(&self) -> Vec<(String, SocketAddr, SocketAddr)> {
        self.listeners
            .iter()
            .map(|l| (l.vm_name.clone(), l.ipmi.local_addr, l.redfish.local_addr))
            .collect()
    }

    /// Stop accepting, drain in-flight work within the grace period, then
    /// log out of vCenter.
    pub async fn shutdown(self) {
        for listeners in self.listeners {
            tracing::debug!(vm = %listeners.vm_name, "stopping listeners");
            listeners.ipmi.shutdown_and_wait().await;
            listeners.redfish.shutdown_and_wait(SHUTDOWN_GRACE).await;
        }
        self.backend.disconnect().await;
        tracing::info!("bridge stopped");
    }

    /// Serve until SIGINT, then shut down gracefully.
    pub async fn run_until_interrupted(self) {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {err}");
        }
        tracing::info!("interrupt received, shutting down");
        self.shutdown().await;
    }
}

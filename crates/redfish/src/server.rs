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

//! Router assembly and the per-VM TLS listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::task::JoinHandle;

use crate::state::AppState;
use crate::{
    auth, bios, chassis, event_service, json, log_services, managers, secure_boot, service_root,
    session_service, storage, systems, task_service, update_service,
};

#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    #[error("could not bind Redfish TCP port {port}: {error}")]
    Bind { port: u16, error: std::io::Error },
}

/// Every route of the Redfish tree, wrapped in the authentication layer.
/// Unknown paths fall through to a schema-valid 404.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();
    router = service_root::add_routes(router);
    router = session_service::add_routes(router);
    router = systems::add_routes(router);
    router = storage::add_routes(router);
    router = bios::add_routes(router);
    router = secure_boot::add_routes(router);
    router = managers::add_routes(router);
    router = chassis::add_routes(router);
    router = log_services::add_routes(router);
    router = update_service::add_routes(router);
    router = task_service::add_routes(router);
    router = event_service::add_routes(router);
    router
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .with_state(state)
}

async fn fallback() -> axum::response::Response {
    json::not_found()
}

/// A running Redfish listener for one VM.
#[derive(Debug)]
pub struct RedfishServerHandle {
    pub local_addr: SocketAddr,
    handle: Handle,
    join_handle: JoinHandle<std::io::Result<()>>,
}

impl RedfishServerHandle {
    /// Stop accepting, give in-flight requests a grace period, then return.
    pub async fn shutdown_and_wait(self, grace: Duration) {
        self.handle.graceful_shutdown(Some(grace));
        if let Err(error) = self
            .join_handle
            .await
            .expect("Redfish listener task panicked")
        {
            tracing::debug!("Redfish listener exited with {error}");
        }
    }
}

pub struct RedfishServer;

impl RedfishServer {
    pub async fn spawn(
        state: AppState,
        port: u16,
        tls: Arc<rustls::ServerConfig>,
    ) -> Result<RedfishServerHandle, SpawnError> {
        let listener = std::net::TcpListener::bind(("0.0.0.0", port))
            .map_err(|error| SpawnError::Bind { port, error })?;
        listener
            .set_nonblocking(true)
            .map_err(|error| SpawnError::Bind { port, error })?;
        let local_addr = listener
            .local_addr()
            .map_err(|error| SpawnError::Bind { port, error })?;

        let vm_name = state.vm_name().to_string();
        tracing::info!(vm = %vm_name, %local_addr, "Redfish listener started");

        let router = build_router(state);
        let config = RustlsConfig::from_config(tls);
        let handle = Handle::new();
        let server = axum_server::from_tcp_rustls(listener, config).handle(handle.clone());
        let join_handle = tokio::spawn(server.serve(router.into_make_service()));

        Ok(RedfishServerHandle {
            local_addr,
            handle,
            join_handle,
        })
    }
}

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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use vbmc_config::VmwareConfig;

use crate::model::{CdromSummary, VmDetail, VmSummary};
use crate::{BootDevice, VmBackend, VmFirmware, VmInventory, VmPowerState, VsphereError};

const SESSION_HEADER: &str = "vmware-api-session-id";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// vCenter Automation API client with one shared, lazily created session.
///
/// The session token lives behind a lock so concurrent callers reuse one
/// login; the lock is released before any request is issued. A 401 response
/// drops the token and retries once with a fresh login.
#[derive(Debug)]
pub struct VsphereClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    session: Mutex<Option<String>>,
    /// vSphere inventory name -> vCenter VM identifier (`vm-123`).
    vm_ids: Mutex<HashMap<String, String>>,
    /// One in-flight configuration mutation per VM.
    vm_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VsphereClient {
    pub fn new(config: &VmwareConfig) -> Result<Self, VsphereError> {
        let base_url = format!("https://{}:{}", config.host, config.port);
        Self::with_base_url(base_url, &config.user, &config.password, config.disable_ssl)
    }

    /// Used directly by tests to point at a plaintext mock vCenter.
    pub fn with_base_url(
        base_url: String,
        user: &str,
        password: &str,
        disable_ssl: bool,
    ) -> Result<Self, VsphereError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(disable_ssl)
            .build()
            .map_err(|e| VsphereError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            user: user.to_string(),
            password: password.to_string(),
            session: Mutex::new(None),
            vm_ids: Mutex::new(HashMap::new()),
            vm_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Try to establish the session eagerly. Failure is not fatal: the
    /// bridge soft-starts and the next operation retries the login.
    pub async fn try_connect(&self) -> Result<(), VsphereError> {
        self.ensure_session().await.map(|_| ())
    }

    async fn ensure_session(&self) -> Result<String, VsphereError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *session = Some(token.clone());
        Ok(token)
    }

    async fn login(&self) -> Result<String, VsphereError> {
        let response = self
            .http
            .post(format!("{}/api/session", self.base_url))
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| VsphereError::UpstreamUnavailable(e.to_string()))?;
        match response.status() {
            s if s.is_success() => {
                let token: String = response
                    .json()
                    .await
                    .map_err(|e| VsphereError::MalformedResponse(e.to_string()))?;
                tracing::info!("established vCenter session");
                Ok(token)
            }
            StatusCode::UNAUTHORIZED => Err(VsphereError::AuthRejected),
            s => Err(VsphereError::UpstreamUnavailable(format!(
                "session create returned {s}"
            ))),
        }
    }

    async fn drop_session(&self) {
        self.session.lock().await.take();
    }

    /// Issue one API request with session handling and the transient-error
    /// retry budget. `path` is relative to the base URL and may carry a
    /// query string.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, VsphereError> {
        let mut last_error = None;
        for attempt in 0..RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
            }
            match self.request_once(method.clone(), path, body.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    tracing::warn!(path, attempt, "transient vCenter error: {err}");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            VsphereError::UpstreamUnavailable("retry budget exhausted".to_string())
        }))
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, VsphereError> {
        let mut token = self.ensure_session().await?;
        for relogin in [false, true] {
            if relogin {
                self.drop_session().await;
                token = self.ensure_session().await?;
            }
            let mut request = self
                .http
                .request(method.clone(), format!("{}{path}", self.base_url))
                .header(SESSION_HEADER, &token);
            if let Some(body) = &body {
                request = request.json(body);
            }
            let response = request
                .send()
                .await
                .map_err(|e| VsphereError::UpstreamUnavailable(e.to_string()))?;
            match response.status() {
                s if s.is_success() => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| VsphereError::UpstreamUnavailable(e.to_string()))?;
                    // Mutation endpoints reply with an empty body; feed
                    // serde `null` so callers can ask for `()`.
                    return if bytes.is_empty() {
                        serde_json::from_value(serde_json::Value::Null)
                            .map_err(|e| VsphereError::MalformedResponse(e.to_string()))
                    } else {
                        serde_json::from_slice(&bytes)
                            .map_err(|e| VsphereError::MalformedResponse(e.to_string()))
                    };
                }
                StatusCode::UNAUTHORIZED if !relogin => continue,
                StatusCode::UNAUTHORIZED => return Err(VsphereError::AuthRejected),
                StatusCode::NOT_FOUND => {
                    return Err(VsphereError::VmNotFound(path.to_string()));
                }
                s if s.is_server_error() => {
                    return Err(VsphereError::UpstreamUnavailable(format!(
                        "vCenter returned {s} for {path}"
                    )));
                }
                s => {
                    return Err(VsphereError::InvalidRequest(format!(
                        "vCenter returned {s} for {path}"
                    )));
                }
            }
        }
        unreachable!("relogin loop always returns");
    }

    /// Resolve an inventory name to the vCenter VM identifier, caching the
    /// result. The cache entry is invalidated whenever an operation comes
    /// back `VmNotFound` so renamed VMs recover on the next call.
    async fn vm_id(&self, name: &str) -> Result<String, VsphereError> {
        if let Some(id) = self.vm_ids.lock().await.get(name) {
            return Ok(id.clone());
        }
        let encoded: String = name
            .bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
                    (b as char).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect();
        let summaries: Vec<VmSummary> = self
            .request(Method::GET, &format!("/api/vcenter/vm?names={encoded}"), None)
            .await?;
        let summary = summaries
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| VsphereError::VmNotFound(name.to_string()))?;
        self.vm_ids
            .lock()
            .await
            .insert(name.to_string(), summary.vm.clone());
        Ok(summary.vm)
    }

    async fn forget_vm_id(&self, name: &str) {
        self.vm_ids.lock().await.remove(name);
    }

    async fn mutation_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.vm_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn power_action(&self, name: &str, action: &str) -> Result<(), VsphereError> {
        let id = self.vm_id(name).await?;
        let path = format!("/api/vcenter/vm/{id}/power?action={action}");
        match self.request::<()>(Method::POST, &path, None).await {
            Ok(()) => Ok(()),
            // A power action against a VM already in the target state comes
            // back 400 ALREADY_IN_DESIRED_STATE; treat it as success.
            Err(VsphereError::InvalidRequest(_)) => Ok(()),
            Err(VsphereError::VmNotFound(_)) => {
                self.forget_vm_id(name).await;
                Err(VsphereError::VmNotFound(name.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn guest_action(&self, name: &str, action: &str) -> Result<(), VsphereError> {
        let id = self.vm_id(name).await?;
        let path = format!("/api/vcenter/vm/{id}/guest/power?action={action}");
        match self.request::<()>(Method::POST, &path, None).await {
            Ok(()) => Ok(()),
            // Guest ops fail with 400 when tools are not running or the VM
            // is off; nothing the caller can do differently.
            Err(VsphereError::InvalidRequest(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn first_cdrom(&self, vm_id: &str) -> Result<Option<String>, VsphereError> {
        let cdroms: Vec<CdromSummary> = self
            .request(
                Method::GET,
                &format!("/api/vcenter/vm/{vm_id}/hardware/cdrom"),
                None,
            )
            .await?;
        Ok(cdroms.into_iter().next().map(|c| c.cdrom))
    }
}

#[async_trait]
impl VmBackend for VsphereClient {
    async fn power_on(&self, name: &str) -> Result<(), VsphereError> {
        self.power_action(name, "start").await
    }

    async fn power_off(&self, name: &str, force: bool) -> Result<(), VsphereError> {
        if force {
            self.power_action(name, "stop").await
        } else {
            self.guest_action(name, "shutdown").await
        }
    }

    async fn reset(&self, name: &str) -> Result<(), VsphereError> {
        self.power_action(name, "reset").await
    }

    async fn shutdown_guest(&self, name: &str) -> Result<(), VsphereError> {
        self.guest_action(name, "shutdown").await
    }

    async fn reboot_guest(&self, name: &str) -> Result<(), VsphereError> {
        self.guest_action(name, "reboot").await
    }

    async fn get_power_state(&self, name: &str) -> Result<VmPowerState, VsphereError> {
        let id = self.vm_id(name).await?;
        #[derive(serde::Deserialize)]
        struct PowerInfo {
            state: VmPowerState,
        }
        let info: PowerInfo = self
            .request(Method::GET, &format!("/api/vcenter/vm/{id}/power"), None)
            .await?;
        Ok(info.state)
    }

    async fn set_boot_order(
        &self,
        name: &str,
        devices: &[BootDevice],
    ) -> Result<(), VsphereError> {
        let lock = self.mutation_lock(name).await;
        let _guard = lock.lock().await;
        let id = self.vm_id(name).await?;
        let entries: Vec<serde_json::Value> = devices
            .iter()
            .map(|device| {
                json!({
                    "type": match device {
                        BootDevice::Disk => "DISK",
                        BootDevice::Cd => "CDROM",
                        BootDevice::Network => "ETHERNET",
                    }
                })
            })
            .collect();
        self.request::<()>(
            Method::PUT,
            &format!("/api/vcenter/vm/{id}/hardware/boot/device"),
            Some(json!({ "devices": entries })),
        )
        .await
    }

    async fn set_firmware(&self, name: &str, firmware: VmFirmware) -> Result<(), VsphereError> {
        let lock = self.mutation_lock(name).await;
        let _guard = lock.lock().await;
        let id = self.vm_id(name).await?;
        self.request::<()>(
            Method::PATCH,
            &format!("/api/vcenter/vm/{id}/hardware/boot"),
            Some(json!({ "type": firmware.api_value() })),
        )
        .await
    }

    async fn mount_iso(&self, name: &str, datastore_path: &str) -> Result<(), VsphereError> {
        let lock = self.mutation_lock(name).await;
        let _guard = lock.lock().await;
        let id = self.vm_id(name).await?;
        let backing = json!({ "type": "ISO_FILE", "iso_file": datastore_path });
        match self.first_cdrom(&id).await? {
            Some(cdrom) => {
                self.request::<()>(
                    Method::PATCH,
                    &format!("/api/vcenter/vm/{id}/hardware/cdrom/{cdrom}"),
                    Some(json!({ "backing": backing, "start_connected": true })),
                )
                .await?;
                // PATCH does not connect an already-present device.
                self.request::<()>(
                    Method::POST,
                    &format!("/api/vcenter/vm/{id}/hardware/cdrom/{cdrom}/connect"),
                    None,
                )
                .await
                .or(Ok(()))
            }
            None => {
                let _created: serde_json::Value = self
                    .request(
                        Method::POST,
                        &format!("/api/vcenter/vm/{id}/hardware/cdrom"),
                        Some(json!({
                            "type": "IDE",
                            "backing": backing,
                            "start_connected": true,
                        })),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn unmount_iso(&self, name: &str) -> Result<(), VsphereError> {
        let lock = self.mutation_lock(name).await;
        let _guard = lock.lock().await;
        let id = self.vm_id(name).await?;
        let Some(cdrom) = self.first_cdrom(&id).await? else {
            // Nothing mounted; unmount is idempotent.
            return Ok(());
        };
        self.request::<()>(
            Method::POST,
            &format!("/api/vcenter/vm/{id}/hardware/cdrom/{cdrom}/disconnect"),
            None,
        )
        .await
        .or(Ok(()))?;
        self.request::<()>(
            Method::PATCH,
            &format!("/api/vcenter/vm/{id}/hardware/cdrom/{cdrom}"),
            Some(json!({ "backing": { "type": "CLIENT_DEVICE" }, "start_connected": false })),
        )
        .await
    }

    async fn get_inventory(&self, name: &str) -> Result<VmInventory, VsphereError> {
        let id = self.vm_id(name).await?;
        let detail: VmDetail = self
            .request(Method::GET, &format!("/api/vcenter/vm/{id}"), None)
            .await?;
        Ok(detail.into())
    }

    async fn disconnect(&self) {
        let token = self.session.lock().await.take();
        if let Some(token) = token {
            let result = self
                .http
                .delete(format!("{}/api/session", self.base_url))
                .header(SESSION_HEADER, token)
                .send()
                .await;
            if let Err(err) = result {
                tracing::debug!("vCenter logout failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_back_off_exponentially() {
        let delays: Vec<Duration> = (1..RETRY_ATTEMPTS)
            .map(|attempt| RETRY_BASE_DELAY * 2u32.pow(attempt - 1))
            .collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(250), Duration::from_millis(500)]
        );
    }

    #[test]
    fn vm_name_encoding_escapes_reserved_bytes() {
        // Mirrors the encoding in vm_id(); names with spaces must not
        // produce an invalid query string.
        let name = "worker 1+";
        let encoded: String = name
            .bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
                    (b as char).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect();
        assert_eq!(encoded, "worker%201%2B");
    }
}

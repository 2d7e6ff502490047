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
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vbmc_state::{ManagedVm, PowerState, TaskRegistry};
use vbmc_vsphere::{VmBackend, VmInventory, VmPowerState};

/// Redfish session tokens expire after 30 minutes without use.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Shared context for every handler of one VM's Redfish listener.
#[derive(Clone)]
pub struct AppState {
    pub vm: Arc<ManagedVm>,
    pub backend: Arc<dyn VmBackend>,
    pub tasks: TaskRegistry,
    pub sessions: Arc<SessionStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub volumes: Arc<VolumeStore>,
    inventory_cache: Arc<Mutex<Option<VmInventory>>>,
    push_client: reqwest::Client,
}

impl AppState {
    pub fn new(vm: Arc<ManagedVm>, backend: Arc<dyn VmBackend>, tasks: TaskRegistry) -> Self {
        let push_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .danger_accept_invalid_certs(true)
            .build()
            .expect("BUG: static client configuration must build");
        Self {
            vm,
            backend,
            tasks,
            sessions: Arc::new(SessionStore::default()),
            subscriptions: Arc::new(SubscriptionStore::default()),
            volumes: Arc::new(VolumeStore::default()),
            inventory_cache: Arc::new(Mutex::new(None)),
            push_client,
        }
    }

    pub fn vm_name(&self) -> &str {
        self.vm.name()
    }

    pub fn manager_id(&self) -> String {
        format!("{}-BMC", self.vm.name())
    }

    pub fn chassis_id(&self) -> String {
        format!("{}-Chassis", self.vm.name())
    }

    /// Power state with read-through: ask vSphere, fall back to the cache
    /// when the upstream is unavailable.
    pub async fn current_power_state(&self) -> PowerState {
        match self.backend.get_power_state(self.vm.name()).await {
            Ok(state) => {
                let cached = match state {
                    VmPowerState::PoweredOn => PowerState::On,
                    VmPowerState::PoweredOff | VmPowerState::Suspended => PowerState::Off,
                };
                self.vm.set_power_state(cached);
                cached
            }
            Err(err) => {
                tracing::debug!(vm = %self.vm.name(), "power read degraded: {err}");
                self.vm.power_state()
            }
        }
    }

    /// Inventory with read-through and a last-good cache; falls back to a
    /// deterministic minimal-valid snapshot if vSphere never answered.
    pub async fn inventory(&self) -> VmInventory {
        match self.backend.get_inventory(self.vm.name()).await {
            Ok(inventory) => {
                *self
                    .inventory_cache
                    .lock()
                    .expect("BUG: inventory cache lock poisoned") = Some(inventory.clone());
                inventory
            }
            Err(err) => {
                tracing::debug!(vm = %self.vm.name(), "inventory read degraded: {err}");
                self.inventory_cache
                    .lock()
                    .expect("BUG: inventory cache lock poisoned")
                    .clone()
                    .unwrap_or_default()
            }
        }
    }

    /// Best-effort, at-most-once event push to every matching subscriber.
    /// Slow or broken destinations just drop the event.
    pub fn push_event(&self, event_type: &str, message: &str, origin: &str) {
        let subscribers = self.subscriptions.matching(event_type);
        if subscribers.is_empty() {
            return;
        }
        let event = serde_json::json!({
            "@odata.type": "#Event.v1_7_0.Event",
            "Id": uuid::Uuid::new_v4().simple().to_string(),
            "Name": "Event Array",
            "Events": [{
                "EventType": event_type,
                "EventId": uuid::Uuid::new_v4().simple().to_string(),
                "EventTimestamp": chrono::Utc::now().to_rfc3339(),
                "Severity": "OK",
                "Message": message,
                "OriginOfCondition": { "@odata.id": origin },
            }],
        });
        for destination in subscribers {
            let client = self.push_client.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(err) = client.post(&destination).json(&event).send().await {
                    tracing::debug!("event push to {destination} dropped: {err}");
                }
            });
        }
    }
}

pub struct RedfishSession {
    pub username: String,
    pub created: Instant,
    last_access: Instant,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, RedfishSession>>,
}

impl SessionStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RedfishSession>> {
        self.sessions
            .lock()
            .expect("BUG: Redfish session lock poisoned")
    }

    pub fn create(&self, username: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        self.lock().insert(
            token.clone(),
            RedfishSession {
                username: username.to_string(),
                created: now,
                last_access: now,
            },
        );
        token
    }

    /// Validate a token, refreshing its idle timer. Expired tokens are
    /// evicted on the way through.
    pub fn validate(&self, token: &str) -> bool {
        let mut sessions = self.lock();
        sessions.retain(|_, session| session.last_access.elapsed() < SESSION_IDLE_TIMEOUT);
        match sessions.get_mut(token) {
            Some(session) => {
                session.last_access = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn delete(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn username(&self, token: &str) -> Option<String> {
        self.lock().get(token).map(|s| s.username.clone())
    }
}

#[derive(Clone)]
pub struct Subscription {
    pub id: String,
    pub destination: String,
    pub event_types: Vec<String>,
    pub context: Option<String>,
}

#[derive(Default)]
pub struct SubscriptionStore {
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Subscription>> {
        self.subscriptions
            .lock()
            .expect("BUG: subscription lock poisoned")
    }

    pub fn create(
        &self,
        destination: String,
        event_types: Vec<String>,
        context: Option<String>,
    ) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.lock().insert(
            id.clone(),
            Subscription {
                id: id.clone(),
                destination,
                event_types,
                context,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.lock().get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn matching(&self, event_type: &str) -> Vec<String> {
        self.lock()
            .values()
            .filter(|s| {
                s.event_types.is_empty() || s.event_types.iter().any(|t| t == event_type)
            })
            .map(|s| s.destination.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub raid_type: String,
    pub capacity_bytes: u64,
}

/// Simulated RAID volumes. Creation and deletion are routed through tasks;
/// the collection only changes once the task finishes.
#[derive(Default)]
pub struct VolumeStore {
    volumes: Mutex<Vec<Volume>>,
}

impl VolumeStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Volume>> {
        self.volumes.lock().expect("BUG: volume lock poisoned")
    }

    pub fn insert(&self, volume: Volume) {
        self.lock().push(volume);
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut volumes = self.lock();
        let before = volumes.len();
        volumes.retain(|v| v.id != id);
        volumes.len() != before
    }

    pub fn get(&self, id: &str) -> Option<Volume> {
        self.lock().iter().find(|v| v.id == id).cloned()
    }

    pub fn all(&self) -> Vec<Volume> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tokens_validate_once_created() {
        let store = SessionStore::default();
        let token = store.create("admin");
        assert!(store.validate(&token));
        assert!(!store.validate("bogus"));
        assert!(store.delete(&token));
        assert!(!store.validate(&token));
    }

    #[test]
    fn subscriptions_match_by_event_type() {
        let store = SubscriptionStore::default();
        store.create(
            "https://sink/alerts".to_string(),
            vec!["Alert".to_string()],
            None,
        );
        store.create("https://sink/all".to_string(), Vec::new(), None);
        let matched = store.matching("Alert");
        assert_eq!(matched.len(), 2);
        let matched = store.matching("StatusChange");
        assert_eq!(matched, vec!["https://sink/all".to_string()]);
    }

    #[test]
    fn volume_store_round_trip() {
        let store = VolumeStore::default();
        store.insert(Volume {
            id: "volume-1".to_string(),
            name: "Volume volume-1".to_string(),
            raid_type: "RAID1".to_string(),
            capacity_bytes: 1 << 30,
        });
        assert!(store.get("volume-1").is_some());
        assert!(store.remove("volume-1"));
        assert!(!store.remove("volume-1"));
        assert!(store.all().is_empty());
    }
}

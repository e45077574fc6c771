//! Device Registry - in-memory registrations keyed by caller-supplied id.
//!
//! A registration holds everything needed to talk to a device: its
//! normalized base URL, credentials and (once discovered) its Thing
//! Description. Records are replaced wholesale on re-registration; there is
//! no in-place mutation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::auth::DeviceAuth;
use crate::config::DeviceConfig;
use crate::td::ThingDescription;
use crate::url::normalize_base_url;

/// A registered device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    pub name: String,
    /// Base URL without trailing slash
    pub base_url: String,
    pub auth: DeviceAuth,
    pub thing_description: Option<Arc<ThingDescription>>,
}

impl DeviceRecord {
    pub fn new(device_id: impl Into<String>, base_url: &str, auth: DeviceAuth) -> Self {
        let device_id = device_id.into();
        Self {
            name: device_id.clone(),
            device_id,
            base_url: normalize_base_url(base_url),
            auth,
            thing_description: None,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.id.clone(), &config.base_url, config.auth()).with_name(config.name.clone())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_thing_description(mut self, td: Option<Arc<ThingDescription>>) -> Self {
        self.thing_description = td;
        self
    }

    /// Service name for one of this device's actions.
    pub fn service_name(&self, action: &str) -> String {
        format!("{}_{}", self.device_id, action)
    }

    /// Service names for every action in the Thing Description.
    pub fn action_services(&self) -> Vec<String> {
        self.thing_description
            .as_ref()
            .map(|td| {
                td.actions()
                    .into_iter()
                    .map(|(name, _)| self.service_name(&name))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Registry of WoT devices.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, replacing and returning any previous registration.
    pub async fn register(&self, record: DeviceRecord) -> Option<DeviceRecord> {
        let mut devices = self.devices.write().await;
        devices.insert(record.device_id.clone(), record)
    }

    pub async fn unregister(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.write().await.remove(device_id)
    }

    pub async fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn contains(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    /// Registered ids, sorted.
    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Map a `{device_id}_{action}` service name back to its parts.
    ///
    /// Device ids may themselves contain underscores, so the longest id that
    /// prefixes the name and declares the remaining action wins.
    pub async fn resolve_service(&self, service: &str) -> Option<(String, String)> {
        let devices = self.devices.read().await;
        let mut candidates: Vec<&DeviceRecord> = devices
            .values()
            .filter(|record| {
                service.len() > record.device_id.len() + 1
                    && service.starts_with(record.device_id.as_str())
                    && service.as_bytes()[record.device_id.len()] == b'_'
            })
            .collect();
        candidates.sort_by_key(|record| std::cmp::Reverse(record.device_id.len()));

        candidates.into_iter().find_map(|record| {
            let action = &service[record.device_id.len() + 1..];
            record
                .thing_description
                .as_ref()
                .and_then(|td| td.action(action))
                .map(|_| (record.device_id.clone(), action.to_string()))
        })
    }
}

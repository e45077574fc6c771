//! WoT Service - ties registry, polling and actions together.
//!
//! Adding a device runs its first refresh inline; a device that cannot be
//! reached at all is never registered. After that a background task polls it
//! on a fixed interval and publishes a [`PollEvent`] per cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::actions::{ActionInvoker, ActionOutcome};
use crate::config::{defaults, DeviceConfig, WotConfig};
use crate::coordinator::{DeviceCoordinator, PollEvent, PolledData};
use crate::entity::{describe_sensors, device_info, DeviceInfo, SensorDescriptor};
use crate::error::{WotError, WotResult};
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::transport::HttpTransport;

const EVENT_CAPACITY: usize = 256;

/// Last known state of a device.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    /// Data from the last successful cycle
    pub data: Option<PolledData>,
    /// Whether the most recent cycle succeeded
    pub available: bool,
    /// Unix timestamp of the last successful cycle
    pub last_updated: Option<i64>,
    pub last_error: Option<String>,
}

impl DeviceSnapshot {
    fn apply(&mut self, event: &PollEvent) {
        match event {
            PollEvent::Updated {
                data, timestamp, ..
            } => {
                self.data = Some(data.clone());
                self.available = true;
                self.last_updated = Some(*timestamp);
                self.last_error = None;
            }
            PollEvent::UpdateFailed { error, .. } => {
                self.available = false;
                self.last_error = Some(error.clone());
            }
        }
    }
}

type Snapshots = Arc<RwLock<HashMap<String, DeviceSnapshot>>>;

/// Service managing a set of polled WoT devices.
pub struct WotService {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn HttpTransport>,
    invoker: ActionInvoker,
    poll_interval: Duration,
    pollers: RwLock<HashMap<String, JoinHandle<()>>>,
    snapshots: Snapshots,
    events: broadcast::Sender<PollEvent>,
}

impl WotService {
    /// Intervals shorter than [`defaults::MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(transport: Arc<dyn HttpTransport>, poll_interval: Duration) -> Self {
        if poll_interval < defaults::MIN_POLL_INTERVAL {
            warn!(
                "Poll interval {:?} is too short, using {:?}",
                poll_interval,
                defaults::MIN_POLL_INTERVAL
            );
        }
        let poll_interval = poll_interval.max(defaults::MIN_POLL_INTERVAL);
        let registry = Arc::new(DeviceRegistry::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            invoker: ActionInvoker::new(registry.clone(), transport.clone()),
            registry,
            transport,
            poll_interval,
            pollers: RwLock::new(HashMap::new()),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub fn from_config(config: &WotConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(transport, config.poll_interval())
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn invoker(&self) -> &ActionInvoker {
        &self.invoker
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Receive an event for every scheduled poll cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Discover, register and start polling a device.
    ///
    /// Re-adding an existing id replaces the previous registration.
    pub async fn add_device(&self, config: &DeviceConfig) -> WotResult<DeviceRecord> {
        if config.id.trim().is_empty() {
            return Err(WotError::Validation("Device id cannot be empty".to_string()));
        }
        if self.registry.contains(&config.id).await {
            self.remove_device(&config.id).await?;
        }

        let record = DeviceRecord::from_config(config);
        let mut coordinator = DeviceCoordinator::from_record(&record, self.transport.clone());
        let data = coordinator.first_refresh().await?;

        let record = record.with_thing_description(coordinator.thing_description().cloned());
        self.registry.register(record.clone()).await;

        for service in record.action_services() {
            info!(device_id = %record.device_id, "Registered action service: {}", service);
        }

        self.snapshots.write().await.insert(
            record.device_id.clone(),
            DeviceSnapshot {
                data: Some(data),
                available: true,
                last_updated: Some(chrono::Utc::now().timestamp()),
                last_error: None,
            },
        );

        let handle = self.spawn_poller(coordinator);
        self.pollers
            .write()
            .await
            .insert(record.device_id.clone(), handle);

        Ok(record)
    }

    /// Add every device in a config; failures are returned per device.
    pub async fn add_devices(&self, config: &WotConfig) -> Vec<(String, WotResult<DeviceRecord>)> {
        let mut results = Vec::with_capacity(config.devices.len());
        for device in &config.devices {
            results.push((device.id.clone(), self.add_device(device).await));
        }
        results
    }

    fn spawn_poller(&self, mut coordinator: DeviceCoordinator) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let snapshots = self.snapshots.clone();
        let events = self.events.clone();
        let period = self.poll_interval;

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer.tick().await; // first tick completes immediately

            loop {
                timer.tick().await;

                let known_td = coordinator.thing_description().cloned();
                let event = coordinator.poll_event().await;
                let device_id = coordinator.device_id().to_string();

                if coordinator.thing_description() != known_td.as_ref() {
                    if let Some(record) = registry.get(&device_id).await {
                        debug!(device_id = %device_id, "Thing Description changed, updating registration");
                        registry
                            .register(
                                record.with_thing_description(
                                    coordinator.thing_description().cloned(),
                                ),
                            )
                            .await;
                    }
                }

                snapshots
                    .write()
                    .await
                    .entry(device_id)
                    .or_default()
                    .apply(&event);

                // No subscribers is fine.
                let _ = events.send(event);
            }
        })
    }

    /// Stop polling a device and drop its registration and action services.
    pub async fn remove_device(&self, device_id: &str) -> WotResult<DeviceRecord> {
        let handle = self.pollers.write().await.remove(device_id);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.snapshots.write().await.remove(device_id);

        let record = self
            .registry
            .unregister(device_id)
            .await
            .ok_or_else(|| WotError::NotFound(format!("Device {} not found", device_id)))?;
        info!(device_id = %device_id, "Removed WoT device");
        Ok(record)
    }

    /// Invoke an action through its `{device_id}_{action}` service name.
    pub async fn call_service(
        &self,
        service: &str,
        input: &Map<String, Value>,
    ) -> WotResult<ActionOutcome> {
        self.invoker.invoke_service(service, input).await
    }

    pub async fn invoke(
        &self,
        device_id: &str,
        action: &str,
        input: &Map<String, Value>,
    ) -> WotResult<ActionOutcome> {
        self.invoker.invoke(device_id, action, input).await
    }

    /// Action service names across all devices, sorted.
    pub async fn services(&self) -> Vec<String> {
        let mut services = Vec::new();
        for id in self.registry.list_ids().await {
            if let Some(record) = self.registry.get(&id).await {
                services.extend(record.action_services());
            }
        }
        services.sort();
        services
    }

    /// Last polled data for a device.
    pub async fn latest(&self, device_id: &str) -> Option<PolledData> {
        self.snapshots
            .read()
            .await
            .get(device_id)
            .and_then(|snapshot| snapshot.data.clone())
    }

    pub async fn snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.snapshots.read().await.get(device_id).cloned()
    }

    pub async fn device_info(&self, device_id: &str) -> WotResult<DeviceInfo> {
        let record = self.record(device_id).await?;
        Ok(device_info(
            &record.base_url,
            record.thing_description.as_deref(),
        ))
    }

    /// Sensors for a device, based on its TD and latest data.
    pub async fn sensors(&self, device_id: &str) -> WotResult<Vec<SensorDescriptor>> {
        let record = self.record(device_id).await?;
        let info = device_info(&record.base_url, record.thing_description.as_deref());
        let data = self.latest(device_id).await;
        Ok(describe_sensors(
            &info.name,
            &record.base_url,
            record.thing_description.as_deref(),
            data.as_ref(),
        ))
    }

    /// Stop every poll loop. Registrations are kept.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = self.pollers.write().await.drain().collect();
        for (device_id, handle) in handles {
            handle.abort();
            let _ = handle.await;
            debug!(device_id = %device_id, "Poller stopped");
        }
    }

    async fn record(&self, device_id: &str) -> WotResult<DeviceRecord> {
        self.registry
            .get(device_id)
            .await
            .ok_or_else(|| WotError::NotFound(format!("Device {} not found", device_id)))
    }
}

impl Drop for WotService {
    fn drop(&mut self) {
        for handle in self.pollers.get_mut().values() {
            handle.abort();
        }
    }
}

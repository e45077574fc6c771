//! Polling coordinator for a single WoT HTTP device.
//!
//! A coordinator owns everything one device needs between poll cycles: the
//! cached Thing Description, the last polled data and whether the last cycle
//! succeeded. Each cycle opens one HTTP session, runs to completion and
//! drops the session again.
//!
//! ## Cycle
//!
//! 1. **Discovery** (only while no TD is cached): `/.well-known/wot`, then
//!    `/`. The first document that sniffs as a TD is cached.
//! 2. **Property reads** (TD with properties): one GET per property, URLs
//!    derived from the TD. Failed properties are left out of the result.
//! 3. **Fallback** (no usable TD): `/properties`, `/`, `/state`; the first
//!    JSON object wins. A TD found at `/` is adopted and the cycle restarts
//!    once with it.
//!
//! A cycle only fails as a whole when no session can be opened or no request
//! reached the device.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::auth::DeviceAuth;
use crate::config::{defaults, paths, THING_DESCRIPTION_KEY};
use crate::error::{WotError, WotResult};
use crate::registry::DeviceRecord;
use crate::td::{looks_like_td, property_url, ThingDescription};
use crate::transport::{HttpRequest, HttpResponse, HttpSession, HttpTransport};
use crate::url::endpoint;
use crate::value::{coerce_numeric_text, extract_value};

/// Restarts allowed per cycle after adopting a TD from the fallback root.
const MAX_RESTARTS: usize = 1;

/// Lifecycle state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No cycle has completed yet
    Uninitialized,
    /// Looking for a Thing Description
    Discovering,
    /// Reading property values
    Polling,
    /// At least one cycle completed; TD cached or confirmed absent
    Ready,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolledData {
    /// Property name to value
    pub values: Map<String, Value>,
    /// TD the values were read through, if any
    pub thing_description: Option<Arc<ThingDescription>>,
}

impl PolledData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Flatten into a single mapping, the TD under [`THING_DESCRIPTION_KEY`].
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.values.clone();
        if let Some(td) = &self.thing_description {
            map.insert(THING_DESCRIPTION_KEY.to_string(), td.to_value());
        }
        map
    }
}

/// Event published after every scheduled cycle.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Updated {
        device_id: String,
        data: PolledData,
        timestamp: i64,
    },
    UpdateFailed {
        device_id: String,
        error: String,
        timestamp: i64,
    },
}

impl PollEvent {
    pub fn device_id(&self) -> &str {
        match self {
            Self::Updated { device_id, .. } | Self::UpdateFailed { device_id, .. } => device_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

#[derive(Debug, Default)]
struct CycleStats {
    attempted: usize,
    unreachable: usize,
    last_error: Option<String>,
}

impl CycleStats {
    fn nothing_answered(&self) -> bool {
        self.attempted > 0 && self.unreachable == self.attempted
    }
}

enum FallbackOutcome {
    AdoptedTd(ThingDescription),
    Data(Map<String, Value>),
}

/// Coordinates discovery and polling for one device.
pub struct DeviceCoordinator {
    device_id: String,
    base_url: String,
    auth: DeviceAuth,
    transport: Arc<dyn HttpTransport>,
    thing_description: Option<Arc<ThingDescription>>,
    state: CoordinatorState,
    data: Option<PolledData>,
    last_update_success: bool,
    read_timeout: Duration,
}

impl DeviceCoordinator {
    pub fn new(
        device_id: impl Into<String>,
        base_url: &str,
        auth: DeviceAuth,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            base_url: crate::url::normalize_base_url(base_url),
            auth,
            transport,
            thing_description: None,
            state: CoordinatorState::Uninitialized,
            data: None,
            last_update_success: false,
            read_timeout: defaults::READ_TIMEOUT,
        }
    }

    /// Coordinator for a registered device, reusing its cached TD.
    pub fn from_record(record: &DeviceRecord, transport: Arc<dyn HttpTransport>) -> Self {
        let mut coordinator = Self::new(
            record.device_id.clone(),
            &record.base_url,
            record.auth.clone(),
            transport,
        );
        coordinator.thing_description = record.thing_description.clone();
        coordinator
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn thing_description(&self) -> Option<&Arc<ThingDescription>> {
        self.thing_description.as_ref()
    }

    pub fn data(&self) -> Option<&PolledData> {
        self.data.as_ref()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    /// Drop the cached TD so the next cycle discovers it again.
    pub fn reset_discovery(&mut self) {
        self.thing_description = None;
    }

    /// The refresh that must succeed before the device is usable.
    pub async fn first_refresh(&mut self) -> WotResult<PolledData> {
        let data = self.refresh().await?;
        info!(
            device_id = %self.device_id,
            has_td = self.thing_description.is_some(),
            values = data.values.len(),
            "WoT device ready"
        );
        Ok(data)
    }

    /// Run one cycle, keeping the previous data if it fails.
    pub async fn refresh(&mut self) -> WotResult<PolledData> {
        match self.update().await {
            Ok(data) => {
                self.last_update_success = true;
                self.state = CoordinatorState::Ready;
                self.data = Some(data.clone());
                Ok(data)
            }
            Err(e) => {
                error!(device_id = %self.device_id, "Error updating WoT device data: {}", e);
                self.last_update_success = false;
                self.state = if self.data.is_some() {
                    CoordinatorState::Ready
                } else {
                    CoordinatorState::Uninitialized
                };
                Err(e)
            }
        }
    }

    /// Run one cycle and wrap the outcome as an event.
    pub async fn poll_event(&mut self) -> PollEvent {
        let timestamp = chrono::Utc::now().timestamp();
        match self.refresh().await {
            Ok(data) => PollEvent::Updated {
                device_id: self.device_id.clone(),
                data,
                timestamp,
            },
            Err(e) => PollEvent::UpdateFailed {
                device_id: self.device_id.clone(),
                error: e.to_string(),
                timestamp,
            },
        }
    }

    async fn update(&mut self) -> WotResult<PolledData> {
        let session = self.transport.open(&self.auth).await.map_err(|e| {
            WotError::UpdateFailed(format!("Error communicating with device: {}", e))
        })?;
        let session = session.as_ref();
        let mut stats = CycleStats::default();

        if self.thing_description.is_none() {
            self.state = CoordinatorState::Discovering;
            self.discover(session, &mut stats).await;
        }

        self.state = CoordinatorState::Polling;
        let mut restarts = 0;
        let data = loop {
            if let Some(td) = self.thing_description.clone().filter(|td| td.has_properties()) {
                let values = self.fetch_properties(session, &td, &mut stats).await;
                break PolledData {
                    values,
                    thing_description: Some(td),
                };
            }

            debug!(device_id = %self.device_id, "No Thing Description available, trying fallback endpoints");
            match self
                .fetch_fallback(session, &mut stats, restarts < MAX_RESTARTS)
                .await
            {
                FallbackOutcome::AdoptedTd(td) => {
                    self.thing_description = Some(Arc::new(td));
                    restarts += 1;
                }
                FallbackOutcome::Data(values) => {
                    break PolledData {
                        values,
                        thing_description: None,
                    };
                }
            }
        };

        if stats.nothing_answered() {
            return Err(WotError::UpdateFailed(format!(
                "Error communicating with device: none of {} requests reached {} ({})",
                stats.attempted,
                self.base_url,
                stats.last_error.unwrap_or_default()
            )));
        }

        debug!(device_id = %self.device_id, values = data.values.len(), "Poll cycle complete");
        Ok(data)
    }

    async fn get(
        &self,
        session: &dyn HttpSession,
        url: &str,
        stats: &mut CycleStats,
    ) -> WotResult<HttpResponse> {
        stats.attempted += 1;
        let result = session.send(HttpRequest::get(url, self.read_timeout)).await;
        if let Err(e) = &result {
            if e.is_connection() {
                stats.unreachable += 1;
            }
            stats.last_error = Some(e.to_string());
        }
        result
    }

    async fn discover(&mut self, session: &dyn HttpSession, stats: &mut CycleStats) {
        for path in [paths::WELL_KNOWN_TD, paths::ROOT] {
            let url = endpoint(&self.base_url, path);
            match self.get(session, &url, stats).await {
                Ok(resp) if resp.is_ok() => match resp.json() {
                    Ok(doc) if looks_like_td(&doc) => match ThingDescription::from_value(doc) {
                        Ok(td) => {
                            debug!(device_id = %self.device_id, url = %url, "Found Thing Description");
                            self.thing_description = Some(Arc::new(td));
                            return;
                        }
                        Err(e) => debug!(url = %url, "Could not use Thing Description: {}", e),
                    },
                    Ok(_) => debug!(url = %url, "Document is not a Thing Description"),
                    Err(e) => debug!(url = %url, "Could not fetch Thing Description: {}", e),
                },
                Ok(resp) => {
                    debug!(url = %url, status = resp.status, "Could not fetch Thing Description")
                }
                Err(e) => debug!(url = %url, "Could not fetch Thing Description: {}", e),
            }
        }
    }

    async fn fetch_properties(
        &self,
        session: &dyn HttpSession,
        td: &ThingDescription,
        stats: &mut CycleStats,
    ) -> Map<String, Value> {
        let properties = td.properties();
        debug!(
            device_id = %self.device_id,
            "Fetching {} properties from Thing Description",
            properties.len()
        );

        let mut values = Map::new();
        for (name, prop) in properties {
            let url = property_url(&self.base_url, &name, &prop);
            debug!(property = %name, url = %url, "Fetching property");

            match self.get(session, &url, stats).await {
                Ok(resp) if resp.is_ok() => {
                    let value = match resp.json() {
                        Ok(body) => extract_value(body),
                        Err(_) => coerce_numeric_text(&resp.text()),
                    };
                    debug!(property = %name, value = %value, "Property value");
                    values.insert(name, value);
                }
                Ok(resp) => warn!(
                    device_id = %self.device_id,
                    "HTTP {} error fetching property '{}' from {}",
                    resp.status,
                    name,
                    url
                ),
                Err(e) => warn!(
                    device_id = %self.device_id,
                    "Error fetching property '{}' from {}: {}",
                    name,
                    url,
                    e
                ),
            }
        }
        values
    }

    async fn fetch_fallback(
        &self,
        session: &dyn HttpSession,
        stats: &mut CycleStats,
        allow_adopt: bool,
    ) -> FallbackOutcome {
        for path in paths::FALLBACK {
            let url = endpoint(&self.base_url, path);
            let resp = match self.get(session, &url, stats).await {
                Ok(resp) if resp.is_ok() => resp,
                Ok(resp) => {
                    debug!(url = %url, status = resp.status, "Fallback endpoint unavailable");
                    continue;
                }
                Err(e) => {
                    debug!(url = %url, "Fallback endpoint failed: {}", e);
                    continue;
                }
            };

            let doc = match resp.json() {
                Ok(doc) => doc,
                Err(_) => {
                    debug!(url = %url, "Fallback endpoint returned non-JSON data");
                    continue;
                }
            };

            if allow_adopt && path == paths::ROOT && looks_like_td(&doc) {
                match ThingDescription::from_value(doc.clone()) {
                    Ok(td) if self.thing_description.as_deref() == Some(&td) => {
                        debug!(device_id = %self.device_id, "Root endpoint serves the cached Thing Description");
                    }
                    Ok(td) => {
                        debug!(device_id = %self.device_id, "Found Thing Description at root endpoint");
                        return FallbackOutcome::AdoptedTd(td);
                    }
                    Err(_) => {}
                }
            }

            match doc {
                Value::Object(map) => return FallbackOutcome::Data(map),
                other => debug!(url = %url, "Ignoring non-object fallback data: {}", other),
            }
        }
        FallbackOutcome::Data(Map::new())
    }
}

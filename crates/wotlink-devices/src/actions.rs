//! Action invocation for WoT HTTP devices.
//!
//! Actions are user-triggered side effects, so every failure is surfaced to
//! the caller; nothing here is retried or swallowed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::defaults;
use crate::error::{WotError, WotResult};
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::schema::build_schema;
use crate::td::{ActionDef, OP_READ_PROPERTY, OP_WRITE_PROPERTY};
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::url::resolve_url;

/// URL an action is invoked at.
pub fn action_url(base_url: &str, action_name: &str, action: &ActionDef) -> String {
    match &action.href {
        Some(href) => resolve_url(base_url, href),
        None => format!("{}/actions/{}", base_url.trim_end_matches('/'), action_name),
    }
}

/// HTTP method for the action's first declared operation.
pub fn action_method(action: &ActionDef) -> HttpMethod {
    match action.operation() {
        OP_READ_PROPERTY => HttpMethod::Get,
        OP_WRITE_PROPERTY => HttpMethod::Put,
        _ => HttpMethod::Post,
    }
}

/// Keep only the input keys named by the action's input schema.
///
/// Without an input schema the input is passed through unchanged.
pub fn filter_payload(action: &ActionDef, input: &Map<String, Value>) -> Map<String, Value> {
    match action.input_properties() {
        Some(declared) => input
            .iter()
            .filter(|(key, _)| declared.contains_key(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        None => input.clone(),
    }
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub status: u16,
    /// Response body, when it was JSON
    pub response: Option<Value>,
}

/// Invokes actions on registered devices.
#[derive(Clone)]
pub struct ActionInvoker {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl ActionInvoker {
    pub fn new(registry: Arc<DeviceRegistry>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            registry,
            transport,
            timeout: defaults::ACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate `input` and invoke `action_name` on a registered device.
    pub async fn invoke(
        &self,
        device_id: &str,
        action_name: &str,
        input: &Map<String, Value>,
    ) -> WotResult<ActionOutcome> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or_else(|| WotError::NotFound(format!("Device {} not found", device_id)))?;

        let td = device
            .thing_description
            .as_ref()
            .filter(|td| td.has_actions())
            .ok_or_else(|| {
                WotError::NotFound(format!("No actions available for device {}", device_id))
            })?;

        let action = td
            .action(action_name)
            .ok_or_else(|| WotError::NotFound(format!("Action {} not found", action_name)))?;

        let validated = build_schema(&action).validate(input)?;
        self.execute_action(&device, action_name, &action, &validated).await
    }

    /// Invoke an action by its `{device_id}_{action}` service name.
    pub async fn invoke_service(
        &self,
        service: &str,
        input: &Map<String, Value>,
    ) -> WotResult<ActionOutcome> {
        let (device_id, action_name) = self
            .registry
            .resolve_service(service)
            .await
            .ok_or_else(|| WotError::NotFound(format!("Service {} not found", service)))?;
        self.invoke(&device_id, &action_name, input).await
    }

    /// Send an action request. `input` is expected to be validated already.
    pub async fn execute_action(
        &self,
        device: &DeviceRecord,
        action_name: &str,
        action: &ActionDef,
        input: &Map<String, Value>,
    ) -> WotResult<ActionOutcome> {
        let url = action_url(&device.base_url, action_name, action);
        let method = action_method(action);
        let payload = filter_payload(action, input);

        let request = match method {
            HttpMethod::Get => HttpRequest::get(&url, self.timeout),
            _ => HttpRequest::with_json(method, &url, Value::Object(payload), self.timeout),
        };

        debug!(device_id = %device.device_id, action = %action_name, method = %method, url = %url, "Invoking action");

        let result = async {
            let session = self.transport.open(&device.auth).await?;
            session.send(request).await
        }
        .await;

        let response = match result {
            Ok(response) => response,
            Err(WotError::Connection(msg)) => {
                error!("HTTP error executing action {}: {}", action_name, msg);
                return Err(WotError::Connection(format!(
                    "Failed to execute action {}: {}",
                    action_name, msg
                )));
            }
            Err(e) => {
                error!("Unexpected error executing action {}: {}", action_name, e);
                return Err(e);
            }
        };

        if response.status >= 400 {
            let body = response.text();
            error!(
                "Action {} failed with status {}: {}",
                action_name, response.status, body
            );
            return Err(WotError::HttpStatus {
                status: response.status,
                body,
            });
        }

        info!(device_id = %device.device_id, "Action {} executed successfully", action_name);

        let parsed = response.json().ok();
        if let Some(body) = &parsed {
            debug!("Action {} response: {}", action_name, body);
        }

        Ok(ActionOutcome {
            status: response.status,
            response: parsed,
        })
    }
}

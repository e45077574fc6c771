//! Connection validation for newly configured devices.
//!
//! Run before a device is saved: normalizes the user-entered URL, checks
//! that something answers there and captures the Thing Description when the
//! device serves one.

use tracing::{info, warn};

use crate::config::{defaults, paths, DeviceConfig};
use crate::error::{WotError, WotResult};
use crate::td::ThingDescription;
use crate::transport::{HttpRequest, HttpTransport};
use crate::url::{endpoint, starts_with_ignore_case};

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDevice {
    /// TD title when present, otherwise the configured name
    pub title: String,
    /// Normalized base URL, with trailing slash
    pub base_url: String,
    pub thing_description: Option<ThingDescription>,
}

impl ValidatedDevice {
    pub fn property_count(&self) -> usize {
        self.thing_description
            .as_ref()
            .map(|td| td.properties().len())
            .unwrap_or(0)
    }

    pub fn action_count(&self) -> usize {
        self.thing_description
            .as_ref()
            .map(|td| td.actions().len())
            .unwrap_or(0)
    }
}

/// Normalize a user-entered base URL.
///
/// Adds `http://` when no scheme is given and ensures a trailing `/`.
pub fn normalize_user_url(input: &str) -> WotResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(WotError::Validation("Base URL cannot be empty".to_string()));
    }

    let mut url = if starts_with_ignore_case(trimmed, "http://")
        || starts_with_ignore_case(trimmed, "https://")
    {
        trimmed.to_string()
    } else if trimmed.contains("://") {
        return Err(WotError::Validation(
            "URL must use HTTP or HTTPS protocol".to_string(),
        ));
    } else {
        format!("http://{}", trimmed)
    };

    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or_default();
    let host = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(WotError::Validation("Invalid URL format".to_string()));
    }

    if !url.ends_with('/') {
        url.push('/');
    }
    Ok(url)
}

/// Check that a device is reachable and fetch its TD if it has one.
pub async fn validate_connection(
    transport: &dyn HttpTransport,
    config: &DeviceConfig,
) -> WotResult<ValidatedDevice> {
    let base_url = normalize_user_url(&config.base_url)?;
    let session = transport.open(&config.auth()).await?;
    let td_url = endpoint(&base_url, paths::WELL_KNOWN_TD);

    let root = session
        .send(HttpRequest::get(&base_url, defaults::READ_TIMEOUT))
        .await
        .map_err(|e| WotError::Connection(format!("Cannot connect to device: {}", e)))?;

    if root.status == 404 {
        let td_check = session
            .send(HttpRequest::get(&td_url, defaults::TD_CHECK_TIMEOUT))
            .await
            .map_err(|e| WotError::Connection(format!("Cannot connect to device: {}", e)))?;
        if !td_check.is_ok() {
            return Err(WotError::Connection("No WoT Thing Description found".to_string()));
        }
    } else if root.status >= 400 {
        return Err(WotError::Connection(format!("HTTP {} error", root.status)));
    }

    let mut title = config.name.clone();
    let mut thing_description = None;

    match session
        .send(HttpRequest::get(&td_url, defaults::TD_CHECK_TIMEOUT))
        .await
    {
        Ok(resp) if resp.is_ok() => {
            let doc = resp.json().map_err(|e| {
                warn!("Invalid JSON in Thing Description: {}", e);
                WotError::Validation("Device returned invalid JSON Thing Description".to_string())
            })?;
            let td = ThingDescription::from_value(doc)
                .map_err(|_| WotError::Validation("Invalid Thing Description format".to_string()))?;

            if let Some(td_title) = td.title() {
                title = td_title.to_string();
            }
            info!(
                "Discovered WoT device '{}' with {} properties and {} actions",
                title,
                td.properties().len(),
                td.actions().len()
            );
            thing_description = Some(td);
        }
        Ok(_) | Err(_) => {
            info!("No WoT Thing Description found at {}, using basic HTTP mode", td_url);
        }
    }

    Ok(ValidatedDevice {
        title,
        base_url,
        thing_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme_and_slash() {
        assert_eq!(normalize_user_url("192.168.1.5:8080").unwrap(), "http://192.168.1.5:8080/");
        assert_eq!(normalize_user_url("  https://dev.local/api ").unwrap(), "https://dev.local/api/");
        assert_eq!(normalize_user_url("http://dev.local/").unwrap(), "http://dev.local/");
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(matches!(normalize_user_url("   "), Err(WotError::Validation(_))));
        assert!(matches!(normalize_user_url("ftp://dev.local"), Err(WotError::Validation(_))));
        assert!(matches!(normalize_user_url("http://"), Err(WotError::Validation(_))));
        assert!(matches!(normalize_user_url("http:///path"), Err(WotError::Validation(_))));
    }
}

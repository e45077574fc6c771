//! Web of Things HTTP device integration.
//!
//! Discovers devices that describe themselves with a W3C WoT Thing
//! Description, polls their properties on an interval and invokes their
//! actions. Devices without a TD are still polled through a small set of
//! conventional endpoints.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `http` | ✅ | reqwest-backed [`HttpTransport`] |
//!
//! ## Architecture
//!
//! - **DeviceRegistry**: registered devices, their credentials and TDs
//! - **DeviceCoordinator**: discovery and one poll cycle per device
//! - **ActionInvoker**: schema validation and action requests
//! - **WotService**: registry, background polling and action services
//! - **HttpTransport**: session factory; every network call goes through it

pub mod actions;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod registry;
pub mod schema;
pub mod service;
pub mod td;
pub mod transport;
pub mod url;
pub mod validation;
pub mod value;

pub use actions::{ActionInvoker, ActionOutcome};
pub use auth::{AuthType, DeviceAuth};
pub use config::{DeviceConfig, WotConfig, THING_DESCRIPTION_KEY};
pub use coordinator::{CoordinatorState, DeviceCoordinator, PollEvent, PolledData};
pub use entity::{describe_sensors, DeviceClass, DeviceInfo, SensorDescriptor, StateClass};
pub use error::{WotError, WotResult};
pub use registry::{DeviceRecord, DeviceRegistry};
pub use schema::{build_schema, ActionSchema, FieldKind, FieldValidator};
pub use service::{DeviceSnapshot, WotService};
pub use td::{looks_like_td, ActionDef, PropertyDef, ThingDescription};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpSession, HttpTransport};
pub use url::resolve_url;
pub use validation::{normalize_user_url, validate_connection, ValidatedDevice};
pub use value::extract_value;

#[cfg(feature = "http")]
pub use transport::ReqwestTransport;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

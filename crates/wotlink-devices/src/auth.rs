//! Per-device HTTP authentication.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Authentication scheme selected for a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Bearer => "bearer",
        }
    }
}

impl std::str::FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "bearer" => Ok(Self::Bearer),
            other => Err(format!("unknown auth type '{}'", other)),
        }
    }
}

/// Resolved credentials for a device.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum DeviceAuth {
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl DeviceAuth {
    /// Build credentials from loosely-filled configuration fields.
    ///
    /// Basic needs both a username and a password and Bearer needs a token;
    /// when the required fields are missing or empty no header is sent.
    pub fn from_parts(
        auth_type: AuthType,
        username: Option<&str>,
        password: Option<&str>,
        token: Option<&str>,
    ) -> Self {
        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        match auth_type {
            AuthType::Basic => match (non_empty(username), non_empty(password)) {
                (Some(username), Some(password)) => Self::Basic { username, password },
                _ => Self::None,
            },
            AuthType::Bearer => match non_empty(token) {
                Some(token) => Self::Bearer { token },
                None => Self::None,
            },
            AuthType::None => Self::None,
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::None => AuthType::None,
            Self::Basic { .. } => AuthType::Basic,
            Self::Bearer { .. } => AuthType::Bearer,
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", encoded))
            }
            Self::Bearer { token } => Some(format!("Bearer {}", token)),
        }
    }
}

impl fmt::Debug for DeviceAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

//! HTTP transport seam.
//!
//! All device traffic goes through [`HttpTransport`]. A transport hands out
//! an [`HttpSession`] carrying the device credentials; callers open one per
//! logical operation (a poll cycle, an action call) and drop it when done.
//! Every request carries its own timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::DeviceAuth;
use crate::error::{WotError, WotResult};

/// HTTP methods used against WoT devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// JSON body; sent with `Content-Type: application/json`
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
            timeout,
        }
    }

    pub fn with_json(method: HttpMethod, url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            body: Some(body),
            timeout,
        }
    }
}

/// A device response with the body fully read.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn json(&self) -> WotResult<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// An open, authenticated session to one device.
#[async_trait]
pub trait HttpSession: Send + Sync {
    /// Send a request. Transport failures (refused, DNS, timeout) map to
    /// [`WotError::Connection`]; any HTTP status is returned as a response.
    async fn send(&self, request: HttpRequest) -> WotResult<HttpResponse>;
}

/// Factory for device sessions.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn open(&self, auth: &DeviceAuth) -> WotResult<Box<dyn HttpSession>>;
}

#[cfg(feature = "http")]
pub use reqwest_impl::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_impl {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
    use reqwest::Client;

    /// Transport backed by reqwest.
    ///
    /// Each session builds its own client with idle pooling disabled, so no
    /// connection outlives the operation that opened it.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport;

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self
        }
    }

    struct ReqwestSession {
        client: Client,
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn open(&self, auth: &DeviceAuth) -> WotResult<Box<dyn HttpSession>> {
            let mut headers = HeaderMap::new();
            if let Some(value) = auth.authorization_header() {
                let mut value = HeaderValue::from_str(&value)
                    .map_err(|_| WotError::Validation("Invalid characters in credentials".to_string()))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }

            let client = Client::builder()
                .default_headers(headers)
                .pool_max_idle_per_host(0)
                .build()
                .map_err(|e| WotError::Connection(format!("Failed to create HTTP client: {}", e)))?;

            Ok(Box::new(ReqwestSession { client }))
        }
    }

    #[async_trait]
    impl HttpSession for ReqwestSession {
        async fn send(&self, request: HttpRequest) -> WotResult<HttpResponse> {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
                HttpMethod::Put => self.client.put(&request.url),
            };
            builder = builder.timeout(request.timeout);

            if let Some(body) = &request.body {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(serde_json::to_vec(body)?);
            }

            let response = builder.send().await.map_err(|e| connection_error(&request, e))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| connection_error(&request, e))?;

            Ok(HttpResponse::new(status, body.to_vec()))
        }
    }

    fn connection_error(request: &HttpRequest, err: reqwest::Error) -> WotError {
        if err.is_timeout() {
            WotError::Connection(format!(
                "{} {} timed out after {}s",
                request.method,
                request.url,
                request.timeout.as_secs()
            ))
        } else {
            WotError::Connection(format!("{} {} failed: {}", request.method, request.url, err))
        }
    }
}

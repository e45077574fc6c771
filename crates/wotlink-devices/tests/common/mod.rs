//! Recording mock transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use wotlink_devices::{
    DeviceAuth, HttpMethod, HttpRequest, HttpResponse, HttpSession, HttpTransport, WotError,
    WotResult,
};

pub const BASE: &str = "http://device.local";

pub fn url(path: &str) -> String {
    format!("{}{}", BASE, path)
}

/// A request as the device saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
    pub timeout: Duration,
    pub authorization: Option<String>,
}

#[derive(Clone)]
enum Route {
    Reply(u16, Vec<u8>),
    Unreachable,
}

#[derive(Default)]
struct Inner {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
    offline: AtomicBool,
    fail_open: AtomicBool,
    sessions: AtomicUsize,
}

/// In-memory device network. Unrouted URLs answer 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(&self, url: impl Into<String>, status: u16, body: Value) -> &Self {
        let bytes = serde_json::to_vec(&body).unwrap();
        self.route(url, Route::Reply(status, bytes))
    }

    pub fn text(&self, url: impl Into<String>, status: u16, body: &str) -> &Self {
        self.route(url, Route::Reply(status, body.as_bytes().to_vec()))
    }

    pub fn unreachable(&self, url: impl Into<String>) -> &Self {
        self.route(url, Route::Unreachable)
    }

    fn route(&self, url: impl Into<String>, route: Route) -> &Self {
        self.inner.routes.lock().unwrap().insert(url.into(), route);
        self
    }

    /// Every request fails as if the host were down.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.url == url).count()
    }

    pub fn clear_requests(&self) {
        self.inner.requests.lock().unwrap().clear();
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    pub fn arc(&self) -> Arc<dyn HttpTransport> {
        Arc::new(self.clone())
    }
}

struct MockSession {
    inner: Arc<Inner>,
    authorization: Option<String>,
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn open(&self, auth: &DeviceAuth) -> WotResult<Box<dyn HttpSession>> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(WotError::Connection("session refused".to_string()));
        }
        self.inner.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            inner: self.inner.clone(),
            authorization: auth.authorization_header(),
        }))
    }
}

#[async_trait]
impl HttpSession for MockSession {
    async fn send(&self, request: HttpRequest) -> WotResult<HttpResponse> {
        self.inner.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            body: request.body.clone(),
            timeout: request.timeout,
            authorization: self.authorization.clone(),
        });

        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(WotError::Connection(format!("{} refused", request.url)));
        }

        let route = self.inner.routes.lock().unwrap().get(&request.url).cloned();
        match route {
            Some(Route::Reply(status, body)) => Ok(HttpResponse::new(status, body)),
            Some(Route::Unreachable) => {
                Err(WotError::Connection(format!("{} unreachable", request.url)))
            }
            None => Ok(HttpResponse::new(404, "Not Found")),
        }
    }
}

/// TD of a small weather station with two properties.
pub fn weather_td() -> Value {
    serde_json::json!({
        "@context": "https://www.w3.org/2019/wot/td/v1",
        "title": "Weather Station",
        "properties": {
            "temperature": {
                "type": "number",
                "unit": "°C",
                "forms": [{"href": "/properties/temperature"}]
            },
            "humidity": {
                "type": "number",
                "unit": "%",
                "forms": [{"href": "/properties/humidity", "op": ["readproperty"]}]
            }
        }
    })
}

/// TD of a lamp with actions of every method kind.
pub fn lamp_td() -> Value {
    serde_json::json!({
        "@context": "https://www.w3.org/2019/wot/td/v1",
        "title": "Lamp",
        "properties": {
            "on": {"type": "boolean"}
        },
        "actions": {
            "setBrightness": {
                "input": {
                    "type": "object",
                    "properties": {
                        "brightness": {"type": "integer", "minimum": 0, "maximum": 100}
                    },
                    "required": ["brightness"]
                }
            },
            "toggle": {"href": "/lamp/toggle"},
            "status": {"href": "/lamp/status", "op": ["readproperty"]},
            "setColor": {
                "op": "writeproperty",
                "input": {
                    "properties": {
                        "color": {"type": "string", "enum": ["red", "green", "blue"], "default": "red"}
                    }
                }
            }
        }
    })
}

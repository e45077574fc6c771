//! Action invocation: validation, request shape and error mapping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{lamp_td, url, MockTransport, BASE};
use serde_json::{json, Map, Value};
use tokio::test;
use wotlink_devices::{
    ActionInvoker, DeviceAuth, DeviceRecord, DeviceRegistry, HttpMethod, ThingDescription,
    WotError,
};

fn input(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

async fn lamp_invoker(mock: &MockTransport, auth: DeviceAuth) -> ActionInvoker {
    let registry = Arc::new(DeviceRegistry::new());
    let td = ThingDescription::from_value(lamp_td()).unwrap();
    registry
        .register(DeviceRecord::new("lamp", BASE, auth).with_thing_description(Some(Arc::new(td))))
        .await;
    registry
        .register(DeviceRecord::new("plain", "http://plain.local", DeviceAuth::None))
        .await;
    ActionInvoker::new(registry, mock.arc())
}

#[test]
async fn test_out_of_range_input_is_rejected_before_any_request() {
    let mock = MockTransport::new();
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    let err = invoker
        .invoke("lamp", "setBrightness", &input(json!({"brightness": 150})))
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::Validation(_)));
    assert!(mock.requests().is_empty());
    assert_eq!(mock.sessions_opened(), 0);
}

#[test]
async fn test_missing_required_field_is_rejected() {
    let mock = MockTransport::new();
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    let err = invoker
        .invoke("lamp", "setBrightness", &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::Validation(_)));
    assert!(mock.requests().is_empty());
}

#[test]
async fn test_valid_input_is_posted() {
    let mock = MockTransport::new();
    mock.json(url("/actions/setBrightness"), 200, json!({"status": "ok"}));
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    let outcome = invoker
        .invoke("lamp", "setBrightness", &input(json!({"brightness": 50})))
        .await
        .unwrap();
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.response, Some(json!({"status": "ok"})));

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, HttpMethod::Post);
    assert_eq!(requests[0].url, url("/actions/setBrightness"));
    assert_eq!(requests[0].body, Some(json!({"brightness": 50})));
    assert_eq!(requests[0].timeout, Duration::from_secs(30));
}

#[test]
async fn test_payload_is_coerced_and_filtered() {
    let mock = MockTransport::new();
    mock.text(url("/actions/setBrightness"), 204, "");
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    let outcome = invoker
        .invoke(
            "lamp",
            "setBrightness",
            &input(json!({"brightness": "75", "junk": true})),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, 204);
    assert!(outcome.response.is_none());
    assert_eq!(mock.requests()[0].body, Some(json!({"brightness": 75})));
}

#[test]
async fn test_action_without_schema_passes_input_through() {
    let mock = MockTransport::new();
    mock.json(url("/lamp/toggle"), 200, json!({"on": true}));
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    invoker
        .invoke("lamp", "toggle", &input(json!({"speed": "fast"})))
        .await
        .unwrap();
    let request = &mock.requests()[0];
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, url("/lamp/toggle"));
    assert_eq!(request.body, Some(json!({"speed": "fast"})));
}

#[test]
async fn test_read_operation_uses_get_without_body() {
    let mock = MockTransport::new();
    mock.json(url("/lamp/status"), 200, json!({"on": false}));
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    let outcome = invoker.invoke("lamp", "status", &Map::new()).await.unwrap();
    assert_eq!(outcome.response, Some(json!({"on": false})));
    let request = &mock.requests()[0];
    assert_eq!(request.method, HttpMethod::Get);
    assert!(request.body.is_none());
}

#[test]
async fn test_write_operation_uses_put_with_defaults() {
    let mock = MockTransport::new();
    mock.json(url("/actions/setColor"), 200, json!({}));
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    invoker.invoke("lamp", "setColor", &Map::new()).await.unwrap();
    let request = &mock.requests()[0];
    assert_eq!(request.method, HttpMethod::Put);
    assert_eq!(request.body, Some(json!({"color": "red"})));

    let err = invoker
        .invoke("lamp", "setColor", &input(json!({"color": "pink"})))
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::Validation(_)));
    assert_eq!(mock.requests().len(), 1);
}

#[test]
async fn test_error_status_is_surfaced() {
    let mock = MockTransport::new();
    mock.text(url("/lamp/toggle"), 503, "overheated");
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    match invoker.invoke("lamp", "toggle", &Map::new()).await {
        Err(WotError::HttpStatus { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overheated");
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
}

#[test]
async fn test_unreachable_device_is_a_connection_error() {
    let mock = MockTransport::new();
    mock.unreachable(url("/lamp/toggle"));
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    match invoker.invoke("lamp", "toggle", &Map::new()).await {
        Err(WotError::Connection(msg)) => assert!(msg.contains("Failed to execute action toggle")),
        other => panic!("expected Connection, got {:?}", other),
    }
}

#[test]
async fn test_malformed_op_still_validates_against_declared_schema() {
    let mock = MockTransport::new();
    mock.json("http://elsewhere.local/set", 200, json!({}));
    let registry = Arc::new(DeviceRegistry::new());
    let td = ThingDescription::from_value(json!({
        "title": "Dimmer",
        "actions": {
            "setBrightness": {
                "href": "http://elsewhere.local/set",
                "op": [7],
                "input": {
                    "properties": {"brightness": {"type": "integer", "minimum": 0, "maximum": 100}},
                    "required": ["brightness"]
                }
            }
        }
    }))
    .unwrap();
    registry
        .register(
            DeviceRecord::new("dimmer", BASE, DeviceAuth::None)
                .with_thing_description(Some(Arc::new(td))),
        )
        .await;
    let invoker = ActionInvoker::new(registry, mock.arc());

    let err = invoker
        .invoke("dimmer", "setBrightness", &input(json!({"brightness": 150})))
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::Validation(_)));
    assert!(mock.requests().is_empty());

    invoker
        .invoke("dimmer", "setBrightness", &input(json!({"brightness": 60})))
        .await
        .unwrap();
    let request = &mock.requests()[0];
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "http://elsewhere.local/set");
    assert_eq!(request.body, Some(json!({"brightness": 60})));
}

#[test]
async fn test_unknown_targets_are_not_found() {
    let mock = MockTransport::new();
    let invoker = lamp_invoker(&mock, DeviceAuth::None).await;

    for (device, action) in [("ghost", "toggle"), ("plain", "toggle"), ("lamp", "explode")] {
        let err = invoker.invoke(device, action, &Map::new()).await.unwrap_err();
        assert!(
            matches!(err, WotError::NotFound(_)),
            "{}/{} gave {:?}",
            device,
            action,
            err
        );
    }
    assert!(mock.requests().is_empty());
}

#[test]
async fn test_service_name_dispatch_and_credentials() {
    let mock = MockTransport::new();
    mock.json(url("/actions/setBrightness"), 200, json!({}));
    let invoker = lamp_invoker(
        &mock,
        DeviceAuth::Basic {
            username: "admin".into(),
            password: "secret".into(),
        },
    )
    .await;

    invoker
        .invoke_service("lamp_setBrightness", &input(json!({"brightness": 10})))
        .await
        .unwrap();
    assert_eq!(
        mock.requests()[0].authorization.as_deref(),
        Some("Basic YWRtaW46c2VjcmV0")
    );

    let err = invoker
        .invoke_service("lamp_unknown", &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::NotFound(_)));
}

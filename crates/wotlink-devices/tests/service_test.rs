//! WotService lifecycle: registration, background polling and services.

mod common;

use std::time::Duration;

use common::{lamp_td, url, weather_td, MockTransport, BASE};
use serde_json::{json, Map};
use tokio::sync::broadcast;
use wotlink_devices::{
    DeviceClass, DeviceConfig, PollEvent, WotConfig, WotError, WotService,
};

const INTERVAL: Duration = Duration::from_secs(30);

fn weather_device(mock: &MockTransport) -> DeviceConfig {
    mock.json(url("/.well-known/wot"), 200, weather_td())
        .json(url("/properties/temperature"), 200, json!({"value": 22.5}))
        .json(url("/properties/humidity"), 200, json!({"value": 40}));
    DeviceConfig::new("weather", BASE).with_name("Weather")
}

fn lamp_device(mock: &MockTransport) -> DeviceConfig {
    mock.json(url("/.well-known/wot"), 200, lamp_td())
        .json(url("/properties/on"), 200, json!({"value": true}));
    DeviceConfig::new("lamp", BASE)
}

async fn next_event(rx: &mut broadcast::Receiver<PollEvent>) -> PollEvent {
    tokio::time::timeout(INTERVAL * 4, rx.recv())
        .await
        .expect("no poll event")
        .expect("channel closed")
}

#[tokio::test(start_paused = true)]
async fn test_add_device_registers_and_stores_first_data() {
    let mock = MockTransport::new();
    let service = WotService::new(mock.arc(), INTERVAL);

    let record = service.add_device(&weather_device(&mock)).await.unwrap();
    assert_eq!(record.device_id, "weather");
    assert_eq!(record.base_url, BASE);
    assert!(record.thing_description.is_some());
    assert!(service.registry().contains("weather").await);

    let latest = service.latest("weather").await.unwrap();
    assert_eq!(latest.get("temperature"), Some(&json!(22.5)));
    let snapshot = service.snapshot("weather").await.unwrap();
    assert!(snapshot.available);
    assert!(snapshot.last_updated.is_some());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_is_not_registered() {
    let mock = MockTransport::new();
    mock.set_offline(true);
    let service = WotService::new(mock.arc(), INTERVAL);

    let err = service
        .add_device(&DeviceConfig::new("dead", BASE))
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::UpdateFailed(_)));
    assert!(!service.registry().contains("dead").await);
    assert!(service.latest("dead").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_publishes_events() {
    let mock = MockTransport::new();
    let service = WotService::new(mock.arc(), INTERVAL);
    let mut rx = service.subscribe();
    service.add_device(&weather_device(&mock)).await.unwrap();

    mock.json(url("/properties/temperature"), 200, json!({"value": 24.0}));
    match next_event(&mut rx).await {
        PollEvent::Updated {
            device_id, data, ..
        } => {
            assert_eq!(device_id, "weather");
            assert_eq!(data.get("temperature"), Some(&json!(24.0)));
        }
        other => panic!("expected Updated, got {:?}", other),
    }
    assert_eq!(
        service.latest("weather").await.unwrap().get("temperature"),
        Some(&json!(24.0))
    );

    mock.set_offline(true);
    let event = next_event(&mut rx).await;
    assert!(matches!(event, PollEvent::UpdateFailed { .. }));

    let snapshot = service.snapshot("weather").await.unwrap();
    assert!(!snapshot.available);
    assert!(snapshot.last_error.is_some());
    assert_eq!(
        snapshot.data.unwrap().get("temperature"),
        Some(&json!(24.0))
    );

    mock.set_offline(false);
    assert!(next_event(&mut rx).await.is_success());
    assert!(service.snapshot("weather").await.unwrap().available);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_remove_device_stops_polling_and_services() {
    let mock = MockTransport::new();
    let service = WotService::new(mock.arc(), INTERVAL);
    service.add_device(&lamp_device(&mock)).await.unwrap();
    assert_eq!(
        service.services().await,
        vec![
            "lamp_setBrightness",
            "lamp_setColor",
            "lamp_status",
            "lamp_toggle"
        ]
    );

    let removed = service.remove_device("lamp").await.unwrap();
    assert_eq!(removed.device_id, "lamp");
    assert!(service.services().await.is_empty());
    assert!(service.latest("lamp").await.is_none());

    let err = service
        .call_service("lamp_toggle", &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WotError::NotFound(_)));
    assert!(matches!(
        service.remove_device("lamp").await,
        Err(WotError::NotFound(_))
    ));

    mock.clear_requests();
    tokio::time::sleep(INTERVAL * 3).await;
    assert!(mock.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_call_service_reaches_device() {
    let mock = MockTransport::new();
    let service = WotService::new(mock.arc(), INTERVAL);
    service.add_device(&lamp_device(&mock)).await.unwrap();
    mock.json(url("/actions/setBrightness"), 200, json!({"brightness": 50}));
    mock.clear_requests();

    let mut input = Map::new();
    input.insert("brightness".into(), json!(50));
    let outcome = service
        .call_service("lamp_setBrightness", &input)
        .await
        .unwrap();
    assert_eq!(outcome.response, Some(json!({"brightness": 50})));
    assert_eq!(mock.requests()[0].body, Some(json!({"brightness": 50})));

    input.insert("brightness".into(), json!(150));
    let err = service.invoke("lamp", "setBrightness", &input).await.unwrap_err();
    assert!(matches!(err, WotError::Validation(_)));

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_td_discovered_later_updates_registration() {
    let mock = MockTransport::new();
    mock.json(url("/state"), 200, json!({"on": false}));
    let service = WotService::new(mock.arc(), INTERVAL);
    let mut rx = service.subscribe();

    let record = service
        .add_device(&DeviceConfig::new("lamp", BASE))
        .await
        .unwrap();
    assert!(record.thing_description.is_none());
    assert!(service.services().await.is_empty());

    lamp_device(&mock);
    assert!(next_event(&mut rx).await.is_success());
    assert!(service.services().await.contains(&"lamp_toggle".to_string()));
    assert_eq!(
        service.latest("lamp").await.unwrap().get("on"),
        Some(&json!(true))
    );

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sensors_and_device_info() {
    let mock = MockTransport::new();
    let service = WotService::new(mock.arc(), INTERVAL);
    service.add_device(&weather_device(&mock)).await.unwrap();

    let info = service.device_info("weather").await.unwrap();
    assert_eq!(info.name, "Weather Station");

    let sensors = service.sensors("weather").await.unwrap();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].property_key, "temperature");
    assert_eq!(sensors[0].device_class(), Some(DeviceClass::Temperature));
    assert_eq!(sensors[1].device_class(), Some(DeviceClass::Humidity));

    let latest = service.latest("weather").await;
    assert_eq!(sensors[0].native_value(latest.as_ref()), Some(json!(22.5)));

    assert!(matches!(
        service.sensors("ghost").await,
        Err(WotError::NotFound(_))
    ));

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_add_devices_from_config() {
    let mock = MockTransport::new();
    weather_device(&mock);
    let config = WotConfig::from_toml_str(
        r#"
        poll_interval_secs = 60

        [[devices]]
        id = "weather"
        base_url = "http://device.local/"

        [[devices]]
        id = "offline"
        base_url = "http://offline.local"
        "#,
    )
    .unwrap();
    mock.unreachable("http://offline.local/.well-known/wot")
        .unreachable("http://offline.local/")
        .unreachable("http://offline.local/properties")
        .unreachable("http://offline.local/state");

    let service = WotService::from_config(&config, mock.arc());
    assert_eq!(service.poll_interval(), Duration::from_secs(60));

    let results = service.add_devices(&config).await;
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(WotError::UpdateFailed(_))));
    assert_eq!(service.registry().list_ids().await, vec!["weather"]);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_raised_and_polling_runs() {
    let mock = MockTransport::new();
    let service = WotService::new(mock.arc(), Duration::ZERO);
    assert_eq!(service.poll_interval(), Duration::from_secs(1));

    let mut rx = service.subscribe();
    service.add_device(&weather_device(&mock)).await.unwrap();
    let first_refresh = mock.requests().len();

    mock.set_offline(true);
    let event = next_event(&mut rx).await;
    assert!(matches!(event, PollEvent::UpdateFailed { .. }));
    assert!(mock.requests().len() > first_refresh);
    assert!(!service.snapshot("weather").await.unwrap().available);

    service.shutdown().await;
}

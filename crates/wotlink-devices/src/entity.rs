//! Sensor descriptors derived from polled devices.
//!
//! A host platform turns a polled device into entities: one sensor per TD
//! property, otherwise one per property found in the polled data, otherwise
//! a single `state` sensor. Descriptors carry what a host needs to present
//! them (stable id, unit, classification, extra attributes).

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::coordinator::PolledData;
use crate::td::ThingDescription;

const UNIQUE_ID_PREFIX: &str = "wot_http";

/// Sensor classification derived from the declared unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Temperature,
    Humidity,
    Pressure,
    Power,
}

impl DeviceClass {
    /// Classify a unit string. Names are never used, only units.
    pub fn from_unit(unit: &str) -> Option<Self> {
        let unit = unit.to_lowercase();
        let table: [(Self, &[&str]); 4] = [
            (Self::Temperature, &["°c", "°f", "celsius", "fahrenheit", "k", "kelvin"]),
            (Self::Humidity, &["%", "percent", "rh"]),
            (Self::Pressure, &["pa", "hpa", "kpa", "mbar", "bar", "mmhg", "inhg", "psi"]),
            (Self::Power, &["w", "watt", "kw", "kilowatt", "kwh", "wh"]),
        ];
        table
            .into_iter()
            .find(|(_, units)| units.contains(&unit.as_str()))
            .map(|(class, _)| class)
    }
}

/// Statistics classification of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateClass {
    Measurement,
}

/// Grouping information shared by all sensors of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub configuration_url: String,
}

/// Short stable hash of a base URL.
pub fn url_hash(base_url: &str) -> String {
    let digest = Sha256::digest(base_url.as_bytes());
    hex::encode(digest)[..8].to_string()
}

pub fn device_info(base_url: &str, td: Option<&ThingDescription>) -> DeviceInfo {
    let name = td
        .and_then(|td| td.title())
        .map(str::to_string)
        .unwrap_or_else(|| format!("WoT Device ({})", base_url));
    DeviceInfo {
        identifier: url_hash(base_url),
        name,
        manufacturer: "Web of Things",
        model: "WoT HTTP Device",
        configuration_url: base_url.to_string(),
    }
}

/// One sensor backed by a polled property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDescriptor {
    pub name: String,
    pub property_key: String,
    pub data_type: String,
    pub unit: Option<String>,
    pub unique_id: String,
}

impl SensorDescriptor {
    pub fn new(
        base_url: &str,
        name: impl Into<String>,
        property_key: impl Into<String>,
        data_type: impl Into<String>,
        unit: Option<String>,
    ) -> Self {
        let property_key = property_key.into();
        Self {
            unique_id: format!("{}_{}_{}", UNIQUE_ID_PREFIX, url_hash(base_url), property_key),
            name: name.into(),
            property_key,
            data_type: data_type.into(),
            unit,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self.data_type.as_str(), "number" | "integer")
    }

    /// Current value, coerced to the declared numeric type when possible.
    pub fn native_value(&self, data: Option<&PolledData>) -> Option<Value> {
        let mut value = data?.get(&self.property_key)?.clone();

        if let Some(inner) = value.as_object().and_then(|obj| obj.get("value")) {
            value = inner.clone();
        }

        if value.is_null() || !self.is_numeric() {
            return Some(value);
        }

        let as_float = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let coerced = match (self.data_type.as_str(), as_float) {
            ("integer", Some(f)) if f.is_finite() => Some(Value::from(f.trunc() as i64)),
            ("number", Some(f)) => serde_json::Number::from_f64(f).map(Value::Number),
            _ => None,
        };
        Some(coerced.unwrap_or(value))
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        if !self.is_numeric() {
            return None;
        }
        self.unit.as_deref().and_then(DeviceClass::from_unit)
    }

    pub fn state_class(&self) -> Option<StateClass> {
        self.is_numeric().then_some(StateClass::Measurement)
    }

    /// Extra attributes from the TD: location and Thing metadata.
    pub fn geo_attributes(&self, td: Option<&ThingDescription>) -> Option<Map<String, Value>> {
        let td = td?;
        let mut attributes = Map::new();

        if let Some((lat, lon)) = geo_location(td) {
            attributes.insert("latitude".into(), Value::from(lat));
            attributes.insert("longitude".into(), Value::from(lon));
        }
        if let Some(title) = td.get("title") {
            if title.as_str() != Some(self.name.as_str()) {
                attributes.insert("thing_title".into(), title.clone());
            }
        }
        if let Some(description) = td.get("description") {
            attributes.insert("thing_description".into(), description.clone());
        }

        (!attributes.is_empty()).then_some(attributes)
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Location of a Thing.
///
/// Checks `geo:lat`/`geo:long`, then `latitude`/`longitude`, then
/// `lat`/`lng`. The first pair present decides; an unparsable pair yields
/// no location.
pub fn geo_location(td: &ThingDescription) -> Option<(f64, f64)> {
    let pairs = [("geo:lat", "geo:long"), ("latitude", "longitude"), ("lat", "lng")];
    let (lat, lon) = pairs
        .iter()
        .find_map(|(lat_key, lon_key)| Some((td.get(lat_key)?, td.get(lon_key)?)))?;
    Some((coordinate(lat)?, coordinate(lon)?))
}

/// Sensors a host should create for a device.
pub fn describe_sensors(
    device_name: &str,
    base_url: &str,
    td: Option<&ThingDescription>,
    data: Option<&PolledData>,
) -> Vec<SensorDescriptor> {
    if let Some(td) = td.filter(|td| td.has_properties()) {
        return td
            .properties()
            .into_iter()
            .map(|(name, prop)| {
                let title = prop.title.clone().unwrap_or_else(|| name.clone());
                let data_type = prop.data_type().to_string();
                SensorDescriptor::new(base_url, title, name, data_type, prop.unit)
            })
            .collect();
    }

    if let Some(properties) = data
        .and_then(|d| d.get("properties"))
        .and_then(Value::as_object)
    {
        return properties
            .iter()
            .map(|(name, info)| {
                let field = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);
                SensorDescriptor::new(
                    base_url,
                    field("title").unwrap_or_else(|| name.clone()),
                    name.clone(),
                    field("type").unwrap_or_else(|| "string".to_string()),
                    field("unit"),
                )
            })
            .collect();
    }

    vec![SensorDescriptor::new(base_url, device_name, "state", "string", None)]
}

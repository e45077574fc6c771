//! Thing Description model and shape-sniffing.
//!
//! Devices in the wild serve anything from fully compliant WoT 1.1 documents to
//! a bare `{"properties": {...}}`. The TD is therefore kept as the raw JSON
//! object it was fetched as, and typed views ([`PropertyDef`], [`ActionDef`])
//! are read out of it leniently: a field with the wrong JSON type is treated
//! as absent instead of rejecting the whole document.
//!
//! [`looks_like_td`] decides whether an arbitrary JSON document is a TD from
//! four independent predicates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, OneOrMany};

use crate::error::{WotError, WotResult};
use crate::url::{resolve_url, starts_with_ignore_case};

/// Form operation for reading a property.
pub const OP_READ_PROPERTY: &str = "readproperty";
/// Form operation for writing a property.
pub const OP_WRITE_PROPERTY: &str = "writeproperty";
/// Form operation for invoking an action.
pub const OP_INVOKE_ACTION: &str = "invokeaction";

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// One operation or a list of them.
#[serde_as]
#[derive(Deserialize)]
#[serde(transparent)]
struct Ops(#[serde_as(as = "OneOrMany<_>")] Vec<String>);

/// `op` as one string or a list of strings; any other shape reads as no ops.
fn lenient_ops<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value::<Ops>(value)
        .map(|ops| ops.0)
        .unwrap_or_default())
}

fn lenient_forms<'de, D>(deserializer: D) -> Result<Vec<Form>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// A WoT 1.1 form: where and how an affordance can be reached.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Form {
    pub href: String,

    #[serde(default, deserialize_with = "lenient_ops")]
    pub op: Vec<String>,
}

impl Form {
    fn is_websocket(&self) -> bool {
        starts_with_ignore_case(&self.href, "ws://") || starts_with_ignore_case(&self.href, "wss://")
    }

    /// Whether the form can be used for a plain HTTP property read.
    pub fn supports_http_read(&self) -> bool {
        !self.is_websocket()
            && (self.op.is_empty() || self.op.iter().any(|op| op == OP_READ_PROPERTY))
    }
}

/// Property affordance as declared in a Thing Description.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PropertyDef {
    /// WoT data type (`string`, `number`, `integer`, `boolean`)
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub data_type: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub unit: Option<String>,

    /// WoT 1.0 style direct link
    #[serde(default, deserialize_with = "lenient")]
    pub href: Option<String>,

    /// WoT 1.1 style forms
    #[serde(default, deserialize_with = "lenient_forms")]
    pub forms: Vec<Form>,

    #[serde(default, deserialize_with = "lenient")]
    pub minimum: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    pub maximum: Option<f64>,

    #[serde(rename = "enum", default, deserialize_with = "lenient")]
    pub allowed: Option<Vec<Value>>,
}

impl PropertyDef {
    /// Declared type, defaulting to `string`.
    pub fn data_type(&self) -> &str {
        self.data_type.as_deref().unwrap_or("string")
    }
}

/// Input description of an action.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionInput {
    /// Field name to JSON-schema-like field description
    #[serde(default, deserialize_with = "lenient")]
    pub properties: Option<Map<String, Value>>,

    #[serde(default, deserialize_with = "lenient")]
    pub required: Option<Vec<String>>,
}

impl ActionInput {
    pub fn is_required(&self, field: &str) -> bool {
        self.required
            .as_ref()
            .is_some_and(|names| names.iter().any(|n| n == field))
    }
}

/// Action affordance as declared in a Thing Description.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionDef {
    #[serde(default, deserialize_with = "lenient")]
    pub href: Option<String>,

    #[serde(default, deserialize_with = "lenient_ops")]
    pub op: Vec<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub input: Option<ActionInput>,
}

impl ActionDef {
    /// First declared operation, `invokeaction` when none is given.
    pub fn operation(&self) -> &str {
        self.op.first().map(String::as_str).unwrap_or(OP_INVOKE_ACTION)
    }

    /// Declared input fields, if the action has an input schema with properties.
    pub fn input_properties(&self) -> Option<&Map<String, Value>> {
        self.input.as_ref().and_then(|input| input.properties.as_ref())
    }
}

/// A fetched Thing Description.
///
/// Immutable once constructed; devices share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ThingDescription {
    raw: Map<String, Value>,
}

impl ThingDescription {
    /// Wrap a JSON document. Fails if it is not an object.
    pub fn from_value(doc: Value) -> WotResult<Self> {
        match doc {
            Value::Object(raw) => Ok(Self { raw }),
            other => Err(WotError::Parse(format!(
                "Thing Description must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.raw.get("title").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.raw.get("description").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Whether the document carries a `properties` object.
    pub fn has_properties(&self) -> bool {
        self.raw.get("properties").is_some_and(Value::is_object)
    }

    /// Properties in document order.
    pub fn properties(&self) -> Vec<(String, PropertyDef)> {
        affordances(&self.raw, "properties")
    }

    /// Actions in document order.
    pub fn actions(&self) -> Vec<(String, ActionDef)> {
        affordances(&self.raw, "actions")
    }

    pub fn action(&self, name: &str) -> Option<ActionDef> {
        self.raw
            .get("actions")
            .and_then(Value::as_object)
            .and_then(|actions| actions.get(name))
            .and_then(|def| serde_json::from_value(def.clone()).ok())
    }

    pub fn has_actions(&self) -> bool {
        self.raw
            .get("actions")
            .and_then(Value::as_object)
            .is_some_and(|actions| !actions.is_empty())
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.raw.clone())
    }
}

fn affordances<T: DeserializeOwned>(raw: &Map<String, Value>, key: &str) -> Vec<(String, T)> {
    raw.get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(name, def)| {
                    let parsed = serde_json::from_value(def.clone()).ok()?;
                    Some((name.clone(), parsed))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `@context` key present.
pub fn has_context(doc: &Map<String, Value>) -> bool {
    doc.contains_key("@context")
}

/// `properties` key present and an object.
pub fn has_properties(doc: &Map<String, Value>) -> bool {
    doc.get("properties").is_some_and(Value::is_object)
}

/// `title` key present.
pub fn has_title(doc: &Map<String, Value>) -> bool {
    doc.contains_key("title")
}

/// `@type` is `Thing` or mentions it.
pub fn has_type_thing(doc: &Map<String, Value>) -> bool {
    match doc.get("@type") {
        None => false,
        Some(Value::String(s)) => s.contains("Thing"),
        Some(other) => other.to_string().contains("Thing"),
    }
}

/// Heuristically decide whether `doc` is a Thing Description.
///
/// Requires a TD marker (`@context` or a `properties` object) plus some
/// identity (`title`, a `Thing` type, or the properties themselves).
pub fn looks_like_td(doc: &Value) -> bool {
    let Some(obj) = doc.as_object() else {
        return false;
    };

    let has_properties = has_properties(obj);
    (has_context(obj) || has_properties) && (has_title(obj) || has_type_thing(obj) || has_properties)
}

/// Derive the URL used to read property `name`.
///
/// WoT 1.0 `href` wins, then the first usable WoT 1.1 form, then the
/// conventional `/properties/{name}` endpoint.
pub fn property_url(base_url: &str, name: &str, prop: &PropertyDef) -> String {
    if let Some(href) = &prop.href {
        return resolve_url(base_url, href);
    }

    if let Some(form) = prop.forms.iter().find(|form| form.supports_http_read()) {
        return resolve_url(base_url, &form.href);
    }

    format!("{}/properties/{}", base_url.trim_end_matches('/'), name)
}

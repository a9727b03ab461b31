//! Telemetry batch model
//!
//! A `TelemetryBatch` carries one signal (logs, metrics, or traces) grouped
//! by the resource that produced it. The resource is the unit the exporter
//! routes on: every record below one `ResourceTelemetry` lands in the same
//! destination file.
//!
//! ```text
//! TelemetryBatch
//! └── ResourceTelemetry (resource attributes: service.name, host.name, ...)
//!     └── TelemetryRecord (one log line / data point / span)
//! ```
//!
//! The structs derive both `prost::Message` and serde so the same model
//! backs the `proto` and `json` wire formats.

use serde::{Deserialize, Serialize};

/// Kind of telemetry carried by a batch
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ::prost::Enumeration,
    Serialize,
    Deserialize,
)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Unspecified = 0,
    Logs = 1,
    Metrics = 2,
    Traces = 3,
}

impl Signal {
    /// Lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Logs => "logs",
            Self::Metrics => "metrics",
            Self::Traces => "traces",
        }
    }
}

/// Attribute value
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AnyValue {
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4")]
    pub value: Option<any_value::Value>,
}

pub mod any_value {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, ::prost::Oneof, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringValue(String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
    }
}

impl AnyValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: Some(any_value::Value::StringValue(value.into())),
        }
    }

    pub fn int(value: i64) -> Self {
        Self {
            value: Some(any_value::Value::IntValue(value)),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            value: Some(any_value::Value::BoolValue(value)),
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(any_value::Value::StringValue(s)) => Some(s),
            _ => None,
        }
    }
}

/// Key/value attribute pair
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,

    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: AnyValue) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    /// Shorthand for a string attribute
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, AnyValue::string(value))
    }
}

/// The entity that produced a group of records
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    #[prost(message, repeated, tag = "1")]
    pub attributes: Vec<KeyValue>,
}

impl Resource {
    pub fn with_attributes(attributes: Vec<KeyValue>) -> Self {
        Self { attributes }
    }

    /// Look up an attribute by key (first match wins)
    pub fn attribute(&self, key: &str) -> Option<&AnyValue> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .and_then(|kv| kv.value.as_ref())
    }

    /// Remove every attribute named `key`, returning the first removed value
    pub fn remove_attribute(&mut self, key: &str) -> Option<AnyValue> {
        let mut removed = None;
        self.attributes.retain_mut(|kv| {
            if kv.key != key {
                return true;
            }
            if removed.is_none() {
                removed = kv.value.take();
            }
            false
        });
        removed
    }
}

/// One log line, data point, or span
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRecord {
    #[prost(fixed64, tag = "1")]
    pub time_unix_nano: u64,

    /// Severity text, metric name, or span name
    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(string, tag = "3")]
    pub body: String,

    #[prost(message, repeated, tag = "4")]
    pub attributes: Vec<KeyValue>,
}

impl TelemetryRecord {
    pub fn new(time_unix_nano: u64, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            time_unix_nano,
            name: name.into(),
            body: body.into(),
            attributes: Vec::new(),
        }
    }
}

/// Records sharing a resource
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTelemetry {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,

    #[prost(message, repeated, tag = "2")]
    pub records: Vec<TelemetryRecord>,
}

impl ResourceTelemetry {
    pub fn new(resource: Resource, records: Vec<TelemetryRecord>) -> Self {
        Self {
            resource: Some(resource),
            records,
        }
    }

    /// Non-empty string value of a resource attribute
    ///
    /// Non-string and empty values count as absent.
    pub fn routing_value(&self, key: &str) -> Option<&str> {
        self.resource
            .as_ref()?
            .attribute(key)?
            .as_str()
            .filter(|v| !v.is_empty())
    }

    /// Remove a resource attribute before serialization
    pub fn strip_attribute(&mut self, key: &str) -> Option<AnyValue> {
        self.resource.as_mut()?.remove_attribute(key)
    }
}

/// A batch of telemetry delivered by the upstream pipeline
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryBatch {
    #[prost(enumeration = "Signal", tag = "1")]
    pub signal: i32,

    #[prost(message, repeated, tag = "2")]
    pub resources: Vec<ResourceTelemetry>,
}

impl TelemetryBatch {
    pub fn new(signal: Signal, resources: Vec<ResourceTelemetry>) -> Self {
        Self {
            signal: signal as i32,
            resources,
        }
    }

    /// Total number of records across all resources
    pub fn record_count(&self) -> usize {
        self.resources.iter().map(|r| r.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version stamped on every item that enters the pipeline without one.
pub const SCHEMA_VERSION: &str = "4.0";

/// Returns the current UTC time in the RFC 3339 form used for [`TelemetryItem::time`].
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
/// A single telemetry event travelling through the plugin pipeline.
///
/// All fields are optional on the way in; the core fills `iKey`, `time` and `ver`
/// before validation, after which `name`, `time` and `iKey` are guaranteed.
pub struct TelemetryItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Instrumentation key identifying the destination resource.
    #[serde(rename = "iKey", skip_serializing_if = "Option::is_none")]
    pub ikey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "ver", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "baseType", skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    #[serde(rename = "baseData", skip_serializing_if = "Option::is_none")]
    pub base_data: Option<Value>,
    /// Context tags, e.g. session or device identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
    /// Custom properties attached by the caller or by plugins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl TelemetryItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_ikey(mut self, ikey: impl Into<String>) -> Self {
        self.ikey = Some(ikey.into());
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn with_base(mut self, base_type: impl Into<String>, base_data: Value) -> Self {
        self.base_type = Some(base_type.into());
        self.base_data = Some(base_data);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.get_or_insert_with(Map::new).insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.get_or_insert_with(Map::new).insert(key.into(), value.into());
        self
    }

    pub fn has_name(&self) -> bool {
        is_present(&self.name)
    }

    pub fn has_ikey(&self) -> bool {
        is_present(&self.ikey)
    }

    pub fn has_time(&self) -> bool {
        is_present(&self.time)
    }

    /// Fills the instrumentation key, timestamp and schema version where absent.
    pub fn apply_defaults(&mut self, ikey: &str) {
        if !self.has_ikey() {
            self.ikey = Some(ikey.to_string());
        }
        if !self.has_time() {
            self.time = Some(current_timestamp());
        }
        if !is_present(&self.version) {
            self.version = Some(SCHEMA_VERSION.to_string());
        }
    }
}

// Empty strings are treated the same as missing values.
fn is_present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|value| !value.is_empty())
}

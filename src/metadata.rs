//! Descriptive metadata for recordings, clocks and signals
//!
//! Each entity has a struct of well-known fields plus a `properties` map
//! for anything else, keyed by predicate URI. The whole description is
//! stored in the container's metadata slot as JSON.

use crate::storage::error::StoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mimetype of descriptions written by this crate
pub const METADATA_MIMETYPE: &str = "application/json";

/// Typed value of an extension property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Decimal(f64),
    /// Seconds
    Duration(f64),
    Uri(String),
    UriSet(BTreeSet<String>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) | PropertyValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            PropertyValue::Decimal(v) | PropertyValue::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uri_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            PropertyValue::UriSet(set) => Some(set),
            _ => None,
        }
    }
}

/// Extension properties keyed by predicate URI
pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starttime: Option<DateTime<Utc>>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl RecordingInfo {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockInfo {
    pub uri: String,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub uri: String,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// URI of the timing clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

/// Everything stored in the metadata slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingDescription {
    pub recording: RecordingInfo,
    #[serde(default)]
    pub clocks: BTreeMap<String, ClockInfo>,
    #[serde(default)]
    pub signals: BTreeMap<String, SignalInfo>,
}

impl RecordingDescription {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            recording: RecordingInfo::new(uri),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

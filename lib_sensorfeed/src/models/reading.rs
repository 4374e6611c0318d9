//! # Sensor Reading
//!
//! A single timestamped observation. Readings are immutable once built: every
//! inbound frame produces a new value and older values are only ever
//! superseded, never edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One sensor observation as it travels over the wire and through the store.
///
/// Field names follow the backend's snake_case JSON. `sensorId`, `createdAt`
/// and `updatedAt` are accepted as aliases on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(alias = "sensorId")]
    sensor_id: String,
    value: f64,
    /// Kept exactly as received; see [`Reading::timestamp_utc`] for a parsed view.
    timestamp: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    metadata: Map<String, Value>,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl Reading {
    /// Creates a reading without identity, metadata or audit timestamps.
    pub fn new(sensor_id: impl Into<String>, value: f64, timestamp: impl Into<String>) -> Self {
        Self {
            id: None,
            sensor_id: sensor_id.into(),
            value,
            timestamp: timestamp.into(),
            metadata: Map::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_audit(mut self, created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self.updated_at = Some(updated_at.into());
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// The timestamp parsed as RFC 3339, or `None` if the source sent something else.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }

    /// Checks the invariants the backend enforces when a reading is created.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.sensor_id.trim().is_empty() {
            return Err("sensor_id cannot be empty");
        }
        if !self.value.is_finite() {
            return Err("value must be a finite number");
        }
        Ok(())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

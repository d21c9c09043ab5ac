//! Provider status payloads.
//!
//! Decoding is lenient below the status field: a descriptor that
//! cannot be decoded is dropped on its own instead of failing the whole batch,
//! and every descriptor field is optional.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::TaskStatus;

/// The `data` object of a status query response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub response: Option<StatusResponse>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default, rename = "sunoData", deserialize_with = "lenient_descriptors")]
    pub descriptors: Vec<MediaDescriptor>,
}

/// One media item as the provider describes it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "audio_url")]
    pub audio_url: Option<String>,
    #[serde(default, alias = "stream_audio_url")]
    pub stream_audio_url: Option<String>,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(default, alias = "model_name")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub create_time: Option<Value>,
}

impl StatusPayload {
    /// A payload carrying only a status, as produced by tests and simple providers.
    pub fn status_only(status: impl Into<TaskStatus>) -> Self {
        Self {
            task_id: None,
            status: status.into(),
            response: None,
            error_message: None,
        }
    }

    pub fn with_descriptors(mut self, descriptors: Vec<MediaDescriptor>) -> Self {
        self.response = Some(StatusResponse { descriptors });
        self
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn descriptors(&self) -> &[MediaDescriptor] {
        self.response
            .as_ref()
            .map(|r| r.descriptors.as_slice())
            .unwrap_or(&[])
    }
}

impl MediaDescriptor {
    /// Provider creation time: RFC 3339 text or epoch milliseconds.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.create_time.as_ref()? {
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        }
    }
}

fn lenient_descriptors<'de, D>(deserializer: D) -> Result<Vec<MediaDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

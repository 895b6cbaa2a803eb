//! Health metric readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single health reading. Any of the three measurements may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct HealthMetric {
    pub id: i64,
    /// Owner's username, filled in by the server.
    #[serde(default)]
    pub user: Option<String>,
    /// Body weight. The server stores a decimal and may send it as a string.
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub steps: Option<u32>,
    /// Beats per minute.
    #[serde(default)]
    pub heart_rate: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /metrics/` and `PATCH /metrics/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewMetric {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Every metric field is optional, so a partial update has the same shape.
pub type MetricPatch = NewMetric;

fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Number(f64),
        Text(String),
    }

    match Option::<Decimal>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Decimal::Number(n)) => Ok(Some(n)),
        Some(Decimal::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Decimal::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

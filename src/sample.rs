//! Sensor samples and transport payload parsing.
//!
//! A transport message carries a batch of raw readings from several sensors, each tagged
//! with a nanosecond timestamp and a sensor name:
//!
//! ```text
//! {
//!   "messageId": 12,
//!   "sessionId": "6f0c...",
//!   "payload": [
//!     {"time": 1700000000000000000, "name": "accelerometer", "values": {"x": 0.1, "y": 0.2, "z": 9.8}},
//!     {"time": 1700000000000000000, "name": "wrist motion", "values": {"rotationRateX": 1.5}}
//!   ]
//! }
//! ```
//!
//! Parsing is lenient at the sample level: a reading with a missing `time`, missing
//! `values`, an unknown `name`, or a missing axis is skipped on its own and never aborts
//! the rest of the batch.

use crate::error::{AppResult, SwingError};
use crate::math;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Kind of sensor that produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Calibrated accelerometer
    Accelerometer,
    /// Raw accelerometer
    AccelerometerUncalibrated,
    /// Calibrated gyroscope
    Gyroscope,
    /// Raw gyroscope, used only where no calibrated reading exists
    GyroscopeUncalibrated,
    /// Wrist-worn device motion; only its rotation rate is used
    WristMotion,
}

impl SensorKind {
    /// Maps a transport sensor name onto a kind. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "accelerometer" => Some(SensorKind::Accelerometer),
            "accelerometeruncalibrated" => Some(SensorKind::AccelerometerUncalibrated),
            "gyroscope" => Some(SensorKind::Gyroscope),
            "gyroscopeuncalibrated" => Some(SensorKind::GyroscopeUncalibrated),
            "wrist motion" => Some(SensorKind::WristMotion),
            _ => None,
        }
    }

    /// Transport name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::AccelerometerUncalibrated => "accelerometeruncalibrated",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::GyroscopeUncalibrated => "gyroscopeuncalibrated",
            SensorKind::WristMotion => "wrist motion",
        }
    }
}

/// A three-axis reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X axis
    pub x: f64,
    /// Y axis
    pub y: f64,
    /// Z axis
    pub z: f64,
}

impl Vec3 {
    /// All-zero reading used before a channel has been observed.
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Creates a reading from its components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm.
    pub fn magnitude(&self) -> f64 {
        math::magnitude(self.x, self.y, self.z)
    }
}

/// One sensor reading. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Instant the reading was taken, nanosecond precision
    pub timestamp: DateTime<Utc>,
    /// Producing sensor
    pub kind: SensorKind,
    /// Reading, remapped onto three axes
    pub values: Vec3,
}

impl Sample {
    /// Creates a sample.
    pub fn new(timestamp: DateTime<Utc>, kind: SensorKind, values: Vec3) -> Self {
        Self {
            timestamp,
            kind,
            values,
        }
    }

    /// Interprets one raw JSON reading. Returns `None` if it is malformed or of an
    /// unknown kind.
    pub fn from_json(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let timestamp = obj.get("time").and_then(parse_nanos)?;
        let kind = obj
            .get("name")
            .and_then(Value::as_str)
            .and_then(SensorKind::from_name)?;
        let values = obj.get("values").and_then(Value::as_object)?;

        let values = match kind {
            SensorKind::WristMotion => Vec3::new(
                axis_or_zero(values, "rotationRateX"),
                axis_or_zero(values, "rotationRateY"),
                axis_or_zero(values, "rotationRateZ"),
            ),
            _ => Vec3::new(
                axis(values, "x")?,
                axis(values, "y")?,
                axis(values, "z")?,
            ),
        };

        Some(Self::new(timestamp, kind, values))
    }

    /// Encodes the sample in transport form.
    pub fn to_json(&self) -> Value {
        let values = match self.kind {
            SensorKind::WristMotion => serde_json::json!({
                "rotationRateX": self.values.x,
                "rotationRateY": self.values.y,
                "rotationRateZ": self.values.z,
            }),
            _ => serde_json::json!({
                "x": self.values.x,
                "y": self.values.y,
                "z": self.values.z,
            }),
        };
        serde_json::json!({
            "time": self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            "name": self.kind.name(),
            "values": values,
        })
    }
}

fn parse_nanos(value: &Value) -> Option<DateTime<Utc>> {
    let nanos = value
        .as_i64()
        .or_else(|| value.as_u64().and_then(|n| i64::try_from(n).ok()))
        .or_else(|| value.as_f64().map(|f| f as i64))?;
    Some(DateTime::<Utc>::from_timestamp_nanos(nanos))
}

fn axis(values: &Map<String, Value>, key: &str) -> Option<f64> {
    values.get(key).and_then(Value::as_f64)
}

fn axis_or_zero(values: &Map<String, Value>, key: &str) -> f64 {
    axis(values, key).unwrap_or(0.0)
}

/// Converts a sequence of raw readings into samples, skipping malformed ones.
pub fn parse_samples(raw: &[Value]) -> Vec<Sample> {
    let samples: Vec<Sample> = raw.iter().filter_map(Sample::from_json).collect();
    let skipped = raw.len() - samples.len();
    if skipped > 0 {
        debug!(skipped, total = raw.len(), "Skipped malformed or unknown samples");
    }
    samples
}

/// Parses a transport message.
///
/// Accepts either an envelope object with a `payload` array or a bare array of
/// readings. Only an unreadable message as a whole is an error.
pub fn parse_payload(bytes: &[u8]) -> AppResult<Vec<Sample>> {
    let message: Value = serde_json::from_slice(bytes)?;
    match message {
        Value::Array(raw) => Ok(parse_samples(&raw)),
        Value::Object(mut envelope) => match envelope.remove("payload") {
            Some(Value::Array(raw)) => {
                debug!(
                    message_id = ?envelope.get("messageId"),
                    session_id = ?envelope.get("sessionId"),
                    readings = raw.len(),
                    "Received payload"
                );
                Ok(parse_samples(&raw))
            }
            Some(_) => Err(SwingError::MalformedPayload(
                "'payload' is not an array".to_string(),
            )),
            None => Err(SwingError::MalformedPayload(
                "missing 'payload' field".to_string(),
            )),
        },
        _ => Err(SwingError::MalformedPayload(
            "expected an object or an array".to_string(),
        )),
    }
}

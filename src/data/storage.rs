//! Durable recording form and storage writers.
//!
//! A finished recording is persisted as one self-describing JSON document:
//!
//! ```text
//! {
//!   "metadata": {"recording_id", "start_time", "end_time", "duration", "samples"},
//!   "signals":  {"time": [...], "accel_x": [...], ..., "rotation_rate_z": [...]},
//!   "metrics":  {"swing_feedback": "...", "heel_strike_time": "...", ...}
//! }
//! ```
//!
//! Timestamps are RFC 3339 with nanoseconds, so parsing a file back yields the same
//! instants. A recording that was never analyzed carries an empty `metrics` object.
//!
//! Writers implement [`RecordingSink`]; [`sink_from_config`] picks them from
//! [`StorageConfig`].
use crate::{
    analysis::Metrics,
    config::{StorageConfig, StorageFormat},
    error::{AppResult, SwingError},
    recording::{AxisSeries, Recording, SignalArrays},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// `metadata` section of the persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Recording identifier
    #[serde(default = "Uuid::new_v4")]
    pub recording_id: Uuid,
    /// Start command instant
    pub start_time: DateTime<Utc>,
    /// Stop command instant
    pub end_time: Option<DateTime<Utc>>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Captured frame count
    pub samples: usize,
    /// Whether the wrist stream reported during capture, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrist_observed: Option<bool>,
}

/// `signals` section: one column per channel axis, aligned to `time`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSignals {
    /// Frame instants
    pub time: Vec<DateTime<Utc>>,
    /// Calibrated acceleration, x
    pub accel_x: Vec<f64>,
    /// Calibrated acceleration, y
    pub accel_y: Vec<f64>,
    /// Calibrated acceleration, z
    pub accel_z: Vec<f64>,
    /// Raw acceleration, x
    pub accel_uncal_x: Vec<f64>,
    /// Raw acceleration, y
    pub accel_uncal_y: Vec<f64>,
    /// Raw acceleration, z
    pub accel_uncal_z: Vec<f64>,
    /// Hip rotation rate, x
    pub gyro_x: Vec<f64>,
    /// Hip rotation rate, y
    pub gyro_y: Vec<f64>,
    /// Hip rotation rate, z
    pub gyro_z: Vec<f64>,
    /// Wrist rotation rate, x
    pub rotation_rate_x: Vec<f64>,
    /// Wrist rotation rate, y
    pub rotation_rate_y: Vec<f64>,
    /// Wrist rotation rate, z
    pub rotation_rate_z: Vec<f64>,
}

impl PersistedSignals {
    fn columns(&self) -> [(&'static str, &[f64]); 12] {
        [
            ("accel_x", self.accel_x.as_slice()),
            ("accel_y", self.accel_y.as_slice()),
            ("accel_z", self.accel_z.as_slice()),
            ("accel_uncal_x", self.accel_uncal_x.as_slice()),
            ("accel_uncal_y", self.accel_uncal_y.as_slice()),
            ("accel_uncal_z", self.accel_uncal_z.as_slice()),
            ("gyro_x", self.gyro_x.as_slice()),
            ("gyro_y", self.gyro_y.as_slice()),
            ("gyro_z", self.gyro_z.as_slice()),
            ("rotation_rate_x", self.rotation_rate_x.as_slice()),
            ("rotation_rate_y", self.rotation_rate_y.as_slice()),
            ("rotation_rate_z", self.rotation_rate_z.as_slice()),
        ]
    }
}

impl From<&SignalArrays> for PersistedSignals {
    fn from(signals: &SignalArrays) -> Self {
        Self {
            time: signals.time.clone(),
            accel_x: signals.accel.x.clone(),
            accel_y: signals.accel.y.clone(),
            accel_z: signals.accel.z.clone(),
            accel_uncal_x: signals.accel_uncal.x.clone(),
            accel_uncal_y: signals.accel_uncal.y.clone(),
            accel_uncal_z: signals.accel_uncal.z.clone(),
            gyro_x: signals.gyro.x.clone(),
            gyro_y: signals.gyro.y.clone(),
            gyro_z: signals.gyro.z.clone(),
            rotation_rate_x: signals.rotation_rate.x.clone(),
            rotation_rate_y: signals.rotation_rate.y.clone(),
            rotation_rate_z: signals.rotation_rate.z.clone(),
        }
    }
}

impl TryFrom<PersistedSignals> for SignalArrays {
    type Error = SwingError;

    fn try_from(signals: PersistedSignals) -> AppResult<Self> {
        let len = signals.time.len();
        if let Some((name, column)) = signals
            .columns()
            .into_iter()
            .find(|(_, column)| column.len() != len)
        {
            return Err(SwingError::Storage(format!(
                "signal column '{}' has {} values, expected {}",
                name,
                column.len(),
                len
            )));
        }

        let axis = |x: Vec<f64>, y: Vec<f64>, z: Vec<f64>| AxisSeries { x, y, z };
        Ok(SignalArrays {
            time: signals.time,
            accel: axis(signals.accel_x, signals.accel_y, signals.accel_z),
            accel_uncal: axis(
                signals.accel_uncal_x,
                signals.accel_uncal_y,
                signals.accel_uncal_z,
            ),
            gyro: axis(signals.gyro_x, signals.gyro_y, signals.gyro_z),
            rotation_rate: axis(
                signals.rotation_rate_x,
                signals.rotation_rate_y,
                signals.rotation_rate_z,
            ),
        })
    }
}

/// The persisted form of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecording {
    /// Timing and size
    pub metadata: RecordingMetadata,
    /// Channel arrays
    pub signals: PersistedSignals,
    /// Flat metrics, `{}` when absent
    #[serde(default, with = "metrics_section")]
    pub metrics: Option<Metrics>,
}

impl From<&Recording> for PersistedRecording {
    fn from(recording: &Recording) -> Self {
        Self {
            metadata: RecordingMetadata {
                recording_id: recording.id,
                start_time: recording.start_time,
                end_time: recording.end_time,
                duration: recording.duration_s,
                samples: recording.sample_count,
                wrist_observed: recording.wrist_observed,
            },
            signals: PersistedSignals::from(&recording.signals),
            metrics: recording.metrics.clone(),
        }
    }
}

impl TryFrom<PersistedRecording> for Recording {
    type Error = SwingError;

    fn try_from(persisted: PersistedRecording) -> AppResult<Self> {
        let signals = SignalArrays::try_from(persisted.signals)?;
        Ok(Recording {
            id: persisted.metadata.recording_id,
            start_time: persisted.metadata.start_time,
            end_time: persisted.metadata.end_time,
            duration_s: persisted.metadata.duration,
            sample_count: signals.len(),
            signals,
            wrist_observed: persisted.metadata.wrist_observed,
            metrics: persisted.metrics,
        })
    }
}

/// Serializes absent metrics as an empty object and reads `{}` back as absent.
mod metrics_section {
    use crate::analysis::Metrics;
    use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{Map, Value};

    pub fn serialize<S: Serializer>(metrics: &Option<Metrics>, s: S) -> Result<S::Ok, S::Error> {
        match metrics {
            Some(metrics) => metrics.serialize(s),
            None => s.serialize_map(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Metrics>, D::Error> {
        let section = Option::<Map<String, Value>>::deserialize(d)?;
        match section {
            Some(map) if !map.is_empty() => Metrics::deserialize(Value::Object(map))
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Encode a recording in its persisted JSON form.
pub fn to_json_pretty(recording: &Recording) -> AppResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&PersistedRecording::from(recording))?)
}

/// Decode a persisted JSON document.
pub fn parse_recording(bytes: &[u8]) -> AppResult<Recording> {
    let persisted: PersistedRecording = serde_json::from_slice(bytes)?;
    Recording::try_from(persisted)
}

/// Read a persisted recording from disk.
pub async fn load_recording(path: impl AsRef<Path>) -> AppResult<Recording> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    let recording = parse_recording(&bytes)?;
    debug!(path = %path.display(), samples = recording.sample_count, "Loaded recording");
    Ok(recording)
}

/// Base file name of a recording, derived from its start time.
pub fn file_stem(recording: &Recording) -> String {
    format!("recording_{}", recording.start_time.format("%Y%m%d_%H%M%S"))
}

/// Destination for finished recordings.
#[async_trait]
pub trait RecordingSink: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Write one recording, returning the path written.
    async fn persist(&self, recording: &Recording) -> AppResult<PathBuf>;
}

/// Writes the full persisted JSON document.
#[derive(Debug, Clone)]
pub struct JsonRecordingWriter {
    output_dir: PathBuf,
}

impl JsonRecordingWriter {
    /// Writer into `output_dir`, created on first use.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl RecordingSink for JsonRecordingWriter {
    fn name(&self) -> &str {
        "json"
    }

    async fn persist(&self, recording: &Recording) -> AppResult<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("{}.json", file_stem(recording)));
        tokio::fs::write(&path, to_json_pretty(recording)?).await?;
        info!(
            recording_id = %recording.id,
            path = %path.display(),
            "Recording saved"
        );
        Ok(path)
    }
}

/// Writes the signal table as CSV. Metrics are not included.
#[cfg(feature = "storage_csv")]
#[derive(Debug, Clone)]
pub struct CsvRecordingWriter {
    output_dir: PathBuf,
}

#[cfg(feature = "storage_csv")]
impl CsvRecordingWriter {
    /// Writer into `output_dir`, created on first use.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn encode(recording: &Recording) -> AppResult<Vec<u8>> {
        let signals = PersistedSignals::from(&recording.signals);
        let columns = signals.columns();

        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec!["time"];
        header.extend(columns.iter().map(|(name, _)| *name));
        writer.write_record(&header)?;

        for (i, time) in signals.time.iter().enumerate() {
            let mut row = Vec::with_capacity(columns.len() + 1);
            row.push(time.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true));
            for (_, column) in &columns {
                row.push(column.get(i).map(f64::to_string).unwrap_or_default());
            }
            writer.write_record(&row)?;
        }

        writer
            .into_inner()
            .map_err(|e| SwingError::Storage(format!("Failed to flush CSV: {}", e)))
    }
}

#[cfg(feature = "storage_csv")]
#[async_trait]
impl RecordingSink for CsvRecordingWriter {
    fn name(&self) -> &str {
        "csv"
    }

    async fn persist(&self, recording: &Recording) -> AppResult<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("{}_signals.csv", file_stem(recording)));
        tokio::fs::write(&path, Self::encode(recording)?).await?;
        info!(
            recording_id = %recording.id,
            path = %path.display(),
            "Signal table saved"
        );
        Ok(path)
    }
}

/// Fans one recording out to several sinks. Returns the first sink's path.
pub struct CompositeSink {
    sinks: Vec<Arc<dyn RecordingSink>>,
}

impl CompositeSink {
    /// Combine sinks, persisted in order.
    pub fn new(sinks: Vec<Arc<dyn RecordingSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl RecordingSink for CompositeSink {
    fn name(&self) -> &str {
        "composite"
    }

    async fn persist(&self, recording: &Recording) -> AppResult<PathBuf> {
        let mut first = None;
        for sink in &self.sinks {
            let path = sink.persist(recording).await?;
            if first.is_none() {
                first = Some(path);
            }
        }
        first.ok_or_else(|| SwingError::Storage("no sinks configured".to_string()))
    }
}

/// Build the sink described by `config`, or `None` when storage is disabled.
pub fn sink_from_config(config: &StorageConfig) -> AppResult<Option<Arc<dyn RecordingSink>>> {
    if !config.enabled {
        return Ok(None);
    }
    let dir = config.output_dir.clone();
    let sink: Arc<dyn RecordingSink> = match config.format {
        StorageFormat::Json => Arc::new(JsonRecordingWriter::new(dir)),
        StorageFormat::Csv => csv_sink(dir)?,
        StorageFormat::Both => Arc::new(CompositeSink::new(vec![
            Arc::new(JsonRecordingWriter::new(dir.clone())),
            csv_sink(dir)?,
        ])),
    };
    Ok(Some(sink))
}

#[cfg(feature = "storage_csv")]
fn csv_sink(dir: PathBuf) -> AppResult<Arc<dyn RecordingSink>> {
    Ok(Arc::new(CsvRecordingWriter::new(dir)))
}

#[cfg(not(feature = "storage_csv"))]
fn csv_sink(_dir: PathBuf) -> AppResult<Arc<dyn RecordingSink>> {
    Err(SwingError::Configuration(
        "CSV storage requires the 'storage_csv' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SwingAnalyzer;
    use crate::data::ring_buffer::SyncedFrame;
    use crate::sample::Vec3;
    use chrono::Duration;
    use tempfile::tempdir;

    fn sample_recording() -> Recording {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let mut signals = SignalArrays::default();
        for i in 0..5 {
            let mut frame = SyncedFrame::zeroed(t0 + Duration::microseconds(10_001 * i));
            let v = i as f64;
            frame.accel = Vec3::new(0.1 * v, -0.2, 9.81);
            frame.accel_uncal = Vec3::new([0.0, 1.0, 4.0, 2.0, 0.5][i as usize], 0.0, 9.7);
            frame.gyro = Vec3::new(1.0 / 3.0 * v, 0.0, -0.5);
            frame.rotation_rate = Vec3::new(0.0, v * 2.5, 0.0);
            signals.push(&frame);
        }
        Recording::from_signals(t0, t0 + Duration::seconds(2), signals)
    }

    #[test]
    fn test_round_trip_with_metrics() {
        let recording = SwingAnalyzer::new().analyze_into(sample_recording());
        let bytes = to_json_pretty(&recording).unwrap();
        let back = parse_recording(&bytes).unwrap();

        assert_eq!(back.signals, recording.signals);
        assert_eq!(back.metrics, recording.metrics);
        assert_eq!(back.start_time, recording.start_time);
        assert_eq!(back.duration_s, Some(2.0));
        assert_eq!(back.id, recording.id);
    }

    #[test]
    fn test_large_rates_survive_round_trip() {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let mut signals = SignalArrays::default();
        for (i, gyro_x) in [1.0, 1e200, 2.0].into_iter().enumerate() {
            let mut frame = SyncedFrame::zeroed(t0 + Duration::milliseconds(i as i64 * 10));
            frame.accel_uncal = Vec3::new(i as f64, 0.0, 0.0);
            frame.gyro = Vec3::new(gyro_x, 0.0, 0.0);
            signals.push(&frame);
        }
        let recording = SwingAnalyzer::new()
            .analyze_into(Recording::from_signals(t0, t0 + Duration::seconds(1), signals));
        let metrics = recording.metrics.as_ref().unwrap();
        assert!(metrics.peak_hip_speed_deg_s.unwrap().is_finite());

        let back = parse_recording(&to_json_pretty(&recording).unwrap()).unwrap();
        assert_eq!(back.metrics, recording.metrics);
        assert_eq!(back.signals, recording.signals);
    }

    #[test]
    fn test_overflowed_magnitude_read_back() {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let mut signals = SignalArrays::default();
        for i in 0..3 {
            let mut frame = SyncedFrame::zeroed(t0 + Duration::milliseconds(i * 10));
            frame.accel_uncal = Vec3::new(i as f64, 0.0, 0.0);
            frame.gyro = Vec3::new(1.0, 0.0, 0.0);
            signals.push(&frame);
        }
        signals.gyro.x[1] = f64::MAX;
        signals.gyro.y[1] = f64::MAX;
        let recording = SwingAnalyzer::new()
            .analyze_into(Recording::from_signals(t0, t0 + Duration::seconds(1), signals));

        let bytes = to_json_pretty(&recording).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["metrics"]["hip_angular_velocity_mag"][1].is_null());
        assert!(value["metrics"].get("peak_hip_speed_deg_s").is_none());

        let back = parse_recording(&bytes).unwrap();
        let metrics = back.metrics.as_ref().unwrap();
        assert!(metrics.hip_angular_velocity_mag[1].is_infinite());
        assert_eq!(back.metrics, recording.metrics);
    }

    #[test]
    fn test_wrist_observation_persisted() {
        let mut recording = sample_recording();
        recording.wrist_observed = Some(true);
        let back = parse_recording(&to_json_pretty(&recording).unwrap()).unwrap();
        assert_eq!(back.wrist_observed, Some(true));

        let unknown = sample_recording();
        let value: serde_json::Value =
            serde_json::from_slice(&to_json_pretty(&unknown).unwrap()).unwrap();
        assert!(value["metadata"].get("wrist_observed").is_none());
        assert_eq!(parse_recording(&to_json_pretty(&unknown).unwrap()).unwrap().wrist_observed, None);
    }

    #[test]
    fn test_absent_metrics_written_as_empty_object() {
        let recording = sample_recording();
        let value: serde_json::Value =
            serde_json::from_slice(&to_json_pretty(&recording).unwrap()).unwrap();

        assert_eq!(value["metrics"], serde_json::json!({}));
        assert_eq!(value["metadata"]["samples"], 5);
        assert_eq!(value["signals"]["time"].as_array().unwrap().len(), 5);
        assert!(value["signals"]["rotation_rate_y"].is_array());

        let back = parse_recording(&to_json_pretty(&recording).unwrap()).unwrap();
        assert!(back.metrics.is_none());
    }

    #[test]
    fn test_misaligned_columns_rejected() {
        let mut persisted = PersistedRecording::from(&sample_recording());
        persisted.signals.gyro_y.pop();
        let err = Recording::try_from(persisted).unwrap_err();
        assert!(err.to_string().contains("gyro_y"));
    }

    #[tokio::test]
    async fn test_json_writer_and_loader() {
        let dir = tempdir().unwrap();
        let writer = JsonRecordingWriter::new(dir.path().join("nested"));
        let recording = SwingAnalyzer::new().analyze_into(sample_recording());

        let path = writer.persist(&recording).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "recording_20231114_221320.json"
        );

        let loaded = load_recording(&path).await.unwrap();
        assert_eq!(loaded.signals, recording.signals);
        assert_eq!(loaded.metrics, recording.metrics);
    }

    #[cfg(feature = "storage_csv")]
    #[tokio::test]
    async fn test_csv_writer_table() {
        let dir = tempdir().unwrap();
        let writer = CsvRecordingWriter::new(dir.path());
        let path = writer.persist(&sample_recording()).await.unwrap();
        assert!(path.to_string_lossy().ends_with("_signals.csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 13);
        assert_eq!(&headers[0], "time");
        assert_eq!(&headers[12], "rotation_rate_z");
        let rows: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(&rows[2][4], "4");
    }

    #[test]
    fn test_sink_from_config() {
        let mut config = StorageConfig::default();
        config.enabled = false;
        assert!(sink_from_config(&config).unwrap().is_none());

        config.enabled = true;
        config.format = StorageFormat::Json;
        assert_eq!(sink_from_config(&config).unwrap().unwrap().name(), "json");
    }

    #[cfg(feature = "storage_csv")]
    #[tokio::test]
    async fn test_composite_sink_writes_both() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            enabled: true,
            output_dir: dir.path().to_path_buf(),
            format: StorageFormat::Both,
        };
        let sink = sink_from_config(&config).unwrap().unwrap();
        let path = sink.persist(&sample_recording()).await.unwrap();

        assert_eq!(path.extension().unwrap(), "json");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}

//! Recording sessions and capture gating.
//!
//! A [`Recording`] is the full, unbounded copy of every synchronized frame produced while
//! capture was open. [`RecordingControl`] owns the at-most-one open recording:
//!
//! ```text
//!            start()                     stop()
//!   Idle ─────────────▶ Open(Recording) ─────────▶ Idle
//!                         ▲   │ capture(frame)      │
//!                         └───┘                     ├─▶ StopOutcome::Closed(RecordingHandle)
//!                                                   └─▶ StopOutcome::NoData (discarded)
//! ```
//!
//! Only a [`RecordingHandle`] can be submitted for analysis. Holding one proves the
//! recording is closed and contains at least one frame.

use crate::analysis::Metrics;
use crate::data::ring_buffer::SyncedFrame;
use crate::error::{AppResult, SwingError};
use crate::math;
use crate::sample::Vec3;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Column-oriented three-axis series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSeries {
    /// X axis values
    pub x: Vec<f64>,
    /// Y axis values
    pub y: Vec<f64>,
    /// Z axis values
    pub z: Vec<f64>,
}

impl AxisSeries {
    /// Append one reading.
    pub fn push(&mut self, value: Vec3) {
        self.x.push(value.x);
        self.y.push(value.y);
        self.z.push(value.z);
    }

    /// Number of readings (length of the shortest axis).
    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len()).min(self.z.len())
    }

    /// True when there are no complete readings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-reading Euclidean norm.
    pub fn magnitudes(&self) -> Vec<f64> {
        math::magnitudes(&self.x, &self.y, &self.z)
    }

    /// Build a series from readings.
    pub fn from_readings<'a>(readings: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut series = Self::default();
        for reading in readings {
            series.push(*reading);
        }
        series
    }
}

/// The captured channel arrays of a recording, aligned to `time`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalArrays {
    /// Frame instants
    pub time: Vec<DateTime<Utc>>,
    /// Calibrated acceleration
    pub accel: AxisSeries,
    /// Raw acceleration
    pub accel_uncal: AxisSeries,
    /// Body angular velocity
    pub gyro: AxisSeries,
    /// Wrist angular velocity
    pub rotation_rate: AxisSeries,
}

impl SignalArrays {
    /// Append one synchronized frame to every array.
    pub fn push(&mut self, frame: &SyncedFrame) {
        self.time.push(frame.timestamp);
        self.accel.push(frame.accel);
        self.accel_uncal.push(frame.accel_uncal);
        self.gyro.push(frame.gyro);
        self.rotation_rate.push(frame.rotation_rate);
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// True when nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// A capture session between a start and a stop command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Unique identifier
    pub id: Uuid,
    /// Wall-clock instant of the start command
    pub start_time: DateTime<Utc>,
    /// Wall-clock instant of the stop command; `None` while open
    pub end_time: Option<DateTime<Utc>>,
    /// `end_time - start_time` in seconds; `None` while open
    pub duration_s: Option<f64>,
    /// Number of captured frames, fixed at stop
    pub sample_count: usize,
    /// Captured channel arrays
    pub signals: SignalArrays,
    /// Whether the wrist stream had reported by the time frames were captured.
    /// `None` when the recording was built from bare signals.
    #[serde(default)]
    pub wrist_observed: Option<bool>,
    /// Analyzer output; `None` until analyzed
    pub metrics: Option<Metrics>,
}

impl Recording {
    /// Open a new, empty recording.
    pub fn open(start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            end_time: None,
            duration_s: None,
            sample_count: 0,
            signals: SignalArrays::default(),
            wrist_observed: Some(false),
            metrics: None,
        }
    }

    /// Build a closed recording directly from captured signals.
    pub fn from_signals(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        signals: SignalArrays,
    ) -> Self {
        let mut recording = Self::open(start_time);
        recording.signals = signals;
        recording.wrist_observed = None;
        recording.close(end_time);
        recording
    }

    /// True once `end_time` is set.
    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    fn close(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration_s = Some(seconds_between(end_time, self.start_time));
        self.sample_count = self.signals.len();
    }
}

fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// A closed recording with at least one frame, ready for analysis.
#[derive(Debug, Clone)]
pub struct RecordingHandle(Recording);

impl RecordingHandle {
    /// Identifier of the wrapped recording.
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Borrow the wrapped recording.
    pub fn recording(&self) -> &Recording {
        &self.0
    }

    /// Unwrap the recording.
    pub fn into_recording(self) -> Recording {
        self.0
    }
}

impl TryFrom<Recording> for RecordingHandle {
    type Error = SwingError;

    fn try_from(recording: Recording) -> AppResult<Self> {
        if !recording.is_closed() {
            return Err(SwingError::RecordingNotClosed);
        }
        if recording.signals.is_empty() {
            return Err(SwingError::EmptyRecording);
        }
        Ok(Self(recording))
    }
}

/// Result of a stop command.
#[derive(Debug, Clone)]
pub enum StopOutcome {
    /// The recording captured frames and can be analyzed
    Closed(RecordingHandle),
    /// Nothing was captured; the recording was discarded
    NoData {
        /// Length of the empty capture window in seconds
        duration_s: f64,
    },
}

/// Owner of the at-most-one open recording.
#[derive(Debug, Default)]
pub struct RecordingControl {
    current: Option<Recording>,
}

impl RecordingControl {
    /// Create an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a recording is open.
    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    /// The open recording, if any.
    pub fn current(&self) -> Option<&Recording> {
        self.current.as_ref()
    }

    /// Open a new recording at `now`.
    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<Uuid> {
        if self.current.is_some() {
            return Err(SwingError::AlreadyRecording);
        }
        let recording = Recording::open(now);
        let id = recording.id;
        info!(recording_id = %id, start_time = %now, "Recording started");
        self.current = Some(recording);
        Ok(id)
    }

    /// Append a frame to the open recording; no-op when idle.
    pub fn capture(&mut self, frame: &SyncedFrame) {
        if let Some(recording) = self.current.as_mut() {
            recording.signals.push(frame);
        }
    }

    /// Note that the wrist stream has reported; no-op when idle.
    pub fn mark_wrist_observed(&mut self) {
        if let Some(recording) = self.current.as_mut() {
            recording.wrist_observed = Some(true);
        }
    }

    /// Close the open recording at `now`.
    pub fn stop(&mut self, now: DateTime<Utc>) -> AppResult<StopOutcome> {
        let mut recording = self.current.take().ok_or(SwingError::NotRecording)?;
        recording.close(now);
        let duration_s = recording.duration_s.unwrap_or_default();

        if recording.sample_count == 0 {
            warn!(
                recording_id = %recording.id,
                duration_s,
                "Recording stopped without data; discarded"
            );
            return Ok(StopOutcome::NoData { duration_s });
        }

        info!(
            recording_id = %recording.id,
            duration_s,
            samples = recording.sample_count,
            "Recording stopped"
        );
        RecordingHandle::try_from(recording).map(StopOutcome::Closed)
    }
}

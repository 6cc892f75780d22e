//! Swing event detection and timing metrics.
//!
//! The analyzer works on a closed [`Recording`] and never touches its signal arrays.
//! Detection runs on the captured samples as they are, forward-filled plateaus
//! included, so a plateau can decide which index wins a peak or trough search.
//!
//! Events, in order:
//!
//! 1. **Max force**: argmax of the raw acceleration x axis (signed).
//! 2. **Heel strike**: argmin of the same axis over the samples strictly before max
//!    force. When max force is the first sample the heel strike falls back to it.
//! 3. **Peak hip speed**: argmax of the gyroscope magnitude. The sign of gyroscope x at
//!    that instant gives the rotation direction.
//! 4. **Peak wrist speed**: argmax of the rotation-rate magnitude, only when the wrist
//!    channel was observed while the recording was open.
//!
//! A magnitude too large for `f64` is kept in the series as infinity but never
//! reported as a peak speed.
//!
//! Feedback classifies `time_to_peak_hip_speed_ms`:
//!
//! | Interval            | Feedback             |
//! |---------------------|----------------------|
//! | `t <= 50`           | `HIPS A BIT EARLY`   |
//! | `50 < t < 150`      | `GOOD SEQUENCE`      |
//! | `t >= 150`          | `HIPS A BIT LATE`    |

use crate::math;
use crate::recording::{Recording, SignalArrays};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Lower bound (exclusive) of a well-sequenced swing, in milliseconds.
pub const GOOD_SEQUENCE_MIN_MS: f64 = 50.0;
/// Upper bound (exclusive) of a well-sequenced swing, in milliseconds.
pub const GOOD_SEQUENCE_MAX_MS: f64 = 150.0;

/// Minimum number of frames for event detection.
const MIN_FRAMES: usize = 2;

/// Categorical timing feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingFeedback {
    /// Hips peaked well after heel strike, before it was too late
    #[serde(rename = "GOOD SEQUENCE")]
    GoodSequence,
    /// Hips peaked too soon after (or before) heel strike
    #[serde(rename = "HIPS A BIT EARLY")]
    HipsEarly,
    /// Hips peaked too long after heel strike
    #[serde(rename = "HIPS A BIT LATE")]
    HipsLate,
    /// Not enough samples to detect events
    #[serde(rename = "INSUFFICIENT DATA")]
    InsufficientData,
}

impl SwingFeedback {
    /// Classify the heel-strike to peak-hip-speed interval.
    pub fn classify(time_to_peak_hip_speed_ms: f64) -> Self {
        if time_to_peak_hip_speed_ms <= GOOD_SEQUENCE_MIN_MS {
            SwingFeedback::HipsEarly
        } else if time_to_peak_hip_speed_ms < GOOD_SEQUENCE_MAX_MS {
            SwingFeedback::GoodSequence
        } else {
            SwingFeedback::HipsLate
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            SwingFeedback::GoodSequence => "GOOD SEQUENCE",
            SwingFeedback::HipsEarly => "HIPS A BIT EARLY",
            SwingFeedback::HipsLate => "HIPS A BIT LATE",
            SwingFeedback::InsufficientData => "INSUFFICIENT DATA",
        }
    }
}

impl fmt::Display for SwingFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hip rotation direction at peak angular speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RotationDirection {
    /// Positive gyroscope x
    Right,
    /// Zero or negative gyroscope x
    Left,
}

impl RotationDirection {
    fn from_axis(value: f64) -> Self {
        if value > 0.0 {
            RotationDirection::Right
        } else {
            RotationDirection::Left
        }
    }
}

/// Detected events and derived timing of one swing.
///
/// Absent fields were not computed. A computed zero is `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Timing classification
    pub swing_feedback: SwingFeedback,
    /// Acceleration trough before peak plant force
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heel_strike_time: Option<DateTime<Utc>>,
    /// Peak plant force
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_accel_time: Option<DateTime<Utc>>,
    /// Peak hip angular speed in degrees per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_hip_speed_deg_s: Option<f64>,
    /// Instant of peak hip angular speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_hip_speed_time: Option<DateTime<Utc>>,
    /// Hip rotation direction at the peak
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hip_rotation_direction: Option<RotationDirection>,
    /// Heel strike to peak hip speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_peak_hip_speed_ms: Option<f64>,
    /// Max force to peak hip speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_hip_speed_to_max_accel_ms: Option<f64>,
    /// Peak wrist angular speed in degrees per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_wrist_speed_deg_s: Option<f64>,
    /// Instant of peak wrist angular speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_wrist_speed_time: Option<DateTime<Utc>>,
    /// Heel strike to peak wrist speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_peak_wrist_speed_ms: Option<f64>,
    /// Set when max force was the first sample and heel strike fell back to it
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub heel_strike_fallback: bool,
    /// Hip angular speed series in rad/s
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "overflowed_series"
    )]
    pub hip_angular_velocity_mag: Vec<f64>,
    /// Wrist angular speed series in rad/s
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "overflowed_series"
    )]
    pub wrist_angular_velocity_mag: Vec<f64>,
}

impl Metrics {
    /// Metrics of a recording too short to analyze.
    pub fn insufficient() -> Self {
        Self {
            swing_feedback: SwingFeedback::InsufficientData,
            heel_strike_time: None,
            max_accel_time: None,
            peak_hip_speed_deg_s: None,
            peak_hip_speed_time: None,
            hip_rotation_direction: None,
            time_to_peak_hip_speed_ms: None,
            time_hip_speed_to_max_accel_ms: None,
            peak_wrist_speed_deg_s: None,
            peak_wrist_speed_time: None,
            time_to_peak_wrist_speed_ms: None,
            heel_strike_fallback: false,
            hip_angular_velocity_mag: Vec::new(),
            wrist_angular_velocity_mag: Vec::new(),
        }
    }
}

/// Reads a magnitude series, mapping `null` back to infinity.
///
/// JSON has no infinity; an overflowed magnitude is written as `null`.
fn overflowed_series<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
    let values = Vec::<Option<f64>>::deserialize(d)?;
    Ok(values
        .into_iter()
        .map(|v| v.unwrap_or(f64::INFINITY))
        .collect())
}

impl Default for Metrics {
    fn default() -> Self {
        Self::insufficient()
    }
}

/// A peak of an angular speed series.
#[derive(Debug, Clone, Copy)]
struct SpeedPeak {
    index: usize,
    time: DateTime<Utc>,
    /// `None` when the speed does not fit in an `f64`
    deg_s: Option<f64>,
}

fn speed_peak(time: &[DateTime<Utc>], magnitudes: &[f64]) -> Option<SpeedPeak> {
    let index = math::argmax(magnitudes)?;
    let deg_s = math::rad_to_deg(*magnitudes.get(index)?);
    Some(SpeedPeak {
        index,
        time: *time.get(index)?,
        deg_s: Some(deg_s).filter(|v| v.is_finite()),
    })
}

/// Signed `later - earlier` in milliseconds.
pub fn millis_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e6,
        None => delta.num_milliseconds() as f64,
    }
}

/// Swing event detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwingAnalyzer;

impl SwingAnalyzer {
    /// Create an analyzer.
    pub fn new() -> Self {
        Self
    }

    /// Compute metrics for a recording.
    pub fn analyze(&self, recording: &Recording) -> Metrics {
        debug!(
            recording_id = %recording.id,
            samples = recording.signals.len(),
            "Analyzing recording"
        );
        self.detect(&recording.signals, recording.wrist_observed)
    }

    /// Analyze a recording and attach the metrics to it.
    pub fn analyze_into(&self, mut recording: Recording) -> Recording {
        recording.metrics = Some(self.analyze(&recording));
        recording
    }

    /// Compute metrics directly from captured signal arrays.
    ///
    /// Without observation info the wrist channel counts as present when it holds a
    /// non-zero value.
    pub fn analyze_signals(&self, signals: &SignalArrays) -> Metrics {
        self.detect(signals, None)
    }

    fn detect(&self, signals: &SignalArrays, wrist_observed: Option<bool>) -> Metrics {
        let time = signals.time.as_slice();
        let accel_x = signals.accel_uncal.x.as_slice();

        if time.len() < MIN_FRAMES
            || accel_x.len() < MIN_FRAMES
            || signals.gyro.len() < MIN_FRAMES
        {
            debug!(frames = time.len(), "Insufficient data for swing analysis");
            return Metrics::insufficient();
        }

        let mut metrics = Metrics::insufficient();

        // Max force and the trough before it
        let max_idx = math::argmax(accel_x);
        metrics.max_accel_time = max_idx.and_then(|i| time.get(i).copied());

        let heel_idx = match max_idx {
            Some(0) => {
                warn!("Max acceleration at first sample; using it as heel strike");
                metrics.heel_strike_fallback = true;
                Some(0)
            }
            Some(i) => accel_x.get(..i).and_then(math::argmin),
            None => None,
        };
        metrics.heel_strike_time = heel_idx.and_then(|i| time.get(i).copied());

        // Hip
        let hip_mag = signals.gyro.magnitudes();
        if let Some(peak) = speed_peak(time, &hip_mag) {
            metrics.peak_hip_speed_deg_s = peak.deg_s;
            metrics.peak_hip_speed_time = Some(peak.time);
            metrics.hip_rotation_direction = signals
                .gyro
                .x
                .get(peak.index)
                .map(|&x| RotationDirection::from_axis(x));
        }
        metrics.hip_angular_velocity_mag = hip_mag;

        // Wrist, independent of hip
        let wrist = &signals.rotation_rate;
        let wrist_present = !wrist.is_empty()
            && wrist_observed.unwrap_or_else(|| has_nonzero(&wrist.x, &wrist.y, &wrist.z));
        if wrist_present {
            let wrist_mag = wrist.magnitudes();
            if let Some(peak) = speed_peak(time, &wrist_mag) {
                metrics.peak_wrist_speed_deg_s = peak.deg_s;
                metrics.peak_wrist_speed_time = Some(peak.time);
            }
            metrics.wrist_angular_velocity_mag = wrist_mag;
        }

        // Derived timing
        if let (Some(heel), Some(hip)) = (metrics.heel_strike_time, metrics.peak_hip_speed_time) {
            metrics.time_to_peak_hip_speed_ms = Some(millis_between(hip, heel));
        }
        if let (Some(max), Some(hip)) = (metrics.max_accel_time, metrics.peak_hip_speed_time) {
            metrics.time_hip_speed_to_max_accel_ms = Some(millis_between(hip, max));
        }
        if let (Some(heel), Some(wrist)) = (metrics.heel_strike_time, metrics.peak_wrist_speed_time)
        {
            metrics.time_to_peak_wrist_speed_ms = Some(millis_between(wrist, heel));
        }

        if let Some(t) = metrics.time_to_peak_hip_speed_ms {
            metrics.swing_feedback = SwingFeedback::classify(t);
        }

        debug!(
            feedback = %metrics.swing_feedback,
            time_to_peak_hip_speed_ms = ?metrics.time_to_peak_hip_speed_ms,
            "Swing analysis complete"
        );
        metrics
    }
}

/// Fallback presence test for signals of unknown origin. Unobserved channels are
/// zero-filled by the synchronizer.
fn has_nonzero(x: &[f64], y: &[f64], z: &[f64]) -> bool {
    x.iter().chain(y).chain(z).any(|v| *v != 0.0)
}

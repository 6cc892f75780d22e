//! Synthetic multi-sensor source for demos, tests and benchmarks.
//!
//! Produces the same transport batches a phone and watch pair would send: accelerometer,
//! raw accelerometer and gyroscope at 100 Hz, wrist motion at 50 Hz, each sensor with
//! its own sub-millisecond timestamp jitter. A swing window contains
//!
//! - an acceleration trough (heel strike) at +500 ms,
//! - a hip angular-speed bell peaking at +600 ms, rotating right,
//! - a plant-force acceleration peak at +650 ms,
//! - a wrist angular-speed peak at +750 ms.
//!
//! Output is deterministic for a given seed.

use crate::sample::{Sample, SensorKind, Vec3};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value};
use uuid::Uuid;

const BODY_PERIOD_MS: i64 = 10;
const WRIST_PERIOD_MS: i64 = 20;
const JITTER_NS: i64 = 400_000;
const NOISE: f64 = 0.05;
const GRAVITY: f64 = 9.81;

/// Length of one generated swing window.
pub const SWING_WINDOW_MS: i64 = 1_500;
/// Offset of the heel strike inside a swing window.
pub const HEEL_STRIKE_OFFSET_MS: i64 = 500;
/// Offset of peak hip speed inside a swing window.
pub const HIP_PEAK_OFFSET_MS: i64 = 600;

fn bell(t_s: f64, center_s: f64, width_s: f64) -> f64 {
    let z = (t_s - center_s) / width_s;
    (-0.5 * z * z).exp()
}

/// Seeded generator of synthetic swing payloads.
#[derive(Debug)]
pub struct MockSwingSource {
    rng: StdRng,
    clock: DateTime<Utc>,
    session_id: String,
    message_id: u64,
}

impl MockSwingSource {
    /// Source starting at the current wall-clock time.
    pub fn new(seed: u64) -> Self {
        Self::starting_at(seed, Utc::now())
    }

    /// Source whose first sample is at `start`.
    pub fn starting_at(seed: u64, start: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clock: start,
            session_id: Uuid::new_v4().to_string(),
            message_id: 0,
        }
    }

    /// Instant the next generated sample starts from.
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    fn jittered(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        at + Duration::nanoseconds(self.rng.gen_range(-JITTER_NS..=JITTER_NS))
    }

    fn noise(&mut self) -> f64 {
        self.rng.gen_range(-NOISE..NOISE)
    }

    fn noisy(&mut self, x: f64, y: f64, z: f64) -> Vec3 {
        Vec3::new(x + self.noise(), y + self.noise(), z + self.noise())
    }

    /// Generate `duration_ms` of samples, with a swing event when `swing` is set.
    fn generate(&mut self, duration_ms: i64, swing: bool) -> Vec<Sample> {
        let origin = self.clock;
        let mut samples = Vec::new();

        for step in 0..duration_ms / BODY_PERIOD_MS {
            let offset_ms = step * BODY_PERIOD_MS;
            let t = offset_ms as f64 / 1000.0;
            let at = origin + Duration::milliseconds(offset_ms);

            let (force, hip, wrist) = if swing {
                (
                    -3.0 * bell(t, 0.5, 0.04) + 12.0 * bell(t, 0.65, 0.03),
                    8.0 * bell(t, 0.6, 0.05),
                    15.0 * bell(t, 0.75, 0.04),
                )
            } else {
                (0.0, 0.0, 0.0)
            };

            let raw = self.noisy(force, 0.2 * force, GRAVITY);
            let ts = self.jittered(at);
            samples.push(Sample::new(ts, SensorKind::AccelerometerUncalibrated, raw));

            let calibrated = self.noisy(raw.x * 0.98, raw.y * 0.98, raw.z - GRAVITY);
            let ts = self.jittered(at);
            samples.push(Sample::new(ts, SensorKind::Accelerometer, calibrated));

            let gyro = self.noisy(hip, 0.25 * hip, 0.0);
            let ts = self.jittered(at);
            samples.push(Sample::new(ts, SensorKind::Gyroscope, gyro));

            if offset_ms % WRIST_PERIOD_MS == 0 {
                let rotation = self.noisy(wrist, -0.5 * wrist, 0.1 * wrist);
                let ts = self.jittered(at);
                samples.push(Sample::new(ts, SensorKind::WristMotion, rotation));
            }
        }

        self.clock = origin + Duration::milliseconds(duration_ms);
        samples
    }

    /// One swing window of [`SWING_WINDOW_MS`].
    pub fn swing(&mut self) -> Vec<Sample> {
        self.generate(SWING_WINDOW_MS, true)
    }

    /// Quiet standing for `duration_ms`.
    pub fn idle(&mut self, duration_ms: i64) -> Vec<Sample> {
        self.generate(duration_ms, false)
    }

    /// Split samples into transport batches covering `batch_ms` each.
    pub fn batches(samples: Vec<Sample>, batch_ms: i64) -> Vec<Vec<Sample>> {
        let Some(first) = samples.iter().map(|s| s.timestamp).min() else {
            return Vec::new();
        };
        let span = Duration::milliseconds(batch_ms.max(1));
        let mut batches: Vec<Vec<Sample>> = Vec::new();
        for sample in samples {
            let slot = ((sample.timestamp - first).num_nanoseconds().unwrap_or_default()
                / span.num_nanoseconds().unwrap_or(1)) as usize;
            if batches.len() <= slot {
                batches.resize_with(slot + 1, Vec::new);
            }
            batches[slot].push(sample);
        }
        batches.retain(|batch| !batch.is_empty());
        batches
    }

    /// Wrap samples in a transport envelope.
    pub fn envelope(&mut self, samples: &[Sample]) -> Value {
        self.message_id += 1;
        json!({
            "messageId": self.message_id,
            "sessionId": self.session_id,
            "deviceId": "mock",
            "payload": samples.iter().map(Sample::to_json).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::parse_payload;

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_seeded_output_is_deterministic() {
        let a = MockSwingSource::starting_at(7, start()).swing();
        let b = MockSwingSource::starting_at(7, start()).swing();
        let c = MockSwingSource::starting_at(8, start()).swing();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sensor_rates() {
        let samples = MockSwingSource::starting_at(1, start()).idle(1_000);
        let count = |kind| samples.iter().filter(|s| s.kind == kind).count();
        assert_eq!(count(SensorKind::Accelerometer), 100);
        assert_eq!(count(SensorKind::AccelerometerUncalibrated), 100);
        assert_eq!(count(SensorKind::Gyroscope), 100);
        assert_eq!(count(SensorKind::WristMotion), 50);
    }

    #[test]
    fn test_clock_advances_between_windows() {
        let mut source = MockSwingSource::starting_at(1, start());
        source.idle(200);
        assert_eq!(source.clock(), start() + Duration::milliseconds(200));
        let swing = source.swing();
        assert!(swing.iter().all(|s| s.timestamp > start() + Duration::milliseconds(199)));
    }

    #[test]
    fn test_batches_cover_all_samples() {
        let samples = MockSwingSource::starting_at(3, start()).swing();
        let total = samples.len();
        let batches = MockSwingSource::batches(samples, 100);
        assert!(batches.len() >= 14);
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), total);
    }

    #[test]
    fn test_envelope_parses() {
        let mut source = MockSwingSource::starting_at(5, start());
        let samples = source.idle(50);
        let message = source.envelope(&samples);
        assert_eq!(message["messageId"], 1);

        let parsed = parse_payload(message.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.len(), samples.len());
    }
}

//! Multi-sensor stream synchronization.
//!
//! Sensors report at independent rates and arrive in mixed batches. The synchronizer
//! merges each batch into the rolling [`FrameBuffer`] as one strictly increasing series:
//!
//! 1. Partition the batch per channel, keyed by timestamp. A calibrated gyroscope
//!    reading always replaces an entry at the same instant; an uncalibrated one only
//!    fills an empty slot. Wrist motion becomes the rotation-rate channel.
//! 2. Walk the union of timestamps in ascending order.
//! 3. Emit a frame for every timestamp strictly after the buffer's newest one. Channels
//!    without a reading at that instant carry the previous frame's value forward, or
//!    zero before anything has been observed.
//! 4. Timestamps at or before the newest frame are dropped. Late samples for an instant
//!    that has already passed are lost rather than inserted retroactively.

use super::ring_buffer::{Channel, FrameBuffer, SyncedFrame};
use crate::sample::{Sample, SensorKind, Vec3};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Per-channel readings of one batch, keyed by instant.
#[derive(Debug, Default)]
struct PartitionedBatch {
    channels: [BTreeMap<DateTime<Utc>, Vec3>; 4],
}

impl PartitionedBatch {
    fn from_samples(batch: &[Sample]) -> Self {
        let mut partitioned = Self::default();
        for sample in batch {
            let ts = sample.timestamp;
            match sample.kind {
                SensorKind::Accelerometer => {
                    partitioned.slot(Channel::Accel).insert(ts, sample.values);
                }
                SensorKind::AccelerometerUncalibrated => {
                    partitioned.slot(Channel::AccelUncal).insert(ts, sample.values);
                }
                SensorKind::Gyroscope => {
                    partitioned.slot(Channel::Gyro).insert(ts, sample.values);
                }
                SensorKind::GyroscopeUncalibrated => {
                    partitioned
                        .slot(Channel::Gyro)
                        .entry(ts)
                        .or_insert(sample.values);
                }
                SensorKind::WristMotion => {
                    partitioned
                        .slot(Channel::RotationRate)
                        .insert(ts, sample.values);
                }
            }
        }
        partitioned
    }

    fn slot(&mut self, channel: Channel) -> &mut BTreeMap<DateTime<Utc>, Vec3> {
        &mut self.channels[channel.index()]
    }

    fn get(&self, channel: Channel, ts: &DateTime<Utc>) -> Option<Vec3> {
        self.channels[channel.index()].get(ts).copied()
    }

    fn timestamps(&self) -> BTreeSet<DateTime<Utc>> {
        self.channels
            .iter()
            .flat_map(|readings| readings.keys().copied())
            .collect()
    }
}

/// Counters describing what the last `ingest` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Samples in the batch
    pub samples: usize,
    /// Frames appended to the buffer
    pub appended: usize,
    /// Distinct instants dropped for not being newer than the buffer
    pub dropped: usize,
}

/// Merges sample batches into the rolling multi-channel buffer.
///
/// Owns the buffer exclusively; callers serialize access (see `session`).
#[derive(Debug, Clone)]
pub struct StreamSynchronizer {
    buffer: FrameBuffer,
    /// Channels that fed at least one appended frame, by `Channel::index`
    observed: [bool; 4],
}

impl StreamSynchronizer {
    /// Create a synchronizer with a buffer of `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: FrameBuffer::new(capacity),
            observed: [false; 4],
        }
    }

    /// True once a reading of `channel` has landed in an appended frame.
    ///
    /// Distinguishes a sensor reporting zeros from one never seen, whose
    /// frames are zero-filled.
    pub fn observed(&self, channel: Channel) -> bool {
        self.observed[channel.index()]
    }

    /// Read access to the rolling buffer.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Merge one batch, calling `on_frame` for each appended frame in order.
    ///
    /// `on_frame` runs in the same pass that appends the frame, which is how an open
    /// recording captures exactly the frames the buffer received.
    pub fn ingest_with<F>(&mut self, batch: &[Sample], mut on_frame: F) -> IngestStats
    where
        F: FnMut(&SyncedFrame),
    {
        let mut stats = IngestStats {
            samples: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return stats;
        }

        let partitioned = PartitionedBatch::from_samples(batch);
        let mut previous = self.buffer.last_frame();

        for ts in partitioned.timestamps() {
            if previous.is_some_and(|frame| ts <= frame.timestamp) {
                stats.dropped += 1;
                trace!(timestamp = %ts, "Dropping stale timestamp");
                continue;
            }

            let mut frame = SyncedFrame::zeroed(ts);
            for channel in Channel::ALL {
                let reading = partitioned.get(channel, &ts);
                if reading.is_some() {
                    self.observed[channel.index()] = true;
                }
                *frame.get_mut(channel) = reading
                    .or_else(|| previous.map(|p| p.get(channel)))
                    .unwrap_or(Vec3::ZERO);
            }

            self.buffer.push(frame);
            on_frame(&frame);
            previous = Some(frame);
            stats.appended += 1;
        }

        if stats.dropped > 0 {
            debug!(
                dropped = stats.dropped,
                appended = stats.appended,
                "Ignored out-of-order or duplicate timestamps"
            );
        }
        stats
    }

    /// Merge one batch without observing the appended frames.
    pub fn ingest(&mut self, batch: &[Sample]) -> IngestStats {
        self.ingest_with(batch, |_| {})
    }
}

//! Fixed-capacity, multi-channel ring buffer of synchronized frames.
//!
//! The live view of the acquisition pipeline. Every channel is stored in its own
//! column (`VecDeque`) next to a shared timestamp column; all columns are pushed and
//! evicted in lock-step so index `i` always refers to the same frame across channels.
//!
//! # Layout
//! ```text
//! time:           [t0, t1, t2, ... tN-1]   strictly increasing
//! accel:          [a0, a1, a2, ... aN-1]
//! accel_uncal:    [u0, u1, u2, ... uN-1]
//! gyro:           [g0, g1, g2, ... gN-1]
//! rotation_rate:  [r0, r1, r2, ... rN-1]
//! ```
//!
//! Appending to a full buffer evicts the oldest frame (FIFO).

use crate::sample::Vec3;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A merged signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Calibrated acceleration
    Accel,
    /// Raw acceleration
    AccelUncal,
    /// Angular velocity of the body-worn sensor (calibrated preferred)
    Gyro,
    /// Angular velocity of the wrist-worn sensor
    RotationRate,
}

impl Channel {
    /// All channels in storage order.
    pub const ALL: [Channel; 4] = [
        Channel::Accel,
        Channel::AccelUncal,
        Channel::Gyro,
        Channel::RotationRate,
    ];

    /// Column prefix used in persisted and exported forms.
    pub fn prefix(&self) -> &'static str {
        match self {
            Channel::Accel => "accel",
            Channel::AccelUncal => "accel_uncal",
            Channel::Gyro => "gyro",
            Channel::RotationRate => "rotation_rate",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Channel::Accel => 0,
            Channel::AccelUncal => 1,
            Channel::Gyro => 2,
            Channel::RotationRate => 3,
        }
    }
}

/// One row of the merged series. Every channel carries a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncedFrame {
    /// Frame instant
    pub timestamp: DateTime<Utc>,
    /// Calibrated acceleration
    pub accel: Vec3,
    /// Raw acceleration
    pub accel_uncal: Vec3,
    /// Body angular velocity
    pub gyro: Vec3,
    /// Wrist angular velocity
    pub rotation_rate: Vec3,
}

impl SyncedFrame {
    /// A frame with every channel at zero.
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            accel: Vec3::ZERO,
            accel_uncal: Vec3::ZERO,
            gyro: Vec3::ZERO,
            rotation_rate: Vec3::ZERO,
        }
    }

    /// Value of one channel.
    pub fn get(&self, channel: Channel) -> Vec3 {
        match channel {
            Channel::Accel => self.accel,
            Channel::AccelUncal => self.accel_uncal,
            Channel::Gyro => self.gyro,
            Channel::RotationRate => self.rotation_rate,
        }
    }

    /// Mutable access to one channel.
    pub fn get_mut(&mut self, channel: Channel) -> &mut Vec3 {
        match channel {
            Channel::Accel => &mut self.accel,
            Channel::AccelUncal => &mut self.accel_uncal,
            Channel::Gyro => &mut self.gyro,
            Channel::RotationRate => &mut self.rotation_rate,
        }
    }
}

/// Fixed-capacity rolling buffer of synchronized frames.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    capacity: usize,
    time: VecDeque<DateTime<Utc>>,
    channels: [VecDeque<Vec3>; 4],
}

impl FrameBuffer {
    /// Create an empty buffer holding at most `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            time: VecDeque::with_capacity(capacity),
            channels: std::array::from_fn(|_| VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of frames retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently held.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// True when the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Timestamp of the newest frame.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.time.back().copied()
    }

    /// Newest frame, reassembled from the columns.
    pub fn last_frame(&self) -> Option<SyncedFrame> {
        self.frame(self.len().checked_sub(1)?)
    }

    /// Frame at `index` (0 = oldest retained).
    pub fn frame(&self, index: usize) -> Option<SyncedFrame> {
        let timestamp = *self.time.get(index)?;
        let mut frame = SyncedFrame::zeroed(timestamp);
        for channel in Channel::ALL {
            *frame.get_mut(channel) = *self.channels[channel.index()].get(index)?;
        }
        Some(frame)
    }

    /// Append a frame, evicting the oldest one from every column if full.
    ///
    /// The caller guarantees `frame.timestamp` is strictly after [`last_timestamp`].
    ///
    /// [`last_timestamp`]: FrameBuffer::last_timestamp
    pub fn push(&mut self, frame: SyncedFrame) {
        debug_assert!(self
            .last_timestamp()
            .map_or(true, |last| frame.timestamp > last));

        if self.time.len() == self.capacity {
            self.time.pop_front();
            for column in &mut self.channels {
                column.pop_front();
            }
        }

        self.time.push_back(frame.timestamp);
        for channel in Channel::ALL {
            self.channels[channel.index()].push_back(frame.get(channel));
        }
    }

    /// Timestamp column, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> + '_ {
        self.time.iter()
    }

    /// One channel column, oldest first.
    pub fn channel(&self, channel: Channel) -> impl Iterator<Item = &Vec3> + '_ {
        self.channels[channel.index()].iter()
    }

    /// All frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = SyncedFrame> + '_ {
        (0..self.len()).filter_map(move |i| self.frame(i))
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.time.clear();
        for column in &mut self.channels {
            column.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn frame(secs: i64, value: f64) -> SyncedFrame {
        let mut frame = SyncedFrame::zeroed(ts(secs));
        frame.accel = Vec3::new(value, 0.0, 0.0);
        frame.gyro = Vec3::new(0.0, value, 0.0);
        frame
    }

    #[test]
    fn test_create_frame_buffer() {
        let buffer = FrameBuffer::new(400);
        assert_eq!(buffer.capacity(), 400);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_timestamp(), None);
        assert_eq!(buffer.last_frame(), None);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(FrameBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn test_push_and_read_back() {
        let mut buffer = FrameBuffer::new(4);
        buffer.push(frame(1, 1.0));
        buffer.push(frame(2, 2.0));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.last_timestamp(), Some(ts(2)));
        assert_eq!(buffer.last_frame(), Some(frame(2, 2.0)));
        assert_eq!(buffer.frame(0), Some(frame(1, 1.0)));
        assert_eq!(buffer.frame(2), None);
    }

    #[test]
    fn test_fifo_eviction_in_lock_step() {
        let mut buffer = FrameBuffer::new(3);
        for i in 0..5 {
            buffer.push(frame(i, i as f64));
        }

        assert_eq!(buffer.len(), 3);
        let times: Vec<_> = buffer.timestamps().copied().collect();
        assert_eq!(times, vec![ts(2), ts(3), ts(4)]);

        let accel_x: Vec<f64> = buffer.channel(Channel::Accel).map(|v| v.x).collect();
        let gyro_y: Vec<f64> = buffer.channel(Channel::Gyro).map(|v| v.y).collect();
        assert_eq!(accel_x, vec![2.0, 3.0, 4.0]);
        assert_eq!(gyro_y, vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.channel(Channel::RotationRate).count(), 3);
    }

    #[test]
    fn test_frames_iterator_and_clear() {
        let mut buffer = FrameBuffer::new(8);
        buffer.push(frame(10, 1.0));
        buffer.push(frame(11, 2.0));

        let frames: Vec<_> = buffer.frames().collect();
        assert_eq!(frames, vec![frame(10, 1.0), frame(11, 2.0)]);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.channel(Channel::AccelUncal).count(), 0);
    }

    #[test]
    fn test_channel_prefixes() {
        let prefixes: Vec<_> = Channel::ALL.iter().map(Channel::prefix).collect();
        assert_eq!(prefixes, vec!["accel", "accel_uncal", "gyro", "rotation_rate"]);
    }
}

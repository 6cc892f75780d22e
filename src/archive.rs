//! Bounded archive of analyzed recordings, most recent first.

use crate::recording::Recording;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Default number of recordings retained.
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 5;

/// Archive shared between the analysis workers and readers.
pub type SharedArchive = Arc<RwLock<RecordingArchive>>;

/// Holds the last `capacity` analyzed recordings.
#[derive(Debug, Clone)]
pub struct RecordingArchive {
    capacity: usize,
    entries: VecDeque<Recording>,
}

impl Default for RecordingArchive {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_CAPACITY)
    }
}

impl RecordingArchive {
    /// Create an empty archive (capacity at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Wrap a new archive for sharing.
    pub fn shared(capacity: usize) -> SharedArchive {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Maximum number of recordings retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of recordings held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been archived.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert at the front, evicting the oldest entry past capacity.
    pub fn append(&mut self, recording: Recording) {
        debug!(recording_id = %recording.id, "Archiving recording");
        self.entries.push_front(recording);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                debug!(recording_id = %evicted.id, "Evicted oldest archived recording");
            }
        }
    }

    /// Recordings, most recent first.
    pub fn list(&self) -> impl Iterator<Item = &Recording> + '_ {
        self.entries.iter()
    }

    /// Most recently archived recording.
    pub fn latest(&self) -> Option<&Recording> {
        self.entries.front()
    }

    /// Look up a recording by id.
    pub fn get(&self, id: Uuid) -> Option<&Recording> {
        self.entries.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn recording(n: i64) -> Recording {
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000 + n, 0).unwrap();
        Recording::from_signals(t, t + Duration::seconds(1), Default::default())
    }

    #[test]
    fn test_most_recent_first() {
        let mut archive = RecordingArchive::new(5);
        let first = recording(1);
        let second = recording(2);
        archive.append(first.clone());
        archive.append(second.clone());

        let ids: Vec<_> = archive.list().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(archive.latest().map(|r| r.id), Some(second.id));
        assert_eq!(archive.get(first.id).map(|r| r.start_time), Some(first.start_time));
    }

    #[test]
    fn test_sixth_append_evicts_oldest() {
        let mut archive = RecordingArchive::default();
        let recordings: Vec<_> = (0..6).map(recording).collect();
        for r in &recordings {
            archive.append(r.clone());
            assert!(archive.len() <= 5);
        }

        assert_eq!(archive.len(), 5);
        assert!(archive.get(recordings[0].id).is_none());
        let ids: Vec<_> = archive.list().map(|r| r.id).collect();
        let expected: Vec<_> = recordings[1..].iter().rev().map(|r| r.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_list_is_restartable() {
        let mut archive = RecordingArchive::new(2);
        archive.append(recording(0));
        assert_eq!(archive.list().count(), 1);
        assert_eq!(archive.list().count(), 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut archive = RecordingArchive::new(0);
        archive.append(recording(0));
        archive.append(recording(1));
        assert_eq!(archive.capacity(), 1);
        assert_eq!(archive.len(), 1);
    }
}

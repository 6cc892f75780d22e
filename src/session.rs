//! Acquisition session: the single owner of live state.
//!
//! `SwingSession` is a cheap, cloneable handle over:
//!
//! - the [`StreamSynchronizer`] and [`RecordingControl`], guarded together by one
//!   mutex so frame appends, `start` and `stop` are serialized against each other;
//! - the [`AnalysisQueue`] and the archive it fills.
//!
//! Every ingest pushes frames into the rolling buffer and, while a recording is open,
//! into the recording in the same locked pass.

use crate::archive::{RecordingArchive, SharedArchive};
use crate::config::AppConfig;
use crate::data::ring_buffer::{Channel, FrameBuffer, SyncedFrame};
use crate::data::storage::{sink_from_config, RecordingSink};
use crate::data::synchronizer::{IngestStats, StreamSynchronizer};
use crate::error::AppResult;
use crate::jobs::{AnalysisQueue, JobId, JobStatus};
use crate::recording::{Recording, RecordingControl, RecordingHandle, SignalArrays, StopOutcome};
use crate::sample::{self, Sample};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug)]
struct AcquisitionState {
    synchronizer: StreamSynchronizer,
    control: RecordingControl,
}

/// Copy of the rolling buffer for display.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    /// Buffer capacity in frames
    pub capacity: usize,
    /// Whether a recording is open
    pub recording: bool,
    /// Buffered frames, oldest first
    pub signals: SignalArrays,
    /// Per-frame magnitudes of each channel
    pub magnitudes: ChannelMagnitudes,
}

/// Magnitude series of every channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelMagnitudes {
    /// Calibrated acceleration
    pub accel: Vec<f64>,
    /// Raw acceleration
    pub accel_uncal: Vec<f64>,
    /// Hip angular speed
    pub gyro: Vec<f64>,
    /// Wrist angular speed
    pub rotation_rate: Vec<f64>,
}

impl LiveSnapshot {
    fn from_buffer(buffer: &FrameBuffer, recording: bool) -> Self {
        let mut signals = SignalArrays::default();
        for frame in buffer.frames() {
            signals.push(&frame);
        }
        let magnitudes = ChannelMagnitudes {
            accel: signals.accel.magnitudes(),
            accel_uncal: signals.accel_uncal.magnitudes(),
            gyro: signals.gyro.magnitudes(),
            rotation_rate: signals.rotation_rate.magnitudes(),
        };
        Self {
            capacity: buffer.capacity(),
            recording,
            signals,
            magnitudes,
        }
    }
}

/// Shared handle over the acquisition pipeline.
#[derive(Debug, Clone)]
pub struct SwingSession {
    state: Arc<Mutex<AcquisitionState>>,
    queue: AnalysisQueue,
}

impl SwingSession {
    /// Build a session from configuration, including its storage sink.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;
        let sink = sink_from_config(&config.storage)?;
        Ok(Self::new(
            config.acquisition.buffer_capacity,
            config.archive.capacity,
            sink,
        ))
    }

    /// Build a session from explicit parts.
    pub fn new(
        buffer_capacity: usize,
        archive_capacity: usize,
        sink: Option<Arc<dyn RecordingSink>>,
    ) -> Self {
        let archive = RecordingArchive::shared(archive_capacity);
        Self {
            state: Arc::new(Mutex::new(AcquisitionState {
                synchronizer: StreamSynchronizer::new(buffer_capacity),
                control: RecordingControl::new(),
            })),
            queue: AnalysisQueue::new(archive, sink),
        }
    }

    /// Merge a batch into the buffer and the open recording, if any.
    pub fn ingest(&self, batch: &[Sample]) -> IngestStats {
        let mut guard = self.state.lock();
        let AcquisitionState {
            synchronizer,
            control,
        } = &mut *guard;
        let stats = synchronizer.ingest_with(batch, |frame: &SyncedFrame| control.capture(frame));
        if stats.appended > 0 && synchronizer.observed(Channel::RotationRate) {
            control.mark_wrist_observed();
        }
        debug!(
            samples = stats.samples,
            appended = stats.appended,
            recording = control.is_recording(),
            "Ingested batch"
        );
        stats
    }

    /// Parse a transport message and ingest its samples.
    pub fn ingest_payload(&self, bytes: &[u8]) -> AppResult<IngestStats> {
        let batch = sample::parse_payload(bytes)?;
        Ok(self.ingest(&batch))
    }

    /// Open a recording now.
    pub fn start_recording(&self) -> AppResult<Uuid> {
        self.state.lock().control.start(Utc::now())
    }

    /// Close the open recording now.
    pub fn stop_recording(&self) -> AppResult<StopOutcome> {
        self.state.lock().control.stop(Utc::now())
    }

    /// True while a recording is open.
    pub fn is_recording(&self) -> bool {
        self.state.lock().control.is_recording()
    }

    /// Hand a closed recording to background analysis.
    pub async fn submit(&self, handle: RecordingHandle) -> JobId {
        self.queue.submit(handle).await
    }

    /// Stop the open recording and, if it captured frames, submit it for analysis.
    ///
    /// Returns the job and the closed recording's summary, or `None` when nothing was
    /// captured.
    pub async fn stop_and_submit(&self) -> AppResult<Option<(JobId, StopSummary)>> {
        match self.stop_recording()? {
            StopOutcome::Closed(handle) => {
                let summary = StopSummary::from(handle.recording());
                let job_id = self.submit(handle).await;
                info!(%job_id, samples = summary.samples, "Recording submitted for analysis");
                Ok(Some((job_id, summary)))
            }
            StopOutcome::NoData { .. } => Ok(None),
        }
    }

    /// Status of an analysis job.
    pub async fn poll(&self, job_id: JobId) -> AppResult<JobStatus> {
        self.queue.poll(job_id).await
    }

    /// The analysis queue.
    pub fn queue(&self) -> &AnalysisQueue {
        &self.queue
    }

    /// The archive of analyzed recordings.
    pub fn archive(&self) -> &SharedArchive {
        self.queue.archive()
    }

    /// Archived recordings, most recent first.
    pub fn recordings(&self) -> Vec<Recording> {
        self.archive().read().list().cloned().collect()
    }

    /// Copy of the rolling buffer with magnitude series.
    pub fn live_snapshot(&self) -> LiveSnapshot {
        let state = self.state.lock();
        LiveSnapshot::from_buffer(state.synchronizer.buffer(), state.control.is_recording())
    }
}

/// Size and length of a recording that was just closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StopSummary {
    /// Recording identifier
    pub recording_id: Uuid,
    /// Captured frames
    pub samples: usize,
    /// Seconds between start and stop
    pub duration_s: f64,
}

impl From<&Recording> for StopSummary {
    fn from(recording: &Recording) -> Self {
        Self {
            recording_id: recording.id,
            samples: recording.sample_count,
            duration_s: recording.duration_s.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwingError;
    use crate::sample::{SensorKind, Vec3};
    use chrono::{DateTime, Duration};

    fn batch(start_ms: i64, n: i64) -> Vec<Sample> {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        (0..n)
            .flat_map(|i| {
                let ts = t0 + Duration::milliseconds(start_ms + i * 10);
                [
                    Sample::new(ts, SensorKind::AccelerometerUncalibrated, Vec3::new(i as f64, 0.0, 0.0)),
                    Sample::new(ts, SensorKind::Gyroscope, Vec3::new(1.0, 0.0, 0.0)),
                ]
            })
            .collect()
    }

    #[test]
    fn test_frames_before_start_are_not_captured() {
        let session = SwingSession::new(400, 5, None);
        session.ingest(&batch(0, 3));
        session.start_recording().unwrap();
        session.ingest(&batch(100, 4));

        let StopOutcome::Closed(handle) = session.stop_recording().unwrap() else {
            panic!("expected a closed recording");
        };
        assert_eq!(handle.recording().sample_count, 4);
        assert_eq!(session.live_snapshot().signals.len(), 7);
    }

    #[test]
    fn test_silent_watch_counts_as_observed() {
        let session = SwingSession::new(400, 5, None);
        session.start_recording().unwrap();
        session.ingest(&batch(0, 3));
        let StopOutcome::Closed(no_watch) = session.stop_recording().unwrap() else {
            panic!("expected a closed recording");
        };
        assert_eq!(no_watch.recording().wrist_observed, Some(false));

        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        session.start_recording().unwrap();
        let mut with_watch = batch(100, 3);
        with_watch.push(Sample::new(
            t0 + Duration::milliseconds(105),
            SensorKind::WristMotion,
            Vec3::ZERO,
        ));
        session.ingest(&with_watch);
        let StopOutcome::Closed(handle) = session.stop_recording().unwrap() else {
            panic!("expected a closed recording");
        };
        let recording = handle.recording();
        assert_eq!(recording.wrist_observed, Some(true));

        let metrics = crate::analysis::SwingAnalyzer::new().analyze(recording);
        assert_eq!(metrics.peak_wrist_speed_deg_s, Some(0.0));
    }

    #[test]
    fn test_lifecycle_errors() {
        let session = SwingSession::new(10, 5, None);
        assert!(matches!(session.stop_recording(), Err(SwingError::NotRecording)));
        session.start_recording().unwrap();
        assert!(matches!(session.start_recording(), Err(SwingError::AlreadyRecording)));
        assert!(session.is_recording());
    }

    #[test]
    fn test_live_snapshot_magnitudes() {
        let session = SwingSession::new(2, 5, None);
        session.ingest(&batch(0, 5));

        let snapshot = session.live_snapshot();
        assert_eq!(snapshot.capacity, 2);
        assert_eq!(snapshot.signals.len(), 2);
        assert_eq!(snapshot.magnitudes.accel_uncal, vec![3.0, 4.0]);
        assert_eq!(snapshot.magnitudes.gyro, vec![1.0, 1.0]);
        assert!(!snapshot.recording);
    }

    #[tokio::test]
    async fn test_stop_and_submit_without_data() {
        let session = SwingSession::new(10, 5, None);
        session.start_recording().unwrap();
        assert!(session.stop_and_submit().await.unwrap().is_none());
        assert!(session.recordings().is_empty());
    }

    #[test]
    fn test_ingest_payload_rejects_garbage() {
        let session = SwingSession::new(10, 5, None);
        assert!(session.ingest_payload(b"[]").unwrap().appended == 0);
        assert!(session.ingest_payload(b"42").is_err());
    }
}

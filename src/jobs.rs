//! Background swing analysis with poll-based result handoff.
//!
//! `submit` returns a [`JobId`] immediately and runs the analyzer on a blocking worker.
//! The job map is the only channel between the worker and whoever polls:
//!
//! ```text
//! submit ──▶ jobs[id] = Pending ──▶ spawn_blocking(analyze)
//!                                        │
//!                 ┌──────────────────────┤
//!                 ▼                      ▼
//!            Completed(rec)        Failed{error, rec}
//!                 │                      │
//!                 └── persist, archive ──┘
//!
//! poll(id): Pending stays in the map; a terminal status is removed once returned.
//! ```
//!
//! A panicking analysis never reaches the ingest or control path. The recording is
//! kept, without metrics, in the failed status, the archive and the sink.

use crate::analysis::{Metrics, SwingAnalyzer};
use crate::archive::SharedArchive;
use crate::data::storage::RecordingSink;
use crate::error::{AppResult, SwingError};
use crate::recording::{Recording, RecordingHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifier of one analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// State of an analysis job as seen by a poller.
#[derive(Debug, Clone)]
pub enum JobStatus {
    /// Still running
    Pending,
    /// Analysis finished; the recording carries its metrics
    Completed(Box<Recording>),
    /// Analysis failed; the recording carries no metrics
    Failed {
        /// Failure description
        error: String,
        /// The recording as captured
        recording: Box<Recording>,
    },
}

impl JobStatus {
    /// True while the job is running.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }
}

/// Analysis step run on the blocking worker.
type AnalysisFn = Arc<dyn Fn(&Recording) -> Metrics + Send + Sync>;

/// Runs analyses in the background and hands results out by job id.
#[derive(Clone)]
pub struct AnalysisQueue {
    analyze: AnalysisFn,
    jobs: Arc<RwLock<HashMap<JobId, JobStatus>>>,
    archive: SharedArchive,
    sink: Option<Arc<dyn RecordingSink>>,
}

impl AnalysisQueue {
    /// Create a queue that archives into `archive` and persists through `sink`.
    pub fn new(archive: SharedArchive, sink: Option<Arc<dyn RecordingSink>>) -> Self {
        let analyzer = SwingAnalyzer::new();
        Self::with_analysis(archive, sink, move |recording| analyzer.analyze(recording))
    }

    pub(crate) fn with_analysis<F>(
        archive: SharedArchive,
        sink: Option<Arc<dyn RecordingSink>>,
        analyze: F,
    ) -> Self
    where
        F: Fn(&Recording) -> Metrics + Send + Sync + 'static,
    {
        Self {
            analyze: Arc::new(analyze),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            archive,
            sink,
        }
    }

    /// Archive receiving finished recordings.
    pub fn archive(&self) -> &SharedArchive {
        &self.archive
    }

    /// Start analyzing a closed recording. Must be called within a Tokio runtime.
    pub async fn submit(&self, handle: RecordingHandle) -> JobId {
        let job_id = JobId::new();
        self.jobs.write().await.insert(job_id, JobStatus::Pending);

        let recording = Arc::new(handle.into_recording());
        info!(
            %job_id,
            recording_id = %recording.id,
            samples = recording.sample_count,
            "Analysis started"
        );

        let analyze = self.analyze.clone();
        let jobs = self.jobs.clone();
        let archive = self.archive.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let worker_copy = recording.clone();
            let result =
                tokio::task::spawn_blocking(move || analyze(&worker_copy)).await;

            let mut recording =
                Arc::try_unwrap(recording).unwrap_or_else(|shared| (*shared).clone());

            let failure = match result {
                Ok(metrics) => {
                    info!(
                        %job_id,
                        feedback = %metrics.swing_feedback,
                        time_to_peak_hip_speed_ms = ?metrics.time_to_peak_hip_speed_ms,
                        "Analysis finished"
                    );
                    recording.metrics = Some(metrics);
                    None
                }
                Err(e) => {
                    error!(%job_id, recording_id = %recording.id, "Analysis failed: {}", e);
                    Some(format!("analysis failed: {}", e))
                }
            };

            if let Some(sink) = &sink {
                if let Err(e) = sink.persist(&recording).await {
                    warn!(%job_id, sink = sink.name(), "Failed to persist recording: {}", e);
                }
            }

            archive.write().append(recording.clone());

            let status = match failure {
                None => JobStatus::Completed(Box::new(recording)),
                Some(error) => JobStatus::Failed {
                    error,
                    recording: Box::new(recording),
                },
            };
            jobs.write().await.insert(job_id, status);
        });

        job_id
    }

    /// Current status of a job. Terminal statuses are handed out once.
    pub async fn poll(&self, job_id: JobId) -> AppResult<JobStatus> {
        let mut jobs = self.jobs.write().await;
        let status = jobs
            .remove(&job_id)
            .ok_or(SwingError::JobNotFound(job_id))?;
        if status.is_pending() {
            jobs.insert(job_id, JobStatus::Pending);
        }
        Ok(status)
    }

    /// Poll every `interval` until the job leaves `Pending`.
    pub async fn wait(&self, job_id: JobId, interval: Duration) -> AppResult<JobStatus> {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let status = self.poll(job_id).await?;
            if !status.is_pending() {
                return Ok(status);
            }
        }
    }

    /// Number of jobs still running or not yet collected.
    pub async fn outstanding(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl fmt::Debug for AnalysisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisQueue")
            .field("sink", &self.sink.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}

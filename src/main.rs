//! CLI Entry Point for swing_daq
//!
//! Provides command-line interface for:
//! - Running the HTTP receiver that phones and watches stream to
//! - Replaying captured payload files through the pipeline
//! - Simulating swings with the seeded mock source
//! - Re-analyzing a persisted recording
//!
//! # Usage
//!
//! ```bash
//! swing_daq serve --port 8000
//! swing_daq replay captures/*.json
//! swing_daq simulate --seed 7 --swings 3
//! swing_daq analyze storage/recording_20240101_120000.json
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use swing_daq::analysis::{Metrics, SwingAnalyzer};
use swing_daq::config::{AppConfig, DEFAULT_CONFIG_PATH};
use swing_daq::data::storage::load_recording;
use swing_daq::jobs::JobStatus;
use swing_daq::mock::MockSwingSource;
use swing_daq::recording::Recording;
use swing_daq::tracing_config::{self, OutputFormat, TracingConfig};
use swing_daq::{SwingError, SwingSession};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "swing_daq")]
#[command(about = "Multi-sensor swing capture and timing analysis", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP receiver
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ingest payload files inside one recording and print the metrics
    Replay {
        /// Transport messages, one per file or one per line
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Record synthetic swings from the mock source
    Simulate {
        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Number of swings to record
        #[arg(long, default_value_t = 1)]
        swings: usize,

        /// Milliseconds of samples per transport message
        #[arg(long, default_value_t = 100)]
        batch_ms: i64,
    },

    /// Re-run the analyzer over a persisted recording
    Analyze {
        /// Recording JSON file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let mut logging = TracingConfig::from_app_config(&config).map_err(|e| anyhow!(e))?;
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    tracing_config::init(logging).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(&config).await
        }
        Commands::Replay { files } => replay(&config, &files).await,
        Commands::Simulate {
            seed,
            swings,
            batch_ms,
        } => simulate(&config, seed, swings, batch_ms).await,
        Commands::Analyze { file } => analyze(&file).await,
    }
}

#[cfg(feature = "networking")]
async fn serve(config: &AppConfig) -> Result<()> {
    let addr: std::net::SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server_addr()))?;
    let session = SwingSession::from_config(config)?;
    info!(
        buffer_capacity = config.acquisition.buffer_capacity,
        archive_capacity = config.archive.capacity,
        "Starting {}",
        config.application.name
    );

    tokio::select! {
        result = swing_daq::server::serve(session, addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

#[cfg(not(feature = "networking"))]
async fn serve(_config: &AppConfig) -> Result<()> {
    Err(anyhow!(
        "the receiver requires the 'networking' feature; rebuild with --features networking"
    ))
}

async fn replay(config: &AppConfig, files: &[PathBuf]) -> Result<()> {
    let session = SwingSession::from_config(config)?;
    session.start_recording()?;

    for file in files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        ingest_file(&session, file, &bytes);
    }

    finish_recording(&session).await
}

/// Ingest a file holding one message, falling back to one message per line.
fn ingest_file(session: &SwingSession, path: &Path, bytes: &[u8]) {
    match session.ingest_payload(bytes) {
        Ok(stats) => info!(file = %path.display(), appended = stats.appended, "Replayed"),
        Err(SwingError::Serialization(_)) => {
            let mut appended = 0;
            for line in bytes.split(|b| *b == b'\n') {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match session.ingest_payload(line) {
                    Ok(stats) => appended += stats.appended,
                    Err(e) => warn!(file = %path.display(), "Skipping line: {}", e),
                }
            }
            info!(file = %path.display(), appended, "Replayed line-delimited messages");
        }
        Err(e) => warn!(file = %path.display(), "Skipping file: {}", e),
    }
}

async fn simulate(config: &AppConfig, seed: u64, swings: usize, batch_ms: i64) -> Result<()> {
    let session = SwingSession::from_config(config)?;
    let mut source = MockSwingSource::new(seed);

    for swing in 1..=swings {
        info!(swing, seed, "Simulating swing");
        session.ingest(&source.idle(500));
        session.start_recording()?;

        let mut samples = source.idle(300);
        samples.extend(source.swing());
        for batch in MockSwingSource::batches(samples, batch_ms) {
            let message = source.envelope(&batch);
            session.ingest_payload(message.to_string().as_bytes())?;
        }

        finish_recording(&session).await?;
    }
    Ok(())
}

async fn analyze(file: &Path) -> Result<()> {
    let recording = load_recording(file)
        .await
        .with_context(|| format!("loading {}", file.display()))?;
    let metrics = SwingAnalyzer::new().analyze(&recording);
    print_metrics(&recording, &metrics);
    Ok(())
}

async fn finish_recording(session: &SwingSession) -> Result<()> {
    let Some((job_id, summary)) = session.stop_and_submit().await? else {
        println!("No data captured.");
        return Ok(());
    };
    println!(
        "Recorded {} frames over {:.2} s; analyzing (job {})",
        summary.samples, summary.duration_s, job_id
    );

    match session.queue().wait(job_id, POLL_INTERVAL).await? {
        JobStatus::Completed(recording) => {
            let metrics = recording.metrics.clone().unwrap_or_default();
            print_metrics(&recording, &metrics);
            Ok(())
        }
        JobStatus::Failed { error, .. } => Err(anyhow!(error)),
        JobStatus::Pending => Err(anyhow!("job {} still pending", job_id)),
    }
}

fn print_metrics(recording: &Recording, metrics: &Metrics) {
    println!();
    println!("Recording {}", recording.id);
    println!("  samples:                 {}", recording.sample_count);
    println!("  feedback:                {}", metrics.swing_feedback);
    if let Some(t) = metrics.time_to_peak_hip_speed_ms {
        println!("  heel strike -> hip peak: {:.1} ms", t);
    }
    if let Some(t) = metrics.time_hip_speed_to_max_accel_ms {
        println!("  max force -> hip peak:   {:.1} ms", t);
    }
    if let Some(speed) = metrics.peak_hip_speed_deg_s {
        let direction = metrics
            .hip_rotation_direction
            .map(|d| format!("{:?}", d).to_uppercase())
            .unwrap_or_default();
        println!("  peak hip speed:          {:.1} deg/s {}", speed, direction);
    }
    if let Some(speed) = metrics.peak_wrist_speed_deg_s {
        println!("  peak wrist speed:        {:.1} deg/s", speed);
    }
    if let Some(t) = metrics.time_to_peak_wrist_speed_ms {
        println!("  heel strike -> wrist:    {:.1} ms", t);
    }
    if metrics.heel_strike_fallback {
        println!("  (heel strike fell back to the max-force sample)");
    }
}

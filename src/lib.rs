//! # Swing DAQ Core Library
//!
//! Acquisition and analysis core for a two-device baseball swing capture rig: a body-worn
//! phone streams accelerometer and gyroscope readings, a wrist-worn watch streams its
//! rotation rate. The library merges those streams into one gap-filled time series,
//! records bounded sessions on command and detects the timing of the swing in the
//! background.
//!
//! ## Crate Structure
//!
//! - **`sample`**: Sensor readings and transport envelope parsing.
//! - **`data`**: The rolling multi-channel `FrameBuffer`, the `StreamSynchronizer` that
//!   feeds it, and the durable recording form with its storage writers.
//! - **`recording`**: The `Recording` type and the start/stop capture gate.
//! - **`analysis`**: The `SwingAnalyzer`: heel strike, peak force, peak hip and wrist
//!   angular speed, timing feedback.
//! - **`archive`**: The last few analyzed recordings, most recent first.
//! - **`jobs`**: Background analysis with submit/poll by job id.
//! - **`session`**: `SwingSession`, the shared handle that serializes all live-state
//!   mutation.
//! - **`mock`**: Seeded synthetic sensor source.
//! - **`server`**: HTTP receiver (feature `networking`).
//! - **`config`**, **`tracing_config`**, **`error`**: configuration, logging and the
//!   crate-wide `SwingError`.

pub mod analysis;
pub mod archive;
pub mod config;
pub mod data;
pub mod error;
pub mod jobs;
pub mod math;
pub mod mock;
pub mod recording;
pub mod sample;
pub mod session;
pub mod tracing_config;

#[cfg(feature = "networking")]
pub mod server;

pub use error::{AppResult, SwingError};
pub use session::SwingSession;

//! Live buffering, stream synchronization and persistence.
pub mod ring_buffer;
pub mod storage;
pub mod synchronizer;

//! # Error Types
//!
//! This module provides the error types used throughout the cueio library.
//! It defines a central error type `CueError` that covers every failure the
//! packaging core can produce, from malformed SCTE-35 sections to playlist
//! I/O problems.
//!
//! ## Example Usage
//!
//! ```rust
//! use cueio::error::{Result, CueError};
//!
//! fn check_section(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(CueError::MalformedSection("empty section".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the cueio library
#[derive(Error, Debug)]
pub enum CueError {
    /// I/O errors that occur during playlist or segment file operations
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A SCTE-35 section whose length counters, descriptor loop, or bit
    /// layout do not add up
    #[error("malformed section: {0}")]
    MalformedSection(String),

    /// A splice command type other than splice_insert (5) or time_signal (6)
    #[error("unsupported splice command type {0}")]
    UnsupportedCommand(u8),

    /// A video key frame arrived at a sync point that could not be promoted,
    /// meaning the input streams do not share GOP boundaries
    #[error("streams are not properly GOP-aligned: {0}")]
    NotGopAligned(String),

    /// A per-stream sample buffer exceeded its bound, meaning the inputs are
    /// not interleaved closely enough to merge
    #[error("streams are not properly multiplexed: {0}")]
    StreamsNotMultiplexed(String),

    /// Media info without any usable time scale
    #[error("no timescale: {0}")]
    NoTimescale(String),

    /// The sync point queue was cancelled while a caller was waiting
    #[error("cancelled")]
    Cancelled,

    /// A notifier call referenced an unknown or mismatched stream
    #[error("invalid stream: {0}")]
    InvalidStream(String),
}

/// A specialized Result type for cueio operations.
pub type Result<T> = std::result::Result<T, CueError>;

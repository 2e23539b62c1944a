//! Core media abstractions shared by the alignment and playlist layers.
//!
//! A stream is described by a [`StreamInfo`] (its kind and time scale) and
//! produces a sequence of [`Sample`]s. Timestamps are integers in the
//! stream's own time scale; conversion to seconds happens at the alignment
//! boundary where streams with different clocks must agree on cue placement.

/// The kind of elementary stream flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// A video elementary stream. At most one per alignment handler.
    Video,
    /// An audio elementary stream.
    Audio,
    /// A text/subtitle stream carrying timed cues.
    Text,
}

/// Static description of one input stream.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// What kind of samples this stream produces
    pub stream_type: StreamType,
    /// Ticks per second for all timestamps on this stream
    pub time_scale: u32,
}

impl StreamInfo {
    /// Creates stream info with the given type and time scale.
    pub fn new(stream_type: StreamType, time_scale: u32) -> Self {
        Self {
            stream_type,
            time_scale,
        }
    }
}

/// Media sample types (audio/video/text) and their metadata.
pub mod sample;
pub use sample::{MediaSample, Sample, TextSample};

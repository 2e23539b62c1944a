//! # Cue Alignment and Synchronization
//!
//! This module aligns ad-break cues across parallel elementary streams:
//!
//! - [`CueEvent`]: a normalized cue point in seconds on the output timeline
//! - [`SyncPointQueue`]: the rendezvous between cue producers and the
//!   per-stream consumers waiting at a time horizon
//! - [`CueAlignmentHandler`]: the merge coordinator that interleaves
//!   samples and cues so every stream splits at the same instant
//!
//! The handler guarantees that for each stream the boundary between the
//! last pre-cue sample and the cue itself is the same real time across all
//! streams, to within one video frame.

use std::sync::Arc;

use crate::av::Sample;
use crate::error::Result;
use crate::scte35::SpliceInfoSection;

/// Kind of a cue event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueEventType {
    /// A configured ad placement opportunity without SCTE-35 payload
    PlacementOpportunity,
    /// A cue derived from an SCTE-35 splice_info_section
    Scte35,
}

/// A normalized cue point on the output timeline.
///
/// Events are immutable once inserted into the [`SyncPointQueue`]; the
/// queue shares them with all subscribers via `Arc`.
#[derive(Debug, Clone)]
pub struct CueEvent {
    /// Cue position in seconds
    pub time_in_seconds: f64,
    /// Ad break duration in seconds (0 when unknown)
    pub duration_in_seconds: f64,
    /// What produced this event
    pub event_type: CueEventType,
    /// The originating section for SCTE-35 events
    pub splice_info: Option<Arc<SpliceInfoSection>>,
    /// Set on scheduler-generated ad-break END events that fire when no
    /// explicit END signal arrives before `start + duration`
    pub synthetic_end: bool,
}

impl CueEvent {
    /// A placement opportunity cue at the given time.
    pub fn placement_opportunity(time_in_seconds: f64, duration_in_seconds: f64) -> Self {
        Self {
            time_in_seconds,
            duration_in_seconds,
            event_type: CueEventType::PlacementOpportunity,
            splice_info: None,
            synthetic_end: false,
        }
    }

    /// A cue wrapping an SCTE-35 section.
    pub fn scte35(
        time_in_seconds: f64,
        duration_in_seconds: f64,
        splice_info: Arc<SpliceInfoSection>,
    ) -> Self {
        Self {
            time_in_seconds,
            duration_in_seconds,
            event_type: CueEventType::Scte35,
            splice_info: Some(splice_info),
            synthetic_end: false,
        }
    }

    /// The scheduled END for an ad break whose explicit END may never
    /// arrive. Shares the START's section so downstream consumers can
    /// still see the originating event.
    pub fn synthetic_end(
        time_in_seconds: f64,
        duration_in_seconds: f64,
        splice_info: Arc<SpliceInfoSection>,
    ) -> Self {
        Self {
            time_in_seconds,
            duration_in_seconds,
            event_type: CueEventType::Scte35,
            splice_info: Some(splice_info),
            synthetic_end: true,
        }
    }

    /// True when dispatching this cue opens an ad break.
    pub fn is_ad_start(&self) -> bool {
        !self.synthetic_end
            && self
                .splice_info
                .as_deref()
                .and_then(|s| s.segmentation())
                .map(|d| d.is_ad_start())
                .unwrap_or(false)
    }

    /// True when dispatching this cue closes an ad break.
    pub fn is_ad_end(&self) -> bool {
        self.synthetic_end
            || self
                .splice_info
                .as_deref()
                .and_then(|s| s.segmentation())
                .map(|d| d.is_ad_end())
                .unwrap_or(false)
    }

    /// The segmentation event id of the originating descriptor, if any.
    pub fn segmentation_event_id(&self) -> Option<u32> {
        self.splice_info
            .as_deref()
            .and_then(|s| s.segmentation())
            .map(|d| d.segmentation_event_id)
    }
}

/// Downstream receiver of the alignment handler's ordered output.
///
/// One sink serves all streams of a handler; implementations fan samples
/// and cues out to per-stream muxers or playlist notifiers.
pub trait StreamSink: Send {
    /// A sample leaving the handler in aligned order.
    fn on_sample(&mut self, stream_index: usize, sample: Sample) -> Result<()>;

    /// A cue leaving the handler. Every prior sample on `stream_index`
    /// with a time before the cue has already been dispatched.
    fn on_cue(&mut self, stream_index: usize, cue: Arc<CueEvent>) -> Result<()>;

    /// The stream is done; release any buffered output.
    fn on_flush(&mut self, stream_index: usize) -> Result<()>;
}

/// Cue alignment handler that maps SCTE-35 events onto chunk boundaries.
pub mod cue_alignment;
/// Thread-safe queue for synchronizing cue events across streams.
pub mod sync_queue;

pub use cue_alignment::{CueAlignmentHandler, CueState};
pub use sync_queue::{SyncPointQueue, ThreadToken};

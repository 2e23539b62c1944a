#![doc(html_root_url = "https://docs.rs/cueio/0.1.0")]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # cueio - Rust SCTE-35 Cue Packaging Toolkit
//!
//! `cueio` implements the ad-insertion core of a live/VOD streaming
//! packager: it parses SCTE-35 cue messages out of an MPEG-2 Transport
//! Stream, aligns the resulting cue points across parallel audio, video,
//! and text elementary streams at GOP boundaries, and emits the cues into
//! standards-compliant HLS media playlists.
//!
//! ## Features
//!
//! ### SCTE-35 Parsing
//! - Bit-exact splice_info_section decoding (splice_insert, time_signal)
//! - Segmentation descriptors with UPIDs, delivery restrictions, and
//!   segment numbering
//! - Encrypted-section tolerance and CRC-32 validation
//! - Canonical re-serialization of decoded sections
//!
//! ### Cue Alignment
//! - Sync-point queue with blocking waits, promotion, and cancellation
//! - Video-anchored GOP alignment and no-video convergence
//! - Per-stream merge of samples and cues in globally coherent order
//!
//! ### HLS Output
//! - Per-stream media playlists with byte ranges, encryption keys,
//!   i-frames-only mode, and ad-break signalling tags
//! - Live sliding window with discontinuity tracking and segment
//!   preservation
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cueio = "0.1.0"
//! ```
//!
//! ### Parsing SCTE-35 Sections
//!
//! ```rust
//! use cueio::scte35::{Scte35Parser, SectionFramer, SpliceInfoSection};
//!
//! let parser = Scte35Parser::new(0x1F0, |pid: u16, section: SpliceInfoSection| {
//!     println!("pid {}: splice at {:?}s", pid, section.splice_time_in_seconds());
//! });
//! let mut framer = SectionFramer::new(parser);
//! // Feed TS packet payloads from the demuxer:
//! // framer.parse(payload_unit_start, payload)?;
//! # let _ = framer;
//! ```
//!
//! ### Writing a Media Playlist
//!
//! ```rust
//! use cueio::hls::{HlsParams, MediaPlaylist, MediaInfo, VideoInfo};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut playlist = MediaPlaylist::new(HlsParams::default(), "video.m3u8", "video", "");
//! playlist.set_media_info(MediaInfo {
//!     video_info: Some(VideoInfo {
//!         codec: "avc1.64001f".to_string(),
//!         time_scale: 90_000,
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! })?;
//! playlist.add_segment("seg_0.mp4", 0, 900_000, 0, 64_000);
//! let content = playlist.render();
//! assert!(content.starts_with("#EXTM3U\n#EXT-X-VERSION:6\n"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: Shared media abstractions
//!   - Stream descriptions and time scales
//!   - Media and text samples
//!
//! - `scte35`: SCTE-35 splice information
//!   - Section parsing and serialization
//!   - TS private-section reassembly
//!
//! - `chunking`: Cue alignment
//!   - Sync-point queue and cue events
//!   - The multi-stream alignment handler
//!
//! - `hls`: Playlist output
//!   - Media playlist accumulation and rendering
//!   - The notifier surface driven by muxers
//!
//! - `error`: Error handling types and utilities
//!
//! - `utils`: Bit reading and CRC calculation

/// Shared media abstractions: streams and samples
pub mod av;

/// Cue events, the sync-point queue, and the alignment handler
pub mod chunking;

/// Error types and utilities
pub mod error;

/// HLS media playlist generation
pub mod hls;

/// SCTE-35 splice information parsing and serialization
pub mod scte35;

/// Common utilities and helper functions
pub mod utils;

pub use error::{CueError, Result};

/// Project URL advertised in generated playlists.
pub const PROJECT_URL: &str = "https://github.com/cueio/cueio";

/// Crate version advertised in generated playlists.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

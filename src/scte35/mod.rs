//! # SCTE-35 Digital Program Insertion Cueing
//!
//! This module provides a bit-exact implementation of the SCTE-35
//! splice_info_section as carried in MPEG-2 Transport Streams, including:
//!
//! - splice_insert() and time_signal() command decoding
//! - segmentation_descriptor() parsing with delivery restrictions, UPIDs,
//!   and segment numbering
//! - encrypted-section tolerance (stuffing and E-CRC accounting)
//! - CRC-32 validation and exact length bookkeeping
//! - canonical re-serialization of decoded sections
//! - private-section reassembly from TS packet payloads
//!
//! ## Example Usage
//!
//! ```rust
//! use cueio::scte35::{Scte35Parser, SectionFramer, SpliceInfoSection};
//!
//! let parser = Scte35Parser::new(0x1F0, |pid: u16, section: SpliceInfoSection| {
//!     println!("pid {}: splice at {:?}", pid, section.splice_pts());
//! });
//! let mut framer = SectionFramer::new(parser);
//!
//! // Feed TS packet payloads as the demuxer produces them:
//! // framer.parse(payload_unit_start, payload)?;
//! # let _ = framer;
//! ```

/// Low-level section parsing and TS payload reassembly
pub mod parser;

/// Decoded SCTE-35 types and canonical serialization
pub mod types;

pub use parser::{parse_splice_info_section, Scte35Parser, SectionFramer, SpliceInfoHandler};
pub use types::{
    BreakDuration, DeliveryRestrictions, InsertComponent, SegmentationComponent,
    SegmentationDescriptor, SegmentationUpid, SpliceCommand, SpliceInfoSection, SpliceInsert,
    SpliceTime, SCTE35_TICKS_PER_SECOND, TABLE_ID_SCTE35,
};

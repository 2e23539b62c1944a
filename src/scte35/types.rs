use bytes::{BufMut, BytesMut};

use crate::utils::crc::crc32_mpeg2;

// Table IDs and identifiers
/// Table ID carried by every splice_info_section
pub const TABLE_ID_SCTE35: u8 = 0xFC;
/// Identifier required on segmentation descriptors ("CUEI")
pub const SPLICE_IDENTIFIER_CUEI: u32 = 0x43554549;

// Splice command types
/// splice_insert() command type
pub const SPLICE_COMMAND_INSERT: u8 = 5;
/// time_signal() command type
pub const SPLICE_COMMAND_TIME_SIGNAL: u8 = 6;

// Descriptor tags
/// segmentation_descriptor() tag
pub const DESCRIPTOR_TAG_SEGMENTATION: u8 = 0x02;

/// Clock frequency for splice times, in Hz
pub const SCTE35_TICKS_PER_SECOND: u64 = 90_000;

/// Splice times are carried as 33-bit values and wrap at 2^33.
pub const PTS_33BIT_MASK: u64 = (1 << 33) - 1;

/// splice_time(): an optional 33-bit presentation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceTime {
    /// PTS in 90 kHz ticks when the time_specified_flag was set
    pub pts_time: Option<u64>,
}

impl SpliceTime {
    /// A splice time at the given 90 kHz tick count.
    pub fn at(pts_time: u64) -> Self {
        Self {
            pts_time: Some(pts_time & PTS_33BIT_MASK),
        }
    }

    /// An immediate splice time (no PTS specified).
    pub fn immediate() -> Self {
        Self { pts_time: None }
    }
}

/// break_duration(): how long a splice break lasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakDuration {
    /// Whether the splicer should return automatically when the duration
    /// elapses
    pub auto_return: bool,
    /// Break length in 90 kHz ticks (33 bits)
    pub duration: u64,
}

/// One entry of the splice_insert component loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertComponent {
    /// Elementary stream this entry applies to
    pub component_tag: u8,
    /// Per-component splice time; absent when the splice is immediate
    pub splice_time: Option<SpliceTime>,
}

/// splice_insert() command payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceInsert {
    /// Unique event identifier
    pub splice_event_id: u32,
    /// A previously sent event with this ID is being cancelled
    pub splice_event_cancel_indicator: bool,
    /// True when leaving the network feed (ad start), false when returning
    pub out_of_network_indicator: bool,
    /// The splice applies to the whole program rather than components
    pub program_splice_flag: bool,
    /// Splice at the earliest opportunity instead of at a signalled time
    pub splice_immediate_flag: bool,
    /// Program-level splice time (program_splice_flag set, not immediate)
    pub splice_time: Option<SpliceTime>,
    /// Component-level splice entries (program_splice_flag clear)
    pub components: Vec<InsertComponent>,
    /// Break duration when the duration_flag was set
    pub break_duration: Option<BreakDuration>,
    /// Identifies the program within the transport stream
    pub unique_program_id: u16,
    /// Avail number within the current avail set
    pub avail_num: u8,
    /// Expected count of avails in the set
    pub avails_expected: u8,
}

/// The decoded splice command of a section.
///
/// Only splice_insert and time_signal are modelled; every other command
/// type fails the parse with `UnsupportedCommand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceCommand {
    /// splice_insert(), classic cue-in/cue-out signalling
    Insert(SpliceInsert),
    /// time_signal(), a bare timestamp qualified by descriptors
    TimeSignal(SpliceTime),
}

impl SpliceCommand {
    /// The wire command type value for this command.
    pub fn command_type(&self) -> u8 {
        match self {
            SpliceCommand::Insert(_) => SPLICE_COMMAND_INSERT,
            SpliceCommand::TimeSignal(_) => SPLICE_COMMAND_TIME_SIGNAL,
        }
    }

    /// The signalled PTS of this command, before pts_adjustment.
    pub fn pts_time(&self) -> Option<u64> {
        match self {
            SpliceCommand::Insert(insert) => {
                insert.splice_time.as_ref().and_then(|t| t.pts_time)
            }
            SpliceCommand::TimeSignal(time) => time.pts_time,
        }
    }
}

/// Delivery restriction flags of a segmentation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRestrictions {
    /// Distribution over the web is allowed
    pub web_delivery_allowed: bool,
    /// No regional blackout applies
    pub no_regional_blackout: bool,
    /// Recording for later playback is allowed
    pub archive_allowed: bool,
    /// Device group restriction (2 bits)
    pub device_restrictions: u8,
}

/// One entry of the segmentation descriptor component loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationComponent {
    /// Elementary stream this entry applies to
    pub component_tag: u8,
    /// 33-bit PTS offset for the component
    pub pts_offset: u64,
}

/// The UPID carried inside a segmentation descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentationUpid {
    /// segmentation_upid_type
    pub upid_type: u8,
    /// Raw UPID payload bytes
    pub data: Vec<u8>,
}

/// segmentation_descriptor() per SCTE-35 §10.3.3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentationDescriptor {
    /// Unique segmentation event identifier
    pub segmentation_event_id: u32,
    /// A previously sent event with this ID is being cancelled
    pub segmentation_event_cancel_indicator: bool,
    /// Delivery restrictions; `None` when delivery is not restricted
    pub delivery_restrictions: Option<DeliveryRestrictions>,
    /// Component loop (empty when program_segmentation_flag was set)
    pub components: Vec<SegmentationComponent>,
    /// 40-bit segmentation duration in 90 kHz ticks
    pub segmentation_duration: Option<u64>,
    /// The unique program identifier
    pub upid: SegmentationUpid,
    /// segmentation_type_id, classifies the event
    pub segmentation_type_id: u8,
    /// Segment number within the event
    pub segment_num: u8,
    /// Expected count of segments
    pub segments_expected: u8,
    /// Sub-segment numbering, present for some provider placement types
    pub sub_segment: Option<(u8, u8)>,
}

impl SegmentationDescriptor {
    /// True when the segmentation type opens an ad break
    /// (provider/distributor advertisement or placement opportunity start).
    pub fn is_ad_start(&self) -> bool {
        matches!(self.segmentation_type_id, 0x30 | 0x32 | 0x34 | 0x36)
    }

    /// True when the segmentation type closes an ad break.
    pub fn is_ad_end(&self) -> bool {
        matches!(self.segmentation_type_id, 0x31 | 0x33 | 0x35 | 0x37)
    }

    /// Segmentation duration in seconds, if signalled.
    pub fn duration_in_seconds(&self) -> Option<f64> {
        self.segmentation_duration
            .map(|d| d as f64 / SCTE35_TICKS_PER_SECOND as f64)
    }

    /// UPID rendered for playlist signalling: type, length, and payload.
    pub fn upid_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.upid.data.len());
        out.push(self.upid.upid_type);
        out.push(self.upid.data.len() as u8);
        out.extend_from_slice(&self.upid.data);
        out
    }

    fn payload_len(&self) -> usize {
        // identifier + event id + cancel byte
        let mut len = 4 + 4 + 1;
        if !self.segmentation_event_cancel_indicator {
            len += 1; // flags byte
            if !self.components.is_empty() {
                len += 1 + self.components.len() * 6;
            }
            if self.segmentation_duration.is_some() {
                len += 5;
            }
            len += 2 + self.upid.data.len();
            len += 3; // type id + segment num + segments expected
            if self.sub_segment.is_some() {
                len += 2;
            }
        }
        len
    }

    /// Writes the descriptor, including tag and length bytes, to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(DESCRIPTOR_TAG_SEGMENTATION);
        buf.put_u8(self.payload_len() as u8);
        buf.put_u32(SPLICE_IDENTIFIER_CUEI);
        buf.put_u32(self.segmentation_event_id);
        buf.put_u8(if self.segmentation_event_cancel_indicator {
            0xFF
        } else {
            0x7F
        });
        if self.segmentation_event_cancel_indicator {
            return;
        }

        let program_segmentation = self.components.is_empty();
        let mut flags = 0u8;
        if program_segmentation {
            flags |= 0x80;
        }
        if self.segmentation_duration.is_some() {
            flags |= 0x40;
        }
        match &self.delivery_restrictions {
            None => {
                // delivery_not_restricted + 5 reserved bits
                flags |= 0x20 | 0x1F;
            }
            Some(r) => {
                if r.web_delivery_allowed {
                    flags |= 0x10;
                }
                if r.no_regional_blackout {
                    flags |= 0x08;
                }
                if r.archive_allowed {
                    flags |= 0x04;
                }
                flags |= r.device_restrictions & 0x03;
            }
        }
        buf.put_u8(flags);

        if !program_segmentation {
            buf.put_u8(self.components.len() as u8);
            for component in &self.components {
                buf.put_u8(component.component_tag);
                let offset = component.pts_offset & PTS_33BIT_MASK;
                buf.put_u8(0xFE | ((offset >> 32) as u8 & 0x01));
                buf.put_u32(offset as u32);
            }
        }

        if let Some(duration) = self.segmentation_duration {
            buf.put_u8((duration >> 32) as u8);
            buf.put_u32(duration as u32);
        }

        buf.put_u8(self.upid.upid_type);
        buf.put_u8(self.upid.data.len() as u8);
        buf.put_slice(&self.upid.data);

        buf.put_u8(self.segmentation_type_id);
        buf.put_u8(self.segment_num);
        buf.put_u8(self.segments_expected);

        if let Some((num, expected)) = self.sub_segment {
            buf.put_u8(num);
            buf.put_u8(expected);
        }
    }
}

/// A decoded SCTE-35 splice_info_section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInfoSection {
    /// Always 0xFC for SCTE-35
    pub table_id: u8,
    /// section_syntax_indicator (0 for SCTE-35)
    pub section_syntax_indicator: bool,
    /// private_indicator (0 for SCTE-35)
    pub private_indicator: bool,
    /// Length of the section after this field
    pub section_length: u16,
    /// SCTE-35 protocol version (0)
    pub protocol_version: u8,
    /// The section body past pts_adjustment is encrypted
    pub encrypted_packet: bool,
    /// Encryption algorithm identifier (6 bits)
    pub encryption_algorithm: u8,
    /// 33-bit offset added to every splice time in the section
    pub pts_adjustment: u64,
    /// Control word index for encrypted sections
    pub cw_index: u8,
    /// Authorization tier (12 bits)
    pub tier: u16,
    /// Byte length of the splice command
    pub splice_command_length: u16,
    /// Wire value of the command type
    pub splice_command_type: u8,
    /// The decoded splice command
    pub command: SpliceCommand,
    /// Declared byte length of the descriptor loop
    pub descriptor_loop_length: u16,
    /// Parsed segmentation descriptors (unknown descriptor tags are skipped)
    pub descriptors: Vec<SegmentationDescriptor>,
    /// Count of alignment stuffing bytes on encrypted sections
    pub alignment_stuffing_bytes: u8,
    /// Encrypted-section CRC, present iff encrypted_packet
    pub e_crc_32: Option<u32>,
    /// Section CRC-32
    pub crc_32: u32,
}

impl SpliceInfoSection {
    /// Creates a section around the given command with SCTE-35 defaults.
    /// Length and CRC fields are placeholders until `write_to` computes
    /// them canonically.
    pub fn new(command: SpliceCommand) -> Self {
        Self {
            table_id: TABLE_ID_SCTE35,
            section_syntax_indicator: false,
            private_indicator: false,
            section_length: 0,
            protocol_version: 0,
            encrypted_packet: false,
            encryption_algorithm: 0,
            pts_adjustment: 0,
            cw_index: 0,
            tier: 0xFFF,
            splice_command_length: 0,
            splice_command_type: command.command_type(),
            command,
            descriptor_loop_length: 0,
            descriptors: Vec::new(),
            alignment_stuffing_bytes: 0,
            e_crc_32: None,
            crc_32: 0,
        }
    }

    /// Sets the pts_adjustment field.
    pub fn with_pts_adjustment(mut self, pts_adjustment: u64) -> Self {
        self.pts_adjustment = pts_adjustment & PTS_33BIT_MASK;
        self
    }

    /// Appends a segmentation descriptor.
    pub fn with_descriptor(mut self, descriptor: SegmentationDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// The splice presentation time with pts_adjustment applied, wrapping
    /// at 33 bits. `None` for immediate splices and unspecified times.
    pub fn splice_pts(&self) -> Option<u64> {
        self.command
            .pts_time()
            .map(|pts| (pts + self.pts_adjustment) & PTS_33BIT_MASK)
    }

    /// The splice time in seconds on the 90 kHz clock.
    pub fn splice_time_in_seconds(&self) -> Option<f64> {
        self.splice_pts()
            .map(|pts| pts as f64 / SCTE35_TICKS_PER_SECOND as f64)
    }

    /// The first segmentation descriptor, which classifies the ad break.
    pub fn segmentation(&self) -> Option<&SegmentationDescriptor> {
        self.descriptors.first()
    }

    fn write_command(&self, buf: &mut BytesMut) {
        match &self.command {
            SpliceCommand::TimeSignal(time) => write_splice_time(time, buf),
            SpliceCommand::Insert(insert) => {
                buf.put_u32(insert.splice_event_id);
                buf.put_u8(if insert.splice_event_cancel_indicator {
                    0xFF
                } else {
                    0x7F
                });
                if insert.splice_event_cancel_indicator {
                    return;
                }

                let mut flags = 0x0Fu8; // 4 reserved bits
                if insert.out_of_network_indicator {
                    flags |= 0x80;
                }
                if insert.program_splice_flag {
                    flags |= 0x40;
                }
                if insert.break_duration.is_some() {
                    flags |= 0x20;
                }
                if insert.splice_immediate_flag {
                    flags |= 0x10;
                }
                buf.put_u8(flags);

                if insert.program_splice_flag && !insert.splice_immediate_flag {
                    write_splice_time(
                        insert.splice_time.as_ref().unwrap_or(&SpliceTime::immediate()),
                        buf,
                    );
                }
                if !insert.program_splice_flag {
                    buf.put_u8(insert.components.len() as u8);
                    for component in &insert.components {
                        buf.put_u8(component.component_tag);
                        if !insert.splice_immediate_flag {
                            write_splice_time(
                                component
                                    .splice_time
                                    .as_ref()
                                    .unwrap_or(&SpliceTime::immediate()),
                                buf,
                            );
                        }
                    }
                }
                if let Some(break_duration) = &insert.break_duration {
                    let duration = break_duration.duration & PTS_33BIT_MASK;
                    let mut first = 0x7Eu8; // reserved bits
                    if break_duration.auto_return {
                        first |= 0x80;
                    }
                    buf.put_u8(first | ((duration >> 32) as u8 & 0x01));
                    buf.put_u32(duration as u32);
                }
                buf.put_u16(insert.unique_program_id);
                buf.put_u8(insert.avail_num);
                buf.put_u8(insert.avails_expected);
            }
        }
    }

    /// Serializes the section into canonical SCTE-35 bytes.
    ///
    /// Lengths, the command type, and the CRC-32 are recomputed from the
    /// decoded content; decoding the output yields an equal record. For
    /// encrypted sections the original stuffing bytes are not retained and
    /// are written as zeros.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut command = BytesMut::new();
        self.write_command(&mut command);

        let mut descriptors = BytesMut::new();
        for descriptor in &self.descriptors {
            descriptor.write_to(&mut descriptors);
        }

        // protocol version .. command type = 11 bytes, descriptor loop
        // length = 2 bytes, crc = 4 bytes
        let mut section_length = 11 + command.len() + 2 + descriptors.len() + 4;
        if self.encrypted_packet {
            section_length += self.alignment_stuffing_bytes as usize + 4;
        }

        let start = buf.len();
        buf.put_u8(self.table_id);
        // syntax indicator 0, private indicator 0, 2 reserved bits set
        buf.put_u16(0x3000 | (section_length as u16 & 0x0FFF));
        buf.put_u8(self.protocol_version);

        let mut byte = (self.encryption_algorithm & 0x3F) << 1;
        if self.encrypted_packet {
            byte |= 0x80;
        }
        byte |= ((self.pts_adjustment >> 32) & 0x01) as u8;
        buf.put_u8(byte);
        buf.put_u32(self.pts_adjustment as u32);
        buf.put_u8(self.cw_index);

        // tier (12) + splice_command_length (12)
        let tier_and_length =
            ((self.tier as u32 & 0x0FFF) << 12) | (command.len() as u32 & 0x0FFF);
        buf.put_u8((tier_and_length >> 16) as u8);
        buf.put_u16(tier_and_length as u16);

        buf.put_u8(self.command.command_type());
        buf.put_slice(&command);

        buf.put_u16(descriptors.len() as u16);
        buf.put_slice(&descriptors);

        if self.encrypted_packet {
            buf.put_bytes(0, self.alignment_stuffing_bytes as usize);
            buf.put_u32(self.e_crc_32.unwrap_or(0));
        }

        let crc = crc32_mpeg2(&buf[start..]);
        buf.put_u32(crc);
    }
}

fn write_splice_time(time: &SpliceTime, buf: &mut BytesMut) {
    match time.pts_time {
        Some(pts) => {
            let pts = pts & PTS_33BIT_MASK;
            buf.put_u8(0xFE | ((pts >> 32) as u8 & 0x01));
            buf.put_u32(pts as u32);
        }
        None => buf.put_u8(0x7F),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ad_break_classification() {
        for type_id in [0x30u8, 0x32, 0x34, 0x36] {
            let descriptor = SegmentationDescriptor {
                segmentation_type_id: type_id,
                ..Default::default()
            };
            assert!(descriptor.is_ad_start(), "0x{:02x} should start", type_id);
            assert!(!descriptor.is_ad_end());
        }
        for type_id in [0x31u8, 0x33, 0x35, 0x37] {
            let descriptor = SegmentationDescriptor {
                segmentation_type_id: type_id,
                ..Default::default()
            };
            assert!(descriptor.is_ad_end(), "0x{:02x} should end", type_id);
            assert!(!descriptor.is_ad_start());
        }
        let descriptor = SegmentationDescriptor {
            segmentation_type_id: 0x10,
            ..Default::default()
        };
        assert!(!descriptor.is_ad_start() && !descriptor.is_ad_end());
    }

    #[test]
    fn test_splice_pts_wraps_at_33_bits() {
        let section =
            SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::at(PTS_33BIT_MASK)))
                .with_pts_adjustment(1);
        assert_eq!(section.splice_pts(), Some(0));
    }

    #[test]
    fn test_splice_time_in_seconds() {
        let section = SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::at(90_000)));
        assert_eq!(section.splice_time_in_seconds(), Some(1.0));

        let section =
            SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::immediate()));
        assert_eq!(section.splice_time_in_seconds(), None);
    }

    #[test]
    fn test_upid_bytes_prefix_type_and_length() {
        let descriptor = SegmentationDescriptor {
            upid: SegmentationUpid {
                upid_type: 0x08,
                data: vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x09],
            },
            ..Default::default()
        };
        assert_eq!(
            descriptor.upid_bytes(),
            vec![0x08, 0x08, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x09]
        );
    }

    #[test]
    fn test_time_signal_serialization_layout() {
        let section = SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::at(90_000)));
        let mut buf = BytesMut::new();
        section.write_to(&mut buf);

        assert_eq!(buf[0], TABLE_ID_SCTE35);
        let section_length = (((buf[1] as usize) & 0x0F) << 8) | buf[2] as usize;
        assert_eq!(buf.len(), 3 + section_length);
        // command type byte sits at offset 13
        assert_eq!(buf[13], SPLICE_COMMAND_TIME_SIGNAL);
        // time_specified_flag set
        assert_eq!(buf[14] & 0x80, 0x80);
    }
}

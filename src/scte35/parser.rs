use bytes::BytesMut;
use log::{debug, warn};

use super::types::*;
use crate::error::{CueError, Result};
use crate::utils::bits::BitReader;
use crate::utils::crc::verify_section_crc;

/// Receiver of decoded splice_info_sections.
///
/// Implemented for any `FnMut(u16, SpliceInfoSection)` closure, so simple
/// pipelines can pass a closure while larger ones implement the trait on a
/// dispatcher type.
pub trait SpliceInfoHandler: Send {
    /// Called once per successfully parsed section on the given PID.
    fn on_splice_info(&mut self, pid: u16, section: SpliceInfoSection);
}

impl<F> SpliceInfoHandler for F
where
    F: FnMut(u16, SpliceInfoSection) + Send,
{
    fn on_splice_info(&mut self, pid: u16, section: SpliceInfoSection) {
        self(pid, section)
    }
}

/// Bit-exact parser for one SCTE-35 PID.
///
/// The parser is stateless between sections: each call to [`parse`]
/// decodes one complete private section and hands the result to the
/// handler. Cross-packet buffering up to the section boundary is the
/// [`SectionFramer`]'s job.
///
/// [`parse`]: Scte35Parser::parse
pub struct Scte35Parser<H: SpliceInfoHandler> {
    pid: u16,
    handler: H,
}

impl<H: SpliceInfoHandler> Scte35Parser<H> {
    /// Creates a parser for the given PID.
    pub fn new(pid: u16, handler: H) -> Self {
        debug!("Scte35Parser pid={}", pid);
        Self { pid, handler }
    }

    /// The PID this parser serves.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Parses one complete splice_info_section.
    ///
    /// `data` must start at the table_id byte. `pts` and `dts` come from
    /// the carrying TS packet and may be absent; splice timing is taken
    /// from the section itself. On success the handler is invoked; a CRC
    /// mismatch is logged and the section silently dropped.
    pub fn parse(&mut self, data: &[u8], pts: Option<i64>, dts: Option<i64>) -> Result<()> {
        debug!(
            "pid {}: parsing section of {} bytes (pes pts {:?}, dts {:?})",
            self.pid,
            data.len(),
            pts,
            dts
        );
        let section = parse_splice_info_section(data)?;

        let total_len = section.section_length as usize + 3;
        if !verify_section_crc(&data[..total_len]) {
            warn!(
                "dropping splice_info_section on pid {} with bad CRC (stored 0x{:08x})",
                self.pid, section.crc_32
            );
            return Ok(());
        }

        debug!(
            "pid {}: splice command type {} with {} descriptor(s)",
            self.pid,
            section.splice_command_type,
            section.descriptors.len()
        );
        self.handler.on_splice_info(self.pid, section);
        Ok(())
    }

    /// Discards any in-flight state. The parser keeps none, so this only
    /// exists to mirror the framer's lifecycle.
    pub fn flush(&mut self) {}

    /// See [`flush`](Scte35Parser::flush).
    pub fn reset(&mut self) {}
}

/// Decodes a splice_info_section from `data`, which must start at the
/// table_id byte and contain at least the full section.
pub fn parse_splice_info_section(data: &[u8]) -> Result<SpliceInfoSection> {
    let mut reader = BitReader::new(data);

    let table_id = reader.read_bits(8)? as u8;
    let section_syntax_indicator = reader.read_flag()?;
    let private_indicator = reader.read_flag()?;
    reader.skip_bits(2)?;
    let section_length = reader.read_bits(12)? as u16;
    let protocol_version = reader.read_bits(8)? as u8;
    let encrypted_packet = reader.read_flag()?;
    let encryption_algorithm = reader.read_bits(6)? as u8;
    let pts_adjustment = reader.read_bits(33)?;
    let cw_index = reader.read_bits(8)? as u8;
    let tier = reader.read_bits(12)? as u16;
    let splice_command_length = reader.read_bits(12)? as u16;
    let splice_command_type = reader.read_bits(8)? as u8;

    let command_start = reader.bits_consumed();
    let command = match splice_command_type {
        SPLICE_COMMAND_INSERT => SpliceCommand::Insert(parse_splice_insert(&mut reader)?),
        SPLICE_COMMAND_TIME_SIGNAL => SpliceCommand::TimeSignal(parse_splice_time(&mut reader)?),
        other => {
            return Err(CueError::UnsupportedCommand(other));
        }
    };
    let command_bytes = (reader.bits_consumed() - command_start) / 8;

    // 0xFFF means the length was not signalled (legacy encoders).
    if splice_command_length != 0xFFF && splice_command_length as usize != command_bytes {
        return Err(CueError::MalformedSection(format!(
            "splice command consumed {} bytes, header declared {}",
            command_bytes, splice_command_length
        )));
    }

    let descriptor_loop_length = reader.read_bits(16)? as u16;
    let mut descriptors = Vec::new();
    let mut loop_remaining = descriptor_loop_length as i64;

    while loop_remaining > 0 {
        let tag = reader.read_bits(8)? as u8;
        let descriptor_length = reader.read_bits(8)? as u8;
        let identifier = reader.read_bits(32)? as u32;

        let body_start = reader.bits_consumed();
        if tag != DESCRIPTOR_TAG_SEGMENTATION {
            debug!("skipping splice descriptor with unsupported tag 0x{:02x}", tag);
            skip_descriptor_remainder(&mut reader, descriptor_length, body_start)?;
        } else if identifier != SPLICE_IDENTIFIER_CUEI {
            warn!(
                "skipping segmentation descriptor with identifier 0x{:08x} (want CUEI)",
                identifier
            );
            skip_descriptor_remainder(&mut reader, descriptor_length, body_start)?;
        } else {
            let descriptor =
                parse_segmentation_descriptor(&mut reader, descriptor_length, body_start)?;
            skip_descriptor_remainder(&mut reader, descriptor_length, body_start)?;
            descriptors.push(descriptor);
        }

        loop_remaining -= descriptor_length as i64 + 2;
    }

    if loop_remaining != 0 {
        return Err(CueError::MalformedSection(format!(
            "descriptor loop overran its declared length by {} bytes",
            -loop_remaining
        )));
    }

    let mut alignment_stuffing_bytes = 0u8;
    let mut e_crc_32 = None;
    if encrypted_packet {
        // Everything up to here plus stuffing, e_crc, and crc must equal
        // the declared section length.
        let consumed_bytes = reader.bits_consumed() / 8;
        let section_end = section_length as usize + 3;
        let remaining = section_end
            .checked_sub(consumed_bytes + 8)
            .ok_or_else(|| {
                CueError::MalformedSection("encrypted section shorter than its CRCs".into())
            })?;
        alignment_stuffing_bytes = remaining as u8;
        reader.skip_bytes(remaining)?;
        e_crc_32 = Some(reader.read_bits(32)? as u32);
    }

    let crc_32 = reader.read_bits(32)? as u32;

    let expected_bits = (section_length as usize + 3) * 8;
    if reader.bits_consumed() != expected_bits {
        return Err(CueError::MalformedSection(format!(
            "section consumed {} bits, expected {}",
            reader.bits_consumed(),
            expected_bits
        )));
    }

    Ok(SpliceInfoSection {
        table_id,
        section_syntax_indicator,
        private_indicator,
        section_length,
        protocol_version,
        encrypted_packet,
        encryption_algorithm,
        pts_adjustment,
        cw_index,
        tier,
        splice_command_length,
        splice_command_type,
        command,
        descriptor_loop_length,
        descriptors,
        alignment_stuffing_bytes,
        e_crc_32,
        crc_32,
    })
}

fn parse_splice_time(reader: &mut BitReader) -> Result<SpliceTime> {
    let time_specified = reader.read_flag()?;
    if time_specified {
        reader.skip_bits(6)?;
        Ok(SpliceTime::at(reader.read_bits(33)?))
    } else {
        reader.skip_bits(7)?;
        Ok(SpliceTime::immediate())
    }
}

fn parse_splice_insert(reader: &mut BitReader) -> Result<SpliceInsert> {
    let mut insert = SpliceInsert {
        splice_event_id: reader.read_bits(32)? as u32,
        splice_event_cancel_indicator: reader.read_flag()?,
        ..Default::default()
    };
    reader.skip_bits(7)?;
    if insert.splice_event_cancel_indicator {
        return Ok(insert);
    }

    insert.out_of_network_indicator = reader.read_flag()?;
    insert.program_splice_flag = reader.read_flag()?;
    let duration_flag = reader.read_flag()?;
    insert.splice_immediate_flag = reader.read_flag()?;
    reader.skip_bits(4)?;

    if insert.program_splice_flag && !insert.splice_immediate_flag {
        insert.splice_time = Some(parse_splice_time(reader)?);
    }
    if !insert.program_splice_flag {
        let component_count = reader.read_bits(8)? as usize;
        for _ in 0..component_count {
            let component_tag = reader.read_bits(8)? as u8;
            let splice_time = if insert.splice_immediate_flag {
                None
            } else {
                Some(parse_splice_time(reader)?)
            };
            insert.components.push(InsertComponent {
                component_tag,
                splice_time,
            });
        }
    }
    if duration_flag {
        let auto_return = reader.read_flag()?;
        reader.skip_bits(6)?;
        insert.break_duration = Some(BreakDuration {
            auto_return,
            duration: reader.read_bits(33)?,
        });
    }
    insert.unique_program_id = reader.read_bits(16)? as u16;
    insert.avail_num = reader.read_bits(8)? as u8;
    insert.avails_expected = reader.read_bits(8)? as u8;

    Ok(insert)
}

fn parse_segmentation_descriptor(
    reader: &mut BitReader,
    descriptor_length: u8,
    body_start_bits: usize,
) -> Result<SegmentationDescriptor> {
    let mut descriptor = SegmentationDescriptor {
        segmentation_event_id: reader.read_bits(32)? as u32,
        segmentation_event_cancel_indicator: reader.read_flag()?,
        ..Default::default()
    };
    reader.skip_bits(7)?;
    if descriptor.segmentation_event_cancel_indicator {
        return Ok(descriptor);
    }

    let program_segmentation = reader.read_flag()?;
    let duration_flag = reader.read_flag()?;
    let delivery_not_restricted = reader.read_flag()?;
    if !delivery_not_restricted {
        descriptor.delivery_restrictions = Some(DeliveryRestrictions {
            web_delivery_allowed: reader.read_flag()?,
            no_regional_blackout: reader.read_flag()?,
            archive_allowed: reader.read_flag()?,
            device_restrictions: reader.read_bits(2)? as u8,
        });
    } else {
        reader.skip_bits(5)?;
    }

    if !program_segmentation {
        let component_count = reader.read_bits(8)? as usize;
        for _ in 0..component_count {
            let component_tag = reader.read_bits(8)? as u8;
            reader.skip_bits(7)?;
            descriptor.components.push(SegmentationComponent {
                component_tag,
                pts_offset: reader.read_bits(33)?,
            });
        }
    }

    if duration_flag {
        descriptor.segmentation_duration = Some(reader.read_bits(40)?);
    }

    let upid_type = reader.read_bits(8)? as u8;
    let upid_length = reader.read_bits(8)? as usize;
    let consumed = (reader.bits_consumed() - body_start_bits) / 8;
    // The identifier was consumed by the caller; 3 trailing bytes of
    // numbering still follow the UPID.
    if 4 + consumed + upid_length + 3 > descriptor_length as usize {
        return Err(CueError::MalformedSection(format!(
            "UPID length {} exceeds descriptor length {}",
            upid_length, descriptor_length
        )));
    }
    let mut upid_data = Vec::with_capacity(upid_length);
    for _ in 0..upid_length {
        upid_data.push(reader.read_bits(8)? as u8);
    }
    descriptor.upid = SegmentationUpid {
        upid_type,
        data: upid_data,
    };

    descriptor.segmentation_type_id = reader.read_bits(8)? as u8;
    descriptor.segment_num = reader.read_bits(8)? as u8;
    descriptor.segments_expected = reader.read_bits(8)? as u8;

    // Some encoders append sub-segment numbering to provider placement
    // opportunity events; honor the descriptor length either way.
    let consumed = 4 + (reader.bits_consumed() - body_start_bits) / 8;
    let remaining = descriptor_length as usize - consumed.min(descriptor_length as usize);
    if remaining >= 2 && matches!(descriptor.segmentation_type_id, 0x34 | 0x36) {
        let num = reader.read_bits(8)? as u8;
        let expected = reader.read_bits(8)? as u8;
        descriptor.sub_segment = Some((num, expected));
    }

    Ok(descriptor)
}

fn skip_descriptor_remainder(
    reader: &mut BitReader,
    descriptor_length: u8,
    body_start_bits: usize,
) -> Result<()> {
    // The 4 identifier bytes were read before body_start was taken.
    let consumed = 4 + (reader.bits_consumed() - body_start_bits) / 8;
    let declared = descriptor_length as usize;
    if consumed > declared {
        return Err(CueError::MalformedSection(format!(
            "descriptor consumed {} bytes, declared {}",
            consumed, declared
        )));
    }
    reader.skip_bytes(declared - consumed)
}

/// Reassembles private sections from TS packet payloads.
///
/// The framer waits for a payload-unit-start packet, skips the pointer
/// field, and accumulates payload bytes until `3 + section_length` are
/// available, at which point the section is handed to the parser. A parse
/// failure resets the framer; the next PUSI packet starts a fresh section.
pub struct SectionFramer<H: SpliceInfoHandler> {
    parser: Scte35Parser<H>,
    buffer: BytesMut,
    expected_length: Option<usize>,
    wait_for_pusi: bool,
}

impl<H: SpliceInfoHandler> SectionFramer<H> {
    /// Creates a framer feeding the given parser.
    pub fn new(parser: Scte35Parser<H>) -> Self {
        Self {
            parser,
            buffer: BytesMut::with_capacity(4096),
            expected_length: None,
            wait_for_pusi: true,
        }
    }

    /// Consumes one TS packet payload.
    ///
    /// `pusi` is the packet's payload_unit_start_indicator. Partial
    /// payloads before the first unit start are ignored.
    pub fn parse(&mut self, pusi: bool, payload: &[u8]) -> Result<()> {
        if self.wait_for_pusi && !pusi {
            return Ok(());
        }

        if pusi {
            self.reset();
            self.wait_for_pusi = false;

            if payload.is_empty() {
                return Ok(());
            }
            let pointer = payload[0] as usize;
            if 1 + pointer > payload.len() {
                self.reset();
                return Err(CueError::MalformedSection(
                    "pointer field runs past the packet payload".into(),
                ));
            }
            self.buffer.extend_from_slice(&payload[1 + pointer..]);
        } else {
            self.buffer.extend_from_slice(payload);
        }

        if self.expected_length.is_none() && self.buffer.len() >= 3 {
            let section_length =
                (((self.buffer[1] as usize) & 0x0F) << 8) | self.buffer[2] as usize;
            self.expected_length = Some(3 + section_length);
        }

        if let Some(expected) = self.expected_length {
            if self.buffer.len() >= expected {
                let section = self.buffer.split_to(expected);
                let result = self.parser.parse(&section, None, None);
                self.reset();
                return result;
            }
        }

        Ok(())
    }

    /// Discards the section being built and flushes the parser.
    pub fn flush(&mut self) {
        self.reset();
        self.parser.flush();
    }

    /// Discards the section being built.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_length = None;
        self.wait_for_pusi = true;
        self.parser.reset();
    }
}

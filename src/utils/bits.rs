use crate::error::{CueError, Result};

/// A bit-level reader for parsing binary data streams.
///
/// Implements the network-order bit reading operations the SCTE-35 section
/// parser needs:
/// - Reading individual bits
/// - Reading up to 64 bits as a number (33-bit PTS fields, 40-bit durations)
/// - Skipping bits and whole bytes
/// - Tracking exactly how many bits have been consumed
///
/// Example:
/// ```
/// use cueio::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);    // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    /// Returns true for 1, false for 0.
    ///
    /// Returns error if end of data is reached.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(CueError::MalformedSection("reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits and returns them as a number.
    /// The bits are interpreted as big-endian.
    ///
    /// Returns error if n > 64 or end of data is reached.
    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(CueError::MalformedSection("too many bits requested".into()));
        }

        let mut value = 0u64;
        let n = n as usize;

        for i in 0..n {
            let bit = self.read_bit()?;
            if bit {
                value |= 1 << (n - 1 - i);
            }
        }

        Ok(value)
    }

    /// Reads a boolean flag (a single bit).
    pub fn read_flag(&mut self) -> Result<bool> {
        self.read_bit()
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        let n = n as usize;
        let available = self.available_bits();
        if n > available {
            return Err(CueError::MalformedSection(format!(
                "cannot skip {} bits, only {} available",
                n, available
            )));
        }

        let total = self.byte_offset * 8 + self.bit_offset as usize + n;
        self.byte_offset = total / 8;
        self.bit_offset = (total % 8) as u8;
        Ok(())
    }

    /// Skips n whole bytes in the stream.
    pub fn skip_bytes(&mut self, n: usize) -> Result<()> {
        self.skip_bits((n * 8) as u32)
    }

    /// Aligns reader to next byte boundary by skipping remaining bits in current byte.
    pub fn align_byte(&mut self) -> Result<()> {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
        Ok(())
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        if self.byte_offset >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }

    /// Returns number of bits consumed so far.
    ///
    /// Section parsers use this to assert that a parse consumed exactly
    /// `(section_length + 3) * 8` bits.
    pub fn bits_consumed(&self) -> usize {
        self.byte_offset * 8 + self.bit_offset as usize
    }
}

//! # Utility Functions and Types
//!
//! This module provides common utility functions and types used throughout
//! the cueio library. It includes implementations for:
//!
//! - Bit-level reading of network-order protocol fields
//! - MPEG-2 CRC32 calculation and section validation
//!
//! ## Bit Operations
//!
//! The bits module provides utilities for working with bit-level data:
//!
//! ```rust
//! use cueio::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! // Read specific number of bits
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```
//!
//! ## CRC Calculation
//!
//! The crc module provides the MPEG-2 CRC32 used by SCTE-35 sections:
//!
//! ```rust
//! use cueio::utils::crc32_mpeg2;
//!
//! # fn main() {
//! let data = b"section payload";
//! let crc = crc32_mpeg2(data);
//! println!("CRC32: {:08x}", crc);
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

// Re-export commonly used types
pub use bits::BitReader;
pub use crc::{crc32_mpeg2, verify_section_crc};

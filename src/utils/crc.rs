use lazy_static::lazy_static;

/// CRC32 polynomial for MPEG-2 TS private sections
/// Based on ITU-T H.222.0 / ISO/IEC 13818-1
/// Polynomial: x32 + x26 + x23 + x22 + x16 + x12 + x11 + x10 + x8 + x7 + x5 + x4 + x2 + x + 1
/// Initial value: 0xFFFFFFFF
const CRC32_MPEG2_POLY: u32 = 0x04C11DB7;

lazy_static! {
    static ref CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if (crc & 0x8000_0000) != 0 {
                    (crc << 1) ^ CRC32_MPEG2_POLY
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        table
    };
}

/// Calculates the MPEG-2 CRC32 checksum for the given data.
///
/// SCTE-35 carries this checksum in the last four bytes of every
/// splice_info_section; PSI tables use the same algorithm.
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc >> 24) ^ (byte as u32)) & 0xFF;
        crc = (crc << 8) ^ CRC32_TABLE[index as usize];
    }
    crc
}

/// Verifies the trailing CRC32 of a complete section.
///
/// `section` must include the four CRC bytes. Returns true when the stored
/// checksum matches the computed one.
pub fn verify_section_crc(section: &[u8]) -> bool {
    if section.len() < 4 {
        return false;
    }
    let body = &section[..section.len() - 4];
    let stored = u32::from_be_bytes([
        section[section.len() - 4],
        section[section.len() - 3],
        section[section.len() - 2],
        section[section.len() - 1],
    ]);
    crc32_mpeg2(body) == stored
}

//! SI section framing and CRC validation.
//!
//! All signaling tables consumed by the scanner use the long section
//! syntax: an 8 byte header, the table payload, and a CRC-32/MPEG-2
//! trailer covering everything before it.

use crc::{Crc, CRC_32_MPEG_2};

use crate::error::SiError;

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Smallest valid section_length: 5 header bytes after the length field
/// plus the 4 byte CRC trailer.
pub const MIN_SECTION_LENGTH: u16 = 9;

/// Common section header (long syntax).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section length (12 bits), counted from the byte after this field.
    pub section_length: u16,
    /// Table ID extension (transport stream id, program number, ...).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
}

/// A validated section: header plus the payload between header and CRC.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    /// Section header.
    pub header: SectionHeader,
    /// Payload bytes (after the 8 byte header, before the CRC).
    pub payload: &'a [u8],
    /// CRC32 value from the trailer.
    pub crc32: u32,
}

impl<'a> Section<'a> {
    /// Parse and validate a section delivered by the demux.
    ///
    /// `buf` must start at the table_id byte. The table id is checked
    /// against `expected_table_id`, the declared length against the
    /// buffer, and the CRC against the trailer.
    pub fn parse(buf: &'a [u8], expected_table_id: u8) -> Result<Self, SiError> {
        if buf.len() < 8 {
            return Err(SiError::Truncated {
                needed: 8,
                have: buf.len(),
            });
        }

        let table_id = buf[0];
        if table_id != expected_table_id {
            return Err(SiError::TableIdMismatch {
                expected: expected_table_id,
                got: table_id,
            });
        }

        let total = match Self::declared_length(buf) {
            Some(t) => t,
            None => {
                return Err(SiError::Truncated {
                    needed: 3,
                    have: buf.len(),
                })
            }
        };
        let section_length = (total - 3) as u16;
        if section_length < MIN_SECTION_LENGTH {
            return Err(SiError::InvalidSectionLength(section_length));
        }
        if buf.len() < total {
            return Err(SiError::Truncated {
                needed: total,
                have: buf.len(),
            });
        }

        let stored = u32::from_be_bytes([
            buf[total - 4],
            buf[total - 3],
            buf[total - 2],
            buf[total - 1],
        ]);
        let computed = CRC_MPEG.checksum(&buf[..total - 4]);
        if computed != stored {
            return Err(SiError::Crc { computed, stored });
        }

        let header = SectionHeader {
            table_id,
            section_length,
            table_id_extension: ((buf[3] as u16) << 8) | buf[4] as u16,
            version_number: (buf[5] >> 1) & 0x1F,
            current_next_indicator: buf[5] & 0x01 != 0,
            section_number: buf[6],
            last_section_number: buf[7],
        };

        Ok(Section {
            header,
            payload: &buf[8..total - 4],
            crc32: stored,
        })
    }

    /// Total length a raw buffer claims for its first section, the
    /// 3 byte prefix plus section_length. `None` when the buffer is
    /// too short to carry the length field.
    pub fn declared_length(buf: &[u8]) -> Option<usize> {
        if buf.len() < 3 {
            return None;
        }
        let section_length = ((buf[1] as usize & 0x0F) << 8) | buf[2] as usize;
        Some(3 + section_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_section(
        table_id: u8,
        ext: u16,
        version: u8,
        section_number: u8,
        last_section_number: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let section_length = (5 + payload.len() + 4) as u16;
        let mut buf = Vec::with_capacity(3 + section_length as usize);
        buf.push(table_id);
        buf.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
        buf.push(section_length as u8);
        buf.push((ext >> 8) as u8);
        buf.push(ext as u8);
        buf.push(0xC0 | (version << 1) | 0x01);
        buf.push(section_number);
        buf.push(last_section_number);
        buf.extend_from_slice(payload);
        let crc = CRC_MPEG.checksum(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    #[test]
    fn test_parse_valid_section() {
        let buf = build_section(0x00, 0x1234, 5, 0, 0, &[0xAA, 0xBB, 0xCC, 0xDD]);
        let section = Section::parse(&buf, 0x00).unwrap();

        assert_eq!(section.header.table_id, 0x00);
        assert_eq!(section.header.table_id_extension, 0x1234);
        assert_eq!(section.header.version_number, 5);
        assert_eq!(section.header.section_number, 0);
        assert_eq!(section.header.last_section_number, 0);
        assert_eq!(section.payload, &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_table_id_mismatch_is_hard_error() {
        let buf = build_section(0x42, 0, 0, 0, 0, &[0x00]);
        let err = Section::parse(&buf, 0x00).unwrap_err();
        assert_eq!(
            err,
            SiError::TableIdMismatch {
                expected: 0x00,
                got: 0x42
            }
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_crc_mismatch_is_recoverable() {
        let mut buf = build_section(0x00, 0, 0, 0, 0, &[0x01, 0x02]);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let err = Section::parse(&buf, 0x00).unwrap_err();
        assert!(matches!(err, SiError::Crc { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_truncated_section() {
        let buf = build_section(0x00, 0, 0, 0, 0, &[0x01, 0x02, 0x03]);
        let err = Section::parse(&buf[..buf.len() - 2], 0x00).unwrap_err();
        assert!(matches!(err, SiError::Truncated { .. }));
    }

    #[test]
    fn test_declared_length_frames_concatenated_sections() {
        let first = build_section(0x00, 0, 0, 0, 0, &[0x01]);
        let second = build_section(0x00, 0, 0, 0, 0, &[0x02, 0x03]);
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let split = Section::declared_length(&stream).unwrap();
        assert_eq!(split, first.len());
        assert_eq!(Section::declared_length(&stream[split..]), Some(second.len()));
        assert_eq!(Section::declared_length(&[0x00, 0xB0]), None);
    }

    #[test]
    fn test_undersized_section_length() {
        // section_length of 8 cannot hold header remainder plus CRC
        let buf = [0x00, 0xB0, 0x08, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = Section::parse(&buf, 0x00).unwrap_err();
        assert_eq!(err, SiError::InvalidSectionLength(8));
    }
}

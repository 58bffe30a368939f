//! PMT (Program Map Table) parsing.
//!
//! One PMT section per service, on the PID announced by the PAT. The
//! payload starts with a 4 byte sub-header (PCR PID and program info
//! length) before the elementary stream loop.

use crate::error::SiError;
use crate::section::Section;
use crate::table_id;

/// One elementary stream entry in the PMT.
#[derive(Debug, Clone, Default)]
pub struct PmtStream {
    /// Stream type.
    pub stream_type: u8,
    /// Elementary PID.
    pub pid: u16,
    /// ES info descriptor loop (raw).
    pub es_info: Vec<u8>,
}

/// Parsed PMT section.
#[derive(Debug, Clone, Default)]
pub struct PmtTable {
    /// Program number (table id extension).
    pub program_number: u16,
    /// Version number.
    pub version_number: u8,
    /// PCR PID.
    pub pcr_pid: u16,
    /// Program level descriptor loop (raw).
    pub program_info: Vec<u8>,
    /// Elementary stream loop.
    pub streams: Vec<PmtStream>,
}

impl PmtTable {
    /// Parse a PMT from a validated section.
    pub fn parse(section: &Section) -> Result<Self, SiError> {
        if section.header.table_id != table_id::PMT {
            return Err(SiError::TableIdMismatch {
                expected: table_id::PMT,
                got: section.header.table_id,
            });
        }

        let data = section.payload;
        if data.len() < 4 {
            return Err(SiError::Malformed("PMT sub-header"));
        }

        let pcr_pid = ((data[0] as u16 & 0x1F) << 8) | data[1] as u16;
        let program_info_length = ((data[2] as usize & 0x0F) << 8) | data[3] as usize;

        if data.len() < 4 + program_info_length {
            return Err(SiError::Malformed("PMT program info"));
        }
        let program_info = data[4..4 + program_info_length].to_vec();

        let mut streams = Vec::new();
        let mut offset = 4 + program_info_length;

        while offset + 5 <= data.len() {
            let stream_type = data[offset];
            let pid = ((data[offset + 1] as u16 & 0x1F) << 8) | data[offset + 2] as u16;
            let es_info_length =
                ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;
            offset += 5;

            if offset + es_info_length > data.len() {
                return Err(SiError::Malformed("PMT ES info"));
            }

            streams.push(PmtStream {
                stream_type,
                pid,
                es_info: data[offset..offset + es_info_length].to_vec(),
            });
            offset += es_info_length;
        }

        Ok(PmtTable {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid,
            program_info,
            streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionHeader;

    fn section(payload: &[u8]) -> Section {
        Section {
            header: SectionHeader {
                table_id: table_id::PMT,
                section_length: (5 + payload.len() + 4) as u16,
                table_id_extension: 100,
                version_number: 0,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            },
            payload,
            crc32: 0,
        }
    }

    #[test]
    fn test_parse_pmt() {
        let payload = [
            0xE1, 0x01, // PCR PID 0x0101
            0xF0, 0x06, // program_info_length = 6
            0x09, 0x04, 0x06, 0x04, 0xE5, 0x00, // CA descriptor
            0x02, 0xE1, 0x01, 0xF0, 0x00, // MPEG-2 video, PID 0x0101
            0x04, 0xE1, 0x02, 0xF0, 0x06, // MPEG-2 audio, PID 0x0102
            0x0A, 0x04, b'd', b'e', b'u', 0x00, // ISO 639 "deu"
        ];

        let pmt = PmtTable::parse(&section(&payload)).unwrap();
        assert_eq!(pmt.program_number, 100);
        assert_eq!(pmt.pcr_pid, 0x0101);
        assert_eq!(pmt.program_info.len(), 6);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].stream_type, 0x02);
        assert_eq!(pmt.streams[0].pid, 0x0101);
        assert_eq!(pmt.streams[1].stream_type, 0x04);
        assert_eq!(pmt.streams[1].es_info.len(), 6);
    }

    #[test]
    fn test_parse_pmt_rejects_es_info_overrun() {
        let payload = [
            0xE1, 0x01, 0xF0, 0x00, // no program info
            0x02, 0xE1, 0x01, 0xF0, 0x09, // es_info_length overruns payload
            0x00, 0x00,
        ];
        assert!(matches!(
            PmtTable::parse(&section(&payload)),
            Err(SiError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_pmt_rejects_program_info_overrun() {
        let payload = [0xE1, 0x01, 0xF0, 0x20, 0x00];
        assert!(matches!(
            PmtTable::parse(&section(&payload)),
            Err(SiError::Malformed(_))
        ));
    }
}

//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000 and maps program numbers to
//! their PMT PIDs. Program number 0 carries the network PID instead.

use crate::error::SiError;
use crate::section::Section;
use crate::table_id;

/// One association entry in the PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number (0 = network PID entry).
    pub program_number: u16,
    /// PMT PID, or the network PID for program number 0.
    pub pid: u16,
}

/// Parsed PAT section.
#[derive(Debug, Clone, Default)]
pub struct PatTable {
    /// Transport stream id (table id extension).
    pub transport_stream_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
    /// Association entries.
    pub entries: Vec<PatEntry>,
}

impl PatTable {
    /// Parse a PAT from a validated section.
    pub fn parse(section: &Section) -> Result<Self, SiError> {
        if section.header.table_id != table_id::PAT {
            return Err(SiError::TableIdMismatch {
                expected: table_id::PAT,
                got: section.header.table_id,
            });
        }

        let data = section.payload;
        if data.len() % 4 != 0 {
            return Err(SiError::Malformed("PAT entry loop"));
        }

        let entries = data
            .chunks_exact(4)
            .map(|c| PatEntry {
                program_number: ((c[0] as u16) << 8) | c[1] as u16,
                pid: ((c[2] as u16 & 0x1F) << 8) | c[3] as u16,
            })
            .collect();

        Ok(PatTable {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            section_number: section.header.section_number,
            last_section_number: section.header.last_section_number,
            entries,
        })
    }

    /// Network PID from the program number 0 entry, if present.
    pub fn network_pid(&self) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.program_number == 0)
            .map(|e| e.pid)
    }

    /// All real program numbers (excluding the network PID entry).
    pub fn program_numbers(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .filter(|e| e.program_number != 0)
            .map(|e| e.program_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionHeader;

    fn section(payload: &[u8]) -> Section {
        Section {
            header: SectionHeader {
                table_id: table_id::PAT,
                section_length: (5 + payload.len() + 4) as u16,
                table_id_extension: 0x1001,
                version_number: 3,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            },
            payload,
            crc32: 0,
        }
    }

    #[test]
    fn test_parse_pat() {
        let payload = [
            0x00, 0x00, 0xE0, 0x10, // program 0 -> network PID 0x0010
            0x00, 0x64, 0xE1, 0x00, // program 100 -> PMT 0x0100
            0x00, 0xC8, 0xE2, 0x00, // program 200 -> PMT 0x0200
        ];

        let pat = PatTable::parse(&section(&payload)).unwrap();
        assert_eq!(pat.transport_stream_id, 0x1001);
        assert_eq!(pat.version_number, 3);
        assert_eq!(pat.entries.len(), 3);
        assert_eq!(pat.network_pid(), Some(0x0010));
        assert_eq!(pat.program_numbers().collect::<Vec<_>>(), vec![100, 200]);
        assert_eq!(pat.entries[1].pid, 0x0100);
    }

    #[test]
    fn test_parse_pat_rejects_ragged_loop() {
        let payload = [0x00, 0x64, 0xE1];
        assert!(matches!(
            PatTable::parse(&section(&payload)),
            Err(SiError::Malformed(_))
        ));
    }
}

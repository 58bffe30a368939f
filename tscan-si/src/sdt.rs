//! SDT (Service Description Table) parsing.
//!
//! The SDT is transmitted on PID 0x0011 and names the services of a
//! transport stream, including running status and scrambling.

use crate::descriptors::{find_descriptor, ServiceDescriptor};
use crate::error::SiError;
use crate::section::Section;
use crate::{descriptor_tag, table_id};

/// One service entry in the SDT.
#[derive(Debug, Clone, Default)]
pub struct SdtService {
    /// Service id.
    pub service_id: u16,
    /// EIT schedule flag.
    pub eit_schedule: bool,
    /// EIT present/following flag.
    pub eit_present_following: bool,
    /// Running status (3 bits, 4 = running).
    pub running_status: u8,
    /// Free CA mode (true = scrambled).
    pub scrambled: bool,
    /// Service descriptor loop (raw).
    pub descriptors: Vec<u8>,
}

impl SdtService {
    /// Decoded service descriptor, if announced.
    pub fn service_descriptor(&self) -> Option<ServiceDescriptor> {
        find_descriptor(&self.descriptors, descriptor_tag::SERVICE)
            .and_then(|d| ServiceDescriptor::parse(d).ok())
    }
}

/// Parsed SDT section.
#[derive(Debug, Clone, Default)]
pub struct SdtTable {
    /// Table id (distinguishes actual from other transport stream).
    pub table_id: u8,
    /// Transport stream id (table id extension).
    pub transport_stream_id: u16,
    /// Original network id.
    pub original_network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Service loop.
    pub services: Vec<SdtService>,
}

impl SdtTable {
    /// Parse an SDT from a validated section.
    pub fn parse(section: &Section) -> Result<Self, SiError> {
        if section.header.table_id != table_id::SDT_ACTUAL
            && section.header.table_id != table_id::SDT_OTHER
        {
            return Err(SiError::TableIdMismatch {
                expected: table_id::SDT_ACTUAL,
                got: section.header.table_id,
            });
        }

        let data = section.payload;
        if data.len() < 3 {
            return Err(SiError::Malformed("SDT sub-header"));
        }

        let original_network_id = ((data[0] as u16) << 8) | data[1] as u16;

        let mut services = Vec::new();
        let mut offset = 3;

        while offset + 5 <= data.len() {
            let service_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
            let eit_schedule = data[offset + 2] & 0x02 != 0;
            let eit_present_following = data[offset + 2] & 0x01 != 0;
            let running_status = (data[offset + 3] >> 5) & 0x07;
            let scrambled = data[offset + 3] & 0x10 != 0;
            let descriptors_length =
                ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;
            offset += 5;

            if offset + descriptors_length > data.len() {
                return Err(SiError::Malformed("SDT service descriptors"));
            }

            services.push(SdtService {
                service_id,
                eit_schedule,
                eit_present_following,
                running_status,
                scrambled,
                descriptors: data[offset..offset + descriptors_length].to_vec(),
            });
            offset += descriptors_length;
        }

        Ok(SdtTable {
            table_id: section.header.table_id,
            transport_stream_id: section.header.table_id_extension,
            original_network_id,
            version_number: section.header.version_number,
            services,
        })
    }

    /// True when this section describes the received transport stream.
    pub fn is_actual(&self) -> bool {
        self.table_id == table_id::SDT_ACTUAL
    }

    /// Find a service entry by service id.
    pub fn find_service(&self, service_id: u16) -> Option<&SdtService> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionHeader;

    fn section(payload: &[u8]) -> Section {
        Section {
            header: SectionHeader {
                table_id: table_id::SDT_ACTUAL,
                section_length: (5 + payload.len() + 4) as u16,
                table_id_extension: 0x1001,
                version_number: 2,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            },
            payload,
            crc32: 0,
        }
    }

    #[test]
    fn test_parse_sdt() {
        let payload = [
            0x30, 0x01, // original network id
            0xFF, // reserved
            0x00, 0x64, // service id 100
            0xFC | 0x01, // EIT present/following
            0x80 | 0x10 | 0x00, // running, scrambled, desc len high
            0x0D, // desc len = 13
            0x48, 0x0B, 0x01, 0x04, b'P', b'r', b'o', b'v', 0x03, b'T', b'V', b'1', 0x00,
        ];

        let sdt = SdtTable::parse(&section(&payload)).unwrap();
        assert!(sdt.is_actual());
        assert_eq!(sdt.transport_stream_id, 0x1001);
        assert_eq!(sdt.original_network_id, 0x3001);
        assert_eq!(sdt.services.len(), 1);

        let svc = &sdt.services[0];
        assert_eq!(svc.service_id, 100);
        assert_eq!(svc.running_status, 4);
        assert!(svc.scrambled);
        assert!(svc.eit_present_following);

        let desc = svc.service_descriptor().unwrap();
        assert_eq!(desc.service_type, 0x01);
        assert_eq!(desc.provider_name, "Prov");
        assert_eq!(desc.service_name, "TV1");
        assert!(sdt.find_service(100).is_some());
        assert!(sdt.find_service(101).is_none());
    }

    #[test]
    fn test_parse_sdt_rejects_descriptor_overrun() {
        let payload = [
            0x30, 0x01, 0xFF, // sub-header
            0x00, 0x64, 0xFC, 0x80, 0x20, // descriptor loop claims 32 bytes
            0x48, 0x00,
        ];
        assert!(matches!(
            SdtTable::parse(&section(&payload)),
            Err(SiError::Malformed(_))
        ));
    }
}

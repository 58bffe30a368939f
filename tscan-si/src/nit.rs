//! NIT (Network Information Table) parsing.
//!
//! The NIT is transmitted on the network PID (0x0010 unless the PAT says
//! otherwise) and describes the network and its transport streams,
//! including physical delivery parameters.

use crate::descriptors::{find_descriptor, NetworkNameDescriptor};
use crate::error::SiError;
use crate::section::Section;
use crate::{descriptor_tag, table_id};

/// Transport stream entry in the NIT.
#[derive(Debug, Clone, Default)]
pub struct NitTransport {
    /// Transport stream id.
    pub transport_stream_id: u16,
    /// Original network id.
    pub original_network_id: u16,
    /// Transport descriptor loop (raw).
    pub descriptors: Vec<u8>,
}

/// Parsed NIT section.
#[derive(Debug, Clone, Default)]
pub struct NitTable {
    /// Table id (distinguishes actual from other network).
    pub table_id: u8,
    /// Network id (table id extension).
    pub network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Network descriptor loop (raw).
    pub network_descriptors: Vec<u8>,
    /// Transport stream loop.
    pub transports: Vec<NitTransport>,
}

impl NitTable {
    /// Parse a NIT from a validated section.
    pub fn parse(section: &Section) -> Result<Self, SiError> {
        if section.header.table_id != table_id::NIT_ACTUAL
            && section.header.table_id != table_id::NIT_OTHER
        {
            return Err(SiError::TableIdMismatch {
                expected: table_id::NIT_ACTUAL,
                got: section.header.table_id,
            });
        }

        let data = section.payload;
        if data.len() < 2 {
            return Err(SiError::Malformed("NIT network descriptor length"));
        }

        let network_descriptors_length = ((data[0] as usize & 0x0F) << 8) | data[1] as usize;
        if data.len() < 2 + network_descriptors_length + 2 {
            return Err(SiError::Malformed("NIT network descriptors"));
        }
        let network_descriptors = data[2..2 + network_descriptors_length].to_vec();

        let ts_loop_offset = 2 + network_descriptors_length;
        let ts_loop_length =
            ((data[ts_loop_offset] as usize & 0x0F) << 8) | data[ts_loop_offset + 1] as usize;
        let ts_loop_end = ts_loop_offset + 2 + ts_loop_length;
        if ts_loop_end > data.len() {
            return Err(SiError::Malformed("NIT transport loop"));
        }

        let mut transports = Vec::new();
        let mut offset = ts_loop_offset + 2;

        while offset + 6 <= ts_loop_end {
            let transport_stream_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
            let original_network_id = ((data[offset + 2] as u16) << 8) | data[offset + 3] as u16;
            let descriptors_length =
                ((data[offset + 4] as usize & 0x0F) << 8) | data[offset + 5] as usize;
            offset += 6;

            if offset + descriptors_length > ts_loop_end {
                return Err(SiError::Malformed("NIT transport descriptors"));
            }

            transports.push(NitTransport {
                transport_stream_id,
                original_network_id,
                descriptors: data[offset..offset + descriptors_length].to_vec(),
            });
            offset += descriptors_length;
        }

        Ok(NitTable {
            table_id: section.header.table_id,
            network_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            network_descriptors,
            transports,
        })
    }

    /// True when this section describes the network being received.
    pub fn is_actual(&self) -> bool {
        self.table_id == table_id::NIT_ACTUAL
    }

    /// Network name from the network descriptor loop, if announced.
    pub fn network_name(&self) -> Option<String> {
        find_descriptor(&self.network_descriptors, descriptor_tag::NETWORK_NAME)
            .and_then(|d| NetworkNameDescriptor::parse(d).ok())
            .map(|d| d.name)
    }

    /// Find a transport entry by transport stream id.
    pub fn find_transport(&self, tsid: u16) -> Option<&NitTransport> {
        self.transports
            .iter()
            .find(|ts| ts.transport_stream_id == tsid)
    }
}

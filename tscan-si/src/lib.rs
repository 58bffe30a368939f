//! DVB PSI/SI decoding for the transport stream scanner.
//!
//! This crate handles the wire format only: section framing with CRC
//! validation, descriptor decoding, and the PAT/PMT/NIT/SDT table
//! parsers. Filter scheduling and the channel model live in the scanner.

pub mod descriptors;
pub mod error;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod section;

pub use error::SiError;
pub use nit::NitTable;
pub use pat::PatTable;
pub use pmt::PmtTable;
pub use sdt::SdtTable;
pub use section::{Section, SectionHeader};

/// Well-known PIDs.
pub mod pid {
    /// Program Association Table.
    pub const PAT: u16 = 0x0000;
    /// Conditional Access Table.
    pub const CAT: u16 = 0x0001;
    /// Network Information Table (default, PAT program 0 may override).
    pub const NIT: u16 = 0x0010;
    /// Service Description Table.
    pub const SDT: u16 = 0x0011;
}

/// Table ids.
pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    pub const NIT_ACTUAL: u8 = 0x40;
    pub const NIT_OTHER: u8 = 0x41;
    pub const SDT_ACTUAL: u8 = 0x42;
    pub const SDT_OTHER: u8 = 0x46;
}

/// Descriptor tags consumed by the scanner.
pub mod descriptor_tag {
    pub const CA: u8 = 0x09;
    pub const ISO_639_LANGUAGE: u8 = 0x0A;
    pub const NETWORK_NAME: u8 = 0x40;
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    pub const CABLE_DELIVERY: u8 = 0x44;
    pub const SERVICE: u8 = 0x48;
    pub const CA_IDENTIFIER: u8 = 0x53;
    pub const TELETEXT: u8 = 0x56;
    pub const SUBTITLING: u8 = 0x59;
    pub const TERRESTRIAL_DELIVERY: u8 = 0x5A;
    pub const FREQUENCY_LIST: u8 = 0x62;
    pub const AC3: u8 = 0x6A;
    pub const S2_SATELLITE_DELIVERY: u8 = 0x79;
    pub const ENHANCED_AC3: u8 = 0x7A;
    pub const EXTENSION: u8 = 0x7F;
}

/// Secondary tags inside the extension descriptor (0x7F).
pub mod extension_tag {
    pub const T2_DELIVERY: u8 = 0x04;
    pub const C2_DELIVERY: u8 = 0x0D;
}

/// Elementary stream types the scanner classifies.
pub mod stream_type {
    pub const VIDEO_MPEG1: u8 = 0x01;
    pub const VIDEO_MPEG2: u8 = 0x02;
    pub const AUDIO_MPEG1: u8 = 0x03;
    pub const AUDIO_MPEG2: u8 = 0x04;
    pub const PRIVATE_SECTIONS: u8 = 0x05;
    pub const PRIVATE_DATA: u8 = 0x06;
    pub const AUDIO_AAC: u8 = 0x0F;
    pub const AUDIO_AAC_LATM: u8 = 0x11;
    pub const VIDEO_H264: u8 = 0x1B;
    pub const VIDEO_HEVC: u8 = 0x24;
    pub const AUDIO_AC3_ATSC: u8 = 0x81;
}

//! Error types for SI section and table decoding.

use thiserror::Error;

/// Errors raised while decoding SI sections, descriptors and tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiError {
    /// Section carries a different table id than the filter asked for.
    #[error("Unexpected table id: expected 0x{expected:02X}, got 0x{got:02X}")]
    TableIdMismatch { expected: u8, got: u8 },

    /// Buffer is shorter than the structure it claims to hold.
    #[error("Truncated data: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    /// Declared section length cannot describe a valid section.
    #[error("Invalid section length: {0}")]
    InvalidSectionLength(u16),

    /// CRC-32/MPEG-2 over the section does not match the trailer.
    #[error("CRC mismatch: computed 0x{computed:08X}, stored 0x{stored:08X}")]
    Crc { computed: u32, stored: u32 },

    /// A length field inside a table or descriptor overruns its container.
    #[error("Malformed {0} structure")]
    Malformed(&'static str),
}

impl SiError {
    /// True for errors that indicate line noise rather than a wrong PID,
    /// i.e. the caller should keep waiting for further sections.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SiError::TableIdMismatch { .. })
    }
}

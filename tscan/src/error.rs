//! Runtime error types for the scanner.

use thiserror::Error;

/// Errors raised while driving a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Demux refused to open a section filter.
    #[error("Failed to open demux filter for PID 0x{pid:04X}: {reason}")]
    DemuxOpen { pid: u16, reason: String },

    /// All section filter slots are taken and a structural filter needs one.
    #[error("No free section filter slot")]
    FilterSlots,

    /// Recording directory is missing or unreadable.
    #[error("Recording error: {0}")]
    Recording(#[from] std::io::Error),
}

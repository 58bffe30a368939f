//! Collaborator seams towards the receiving hardware.
//!
//! The scanner core only talks to these traits. The shipped
//! implementation replays recorded section captures; tests script
//! sections in memory.

use std::time::Duration;

use crate::error::ScanError;
use crate::model::{DeliverySystem, Transponder};

pub mod recording;
pub mod scripted;

pub use recording::RecordingAdapter;
pub use scripted::ScriptedAdapter;

/// Opaque handle for an open section filter.
pub type FilterHandle = usize;

/// Section demultiplexer: per (PID, table id) filters delivering whole
/// sections.
pub trait Demux {
    /// Open a section filter. The returned handle stays valid until
    /// closed.
    fn open(&mut self, pid: u16, table_id: u8) -> Result<FilterHandle, ScanError>;

    /// Wait up to `timeout` and report which handles have a section
    /// ready to read.
    fn poll(&mut self, handles: &[FilterHandle], timeout: Duration) -> Vec<FilterHandle>;

    /// Read one complete section from a handle; `None` means no data
    /// is available right now.
    fn read(&mut self, handle: FilterHandle) -> Option<Vec<u8>>;

    /// Close a filter and release its slot.
    fn close(&mut self, handle: FilterHandle);
}

/// Tuner frontend.
pub trait Frontend {
    /// Tune to a transponder. Returns false when no lock was achieved.
    fn tune(&mut self, transponder: &Transponder) -> Result<bool, ScanError>;

    /// Delivery system the frontend is actually using. Some drivers
    /// switch between DVB-T and T2 silently, so this is re-read after
    /// lock.
    fn delivery_system(&self) -> DeliverySystem;
}

//! Offline adapter replaying recorded section captures.
//!
//! Layout: one directory per centre frequency (in Hz), holding files
//! named `<pid>-<table_id>.sec` (both hex, e.g. `0010-40.sec`) with raw
//! sections back to back. A frequency directory that exists counts as
//! frontend lock; sections are self delimiting via their length field.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};

use tscan_si::Section;

use super::{Demux, FilterHandle, Frontend};
use crate::error::ScanError;
use crate::model::{DeliverySystem, Transponder};

#[derive(Debug)]
struct ReplayFilter {
    queue: VecDeque<Vec<u8>>,
    closed: bool,
}

/// Frontend + demux replaying a capture directory.
#[derive(Debug)]
pub struct RecordingAdapter {
    root: PathBuf,
    tuned_dir: Option<PathBuf>,
    current_system: DeliverySystem,
    filters: Vec<ReplayFilter>,
}

impl RecordingAdapter {
    /// Open a capture tree. Fails when the root does not exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ScanError::Recording(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("recording directory not found: {}", root.display()),
            )));
        }
        Ok(RecordingAdapter {
            root,
            tuned_dir: None,
            current_system: DeliverySystem::DvbT,
            filters: Vec::new(),
        })
    }

    /// Split a capture file into individual sections.
    fn split_sections(data: &[u8]) -> Vec<Vec<u8>> {
        let mut sections = Vec::new();
        let mut offset = 0;
        while let Some(total) = Section::declared_length(&data[offset..]) {
            if offset + total > data.len() {
                warn!(
                    "RecordingAdapter: truncated trailing section ({} of {} bytes)",
                    data.len() - offset,
                    total
                );
                break;
            }
            sections.push(data[offset..offset + total].to_vec());
            offset += total;
        }
        sections
    }
}

impl Frontend for RecordingAdapter {
    fn tune(&mut self, transponder: &Transponder) -> Result<bool, ScanError> {
        let dir = self.root.join(transponder.frequency.to_string());
        self.current_system = transponder.delivery_system;
        if dir.is_dir() {
            debug!("RecordingAdapter: lock on {}", dir.display());
            self.tuned_dir = Some(dir);
            Ok(true)
        } else {
            self.tuned_dir = None;
            Ok(false)
        }
    }

    fn delivery_system(&self) -> DeliverySystem {
        self.current_system
    }
}

impl Demux for RecordingAdapter {
    fn open(&mut self, pid: u16, table_id: u8) -> Result<FilterHandle, ScanError> {
        let dir = self.tuned_dir.as_ref().ok_or_else(|| ScanError::DemuxOpen {
            pid,
            reason: "not tuned".to_string(),
        })?;

        let path = dir.join(format!("{:04x}-{:02x}.sec", pid, table_id));
        let queue = match std::fs::read(&path) {
            Ok(data) => Self::split_sections(&data).into(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Nothing was captured for this filter; it will time out.
                debug!("RecordingAdapter: no capture {}", path.display());
                VecDeque::new()
            }
            Err(e) => {
                return Err(ScanError::DemuxOpen {
                    pid,
                    reason: e.to_string(),
                })
            }
        };

        self.filters.push(ReplayFilter {
            queue,
            closed: false,
        });
        Ok(self.filters.len() - 1)
    }

    fn poll(&mut self, handles: &[FilterHandle], timeout: Duration) -> Vec<FilterHandle> {
        let ready: Vec<FilterHandle> = handles
            .iter()
            .copied()
            .filter(|&h| {
                self.filters
                    .get(h)
                    .map(|f| !f.closed && !f.queue.is_empty())
                    .unwrap_or(false)
            })
            .collect();
        if ready.is_empty() {
            // Replay has no future data; let the wall clock advance so
            // pending filters time out at normal speed.
            std::thread::sleep(timeout);
        }
        ready
    }

    fn read(&mut self, handle: FilterHandle) -> Option<Vec<u8>> {
        self.filters
            .get_mut(handle)
            .filter(|f| !f.closed)?
            .queue
            .pop_front()
    }

    fn close(&mut self, handle: FilterHandle) {
        if let Some(f) = self.filters.get_mut(handle) {
            f.closed = true;
            f.queue.clear();
        }
    }
}

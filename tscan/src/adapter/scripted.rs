//! In-memory adapter fed with pre-built sections.
//!
//! Used by the test suite: sections are queued per frequency and
//! (PID, table id) pair, and handed out one per read like a demux
//! device would.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::{Demux, FilterHandle, Frontend};
use crate::error::ScanError;
use crate::model::{DeliverySystem, Transponder};

#[derive(Debug, Default)]
struct OpenFilter {
    pid: u16,
    table_id: u8,
    closed: bool,
}

/// Scripted frontend + demux in one.
#[derive(Debug)]
pub struct ScriptedAdapter {
    /// frequency -> (pid, table_id) -> queued sections
    script: HashMap<u32, HashMap<(u16, u8), VecDeque<Vec<u8>>>>,
    /// Frequencies the frontend reports lock on.
    lockable: Vec<u32>,
    /// Delivery system reported after tune.
    reported_system: Option<DeliverySystem>,
    tuned: Option<u32>,
    current_system: DeliverySystem,
    filters: Vec<OpenFilter>,
    /// Cap on simultaneously open filters, when set.
    pub max_open: Option<usize>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        ScriptedAdapter {
            script: HashMap::new(),
            lockable: Vec::new(),
            reported_system: None,
            tuned: None,
            current_system: DeliverySystem::DvbT,
            filters: Vec::new(),
            max_open: None,
        }
    }

    /// Declare a frequency as lockable.
    pub fn lock_on(&mut self, frequency: u32) {
        if !self.lockable.contains(&frequency) {
            self.lockable.push(frequency);
        }
    }

    /// Override the delivery system reported after tuning.
    pub fn report_system(&mut self, system: DeliverySystem) {
        self.reported_system = Some(system);
    }

    /// Queue a section for delivery on a frequency.
    pub fn push_section(&mut self, frequency: u32, pid: u16, table_id: u8, section: Vec<u8>) {
        self.script
            .entry(frequency)
            .or_default()
            .entry((pid, table_id))
            .or_default()
            .push_back(section);
        self.lock_on(frequency);
    }

    fn open_count(&self) -> usize {
        self.filters.iter().filter(|f| !f.closed).count()
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend for ScriptedAdapter {
    fn tune(&mut self, transponder: &Transponder) -> Result<bool, ScanError> {
        self.tuned = Some(transponder.frequency);
        self.current_system = self
            .reported_system
            .unwrap_or(transponder.delivery_system);
        Ok(self.lockable.contains(&transponder.frequency))
    }

    fn delivery_system(&self) -> DeliverySystem {
        self.current_system
    }
}

impl Demux for ScriptedAdapter {
    fn open(&mut self, pid: u16, table_id: u8) -> Result<FilterHandle, ScanError> {
        if let Some(max) = self.max_open {
            if self.open_count() >= max {
                return Err(ScanError::DemuxOpen {
                    pid,
                    reason: "no free hardware filter".to_string(),
                });
            }
        }
        self.filters.push(OpenFilter {
            pid,
            table_id,
            closed: false,
        });
        Ok(self.filters.len() - 1)
    }

    fn poll(&mut self, handles: &[FilterHandle], _timeout: Duration) -> Vec<FilterHandle> {
        let tuned = match self.tuned {
            Some(f) => f,
            None => return Vec::new(),
        };
        let queues = match self.script.get(&tuned) {
            Some(q) => q,
            None => return Vec::new(),
        };
        handles
            .iter()
            .copied()
            .filter(|&h| {
                self.filters
                    .get(h)
                    .filter(|f| !f.closed)
                    .map(|f| {
                        queues
                            .get(&(f.pid, f.table_id))
                            .map(|q| !q.is_empty())
                            .unwrap_or(false)
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    fn read(&mut self, handle: FilterHandle) -> Option<Vec<u8>> {
        let tuned = self.tuned?;
        let filter = self.filters.get(handle).filter(|f| !f.closed)?;
        self.script
            .get_mut(&tuned)?
            .get_mut(&(filter.pid, filter.table_id))?
            .pop_front()
    }

    fn close(&mut self, handle: FilterHandle) {
        if let Some(f) = self.filters.get_mut(handle) {
            f.closed = true;
        }
    }
}

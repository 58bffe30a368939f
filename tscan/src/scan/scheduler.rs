//! Cooperative section filter scheduler.
//!
//! Single threaded: one poll pass over all running filters every
//! 25 ms, feeding arrived sections to the session between polls. The
//! model is therefore consistent whenever `poll` is not executing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::filter::{table_name, SectionFilter};
use super::session::ScanSession;
use crate::adapter::{Demux, FilterHandle};
use crate::error::ScanError;

/// Simultaneously open demux filters.
pub const MAX_RUNNING_FILTERS: usize = 27;

/// Poll pass interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Attempts to open a queued filter before it is dropped.
const MAX_OPEN_ATTEMPTS: u8 = 3;

#[derive(Debug)]
struct ActiveFilter {
    filter: SectionFilter,
    handle: FilterHandle,
    started: Instant,
    done: bool,
}

#[derive(Debug)]
struct WaitingFilter {
    filter: SectionFilter,
    open_attempts: u8,
}

/// Runs filters against a demux until all have completed or timed out.
#[derive(Debug, Default)]
pub struct FilterScheduler {
    running: Vec<ActiveFilter>,
    waiting: VecDeque<WaitingFilter>,
}

impl FilterScheduler {
    pub fn new() -> Self {
        FilterScheduler {
            running: Vec::new(),
            waiting: VecDeque::new(),
        }
    }

    /// Add a filter, starting it immediately when a slot is free.
    ///
    /// Never fails: with no free slot, or when the demux refuses the
    /// open, the filter goes onto the waiting queue and is retried as
    /// slots come free (up to the attempt limit).
    pub fn add<D: Demux>(&mut self, demux: &mut D, filter: SectionFilter) {
        if self.running.len() >= MAX_RUNNING_FILTERS {
            debug!(
                "FilterScheduler: queueing {} filter on PID 0x{:04X}",
                table_name(filter.spec.table_id),
                filter.spec.pid
            );
            self.waiting.push_back(WaitingFilter {
                filter,
                open_attempts: 0,
            });
            return;
        }
        match demux.open(filter.spec.pid, filter.spec.table_id) {
            Ok(handle) => self.activate(filter, handle),
            Err(e) => {
                debug!(
                    "FilterScheduler: open failed for {} filter on PID 0x{:04X}, queueing for retry: {}",
                    table_name(filter.spec.table_id),
                    filter.spec.pid,
                    e
                );
                self.waiting.push_back(WaitingFilter {
                    filter,
                    open_attempts: 0,
                });
            }
        }
    }

    /// Add a filter the scan cannot proceed without. Unlike [`add`],
    /// slot exhaustion and open failures propagate to the caller.
    ///
    /// [`add`]: FilterScheduler::add
    pub fn add_structural<D: Demux>(
        &mut self,
        demux: &mut D,
        filter: SectionFilter,
    ) -> Result<(), ScanError> {
        if self.running.len() >= MAX_RUNNING_FILTERS {
            return Err(ScanError::FilterSlots);
        }
        let handle = demux.open(filter.spec.pid, filter.spec.table_id)?;
        self.activate(filter, handle);
        Ok(())
    }

    fn activate(&mut self, filter: SectionFilter, handle: FilterHandle) {
        debug!(
            "FilterScheduler: started {} filter on PID 0x{:04X}, timeout {:?}",
            table_name(filter.spec.table_id),
            filter.spec.pid,
            filter.timeout
        );
        self.running.push(ActiveFilter {
            filter,
            handle,
            started: Instant::now(),
            done: false,
        });
    }

    /// Promote waiting filters into free slots (FIFO).
    fn promote<D: Demux>(&mut self, demux: &mut D) {
        while self.running.len() < MAX_RUNNING_FILTERS {
            let Some(mut next) = self.waiting.pop_front() else {
                break;
            };
            match demux.open(next.filter.spec.pid, next.filter.spec.table_id) {
                Ok(handle) => self.activate(next.filter, handle),
                Err(e) => {
                    next.open_attempts += 1;
                    if next.open_attempts >= MAX_OPEN_ATTEMPTS {
                        warn!(
                            "FilterScheduler: dropping {} filter on PID 0x{:04X} after {} failed opens: {}",
                            table_name(next.filter.spec.table_id),
                            next.filter.spec.pid,
                            next.open_attempts,
                            e
                        );
                    } else {
                        debug!("FilterScheduler: open failed, retrying later: {}", e);
                        self.waiting.push_back(next);
                    }
                    break;
                }
            }
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// One scheduling pass. Returns false once both collections are
    /// empty.
    pub fn step<D: Demux>(&mut self, demux: &mut D, session: &mut ScanSession) -> bool {
        self.promote(demux);
        if self.running.is_empty() {
            return !self.waiting.is_empty();
        }

        let handles: Vec<FilterHandle> = self.running.iter().map(|a| a.handle).collect();
        let ready = demux.poll(&handles, POLL_INTERVAL);

        let mut spawned = Vec::new();
        for handle in ready {
            let Some(idx) = self.running.iter().position(|a| a.handle == handle) else {
                continue;
            };
            let Some(buf) = demux.read(handle) else {
                continue;
            };

            let active = &mut self.running[idx];
            let result = active.filter.feed(&buf);
            if let Some(section) = result.section {
                spawned.extend(session.apply_section(&active.filter.spec, &section));
            }
            if result.complete && active.filter.spec.run_once {
                active.done = true;
            }
        }

        // Completion and timeouts.
        let now = Instant::now();
        let mut i = 0;
        while i < self.running.len() {
            let active = &self.running[i];
            let timed_out = now.duration_since(active.started) > active.filter.timeout;
            if !active.done && !timed_out {
                i += 1;
                continue;
            }

            let active = self.running.swap_remove(i);
            demux.close(active.handle);
            if active.done {
                debug!(
                    "FilterScheduler: {} complete on PID 0x{:04X}",
                    table_name(active.filter.spec.table_id),
                    active.filter.spec.pid
                );
            } else if active.filter.segment_count() == 0 {
                info!(
                    "FilterScheduler: no data from {} after {} seconds",
                    table_name(active.filter.spec.table_id),
                    active.filter.timeout.as_secs()
                );
            } else {
                info!(
                    "FilterScheduler: {} incomplete at timeout ({} extension(s) seen)",
                    table_name(active.filter.spec.table_id),
                    active.filter.segment_count()
                );
            }
        }

        for filter in spawned {
            self.add(demux, filter);
        }

        !self.running.is_empty() || !self.waiting.is_empty()
    }

    /// Drive until every filter has completed or timed out.
    pub fn run<D: Demux>(&mut self, demux: &mut D, session: &mut ScanSession) {
        while self.step(demux, session) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ScriptedAdapter;
    use crate::model::{DeliverySystem, Transponder};
    use crate::scan::filter::FilterSpec;
    use crate::scan::fixtures::build_section;
    use tscan_si::{pid, table_id};

    const FREQ: u32 = 474_000_000;

    fn session() -> ScanSession {
        ScanSession::new(Transponder::probe(DeliverySystem::DvbT, FREQ), false, false)
    }

    fn tuned_adapter() -> ScriptedAdapter {
        let mut adapter = ScriptedAdapter::new();
        adapter.lock_on(FREQ);
        let probe = Transponder::probe(DeliverySystem::DvbT, FREQ);
        use crate::adapter::Frontend;
        adapter.tune(&probe).unwrap();
        adapter
    }

    fn pat_filter() -> SectionFilter {
        SectionFilter::new(
            FilterSpec {
                pid: pid::PAT,
                table_id: table_id::PAT,
                table_id_ext: None,
                run_once: true,
                segmented: false,
            },
            false,
        )
    }

    #[test]
    fn test_run_once_filter_completes_and_drains() {
        let mut adapter = tuned_adapter();
        adapter.push_section(
            FREQ,
            pid::PAT,
            table_id::PAT,
            build_section(table_id::PAT, 0x1001, 0, 0, 0, &[0x00, 0x64, 0xE1, 0x00]),
        );

        let mut sched = FilterScheduler::new();
        let mut session = session();
        sched.add(&mut adapter, pat_filter());
        sched.run(&mut adapter, &mut session);

        assert_eq!(sched.running_count(), 0);
        assert_eq!(sched.waiting_count(), 0);
        assert!(session.saw_pat);
        assert_eq!(session.transponder.transport_stream_id, 0x1001);
    }

    #[test]
    fn test_waiting_filters_promote_fifo() {
        let mut adapter = tuned_adapter();
        // One queued section per PMT PID so every filter completes fast.
        for prog in 0..=(MAX_RUNNING_FILTERS as u16 + 2) {
            let pmt_pid = 0x0100 + prog;
            adapter.push_section(
                FREQ,
                pmt_pid,
                table_id::PMT,
                build_section(table_id::PMT, prog, 0, 0, 0, &[0xE1, 0x01, 0xF0, 0x00]),
            );
        }

        let mut sched = FilterScheduler::new();
        let mut session = session();
        for prog in 0..=(MAX_RUNNING_FILTERS as u16 + 2) {
            sched.add(
                &mut adapter,
                SectionFilter::new(
                    FilterSpec {
                        pid: 0x0100 + prog,
                        table_id: table_id::PMT,
                        table_id_ext: Some(prog),
                        run_once: true,
                        segmented: false,
                    },
                    false,
                ),
            );
        }

        assert_eq!(sched.running_count(), MAX_RUNNING_FILTERS);
        assert_eq!(sched.waiting_count(), 3);

        sched.run(&mut adapter, &mut session);
        assert_eq!(sched.running_count(), 0);
        assert_eq!(sched.waiting_count(), 0);
    }

    #[test]
    fn test_spawned_filter_open_failure_is_retried_not_fatal() {
        // A single hardware filter: the PAT filter holds it while its
        // first section spawns a PMT filter, whose open must fail.
        let mut adapter = tuned_adapter();
        adapter.max_open = Some(1);
        adapter.push_section(
            FREQ,
            pid::PAT,
            table_id::PAT,
            build_section(table_id::PAT, 0x1001, 0, 0, 1, &[0x00, 0x64, 0xE1, 0x00]),
        );
        adapter.push_section(
            FREQ,
            pid::PAT,
            table_id::PAT,
            build_section(table_id::PAT, 0x1001, 0, 1, 1, &[0x00, 0xC8, 0xE2, 0x00]),
        );
        adapter.push_section(
            FREQ,
            0x0100,
            table_id::PMT,
            build_section(table_id::PMT, 100, 0, 0, 0, &[0xE1, 0x01, 0xF0, 0x00]),
        );
        adapter.push_section(
            FREQ,
            0x0200,
            table_id::PMT,
            build_section(table_id::PMT, 200, 0, 0, 0, &[0xE2, 0x01, 0xF0, 0x00]),
        );

        let mut sched = FilterScheduler::new();
        let mut session = session();
        sched.add(&mut adapter, pat_filter());
        sched.run(&mut adapter, &mut session);

        assert_eq!(sched.running_count(), 0);
        assert_eq!(sched.waiting_count(), 0);
        // Both PMT filters eventually ran once the PAT slot freed up.
        assert_eq!(session.transponder.find_service(100).unwrap().pcr_pid, 0x0101);
        assert_eq!(session.transponder.find_service(200).unwrap().pcr_pid, 0x0201);
    }

    #[test]
    fn test_structural_add_propagates_exhaustion_and_open_failure() {
        let mut adapter = tuned_adapter();
        let mut sched = FilterScheduler::new();
        for prog in 0..MAX_RUNNING_FILTERS as u16 {
            sched.add(
                &mut adapter,
                SectionFilter::new(
                    FilterSpec {
                        pid: 0x0100 + prog,
                        table_id: table_id::PMT,
                        table_id_ext: Some(prog),
                        run_once: true,
                        segmented: false,
                    },
                    false,
                ),
            );
        }
        assert_eq!(sched.running_count(), MAX_RUNNING_FILTERS);
        assert!(matches!(
            sched.add_structural(&mut adapter, pat_filter()),
            Err(crate::error::ScanError::FilterSlots)
        ));

        let mut refusing = tuned_adapter();
        refusing.max_open = Some(0);
        let mut sched = FilterScheduler::new();
        assert!(matches!(
            sched.add_structural(&mut refusing, pat_filter()),
            Err(crate::error::ScanError::DemuxOpen { .. })
        ));
    }
}

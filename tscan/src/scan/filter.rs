//! Section filters and table reassembly.
//!
//! A filter watches one (PID, table id) pair and tracks which section
//! numbers of the table have been seen, per table id extension. Sections
//! are handed to the caller as they arrive; completion is reported when
//! the bitmap covers `0..=last_section_number`.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use tscan_si::{table_id, Section, SiError};

/// Timeout floor for tables with long repetition periods. CRC garbage
/// extends a shorter timeout up to this plus the repetition period.
pub const SLOW_TABLE_SECS: u64 = 30;

/// Nominal repetition period of a table, per EN 300 468 / ETR 211.
pub fn repetition_period(tid: u8) -> Duration {
    let secs = match tid {
        table_id::PAT | table_id::CAT | table_id::PMT => 1,
        table_id::SDT_ACTUAL => 2,
        table_id::NIT_ACTUAL | table_id::NIT_OTHER | table_id::SDT_OTHER => 10,
        _ => 30,
    };
    Duration::from_secs(secs)
}

/// Human readable table name for log messages.
pub fn table_name(tid: u8) -> &'static str {
    match tid {
        table_id::PAT => "PAT",
        table_id::CAT => "CAT",
        table_id::PMT => "PMT",
        table_id::NIT_ACTUAL => "NIT(actual)",
        table_id::NIT_OTHER => "NIT(other)",
        table_id::SDT_ACTUAL => "SDT(actual)",
        table_id::SDT_OTHER => "SDT(other)",
        _ => "table",
    }
}

/// What a filter watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    /// PID to filter.
    pub pid: u16,
    /// Table id to accept.
    pub table_id: u8,
    /// Fixed table id extension, or `None` to pin on the first seen.
    pub table_id_ext: Option<u16>,
    /// Remove the filter once its table completes.
    pub run_once: bool,
    /// Table is segmented across extensions; completion comes from the
    /// timeout, never from the bitmap.
    pub segmented: bool,
}

/// Reassembly state for one table id extension.
#[derive(Debug, Default)]
struct SegmentState {
    version: Option<u8>,
    bitmap: [u64; 4],
    last_section: u8,
}

impl SegmentState {
    fn reset(&mut self) {
        self.bitmap = [0; 4];
    }

    /// Mark a section number; true when it was not seen before.
    fn mark(&mut self, n: u8) -> bool {
        let word = (n >> 6) as usize;
        let bit = 1u64 << (n & 0x3F);
        let new = self.bitmap[word] & bit == 0;
        self.bitmap[word] |= bit;
        new
    }

    fn is_complete(&self) -> bool {
        (0..=self.last_section).all(|n| {
            let word = (n >> 6) as usize;
            self.bitmap[word] & (1u64 << (n & 0x3F)) != 0
        })
    }
}

/// Outcome of feeding one buffer to a filter.
#[derive(Debug)]
pub struct FeedResult<'a> {
    /// The section, when its number was newly seen and decodable.
    pub section: Option<Section<'a>>,
    /// The filter's table is complete after this buffer.
    pub complete: bool,
}

impl FeedResult<'_> {
    fn nothing() -> Self {
        FeedResult {
            section: None,
            complete: false,
        }
    }
}

/// One running or waiting section filter.
#[derive(Debug)]
pub struct SectionFilter {
    /// What this filter accepts.
    pub spec: FilterSpec,
    /// Wall clock budget from activation.
    pub timeout: Duration,
    /// Rejected buffers (CRC failures, truncation). Saturating.
    pub garbage: u32,
    segments: HashMap<u16, SegmentState>,
    pinned_ext: Option<u16>,
}

impl SectionFilter {
    /// Filter with the standard timeout: one second of slack on top of
    /// the table's repetition period, five periods when `long_timeouts`.
    pub fn new(spec: FilterSpec, long_timeouts: bool) -> Self {
        let period = repetition_period(spec.table_id);
        let timeout = if long_timeouts {
            Duration::from_secs(1) + period * 5
        } else {
            Duration::from_secs(1) + period
        };
        SectionFilter {
            spec,
            timeout,
            garbage: 0,
            segments: HashMap::new(),
            pinned_ext: None,
        }
    }

    /// Feed one demux buffer.
    pub fn feed<'a>(&mut self, buf: &'a [u8]) -> FeedResult<'a> {
        let section = match Section::parse(buf, self.spec.table_id) {
            Ok(s) => s,
            Err(SiError::Crc { computed, stored }) => {
                self.garbage = self.garbage.saturating_add(1);
                self.extend_timeout_for_garbage();
                debug!(
                    "SectionFilter: {} CRC error on PID 0x{:04X} (0x{:08X} != 0x{:08X}), {} bad buffers",
                    table_name(self.spec.table_id),
                    self.spec.pid,
                    computed,
                    stored,
                    self.garbage
                );
                return FeedResult::nothing();
            }
            Err(e @ SiError::Truncated { .. }) | Err(e @ SiError::InvalidSectionLength(_)) => {
                self.garbage = self.garbage.saturating_add(1);
                debug!(
                    "SectionFilter: dropping malformed buffer on PID 0x{:04X}: {}",
                    self.spec.pid, e
                );
                return FeedResult::nothing();
            }
            Err(e) => {
                debug!(
                    "SectionFilter: ignoring buffer on PID 0x{:04X}: {}",
                    self.spec.pid, e
                );
                return FeedResult::nothing();
            }
        };

        let header = section.header;
        let ext = header.table_id_extension;

        let key = if self.spec.segmented {
            ext
        } else {
            if let Some(want) = self.spec.table_id_ext {
                // Other programs share the PID; not ours.
                if ext != want {
                    return FeedResult::nothing();
                }
            } else if self.pinned_ext != Some(ext) {
                // Pin on the first extension; a change re-pins and
                // restarts reassembly.
                if self.pinned_ext.is_some() {
                    debug!(
                        "SectionFilter: {} extension changes 0x{:04X} -> 0x{:04X}",
                        table_name(self.spec.table_id),
                        self.pinned_ext.unwrap(),
                        ext
                    );
                }
                self.segments.clear();
                self.pinned_ext = Some(ext);
            }
            ext
        };

        let state = self.segments.entry(key).or_default();
        if state.version != Some(header.version_number) {
            state.reset();
            state.version = Some(header.version_number);
        }
        state.last_section = header.last_section_number;

        if !state.mark(header.section_number) {
            return FeedResult::nothing();
        }

        FeedResult {
            complete: !self.spec.segmented && state.is_complete(),
            section: Some(section),
        }
    }

    /// All expected sections have been seen. Segmented filters never
    /// complete this way; they run until their timeout.
    pub fn is_complete(&self) -> bool {
        if self.spec.segmented {
            return false;
        }
        !self.segments.is_empty() && self.segments.values().all(|s| s.is_complete())
    }

    /// Number of distinct extensions with reassembly state.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn extend_timeout_for_garbage(&mut self) {
        let slow =
            Duration::from_secs(SLOW_TABLE_SECS) + repetition_period(self.spec.table_id);
        if self.timeout < slow {
            self.timeout = slow;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::fixtures::{build_section, corrupt_crc};
    use tscan_si::table_id;

    fn pat_spec() -> FilterSpec {
        FilterSpec {
            pid: 0x0000,
            table_id: table_id::PAT,
            table_id_ext: None,
            run_once: true,
            segmented: false,
        }
    }

    #[test]
    fn test_default_timeouts() {
        let pat = SectionFilter::new(pat_spec(), false);
        assert_eq!(pat.timeout, Duration::from_secs(2));

        let pat_long = SectionFilter::new(pat_spec(), true);
        assert_eq!(pat_long.timeout, Duration::from_secs(6));

        let nit = SectionFilter::new(
            FilterSpec {
                pid: 0x0010,
                table_id: table_id::NIT_ACTUAL,
                table_id_ext: None,
                run_once: true,
                segmented: false,
            },
            false,
        );
        assert_eq!(nit.timeout, Duration::from_secs(11));
    }

    #[test]
    fn test_completion_is_order_independent() {
        let mut filter = SectionFilter::new(pat_spec(), false);

        let s2 = build_section(table_id::PAT, 1, 0, 2, 2, &[0, 100, 0xE1, 0x00]);
        let s0 = build_section(table_id::PAT, 1, 0, 0, 2, &[0, 101, 0xE1, 0x01]);
        let s1 = build_section(table_id::PAT, 1, 0, 1, 2, &[0, 102, 0xE1, 0x02]);

        let r = filter.feed(&s2);
        assert!(r.section.is_some());
        assert!(!r.complete);

        let r = filter.feed(&s0);
        assert!(r.section.is_some());
        assert!(!r.complete);

        // duplicate delivers nothing
        let r = filter.feed(&s0);
        assert!(r.section.is_none());

        let r = filter.feed(&s1);
        assert!(r.section.is_some());
        assert!(r.complete);
        assert!(filter.is_complete());
    }

    #[test]
    fn test_version_change_resets_bitmap() {
        let mut filter = SectionFilter::new(pat_spec(), false);

        let v0_s0 = build_section(table_id::PAT, 1, 0, 0, 1, &[0, 100, 0xE1, 0x00]);
        let v1_s1 = build_section(table_id::PAT, 1, 1, 1, 1, &[0, 100, 0xE1, 0x00]);
        let v1_s0 = build_section(table_id::PAT, 1, 1, 0, 1, &[0, 100, 0xE1, 0x00]);

        assert!(filter.feed(&v0_s0).section.is_some());
        // New version: old progress is discarded.
        assert!(filter.feed(&v1_s1).section.is_some());
        assert!(!filter.is_complete());
        let r = filter.feed(&v1_s0);
        assert!(r.complete);
    }

    #[test]
    fn test_crc_failure_counts_garbage_and_extends_timeout() {
        let mut filter = SectionFilter::new(pat_spec(), false);
        let bad = corrupt_crc(build_section(table_id::PAT, 1, 0, 0, 0, &[0, 100, 0xE1, 0x00]));

        let r = filter.feed(&bad);
        assert!(r.section.is_none());
        assert!(!r.complete);
        assert_eq!(filter.garbage, 1);
        assert!(!filter.is_complete());
        // extended to the slow threshold: 30s + 1s repetition period
        assert_eq!(filter.timeout, Duration::from_secs(31));
    }

    #[test]
    fn test_table_id_mismatch_is_not_garbage() {
        let mut filter = SectionFilter::new(pat_spec(), false);
        let sdt = build_section(table_id::SDT_ACTUAL, 1, 0, 0, 0, &[0x30, 0x01, 0xFF]);
        let r = filter.feed(&sdt);
        assert!(r.section.is_none());
        assert_eq!(filter.garbage, 0);
    }

    #[test]
    fn test_pinned_ext_rejects_foreign_program() {
        let mut filter = SectionFilter::new(
            FilterSpec {
                pid: 0x0100,
                table_id: table_id::PMT,
                table_id_ext: Some(100),
                run_once: true,
                segmented: false,
            },
            false,
        );

        let other = build_section(table_id::PMT, 200, 0, 0, 0, &[0xE1, 0x01, 0xF0, 0x00]);
        assert!(filter.feed(&other).section.is_none());

        let ours = build_section(table_id::PMT, 100, 0, 0, 0, &[0xE1, 0x01, 0xF0, 0x00]);
        let r = filter.feed(&ours);
        assert!(r.section.is_some());
        assert!(r.complete);
    }

    #[test]
    fn test_open_ext_repins_on_change() {
        let mut filter = SectionFilter::new(pat_spec(), false);

        let a = build_section(table_id::PAT, 0x1001, 0, 0, 1, &[0, 100, 0xE1, 0x00]);
        let b = build_section(table_id::PAT, 0x2002, 0, 0, 0, &[0, 100, 0xE1, 0x00]);

        assert!(filter.feed(&a).section.is_some());
        let r = filter.feed(&b);
        assert!(r.section.is_some());
        // re-pinned to the new extension, whose single section completes
        assert!(r.complete);
    }

    #[test]
    fn test_segmented_filter_never_completes_by_bitmap() {
        let mut filter = SectionFilter::new(
            FilterSpec {
                pid: 0x0011,
                table_id: table_id::SDT_OTHER,
                table_id_ext: None,
                run_once: true,
                segmented: true,
            },
            false,
        );

        let ts_a = build_section(table_id::SDT_OTHER, 0x1001, 0, 0, 0, &[0x30, 0x01, 0xFF]);
        let ts_b = build_section(table_id::SDT_OTHER, 0x1002, 0, 0, 0, &[0x30, 0x01, 0xFF]);

        let r = filter.feed(&ts_a);
        assert!(r.section.is_some());
        assert!(!r.complete);
        let r = filter.feed(&ts_b);
        assert!(r.section.is_some());
        assert!(!r.complete);

        assert_eq!(filter.segment_count(), 2);
        assert!(!filter.is_complete());
    }
}

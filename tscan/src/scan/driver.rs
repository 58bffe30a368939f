//! Channel sweep driver.
//!
//! Walks the channel raster, tunes each candidate transponder, and runs
//! the filter passes against locked ones: an initial PAT lookup to
//! confirm a transport stream is present, then the full NIT/SDT/PAT
//! pass with per-program PMT filters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use log::{debug, info};

use tscan_si::{pid, table_id};

use super::dedup::{already_scanned, retain, DedupPolicy};
use super::filter::{FilterSpec, SectionFilter};
use super::scheduler::FilterScheduler;
use super::session::ScanSession;
use crate::adapter::{Demux, Frontend};
use crate::channels::{channel_to_frequency, CHANNEL_MAX};
use crate::error::ScanError;
use crate::model::{DeliverySystem, Modulation, ScanType, Transponder};

/// Which terrestrial delivery systems to try per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DvbtStandard {
    T,
    T2,
    Both,
}

impl DvbtStandard {
    fn systems(self) -> &'static [DeliverySystem] {
        match self {
            DvbtStandard::T => &[DeliverySystem::DvbT],
            DvbtStandard::T2 => &[DeliverySystem::DvbT2],
            DvbtStandard::Both => &[DeliverySystem::DvbT, DeliverySystem::DvbT2],
        }
    }
}

/// Which ATSC modulations to try per channel (over-the-air VSB,
/// clear-QAM cable, or both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AtscStandard {
    Vsb,
    Qam,
    Both,
}

impl AtscStandard {
    fn modulations(self) -> &'static [Modulation] {
        match self {
            AtscStandard::Vsb => &[Modulation::Vsb8],
            AtscStandard::Qam => &[Modulation::Qam256],
            AtscStandard::Both => &[Modulation::Vsb8, Modulation::Qam256],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub scan_type: ScanType,
    pub channel_min: u32,
    pub channel_max: u32,
    pub dvbt_standard: DvbtStandard,
    pub atsc_standard: AtscStandard,
    pub dedup: DedupPolicy,
    pub long_timeouts: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            scan_type: ScanType::Terrestrial,
            channel_min: crate::channels::DEFAULT_CHANNEL_MIN,
            channel_max: crate::channels::DEFAULT_CHANNEL_MAX,
            dvbt_standard: DvbtStandard::Both,
            atsc_standard: AtscStandard::Vsb,
            dedup: DedupPolicy::SkipDuplicates,
            long_timeouts: false,
        }
    }
}

/// Sweeps the raster and collects scanned transponders.
pub struct ScanDriver<A: Frontend + Demux> {
    adapter: A,
    config: ScanConfig,
    scanned: Vec<Transponder>,
    found: Vec<Transponder>,
    stop: Arc<AtomicBool>,
}

impl<A: Frontend + Demux> ScanDriver<A> {
    pub fn new(adapter: A, config: ScanConfig) -> Self {
        ScanDriver {
            adapter,
            config,
            scanned: Vec::new(),
            found: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that stops the sweep at the next channel boundary.
    /// Results decoded so far stay available through `found`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Transponders retained so far, for partial output on errors.
    pub fn found(&self) -> &[Transponder] {
        &self.found
    }

    pub fn into_found(self) -> Vec<Transponder> {
        self.found
    }

    /// Probe transponders for one candidate frequency: one per
    /// delivery system (terrestrial) or per modulation (ATSC).
    fn probes(&self, frequency: u32) -> Vec<Transponder> {
        match self.config.scan_type {
            ScanType::Atsc => self
                .config
                .atsc_standard
                .modulations()
                .iter()
                .map(|&modulation| {
                    let mut probe = Transponder::probe(DeliverySystem::Atsc, frequency);
                    probe.modulation = modulation;
                    probe
                })
                .collect(),
            _ => self
                .config
                .dvbt_standard
                .systems()
                .iter()
                .map(|&system| Transponder::probe(system, frequency))
                .collect(),
        }
    }

    pub fn run(&mut self) -> Result<(), ScanError> {
        let last_channel = self.config.channel_max.min(CHANNEL_MAX);
        for channel in self.config.channel_min..=last_channel {
            if self.stop.load(Ordering::Relaxed) {
                info!("scan interrupted, stopping sweep at channel {}", channel);
                break;
            }
            let Some(frequency) = channel_to_frequency(channel, self.config.scan_type) else {
                continue;
            };
            info!("scanning channel {} ({} Hz)", channel, frequency);

            for probe in self.probes(frequency) {
                if self.stop.load(Ordering::Relaxed) {
                    break;
                }
                if already_scanned(&self.scanned, &probe) {
                    debug!(
                        "channel {}: {} Hz already scanned, skipping {}",
                        channel,
                        frequency,
                        probe.delivery_system.name()
                    );
                    continue;
                }

                if let Some(tp) = self.scan_transponder(probe)? {
                    self.scanned.push(tp.clone());
                    retain(&mut self.found, tp, self.config.dedup);
                }
            }
        }
        Ok(())
    }

    /// Scan one tuned transponder, None when no lock or no transport
    /// stream is present.
    fn scan_transponder(&mut self, probe: Transponder) -> Result<Option<Transponder>, ScanError> {
        if !self.adapter.tune(&probe)? {
            debug!("{} Hz: no lock", probe.frequency);
            return Ok(None);
        }

        // Some demodulators (cxd2820r) settle on the other DVB-T
        // generation during lock; believe the frontend, not the probe.
        let mut probe = probe;
        probe.delivery_system = self.adapter.delivery_system();

        // Initial PAT lookup. Proves a transport stream is present and
        // fills in the transport stream id and network PID before the
        // expensive pass starts. This is the one filter the scan cannot
        // do without, so its open failure is fatal.
        let mut session = ScanSession::new(probe, true, self.config.long_timeouts);
        let mut sched = FilterScheduler::new();
        let pat = self.pat_filter();
        sched.add_structural(&mut self.adapter, pat)?;
        sched.run(&mut self.adapter, &mut session);

        if !session.saw_pat {
            info!("{} Hz: lock without transport stream", session.transponder.frequency);
            return Ok(None);
        }

        let mut transponder = session.into_transponder();
        transponder.delivery_system = self.adapter.delivery_system();

        info!(
            "{} Hz: {} transport stream 0x{:04X}",
            transponder.frequency,
            transponder.delivery_system.name(),
            transponder.transport_stream_id
        );

        // NIT lookup on the announced network PID, then the service
        // pass: SDT plus the PAT again so its entries spawn one-shot
        // PMT filters. The session carries the transponder across both.
        let network_pid = transponder.network_pid;
        let mut session = ScanSession::new(transponder, false, self.config.long_timeouts);

        let mut sched = FilterScheduler::new();
        sched.add(
            &mut self.adapter,
            SectionFilter::new(
                FilterSpec {
                    pid: network_pid,
                    table_id: table_id::NIT_ACTUAL,
                    table_id_ext: None,
                    run_once: true,
                    segmented: false,
                },
                self.config.long_timeouts,
            ),
        );
        sched.run(&mut self.adapter, &mut session);

        let mut sched = FilterScheduler::new();
        sched.add(
            &mut self.adapter,
            SectionFilter::new(
                FilterSpec {
                    pid: pid::SDT,
                    table_id: table_id::SDT_ACTUAL,
                    table_id_ext: None,
                    run_once: true,
                    segmented: false,
                },
                self.config.long_timeouts,
            ),
        );
        let pat = self.pat_filter();
        sched.add(&mut self.adapter, pat);
        sched.run(&mut self.adapter, &mut session);

        Ok(Some(session.into_transponder()))
    }

    fn pat_filter(&self) -> SectionFilter {
        SectionFilter::new(
            FilterSpec {
                pid: pid::PAT,
                table_id: table_id::PAT,
                table_id_ext: None,
                run_once: true,
                segmented: false,
            },
            self.config.long_timeouts,
        )
    }
}

//! Transponder deduplication.
//!
//! Two places need it: skipping channels whose frequency was already
//! scanned (offsets and NIT-announced cells land close to a raster
//! frequency), and collapsing output transports that carry the same
//! broadcaster triple.

use clap::ValueEnum;
use log::info;

use crate::model::{ScanType, Transponder};

/// Frequencies closer than this are the same transponder.
pub const FREQ_TOLERANCE_HZ: u32 = 750_000;

/// What to do with transports announcing an already-seen
/// (original_network_id, network_id, transport_stream_id) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupPolicy {
    /// Keep every scanned transport.
    KeepAll,
    /// Drop later transports with a known triple.
    SkipDuplicates,
    /// Merge services of later transports into the first one.
    MergeAll,
}

pub fn is_nearly_same_frequency(a: u32, b: u32) -> bool {
    a.abs_diff(b) < FREQ_TOLERANCE_HZ
}

/// Whether `candidate` would re-scan a transponder in `scanned`.
pub fn already_scanned(scanned: &[Transponder], candidate: &Transponder) -> bool {
    scanned.iter().any(|tp| {
        if tp.scan_type() != candidate.scan_type() {
            return false;
        }
        if !is_nearly_same_frequency(tp.frequency, candidate.frequency) {
            return false;
        }
        match candidate.scan_type() {
            ScanType::Satellite => tp.polarization == candidate.polarization,
            ScanType::Atsc => tp.modulation == candidate.modulation,
            _ => true,
        }
    })
}

fn find_retained<'a>(
    retained: &'a mut [Transponder],
    candidate: &Transponder,
) -> Option<&'a mut Transponder> {
    let triple = candidate.broadcaster_triple();
    retained
        .iter_mut()
        .find(|tp| tp.broadcaster_triple() == triple)
}

/// Fold a scanned transponder into the output list per `policy`.
pub fn retain(retained: &mut Vec<Transponder>, candidate: Transponder, policy: DedupPolicy) {
    if policy == DedupPolicy::KeepAll {
        retained.push(candidate);
        return;
    }

    let Some(existing) = find_retained(retained, &candidate) else {
        retained.push(candidate);
        return;
    };

    match policy {
        DedupPolicy::SkipDuplicates => {
            info!(
                "dedup: dropping duplicate transport (onid 0x{:04X}, nid 0x{:04X}, tsid 0x{:04X}) at {} Hz",
                candidate.original_network_id,
                candidate.network_id,
                candidate.transport_stream_id,
                candidate.frequency
            );
        }
        DedupPolicy::MergeAll => {
            info!(
                "dedup: merging transport at {} Hz into {} Hz",
                candidate.frequency, existing.frequency
            );
            for cell in &candidate.cells {
                existing.add_cell(*cell);
            }
            for service in candidate.services {
                if existing.find_service(service.service_id).is_none() {
                    existing.services.push(service);
                }
            }
        }
        DedupPolicy::KeepAll => unreachable!(),
    }
}

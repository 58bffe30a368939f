//! Scan session: applies decoded tables to the transponder being scanned.
//!
//! Tables arrive one section at a time and are folded into the model
//! immediately, so a partial scan still yields usable data. The session
//! also decides which follow-up filters a section calls for (PAT
//! entries spawn one-shot PMT filters).

use std::collections::HashSet;

use log::{debug, info, warn};

use tscan_si::descriptors::{
    split_extension, C2DeliveryDescriptor, CaDescriptor, CaIdentifierDescriptor,
    CableDeliveryDescriptor, DescriptorIter, FrequencyListDescriptor,
    Iso639LanguageDescriptor, S2SatelliteDeliveryDescriptor, SatelliteDeliveryDescriptor,
    T2DeliveryDescriptor, TerrestrialDeliveryDescriptor,
};
use tscan_si::{
    descriptor_tag, extension_tag, stream_type, table_id, NitTable, PatTable, PmtTable, SdtTable,
    Section,
};

use super::filter::{FilterSpec, SectionFilter};
use crate::model::{
    AudioTrack, Bandwidth, CodeRate, DeliverySystem, GuardInterval, Hierarchy, Modulation,
    Polarization, ScanType, TransmissionMode, Transponder,
};

/// All in-progress state for scanning one transponder.
#[derive(Debug)]
pub struct ScanSession {
    /// The transponder being filled in.
    pub transponder: Transponder,
    /// Initial lookup pass: PAT entries do not spawn PMT filters yet.
    pub initial: bool,
    /// Multiply filter timeouts for slow links.
    pub long_timeouts: bool,
    /// At least one PAT section arrived.
    pub saw_pat: bool,
    /// At least one NIT-actual section arrived.
    pub saw_nit: bool,
    pmt_requested: HashSet<u16>,
}

impl ScanSession {
    pub fn new(transponder: Transponder, initial: bool, long_timeouts: bool) -> Self {
        ScanSession {
            transponder,
            initial,
            long_timeouts,
            saw_pat: false,
            saw_nit: false,
            pmt_requested: HashSet::new(),
        }
    }

    pub fn into_transponder(self) -> Transponder {
        self.transponder
    }

    /// Apply one decoded section; returns follow-up filters to start.
    pub fn apply_section(&mut self, spec: &FilterSpec, section: &Section) -> Vec<SectionFilter> {
        match spec.table_id {
            table_id::PAT => match PatTable::parse(section) {
                Ok(pat) => return self.apply_pat(&pat),
                Err(e) => warn!("ScanSession: PAT decode failed: {}", e),
            },
            table_id::PMT => match PmtTable::parse(section) {
                Ok(pmt) => self.apply_pmt(&pmt),
                Err(e) => warn!("ScanSession: PMT decode failed: {}", e),
            },
            table_id::NIT_ACTUAL | table_id::NIT_OTHER => match NitTable::parse(section) {
                Ok(nit) => self.apply_nit(&nit),
                Err(e) => warn!("ScanSession: NIT decode failed: {}", e),
            },
            table_id::SDT_ACTUAL | table_id::SDT_OTHER => match SdtTable::parse(section) {
                Ok(sdt) => self.apply_sdt(&sdt),
                Err(e) => warn!("ScanSession: SDT decode failed: {}", e),
            },
            other => debug!("ScanSession: no handler for table 0x{:02X}", other),
        }
        Vec::new()
    }

    fn apply_pat(&mut self, pat: &PatTable) -> Vec<SectionFilter> {
        self.saw_pat = true;

        let tp = &mut self.transponder;
        if tp.transport_stream_id != pat.transport_stream_id {
            if tp.transport_stream_id != 0 {
                info!(
                    "PAT: transport stream id changes 0x{:04X} -> 0x{:04X}",
                    tp.transport_stream_id, pat.transport_stream_id
                );
            }
            tp.transport_stream_id = pat.transport_stream_id;
        }

        let mut spawned = Vec::new();
        for entry in &pat.entries {
            if entry.program_number == 0 {
                if tp.network_pid != entry.pid {
                    info!("PAT: network PID 0x{:04X}", entry.pid);
                    tp.network_pid = entry.pid;
                }
                continue;
            }

            let service = tp.find_or_insert_service(entry.program_number);
            service.pmt_pid = entry.pid;

            if !self.initial && self.pmt_requested.insert(entry.program_number) {
                spawned.push(SectionFilter::new(
                    FilterSpec {
                        pid: entry.pid,
                        table_id: table_id::PMT,
                        table_id_ext: Some(entry.program_number),
                        run_once: true,
                        segmented: false,
                    },
                    self.long_timeouts,
                ));
            }
        }
        spawned
    }

    fn apply_pmt(&mut self, pmt: &PmtTable) {
        let tp = &mut self.transponder;
        let Some(service) = tp.find_service_mut(pmt.program_number) else {
            warn!(
                "PMT: program 0x{:04X} is not announced in the PAT, skipping",
                pmt.program_number
            );
            return;
        };

        service.pcr_pid = pmt.pcr_pid;

        // Program level descriptors: scrambling and a language fallback
        // for audio streams without their own descriptor.
        let mut fallback_language = None;
        for d in DescriptorIter::new(&pmt.program_info) {
            match d.tag {
                descriptor_tag::CA => {
                    if let Ok(ca) = CaDescriptor::parse(d.data) {
                        service.scrambled = true;
                        service.add_ca_system_id(ca.ca_system_id);
                    }
                }
                descriptor_tag::ISO_639_LANGUAGE => {
                    if let Ok(lang) = Iso639LanguageDescriptor::parse(d.data) {
                        fallback_language.get_or_insert(lang.language);
                    }
                }
                _ => {}
            }
        }

        for stream in &pmt.streams {
            let mut language = None;
            let mut has_teletext = false;
            let mut has_subtitling = false;
            let mut has_ac3 = false;
            for d in DescriptorIter::new(&stream.es_info) {
                match d.tag {
                    descriptor_tag::CA => {
                        if let Ok(ca) = CaDescriptor::parse(d.data) {
                            service.scrambled = true;
                            service.add_ca_system_id(ca.ca_system_id);
                        }
                    }
                    descriptor_tag::ISO_639_LANGUAGE => {
                        if let Ok(lang) = Iso639LanguageDescriptor::parse(d.data) {
                            language.get_or_insert(lang.language);
                        }
                    }
                    descriptor_tag::TELETEXT => has_teletext = true,
                    descriptor_tag::SUBTITLING => has_subtitling = true,
                    descriptor_tag::AC3 | descriptor_tag::ENHANCED_AC3 => has_ac3 = true,
                    _ => {}
                }
            }
            let language = language.or_else(|| fallback_language.clone());

            match stream.stream_type {
                stream_type::VIDEO_MPEG1
                | stream_type::VIDEO_MPEG2
                | stream_type::VIDEO_H264
                | stream_type::VIDEO_HEVC => {
                    if service.video_pid == 0 {
                        service.video_pid = stream.pid;
                        service.video_stream_type = stream.stream_type;
                    }
                }
                stream_type::AUDIO_MPEG1
                | stream_type::AUDIO_MPEG2
                | stream_type::AUDIO_AAC
                | stream_type::AUDIO_AAC_LATM => {
                    let track = AudioTrack {
                        pid: stream.pid,
                        stream_type: stream.stream_type,
                        language,
                    };
                    if service.audio.push(track).is_err() {
                        warn!(
                            "PMT: service 0x{:04X} has more than {} audio streams, ignoring PID 0x{:04X}",
                            service.service_id,
                            service.audio.capacity(),
                            stream.pid
                        );
                    }
                }
                stream_type::AUDIO_AC3_ATSC => {
                    let track = AudioTrack {
                        pid: stream.pid,
                        stream_type: stream.stream_type,
                        language,
                    };
                    if service.ac3.push(track).is_err() {
                        warn!(
                            "PMT: service 0x{:04X} has more than {} AC-3 streams, ignoring PID 0x{:04X}",
                            service.service_id,
                            service.ac3.capacity(),
                            stream.pid
                        );
                    }
                }
                stream_type::PRIVATE_DATA => {
                    if has_teletext {
                        if service.teletext_pid == 0 {
                            service.teletext_pid = stream.pid;
                        }
                    } else if has_ac3 {
                        let track = AudioTrack {
                            pid: stream.pid,
                            stream_type: stream.stream_type,
                            language,
                        };
                        if service.ac3.push(track).is_err() {
                            warn!(
                                "PMT: service 0x{:04X} has more than {} AC-3 streams, ignoring PID 0x{:04X}",
                                service.service_id,
                                service.ac3.capacity(),
                                stream.pid
                            );
                        }
                    } else if has_subtitling {
                        if service.subtitling_pids.push(stream.pid).is_err() {
                            warn!(
                                "PMT: service 0x{:04X} has more than {} subtitling streams, ignoring PID 0x{:04X}",
                                service.service_id,
                                service.subtitling_pids.capacity(),
                                stream.pid
                            );
                        }
                    }
                }
                other => {
                    debug!(
                        "PMT: service 0x{:04X}: unclassified stream type 0x{:02X} on PID 0x{:04X}",
                        service.service_id, other, stream.pid
                    );
                }
            }
        }
    }

    fn apply_nit(&mut self, nit: &NitTable) {
        if nit.is_actual() {
            self.saw_nit = true;
            if nit.network_id != self.transponder.network_id {
                if self.transponder.network_id != 0 {
                    info!(
                        "NIT: network id changes 0x{:04X} -> 0x{:04X}",
                        self.transponder.network_id, nit.network_id
                    );
                }
                self.transponder.network_id = nit.network_id;
            }
        }

        if self.transponder.network_name.is_none() {
            self.transponder.network_name = nit.network_name();
        }

        let scan_type = self.transponder.scan_type();
        for ts in &nit.transports {
            // On terrestrial networks the NIT lists neighbouring
            // transports too; only the entry for the received stream
            // describes this transponder.
            if scan_type == ScanType::Terrestrial
                && ts.transport_stream_id != self.transponder.transport_stream_id
            {
                debug!(
                    "NIT: skipping transport 0x{:04X} (tuned 0x{:04X})",
                    ts.transport_stream_id, self.transponder.transport_stream_id
                );
                continue;
            }

            if ts.original_network_id != 0 {
                self.transponder.original_network_id = ts.original_network_id;
            }
            self.apply_delivery_descriptors(&ts.descriptors);
        }
    }

    /// Fold delivery descriptors into the transponder. The tuned
    /// frequency is authoritative and never overwritten; announced
    /// frequencies only extend the cell list.
    fn apply_delivery_descriptors(&mut self, descriptors: &[u8]) {
        let tp = &mut self.transponder;
        for d in DescriptorIter::new(descriptors) {
            match d.tag {
                descriptor_tag::TERRESTRIAL_DELIVERY => {
                    if let Ok(t) = TerrestrialDeliveryDescriptor::parse(d.data) {
                        tp.bandwidth = Bandwidth::from_terrestrial_code(t.bandwidth);
                        tp.modulation = Modulation::from_constellation_code(t.constellation);
                        tp.hierarchy = Hierarchy::from_terrestrial_code(t.hierarchy);
                        tp.code_rate_hp = CodeRate::from_terrestrial_code(t.code_rate_hp);
                        tp.code_rate_lp = CodeRate::from_terrestrial_code(t.code_rate_lp);
                        tp.guard_interval = GuardInterval::from_terrestrial_code(t.guard_interval);
                        tp.transmission_mode =
                            TransmissionMode::from_terrestrial_code(t.transmission_mode);
                        tp.add_cell(t.centre_frequency);
                    }
                }
                descriptor_tag::CABLE_DELIVERY => {
                    if let Ok(c) = CableDeliveryDescriptor::parse(d.data) {
                        tp.modulation = Modulation::from_cable_code(c.modulation);
                        tp.symbol_rate = c.symbol_rate;
                        tp.add_cell(c.frequency);
                    }
                }
                descriptor_tag::SATELLITE_DELIVERY => {
                    if let Ok(s) = SatelliteDeliveryDescriptor::parse(d.data) {
                        tp.symbol_rate = s.symbol_rate;
                        tp.polarization = Some(Polarization::from_satellite_code(s.polarization));
                        if s.modulation_system == 1 && tp.delivery_system == DeliverySystem::DvbS {
                            tp.delivery_system = DeliverySystem::DvbS2;
                        }
                        tp.add_cell(s.frequency);
                    }
                }
                descriptor_tag::S2_SATELLITE_DELIVERY => {
                    if let Ok(s2) = S2SatelliteDeliveryDescriptor::parse(d.data) {
                        if tp.delivery_system == DeliverySystem::DvbS {
                            tp.delivery_system = DeliverySystem::DvbS2;
                        }
                        if let Some(isi) = s2.input_stream_id {
                            tp.plp_id = isi;
                        }
                    }
                }
                descriptor_tag::FREQUENCY_LIST => {
                    if let Ok(f) = FrequencyListDescriptor::parse(d.data) {
                        for freq in f.frequencies {
                            tp.add_cell(freq);
                        }
                    }
                }
                descriptor_tag::EXTENSION => {
                    let Ok((ext, body)) = split_extension(d.data) else {
                        continue;
                    };
                    match ext {
                        extension_tag::T2_DELIVERY => {
                            if let Ok(t2) = T2DeliveryDescriptor::parse(body) {
                                tp.plp_id = t2.plp_id;
                                if let Some(bw) = t2.bandwidth {
                                    tp.bandwidth = Bandwidth::from_t2_code(bw);
                                }
                                if let Some(g) = t2.guard_interval {
                                    tp.guard_interval = GuardInterval::from_t2_code(g);
                                }
                                if let Some(t) = t2.transmission_mode {
                                    tp.transmission_mode = TransmissionMode::from_t2_code(t);
                                }
                                for freq in t2.centre_frequencies {
                                    tp.add_cell(freq);
                                }
                            }
                        }
                        extension_tag::C2_DELIVERY => {
                            if let Ok(c2) = C2DeliveryDescriptor::parse(body) {
                                tp.plp_id = c2.plp_id;
                                tp.add_cell(c2.centre_frequency);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_sdt(&mut self, sdt: &SdtTable) {
        let tp = &mut self.transponder;
        if sdt.is_actual() {
            if tp.transport_stream_id != 0 && sdt.transport_stream_id != tp.transport_stream_id {
                debug!(
                    "SDT: transport stream id 0x{:04X} differs from PAT 0x{:04X}",
                    sdt.transport_stream_id, tp.transport_stream_id
                );
            }
            tp.original_network_id = sdt.original_network_id;
        }

        for entry in &sdt.services {
            let service = tp.find_or_insert_service(entry.service_id);
            service.running_status = entry.running_status;
            if entry.scrambled {
                service.scrambled = true;
            }

            if let Some(desc) = entry.service_descriptor() {
                service.service_type = desc.service_type;
                if !desc.provider_name.is_empty() {
                    service.provider_name = Some(desc.provider_name);
                }
                if !desc.service_name.is_empty() {
                    service.service_name = Some(desc.service_name);
                }
            }

            for d in DescriptorIter::new(&entry.descriptors) {
                if d.tag == descriptor_tag::CA_IDENTIFIER {
                    if let Ok(ids) = CaIdentifierDescriptor::parse(d.data) {
                        for id in ids.system_ids {
                            service.add_ca_system_id(id);
                        }
                    }
                }
            }
        }
    }
}

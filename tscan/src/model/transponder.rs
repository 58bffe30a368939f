//! Transponder model and tuning parameter enums.
//!
//! Wire-code constructors follow the delivery system descriptor field
//! encodings; `vdr_value` methods emit the numeric parameter codes used
//! by VDR channels.conf.

use serde::Serialize;

use super::service::Service;

/// Delivery system of a transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliverySystem {
    DvbT,
    DvbT2,
    DvbC,
    Atsc,
    DvbS,
    DvbS2,
}

impl DeliverySystem {
    pub fn scan_type(self) -> ScanType {
        match self {
            DeliverySystem::DvbT | DeliverySystem::DvbT2 => ScanType::Terrestrial,
            DeliverySystem::DvbC => ScanType::Cable,
            DeliverySystem::Atsc => ScanType::Atsc,
            DeliverySystem::DvbS | DeliverySystem::DvbS2 => ScanType::Satellite,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeliverySystem::DvbT => "DVB-T",
            DeliverySystem::DvbT2 => "DVB-T2",
            DeliverySystem::DvbC => "DVB-C",
            DeliverySystem::Atsc => "ATSC",
            DeliverySystem::DvbS => "DVB-S",
            DeliverySystem::DvbS2 => "DVB-S2",
        }
    }
}

/// Broad scan family, the unit duplicate detection compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanType {
    Terrestrial,
    Cable,
    Atsc,
    Satellite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Bandwidth {
    #[default]
    Auto,
    Mhz5,
    Mhz6,
    Mhz7,
    Mhz8,
    Mhz10,
    Khz1712,
}

impl Bandwidth {
    /// From the 3 bit terrestrial delivery descriptor code.
    pub fn from_terrestrial_code(code: u8) -> Self {
        match code {
            0 => Bandwidth::Mhz8,
            1 => Bandwidth::Mhz7,
            2 => Bandwidth::Mhz6,
            3 => Bandwidth::Mhz5,
            _ => Bandwidth::Auto,
        }
    }

    /// From the 4 bit T2 delivery descriptor code.
    pub fn from_t2_code(code: u8) -> Self {
        match code {
            0 => Bandwidth::Mhz8,
            1 => Bandwidth::Mhz7,
            2 => Bandwidth::Mhz6,
            3 => Bandwidth::Mhz5,
            4 => Bandwidth::Mhz10,
            5 => Bandwidth::Khz1712,
            _ => Bandwidth::Auto,
        }
    }

    pub fn vdr_value(self) -> u32 {
        match self {
            Bandwidth::Auto => 999,
            Bandwidth::Mhz5 => 5,
            Bandwidth::Mhz6 => 6,
            Bandwidth::Mhz7 => 7,
            Bandwidth::Mhz8 => 8,
            Bandwidth::Mhz10 => 10,
            Bandwidth::Khz1712 => 1712,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Modulation {
    #[default]
    Auto,
    Qpsk,
    Qam16,
    Qam32,
    Qam64,
    Qam128,
    Qam256,
    Vsb8,
}

impl Modulation {
    /// From the 2 bit constellation code of the terrestrial descriptor.
    pub fn from_constellation_code(code: u8) -> Self {
        match code {
            0 => Modulation::Qpsk,
            1 => Modulation::Qam16,
            2 => Modulation::Qam64,
            _ => Modulation::Auto,
        }
    }

    /// From the cable delivery descriptor modulation byte.
    pub fn from_cable_code(code: u8) -> Self {
        match code {
            1 => Modulation::Qam16,
            2 => Modulation::Qam32,
            3 => Modulation::Qam64,
            4 => Modulation::Qam128,
            5 => Modulation::Qam256,
            _ => Modulation::Auto,
        }
    }

    pub fn vdr_value(self) -> u32 {
        match self {
            Modulation::Auto => 999,
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 16,
            Modulation::Qam32 => 32,
            Modulation::Qam64 => 64,
            Modulation::Qam128 => 128,
            Modulation::Qam256 => 256,
            Modulation::Vsb8 => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum CodeRate {
    #[default]
    Auto,
    None,
    Rate1_2,
    Rate2_3,
    Rate3_4,
    Rate5_6,
    Rate7_8,
}

impl CodeRate {
    /// From the 3 bit code rate field of the terrestrial descriptor.
    pub fn from_terrestrial_code(code: u8) -> Self {
        match code {
            0 => CodeRate::Rate1_2,
            1 => CodeRate::Rate2_3,
            2 => CodeRate::Rate3_4,
            3 => CodeRate::Rate5_6,
            4 => CodeRate::Rate7_8,
            _ => CodeRate::Auto,
        }
    }

    pub fn vdr_value(self) -> u32 {
        match self {
            CodeRate::Auto => 999,
            CodeRate::None => 0,
            CodeRate::Rate1_2 => 12,
            CodeRate::Rate2_3 => 23,
            CodeRate::Rate3_4 => 34,
            CodeRate::Rate5_6 => 56,
            CodeRate::Rate7_8 => 78,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum GuardInterval {
    #[default]
    Auto,
    G1_4,
    G1_8,
    G1_16,
    G1_32,
    G1_128,
    G19_128,
    G19_256,
}

impl GuardInterval {
    /// From the 2 bit guard interval field of the terrestrial descriptor.
    pub fn from_terrestrial_code(code: u8) -> Self {
        match code {
            0 => GuardInterval::G1_32,
            1 => GuardInterval::G1_16,
            2 => GuardInterval::G1_8,
            _ => GuardInterval::G1_4,
        }
    }

    /// From the 3 bit guard interval field of the T2 descriptor.
    pub fn from_t2_code(code: u8) -> Self {
        match code {
            0 => GuardInterval::G1_32,
            1 => GuardInterval::G1_16,
            2 => GuardInterval::G1_8,
            3 => GuardInterval::G1_4,
            4 => GuardInterval::G1_128,
            5 => GuardInterval::G19_128,
            6 => GuardInterval::G19_256,
            _ => GuardInterval::Auto,
        }
    }

    pub fn vdr_value(self) -> u32 {
        match self {
            GuardInterval::Auto => 999,
            GuardInterval::G1_4 => 4,
            GuardInterval::G1_8 => 8,
            GuardInterval::G1_16 => 16,
            GuardInterval::G1_32 => 32,
            GuardInterval::G1_128 => 128,
            GuardInterval::G19_128 => 19128,
            GuardInterval::G19_256 => 19256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum TransmissionMode {
    #[default]
    Auto,
    M1k,
    M2k,
    M4k,
    M8k,
    M16k,
    M32k,
}

impl TransmissionMode {
    /// From the 2 bit transmission mode field of the terrestrial descriptor.
    pub fn from_terrestrial_code(code: u8) -> Self {
        match code {
            0 => TransmissionMode::M2k,
            1 => TransmissionMode::M8k,
            2 => TransmissionMode::M4k,
            _ => TransmissionMode::Auto,
        }
    }

    /// From the 3 bit transmission mode field of the T2 descriptor.
    pub fn from_t2_code(code: u8) -> Self {
        match code {
            0 => TransmissionMode::M2k,
            1 => TransmissionMode::M8k,
            2 => TransmissionMode::M4k,
            3 => TransmissionMode::M1k,
            4 => TransmissionMode::M16k,
            5 => TransmissionMode::M32k,
            _ => TransmissionMode::Auto,
        }
    }

    pub fn vdr_value(self) -> u32 {
        match self {
            TransmissionMode::Auto => 999,
            TransmissionMode::M1k => 1,
            TransmissionMode::M2k => 2,
            TransmissionMode::M4k => 4,
            TransmissionMode::M8k => 8,
            TransmissionMode::M16k => 16,
            TransmissionMode::M32k => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Hierarchy {
    #[default]
    Auto,
    None,
    H1,
    H2,
    H4,
}

impl Hierarchy {
    /// From the 3 bit hierarchy field; the in-depth interleaver variants
    /// share the alpha value of their plain counterparts.
    pub fn from_terrestrial_code(code: u8) -> Self {
        match code & 0x03 {
            0 => Hierarchy::None,
            1 => Hierarchy::H1,
            2 => Hierarchy::H2,
            _ => Hierarchy::H4,
        }
    }

    pub fn vdr_value(self) -> u32 {
        match self {
            Hierarchy::Auto => 999,
            Hierarchy::None => 0,
            Hierarchy::H1 => 1,
            Hierarchy::H2 => 2,
            Hierarchy::H4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Polarization {
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

impl Polarization {
    /// From the 2 bit polarization field of the satellite descriptor.
    pub fn from_satellite_code(code: u8) -> Self {
        match code {
            0 => Polarization::Horizontal,
            1 => Polarization::Vertical,
            2 => Polarization::CircularLeft,
            _ => Polarization::CircularRight,
        }
    }

    pub fn vdr_char(self) -> char {
        match self {
            Polarization::Horizontal => 'h',
            Polarization::Vertical => 'v',
            Polarization::CircularLeft => 'l',
            Polarization::CircularRight => 'r',
        }
    }
}

/// A physical transport stream plus everything the scan learned about it.
#[derive(Debug, Clone, Serialize)]
pub struct Transponder {
    /// Delivery system.
    pub delivery_system: DeliverySystem,
    /// Tuned centre frequency in Hz (kHz for satellite).
    pub frequency: u32,
    /// Symbol rate in symbols/sec (cable and satellite).
    pub symbol_rate: u32,
    pub bandwidth: Bandwidth,
    pub modulation: Modulation,
    pub code_rate_hp: CodeRate,
    pub code_rate_lp: CodeRate,
    pub guard_interval: GuardInterval,
    pub transmission_mode: TransmissionMode,
    pub hierarchy: Hierarchy,
    /// Polarization (satellite only).
    pub polarization: Option<Polarization>,
    /// Physical layer pipe id (DVB-T2) or input stream id (DVB-S2).
    pub plp_id: u8,
    /// Original network id, from SDT or NIT.
    pub original_network_id: u16,
    /// Network id, from NIT.
    pub network_id: u16,
    /// Transport stream id, from PAT.
    pub transport_stream_id: u16,
    /// PID carrying the NIT; PAT program 0 may move it.
    pub network_pid: u16,
    /// Network name from the NIT.
    pub network_name: Option<String>,
    /// Known centre frequencies for this transport, tuned one first.
    pub cells: Vec<u32>,
    /// Services found on this transport.
    pub services: Vec<Service>,
}

impl Transponder {
    /// A candidate with automatic parameters, before any table arrived.
    pub fn probe(delivery_system: DeliverySystem, frequency: u32) -> Self {
        Transponder {
            delivery_system,
            frequency,
            symbol_rate: 0,
            bandwidth: Bandwidth::Auto,
            modulation: Modulation::Auto,
            code_rate_hp: CodeRate::Auto,
            code_rate_lp: CodeRate::Auto,
            guard_interval: GuardInterval::Auto,
            transmission_mode: TransmissionMode::Auto,
            hierarchy: Hierarchy::Auto,
            polarization: None,
            plp_id: 0,
            original_network_id: 0,
            network_id: 0,
            transport_stream_id: 0,
            network_pid: tscan_si::pid::NIT,
            network_name: None,
            cells: vec![frequency],
            services: Vec::new(),
        }
    }

    pub fn scan_type(&self) -> ScanType {
        self.delivery_system.scan_type()
    }

    /// Identity triple used for output deduplication.
    pub fn broadcaster_triple(&self) -> (u16, u16, u16) {
        (
            self.original_network_id,
            self.network_id,
            self.transport_stream_id,
        )
    }

    /// Record an alternate centre frequency, keeping the list duplicate free.
    pub fn add_cell(&mut self, frequency: u32) {
        if frequency != 0 && !self.cells.contains(&frequency) {
            self.cells.push(frequency);
        }
    }

    pub fn find_service(&self, service_id: u16) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == service_id)
    }

    pub fn find_service_mut(&mut self, service_id: u16) -> Option<&mut Service> {
        self.services
            .iter_mut()
            .find(|s| s.service_id == service_id)
    }

    /// Find a service, creating it on first reference.
    pub fn find_or_insert_service(&mut self, service_id: u16) -> &mut Service {
        if let Some(idx) = self
            .services
            .iter()
            .position(|s| s.service_id == service_id)
        {
            return &mut self.services[idx];
        }
        self.services.push(Service::new(service_id));
        self.services.last_mut().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_defaults() {
        let tp = Transponder::probe(DeliverySystem::DvbT, 474_000_000);
        assert_eq!(tp.scan_type(), ScanType::Terrestrial);
        assert_eq!(tp.network_pid, tscan_si::pid::NIT);
        assert_eq!(tp.cells, vec![474_000_000]);
        assert_eq!(tp.modulation, Modulation::Auto);
    }

    #[test]
    fn test_find_or_insert_service() {
        let mut tp = Transponder::probe(DeliverySystem::DvbT, 474_000_000);
        tp.find_or_insert_service(100).pmt_pid = 0x0100;
        tp.find_or_insert_service(100).pcr_pid = 0x0101;

        assert_eq!(tp.services.len(), 1);
        assert_eq!(tp.find_service(100).unwrap().pmt_pid, 0x0100);
        assert_eq!(tp.find_service(100).unwrap().pcr_pid, 0x0101);
    }

    #[test]
    fn test_add_cell_dedupes() {
        let mut tp = Transponder::probe(DeliverySystem::DvbT, 474_000_000);
        tp.add_cell(474_000_000);
        tp.add_cell(482_000_000);
        tp.add_cell(0);
        assert_eq!(tp.cells, vec![474_000_000, 482_000_000]);
    }

    #[test]
    fn test_wire_code_mappings() {
        assert_eq!(Bandwidth::from_terrestrial_code(0), Bandwidth::Mhz8);
        assert_eq!(Bandwidth::from_t2_code(5), Bandwidth::Khz1712);
        assert_eq!(Modulation::from_constellation_code(2), Modulation::Qam64);
        assert_eq!(Modulation::from_cable_code(5), Modulation::Qam256);
        assert_eq!(CodeRate::from_terrestrial_code(1), CodeRate::Rate2_3);
        assert_eq!(GuardInterval::from_terrestrial_code(2), GuardInterval::G1_8);
        assert_eq!(TransmissionMode::from_terrestrial_code(1), TransmissionMode::M8k);
        assert_eq!(Hierarchy::from_terrestrial_code(5), Hierarchy::H1);
        assert_eq!(GuardInterval::G19_128.vdr_value(), 19128);
    }
}

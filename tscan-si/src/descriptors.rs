//! Descriptor decoding for SI tables.
//!
//! Descriptors are TLV records inside NIT/SDT/PMT loops. The iterator
//! walks a raw loop; typed decoders pull the fields the scanner consumes.

use crate::error::SiError;

/// A single raw descriptor from a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'a> {
    /// Descriptor tag.
    pub tag: u8,
    /// Descriptor payload (after tag and length bytes).
    pub data: &'a [u8],
}

/// Iterator over a raw descriptor loop.
///
/// Stops on a truncated trailing descriptor or on a zero-length
/// descriptor with a nonzero tag (a malformed-stream signal).
#[derive(Debug, Clone)]
pub struct DescriptorIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> DescriptorIter<'a> {
    /// Walk the descriptor loop in `data`.
    pub fn new(data: &'a [u8]) -> Self {
        DescriptorIter { data, offset: 0 }
    }
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = Descriptor<'a>;

    fn next(&mut self) -> Option<Descriptor<'a>> {
        loop {
            if self.offset + 2 > self.data.len() {
                return None;
            }
            let tag = self.data[self.offset];
            let length = self.data[self.offset + 1] as usize;
            if length == 0 {
                if tag != 0 {
                    return None;
                }
                // stuffing
                self.offset += 2;
                continue;
            }
            if self.offset + 2 + length > self.data.len() {
                return None;
            }
            let data = &self.data[self.offset + 2..self.offset + 2 + length];
            self.offset += 2 + length;
            return Some(Descriptor { tag, data });
        }
    }
}

/// Find the first descriptor with the given tag in a raw loop.
pub fn find_descriptor(data: &[u8], tag: u8) -> Option<&[u8]> {
    DescriptorIter::new(data).find(|d| d.tag == tag).map(|d| d.data)
}

/// Split an extension descriptor (0x7F) into its secondary tag and body.
pub fn split_extension(data: &[u8]) -> Result<(u8, &[u8]), SiError> {
    if data.is_empty() {
        return Err(SiError::Malformed("extension descriptor"));
    }
    Ok((data[0], &data[1..]))
}

/// Network name descriptor (0x40).
#[derive(Debug, Clone, Default)]
pub struct NetworkNameDescriptor {
    /// Network name.
    pub name: String,
}

impl NetworkNameDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        Ok(NetworkNameDescriptor {
            name: decode_si_string(data),
        })
    }
}

/// Service descriptor (0x48).
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    /// Service type.
    pub service_type: u8,
    /// Service provider name.
    pub provider_name: String,
    /// Service name.
    pub service_name: String,
}

impl ServiceDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 3 {
            return Err(SiError::Malformed("service descriptor"));
        }

        let service_type = data[0];
        let provider_len = data[1] as usize;
        if data.len() < 2 + provider_len + 1 {
            return Err(SiError::Malformed("service descriptor provider name"));
        }
        let provider_name = decode_si_string(&data[2..2 + provider_len]);

        let name_offset = 2 + provider_len;
        let name_len = data[name_offset] as usize;
        if data.len() < name_offset + 1 + name_len {
            return Err(SiError::Malformed("service descriptor service name"));
        }
        let service_name = decode_si_string(&data[name_offset + 1..name_offset + 1 + name_len]);

        Ok(ServiceDescriptor {
            service_type,
            provider_name,
            service_name,
        })
    }
}

/// Conditional access descriptor (0x09).
#[derive(Debug, Clone, Copy, Default)]
pub struct CaDescriptor {
    /// CA system id.
    pub ca_system_id: u16,
    /// PID carrying the ECM/EMM stream.
    pub ca_pid: u16,
}

impl CaDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 4 {
            return Err(SiError::Malformed("CA descriptor"));
        }
        Ok(CaDescriptor {
            ca_system_id: ((data[0] as u16) << 8) | data[1] as u16,
            ca_pid: ((data[2] as u16 & 0x1F) << 8) | data[3] as u16,
        })
    }
}

/// CA identifier descriptor (0x53).
#[derive(Debug, Clone, Default)]
pub struct CaIdentifierDescriptor {
    /// CA system ids.
    pub system_ids: Vec<u16>,
}

impl CaIdentifierDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        let system_ids = data
            .chunks_exact(2)
            .map(|c| ((c[0] as u16) << 8) | c[1] as u16)
            .collect();
        Ok(CaIdentifierDescriptor { system_ids })
    }
}

/// ISO 639 language descriptor (0x0A). Only the first entry is kept.
#[derive(Debug, Clone, Default)]
pub struct Iso639LanguageDescriptor {
    /// Three letter language code.
    pub language: String,
    /// Audio type.
    pub audio_type: u8,
}

impl Iso639LanguageDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 4 {
            return Err(SiError::Malformed("ISO 639 language descriptor"));
        }
        Ok(Iso639LanguageDescriptor {
            language: decode_si_string(&data[0..3]),
            audio_type: data[3],
        })
    }
}

/// Terrestrial delivery system descriptor (0x5A).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerrestrialDeliveryDescriptor {
    /// Centre frequency in Hz.
    pub centre_frequency: u32,
    /// Bandwidth code (3 bits).
    pub bandwidth: u8,
    /// Constellation code (2 bits).
    pub constellation: u8,
    /// Hierarchy information (3 bits).
    pub hierarchy: u8,
    /// Code rate, high priority stream (3 bits).
    pub code_rate_hp: u8,
    /// Code rate, low priority stream (3 bits).
    pub code_rate_lp: u8,
    /// Guard interval code (2 bits).
    pub guard_interval: u8,
    /// Transmission mode code (2 bits).
    pub transmission_mode: u8,
    /// Other frequencies in use.
    pub other_frequency_flag: bool,
}

impl TerrestrialDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 7 {
            return Err(SiError::Malformed("terrestrial delivery descriptor"));
        }

        // Frequency field is in units of 10 Hz.
        let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let centre_frequency = raw.saturating_mul(10);

        Ok(TerrestrialDeliveryDescriptor {
            centre_frequency,
            bandwidth: (data[4] >> 5) & 0x07,
            constellation: (data[5] >> 6) & 0x03,
            hierarchy: (data[5] >> 3) & 0x07,
            code_rate_hp: data[5] & 0x07,
            code_rate_lp: (data[6] >> 5) & 0x07,
            guard_interval: (data[6] >> 3) & 0x03,
            transmission_mode: (data[6] >> 1) & 0x03,
            other_frequency_flag: data[6] & 0x01 != 0,
        })
    }
}

/// Cable delivery system descriptor (0x44).
#[derive(Debug, Clone, Copy, Default)]
pub struct CableDeliveryDescriptor {
    /// Frequency in Hz.
    pub frequency: u32,
    /// FEC outer code (4 bits).
    pub fec_outer: u8,
    /// Modulation code.
    pub modulation: u8,
    /// Symbol rate in symbols/sec.
    pub symbol_rate: u32,
    /// FEC inner code (4 bits).
    pub fec_inner: u8,
}

impl CableDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 11 {
            return Err(SiError::Malformed("cable delivery descriptor"));
        }

        // Frequency: 8 BCD digits in units of 100 Hz.
        let frequency = bcd_to_u32(&data[0..4]).saturating_mul(100);
        let fec_outer = data[5] & 0x0F;
        let modulation = data[6];
        // Symbol rate: 7 BCD digits in units of 100 symbols/sec.
        let symbol_rate = (bcd_to_u32(&data[7..11]) / 10) * 100;
        let fec_inner = data[10] & 0x0F;

        Ok(CableDeliveryDescriptor {
            frequency,
            fec_outer,
            modulation,
            symbol_rate,
            fec_inner,
        })
    }
}

/// Satellite delivery system descriptor (0x43).
#[derive(Debug, Clone, Copy, Default)]
pub struct SatelliteDeliveryDescriptor {
    /// Frequency in kHz.
    pub frequency: u32,
    /// Orbital position (degrees * 10).
    pub orbital_position: u16,
    /// West/East flag (false = West).
    pub east_flag: bool,
    /// Polarization code (2 bits).
    pub polarization: u8,
    /// Modulation system (0 = DVB-S, 1 = DVB-S2).
    pub modulation_system: u8,
    /// Modulation type (2 bits).
    pub modulation_type: u8,
    /// Symbol rate in symbols/sec.
    pub symbol_rate: u32,
    /// FEC inner code (4 bits).
    pub fec_inner: u8,
}

impl SatelliteDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 11 {
            return Err(SiError::Malformed("satellite delivery descriptor"));
        }

        // Frequency: 8 BCD digits in units of 10 kHz.
        let frequency = bcd_to_u32(&data[0..4]).saturating_mul(10);
        let orbital_position = (bcd_to_u32(&data[4..6]) & 0xFFFF) as u16;
        let east_flag = data[6] & 0x80 != 0;
        let polarization = (data[6] >> 5) & 0x03;
        let modulation_system = (data[6] >> 2) & 0x01;
        let modulation_type = data[6] & 0x03;
        // Symbol rate: 7 BCD digits in units of 100 symbols/sec.
        let symbol_rate = (bcd_to_u32(&data[7..11]) / 10) * 100;
        let fec_inner = data[10] & 0x0F;

        Ok(SatelliteDeliveryDescriptor {
            frequency,
            orbital_position,
            east_flag,
            polarization,
            modulation_system,
            modulation_type,
            symbol_rate,
            fec_inner,
        })
    }
}

/// S2 satellite delivery system descriptor (0x79). Only flags the scanner
/// needs; the physical layer details ride on the plain satellite descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct S2SatelliteDeliveryDescriptor {
    /// Multiple input stream flag.
    pub multiple_input_stream: bool,
    /// Input stream identifier, when the flag is set.
    pub input_stream_id: Option<u8>,
}

impl S2SatelliteDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.is_empty() {
            return Err(SiError::Malformed("S2 satellite delivery descriptor"));
        }
        let scrambling_selector = data[0] & 0x80 != 0;
        let multiple_input_stream = data[0] & 0x40 != 0;
        let mut offset = 1;
        if scrambling_selector {
            offset += 3;
        }
        let input_stream_id = if multiple_input_stream {
            data.get(offset).copied()
        } else {
            None
        };
        Ok(S2SatelliteDeliveryDescriptor {
            multiple_input_stream,
            input_stream_id,
        })
    }
}

/// Frequency list descriptor (0x62).
#[derive(Debug, Clone, Default)]
pub struct FrequencyListDescriptor {
    /// Coding type (1 = satellite, 2 = cable, 3 = terrestrial).
    pub coding_type: u8,
    /// Centre frequencies, in the native unit of the coding type
    /// (kHz for satellite, Hz for cable and terrestrial).
    pub frequencies: Vec<u32>,
}

impl FrequencyListDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.is_empty() {
            return Err(SiError::Malformed("frequency list descriptor"));
        }

        let coding_type = data[0] & 0x03;
        let frequencies = data[1..]
            .chunks_exact(4)
            .map(|c| match coding_type {
                1 => bcd_to_u32(c).saturating_mul(10),
                2 => bcd_to_u32(c).saturating_mul(100),
                _ => u32::from_be_bytes([c[0], c[1], c[2], c[3]]).saturating_mul(10),
            })
            .collect();

        Ok(FrequencyListDescriptor {
            coding_type,
            frequencies,
        })
    }
}

/// T2 delivery system descriptor (extension tag 0x04).
#[derive(Debug, Clone, Default)]
pub struct T2DeliveryDescriptor {
    /// PLP id.
    pub plp_id: u8,
    /// T2 system id.
    pub t2_system_id: u16,
    /// Bandwidth code, when the extended part is present.
    pub bandwidth: Option<u8>,
    /// Guard interval code, when the extended part is present.
    pub guard_interval: Option<u8>,
    /// Transmission mode code, when the extended part is present.
    pub transmission_mode: Option<u8>,
    /// Cell centre frequencies in Hz.
    pub centre_frequencies: Vec<u32>,
}

impl T2DeliveryDescriptor {
    /// Parse the body following the 0x04 extension tag.
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 3 {
            return Err(SiError::Malformed("T2 delivery descriptor"));
        }

        let mut desc = T2DeliveryDescriptor {
            plp_id: data[0],
            t2_system_id: ((data[1] as u16) << 8) | data[2] as u16,
            ..Default::default()
        };

        if data.len() < 5 {
            return Ok(desc);
        }

        desc.bandwidth = Some((data[3] >> 2) & 0x0F);
        desc.guard_interval = Some((data[4] >> 5) & 0x07);
        desc.transmission_mode = Some((data[4] >> 2) & 0x07);
        let tfs = data[4] & 0x01 != 0;

        // Cell loop: cell_id, centre frequency (or a frequency loop under
        // TFS), then a subcell loop which the scanner skips.
        let mut offset = 5;
        while offset + 2 <= data.len() {
            offset += 2; // cell_id
            if tfs {
                if offset >= data.len() {
                    break;
                }
                let loop_len = data[offset] as usize;
                offset += 1;
                if offset + loop_len > data.len() {
                    break;
                }
                for c in data[offset..offset + loop_len].chunks_exact(4) {
                    desc.centre_frequencies
                        .push(u32::from_be_bytes([c[0], c[1], c[2], c[3]]).saturating_mul(10));
                }
                offset += loop_len;
            } else {
                if offset + 4 > data.len() {
                    break;
                }
                let raw = u32::from_be_bytes([
                    data[offset],
                    data[offset + 1],
                    data[offset + 2],
                    data[offset + 3],
                ]);
                desc.centre_frequencies.push(raw.saturating_mul(10));
                offset += 4;
            }
            if offset >= data.len() {
                break;
            }
            let subcell_len = data[offset] as usize;
            offset += 1 + subcell_len;
        }

        Ok(desc)
    }
}

/// C2 delivery system descriptor (extension tag 0x0D).
#[derive(Debug, Clone, Copy, Default)]
pub struct C2DeliveryDescriptor {
    /// PLP id.
    pub plp_id: u8,
    /// Data slice id.
    pub data_slice_id: u8,
    /// C2 system tuning frequency in Hz.
    pub centre_frequency: u32,
}

impl C2DeliveryDescriptor {
    /// Parse the body following the 0x0D extension tag.
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 6 {
            return Err(SiError::Malformed("C2 delivery descriptor"));
        }
        Ok(C2DeliveryDescriptor {
            plp_id: data[0],
            data_slice_id: data[1],
            centre_frequency: u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
        })
    }
}

/// Decode a DVB-SI text field to UTF-8.
///
/// A leading byte below 0x20 selects a character table; the scanner
/// skips it and degrades non-UTF-8 content to lossy ASCII.
pub fn decode_si_string(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }

    let start = if data[0] < 0x20 { 1 } else { 0 };
    let slice = &data[start..];

    if let Ok(s) = std::str::from_utf8(slice) {
        return s.to_string();
    }

    slice
        .iter()
        .filter(|&&b| b >= 0x20 || b == 0x0A || b == 0x0D)
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Convert BCD bytes to u32.
pub fn bcd_to_u32(data: &[u8]) -> u32 {
    let mut result = 0u32;
    for &byte in data {
        let high = (byte >> 4) as u32;
        let low = (byte & 0x0F) as u32;
        result = result * 100 + high * 10 + low;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_iter() {
        let data = [
            0x48, 0x02, 0xAA, 0xBB, // service descriptor, length 2
            0x40, 0x03, 0xCC, 0xDD, 0xEE, // network name, length 3
        ];

        let descs: Vec<_> = DescriptorIter::new(&data).collect();
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].tag, 0x48);
        assert_eq!(descs[0].data, &[0xAA, 0xBB]);
        assert_eq!(descs[1].tag, 0x40);
        assert_eq!(descs[1].data, &[0xCC, 0xDD, 0xEE]);
    }

    #[test]
    fn test_descriptor_iter_aborts_on_zero_length() {
        let data = [0x48, 0x00, 0x40, 0x02, 0xAA, 0xBB];
        let descs: Vec<_> = DescriptorIter::new(&data).collect();
        assert!(descs.is_empty());
    }

    #[test]
    fn test_descriptor_iter_skips_stuffing() {
        let data = [0x00, 0x00, 0x40, 0x01, 0xAA];
        let descs: Vec<_> = DescriptorIter::new(&data).collect();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].tag, 0x40);
    }

    #[test]
    fn test_descriptor_iter_aborts_on_truncation() {
        let data = [0x48, 0x02, 0xAA, 0xBB, 0x40, 0x09, 0xCC];
        let descs: Vec<_> = DescriptorIter::new(&data).collect();
        assert_eq!(descs.len(), 1);
    }

    #[test]
    fn test_parse_service_descriptor() {
        let data = [
            0x01, // service_type = digital TV
            0x04, b'T', b'E', b'S', b'T', // provider
            0x07, b'C', b'H', b' ', b'N', b'A', b'M', b'E', // name
        ];

        let desc = ServiceDescriptor::parse(&data).unwrap();
        assert_eq!(desc.service_type, 0x01);
        assert_eq!(desc.provider_name, "TEST");
        assert_eq!(desc.service_name, "CH NAME");
    }

    #[test]
    fn test_parse_terrestrial_delivery() {
        // 474 MHz = 47_400_000 * 10 Hz, 8 MHz bw, QAM64, code rate 2/3,
        // guard 1/8, 8k transmission
        let data = [
            0x02, 0xD3, 0x44, 0x40, // 47_400_000
            0x00, // bandwidth = 0 (8 MHz)
            0b10_000_001, // constellation 2 (QAM64), hierarchy 0, HP rate 1 (2/3)
            0b000_10_01_1, // LP rate 0, guard 2 (1/8), transmission 1 (8k), other freq
        ];

        let desc = TerrestrialDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.centre_frequency, 474_000_000);
        assert_eq!(desc.bandwidth, 0);
        assert_eq!(desc.constellation, 2);
        assert_eq!(desc.code_rate_hp, 1);
        assert_eq!(desc.code_rate_lp, 0);
        assert_eq!(desc.guard_interval, 2);
        assert_eq!(desc.transmission_mode, 1);
        assert!(desc.other_frequency_flag);
    }

    #[test]
    fn test_parse_cable_delivery() {
        // 346 MHz, QAM256, 6900 ksym/s
        let data = [
            0x03, 0x46, 0x00, 0x00, // 03460000 BCD * 100 Hz
            0xFF, 0xF2, // fec_outer = 2
            0x05, // QAM256
            0x00, 0x69, 0x00, 0x03, // 0069000 BCD * 100 sym/s, fec_inner = 3
        ];

        let desc = CableDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.frequency, 346_000_000);
        assert_eq!(desc.modulation, 0x05);
        assert_eq!(desc.symbol_rate, 6_900_000);
        assert_eq!(desc.fec_inner, 3);
    }

    #[test]
    fn test_parse_frequency_list_terrestrial() {
        let data = [
            0xFC | 0x03, // coding type 3
            0x02, 0xD3, 0x44, 0x40, // 474 MHz
            0x02, 0xDF, 0x79, 0x40, // 482 MHz
        ];

        let desc = FrequencyListDescriptor::parse(&data).unwrap();
        assert_eq!(desc.coding_type, 3);
        assert_eq!(desc.frequencies, vec![474_000_000, 482_000_000]);
    }

    #[test]
    fn test_parse_t2_delivery_with_cells() {
        let data = [
            0x01, // plp_id
            0x1F, 0x40, // t2_system_id
            0b0000_1100, // siso/miso, bandwidth 3
            0b001_010_00, // guard 1, transmission 2, no tfs
            0x00, 0x01, // cell_id
            0x02, 0xD3, 0x44, 0x40, // 474 MHz
            0x00, // no subcells
        ];

        let desc = T2DeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.plp_id, 1);
        assert_eq!(desc.t2_system_id, 0x1F40);
        assert_eq!(desc.bandwidth, Some(3));
        assert_eq!(desc.guard_interval, Some(1));
        assert_eq!(desc.transmission_mode, Some(2));
        assert_eq!(desc.centre_frequencies, vec![474_000_000]);
    }

    #[test]
    fn test_split_extension() {
        let (tag, body) = split_extension(&[0x04, 0xAA, 0xBB]).unwrap();
        assert_eq!(tag, 0x04);
        assert_eq!(body, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_si_string_skips_charset_byte() {
        assert_eq!(decode_si_string(&[0x05, b'A', b'B', b'C']), "ABC");
        assert_eq!(decode_si_string(b"Plain"), "Plain");
        assert_eq!(decode_si_string(&[]), "");
    }

    #[test]
    fn test_bcd_to_u32() {
        assert_eq!(bcd_to_u32(&[0x12, 0x34]), 1234);
        assert_eq!(bcd_to_u32(&[0x03, 0x46, 0x00, 0x00]), 3_460_000);
    }
}

//! Scan result writers: VDR channels.conf lines and JSON.

use std::io::{self, Write};

use clap::ValueEnum;

use crate::model::{ScanType, Service, Transponder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Vdr,
    Json,
}

/// Which service classes end up in the output.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSelection {
    pub tv: bool,
    pub radio: bool,
    pub other: bool,
    pub include_encrypted: bool,
}

impl ServiceSelection {
    /// Parse a class string of `t` (TV), `r` (radio) and `o` (other).
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut selection = ServiceSelection {
            tv: false,
            radio: false,
            other: false,
            include_encrypted: true,
        };
        for c in s.chars() {
            match c {
                't' => selection.tv = true,
                'r' => selection.radio = true,
                'o' => selection.other = true,
                _ => return Err(format!("unknown service class '{}', expected t, r or o", c)),
            }
        }
        Ok(selection)
    }

    pub fn selects(&self, service: &Service) -> bool {
        if service.scrambled && !self.include_encrypted {
            return false;
        }
        if service.has_video() {
            self.tv
        } else if service.has_audio() {
            self.radio
        } else {
            self.other
        }
    }
}

pub fn write_output<W: Write>(
    out: &mut W,
    format: OutputFormat,
    transponders: &[Transponder],
    selection: ServiceSelection,
) -> io::Result<()> {
    match format {
        OutputFormat::Vdr => write_vdr(out, transponders, selection),
        OutputFormat::Json => write_json(out, transponders, selection),
    }
}

fn write_json<W: Write>(
    out: &mut W,
    transponders: &[Transponder],
    selection: ServiceSelection,
) -> io::Result<()> {
    let filtered: Vec<Transponder> = transponders
        .iter()
        .map(|tp| {
            let mut tp = tp.clone();
            tp.services.retain(|s| selection.selects(s));
            tp
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &filtered).map_err(io::Error::other)?;
    out.write_all(b"\n")
}

fn write_vdr<W: Write>(
    out: &mut W,
    transponders: &[Transponder],
    selection: ServiceSelection,
) -> io::Result<()> {
    for tp in transponders {
        for service in tp.services.iter().filter(|s| selection.selects(s)) {
            writeln!(out, "{}", vdr_line(tp, service))?;
        }
    }
    Ok(())
}

/// One channels.conf line:
/// name;provider:freq:params:source:srate:vpid:apid:tpid:caid:sid:nid:tid:rid
fn vdr_line(tp: &Transponder, service: &Service) -> String {
    let mut name = service.display_name().replace(':', " ");
    if let Some(provider) = &service.provider_name {
        name.push(';');
        name.push_str(&provider.replace(':', " "));
    }

    let (source, srate) = match tp.scan_type() {
        ScanType::Terrestrial => ("T".to_string(), 27500),
        ScanType::Cable => ("C".to_string(), tp.symbol_rate / 1000),
        ScanType::Satellite => ("S".to_string(), tp.symbol_rate / 1000),
        ScanType::Atsc => ("A".to_string(), 0),
    };

    format!(
        "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:0",
        name,
        tp.frequency,
        vdr_params(tp),
        source,
        srate,
        vdr_vpid(service),
        vdr_apid(service),
        service.teletext_pid,
        vdr_caid(service),
        service.service_id,
        tp.original_network_id,
        tp.transport_stream_id,
    )
}

fn vdr_params(tp: &Transponder) -> String {
    match tp.scan_type() {
        ScanType::Terrestrial => {
            let generation = match tp.delivery_system {
                crate::model::DeliverySystem::DvbT2 => 1,
                _ => 0,
            };
            format!(
                "B{}C{}D{}G{}M{}S{}T{}Y{}P{}",
                tp.bandwidth.vdr_value(),
                tp.code_rate_hp.vdr_value(),
                tp.code_rate_lp.vdr_value(),
                tp.guard_interval.vdr_value(),
                tp.modulation.vdr_value(),
                generation,
                tp.transmission_mode.vdr_value(),
                tp.hierarchy.vdr_value(),
                tp.plp_id,
            )
        }
        ScanType::Cable | ScanType::Atsc => {
            format!("C{}M{}", tp.code_rate_hp.vdr_value(), tp.modulation.vdr_value())
        }
        ScanType::Satellite => {
            let pol = tp.polarization.map(|p| p.vdr_char()).unwrap_or('H');
            format!("{}C{}", pol, tp.code_rate_hp.vdr_value())
        }
    }
}

fn vdr_vpid(service: &Service) -> String {
    if service.video_pid == 0 {
        return "0".to_string();
    }
    if service.pcr_pid != 0 && service.pcr_pid != service.video_pid {
        format!(
            "{}+{}={}",
            service.video_pid, service.pcr_pid, service.video_stream_type
        )
    } else {
        format!("{}={}", service.video_pid, service.video_stream_type)
    }
}

fn vdr_apid(service: &Service) -> String {
    let one = |track: &crate::model::AudioTrack| match &track.language {
        Some(lang) => format!("{}={}", track.pid, lang),
        None => track.pid.to_string(),
    };

    let mpeg: Vec<String> = service.audio.iter().map(one).collect();
    let ac3: Vec<String> = service.ac3.iter().map(one).collect();

    let mut apid = if mpeg.is_empty() {
        "0".to_string()
    } else {
        mpeg.join(",")
    };
    if !ac3.is_empty() {
        apid.push(';');
        apid.push_str(&ac3.join(","));
    }
    apid
}

fn vdr_caid(service: &Service) -> String {
    if service.ca_system_ids.is_empty() {
        return "0".to_string();
    }
    service
        .ca_system_ids
        .iter()
        .map(|id| format!("{:X}", id))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioTrack, DeliverySystem};

    fn sample_transponder() -> Transponder {
        let mut tp = Transponder::probe(DeliverySystem::DvbT, 474_000_000);
        tp.original_network_id = 0x3001;
        tp.transport_stream_id = 0x1001;

        let mut tv = Service::new(100);
        tv.service_name = Some("TV1".to_string());
        tv.provider_name = Some("Prov".to_string());
        tv.video_pid = 0x0101;
        tv.video_stream_type = 0x02;
        tv.pcr_pid = 0x0101;
        tv.audio
            .push(AudioTrack {
                pid: 0x0102,
                stream_type: 0x04,
                language: Some("deu".to_string()),
            })
            .unwrap();
        tp.services.push(tv);

        let mut radio = Service::new(200);
        radio.service_name = Some("Radio1".to_string());
        radio
            .audio
            .push(AudioTrack {
                pid: 0x0202,
                stream_type: 0x03,
                language: None,
            })
            .unwrap();
        radio.scrambled = true;
        radio.ca_system_ids.push(0x0D95);
        tp.services.push(radio);

        tp
    }

    #[test]
    fn test_selection_classes() {
        let tp = sample_transponder();
        let tv_only = ServiceSelection::parse("t").unwrap();
        assert!(tv_only.selects(&tp.services[0]));
        assert!(!tv_only.selects(&tp.services[1]));

        let radio_only = ServiceSelection::parse("r").unwrap();
        assert!(!radio_only.selects(&tp.services[0]));
        assert!(radio_only.selects(&tp.services[1]));

        let mut no_crypt = ServiceSelection::parse("tr").unwrap();
        no_crypt.include_encrypted = false;
        assert!(!no_crypt.selects(&tp.services[1]));

        assert!(ServiceSelection::parse("x").is_err());
    }

    #[test]
    fn test_vdr_line_format() {
        let tp = sample_transponder();
        let line = vdr_line(&tp, &tp.services[0]);
        assert_eq!(
            line,
            "TV1;Prov:474000000:B999C999D999G999M999S0T999Y999P0:T:27500:257=2:258=deu:0:0:100:12289:4097:0"
        );
    }

    #[test]
    fn test_vdr_caid_and_apid() {
        let tp = sample_transponder();
        let line = vdr_line(&tp, &tp.services[1]);
        assert!(line.starts_with("Radio1:474000000:"));
        assert!(line.contains(":514:"));
        assert!(line.contains(":D95:"));
    }

    #[test]
    fn test_json_output_filters_services() {
        let tp = sample_transponder();
        let mut buf = Vec::new();
        write_json(&mut buf, &[tp], ServiceSelection::parse("t").unwrap()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"TV1\""));
        assert!(!text.contains("\"Radio1\""));
    }
}

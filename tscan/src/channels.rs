//! Channel number to centre frequency mapping.

use crate::model::ScanType;

/// Default first channel for a terrestrial sweep.
pub const DEFAULT_CHANNEL_MIN: u32 = 21;
/// Default last channel for a terrestrial sweep.
pub const DEFAULT_CHANNEL_MAX: u32 = 48;

/// Highest channel number any raster defines.
pub const CHANNEL_MAX: u32 = 69;

/// Centre frequency in Hz for `channel`, or None outside the raster.
pub fn channel_to_frequency(channel: u32, scan_type: ScanType) -> Option<u32> {
    match scan_type {
        // European UHF raster: 8 MHz spacing, channel 21 at 474 MHz.
        ScanType::Terrestrial => {
            if (21..=69).contains(&channel) {
                Some(306_000_000 + channel * 8_000_000)
            } else {
                None
            }
        }
        // North American 6 MHz raster.
        ScanType::Atsc => match channel {
            2..=4 => Some(57_000_000 + (channel - 2) * 6_000_000),
            5..=6 => Some(79_000_000 + (channel - 5) * 6_000_000),
            7..=13 => Some(177_000_000 + (channel - 7) * 6_000_000),
            14..=69 => Some(473_000_000 + (channel - 14) * 6_000_000),
            _ => None,
        },
        _ => None,
    }
}

//! GSM band definitions and ARFCN ↔ frequency mapping.
//!
//! Calibration listens to the base station, so all frequencies here are
//! *downlink* carriers. Channel numbering follows 3GPP TS 45.005: 200 kHz
//! raster, with E-GSM and GSM-R reusing the wrapped numbers above 954.

use std::fmt;
use std::str::FromStr;

/// Channel spacing of all GSM bands.
pub const CHANNEL_SPACING: f64 = 200e3;

/// A GSM frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Gsm850,
    GsmR,
    Gsm900,
    Egsm,
    Dcs1800,
}

impl Band {
    /// All bands, in scan-priority order.
    pub const ALL: [Band; 5] = [
        Band::Gsm850,
        Band::GsmR,
        Band::Gsm900,
        Band::Egsm,
        Band::Dcs1800,
    ];

    /// Downlink carrier frequency for a channel number in this band.
    pub fn arfcn_to_freq(self, arfcn: u16) -> Option<f64> {
        let chan = arfcn as f64;
        match self {
            Band::Gsm850 if (128..=251).contains(&arfcn) => {
                Some(869.2e6 + CHANNEL_SPACING * (chan - 128.0))
            }
            Band::Gsm900 if (1..=124).contains(&arfcn) => Some(935.0e6 + CHANNEL_SPACING * chan),
            Band::Egsm if (1..=124).contains(&arfcn) => Some(935.0e6 + CHANNEL_SPACING * chan),
            Band::Egsm if (975..=1023).contains(&arfcn) => {
                Some(935.0e6 + CHANNEL_SPACING * (chan - 1024.0))
            }
            Band::GsmR if (955..=1023).contains(&arfcn) => {
                Some(935.0e6 + CHANNEL_SPACING * (chan - 1024.0))
            }
            Band::Dcs1800 if (512..=885).contains(&arfcn) => {
                Some(1805.2e6 + CHANNEL_SPACING * (chan - 512.0))
            }
            _ => None,
        }
    }

    /// Channel number of a downlink frequency, if it falls on this band's
    /// raster (within half a channel).
    pub fn freq_to_arfcn(self, freq_hz: f64) -> Option<u16> {
        for arfcn in self.arfcns() {
            // Unwrap is fine: arfcns() only yields valid channels.
            let carrier = self.arfcn_to_freq(arfcn).unwrap();
            if (freq_hz - carrier).abs() < CHANNEL_SPACING / 2.0 {
                return Some(arfcn);
            }
        }
        None
    }

    /// All channel numbers of this band, ascending in frequency.
    pub fn arfcns(self) -> Box<dyn Iterator<Item = u16>> {
        match self {
            Band::Gsm850 => Box::new(128..=251),
            Band::GsmR => Box::new(955..=1023),
            Band::Gsm900 => Box::new(1..=124),
            // E-GSM: wrapped channels 975..=1023 sit *below* 1..=124.
            Band::Egsm => Box::new((975..=1023).chain(1..=124)),
            Band::Dcs1800 => Box::new(512..=885),
        }
    }

    /// Find the band and channel of an arbitrary downlink frequency.
    pub fn containing(freq_hz: f64) -> Option<(Band, u16)> {
        Band::ALL
            .iter()
            .find_map(|&band| band.freq_to_arfcn(freq_hz).map(|arfcn| (band, arfcn)))
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::Gsm850 => "GSM850",
            Band::GsmR => "GSM-R",
            Band::Gsm900 => "GSM900",
            Band::Egsm => "EGSM",
            Band::Dcs1800 => "DCS",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GSM850" => Ok(Band::Gsm850),
            "GSM-R" | "GSMR" => Ok(Band::GsmR),
            "GSM900" => Ok(Band::Gsm900),
            "EGSM" => Ok(Band::Egsm),
            "DCS" | "DCS1800" => Ok(Band::Dcs1800),
            other => Err(format!(
                "bad band indicator ``{other}'' (GSM850, GSM-R, GSM900, EGSM, DCS)"
            )),
        }
    }
}

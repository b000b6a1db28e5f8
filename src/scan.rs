//! Band power scan: find the strongest carriers in a GSM band.
//!
//! Tunes every channel of the band, lets the pipeline settle, measures the
//! received power over one window, and reports the channels that stand out
//! of the noise. Confirming that a candidate actually carries a GSM
//! broadcast channel is the downstream analyzer's job.

use num_complex::Complex;
use tracing::{debug, info};

use crate::arfcn::Band;
use crate::error::Result;
use crate::exit;
use crate::source::SampleSource;

/// Samples per power measurement (~60 ms at the GSM rate).
pub const MEASURE_SAMPLES: usize = 16 * 1024;

/// One measured channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelPower {
    pub arfcn: u16,
    pub freq_hz: f64,
    pub power_dbfs: f32,
}

/// Mean power of a sample window, in dBFS.
pub fn mean_power_dbfs(samples: &[Complex<f32>]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let mean: f32 = samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32;
    10.0 * (mean + 1e-12).log10()
}

/// Arithmetic mean, and standard deviation if requested.
pub fn avg(data: &[f32], stddev: Option<&mut f64>) -> f64 {
    let len = data.len() as f64;
    let sum: f64 = data.iter().map(|&v| v as f64).sum();
    let sum_sq: f64 = data.iter().map(|&v| (v as f64) * (v as f64)).sum();
    let mean = sum / len;
    if let Some(stddev) = stddev {
        *stddev = (sum_sq / len - mean * mean).max(0.0).sqrt();
    }
    mean
}

/// Measure every channel of `band` through the running pipeline.
///
/// Returns one entry per channel in ascending frequency order, or
/// [`Cancelled`](crate::error::Error::Cancelled) if the user interrupts the
/// scan.
pub fn scan_band(source: &mut SampleSource, band: Band) -> Result<Vec<ChannelPower>> {
    let mut results = Vec::new();

    info!("scanning {band} ({} channels)", band.arfcns().count());

    for arfcn in band.arfcns() {
        if exit::exit_requested() {
            return Err(crate::error::Error::Cancelled);
        }

        // arfcns() only yields channels the band defines.
        let freq_hz = band.arfcn_to_freq(arfcn).unwrap();
        source.tune(freq_hz)?;
        // Drop anything captured at the previous frequency.
        source.flush();

        source.fill(MEASURE_SAMPLES)?;
        let power_dbfs = {
            let view = source.buffer().peek();
            mean_power_dbfs(&view[..MEASURE_SAMPLES.min(view.len())])
        };
        source.buffer().purge(MEASURE_SAMPLES);

        debug!("chan {arfcn} ({:.1} MHz): {power_dbfs:.1} dBFS", freq_hz / 1e6);
        results.push(ChannelPower {
            arfcn,
            freq_hz,
            power_dbfs,
        });
    }

    Ok(results)
}

/// Channels that stand at least one standard deviation above the band's
/// mean power, strongest first.
pub fn strongest(results: &[ChannelPower]) -> Vec<ChannelPower> {
    if results.is_empty() {
        return Vec::new();
    }

    let powers: Vec<f32> = results.iter().map(|c| c.power_dbfs).collect();
    let mut stddev = 0.0;
    let mean = avg(&powers, Some(&mut stddev));
    let threshold = (mean + stddev) as f32;

    let mut found: Vec<ChannelPower> = results
        .iter()
        .filter(|c| c.power_dbfs > threshold)
        .copied()
        .collect();
    found.sort_by(|a, b| b.power_dbfs.total_cmp(&a.power_dbfs));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_power_of_unit_tone() {
        let samples: Vec<Complex<f32>> = (0..1000)
            .map(|n| {
                let phase = 0.01 * n as f32;
                Complex::new(phase.cos(), phase.sin())
            })
            .collect();
        assert_relative_eq!(mean_power_dbfs(&samples), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_mean_power_of_silence() {
        let samples = vec![Complex::new(0.0f32, 0.0); 100];
        assert!(mean_power_dbfs(&samples) < -100.0);
    }

    #[test]
    fn test_avg_and_stddev() {
        let data = [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut stddev = 0.0;
        let mean = avg(&data, Some(&mut stddev));
        assert_relative_eq!(mean, 5.0);
        assert_relative_eq!(stddev, 2.0);
    }

    #[test]
    fn test_strongest_picks_outliers() {
        let mut results: Vec<ChannelPower> = (0..50)
            .map(|i| ChannelPower {
                arfcn: i,
                freq_hz: 935.2e6 + i as f64 * 200e3,
                power_dbfs: -90.0,
            })
            .collect();
        results[7].power_dbfs = -40.0;
        results[31].power_dbfs = -55.0;

        let found = strongest(&results);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].arfcn, 7);
        assert_eq!(found[1].arfcn, 31);
    }
}

//! ASCII spectrum view with peak detection.
//!
//! Renders a block of complex samples as a one-line coloured bar spectrum on
//! the terminal, followed by the strongest local peaks with their
//! frequencies. Levels are calibrated in dBFS against a full-scale complex
//! tone, so a unit-amplitude carrier reads 0 dBFS regardless of FFT length.

use num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Blackman-Harris 4-term window coefficients.
const A0: f64 = 0.35875;
const A1: f64 = 0.48829;
const A2: f64 = 0.14128;
const A3: f64 = 0.01168;

/// Display floor and ceiling in dBFS.
const FLOOR_DB: f32 = -115.0;
const CEIL_DB: f32 = -45.0;

/// A local maximum in the power spectrum.
#[derive(Debug, Clone, Copy)]
pub struct Peak {
    /// Frequency relative to the centre, in Hz.
    pub freq_hz: f32,
    /// Level in dBFS.
    pub level_dbfs: f32,
}

/// Windowed, fft-shifted power spectrum in dBFS.
///
/// Bin 0 of the result is −Fs/2; bin `len/2` is the centre frequency.
pub fn power_spectrum_dbfs(data: &[Complex<f32>]) -> Vec<f32> {
    let len = data.len();
    assert!(len > 1, "spectrum needs at least two samples");

    let mut buffer: Vec<Complex<f32>> = Vec::with_capacity(len);
    for (i, sample) in data.iter().enumerate() {
        // f64 keeps the window accurate for large transforms.
        let ratio = i as f64 / (len - 1) as f64;
        let window = A0 - A1 * (2.0 * PI * ratio).cos() + A2 * (4.0 * PI * ratio).cos()
            - A3 * (6.0 * PI * ratio).cos();
        buffer.push(*sample * window as f32);
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(len);
    fft.process(&mut buffer);

    // Full scale: unit tone times the window's coherent gain.
    let ref_amplitude = len as f32 * A0 as f32;
    let db_offset = 20.0 * ref_amplitude.log10();

    let mut mag_db = vec![0.0f32; len];
    for (i, value) in mag_db.iter_mut().enumerate() {
        let idx = (i + len / 2) % len;
        let power = buffer[idx].norm_sqr();
        *value = 10.0 * (power + 1e-12).log10() - db_offset;
    }
    mag_db
}

/// Local maxima of the shifted spectrum, strongest first.
///
/// Peaks more than 40 dB below the strongest one are ignored.
pub fn find_peaks(mag_db: &[f32], sample_rate: f32, max_peaks: usize) -> Vec<Peak> {
    let len = mag_db.len();
    let max_db = mag_db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let mut peaks: Vec<Peak> = Vec::new();
    for i in 1..len.saturating_sub(1) {
        if mag_db[i] > mag_db[i - 1]
            && mag_db[i] > mag_db[i + 1]
            && mag_db[i] > max_db - 40.0
            && mag_db[i] > -120.0
        {
            peaks.push(Peak {
                freq_hz: (i as f32 - len as f32 / 2.0) * (sample_rate / len as f32),
                level_dbfs: mag_db[i],
            });
        }
    }

    peaks.sort_by(|a, b| b.level_dbfs.total_cmp(&a.level_dbfs));
    peaks.truncate(max_peaks);
    peaks
}

/// Draw the spectrum of `data` as a coloured ASCII bar chart of the given
/// terminal width, then list the top six peaks.
pub fn draw_ascii_fft(data: &[Complex<f32>], width: usize, sample_rate: f32) {
    let mag_db = power_spectrum_dbfs(data);
    let len = mag_db.len();
    let max_db = mag_db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let plot_width = width.saturating_sub(20).max(10);

    // Max-hold reduction to the display width.
    let mut bins = vec![f32::NEG_INFINITY; plot_width];
    for (w, bin) in bins.iter_mut().enumerate() {
        let start = w * len / plot_width;
        let end = ((w + 1) * len / plot_width).min(len);
        for &db in &mag_db[start..end] {
            if db > *bin {
                *bin = db;
            }
        }
    }

    const BLOCKS: [&str; 9] = [" ", " ", "▂", "▃", "▄", "▅", "▆", "▇", "█"];
    let range = CEIL_DB - FLOOR_DB;

    print!("\x1b[36m[-BW/2] \x1b[0m");
    for &value in &bins {
        let norm = ((value - FLOOR_DB) / range).clamp(0.0, 1.0);
        let colour = if norm < 0.20 {
            "\x1b[90m" // noise floor
        } else if norm < 0.40 {
            "\x1b[34m"
        } else if norm < 0.60 {
            "\x1b[36m"
        } else if norm < 0.80 {
            "\x1b[32m"
        } else {
            "\x1b[91m" // peak
        };
        let idx = (norm * (BLOCKS.len() - 1) as f32) as usize;
        print!("{colour}{}", BLOCKS[idx]);
    }
    println!("\x1b[0m \x1b[36m[+BW/2]\x1b[0m Max: {max_db:.1}dBFS");

    if sample_rate > 0.0 {
        println!("   Peak Detection (Top 6):");
        for (rank, peak) in find_peaks(&mag_db, sample_rate, 6).iter().enumerate() {
            println!(
                "    #{}: {:9.1} Hz  ({:6.1} dBFS)",
                rank + 1,
                peak.freq_hz,
                peak.level_dbfs
            );
        }
    }
}

/// Human-readable frequency, matching the scan output format.
pub fn format_freq(freq_hz: f64) -> String {
    let abs = freq_hz.abs();
    if abs >= 1e6 {
        format!("{:.1}MHz", freq_hz / 1e6)
    } else if abs >= 1e3 {
        format!("{:.1}kHz", freq_hz / 1e3)
    } else {
        format!("{freq_hz:.0}Hz")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(freq: f64, sample_rate: f64, amplitude: f64, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * freq * n as f64 / sample_rate;
                Complex::new(
                    (amplitude * phase.cos()) as f32,
                    (amplitude * phase.sin()) as f32,
                )
            })
            .collect()
    }

    #[test]
    fn test_full_scale_tone_reads_zero_dbfs() {
        let fs = 250_000.0;
        let len = 4096;
        // Bin-centred tone, so all energy lands in one bin.
        let freq = 32.0 * fs / len as f64;
        let data = tone(freq, fs, 1.0, len);

        let mag = power_spectrum_dbfs(&data);
        let peak = mag.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert_relative_eq!(peak, 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_peak_frequency_and_level() {
        let fs = 250_000.0;
        let len = 8192;
        let freq = 40_000.0;
        let data = tone(freq, fs, 0.5, len);

        let mag = power_spectrum_dbfs(&data);
        let peaks = find_peaks(&mag, fs as f32, 6);
        assert!(!peaks.is_empty());

        let bin_width = fs as f32 / len as f32;
        assert!((peaks[0].freq_hz - freq as f32).abs() <= bin_width);
        // 0.5 amplitude is -6 dBFS; allow for scalloping loss.
        assert!(peaks[0].level_dbfs < -4.0 && peaks[0].level_dbfs > -9.0);
    }

    #[test]
    fn test_negative_frequency_resolved() {
        let fs = 250_000.0;
        let len = 8192;
        let data = tone(-60_000.0, fs, 1.0, len);

        let mag = power_spectrum_dbfs(&data);
        let peaks = find_peaks(&mag, fs as f32, 1);
        assert!((peaks[0].freq_hz + 60_000.0).abs() <= fs as f32 / len as f32);
    }

    #[test]
    fn test_format_freq() {
        assert_eq!(format_freq(947_600_000.0), "947.6MHz");
        assert_eq!(format_freq(-62_000.0), "-62.0kHz");
        assert_eq!(format_freq(150.0), "150Hz");
    }
}

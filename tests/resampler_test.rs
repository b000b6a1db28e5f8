//! End-to-end scenarios for the two-stage resampler.

use gsmcal::Resampler;
use gsmcal::dsp::spectrum::{find_peaks, power_spectrum_dbfs};
use num_complex::Complex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

const FS_IN: f64 = 2_500_000.0;
const FS_OUT: f64 = 13_000_000.0 / 48.0;

fn process_all(resampler: &mut Resampler, input: &[Complex<f32>]) -> Vec<Complex<f32>> {
    let mut output = vec![Complex::new(0.0f32, 0.0); Resampler::output_bound(input.len())];
    let produced = resampler.process(input, &mut output);
    output.truncate(produced);
    output
}

/// Complex tone with double-precision phase accumulation.
fn tone(freq: f64, len: usize) -> Vec<Complex<f32>> {
    let increment = 2.0 * PI * freq / FS_IN;
    (0..len)
        .map(|n| {
            let phase = n as f64 * increment;
            Complex::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect()
}

fn uniform_noise(seed: u64, len: usize) -> Vec<Complex<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|_| Complex::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect()
}

#[test]
fn scenario_reset_determinism() {
    let input = uniform_noise(1, 1_200_000);

    let mut whole = Resampler::new();
    let out_whole = process_all(&mut whole, &input);

    let mut split = Resampler::new();
    let mut out_split = process_all(&mut split, &input[..600_000]);
    out_split.extend(process_all(&mut split, &input[600_000..]));

    assert_eq!(out_whole.len(), 130_000);
    // Chunking must not change a single bit of the output.
    assert_eq!(out_whole, out_split);
}

#[test]
fn determinism_under_random_chunking() {
    let input = uniform_noise(7, 100_000);

    let mut whole = Resampler::new();
    let out_whole = process_all(&mut whole, &input);

    let mut chunked = Resampler::new();
    let mut out_chunked = Vec::new();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut offset = 0;
    while offset < input.len() {
        let n = rng.gen_range(1..=4096).min(input.len() - offset);
        out_chunked.extend(process_all(&mut chunked, &input[offset..offset + n]));
        offset += n;
    }

    assert_eq!(out_whole, out_chunked);
}

#[test]
fn scenario_dc_response() {
    let input = vec![Complex::new(1.0f32, 0.0); 10_000];
    let mut resampler = Resampler::new();
    let output = process_all(&mut resampler, &input);

    // Prime the filters, then every remaining sample must sit on the input.
    for (i, y) in output.iter().enumerate().skip(120) {
        let err = (*y - Complex::new(1.0, 0.0)).norm();
        assert!(err < 1e-3, "output {i} deviates by {err}");
    }
}

#[test]
fn scenario_tone_passband() {
    let input = tone(67_000.0, 2_500_000);
    let mut resampler = Resampler::new();
    let output = process_all(&mut resampler, &input);

    let tail = &output[output.len() - 16_384..];

    // Peak lands on the tone frequency.
    let spectrum = power_spectrum_dbfs(tail);
    let peaks = find_peaks(&spectrum, FS_OUT as f32, 1);
    assert!(
        (peaks[0].freq_hz - 67_000.0).abs() < 50.0,
        "peak at {} Hz",
        peaks[0].freq_hz
    );

    // A passband tone keeps its amplitude within 1 dB. The mean modulus of
    // a steady complex tone is its amplitude, no window correction needed.
    let mean_modulus: f32 = tail.iter().map(|y| y.norm()).sum::<f32>() / tail.len() as f32;
    let gain_db = 20.0 * mean_modulus.log10();
    assert!(gain_db.abs() < 1.0, "passband gain {gain_db} dB");
}

#[test]
fn scenario_tone_stopband() {
    let input = tone(300_000.0, 2_500_000);
    let mut resampler = Resampler::new();
    let output = process_all(&mut resampler, &input);

    let tail = &output[output.len() - 16_384..];
    let spectrum = power_spectrum_dbfs(tail);
    let peak = spectrum.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    assert!(peak <= -60.0, "stopband residue at {peak} dBFS");
}

#[test]
fn long_run_rate_is_thirteen_over_120() {
    let input = uniform_noise(3, 2_400_000);
    let mut resampler = Resampler::new();
    let output = process_all(&mut resampler, &input);

    let expected = input.len() as f64 * 13.0 / 120.0;
    let error = (output.len() as f64 - expected).abs();
    assert!(
        error <= input.len() as f64 / 1e6,
        "{} outputs for {} inputs",
        output.len(),
        input.len()
    );
}

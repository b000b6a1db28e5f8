//! Offline DSP benchmark: the whole pipeline against a synthetic signal.
//!
//! Renders five seconds of a six-tone test signal at the native rate, feeds
//! it through the full pipeline — simulated front-end, worker thread,
//! resampler, ring buffer, `fill` — and reports throughput plus input and
//! output spectra. The two out-of-band tones at ±300 kHz must be gone from
//! the output; the four in-band tones must survive at their amplitudes.

use std::f64::consts::PI;
use std::time::Instant;

use num_complex::Complex;
use tracing::info;

use crate::device::sim::SimDevice;
use crate::dsp::spectrum::draw_ascii_fft;
use crate::error::{Error, Result};
use crate::source::{GSM_SAMPLE_RATE, NATIVE_SAMPLE_RATE, SampleSource};

/// Benchmark duration in seconds of signal time.
const DURATION: f64 = 5.0;

/// Samples per injected frame, sized like a USB transfer.
const CHUNK_SIZE: usize = 65_536;

/// Terminal width for the spectrum views.
const PLOT_WIDTH: usize = 120;

/// Test tones: (frequency Hz, amplitude). The ±300 kHz pair sits outside
/// the ±135 kHz output bandwidth and must be filtered out.
const TONES: [(f64, f64); 6] = [
    (300_000.0, 0.79),
    (67_000.0, 0.5),
    (47_000.0, 0.4),
    (-40_000.0, 0.31),
    (-62_000.0, 0.25),
    (-300_000.0, 0.2),
];

/// Run the benchmark and print the report to stdout.
pub fn run() -> Result<()> {
    let fs_in = NATIVE_SAMPLE_RATE as f64;
    let num_samples = (fs_in * DURATION) as usize;

    println!("--------------------------------------------------------");
    println!("gsmcal DSP benchmark (2.5 MSPS -> 270.833 kSPS)");
    println!("--------------------------------------------------------");
    println!("Generating {DURATION:.1} seconds of test signal ({num_samples} samples)...");
    for (freq, amplitude) in TONES {
        let db = 20.0 * amplitude.log10();
        println!("  tone {:>9.0} Hz at {db:5.1} dBFS", freq);
    }

    let input = render_tones(num_samples, fs_in);

    println!("\nInput spectrum at {:.0} S/s:", fs_in);
    draw_ascii_fft(&input, PLOT_WIDTH, fs_in as f32);

    println!("\nRunning DSP pipeline...");

    let sim = SimDevice::new();
    for chunk in input.chunks(CHUNK_SIZE) {
        sim.push_samples(chunk);
    }
    sim.close();

    let mut source = SampleSource::open(Box::new(sim), 10.0)?;
    let mut output: Vec<Complex<f32>> =
        Vec::with_capacity((num_samples as f64 * GSM_SAMPLE_RATE / fs_in * 1.1) as usize);
    let mut window = vec![Complex::new(0.0f32, 0.0); CHUNK_SIZE];
    let mut overruns_total = 0u64;

    let begin = Instant::now();
    source.start()?;
    while source.is_streaming() {
        match source.fill(1) {
            Ok(overruns) => {
                overruns_total += overruns;
                let n = source.buffer().read(&mut window);
                output.extend_from_slice(&window[..n]);
            }
            Err(Error::Cancelled) => break,
            Err(e) => return Err(e),
        }
    }
    // Anything published between the last fill and the stream end.
    loop {
        let n = source.buffer().read(&mut window);
        if n == 0 {
            break;
        }
        output.extend_from_slice(&window[..n]);
    }
    let elapsed = begin.elapsed().as_secs_f64();

    println!("--------------------------------------------------------");
    println!("Processed {num_samples} samples in {elapsed:.4} seconds");
    println!("Speedup:    {:.2}x realtime", DURATION / elapsed);
    println!("Throughput: {:.2} MSPS", num_samples as f64 / 1e6 / elapsed);
    if overruns_total > 0 {
        println!("Overruns:   {overruns_total} samples dropped");
    }
    println!("--------------------------------------------------------");

    if output.is_empty() {
        println!("\nError: no output samples collected!");
        return Ok(());
    }

    info!(
        "collected {} output samples ({:.4} of input)",
        output.len(),
        output.len() as f64 / num_samples as f64
    );
    println!(
        "\nOutput spectrum, {} samples at {GSM_SAMPLE_RATE:.0} S/s:",
        output.len()
    );
    draw_ascii_fft(&output, PLOT_WIDTH, GSM_SAMPLE_RATE as f32);

    Ok(())
}

/// Multi-tone test signal with double-precision phase accumulation — f32
/// phase would decohere over 12.5 M samples and smear the spectrum.
fn render_tones(num_samples: usize, fs_in: f64) -> Vec<Complex<f32>> {
    let increments: Vec<(f64, f64)> = TONES
        .iter()
        .map(|&(freq, amplitude)| (2.0 * PI * freq / fs_in, amplitude))
        .collect();

    (0..num_samples)
        .map(|n| {
            let mut re = 0.0f64;
            let mut im = 0.0f64;
            for &(increment, amplitude) in &increments {
                let phase = n as f64 * increment;
                re += amplitude * phase.cos();
                im += amplitude * phase.sin();
            }
            Complex::new(re as f32, im as f32)
        })
        .collect()
}

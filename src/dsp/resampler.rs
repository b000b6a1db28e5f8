//! Two-stage rational resampler, 2.5 MS/s → 270.833 kS/s.
//!
//! The conversion to the GSM symbol rate (13 MHz / 48) is factored into two
//! fixed FIR stages:
//!
//! ```text
//! 2,500,000 Hz ─▶ [÷5, 61-tap lowpass] ─▶ 500,000 Hz ─▶ [×13/24 polyphase] ─▶ 270,833.333 Hz
//! ```
//!
//! Stage 2 decomposes a 729-tap prototype into 13 pre-reversed branches of
//! 57 taps, so each output sample costs one 57-tap dot product instead of a
//! convolution over the zero-stuffed stream.
//!
//! Both stages keep their history in a double-length buffer and write every
//! sample to two slots, `[head]` and `[head + taps]`. The window starting at
//! `head` is therefore always contiguous and the inner loops are straight
//! dot products with no modulo arithmetic.
//!
//! # Example
//!
//! ```
//! use gsmcal::dsp::resampler::Resampler;
//! use num_complex::Complex;
//!
//! let mut resampler = Resampler::new();
//! let input = vec![Complex::new(1.0f32, 0.0); 1200];
//! let mut output = vec![Complex::new(0.0f32, 0.0); Resampler::output_bound(1200)];
//! let produced = resampler.process(&input, &mut output);
//! assert_eq!(produced, 130); // 1200 · 13 / 120
//! ```

use num_complex::Complex;

use super::coeffs::{
    S1_COEFFS, S1_DECIMATION, S1_TAPS, S2_COEFFS_RAW, S2_DECIM, S2_INTERP, S2_TAPS_PER_PHASE,
    S2_TAPS_TOTAL,
};

/// Two-stage decimating/polyphase resampler with persistent filter state.
///
/// The struct is 64-byte aligned so the history buffers and coefficient
/// banks sit on cache-line boundaries for SIMD-friendly dot products.
#[derive(Clone)]
#[repr(align(64))]
pub struct Resampler {
    /// Stage 1 coefficients, reversed for a forward-scan dot product.
    s1_coeffs_rev: [f32; S1_TAPS],
    /// Stage 1 history, each sample written at `[head]` and `[head + 61]`.
    s1_history: [Complex<f32>; 2 * S1_TAPS],
    s1_head: usize,
    /// Decimation counter, 0..5.
    s1_index: usize,

    /// Polyphase branches `[phase][tap]`, coefficients pre-reversed.
    s2_poly: [[f32; S2_TAPS_PER_PHASE]; S2_INTERP],
    /// Stage 2 history, same double-write layout as stage 1.
    s2_history: [Complex<f32>; 2 * S2_TAPS_PER_PHASE],
    s2_head: usize,
    /// Phase accumulator; within `0..13` after every stage 2 input.
    s2_phase: usize,
}

impl Resampler {
    /// Build a resampler with zeroed state and precomputed filter banks.
    pub fn new() -> Self {
        let mut s1_coeffs_rev = [0.0f32; S1_TAPS];
        for (i, c) in s1_coeffs_rev.iter_mut().enumerate() {
            *c = S1_COEFFS[S1_TAPS - 1 - i];
        }

        // Decompose the prototype into branches: branch p takes every 13th
        // tap starting at p, stored reversed; the tail of the last branches
        // pads with zeros (13 · 57 = 741 > 729).
        let mut s2_poly = [[0.0f32; S2_TAPS_PER_PHASE]; S2_INTERP];
        for (phase, branch) in s2_poly.iter_mut().enumerate() {
            for tap in 0..S2_TAPS_PER_PHASE {
                let raw = phase + tap * S2_INTERP;
                if raw < S2_TAPS_TOTAL {
                    branch[S2_TAPS_PER_PHASE - 1 - tap] = S2_COEFFS_RAW[raw];
                }
            }
        }

        Self {
            s1_coeffs_rev,
            s1_history: [Complex::new(0.0, 0.0); 2 * S1_TAPS],
            s1_head: 0,
            s1_index: 0,
            s2_poly,
            s2_history: [Complex::new(0.0, 0.0); 2 * S2_TAPS_PER_PHASE],
            s2_head: 0,
            s2_phase: 0,
        }
    }

    /// Zero all history and phase state.
    ///
    /// Call after retuning so filter transients from the previous carrier do
    /// not contaminate the new one.
    pub fn reset(&mut self) {
        self.s1_history = [Complex::new(0.0, 0.0); 2 * S1_TAPS];
        self.s1_head = 0;
        self.s1_index = 0;
        self.s2_history = [Complex::new(0.0, 0.0); 2 * S2_TAPS_PER_PHASE];
        self.s2_head = 0;
        self.s2_phase = 0;
    }

    /// Output buffer size that is always sufficient for `input_len` inputs.
    ///
    /// The long-run rate is exactly 13/120; the slack covers the phase of
    /// the accumulators at the chunk boundary.
    pub fn output_bound(input_len: usize) -> usize {
        (input_len * S2_INTERP).div_ceil(S1_DECIMATION * S2_DECIM) + 4
    }

    /// Run `input` through both stages, writing into `output`.
    ///
    /// Returns the number of samples produced. If `output` fills before the
    /// input is exhausted the remaining input is dropped; size `output` with
    /// [`Resampler::output_bound`] to avoid loss.
    pub fn process(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) -> usize {
        let mut produced = 0;

        for &sample in input {
            self.push_stage1(sample, output, &mut produced);
            if produced >= output.len() {
                break;
            }
        }

        produced
    }

    /// Stage 1: ÷5 decimator. Every fifth input convolves the 61-tap window
    /// and feeds stage 2.
    #[inline]
    fn push_stage1(
        &mut self,
        sample: Complex<f32>,
        output: &mut [Complex<f32>],
        produced: &mut usize,
    ) {
        self.s1_history[self.s1_head] = sample;
        self.s1_history[self.s1_head + S1_TAPS] = sample;

        self.s1_head += 1;
        if self.s1_head >= S1_TAPS {
            self.s1_head = 0;
        }

        self.s1_index += 1;
        if self.s1_index < S1_DECIMATION {
            return;
        }
        self.s1_index = 0;

        let mut acc = Complex::new(0.0f32, 0.0f32);
        for k in 0..S1_TAPS {
            acc += self.s1_history[self.s1_head + k] * self.s1_coeffs_rev[k];
        }

        self.push_stage2(acc, output, produced);
    }

    /// Stage 2: ×13/24 polyphase. Each input yields zero, one, or two
    /// outputs; the phase advances by 24 per output and retreats by 13 per
    /// input, so it stays within `0..13` between inputs.
    #[inline]
    fn push_stage2(
        &mut self,
        sample: Complex<f32>,
        output: &mut [Complex<f32>],
        produced: &mut usize,
    ) {
        self.s2_history[self.s2_head] = sample;
        self.s2_history[self.s2_head + S2_TAPS_PER_PHASE] = sample;

        self.s2_head += 1;
        if self.s2_head >= S2_TAPS_PER_PHASE {
            self.s2_head = 0;
        }

        while self.s2_phase < S2_INTERP {
            if *produced >= output.len() {
                // Full output buffer: the pending samples are lost, which
                // the caller accounts for as an overrun.
                return;
            }

            let branch = &self.s2_poly[self.s2_phase];
            let mut acc = Complex::new(0.0f32, 0.0f32);
            for k in 0..S2_TAPS_PER_PHASE {
                acc += self.s2_history[self.s2_head + k] * branch[k];
            }

            output[*produced] = acc;
            *produced += 1;

            self.s2_phase += S2_DECIM;
        }

        self.s2_phase -= S2_INTERP;
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

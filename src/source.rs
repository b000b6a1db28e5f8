//! Sample source pipeline: radio front-end → resampler → ring buffer.
//!
//! ```text
//!  ┌──────────┐    ┌─────────────────┐    ┌───────────────┐    ┌────────────┐
//!  │  AD936x  │───▶│  worker thread  │───▶│   Resampler   │───▶│ RingBuffer │
//!  │ 2.5 MS/s │    │ (refill + norm) │    │ 270.833 kS/s  │    │            │
//!  └──────────┘    └─────────────────┘    └───────────────┘    └─────┬──────┘
//!                                                                    ▼
//!                                                             consumer thread
//!                                                             fill() / read()
//! ```
//!
//! Two threads share the pipeline. The *worker* runs a tight
//! refill → normalise → resample → publish loop and never blocks on the
//! consumer: publishing uses a try-lock, and anything it cannot deliver is
//! dropped and counted in the overrun counter. The *consumer* blocks in
//! [`SampleSource::fill`] on a condition variable, re-checking the exit flag
//! every 100 ms so a Ctrl-C interrupts promptly.
//!
//! Overruns are telemetry, not errors: a non-zero count returned by `fill`
//! tells the analyzer the stream is not timing-continuous across the window
//! and accumulated phase must be discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use num_complex::Complex;
use tracing::{debug, info, warn};

use crate::device::{RxDevice, RxStream};
use crate::dsp::resampler::Resampler;
use crate::error::{Error, Result};
use crate::exit;
use crate::ring::RingBuffer;

/// Native front-end rate fed to the resampler.
pub const NATIVE_SAMPLE_RATE: i64 = 2_500_000;

/// Delivered sample rate: the GSM symbol rate, 13 MHz / 48.
pub const GSM_SAMPLE_RATE: f64 = 13_000_000.0 / 48.0;

/// Ring capacity in samples (≈ 1 s at the GSM rate).
const RING_SAMPLES: usize = 256 * 1024;

/// Samples per front-end transfer.
const TRANSFER_SAMPLES: usize = 128 * 1024;

/// Normalisation batch size inside the worker.
const BATCH_SAMPLES: usize = 32 * 1024;

/// Consumer wait quantum; bounds cancellation latency.
const FILL_POLL: Duration = Duration::from_millis(100);

/// 12-bit ADC full scale.
const ADC_SCALE: f32 = 1.0 / 2048.0;

/// Producer/consumer handoff shared with the worker thread.
struct Handoff {
    /// Guards the ring handoff; the producer only ever try-locks it.
    gate: Mutex<()>,
    data_ready: Condvar,
    streaming: AtomicBool,
    overruns: AtomicU64,
}

/// Owns the front-end, the resampler, the ring buffer, and the worker
/// thread. Dropping the source stops streaming and joins the worker.
pub struct SampleSource {
    device: Box<dyn RxDevice>,
    ring: Arc<RingBuffer<Complex<f32>>>,
    resampler: Arc<Mutex<Resampler>>,
    handoff: Arc<Handoff>,
    worker: Option<JoinHandle<()>>,
    center_freq: f64,
    gain_db: f64,
}

impl SampleSource {
    /// Open the pipeline on a connected front-end: program the native
    /// sampling rate and manual gain, and allocate the sample ring.
    pub fn open(mut device: Box<dyn RxDevice>, gain_db: f64) -> Result<Self> {
        device.set_sample_rate(NATIVE_SAMPLE_RATE)?;
        device.set_gain(gain_db)?;

        let ring = Arc::new(RingBuffer::new(RING_SAMPLES)?);
        info!(
            "pipeline open: {} S/s in, {:.3} S/s out, ring of {} samples",
            NATIVE_SAMPLE_RATE,
            GSM_SAMPLE_RATE,
            ring.buf_len()
        );

        Ok(Self {
            device,
            ring,
            resampler: Arc::new(Mutex::new(Resampler::new())),
            handoff: Arc::new(Handoff {
                gate: Mutex::new(()),
                data_ready: Condvar::new(),
                streaming: AtomicBool::new(false),
                overruns: AtomicU64::new(0),
            }),
            worker: None,
            center_freq: 0.0,
            gain_db,
        })
    }

    /// Delivered sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        GSM_SAMPLE_RATE
    }

    /// Currently tuned centre frequency in Hz.
    pub fn center_freq(&self) -> f64 {
        self.center_freq
    }

    /// Currently programmed hardware gain in dB.
    pub fn gain(&self) -> f64 {
        self.gain_db
    }

    /// The output sample ring, for direct `read`/`peek`/`purge`.
    pub fn buffer(&self) -> &RingBuffer<Complex<f32>> {
        &self.ring
    }

    /// True while the worker thread is delivering samples.
    pub fn is_streaming(&self) -> bool {
        self.handoff.streaming.load(Ordering::Acquire)
    }

    /// Program the local oscillator and clear the resampler state, so
    /// filter transients from the previous carrier do not contaminate the
    /// new one.
    pub fn tune(&mut self, freq_hz: f64) -> Result<()> {
        self.device.set_lo_frequency(freq_hz as i64)?;
        self.center_freq = freq_hz;
        self.resampler.lock().unwrap().reset();
        debug!("tuned to {:.0} Hz", freq_hz);
        Ok(())
    }

    /// Program the hardware gain. Idempotent.
    pub fn set_gain(&mut self, gain_db: f64) -> Result<()> {
        self.device.set_gain(gain_db)?;
        self.gain_db = gain_db;
        Ok(())
    }

    /// Allocate the front-end transfer buffer and spawn the worker thread.
    /// A no-op when already streaming.
    pub fn start(&mut self) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }

        self.resampler.lock().unwrap().reset();
        self.handoff.overruns.store(0, Ordering::Relaxed);

        let stream = self.device.start_rx(TRANSFER_SAMPLES)?;
        self.handoff.streaming.store(true, Ordering::Release);

        let ring = Arc::clone(&self.ring);
        let resampler = Arc::clone(&self.resampler);
        let handoff = Arc::clone(&self.handoff);
        let worker = std::thread::Builder::new()
            .name("gsmcal-rx".into())
            .spawn(move || worker_loop(stream, ring, resampler, handoff))
            .map_err(|e| {
                self.handoff.streaming.store(false, Ordering::Release);
                Error::resource(format!("spawning receive worker: {e}"))
            })?;
        self.worker = Some(worker);

        debug!("streaming started");
        Ok(())
    }

    /// Stop streaming: clear the flag, join the worker, wake any blocked
    /// consumer. Idempotent.
    pub fn stop(&mut self) {
        if self.handoff.streaming.swap(false, Ordering::AcqRel) {
            debug!("streaming stopping");
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.handoff.data_ready.notify_all();
    }

    /// Block until at least `num_samples` samples are buffered.
    ///
    /// Starts streaming if it is not already running. Returns the overrun
    /// count accumulated since the last `fill` (atomically reset to zero),
    /// or [`Error::Cancelled`] if streaming ended or process exit was
    /// requested while waiting.
    pub fn fill(&mut self, num_samples: usize) -> Result<u64> {
        if !self.is_streaming() {
            self.start()?;
        }

        let mut gate = self.handoff.gate.lock().unwrap();
        loop {
            if exit::exit_requested() {
                return Err(Error::Cancelled);
            }
            if self.ring.data_available() >= num_samples || !self.is_streaming() {
                break;
            }
            let (guard, _) = self
                .handoff
                .data_ready
                .wait_timeout(gate, FILL_POLL)
                .unwrap();
            gate = guard;
        }
        drop(gate);

        if !self.is_streaming() {
            return Err(Error::Cancelled);
        }
        Ok(self.handoff.overruns.swap(0, Ordering::AcqRel))
    }

    /// Discard all buffered samples and zero the overrun counter.
    pub fn flush(&mut self) {
        self.ring.flush();
        self.handoff.overruns.store(0, Ordering::Relaxed);
    }
}

impl Drop for SampleSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer loop, run on the worker thread.
///
/// The only blocking point is the driver refill; everything else must keep
/// the thread real-time so the front-end's DMA queues stay primed.
fn worker_loop(
    mut stream: Box<dyn RxStream>,
    ring: Arc<RingBuffer<Complex<f32>>>,
    resampler: Arc<Mutex<Resampler>>,
    handoff: Arc<Handoff>,
) {
    let mut raw_i: Vec<i16> = Vec::new();
    let mut raw_q: Vec<i16> = Vec::new();
    let mut batch: Vec<Complex<f32>> = Vec::with_capacity(BATCH_SAMPLES);
    let mut scratch = vec![Complex::new(0.0f32, 0.0); Resampler::output_bound(BATCH_SAMPLES)];

    debug!("receive worker running");

    while handoff.streaming.load(Ordering::Acquire) {
        let count = match stream.refill(&mut raw_i, &mut raw_q) {
            Ok(0) => {
                debug!("receive stream ended");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("receive stream failed: {e}");
                break;
            }
        };

        let mut offset = 0;
        while offset < count {
            let n = (count - offset).min(BATCH_SAMPLES);
            batch.clear();
            batch.extend(
                raw_i[offset..offset + n]
                    .iter()
                    .zip(&raw_q[offset..offset + n])
                    .map(|(&i, &q)| Complex::new(i as f32 * ADC_SCALE, q as f32 * ADC_SCALE)),
            );
            offset += n;

            let produced = resampler.lock().unwrap().process(&batch, &mut scratch);
            if produced > 0 {
                publish(&ring, &handoff, &scratch[..produced]);
            }
        }
    }

    // Consumers treat end of streaming as cancellation; wake them.
    handoff.streaming.store(false, Ordering::Release);
    handoff.data_ready.notify_all();
    debug!("receive worker exited");
}

/// Hand a block of output samples to the consumer side without blocking.
///
/// If the consumer currently holds the gate, the whole block is dropped and
/// counted; waiting here would stall the front-end's transfer queue, which
/// is the one loss that cannot be recovered in software.
fn publish(ring: &RingBuffer<Complex<f32>>, handoff: &Handoff, samples: &[Complex<f32>]) {
    match handoff.gate.try_lock() {
        Ok(gate) => {
            let written = ring.write(samples);
            if written < samples.len() {
                handoff
                    .overruns
                    .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
            }
            drop(gate);
            handoff.data_ready.notify_one();
        }
        Err(_) => {
            handoff
                .overruns
                .fetch_add(samples.len() as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::SimDevice;
    use std::time::Instant;

    #[test]
    fn test_open_and_idempotent_stop() {
        let sim = SimDevice::new();
        sim.close();
        let mut src = SampleSource::open(Box::new(sim), 40.0).unwrap();
        assert_eq!(src.sample_rate(), 13_000_000.0 / 48.0);
        assert!(!src.is_streaming());
        src.stop();
        src.stop();
    }

    #[test]
    fn test_tune_records_center_frequency() {
        let sim = SimDevice::new();
        sim.close();
        let mut src = SampleSource::open(Box::new(sim), 40.0).unwrap();
        src.tune(947.6e6).unwrap();
        assert_eq!(src.center_freq(), 947.6e6);
    }

    #[test]
    fn test_fill_cancelled_by_exit_flag() {
        let _serial = crate::exit::FLAG_LOCK.lock().unwrap();
        crate::exit::clear_exit_for_tests();

        // No frames and never closed: the worker blocks in refill, the
        // consumer blocks in fill until the flag trips it.
        let sim = SimDevice::new();
        let handle = sim.clone();
        let mut src = SampleSource::open(Box::new(sim), 40.0).unwrap();

        let trigger = std::thread::spawn(|| {
            std::thread::sleep(Duration::from_millis(50));
            exit::request_exit();
        });

        let begin = Instant::now();
        let result = src.fill(10_000);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(
            begin.elapsed() < Duration::from_millis(200),
            "fill took {:?} to notice the exit flag",
            begin.elapsed()
        );

        trigger.join().unwrap();
        crate::exit::clear_exit_for_tests();
        handle.close();
    }
}

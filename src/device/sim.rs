//! Simulated front-end: a queue of pre-rendered I/Q frames.
//!
//! Stands in for the radio during the offline benchmark and in the pipeline
//! tests. The device handle is cheaply cloneable, so a test can keep one
//! clone to feed frames while the pipeline owns another.
//!
//! A stream delivers queued frames in order. When the queue runs dry the
//! stream *blocks* — like a real front-end waiting on DMA — until either a
//! new frame arrives or [`SimDevice::close`] marks the end of the stream,
//! after which `refill` reports end of stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use num_complex::Complex;

use crate::error::Result;

use super::{RxDevice, RxStream};

/// Full scale of the simulated 12-bit ADC.
const ADC_FULL_SCALE: f32 = 2048.0;

/// Poll interval of a stream waiting for frames.
const IDLE_POLL: Duration = Duration::from_millis(1);

struct Frame {
    i: Vec<i16>,
    q: Vec<i16>,
}

#[derive(Default)]
struct SimState {
    frames: Mutex<VecDeque<Frame>>,
    closed: AtomicBool,
}

/// In-memory receiver front-end.
///
/// Configuration calls are accepted and ignored, so the pipeline's setup
/// sequence runs unchanged against it.
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<SimState>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one transfer's worth of raw sample pairs.
    pub fn push_frame(&self, i: Vec<i16>, q: Vec<i16>) {
        assert_eq!(i.len(), q.len());
        self.state.frames.lock().unwrap().push_back(Frame { i, q });
    }

    /// Queue complex samples, quantised to the 12-bit ADC grid the real
    /// front-end delivers.
    pub fn push_samples(&self, samples: &[Complex<f32>]) {
        let i = samples
            .iter()
            .map(|s| (s.re * ADC_FULL_SCALE) as i16)
            .collect();
        let q = samples
            .iter()
            .map(|s| (s.im * ADC_FULL_SCALE) as i16)
            .collect();
        self.push_frame(i, q);
    }

    /// Frames queued but not yet delivered.
    pub fn pending_frames(&self) -> usize {
        self.state.frames.lock().unwrap().len()
    }

    /// Mark the end of the stream: once the queue drains, `refill` reports
    /// end of stream instead of blocking. Call before joining a worker that
    /// would otherwise wait for more frames.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
    }
}

impl RxDevice for SimDevice {
    fn set_sample_rate(&mut self, _rate_hz: i64) -> Result<()> {
        Ok(())
    }

    fn set_lo_frequency(&mut self, _freq_hz: i64) -> Result<()> {
        Ok(())
    }

    fn set_gain(&mut self, _gain_db: f64) -> Result<()> {
        Ok(())
    }

    fn start_rx(&mut self, _sample_count: usize) -> Result<Box<dyn RxStream>> {
        Ok(Box::new(SimStream {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimStream {
    state: Arc<SimState>,
}

impl RxStream for SimStream {
    fn refill(&mut self, i: &mut Vec<i16>, q: &mut Vec<i16>) -> Result<usize> {
        loop {
            if let Some(frame) = self.state.frames.lock().unwrap().pop_front() {
                let n = frame.i.len();
                *i = frame.i;
                *q = frame.q;
                return Ok(n);
            }
            if self.state.closed.load(Ordering::Acquire) {
                i.clear();
                q.clear();
                return Ok(0);
            }
            std::thread::sleep(IDLE_POLL);
        }
    }
}

//! Radio front-end abstraction.
//!
//! The sample pipeline only needs four things from a receiver: program the
//! sampling rate, the hardware gain, and the local oscillator, and run a
//! blocking refill loop that yields raw 12-bit I/Q pairs. Those four
//! operations form the [`RxDevice`]/[`RxStream`] seam, with one
//! implementation per backend:
//!
//! - [`pluto`]: AD936x hardware over libiio (requires the `pluto` feature).
//! - [`sim`]: a deterministic in-memory front-end for the offline benchmark
//!   and the test suite.

use crate::error::Result;

#[cfg(feature = "pluto")]
pub mod pluto;
pub mod sim;

/// Control surface of a receiver front-end.
///
/// Configuration calls are made from the consumer thread only; the stream
/// returned by [`RxDevice::start_rx`] moves into the worker thread.
pub trait RxDevice: Send {
    /// Program the ADC sampling rate in Hz.
    fn set_sample_rate(&mut self, rate_hz: i64) -> Result<()>;

    /// Program the local oscillator in Hz.
    fn set_lo_frequency(&mut self, freq_hz: i64) -> Result<()>;

    /// Program the hardware gain in dB. Idempotent.
    fn set_gain(&mut self, gain_db: f64) -> Result<()>;

    /// Allocate a receive stream delivering `sample_count` samples per
    /// refill.
    fn start_rx(&mut self, sample_count: usize) -> Result<Box<dyn RxStream>>;
}

/// One live receive stream.
pub trait RxStream: Send {
    /// Block until the next transfer completes, filling `i` and `q` with
    /// one raw signed-16-bit sample pair per entry.
    ///
    /// Returns the number of pairs delivered; `Ok(0)` means the stream has
    /// ended.
    fn refill(&mut self, i: &mut Vec<i16>, q: &mut Vec<i16>) -> Result<usize>;
}

#![doc = include_str!("../readme.md")]

pub mod arfcn;
pub mod bench;
pub mod device;
pub mod dsp;
pub mod error;
pub mod exit;
pub mod ring;
pub mod scan;
pub mod source;

pub use arfcn::Band;
pub use dsp::resampler::Resampler;
pub use error::{Error, Result};
pub use ring::RingBuffer;
pub use source::{GSM_SAMPLE_RATE, NATIVE_SAMPLE_RATE, SampleSource};

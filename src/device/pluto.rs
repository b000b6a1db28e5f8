//! AD936x (PlutoSDR) front-end over libiio.
//! (requires the `pluto` feature)
//!
//! Uses the `pluto-sdr` crate to reach the AD936x PHY: sampling rate, RF
//! bandwidth, hardware gain, and LO frequency are written through the IIO
//! attributes, and receive transfers come from an IIO buffer refilled on the
//! worker thread.

use industrial_io::{Buffer, Channel};
use pluto_sdr::pluto::{Pluto, RX};
use tracing::debug;

use crate::error::{Error, Result};

use super::{RxDevice, RxStream};

/// AD936x receiver handle.
pub struct PlutoDevice {
    pluto: Pluto,
}

impl PlutoDevice {
    /// Connect to a device.
    ///
    /// `uri` follows libiio conventions (`ip:192.168.2.1`, `usb:1.2.3`);
    /// `None` picks the default context. Use `iio_info -s` to enumerate.
    pub fn connect(uri: Option<&str>) -> Result<Self> {
        let uri = uri.unwrap_or("ip:192.168.2.1");
        debug!("connecting to IIO context at {uri}");
        let pluto = Pluto::connect(uri)
            .ok_or_else(|| Error::device(format!("IIO context: failed to connect to {uri}")))?;
        Ok(Self { pluto })
    }

}

impl RxDevice for PlutoDevice {
    fn set_sample_rate(&mut self, rate_hz: i64) -> Result<()> {
        self.pluto
            .set_sampling_freq(rate_hz)
            .map_err(|e| Error::config(format!("sampling_frequency {rate_hz}: {e:?}")))?;
        // Open the analog filter to the full sample bandwidth; the digital
        // resampler downstream does the channel selection.
        self.pluto
            .set_rf_bandwidth(rate_hz, RX)
            .map_err(|e| Error::config(format!("rf_bandwidth {rate_hz}: {e:?}")))?;
        Ok(())
    }

    fn set_lo_frequency(&mut self, freq_hz: i64) -> Result<()> {
        self.pluto
            .set_lo_rx(freq_hz)
            .map_err(|e| Error::config(format!("LO frequency {freq_hz}: {e:?}")))
    }

    fn set_gain(&mut self, gain_db: f64) -> Result<()> {
        self.pluto
            .set_hwgain(gain_db, RX)
            .map_err(|e| Error::config(format!("hardware gain {gain_db} dB: {e:?}")))
    }

    fn start_rx(&mut self, sample_count: usize) -> Result<Box<dyn RxStream>> {
        let (rx_i, rx_q) = self.pluto.rx_ch0();
        rx_i.enable();
        rx_q.enable();

        let buffer = self
            .pluto
            .create_buffer_rx(sample_count)
            .map_err(|e| Error::resource(format!("IIO buffer of {sample_count} samples: {e:?}")))?;

        debug!("created IIO receive buffer, {sample_count} samples per transfer");
        Ok(Box::new(PlutoStream { buffer, rx_i, rx_q }))
    }
}

/// One live IIO receive stream.
struct PlutoStream {
    buffer: Buffer,
    rx_i: Channel,
    rx_q: Channel,
}

// The stream is owned by exactly one thread at a time: it is created on the
// consumer thread and moved into the worker, which is the only caller of
// refill until join.
unsafe impl Send for PlutoStream {}

impl RxStream for PlutoStream {
    fn refill(&mut self, i: &mut Vec<i16>, q: &mut Vec<i16>) -> Result<usize> {
        self.buffer
            .refill()
            .map_err(|e| Error::device(format!("buffer refill: {e:?}")))?;

        *i = self
            .rx_i
            .read::<i16>(&self.buffer)
            .map_err(|e| Error::device(format!("reading I channel: {e:?}")))?;
        *q = self
            .rx_q
            .read::<i16>(&self.buffer)
            .map_err(|e| Error::device(format!("reading Q channel: {e:?}")))?;

        Ok(i.len().min(q.len()))
    }
}

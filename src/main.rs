//! GSM frequency calibration for AD936x (PlutoSDR) front-ends.
//!
//! # Usage examples
//!
//! ## Scan a band for base stations
//! ```bash
//! gsmcal -s GSM900
//! ```
//!
//! ## Watch a known carrier (by frequency or channel)
//! ```bash
//! gsmcal -f 947.6e6 -A
//! gsmcal -c 62 -b GSM900
//! ```
//!
//! ## Offline DSP benchmark (no hardware needed)
//! ```bash
//! gsmcal -B
//! ```

use clap::{ArgAction, Parser};

use gsmcal::arfcn::Band;
use gsmcal::error::{Error, Result};
use gsmcal::{bench, exit};

#[cfg(feature = "pluto")]
use gsmcal::device::pluto::PlutoDevice;
#[cfg(feature = "pluto")]
use gsmcal::dsp::spectrum::{draw_ascii_fft, format_freq};
#[cfg(feature = "pluto")]
use gsmcal::scan::{self, MEASURE_SAMPLES, mean_power_dbfs};
#[cfg(feature = "pluto")]
use gsmcal::source::SampleSource;
#[cfg(feature = "pluto")]
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "GSM frequency calibration for AD936x SDRs", long_about = None)]
struct Args {
    /// Frequency of a nearby GSM base station, Hz (e.g. 947.6e6)
    #[arg(short = 'f', long)]
    frequency: Option<f64>,

    /// Channel (ARFCN) of a nearby GSM base station
    #[arg(short = 'c', long)]
    channel: Option<u16>,

    /// Scan a band for base stations (GSM850, GSM-R, GSM900, EGSM, DCS)
    #[arg(short = 's', long, value_name = "BAND")]
    scan: Option<Band>,

    /// Band indicator for --channel
    #[arg(short = 'b', long)]
    band: Option<Band>,

    /// Hardware gain in dB
    #[arg(short = 'g', long, default_value_t = 40.0)]
    gain: f64,

    /// IIO URI (e.g. ip:192.168.2.1 or usb:1.2.3)
    #[arg(short = 'u', long)]
    uri: Option<String>,

    /// Show an ASCII spectrum of each measurement window
    #[arg(short = 'A', long)]
    show_fft: bool,

    /// Run the offline DSP benchmark and exit
    #[arg(short = 'B', long)]
    benchmark: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    exit::install_signal_handler();

    if let Err(e) = run(&args) {
        if !matches!(e, Error::Cancelled) {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if args.benchmark {
        return bench::run();
    }

    // Resolve what to tune to before touching hardware.
    let target = if let Some(band) = args.scan {
        Target::Scan(band)
    } else if let Some(freq) = args.frequency {
        Target::Carrier(freq)
    } else if let Some(channel) = args.channel {
        let band = args.band.or_else(|| {
            Band::ALL
                .into_iter()
                .find(|b| b.arfcn_to_freq(channel).is_some())
        });
        let freq = band
            .and_then(|b| b.arfcn_to_freq(channel))
            .ok_or_else(|| Error::config(format!("channel {channel} is in no known band")))?;
        Target::Carrier(freq)
    } else {
        return Err(Error::config(
            "nothing to do: pass -s band, -f frequency, or -c channel",
        ));
    };

    run_on_hardware(args, target)
}

enum Target {
    Scan(Band),
    Carrier(f64),
}

#[cfg(not(feature = "pluto"))]
fn run_on_hardware(_args: &Args, _target: Target) -> Result<()> {
    eprintln!("error: built without hardware support; rebuild with --features pluto");
    eprintln!("(the -B benchmark runs without hardware)");
    std::process::exit(1);
}

#[cfg(feature = "pluto")]
fn run_on_hardware(args: &Args, target: Target) -> Result<()> {
    let device = PlutoDevice::connect(args.uri.as_deref())?;
    let mut source = SampleSource::open(Box::new(device), args.gain)?;

    match target {
        Target::Scan(band) => {
            eprintln!("gsmcal: scanning for {band} base stations");
            let results = scan::scan_band(&mut source, band)?;
            let found = scan::strongest(&results);
            if found.is_empty() {
                println!("no carriers found in {band}");
            }
            for chan in &found {
                println!(
                    "chan {:4} ({})  power {:6.1} dBFS",
                    chan.arfcn,
                    format_freq(chan.freq_hz),
                    chan.power_dbfs,
                );
            }
            Ok(())
        }
        Target::Carrier(freq) => watch_carrier(args, &mut source, freq),
    }
}

/// Tune one carrier and report windowed power until interrupted.
#[cfg(feature = "pluto")]
fn watch_carrier(args: &Args, source: &mut SampleSource, freq: f64) -> Result<()> {
    let described = Band::containing(freq)
        .map(|(band, arfcn)| format!("{band} channel {arfcn}"))
        .unwrap_or_else(|| "unknown channel".into());
    eprintln!("gsmcal: using {described} ({})", format_freq(freq));

    source.tune(freq)?;
    source.flush();

    let mut window = vec![num_complex::Complex::new(0.0f32, 0.0); MEASURE_SAMPLES];
    let mut powers: Vec<f32> = Vec::new();

    loop {
        let overruns = match source.fill(MEASURE_SAMPLES) {
            Ok(overruns) => overruns,
            Err(Error::Cancelled) => break,
            Err(e) => return Err(e),
        };
        let n = source.buffer().read(&mut window);
        let power = mean_power_dbfs(&window[..n]);
        powers.push(power);

        if overruns > 0 {
            info!("{overruns} samples dropped since last window");
        }
        if args.show_fft {
            draw_ascii_fft(&window[..n], 120, source.sample_rate() as f32);
        } else {
            println!("power {power:6.1} dBFS  (overruns {overruns})");
        }
    }

    if !powers.is_empty() {
        let mut stddev = 0.0;
        let mean = scan::avg(&powers, Some(&mut stddev));
        println!(
            "\n{} windows: mean power {mean:.1} dBFS, stddev {stddev:.2} dB",
            powers.len()
        );
    }
    Ok(())
}

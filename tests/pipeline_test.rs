//! Pipeline scenarios driven through the simulated front-end.

use std::time::{Duration, Instant};

use gsmcal::device::sim::SimDevice;
use gsmcal::error::Error;
use gsmcal::{Resampler, SampleSource};
use num_complex::Complex;

const ADC_SCALE: f32 = 1.0 / 2048.0;

/// Deterministic raw frame: a ramp cycling through the 12-bit range.
fn ramp_frame(len: usize, phase: usize) -> (Vec<i16>, Vec<i16>) {
    let i: Vec<i16> = (0..len)
        .map(|k| ((phase + k) % 4096) as i16 - 2048)
        .collect();
    let q: Vec<i16> = (0..len)
        .map(|k| ((phase + 2 * k) % 4096) as i16 - 2048)
        .collect();
    (i, q)
}

/// How many output samples the resampler produces for this raw stream.
fn reference_output_count(frames: &[(Vec<i16>, Vec<i16>)]) -> usize {
    let input: Vec<Complex<f32>> = frames
        .iter()
        .flat_map(|(i, q)| {
            i.iter()
                .zip(q)
                .map(|(&i, &q)| Complex::new(i as f32 * ADC_SCALE, q as f32 * ADC_SCALE))
        })
        .collect();

    let mut resampler = Resampler::new();
    let mut output = vec![Complex::new(0.0f32, 0.0); Resampler::output_bound(input.len())];
    resampler.process(&input, &mut output)
}

/// Wait until the worker has consumed every queued frame and drained its
/// last batch into the ring.
fn wait_for_drain(sim: &SimDevice) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while sim.pending_frames() > 0 {
        assert!(Instant::now() < deadline, "worker did not consume the frames");
        std::thread::sleep(Duration::from_millis(10));
    }
    // The final frame is popped before it is processed; give the worker
    // time to push it through the resampler.
    std::thread::sleep(Duration::from_millis(500));
}

#[test]
fn scenario_overrun_accounting() {
    // Ten transfers totalling well over the ring capacity, with the
    // consumer asleep throughout: everything that does not fit must be
    // counted, exactly.
    let frames: Vec<(Vec<i16>, Vec<i16>)> = (0..10)
        .map(|n| ramp_frame(256 * 1024, 17 * n))
        .collect();
    let produced_ref = reference_output_count(&frames);

    let sim = SimDevice::new();
    let handle = sim.clone();
    for (i, q) in &frames {
        sim.push_frame(i.clone(), q.clone());
    }

    let mut source = SampleSource::open(Box::new(sim), 40.0).unwrap();
    let capacity = source.buffer().capacity();
    assert!(produced_ref > capacity, "scenario must overflow the ring");

    source.start().unwrap();
    wait_for_drain(&handle);

    let overruns = source.fill(1000).unwrap();
    assert_eq!(overruns as usize, produced_ref - capacity);
    assert_eq!(source.buffer().data_available(), capacity);

    // Consumed counters restart from zero.
    let overruns = source.fill(1000).unwrap();
    assert_eq!(overruns, 0);

    handle.close();
    source.stop();
}

#[test]
fn pipeline_delivers_resampled_stream() {
    // A DC input at half scale must come out of the pipeline as 0.5 once
    // the filters settle, at 13/120 of the input count.
    let sim = SimDevice::new();
    let handle = sim.clone();
    let frame = vec![1024i16; 32 * 1024];
    for _ in 0..3 {
        sim.push_frame(frame.clone(), vec![0i16; frame.len()]);
    }

    let mut source = SampleSource::open(Box::new(sim), 40.0).unwrap();
    let overruns = source.fill(2000).unwrap();
    assert_eq!(overruns, 0);

    let mut window = vec![Complex::new(0.0f32, 0.0); 2000];
    let got = source.buffer().read(&mut window);
    assert_eq!(got, 2000);

    for (i, y) in window.iter().enumerate().skip(120) {
        let err = (*y - Complex::new(0.5, 0.0)).norm();
        assert!(err < 1e-3, "sample {i} deviates by {err}");
    }

    handle.close();
    source.stop();
}

#[test]
fn flush_discards_samples_and_overruns() {
    let sim = SimDevice::new();
    let handle = sim.clone();
    let (i, q) = ramp_frame(64 * 1024, 0);
    sim.push_frame(i, q);

    let mut source = SampleSource::open(Box::new(sim), 40.0).unwrap();
    source.fill(1000).unwrap();
    assert!(source.buffer().data_available() >= 1000);

    source.flush();
    assert_eq!(source.buffer().data_available(), 0);

    handle.close();
    source.stop();
}

#[test]
fn fill_reports_cancellation_when_stream_ends() {
    // A closed, empty front-end: the worker exits immediately and any
    // blocked fill must notice within a wait quantum or two.
    let sim = SimDevice::new();
    sim.close();

    let mut source = SampleSource::open(Box::new(sim), 40.0).unwrap();
    let begin = Instant::now();
    let result = source.fill(100);
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(begin.elapsed() < Duration::from_millis(500));
}

#[test]
fn stop_is_idempotent_and_restartable() {
    let sim = SimDevice::new();
    let handle = sim.clone();
    let (i, q) = ramp_frame(32 * 1024, 5);
    sim.push_frame(i.clone(), q.clone());

    let mut source = SampleSource::open(Box::new(sim), 40.0).unwrap();
    source.fill(100).unwrap();
    handle.close();
    source.stop();
    source.stop();
    assert!(!source.is_streaming());

    // A fresh start re-primes the stream. The closed sim ends it again as
    // soon as the queue drains, so the fill may or may not be satisfied
    // before the cancellation is observed.
    handle.push_frame(i, q);
    let _ = source.fill(100);
    source.stop();
}

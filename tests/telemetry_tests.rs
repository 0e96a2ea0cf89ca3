// Integration tests for telemetry sampling
//
// These tests run the sampler over live frames on a paused clock and check
// cadence, cancellation and the behaviour of the emotion mapping on real
// audio.

use companion_voice::audio::{AudioFrame, CaptureConstraints, MediaDevices, WavFileMicrophone};
use companion_voice::telemetry::AnalyzerConfig;
use companion_voice::{EmotionSnapshot, TelemetrySampler};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

fn tone(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()) as i16
        })
        .collect()
}

fn collector() -> (
    Arc<Mutex<Vec<EmotionSnapshot>>>,
    impl FnMut(EmotionSnapshot) -> bool + Send + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |snapshot| {
        sink.lock().unwrap().push(snapshot);
        true
    })
}

#[tokio::test(start_paused = true)]
async fn test_sampler_emits_on_interval() {
    let (_frames_tx, frames) = broadcast::channel::<AudioFrame>(16);
    let (seen, emit) = collector();

    let mut sampler = TelemetrySampler::spawn(
        frames,
        AnalyzerConfig::default(),
        Duration::from_millis(100),
        emit,
    );

    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert!(sampler.is_running());
    sampler.stop().await;
    assert!(!sampler.is_running());

    assert_eq!(seen.lock().unwrap().len(), 10);

    // Nothing fires after stop
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(seen.lock().unwrap().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_silence_reads_as_low_energy() {
    let (_frames_tx, frames) = broadcast::channel::<AudioFrame>(16);
    let (seen, emit) = collector();

    let mut sampler = TelemetrySampler::spawn(
        frames,
        AnalyzerConfig::default(),
        Duration::from_millis(100),
        emit,
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    sampler.stop().await;

    let snapshot = seen.lock().unwrap()[0];
    assert_eq!(snapshot.energy, 0.0);
    assert_eq!(snapshot.stress, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_sampler_stops_when_receiver_refuses() {
    let (_frames_tx, frames) = broadcast::channel::<AudioFrame>(16);
    let mut count = 0;

    let mut sampler = TelemetrySampler::spawn(
        frames,
        AnalyzerConfig::default(),
        Duration::from_millis(100),
        move |_| {
            count += 1;
            count < 3
        },
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!sampler.is_running());
    sampler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sampler_stops_when_stream_closes() {
    let (frames_tx, frames) = broadcast::channel::<AudioFrame>(16);
    let (_seen, emit) = collector();

    let sampler = TelemetrySampler::spawn(
        frames,
        AnalyzerConfig::default(),
        Duration::from_millis(100),
        emit,
    );

    drop(frames_tx);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!sampler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_loud_audio_from_wav_microphone_raises_energy() {
    let samples = tone(2000.0, 12000.0, 24000, 24000);
    let mic = WavFileMicrophone::from_samples(samples, 24000).looped(true);
    let mut device = mic
        .acquire_microphone(&CaptureConstraints::default())
        .await
        .unwrap();
    let (seen, emit) = collector();

    let mut sampler = TelemetrySampler::spawn(
        device.subscribe(),
        AnalyzerConfig::default(),
        Duration::from_millis(100),
        emit,
    );

    tokio::time::sleep(Duration::from_millis(550)).await;
    sampler.stop().await;
    device.stop().unwrap();

    let seen = seen.lock().unwrap();
    let last = seen.last().copied().unwrap();
    assert!(last.energy > 0.0, "{:?}", last);
    for value in [last.confidence, last.energy, last.stress, last.engagement] {
        assert!((0.0..=100.0).contains(&value));
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_does_not_kill_sampler() {
    let (_frames_tx, frames) = broadcast::channel::<AudioFrame>(16);
    let (seen, emit) = collector();

    let mut sampler =
        TelemetrySampler::spawn(frames, AnalyzerConfig::default(), Duration::ZERO, emit);

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(sampler.is_running());
    sampler.stop().await;

    assert!(!seen.lock().unwrap().is_empty());
}

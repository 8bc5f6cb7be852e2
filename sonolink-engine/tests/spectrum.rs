//! End-to-end spectrum analysis against a synthetic two-tone sweep.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sonolink_engine::analyzer::SpectrumAnalyzer;
use sonolink_engine::config::AnalyzerConfig;
use sonolink_engine::state::EngineState;

fn write_sweep_wav(path: &std::path::Path) {
    // 400Hz for the first second, 6kHz for the second
    let rate = 22_050u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(rate * 2) {
        let t = i as f32 / rate as f32;
        let freq = if t < 1.0 { 400.0 } else { 6_000.0 };
        let v = ((2.0 * std::f32::consts::PI * freq * t).sin() * 20_000.0) as i16;
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();
}

fn dominant_band(frame: &[u8; 8]) -> usize {
    frame.iter().enumerate().max_by_key(|(_, &v)| v).unwrap().0
}

#[test]
fn sweep_moves_the_dominant_band() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.wav");
    write_sweep_wav(&path);

    let state = Arc::new(EngineState::new());
    let analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default(), Arc::clone(&state));
    let mut events = state.subscribe_events();

    analyzer.start(&path).unwrap();

    // Mid-first-second: 400Hz sits in band 1 (250-500Hz)
    std::thread::sleep(Duration::from_millis(600));
    let early = analyzer.latest_frame();
    assert_eq!(dominant_band(&early), 1, "early frame = {:?}", early);

    // Mid-second-second: 6kHz sits in band 5 (4k-8kHz)
    std::thread::sleep(Duration::from_millis(1_000));
    let late = analyzer.latest_frame();
    assert_eq!(dominant_band(&late), 5, "late frame = {:?}", late);

    // Past end of file the worker stops on its own
    std::thread::sleep(Duration::from_millis(700));
    assert!(!analyzer.is_running());

    analyzer.stop();
    assert_eq!(analyzer.latest_frame(), [0u8; 8]);

    let mut frames_seen = 0;
    while let Ok(event) = events.try_recv() {
        if let sonolink_common::events::EngineEvent::SpectrumFrame { bands, .. } = event {
            frames_seen += 1;
            // u8 guarantees range; check the noise floor is enforced
            assert!(bands.iter().all(|&v| v == 0 || v >= 10));
        }
    }
    assert!(frames_seen >= 10, "only {} frames seen", frames_seen);
}

#[test]
fn analyzer_survives_missing_file() {
    let state = Arc::new(EngineState::new());
    let analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default(), state);

    // The worker logs and exits; nothing panics and stop stays idempotent
    analyzer.start(std::path::Path::new("/nonexistent/track.mp3")).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(!analyzer.is_running());
    analyzer.stop();
    analyzer.stop();
}

//! Record a synthetic screen and tone into a packet file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use screenmux_capture_engine::{
    CaptureSession, PacketFileSink, PcmAudioEncoder, PipelineReport, RawVideoEncoder,
    SessionConfig, SessionState,
};
use screenmux_common::clock::RateController;
use screenmux_common::config::CaptureDefaults;

use crate::synthetic::{spawn_tone, TestPattern, ToneSource};

pub struct RecordOptions {
    pub output: PathBuf,
    pub duration: Option<f64>,
    pub capture: CaptureDefaults,
    pub tone_hz: f64,
    pub report: Option<PathBuf>,
}

pub async fn run(options: RecordOptions) -> anyhow::Result<()> {
    let capture = &options.capture;
    println!("Starting recording: {}", options.output.display());
    println!(
        "  Frame: {}x{} (padding {}x{}, rotation {:?}, {:?})",
        capture.width,
        capture.height,
        capture.padding_width,
        capture.padding_height,
        capture.rotation,
        capture.color_order
    );
    println!("  FPS: {}", capture.fps);
    println!(
        "  Audio: {} Hz, {} samples/frame",
        capture.audio_sample_rate, capture.audio_frame_size
    );
    println!();

    let config = SessionConfig::from_defaults(capture);
    let sink = PacketFileSink::create(&options.output, &config.streams())?;
    let (session, audio) = CaptureSession::start(
        config,
        Box::new(RawVideoEncoder::new()),
        Box::new(PcmAudioEncoder::new(capture.audio_frame_size)),
        Box::new(sink),
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let tone = spawn_tone(
        audio,
        ToneSource::new(capture.audio_sample_rate, options.tone_hz),
        stop.clone(),
    )?;

    let (source_width, source_height) = session.source_size();
    let pattern = TestPattern::new(source_width, source_height, capture.color_order);
    let fps = capture.fps;
    let driver_stop = stop.clone();
    let mut driver =
        tokio::task::spawn_blocking(move || drive(session, pattern, fps, driver_stop));

    match options.duration {
        Some(secs) => println!("Recording for {secs:.1}s (Ctrl+C stops early)..."),
        None => println!("Press Ctrl+C to stop recording..."),
    }

    let finished_early = tokio::select! {
        result = &mut driver => Some(result),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C; stopping");
            }
            None
        }
        _ = wait_for(options.duration) => None,
    };

    stop.store(true, Ordering::Relaxed);
    let report = match finished_early {
        Some(result) => result??,
        None => driver.await??,
    };
    if tone.join().is_err() {
        tracing::warn!("Tone source thread panicked");
    }

    print_report(&report, &options.output);
    if let Some(path) = &options.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to: {}", path.display());
    }
    Ok(())
}

async fn wait_for(duration: Option<f64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
        None => std::future::pending().await,
    }
}

/// Render loop: one `render_frame` per tick until `stop` is set.
fn drive(
    mut session: CaptureSession,
    mut pattern: TestPattern,
    fps: u32,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<PipelineReport> {
    let mut rate = RateController::new(fps);
    let started = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let now = started.elapsed().as_nanos() as u64;
        if !rate.should_tick(now) {
            thread::sleep(Duration::from_nanos(rate.remaining_ns(now)));
            continue;
        }

        pattern.advance();
        let pixels = pattern.pixels()?;
        if let Err(e) = session.render_frame(&pixels) {
            if session.state() == SessionState::Error {
                // stop() returns the underlying cause.
                break;
            }
            session.stop()?;
            return Err(e.into());
        }
    }

    Ok(session.stop()?)
}

fn print_report(report: &PipelineReport, output: &std::path::Path) {
    let stats = &report.stats;
    println!();
    println!("Recording saved to: {}", output.display());
    println!(
        "  Duration: {:.2}s, {} frames ({:.2} fps average)",
        report.duration_ms as f64 / 1000.0,
        stats.frames_captured,
        report.avg_fps()
    );
    println!(
        "  Packets: {} video, {} audio ({} bytes)",
        stats.video_packets, stats.audio_packets, stats.bytes_written
    );
    if stats.audio_overruns > 0 {
        println!("  Audio overruns: {}", stats.audio_overruns);
    }
    if stats.frames_discarded > 0 {
        println!(
            "  Frames discarded at shutdown: {} ({:.1}%)",
            stats.frames_discarded,
            stats.drop_rate()
        );
    }
    println!(
        "  Convert: {:.3} ms avg, encode: {:.3} ms avg",
        stats.transform.avg_ms(),
        stats.video_enc.avg_ms()
    );
}


//! Runtime statistics for a capture pipeline.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Accumulated wall time spent in one pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimer {
    /// Number of timed runs.
    pub count: u64,
    /// Total time across all runs (ns).
    pub total_ns: u64,
    /// Longest single run (ns).
    pub max_ns: u64,
}

impl StageTimer {
    /// Record one run.
    pub fn record(&mut self, elapsed: Duration) {
        let ns = elapsed.as_nanos() as u64;
        self.count += 1;
        self.total_ns += ns;
        self.max_ns = self.max_ns.max(ns);
    }

    /// Run `f` and record how long it took.
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(start.elapsed());
        out
    }

    /// Mean run time in milliseconds.
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_ns as f64 / self.count as f64 / 1_000_000.0
    }

    /// Longest run in milliseconds.
    pub fn max_ms(&self) -> f64 {
        self.max_ns as f64 / 1_000_000.0
    }

    pub(crate) fn log(&self, stage: &str) {
        tracing::info!(
            stage,
            runs = self.count,
            avg_ms = self.avg_ms(),
            max_ms = self.max_ms(),
            "Stage timing"
        );
    }
}

/// Runtime statistics from a capture pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Frames handed to the encoding worker.
    pub frames_captured: u64,

    /// Video frames the encoder consumed.
    pub frames_encoded: u64,

    /// Sent frames discarded by shutdown before the encoder took them.
    pub frames_discarded: u64,

    /// Video packets written to the sink.
    pub video_packets: u64,

    /// Audio frames assembled and submitted to the encoder.
    pub audio_frames: u64,

    /// Audio packets written to the sink.
    pub audio_packets: u64,

    /// Payload bytes written to the sink, both streams.
    pub bytes_written: u64,

    /// Ring buffer overruns signaled by the audio callback.
    pub audio_overruns: u64,

    /// RGB to YUV conversion on the render thread.
    pub transform: StageTimer,

    /// Video encode plus write on the worker thread.
    pub video_enc: StageTimer,

    /// Audio assembly, encode and write on the render thread.
    pub audio_out: StageTimer,

    /// Audio callback time spent pushing into the ring buffer.
    pub audio_in: StageTimer,
}

impl PipelineStats {
    /// Percentage of captured frames discarded at shutdown.
    pub fn drop_rate(&self) -> f64 {
        if self.frames_captured == 0 {
            return 0.0;
        }
        self.frames_discarded as f64 / self.frames_captured as f64 * 100.0
    }

    pub(crate) fn log_stages(&self) {
        self.audio_out.log("audio_out");
        self.audio_in.log("audio_in");
        self.video_enc.log("video_enc");
        self.transform.log("transform");
    }
}

/// Summary returned when a pipeline stops cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub stats: PipelineStats,

    /// Session length in milliseconds.
    pub duration_ms: i64,
}

impl PipelineReport {
    /// Average capture rate over the whole session.
    pub fn avg_fps(&self) -> f64 {
        if self.duration_ms <= 0 {
            return 0.0;
        }
        self.stats.frames_captured as f64 * 1000.0 / self.duration_ms as f64
    }
}

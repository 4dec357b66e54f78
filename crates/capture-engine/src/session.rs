//! Capture session: the context object that owns one pipeline run.
//!
//! The caller's render loop drives it one tick at a time:
//!
//! 1. [`CaptureSession::start`] allocates the frame pair and the audio
//!    ring, starts the clock and spawns the encoding worker.
//! 2. The caller registers the returned [`AudioInput`] with its audio
//!    callback and calls [`CaptureSession::render_frame`] once per
//!    captured screen.
//! 3. [`CaptureSession::stop`] wakes and joins the worker, flushes both
//!    encoders and writes the trailer.

use std::time::Instant;

use screenmux_common::clock::{PipelineClock, TimeBase};
use screenmux_common::config::{CaptureDefaults, Rotation};
use screenmux_common::error::{ScreenmuxError, ScreenmuxResult, StreamKind};

use crate::assembler::AudioFrameAssembler;
use crate::convert::FrameConverter;
use crate::encoder::{encode_error, AudioEncoder, StreamInfo, VideoEncoder};
use crate::frame::{PixelBuffer, YuvFrame};
use crate::handoff::{frame_handoff, FrameSender};
use crate::pipeline::{PipelineReport, PipelineStats};
use crate::ring_buffer::{audio_ring, AudioInput};
use crate::sink::{OutputSink, SharedSink};
use crate::worker::{EncodingWorker, WorkerState};

/// Stream index of the video stream in the muxed output.
pub const VIDEO_STREAM_INDEX: usize = 0;

/// Stream index of the audio stream in the muxed output.
pub const AUDIO_STREAM_INDEX: usize = 1;

/// Configuration for one capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Output frame width.
    pub width: usize,

    /// Output frame height.
    pub height: usize,

    /// Left/right border excluded from conversion.
    pub padding_width: usize,

    /// Top/bottom border excluded from conversion.
    pub padding_height: usize,

    /// Rotation applied during conversion.
    pub rotation: Rotation,

    /// Mono audio sample rate; the ring holds one second of it.
    pub sample_rate: u32,

    /// Time base of the video stream.
    pub video_time_base: TimeBase,
}

impl SessionConfig {
    pub fn from_defaults(defaults: &CaptureDefaults) -> Self {
        Self {
            width: defaults.width as usize,
            height: defaults.height as usize,
            padding_width: defaults.padding_width as usize,
            padding_height: defaults.padding_height as usize,
            rotation: defaults.rotation,
            sample_rate: defaults.audio_sample_rate,
            video_time_base: defaults.video_time_base,
        }
    }

    /// The video and audio stream descriptors, in stream-index order.
    pub fn streams(&self) -> [StreamInfo; 2] {
        [
            StreamInfo {
                index: VIDEO_STREAM_INDEX,
                kind: StreamKind::Video,
                time_base: self.video_time_base,
            },
            StreamInfo {
                index: AUDIO_STREAM_INDEX,
                kind: StreamKind::Audio,
                time_base: TimeBase::per_sample(self.sample_rate),
            },
        ]
    }

    fn validate(&self) -> ScreenmuxResult<()> {
        if self.sample_rate < 2 {
            return Err(ScreenmuxError::config(format!(
                "Invalid audio sample rate {}",
                self.sample_rate
            )));
        }
        if !self.video_time_base.is_valid() {
            return Err(ScreenmuxError::config(format!(
                "Invalid video time base {}",
                self.video_time_base
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_defaults(&CaptureDefaults::default())
    }
}

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting frames.
    Recording,
    /// An encoder or write failed; only `stop` is useful now.
    Error,
}

/// A running capture-to-encode pipeline.
pub struct CaptureSession {
    state: SessionState,
    clock: PipelineClock,
    converter: FrameConverter,
    sender: FrameSender,
    assembler: AudioFrameAssembler,
    audio_encoder: Box<dyn AudioEncoder>,
    sink: SharedSink,
    worker: Option<EncodingWorker>,
    video_stream: StreamInfo,
    audio_stream: StreamInfo,
    frame_count: u64,
    stats: PipelineStats,
    failure: Option<ScreenmuxError>,
}

impl CaptureSession {
    /// Allocate buffers, start the clock and spawn the encoding worker.
    ///
    /// Returns the session and the producer half of the audio ring, to be
    /// fed from the platform audio callback.
    pub fn start(
        config: SessionConfig,
        video_encoder: Box<dyn VideoEncoder>,
        audio_encoder: Box<dyn AudioEncoder>,
        sink: Box<dyn OutputSink>,
    ) -> ScreenmuxResult<(Self, AudioInput)> {
        config.validate()?;
        let converter = FrameConverter::new(
            config.width,
            config.height,
            config.padding_width,
            config.padding_height,
            config.rotation,
        )?;

        let capacity = config.sample_rate as usize;
        let frame_size = audio_encoder.frame_size();
        if frame_size == 0 || frame_size >= capacity {
            return Err(ScreenmuxError::config(format!(
                "Audio frame size {frame_size} must be between 1 and {}",
                capacity - 1
            )));
        }
        let (audio_input, reader) = audio_ring(capacity)?;
        let assembler = AudioFrameAssembler::new(reader, frame_size);

        let frames = [
            YuvFrame::new(config.width, config.height, 0),
            YuvFrame::new(config.width, config.height, 1),
        ];
        let (sender, receiver) = frame_handoff(frames)?;

        let [video_stream, audio_stream] = config.streams();
        let sink = SharedSink::new(sink);
        let clock = PipelineClock::start();

        tracing::info!(
            width = config.width,
            height = config.height,
            rotation = ?config.rotation,
            sample_rate = config.sample_rate,
            audio_frame_size = frame_size,
            video_time_base = %video_stream.time_base,
            audio_encoder = %audio_encoder.name(),
            epoch_wall = %clock.epoch_wall(),
            "Starting capture session"
        );

        let worker = EncodingWorker::spawn(receiver, video_encoder, sink.clone(), video_stream)?;

        Ok((
            Self {
                state: SessionState::Recording,
                clock,
                converter,
                sender,
                assembler,
                audio_encoder,
                sink,
                worker: Some(worker),
                video_stream,
                audio_stream,
                frame_count: 0,
                stats: PipelineStats::default(),
                failure: None,
            },
            audio_input,
        ))
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames handed to the encoder so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Size the capture source must deliver, in pixels.
    pub fn source_size(&self) -> (usize, usize) {
        self.converter.source_size()
    }

    pub fn video_stream(&self) -> StreamInfo {
        self.video_stream
    }

    pub fn audio_stream(&self) -> StreamInfo {
        self.audio_stream
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map_or(WorkerState::Stopped, |w| w.state())
    }

    /// Milliseconds since the session started.
    pub fn elapsed_ms(&self) -> i64 {
        self.clock.elapsed_ms()
    }

    /// One capture tick: convert `pixels` into the next frame buffer, hand
    /// it to the encoder, then encode every complete audio frame waiting in
    /// the ring.
    pub fn render_frame(&mut self, pixels: &PixelBuffer<'_>) -> ScreenmuxResult<()> {
        if self.state != SessionState::Recording {
            return Err(ScreenmuxError::pipeline(
                "Capture session has failed; stop it to collect the cause",
            ));
        }

        let index = self.frame_count;
        let mut frame = match self.sender.acquire(index) {
            Ok(frame) => frame,
            Err(ScreenmuxError::Stopped) => return Err(self.worker_gone()),
            Err(e) => return Err(e),
        };

        let pts = TimeBase::MILLIS.rescale(self.clock.elapsed_ms(), self.video_stream.time_base);
        frame.set_pts(pts);
        let converter = self.converter;
        if let Err(e) = self
            .stats
            .transform
            .time(|| converter.convert(pixels, &mut frame))
        {
            self.sender.cancel(frame);
            return Err(e);
        }

        match self.sender.send(frame) {
            Ok(()) => {}
            Err(ScreenmuxError::Stopped) => return Err(self.worker_gone()),
            Err(e) => return Err(e),
        }
        self.frame_count += 1;
        self.stats.frames_captured += 1;

        self.drain_audio()
    }

    /// Encode every full audio frame currently buffered.
    fn drain_audio(&mut self) -> ScreenmuxResult<()> {
        let start = Instant::now();
        while self.assembler.has_full_frame() {
            if let Err(e) = self.write_audio_frame() {
                return Err(self.fail(e));
            }
        }
        self.stats.audio_out.record(start.elapsed());
        Ok(())
    }

    fn write_audio_frame(&mut self) -> ScreenmuxResult<()> {
        let frame = self.assembler.assemble_next();
        let packet = self
            .audio_encoder
            .encode(&frame)
            .map_err(|e| encode_error(StreamKind::Audio, e))?;
        self.stats.audio_frames += 1;
        if let Some(mut packet) = packet {
            packet.stream_index = self.audio_stream.index;
            self.sink.write(&packet)?;
            self.stats.audio_packets += 1;
            self.stats.bytes_written += packet.data.len() as u64;
        }
        Ok(())
    }

    /// Stop the worker, flush both encoders and write the trailer.
    ///
    /// If the worker or an audio write failed, that error is returned after
    /// the output has been closed.
    pub fn stop(mut self) -> ScreenmuxResult<PipelineReport> {
        tracing::info!(frames = self.frame_count, "Stopping capture session");
        // Wait for the worker to pick up the last sent frame.
        if self.state == SessionState::Recording {
            if let Ok(frame) = self.sender.acquire(self.frame_count) {
                self.sender.cancel(frame);
            }
        }
        self.sender.close();
        self.stats.frames_discarded = self.sender.discarded();

        let mut first_error = self.failure.take();

        match self.worker.take().map(EncodingWorker::join) {
            Some(Ok(outcome)) => {
                self.stats.frames_encoded = outcome.frames_encoded;
                self.stats.video_packets = outcome.packets_written;
                self.stats.bytes_written += outcome.bytes_written;
                self.stats.video_enc = outcome.timing;
                if first_error.is_none() {
                    let mut encoder = outcome.encoder;
                    if let Err(e) = self.flush_video(encoder.as_mut()) {
                        first_error = Some(e);
                    }
                }
            }
            Some(Err(e)) => first_error = Some(e),
            None => {}
        }

        if first_error.is_none() {
            if let Err(e) = self.flush_audio() {
                first_error = Some(e);
            }
        }

        let reader = self.assembler.reader();
        self.stats.audio_overruns = reader.overruns();
        self.stats.audio_in = reader.callback_timing();

        let finished = self.sink.finish();
        let duration_ms = self.clock.elapsed_ms();
        let report = PipelineReport {
            stats: self.stats.clone(),
            duration_ms,
        };

        tracing::info!(
            avg_fps = report.avg_fps(),
            frames = report.stats.frames_captured,
            video_packets = report.stats.video_packets,
            audio_packets = report.stats.audio_packets,
            overruns = report.stats.audio_overruns,
            discarded = report.stats.frames_discarded,
            duration_ms,
            "Capture session stopped"
        );
        report.stats.log_stages();

        if let Some(e) = first_error {
            return Err(e);
        }
        finished?;
        Ok(report)
    }

    fn flush_video(&mut self, encoder: &mut dyn VideoEncoder) -> ScreenmuxResult<()> {
        let packets = encoder
            .flush()
            .map_err(|e| encode_error(StreamKind::Video, e))?;
        for mut packet in packets {
            packet.stream_index = self.video_stream.index;
            self.sink.write(&packet)?;
            self.stats.video_packets += 1;
            self.stats.bytes_written += packet.data.len() as u64;
        }
        Ok(())
    }

    fn flush_audio(&mut self) -> ScreenmuxResult<()> {
        let packets = self
            .audio_encoder
            .flush()
            .map_err(|e| encode_error(StreamKind::Audio, e))?;
        for mut packet in packets {
            packet.stream_index = self.audio_stream.index;
            self.sink.write(&packet)?;
            self.stats.audio_packets += 1;
            self.stats.bytes_written += packet.data.len() as u64;
        }
        Ok(())
    }

    fn fail(&mut self, err: ScreenmuxError) -> ScreenmuxError {
        tracing::error!(error = %err, "Capture session failed");
        self.state = SessionState::Error;
        self.failure = Some(err.replicate());
        self.sender.close();
        err
    }

    fn worker_gone(&mut self) -> ScreenmuxError {
        self.state = SessionState::Error;
        ScreenmuxError::pipeline("Encoding worker stopped; stop the session to collect the cause")
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            tracing::warn!("Capture session dropped without stop(); output is not finalized");
            self.sender.close();
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{PcmAudioEncoder, RawVideoEncoder};
    use crate::sink::MemorySink;
    use screenmux_common::config::ColorOrder;

    fn small_config() -> SessionConfig {
        SessionConfig {
            width: 8,
            height: 6,
            padding_width: 0,
            padding_height: 0,
            rotation: Rotation::None,
            sample_rate: 8000,
            video_time_base: TimeBase::new(1, 1000),
        }
    }

    #[test]
    fn test_streams_layout() {
        let [video, audio] = small_config().streams();
        assert_eq!(video.index, VIDEO_STREAM_INDEX);
        assert_eq!(audio.index, AUDIO_STREAM_INDEX);
        assert_eq!(audio.time_base, TimeBase::new(1, 8000));
    }

    #[test]
    fn test_rejects_frame_size_beyond_ring() {
        let res = CaptureSession::start(
            small_config(),
            Box::new(RawVideoEncoder::new()),
            Box::new(PcmAudioEncoder::new(8000)),
            Box::new(MemorySink::new()),
        );
        assert!(matches!(res, Err(ScreenmuxError::Config { .. })));
    }

    #[test]
    fn test_rejects_invalid_time_base() {
        let config = SessionConfig {
            video_time_base: TimeBase::new(0, 10),
            ..small_config()
        };
        let res = CaptureSession::start(
            config,
            Box::new(RawVideoEncoder::new()),
            Box::new(PcmAudioEncoder::new(256)),
            Box::new(MemorySink::new()),
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_conversion_error_keeps_session_usable() {
        let (mut session, _audio) = CaptureSession::start(
            small_config(),
            Box::new(RawVideoEncoder::new()),
            Box::new(PcmAudioEncoder::new(256)),
            Box::new(MemorySink::new()),
        )
        .unwrap();

        let small = vec![0u8; 4 * 4 * 4];
        let bad = PixelBuffer::new(&small, 4, 4, 4, ColorOrder::Rgba).unwrap();
        assert!(session.render_frame(&bad).is_err());
        assert_eq!(session.state(), SessionState::Recording);
        assert_eq!(session.frame_count(), 0);

        let data = vec![0u8; 8 * 6 * 4];
        let good = PixelBuffer::new(&data, 8, 6, 8, ColorOrder::Rgba).unwrap();
        session.render_frame(&good).unwrap();
        assert_eq!(session.frame_count(), 1);

        let report = session.stop().unwrap();
        assert_eq!(report.stats.frames_captured, 1);
    }
}

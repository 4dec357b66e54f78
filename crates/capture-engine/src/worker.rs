//! The video encoding thread.
//!
//! ```text
//!   ┌──────────────────┐  frame   ┌──────────┐  packet?  ┌─────────┐
//!   │ WaitingForFrame  │ ───────▶ │ Encoding │ ────────▶ │ Writing │
//!   └──────────────────┘          └──────────┘           └─────────┘
//!        ▲     │ closed                                        │
//!        │     ▼                                               │
//!        │  Stopped                                            │
//!        └─────────────────────────────────────────────────────┘
//! ```
//!
//! A failed encode or write ends the worker with that error and closes the
//! frame channel, so the render thread's next tick fails too.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use screenmux_common::error::{ScreenmuxError, ScreenmuxResult};

use crate::encoder::{encode_error, EncodedPacket, StreamInfo, VideoEncoder};
use crate::handoff::{FrameReceiver, ReceivedFrame};
use crate::pipeline::StageTimer;
use crate::sink::SharedSink;

/// Observable state of the encoding worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Spawned, not yet waiting on the channel.
    Starting = 0,
    WaitingForFrame = 1,
    Encoding = 2,
    Writing = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::WaitingForFrame,
            2 => WorkerState::Encoding,
            3 => WorkerState::Writing,
            _ => WorkerState::Stopped,
        }
    }
}

/// What the worker hands back when it exits cleanly.
pub struct WorkerOutcome {
    /// The encoder, returned so it can be flushed.
    pub encoder: Box<dyn VideoEncoder>,
    pub frames_encoded: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
    /// Encode plus write, per frame.
    pub timing: StageTimer,
}

/// Handle to the running encoding thread.
pub struct EncodingWorker {
    handle: Option<JoinHandle<ScreenmuxResult<WorkerOutcome>>>,
    state: Arc<AtomicU8>,
}

impl EncodingWorker {
    /// Start the worker thread.
    pub fn spawn(
        receiver: FrameReceiver,
        encoder: Box<dyn VideoEncoder>,
        sink: SharedSink,
        stream: StreamInfo,
    ) -> ScreenmuxResult<Self> {
        let state = Arc::new(AtomicU8::new(WorkerState::Starting as u8));
        let worker = Worker {
            receiver,
            encoder,
            sink,
            stream,
            state: state.clone(),
            frames_encoded: 0,
            packets_written: 0,
            bytes_written: 0,
            timing: StageTimer::default(),
        };
        let handle = std::thread::Builder::new()
            .name("video-encoder".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                ScreenmuxError::pipeline(format!("Failed to spawn encoding thread: {e}"))
            })?;
        Ok(Self {
            handle: Some(handle),
            state,
        })
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the thread to exit. The frame channel must already be
    /// closed or the worker must have failed, otherwise this blocks.
    pub fn join(mut self) -> ScreenmuxResult<WorkerOutcome> {
        let Some(handle) = self.handle.take() else {
            return Err(ScreenmuxError::pipeline("Encoding worker already joined"));
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(ScreenmuxError::pipeline("Encoding worker panicked")),
        }
    }
}

enum Step {
    WaitingForFrame,
    Encoding(ReceivedFrame),
    Writing(Option<EncodedPacket>),
    Stopped,
}

struct Worker {
    receiver: FrameReceiver,
    encoder: Box<dyn VideoEncoder>,
    sink: SharedSink,
    stream: StreamInfo,
    state: Arc<AtomicU8>,
    frames_encoded: u64,
    packets_written: u64,
    bytes_written: u64,
    timing: StageTimer,
}

impl Worker {
    fn run(mut self) -> ScreenmuxResult<WorkerOutcome> {
        tracing::info!(encoder = %self.encoder.name(), "Encoding worker started");
        if let Err(e) = self.run_loop() {
            tracing::error!(error = %e, "Encoding worker failed; closing frame channel");
            self.set_state(WorkerState::Stopped);
            self.receiver.close();
            return Err(e);
        }
        tracing::info!(
            frames = self.frames_encoded,
            packets = self.packets_written,
            "Encoding worker stopped"
        );
        Ok(WorkerOutcome {
            encoder: self.encoder,
            frames_encoded: self.frames_encoded,
            packets_written: self.packets_written,
            bytes_written: self.bytes_written,
            timing: self.timing,
        })
    }

    fn run_loop(&mut self) -> ScreenmuxResult<()> {
        let mut step = Step::WaitingForFrame;
        let mut started = Instant::now();
        loop {
            step = match step {
                Step::WaitingForFrame => {
                    self.set_state(WorkerState::WaitingForFrame);
                    match self.receiver.recv() {
                        Some(frame) => {
                            started = Instant::now();
                            Step::Encoding(frame)
                        }
                        None => Step::Stopped,
                    }
                }
                Step::Encoding(frame) => {
                    self.set_state(WorkerState::Encoding);
                    let packet = self
                        .encoder
                        .encode(&frame)
                        .map_err(|e| encode_error(self.stream.kind, e))?;
                    self.frames_encoded += 1;
                    if let Some(packet) = &packet {
                        tracing::debug!(
                            frame = frame.index(),
                            size = packet.data.len(),
                            keyframe = packet.keyframe,
                            "Video packet"
                        );
                    }
                    // Releases the buffer back to the render thread.
                    drop(frame);
                    Step::Writing(packet)
                }
                Step::Writing(packet) => {
                    self.set_state(WorkerState::Writing);
                    if let Some(packet) = packet {
                        self.write(packet)?;
                    }
                    self.timing.record(started.elapsed());
                    Step::WaitingForFrame
                }
                Step::Stopped => {
                    self.set_state(WorkerState::Stopped);
                    return Ok(());
                }
            };
        }
    }

    fn write(&mut self, mut packet: EncodedPacket) -> ScreenmuxResult<()> {
        packet.stream_index = self.stream.index;
        self.sink.write(&packet)?;
        self.packets_written += 1;
        self.bytes_written += packet.data.len() as u64;
        Ok(())
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

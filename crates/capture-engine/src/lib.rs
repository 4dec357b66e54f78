//! Screenmux Capture Engine
//!
//! Turns a stream of captured RGBA screens plus a mono PCM audio feed into
//! time-stamped video and audio packets written to a muxed output sink.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     CaptureSession                       │
//! │                                                          │
//! │  render_frame(pixels)              audio callback        │
//! │        │                                 │               │
//! │        ▼                                 ▼               │
//! │  ┌──────────────┐                 ┌──────────────┐       │
//! │  │FrameConverter│                 │  AudioInput  │       │
//! │  │ RGBA → I420  │                 │  (SPSC ring) │       │
//! │  └──────┬───────┘                 └──────┬───────┘       │
//! │         │ frame handoff (2 slots)        │               │
//! │         ▼                                ▼               │
//! │  ┌──────────────┐                 ┌──────────────┐       │
//! │  │EncodingWorker│                 │FrameAssembler│       │
//! │  │ VideoEncoder │                 │ AudioEncoder │       │
//! │  └──────┬───────┘                 └──────┬───────┘       │
//! │         └──────────────┬─────────────────┘               │
//! │                        ▼                                 │
//! │                 SharedSink (muxer)                       │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod assembler;
pub mod convert;
pub mod encoder;
pub mod frame;
pub mod handoff;
pub mod pipeline;
pub mod ring_buffer;
pub mod session;
pub mod sink;
pub mod worker;

pub use assembler::{AudioFrame, AudioFrameAssembler};
pub use convert::FrameConverter;
pub use encoder::{
    AudioEncoder, EncodedPacket, PcmAudioEncoder, RawVideoEncoder, StreamInfo, VideoEncoder,
};
pub use frame::{PixelBuffer, YuvFrame};
pub use handoff::{frame_handoff, AcquiredFrame, FrameReceiver, FrameSender, ReceivedFrame};
pub use pipeline::{PipelineReport, PipelineStats, StageTimer};
pub use ring_buffer::{audio_ring, AudioInput, Push, RingReader};
pub use session::*;
pub use sink::{
    read_packet_file, MemoryOutput, MemorySink, OutputSink, PacketFile, PacketFileSink, SharedSink,
};
pub use worker::{EncodingWorker, WorkerOutcome, WorkerState};

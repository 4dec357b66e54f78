//! Encoder contracts consumed by the pipeline, plus two uncompressed
//! encoders used by the CLI and tests.
//!
//! Real codecs live behind these traits. An encoder may hold frames back
//! (B-frame reordering, lookahead); whatever it still holds comes out of
//! `flush` once at teardown. Any error is fatal to the session.

use serde::{Deserialize, Serialize};

use screenmux_common::clock::TimeBase;
use screenmux_common::error::{ScreenmuxError, ScreenmuxResult, StreamKind};

use crate::assembler::AudioFrame;
use crate::frame::YuvFrame;

/// Identity of one elementary stream in the muxed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub time_base: TimeBase,
}

/// One compressed unit on its way to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    /// Set by the pipeline before the packet is written.
    pub stream_index: usize,
    /// Presentation timestamp in the stream's time base.
    pub pts: i64,
    /// Independently decodable (video only; audio packets are always true).
    pub keyframe: bool,
}

impl EncodedPacket {
    pub fn new(data: Vec<u8>, pts: i64, keyframe: bool) -> Self {
        Self {
            data,
            stream_index: 0,
            pts,
            keyframe,
        }
    }
}

/// A video encoder session.
pub trait VideoEncoder: Send {
    /// Encoder name for logging.
    fn name(&self) -> &str;

    /// Encode one picture. `frame.pts()` is already in the video time base.
    fn encode(&mut self, frame: &YuvFrame) -> ScreenmuxResult<Option<EncodedPacket>>;

    /// Drain packets still held inside the encoder.
    fn flush(&mut self) -> ScreenmuxResult<Vec<EncodedPacket>> {
        Ok(Vec::new())
    }
}

/// An audio encoder session.
pub trait AudioEncoder: Send {
    /// Encoder name for logging.
    fn name(&self) -> &str;

    /// Samples the encoder expects per frame.
    fn frame_size(&self) -> usize;

    /// Encode one frame of mono float samples. `frame.pts` counts samples.
    fn encode(&mut self, frame: &AudioFrame<'_>) -> ScreenmuxResult<Option<EncodedPacket>>;

    /// Drain packets still held inside the encoder.
    fn flush(&mut self) -> ScreenmuxResult<Vec<EncodedPacket>> {
        Ok(Vec::new())
    }
}

/// Attribute an encoder failure to its stream, keeping errors that already
/// carry one.
pub(crate) fn encode_error(stream: StreamKind, err: ScreenmuxError) -> ScreenmuxError {
    match err {
        err @ ScreenmuxError::Encode { .. } => err,
        other => ScreenmuxError::encode(stream, other.to_string()),
    }
}

/// Emits every picture as packed I420; every packet is a keyframe.
#[derive(Debug, Default)]
pub struct RawVideoEncoder;

impl RawVideoEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl VideoEncoder for RawVideoEncoder {
    fn name(&self) -> &str {
        "rawvideo"
    }

    fn encode(&mut self, frame: &YuvFrame) -> ScreenmuxResult<Option<EncodedPacket>> {
        let mut data = Vec::new();
        frame.write_i420(&mut data);
        Ok(Some(EncodedPacket::new(data, frame.pts(), true)))
    }
}

/// Emits each audio frame as little-endian `f32` PCM.
#[derive(Debug)]
pub struct PcmAudioEncoder {
    frame_size: usize,
}

impl PcmAudioEncoder {
    pub fn new(frame_size: usize) -> Self {
        Self { frame_size }
    }
}

impl AudioEncoder for PcmAudioEncoder {
    fn name(&self) -> &str {
        "pcm_f32le"
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn encode(&mut self, frame: &AudioFrame<'_>) -> ScreenmuxResult<Option<EncodedPacket>> {
        if frame.samples.is_empty() {
            return Ok(None);
        }
        let data = frame
            .samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        Ok(Some(EncodedPacket::new(data, frame.pts, true)))
    }
}

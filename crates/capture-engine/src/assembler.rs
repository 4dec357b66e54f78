//! Cuts the audio ring into encoder-sized frames.

use crate::ring_buffer::RingReader;

/// One block of samples ready for the audio encoder.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub samples: &'a [f32],
    /// Samples emitted before this frame; the audio clock.
    pub pts: i64,
}

/// Drains the ring buffer one encoder frame at a time.
pub struct AudioFrameAssembler {
    reader: RingReader,
    frame_size: usize,
    scratch: Vec<f32>,
    samples_emitted: u64,
}

impl AudioFrameAssembler {
    pub fn new(reader: RingReader, frame_size: usize) -> Self {
        Self {
            reader,
            frame_size,
            scratch: vec![0.0; frame_size],
            samples_emitted: 0,
        }
    }

    /// Copy up to one frame of samples out of the ring.
    ///
    /// Never waits: with fewer samples available the frame is short, and
    /// with none it is empty.
    pub fn assemble_next(&mut self) -> AudioFrame<'_> {
        let mut written = 0;
        while written < self.frame_size {
            match self.reader.pop() {
                Some(sample) => {
                    self.scratch[written] = sample;
                    written += 1;
                }
                None => break,
            }
        }
        let pts = self.samples_emitted as i64;
        self.samples_emitted += written as u64;
        AudioFrame {
            samples: &self.scratch[..written],
            pts,
        }
    }

    /// Whether a whole frame is waiting in the ring.
    pub fn has_full_frame(&self) -> bool {
        self.frame_size > 0 && self.reader.available() >= self.frame_size
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total samples handed out so far.
    pub fn samples_emitted(&self) -> u64 {
        self.samples_emitted
    }

    pub fn reader(&self) -> &RingReader {
        &self.reader
    }
}

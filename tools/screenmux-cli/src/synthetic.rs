//! Synthetic capture sources for running the pipeline without a display
//! server or sound card.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use screenmux_capture_engine::{AudioInput, PixelBuffer};
use screenmux_common::config::ColorOrder;
use screenmux_common::error::ScreenmuxResult;

const BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 16),
    (16, 235, 235),
    (16, 235, 16),
    (235, 16, 235),
    (235, 16, 16),
    (16, 16, 235),
    (16, 16, 16),
];

/// Scrolling colour bars with a white square bouncing across them.
pub struct TestPattern {
    width: usize,
    height: usize,
    color_order: ColorOrder,
    data: Vec<u8>,
    frame: u64,
}

impl TestPattern {
    pub fn new(width: usize, height: usize, color_order: ColorOrder) -> Self {
        Self {
            width,
            height,
            color_order,
            data: vec![0; width * height * 4],
            frame: 0,
        }
    }

    /// Draw the next picture.
    pub fn advance(&mut self) {
        let shift = self.frame as usize * 4;
        let bar_width = (self.width / BARS.len()).max(1);
        let square = (self.height / 6).max(1);
        let travel = self.width.saturating_sub(square).max(1);
        let square_x = (self.frame as usize * 8) % travel;
        let square_y = self.height.saturating_sub(square) / 2;

        for y in 0..self.height {
            for x in 0..self.width {
                let in_square = (square_x..square_x + square).contains(&x)
                    && (square_y..square_y + square).contains(&y);
                let (r, g, b) = if in_square {
                    (255, 255, 255)
                } else {
                    BARS[((x + shift) / bar_width) % BARS.len()]
                };
                let px = (y * self.width + x) * 4;
                let pixel = match self.color_order {
                    ColorOrder::Rgba => [r, g, b, 255],
                    ColorOrder::Bgra => [b, g, r, 255],
                };
                self.data[px..px + 4].copy_from_slice(&pixel);
            }
        }
        self.frame += 1;
    }

    pub fn pixels(&self) -> ScreenmuxResult<PixelBuffer<'_>> {
        PixelBuffer::new(
            &self.data,
            self.width,
            self.height,
            self.width,
            self.color_order,
        )
    }
}

/// Sine tone generator producing 16-bit PCM blocks.
#[derive(Debug, Clone)]
pub struct ToneSource {
    sample_rate: u32,
    frequency: f64,
    phase: f64,
}

impl ToneSource {
    pub fn new(sample_rate: u32, frequency: f64) -> Self {
        Self {
            sample_rate,
            frequency,
            phase: 0.0,
        }
    }

    pub fn next_block(&mut self, len: usize) -> Vec<i16> {
        let step = TAU * self.frequency / self.sample_rate as f64;
        (0..len)
            .map(|_| {
                let sample = (self.phase.sin() * 0.25 * i16::MAX as f64) as i16;
                self.phase = (self.phase + step) % TAU;
                sample
            })
            .collect()
    }
}

/// Feed `input` with 10 ms tone blocks from a dedicated thread, standing in
/// for a platform audio callback, until `stop` is set.
pub fn spawn_tone(
    mut input: AudioInput,
    mut tone: ToneSource,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let block_len = (tone.sample_rate / 100).max(1) as usize;
    thread::Builder::new()
        .name("tone-source".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let block = tone.next_block(block_len);
                input.push_block(&block);
                thread::sleep(Duration::from_millis(10));
            }
            tracing::debug!(overruns = input.overruns(), "Tone source stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_moves_between_frames() {
        let mut pattern = TestPattern::new(64, 32, ColorOrder::Rgba);
        pattern.advance();
        let first = pattern.data.clone();
        pattern.advance();
        assert_ne!(first, pattern.data);
        assert!(pattern.pixels().is_ok());
    }

    #[test]
    fn test_bgra_swaps_channels() {
        let mut rgba = TestPattern::new(8, 8, ColorOrder::Rgba);
        let mut bgra = TestPattern::new(8, 8, ColorOrder::Bgra);
        rgba.advance();
        bgra.advance();
        let rgba_px = rgba.pixels().unwrap().rgb(7, 7);
        let bgra_px = bgra.pixels().unwrap().rgb(7, 7);
        assert_eq!(rgba_px, bgra_px);
    }

    #[test]
    fn test_tone_stays_in_range() {
        let mut tone = ToneSource::new(8000, 440.0);
        let block = tone.next_block(800);
        assert_eq!(block.len(), 800);
        assert!(block.iter().all(|s| s.unsigned_abs() <= i16::MAX as u16 / 4 + 1));
        assert!(block.iter().any(|&s| s != 0));
    }
}

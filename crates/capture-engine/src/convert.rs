//! RGB/BGRA to planar YUV 4:2:0 conversion.
//!
//! Runs once per capture tick on the render thread, so it does no I/O,
//! takes no locks and allocates nothing. Luma is written for every
//! converted pixel; chroma only at even output coordinates, using that
//! pixel's colour (no averaging).
//!
//! Padding is a border inside the output frame that conversion never
//! touches: source pixel `(0, 0)` lands at output `(padding_width,
//! padding_height)` and the border keeps whatever the frame held before
//! (black for a freshly allocated frame).

use screenmux_common::config::Rotation;
use screenmux_common::error::{ScreenmuxError, ScreenmuxResult};

use crate::frame::{PixelBuffer, YuvFrame};

/// BT.601 integer approximation, studio swing.
#[inline(always)]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8
}

#[inline(always)]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8
}

#[inline(always)]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8
}

/// Converts captured frames into fixed-size YUV frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameConverter {
    width: usize,
    height: usize,
    padding_width: usize,
    padding_height: usize,
    rotation: Rotation,
}

impl FrameConverter {
    /// `width` and `height` are the output frame size.
    pub fn new(
        width: usize,
        height: usize,
        padding_width: usize,
        padding_height: usize,
        rotation: Rotation,
    ) -> ScreenmuxResult<Self> {
        if width == 0 || height == 0 {
            return Err(ScreenmuxError::config(format!(
                "Invalid output size {width}x{height}"
            )));
        }
        if 2 * padding_width >= width || 2 * padding_height >= height {
            return Err(ScreenmuxError::config(format!(
                "Padding {padding_width}x{padding_height} leaves no picture in a {width}x{height} frame"
            )));
        }
        Ok(Self {
            width,
            height,
            padding_width,
            padding_height,
            rotation,
        })
    }

    pub fn output_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Minimum `(width, height)` a captured buffer must have.
    pub fn source_size(&self) -> (usize, usize) {
        let inner_w = self.width - 2 * self.padding_width;
        let inner_h = self.height - 2 * self.padding_height;
        if self.rotation.swaps_axes() {
            (inner_h, inner_w)
        } else {
            (inner_w, inner_h)
        }
    }

    /// Fill `dst` from `src` in place.
    pub fn convert(&self, src: &PixelBuffer<'_>, dst: &mut YuvFrame) -> ScreenmuxResult<()> {
        if (dst.width(), dst.height()) != (self.width, self.height) {
            return Err(ScreenmuxError::convert(format!(
                "Destination is {}x{}, converter produces {}x{}",
                dst.width(),
                dst.height(),
                self.width,
                self.height
            )));
        }
        let (need_w, need_h) = self.source_size();
        if src.width() < need_w || src.height() < need_h {
            return Err(ScreenmuxError::convert(format!(
                "Source is {}x{}, need at least {need_w}x{need_h}",
                src.width(),
                src.height()
            )));
        }

        let x_end = self.width - self.padding_width;
        let y_end = self.height - self.padding_height;
        let (pw, ph) = (self.padding_width, self.padding_height);

        // Map output (x, y) to source (row, col).
        match self.rotation {
            Rotation::None => self.fill(src, dst, |x, y| (y - ph, x - pw)),
            Rotation::CounterClockwise90 => self.fill(src, dst, |x, y| (x - pw, y_end - 1 - y)),
            Rotation::Clockwise90 => self.fill(src, dst, |x, y| (x_end - 1 - x, y - ph)),
        }
        Ok(())
    }

    #[inline(always)]
    fn fill<F>(&self, src: &PixelBuffer<'_>, dst: &mut YuvFrame, source_of: F)
    where
        F: Fn(usize, usize) -> (usize, usize),
    {
        let [y_stride, u_stride, v_stride] = dst.strides();
        let (y_plane, u_plane, v_plane) = dst.planes_mut();

        for y in self.padding_height..self.height - self.padding_height {
            let y_row = &mut y_plane[y * y_stride..(y + 1) * y_stride];
            let chroma_row = y % 2 == 0;
            for x in self.padding_width..self.width - self.padding_width {
                let (row, col) = source_of(x, y);
                let (r, g, b) = src.rgb(row, col);
                let (r, g, b) = (r as i32, g as i32, b as i32);
                y_row[x] = luma(r, g, b);
                if chroma_row && x % 2 == 0 {
                    u_plane[(y / 2) * u_stride + x / 2] = chroma_u(r, g, b);
                    v_plane[(y / 2) * v_stride + x / 2] = chroma_v(r, g, b);
                }
            }
        }
    }
}

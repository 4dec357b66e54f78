//! Captured pixel buffers and the planar YUV 4:2:0 frames they convert into.

use screenmux_common::config::ColorOrder;
use screenmux_common::error::{ScreenmuxError, ScreenmuxResult};

/// Every captured pixel occupies four bytes (RGBX or BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// Plane rows are padded to a multiple of this many bytes.
const PLANE_ALIGN: usize = 32;

const BLACK_Y: u8 = 16;
const NEUTRAL_CHROMA: u8 = 128;

/// A borrowed, read-only view of one captured frame.
///
/// It is only valid for the duration of one conversion call; the capture
/// source keeps ownership of the bytes.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    /// Row stride in pixels.
    stride: usize,
    color_order: ColorOrder,
}

impl<'a> PixelBuffer<'a> {
    /// Wrap captured bytes. `stride` is the row pitch in pixels and must be
    /// at least `width`.
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
        color_order: ColorOrder,
    ) -> ScreenmuxResult<Self> {
        if width == 0 || height == 0 {
            return Err(ScreenmuxError::capture(format!(
                "Empty pixel buffer {width}x{height}"
            )));
        }
        if stride < width {
            return Err(ScreenmuxError::capture(format!(
                "Pixel buffer stride {stride} is narrower than its width {width}"
            )));
        }
        let required = ((height - 1) * stride + width) * BYTES_PER_PIXEL;
        if data.len() < required {
            return Err(ScreenmuxError::capture(format!(
                "Pixel buffer holds {} bytes, {width}x{height} at stride {stride} needs {required}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            color_order,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `(r, g, b)` of the pixel at `row`, `col`.
    #[inline(always)]
    pub fn rgb(&self, row: usize, col: usize) -> (u8, u8, u8) {
        let idx = (row * self.stride + col) * BYTES_PER_PIXEL;
        let px = &self.data[idx..idx + 3];
        match self.color_order {
            ColorOrder::Rgba => (px[0], px[1], px[2]),
            ColorOrder::Bgra => (px[2], px[1], px[0]),
        }
    }
}

/// One planar YUV 4:2:0 picture.
///
/// A pipeline allocates exactly two of these and reuses them for the whole
/// session; `slot` identifies which of the pair this is.
#[derive(Debug, Clone)]
pub struct YuvFrame {
    width: usize,
    height: usize,
    planes: [Vec<u8>; 3],
    strides: [usize; 3],
    pts: i64,
    index: u64,
    slot: usize,
}

impl YuvFrame {
    /// Allocate a black frame.
    pub fn new(width: usize, height: usize, slot: usize) -> Self {
        let chroma_w = width.div_ceil(2);
        let chroma_h = height.div_ceil(2);
        let luma_stride = align_up(width);
        let chroma_stride = align_up(chroma_w);
        Self {
            width,
            height,
            planes: [
                vec![BLACK_Y; luma_stride * height],
                vec![NEUTRAL_CHROMA; chroma_stride * chroma_h],
                vec![NEUTRAL_CHROMA; chroma_stride * chroma_h],
            ],
            strides: [luma_stride, chroma_stride, chroma_stride],
            pts: 0,
            index: 0,
            slot,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn chroma_width(&self) -> usize {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> usize {
        self.height.div_ceil(2)
    }

    /// Row strides in bytes for Y, U and V.
    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    pub fn y(&self) -> &[u8] {
        &self.planes[0]
    }

    pub fn u(&self) -> &[u8] {
        &self.planes[1]
    }

    pub fn v(&self) -> &[u8] {
        &self.planes[2]
    }

    /// Mutable access to all three planes at once.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let [y, u, v] = &mut self.planes;
        (y.as_mut_slice(), u.as_mut_slice(), v.as_mut_slice())
    }

    pub fn luma_at(&self, x: usize, y: usize) -> u8 {
        self.planes[0][y * self.strides[0] + x]
    }

    /// U sample at chroma-plane coordinates.
    pub fn u_at(&self, cx: usize, cy: usize) -> u8 {
        self.planes[1][cy * self.strides[1] + cx]
    }

    /// V sample at chroma-plane coordinates.
    pub fn v_at(&self, cx: usize, cy: usize) -> u8 {
        self.planes[2][cy * self.strides[2] + cx]
    }

    /// Presentation timestamp in the video stream's time base.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    /// Capture index of the picture currently held.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    /// Which buffer of the double-buffered pair this is (0 or 1).
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Copy the visible picture into `out` as tightly packed I420.
    pub fn write_i420(&self, out: &mut Vec<u8>) {
        out.reserve(self.width * self.height + 2 * self.chroma_width() * self.chroma_height());
        for row in self.planes[0].chunks(self.strides[0]).take(self.height) {
            out.extend_from_slice(&row[..self.width]);
        }
        for plane in 1..3 {
            for row in self.planes[plane]
                .chunks(self.strides[plane])
                .take(self.chroma_height())
            {
                out.extend_from_slice(&row[..self.chroma_width()]);
            }
        }
    }
}

fn align_up(n: usize) -> usize {
    n.div_ceil(PLANE_ALIGN) * PLANE_ALIGN
}

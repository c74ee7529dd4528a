//! Pixel buffers and per-display frames.
//!
//! A [`PixelBuffer`] is a rectangle of RGBA pixels stored row-major: the
//! four bytes of pixel `(x, y)` start at offset `(y * width + x) * 4`.
//! A [`Frame`] is what a mode renders: one buffer per logical display, keyed
//! by display id.

use std::collections::HashMap;

use thiserror::Error;

use super::display::{DisplayId, Resolution};
use super::layout::Layout;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// An RGBA colour.
pub type Rgba = [u8; 4];

/// Errors raised when constructing pixel buffers.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("pixel data is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A row-major RGBA image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    resolution: Resolution,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a buffer of fully transparent black pixels.
    pub fn new(resolution: Resolution) -> Self {
        Self::filled(resolution, [0, 0, 0, 0])
    }

    /// Creates a buffer where every pixel is `color`.
    pub fn filled(resolution: Resolution, color: Rgba) -> Self {
        let data = color
            .iter()
            .copied()
            .cycle()
            .take(resolution.pixel_count() * BYTES_PER_PIXEL)
            .collect();
        Self { resolution, data }
    }

    /// Wraps existing RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::SizeMismatch`] unless `data.len()` is exactly
    /// `width * height * 4`.
    pub fn from_rgba(resolution: Resolution, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = resolution.pixel_count() * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width: resolution.width(),
                height: resolution.height(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { resolution, data })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width()
    }

    pub fn height(&self) -> u32 {
        self.resolution.height()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some((y as usize * self.width() as usize + x as usize) * BYTES_PER_PIXEL)
    }

    /// Reads pixel `(x, y)`, or `None` if out of range.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let o = self.offset(x, y)?;
        Some([self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]])
    }

    /// Writes pixel `(x, y)`.  Returns `false` if out of range.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba) -> bool {
        match self.offset(x, y) {
            Some(o) => {
                self.data[o..o + BYTES_PER_PIXEL].copy_from_slice(&color);
                true
            }
            None => false,
        }
    }

    /// Sets every pixel to `color`.
    pub fn fill(&mut self, color: Rgba) {
        for px in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&color);
        }
    }

    /// Copies out the `resolution`-sized rectangle whose top-left corner is
    /// `(x, y)`.  Parts of the rectangle outside this buffer are left
    /// transparent black.
    pub fn crop(&self, x: u32, y: u32, resolution: Resolution) -> PixelBuffer {
        let mut out = PixelBuffer::new(resolution);
        if x >= self.width() || y >= self.height() {
            return out;
        }

        let copy_w = resolution.width().min(self.width() - x) as usize * BYTES_PER_PIXEL;
        let rows = resolution.height().min(self.height() - y);
        let src_stride = self.width() as usize * BYTES_PER_PIXEL;
        let dst_stride = resolution.width() as usize * BYTES_PER_PIXEL;

        for row in 0..rows as usize {
            let src = (y as usize + row) * src_stride + x as usize * BYTES_PER_PIXEL;
            let dst = row * dst_stride;
            out.data[dst..dst + copy_w].copy_from_slice(&self.data[src..src + copy_w]);
        }
        out
    }

    /// Each row as packed RGB bytes with alpha dropped.
    pub fn rgb_rows(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.data
            .chunks_exact(self.width() as usize * BYTES_PER_PIXEL)
            .map(|row| {
                row.chunks_exact(BYTES_PER_PIXEL)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect()
            })
    }
}

/// The output of one render: a buffer per display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    buffers: HashMap<DisplayId, PixelBuffer>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slices a whole-layout canvas into one buffer per display.
    ///
    /// The canvas is in layout space, so each display's buffer is the crop at
    /// its position with its resolution.
    pub fn from_canvas(canvas: &PixelBuffer, layout: &Layout) -> Self {
        let buffers = layout
            .iter()
            .map(|p| {
                (
                    p.display.id.clone(),
                    canvas.crop(p.position.x, p.position.y, p.display.resolution),
                )
            })
            .collect();
        Self { buffers }
    }

    pub fn insert(&mut self, id: DisplayId, buffer: PixelBuffer) {
        self.buffers.insert(id, buffer);
    }

    pub fn get(&self, id: &DisplayId) -> Option<&PixelBuffer> {
        self.buffers.get(id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DisplayId, &PixelBuffer)> {
        self.buffers.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Software frame buffer
//!
//! Panels that cannot draw on their own (paged OLEDs, e-paper, packed depths)
//! render into a [`FrameBuffer`] owned by the [`Display`](crate::Display).
//!
//! ## Layouts
//!
//! - [`Layout::Paged`] - one byte covers eight vertically stacked pixels,
//!   LSB at the top. Byte index is `x + (y / 8) * width`.
//! - [`Layout::Horizontal`] - rows back to back, pixels packed MSB first.
//!   Bit offset is `(y * width + x) * bpp`.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

use crate::color::to_rgb666;
use crate::rotation::Rotation;

/// Byte arrangement of a [`FrameBuffer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Vertical bytes in pages of eight rows
    Paged,
    /// Row-major, most significant bit first
    Horizontal,
}

/// Pixel storage at 1, 2, 4 or 8 bpp
///
/// Coordinates passed to [`set`](Self::set) and [`get`](Self::get) are
/// physical. The drawing helpers take logical coordinates and a
/// [`Rotation`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u16,
    height: u16,
    bpp: u8,
    layout: Layout,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer for a `width` x `height` panel
    ///
    /// # Errors
    ///
    /// Returns the allocator error when the memory is not available.
    pub fn try_new(
        width: u16,
        height: u16,
        bpp: u8,
        layout: Layout,
    ) -> Result<Self, TryReserveError> {
        let len = match layout {
            Layout::Paged => usize::from(width) * usize::from(height).div_ceil(8),
            Layout::Horizontal => {
                (usize::from(width) * usize::from(height) * usize::from(bpp)).div_ceil(8)
            }
        };
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self {
            width,
            height,
            bpp,
            layout,
            data,
        })
    }

    /// Physical width
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Physical height
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Bits per pixel
    pub fn bpp(&self) -> u8 {
        self.bpp
    }

    /// Byte arrangement
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, mutable
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One page of a paged buffer, `width` bytes
    pub fn page(&self, page: usize) -> Option<&[u8]> {
        if self.layout != Layout::Paged {
            return None;
        }
        let width = usize::from(self.width);
        self.data.get(page * width..(page + 1) * width)
    }

    /// Pixel level stored for an RGB565 color at this depth
    ///
    /// At 1 bpp any non-zero color is set. Deeper buffers keep the top bits
    /// of the color's luma.
    pub fn level(&self, color: u16) -> u8 {
        if self.bpp == 1 {
            return u8::from(color != 0);
        }
        let [r, g, b] = to_rgb666(color);
        let luma = (u16::from(r) * 77 + u16::from(g) * 150 + u16::from(b) * 29) >> 8;
        (luma as u8) >> (8 - self.bpp.min(8))
    }

    fn locate(&self, x: u16, y: u16) -> Option<(usize, u8)> {
        if x >= self.width || y >= self.height || !matches!(self.bpp, 1 | 2 | 4 | 8) {
            return None;
        }
        match self.layout {
            Layout::Paged => {
                let index = usize::from(x) + usize::from(y / 8) * usize::from(self.width);
                Some((index, (y & 7) as u8))
            }
            Layout::Horizontal => {
                let bit = (usize::from(y) * usize::from(self.width) + usize::from(x))
                    * usize::from(self.bpp);
                let shift = 8 - self.bpp - (bit % 8) as u8;
                Some((bit / 8, shift))
            }
        }
    }

    /// Store `level` at physical `(x, y)`, ignoring coordinates outside the buffer
    pub fn set(&mut self, x: u16, y: u16, level: u8) {
        let Some((index, shift)) = self.locate(x, y) else {
            return;
        };
        let mask = match self.layout {
            Layout::Paged => 1,
            Layout::Horizontal => ((1u16 << self.bpp) - 1) as u8,
        };
        if let Some(byte) = self.data.get_mut(index) {
            *byte = (*byte & !(mask << shift)) | ((level & mask) << shift);
        }
    }

    /// Level stored at physical `(x, y)`
    pub fn get(&self, x: u16, y: u16) -> Option<u8> {
        let (index, shift) = self.locate(x, y)?;
        let mask = match self.layout {
            Layout::Paged => 1,
            Layout::Horizontal => ((1u16 << self.bpp) - 1) as u8,
        };
        self.data.get(index).map(|byte| (byte >> shift) & mask)
    }

    /// Draw one pixel at logical coordinates
    ///
    /// Pixels outside the rotated panel are clipped. With `invert` set the
    /// stored level is complemented.
    pub fn draw_pixel(&mut self, x: i32, y: i32, color: u16, rotation: Rotation, invert: bool) {
        let (width, height) = rotation.logical_size(self.width, self.height);
        if x < 0 || y < 0 || x >= i32::from(width) || y >= i32::from(height) {
            return;
        }
        let (px, py) = rotation.to_physical(x as u16, y as u16, self.width, self.height);
        let mut level = self.level(color);
        if invert {
            level = !level;
        }
        self.set(px, py, level);
    }

    /// Fill a logical `(x, y, w, h)` rectangle, clipped to the panel
    pub fn fill_rect(
        &mut self,
        (x, y, w, h): (i32, i32, i32, i32),
        color: u16,
        rotation: Rotation,
        invert: bool,
    ) {
        let (width, height) = rotation.logical_size(self.width, self.height);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(w).min(i32::from(width));
        let y1 = y.saturating_add(h).min(i32::from(height));
        for py in y0..y1 {
            for px in x0..x1 {
                self.draw_pixel(px, py, color, rotation, invert);
            }
        }
    }

    /// Set every pixel to `color`
    pub fn fill(&mut self, color: u16, invert: bool) {
        let mut level = self.level(color);
        if invert {
            level = !level;
        }
        if self.bpp == 1 {
            self.data.fill(if level & 1 != 0 { 0xFF } else { 0x00 });
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                self.set(x, y, level);
            }
        }
    }

    /// Complement every bit
    pub fn invert(&mut self) {
        for byte in &mut self.data {
            *byte = !*byte;
        }
    }
}

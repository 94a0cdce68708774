//! Coordinate rotation utilities
//!
//! This module maps logical (rotated) pixel coordinates to the physical
//! orientation of the panel. It is shared by the software frame buffer and
//! the timing-generator panels, which both rotate in software.
//!
//! ## Rotation Modes
//!
//! - **Rotate0**: Native orientation
//! - **Rotate90**: 90° clockwise, width and height swapped
//! - **Rotate180**: 180° rotation, origin at bottom-right
//! - **Rotate270**: 270° clockwise (or 90° counter-clockwise)
//!
//! ## Example
//!
//! ```
//! use panelkit::Rotation;
//!
//! // Indexes wrap around
//! assert_eq!(Rotation::from_index(5), Rotation::Rotate90);
//!
//! // A 128x64 panel turned 90 degrees is 64 wide
//! assert_eq!(Rotation::Rotate90.logical_size(128, 64), (64, 128));
//!
//! // Logical origin lands in the top-right corner of the panel
//! assert_eq!(Rotation::Rotate90.to_physical(0, 0, 128, 64), (127, 0));
//! ```

/// Display rotation relative to native orientation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    /// No rotation
    #[default]
    Rotate0,
    /// Rotate 90 degrees clockwise
    Rotate90,
    /// Rotate 180 degrees
    Rotate180,
    /// Rotate 270 degrees clockwise
    Rotate270,
}

impl Rotation {
    /// Rotation for an index, taken modulo 4
    pub const fn from_index(index: u8) -> Self {
        match index & 3 {
            0 => Self::Rotate0,
            1 => Self::Rotate90,
            2 => Self::Rotate180,
            _ => Self::Rotate270,
        }
    }

    /// Index 0..=3 of this rotation
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Whether width and height trade places
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }

    /// Logical (width, height) for a panel of physical `width` x `height`
    pub const fn logical_size(self, width: u16, height: u16) -> (u16, u16) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map logical `(x, y)` to physical coordinates
    ///
    /// `width` and `height` are the physical panel size. Coordinates must
    /// already be clipped to the logical size.
    pub const fn to_physical(self, x: u16, y: u16, width: u16, height: u16) -> (u16, u16) {
        match self {
            Self::Rotate0 => (x, y),
            Self::Rotate90 => (width - 1 - y, x),
            Self::Rotate180 => (width - 1 - x, height - 1 - y),
            Self::Rotate270 => (y, height - 1 - x),
        }
    }
}

//! Color conversion helpers
//!
//! All drawing APIs take RGB565 colors. Panels convert them to what their
//! controller expects:
//!
//! - 18 bpp controllers take three bytes, one per channel ([`to_rgb666`])
//! - 1 bpp panels threshold the color to a single bit ([`to_mono`])
//!
//! The splash screen colors in a descriptor are indexes into [`PALETTE`].
//!
//! ## Example
//!
//! ```
//! use panelkit::color::{from_rgb666, to_rgb666};
//!
//! let yellow = 0xFFE0;
//! assert_eq!(to_rgb666(yellow), [0xFF, 0xFF, 0x00]);
//! assert_eq!(from_rgb666(to_rgb666(yellow)), yellow);
//! ```

/// Black (0x0000)
pub const BLACK: u16 = 0x0000;
/// White (0xFFFF)
pub const WHITE: u16 = 0xFFFF;
/// Red (0xF800)
pub const RED: u16 = 0xF800;
/// Green (0x07E0)
pub const GREEN: u16 = 0x07E0;
/// Blue (0x001F)
pub const BLUE: u16 = 0x001F;
/// Cyan (0x07FF)
pub const CYAN: u16 = 0x07FF;
/// Magenta (0xF81F)
pub const MAGENTA: u16 = 0xF81F;
/// Yellow (0xFFE0)
pub const YELLOW: u16 = 0xFFE0;
/// Navy (0x000F)
pub const NAVY: u16 = 0x000F;
/// Dark green (0x03E0)
pub const DARK_GREEN: u16 = 0x03E0;
/// Dark cyan (0x03EF)
pub const DARK_CYAN: u16 = 0x03EF;
/// Maroon (0x7800)
pub const MAROON: u16 = 0x7800;
/// Purple (0x780F)
pub const PURPLE: u16 = 0x780F;
/// Olive (0x7BE0)
pub const OLIVE: u16 = 0x7BE0;
/// Light grey (0xC618)
pub const LIGHT_GREY: u16 = 0xC618;
/// Dark grey (0x7BEF)
pub const DARK_GREY: u16 = 0x7BEF;
/// Orange (0xFD20)
pub const ORANGE: u16 = 0xFD20;
/// Green-yellow (0xAFE5)
pub const GREEN_YELLOW: u16 = 0xAFE5;
/// Pink (0xFC18)
pub const PINK: u16 = 0xFC18;

/// Indexed colors available to descriptor splash settings
pub const PALETTE: [u16; 19] = [
    BLACK,
    WHITE,
    RED,
    GREEN,
    BLUE,
    CYAN,
    MAGENTA,
    YELLOW,
    NAVY,
    DARK_GREEN,
    DARK_CYAN,
    MAROON,
    PURPLE,
    OLIVE,
    LIGHT_GREY,
    DARK_GREY,
    ORANGE,
    GREEN_YELLOW,
    PINK,
];

/// Bits that decide whether a color is "on" for a 1 bpp panel
///
/// One bit from the top of each channel.
pub const MONO_MASK: u16 = 0x8410;

/// [`MONO_MASK`] for byte-swapped RGB565 input
pub const MONO_MASK_SWAPPED: u16 = 0x1084;

/// Look up a palette color, out-of-range indexes give black
pub fn palette(index: usize) -> u16 {
    PALETTE.get(index).copied().unwrap_or(BLACK)
}

/// Expand an RGB565 color to three 8-bit channels
///
/// Each channel is rescaled linearly to 0..=255; 18 bpp controllers latch the
/// top six bits of each byte.
pub const fn to_rgb666(color: u16) -> [u8; 3] {
    let r = (color >> 11) & 0x1F;
    let g = (color >> 5) & 0x3F;
    let b = color & 0x1F;
    [
        (r as u32 * 255 / 31) as u8,
        (g as u32 * 255 / 63) as u8,
        (b as u32 * 255 / 31) as u8,
    ]
}

/// Reduce three 8-bit channels back to RGB565, rounding to nearest
pub const fn from_rgb666(rgb: [u8; 3]) -> u16 {
    let r = (rgb[0] as u32 * 31 + 127) / 255;
    let g = (rgb[1] as u32 * 63 + 127) / 255;
    let b = (rgb[2] as u32 * 31 + 127) / 255;
    ((r << 11) | (g << 5) | b) as u16
}

/// Threshold a color to a single bit
///
/// `swapped` selects the mask for byte-swapped input, `invert` flips the
/// result for panels with reversed polarity.
pub const fn to_mono(color: u16, swapped: bool, invert: bool) -> bool {
    let mask = if swapped { MONO_MASK_SWAPPED } else { MONO_MASK };
    (color & mask != 0) != invert
}

#[cfg(feature = "graphics")]
mod graphics {
    use embedded_graphics_core::pixelcolor::{Rgb565, raw::RawU16};
    use embedded_graphics_core::prelude::RawData;

    /// Raw RGB565 value of an embedded-graphics color
    pub fn raw(color: Rgb565) -> u16 {
        RawU16::from(color).into_inner()
    }
}

#[cfg(feature = "graphics")]
pub use graphics::raw;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb666_scaling() {
        assert_eq!(to_rgb666(WHITE), [0xFF, 0xFF, 0xFF]);
        assert_eq!(to_rgb666(BLACK), [0, 0, 0]);
        assert_eq!(to_rgb666(RED), [0xFF, 0, 0]);
        // 16/31 of full scale
        assert_eq!(to_rgb666(0x8000)[0], 131);
    }

    #[test]
    fn test_rgb666_round_trip_is_exact() {
        for color in [0x0000, 0x0821, 0x7BEF, 0xAFE5, 0xFC18, 0xFFFF, 0x1234] {
            assert_eq!(from_rgb666(to_rgb666(color)), color);
        }
    }

    #[test]
    fn test_mono_threshold() {
        assert!(to_mono(WHITE, false, false));
        assert!(!to_mono(BLACK, false, false));
        assert!(to_mono(BLACK, false, true));
        // dark grey has no top bits set
        assert!(!to_mono(0x4208, false, false));
        // 0x8000 byte-swapped
        assert!(to_mono(0x0080, true, false));
        assert!(!to_mono(0x0080, false, false));
    }

    #[test]
    fn test_palette_lookup() {
        assert_eq!(palette(0), BLACK);
        assert_eq!(palette(7), YELLOW);
        assert_eq!(palette(18), PINK);
        assert_eq!(palette(19), BLACK);
    }
}

//! Panel backends
//!
//! A [`Panel`] knows how one family of controllers is driven. The
//! [`Display`](crate::Display) owns exactly one, boxed, and offers it every
//! drawing call first. A panel answers:
//!
//! - `Ok(true)` - handled
//! - `Ok(false)` - declined, the display falls back to its frame buffer
//! - `Err(_)` - the transport failed
//!
//! | Panel | Interfaces |
//! |---|---|
//! | [`AddressedPanel`] | SPI, 8/16-bit parallel |
//! | [`PagedPanel`] | I2C page-addressed OLEDs |
//! | [`TimingPanel`] | RGB and DSI through a vendor driver |
//! | [`EpaperPanel`] | SPI e-paper |

use embedded_hal::delay::DelayNs;

use crate::command::{SET_HIGHER_COLUMN, SET_LOWER_COLUMN, SET_PAGE_START};
use crate::config::DeviceConfig;
use crate::error::Error;
use crate::framebuffer::FrameBuffer;
use crate::interface::{DisplayInterface, InterfaceResult, selected, transaction};
use crate::rotation::Rotation;

mod addressed;
mod epaper;
mod paged;
mod timing;

pub use addressed::AddressedPanel;
pub use epaper::EpaperPanel;
pub use paged::PagedPanel;
pub use timing::TimingPanel;

/// Result of a panel operation, `Ok(false)` when declined
pub type PanelResult<I> = Result<bool, Error<I>>;

/// Which backend a panel is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelKind {
    /// Controller with address-window commands
    Addressed,
    /// Page-addressed monochrome controller
    Paged,
    /// Continuously refreshed panel behind a vendor driver
    Timing,
    /// E-paper controller with a refresh state machine
    Epaper,
}

/// Resources a panel borrows from its [`Display`](crate::Display) for one call
pub struct PanelContext<'a, I, D> {
    /// Transport
    pub interface: &'a mut I,
    /// Delay provider
    pub delay: &'a mut D,
    /// Software frame buffer, when one was allocated
    pub framebuffer: Option<&'a mut FrameBuffer>,
    /// Current rotation
    pub rotation: Rotation,
}

/// A display controller backend
///
/// Everything except [`kind`](Self::kind) and [`init`](Self::init) declines
/// by default.
pub trait Panel<I: DisplayInterface, D: DelayNs> {
    /// Backend family
    fn kind(&self) -> PanelKind;

    /// Bring the controller up after reset
    ///
    /// # Errors
    ///
    /// Returns an error if the transport or vendor driver fails.
    fn init(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        config: &DeviceConfig,
    ) -> Result<(), Error<I>>;

    /// Draw one RGB565 pixel at logical coordinates
    fn draw_pixel(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _x: i32,
        _y: i32,
        _color: u16,
    ) -> PanelResult<I> {
        Ok(false)
    }

    /// Fill a logical rectangle
    fn fill_rect(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _x: i32,
        _y: i32,
        _w: i32,
        _h: i32,
        _color: u16,
    ) -> PanelResult<I> {
        Ok(false)
    }

    /// Horizontal line of `w` pixels
    fn draw_fast_hline(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x: i32,
        y: i32,
        w: i32,
        color: u16,
    ) -> PanelResult<I> {
        self.fill_rect(ctx, x, y, w, 1, color)
    }

    /// Vertical line of `h` pixels
    fn draw_fast_vline(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x: i32,
        y: i32,
        h: i32,
        color: u16,
    ) -> PanelResult<I> {
        self.fill_rect(ctx, x, y, 1, h, color)
    }

    /// Select the inclusive window for following pushes
    ///
    /// An all-zero window is the end-of-frame signal.
    fn set_addr_window(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _x0: u16,
        _y0: u16,
        _x1: u16,
        _y1: u16,
    ) -> PanelResult<I> {
        Ok(false)
    }

    /// Stream RGB565 pixels into the current window
    ///
    /// With `first` set the window is programmed before the data.
    fn push_colors(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _data: &[u16],
        _first: bool,
    ) -> PanelResult<I> {
        Ok(false)
    }

    /// Switch the panel on or off
    fn display_on_off(&mut self, _ctx: &mut PanelContext<'_, I, D>, _on: bool) -> PanelResult<I> {
        Ok(false)
    }

    /// Enable or disable color inversion
    fn invert_display(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _invert: bool,
    ) -> PanelResult<I> {
        Ok(false)
    }

    /// Apply a new rotation
    ///
    /// `ctx.rotation` still holds the previous one.
    fn set_rotation(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _rotation: Rotation,
    ) -> PanelResult<I> {
        Ok(false)
    }

    /// Push buffered content to the glass
    fn update_frame(&mut self, _ctx: &mut PanelContext<'_, I, D>) -> PanelResult<I> {
        Ok(false)
    }

    /// Set the backlight or contrast level
    fn set_brightness(&mut self, _ctx: &mut PanelContext<'_, I, D>, _level: u8) -> PanelResult<I> {
        Ok(false)
    }

    /// E-paper refresh state, `None` for other panels
    fn refresh_state(&self) -> Option<crate::refresh::RefreshState> {
        None
    }

    /// Downcast to the e-paper backend
    fn epaper(&mut self) -> Option<&mut EpaperPanel> {
        None
    }
}

/// Clip a logical rectangle to a `width` x `height` area
///
/// Returns the visible part as `(x, y, w, h)`, or `None` when nothing is left.
pub(crate) fn clip(
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    width: u16,
    height: u16,
) -> Option<(u16, u16, u16, u16)> {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = x.saturating_add(w).min(i32::from(width));
    let y1 = y.saturating_add(h).min(i32::from(height));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u16, y0 as u16, (x1 - x0) as u16, (y1 - y0) as u16))
}

/// Run `op` with chip select asserted inside a transaction
pub(crate) fn bus<I: DisplayInterface, T>(
    interface: &mut I,
    op: impl FnOnce(&mut I) -> InterfaceResult<T, I::Error>,
) -> Result<T, Error<I>> {
    transaction(interface, |interface| {
        selected(interface, op).map_err(Error::Interface)
    })
}

/// Write a paged frame buffer out one page at a time
///
/// Each page is addressed with `0xB0 + page + row_offset` and the two column
/// nibbles, then sent in `width / 8` byte chunks.
pub(crate) fn write_pages<I: DisplayInterface>(
    interface: &mut I,
    framebuffer: &FrameBuffer,
    row_offset: u8,
    column: u8,
) -> InterfaceResult<(), I::Error> {
    let chunk = usize::from(framebuffer.width() / 8).max(1);
    for page in 0..usize::from(framebuffer.height() / 8) {
        interface.write_command(SET_PAGE_START.wrapping_add(page as u8).wrapping_add(row_offset))?;
        interface.write_command(SET_LOWER_COLUMN | (column & 0x0F))?;
        interface.write_command(SET_HIGHER_COLUMN | (column >> 4))?;
        for bytes in framebuffer.page(page).unwrap_or(&[]).chunks(chunk) {
            interface.write_data(bytes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::Layout;
    use crate::sim::{Event, RecordingInterface};

    #[test]
    fn test_clip() {
        assert_eq!(clip(-5, -5, 10, 10, 100, 100), Some((0, 0, 5, 5)));
        assert_eq!(clip(95, 0, 10, 1, 100, 100), Some((95, 0, 5, 1)));
        assert_eq!(clip(100, 0, 10, 1, 100, 100), None);
        assert_eq!(clip(0, 0, 0, 10, 100, 100), None);
        assert_eq!(clip(0, 0, -3, 10, 100, 100), None);
    }

    #[test]
    fn test_bus_releases_on_error() {
        let mut interface = RecordingInterface::new().fail_after(1);
        let result = bus(&mut interface, |i| {
            i.write_command(0x01)?;
            i.write_command(0x02)
        });
        assert!(matches!(result, Err(Error::Interface(_))));
        assert!(interface.is_idle());
        assert_eq!(interface.events().last(), Some(&Event::End));
    }

    #[test]
    fn test_write_pages_addresses_each_page() {
        let mut fb = FrameBuffer::try_new(16, 16, 1, Layout::Paged).unwrap();
        fb.set(0, 8, 1);
        let mut interface = RecordingInterface::new();
        write_pages(&mut interface, &fb, 0, 0x12).unwrap();

        assert_eq!(interface.commands(), [0xB0, 0x02, 0x11, 0xB1, 0x02, 0x11]);
        let writes: alloc::vec::Vec<_> = interface
            .events()
            .iter()
            .filter_map(|event| match event {
                Event::Data(bytes) => Some(bytes.len()),
                _ => None,
            })
            .collect();
        assert_eq!(writes, [2; 16]);
        assert_eq!(interface.data()[16], 0x01);
    }
}

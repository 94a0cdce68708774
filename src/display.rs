//! Drawing facade
//!
//! [`Display`] owns the transport, the delay, the parsed configuration, one
//! boxed [`Panel`] and the optional software frame buffer. Every drawing call
//! is offered to the panel first; when it declines, the frame buffer takes
//! it, and without a frame buffer the call is a no-op.
//!
//! ```
//! use panelkit::sim::{RecordingDelay, RecordingInterface};
//! use panelkit::{Rotation, construct, descriptor};
//!
//! let config = descriptor::parse(":H,SSD1306,128,64,1,I2C,3c,5,4,-1\n").config;
//! let mut display = construct(config, RecordingInterface::new(), RecordingDelay::new()).unwrap();
//!
//! display.set_rotation(Rotation::Rotate90).unwrap();
//! assert_eq!((display.width(), display.height()), (64, 128));
//!
//! display.draw_pixel(0, 0, 0xFFFF).unwrap();
//! assert_eq!(display.framebuffer().and_then(|fb| fb.get(127, 0)), Some(1));
//! ```

use alloc::boxed::Box;

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::color::to_mono;
use crate::config::DeviceConfig;
use crate::error::Error;
use crate::framebuffer::FrameBuffer;
use crate::interface::DisplayInterface;
use crate::panel::{Panel, PanelContext, PanelKind};
use crate::refresh::{RefreshMode, RefreshState};
use crate::rotation::Rotation;

type DisplayResult<I> = core::result::Result<(), Error<I>>;

/// Pixels byte-swapped per panel call
const SWAP_CHUNK: usize = 64;

/// Push window as seen by the facade, with a write cursor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PushWindow {
    x0: u16,
    y0: u16,
    x1: u16,
    y1: u16,
    x: u16,
    y: u32,
    fresh: bool,
}

/// A display brought up by the [factory](crate::factory)
pub struct Display<I, D>
where
    I: DisplayInterface,
    D: DelayNs,
{
    interface: I,
    delay: D,
    config: DeviceConfig,
    panel: Box<dyn Panel<I, D>>,
    framebuffer: Option<FrameBuffer>,
    rotation: Rotation,
    window: PushWindow,
}

impl<I, D> Display<I, D>
where
    I: DisplayInterface,
    D: DelayNs,
{
    pub(crate) fn new(
        interface: I,
        delay: D,
        config: DeviceConfig,
        panel: Box<dyn Panel<I, D>>,
        framebuffer: Option<FrameBuffer>,
    ) -> Self {
        Self {
            interface,
            delay,
            config,
            panel,
            framebuffer,
            rotation: Rotation::Rotate0,
            window: PushWindow::default(),
        }
    }

    pub(crate) fn init_panel(&mut self) -> DisplayResult<I> {
        let mut ctx = PanelContext {
            interface: &mut self.interface,
            delay: &mut self.delay,
            framebuffer: self.framebuffer.as_mut(),
            rotation: self.rotation,
        };
        self.panel.init(&mut ctx, &self.config)
    }

    fn dispatch<T>(
        &mut self,
        op: impl FnOnce(&mut dyn Panel<I, D>, &mut PanelContext<'_, I, D>) -> Result<T, Error<I>>,
    ) -> Result<T, Error<I>> {
        let mut ctx = PanelContext {
            interface: &mut self.interface,
            delay: &mut self.delay,
            framebuffer: self.framebuffer.as_mut(),
            rotation: self.rotation,
        };
        op(&mut *self.panel, &mut ctx)
    }

    /// Logical width for the current rotation
    pub fn width(&self) -> u16 {
        self.rotation
            .logical_size(self.config.width, self.config.height)
            .0
    }

    /// Logical height for the current rotation
    pub fn height(&self) -> u16 {
        self.rotation
            .logical_size(self.config.width, self.config.height)
            .1
    }

    /// Current rotation
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Parsed device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Software frame buffer, if one was allocated
    pub fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.framebuffer.as_ref()
    }

    /// Transport
    pub fn interface(&self) -> &I {
        &self.interface
    }

    /// Transport, mutable
    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    /// Backend family driving this display
    pub fn panel_kind(&self) -> PanelKind {
        self.panel.kind()
    }

    /// E-paper refresh state, `None` for other panels
    pub fn refresh_state(&self) -> Option<RefreshState> {
        self.panel.refresh_state()
    }

    /// Tear the driver down and hand back the transport and delay
    pub fn release(self) -> (I, D) {
        (self.interface, self.delay)
    }

    /// Draw one RGB565 pixel
    pub fn draw_pixel(&mut self, x: i32, y: i32, color: u16) -> DisplayResult<I> {
        if self.dispatch(|panel, ctx| panel.draw_pixel(ctx, x, y, color))? {
            return Ok(());
        }
        if let Some(framebuffer) = self.framebuffer.as_mut() {
            framebuffer.draw_pixel(x, y, color, self.rotation, false);
        }
        Ok(())
    }

    /// Fill a rectangle, clipped to the panel
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u16) -> DisplayResult<I> {
        if self.dispatch(|panel, ctx| panel.fill_rect(ctx, x, y, w, h, color))? {
            return Ok(());
        }
        self.fill_software(x, y, w, h, color);
        Ok(())
    }

    /// Horizontal line of `w` pixels
    pub fn draw_fast_hline(&mut self, x: i32, y: i32, w: i32, color: u16) -> DisplayResult<I> {
        if self.dispatch(|panel, ctx| panel.draw_fast_hline(ctx, x, y, w, color))? {
            return Ok(());
        }
        self.fill_software(x, y, w, 1, color);
        Ok(())
    }

    /// Vertical line of `h` pixels
    pub fn draw_fast_vline(&mut self, x: i32, y: i32, h: i32, color: u16) -> DisplayResult<I> {
        if self.dispatch(|panel, ctx| panel.draw_fast_vline(ctx, x, y, h, color))? {
            return Ok(());
        }
        self.fill_software(x, y, 1, h, color);
        Ok(())
    }

    /// Fill the whole panel
    pub fn fill_screen(&mut self, color: u16) -> DisplayResult<I> {
        let (width, height) = (self.width(), self.height());
        self.fill_rect(0, 0, i32::from(width), i32::from(height), color)
    }

    fn fill_software(&mut self, x: i32, y: i32, w: i32, h: i32, color: u16) {
        if let Some(framebuffer) = self.framebuffer.as_mut() {
            framebuffer.fill_rect((x, y, w, h), color, self.rotation, false);
        }
    }

    /// Select the inclusive window for [`push_colors`](Self::push_colors)
    ///
    /// An all-zero window finishes the frame and waits for any bulk transfer.
    pub fn set_addr_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> DisplayResult<I> {
        self.window = PushWindow {
            x0,
            y0,
            x1,
            y1,
            x: x0,
            y: u32::from(y0),
            fresh: (x0, y0, x1, y1) != (0, 0, 0, 0),
        };
        self.dispatch(|panel, ctx| panel.set_addr_window(ctx, x0, y0, x1, y1))?;
        Ok(())
    }

    /// Stream RGB565 pixels into the current window
    ///
    /// `not_swapped` is false when the words arrive byte-swapped; the
    /// device's swap hint inverts it. Packed-depth panels get the pixels
    /// thresholded to mono and drawn row by row until `data` runs out.
    pub fn push_colors(&mut self, data: &[u16], not_swapped: bool) -> DisplayResult<I> {
        if data.is_empty() {
            return Ok(());
        }
        let swapped = not_swapped == self.config.transfer.swap_color;
        let first = core::mem::replace(&mut self.window.fresh, false);

        let handled = if swapped {
            let mut chunk = [0u16; SWAP_CHUNK];
            let mut handled = true;
            for (n, part) in data.chunks(SWAP_CHUNK).enumerate() {
                for (out, color) in chunk.iter_mut().zip(part) {
                    *out = color.swap_bytes();
                }
                let pixels = &chunk[..part.len()];
                let start = first && n == 0;
                if !self.dispatch(|panel, ctx| panel.push_colors(ctx, pixels, start))? {
                    handled = false;
                    break;
                }
            }
            handled
        } else {
            self.dispatch(|panel, ctx| panel.push_colors(ctx, data, first))?
        };

        if handled || self.config.bpp() >= 16 {
            return Ok(());
        }
        self.push_mono(data, swapped)
    }

    fn push_mono(&mut self, data: &[u16], swapped: bool) -> DisplayResult<I> {
        let invert = self.config.transfer.invert_bw;
        let window = self.window;
        if window.x1 < window.x0 {
            return Ok(());
        }
        let (mut x, mut y) = (window.x, window.y);
        for &color in data {
            if y > u32::from(window.y1) {
                break;
            }
            let on = to_mono(color, swapped, invert);
            self.draw_pixel(i32::from(x), y as i32, if on { 0xFFFF } else { 0 })?;
            if x >= window.x1 {
                x = window.x0;
                y += 1;
            } else {
                x += 1;
            }
        }
        self.window.x = x;
        self.window.y = y;
        Ok(())
    }

    /// Rotate the logical coordinate system
    ///
    /// The rotation is kept even when the panel has no memory-access command.
    pub fn set_rotation(&mut self, rotation: Rotation) -> DisplayResult<I> {
        let handled = self.dispatch(|panel, ctx| panel.set_rotation(ctx, rotation))?;
        trace!("rotation {:?}, handled by panel: {}", rotation, handled);
        self.rotation = rotation;
        Ok(())
    }

    /// Enable or disable color inversion
    pub fn invert_display(&mut self, invert: bool) -> DisplayResult<I> {
        self.dispatch(|panel, ctx| panel.invert_display(ctx, invert))?;
        Ok(())
    }

    /// Switch the panel on or off
    pub fn display_on_off(&mut self, on: bool) -> DisplayResult<I> {
        self.dispatch(|panel, ctx| panel.display_on_off(ctx, on))?;
        Ok(())
    }

    /// Push buffered content to the glass
    pub fn update_frame(&mut self) -> DisplayResult<I> {
        self.dispatch(|panel, ctx| panel.update_frame(ctx))?;
        Ok(())
    }

    /// Set backlight or contrast
    pub fn set_brightness(&mut self, level: u8) -> DisplayResult<I> {
        self.dispatch(|panel, ctx| panel.set_brightness(ctx, level))?;
        Ok(())
    }

    /// Apply `rotation`, clear inversion and show the splash background
    pub fn init_display(&mut self, rotation: Rotation) -> DisplayResult<I> {
        self.set_rotation(rotation)?;
        self.invert_display(false)?;
        if let Some(splash) = &self.config.splash {
            let background = splash.background_color(self.config.bpp());
            self.fill_screen(background)?;
            self.update_frame()?;
        }
        Ok(())
    }

    /// Enter a full or partial e-paper refresh
    ///
    /// Returns `Ok(false)` for panels that are not e-paper.
    pub fn refresh(&mut self, mode: RefreshMode) -> Result<bool, Error<I>> {
        self.dispatch(|panel, ctx| match panel.epaper() {
            Some(epaper) => epaper.refresh(ctx, mode).map(|()| true),
            None => Ok(false),
        })
    }
}

//! embedded-graphics support
//!
//! [`Display`] implements [`DrawTarget`] with [`Rgb565`] colors. Whatever the
//! panel depth, primitives are drawn in RGB565 and reduced by the panel or the
//! frame buffer. Solid fills become one [`Display::fill_rect`]; contiguous
//! fills inside the panel stream through the address window.
//!
//! ```
//! use embedded_graphics::pixelcolor::Rgb565;
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
//! use panelkit::sim::{RecordingDelay, RecordingInterface};
//! use panelkit::{construct, descriptor};
//!
//! let config = descriptor::parse(":H,SSD1306,128,64,1,I2C,3c,5,4,-1\n").config;
//! let mut display = construct(config, RecordingInterface::new(), RecordingDelay::new()).unwrap();
//!
//! Rectangle::new(Point::new(2, 2), Size::new(4, 4))
//!     .into_styled(PrimitiveStyle::with_fill(Rgb565::WHITE))
//!     .draw(&mut display)
//!     .unwrap();
//! assert_eq!(display.framebuffer().and_then(|fb| fb.get(3, 3)), Some(1));
//! ```

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{Dimensions, OriginDimensions, Point, Size},
    pixelcolor::Rgb565,
    primitives::{PointsIter, Rectangle},
};
use embedded_hal::delay::DelayNs;

use crate::color::raw;
use crate::display::Display;
use crate::error::Error;
use crate::interface::DisplayInterface;

/// Colors buffered per [`Display::push_colors`] call
const PUSH_CHUNK: usize = 64;

impl<I, D> DrawTarget for Display<I, D>
where
    I: DisplayInterface,
    D: DelayNs,
{
    type Color = Rgb565;
    type Error = Error<I>;

    fn draw_iter<P>(&mut self, pixels: P) -> Result<(), Self::Error>
    where
        P: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            self.draw_pixel(x, y, raw(color))?;
        }
        Ok(())
    }

    fn fill_contiguous<C>(&mut self, area: &Rectangle, colors: C) -> Result<(), Self::Error>
    where
        C: IntoIterator<Item = Self::Color>,
    {
        let visible = area.intersection(&self.bounding_box());
        if visible != *area {
            return self.draw_iter(
                area.points()
                    .zip(colors)
                    .filter(|(point, _)| visible.contains(*point))
                    .map(|(point, color)| Pixel(point, color)),
            );
        }
        let Some(end) = area.bottom_right() else {
            return Ok(());
        };

        self.set_addr_window(
            area.top_left.x as u16,
            area.top_left.y as u16,
            end.x as u16,
            end.y as u16,
        )?;
        let count = area.size.width as usize * area.size.height as usize;
        let mut chunk = [0u16; PUSH_CHUNK];
        let mut filled = 0;
        for color in colors.into_iter().take(count) {
            chunk[filled] = raw(color);
            filled += 1;
            if filled == PUSH_CHUNK {
                self.push_colors(&chunk, true)?;
                filled = 0;
            }
        }
        if filled > 0 {
            self.push_colors(&chunk[..filled], true)?;
        }
        self.set_addr_window(0, 0, 0, 0)
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_rect(
            area.top_left.x,
            area.top_left.y,
            area.size.width.min(i32::MAX as u32) as i32,
            area.size.height.min(i32::MAX as u32) as i32,
            raw(color),
        )
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_screen(raw(color))
    }
}

impl<I, D> OriginDimensions for Display<I, D>
where
    I: DisplayInterface,
    D: DelayNs,
{
    fn size(&self) -> Size {
        Size::new(u32::from(self.width()), u32::from(self.height()))
    }
}

//! Page-addressed monochrome controllers on I2C
//!
//! These controllers take no pixel commands the crate could use, so every
//! drawing call is declined and lands in the paged frame buffer.
//! [`update_frame`](Panel::update_frame) then copies the buffer out page by
//! page.

use embedded_hal::delay::DelayNs;

use crate::config::{DeviceConfig, PageWindow};
use crate::error::Error;
use crate::interface::{DisplayInterface, transaction};
use crate::interpreter::run_commands;
use crate::panel::{Panel, PanelContext, PanelKind, PanelResult, write_pages};

/// Paged OLED backend
#[derive(Clone, Debug, Default)]
pub struct PagedPanel {
    set_x: u8,
    set_y: u8,
    pages: PageWindow,
    display_on: Option<u8>,
    display_off: Option<u8>,
    invert_on: Option<u8>,
    invert_off: Option<u8>,
    dim: Option<u8>,
}

impl PagedPanel {
    /// Panel for `config`
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            set_x: config.address.set_x,
            set_y: config.address.set_y,
            pages: config.pages,
            display_on: config.display_on,
            display_off: config.display_off,
            invert_on: config.invert_on,
            invert_off: config.invert_off,
            dim: config.dim_opcode,
        }
    }
}

fn send<I: DisplayInterface>(interface: &mut I, commands: &[u8]) -> PanelResult<I> {
    run_commands(interface, commands)?;
    Ok(true)
}

impl<I: DisplayInterface, D: DelayNs> Panel<I, D> for PagedPanel {
    fn kind(&self) -> PanelKind {
        PanelKind::Paged
    }

    fn init(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        config: &DeviceConfig,
    ) -> Result<(), Error<I>> {
        run_commands(ctx.interface, config.init_commands())
    }

    fn display_on_off(&mut self, ctx: &mut PanelContext<'_, I, D>, on: bool) -> PanelResult<I> {
        match if on { self.display_on } else { self.display_off } {
            Some(command) => send(ctx.interface, &[command]),
            None => Ok(false),
        }
    }

    fn invert_display(&mut self, ctx: &mut PanelContext<'_, I, D>, invert: bool) -> PanelResult<I> {
        match if invert { self.invert_on } else { self.invert_off } {
            Some(command) => send(ctx.interface, &[command]),
            None => Ok(false),
        }
    }

    fn set_brightness(&mut self, ctx: &mut PanelContext<'_, I, D>, level: u8) -> PanelResult<I> {
        match self.dim {
            Some(command) => send(ctx.interface, &[command, level]),
            None => Ok(false),
        }
    }

    fn update_frame(&mut self, ctx: &mut PanelContext<'_, I, D>) -> PanelResult<I> {
        let Some(framebuffer) = ctx.framebuffer.as_deref() else {
            return Ok(false);
        };
        let header = [self.set_x, self.pages.page_start, self.pages.page_end];
        let (row, column) = (self.set_y, self.pages.col_start);
        transaction(ctx.interface, |i| {
            for &command in &header {
                i.write_command(command).map_err(Error::Interface)?;
            }
            write_pages(i, framebuffer, row, column).map_err(Error::Interface)
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use crate::framebuffer::{FrameBuffer, Layout};
    use crate::rotation::Rotation;
    use crate::sim::{Event, RecordingDelay, RecordingInterface};

    const OLED: &str = ":H,SH1106,128,64,1,I2C,3c,5,4,-1\n\
         :S,0,1,1,0,40,20\n\
         :I\nAE\nD5,80\nA8,3F\n8D,14\nAF\n\
         :o,AE\n:O,AF\n\
         :A,00,00,07,00,02,83\n\
         :i,A6,A7\n\
         :D,81\n";

    fn parts() -> (PagedPanel, DeviceConfig) {
        let config = descriptor::parse(OLED).config;
        (PagedPanel::new(&config), config)
    }

    #[test]
    fn test_init_sends_raw_commands() {
        let (mut panel, config) = parts();
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut ctx = PanelContext {
            interface: &mut interface,
            delay: &mut delay,
            framebuffer: None,
            rotation: Rotation::Rotate0,
        };
        panel.init(&mut ctx, &config).unwrap();
        assert_eq!(interface.commands().len(), 8);
        assert_eq!(interface.commands()[..3], [0xAE, 0xD5, 0x80]);
        assert!(interface.data().is_empty());
    }

    #[test]
    fn test_update_frame_pages() {
        let (mut panel, _) = parts();
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut framebuffer = FrameBuffer::try_new(128, 64, 1, Layout::Paged).unwrap();
        framebuffer.set(5, 9, 1);
        let mut ctx = PanelContext {
            interface: &mut interface,
            delay: &mut delay,
            framebuffer: Some(&mut framebuffer),
            rotation: Rotation::Rotate0,
        };
        assert!(Panel::update_frame(&mut panel, &mut ctx).unwrap());

        let commands = interface.commands();
        assert_eq!(commands[..6], [0x00, 0x00, 0x07, 0xB0, 0x02, 0x10]);
        assert_eq!(commands[6..9], [0xB1, 0x02, 0x10]);
        assert_eq!(commands.len(), 3 + 8 * 3);

        let writes = interface.count(|event| matches!(event, Event::Data(bytes) if bytes.len() == 16));
        assert_eq!(writes, 64);
        assert_eq!(interface.data()[128 + 5], 0b0000_0010);
    }

    #[test]
    fn test_drawing_is_declined() {
        let (mut panel, _) = parts();
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut ctx = PanelContext {
            interface: &mut interface,
            delay: &mut delay,
            framebuffer: None,
            rotation: Rotation::Rotate0,
        };
        assert!(!Panel::draw_pixel(&mut panel, &mut ctx, 0, 0, 1).unwrap());
        assert!(!Panel::fill_rect(&mut panel, &mut ctx, 0, 0, 4, 4, 1).unwrap());
        assert!(!Panel::update_frame(&mut panel, &mut ctx).unwrap());
        assert!(interface.events().is_empty());
    }

    #[test]
    fn test_control_commands() {
        let (mut panel, _) = parts();
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut ctx = PanelContext {
            interface: &mut interface,
            delay: &mut delay,
            framebuffer: None,
            rotation: Rotation::Rotate0,
        };
        Panel::display_on_off(&mut panel, &mut ctx, false).unwrap();
        Panel::invert_display(&mut panel, &mut ctx, true).unwrap();
        Panel::set_brightness(&mut panel, &mut ctx, 0x40).unwrap();
        assert_eq!(interface.commands(), [0xAE, 0xA7, 0x81, 0x40]);
    }
}

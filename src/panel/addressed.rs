//! Controllers with address-window commands (SPI and parallel TFTs)
//!
//! Pixels at 16 and 18 bpp are written straight to controller RAM: program
//! a window, then stream colors into it. Packed depths decline and go
//! through the frame buffer; at 1 bpp [`update_frame`](Panel::update_frame)
//! flushes it page by page.

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::color::to_rgb666;
use crate::config::{AddressCommands, AddressMode, DeviceConfig, PageWindow, RotationEntry};
use crate::error::Error;
use crate::framebuffer::Layout;
use crate::interface::{DisplayInterface, InterfaceResult};
use crate::interpreter::Interpreter;
use crate::panel::{Panel, PanelContext, PanelKind, PanelResult, bus, clip, write_pages};
use crate::rotation::Rotation;

/// Memory access value that leaves the controller untouched
const NO_ROTATION_VALUE: u8 = 0xFF;

/// An inclusive window in logical coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Window {
    x0: u16,
    y0: u16,
    x1: u16,
    y1: u16,
}

/// SPI and parallel TFT backend
#[derive(Clone, Debug)]
pub struct AddressedPanel {
    width: u16,
    height: u16,
    bpp: u8,
    color_mode: u8,
    all_commands: bool,
    address: AddressCommands,
    pages: PageWindow,
    rotations: [RotationEntry; 4],
    memory_access: Option<u8>,
    start_line: u8,
    display_on: Option<u8>,
    display_off: Option<u8>,
    invert_on: Option<u8>,
    invert_off: Option<u8>,
    dim: Option<u8>,
    use_dma: bool,
    dma_pending: bool,
    window: Window,
}

impl AddressedPanel {
    /// Panel for `config`
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            bpp: config.bpp(),
            color_mode: config.color_mode,
            all_commands: config.all_commands,
            address: config.address,
            pages: config.pages,
            rotations: config.rotations,
            memory_access: config.memory_access,
            start_line: config.start_line,
            display_on: config.display_on,
            display_off: config.display_off,
            invert_on: config.invert_on,
            invert_off: config.invert_off,
            dim: config.dim_opcode,
            use_dma: config.transfer.use_dma,
            dma_pending: false,
            window: Window::default(),
        }
    }

    /// Whether pixels go straight to controller RAM
    fn direct<I, D>(&self, ctx: &PanelContext<'_, I, D>) -> bool {
        self.bpp >= 16 && ctx.framebuffer.is_none()
    }

    /// Send window commands for `window` under `rotation`
    fn program<I: DisplayInterface>(
        &mut self,
        interface: &mut I,
        rotation: Rotation,
        window: Window,
    ) -> InterfaceResult<(), I::Error> {
        if self.dma_pending {
            interface.wait_transfer()?;
            self.dma_pending = false;
        }
        let entry = self.rotations[usize::from(rotation.index())];
        let mut x = (
            window.x0.wrapping_add(entry.x_offset),
            window.x1.wrapping_add(entry.x_offset),
        );
        let mut y = (
            window.y0.wrapping_add(entry.y_offset),
            window.y1.wrapping_add(entry.y_offset),
        );
        trace!("window x {:?} y {:?}", x, y);

        match self.address.mode {
            AddressMode::Word => {
                interface.write_command(self.address.set_x)?;
                interface.write_data32(u32::from(x.0) << 16 | u32::from(x.1))?;
                interface.write_command(self.address.set_y)?;
                interface.write_data32(u32::from(y.0) << 16 | u32::from(y.1))?;
            }
            AddressMode::Byte => {
                if rotation.swaps_axes() {
                    core::mem::swap(&mut x, &mut y);
                }
                interface.write_command(self.address.set_x)?;
                self.coordinate(interface, x.0)?;
                self.coordinate(interface, x.1)?;
                interface.write_command(self.address.set_y)?;
                self.coordinate(interface, y.0)?;
                self.coordinate(interface, y.1)?;
            }
        }
        if let Some(command) = self.address.write_ram {
            interface.write_command(command)?;
        }
        Ok(())
    }

    fn coordinate<I: DisplayInterface>(
        &self,
        interface: &mut I,
        value: u16,
    ) -> InterfaceResult<(), I::Error> {
        if self.all_commands {
            interface.write_data8(value as u8)
        } else {
            interface.write_command(value as u8)
        }
    }

    /// Write `count` pixels of `color`
    fn repeat<I: DisplayInterface>(
        &self,
        interface: &mut I,
        color: u16,
        count: usize,
    ) -> InterfaceResult<(), I::Error> {
        if self.color_mode == 18 {
            let [r, g, b] = to_rgb666(color);
            for _ in 0..count {
                interface.write_data8(r)?;
                interface.write_data8(g)?;
                interface.write_data8(b)?;
            }
        } else {
            for _ in 0..count {
                interface.write_data16(color)?;
            }
        }
        Ok(())
    }

    fn command<I: DisplayInterface>(interface: &mut I, command: Option<u8>) -> PanelResult<I> {
        match command {
            Some(command) => {
                bus(interface, |i| i.write_command(command))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<I: DisplayInterface, D: DelayNs> Panel<I, D> for AddressedPanel {
    fn kind(&self) -> PanelKind {
        PanelKind::Addressed
    }

    fn init(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        config: &DeviceConfig,
    ) -> Result<(), Error<I>> {
        Interpreter::new()
            .all_commands(config.all_commands)
            .run(ctx.interface, ctx.delay, config.init_commands(), None)?;
        Ok(())
    }

    fn draw_pixel(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x: i32,
        y: i32,
        color: u16,
    ) -> PanelResult<I> {
        self.fill_rect(ctx, x, y, 1, 1, color)
    }

    fn fill_rect(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        color: u16,
    ) -> PanelResult<I> {
        if !self.direct(ctx) {
            return Ok(false);
        }
        let (width, height) = ctx.rotation.logical_size(self.width, self.height);
        let Some((x, y, w, h)) = clip(x, y, w, h, width, height) else {
            return Ok(true);
        };
        let window = Window {
            x0: x,
            y0: y,
            x1: x + w - 1,
            y1: y + h - 1,
        };
        let rotation = ctx.rotation;
        bus(ctx.interface, |i| {
            self.program(i, rotation, window)?;
            self.repeat(i, color, usize::from(w) * usize::from(h))
        })?;
        Ok(true)
    }

    fn set_addr_window(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
    ) -> PanelResult<I> {
        if (x0, y0, x1, y1) == (0, 0, 0, 0) {
            if self.dma_pending {
                ctx.interface.wait_transfer().map_err(Error::Interface)?;
                self.dma_pending = false;
            }
            return Ok(true);
        }
        self.window = Window { x0, y0, x1, y1 };
        Ok(true)
    }

    fn push_colors(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        data: &[u16],
        first: bool,
    ) -> PanelResult<I> {
        if !self.direct(ctx) {
            return Ok(false);
        }
        let rotation = ctx.rotation;
        let window = self.window;
        let dma = self.use_dma && self.color_mode != 18;
        bus(ctx.interface, |i| {
            if first {
                self.program(i, rotation, window)?;
            }
            if dma {
                i.write_pixels(data)
            } else if self.color_mode == 18 {
                data.iter().try_for_each(|&color| self.repeat(i, color, 1))
            } else {
                data.iter().try_for_each(|&color| i.write_data16(color))
            }
        })?;
        if dma {
            self.dma_pending = true;
        }
        Ok(true)
    }

    fn display_on_off(&mut self, ctx: &mut PanelContext<'_, I, D>, on: bool) -> PanelResult<I> {
        Self::command(ctx.interface, if on { self.display_on } else { self.display_off })
    }

    fn invert_display(&mut self, ctx: &mut PanelContext<'_, I, D>, invert: bool) -> PanelResult<I> {
        Self::command(ctx.interface, if invert { self.invert_on } else { self.invert_off })
    }

    fn set_rotation(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        rotation: Rotation,
    ) -> PanelResult<I> {
        let value = self.rotations[usize::from(rotation.index())].value;
        let Some(command) = self.memory_access.filter(|_| value != NO_ROTATION_VALUE) else {
            return Ok(false);
        };
        let start_line = (self.address.mode == AddressMode::Byte && !self.all_commands).then(|| {
            let line = if rotation.index() < 2 { self.height as u8 } else { 0 };
            (self.start_line, line)
        });
        let all_commands = self.all_commands;
        bus(ctx.interface, |i| {
            i.write_command(command)?;
            if all_commands {
                i.write_command(value)?;
            } else {
                i.write_data8(value)?;
            }
            if let Some((command, line)) = start_line {
                i.write_command(command)?;
                i.write_data8(line)?;
            }
            Ok(())
        })?;
        Ok(true)
    }

    fn update_frame(&mut self, ctx: &mut PanelContext<'_, I, D>) -> PanelResult<I> {
        let Some(framebuffer) = ctx.framebuffer.as_deref() else {
            return Ok(false);
        };
        if self.bpp != 1 || framebuffer.layout() != Layout::Paged {
            return Ok(false);
        }
        let (row, column) = (self.address.set_y, self.pages.col_start);
        bus(ctx.interface, |i| write_pages(i, framebuffer, row, column))?;
        Ok(true)
    }

    fn set_brightness(&mut self, ctx: &mut PanelContext<'_, I, D>, level: u8) -> PanelResult<I> {
        let Some(command) = self.dim else {
            return Ok(false);
        };
        bus(ctx.interface, |i| {
            i.write_command(command)?;
            i.write_data8(level)
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use crate::framebuffer::FrameBuffer;
    use crate::sim::{Event, RecordingDelay, RecordingInterface};

    const WORD: &str = ":H,ILI9341,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n\
         :I\n01,A0\n11,80\n29,80\n\
         :A,2A,2B,2C,16\n\
         :R,36,37\n\
         :0,48,00,00,0\n\
         :1,28,00,00,1\n\
         :O,29\n:o,28\n\
         :D,51\n";

    const BYTE: &str = ":H,ST7735,128,160,16,SPI,1,5,18,23,16,4,17,-1,40\n\
         :A,2A,2B,2C,8\n\
         :R,36,37\n\
         :0,C0,00,00,0\n\
         :1,60,02,03,1\n";

    struct Rig {
        interface: RecordingInterface,
        delay: RecordingDelay,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                interface: RecordingInterface::new(),
                delay: RecordingDelay::new(),
            }
        }

        fn ctx(&mut self, rotation: Rotation) -> PanelContext<'_, RecordingInterface, RecordingDelay> {
            PanelContext {
                interface: &mut self.interface,
                delay: &mut self.delay,
                framebuffer: None,
                rotation,
            }
        }
    }

    fn panel(text: &str) -> (AddressedPanel, DeviceConfig) {
        let config = descriptor::parse(text).config;
        (AddressedPanel::new(&config), config)
    }

    #[test]
    fn test_init_runs_table() {
        let (mut panel, config) = panel(WORD);
        let mut rig = Rig::new();
        panel.init(&mut rig.ctx(Rotation::Rotate0), &config).unwrap();
        assert_eq!(rig.interface.commands(), [0x01, 0x11, 0x29]);
        assert_eq!(rig.delay.calls_ms(), [10, 150, 150]);
    }

    #[test]
    fn test_word_window_pixel() {
        let (mut panel, _) = panel(WORD);
        let mut rig = Rig::new();
        assert!(Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate0), 10, 20, 0xF800).unwrap());
        assert_eq!(
            rig.interface.events(),
            [
                Event::Begin,
                Event::CsLow,
                Event::Command(0x2A),
                Event::Data32(0x000A_000A),
                Event::Command(0x2B),
                Event::Data32(0x0014_0014),
                Event::Command(0x2C),
                Event::Data16(0xF800),
                Event::CsHigh,
                Event::End,
            ]
        );
    }

    #[test]
    fn test_fill_rect_clips_to_rotated_size() {
        let (mut panel, _) = panel(WORD);
        let mut rig = Rig::new();
        // 320 wide when rotated
        Panel::fill_rect(&mut panel, &mut rig.ctx(Rotation::Rotate90), 300, 230, 40, 40, 0x001F)
            .unwrap();
        assert!(rig.interface.events().contains(&Event::Data32(300 << 16 | 319)));
        assert!(rig.interface.events().contains(&Event::Data32(230 << 16 | 239)));
        assert_eq!(rig.interface.count(|e| matches!(e, Event::Data16(0x001F))), 200);

        rig.interface.clear();
        Panel::fill_rect(&mut panel, &mut rig.ctx(Rotation::Rotate0), 240, 0, 10, 10, 0x001F)
            .unwrap();
        assert!(rig.interface.events().is_empty());
    }

    #[test]
    fn test_byte_window_swaps_and_offsets() {
        let (mut panel, _) = panel(BYTE);
        let mut rig = Rig::new();
        Panel::fill_rect(&mut panel, &mut rig.ctx(Rotation::Rotate90), 0, 0, 2, 1, 0x07E0).unwrap();
        assert_eq!(
            rig.interface.commands(),
            [0x2A, 0x03, 0x03, 0x2B, 0x02, 0x03, 0x2C]
        );
        assert_eq!(rig.interface.count(|e| matches!(e, Event::Data16(0x07E0))), 2);
    }

    #[test]
    fn test_rotation_commands() {
        let (mut panel, _) = panel(BYTE);
        let mut rig = Rig::new();
        assert!(Panel::set_rotation(&mut panel, &mut rig.ctx(Rotation::Rotate0), Rotation::Rotate90).unwrap());
        assert_eq!(rig.interface.commands(), [0x36, 0x37]);
        assert_eq!(rig.interface.data(), [0x60, 0xA0]);

        // Word addressing sends no start line
        let (mut panel, _) = self::panel(WORD);
        let mut rig = Rig::new();
        Panel::set_rotation(&mut panel, &mut rig.ctx(Rotation::Rotate0), Rotation::Rotate180).unwrap();
        assert_eq!(rig.interface.commands(), [0x36]);
        assert_eq!(rig.interface.data(), [0x00]);
    }

    #[test]
    fn test_rotation_declined_without_memory_access() {
        let (mut panel, _) = panel(":H,X,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n");
        let mut rig = Rig::new();
        let handled = Panel::set_rotation(&mut panel, &mut rig.ctx(Rotation::Rotate0), Rotation::Rotate90).unwrap();
        assert!(!handled);
        assert!(rig.interface.events().is_empty());
    }

    #[test]
    fn test_eighteen_bit_pixels() {
        let (mut panel, _) = panel(":H,X,240,320,18,SPI,1,5,18,23,16,4,17,-1,40\n:A,2A,2B,2C,16\n:P,18\n");
        let mut rig = Rig::new();
        Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate0), 0, 0, 0xFFFF).unwrap();
        let data = rig.interface.data();
        assert_eq!(data[data.len() - 3..], [0xFF, 0xFF, 0xFF]);
        assert_eq!(rig.interface.count(|e| matches!(e, Event::Data8(_))), 3);
    }

    #[test]
    fn test_push_with_dma_waits_before_next_window() {
        let (mut panel, _) = panel(":H,X,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n:A,2A,2B,2C,16\n:B,40,1\n");
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx(Rotation::Rotate0);
        Panel::set_addr_window(&mut panel, ctx, 0, 0, 1, 0).unwrap();
        Panel::push_colors(&mut panel, ctx, &[0x1234, 0x5678], true).unwrap();
        Panel::set_addr_window(&mut panel, ctx, 0, 0, 0, 0).unwrap();

        let events = rig.interface.events();
        assert!(events.contains(&Event::Pixels(alloc::vec![0x1234, 0x5678])));
        assert_eq!(events.last(), Some(&Event::WaitTransfer));
    }

    #[test]
    fn test_push_streams_into_window() {
        let (mut panel, _) = panel(WORD);
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx(Rotation::Rotate0);
        Panel::set_addr_window(&mut panel, ctx, 5, 5, 6, 6).unwrap();
        Panel::push_colors(&mut panel, ctx, &[1, 2], true).unwrap();
        Panel::push_colors(&mut panel, ctx, &[3, 4], false).unwrap();

        assert_eq!(rig.interface.commands(), [0x2A, 0x2B, 0x2C]);
        assert_eq!(rig.interface.count(|e| matches!(e, Event::Data16(_))), 4);
    }

    #[test]
    fn test_packed_depth_declines() {
        let (mut panel, _) = panel(":H,X,128,64,1,SPI,1,5,18,23,16,4,17,-1,40\n:A,00,10,40,00,02\n");
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut framebuffer = FrameBuffer::try_new(128, 64, 1, Layout::Paged).unwrap();
        let mut ctx = PanelContext {
            interface: &mut interface,
            delay: &mut delay,
            framebuffer: Some(&mut framebuffer),
            rotation: Rotation::Rotate0,
        };
        assert!(!Panel::draw_pixel(&mut panel, &mut ctx, 0, 0, 1).unwrap());
        assert!(!Panel::push_colors(&mut panel, &mut ctx, &[1], true).unwrap());
        assert!(Panel::update_frame(&mut panel, &mut ctx).unwrap());
        assert_eq!(interface.count(|e| matches!(e, Event::Command(0xB0..=0xB7))), 8);
    }

    #[test]
    fn test_control_opcodes() {
        let (mut panel, _) = panel(WORD);
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx(Rotation::Rotate0);
        assert!(Panel::display_on_off(&mut panel, ctx, true).unwrap());
        assert!(!Panel::invert_display(&mut panel, ctx, true).unwrap());
        assert!(Panel::set_brightness(&mut panel, ctx, 0x80).unwrap());
        assert_eq!(rig.interface.commands(), [0x29, 0x51]);
        assert_eq!(rig.interface.data(), [0x80]);
    }
}

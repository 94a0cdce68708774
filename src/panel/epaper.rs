//! SPI e-paper panels
//!
//! Drawing goes to the software frame buffer. Refreshes are planned by
//! [`RefreshPlanner`] and executed here, in one of three protocols:
//!
//! - two-table: a full and a partial LUT, uploaded before each refresh
//! - five-table: indexed LUTs and a two-plane frame write
//! - command sequence: refreshes are plain descriptor command tables
//!
//! Two-table and command-sequence streams may contain pseudo-opcodes
//! (0x60..=0x6A), which this panel executes.
//!
//! ```
//! use panelkit::refresh::{RefreshMode, RefreshState};
//! use panelkit::sim::{RecordingDelay, RecordingInterface};
//! use panelkit::{construct, descriptor};
//!
//! let config = descriptor::parse(
//!     ":H,EPD213,16,8,1,SPI,1,5,18,23,17,-1,16,-1,10\n\
//!      :f\n22,01,F7,20,00\n",
//! )
//! .config;
//! let mut display = construct(config, RecordingInterface::new(), RecordingDelay::new()).unwrap();
//! assert_eq!(display.refresh_state(), Some(RefreshState::Uninitialized));
//!
//! display.refresh(RefreshMode::Full).unwrap();
//! assert_eq!(display.refresh_state(), Some(RefreshState::Full));
//! ```

use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::command::{
    DISPLAY_UPDATE_CTRL2, EPD_RESET, EPD_WAIT_IDLE, MASTER_ACTIVATION, NOP, PseudoOp,
    SET_RAM_X_COUNTER, SET_RAM_X_RANGE, SET_RAM_Y_COUNTER, SET_RAM_Y_RANGE, UPDATE_SEQUENCE,
    WRITE_RAM,
};
use crate::config::{AddressCommands, DeviceConfig, EpdMode, LutSet, LutTable};
use crate::error::Error;
use crate::factory::DEFAULT_BUSY_TIMEOUT_MS;
use crate::framebuffer::FrameBuffer;
use crate::interface::{DisplayInterface, InterfaceResult};
use crate::interpreter::{Flow, Interpreter, PseudoOpHandler};
use crate::panel::{Panel, PanelContext, PanelKind, PanelResult, bus};
use crate::refresh::{RefreshMode, RefreshPlanner, RefreshState, RefreshStep};
use crate::rotation::Rotation;

/// Bytes sent per data write when streaming a plane
const CHUNK: usize = 64;

/// Wait after a five-table plane write, in ms
const PLANE_SETTLE_MS: u32 = 2;

/// Busy wait after a five-table update or clear, in ms
const PLANE_UPDATE_MS: u32 = 100;

/// E-paper backend with a refresh state machine
#[derive(Clone, Debug)]
pub struct EpaperPanel {
    width: u16,
    height: u16,
    planner: RefreshPlanner,
    state: RefreshState,
    luts: LutSet,
    address: AddressCommands,
    full_table: Vec<u8>,
    partial_table: Vec<u8>,
    update_time: u16,
    busy_invert: bool,
    busy_timeout_ms: u32,
    reset_reason: u8,
    invert_colors: bool,
}

impl EpaperPanel {
    /// Panel for an e-paper configuration, `None` when the device is not e-paper
    pub fn new(config: &DeviceConfig) -> Option<Self> {
        Some(Self {
            width: config.width,
            height: config.height,
            planner: RefreshPlanner::from_config(config)?,
            state: RefreshState::Uninitialized,
            luts: config.luts.clone(),
            address: config.address,
            full_table: config.full_refresh_commands().to_vec(),
            partial_table: config.partial_refresh_commands().to_vec(),
            update_time: config.epd_timing.update,
            busy_invert: config.transfer.busy_invert,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            reset_reason: 0,
            invert_colors: false,
        })
    }

    /// Give up on a busy line after `ms`
    #[must_use]
    pub fn with_busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Reset reason compared by the break pseudo-opcodes
    #[must_use]
    pub fn with_reset_reason(mut self, reason: u8) -> Self {
        self.reset_reason = reason;
        self
    }

    /// Current refresh state
    pub fn state(&self) -> RefreshState {
        self.state
    }

    /// Refresh protocol
    pub fn mode(&self) -> EpdMode {
        self.planner.mode()
    }

    /// Enter `mode` and refresh the glass
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub fn refresh<I: DisplayInterface, D: DelayNs>(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        mode: RefreshMode,
    ) -> Result<(), Error<I>> {
        let steps = self.planner.entry(mode);
        debug!("e-paper {:?} refresh: {:?}", mode, steps);
        self.state = mode.into();
        self.execute(ctx, &steps)
    }

    fn execute<I: DisplayInterface, D: DelayNs>(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        steps: &[RefreshStep],
    ) -> Result<(), Error<I>> {
        for step in steps {
            match *step {
                RefreshStep::LoadLut(mode) => {
                    let table = match mode {
                        RefreshMode::Full => self.luts.full.as_ref(),
                        RefreshMode::Partial => self.luts.partial.as_ref(),
                    };
                    load_lut(ctx.interface, table)?;
                }
                RefreshStep::RunTable(mode) => self.run_table(ctx, mode)?,
                RefreshStep::WriteFrame => {
                    self.send_frame(ctx.interface, ctx.framebuffer.as_deref())?;
                }
                RefreshStep::Activate => self.activate(ctx.interface, ctx.delay)?,
                RefreshStep::ClearPlanes => self.clear_planes(ctx.interface, ctx.delay)?,
                RefreshStep::ShowPlanes => {
                    self.show_planes(ctx.interface, ctx.delay, ctx.framebuffer.as_deref())?;
                }
                RefreshStep::Hold(time) => ctx.delay.delay_ms(u32::from(time) * 10),
            }
        }
        Ok(())
    }

    fn run_table<I: DisplayInterface, D: DelayNs>(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        mode: RefreshMode,
    ) -> Result<(), Error<I>> {
        let slot = match mode {
            RefreshMode::Full => &mut self.full_table,
            RefreshMode::Partial => &mut self.partial_table,
        };
        let table = core::mem::take(slot);
        let result = self.run_stream(ctx.interface, ctx.delay, ctx.framebuffer.as_deref(), &table);
        match mode {
            RefreshMode::Full => self.full_table = table,
            RefreshMode::Partial => self.partial_table = table,
        }
        result
    }

    fn run_stream<I: DisplayInterface, D: DelayNs>(
        &mut self,
        interface: &mut I,
        delay: &mut D,
        framebuffer: Option<&FrameBuffer>,
        stream: &[u8],
    ) -> Result<(), Error<I>> {
        let interpreter = Interpreter::new().pseudo_ops(self.mode() != EpdMode::FiveTable);
        let mut ops = EpaperOps {
            panel: self,
            framebuffer,
        };
        let outcome = interpreter.run(interface, delay, stream, Some(&mut ops))?;
        debug!("e-paper stream of {} bytes: {:?}", stream.len(), outcome);
        Ok(())
    }

    fn plane_len(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) / 8
    }

    /// Wait for the busy line to drop, or `ms` without one
    fn wait_idle<I: DisplayInterface, D: DelayNs>(
        &self,
        interface: &mut I,
        delay: &mut D,
        ms: u32,
    ) -> Result<(), Error<I>> {
        let busy = !self.busy_invert;
        let mut waited = 0;
        loop {
            match interface.busy_level().map_err(Error::Interface)? {
                None => {
                    delay.delay_ms(ms);
                    return Ok(());
                }
                Some(level) if level == busy => {
                    if waited >= self.busy_timeout_ms {
                        debug!("e-paper still busy after {} ms", waited);
                        return Ok(());
                    }
                    delay.delay_ms(1);
                    waited += 1;
                }
                Some(_) => return Ok(()),
            }
        }
    }

    fn activate<I: DisplayInterface, D: DelayNs>(
        &self,
        interface: &mut I,
        delay: &mut D,
    ) -> Result<(), Error<I>> {
        bus(interface, |i| {
            i.write_command(DISPLAY_UPDATE_CTRL2)?;
            i.write_data8(UPDATE_SEQUENCE)?;
            i.write_command(MASTER_ACTIVATION)?;
            i.write_data8(NOP)
        })?;
        self.wait_idle(interface, delay, u32::from(self.update_time) * 10)
    }

    fn set_memory_area<I: DisplayInterface>(
        &self,
        interface: &mut I,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
    ) -> Result<(), Error<I>> {
        let reversed = self.mode() == EpdMode::CommandSequence;
        bus(interface, |i| {
            i.write_command(SET_RAM_X_RANGE)?;
            i.write_data8((x0 >> 3) as u8)?;
            i.write_data8((x1 >> 3) as u8)?;
            i.write_command(SET_RAM_Y_RANGE)?;
            let (first, second) = if reversed { (y1, y0) } else { (y0, y1) };
            i.write_data8(first as u8)?;
            i.write_data8((first >> 8) as u8)?;
            i.write_data8(second as u8)?;
            i.write_data8((second >> 8) as u8)
        })
    }

    fn set_memory_pointer<I: DisplayInterface>(
        &self,
        interface: &mut I,
        x: u16,
        y: u16,
    ) -> Result<(), Error<I>> {
        let y = if self.mode() == EpdMode::CommandSequence {
            y.wrapping_sub(1)
        } else {
            y
        };
        bus(interface, |i| {
            i.write_command(SET_RAM_X_COUNTER)?;
            i.write_data8((x >> 3) as u8)?;
            i.write_command(SET_RAM_Y_COUNTER)?;
            i.write_data8(y as u8)?;
            i.write_data8((y >> 8) as u8)
        })
    }

    fn full_window<I: DisplayInterface>(&self, interface: &mut I) -> Result<(), Error<I>> {
        self.set_memory_area(
            interface,
            0,
            0,
            self.width.saturating_sub(1),
            self.height.saturating_sub(1),
        )?;
        self.set_memory_pointer(interface, 0, 0)
    }

    fn clear_frame<I: DisplayInterface>(&self, interface: &mut I, value: u8) -> Result<(), Error<I>> {
        self.full_window(interface)?;
        let len = self.plane_len();
        bus(interface, |i| {
            i.write_command(WRITE_RAM)?;
            write_fill(i, value, len)
        })
    }

    fn send_frame<I: DisplayInterface>(
        &self,
        interface: &mut I,
        framebuffer: Option<&FrameBuffer>,
    ) -> Result<(), Error<I>> {
        self.full_window(interface)?;
        let len = self.plane_len();
        bus(interface, |i| {
            i.write_command(WRITE_RAM)?;
            write_inverted(i, framebuffer, len)
        })
    }

    fn send_data<I: DisplayInterface>(
        &self,
        interface: &mut I,
        framebuffer: Option<&FrameBuffer>,
    ) -> Result<(), Error<I>> {
        let len = self.plane_len();
        bus(interface, |i| write_inverted(i, framebuffer, len))
    }

    fn clear_planes<I: DisplayInterface, D: DelayNs>(
        &self,
        interface: &mut I,
        delay: &mut D,
    ) -> Result<(), Error<I>> {
        // One bit per pixel: a plane is w*h/8 bytes, not one byte per pixel
        let len = self.plane_len();
        let address = self.address;
        bus(interface, |i| {
            i.write_command(address.set_x)?;
            write_fill(i, 0xFF, len)?;
            i.write_command(address.set_y)?;
            write_fill(i, 0xFF, len)?;
            if let Some(command) = address.write_ram {
                i.write_command(command)?;
            }
            Ok(())
        })?;
        self.wait_idle(interface, delay, PLANE_UPDATE_MS)
    }

    fn show_planes<I: DisplayInterface, D: DelayNs>(
        &self,
        interface: &mut I,
        delay: &mut D,
        framebuffer: Option<&FrameBuffer>,
    ) -> Result<(), Error<I>> {
        let len = self.plane_len();
        let address = self.address;
        bus(interface, |i| {
            i.write_command(address.set_x)?;
            write_fill(i, 0xFF, len)
        })?;
        delay.delay_ms(PLANE_SETTLE_MS);
        bus(interface, |i| {
            i.write_command(address.set_y)?;
            write_inverted(i, framebuffer, len)
        })?;
        delay.delay_ms(PLANE_SETTLE_MS);
        for lut in self.luts.indexed.iter().flatten() {
            load_lut(interface, Some(lut))?;
        }
        if let Some(command) = address.write_ram {
            bus(interface, |i| i.write_command(command))?;
        }
        self.wait_idle(interface, delay, PLANE_UPDATE_MS)
    }

    fn pseudo_op<I: DisplayInterface, D: DelayNs>(
        &mut self,
        interface: &mut I,
        delay: &mut D,
        framebuffer: Option<&FrameBuffer>,
        op: PseudoOp,
        arg: Option<u8>,
    ) -> Result<Flow, Error<I>> {
        match op {
            PseudoOp::Reset => {
                let ms = u32::from(arg.unwrap_or(EPD_RESET));
                interface.set_reset(false).map_err(Error::Interface)?;
                delay.delay_ms(ms);
                interface.set_reset(true).map_err(Error::Interface)?;
                delay.delay_ms(ms);
            }
            PseudoOp::LutFull => {
                load_lut(interface, self.luts.full.as_ref())?;
                self.state = RefreshState::Full;
            }
            PseudoOp::LutPartial => {
                load_lut(interface, self.luts.partial.as_ref())?;
                self.state = RefreshState::Partial;
            }
            PseudoOp::WaitIdle => {
                let ms = u32::from(arg.unwrap_or(EPD_WAIT_IDLE)) * 10;
                self.wait_idle(interface, delay, ms)?;
            }
            PseudoOp::SetMemArea => self.set_memory_area(
                interface,
                0,
                0,
                self.width.saturating_sub(1),
                self.height.saturating_sub(1),
            )?,
            PseudoOp::SetMemPtr => self.set_memory_pointer(interface, 0, 0)?,
            PseudoOp::SendData => self.send_data(interface, framebuffer)?,
            PseudoOp::ClearFrame => self.clear_frame(interface, 0xFF)?,
            PseudoOp::SendFrame => self.send_frame(interface, framebuffer)?,
            PseudoOp::BreakIfResetReasonEquals | PseudoOp::BreakIfResetReasonDiffers => {
                let Some(expected) = arg else {
                    return Ok(Flow::Continue);
                };
                let equal = expected == self.reset_reason;
                if equal == (op == PseudoOp::BreakIfResetReasonEquals) {
                    debug!("reset reason {} matched, partial mode", self.reset_reason);
                    self.state = RefreshState::Partial;
                    return Ok(Flow::Break);
                }
            }
        }
        Ok(Flow::Continue)
    }
}

/// Pseudo-opcode handler borrowing the panel and its frame for one stream
struct EpaperOps<'p, 'f> {
    panel: &'p mut EpaperPanel,
    framebuffer: Option<&'f FrameBuffer>,
}

impl<I: DisplayInterface, D: DelayNs> PseudoOpHandler<I, D> for EpaperOps<'_, '_> {
    fn pseudo_op(
        &mut self,
        interface: &mut I,
        delay: &mut D,
        op: PseudoOp,
        arg: Option<u8>,
    ) -> Result<Flow, Error<I>> {
        self.panel
            .pseudo_op(interface, delay, self.framebuffer, op, arg)
    }
}

/// Upload a LUT with its own load command, skipping missing or short tables
fn load_lut<I: DisplayInterface>(
    interface: &mut I,
    table: Option<&LutTable>,
) -> Result<(), Error<I>> {
    match table {
        Some(table) if !table.data.is_empty() && table.is_complete() => bus(interface, |i| {
            i.write_command(table.load_command())?;
            i.write_data(&table.data)
        }),
        Some(table) => {
            debug!(
                "LUT {:#04x} holds {} of {} bytes, not loaded",
                table.load_command(),
                table.data.len(),
                table.declared
            );
            Ok(())
        }
        None => {
            debug!("no LUT to load");
            Ok(())
        }
    }
}

fn write_fill<I: DisplayInterface>(
    interface: &mut I,
    value: u8,
    len: usize,
) -> InterfaceResult<(), I::Error> {
    let chunk = [value; CHUNK];
    let mut left = len;
    while left > 0 {
        let n = left.min(CHUNK);
        interface.write_data(&chunk[..n])?;
        left -= n;
    }
    Ok(())
}

/// Stream the first `len` frame bytes complemented; a missing frame is blank
fn write_inverted<I: DisplayInterface>(
    interface: &mut I,
    framebuffer: Option<&FrameBuffer>,
    len: usize,
) -> InterfaceResult<(), I::Error> {
    let Some(framebuffer) = framebuffer else {
        return write_fill(interface, 0xFF, len);
    };
    let bytes = framebuffer.as_bytes();
    let bytes = bytes.get(..len).unwrap_or(bytes);
    let mut chunk = [0u8; CHUNK];
    for part in bytes.chunks(CHUNK) {
        for (out, byte) in chunk.iter_mut().zip(part) {
            *out = !byte;
        }
        interface.write_data(&chunk[..part.len()])?;
    }
    Ok(())
}

impl<I: DisplayInterface, D: DelayNs> Panel<I, D> for EpaperPanel {
    fn kind(&self) -> PanelKind {
        PanelKind::Epaper
    }

    fn init(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        config: &DeviceConfig,
    ) -> Result<(), Error<I>> {
        self.run_stream(
            ctx.interface,
            ctx.delay,
            ctx.framebuffer.as_deref(),
            config.init_commands(),
        )?;
        if self.mode() == EpdMode::TwoTable {
            load_lut(ctx.interface, self.luts.full.as_ref())?;
        }
        self.clear_frame(ctx.interface, 0xFF)?;
        self.activate(ctx.interface, ctx.delay)
    }

    fn draw_pixel(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x: i32,
        y: i32,
        color: u16,
    ) -> PanelResult<I> {
        let Some(framebuffer) = ctx.framebuffer.as_deref_mut() else {
            return Ok(false);
        };
        framebuffer.draw_pixel(x, y, color, ctx.rotation, self.invert_colors);
        Ok(true)
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
        let Some(framebuffer) = ctx.framebuffer.as_deref_mut() else {
            return Ok(false);
        };
        framebuffer.fill_rect((x, y, w, h), color, ctx.rotation, self.invert_colors);
        Ok(true)
    }

    fn set_addr_window(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _x0: u16,
        _y0: u16,
        _x1: u16,
        _y1: u16,
    ) -> PanelResult<I> {
        Ok(true)
    }

    fn display_on_off(&mut self, _ctx: &mut PanelContext<'_, I, D>, _on: bool) -> PanelResult<I> {
        Ok(true)
    }

    fn invert_display(&mut self, ctx: &mut PanelContext<'_, I, D>, invert: bool) -> PanelResult<I> {
        if invert == self.invert_colors {
            return Ok(true);
        }
        self.invert_colors = invert;
        if let Some(framebuffer) = ctx.framebuffer.as_deref_mut() {
            framebuffer.invert();
        }
        <Self as Panel<I, D>>::update_frame(self, ctx)
    }

    fn set_rotation(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        _rotation: Rotation,
    ) -> PanelResult<I> {
        Ok(true)
    }

    fn update_frame(&mut self, ctx: &mut PanelContext<'_, I, D>) -> PanelResult<I> {
        let steps = self.planner.update(self.state);
        debug!("e-paper update in {:?}: {:?}", self.state, steps);
        self.execute(ctx, &steps)?;
        Ok(true)
    }

    fn refresh_state(&self) -> Option<RefreshState> {
        Some(self.state)
    }

    fn epaper(&mut self) -> Option<&mut EpaperPanel> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use crate::framebuffer::Layout;
    use crate::sim::{Event, RecordingDelay, RecordingInterface};

    const COMMAND_SEQUENCE: &str = ":H,EPD,16,8,1,SPI,1,5,18,23,17,-1,16,-1,10\n\
         :f\n22,01,F7,20,00\n\
         :p\n22,01,FF,20,00\n";

    const TWO_TABLE: &str = ":H,EPD,16,8,1,SPI,1,5,18,23,17,-1,16,-1,10\n\
         :L,2,32\n02,02\n\
         :l,2,33\n10,10\n";

    struct Rig {
        interface: RecordingInterface,
        delay: RecordingDelay,
        framebuffer: FrameBuffer,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                interface: RecordingInterface::new(),
                delay: RecordingDelay::new(),
                framebuffer: FrameBuffer::try_new(16, 8, 1, Layout::Horizontal).unwrap(),
            }
        }

        fn ctx(&mut self) -> PanelContext<'_, RecordingInterface, RecordingDelay> {
            PanelContext {
                interface: &mut self.interface,
                delay: &mut self.delay,
                framebuffer: Some(&mut self.framebuffer),
                rotation: Rotation::Rotate0,
            }
        }
    }

    fn panel(text: &str) -> EpaperPanel {
        EpaperPanel::new(&descriptor::parse(text).config).unwrap()
    }

    #[test]
    fn test_not_epaper() {
        let config = descriptor::parse(":H,X,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n").config;
        assert!(EpaperPanel::new(&config).is_none());
    }

    #[test]
    fn test_command_sequence_full_refresh() {
        let mut panel = panel(COMMAND_SEQUENCE);
        let mut rig = Rig::new();
        panel.refresh(&mut rig.ctx(), RefreshMode::Full).unwrap();

        assert_eq!(rig.interface.commands(), [0x22, 0x20]);
        assert_eq!(rig.interface.data(), [0xF7]);
        assert!(!rig.interface.commands().contains(&0x32));
        assert_eq!(panel.state(), RefreshState::Full);
        assert_eq!(rig.delay.calls_ms().last(), Some(&3500));
        assert!(rig.interface.is_idle());
    }

    #[test]
    fn test_two_table_full_refresh_sends_inverted_frame() {
        let mut panel = panel(TWO_TABLE);
        let mut rig = Rig::new();
        rig.framebuffer.set(0, 0, 1);
        panel.refresh(&mut rig.ctx(), RefreshMode::Full).unwrap();

        assert_eq!(
            rig.interface.commands(),
            [0x32, 0x44, 0x45, 0x4E, 0x4F, 0x24, 0x22, 0x20]
        );
        let data = rig.interface.data();
        // LUT, window, pointer, then the frame
        assert_eq!(data[..2], [0x02, 0x02]);
        assert_eq!(data[2..8], [0x00, 0x01, 0x00, 0x00, 0x07, 0x00]);
        assert_eq!(data[8..11], [0x00, 0x00, 0x00]);
        assert_eq!(data[11], 0x7F);
        assert!(data[12..27].iter().all(|&b| b == 0xFF));
        assert_eq!(data[27..], [0xC4, 0xFF]);
        assert_eq!(panel.state(), RefreshState::Full);
    }

    #[test]
    fn test_partial_refresh_uses_partial_lut() {
        let mut panel = panel(TWO_TABLE);
        let mut rig = Rig::new();
        panel.refresh(&mut rig.ctx(), RefreshMode::Partial).unwrap();
        assert_eq!(rig.interface.commands()[0], 0x33);
        assert_eq!(rig.delay.calls_ms().last(), Some(&350));
        assert_eq!(panel.state(), RefreshState::Partial);
    }

    #[test]
    fn test_incomplete_lut_is_skipped() {
        let mut panel = panel(
            ":H,EPD,16,8,1,SPI,1,5,18,23,17,-1,16,-1,10\n\
             :L,4,32\n02,02\n\
             :l,2,33\n10,10\n",
        );
        let mut rig = Rig::new();
        panel.refresh(&mut rig.ctx(), RefreshMode::Full).unwrap();
        assert!(!rig.interface.commands().contains(&0x32));
        assert_eq!(panel.state(), RefreshState::Full);
    }

    #[test]
    fn test_command_sequence_window_is_reversed() {
        let panel = panel(COMMAND_SEQUENCE);
        let mut interface = RecordingInterface::new();
        panel.full_window(&mut interface).unwrap();
        // Y range end first, pointer at y - 1
        assert_eq!(
            interface.data(),
            [0x00, 0x01, 0x07, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_break_on_reset_reason_forces_partial() {
        let mut panel = panel(COMMAND_SEQUENCE).with_reset_reason(5);
        let mut rig = Rig::new();
        // BREAK_RR_EQU 5, then a command that must not run
        let stream = [0x69, 0x01, 0x05, 0x12, 0x00];
        let ctx = &mut rig.ctx();
        panel
            .run_stream(ctx.interface, ctx.delay, None, &stream)
            .unwrap();
        assert_eq!(panel.state(), RefreshState::Partial);
        assert!(rig.interface.commands().is_empty());

        // A different reason falls through
        let mut panel = self::panel(COMMAND_SEQUENCE).with_reset_reason(1);
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx();
        panel
            .run_stream(ctx.interface, ctx.delay, None, &stream)
            .unwrap();
        assert_eq!(panel.state(), RefreshState::Uninitialized);
        assert_eq!(rig.interface.commands(), [0x12]);
    }

    #[test]
    fn test_pseudo_reset_and_wait() {
        let mut panel = panel(COMMAND_SEQUENCE);
        let mut rig = Rig::new();
        // RESET 5 ms, WAIT_IDLE default
        let stream = [0x60, 0x01, 0x05, 0x63, 0x00];
        let ctx = &mut rig.ctx();
        panel
            .run_stream(ctx.interface, ctx.delay, None, &stream)
            .unwrap();
        assert_eq!(
            rig.interface.events()[1..3],
            [Event::Reset(false), Event::Reset(true)]
        );
        assert_eq!(rig.delay.calls_ms(), [5, 5, 0x63 * 10]);
    }

    #[test]
    fn test_busy_wait_polls_until_idle() {
        let panel = panel(COMMAND_SEQUENCE);
        let mut interface = RecordingInterface::new().with_busy([true, true, false]);
        let mut delay = RecordingDelay::new();
        panel.wait_idle(&mut interface, &mut delay, 1000).unwrap();
        assert_eq!(delay.calls_ms(), [1, 1]);
    }

    #[test]
    fn test_busy_wait_times_out() {
        let panel = panel(COMMAND_SEQUENCE).with_busy_timeout(5);
        let mut interface = RecordingInterface::new().with_busy([true; 10]);
        let mut delay = RecordingDelay::new();
        panel.wait_idle(&mut interface, &mut delay, 1000).unwrap();
        assert_eq!(delay.total_ms(), 5);
    }

    #[test]
    fn test_five_table_full_refresh() {
        let mut panel = panel(
            ":H,EPD42,16,8,1,SPI,1,5,18,23,17,-1,16,-1,10\n\
             :a,10,13,12\n\
             :L1,2,20\n01,02\n\
             :L2,1,21\n03\n\
             :L3,1,22\n04\n\
             :L4,1,23\n05\n\
             :L5,1,24\n06\n",
        );
        assert_eq!(panel.mode(), EpdMode::FiveTable);
        let mut rig = Rig::new();
        panel.refresh(&mut rig.ctx(), RefreshMode::Full).unwrap();
        assert_eq!(
            rig.interface.commands(),
            [0x10, 0x13, 0x12, 0x10, 0x13, 0x20, 0x21, 0x22, 0x23, 0x24, 0x12]
        );
        // Each plane write carries one bit per pixel of the 16x8 panel
        let mut planes = Vec::new();
        for event in rig.interface.events() {
            match event {
                Event::Command(0x10 | 0x13) => planes.push(0),
                Event::Command(_) => planes.push(usize::MAX),
                Event::Data(bytes) => {
                    if let Some(len) = planes.last_mut().filter(|len| **len != usize::MAX) {
                        *len += bytes.len();
                    }
                }
                _ => {}
            }
        }
        planes.retain(|len| *len != usize::MAX);
        assert_eq!(planes, [16, 16, 16, 16]);
        assert_eq!(panel.state(), RefreshState::Full);

        let mut rig = Rig::new();
        panel.refresh(&mut rig.ctx(), RefreshMode::Partial).unwrap();
        assert!(rig.interface.events().is_empty());
        assert_eq!(panel.state(), RefreshState::Partial);
    }

    #[test]
    fn test_drawing_goes_to_framebuffer() {
        let mut panel = panel(COMMAND_SEQUENCE);
        let mut rig = Rig::new();
        let handled = Panel::draw_pixel(&mut panel, &mut rig.ctx(), 1, 0, 0xFFFF).unwrap();
        assert!(handled);
        assert_eq!(rig.framebuffer.get(1, 0), Some(1));

        let pushed = Panel::push_colors(&mut panel, &mut rig.ctx(), &[0xFFFF], true).unwrap();
        assert!(!pushed);
        assert!(rig.interface.events().is_empty());
    }

    #[test]
    fn test_invert_flips_frame_and_refreshes() {
        let mut panel = panel(COMMAND_SEQUENCE);
        let mut rig = Rig::new();
        Panel::invert_display(&mut panel, &mut rig.ctx(), true).unwrap();
        assert!(rig.framebuffer.as_bytes().iter().all(|&b| b == 0xFF));
        // Uninitialized: frame write and activation
        assert!(rig.interface.commands().contains(&0x24));
        assert!(rig.interface.commands().ends_with(&[0x22, 0x20]));
    }
}

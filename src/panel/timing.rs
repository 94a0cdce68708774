//! RGB and DSI panels behind a vendor driver
//!
//! The panel is refreshed continuously from a frame buffer the vendor driver
//! owns. Drawing writes that buffer at physical coordinates and flushes the
//! touched span so the scan-out engine sees it.

use alloc::boxed::Box;

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::config::{DeviceConfig, InterfaceKind};
use crate::error::Error;
use crate::interface::DisplayInterface;
use crate::interpreter::{run_packets, run_side_init};
use crate::native::NativePanelDriver;
use crate::panel::{Panel, PanelContext, PanelKind, PanelResult, clip};
use crate::rotation::Rotation;

/// Timing-generator backend
pub struct TimingPanel {
    driver: Box<dyn NativePanelDriver>,
    width: u16,
    height: u16,
    window: (u16, u16, u16, u16),
    cursor: (u16, u32),
}

impl TimingPanel {
    /// Panel for `config`, drawing through `driver`
    pub fn new(config: &DeviceConfig, driver: Box<dyn NativePanelDriver>) -> Self {
        Self {
            driver,
            width: config.width,
            height: config.height,
            window: (0, 0, 0, 0),
            cursor: (0, 0),
        }
    }

    /// Store `color` at logical `(x, y)` and return the buffer index
    fn plot(&mut self, rotation: Rotation, x: u16, y: u16, color: u16) -> usize {
        let (px, py) = rotation.to_physical(x, y, self.width, self.height);
        let index = usize::from(py) * usize::from(self.width) + usize::from(px);
        if let Some(pixel) = self.driver.framebuffer().get_mut(index) {
            *pixel = color;
        }
        index
    }
}

impl<I: DisplayInterface, D: DelayNs> Panel<I, D> for TimingPanel {
    fn kind(&self) -> PanelKind {
        PanelKind::Timing
    }

    fn init(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        config: &DeviceConfig,
    ) -> Result<(), Error<I>> {
        if config.interface_kind() == Some(InterfaceKind::Dsi) {
            let outcome = run_packets(self.driver.as_mut(), ctx.delay, config.init_commands())
                .map_err(Error::Native)?;
            debug!("DSI init: {:?}", outcome);
        } else if let Some(side) = &config.side_init {
            let outcome = run_side_init(ctx.interface, ctx.delay, side)?;
            debug!("RGB side init: {:?}", outcome);
        }
        Ok(())
    }

    fn draw_pixel(
        &mut self,
        ctx: &mut PanelContext<'_, I, D>,
        x: i32,
        y: i32,
        color: u16,
    ) -> PanelResult<I> {
        let (width, height) = ctx.rotation.logical_size(self.width, self.height);
        if let Some((x, y, _, _)) = clip(x, y, 1, 1, width, height) {
            let index = self.plot(ctx.rotation, x, y, color);
            self.driver.flush_cache(index, 1);
        }
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
        let (width, height) = ctx.rotation.logical_size(self.width, self.height);
        let Some((x, y, w, h)) = clip(x, y, w, h, width, height) else {
            return Ok(true);
        };
        for row in y..y + h {
            let mut first = usize::MAX;
            let mut last = 0;
            for column in x..x + w {
                let index = self.plot(ctx.rotation, column, row, color);
                first = first.min(index);
                last = last.max(index);
            }
            self.driver.flush_cache(first, last - first + 1);
        }
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
            return Ok(true);
        }
        let (width, height) = ctx.rotation.logical_size(self.width, self.height);
        self.window = if x0 >= width || y0 >= height {
            // Inverted, so pushes are dropped
            (1, 1, 0, 0)
        } else {
            (x0, y0, x1.min(width - 1), y1.min(height - 1))
        };
        self.cursor = (self.window.0, u32::from(self.window.1));
        Ok(true)
    }

    fn push_colors(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        data: &[u16],
        first: bool,
    ) -> PanelResult<I> {
        let (x0, y0, x1, y1) = self.window;
        if x1 < x0 || y1 < y0 {
            return Ok(true);
        }
        if first {
            self.cursor = (x0, u32::from(y0));
        }
        let mut rest = data;
        while !rest.is_empty() && self.cursor.1 <= u32::from(y1) {
            let (x, row) = self.cursor;
            let y = row as u16;
            let n = (usize::from(x1) - usize::from(x) + 1).min(rest.len());
            let (pixels, tail) = rest.split_at(n);
            // x1 is clamped below the panel width, so the span end fits in u16
            let end = x + n as u16;
            self.driver
                .draw_bitmap(x, y, end, y + 1, pixels)
                .map_err(Error::Native)?;
            rest = tail;
            self.cursor = if end > x1 { (x0, row + 1) } else { (end, row) };
        }
        Ok(true)
    }

    fn display_on_off(&mut self, _ctx: &mut PanelContext<'_, I, D>, on: bool) -> PanelResult<I> {
        self.driver.display_on_off(on).map_err(Error::Native)?;
        Ok(true)
    }

    fn invert_display(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        invert: bool,
    ) -> PanelResult<I> {
        self.driver.invert(invert).map_err(Error::Native)?;
        Ok(true)
    }

    fn set_rotation(
        &mut self,
        _ctx: &mut PanelContext<'_, I, D>,
        rotation: Rotation,
    ) -> PanelResult<I> {
        let index = rotation.index();
        self.driver
            .mirror(matches!(index, 1 | 2), index >= 2)
            .map_err(Error::Native)?;
        self.driver
            .swap_axes(rotation.swaps_axes())
            .map_err(Error::Native)?;
        Ok(true)
    }

    fn update_frame(&mut self, _ctx: &mut PanelContext<'_, I, D>) -> PanelResult<I> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use crate::interface::NoInterface;
    use crate::sim::{Bitmap, RecordingDelay, SimNativePanel};
    use alloc::vec;

    struct Rig {
        interface: NoInterface,
        delay: RecordingDelay,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                interface: NoInterface,
                delay: RecordingDelay::new(),
            }
        }

        fn ctx(&mut self, rotation: Rotation) -> PanelContext<'_, NoInterface, RecordingDelay> {
            PanelContext {
                interface: &mut self.interface,
                delay: &mut self.delay,
                framebuffer: None,
                rotation,
            }
        }
    }

    fn panel(width: u16, height: u16) -> (TimingPanel, SimNativePanel) {
        let sim = SimNativePanel::new(width, height);
        let config = DeviceConfig {
            width,
            height,
            ..DeviceConfig::default()
        };
        (TimingPanel::new(&config, Box::new(sim.clone())), sim)
    }

    #[test]
    fn test_pixel_is_flushed() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate0), 1, 2, 0xF800).unwrap();
        assert_eq!(sim.visible(1, 2), Some(0xF800));
        assert_eq!(sim.flushes(), [(9, 1)]);

        // Off-panel pixels are dropped
        Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate0), 4, 0, 0xF800).unwrap();
        assert_eq!(sim.flushes().len(), 1);
    }

    #[test]
    fn test_pixel_rotation() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate90), 0, 0, 1).unwrap();
        assert_eq!(sim.visible(3, 0), Some(1));
        Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate180), 0, 0, 2).unwrap();
        assert_eq!(sim.visible(3, 2), Some(2));
        Panel::draw_pixel(&mut panel, &mut rig.ctx(Rotation::Rotate270), 0, 0, 3).unwrap();
        assert_eq!(sim.visible(0, 2), Some(3));
    }

    #[test]
    fn test_fill_rect_flushes_each_row() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        Panel::fill_rect(&mut panel, &mut rig.ctx(Rotation::Rotate0), 1, 1, 2, 5, 7).unwrap();
        assert_eq!(sim.flushes(), [(5, 2), (9, 2)]);
        assert_eq!(sim.visible(2, 2), Some(7));
        assert_eq!(sim.visible(0, 1), Some(0));
    }

    #[test]
    fn test_push_continues_across_calls() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx(Rotation::Rotate0);
        Panel::set_addr_window(&mut panel, ctx, 1, 0, 2, 1).unwrap();
        Panel::push_colors(&mut panel, ctx, &[1, 2, 3], true).unwrap();
        Panel::push_colors(&mut panel, ctx, &[4, 5], false).unwrap();

        assert_eq!(
            sim.bitmaps(),
            [
                Bitmap { x0: 1, y0: 0, x1: 3, y1: 1, pixels: vec![1, 2] },
                Bitmap { x0: 1, y0: 1, x1: 2, y1: 2, pixels: vec![3] },
                Bitmap { x0: 2, y0: 1, x1: 3, y1: 2, pixels: vec![4] },
            ]
        );
    }

    #[test]
    fn test_push_full_range_window_is_clamped() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx(Rotation::Rotate0);
        Panel::set_addr_window(&mut panel, ctx, 0, 0, 0xFFFF, 0xFFFF).unwrap();
        Panel::push_colors(&mut panel, ctx, &[1; 20], true).unwrap();

        let bitmaps = sim.bitmaps();
        assert_eq!(bitmaps.len(), 3);
        assert!(bitmaps.iter().all(|b| b.x0 == 0 && b.x1 == 4 && b.pixels.len() == 4));
        assert_eq!(bitmaps[2].y0, 2);
    }

    #[test]
    fn test_push_window_past_edge_is_clamped() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        let ctx = &mut rig.ctx(Rotation::Rotate0);
        Panel::set_addr_window(&mut panel, ctx, 2, 0, 9, 0).unwrap();
        Panel::push_colors(&mut panel, ctx, &[1, 2, 3], true).unwrap();
        assert_eq!(sim.bitmaps(), [Bitmap { x0: 2, y0: 0, x1: 4, y1: 1, pixels: vec![1, 2] }]);

        // A window starting off the panel draws nothing
        Panel::set_addr_window(&mut panel, ctx, 4, 0, 5, 0).unwrap();
        Panel::push_colors(&mut panel, ctx, &[1], true).unwrap();
        assert_eq!(sim.bitmaps().len(), 1);
    }

    #[test]
    fn test_rotation_drives_scan_direction() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        let expected = [
            (Rotation::Rotate0, (false, false), false),
            (Rotation::Rotate90, (true, false), true),
            (Rotation::Rotate180, (true, true), false),
            (Rotation::Rotate270, (false, true), true),
        ];
        for (rotation, mirror, swapped) in expected {
            Panel::set_rotation(&mut panel, &mut rig.ctx(Rotation::Rotate0), rotation).unwrap();
            assert_eq!(sim.mirror_state(), mirror);
            assert_eq!(sim.is_swapped(), swapped);
        }
    }

    #[test]
    fn test_on_off_and_invert() {
        let (mut panel, sim) = panel(4, 3);
        let mut rig = Rig::new();
        Panel::display_on_off(&mut panel, &mut rig.ctx(Rotation::Rotate0), false).unwrap();
        Panel::invert_display(&mut panel, &mut rig.ctx(Rotation::Rotate0), true).unwrap();
        assert_eq!(sim.is_on(), Some(false));
        assert!(sim.is_inverted());
    }

    #[test]
    fn test_dsi_init_packets() {
        let config = descriptor::parse(
            ":H,DSI7,1024,600,16,DSI,2,-1,23,27,3,2500,52000000,750,0,0\n\
             :I\n11,00,78\n29,00,14\n",
        )
        .config;
        let sim = SimNativePanel::new(8, 8);
        let mut panel = TimingPanel::new(&config, Box::new(sim.clone()));
        let mut rig = Rig::new();
        panel.init(&mut rig.ctx(Rotation::Rotate0), &config).unwrap();
        assert_eq!(sim.commands(), [(0x11, vec![]), (0x29, vec![])]);
        assert_eq!(rig.delay.calls_ms(), [120, 20]);
    }
}

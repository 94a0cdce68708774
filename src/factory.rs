//! Panel factory
//!
//! Turns a parsed [`DeviceConfig`] and a transport into a ready
//! [`Display`]. The frame buffer is allocated, the controller reset, a
//! [`Panel`] chosen for the interface and its init stream run.
//!
//! ## Example
//!
//! ```
//! use panelkit::sim::{RecordingDelay, RecordingInterface};
//! use panelkit::{Builder, descriptor};
//!
//! let config = descriptor::parse(
//!     ":H,ILI9341,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n\
//!      :I\n01,A0\n29,80\n\
//!      :A,2A,2B,2C,16\n",
//! )
//! .config;
//!
//! let display = Builder::new()
//!     .busy_timeout_ms(1000)
//!     .build(config, RecordingInterface::new(), RecordingDelay::new())
//!     .unwrap();
//! assert_eq!((display.width(), display.height()), (240, 320));
//! assert!(display.framebuffer().is_none());
//! ```

use alloc::boxed::Box;

use embedded_hal::delay::DelayNs;
use log::{debug, error};

use crate::config::{DeviceConfig, InterfaceKind};
use crate::display::Display;
use crate::error::Error;
use crate::framebuffer::{FrameBuffer, Layout};
use crate::interface::DisplayInterface;
use crate::native::{NativePanelParams, NativePanelProvider};
use crate::panel::{AddressedPanel, EpaperPanel, PagedPanel, Panel, TimingPanel};

/// Default give-up time for an e-paper busy line, in ms
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 3000;

/// Reset pulse timing: settle high, hold low, recover
const RESET_SETTLE_MS: u32 = 50;
const RESET_LOW_MS: u32 = 50;
const RESET_RECOVER_MS: u32 = 200;

/// Options for [`Display`] construction
///
/// ```
/// use panelkit::Builder;
///
/// let builder = Builder::new().busy_timeout_ms(500).reset_reason(1);
/// # let _ = builder;
/// ```
pub struct Builder {
    busy_timeout_ms: u32,
    reset_reason: u8,
    native: Option<Box<dyn NativePanelProvider>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Builder with default options and no native provider
    pub fn new() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            reset_reason: 0,
            native: None,
        }
    }

    /// Give up on an e-paper busy line after `ms`
    #[must_use]
    pub fn busy_timeout_ms(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Last reset reason, checked by the e-paper break pseudo-opcodes
    #[must_use]
    pub fn reset_reason(mut self, reason: u8) -> Self {
        self.reset_reason = reason;
        self
    }

    /// Vendor driver source for RGB and DSI panels
    #[must_use]
    pub fn native_provider(mut self, provider: impl NativePanelProvider + 'static) -> Self {
        self.native = Some(Box::new(provider));
        self
    }

    /// Bring up the display described by `config`
    ///
    /// # Errors
    ///
    /// - [`Error::NoValidConfiguration`] when the descriptor named no interface
    /// - [`Error::UnsupportedInterface`] for RGB/DSI without a native provider
    /// - [`Error::Native`] when the vendor driver fails to start
    /// - [`Error::Interface`] when the transport fails during init
    pub fn build<I, D>(
        mut self,
        config: DeviceConfig,
        mut interface: I,
        mut delay: D,
    ) -> Result<Display<I, D>, Error<I>>
    where
        I: DisplayInterface,
        D: DelayNs,
    {
        let Some(kind) = config.interface_kind() else {
            return Err(Error::NoValidConfiguration);
        };
        debug!(
            "{}: {}x{} at {} bpp over {:?}",
            config.name,
            config.width,
            config.height,
            config.bpp(),
            kind
        );

        let framebuffer = allocate_framebuffer(&config);

        let has_reset = config
            .interface
            .as_ref()
            .is_some_and(|wiring| wiring.reset_pin().is_some());
        if has_reset {
            interface.set_reset(true).map_err(Error::Interface)?;
            delay.delay_ms(RESET_SETTLE_MS);
            interface.set_reset(false).map_err(Error::Interface)?;
            delay.delay_ms(RESET_LOW_MS);
            interface.set_reset(true).map_err(Error::Interface)?;
            delay.delay_ms(RESET_RECOVER_MS);
        }

        let panel: Box<dyn Panel<I, D>> = match kind {
            InterfaceKind::Spi if config.is_epaper() => {
                let panel = EpaperPanel::new(&config)
                    .ok_or(Error::NoValidConfiguration)?
                    .with_busy_timeout(self.busy_timeout_ms)
                    .with_reset_reason(self.reset_reason);
                Box::new(panel)
            }
            InterfaceKind::Spi | InterfaceKind::Parallel8 | InterfaceKind::Parallel16 => {
                Box::new(AddressedPanel::new(&config))
            }
            InterfaceKind::I2c => Box::new(PagedPanel::new(&config)),
            InterfaceKind::Rgb | InterfaceKind::Dsi => {
                let Some(provider) = self.native.as_mut() else {
                    return Err(Error::UnsupportedInterface(kind));
                };
                let params =
                    NativePanelParams::from_config(&config).ok_or(Error::NoValidConfiguration)?;
                let driver = provider.create(&params).map_err(Error::Native)?;
                Box::new(TimingPanel::new(&config, driver))
            }
        };
        debug!("{:?} panel selected", panel.kind());

        let mut display = Display::new(interface, delay, config, panel, framebuffer);
        display.init_panel()?;
        Ok(display)
    }
}

/// Frame buffer for packed depths and e-paper, `None` when not needed or out of memory
fn allocate_framebuffer(config: &DeviceConfig) -> Option<FrameBuffer> {
    let epaper = config.is_epaper();
    let bpp = config.bpp();
    if bpp >= 16 && !epaper {
        return None;
    }
    let (bpp, layout) = if epaper {
        (1, Layout::Horizontal)
    } else if bpp == 1 {
        (1, Layout::Paged)
    } else {
        (bpp, Layout::Horizontal)
    };
    match FrameBuffer::try_new(config.width, config.height, bpp, layout) {
        Ok(framebuffer) => Some(framebuffer),
        Err(_) => {
            error!(
                "no memory for a {}x{} frame buffer at {} bpp",
                config.width, config.height, bpp
            );
            None
        }
    }
}

/// Bring up a display with default [`Builder`] options
///
/// # Errors
///
/// See [`Builder::build`].
pub fn construct<I, D>(config: DeviceConfig, interface: I, delay: D) -> Result<Display<I, D>, Error<I>>
where
    I: DisplayInterface,
    D: DelayNs,
{
    Builder::new().build(config, interface, delay)
}

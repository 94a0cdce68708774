//! Vendor panel drivers
//!
//! RGB timing panels and DSI panels are refreshed by dedicated peripherals
//! that this crate does not program itself. Instead a [`NativePanelDriver`]
//! wraps the vendor calls, and a [`NativePanelProvider`] creates one when
//! the factory meets such a panel.
//!
//! ## Example
//!
//! ```
//! use panelkit::native::{NativeError, NativePanelDriver, NativePanelParams};
//! use panelkit::sim::{RecordingDelay, SimNativePanel};
//! use panelkit::{Builder, NoInterface, descriptor};
//!
//! let config = descriptor::parse(
//!     ":H,DSI7,1024,600,16,DSI,2,-1,23,27,3,2500,52000000,750,0,0\n\
//!      :I\n11,00,78\n29,00,14\n",
//! )
//! .config;
//!
//! let panel = SimNativePanel::new(1024, 600);
//! let log = panel.clone();
//! let display = Builder::new()
//!     .native_provider(
//!         move |params: &NativePanelParams<'_>| -> Result<Box<dyn NativePanelDriver>, NativeError> {
//!             assert_eq!((params.width, params.height), (1024, 600));
//!             Ok(Box::new(panel.clone()))
//!         },
//!     )
//!     .build(config, NoInterface, RecordingDelay::new());
//! assert!(display.is_ok());
//!
//! // Init packets went through the vendor driver
//! assert_eq!(log.commands().len(), 2);
//! ```

use alloc::boxed::Box;

use crate::config::{DeviceConfig, DsiTiming, InterfaceConfig, RgbTiming};

/// Failure reported by a vendor driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeError {
    /// Vendor status code
    pub code: i32,
}

impl NativeError {
    /// Wrap a vendor status code
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

impl core::fmt::Display for NativeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "vendor driver returned {}", self.code)
    }
}

impl core::error::Error for NativeError {}

/// Vendor calls needed by timing-generator and packet-serial panels
///
/// Coordinates are physical. `draw_bitmap` takes an exclusive end corner.
pub trait NativePanelDriver {
    /// Persistent RGB565 frame buffer, row-major, `width * height` pixels
    fn framebuffer(&mut self) -> &mut [u16];

    /// Make `len` pixels starting at `start` visible to the scan-out engine
    fn flush_cache(&mut self, start: usize, len: usize);

    /// Mirror the scan direction
    ///
    /// # Errors
    ///
    /// Returns the vendor error on failure.
    fn mirror(&mut self, x: bool, y: bool) -> Result<(), NativeError>;

    /// Exchange the scan axes
    ///
    /// # Errors
    ///
    /// Returns the vendor error on failure.
    fn swap_axes(&mut self, swap: bool) -> Result<(), NativeError>;

    /// Copy a block of pixels into the panel
    ///
    /// # Errors
    ///
    /// Returns the vendor error on failure.
    fn draw_bitmap(
        &mut self,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
        data: &[u16],
    ) -> Result<(), NativeError>;

    /// Switch the panel on or off
    ///
    /// # Errors
    ///
    /// Returns the vendor error on failure.
    fn display_on_off(&mut self, on: bool) -> Result<(), NativeError>;

    /// Enable or disable color inversion
    ///
    /// # Errors
    ///
    /// Returns the vendor error on failure.
    fn invert(&mut self, invert: bool) -> Result<(), NativeError>;

    /// Send a controller command with parameters over the panel's command link
    ///
    /// # Errors
    ///
    /// Returns the vendor error on failure.
    fn send_command(&mut self, command: u8, params: &[u8]) -> Result<(), NativeError>;
}

/// Everything a vendor driver needs to bring up a panel
#[derive(Clone, Copy, Debug)]
pub struct NativePanelParams<'a> {
    /// Physical width
    pub width: u16,
    /// Physical height
    pub height: u16,
    /// Wiring, RGB or DSI
    pub interface: &'a InterfaceConfig,
    /// Sync timings of an RGB panel
    pub rgb_timing: Option<&'a RgbTiming>,
    /// Video timings of a DSI panel
    pub dsi_timing: Option<&'a DsiTiming>,
    /// Color bytes arrive swapped; RGB drivers swap the data pin halves instead
    pub swap_color: bool,
}

impl<'a> NativePanelParams<'a> {
    /// Collect parameters from a device configuration
    ///
    /// Returns `None` when the configuration has no interface.
    pub fn from_config(config: &'a DeviceConfig) -> Option<Self> {
        Some(Self {
            width: config.width,
            height: config.height,
            interface: config.interface.as_ref()?,
            rgb_timing: config.rgb_timing.as_ref(),
            dsi_timing: config.dsi_timing.as_ref(),
            swap_color: config.transfer.swap_color,
        })
    }
}

/// Creates vendor drivers on demand
///
/// Implemented for any `FnMut(&NativePanelParams) -> Result<Box<dyn NativePanelDriver>, NativeError>`.
pub trait NativePanelProvider {
    /// Bring up a driver for the described panel
    ///
    /// # Errors
    ///
    /// Returns the vendor error when the panel could not be started.
    fn create(
        &mut self,
        params: &NativePanelParams<'_>,
    ) -> Result<Box<dyn NativePanelDriver>, NativeError>;
}

impl<F> NativePanelProvider for F
where
    F: FnMut(&NativePanelParams<'_>) -> Result<Box<dyn NativePanelDriver>, NativeError>,
{
    fn create(
        &mut self,
        params: &NativePanelParams<'_>,
    ) -> Result<Box<dyn NativePanelDriver>, NativeError> {
        self(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use alloc::format;

    #[test]
    fn test_params_from_rgb_config() {
        let config = descriptor::parse(
            ":H,RGB,800,480,16,RGB,40,41,39,42,2,8,3,46,9,1,5,6,7,15,16,4,45,48,47,21,14,14\n\
             :V,1,8,4,8,1,8,4,8,1\n\
             :B,40,2\n",
        )
        .config;
        let params = NativePanelParams::from_config(&config);
        assert!(matches!(
            params,
            Some(NativePanelParams {
                width: 800,
                height: 480,
                interface: InterfaceConfig::Rgb(_),
                rgb_timing: Some(_),
                dsi_timing: None,
                swap_color: true,
            })
        ));
    }

    #[test]
    fn test_params_need_interface() {
        assert!(NativePanelParams::from_config(&DeviceConfig::default()).is_none());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", NativeError::new(-3)), "vendor driver returned -3");
    }
}

//! Descriptor-driven display driver
//!
//! One driver for many panels. A short text descriptor names the controller,
//! its geometry, the bus it sits on, an init command stream and the opcodes
//! for addressing, rotation and refresh. The crate parses it, picks a
//! backend and exposes a uniform drawing surface.
//!
//! ## Features
//!
//! - `no_std` compatible (needs `alloc`)
//! - `embedded-hal` v1.0 support
//! - `embedded-graphics` integration (with `graphics` feature)
//! - SPI, 3-wire SPI, I2C and 8/16-bit parallel transports
//! - Addressed TFTs, paged OLEDs, e-paper and vendor-driven RGB/DSI panels
//! - Software frame buffer for 1, 2, 4 and 8 bpp panels
//!
//! ## Usage
//!
//! ```
//! use panelkit::sim::{RecordingDelay, RecordingInterface};
//! use panelkit::{Rotation, construct, descriptor};
//!
//! let parsed = descriptor::parse(
//!     ":H,ST7789,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n\
//!      :I\n01,A0\n11,80\n29,A0\n\
//!      :A,2A,2B,2C,16\n\
//!      :R,36,00\n:0,00,0,0,0\n:1,60,0,0,1\n\
//!      :i,20,21\n",
//! );
//! assert!(parsed.issues.is_empty());
//!
//! let mut display = construct(parsed.config, RecordingInterface::new(), RecordingDelay::new()).unwrap();
//! display.init_display(Rotation::Rotate90).unwrap();
//! display.fill_rect(0, 0, 10, 10, 0xF800).unwrap();
//! assert_eq!((display.width(), display.height()), (320, 240));
//! ```

#![no_std]

extern crate alloc;

/// RGB565 palette and color reduction
pub mod color;
/// Command stream encoding and pseudo-opcodes
pub mod command;
/// Parsed device configuration
pub mod config;
/// Descriptor text parsing and writing
pub mod descriptor;
/// Drawing facade over a panel backend
pub mod display;
/// Error types for the driver
pub mod error;
/// Display construction from a configuration
pub mod factory;
/// Software frame buffer for packed pixel depths
pub mod framebuffer;
/// Hardware interface abstraction
pub mod interface;
/// Init and refresh command stream execution
pub mod interpreter;
/// Vendor driver seam for RGB and DSI panels
pub mod native;
/// Panel backends
pub mod panel;
/// E-paper refresh planning
pub mod refresh;
/// Coordinate rotation utilities
pub mod rotation;
/// Recording doubles for running without hardware
pub mod sim;

/// Graphics support via embedded-graphics (requires `graphics` feature)
#[cfg(feature = "graphics")]
pub mod graphics;

pub use config::DeviceConfig;
pub use display::Display;
pub use error::Error;
pub use factory::{Builder, DEFAULT_BUSY_TIMEOUT_MS, construct};
pub use interface::{
    DisplayInterface, I2cInterface, InterfaceError, NoInterface, NoPin, ParallelInterface,
    SpiInterface, ThreeWireInterface,
};
pub use panel::{Panel, PanelKind};
pub use refresh::{RefreshMode, RefreshState};
pub use rotation::Rotation;

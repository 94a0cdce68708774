//! Error types for the driver
//!
//! ## Error Types
//!
//! - [`Error`] - Runtime errors during construction and display operations
//! - [`InterfaceError`](crate::interface::InterfaceError) - Low-level bus and pin errors
//! - [`NativeError`](crate::native::NativeError) - Failures reported by a vendor panel driver
//!
//! Descriptor problems are never errors: the parser skips the offending line
//! and records a [`ParseIssue`](crate::descriptor::ParseIssue) instead.
//!
//! ## Example
//!
//! ```
//! use panelkit::sim::{RecordingDelay, RecordingInterface};
//! use panelkit::{DeviceConfig, Error, construct};
//!
//! // A configuration without an interface line cannot produce a panel
//! let result = construct(
//!     DeviceConfig::default(),
//!     RecordingInterface::new(),
//!     RecordingDelay::new(),
//! );
//! assert!(matches!(result, Err(Error::NoValidConfiguration)));
//! ```

use crate::config::InterfaceKind;
use crate::interface::DisplayInterface;
use crate::native::NativeError;

/// Errors that can occur when interacting with the display
///
/// Generic over the interface type to preserve the specific error type.
/// This allows error handling code to match on the underlying hardware error.
#[derive(Debug)]
pub enum Error<I: DisplayInterface> {
    /// Interface error (bus or GPIO)
    ///
    /// Wraps the underlying hardware error from the [`DisplayInterface`] implementation.
    Interface(I::Error),
    /// The descriptor did not name a recognized interface
    ///
    /// Callers treat this as "no display" rather than a fatal fault.
    NoValidConfiguration,
    /// The interface kind needs support that was not supplied
    ///
    /// RGB and DSI panels need a [`NativePanelProvider`](crate::native::NativePanelProvider).
    UnsupportedInterface(InterfaceKind),
    /// The vendor panel driver reported a failure
    Native(NativeError),
}

impl<I: DisplayInterface> core::fmt::Display for Error<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Interface(e) => write!(f, "Interface error: {e:?}"),
            Self::NoValidConfiguration => write!(f, "No valid interface configuration"),
            Self::UnsupportedInterface(kind) => {
                write!(f, "Unsupported interface: {kind:?}")
            }
            Self::Native(e) => write!(f, "Native panel error: {e}"),
        }
    }
}

impl<I: DisplayInterface + core::fmt::Debug> core::error::Error for Error<I> {}

/// Combine an operation result with the result of releasing a held resource
///
/// The release always happens before this is called; an error from the
/// operation wins over an error from the release.
pub(crate) fn release<T, E>(result: Result<T, E>, released: Result<(), E>) -> Result<T, E> {
    result.and_then(|value| released.map(|()| value))
}

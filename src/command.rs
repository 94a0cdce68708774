//! Command definitions
//!
//! This module defines the encoded command stream format used by init and
//! refresh tables, the e-paper pseudo-opcodes, and the fixed controller
//! commands the panels send on their own.
//!
//! ## Encoded Command Stream
//!
//! A command table is a sequence of records:
//!
//! ```text
//! [opcode] [flags] [arg0] [arg1] ... [argN-1]
//! ```
//!
//! | Flags bits | Meaning |
//! |------------|---------|
//! | 4..0       | argument count N (6..0 for the wide variant) |
//! | 7          | delay after the record |
//! | 7..5       | delay class, see [`delay_class_ms`] |
//!
//! Opcodes from [`EPD_RESET`] to [`EPD_BREAK_RR_NEQ`] are pseudo-opcodes when
//! e-paper handling is enabled: they are executed by the driver instead of
//! being sent to the controller. Bit 0 of their flags marks an inline
//! argument byte.
//!
//! ## Example
//!
//! ```
//! use panelkit::command::{self, PseudoOp};
//!
//! assert_eq!(command::delay_class_ms(0x80), Some(150));
//! assert_eq!(command::delay_class_ms(0x04), None);
//! assert_eq!(PseudoOp::try_from(0x63), Ok(PseudoOp::WaitIdle));
//! ```

// Stream format

/// Argument count mask of the flags byte
pub const ARG_COUNT_MASK: u8 = 0x1F;

/// Argument count mask of the flags byte for side-channel init streams
pub const WIDE_ARG_COUNT_MASK: u8 = 0x7F;

/// "Delay after" bit of the flags byte
pub const DELAY_FLAG: u8 = 0x80;

/// Delay class bits of the flags byte
pub const DELAY_CLASS_MASK: u8 = 0xE0;

/// Inline argument bit of a pseudo-opcode's flags byte
pub const INLINE_ARG_FLAG: u8 = 0x01;

/// Delay in milliseconds for the class selected by `flags`
///
/// Returns `None` when no delay is requested.
pub const fn delay_class_ms(flags: u8) -> Option<u32> {
    match flags & DELAY_CLASS_MASK {
        0x80 => Some(150),
        0xA0 => Some(10),
        0xE0 => Some(500),
        _ => None,
    }
}

// E-paper pseudo-opcodes

/// Pulse the reset line (0x60)
///
/// Low for N ms, high, then wait N ms.
pub const EPD_RESET: u8 = 0x60;

/// Load the full-refresh LUT (0x61)
pub const EPD_LUT_FULL: u8 = 0x61;

/// Load the partial-refresh LUT (0x62)
pub const EPD_LUT_PARTIAL: u8 = 0x62;

/// Wait for the busy line, up to N x 10 ms (0x63)
pub const EPD_WAIT_IDLE: u8 = 0x63;

/// Program the full-screen RAM window (0x64)
pub const EPD_SET_MEM_AREA: u8 = 0x64;

/// Reset the RAM address pointer to the origin (0x65)
pub const EPD_SET_MEM_PTR: u8 = 0x65;

/// Stream the inverted frame buffer as data only (0x66)
pub const EPD_SEND_DATA: u8 = 0x66;

/// Fill controller RAM with white (0x67)
pub const EPD_CLR_FRAME: u8 = 0x67;

/// Write the inverted frame buffer into controller RAM (0x68)
pub const EPD_SEND_FRAME: u8 = 0x68;

/// Abort the stream when the reset reason equals the inline byte (0x69)
pub const EPD_BREAK_RR_EQU: u8 = 0x69;

/// Abort the stream when the reset reason differs from the inline byte (0x6A)
pub const EPD_BREAK_RR_NEQ: u8 = 0x6A;

/// A decoded e-paper pseudo-opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PseudoOp {
    /// See [`EPD_RESET`]
    Reset,
    /// See [`EPD_LUT_FULL`]
    LutFull,
    /// See [`EPD_LUT_PARTIAL`]
    LutPartial,
    /// See [`EPD_WAIT_IDLE`]
    WaitIdle,
    /// See [`EPD_SET_MEM_AREA`]
    SetMemArea,
    /// See [`EPD_SET_MEM_PTR`]
    SetMemPtr,
    /// See [`EPD_SEND_DATA`]
    SendData,
    /// See [`EPD_CLR_FRAME`]
    ClearFrame,
    /// See [`EPD_SEND_FRAME`]
    SendFrame,
    /// See [`EPD_BREAK_RR_EQU`]
    BreakIfResetReasonEquals,
    /// See [`EPD_BREAK_RR_NEQ`]
    BreakIfResetReasonDiffers,
}

impl TryFrom<u8> for PseudoOp {
    type Error = u8;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        Ok(match opcode {
            EPD_RESET => Self::Reset,
            EPD_LUT_FULL => Self::LutFull,
            EPD_LUT_PARTIAL => Self::LutPartial,
            EPD_WAIT_IDLE => Self::WaitIdle,
            EPD_SET_MEM_AREA => Self::SetMemArea,
            EPD_SET_MEM_PTR => Self::SetMemPtr,
            EPD_SEND_DATA => Self::SendData,
            EPD_CLR_FRAME => Self::ClearFrame,
            EPD_SEND_FRAME => Self::SendFrame,
            EPD_BREAK_RR_EQU => Self::BreakIfResetReasonEquals,
            EPD_BREAK_RR_NEQ => Self::BreakIfResetReasonDiffers,
            other => return Err(other),
        })
    }
}

// E-paper controller commands

/// Write LUT register (0x32)
///
/// Used when a LUT table does not declare its own load command.
pub const WRITE_LUT: u8 = 0x32;

/// Set RAM X address start/end (0x44)
///
/// Addresses are in bytes (pixel / 8).
pub const SET_RAM_X_RANGE: u8 = 0x44;

/// Set RAM Y address start/end (0x45)
pub const SET_RAM_Y_RANGE: u8 = 0x45;

/// Set RAM X address counter (0x4E)
pub const SET_RAM_X_COUNTER: u8 = 0x4E;

/// Set RAM Y address counter (0x4F)
pub const SET_RAM_Y_COUNTER: u8 = 0x4F;

/// Write RAM (0x24)
pub const WRITE_RAM: u8 = 0x24;

/// Display update control 2 (0x22)
pub const DISPLAY_UPDATE_CTRL2: u8 = 0x22;

/// Update sequence: enable clock and analog, display pattern (0xC4)
pub const UPDATE_SEQUENCE: u8 = 0xC4;

/// Master activation (0x20)
///
/// Runs the sequence selected by [`DISPLAY_UPDATE_CTRL2`].
pub const MASTER_ACTIVATION: u8 = 0x20;

/// No operation, terminates a frame write (0xFF)
pub const NOP: u8 = 0xFF;

// Paged (OLED) controller commands

/// Set page start address, page number is added (0xB0)
pub const SET_PAGE_START: u8 = 0xB0;

/// Set lower column start nibble (0x00)
pub const SET_LOWER_COLUMN: u8 = 0x00;

/// Set higher column start nibble (0x10)
pub const SET_HIGHER_COLUMN: u8 = 0x10;

// I2C control bytes

/// Control byte announcing a command (0x00)
pub const I2C_CONTROL_COMMAND: u8 = 0x00;

/// Control byte announcing display data (0x40)
pub const I2C_CONTROL_DATA: u8 = 0x40;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_classes() {
        assert_eq!(delay_class_ms(0x80), Some(150));
        assert_eq!(delay_class_ms(0x85), Some(150));
        assert_eq!(delay_class_ms(0xA0), Some(10));
        assert_eq!(delay_class_ms(0xC0), None);
        assert_eq!(delay_class_ms(0xE3), Some(500));
        assert_eq!(delay_class_ms(0x1F), None);
    }

    #[test]
    fn test_pseudo_op_range() {
        for opcode in EPD_RESET..=EPD_BREAK_RR_NEQ {
            assert!(PseudoOp::try_from(opcode).is_ok());
        }
        assert_eq!(PseudoOp::try_from(0x5F), Err(0x5F));
        assert_eq!(PseudoOp::try_from(0x6B), Err(0x6B));
    }
}

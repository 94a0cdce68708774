//! Hardware interface abstraction
//!
//! This module provides the [`DisplayInterface`] trait and its implementations
//! for the physical buses a display controller can sit on:
//!
//! - [`SpiInterface`] - 4-wire SPI (SpiDevice + DC, optional RST and BUSY)
//! - [`ThreeWireInterface`] - bit-banged 9-bit SPI, the D/C flag travels as the first bit
//! - [`I2cInterface`] - I2C with a control byte in front of every transfer
//! - [`ParallelInterface`] - 8 or 16 data pins with a WR strobe
//! - [`NoInterface`] - panels driven entirely through a native driver
//!
//! Absent pins are expressed with [`NoPin`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use panelkit::{DisplayInterface, NoPin, SpiInterface};
//! # use core::convert::Infallible;
//! # use embedded_hal::digital::OutputPin;
//! # use embedded_hal::spi::{Operation, SpiDevice};
//! # struct MockSpi;
//! # impl embedded_hal::spi::ErrorType for MockSpi { type Error = Infallible; }
//! # impl SpiDevice for MockSpi {
//! #     fn transaction(
//! #         &mut self,
//! #         _operations: &mut [Operation<'_, u8>],
//! #     ) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct MockPin;
//! # impl embedded_hal::digital::ErrorType for MockPin { type Error = Infallible; }
//! # impl OutputPin for MockPin {
//! #     fn set_low(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! // SPI device plus DC and reset, no busy line
//! let mut interface = SpiInterface::new(MockSpi, MockPin, Some(MockPin), None::<NoPin>);
//!
//! // Column address set, 32-bit window
//! let _ = interface.write_command(0x2A);
//! let _ = interface.write_data32(0x0000_00EF);
//! ```

use core::convert::Infallible;
use core::fmt::Debug;
use embedded_hal::digital::{Error as _, ErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{Error as _, I2c};
use embedded_hal::spi::{Error as _, SpiDevice};

use crate::command::{I2C_CONTROL_COMMAND, I2C_CONTROL_DATA};
use crate::error::{Error, release};

pub(crate) type InterfaceResult<T, E> = core::result::Result<T, E>;

/// Largest payload sent in one I2C data transfer, excluding the control byte
pub const I2C_MAX_DATA_CHUNK: usize = 31;

/// Trait for the transport between the driver and a display controller
///
/// Only [`write_command`](Self::write_command) and [`write_data`](Self::write_data)
/// are required. Everything else has a default that either builds on those two
/// or does nothing, so a transport only overrides what its hardware has.
///
/// Multi-byte data words are sent most significant byte first.
pub trait DisplayInterface {
    /// Error type for interface operations
    ///
    /// Must implement [`Debug`] for error reporting.
    type Error: Debug;

    /// Claim the bus for a sequence of writes
    fn begin_transaction(&mut self) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }

    /// Release the bus claimed by [`begin_transaction`](Self::begin_transaction)
    fn end_transaction(&mut self) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }

    /// Assert chip select
    fn cs_low(&mut self) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }

    /// Deassert chip select
    fn cs_high(&mut self) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }

    /// Send a command byte to the controller
    ///
    /// # Errors
    ///
    /// Returns an error if bus communication or GPIO fails.
    fn write_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error>;

    /// Send data bytes to the controller
    ///
    /// # Errors
    ///
    /// Returns an error if bus communication or GPIO fails.
    fn write_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error>;

    /// Send a single data byte
    fn write_data8(&mut self, value: u8) -> InterfaceResult<(), Self::Error> {
        self.write_data(&[value])
    }

    /// Send a 16-bit data word
    fn write_data16(&mut self, value: u16) -> InterfaceResult<(), Self::Error> {
        self.write_data(&value.to_be_bytes())
    }

    /// Send a 32-bit data word
    fn write_data32(&mut self, value: u32) -> InterfaceResult<(), Self::Error> {
        self.write_data(&value.to_be_bytes())
    }

    /// Send a run of RGB565 pixels
    ///
    /// Transports with a bulk engine may start the transfer and return early;
    /// [`wait_transfer`](Self::wait_transfer) blocks until it drains.
    fn write_pixels(&mut self, pixels: &[u16]) -> InterfaceResult<(), Self::Error> {
        for &pixel in pixels {
            self.write_data16(pixel)?;
        }
        Ok(())
    }

    /// Write a register/value pair
    fn write_register(&mut self, register: u8, value: u8) -> InterfaceResult<(), Self::Error> {
        self.write_command(register)?;
        self.write_data8(value)
    }

    /// Drive the reset line, if there is one
    fn set_reset(&mut self, _high: bool) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }

    /// Sample the busy line
    ///
    /// Returns `None` when the transport has no busy line.
    fn busy_level(&mut self) -> InterfaceResult<Option<bool>, Self::Error> {
        Ok(None)
    }

    /// Block until an in-flight bulk transfer has finished
    fn wait_transfer(&mut self) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }
}

/// Run `op` with chip select asserted, releasing it even when `op` fails
pub(crate) fn selected<I: DisplayInterface, T>(
    interface: &mut I,
    op: impl FnOnce(&mut I) -> InterfaceResult<T, I::Error>,
) -> InterfaceResult<T, I::Error> {
    interface.cs_low()?;
    let result = op(interface);
    release(result, interface.cs_high())
}

/// Run `op` inside a bus transaction, ending it even when `op` fails
pub(crate) fn transaction<I: DisplayInterface, T>(
    interface: &mut I,
    op: impl FnOnce(&mut I) -> InterfaceResult<T, Error<I>>,
) -> InterfaceResult<T, Error<I>> {
    interface.begin_transaction().map_err(Error::Interface)?;
    let result = op(interface);
    release(result, interface.end_transaction().map_err(Error::Interface))
}

/// Errors that can occur at the interface level
///
/// Bus and pin errors are reduced to their embedded-hal error kinds so a
/// single transport can mix pins from different HAL types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterfaceError {
    /// SPI communication error
    Spi(embedded_hal::spi::ErrorKind),
    /// I2C communication error
    I2c(embedded_hal::i2c::ErrorKind),
    /// GPIO pin error
    Pin(embedded_hal::digital::ErrorKind),
}

impl core::fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {e}"),
            Self::I2c(e) => write!(f, "I2C error: {e}"),
            Self::Pin(e) => write!(f, "Pin error: {e}"),
        }
    }
}

impl core::error::Error for InterfaceError {}

fn pin_error<E: embedded_hal::digital::Error>(e: E) -> InterfaceError {
    InterfaceError::Pin(e.kind())
}

fn spi_error<E: embedded_hal::spi::Error>(e: E) -> InterfaceError {
    InterfaceError::Spi(e.kind())
}

fn i2c_error<E: embedded_hal::i2c::Error>(e: E) -> InterfaceError {
    InterfaceError::I2c(e.kind())
}

/// Placeholder for a pin that is not wired
///
/// Writes are ignored and reads report low.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// 4-wire SPI transport
///
/// Chip select is owned by the [`SpiDevice`], so [`DisplayInterface::cs_low`]
/// and [`DisplayInterface::cs_high`] are no-ops here.
///
/// ## Type Parameters
///
/// * `SPI` - SPI device implementing [`SpiDevice`]
/// * `DC` - Data/Command pin implementing [`OutputPin`]
/// * `RST` - Reset pin implementing [`OutputPin`]
/// * `BUSY` - Busy pin implementing [`InputPin`]
pub struct SpiInterface<SPI, DC, RST, BUSY> {
    /// SPI device for communication
    spi: SPI,
    /// Data/Command select pin (low=command, high=data)
    dc: DC,
    /// Reset pin (active low)
    rst: Option<RST>,
    /// Busy pin, raw level is reported
    busy: Option<BUSY>,
}

impl<SPI, DC, RST, BUSY> SpiInterface<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    /// Create a new SPI transport
    ///
    /// Pass `None` for pins that are not wired.
    pub fn new(spi: SPI, dc: DC, rst: Option<RST>, busy: Option<BUSY>) -> Self {
        Self { spi, dc, rst, busy }
    }

    /// Consume the transport and return the SPI device and pins
    pub fn release(self) -> (SPI, DC, Option<RST>, Option<BUSY>) {
        (self.spi, self.dc, self.rst, self.busy)
    }
}

impl<SPI, DC, RST, BUSY> DisplayInterface for SpiInterface<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    type Error = InterfaceError;

    fn write_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error> {
        self.dc.set_low().map_err(pin_error)?;
        self.spi.write(&[command]).map_err(spi_error)
    }

    fn write_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error> {
        self.dc.set_high().map_err(pin_error)?;
        self.spi.write(data).map_err(spi_error)
    }

    fn write_pixels(&mut self, pixels: &[u16]) -> InterfaceResult<(), Self::Error> {
        self.dc.set_high().map_err(pin_error)?;
        let mut bytes = [0u8; 64];
        for chunk in pixels.chunks(bytes.len() / 2) {
            for (pair, pixel) in bytes.chunks_exact_mut(2).zip(chunk) {
                pair.copy_from_slice(&pixel.to_be_bytes());
            }
            self.spi.write(&bytes[..chunk.len() * 2]).map_err(spi_error)?;
        }
        Ok(())
    }

    fn set_reset(&mut self, high: bool) -> InterfaceResult<(), Self::Error> {
        match self.rst.as_mut() {
            Some(rst) if high => rst.set_high().map_err(pin_error),
            Some(rst) => rst.set_low().map_err(pin_error),
            None => Ok(()),
        }
    }

    fn busy_level(&mut self) -> InterfaceResult<Option<bool>, Self::Error> {
        match self.busy.as_mut() {
            Some(busy) => busy.is_high().map(Some).map_err(pin_error),
            None => Ok(None),
        }
    }
}

/// Bit-banged 3-wire SPI transport with 9-bit framing
///
/// Each byte is preceded by a D/C bit (0 = command, 1 = data) and shifted out
/// MSB first on the rising edge of SCK. Panels with a timing-generator bus
/// often expose their register interface this way.
pub struct ThreeWireInterface<SCK, MOSI, CS, RST> {
    sck: SCK,
    mosi: MOSI,
    cs: CS,
    rst: Option<RST>,
}

impl<SCK, MOSI, CS, RST> ThreeWireInterface<SCK, MOSI, CS, RST>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    CS: OutputPin,
    RST: OutputPin,
{
    /// Create a new 3-wire transport
    pub fn new(sck: SCK, mosi: MOSI, cs: CS, rst: Option<RST>) -> Self {
        Self { sck, mosi, cs, rst }
    }

    fn write_bit(&mut self, bit: bool) -> InterfaceResult<(), InterfaceError> {
        self.sck.set_low().map_err(pin_error)?;
        if bit {
            self.mosi.set_high().map_err(pin_error)?;
        } else {
            self.mosi.set_low().map_err(pin_error)?;
        }
        self.sck.set_high().map_err(pin_error)
    }

    fn write_word(&mut self, data: bool, value: u8) -> InterfaceResult<(), InterfaceError> {
        self.write_bit(data)?;
        for shift in (0..8).rev() {
            self.write_bit(value >> shift & 1 != 0)?;
        }
        Ok(())
    }
}

impl<SCK, MOSI, CS, RST> DisplayInterface for ThreeWireInterface<SCK, MOSI, CS, RST>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    CS: OutputPin,
    RST: OutputPin,
{
    type Error = InterfaceError;

    fn cs_low(&mut self) -> InterfaceResult<(), Self::Error> {
        self.cs.set_low().map_err(pin_error)
    }

    fn cs_high(&mut self) -> InterfaceResult<(), Self::Error> {
        self.cs.set_high().map_err(pin_error)
    }

    fn write_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error> {
        self.write_word(false, command)
    }

    fn write_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error> {
        for &byte in data {
            self.write_word(true, byte)?;
        }
        Ok(())
    }

    fn set_reset(&mut self, high: bool) -> InterfaceResult<(), Self::Error> {
        match self.rst.as_mut() {
            Some(rst) if high => rst.set_high().map_err(pin_error),
            Some(rst) => rst.set_low().map_err(pin_error),
            None => Ok(()),
        }
    }
}

/// I2C transport for paged OLED controllers
///
/// Commands go out as `[0x00, cmd]`, data as `[0x40, bytes...]` in chunks of
/// at most [`I2C_MAX_DATA_CHUNK`] bytes. [`DisplayInterface::write_register`]
/// sends the raw `[register, value]` pair without a control byte.
pub struct I2cInterface<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cInterface<I2C> {
    /// Create a new I2C transport for the 7-bit `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Device address in use
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Consume the transport and return the bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> DisplayInterface for I2cInterface<I2C> {
    type Error = InterfaceError;

    fn write_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error> {
        self.i2c
            .write(self.address, &[I2C_CONTROL_COMMAND, command])
            .map_err(i2c_error)
    }

    fn write_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error> {
        let mut frame = [0u8; I2C_MAX_DATA_CHUNK + 1];
        frame[0] = I2C_CONTROL_DATA;
        for chunk in data.chunks(I2C_MAX_DATA_CHUNK) {
            frame[1..=chunk.len()].copy_from_slice(chunk);
            self.i2c
                .write(self.address, &frame[..=chunk.len()])
                .map_err(i2c_error)?;
        }
        Ok(())
    }

    fn write_register(&mut self, register: u8, value: u8) -> InterfaceResult<(), Self::Error> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(i2c_error)
    }
}

/// Intel 8080 style parallel transport
///
/// `N` is the bus width, 8 or 16. With a 16-bit bus a data word is latched in
/// a single WR strobe; with an 8-bit bus it takes two, high byte first.
///
/// ## Type Parameters
///
/// * `DC` - Register select pin (low=command, high=data)
/// * `WR` - Write strobe, data is latched on the rising edge
/// * `CS` - Chip select
/// * `RST` - Reset pin
/// * `P` - Data pin type, `N` of them, D0 first
pub struct ParallelInterface<DC, WR, CS, RST, P, const N: usize> {
    dc: DC,
    wr: WR,
    cs: CS,
    rst: Option<RST>,
    data: [P; N],
}

impl<DC, WR, CS, RST, P, const N: usize> ParallelInterface<DC, WR, CS, RST, P, N>
where
    DC: OutputPin,
    WR: OutputPin,
    CS: OutputPin,
    RST: OutputPin,
    P: OutputPin,
{
    /// Create a new parallel transport
    pub fn new(dc: DC, wr: WR, cs: CS, rst: Option<RST>, data: [P; N]) -> Self {
        Self {
            dc,
            wr,
            cs,
            rst,
            data,
        }
    }

    fn latch(&mut self, value: u16) -> InterfaceResult<(), InterfaceError> {
        self.wr.set_low().map_err(pin_error)?;
        for (bit, pin) in self.data.iter_mut().enumerate() {
            if value >> bit & 1 != 0 {
                pin.set_high().map_err(pin_error)?;
            } else {
                pin.set_low().map_err(pin_error)?;
            }
        }
        self.wr.set_high().map_err(pin_error)
    }
}

impl<DC, WR, CS, RST, P, const N: usize> DisplayInterface
    for ParallelInterface<DC, WR, CS, RST, P, N>
where
    DC: OutputPin,
    WR: OutputPin,
    CS: OutputPin,
    RST: OutputPin,
    P: OutputPin,
{
    type Error = InterfaceError;

    fn cs_low(&mut self) -> InterfaceResult<(), Self::Error> {
        self.cs.set_low().map_err(pin_error)
    }

    fn cs_high(&mut self) -> InterfaceResult<(), Self::Error> {
        self.cs.set_high().map_err(pin_error)
    }

    fn write_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error> {
        self.dc.set_low().map_err(pin_error)?;
        self.latch(command as u16)
    }

    fn write_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error> {
        self.dc.set_high().map_err(pin_error)?;
        for &byte in data {
            self.latch(byte as u16)?;
        }
        Ok(())
    }

    fn write_data16(&mut self, value: u16) -> InterfaceResult<(), Self::Error> {
        if N < 16 {
            return self.write_data(&value.to_be_bytes());
        }
        self.dc.set_high().map_err(pin_error)?;
        self.latch(value)
    }

    fn write_data32(&mut self, value: u32) -> InterfaceResult<(), Self::Error> {
        self.write_data16((value >> 16) as u16)?;
        self.write_data16(value as u16)
    }

    fn set_reset(&mut self, high: bool) -> InterfaceResult<(), Self::Error> {
        match self.rst.as_mut() {
            Some(rst) if high => rst.set_high().map_err(pin_error),
            Some(rst) => rst.set_low().map_err(pin_error),
            None => Ok(()),
        }
    }
}

/// Transport for panels that have no command bus of their own
///
/// Every write succeeds and goes nowhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterface;

impl DisplayInterface for NoInterface {
    type Error = Infallible;

    fn write_command(&mut self, _command: u8) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }

    fn write_data(&mut self, _data: &[u8]) -> InterfaceResult<(), Self::Error> {
        Ok(())
    }
}

//! Recording doubles for running the driver without hardware
//!
//! - [`RecordingInterface`] logs every transport primitive as an [`Event`]
//! - [`RecordingDelay`] keeps a tally of requested delays
//! - [`SimNativePanel`] stands in for a vendor RGB or DSI driver
//!
//! ## Example
//!
//! ```
//! use panelkit::sim::{Event, RecordingDelay, RecordingInterface};
//! use panelkit::{DisplayInterface, interpreter::Interpreter};
//!
//! let mut interface = RecordingInterface::new();
//! let mut delay = RecordingDelay::new();
//! let _ = Interpreter::new().run(&mut interface, &mut delay, &[0x11, 0x80], None);
//!
//! assert_eq!(interface.commands(), [0x11]);
//! assert_eq!(delay.calls_ms(), [150]);
//! assert!(interface.is_idle());
//! ```

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_hal::delay::DelayNs;

use crate::interface::DisplayInterface;
use crate::native::{NativeError, NativePanelDriver};

/// One transport primitive, as seen by [`RecordingInterface`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// [`DisplayInterface::begin_transaction`]
    Begin,
    /// [`DisplayInterface::end_transaction`]
    End,
    /// [`DisplayInterface::cs_low`]
    CsLow,
    /// [`DisplayInterface::cs_high`]
    CsHigh,
    /// [`DisplayInterface::write_command`]
    Command(u8),
    /// [`DisplayInterface::write_data`]
    Data(Vec<u8>),
    /// [`DisplayInterface::write_data8`]
    Data8(u8),
    /// [`DisplayInterface::write_data16`]
    Data16(u16),
    /// [`DisplayInterface::write_data32`]
    Data32(u32),
    /// [`DisplayInterface::write_pixels`]
    Pixels(Vec<u16>),
    /// [`DisplayInterface::write_register`]
    Register(u8, u8),
    /// [`DisplayInterface::set_reset`]
    Reset(bool),
    /// [`DisplayInterface::wait_transfer`]
    WaitTransfer,
}

/// Errors produced by [`RecordingInterface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// A write failed because of [`RecordingInterface::fail_after`]
    Injected,
    /// A transaction was ended that was never begun
    Bus,
}

impl core::fmt::Display for SimError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Injected => write!(f, "injected write failure"),
            Self::Bus => write!(f, "unbalanced transaction"),
        }
    }
}

impl core::error::Error for SimError {}

/// Transport that records instead of transmitting
#[derive(Debug, Default)]
pub struct RecordingInterface {
    events: Vec<Event>,
    busy: Option<VecDeque<bool>>,
    fail_after: Option<usize>,
    writes: usize,
    transactions: usize,
    selected: usize,
}

impl RecordingInterface {
    /// A transport without a busy line
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a busy line that reports `levels` in order, then low forever
    #[must_use]
    pub fn with_busy(mut self, levels: impl IntoIterator<Item = bool>) -> Self {
        self.busy = Some(levels.into_iter().collect());
        self
    }

    /// Let `writes` writes succeed, then fail every write with [`SimError::Injected`]
    #[must_use]
    pub fn fail_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Everything recorded so far
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Forget recorded events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Command bytes in order
    pub fn commands(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Command(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// Data bytes in order, multi-byte words flattened most significant byte first
    pub fn data(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for event in &self.events {
            match event {
                Event::Data(data) => bytes.extend_from_slice(data),
                Event::Data8(value) => bytes.push(*value),
                Event::Data16(value) => bytes.extend_from_slice(&value.to_be_bytes()),
                Event::Data32(value) => bytes.extend_from_slice(&value.to_be_bytes()),
                Event::Pixels(pixels) => {
                    for pixel in pixels {
                        bytes.extend_from_slice(&pixel.to_be_bytes());
                    }
                }
                _ => {}
            }
        }
        bytes
    }

    /// Number of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }

    /// Whether every transaction was ended and every chip select released
    pub fn is_idle(&self) -> bool {
        self.transactions == 0 && self.selected == 0
    }

    fn write(&mut self, event: Event) -> Result<(), SimError> {
        if self.fail_after == Some(self.writes) {
            return Err(SimError::Injected);
        }
        self.writes += 1;
        self.events.push(event);
        Ok(())
    }
}

impl DisplayInterface for RecordingInterface {
    type Error = SimError;

    fn begin_transaction(&mut self) -> Result<(), Self::Error> {
        self.transactions += 1;
        self.events.push(Event::Begin);
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<(), Self::Error> {
        self.transactions = self.transactions.checked_sub(1).ok_or(SimError::Bus)?;
        self.events.push(Event::End);
        Ok(())
    }

    fn cs_low(&mut self) -> Result<(), Self::Error> {
        self.selected += 1;
        self.events.push(Event::CsLow);
        Ok(())
    }

    fn cs_high(&mut self) -> Result<(), Self::Error> {
        self.selected = self.selected.saturating_sub(1);
        self.events.push(Event::CsHigh);
        Ok(())
    }

    fn write_command(&mut self, command: u8) -> Result<(), Self::Error> {
        self.write(Event::Command(command))
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.write(Event::Data(data.to_vec()))
    }

    fn write_data8(&mut self, value: u8) -> Result<(), Self::Error> {
        self.write(Event::Data8(value))
    }

    fn write_data16(&mut self, value: u16) -> Result<(), Self::Error> {
        self.write(Event::Data16(value))
    }

    fn write_data32(&mut self, value: u32) -> Result<(), Self::Error> {
        self.write(Event::Data32(value))
    }

    fn write_pixels(&mut self, pixels: &[u16]) -> Result<(), Self::Error> {
        self.write(Event::Pixels(pixels.to_vec()))
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        self.write(Event::Register(register, value))
    }

    fn set_reset(&mut self, high: bool) -> Result<(), Self::Error> {
        self.events.push(Event::Reset(high));
        Ok(())
    }

    fn busy_level(&mut self) -> Result<Option<bool>, Self::Error> {
        Ok(self
            .busy
            .as_mut()
            .map(|levels| levels.pop_front().unwrap_or(false)))
    }

    fn wait_transfer(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::WaitTransfer);
        Ok(())
    }
}

/// Delay that returns immediately and remembers what was asked for
#[derive(Debug, Default, Clone)]
pub struct RecordingDelay {
    total_ns: u64,
    calls_ms: Vec<u32>,
}

impl RecordingDelay {
    /// A delay with nothing recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments of every `delay_ms` call, in order
    pub fn calls_ms(&self) -> &[u32] {
        &self.calls_ms
    }

    /// Sum of all delays in milliseconds, rounded down
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }

    /// Forget recorded delays
    pub fn clear(&mut self) {
        self.total_ns = 0;
        self.calls_ms.clear();
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.total_ns += u64::from(us) * 1_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls_ms.push(ms);
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

/// A block copied by [`NativePanelDriver::draw_bitmap`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    /// Left edge
    pub x0: u16,
    /// Top edge
    pub y0: u16,
    /// Right edge, exclusive
    pub x1: u16,
    /// Bottom edge, exclusive
    pub y1: u16,
    /// Pixels as passed
    pub pixels: Vec<u16>,
}

#[derive(Debug, Default)]
struct NativeLog {
    width: u16,
    visible: Vec<u16>,
    flushes: Vec<(usize, usize)>,
    bitmaps: Vec<Bitmap>,
    mirror: (bool, bool),
    swapped: bool,
    on: Option<bool>,
    inverted: bool,
    commands: Vec<(u8, Vec<u8>)>,
}

/// Vendor driver double backed by a plain pixel array
///
/// Clones share one log, so a test can keep a clone while the driver itself
/// is boxed inside a [`Display`](crate::Display). Pixels become visible in
/// the log only once they are flushed.
#[derive(Clone, Debug)]
pub struct SimNativePanel {
    framebuffer: Vec<u16>,
    log: Rc<RefCell<NativeLog>>,
}

impl SimNativePanel {
    /// A black `width` x `height` panel
    pub fn new(width: u16, height: u16) -> Self {
        let len = usize::from(width) * usize::from(height);
        Self {
            framebuffer: vec![0; len],
            log: Rc::new(RefCell::new(NativeLog {
                width,
                visible: vec![0; len],
                ..NativeLog::default()
            })),
        }
    }

    /// Flushed pixel at physical `(x, y)`
    pub fn visible(&self, x: u16, y: u16) -> Option<u16> {
        let log = self.log.borrow();
        let index = usize::from(y) * usize::from(log.width) + usize::from(x);
        log.visible.get(index).copied()
    }

    /// Flushed `(start, len)` spans in order
    pub fn flushes(&self) -> Vec<(usize, usize)> {
        self.log.borrow().flushes.clone()
    }

    /// Bitmaps drawn so far
    pub fn bitmaps(&self) -> Vec<Bitmap> {
        self.log.borrow().bitmaps.clone()
    }

    /// Current `(mirror x, mirror y)` setting
    pub fn mirror_state(&self) -> (bool, bool) {
        self.log.borrow().mirror
    }

    /// Whether the scan axes are swapped
    pub fn is_swapped(&self) -> bool {
        self.log.borrow().swapped
    }

    /// Last on/off request, `None` before the first one
    pub fn is_on(&self) -> Option<bool> {
        self.log.borrow().on
    }

    /// Whether inversion is on
    pub fn is_inverted(&self) -> bool {
        self.log.borrow().inverted
    }

    /// Commands sent over the panel's command link
    pub fn commands(&self) -> Vec<(u8, Vec<u8>)> {
        self.log.borrow().commands.clone()
    }
}

impl NativePanelDriver for SimNativePanel {
    fn framebuffer(&mut self) -> &mut [u16] {
        &mut self.framebuffer
    }

    fn flush_cache(&mut self, start: usize, len: usize) {
        let mut log = self.log.borrow_mut();
        let end = (start + len).min(self.framebuffer.len());
        if let (Some(target), Some(source)) =
            (log.visible.get_mut(start..end), self.framebuffer.get(start..end))
        {
            target.copy_from_slice(source);
        }
        log.flushes.push((start, len));
    }

    fn mirror(&mut self, x: bool, y: bool) -> Result<(), NativeError> {
        self.log.borrow_mut().mirror = (x, y);
        Ok(())
    }

    fn swap_axes(&mut self, swap: bool) -> Result<(), NativeError> {
        self.log.borrow_mut().swapped = swap;
        Ok(())
    }

    fn draw_bitmap(
        &mut self,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
        data: &[u16],
    ) -> Result<(), NativeError> {
        self.log.borrow_mut().bitmaps.push(Bitmap {
            x0,
            y0,
            x1,
            y1,
            pixels: data.to_vec(),
        });
        Ok(())
    }

    fn display_on_off(&mut self, on: bool) -> Result<(), NativeError> {
        self.log.borrow_mut().on = Some(on);
        Ok(())
    }

    fn invert(&mut self, invert: bool) -> Result<(), NativeError> {
        self.log.borrow_mut().inverted = invert;
        Ok(())
    }

    fn send_command(&mut self, command: u8, params: &[u8]) -> Result<(), NativeError> {
        self.log
            .borrow_mut()
            .commands
            .push((command, params.to_vec()));
        Ok(())
    }
}

//! Encoded command stream execution
//!
//! Init and refresh tables are streams of `[opcode][flags][args...]` records.
//! The low five bits of `flags` count the arguments (seven bits for the wide
//! variant used by side-channel init), bit 7 requests a delay after the
//! record and bits 7..5 pick its length.
//!
//! ## Example
//!
//! ```
//! use panelkit::interpreter::{Interpreter, Outcome};
//! use panelkit::sim::{Event, RecordingDelay, RecordingInterface};
//!
//! let mut interface = RecordingInterface::new();
//! let mut delay = RecordingDelay::new();
//!
//! // Column address set with four arguments, then sleep out with a 150 ms pause
//! let table = [0x2A, 0x04, 0x00, 0x00, 0x00, 0xEF, 0x11, 0x80];
//! let outcome = Interpreter::new().run(&mut interface, &mut delay, &table, None);
//!
//! assert!(matches!(outcome, Ok(Outcome::Completed)));
//! assert_eq!(interface.commands(), [0x2A, 0x11]);
//! assert_eq!(interface.data(), [0x00, 0x00, 0x00, 0xEF]);
//! assert_eq!(delay.calls_ms(), [150]);
//! ```

use embedded_hal::delay::DelayNs;
use log::{trace, warn};

use crate::command::{
    ARG_COUNT_MASK, INLINE_ARG_FLAG, PseudoOp, WIDE_ARG_COUNT_MASK, delay_class_ms,
};
use crate::config::{I2cInitStep, SideInit};
use crate::error::Error;
use crate::interface::{DisplayInterface, selected, transaction};
use crate::native::{NativeError, NativePanelDriver};

/// How a stream run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every record was executed
    Completed,
    /// A pseudo-opcode handler asked to stop
    Aborted,
    /// The last record was cut short and was not sent
    Truncated,
}

/// Whether a stream keeps running after a pseudo-opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Go on with the next record
    Continue,
    /// Stop the stream
    Break,
}

/// Executes e-paper pseudo-opcodes on behalf of the interpreter
pub trait PseudoOpHandler<I: DisplayInterface, D: DelayNs> {
    /// Run `op`, with its inline argument if the record carried one
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn pseudo_op(
        &mut self,
        interface: &mut I,
        delay: &mut D,
        op: PseudoOp,
        arg: Option<u8>,
    ) -> Result<Flow, Error<I>>;
}

/// Command stream interpreter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interpreter {
    all_commands: bool,
    pseudo_ops: bool,
    wide: bool,
}

impl Interpreter {
    /// Interpreter for plain 5-bit count streams
    pub const fn new() -> Self {
        Self {
            all_commands: false,
            pseudo_ops: false,
            wide: false,
        }
    }

    /// Send arguments as command bytes instead of data
    #[must_use]
    pub const fn all_commands(mut self, enabled: bool) -> Self {
        self.all_commands = enabled;
        self
    }

    /// Route opcodes 0x60..=0x6A to the pseudo-opcode handler
    #[must_use]
    pub const fn pseudo_ops(mut self, enabled: bool) -> Self {
        self.pseudo_ops = enabled;
        self
    }

    /// Use 7-bit argument counts
    #[must_use]
    pub const fn wide(mut self, enabled: bool) -> Self {
        self.wide = enabled;
        self
    }

    /// Execute `stream` inside one bus transaction
    ///
    /// The transaction is ended on every path, including transport errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub fn run<I, D>(
        &self,
        interface: &mut I,
        delay: &mut D,
        stream: &[u8],
        handler: Option<&mut dyn PseudoOpHandler<I, D>>,
    ) -> Result<Outcome, Error<I>>
    where
        I: DisplayInterface,
        D: DelayNs,
    {
        transaction(interface, |interface| {
            self.execute(interface, delay, stream, handler)
        })
    }

    fn execute<I, D>(
        &self,
        interface: &mut I,
        delay: &mut D,
        stream: &[u8],
        mut handler: Option<&mut dyn PseudoOpHandler<I, D>>,
    ) -> Result<Outcome, Error<I>>
    where
        I: DisplayInterface,
        D: DelayNs,
    {
        let count_mask = if self.wide {
            WIDE_ARG_COUNT_MASK
        } else {
            ARG_COUNT_MASK
        };
        let mut rest = stream;

        loop {
            let (opcode, flags, tail) = match rest {
                [] => return Ok(Outcome::Completed),
                [opcode, flags, tail @ ..] => (*opcode, *flags, tail),
                [opcode] => {
                    warn!("command stream ends inside record {opcode:#04x}");
                    return Ok(Outcome::Truncated);
                }
            };

            let pseudo = if self.pseudo_ops {
                PseudoOp::try_from(opcode).ok()
            } else {
                None
            };

            if let Some(op) = pseudo {
                let (arg, tail) = if flags & INLINE_ARG_FLAG != 0 {
                    match tail {
                        [arg, tail @ ..] => (Some(*arg), tail),
                        [] => {
                            warn!("command stream ends inside pseudo-opcode {opcode:#04x}");
                            return Ok(Outcome::Truncated);
                        }
                    }
                } else {
                    (None, tail)
                };
                trace!("pseudo-opcode {op:?} arg {arg:?}");

                let flow = match handler.as_deref_mut() {
                    Some(handler) => handler.pseudo_op(interface, delay, op, arg)?,
                    None => Flow::Continue,
                };
                if flow == Flow::Break {
                    return Ok(Outcome::Aborted);
                }
                rest = tail;
            } else {
                let count = usize::from(flags & count_mask);
                let Some(args) = tail.get(..count) else {
                    warn!(
                        "command {opcode:#04x} needs {count} arguments, {} left",
                        tail.len()
                    );
                    return Ok(Outcome::Truncated);
                };
                trace!("command {opcode:#04x} args {args:02x?}");

                selected(interface, |interface| {
                    interface.write_command(opcode)?;
                    for &arg in args {
                        if self.all_commands {
                            interface.write_command(arg)?;
                        } else {
                            interface.write_data8(arg)?;
                        }
                    }
                    Ok(())
                })
                .map_err(Error::Interface)?;
                rest = &tail[count..];
            }

            if let Some(ms) = delay_class_ms(flags) {
                delay.delay_ms(ms);
            }
        }
    }
}

/// Send each byte of `commands` as a command, inside one transaction
///
/// # Errors
///
/// Returns an error if the transport fails.
pub fn run_commands<I: DisplayInterface>(
    interface: &mut I,
    commands: &[u8],
) -> Result<(), Error<I>> {
    transaction(interface, |interface| {
        for &command in commands {
            interface.write_command(command).map_err(Error::Interface)?;
        }
        Ok(())
    })
}

/// Replay the register init of an RGB panel
///
/// A 3-wire SPI stream goes through the wide interpreter. I2C steps become
/// register writes and plain delays.
///
/// # Errors
///
/// Returns an error if the transport fails.
pub fn run_side_init<I, D>(
    interface: &mut I,
    delay: &mut D,
    side: &SideInit,
) -> Result<Outcome, Error<I>>
where
    I: DisplayInterface,
    D: DelayNs,
{
    match side {
        SideInit::Spi { stream, .. } => {
            Interpreter::new()
                .wide(true)
                .run(interface, delay, stream, None)
        }
        SideInit::I2c { steps, .. } => transaction(interface, |interface| {
            for step in steps {
                match *step {
                    I2cInitStep::Register(register, value) => {
                        trace!("side init register {register:#04x} = {value:#04x}");
                        interface
                            .write_register(register, value)
                            .map_err(Error::Interface)?;
                    }
                    I2cInitStep::Delay(ms) => delay.delay_ms(u32::from(ms)),
                }
            }
            Ok(Outcome::Completed)
        }),
    }
}

/// Send a DSI init stream through the vendor driver
///
/// Packets are `[cmd][len][data...][delay_ms]`.
///
/// # Errors
///
/// Returns the vendor error if a command is rejected.
pub fn run_packets<D: DelayNs>(
    driver: &mut dyn NativePanelDriver,
    delay: &mut D,
    stream: &[u8],
) -> Result<Outcome, NativeError> {
    let mut rest = stream;
    while let [command, len, tail @ ..] = rest {
        let len = usize::from(*len);
        let (Some(params), Some(&pause)) = (tail.get(..len), tail.get(len)) else {
            warn!("packet {command:#04x} runs past the end of the stream");
            return Ok(Outcome::Truncated);
        };
        trace!("packet {command:#04x} params {params:02x?} delay {pause}");
        driver.send_command(*command, params)?;
        if pause > 0 {
            delay.delay_ms(u32::from(pause));
        }
        rest = &tail[len + 1..];
    }
    if rest.is_empty() {
        Ok(Outcome::Completed)
    } else {
        warn!("packet stream ends inside a header");
        Ok(Outcome::Truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{EPD_BREAK_RR_EQU, EPD_WAIT_IDLE};
    use crate::sim::{Event, RecordingDelay, RecordingInterface, SimError, SimNativePanel};
    use alloc::vec;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        ops: Vec<(PseudoOp, Option<u8>)>,
    }

    impl<I: DisplayInterface, D: DelayNs> PseudoOpHandler<I, D> for Recorder {
        fn pseudo_op(
            &mut self,
            _interface: &mut I,
            _delay: &mut D,
            op: PseudoOp,
            arg: Option<u8>,
        ) -> Result<Flow, Error<I>> {
            self.ops.push((op, arg));
            if op == PseudoOp::BreakIfResetReasonEquals {
                Ok(Flow::Break)
            } else {
                Ok(Flow::Continue)
            }
        }
    }

    #[test]
    fn test_record_without_delay() {
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let outcome = Interpreter::new().run(
            &mut interface,
            &mut delay,
            &[0x2A, 0x04, 0x01, 0x02, 0x03, 0x04],
            None,
        );

        assert!(matches!(outcome, Ok(Outcome::Completed)));
        assert_eq!(
            interface.events(),
            [
                Event::Begin,
                Event::CsLow,
                Event::Command(0x2A),
                Event::Data8(0x01),
                Event::Data8(0x02),
                Event::Data8(0x03),
                Event::Data8(0x04),
                Event::CsHigh,
                Event::End,
            ]
        );
        assert!(delay.calls_ms().is_empty());
    }

    #[test]
    fn test_record_with_delay_class() {
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let outcome = Interpreter::new().run(&mut interface, &mut delay, &[0x11, 0x80], None);

        assert!(matches!(outcome, Ok(Outcome::Completed)));
        assert_eq!(interface.commands(), [0x11]);
        assert!(interface.data().is_empty());
        assert_eq!(delay.calls_ms(), [150]);
    }

    #[test]
    fn test_all_commands_mode() {
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let _ = Interpreter::new().all_commands(true).run(
            &mut interface,
            &mut delay,
            &[0xAE, 0x02, 0xD5, 0x80],
            None,
        );
        assert_eq!(interface.commands(), [0xAE, 0xD5, 0x80]);
    }

    #[test]
    fn test_truncated_record_is_not_sent() {
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let outcome = Interpreter::new().run(
            &mut interface,
            &mut delay,
            &[0x01, 0x80, 0x2A, 0x04, 0x00],
            None,
        );

        assert!(matches!(outcome, Ok(Outcome::Truncated)));
        assert_eq!(interface.commands(), [0x01]);
        assert!(interface.is_idle());
    }

    #[test]
    fn test_error_still_ends_transaction() {
        let mut interface = RecordingInterface::new().fail_after(1);
        let mut delay = RecordingDelay::new();
        let outcome = Interpreter::new().run(
            &mut interface,
            &mut delay,
            &[0x2A, 0x02, 0x00, 0xEF],
            None,
        );

        assert!(matches!(outcome, Err(Error::Interface(SimError::Injected))));
        assert_eq!(interface.events().last(), Some(&Event::End));
        assert!(interface.is_idle());
    }

    #[test]
    fn test_pseudo_ops_need_enabling() {
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut recorder = Recorder::default();
        let _ = Interpreter::new().run(
            &mut interface,
            &mut delay,
            &[EPD_WAIT_IDLE, 0x00],
            Some(&mut recorder),
        );

        assert!(recorder.ops.is_empty());
        assert_eq!(interface.commands(), [EPD_WAIT_IDLE]);
    }

    #[test]
    fn test_pseudo_op_inline_argument_and_break() {
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let mut recorder = Recorder::default();
        let stream = [
            EPD_WAIT_IDLE,
            0x01,
            0x05,
            EPD_BREAK_RR_EQU,
            0x01,
            0x03,
            0x29,
            0x00,
        ];
        let outcome = Interpreter::new().pseudo_ops(true).run(
            &mut interface,
            &mut delay,
            &stream,
            Some(&mut recorder),
        );

        assert!(matches!(outcome, Ok(Outcome::Aborted)));
        assert_eq!(
            recorder.ops,
            [
                (PseudoOp::WaitIdle, Some(0x05)),
                (PseudoOp::BreakIfResetReasonEquals, Some(0x03)),
            ]
        );
        // Nothing after the break reaches the bus
        assert!(interface.commands().is_empty());
        assert!(interface.is_idle());
    }

    #[test]
    fn test_wide_counts() {
        let mut stream = vec![0xB0, 0x21];
        stream.extend(0..0x21);
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let outcome = Interpreter::new()
            .wide(true)
            .run(&mut interface, &mut delay, &stream, None);

        assert!(matches!(outcome, Ok(Outcome::Completed)));
        assert_eq!(interface.data().len(), 0x21);
    }

    #[test]
    fn test_raw_commands() {
        let mut interface = RecordingInterface::new();
        let _ = run_commands(&mut interface, &[0xAE, 0xD5, 0x80]);
        assert_eq!(interface.commands(), [0xAE, 0xD5, 0x80]);
        assert!(interface.is_idle());
    }

    #[test]
    fn test_i2c_side_init() {
        let side = SideInit::I2c {
            bus: 0,
            address: 0x5D,
            steps: vec![I2cInitStep::Register(0x36, 0x08), I2cInitStep::Delay(20)],
        };
        let mut interface = RecordingInterface::new();
        let mut delay = RecordingDelay::new();
        let outcome = run_side_init(&mut interface, &mut delay, &side);

        assert!(matches!(outcome, Ok(Outcome::Completed)));
        assert_eq!(interface.count(|e| *e == Event::Register(0x36, 0x08)), 1);
        assert_eq!(delay.calls_ms(), [20]);
    }

    #[test]
    fn test_dsi_packets() {
        let mut panel = SimNativePanel::new(4, 4);
        let log = panel.clone();
        let mut delay = RecordingDelay::new();
        let outcome = run_packets(
            &mut panel,
            &mut delay,
            &[0x11, 0x00, 0x78, 0x36, 0x01, 0x08, 0x00],
        );

        assert!(matches!(outcome, Ok(Outcome::Completed)));
        assert_eq!(log.commands(), [(0x11, vec![]), (0x36, vec![0x08])]);
        assert_eq!(delay.calls_ms(), [120]);
    }

    #[test]
    fn test_dsi_packet_truncated() {
        let mut panel = SimNativePanel::new(4, 4);
        let log = panel.clone();
        let mut delay = RecordingDelay::new();
        let outcome = run_packets(&mut panel, &mut delay, &[0x36, 0x02, 0x08]);

        assert!(matches!(outcome, Ok(Outcome::Truncated)));
        assert!(log.commands().is_empty());
    }
}

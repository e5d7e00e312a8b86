//! Bit-level master for the two-wire register protocol.
//!
//! Both lines are open-drain: the master only ever pulls a line low or lets
//! it float high, and reads the line back to observe the slave. Framing per
//! byte is eight data bits, most significant first, followed by one
//! acknowledgment bit driven by the receiver.
//!
//! Every wait is bounded. A slave that never acknowledges, or that holds the
//! clock low for too long, surfaces as [`BusError::ProtocolTimeout`] instead of
//! hanging the node, and the driver always tries to leave the bus idle
//! (stop condition issued) before returning an error.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error, ErrorKind, InputPin, OutputPin};

/// Read/write flag appended to the 7-bit device address.
const READ_FLAG: u8 = 0x01;
const WRITE_FLAG: u8 = 0x00;

/// Maximum clock pulses used to free a slave stuck mid-byte.
const RECOVERY_PULSES: usize = 9;

/// Step of a register exchange, reported with timeouts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusStage {
    Address,
    Register,
    Data,
    ReadAddress,
    Receive,
    /// Clock held low by the slave outside a byte transfer.
    Clock,
    /// Data line still held low after the recovery pulses.
    Recover,
}

impl BusStage {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            BusStage::Address => "address",
            BusStage::Register => "register",
            BusStage::Data => "data",
            BusStage::ReadAddress => "read-address",
            BusStage::Receive => "receive",
            BusStage::Clock => "clock",
            BusStage::Recover => "recover",
        }
    }
}

impl fmt::Display for BusStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failures surfaced by the register bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusError {
    /// An acknowledgment or clock release never arrived within the poll budget.
    ProtocolTimeout { stage: BusStage },
    /// The underlying GPIO reported an error.
    Pin(ErrorKind),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::ProtocolTimeout { stage } => write!(f, "protocol timeout during {stage}"),
            BusError::Pin(kind) => write!(f, "bus pin error: {kind:?}"),
        }
    }
}

fn pin_error(err: &impl Error) -> BusError {
    BusError::Pin(err.kind())
}

/// Timing and addressing parameters for [`RegisterBus`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusConfig {
    /// 7-bit slave address.
    pub address: u8,
    /// OR-ed into the register address to mark a single-byte command.
    pub command_prefix: u8,
    /// Half of one clock period.
    pub half_period_ns: u32,
    /// Samples taken while waiting for the slave to pull SDA low.
    pub ack_poll_limit: u16,
    /// Samples taken while waiting for a stretched clock to be released.
    pub stretch_poll_limit: u16,
}

impl BusConfig {
    /// Light sensor at 0x39, standard-mode timing.
    pub const DEFAULT: BusConfig = BusConfig {
        address: 0x39,
        command_prefix: 0x80,
        half_period_ns: 5_000,
        ack_poll_limit: 32,
        stretch_poll_limit: 256,
    };

    #[must_use]
    pub const fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    #[must_use]
    pub const fn with_half_period_ns(mut self, half_period_ns: u32) -> Self {
        self.half_period_ns = half_period_ns;
        self
    }

    #[must_use]
    pub const fn with_poll_limits(mut self, ack: u16, stretch: u16) -> Self {
        self.ack_poll_limit = ack;
        self.stretch_poll_limit = stretch;
        self
    }

    /// Address byte for a write transfer.
    #[must_use]
    pub const fn write_address(&self) -> u8 {
        (self.address << 1) | WRITE_FLAG
    }

    /// Address byte for a read transfer.
    #[must_use]
    pub const fn read_address(&self) -> u8 {
        (self.address << 1) | READ_FLAG
    }

    /// Command byte selecting `register`.
    #[must_use]
    pub const fn command(&self, register: u8) -> u8 {
        self.command_prefix | register
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Single-byte register reads and writes on an external device.
///
/// # Errors
///
/// Every method returns the [`BusError`] of the exchange that failed.
pub trait RegisterAccess {
    fn read_register(&mut self, register: u8) -> Result<u8, BusError>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError>;

    /// Returns the bus to idle after an interrupted transfer.
    fn recover(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

impl<T> RegisterAccess for &mut T
where
    T: RegisterAccess + ?Sized,
{
    fn read_register(&mut self, register: u8) -> Result<u8, BusError> {
        (**self).read_register(register)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        (**self).write_register(register, value)
    }

    fn recover(&mut self) -> Result<(), BusError> {
        (**self).recover()
    }
}

/// Open-drain two-wire master built from GPIO lines and a delay source.
pub struct RegisterBus<SCL, SDA, D> {
    scl: SCL,
    sda: SDA,
    delay: D,
    config: BusConfig,
}

impl<SCL, SDA, D> RegisterBus<SCL, SDA, D>
where
    SCL: OutputPin + InputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    #[must_use]
    pub fn new(scl: SCL, sda: SDA, delay: D, config: BusConfig) -> Self {
        Self {
            scl,
            sda,
            delay,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Returns the lines and delay source.
    #[must_use]
    pub fn release(self) -> (SCL, SDA, D) {
        (self.scl, self.sda, self.delay)
    }

    /// Frees a bus left mid-transfer by a reset or an aborted exchange.
    ///
    /// Clocks SCL until the slave lets go of SDA, then issues a stop.
    ///
    /// # Errors
    ///
    /// [`BusStage::Recover`] timeout when SDA is still low after nine pulses.
    pub fn recover(&mut self) -> Result<(), BusError> {
        self.sda_set(true)?;
        for _ in 0..RECOVERY_PULSES {
            if self.sda_is_high()? {
                break;
            }
            self.scl.set_low().map_err(|err| pin_error(&err))?;
            self.half_period();
            self.scl_release(BusStage::Clock)?;
            self.half_period();
        }
        if !self.sda_is_high()? {
            return Err(BusError::ProtocolTimeout {
                stage: BusStage::Recover,
            });
        }
        self.stop()
    }

    /// Issues a start condition: SDA falls while SCL is high.
    ///
    /// # Errors
    ///
    /// [`BusStage::Clock`] timeout when the clock is held low, or a pin error.
    pub fn start(&mut self) -> Result<(), BusError> {
        self.start_condition()
    }

    /// Issues a repeated start without releasing the bus in between.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn repeated_start(&mut self) -> Result<(), BusError> {
        self.start_condition()
    }

    /// Issues a stop condition: SDA rises while SCL is high.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn stop(&mut self) -> Result<(), BusError> {
        self.sda_set(false)?;
        self.half_period();
        self.scl_release(BusStage::Clock)?;
        self.half_period();
        self.sda_set(true)?;
        self.half_period();
        Ok(())
    }

    /// Clocks out `byte` and waits for the slave acknowledgment.
    ///
    /// # Errors
    ///
    /// A timeout tagged with `stage` when the slave stretches the clock too
    /// long or never acknowledges.
    pub fn write_byte(&mut self, byte: u8, stage: BusStage) -> Result<(), BusError> {
        for bit in (0..8).rev() {
            self.write_bit(byte & (1 << bit) != 0, stage)?;
        }
        self.wait_ack(stage)
    }

    /// Clocks in one byte and answers with ACK (`ack == true`) or NACK.
    ///
    /// # Errors
    ///
    /// A timeout tagged with `stage` when the clock stays stretched.
    pub fn read_byte(&mut self, ack: bool, stage: BusStage) -> Result<u8, BusError> {
        let mut value = 0u8;
        for _ in 0..8 {
            value = (value << 1) | u8::from(self.read_bit(stage)?);
        }
        // ACK is a low bit, NACK leaves SDA released.
        self.write_bit(!ack, stage)?;
        Ok(value)
    }

    fn start_condition(&mut self) -> Result<(), BusError> {
        self.sda_set(true)?;
        self.half_period();
        self.scl_release(BusStage::Clock)?;
        self.half_period();
        self.sda_set(false)?;
        self.half_period();
        self.scl.set_low().map_err(|err| pin_error(&err))?;
        self.half_period();
        Ok(())
    }

    fn write_bit(&mut self, high: bool, stage: BusStage) -> Result<(), BusError> {
        self.sda_set(high)?;
        self.half_period();
        self.scl_release(stage)?;
        self.half_period();
        self.scl.set_low().map_err(|err| pin_error(&err))
    }

    fn read_bit(&mut self, stage: BusStage) -> Result<bool, BusError> {
        self.sda_set(true)?;
        self.half_period();
        self.scl_release(stage)?;
        let bit = self.sda_is_high()?;
        self.half_period();
        self.scl.set_low().map_err(|err| pin_error(&err))?;
        Ok(bit)
    }

    fn wait_ack(&mut self, stage: BusStage) -> Result<(), BusError> {
        self.sda_set(true)?;
        self.half_period();
        self.scl_release(stage)?;

        let mut acknowledged = false;
        for _ in 0..self.config.ack_poll_limit {
            if !self.sda_is_high()? {
                acknowledged = true;
                break;
            }
            self.half_period();
        }

        self.scl.set_low().map_err(|err| pin_error(&err))?;
        if acknowledged {
            Ok(())
        } else {
            Err(BusError::ProtocolTimeout { stage })
        }
    }

    /// Lets SCL float high and waits out any clock stretching.
    fn scl_release(&mut self, stage: BusStage) -> Result<(), BusError> {
        self.scl.set_high().map_err(|err| pin_error(&err))?;
        for _ in 0..=self.config.stretch_poll_limit {
            if self.scl.is_high().map_err(|err| pin_error(&err))? {
                return Ok(());
            }
            self.half_period();
        }
        Err(BusError::ProtocolTimeout { stage })
    }

    fn sda_set(&mut self, high: bool) -> Result<(), BusError> {
        if high {
            self.sda.set_high().map_err(|err| pin_error(&err))
        } else {
            self.sda.set_low().map_err(|err| pin_error(&err))
        }
    }

    fn sda_is_high(&mut self) -> Result<bool, BusError> {
        self.sda.is_high().map_err(|err| pin_error(&err))
    }

    fn half_period(&mut self) {
        self.delay.delay_ns(self.config.half_period_ns);
    }

    /// Runs `exchange`, leaving the bus idle if it fails part way.
    fn exchange<T>(
        &mut self,
        exchange: impl FnOnce(&mut Self) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let result = exchange(self);
        if result.is_err() {
            // Best effort; the first failure is returned.
            let _ = self.stop();
        }
        result
    }
}

impl<SCL, SDA, D> RegisterAccess for RegisterBus<SCL, SDA, D>
where
    SCL: OutputPin + InputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    fn read_register(&mut self, register: u8) -> Result<u8, BusError> {
        let config = self.config;
        self.exchange(|bus| {
            bus.start()?;
            bus.write_byte(config.write_address(), BusStage::Address)?;
            bus.write_byte(config.command(register), BusStage::Register)?;
            bus.repeated_start()?;
            bus.write_byte(config.read_address(), BusStage::ReadAddress)?;
            let value = bus.read_byte(false, BusStage::Receive)?;
            bus.stop()?;
            Ok(value)
        })
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        let config = self.config;
        self.exchange(|bus| {
            bus.start()?;
            bus.write_byte(config.write_address(), BusStage::Address)?;
            bus.write_byte(config.command(register), BusStage::Register)?;
            bus.write_byte(value, BusStage::Data)?;
            bus.stop()
        })
    }

    fn recover(&mut self) -> Result<(), BusError> {
        RegisterBus::recover(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_and_command_bytes() {
        let config = BusConfig::DEFAULT;
        assert_eq!(config.write_address(), 0x72);
        assert_eq!(config.read_address(), 0x73);
        assert_eq!(config.command(0x0C), 0x8C);
        assert_eq!(config.with_address(0x29).write_address(), 0x52);
    }

    #[test]
    fn timeout_display_names_the_stage() {
        let err = BusError::ProtocolTimeout {
            stage: BusStage::ReadAddress,
        };
        let mut text: heapless::String<48> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{err}")).unwrap();
        assert_eq!(text.as_str(), "protocol timeout during read-address");
    }
}

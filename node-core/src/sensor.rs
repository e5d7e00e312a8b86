//! Register map and power sequencing of the external light sensor.

use core::fmt;

use heapless::Vec;

use crate::bus::{BusError, RegisterAccess};

/// Documented registers of the light sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Register {
    Control,
    Timing,
    ThresholdLowLow,
    ThresholdLowHigh,
    ThresholdHighLow,
    ThresholdHighHigh,
    Interrupt,
    Crc,
    Id,
    Data0Low,
    Data0High,
    Data1Low,
    Data1High,
}

/// Number of documented registers.
pub const REGISTER_COUNT: usize = 13;

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Control,
        Register::Timing,
        Register::ThresholdLowLow,
        Register::ThresholdLowHigh,
        Register::ThresholdHighLow,
        Register::ThresholdHighHigh,
        Register::Interrupt,
        Register::Crc,
        Register::Id,
        Register::Data0Low,
        Register::Data0High,
        Register::Data1Low,
        Register::Data1High,
    ];

    /// Address of the register on the device.
    #[must_use]
    pub const fn address(self) -> u8 {
        match self {
            Register::Control => 0x00,
            Register::Timing => 0x01,
            Register::ThresholdLowLow => 0x02,
            Register::ThresholdLowHigh => 0x03,
            Register::ThresholdHighLow => 0x04,
            Register::ThresholdHighHigh => 0x05,
            Register::Interrupt => 0x06,
            Register::Crc => 0x08,
            Register::Id => 0x0A,
            Register::Data0Low => 0x0C,
            Register::Data0High => 0x0D,
            Register::Data1Low => 0x0E,
            Register::Data1High => 0x0F,
        }
    }

    #[must_use]
    pub const fn from_address(address: u8) -> Option<Self> {
        match address {
            0x00 => Some(Register::Control),
            0x01 => Some(Register::Timing),
            0x02 => Some(Register::ThresholdLowLow),
            0x03 => Some(Register::ThresholdLowHigh),
            0x04 => Some(Register::ThresholdHighLow),
            0x05 => Some(Register::ThresholdHighHigh),
            0x06 => Some(Register::Interrupt),
            0x08 => Some(Register::Crc),
            0x0A => Some(Register::Id),
            0x0C => Some(Register::Data0Low),
            0x0D => Some(Register::Data0High),
            0x0E => Some(Register::Data1Low),
            0x0F => Some(Register::Data1High),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Register::Control => "CONTROL",
            Register::Timing => "TIMING",
            Register::ThresholdLowLow => "THRESHLOWLOW",
            Register::ThresholdLowHigh => "THRESHLOWHIGH",
            Register::ThresholdHighLow => "THRESHHIGHLOW",
            Register::ThresholdHighHigh => "THRESHHIGHHIGH",
            Register::Interrupt => "INTERRUPT",
            Register::Crc => "CRC",
            Register::Id => "ID",
            Register::Data0Low => "DATA0LOW",
            Register::Data0High => "DATA0HIGH",
            Register::Data1Low => "DATA1LOW",
            Register::Data1High => "DATA1HIGH",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.address())
    }
}

/// Control value that powers the sensor's conversion engine up.
pub const CONTROL_POWER_ON: u8 = 0x03;
/// Control value that powers it down.
pub const CONTROL_POWER_OFF: u8 = 0x00;
/// Interrupt value that disables the data-ready line.
pub const INTERRUPT_DISABLED: u8 = 0x00;

/// A register exchange with the sensor failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorError {
    pub register: Register,
    pub error: BusError,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.register, self.error)
    }
}

/// Values written to the sensor after each power-up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorSettings {
    /// Channel-0 count below which the sensor raises its interrupt.
    pub threshold_low: u16,
    /// Channel-0 count above which the sensor raises its interrupt.
    pub threshold_high: u16,
    pub interrupt: u8,
    pub timing: u8,
}

impl SensorSettings {
    /// Level interrupt after four out-of-window cycles, 101 ms integration.
    pub const DEFAULT: SensorSettings = SensorSettings {
        threshold_low: 0x000F,
        threshold_high: 0x0800,
        interrupt: 0x14,
        timing: 0x01,
    };

    #[must_use]
    pub const fn with_thresholds(mut self, low: u16, high: u16) -> Self {
        self.threshold_low = low;
        self.threshold_high = high;
        self
    }

    /// Register writes that follow the power-on control write, in order.
    #[must_use]
    pub const fn sequence(&self) -> [(Register, u8); 6] {
        let [low_low, low_high] = self.threshold_low.to_le_bytes();
        let [high_low, high_high] = self.threshold_high.to_le_bytes();
        [
            (Register::ThresholdLowLow, low_low),
            (Register::ThresholdLowHigh, low_high),
            (Register::ThresholdHighLow, high_low),
            (Register::ThresholdHighHigh, high_high),
            (Register::Interrupt, self.interrupt),
            (Register::Timing, self.timing),
        ]
    }

    /// Reports whether a channel-0 high byte reads as dark.
    ///
    /// Only the high byte takes part: anything at or below the upper
    /// threshold's high byte is dark.
    #[must_use]
    pub const fn is_dark(&self, data0_high: u8) -> bool {
        let [_, limit] = self.threshold_high.to_le_bytes();
        data0_high <= limit
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn write<R: RegisterAccess>(bus: &mut R, register: Register, value: u8) -> Result<(), SensorError> {
    bus.write_register(register.address(), value)
        .map_err(|error| SensorError { register, error })
}

fn read<R: RegisterAccess>(bus: &mut R, register: Register) -> Result<u8, SensorError> {
    bus.read_register(register.address())
        .map_err(|error| SensorError { register, error })
}

/// Turns the sensor on and loads `settings`. Stops at the first failed write.
///
/// # Errors
///
/// [`SensorError`] naming the register whose write failed.
pub fn power_up<R: RegisterAccess>(bus: &mut R, settings: &SensorSettings) -> Result<(), SensorError> {
    write(bus, Register::Control, CONTROL_POWER_ON)?;
    for (register, value) in settings.sequence() {
        write(bus, register, value)?;
    }
    Ok(())
}

/// Disables the interrupt line, then powers the sensor down.
///
/// # Errors
///
/// [`SensorError`] for [`Register::Interrupt`] or [`Register::Control`].
pub fn power_down<R: RegisterAccess>(bus: &mut R) -> Result<(), SensorError> {
    write(bus, Register::Interrupt, INTERRUPT_DISABLED)?;
    write(bus, Register::Control, CONTROL_POWER_OFF)
}

/// Reads the channel-0 count as `(low, high)` bytes.
///
/// # Errors
///
/// [`SensorError`] naming the data register that could not be read.
pub fn read_channel0<R: RegisterAccess>(bus: &mut R) -> Result<(u8, u8), SensorError> {
    let low = read(bus, Register::Data0Low)?;
    let high = read(bus, Register::Data0High)?;
    Ok((low, high))
}

/// Reads every documented register.
///
/// # Errors
///
/// [`SensorError`] for the first register that could not be read.
pub fn dump_registers<R: RegisterAccess>(
    bus: &mut R,
) -> Result<Vec<(Register, u8), REGISTER_COUNT>, SensorError> {
    let mut values = Vec::new();
    for register in Register::ALL {
        let value = read(bus, register)?;
        // Capacity equals the register count.
        let _ = values.push((register, value));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusStage;

    /// Register file that fails on one chosen register.
    struct FakeDevice {
        registers: [u8; 16],
        writes: Vec<(u8, u8), 16>,
        fail_on: Option<u8>,
    }

    impl FakeDevice {
        fn new() -> Self {
            Self {
                registers: [0; 16],
                writes: Vec::new(),
                fail_on: None,
            }
        }

        fn check(&self, register: u8) -> Result<(), BusError> {
            if self.fail_on == Some(register) {
                Err(BusError::ProtocolTimeout {
                    stage: BusStage::Data,
                })
            } else {
                Ok(())
            }
        }
    }

    impl RegisterAccess for FakeDevice {
        fn read_register(&mut self, register: u8) -> Result<u8, BusError> {
            self.check(register)?;
            Ok(self.registers[usize::from(register)])
        }

        fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
            self.check(register)?;
            self.registers[usize::from(register)] = value;
            self.writes.push((register, value)).unwrap();
            Ok(())
        }
    }

    #[test]
    fn power_up_writes_control_then_configuration() {
        let mut device = FakeDevice::new();
        power_up(&mut device, &SensorSettings::DEFAULT).unwrap();
        assert_eq!(
            device.writes.as_slice(),
            &[
                (0x00, 0x03),
                (0x02, 0x0F),
                (0x03, 0x00),
                (0x04, 0x00),
                (0x05, 0x08),
                (0x06, 0x14),
                (0x01, 0x01),
            ]
        );
    }

    #[test]
    fn power_up_stops_at_first_failure() {
        let mut device = FakeDevice::new();
        device.fail_on = Some(Register::ThresholdHighLow.address());
        let err = power_up(&mut device, &SensorSettings::DEFAULT).unwrap_err();
        assert_eq!(err.register, Register::ThresholdHighLow);
        assert_eq!(device.writes.len(), 3);
    }

    #[test]
    fn power_down_disables_interrupt_first() {
        let mut device = FakeDevice::new();
        power_down(&mut device).unwrap();
        assert_eq!(device.writes.as_slice(), &[(0x06, 0x00), (0x00, 0x00)]);
    }

    #[test]
    fn dark_is_at_or_below_upper_threshold_high_byte() {
        let settings = SensorSettings::DEFAULT;
        assert!(settings.is_dark(0x00));
        assert!(settings.is_dark(0x08));
        assert!(!settings.is_dark(0x09));
    }

    #[test]
    fn register_addresses_round_trip() {
        for register in Register::ALL {
            assert_eq!(Register::from_address(register.address()), Some(register));
        }
        assert_eq!(Register::from_address(0x07), None);
    }

    #[test]
    fn dump_reads_every_register() {
        let mut device = FakeDevice::new();
        device.registers[0x0A] = 0x50;
        let dump = dump_registers(&mut device).unwrap();
        assert_eq!(dump.len(), Register::ALL.len());
        assert!(dump.contains(&(Register::Id, 0x50)));
    }
}

//! Collaborator interfaces the duty cycle drives.
//!
//! Firmware implements these over real peripherals; [`crate::sim`] implements
//! them for tests and the host emulator. Only the operations the duty cycle
//! actually invokes are modelled here.

use crate::calibration::TemperatureCalibration;

/// Clock domains enabled once at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockDomain {
    Timer,
    Gpio,
    Comparator,
    Adc,
    SerialBus,
    Transmitter,
}

impl ClockDomain {
    /// Every domain the node needs, in bring-up order.
    pub const ALL: [ClockDomain; 6] = [
        ClockDomain::Timer,
        ClockDomain::Gpio,
        ClockDomain::Comparator,
        ClockDomain::Adc,
        ClockDomain::SerialBus,
        ClockDomain::Transmitter,
    ];

    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            ClockDomain::Timer => 0,
            ClockDomain::Gpio => 1,
            ClockDomain::Comparator => 2,
            ClockDomain::Adc => 3,
            ClockDomain::SerialBus => 4,
            ClockDomain::Transmitter => 5,
        }
    }
}

/// Enables peripheral clocks.
pub trait ClockControl {
    fn enable_clock(&mut self, domain: ClockDomain);
}

/// Logical pins used by the node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodePin {
    /// Drives the light-sensing circuit while the comparator samples.
    Excitation,
    /// Supplies power to the external light sensor.
    SensorPower,
    /// Binary status output toggled on each comparator change.
    Status,
    /// Data-ready edge from the external light sensor.
    SensorInterrupt,
    /// Reflects the external sensor's dark/bright reading.
    Indicator,
}

impl NodePin {
    pub const ALL: [NodePin; 5] = [
        NodePin::Excitation,
        NodePin::SensorPower,
        NodePin::Status,
        NodePin::SensorInterrupt,
        NodePin::Indicator,
    ];

    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            NodePin::Excitation => 0,
            NodePin::SensorPower => 1,
            NodePin::Status => 2,
            NodePin::SensorInterrupt => 3,
            NodePin::Indicator => 4,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            NodePin::Excitation => "excite",
            NodePin::SensorPower => "sensor-power",
            NodePin::Status => "status",
            NodePin::SensorInterrupt => "sensor-int",
            NodePin::Indicator => "indicator",
        }
    }
}

/// GPIO operations on logical pins.
pub trait NodePins {
    fn set_output(&mut self, pin: NodePin, high: bool);

    fn read_input(&mut self, pin: NodePin) -> bool;

    fn configure_edge_interrupt(&mut self, pin: NodePin, enabled: bool);
}

/// Reference routing for the light comparator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReferenceChannel {
    /// Scaled supply level used as the reference (device specific units).
    pub vdd_scale: u8,
    /// `true` when the light input feeds the positive comparator input.
    pub sensor_on_positive: bool,
}

/// Analog comparator sampling the excited light sensor.
pub trait Comparator {
    fn enable(&mut self);

    fn disable(&mut self);

    fn set_reference_channel(&mut self, channel: ReferenceChannel);

    /// Reports whether the comparator finished its warm-up after `enable`.
    fn is_warmed_up(&mut self) -> bool;

    fn output(&mut self) -> bool;
}

/// On-die temperature channel of the ADC.
pub trait TemperatureAdc {
    fn start_single_conversion(&mut self);

    fn is_conversion_done(&mut self) -> bool;

    fn read_result(&mut self) -> u16;

    /// Factory anchors, read once at startup.
    fn calibration(&self) -> TemperatureCalibration;

    /// Fills `samples` in one transfer and returns how many were written.
    ///
    /// Adapters with a DMA channel override this; the default polls each
    /// conversion and stops early when one never completes.
    fn read_block(&mut self, samples: &mut [u16], poll_limit: u32) -> usize {
        for (written, slot) in samples.iter_mut().enumerate() {
            self.start_single_conversion();
            if !(0..poll_limit).any(|_| self.is_conversion_done()) {
                return written;
            }
            *slot = self.read_result();
        }
        samples.len()
    }
}

/// Asynchronous serial transmitter.
///
/// The transmitter raises its "ready for next byte" interrupt after each
/// byte; firmware forwards that to `DutyCycle::on_transmit_complete`.
pub trait Transmitter {
    fn send_byte(&mut self, byte: u8);
}

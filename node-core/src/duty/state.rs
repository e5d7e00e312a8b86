//! State, reports and faults of the duty cycle.

use core::fmt;

use heapless::Vec;

use crate::bus::BusError;
use crate::ring::RingError;
use crate::sensor::SensorError;
use crate::sleep::SleepHoldError;

use super::config::ThresholdLevel;

/// Faults retained per [`PeriodReport`]; later ones are dropped.
pub const MAX_FAULTS: usize = 4;

/// Bounded fault list carried by a report.
pub type FaultLog = Vec<NodeFault, MAX_FAULTS>;

/// Number of phases in the external sensor power schedule.
pub const POWER_PHASES: u8 = 3;

/// Step of the three-period power schedule of the external sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerPhase {
    PowerUp,
    Dwell,
    Teardown,
}

impl PowerPhase {
    #[must_use]
    pub const fn from_counter(counter: u8) -> Self {
        match counter % POWER_PHASES {
            0 => PowerPhase::PowerUp,
            1 => PowerPhase::Dwell,
            _ => PowerPhase::Teardown,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PowerPhase::PowerUp => "power-up",
            PowerPhase::Dwell => "dwell",
            PowerPhase::Teardown => "teardown",
        }
    }
}

/// Failures while collecting temperature samples.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleError {
    /// A conversion never finished; `completed` samples were taken before it.
    ConversionTimeout { completed: u16 },
    /// The configured sample count is zero.
    NoSamples,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::ConversionTimeout { completed } => {
                write!(f, "conversion timed out after {completed} samples")
            }
            SampleError::NoSamples => f.write_str("no samples configured"),
        }
    }
}

/// Everything that can go wrong inside a handler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeFault {
    Sensor(SensorError),
    Bus(BusError),
    Sample(SampleError),
    Ring(RingError),
    Hold(SleepHoldError),
    /// The comparator never reported warm-up.
    WarmupTimeout,
    /// A sensor operation was requested outside its powered window.
    SensorUnpowered,
}

impl fmt::Display for NodeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeFault::Sensor(err) => write!(f, "sensor: {err}"),
            NodeFault::Bus(err) => write!(f, "bus: {err}"),
            NodeFault::Sample(err) => write!(f, "adc: {err}"),
            NodeFault::Ring(err) => write!(f, "ring: {err}"),
            NodeFault::Hold(err) => write!(f, "sleep: {err}"),
            NodeFault::WarmupTimeout => f.write_str("comparator warm-up timed out"),
            NodeFault::SensorUnpowered => f.write_str("sensor not powered"),
        }
    }
}

impl From<SensorError> for NodeFault {
    fn from(err: SensorError) -> Self {
        NodeFault::Sensor(err)
    }
}

impl From<BusError> for NodeFault {
    fn from(err: BusError) -> Self {
        NodeFault::Bus(err)
    }
}

impl From<SampleError> for NodeFault {
    fn from(err: SampleError) -> Self {
        NodeFault::Sample(err)
    }
}

impl From<RingError> for NodeFault {
    fn from(err: RingError) -> Self {
        NodeFault::Ring(err)
    }
}

impl From<SleepHoldError> for NodeFault {
    fn from(err: SleepHoldError) -> Self {
        NodeFault::Hold(err)
    }
}

/// Mutable state carried across timer interrupts.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DutyCycleState {
    /// Phase executed at the latest period boundary (0, 1 or 2).
    pub power_cycle_counter: u8,
    pub last_comparator_reading: bool,
    pub last_temperature_celsius: f32,
    /// Mirrors the status output.
    pub led_status: bool,
    pub threshold_level: ThresholdLevel,
    /// Completed period boundaries.
    pub periods: u32,
    /// Hold releases that found no matching acquire outside a period report.
    pub hold_errors: u32,
    /// Latest reading taken by the sensor edge handler.
    pub last_light: Option<LightSample>,
}

impl DutyCycleState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // The first boundary wraps to the power-up phase.
            power_cycle_counter: POWER_PHASES - 1,
            last_comparator_reading: false,
            last_temperature_celsius: 0.0,
            led_status: false,
            threshold_level: ThresholdLevel::Low,
            periods: 0,
            hold_errors: 0,
            last_light: None,
        }
    }

    /// Phase executed at the latest period boundary.
    #[must_use]
    pub const fn power_phase(&self) -> PowerPhase {
        PowerPhase::from_counter(self.power_cycle_counter)
    }
}

impl Default for DutyCycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel-0 reading taken on a sensor edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LightSample {
    pub low: u8,
    pub high: u8,
    pub dark: bool,
}

impl LightSample {
    #[must_use]
    pub const fn count(&self) -> u16 {
        u16::from_le_bytes([self.low, self.high])
    }
}

/// Result of one transmitter-ready interrupt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransmitProgress {
    /// The next byte was handed to the transmitter.
    Sent,
    /// The burst is complete and the transmit hold was released.
    Drained,
    /// No burst was in flight.
    Idle,
}

/// Outcome of one period boundary.
#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PeriodReport {
    /// One-based index of this boundary.
    pub period: u32,
    /// Power phase executed, or `None` when the schedule is disabled.
    pub power_phase: Option<PowerPhase>,
    pub sensor_powered: bool,
    /// Fresh temperature, or `None` when sampling failed.
    pub temperature_celsius: Option<f32>,
    pub comparator: bool,
    pub threshold_level: ThresholdLevel,
    pub threshold_toggled: bool,
    pub led_status: bool,
    /// Unsent bytes of the previous burst that were dropped.
    pub discarded_bytes: usize,
    pub queued_bytes: usize,
    pub faults: FaultLog,
}

impl PeriodReport {
    #[must_use]
    pub fn new(period: u32) -> Self {
        Self {
            period,
            power_phase: None,
            sensor_powered: false,
            temperature_celsius: None,
            comparator: false,
            threshold_level: ThresholdLevel::Low,
            threshold_toggled: false,
            led_status: false,
            discarded_bytes: 0,
            queued_bytes: 0,
            faults: FaultLog::new(),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

pub(crate) fn record(faults: &mut FaultLog, fault: impl Into<NodeFault>) {
    // Past MAX_FAULTS the earliest faults are the ones kept.
    let _ = faults.push(fault.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_one_before_power_up() {
        let state = DutyCycleState::new();
        assert_eq!(state.power_phase(), PowerPhase::Teardown);
        assert_eq!(
            PowerPhase::from_counter((state.power_cycle_counter + 1) % POWER_PHASES),
            PowerPhase::PowerUp
        );
    }

    #[test]
    fn fault_log_keeps_the_first_faults() {
        let mut faults = FaultLog::new();
        for _ in 0..MAX_FAULTS + 2 {
            record(&mut faults, NodeFault::WarmupTimeout);
        }
        record(&mut faults, SampleError::NoSamples);
        assert_eq!(faults.len(), MAX_FAULTS);
        assert!(!faults.contains(&NodeFault::Sample(SampleError::NoSamples)));
    }

    #[test]
    fn light_sample_count_is_little_endian() {
        let sample = LightSample {
            low: 0x34,
            high: 0x12,
            dark: false,
        };
        assert_eq!(sample.count(), 0x1234);
    }
}

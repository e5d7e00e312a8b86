//! Runtime configuration of the duty cycle.

use crate::board::ReferenceChannel;
use crate::bus::BusConfig;
use crate::sensor::SensorSettings;
use crate::sleep::SleepMode;

/// Comparator threshold currently applied to the light input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ThresholdLevel {
    Low,
    High,
}

impl ThresholdLevel {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            ThresholdLevel::Low => ThresholdLevel::High,
            ThresholdLevel::High => ThresholdLevel::Low,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ThresholdLevel::Low => "low",
            ThresholdLevel::High => "high",
        }
    }
}

/// How temperature samples are collected each period.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamplingStrategy {
    /// Start, poll and read one conversion at a time.
    Polled,
    /// Let the ADC fill whole chunks of `SAMPLE_CHUNK` samples in one transfer.
    Block,
}

/// Samples moved per block transfer.
pub const SAMPLE_CHUNK: usize = 32;

/// Deepest sleep mode each subsystem tolerates while it is active.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HoldModes {
    /// Held for the whole process lifetime.
    pub idle: SleepMode,
    pub adc: SleepMode,
    /// Held while the external sensor is powered and during edge handling.
    pub bus: SleepMode,
    /// Held while a payload burst drains.
    pub transmit: SleepMode,
}

impl HoldModes {
    pub const DEFAULT: HoldModes = HoldModes {
        idle: SleepMode::Stop,
        adc: SleepMode::Sleep,
        bus: SleepMode::Sleep,
        transmit: SleepMode::DeepSleep,
    };
}

/// Duty-cycle settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub bus: BusConfig,
    pub sensor: SensorSettings,
    pub sampling: SamplingStrategy,
    /// Temperature conversions averaged per period.
    pub sample_count: u16,
    /// Polls of "conversion done" before a conversion counts as lost.
    pub adc_poll_limit: u32,
    /// Polls of the comparator warm-up flag.
    pub warmup_poll_limit: u32,
    /// Wait between raising sensor power and the first register write.
    pub sensor_settle_us: u32,
    pub holds: HoldModes,
    /// Reference used while the threshold is [`ThresholdLevel::Low`].
    pub low_reference: ReferenceChannel,
    /// Reference used while the threshold is [`ThresholdLevel::High`].
    pub high_reference: ReferenceChannel,
    /// Bytes reserved in the ring for each payload burst.
    pub ring_capacity: usize,
    /// Run the three-period power schedule of the external sensor.
    pub sensor_schedule: bool,
}

impl NodeConfig {
    pub const DEFAULT: NodeConfig = NodeConfig {
        bus: BusConfig::DEFAULT,
        sensor: SensorSettings::DEFAULT,
        sampling: SamplingStrategy::Polled,
        sample_count: 500,
        adc_poll_limit: 1_000,
        warmup_poll_limit: 10_000,
        sensor_settle_us: 1_000,
        holds: HoldModes::DEFAULT,
        low_reference: ReferenceChannel {
            vdd_scale: 2,
            sensor_on_positive: false,
        },
        high_reference: ReferenceChannel {
            vdd_scale: 61,
            sensor_on_positive: true,
        },
        ring_capacity: crate::payload::PAYLOAD_LEN,
        sensor_schedule: true,
    };

    #[must_use]
    pub const fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    #[must_use]
    pub const fn with_sensor(mut self, sensor: SensorSettings) -> Self {
        self.sensor = sensor;
        self
    }

    #[must_use]
    pub const fn with_sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    #[must_use]
    pub const fn with_sample_count(mut self, sample_count: u16) -> Self {
        self.sample_count = sample_count;
        self
    }

    #[must_use]
    pub const fn with_poll_limits(mut self, adc: u32, warmup: u32) -> Self {
        self.adc_poll_limit = adc;
        self.warmup_poll_limit = warmup;
        self
    }

    #[must_use]
    pub const fn with_sensor_settle_us(mut self, settle_us: u32) -> Self {
        self.sensor_settle_us = settle_us;
        self
    }

    #[must_use]
    pub const fn with_holds(mut self, holds: HoldModes) -> Self {
        self.holds = holds;
        self
    }

    #[must_use]
    pub const fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_sensor_schedule(mut self, enabled: bool) -> Self {
        self.sensor_schedule = enabled;
        self
    }

    /// Reference channel for `level`.
    #[must_use]
    pub const fn reference(&self, level: ThresholdLevel) -> ReferenceChannel {
        match level {
            ThresholdLevel::Low => self.low_reference,
            ThresholdLevel::High => self.high_reference,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

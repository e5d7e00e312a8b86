//! Simulated peripherals for host tests and the emulator.
//!
//! Each type implements one collaborator trait from [`crate::board`] (or
//! `embedded-hal` for the bus lines and delay) and records enough of what it
//! was asked to do for assertions. Nothing here touches real hardware.

pub mod bus;

use heapless::{Deque, Vec};

use embedded_hal::delay::DelayNs;

pub use bus::{BusTraffic, SIM_DEVICE_ID, SimBus, SimLine};

use crate::board::{
    ClockControl, ClockDomain, Comparator, NodePin, NodePins, ReferenceChannel, TemperatureAdc,
    Transmitter,
};
use crate::bus::{BusConfig, RegisterBus};
use crate::calibration::TemperatureCalibration;
use crate::duty::DutyCycle;
use crate::sleep::{PowerControl, SleepMode};

/// Register bus wired to a [`SimBus`].
pub type SimRegisterBus<'a> = RegisterBus<SimLine<'a>, SimLine<'a>, SimDelay>;

/// Duty cycle assembled entirely from simulated peripherals.
pub type SimDutyCycle<'a, const N: usize> =
    DutyCycle<SimPins<'a>, SimComparator, SimAdc, SimTransmitter, SimRegisterBus<'a>, SimDelay, N>;

impl SimBus {
    /// Builds a bit-banged master on this bus.
    #[must_use]
    pub fn register_bus(&self, config: BusConfig) -> SimRegisterBus<'_> {
        RegisterBus::new(self.scl(), self.sda(), SimDelay::new(), config)
    }
}

/// Delay source that only accumulates the requested time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimDelay {
    elapsed_ns: u64,
}

impl SimDelay {
    #[must_use]
    pub const fn new() -> Self {
        Self { elapsed_ns: 0 }
    }

    /// Total time requested since construction.
    #[must_use]
    pub const fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

/// GPIO bank holding the logical node pins.
///
/// When attached to a [`SimBus`], the sensor power output also powers the
/// simulated sensor.
#[derive(Debug, Default)]
pub struct SimPins<'a> {
    outputs: [bool; NodePin::ALL.len()],
    inputs: [bool; NodePin::ALL.len()],
    edge_enabled: [bool; NodePin::ALL.len()],
    rising_edges: [u32; NodePin::ALL.len()],
    sensor: Option<&'a SimBus>,
}

impl<'a> SimPins<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes the sensor power output to `sensor`.
    ///
    /// The sensor starts unpowered, matching the low output level.
    #[must_use]
    pub fn with_sensor(sensor: &'a SimBus) -> Self {
        sensor.set_powered(false);
        Self {
            sensor: Some(sensor),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn output(&self, pin: NodePin) -> bool {
        self.outputs[pin.as_index()]
    }

    pub fn set_input(&mut self, pin: NodePin, high: bool) {
        self.inputs[pin.as_index()] = high;
    }

    #[must_use]
    pub fn edge_enabled(&self, pin: NodePin) -> bool {
        self.edge_enabled[pin.as_index()]
    }

    /// Number of low-to-high transitions driven on `pin`.
    #[must_use]
    pub fn rising_edges(&self, pin: NodePin) -> u32 {
        self.rising_edges[pin.as_index()]
    }
}

impl NodePins for SimPins<'_> {
    fn set_output(&mut self, pin: NodePin, high: bool) {
        let slot = &mut self.outputs[pin.as_index()];
        if high && !*slot {
            self.rising_edges[pin.as_index()] += 1;
        }
        *slot = high;
        if pin == NodePin::SensorPower
            && let Some(sensor) = self.sensor
        {
            sensor.set_powered(high);
        }
    }

    fn read_input(&mut self, pin: NodePin) -> bool {
        self.inputs[pin.as_index()]
    }

    fn configure_edge_interrupt(&mut self, pin: NodePin, enabled: bool) {
        self.edge_enabled[pin.as_index()] = enabled;
    }
}

/// Comparator whose output is set directly by the test or the operator.
#[derive(Copy, Clone, Debug, Default)]
pub struct SimComparator {
    enabled: bool,
    level: bool,
    warmup_polls: u32,
    warmup_remaining: u32,
    reference: Option<ReferenceChannel>,
    enable_count: u32,
}

impl SimComparator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: false,
            level: false,
            warmup_polls: 0,
            warmup_remaining: 0,
            reference: None,
            enable_count: 0,
        }
    }

    /// Number of `is_warmed_up` polls that report "not yet" after `enable`.
    #[must_use]
    pub const fn with_warmup_polls(mut self, polls: u32) -> Self {
        self.warmup_polls = polls;
        self
    }

    /// Sets the level the comparator reports while enabled.
    pub fn set_level(&mut self, level: bool) {
        self.level = level;
    }

    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn reference(&self) -> Option<ReferenceChannel> {
        self.reference
    }

    #[must_use]
    pub fn enable_count(&self) -> u32 {
        self.enable_count
    }
}

impl Comparator for SimComparator {
    fn enable(&mut self) {
        self.enabled = true;
        self.warmup_remaining = self.warmup_polls;
        self.enable_count += 1;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn set_reference_channel(&mut self, channel: ReferenceChannel) {
        self.reference = Some(channel);
    }

    fn is_warmed_up(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return false;
        }
        true
    }

    fn output(&mut self) -> bool {
        self.enabled && self.level
    }
}

/// Depth of the scripted conversion queue.
pub const SIM_ADC_SCRIPT: usize = 64;

/// Temperature channel returning scripted codes, then a fixed default.
#[derive(Clone, Debug)]
pub struct SimAdc {
    calibration: TemperatureCalibration,
    script: Deque<u16, SIM_ADC_SCRIPT>,
    default_code: u16,
    pending: Option<u16>,
    result: u16,
    stalled: bool,
    conversions: u32,
    block_transfers: u32,
}

impl SimAdc {
    #[must_use]
    pub fn new(calibration: TemperatureCalibration, default_code: u16) -> Self {
        Self {
            calibration,
            script: Deque::new(),
            default_code,
            pending: None,
            result: 0,
            stalled: false,
            conversions: 0,
            block_transfers: 0,
        }
    }

    /// Queues codes returned by the next conversions, in order.
    ///
    /// Codes that do not fit in the script are dropped.
    pub fn queue_codes(&mut self, codes: &[u16]) {
        for code in codes {
            if self.script.push_back(*code).is_err() {
                break;
            }
        }
    }

    pub fn set_default_code(&mut self, code: u16) {
        self.default_code = code;
    }

    /// Makes every started conversion stay busy forever.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Completed conversions, polled or block.
    #[must_use]
    pub fn conversions(&self) -> u32 {
        self.conversions
    }

    #[must_use]
    pub fn block_transfers(&self) -> u32 {
        self.block_transfers
    }

    fn next_code(&mut self) -> u16 {
        self.conversions += 1;
        self.script.pop_front().unwrap_or(self.default_code)
    }
}

impl TemperatureAdc for SimAdc {
    fn start_single_conversion(&mut self) {
        if !self.stalled {
            let code = self.next_code();
            self.pending = Some(code);
        }
    }

    fn is_conversion_done(&mut self) -> bool {
        self.pending.is_some()
    }

    fn read_result(&mut self) -> u16 {
        if let Some(code) = self.pending.take() {
            self.result = code;
        }
        self.result
    }

    fn calibration(&self) -> TemperatureCalibration {
        self.calibration
    }

    fn read_block(&mut self, samples: &mut [u16], _poll_limit: u32) -> usize {
        if self.stalled {
            return 0;
        }
        self.block_transfers += 1;
        for slot in samples.iter_mut() {
            *slot = self.next_code();
        }
        samples.len()
    }
}

/// Bytes remembered by [`SimTransmitter`].
pub const SIM_TX_LOG: usize = 128;

/// Serial transmitter that logs every byte it is handed.
#[derive(Clone, Debug, Default)]
pub struct SimTransmitter {
    log: Vec<u8, SIM_TX_LOG>,
    total: u32,
}

impl SimTransmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes logged since the last [`take_sent`](Self::take_sent).
    #[must_use]
    pub fn sent(&self) -> &[u8] {
        &self.log
    }

    /// Returns and clears the byte log.
    pub fn take_sent(&mut self) -> Vec<u8, SIM_TX_LOG> {
        core::mem::take(&mut self.log)
    }

    /// Bytes sent since construction, including ones no longer logged.
    #[must_use]
    pub fn total_sent(&self) -> u32 {
        self.total
    }
}

impl Transmitter for SimTransmitter {
    fn send_byte(&mut self, byte: u8) {
        self.total += 1;
        // A full log keeps the oldest bytes; `total_sent` still counts.
        let _ = self.log.push(byte);
    }
}

/// Records which clock domains were enabled.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimClocks {
    enabled: [bool; ClockDomain::ALL.len()],
}

impl SimClocks {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: [false; ClockDomain::ALL.len()],
        }
    }

    #[must_use]
    pub fn is_enabled(&self, domain: ClockDomain) -> bool {
        self.enabled[domain.as_index()]
    }

    #[must_use]
    pub fn all_enabled(&self) -> bool {
        self.enabled.iter().all(|enabled| *enabled)
    }
}

impl ClockControl for SimClocks {
    fn enable_clock(&mut self, domain: ClockDomain) {
        self.enabled[domain.as_index()] = true;
    }
}

/// Power controller that counts entries per sleep mode instead of sleeping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimPower {
    entries: [u32; SleepMode::COUNT],
    last: Option<SleepMode>,
}

impl SimPower {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [0; SleepMode::COUNT],
            last: None,
        }
    }

    #[must_use]
    pub fn entries(&self, mode: SleepMode) -> u32 {
        self.entries[mode.as_index()]
    }

    #[must_use]
    pub fn last(&self) -> Option<SleepMode> {
        self.last
    }
}

impl PowerControl for SimPower {
    fn enter(&mut self, mode: SleepMode) {
        self.entries[mode.as_index()] += 1;
        self.last = Some(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_power_pin_gates_the_simulated_device() {
        let sensor = SimBus::new(0x39, 0x80);
        let mut pins = SimPins::with_sensor(&sensor);
        assert!(!sensor.is_powered());

        pins.set_output(NodePin::SensorPower, true);
        assert!(sensor.is_responsive());
        pins.set_output(NodePin::SensorPower, true);
        assert_eq!(pins.rising_edges(NodePin::SensorPower), 1);

        sensor.set_register(0x00, 0x03);
        pins.set_output(NodePin::SensorPower, false);
        assert!(!sensor.is_powered());
        assert_eq!(sensor.register(0x00), 0x00);
        assert_eq!(sensor.register(0x0A), SIM_DEVICE_ID);
    }

    #[test]
    fn comparator_warms_up_after_configured_polls() {
        let mut comparator = SimComparator::new().with_warmup_polls(2);
        assert!(!comparator.is_warmed_up());
        comparator.enable();
        assert!(!comparator.is_warmed_up());
        assert!(!comparator.is_warmed_up());
        assert!(comparator.is_warmed_up());

        comparator.set_level(true);
        assert!(comparator.output());
        comparator.disable();
        assert!(!comparator.output());
    }

    #[test]
    fn adc_replays_script_then_default() {
        let cal = TemperatureCalibration::new(25.0, 100.0, 10.0);
        let mut adc = SimAdc::new(cal, 7);
        adc.queue_codes(&[1, 2]);

        let mut block = [0u16; 3];
        assert_eq!(adc.read_block(&mut block, 1), 3);
        assert_eq!(block, [1, 2, 7]);
        assert_eq!(adc.block_transfers(), 1);

        adc.set_stalled(true);
        adc.start_single_conversion();
        assert!(!adc.is_conversion_done());
    }
}

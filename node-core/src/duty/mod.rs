//! Timer-driven duty cycle of the sensing node.
//!
//! The periodic timer raises two interrupts per period. The sub-interval
//! boundary arrives a short lead before the period ends and excites the light
//! path; the period boundary reads the comparator, steps the external sensor
//! through its power schedule, samples temperature and queues the
//! measurement for the serial transmitter.
//!
//! Each handler runs to completion. A failure ends only its own step and is
//! recorded in the [`PeriodReport`]; the power counter always advances and
//! every sleep hold taken inside a handler is released before it returns.

mod config;
mod state;

pub use config::{HoldModes, NodeConfig, SAMPLE_CHUNK, SamplingStrategy, ThresholdLevel};
pub use state::{
    DutyCycleState, FaultLog, LightSample, MAX_FAULTS, NodeFault, POWER_PHASES, PeriodReport,
    PowerPhase, SampleError, TransmitProgress,
};

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::board::{
    ClockControl, ClockDomain, Comparator, NodePin, NodePins, TemperatureAdc, Transmitter,
};
use crate::bus::RegisterAccess;
use crate::calibration::TemperatureCalibration;
use crate::payload::Measurement;
use crate::ring::ByteRing;
use crate::sensor::{self, REGISTER_COUNT, Register};
use crate::sleep::{PowerControl, SleepArbiter, SleepMode};

use state::record;

/// The node's control loop and everything it owns.
pub struct DutyCycle<P, C, A, T, R, D, const N: usize> {
    config: NodeConfig,
    state: DutyCycleState,
    arbiter: SleepArbiter,
    ring: ByteRing<N>,
    calibration: TemperatureCalibration,
    sensor_powered: bool,
    transmitting: bool,
    pins: P,
    comparator: C,
    adc: A,
    transmitter: T,
    bus: R,
    delay: D,
}

impl<P, C, A, T, R, D, const N: usize> DutyCycle<P, C, A, T, R, D, N>
where
    P: NodePins,
    C: Comparator,
    A: TemperatureAdc,
    T: Transmitter,
    R: RegisterAccess,
    D: DelayNs,
{
    /// Assembles the duty cycle. Nothing is touched until [`start`](Self::start).
    #[must_use]
    pub fn new(
        config: NodeConfig,
        pins: P,
        comparator: C,
        adc: A,
        transmitter: T,
        bus: R,
        delay: D,
    ) -> Self {
        let calibration = adc.calibration();
        Self {
            config,
            state: DutyCycleState::new(),
            arbiter: SleepArbiter::new(),
            ring: ByteRing::new(),
            calibration,
            sensor_powered: false,
            transmitting: false,
            pins,
            comparator,
            adc,
            transmitter,
            bus,
            delay,
        }
    }

    /// Brings the node to its idle state.
    ///
    /// Enables every clock domain, parks the outputs low, loads the low
    /// threshold reference, places the idle hold, sizes the ring and frees a
    /// bus left busy by a reset.
    ///
    /// # Errors
    ///
    /// [`NodeFault::Ring`] when the configured ring capacity exceeds the
    /// storage, or [`NodeFault::Bus`] when the bus cannot be freed.
    pub fn start<K>(&mut self, clocks: &mut K) -> Result<(), NodeFault>
    where
        K: ClockControl + ?Sized,
    {
        for domain in ClockDomain::ALL {
            clocks.enable_clock(domain);
        }
        for pin in [
            NodePin::Excitation,
            NodePin::SensorPower,
            NodePin::Status,
            NodePin::Indicator,
        ] {
            self.pins.set_output(pin, false);
        }
        self.pins
            .configure_edge_interrupt(NodePin::SensorInterrupt, false);

        self.state.threshold_level = ThresholdLevel::Low;
        self.comparator
            .set_reference_channel(self.config.reference(ThresholdLevel::Low));

        self.arbiter.acquire(self.config.holds.idle);
        self.ring.allocate(self.config.ring_capacity)?;
        self.bus.recover()?;
        Ok(())
    }

    /// Sub-interval boundary: excite the light sensor and arm the comparator.
    ///
    /// # Errors
    ///
    /// [`NodeFault::WarmupTimeout`] when the comparator never reports ready
    /// within the poll budget. Excitation stays on either way.
    pub fn on_sub_interval(&mut self) -> Result<(), NodeFault> {
        self.comparator.enable();
        self.pins.set_output(NodePin::Excitation, true);
        let limit = self.config.warmup_poll_limit;
        if (0..limit).any(|_| self.comparator.is_warmed_up()) {
            Ok(())
        } else {
            Err(NodeFault::WarmupTimeout)
        }
    }

    /// Period boundary.
    pub fn on_period(&mut self) -> PeriodReport {
        self.state.periods = self.state.periods.wrapping_add(1);
        let mut report = PeriodReport::new(self.state.periods);

        if self.config.sensor_schedule {
            self.state.power_cycle_counter = (self.state.power_cycle_counter + 1) % POWER_PHASES;
            let phase = self.state.power_phase();
            match phase {
                PowerPhase::PowerUp => self.power_up_sensor(&mut report.faults),
                PowerPhase::Dwell => {}
                PowerPhase::Teardown => self.tear_down_sensor(&mut report.faults),
            }
            report.power_phase = Some(phase);
        }
        report.sensor_powered = self.sensor_powered;

        match self.sample_temperature(&mut report.faults) {
            Ok(celsius) => {
                self.state.last_temperature_celsius = celsius;
                report.temperature_celsius = Some(celsius);
            }
            Err(fault) => record(&mut report.faults, fault),
        }

        let reading = self.comparator.output();
        self.comparator.disable();
        self.pins.set_output(NodePin::Excitation, false);
        report.comparator = reading;
        if reading != self.state.last_comparator_reading {
            self.apply_threshold_change();
            report.threshold_toggled = true;
        }
        self.state.last_comparator_reading = reading;
        report.threshold_level = self.state.threshold_level;
        report.led_status = self.state.led_status;

        self.queue_measurement(&mut report);
        report
    }

    /// Transmitter-ready interrupt: hand over the next queued byte.
    pub fn on_transmit_complete(&mut self) -> TransmitProgress {
        if !self.transmitting {
            return TransmitProgress::Idle;
        }
        if let Ok(byte) = self.ring.dequeue() {
            self.transmitter.send_byte(byte);
            return TransmitProgress::Sent;
        }
        self.transmitting = false;
        self.release_counted(self.config.holds.transmit);
        TransmitProgress::Drained
    }

    /// Data-ready edge from the external sensor.
    ///
    /// Reads channel 0 and drives the indicator high when it reads dark.
    ///
    /// # Errors
    ///
    /// [`NodeFault::SensorUnpowered`] outside the powered window, or
    /// [`NodeFault::Sensor`] when the read fails. The bus hold is released in
    /// both cases.
    pub fn on_sensor_edge(&mut self) -> Result<LightSample, NodeFault> {
        if !self.sensor_powered {
            return Err(NodeFault::SensorUnpowered);
        }
        let hold = self.config.holds.bus;
        self.arbiter.acquire(hold);
        let reading = sensor::read_channel0(&mut self.bus);
        self.release_counted(hold);

        let (low, high) = reading?;
        let sample = LightSample {
            low,
            high,
            dark: self.config.sensor.is_dark(high),
        };
        self.pins.set_output(NodePin::Indicator, sample.dark);
        self.state.last_light = Some(sample);
        Ok(sample)
    }

    /// Reads back every sensor register while the sensor is powered.
    ///
    /// # Errors
    ///
    /// Same as [`on_sensor_edge`](Self::on_sensor_edge).
    pub fn sensor_registers(&mut self) -> Result<Vec<(Register, u8), REGISTER_COUNT>, NodeFault> {
        if !self.sensor_powered {
            return Err(NodeFault::SensorUnpowered);
        }
        let hold = self.config.holds.bus;
        self.arbiter.acquire(hold);
        let dump = sensor::dump_registers(&mut self.bus);
        self.release_counted(hold);
        Ok(dump?)
    }

    /// Sleeps as deep as the current holds allow.
    pub fn enter_sleep<W>(&self, power: &mut W) -> SleepMode
    where
        W: PowerControl + ?Sized,
    {
        self.arbiter.enter_selected(power)
    }

    fn power_up_sensor(&mut self, faults: &mut FaultLog) {
        if self.sensor_powered {
            return;
        }
        let hold = self.config.holds.bus;
        self.arbiter.acquire(hold);
        self.pins.set_output(NodePin::SensorPower, true);
        self.delay.delay_us(self.config.sensor_settle_us);

        match sensor::power_up(&mut self.bus, &self.config.sensor) {
            Ok(()) => {
                self.pins
                    .configure_edge_interrupt(NodePin::SensorInterrupt, true);
                self.sensor_powered = true;
            }
            Err(err) => {
                record(faults, err);
                self.pins
                    .configure_edge_interrupt(NodePin::SensorInterrupt, false);
                self.pins.set_output(NodePin::SensorPower, false);
                self.release(hold, faults);
            }
        }
    }

    fn tear_down_sensor(&mut self, faults: &mut FaultLog) {
        if self.sensor_powered {
            self.pins
                .configure_edge_interrupt(NodePin::SensorInterrupt, false);
            if let Err(err) = sensor::power_down(&mut self.bus) {
                record(faults, err);
            }
            self.sensor_powered = false;
            self.release(self.config.holds.bus, faults);
        }
        self.pins.set_output(NodePin::SensorPower, false);
    }

    fn sample_temperature(&mut self, faults: &mut FaultLog) -> Result<f32, SampleError> {
        let hold = self.config.holds.adc;
        self.arbiter.acquire(hold);
        let mean = self.collect_samples();
        self.release(hold, faults);
        Ok(self.calibration.celsius(mean?))
    }

    /// Integer mean of `sample_count` conversions.
    fn collect_samples(&mut self) -> Result<u32, SampleError> {
        let count = self.config.sample_count;
        if count == 0 {
            return Err(SampleError::NoSamples);
        }
        let poll_limit = self.config.adc_poll_limit;
        let mut sum = 0u64;

        match self.config.sampling {
            SamplingStrategy::Polled => {
                for completed in 0..count {
                    self.adc.start_single_conversion();
                    if !(0..poll_limit).any(|_| self.adc.is_conversion_done()) {
                        return Err(SampleError::ConversionTimeout { completed });
                    }
                    sum += u64::from(self.adc.read_result());
                }
            }
            SamplingStrategy::Block => {
                let mut chunk = [0u16; SAMPLE_CHUNK];
                let mut completed = 0u16;
                while completed < count {
                    let want = usize::from(count - completed).min(SAMPLE_CHUNK);
                    let got = self.adc.read_block(&mut chunk[..want], poll_limit).min(want);
                    sum += chunk[..got].iter().map(|code| u64::from(*code)).sum::<u64>();
                    // `got` never exceeds SAMPLE_CHUNK.
                    #[allow(clippy::cast_possible_truncation)]
                    let got_samples = got as u16;
                    completed += got_samples;
                    if got < want {
                        return Err(SampleError::ConversionTimeout { completed });
                    }
                }
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let mean = (sum / u64::from(count)) as u32;
        Ok(mean)
    }

    fn apply_threshold_change(&mut self) {
        let level = self.state.threshold_level.toggled();
        self.state.threshold_level = level;
        self.comparator
            .set_reference_channel(self.config.reference(level));
        self.state.led_status = !self.state.led_status;
        self.pins.set_output(NodePin::Status, self.state.led_status);
    }

    fn queue_measurement(&mut self, report: &mut PeriodReport) {
        if self.transmitting {
            self.transmitting = false;
            self.release(self.config.holds.transmit, &mut report.faults);
        }
        report.discarded_bytes = self.ring.len();
        if let Err(err) = self.ring.allocate(self.config.ring_capacity) {
            record(&mut report.faults, err);
            return;
        }

        let frame = Measurement {
            temperature_celsius: self.state.last_temperature_celsius,
            led_status: self.state.led_status,
        }
        .encode();
        if let Err(err) = self.ring.extend_from_slice(&frame) {
            record(&mut report.faults, err);
            return;
        }
        report.queued_bytes = frame.len();

        self.arbiter.acquire(self.config.holds.transmit);
        self.transmitting = true;
        match self.ring.dequeue() {
            Ok(byte) => self.transmitter.send_byte(byte),
            Err(err) => record(&mut report.faults, err),
        }
    }

    fn release(&mut self, mode: SleepMode, faults: &mut FaultLog) {
        if let Err(err) = self.arbiter.release(mode) {
            record(faults, err);
        }
    }

    fn release_counted(&mut self, mode: SleepMode) {
        if self.arbiter.release(mode).is_err() {
            self.state.hold_errors += 1;
        }
    }
}

impl<P, C, A, T, R, D, const N: usize> DutyCycle<P, C, A, T, R, D, N> {
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &DutyCycleState {
        &self.state
    }

    #[must_use]
    pub fn arbiter(&self) -> &SleepArbiter {
        &self.arbiter
    }

    #[must_use]
    pub fn ring(&self) -> &ByteRing<N> {
        &self.ring
    }

    #[must_use]
    pub fn calibration(&self) -> TemperatureCalibration {
        self.calibration
    }

    /// `true` between a successful power-up and the next teardown.
    #[must_use]
    pub fn sensor_powered(&self) -> bool {
        self.sensor_powered
    }

    /// `true` while a payload burst is draining.
    #[must_use]
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    #[must_use]
    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    #[must_use]
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub fn comparator_mut(&mut self) -> &mut C {
        &mut self.comparator
    }

    #[must_use]
    pub fn adc(&self) -> &A {
        &self.adc
    }

    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    #[must_use]
    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut T {
        &mut self.transmitter
    }

    pub fn bus_mut(&mut self) -> &mut R {
        &mut self.bus
    }

    #[must_use]
    pub fn delay(&self) -> &D {
        &self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, BusStage};
    use crate::sim::{SimAdc, SimClocks, SimComparator, SimDelay, SimPins, SimTransmitter};

    /// Register access that either always works or always times out.
    struct ScriptedBus {
        online: bool,
        writes: u32,
    }

    impl RegisterAccess for ScriptedBus {
        fn read_register(&mut self, _register: u8) -> Result<u8, BusError> {
            if self.online {
                Ok(0x04)
            } else {
                Err(BusError::ProtocolTimeout {
                    stage: BusStage::Address,
                })
            }
        }

        fn write_register(&mut self, _register: u8, _value: u8) -> Result<(), BusError> {
            if self.online {
                self.writes += 1;
                Ok(())
            } else {
                Err(BusError::ProtocolTimeout {
                    stage: BusStage::Address,
                })
            }
        }
    }

    type TestCycle<'a> =
        DutyCycle<SimPins<'a>, SimComparator, SimAdc, SimTransmitter, ScriptedBus, SimDelay, 8>;

    fn cycle(config: NodeConfig, online: bool) -> TestCycle<'static> {
        let cal = TemperatureCalibration::new(25.0, 100.0, 10.0);
        let mut node = DutyCycle::new(
            config.with_sample_count(4),
            SimPins::new(),
            SimComparator::new(),
            SimAdc::new(cal, 100),
            SimTransmitter::new(),
            ScriptedBus { online, writes: 0 },
            SimDelay::new(),
        );
        node.start(&mut SimClocks::new()).unwrap();
        node
    }

    #[test]
    fn start_places_only_the_idle_hold() {
        let node = cycle(NodeConfig::DEFAULT, true);
        assert_eq!(node.arbiter().total_holds(), 1);
        assert!(node.arbiter().is_held(SleepMode::Stop));
        assert_eq!(node.ring().capacity(), 5);
        assert_eq!(
            node.comparator().reference(),
            Some(NodeConfig::DEFAULT.low_reference)
        );
    }

    #[test]
    fn failed_power_up_rolls_back_immediately() {
        let mut node = cycle(NodeConfig::DEFAULT, false);
        let report = node.on_period();

        assert_eq!(report.power_phase, Some(PowerPhase::PowerUp));
        assert!(!report.sensor_powered);
        assert!(matches!(report.faults[0], NodeFault::Sensor(_)));
        assert!(!node.pins().output(NodePin::SensorPower));
        assert!(!node.pins().edge_enabled(NodePin::SensorInterrupt));
        assert!(!node.arbiter().is_held(SleepMode::Sleep));
    }

    #[test]
    fn edge_outside_powered_window_is_rejected() {
        let mut node = cycle(NodeConfig::DEFAULT, true);
        assert_eq!(node.on_sensor_edge(), Err(NodeFault::SensorUnpowered));

        node.on_period();
        let sample = node.on_sensor_edge().unwrap();
        assert!(sample.dark);
        assert!(node.pins().output(NodePin::Indicator));
        assert_eq!(node.arbiter().hold_count(SleepMode::Sleep), 1);
    }

    #[test]
    fn warmup_timeout_is_reported_and_period_still_tears_down() {
        let config = NodeConfig::DEFAULT.with_poll_limits(1_000, 3);
        let cal = TemperatureCalibration::new(25.0, 100.0, 10.0);
        let mut node: TestCycle<'static> = DutyCycle::new(
            config.with_sample_count(1),
            SimPins::new(),
            SimComparator::new().with_warmup_polls(10),
            SimAdc::new(cal, 100),
            SimTransmitter::new(),
            ScriptedBus {
                online: true,
                writes: 0,
            },
            SimDelay::new(),
        );
        node.start(&mut SimClocks::new()).unwrap();

        assert_eq!(node.on_sub_interval(), Err(NodeFault::WarmupTimeout));
        node.on_period();
        assert!(!node.comparator().is_enabled());
        assert!(!node.pins().output(NodePin::Excitation));
    }

    #[test]
    fn stalled_adc_keeps_previous_temperature() {
        let mut node = cycle(NodeConfig::DEFAULT.with_sensor_schedule(false), true);
        let first = node.on_period();
        assert_eq!(first.temperature_celsius, Some(25.0));
        assert_eq!(first.power_phase, None);

        node.adc_mut().set_stalled(true);
        let second = node.on_period();
        assert_eq!(second.temperature_celsius, None);
        assert_eq!(
            second.faults.as_slice(),
            &[NodeFault::Sample(SampleError::ConversionTimeout {
                completed: 0
            })]
        );
        assert!(!node.arbiter().is_held(SleepMode::Sleep));
        assert_eq!(node.state().last_temperature_celsius, 25.0);
    }

    #[test]
    fn block_sampling_uses_chunked_transfers() {
        let config = NodeConfig::DEFAULT
            .with_sampling(SamplingStrategy::Block)
            .with_sensor_schedule(false);
        let mut node = cycle(config, true);
        node.adc_mut().queue_codes(&[100, 102, 98, 100]);
        let report = node.on_period();
        assert_eq!(report.temperature_celsius, Some(25.0));
        assert_eq!(node.adc().block_transfers(), 1);
    }

    #[test]
    fn unfinished_burst_is_discarded_and_its_hold_released() {
        let mut node = cycle(NodeConfig::DEFAULT.with_sensor_schedule(false), true);
        node.on_period();
        assert_eq!(node.on_transmit_complete(), TransmitProgress::Sent);
        assert_eq!(node.arbiter().hold_count(SleepMode::DeepSleep), 1);

        let report = node.on_period();
        assert_eq!(report.discarded_bytes, 3);
        assert_eq!(report.queued_bytes, 5);
        assert_eq!(node.arbiter().hold_count(SleepMode::DeepSleep), 1);
        assert!(report.is_clean());
    }

    #[test]
    fn spurious_transmit_interrupt_is_idle() {
        let mut node = cycle(NodeConfig::DEFAULT, true);
        assert_eq!(node.on_transmit_complete(), TransmitProgress::Idle);
        assert_eq!(node.state().hold_errors, 0);
    }
}

use node_core::board::NodePin;
use node_core::calibration::TemperatureCalibration;
use node_core::duty::{
    DutyCycle, NodeConfig, NodeFault, PowerPhase, ThresholdLevel, TransmitProgress,
};
use node_core::payload::{Measurement, PAYLOAD_LEN};
use node_core::sensor::Register;
use node_core::sim::{
    SimAdc, SimBus, SimClocks, SimComparator, SimDelay, SimDutyCycle, SimPins, SimPower,
    SimTransmitter,
};
use node_core::sleep::SleepMode;

const CAL: TemperatureCalibration = TemperatureCalibration::new(25.0, 100.0, 10.0);

fn config() -> NodeConfig {
    let config = NodeConfig::DEFAULT.with_sample_count(4);
    config.with_bus(config.bus.with_half_period_ns(1_000))
}

fn build(sensor: &SimBus, config: NodeConfig) -> SimDutyCycle<'_, 8> {
    let mut node = DutyCycle::new(
        config,
        SimPins::with_sensor(sensor),
        SimComparator::new().with_warmup_polls(2),
        SimAdc::new(CAL, 100),
        SimTransmitter::new(),
        sensor.register_bus(config.bus),
        SimDelay::new(),
    );
    let mut clocks = SimClocks::new();
    node.start(&mut clocks).expect("node starts");
    assert!(clocks.all_enabled());
    node
}

fn drain(node: &mut SimDutyCycle<'_, 8>) -> usize {
    let mut sent = 0;
    while node.on_transmit_complete() == TransmitProgress::Sent {
        sent += 1;
    }
    sent
}

#[test]
fn sensor_is_power_cycled_once_every_three_periods() {
    let sensor = SimBus::new(0x39, 0x80);
    let mut node = build(&sensor, config());

    for n in 1..=4u32 {
        for _ in 0..3 {
            node.on_sub_interval().expect("comparator warms up");
            let report = node.on_period();
            assert!(report.is_clean(), "unexpected faults: {:?}", report.faults);
            drain(&mut node);

            if node.state().power_cycle_counter == 2 {
                assert!(!node.pins().output(NodePin::SensorPower));
                assert!(!sensor.is_powered());
                assert!(!node.pins().edge_enabled(NodePin::SensorInterrupt));
            } else {
                assert!(node.pins().output(NodePin::SensorPower));
                assert!(node.sensor_powered());
            }
        }
        assert_eq!(node.pins().rising_edges(NodePin::SensorPower), n);
    }

    assert_eq!(node.arbiter().total_holds(), 1, "only the idle hold remains");
    assert_eq!(node.arbiter().select_deepest_allowed(), SleepMode::Stop);
}

#[test]
fn power_up_configures_the_sensor_and_teardown_powers_it_down() {
    let sensor = SimBus::new(0x39, 0x80);
    let mut node = build(&sensor, config());

    let report = node.on_period();
    assert_eq!(report.power_phase, Some(PowerPhase::PowerUp));
    assert!(report.sensor_powered);
    assert_eq!(sensor.register(Register::Control.address()), 0x03);
    assert_eq!(sensor.register(Register::ThresholdHighHigh.address()), 0x08);
    assert_eq!(sensor.register(Register::Interrupt.address()), 0x14);
    assert!(node.pins().edge_enabled(NodePin::SensorInterrupt));
    assert!(node.arbiter().is_held(SleepMode::Sleep));

    let dump = node.sensor_registers().expect("dump while powered");
    assert!(dump.contains(&(Register::Timing, 0x01)));

    assert_eq!(node.on_period().power_phase, Some(PowerPhase::Dwell));
    assert!(sensor.is_powered());

    let writes_before = sensor.traffic().register_writes;
    let report = node.on_period();
    assert_eq!(report.power_phase, Some(PowerPhase::Teardown));
    assert!(!report.sensor_powered);
    assert_eq!(sensor.traffic().register_writes, writes_before + 2);
    assert!(!node.arbiter().is_held(SleepMode::Sleep));
    assert_eq!(node.sensor_registers(), Err(NodeFault::SensorUnpowered));
}

#[test]
fn absent_sensor_is_reported_and_rolled_back() {
    let sensor = SimBus::new(0x39, 0x80);
    sensor.set_online(false);
    let mut node = build(&sensor, config());

    let report = node.on_period();
    assert!(matches!(
        report.faults.first(),
        Some(NodeFault::Sensor(err)) if err.register == Register::Control
    ));
    assert!(!node.pins().output(NodePin::SensorPower));
    assert_eq!(node.arbiter().hold_count(SleepMode::Sleep), 0);
    assert!(sensor.is_idle());

    // The schedule keeps rotating; the next power-up succeeds once it answers.
    node.on_period();
    node.on_period();
    sensor.set_online(true);
    let report = node.on_period();
    assert!(report.is_clean());
    assert!(node.sensor_powered());
}

#[test]
fn sensor_lost_before_teardown_still_releases_power_and_hold() {
    let sensor = SimBus::new(0x39, 0x80);
    let mut node = build(&sensor, config());

    assert_eq!(node.on_period().power_phase, Some(PowerPhase::PowerUp));
    drain(&mut node);
    assert_eq!(node.on_period().power_phase, Some(PowerPhase::Dwell));
    drain(&mut node);
    assert_eq!(node.arbiter().hold_count(SleepMode::Sleep), 1);

    sensor.set_online(false);
    let report = node.on_period();
    drain(&mut node);
    assert_eq!(report.power_phase, Some(PowerPhase::Teardown));
    assert!(matches!(
        report.faults.first(),
        Some(NodeFault::Sensor(err)) if err.register == Register::Interrupt
    ));
    assert!(!report.sensor_powered);
    assert_eq!(node.state().power_cycle_counter, 2);
    assert_eq!(node.arbiter().hold_count(SleepMode::Sleep), 0);
    assert!(!node.pins().output(NodePin::SensorPower));
    assert!(!node.pins().edge_enabled(NodePin::SensorInterrupt));

    sensor.set_online(true);
    let report = node.on_period();
    drain(&mut node);
    assert_eq!(report.power_phase, Some(PowerPhase::PowerUp));
    assert!(report.is_clean(), "unexpected faults: {:?}", report.faults);
    assert!(node.sensor_powered());
    assert_eq!(node.arbiter().hold_count(SleepMode::Sleep), 1);
    assert_eq!(node.arbiter().total_holds(), 2);
}

#[test]
fn threshold_toggles_once_per_comparator_change() {
    let sensor = SimBus::new(0x39, 0x80);
    let mut node = build(&sensor, config().with_sensor_schedule(false));
    let low = node.config().low_reference;
    let high = node.config().high_reference;

    let readings = [true, true, false, true, false, false];
    let expected_toggle = [true, false, true, true, true, false];
    let mut level = ThresholdLevel::Low;
    for (reading, toggles) in readings.into_iter().zip(expected_toggle) {
        node.comparator_mut().set_level(reading);
        node.on_sub_interval().expect("warm-up");
        let report = node.on_period();
        drain(&mut node);

        assert_eq!(report.comparator, reading);
        assert_eq!(report.threshold_toggled, toggles);
        if toggles {
            level = level.toggled();
        }
        assert_eq!(report.threshold_level, level);
        let reference = if level == ThresholdLevel::Low { low } else { high };
        assert_eq!(node.comparator().reference(), Some(reference));
        assert_eq!(node.pins().output(NodePin::Status), report.led_status);
    }
    assert!(!node.state().led_status, "four toggles return the status low");
}

#[test]
fn period_scenario_queues_and_drains_one_measurement() {
    let sensor = SimBus::new(0x39, 0x80);
    let mut node = build(&sensor, config());
    node.adc_mut().queue_codes(&[100, 102, 98, 100]);

    node.on_sub_interval().expect("warm-up");
    assert!(node.pins().output(NodePin::Excitation));
    let report = node.on_period();

    assert_eq!(report.period, 1);
    assert_eq!(report.power_phase, Some(PowerPhase::PowerUp));
    assert!(report.sensor_powered);
    let celsius = report.temperature_celsius.expect("temperature sampled");
    assert!((celsius - 25.0).abs() < 1e-4, "got {celsius}");
    assert!(!report.comparator);
    assert!(!report.threshold_toggled);
    assert_eq!(report.queued_bytes, PAYLOAD_LEN);
    assert_eq!(report.discarded_bytes, 0);
    assert!(!node.pins().output(NodePin::Excitation));
    assert!(node.arbiter().is_held(SleepMode::DeepSleep));

    let mut power = SimPower::new();
    assert_eq!(node.enter_sleep(&mut power), SleepMode::Sleep);

    assert_eq!(drain(&mut node), PAYLOAD_LEN - 1);
    assert!(node.ring().is_empty());
    assert!(!node.arbiter().is_held(SleepMode::DeepSleep));
    assert_eq!(node.on_transmit_complete(), TransmitProgress::Idle);

    let frame: [u8; PAYLOAD_LEN] = node
        .transmitter()
        .sent()
        .try_into()
        .expect("exactly one frame");
    let decoded = Measurement::decode(&frame).expect("valid frame");
    assert!((decoded.temperature_celsius - celsius).abs() < f32::EPSILON);
    assert!(!decoded.led_status);
}

#[test]
fn sensor_edge_drives_indicator_from_channel_zero() {
    let sensor = SimBus::new(0x39, 0x80);
    let mut node = build(&sensor, config());
    node.on_period();

    sensor.set_register(Register::Data0Low.address(), 0x10);
    sensor.set_register(Register::Data0High.address(), 0x20);
    let bright = node.on_sensor_edge().expect("edge while powered");
    assert_eq!(bright.count(), 0x2010);
    assert!(!bright.dark);
    assert!(!node.pins().output(NodePin::Indicator));

    sensor.set_register(Register::Data0High.address(), 0x02);
    let dark = node.on_sensor_edge().expect("edge while powered");
    assert!(dark.dark);
    assert!(node.pins().output(NodePin::Indicator));
    assert_eq!(node.arbiter().hold_count(SleepMode::Sleep), 1);
}

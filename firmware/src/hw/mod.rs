//! STM32G0 adapters for the board traits of `node-core`.
//!
//! Peripherals that embassy drives well (GPIO, ADC, LPUART, DAC) go through
//! the HAL. The low-power timer, comparator and EXTI routing have no blocking
//! driver there and are programmed through the typed registers of
//! `embassy_stm32::pac`.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use node_core::duty::{HoldModes, NodeConfig};
use node_core::sleep::SleepMode;
use node_core::timing::{ClockStrategy, DutyCycleTiming, TimerCompare, TimingError};

#[cfg(target_os = "none")]
pub mod adc;
#[cfg(target_os = "none")]
pub mod clocks;
#[cfg(target_os = "none")]
pub mod comparator;
#[cfg(target_os = "none")]
pub mod pins;
#[cfg(target_os = "none")]
pub mod power;
#[cfg(target_os = "none")]
pub mod serial;
#[cfg(target_os = "none")]
pub mod timer;

/// Nominal LSI frequency feeding the low-power timer.
pub const LSI_HZ: u32 = 32_000;

/// Payload line rate.
pub const SERIAL_BAUD: u32 = 9_600;

/// Comparator and reference DAC start-up before the output is trusted.
pub const COMPARATOR_STARTUP_US: u64 = 20;

/// Steps of the reference divider; a [`ReferenceChannel`] scale of 63 is VDD.
///
/// [`ReferenceChannel`]: node_core::board::ReferenceChannel
pub const REFERENCE_STEPS: u32 = 63;

/// Full scale of the 12-bit reference DAC.
pub const DAC_FULL_SCALE: u32 = 4_095;

/// Sleep holds for this board.
///
/// LPUART1 runs from PCLK, which stops in every Stop mode, so a draining
/// payload burst holds the core in Sleep.
pub const NODE_HOLDS: HoldModes = HoldModes {
    transmit: SleepMode::Sleep,
    ..HoldModes::DEFAULT
};

/// Duty-cycle settings used by the firmware.
pub const fn node_config() -> NodeConfig {
    NodeConfig::DEFAULT.with_holds(NODE_HOLDS)
}

/// DAC code producing `vdd_scale / 63` of VDD.
#[allow(clippy::cast_possible_truncation)]
pub const fn reference_code(vdd_scale: u8) -> u16 {
    let scale = if (vdd_scale as u32) > REFERENCE_STEPS {
        REFERENCE_STEPS
    } else {
        vdd_scale as u32
    };
    (scale * DAC_FULL_SCALE / REFERENCE_STEPS) as u16
}

/// Compare values for the low-power timer running from LSI.
pub fn timer_compare(timing: DutyCycleTiming) -> Result<TimerCompare, TimingError> {
    timing.compare_values(LSI_HZ, ClockStrategy::Fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_core::calibration::TemperatureCalibration;
    use node_core::duty::{DutyCycle, TransmitProgress};
    use node_core::sim::{
        SimAdc, SimBus, SimClocks, SimComparator, SimDelay, SimDutyCycle, SimPins, SimPower,
        SimTransmitter,
    };

    #[test]
    fn payload_burst_keeps_the_serial_clock_running() {
        let sensor = SimBus::new(0x39, 0x80);
        let config = node_config()
            .with_sample_count(4)
            .with_sensor_schedule(false);
        let mut node: SimDutyCycle<'_, 8> = DutyCycle::new(
            config,
            SimPins::with_sensor(&sensor),
            SimComparator::new(),
            SimAdc::new(TemperatureCalibration::new(30.0, 1_037.0, 3.41), 1_037),
            SimTransmitter::new(),
            sensor.register_bus(config.bus),
            SimDelay::new(),
        );
        node.start(&mut SimClocks::new()).expect("node starts");
        let mut power = SimPower::new();

        let report = node.on_period();
        assert!(report.queued_bytes > 0);
        assert_eq!(node.enter_sleep(&mut power), SleepMode::Sleep);

        while node.on_transmit_complete() == TransmitProgress::Sent {}
        assert_eq!(node.enter_sleep(&mut power), SleepMode::Stop);
    }

    #[test]
    fn reference_codes_span_the_dac() {
        assert_eq!(reference_code(0), 0);
        assert_eq!(reference_code(63), 4_095);
        assert_eq!(reference_code(200), 4_095);
        assert_eq!(reference_code(2), 130);
        assert_eq!(reference_code(61), 3_965);
    }

    #[test]
    fn default_period_fits_lsi_timer() {
        let compare = timer_compare(DutyCycleTiming::DEFAULT).expect("default timing fits");
        // 32000 Hz * 4.25 s = 136000 ticks, divided by 4.
        assert_eq!(compare.prescaler_shift, 2);
        assert_eq!(compare.period_ticks, 34_000);
        assert_eq!(compare.lead_ticks, 32);
    }
}

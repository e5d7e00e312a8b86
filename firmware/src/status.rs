#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The interrupt handlers publish the latest measurement here so the idle
//! loop can log a `StatusSnapshot` without taking the node lock.

use node_core::duty::{PeriodReport, ThresholdLevel};
use portable_atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

/// Sentinel for "no temperature sampled yet".
const UNKNOWN_TEMPERATURE: i32 = i32::MIN;

/// Period boundaries handled so far.
static PERIODS: AtomicU32 = AtomicU32::new(0);
/// Latest temperature in hundredths of a degree.
static TEMPERATURE_CENTI: AtomicI32 = AtomicI32::new(UNKNOWN_TEMPERATURE);
static LED_STATUS: AtomicBool = AtomicBool::new(false);
/// 0 == low threshold, 1 == high threshold.
static THRESHOLD: AtomicU8 = AtomicU8::new(0);
static SENSOR_POWERED: AtomicBool = AtomicBool::new(false);
/// Faults seen across all handlers.
static FAULTS: AtomicU32 = AtomicU32::new(0);
/// Payload bytes handed to the transmitter.
static BYTES_SENT: AtomicU32 = AtomicU32::new(0);
/// Sensor interrupts serviced while the sensor was powered.
static EDGES: AtomicU32 = AtomicU32::new(0);

/// Point-in-time copy of the published status.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub periods: u32,
    pub temperature_centi: Option<i32>,
    pub led_status: bool,
    pub threshold: ThresholdLevel,
    pub sensor_powered: bool,
    pub faults: u32,
    pub bytes_sent: u32,
    pub edges: u32,
}

#[allow(clippy::cast_possible_truncation)]
fn centi(celsius: f32) -> i32 {
    let scaled = celsius * 100.0;
    if scaled >= 0.0 {
        (scaled + 0.5) as i32
    } else {
        (scaled - 0.5) as i32
    }
}

/// Publishes the outcome of a period boundary.
pub fn record_period(report: &PeriodReport) {
    PERIODS.store(report.period, Ordering::Relaxed);
    if let Some(celsius) = report.temperature_celsius {
        TEMPERATURE_CENTI.store(centi(celsius), Ordering::Relaxed);
    }
    LED_STATUS.store(report.led_status, Ordering::Relaxed);
    let threshold = match report.threshold_level {
        ThresholdLevel::Low => 0,
        ThresholdLevel::High => 1,
    };
    THRESHOLD.store(threshold, Ordering::Relaxed);
    SENSOR_POWERED.store(report.sensor_powered, Ordering::Relaxed);
    #[allow(clippy::cast_possible_truncation)]
    let faults = report.faults.len() as u32;
    FAULTS.fetch_add(faults, Ordering::Relaxed);
}

/// Counts a fault raised outside a period report.
pub fn record_fault() {
    FAULTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_byte_sent() {
    BYTES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn record_edge() {
    EDGES.fetch_add(1, Ordering::Relaxed);
}

/// Returns the number of handled period boundaries.
pub fn periods() -> u32 {
    PERIODS.load(Ordering::Relaxed)
}

pub fn snapshot() -> StatusSnapshot {
    let temperature = match TEMPERATURE_CENTI.load(Ordering::Relaxed) {
        UNKNOWN_TEMPERATURE => None,
        value => Some(value),
    };
    let threshold = if THRESHOLD.load(Ordering::Relaxed) == 0 {
        ThresholdLevel::Low
    } else {
        ThresholdLevel::High
    };
    StatusSnapshot {
        periods: PERIODS.load(Ordering::Relaxed),
        temperature_centi: temperature,
        led_status: LED_STATUS.load(Ordering::Relaxed),
        threshold,
        sensor_powered: SENSOR_POWERED.load(Ordering::Relaxed),
        faults: FAULTS.load(Ordering::Relaxed),
        bytes_sent: BYTES_SENT.load(Ordering::Relaxed),
        edges: EDGES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_temperature_to_hundredths() {
        assert_eq!(centi(25.0), 2500);
        assert_eq!(centi(24.996), 2500);
        assert_eq!(centi(-3.214), -321);
    }
}

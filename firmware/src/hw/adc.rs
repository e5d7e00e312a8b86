//! Internal temperature sensor sampling on the STM32G0 ADC.
//!
//! Conversions go through the Embassy blocking driver. The two factory
//! calibration points in system memory give the code-to-Celsius line.

use core::ptr;

use embassy_stm32::adc::{Adc, SampleTime, Temperature};
use embassy_stm32::peripherals::ADC1;
use node_core::board::TemperatureAdc;
use node_core::calibration::TemperatureCalibration;

/// Factory code measured at 30 °C.
const TS_CAL1_ADDR: *const u16 = 0x1FFF_75A8 as *const u16;
/// Factory code measured at 130 °C.
const TS_CAL2_ADDR: *const u16 = 0x1FFF_75CA as *const u16;
const TS_CAL1_TEMP: f32 = 30.0;
const TS_CAL2_TEMP: f32 = 130.0;

/// Typical datasheet line, used when the factory words are blank.
const FALLBACK_CALIBRATION: TemperatureCalibration =
    TemperatureCalibration::new(30.0, 1_037.0, 3.41);

/// Reads the factory-trimmed temperature calibration.
pub fn read_temperature_calibration() -> TemperatureCalibration {
    // SAFETY: system memory is always mapped and readable.
    let cal1 = unsafe { ptr::read_volatile(TS_CAL1_ADDR) };
    let cal2 = unsafe { ptr::read_volatile(TS_CAL2_ADDR) };
    if cal1 == cal2 {
        return FALLBACK_CALIBRATION;
    }
    TemperatureCalibration::from_two_points((TS_CAL1_TEMP, cal1), (TS_CAL2_TEMP, cal2))
        .unwrap_or(FALLBACK_CALIBRATION)
}

/// Embassy ADC wrapper bound to the temperature channel.
pub struct TemperatureChannel<'d> {
    adc: Adc<'d, ADC1>,
    channel: Temperature,
    calibration: TemperatureCalibration,
    pending: Option<u16>,
}

impl<'d> TemperatureChannel<'d> {
    /// Enables the temperature sensor and reads the factory calibration.
    pub fn new(mut adc: Adc<'d, ADC1>) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let channel = adc.enable_temperature();
        Self {
            adc,
            channel,
            calibration: read_temperature_calibration(),
            pending: None,
        }
    }
}

impl TemperatureAdc for TemperatureChannel<'_> {
    fn start_single_conversion(&mut self) {
        self.pending = Some(self.adc.blocking_read(&mut self.channel));
    }

    fn is_conversion_done(&mut self) -> bool {
        self.pending.is_some()
    }

    fn read_result(&mut self) -> u16 {
        self.pending.take().unwrap_or_default()
    }

    fn calibration(&self) -> TemperatureCalibration {
        self.calibration
    }
}

//! COMP1 watching the light path against a DAC-generated reference.
//!
//! The light input sits on the non-inverting pin (PA1) and DAC channel 1
//! drives the inverting side. A reference channel with the sensor on the
//! negative side is emulated by inverting the output polarity.

use embassy_stm32::dac::{DacCh1, Value};
use embassy_stm32::mode::Blocking;
use embassy_stm32::pac;
use embassy_stm32::peripherals::DAC1;
use embassy_time::{Duration, Instant};
use node_core::board::{Comparator, ReferenceChannel};

use super::{COMPARATOR_STARTUP_US, reference_code};

/// INMSEL value routing DAC channel 1 to the inverting input.
const INMSEL_DAC1: u8 = 0b0100;
/// INPSEL value routing PA1 to the non-inverting input.
const INPSEL_PA1: u8 = 0b10;

pub type ReferenceDac = DacCh1<'static, DAC1, Blocking>;

pub struct FirmwareComparator {
    reference: ReferenceDac,
    enabled_at: Option<Instant>,
}

impl FirmwareComparator {
    pub fn new(reference: ReferenceDac) -> Self {
        pac::COMP1.csr().modify(|w| {
            w.set_en(false);
            w.set_inmsel(INMSEL_DAC1);
            w.set_inpsel(INPSEL_PA1);
        });
        Self {
            reference,
            enabled_at: None,
        }
    }
}

impl Comparator for FirmwareComparator {
    fn enable(&mut self) {
        self.reference.enable();
        pac::COMP1.csr().modify(|w| w.set_en(true));
        self.enabled_at = Some(Instant::now());
    }

    fn disable(&mut self) {
        pac::COMP1.csr().modify(|w| w.set_en(false));
        self.reference.disable();
        self.enabled_at = None;
    }

    fn set_reference_channel(&mut self, channel: ReferenceChannel) {
        self.reference
            .set(Value::Bit12Right(reference_code(channel.vdd_scale)));
        pac::COMP1
            .csr()
            .modify(|w| w.set_polarity(!channel.sensor_on_positive));
    }

    fn is_warmed_up(&mut self) -> bool {
        self.enabled_at.is_some_and(|since| {
            Instant::now().saturating_duration_since(since)
                >= Duration::from_micros(COMPARATOR_STARTUP_US)
        })
    }

    fn output(&mut self) -> bool {
        self.enabled_at.is_some() && pac::COMP1.csr().read().value()
    }
}

//! Mapping of sleep modes onto the Cortex-M0+ and the G0 low-power modes.

use cortex_m::asm;
use cortex_m::peripheral::SCB;
use embassy_stm32::pac;
use embassy_stm32::pac::pwr::vals::Lpms;
use node_core::sleep::{PowerControl, SleepMode};

/// Owns the system control block to steer `SLEEPDEEP`.
pub struct FirmwarePower {
    scb: SCB,
}

impl FirmwarePower {
    pub fn new(scb: SCB) -> Self {
        Self { scb }
    }

    fn stop(&mut self, lpms: Lpms) {
        pac::PWR.cr1().modify(|w| w.set_lpms(lpms));
        self.scb.set_sleepdeep();
        asm::wfi();
        self.scb.clear_sleepdeep();
    }
}

impl PowerControl for FirmwarePower {
    fn enter(&mut self, mode: SleepMode) {
        match mode {
            SleepMode::Run => {}
            SleepMode::Sleep => {
                self.scb.clear_sleepdeep();
                asm::wfi();
            }
            // Stop 0 keeps the main regulator on for a faster wake-up, but
            // PCLK-clocked peripherals such as LPUART1 stop with the core.
            SleepMode::DeepSleep => self.stop(Lpms::STOP0),
            SleepMode::Stop => self.stop(Lpms::STOP1),
        }
    }
}

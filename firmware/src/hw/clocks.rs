//! Clock gating for the node's peripherals.

use embassy_stm32::pac;
use embassy_stm32::pac::rcc::vals::Lptimsel;
use node_core::board::{ClockControl, ClockDomain};

/// RCC gate control. Embassy already clocks the peripherals it owns; the
/// rest are enabled here.
pub struct FirmwareClocks;

impl ClockControl for FirmwareClocks {
    fn enable_clock(&mut self, domain: ClockDomain) {
        let rcc = pac::RCC;
        match domain {
            ClockDomain::Timer => {
                // LPTIM1 runs from LSI so it keeps counting in Stop mode.
                rcc.csr().modify(|w| w.set_lsion(true));
                while !rcc.csr().read().lsirdy() {}
                rcc.ccipr().modify(|w| w.set_lptim1sel(Lptimsel::LSI));
                rcc.apbenr1().modify(|w| {
                    w.set_lptim1en(true);
                    w.set_pwren(true);
                });
            }
            ClockDomain::Gpio | ClockDomain::SerialBus => rcc.iopenr().modify(|w| {
                w.set_gpioaen(true);
                w.set_gpioben(true);
            }),
            ClockDomain::Comparator => {
                // COMP1 sits behind the SYSCFG gate.
                rcc.apbenr2().modify(|w| w.set_syscfgen(true));
                rcc.apbenr1().modify(|w| w.set_dac1en(true));
            }
            ClockDomain::Adc => rcc.apbenr2().modify(|w| w.set_adcen(true)),
            ClockDomain::Transmitter => rcc.apbenr1().modify(|w| w.set_lpuart1en(true)),
        }
    }
}

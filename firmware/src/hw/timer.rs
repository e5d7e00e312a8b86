//! LPTIM1 as the duty-cycle timebase.
//!
//! The compare match raises the sub-interval interrupt and the auto-reload
//! match raises the period interrupt. LPTIM keeps counting in Stop mode.

use embassy_stm32::pac;
use embassy_stm32::pac::lptim::vals::Presc;
use node_core::timing::TimerCompare;

/// Interrupt sources pending on the timer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimerEvents {
    pub sub_interval: bool,
    pub period: bool,
}

/// Programs and starts the timer in continuous mode.
pub fn start(compare: TimerCompare) {
    let lptim = pac::LPTIM1;
    lptim.cr().write(|w| w.set_enable(false));
    // Prescaler and interrupt enables may only change while disabled.
    lptim
        .cfgr()
        .write(|w| w.set_presc(Presc::from_bits(compare.prescaler_shift)));
    lptim.ier().write(|w| {
        w.set_cmpmie(true);
        w.set_arrmie(true);
    });
    lptim.cr().write(|w| w.set_enable(true));

    lptim.arr().write(|w| w.set_arr(compare.autoreload()));
    while !lptim.isr().read().arrok() {}
    lptim.icr().write(|w| w.set_arrokcf(true));

    lptim
        .cmp()
        .write(|w| w.set_cmp(compare.compare_match_up_counting()));
    while !lptim.isr().read().cmpok() {}
    lptim.icr().write(|w| w.set_cmpokcf(true));

    lptim.cr().modify(|w| w.set_cntstrt(true));
}

/// Reads and acknowledges the pending timer events.
pub fn take_events() -> TimerEvents {
    let lptim = pac::LPTIM1;
    let isr = lptim.isr().read();
    let events = TimerEvents {
        sub_interval: isr.cmpm(),
        period: isr.arrm(),
    };
    lptim.icr().write(|w| {
        w.set_cmpmcf(events.sub_interval);
        w.set_arrmcf(events.period);
    });
    events
}

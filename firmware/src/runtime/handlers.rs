//! Interrupt handlers driving the duty cycle.

use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_time::Instant;
use node_core::duty::TransmitProgress;

use super::with_node;
use crate::hw::{pins, serial, timer};
use crate::status;

/// Unmasks the three node interrupts at one shared priority.
pub(super) fn enable() {
    interrupt::TIM6_DAC_LPTIM1.set_priority(Priority::P1);
    interrupt::USART3_4_5_6_LPUART1.set_priority(Priority::P1);
    interrupt::EXTI4_15.set_priority(Priority::P1);
    // SAFETY: the handlers below only touch state through `with_node`.
    unsafe {
        interrupt::TIM6_DAC_LPTIM1.enable();
        interrupt::USART3_4_5_6_LPUART1.enable();
        interrupt::EXTI4_15.enable();
    }
}

#[interrupt]
fn TIM6_DAC_LPTIM1() {
    let events = timer::take_events();
    with_node(|context| {
        if events.sub_interval
            && let Err(fault) = context.node.on_sub_interval()
        {
            status::record_fault();
            context.telemetry.record_fault(fault, Instant::now());
        }
        if events.period {
            let report = context.node.on_period();
            status::record_period(&report);
            if report.queued_bytes > 0 {
                status::record_byte_sent();
            }
            context.telemetry.record_period(&report, Instant::now());
        }
    });
}

#[interrupt]
fn USART3_4_5_6_LPUART1() {
    if !serial::take_transmit_complete() {
        return;
    }
    with_node(|context| match context.node.on_transmit_complete() {
        TransmitProgress::Sent => status::record_byte_sent(),
        TransmitProgress::Drained => {
            context.telemetry.record_burst_drained(Instant::now());
        }
        TransmitProgress::Idle => {}
    });
}

#[interrupt]
fn EXTI4_15() {
    if !pins::take_sensor_edge() {
        return;
    }
    with_node(|context| match context.node.on_sensor_edge() {
        Ok(sample) => {
            status::record_edge();
            context.telemetry.record_sensor_edge(sample, Instant::now());
        }
        Err(fault) => {
            status::record_fault();
            context.telemetry.record_fault(fault, Instant::now());
        }
    });
}

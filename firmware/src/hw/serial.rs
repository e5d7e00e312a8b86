//! LPUART1 transmitter for the payload burst.
//!
//! Embassy configures the pin, frame and baud rate and writes each byte.
//! The transmission-complete interrupt paces the burst one byte at a time.

use embassy_stm32::mode::Blocking;
use embassy_stm32::pac;
use embassy_stm32::usart::UartTx;
use node_core::board::Transmitter;

pub struct PayloadTransmitter {
    uart: UartTx<'static, Blocking>,
}

impl PayloadTransmitter {
    pub fn new(uart: UartTx<'static, Blocking>) -> Self {
        let lpuart = pac::LPUART1;
        lpuart.icr().write(|w| w.set_tc(true));
        lpuart.cr1().modify(|w| w.set_tcie(true));
        Self { uart }
    }
}

/// Acknowledges transmission complete. Returns whether it was flagged.
pub fn take_transmit_complete() -> bool {
    let lpuart = pac::LPUART1;
    let complete = lpuart.isr().read().tc();
    if complete {
        lpuart.icr().write(|w| w.set_tc(true));
    }
    complete
}

impl Transmitter for PayloadTransmitter {
    fn send_byte(&mut self, byte: u8) {
        // Only waits for an empty data register, never for the line.
        if let Err(err) = self.uart.blocking_write(&[byte]) {
            defmt::warn!("serial: byte dropped: {}", defmt::Debug2Format(&err));
        }
    }
}

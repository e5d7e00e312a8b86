#![no_std]

// Shared logic for the light/temperature sensing node.
//
// Everything here is portable across the MCU firmware and host tooling: the
// duty-cycle state machine only talks to hardware through the collaborator
// traits in `board`, so the same code runs against real peripherals or the
// simulated ones in `sim`.

pub mod board;
pub mod bus;
pub mod calibration;
pub mod duty;
pub mod payload;
pub mod ring;
pub mod sensor;
pub mod sim;
pub mod sleep;
pub mod timing;

//! Bit-level model of the light sensor sitting on the two-wire bus.
//!
//! The model watches the two lines the way a real slave does: start and stop
//! conditions are SDA edges while SCL is high, data bits are sampled on SCL
//! rising edges, and the slave changes its own SDA drive on SCL falling
//! edges. Both lines are wired-AND, so a line reads low whenever either side
//! pulls it low.

use core::cell::RefCell;
use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// Register file size of the simulated device.
pub const SIM_REGISTER_COUNT: usize = 16;

/// Identification value reported by the simulated device.
pub const SIM_DEVICE_ID: u8 = 0x50;

const ID_REGISTER: usize = 0x0A;

/// Registers below this index lose their contents when power is removed.
const VOLATILE_REGISTERS: usize = 0x0A;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Target {
    Address,
    Command,
    Data,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum AfterAck {
    Receive(Target),
    Transmit,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    Receive { target: Target, shift: u8, bits: u8 },
    Ack { next: AfterAck },
    Transmit { byte: u8, sent: u8 },
    MasterAck { acked: bool },
    Ignored,
}

/// Counters describing the traffic seen by the simulated device.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BusTraffic {
    pub starts: u32,
    pub stops: u32,
    pub register_writes: u32,
    pub register_reads: u32,
    pub naks_sent: u32,
}

#[derive(Debug)]
#[allow(clippy::struct_excessive_bools)]
struct BusModel {
    master_scl: bool,
    master_sda: bool,
    slave_sda_low: bool,
    stretch_remaining: u16,
    stretch_per_edge: u16,
    clock_stuck: bool,
    online: bool,
    powered: bool,
    address: u8,
    command_prefix: u8,
    pointer: usize,
    registers: [u8; SIM_REGISTER_COUNT],
    phase: Phase,
    traffic: BusTraffic,
}

impl BusModel {
    fn scl_line(&self) -> bool {
        self.master_scl && !self.clock_stuck && self.stretch_remaining == 0
    }

    fn sda_line(&self) -> bool {
        self.master_sda && !self.slave_sda_low
    }

    fn set_scl(&mut self, high: bool) {
        let was_high = self.master_scl;
        self.master_scl = high;
        match (was_high, high) {
            (false, true) => {
                self.stretch_remaining = self.stretch_per_edge;
                self.on_scl_rise();
            }
            (true, false) => {
                self.stretch_remaining = 0;
                self.on_scl_fall();
            }
            _ => {}
        }
    }

    fn set_sda(&mut self, high: bool) {
        let before = self.sda_line();
        self.master_sda = high;
        let after = self.sda_line();
        if self.master_scl && before != after {
            if after {
                self.on_stop();
            } else {
                self.on_start();
            }
        }
    }

    fn read_scl(&mut self) -> bool {
        if self.master_scl && self.stretch_remaining > 0 {
            self.stretch_remaining -= 1;
            return false;
        }
        self.scl_line()
    }

    fn on_start(&mut self) {
        self.traffic.starts += 1;
        self.slave_sda_low = false;
        self.phase = Phase::Receive {
            target: Target::Address,
            shift: 0,
            bits: 0,
        };
    }

    fn on_stop(&mut self) {
        self.traffic.stops += 1;
        self.slave_sda_low = false;
        self.phase = Phase::Idle;
    }

    fn on_scl_rise(&mut self) {
        let line = self.sda_line();
        match self.phase {
            Phase::Receive {
                target,
                shift,
                bits,
            } if bits < 8 => {
                self.phase = Phase::Receive {
                    target,
                    shift: (shift << 1) | u8::from(line),
                    bits: bits + 1,
                };
            }
            Phase::MasterAck { .. } => {
                if line {
                    // NACK from the master ends the read burst.
                    self.phase = Phase::Ignored;
                } else {
                    self.phase = Phase::MasterAck { acked: true };
                }
            }
            _ => {}
        }
    }

    fn on_scl_fall(&mut self) {
        match self.phase {
            Phase::Receive {
                target,
                shift,
                bits: 8,
            } => self.accept_byte(target, shift),
            Phase::Ack { next } => {
                self.slave_sda_low = false;
                match next {
                    AfterAck::Receive(target) => {
                        self.phase = Phase::Receive {
                            target,
                            shift: 0,
                            bits: 0,
                        };
                    }
                    AfterAck::Transmit => self.begin_transmit(),
                }
            }
            Phase::Transmit { byte, sent } => {
                if sent == 8 {
                    self.slave_sda_low = false;
                    self.phase = Phase::MasterAck { acked: false };
                } else {
                    self.drive_bit(byte, sent);
                    self.phase = Phase::Transmit {
                        byte,
                        sent: sent + 1,
                    };
                }
            }
            Phase::MasterAck { acked: true } => {
                self.pointer = (self.pointer + 1) % SIM_REGISTER_COUNT;
                self.begin_transmit();
            }
            _ => {}
        }
    }

    fn accept_byte(&mut self, target: Target, byte: u8) {
        if !(self.online && self.powered) {
            self.traffic.naks_sent += 1;
            self.phase = Phase::Ignored;
            return;
        }

        let next = match target {
            Target::Address => {
                if byte >> 1 != self.address {
                    self.traffic.naks_sent += 1;
                    self.phase = Phase::Ignored;
                    return;
                }
                if byte & 0x01 == 0x01 {
                    AfterAck::Transmit
                } else {
                    AfterAck::Receive(Target::Command)
                }
            }
            Target::Command => {
                self.pointer = usize::from(byte & !self.command_prefix) % SIM_REGISTER_COUNT;
                AfterAck::Receive(Target::Data)
            }
            Target::Data => {
                self.registers[self.pointer] = byte;
                self.traffic.register_writes += 1;
                AfterAck::Receive(Target::Data)
            }
        };

        self.slave_sda_low = true;
        self.phase = Phase::Ack { next };
    }

    fn begin_transmit(&mut self) {
        let byte = self.registers[self.pointer];
        self.traffic.register_reads += 1;
        self.drive_bit(byte, 0);
        self.phase = Phase::Transmit { byte, sent: 1 };
    }

    fn drive_bit(&mut self, byte: u8, index: u8) {
        let bit = byte & (0x80 >> index) != 0;
        self.slave_sda_low = !bit;
    }
}

/// Shared state of the simulated bus and the device attached to it.
#[derive(Debug)]
pub struct SimBus {
    model: RefCell<BusModel>,
}

impl SimBus {
    /// Creates an idle bus with one responsive device at `address`.
    #[must_use]
    pub fn new(address: u8, command_prefix: u8) -> Self {
        let mut registers = [0u8; SIM_REGISTER_COUNT];
        registers[ID_REGISTER] = SIM_DEVICE_ID;
        Self {
            model: RefCell::new(BusModel {
                master_scl: true,
                master_sda: true,
                slave_sda_low: false,
                stretch_remaining: 0,
                stretch_per_edge: 0,
                clock_stuck: false,
                online: true,
                powered: true,
                address,
                command_prefix,
                pointer: 0,
                registers,
                phase: Phase::Idle,
                traffic: BusTraffic::default(),
            }),
        }
    }

    /// Clock line handle for the master.
    #[must_use]
    pub fn scl(&self) -> SimLine<'_> {
        SimLine {
            bus: self,
            clock: true,
        }
    }

    /// Data line handle for the master.
    #[must_use]
    pub fn sda(&self) -> SimLine<'_> {
        SimLine {
            bus: self,
            clock: false,
        }
    }

    /// Makes the device stop acknowledging (as if powered off or unplugged).
    pub fn set_online(&self, online: bool) {
        self.model.borrow_mut().online = online;
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.model.borrow().online
    }

    /// Applies or removes supply power.
    ///
    /// Removing power clears the configuration registers; the identification
    /// and channel data registers keep their values.
    pub fn set_powered(&self, powered: bool) {
        let mut model = self.model.borrow_mut();
        if model.powered && !powered {
            model.registers[..VOLATILE_REGISTERS].fill(0);
            model.slave_sda_low = false;
            model.phase = Phase::Idle;
        }
        model.powered = powered;
    }

    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.model.borrow().powered
    }

    /// Answers when online and powered.
    #[must_use]
    pub fn is_responsive(&self) -> bool {
        let model = self.model.borrow();
        model.online && model.powered
    }

    /// Holds SCL low for `polls` reads after every release by the master.
    pub fn set_clock_stretch(&self, polls: u16) {
        self.model.borrow_mut().stretch_per_edge = polls;
    }

    /// Keeps SCL low forever, as a wedged slave would.
    pub fn set_clock_stuck(&self, stuck: bool) {
        self.model.borrow_mut().clock_stuck = stuck;
    }

    /// Makes the slave hold SDA low, as after a reset in the middle of a read.
    pub fn hold_data_low(&self) {
        let mut model = self.model.borrow_mut();
        model.slave_sda_low = true;
        model.phase = Phase::Transmit { byte: 0, sent: 1 };
    }

    #[must_use]
    pub fn register(&self, register: u8) -> u8 {
        self.model.borrow().registers[usize::from(register) % SIM_REGISTER_COUNT]
    }

    pub fn set_register(&self, register: u8, value: u8) {
        self.model.borrow_mut().registers[usize::from(register) % SIM_REGISTER_COUNT] = value;
    }

    #[must_use]
    pub fn traffic(&self) -> BusTraffic {
        self.model.borrow().traffic
    }

    /// Returns `true` when both lines float high.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let model = self.model.borrow();
        model.scl_line() && model.sda_line()
    }
}

/// Master-side handle to one line of a [`SimBus`].
#[derive(Copy, Clone, Debug)]
pub struct SimLine<'a> {
    bus: &'a SimBus,
    clock: bool,
}

impl ErrorType for SimLine<'_> {
    type Error = Infallible;
}

impl OutputPin for SimLine<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut model = self.bus.model.borrow_mut();
        if self.clock {
            model.set_scl(false);
        } else {
            model.set_sda(false);
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut model = self.bus.model.borrow_mut();
        if self.clock {
            model.set_scl(true);
        } else {
            model.set_sda(true);
        }
        Ok(())
    }
}

impl InputPin for SimLine<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut model = self.bus.model.borrow_mut();
        Ok(if self.clock {
            model.read_scl()
        } else {
            model.sda_line()
        })
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

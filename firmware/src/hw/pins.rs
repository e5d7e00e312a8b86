//! Node GPIO: four push-pull outputs and the sensor's data-ready input.

use embassy_stm32::gpio::{Input, Level, Output};
use embassy_stm32::pac;
use node_core::board::{NodePin, NodePins};

/// EXTI line of the sensor interrupt input (PA10).
pub const SENSOR_EXTI_LINE: usize = 10;

/// Port index of GPIOA in the EXTI port selection.
const PORT_A: u8 = 0;

pub struct FirmwarePins {
    excitation: Output<'static>,
    sensor_power: Output<'static>,
    status: Output<'static>,
    indicator: Output<'static>,
    sensor_interrupt: Input<'static>,
}

impl FirmwarePins {
    pub fn new(
        excitation: Output<'static>,
        sensor_power: Output<'static>,
        status: Output<'static>,
        indicator: Output<'static>,
        sensor_interrupt: Input<'static>,
    ) -> Self {
        pac::EXTI
            .exticr(SENSOR_EXTI_LINE / 4)
            .modify(|w| w.set_exti(SENSOR_EXTI_LINE % 4, PORT_A));
        Self {
            excitation,
            sensor_power,
            status,
            indicator,
            sensor_interrupt,
        }
    }

    fn output(&mut self, pin: NodePin) -> Option<&mut Output<'static>> {
        match pin {
            NodePin::Excitation => Some(&mut self.excitation),
            NodePin::SensorPower => Some(&mut self.sensor_power),
            NodePin::Status => Some(&mut self.status),
            NodePin::Indicator => Some(&mut self.indicator),
            NodePin::SensorInterrupt => None,
        }
    }
}

/// Acknowledges a pending sensor edge. Returns whether one was pending.
pub fn take_sensor_edge() -> bool {
    let exti = pac::EXTI;
    let pending = exti.fpr(0).read().line(SENSOR_EXTI_LINE);
    if pending {
        // Pending bits clear on write-one.
        exti.fpr(0).write(|w| w.set_line(SENSOR_EXTI_LINE, true));
    }
    pending
}

impl NodePins for FirmwarePins {
    fn set_output(&mut self, pin: NodePin, high: bool) {
        if let Some(output) = self.output(pin) {
            output.set_level(Level::from(high));
        }
    }

    fn read_input(&mut self, pin: NodePin) -> bool {
        match self.output(pin) {
            Some(output) => output.is_set_high(),
            None => self.sensor_interrupt.is_high(),
        }
    }

    fn configure_edge_interrupt(&mut self, pin: NodePin, enabled: bool) {
        if pin != NodePin::SensorInterrupt {
            return;
        }
        let exti = pac::EXTI;
        if enabled {
            // The sensor pulls its open-drain interrupt line low.
            exti.rtsr(0).modify(|w| w.set_line(SENSOR_EXTI_LINE, false));
            exti.ftsr(0).modify(|w| w.set_line(SENSOR_EXTI_LINE, true));
            exti.fpr(0).write(|w| w.set_line(SENSOR_EXTI_LINE, true));
            exti.imr(0).modify(|w| w.set_line(SENSOR_EXTI_LINE, true));
        } else {
            exti.imr(0).modify(|w| w.set_line(SENSOR_EXTI_LINE, false));
            exti.ftsr(0).modify(|w| w.set_line(SENSOR_EXTI_LINE, false));
            exti.fpr(0).write(|w| w.set_line(SENSOR_EXTI_LINE, true));
            exti.rpr(0).write(|w| w.set_line(SENSOR_EXTI_LINE, true));
        }
    }
}

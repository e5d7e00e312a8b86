use core::cell::RefCell;

use cortex_m::interrupt as cpu_interrupt;
use cortex_m::register::primask;
use cortex_m_rt::entry;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::dac::DacCh1;
use embassy_stm32::gpio::{Input, Level, Output, OutputOpenDrain, Pull, Speed};
use embassy_stm32::usart::{self, UartTx};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Delay, Instant};
use node_core::bus::RegisterBus;
use node_core::duty::DutyCycle;
use node_core::timing::DutyCycleTiming;

use crate::hw::adc::TemperatureChannel;
use crate::hw::clocks::FirmwareClocks;
use crate::hw::comparator::FirmwareComparator;
use crate::hw::pins::FirmwarePins;
use crate::hw::power::FirmwarePower;
use crate::hw::serial::PayloadTransmitter;
use crate::hw::{self, SERIAL_BAUD, timer};
use crate::status;
use crate::telemetry::{self, TelemetryRecorder};

mod handlers;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cpu_interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cpu_interrupt::enable();
            }
        }
    }
}

/// Bytes of payload storage behind the transmit ring.
const RING_STORAGE: usize = 8;

type FirmwareBus = RegisterBus<OutputOpenDrain<'static>, OutputOpenDrain<'static>, Delay>;

pub(super) type FirmwareNode = DutyCycle<
    FirmwarePins,
    FirmwareComparator,
    TemperatureChannel<'static>,
    PayloadTransmitter,
    FirmwareBus,
    Delay,
    RING_STORAGE,
>;

/// Everything the interrupt handlers share.
pub(super) struct NodeContext {
    pub node: FirmwareNode,
    pub telemetry: TelemetryRecorder,
}

static NODE: Mutex<CriticalSectionRawMutex, RefCell<Option<NodeContext>>> =
    Mutex::new(RefCell::new(None));

/// Runs `f` on the shared context once `main` has installed it.
pub(super) fn with_node(f: impl FnOnce(&mut NodeContext)) {
    NODE.lock(|cell| {
        if let Some(context) = cell.borrow_mut().as_mut() {
            f(context);
        }
    });
}

#[entry]
fn main() -> ! {
    let p = hal::init(hal::Config::default());
    let core = cortex_m::Peripherals::take().expect("core peripherals taken twice");
    let config = hw::node_config();

    let pins = FirmwarePins::new(
        Output::new(p.PA0, Level::Low, Speed::Low),
        Output::new(p.PB5, Level::Low, Speed::Low),
        Output::new(p.PA5, Level::Low, Speed::Low),
        Output::new(p.PA6, Level::Low, Speed::Low),
        Input::new(p.PA10, Pull::Up),
    );

    let mut uart_config = usart::Config::default();
    uart_config.baudrate = SERIAL_BAUD;
    let uart = UartTx::new_blocking(p.LPUART1, p.PA2, uart_config)
        .expect("LPUART1 configuration rejected");

    let bus = RegisterBus::new(
        OutputOpenDrain::new(p.PB8, Level::High, Speed::Low),
        OutputOpenDrain::new(p.PB9, Level::High, Speed::Low),
        Delay,
        config.bus,
    );

    let mut node = DutyCycle::new(
        config,
        pins,
        FirmwareComparator::new(DacCh1::new_blocking(p.DAC1, p.PA4)),
        TemperatureChannel::new(Adc::new(p.ADC1)),
        PayloadTransmitter::new(uart),
        bus,
        Delay,
    );

    let mut telemetry = TelemetryRecorder::new();
    match node.start(&mut FirmwareClocks) {
        Ok(()) => {
            telemetry.record_start(Instant::now());
        }
        Err(fault) => {
            status::record_fault();
            telemetry.record_fault(fault, Instant::now());
        }
    }

    let compare =
        hw::timer_compare(DutyCycleTiming::DEFAULT).expect("duty-cycle timing exceeds LPTIM1");
    NODE.lock(|cell| *cell.borrow_mut() = Some(NodeContext { node, telemetry }));
    timer::start(compare);
    handlers::enable();

    let mut power = FirmwarePower::new(core.SCB);
    let mut logged_period = 0;
    loop {
        // WFI wakes on a pending interrupt even while masked, so the mode is
        // chosen and entered without a handler slipping in between.
        NODE.lock(|cell| {
            if let Some(context) = cell.borrow().as_ref() {
                context.node.enter_sleep(&mut power);
            }
        });

        let pending = NODE.lock(|cell| {
            cell.borrow_mut()
                .as_mut()
                .map(|context| context.telemetry.take_unlogged())
        });
        if let Some(pending) = pending {
            telemetry::log_pending(&pending);
        }

        let periods = status::periods();
        if periods != logged_period {
            logged_period = periods;
            log_status(status::snapshot());
        }
    }
}

fn log_status(snapshot: status::StatusSnapshot) {
    match snapshot.temperature_centi {
        Some(centi) => defmt::info!(
            "status: periods={} temp={}cC led={} thr={} sensor={} faults={} tx={} edges={}",
            snapshot.periods,
            centi,
            snapshot.led_status,
            snapshot.threshold.label(),
            snapshot.sensor_powered,
            snapshot.faults,
            snapshot.bytes_sent,
            snapshot.edges
        ),
        None => defmt::info!(
            "status: periods={} temp=? led={} thr={} sensor={} faults={} tx={} edges={}",
            snapshot.periods,
            snapshot.led_status,
            snapshot.threshold.label(),
            snapshot.sensor_powered,
            snapshot.faults,
            snapshot.bytes_sent,
            snapshot.edges
        ),
    }
}

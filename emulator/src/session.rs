use node_core::board::NodePin;
use node_core::calibration::TemperatureCalibration;
use node_core::duty::{DutyCycle, NodeConfig, NodeFault, PeriodReport, TransmitProgress};
use node_core::payload::{Measurement, PAYLOAD_LEN};
use node_core::sensor::Register;
use node_core::sim::{
    SimAdc, SimBus, SimClocks, SimComparator, SimDelay, SimDutyCycle, SimPins, SimPower,
    SimTransmitter,
};
use node_core::timing::{ClockStrategy, DutyCycleTiming, TimerCompare};

use crate::commands::{Command, HELP_TOPICS, parse_command};

/// Bytes of payload storage behind the simulated transmit ring.
const RING_STORAGE: usize = 8;

/// Nominal clock of the simulated low-power timer.
const TIMER_CLOCK_HZ: u32 = 32_768;

/// Most periods a single `period` command may run.
pub const MAX_PERIOD_BATCH: u32 = 1_000;

/// Raw code the simulated ADC returns until `temp` changes it.
pub const DEFAULT_TEMPERATURE_CODE: u16 = 1_037;

/// Typical G0 sensor line: 30 °C at code 1037, 3.41 codes per degree.
const CALIBRATION: TemperatureCalibration = TemperatureCalibration::new(30.0, 1_037.0, 3.41);

/// Result of handling one console line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Continue(Vec<String>),
    Exit,
}

/// Duty cycle wired to simulated peripherals plus the emulator's own clock.
pub struct Session<'a> {
    node: SimDutyCycle<'a, RING_STORAGE>,
    sensor: &'a SimBus,
    power: SimPower,
    compare: TimerCompare,
    timing: DutyCycleTiming,
    elapsed_us: u64,
}

impl<'a> Session<'a> {
    pub fn new(sensor: &'a SimBus) -> Result<Self, NodeFault> {
        let config = NodeConfig::DEFAULT.with_sample_count(16);
        let mut node = DutyCycle::new(
            config,
            SimPins::with_sensor(sensor),
            SimComparator::new().with_warmup_polls(2),
            SimAdc::new(CALIBRATION, DEFAULT_TEMPERATURE_CODE),
            SimTransmitter::new(),
            sensor.register_bus(config.bus),
            SimDelay::new(),
        );
        node.start(&mut SimClocks::new())?;

        let timing = DutyCycleTiming::DEFAULT;
        // The default timing always fits; fall back to a bare period otherwise.
        let compare = timing
            .compare_values(TIMER_CLOCK_HZ, ClockStrategy::Fixed)
            .unwrap_or(TimerCompare {
                prescaler_shift: 0,
                period_ticks: u16::MAX,
                lead_ticks: 1,
            });

        Ok(Self {
            node,
            sensor,
            power: SimPower::new(),
            compare,
            timing,
            elapsed_us: 0,
        })
    }

    pub fn handle_line(&mut self, line: &str) -> Outcome {
        match parse_command(line) {
            Ok(Command::Exit) => Outcome::Exit,
            Ok(command) => Outcome::Continue(self.handle(command)),
            Err(err) => Outcome::Continue(vec![format!("ERR syntax {err}")]),
        }
    }

    pub fn handle(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::Period { count } if count > MAX_PERIOD_BATCH => {
                vec![format!("ERR period count {count} exceeds {MAX_PERIOD_BATCH}")]
            }
            Command::Period { count } => (0..count).flat_map(|_| self.run_period()).collect(),
            Command::Light { bright } => {
                self.node.comparator_mut().set_level(bright);
                vec![format!("light input {}", if bright { "bright" } else { "dark" })]
            }
            Command::Temp { code } => {
                self.node.adc_mut().set_default_code(code);
                let celsius = self.node.calibration().celsius(u32::from(code));
                vec![format!("temperature code {code} ({celsius:.2} C)")]
            }
            Command::Lux { count } => {
                let [low, high] = count.to_le_bytes();
                self.sensor.set_register(Register::Data0Low.address(), low);
                self.sensor.set_register(Register::Data0High.address(), high);
                vec![format!("channel 0 count {count}")]
            }
            Command::Sensor { online } => {
                self.sensor.set_online(online);
                vec![format!("sensor {}", if online { "online" } else { "offline" })]
            }
            Command::Edge => self.raise_edge(),
            Command::Regs => match self.node.sensor_registers() {
                Ok(dump) => dump
                    .iter()
                    .map(|(register, value)| format!("  {:<24} 0x{value:02x}", register.to_string()))
                    .collect(),
                Err(fault) => vec![format!("ERR {fault}")],
            },
            Command::Status => self.status_lines(),
            Command::Help => {
                let mut lines = vec!["Available commands:".to_string()];
                lines.extend(HELP_TOPICS.iter().map(|(_, detail)| format!("  {detail}")));
                lines
            }
            Command::Exit => Vec::new(),
        }
    }

    fn run_period(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Err(fault) = self.node.on_sub_interval() {
            lines.push(format!("  fault: {fault}"));
        }
        let report = self.node.on_period();
        self.elapsed_us += u64::from(self.timing.period_us);

        while self.node.on_transmit_complete() == TransmitProgress::Sent {}
        let sent = self.node.transmitter_mut().take_sent();
        let mode = self.node.enter_sleep(&mut self.power);

        lines.insert(0, self.describe_period(&report, &sent, mode.label()));
        lines.extend(report.faults.iter().map(|fault| format!("  fault: {fault}")));
        lines
    }

    fn describe_period(&self, report: &PeriodReport, sent: &[u8], sleep: &str) -> String {
        let phase = report.power_phase.map_or("off", |phase| phase.label());
        let temperature = report
            .temperature_celsius
            .map_or_else(|| "?".to_string(), |celsius| format!("{celsius:.2}"));
        let frame = <[u8; PAYLOAD_LEN]>::try_from(sent)
            .ok()
            .and_then(|frame| Measurement::decode(&frame))
            .map_or_else(
                || "none".to_string(),
                |measurement| {
                    format!(
                        "[{}] {:.2}C led={}",
                        hex(sent),
                        measurement.temperature_celsius,
                        on_off(measurement.led_status)
                    )
                },
            );
        format!(
            "period #{} t={:.2}s {phase} temp={temperature}C cmp={} thr={}{} led={} tx={frame} sleep={sleep}",
            report.period,
            self.elapsed_seconds(),
            on_off(report.comparator),
            report.threshold_level.label(),
            if report.threshold_toggled { "*" } else { "" },
            on_off(report.led_status),
        )
    }

    fn raise_edge(&mut self) -> Vec<String> {
        if !self.node.pins().edge_enabled(NodePin::SensorInterrupt) {
            return vec!["edge ignored: sensor interrupt disabled".to_string()];
        }
        match self.node.on_sensor_edge() {
            Ok(sample) => vec![format!(
                "edge ch0={} dark={} indicator={}",
                sample.count(),
                sample.dark,
                on_off(self.node.pins().output(NodePin::Indicator))
            )],
            Err(fault) => vec![format!("ERR {fault}")],
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let state = self.node.state();
        let arbiter = self.node.arbiter();
        vec![
            format!(
                "periods={} t={:.2}s phase={} sensor={}",
                state.periods,
                self.elapsed_seconds(),
                state.power_phase().label(),
                if self.node.sensor_powered() { "powered" } else { "off" }
            ),
            format!(
                "temp={:.2}C led={} thr={} cmp={}",
                state.last_temperature_celsius,
                on_off(state.led_status),
                state.threshold_level.label(),
                on_off(state.last_comparator_reading)
            ),
            format!(
                "holds={} deepest={} hold_errors={}",
                arbiter.total_holds(),
                arbiter.select_deepest_allowed().label(),
                state.hold_errors
            ),
            format!(
                "timer: /{} period={} ticks compare={} ({}us lead)",
                self.compare.divider(),
                self.compare.period_ticks,
                self.compare.compare_match_up_counting(),
                self.timing.excite_lead_us
            ),
            format!(
                "bus: online={} traffic={:?}",
                self.sensor.is_online(),
                self.sensor.traffic()
            ),
        ]
    }

    #[allow(clippy::cast_precision_loss)]
    fn elapsed_seconds(&self) -> f64 {
        self.elapsed_us as f64 / 1_000_000.0
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

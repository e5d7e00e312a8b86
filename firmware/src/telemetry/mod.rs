//! Telemetry ring buffer and logging helpers.
//!
//! Interrupt handlers only append to a fixed-capacity history. The idle loop
//! later takes the records it has not logged yet and mirrors them to defmt on
//! the target or stdout on the host, so no formatting happens while a handler
//! holds the node lock.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use embassy_time::{Duration, Instant};
use heapless::{HistoryBuf as HistoryBuffer, Vec};
use node_core::duty::{LightSample, NodeFault, PeriodReport, PowerPhase, ThresholdLevel};

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

pub type TelemetryRing = HistoryBuffer<TelemetryRecord, TELEMETRY_RING_CAPACITY>;

pub type EventId = u32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TelemetryEvent {
    Started,
    Period {
        period: u32,
        phase: Option<PowerPhase>,
        temperature_celsius: Option<f32>,
        comparator: bool,
        threshold: ThresholdLevel,
        threshold_toggled: bool,
        faults: usize,
    },
    /// The payload burst finished draining.
    BurstDrained,
    SensorEdge(LightSample),
    Fault(NodeFault),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Instant,
    pub event: TelemetryEvent,
    /// Time since the previous period boundary, for period records only.
    pub since_previous_period: Option<Duration>,
}

/// Records handed to the logger by [`TelemetryRecorder::take_unlogged`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingRecords {
    /// Oldest first.
    pub records: Vec<TelemetryRecord, TELEMETRY_RING_CAPACITY>,
    /// Records overwritten before the logger got to them.
    pub overwritten: u32,
}

/// Records handler outcomes into a fixed-size history.
pub struct TelemetryRecorder {
    ring: TelemetryRing,
    last_period_at: Option<Instant>,
    next_event_id: EventId,
    /// First id the logger has not seen.
    next_unlogged: EventId,
}

impl TelemetryRecorder {
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuffer::new(),
            last_period_at: None,
            next_event_id: 0,
            next_unlogged: 0,
        }
    }

    /// Copies out every record added since the previous call.
    ///
    /// Ids are consecutive, so the unlogged records are the newest
    /// `next_event_id - next_unlogged` entries still in the ring.
    pub fn take_unlogged(&mut self) -> PendingRecords {
        let pending = usize::try_from(self.next_event_id.wrapping_sub(self.next_unlogged))
            .unwrap_or(usize::MAX);
        let available = self.ring.len();
        self.next_unlogged = self.next_event_id;

        let mut records = Vec::new();
        for record in self
            .ring
            .oldest_ordered()
            .skip(available.saturating_sub(pending))
        {
            // At most the ring capacity is copied.
            let _ = records.push(*record);
        }
        PendingRecords {
            records,
            overwritten: u32::try_from(pending.saturating_sub(available)).unwrap_or(u32::MAX),
        }
    }

    pub fn record_start(&mut self, timestamp: Instant) -> EventId {
        self.record(TelemetryEvent::Started, timestamp, None)
    }

    /// Records a period boundary along with every fault it reported.
    pub fn record_period(&mut self, report: &PeriodReport, timestamp: Instant) -> EventId {
        let elapsed = self
            .last_period_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_period_at = Some(timestamp);

        for fault in &report.faults {
            self.record_fault(*fault, timestamp);
        }

        self.record(
            TelemetryEvent::Period {
                period: report.period,
                phase: report.power_phase,
                temperature_celsius: report.temperature_celsius,
                comparator: report.comparator,
                threshold: report.threshold_level,
                threshold_toggled: report.threshold_toggled,
                faults: report.faults.len(),
            },
            timestamp,
            elapsed,
        )
    }

    pub fn record_burst_drained(&mut self, timestamp: Instant) -> EventId {
        self.record(TelemetryEvent::BurstDrained, timestamp, None)
    }

    pub fn record_sensor_edge(&mut self, sample: LightSample, timestamp: Instant) -> EventId {
        self.record(TelemetryEvent::SensorEdge(sample), timestamp, None)
    }

    pub fn record_fault(&mut self, fault: NodeFault, timestamp: Instant) -> EventId {
        self.record(TelemetryEvent::Fault(fault), timestamp, None)
    }

    fn record(
        &mut self,
        event: TelemetryEvent,
        timestamp: Instant,
        since_previous_period: Option<Duration>,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            since_previous_period,
        });
        id
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs a batch taken by [`TelemetryRecorder::take_unlogged`].
pub fn log_pending(pending: &PendingRecords) {
    if pending.overwritten > 0 {
        emit_overwritten(pending.overwritten);
    }
    for record in &pending.records {
        log_record(record);
    }
}

fn log_record(record: &TelemetryRecord) {
    let timestamp_us = record.timestamp.as_micros();
    match record.event {
        TelemetryEvent::Started => emit_start(timestamp_us),
        TelemetryEvent::Period {
            period,
            phase,
            temperature_celsius,
            comparator,
            threshold,
            threshold_toggled,
            ..
        } => emit_period(
            period,
            phase_label(phase),
            temperature_celsius,
            comparator,
            threshold_label(threshold, threshold_toggled),
            record.since_previous_period.map(|delta| delta.as_micros()),
        ),
        TelemetryEvent::BurstDrained => emit_burst_drained(timestamp_us),
        TelemetryEvent::SensorEdge(sample) => emit_edge(sample.count(), sample.dark),
        TelemetryEvent::Fault(fault) => emit_fault(fault),
    }
}

const fn phase_label(phase: Option<PowerPhase>) -> &'static str {
    match phase {
        Some(phase) => phase.label(),
        None => "off",
    }
}

const fn threshold_label(level: ThresholdLevel, toggled: bool) -> &'static str {
    match (level, toggled) {
        (ThresholdLevel::Low, false) => "low",
        (ThresholdLevel::Low, true) => "low*",
        (ThresholdLevel::High, false) => "high",
        (ThresholdLevel::High, true) => "high*",
    }
}

#[cfg(target_os = "none")]
fn emit_start(timestamp_us: u64) {
    defmt::info!("telemetry:node started t={}us", timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_start(timestamp_us: u64) {
    println!("telemetry:node started t={timestamp_us}us");
}

#[cfg(target_os = "none")]
fn emit_period(
    period: u32,
    phase: &str,
    temperature_celsius: Option<f32>,
    comparator: bool,
    threshold: &str,
    delta_us: Option<u64>,
) {
    match (temperature_celsius, delta_us) {
        (Some(celsius), Some(delta)) => defmt::info!(
            "telemetry:period #{} {} temp={}C cmp={} thr={} Δ={}us",
            period,
            phase,
            celsius,
            comparator,
            threshold,
            delta
        ),
        (Some(celsius), None) => defmt::info!(
            "telemetry:period #{} {} temp={}C cmp={} thr={}",
            period,
            phase,
            celsius,
            comparator,
            threshold
        ),
        (None, _) => defmt::warn!(
            "telemetry:period #{} {} temp=? cmp={} thr={}",
            period,
            phase,
            comparator,
            threshold
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_period(
    period: u32,
    phase: &str,
    temperature_celsius: Option<f32>,
    comparator: bool,
    threshold: &str,
    delta_us: Option<u64>,
) {
    let temperature =
        temperature_celsius.map_or_else(|| "?".to_owned(), |celsius| format!("{celsius:.2}"));
    match delta_us {
        Some(delta) => println!(
            "telemetry:period #{period} {phase} temp={temperature}C cmp={comparator} thr={threshold} Δ={delta}us"
        ),
        None => println!(
            "telemetry:period #{period} {phase} temp={temperature}C cmp={comparator} thr={threshold}"
        ),
    }
}

#[cfg(target_os = "none")]
fn emit_burst_drained(timestamp_us: u64) {
    defmt::debug!("telemetry:burst drained t={}us", timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_burst_drained(timestamp_us: u64) {
    println!("telemetry:burst drained t={timestamp_us}us");
}

#[cfg(target_os = "none")]
fn emit_edge(count: u16, dark: bool) {
    defmt::info!("telemetry:edge ch0={} dark={}", count, dark);
}

#[cfg(not(target_os = "none"))]
fn emit_edge(count: u16, dark: bool) {
    println!("telemetry:edge ch0={count} dark={dark}");
}

#[cfg(target_os = "none")]
fn emit_fault(fault: NodeFault) {
    defmt::warn!("telemetry:fault {}", defmt::Display2Format(&fault));
}

#[cfg(not(target_os = "none"))]
fn emit_fault(fault: NodeFault) {
    println!("telemetry:fault {fault}");
}

#[cfg(target_os = "none")]
fn emit_overwritten(count: u32) {
    defmt::warn!("telemetry:{} records overwritten before logging", count);
}

#[cfg(not(target_os = "none"))]
fn emit_overwritten(count: u32) {
    println!("telemetry:{count} records overwritten before logging");
}

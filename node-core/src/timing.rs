//! Period and sub-interval compare values for the periodic timer.
//!
//! The timer is a 16-bit up-counter with a power-of-two prescaler. It raises
//! the sub-interval interrupt on the compare match and the period interrupt on
//! auto-reload, so the sub-interval leads the period end by the excitation
//! lead time.

use core::fmt;

/// Largest counter value of the 16-bit timer.
pub const MAX_COUNT: u32 = u16::MAX as u32;

/// Largest supported prescaler, as a power of two (divide by 128).
pub const MAX_PRESCALER_SHIFT: u8 = 7;

/// How the timer clock frequency is interpreted.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClockStrategy {
    /// The nominal clock frequency is trusted as-is.
    Fixed,
    /// The clock runs `ratio` times its nominal rate, as measured against a
    /// reference oscillator.
    Calibrated { ratio: f32 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimingError {
    /// The period does not fit the counter even at the largest prescaler.
    OutOfRange { ticks: u64 },
    /// Period or lead rounds to zero ticks, or the lead is not shorter than
    /// the period.
    InvalidDurations,
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingError::OutOfRange { ticks } => {
                write!(f, "{ticks} ticks exceed the counter at the largest prescaler")
            }
            TimingError::InvalidDurations => f.write_str("invalid period/lead durations"),
        }
    }
}

/// Register values for one timer configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimerCompare {
    /// Prescaler as a power of two.
    pub prescaler_shift: u8,
    /// Ticks per period after prescaling.
    pub period_ticks: u16,
    /// Ticks between the sub-interval boundary and the period boundary.
    pub lead_ticks: u16,
}

impl TimerCompare {
    #[must_use]
    pub const fn divider(&self) -> u32 {
        1 << self.prescaler_shift
    }

    /// Auto-reload value: the counter restarts after `period_ticks` counts.
    #[must_use]
    pub const fn autoreload(&self) -> u16 {
        self.period_ticks - 1
    }

    /// Compare value raising the sub-interval interrupt on an up-counter.
    #[must_use]
    pub const fn compare_match_up_counting(&self) -> u16 {
        self.period_ticks - self.lead_ticks
    }
}

/// Period and excitation lead of the duty cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DutyCycleTiming {
    pub period_us: u32,
    pub excite_lead_us: u32,
}

impl DutyCycleTiming {
    /// 4.25 s period with a 4 ms excitation lead.
    pub const DEFAULT: DutyCycleTiming = DutyCycleTiming {
        period_us: 4_250_000,
        excite_lead_us: 4_000,
    };

    #[must_use]
    pub const fn new(period_us: u32, excite_lead_us: u32) -> Self {
        Self {
            period_us,
            excite_lead_us,
        }
    }

    /// Computes compare values for a timer clocked at `clock_hz`.
    ///
    /// The prescaler doubles until the period fits the 16-bit counter; the
    /// lead is scaled along with it and never drops below one tick.
    ///
    /// # Errors
    ///
    /// [`TimingError::InvalidDurations`] when either duration rounds to zero
    /// ticks or the lead is not shorter than the period, and
    /// [`TimingError::OutOfRange`] when the period exceeds the largest
    /// prescaler.
    pub fn compare_values(
        &self,
        clock_hz: u32,
        strategy: ClockStrategy,
    ) -> Result<TimerCompare, TimingError> {
        let mut period = scale(ticks(self.period_us, clock_hz), strategy);
        let mut lead = scale(ticks(self.excite_lead_us, clock_hz), strategy);
        if period == 0 || lead == 0 || lead >= period {
            return Err(TimingError::InvalidDurations);
        }

        let mut shift = 0u8;
        while period > u64::from(MAX_COUNT) {
            if shift == MAX_PRESCALER_SHIFT {
                return Err(TimingError::OutOfRange { ticks: period });
            }
            shift += 1;
            period >>= 1;
            lead = (lead >> 1).max(1);
        }

        Ok(TimerCompare {
            prescaler_shift: shift,
            period_ticks: u16::try_from(period).map_err(|_| TimingError::OutOfRange { ticks: period })?,
            lead_ticks: u16::try_from(lead).map_err(|_| TimingError::OutOfRange { ticks: lead })?,
        })
    }
}

impl Default for DutyCycleTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn ticks(duration_us: u32, clock_hz: u32) -> u64 {
    u64::from(duration_us) * u64::from(clock_hz) / 1_000_000
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(ticks: u64, strategy: ClockStrategy) -> u64 {
    match strategy {
        ClockStrategy::Fixed => ticks,
        ClockStrategy::Calibrated { ratio } if ratio > 0.0 => (ticks as f32 * ratio + 0.5) as u64,
        ClockStrategy::Calibrated { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_on_low_speed_clock_needs_prescaling() {
        // 32768 Hz * 4.25 s = 139264 ticks, so divide by 4.
        let compare = DutyCycleTiming::DEFAULT
            .compare_values(32_768, ClockStrategy::Fixed)
            .unwrap();
        assert_eq!(compare.prescaler_shift, 2);
        assert_eq!(compare.divider(), 4);
        assert_eq!(compare.period_ticks, 34_816);
        assert_eq!(compare.lead_ticks, 32);
        assert_eq!(compare.autoreload(), 34_815);
        assert_eq!(compare.compare_match_up_counting(), 34_784);
    }

    #[test]
    fn calibrated_ratio_scales_ticks() {
        let timing = DutyCycleTiming::new(1_000_000, 10_000);
        let compare = timing
            .compare_values(1_000, ClockStrategy::Calibrated { ratio: 2.0 })
            .unwrap();
        assert_eq!(compare.prescaler_shift, 0);
        assert_eq!(compare.period_ticks, 2_000);
        assert_eq!(compare.lead_ticks, 20);
    }

    #[test]
    fn rejects_periods_beyond_largest_prescaler() {
        let timing = DutyCycleTiming::new(4_000_000, 1_000);
        assert!(matches!(
            timing.compare_values(16_000_000, ClockStrategy::Fixed),
            Err(TimingError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_lead_not_shorter_than_period() {
        let timing = DutyCycleTiming::new(1_000, 1_000);
        assert_eq!(
            timing.compare_values(32_768, ClockStrategy::Fixed),
            Err(TimingError::InvalidDurations)
        );
        assert_eq!(
            DutyCycleTiming::DEFAULT.compare_values(32_768, ClockStrategy::Calibrated { ratio: 0.0 }),
            Err(TimingError::InvalidDurations)
        );
    }
}

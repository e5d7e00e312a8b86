//! Reference-counted sleep-depth arbitration.
//!
//! Every subsystem that needs a peripheral clock places a hold on the deepest
//! sleep mode in which that peripheral still runs. The arbiter keeps one
//! counter per mode and picks the deepest mode that satisfies every hold.
//! Counting (rather than a flag per mode) lets independent phases claim the
//! same mode at once without the first release undoing the second claim.

use core::fmt;

/// Processor power states ordered from shallowest to deepest.
///
/// The ordering mirrors the EM0..EM3 energy-mode numbering: a higher index
/// draws less current and wakes more slowly.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SleepMode {
    /// EM0: the core keeps executing; no suspension at all.
    Run,
    /// EM1: core clock gated, high-frequency peripherals keep running.
    Sleep,
    /// EM2: high-frequency clocks stopped, low-energy peripherals active.
    DeepSleep,
    /// EM3: only asynchronous and ultra-low-frequency logic stays alive.
    Stop,
}

impl SleepMode {
    /// Number of modes tracked by the arbiter.
    pub const COUNT: usize = 4;

    /// Every mode, shallowest first.
    pub const ALL: [SleepMode; Self::COUNT] = [
        SleepMode::Run,
        SleepMode::Sleep,
        SleepMode::DeepSleep,
        SleepMode::Stop,
    ];

    /// Deepest mode the node will ever select.
    pub const DEEPEST: SleepMode = SleepMode::Stop;

    /// Depth index used for lookups into the hold table.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            SleepMode::Run => 0,
            SleepMode::Sleep => 1,
            SleepMode::DeepSleep => 2,
            SleepMode::Stop => 3,
        }
    }

    /// Attempts to construct a [`SleepMode`] from a depth index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(SleepMode::Run),
            1 => Some(SleepMode::Sleep),
            2 => Some(SleepMode::DeepSleep),
            3 => Some(SleepMode::Stop),
            _ => None,
        }
    }

    /// Short energy-mode label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SleepMode::Run => "EM0",
            SleepMode::Sleep => "EM1",
            SleepMode::DeepSleep => "EM2",
            SleepMode::Stop => "EM3",
        }
    }

    /// Returns `true` when `self` is strictly deeper than `other`.
    #[must_use]
    pub const fn is_deeper_than(self, other: SleepMode) -> bool {
        self.as_index() > other.as_index()
    }
}

impl fmt::Display for SleepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure reported by [`SleepArbiter::release`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SleepHoldError {
    /// A release arrived for a mode that has no outstanding hold.
    Mismatched(SleepMode),
}

impl fmt::Display for SleepHoldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepHoldError::Mismatched(mode) => {
                write!(f, "release of {mode} without a matching hold")
            }
        }
    }
}

/// Parks the processor in a given power state until the next interrupt.
pub trait PowerControl {
    /// Suspends execution in `mode`. [`SleepMode::Run`] must return immediately.
    fn enter(&mut self, mode: SleepMode);
}

/// Hold table deciding how deep the idle loop may sleep.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SleepArbiter {
    holds: [u16; SleepMode::COUNT],
}

impl SleepArbiter {
    /// Creates an arbiter with no outstanding holds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            holds: [0; SleepMode::COUNT],
        }
    }

    /// Forbids sleeping deeper than `mode` until the matching [`release`](Self::release).
    pub fn acquire(&mut self, mode: SleepMode) {
        let slot = &mut self.holds[mode.as_index()];
        *slot = slot.saturating_add(1);
    }

    /// Drops one hold on `mode`.
    ///
    /// # Errors
    ///
    /// [`SleepHoldError::Mismatched`] when `mode` has no outstanding hold; the
    /// table is left untouched.
    pub fn release(&mut self, mode: SleepMode) -> Result<(), SleepHoldError> {
        let slot = &mut self.holds[mode.as_index()];
        if *slot == 0 {
            return Err(SleepHoldError::Mismatched(mode));
        }
        *slot -= 1;
        Ok(())
    }

    /// Outstanding holds on `mode`.
    #[must_use]
    pub fn hold_count(&self, mode: SleepMode) -> u16 {
        self.holds[mode.as_index()]
    }

    /// Returns `true` when at least one hold is placed on `mode`.
    #[must_use]
    pub fn is_held(&self, mode: SleepMode) -> bool {
        self.hold_count(mode) > 0
    }

    /// Sum of every outstanding hold.
    #[must_use]
    pub fn total_holds(&self) -> u32 {
        self.holds.iter().map(|count| u32::from(*count)).sum()
    }

    /// Deepest mode permitted by the current holds.
    ///
    /// The shallowest held mode wins; without any hold the node may drop to
    /// [`SleepMode::DEEPEST`].
    #[must_use]
    pub fn select_deepest_allowed(&self) -> SleepMode {
        SleepMode::ALL
            .into_iter()
            .find(|mode| self.is_held(*mode))
            .unwrap_or(SleepMode::DEEPEST)
    }

    /// Enters the selected mode through `power` and reports which one it was.
    ///
    /// Returns once any enabled interrupt wakes the core; the caller loops
    /// back and selects again.
    pub fn enter_selected<P>(&self, power: &mut P) -> SleepMode
    where
        P: PowerControl + ?Sized,
    {
        let mode = self.select_deepest_allowed();
        power.enter(mode);
        mode
    }
}

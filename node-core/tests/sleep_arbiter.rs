use node_core::sleep::{PowerControl, SleepArbiter, SleepHoldError, SleepMode};

/// Small deterministic generator so sequences are reproducible.
struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn mode(&mut self) -> SleepMode {
        SleepMode::from_index(self.next() as usize % SleepMode::COUNT).expect("index in range")
    }
}

#[derive(Default)]
struct RecordingPower {
    entered: Vec<SleepMode>,
}

impl PowerControl for RecordingPower {
    fn enter(&mut self, mode: SleepMode) {
        self.entered.push(mode);
    }
}

#[test]
fn selection_never_deeper_than_any_held_mode() {
    for seed in 1..=64u32 {
        let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9));
        let mut arbiter = SleepArbiter::new();
        let mut model = [0u16; SleepMode::COUNT];

        for _ in 0..256 {
            let mode = rng.mode();
            if rng.next() % 2 == 0 || model[mode.as_index()] == 0 {
                arbiter.acquire(mode);
                model[mode.as_index()] += 1;
            } else {
                arbiter
                    .release(mode)
                    .expect("release of a held mode must succeed");
                model[mode.as_index()] -= 1;
            }

            let selected = arbiter.select_deepest_allowed();
            for held in SleepMode::ALL {
                assert_eq!(arbiter.hold_count(held), model[held.as_index()]);
                if model[held.as_index()] > 0 {
                    assert!(
                        !selected.is_deeper_than(held),
                        "seed {seed}: selected {selected} while {held} is held"
                    );
                }
            }
            if model.iter().all(|count| *count == 0) {
                assert_eq!(selected, SleepMode::DEEPEST);
            }
        }
    }
}

#[test]
fn acquire_then_release_is_neutral() {
    let mut rng = XorShift(0xC0FF_EE11);
    let mut arbiter = SleepArbiter::new();
    for _ in 0..32 {
        arbiter.acquire(rng.mode());
    }

    for mode in SleepMode::ALL {
        let before = arbiter.clone();
        let selected = arbiter.select_deepest_allowed();
        arbiter.acquire(mode);
        arbiter.release(mode).expect("matching release");
        assert_eq!(arbiter, before);
        assert_eq!(arbiter.select_deepest_allowed(), selected);
    }
}

#[test]
fn double_release_is_rejected_without_underflow() {
    let mut arbiter = SleepArbiter::new();
    arbiter.acquire(SleepMode::Sleep);
    arbiter.release(SleepMode::Sleep).expect("first release");
    assert_eq!(
        arbiter.release(SleepMode::Sleep),
        Err(SleepHoldError::Mismatched(SleepMode::Sleep))
    );
    assert_eq!(arbiter.total_holds(), 0);
}

#[test]
fn idle_loop_follows_nested_holds() {
    let mut arbiter = SleepArbiter::new();
    let mut power = RecordingPower::default();

    arbiter.acquire(SleepMode::Stop);
    arbiter.enter_selected(&mut power);

    // Bus window, then ADC sampling nested inside it.
    arbiter.acquire(SleepMode::Sleep);
    arbiter.acquire(SleepMode::Sleep);
    arbiter.enter_selected(&mut power);
    arbiter.release(SleepMode::Sleep).expect("adc release");
    arbiter.enter_selected(&mut power);
    arbiter.release(SleepMode::Sleep).expect("bus release");

    arbiter.acquire(SleepMode::DeepSleep);
    arbiter.enter_selected(&mut power);
    arbiter.release(SleepMode::DeepSleep).expect("transmit release");
    arbiter.enter_selected(&mut power);

    assert_eq!(
        power.entered,
        [
            SleepMode::Stop,
            SleepMode::Sleep,
            SleepMode::Sleep,
            SleepMode::DeepSleep,
            SleepMode::Stop,
        ]
    );
}

//! Parameter smoother: turns a `(current, target)` gain pair into a
//! `(current, target, step, counter)` trajectory over a fixed stepping
//! horizon, avoiding zipper noise on gain changes (spec.md §4.4).

use crate::tunables::GAIN_SILENCE_THRESHOLD;

/// One steppable gain value.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GainStep {
    pub current: f32,
    pub target: f32,
    pub step: f32,
    /// Remaining samples before `current` reaches `target`.
    pub counter: u32,
}

impl GainStep {
    pub fn at(value: f32) -> Self {
        Self { current: value, target: value, step: 0.0, counter: 0 }
    }

    /// Advances `current` by `step`, decrementing `counter`. Once `counter`
    /// hits zero, snaps `current` to `target` to eliminate residual drift.
    #[inline]
    pub fn advance(&mut self) {
        if self.counter > 0 {
            self.current += self.step;
            self.counter -= 1;
            if self.counter == 0 {
                self.current = self.target;
            }
        }
    }
}

/// Computes the `(step, counter)` pair for one gain slot given a stepping
/// `horizon`. `horizon < 2` means snap immediately (first update for a
/// voice); this is how voices avoid an audible ramp-up from silence on
/// first play (spec.md §4.4).
#[inline]
fn step_for(current: f32, target: f32, horizon: usize) -> (f32, u32) {
    if horizon < 2 {
        return (0.0, 0);
    }
    if (target - current).abs() >= GAIN_SILENCE_THRESHOLD {
        let delta = 1.0 / horizon as f32;
        ((target - current) * delta, horizon as u32)
    } else {
        (0.0, 0)
    }
}

/// Updates one gain slot's target and re-derives its stepping trajectory. If
/// `horizon < 2`, `current` snaps to `target` immediately and `step`/
/// `counter` are cleared.
pub fn update_stepping(gain: &mut GainStep, target: f32, horizon: usize) {
    gain.target = target;
    if horizon < 2 {
        gain.current = target;
        gain.step = 0.0;
        gain.counter = 0;
        return;
    }
    let (step, counter) = step_for(gain.current, gain.target, horizon);
    gain.step = step;
    gain.counter = counter;
}

/// `UpdateDryStepping`: updates every input/output gain slot of a voice's
/// direct path. `targets[in][out]` carries the new target for each slot;
/// `gains` is mutated in place.
pub fn update_dry_stepping<const IN: usize, const OUT: usize>(
    gains: &mut [[GainStep; OUT]; IN],
    targets: &[[f32; OUT]; IN],
    num_in_chans: usize,
    horizon: usize,
) {
    for c in 0..num_in_chans {
        for o in 0..OUT {
            update_stepping(&mut gains[c][o], targets[c][o], horizon);
        }
    }
}

/// `UpdateWetStepping`: same contract as `update_dry_stepping` but for the
/// single scalar send gain.
pub fn update_wet_stepping(gain: &mut GainStep, target: f32, horizon: usize) {
    update_stepping(gain, target, horizon);
}

#[cfg(test)]
mod tests {
    use super::*;

    // P1 — gain smoothing conservation.
    #[test]
    fn stepping_reaches_target_within_horizon() {
        let mut g = GainStep::at(0.0);
        update_stepping(&mut g, 1.0, 64);
        assert!(g.counter > 0);
        let mut projected = g.current;
        for _ in 0..g.counter {
            projected += g.step;
        }
        assert!((g.target - projected).abs() < GAIN_SILENCE_THRESHOLD * 2.0);
    }

    #[test]
    fn stepping_below_threshold_has_zero_step() {
        let mut g = GainStep::at(0.5);
        update_stepping(&mut g, 0.5 + GAIN_SILENCE_THRESHOLD * 0.5, 64);
        assert_eq!(g.step, 0.0);
        assert_eq!(g.counter, 0);
    }

    // P2 — first-update snap.
    #[test]
    fn horizon_below_two_snaps_immediately() {
        let mut g = GainStep::at(0.0);
        update_stepping(&mut g, 1.0, 0);
        assert_eq!(g.current, 1.0);
        assert_eq!(g.step, 0.0);
        assert_eq!(g.counter, 0);
    }

    #[test]
    fn advance_converges_to_target_after_counter_elapses() {
        let mut g = GainStep::at(0.0);
        update_stepping(&mut g, 1.0, 64);
        for _ in 0..64 {
            g.advance();
        }
        assert_eq!(g.current, 1.0);
        assert_eq!(g.counter, 0);
    }
}

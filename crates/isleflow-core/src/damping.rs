//! Damping filter for self-referential byproduct production.
//!
//! A factory whose extra output feeds back into its own supply chain
//! recomputes its byproduct rate from a throughput that depends on that
//! rate. The filter keeps the last two accepted rates with timestamps and
//! collapses both no-op updates and two-step ping-pong into a stable value.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use tracing::trace;

use crate::fixed::{Fixed64, Millis, within};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic millisecond clock used to tell automatic re-triggers from
/// deliberate user edits.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: Millis) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// A rate accepted at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub rate: Fixed64,
    pub at: Millis,
}

/// What the filter did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DampingOutcome {
    /// Within accuracy of the newest sample; the stored rate is kept.
    Unchanged(Fixed64),
    /// Two-step ping-pong detected; the average is returned.
    Averaged(Fixed64),
    /// The candidate was accepted and recorded.
    Accepted(Fixed64),
}

impl DampingOutcome {
    pub fn rate(self) -> Fixed64 {
        match self {
            DampingOutcome::Unchanged(r) | DampingOutcome::Averaged(r) | DampingOutcome::Accepted(r) => r,
        }
    }
}

/// Holds at most two samples, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DampingFilter {
    history: VecDeque<Sample>,
    /// Last averaged rate handed out, while it is still the published one.
    averaged: Option<Fixed64>,
}

impl DampingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter()
    }

    pub fn newest(&self) -> Option<Fixed64> {
        self.history.front().map(|s| s.rate)
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.averaged = None;
    }

    /// Filter a candidate rate computed at `now`. The returned rate is the
    /// one to publish, whatever the outcome.
    pub fn apply(
        &mut self,
        candidate: Fixed64,
        now: Millis,
        accuracy: Fixed64,
        window: Millis,
    ) -> DampingOutcome {
        if let Some(newest) = self.history.front()
            && within(candidate, newest.rate, accuracy)
        {
            // A candidate that also agrees with a published average keeps it;
            // otherwise the stored sample is republished.
            if let Some(averaged) = self.averaged
                && within(candidate, averaged, accuracy)
            {
                trace!(candidate = %candidate, stored = %averaged, "damping: no-op on average");
                return DampingOutcome::Unchanged(averaged);
            }
            self.averaged = None;
            trace!(candidate = %candidate, stored = %newest.rate, "damping: no-op");
            return DampingOutcome::Unchanged(newest.rate);
        }

        if self.history.len() == 2 {
            let newest = self.history[0];
            let second = self.history[1];
            if newest.rate != Fixed64::ZERO
                && within(candidate, second.rate, accuracy)
                && now.saturating_sub(second.at) < window
            {
                let averaged = (candidate + newest.rate) / Fixed64::from_num(2);
                trace!(candidate = %candidate, averaged = %averaged, "damping: ping-pong");
                self.averaged = Some(averaged);
                return DampingOutcome::Averaged(averaged);
            }
        }

        self.history.push_front(Sample {
            rate: candidate,
            at: now,
        });
        self.history.truncate(2);
        self.averaged = None;
        DampingOutcome::Accepted(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    const ACC: f64 = 0.01;

    fn apply(filter: &mut DampingFilter, v: f64, now: Millis) -> DampingOutcome {
        filter.apply(fx(v), now, fx(ACC), 200)
    }

    #[test]
    fn first_sample_is_accepted() {
        let mut f = DampingFilter::new();
        assert_eq!(apply(&mut f, 5.0, 0), DampingOutcome::Accepted(fx(5.0)));
        assert_eq!(f.newest(), Some(fx(5.0)));
    }

    #[test]
    fn tiny_change_is_noop() {
        let mut f = DampingFilter::new();
        apply(&mut f, 5.0, 0);
        assert_eq!(apply(&mut f, 5.005, 10), DampingOutcome::Unchanged(fx(5.0)));
        assert_eq!(f.history().count(), 1);
    }

    #[test]
    fn ping_pong_is_averaged() {
        let mut f = DampingFilter::new();
        apply(&mut f, 10.0, 0);
        apply(&mut f, 12.0, 20);
        assert_eq!(apply(&mut f, 10.0, 40), DampingOutcome::Averaged(fx(11.0)));
        // History untouched by the averaged result.
        let rates: Vec<Fixed64> = f.history().map(|s| s.rate).collect();
        assert_eq!(rates, vec![fx(12.0), fx(10.0)]);
    }

    #[test]
    fn noop_after_average_returns_stored_sample() {
        let mut f = DampingFilter::new();
        apply(&mut f, 1.02, 0);
        apply(&mut f, 1.0, 20);
        let averaged = apply(&mut f, 1.021, 40).rate();
        assert!(within(averaged, fx(1.0105), fx(1e-6)));

        // Close to both the newest sample and the average: the average stays.
        assert_eq!(apply(&mut f, 1.005, 60), DampingOutcome::Unchanged(averaged));
        // Close to the newest sample only: the stored sample comes back.
        assert_eq!(apply(&mut f, 0.995, 80), DampingOutcome::Unchanged(fx(1.0)));
        assert_eq!(apply(&mut f, 1.005, 100), DampingOutcome::Unchanged(fx(1.0)));
    }

    #[test]
    fn slow_ping_pong_is_a_user_edit() {
        let mut f = DampingFilter::new();
        apply(&mut f, 10.0, 0);
        apply(&mut f, 12.0, 100);
        assert_eq!(apply(&mut f, 10.0, 250), DampingOutcome::Accepted(fx(10.0)));
    }

    #[test]
    fn zero_newest_sample_disables_averaging() {
        let mut f = DampingFilter::new();
        apply(&mut f, 3.0, 0);
        apply(&mut f, 0.0, 10);
        assert_eq!(apply(&mut f, 3.0, 20), DampingOutcome::Accepted(fx(3.0)));
    }

    #[test]
    fn history_holds_two_samples() {
        let mut f = DampingFilter::new();
        apply(&mut f, 1.0, 0);
        apply(&mut f, 2.0, 1000);
        apply(&mut f, 3.0, 2000);
        let rates: Vec<Fixed64> = f.history().map(|s| s.rate).collect();
        assert_eq!(rates, vec![fx(3.0), fx(2.0)]);
    }

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(150);
        assert_eq!(view.now_ms(), 150);
        view.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}

//! Delay timers
//!
//! A delayed thread sleeps until a target simulated time. Timers are only
//! tested at the start of a scheduling pass, against the time the solver
//! reports for that pass.

/// Per-thread delay timer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DelayTimer {
    active: bool,
    target: f64,
}

impl DelayTimer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Simulated time the timer fires at
    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Arm the timer; returns the target time
    pub fn start(
        &mut self,
        now: f64,
        duration: f64,
    ) -> f64 {
        self.active = true;
        self.target = now + duration;
        self.target
    }

    /// Fire the timer if `now` has reached the target.
    ///
    /// `epsilon` is relative to the magnitude of the target, so accumulated
    /// step rounding (`0.1 + 0.2`) does not cost a whole extra frame.
    pub fn test_expired(
        &mut self,
        now: f64,
        epsilon: f64,
    ) -> bool {
        if !self.active {
            return false;
        }
        let slack = epsilon * self.target.abs().max(1.0);
        if now + slack >= self.target {
            self.active = false;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }
}

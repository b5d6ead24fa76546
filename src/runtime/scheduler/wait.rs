//! Wait-condition dependency tracking
//!
//! While a thread evaluates a wait condition for the first time, every value
//! the condition reads is recorded as a dependency. Once the condition
//! turns out false the thread parks, and any later change to a dependency
//! marks the tracker dirty so the scheduler re-evaluates the condition.
//!
//! ```text
//!  Idle ──begin──▶ RegisteringDependencies ──complete──▶ PendingStart ──park──▶ Waiting
//!                     │        ▲                              │                    │
//!                  detach   reattach                          └──── release ◀──────┘
//!                     ▼        │                                     (back to Idle)
//!                  TemporarilyDetached
//! ```

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use smallvec::SmallVec;

/// Dependency names of one tracker
pub type Dependencies = SmallVec<[Arc<str>; 4]>;

/// When a waiting thread's condition is re-evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    /// On every change notification, as soon as it is delivered
    #[default]
    Eager,
    /// Once per scheduling pass, if anything changed since the last check.
    ///
    /// The count is the script's requested interval; only its presence is
    /// honoured.
    Batched(NonZeroU32),
}

impl PollPolicy {
    /// Interpret a script-level poll value: 0 is eager, any other value
    /// batched
    pub fn from_raw(raw: i64) -> Self {
        let interval = u32::try_from(raw.unsigned_abs()).unwrap_or(u32::MAX);
        match NonZeroU32::new(interval) {
            Some(interval) => PollPolicy::Batched(interval),
            None => PollPolicy::Eager,
        }
    }

    #[inline]
    pub fn is_eager(&self) -> bool {
        matches!(self, PollPolicy::Eager)
    }
}

/// Tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    /// No wait in progress
    #[default]
    Idle,
    /// First evaluation of the condition; reads become dependencies
    RegisteringDependencies,
    /// Registration paused while the condition itself suspended
    TemporarilyDetached,
    /// Condition was false; the thread is about to park
    PendingStart,
    /// Thread parked on the condition
    Waiting,
}

impl fmt::Display for TrackerState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            TrackerState::Idle => "idle",
            TrackerState::RegisteringDependencies => "registering",
            TrackerState::TemporarilyDetached => "detached",
            TrackerState::PendingStart => "pending",
            TrackerState::Waiting => "waiting",
        };
        f.write_str(name)
    }
}

/// Per-thread wait tracker
#[derive(Debug, Clone, Default)]
pub struct WaitTracker {
    state: TrackerState,
    poll: PollPolicy,
    /// Change notifications received since the last re-check
    dirty: u32,
    deps: Dependencies,
}

impl WaitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    #[inline]
    pub fn poll(&self) -> PollPolicy {
        self.poll
    }

    #[inline]
    pub fn dirty(&self) -> u32 {
        self.dirty
    }

    #[inline]
    pub fn dependencies(&self) -> &[Arc<str>] {
        &self.deps
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == TrackerState::Idle
    }

    #[inline]
    pub fn is_registering(&self) -> bool {
        self.state == TrackerState::RegisteringDependencies
    }

    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.state == TrackerState::Waiting
    }

    /// Start registering a new wait. Fails with the current state if a wait
    /// is already in progress.
    pub fn begin(
        &mut self,
        poll: PollPolicy,
    ) -> Result<(), TrackerState> {
        if self.state != TrackerState::Idle {
            return Err(self.state);
        }
        self.state = TrackerState::RegisteringDependencies;
        self.poll = poll;
        self.dirty = 0;
        self.deps.clear();
        Ok(())
    }

    /// Record a dependency. Returns true if it is new.
    ///
    /// Only a registering or waiting tracker accepts dependencies.
    pub fn install(
        &mut self,
        name: &str,
    ) -> bool {
        if !matches!(
            self.state,
            TrackerState::RegisteringDependencies | TrackerState::Waiting
        ) {
            return false;
        }
        if self.deps.iter().any(|d| &**d == name) {
            return false;
        }
        self.deps.push(Arc::from(name));
        true
    }

    /// Forget a dependency. Returns true if it was present.
    pub fn remove(
        &mut self,
        name: &str,
    ) -> bool {
        let before = self.deps.len();
        self.deps.retain(|d| &**d != name);
        self.deps.len() != before
    }

    /// Pause registration while the condition suspends
    pub fn detach(&mut self) -> bool {
        if self.state == TrackerState::RegisteringDependencies {
            self.state = TrackerState::TemporarilyDetached;
            true
        } else {
            false
        }
    }

    /// Resume a paused registration
    pub fn reattach(&mut self) -> bool {
        if self.state == TrackerState::TemporarilyDetached {
            self.state = TrackerState::RegisteringDependencies;
            true
        } else {
            false
        }
    }

    /// Finish the first evaluation of the condition
    pub fn complete(&mut self) -> Result<(), TrackerState> {
        if self.state != TrackerState::RegisteringDependencies {
            return Err(self.state);
        }
        self.state = TrackerState::PendingStart;
        Ok(())
    }

    /// Park on the condition
    pub fn park(&mut self) -> Result<(), TrackerState> {
        if self.state != TrackerState::PendingStart {
            return Err(self.state);
        }
        self.state = TrackerState::Waiting;
        Ok(())
    }

    /// End the wait, returning the dependencies to unsubscribe
    pub fn release(&mut self) -> Dependencies {
        self.state = TrackerState::Idle;
        self.poll = PollPolicy::Eager;
        self.dirty = 0;
        std::mem::take(&mut self.deps)
    }

    /// Count one change notification
    pub fn mark_dirty(&mut self) {
        self.dirty = self.dirty.saturating_add(1);
    }

    /// Reset the dirty counter, returning its value
    pub fn take_dirty(&mut self) -> u32 {
        std::mem::take(&mut self.dirty)
    }

    /// Tracker for the child of a clone taken during registration. The
    /// child re-attaches when it first runs.
    pub fn fork(&self) -> Self {
        let mut child = self.clone();
        if child.state == TrackerState::RegisteringDependencies {
            child.state = TrackerState::TemporarilyDetached;
        }
        child.dirty = 0;
        child
    }
}

//! Script threads
//!
//! A script thread is one strand of a script's execution inside an animation
//! context. Its life is described by two orthogonal fields: the
//! [`ThreadState`] (what the thread is doing now) and the
//! [`ScheduleRequest`] (what the thread most recently asked the scheduler
//! for). The scheduler reads the pair to decide what to do next.

use std::fmt;

use crate::runtime::errors::RuntimeError;
use crate::runtime::eval::Continuation;

use super::delay::DelayTimer;
use super::wait::WaitTracker;

/// Unique thread identifier within one animation context.
///
/// `0` is reserved for the context's evaluation thread, the main thread is
/// always `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// The evaluation thread every context owns
    pub const EVAL: ThreadId = ThreadId(0);

    /// The first thread created when a context starts
    pub const MAIN: ThreadId = ThreadId(1);

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ThreadId {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl From<ThreadId> for u32 {
    fn from(val: ThreadId) -> Self {
        val.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// What a thread is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Not executing; may be runnable depending on its request
    #[default]
    Inactive,
    /// Currently executing. At most one per context.
    Running,
    /// Suspended in a wait condition
    Waiting,
    /// Suspended until a simulated time
    Delayed,
}

impl fmt::Display for ThreadState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ThreadState::Inactive => "inactive",
            ThreadState::Running => "running",
            ThreadState::Waiting => "waiting",
            ThreadState::Delayed => "delayed",
        };
        f.write_str(name)
    }
}

/// What a thread asked the scheduler for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleRequest {
    /// Never scheduled; suspending primitives are ignored with a warning
    Disabled,
    /// Ready to run
    #[default]
    Ready,
    /// Asked to be cloned
    CloneRequest,
    /// Freshly cloned child, runnable from the next pass on
    CloneDone,
    /// Gave up the processor until the next pass
    Yield,
    /// Entered a wait
    EnterWait,
    /// Entered a delay
    EnterDelay,
    /// Asked to be terminated
    Kill,
    /// Transient parent marker while a clone is being created
    Spawned(ThreadId),
}

impl ScheduleRequest {
    /// Requests that become `Ready` at the start of the next pass
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, ScheduleRequest::Yield | ScheduleRequest::CloneDone)
    }
}

impl fmt::Display for ScheduleRequest {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ScheduleRequest::Disabled => f.write_str("disabled"),
            ScheduleRequest::Ready => f.write_str("ready"),
            ScheduleRequest::CloneRequest => f.write_str("clone-request"),
            ScheduleRequest::CloneDone => f.write_str("clone-done"),
            ScheduleRequest::Yield => f.write_str("yield"),
            ScheduleRequest::EnterWait => f.write_str("enter-wait"),
            ScheduleRequest::EnterDelay => f.write_str("enter-delay"),
            ScheduleRequest::Kill => f.write_str("kill"),
            ScheduleRequest::Spawned(child) => write!(f, "spawned({})", child.0),
        }
    }
}

/// What the scheduler does with a thread whose continuation just suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Fork the continuation, then keep running the parent
    Fork,
    /// Resume the continuation right away
    Continue,
    /// The thread gave up the processor; pick another one
    Parked,
    /// Remove the thread
    Exit,
}

/// One thread of an animation context
pub struct ScriptThread {
    pub(crate) id: ThreadId,
    pub(crate) state: ThreadState,
    pub(crate) request: ScheduleRequest,
    /// Saved continuation. Taken out while the thread runs.
    pub(crate) continuation: Option<Box<dyn Continuation>>,
    pub(crate) tracker: WaitTracker,
    pub(crate) timer: DelayTimer,
}

impl fmt::Debug for ScriptThread {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ScriptThread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("request", &self.request)
            .field("tracker", &self.tracker)
            .field("timer", &self.timer)
            .field("suspended", &self.continuation.is_some())
            .finish()
    }
}

impl ScriptThread {
    /// Create a runnable thread
    pub(crate) fn new(
        id: ThreadId,
        continuation: Box<dyn Continuation>,
    ) -> Self {
        Self {
            id,
            state: ThreadState::Inactive,
            request: ScheduleRequest::Ready,
            continuation: Some(continuation),
            tracker: WaitTracker::new(),
            timer: DelayTimer::new(),
        }
    }

    /// Create a thread that is never scheduled
    pub(crate) fn disabled(id: ThreadId) -> Self {
        Self {
            id,
            state: ThreadState::Inactive,
            request: ScheduleRequest::Disabled,
            continuation: None,
            tracker: WaitTracker::new(),
            timer: DelayTimer::new(),
        }
    }

    /// Create the child of a clone
    pub(crate) fn forked(
        id: ThreadId,
        continuation: Box<dyn Continuation>,
        tracker: WaitTracker,
    ) -> Self {
        Self {
            id,
            state: ThreadState::Inactive,
            request: ScheduleRequest::CloneDone,
            continuation: Some(continuation),
            tracker,
            timer: DelayTimer::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    #[inline]
    pub fn request(&self) -> ScheduleRequest {
        self.request
    }

    #[inline]
    pub fn tracker(&self) -> &WaitTracker {
        &self.tracker
    }

    #[inline]
    pub fn timer(&self) -> &DelayTimer {
        &self.timer
    }

    /// Inactive and ready
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state == ThreadState::Inactive && self.request == ScheduleRequest::Ready
    }

    /// Inactive with a request that becomes ready next pass
    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.state == ThreadState::Inactive && self.request.is_deferred()
    }

    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.request == ScheduleRequest::Disabled
    }

    /// Turn a deferred thread into a runnable one
    pub(crate) fn promote(&mut self) -> bool {
        if self.is_deferred() {
            self.request = ScheduleRequest::Ready;
            true
        } else {
            false
        }
    }

    /// Make a waiting or delayed thread runnable again
    pub(crate) fn wake(&mut self) {
        self.state = ThreadState::Inactive;
        self.request = ScheduleRequest::Ready;
    }

    pub(crate) fn take_continuation(&mut self) -> Result<Box<dyn Continuation>, RuntimeError> {
        self.continuation
            .take()
            .ok_or(RuntimeError::MissingContinuation(self.id))
    }

    pub(crate) fn restore(
        &mut self,
        continuation: Box<dyn Continuation>,
    ) {
        self.continuation = Some(continuation);
    }

    /// Apply the thread's request after its continuation suspended.
    ///
    /// Parking transitions update the state; requests that cannot follow a
    /// suspension are fatal.
    pub(crate) fn settle(&mut self) -> Result<Transition, RuntimeError> {
        match self.request {
            ScheduleRequest::CloneRequest => Ok(Transition::Fork),
            ScheduleRequest::Ready => Ok(Transition::Continue),
            ScheduleRequest::Yield => {
                self.state = ThreadState::Inactive;
                Ok(Transition::Parked)
            }
            ScheduleRequest::EnterWait if self.tracker.is_waiting() => {
                self.state = ThreadState::Waiting;
                Ok(Transition::Parked)
            }
            ScheduleRequest::EnterDelay if self.timer.is_active() => {
                self.state = ThreadState::Delayed;
                Ok(Transition::Parked)
            }
            ScheduleRequest::Kill => Ok(Transition::Exit),
            request => Err(RuntimeError::UnexpectedRequest {
                thread: self.id,
                request,
            }),
        }
    }
}

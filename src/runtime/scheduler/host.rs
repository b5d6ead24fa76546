//! The scheduler side of a running thread
//!
//! A continuation never touches the context directly. Everything it does
//! (reading and writing variables, asking to yield, delay, clone or wait)
//! goes through a [`ThreadApi`], which the scheduler implements with a
//! [`ThreadHost`] borrowing the context's pieces for the duration of one
//! resume or re-check.

use tracing::trace;

use crate::runtime::errors::RuntimeError;
use crate::runtime::scope::Scope;
use crate::runtime::value::Value;
use crate::util::diagnostic::Diagnostic;
use crate::util::span::Span;

use super::thread::{ScheduleRequest, ScriptThread, ThreadId};
use super::wait::{PollPolicy, TrackerState};

/// Answer to a suspending primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Go on without suspending
    Continue,
    /// Suspend now and hand control back to the scheduler
    Suspend,
    /// The primitive was ignored (with a warning); go on
    Degraded,
}

/// Operations a running continuation may perform on its thread
pub trait ThreadApi {
    fn thread_id(&self) -> ThreadId;

    /// Current simulated time
    fn now(&self) -> f64;

    /// Read a variable; `Void` if undefined
    fn read(
        &mut self,
        name: &str,
        at: Span,
    ) -> Value;

    fn write(
        &mut self,
        name: &str,
        value: Value,
        at: Span,
    );

    /// Delete a variable, returning its last value
    fn remove(
        &mut self,
        name: &str,
        at: Span,
    ) -> Value;

    /// Add a wait dependency explicitly
    fn install_dependency(
        &mut self,
        name: &str,
    ) -> bool;

    fn remove_dependency(
        &mut self,
        name: &str,
    ) -> bool;

    fn request_clone(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError>;

    fn request_yield(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError>;

    fn request_delay(
        &mut self,
        duration: f64,
        at: Span,
    ) -> Result<Admission, RuntimeError>;

    fn request_kill(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError>;

    /// Start registering a wait condition
    fn request_wait(
        &mut self,
        poll: PollPolicy,
        at: Span,
    ) -> Result<Admission, RuntimeError>;

    /// Report the first evaluation of the wait condition
    fn wait_verdict(
        &mut self,
        holds: bool,
        at: Span,
    ) -> Result<Admission, RuntimeError>;
}

/// Why the host was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostMode {
    /// Resuming the continuation
    Step,
    /// Re-evaluating a parked wait condition; nothing may suspend
    Recheck,
}

/// [`ThreadApi`] over one thread of an animation context
pub(crate) struct ThreadHost<'a> {
    context: &'a str,
    thread: &'a mut ScriptThread,
    scope: &'a mut Scope,
    notifications: &'a mut Vec<ThreadId>,
    diagnostics: &'a mut Vec<Diagnostic>,
    now: f64,
    mode: HostMode,
}

impl<'a> ThreadHost<'a> {
    pub(crate) fn new(
        context: &'a str,
        thread: &'a mut ScriptThread,
        scope: &'a mut Scope,
        notifications: &'a mut Vec<ThreadId>,
        diagnostics: &'a mut Vec<Diagnostic>,
        now: f64,
        mode: HostMode,
    ) -> Self {
        Self {
            context,
            thread,
            scope,
            notifications,
            diagnostics,
            now,
            mode,
        }
    }

    fn warn(
        &mut self,
        message: String,
        at: Span,
    ) {
        let diagnostic = Diagnostic::warning(message, at)
            .with_origin(format!("{}#{}", self.context, self.thread.id.inner()));
        diagnostic.emit();
        self.diagnostics.push(diagnostic);
    }

    fn notify(
        &mut self,
        watchers: impl IntoIterator<Item = ThreadId>,
    ) {
        let me = self.thread.id;
        self.notifications
            .extend(watchers.into_iter().filter(|w| *w != me));
    }

    /// Reads subscribe while a condition is registered or re-checked
    fn tracks_reads(&self) -> bool {
        match self.mode {
            HostMode::Recheck => self.thread.tracker.is_waiting(),
            HostMode::Step => self.thread.tracker.is_registering(),
        }
    }

    /// Gate shared by every suspending primitive. `Ok(false)` means the
    /// primitive degrades to a no-op.
    fn admit(
        &mut self,
        primitive: &'static str,
        at: Span,
    ) -> Result<bool, RuntimeError> {
        if self.mode == HostMode::Recheck {
            return Err(RuntimeError::NestedSuspension {
                thread: self.thread.id,
                request: self.thread.request,
                primitive,
                span: at,
            });
        }
        if self.thread.is_disabled() {
            self.warn(
                format!("{}() outside an animation thread has no effect", primitive),
                at,
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Pause dependency registration if a condition suspends
    fn detach_condition(&mut self) {
        if self.thread.tracker.detach() {
            trace!("{}: wait registration detached", self.thread.id);
        }
    }
}

impl ThreadApi for ThreadHost<'_> {
    fn thread_id(&self) -> ThreadId {
        self.thread.id
    }

    fn now(&self) -> f64 {
        self.now
    }

    fn read(
        &mut self,
        name: &str,
        at: Span,
    ) -> Value {
        let tracked = self.tracks_reads();
        if tracked {
            self.install_dependency(name);
        }
        match self.scope.get(name) {
            Some(value) => value.clone(),
            None => {
                if !tracked {
                    self.warn(format!("`{}` is undefined", name), at);
                }
                Value::Void
            }
        }
    }

    fn write(
        &mut self,
        name: &str,
        value: Value,
        _at: Span,
    ) {
        let watchers = self.scope.set(name, value);
        self.notify(watchers);
    }

    fn remove(
        &mut self,
        name: &str,
        at: Span,
    ) -> Value {
        let (old, watchers) = self.scope.remove(name);
        self.notify(watchers);
        match old {
            Some(value) => value,
            None => {
                self.warn(format!("cannot delete undefined `{}`", name), at);
                Value::Void
            }
        }
    }

    fn install_dependency(
        &mut self,
        name: &str,
    ) -> bool {
        if self.thread.tracker.install(name) {
            self.scope.subscribe(name, self.thread.id);
            true
        } else {
            false
        }
    }

    fn remove_dependency(
        &mut self,
        name: &str,
    ) -> bool {
        if self.thread.tracker.remove(name) {
            self.scope.unsubscribe(name, self.thread.id);
            true
        } else {
            false
        }
    }

    fn request_clone(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if !self.admit("clone", at)? {
            return Ok(Admission::Degraded);
        }
        self.detach_condition();
        self.thread.request = ScheduleRequest::CloneRequest;
        Ok(Admission::Suspend)
    }

    fn request_yield(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if !self.admit("yield", at)? {
            return Ok(Admission::Degraded);
        }
        self.detach_condition();
        self.thread.request = ScheduleRequest::Yield;
        Ok(Admission::Suspend)
    }

    fn request_delay(
        &mut self,
        duration: f64,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if !self.admit("delay", at)? {
            return Ok(Admission::Degraded);
        }
        let duration = if duration.is_nan() || duration < 0.0 {
            self.warn(format!("delay({}) is not a valid duration, using 0", duration), at);
            0.0
        } else {
            duration
        };
        let target = self.thread.timer.start(self.now, duration);
        trace!("{}: delayed until t={}", self.thread.id, target);
        self.detach_condition();
        self.thread.request = ScheduleRequest::EnterDelay;
        Ok(Admission::Suspend)
    }

    fn request_kill(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if !self.admit("kill", at)? {
            return Ok(Admission::Degraded);
        }
        self.thread.request = ScheduleRequest::Kill;
        Ok(Admission::Suspend)
    }

    fn request_wait(
        &mut self,
        poll: PollPolicy,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if !self.admit("wait", at)? {
            return Ok(Admission::Degraded);
        }
        self.thread
            .tracker
            .begin(poll)
            .map_err(|_| RuntimeError::NestedWait {
                thread: self.thread.id,
                span: at,
            })?;
        Ok(Admission::Continue)
    }

    fn wait_verdict(
        &mut self,
        holds: bool,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if !self.admit("wait", at)? {
            return Ok(Admission::Degraded);
        }
        let id = self.thread.id;
        self.thread.tracker.complete().map_err(|state| {
            RuntimeError::protocol(id, format!("wait verdict with tracker {}", state))
        })?;
        if holds {
            let deps = self.thread.tracker.release();
            self.scope.unsubscribe_all(id, &deps);
            return Ok(Admission::Continue);
        }
        self.thread.tracker.park().map_err(|state: TrackerState| {
            RuntimeError::protocol(id, format!("cannot park with tracker {}", state))
        })?;
        trace!(
            "{}: waiting on {:?}",
            id,
            self.thread.tracker.dependencies()
        );
        self.thread.request = ScheduleRequest::EnterWait;
        Ok(Admission::Suspend)
    }
}

//! Script evaluation
//!
//! The scheduler does not know how scripts execute. It holds one
//! [`Continuation`] per thread and drives it through the [`ThreadApi`];
//! an [`Evaluator`] creates continuations from [`Script`]s.
//!
//! Scripts are Rust closures over a [`ScriptCx`], the handle through which a
//! body reads and writes its scope and calls the scheduling primitives.
//! Every primitive returns a [`ScriptResult`], so bodies propagate a
//! teardown with `?`:
//!
//! ```rust
//! use animscript::runtime::eval::Script;
//! use animscript::runtime::value::Value;
//!
//! let bounce = Script::new("bounce", |cx| {
//!     cx.set("y", 10.0)?;
//!     while cx.get("y")?.as_f64() > 0.0 {
//!         let y = cx.get("y")?.as_f64();
//!         cx.set("y", y - 2.5)?;
//!         cx.yield_now()?;
//!     }
//!     Ok(Value::Void)
//! });
//! assert_eq!(bounce.name(), "bounce");
//! ```

pub mod coroutine;
pub(crate) mod protocol;

use std::fmt;
use std::sync::Arc;

use crate::runtime::errors::{Halt, RuntimeError, ScriptResult};
use crate::runtime::scheduler::{PollPolicy, ThreadApi, ThreadId};
use crate::runtime::value::Value;
use crate::util::span::Span;

pub use coroutine::{Coroutine, CoroutineEvaluator};

use coroutine::ChannelLink;
use protocol::{serve_call, Call, Fork, Reply, Served};

/// Result of resuming a continuation
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The script body returned
    Done(Value),
    /// The body suspended; the thread's schedule request says why
    Suspended,
}

/// A suspended computation the scheduler can resume
pub trait Continuation: Send {
    /// Run until the body suspends or finishes
    fn resume(
        &mut self,
        api: &mut dyn ThreadApi,
    ) -> Result<Step, RuntimeError>;

    /// Re-evaluate the condition of a parked wait. `true` means the wait is
    /// over and the next resume continues after it.
    fn recheck(
        &mut self,
        api: &mut dyn ThreadApi,
    ) -> Result<bool, RuntimeError>;

    /// Duplicate the computation at its current suspension point. The
    /// copy observes the clone as `Cloned::Child`, the original as
    /// `Cloned::Parent(child)`.
    fn fork(
        &mut self,
        child: ThreadId,
    ) -> Result<Box<dyn Continuation>, RuntimeError>;
}

/// Turns scripts into continuations
pub trait Evaluator: Send + Sync {
    fn spawn(
        &self,
        script: &Script,
        thread: ThreadId,
    ) -> Result<Box<dyn Continuation>, RuntimeError>;

    /// Run a script to completion on the caller's stack
    fn evaluate(
        &self,
        script: &Script,
        api: &mut dyn ThreadApi,
    ) -> Result<Value, RuntimeError> {
        evaluate_inline(script, api)
    }
}

/// Body of a script
pub type ScriptFn = dyn Fn(&mut ScriptCx<'_>) -> ScriptResult<Value> + Send + Sync;

/// A named script body
#[derive(Clone)]
pub struct Script {
    name: Arc<str>,
    body: Arc<ScriptFn>,
    clones: bool,
}

impl fmt::Debug for Script {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("clones", &self.clones)
            .finish()
    }
}

impl Script {
    pub fn new<F>(
        name: impl Into<Arc<str>>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut ScriptCx<'_>) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
            clones: true,
        }
    }

    /// Declare that the body never calls `clone_thread`. Its threads keep
    /// no replay journal, so long-running loops use constant memory; a
    /// `clone_thread` call becomes a fatal error.
    pub fn without_clones(mut self) -> Self {
        self.clones = false;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether threads running this script may be cloned
    #[inline]
    pub fn can_clone(&self) -> bool {
        self.clones
    }

    /// Execute the body
    pub fn run(
        &self,
        cx: &mut ScriptCx<'_>,
    ) -> ScriptResult<Value> {
        (self.body)(cx)
    }
}

/// Outcome of `clone_thread`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cloned {
    /// This is the original; the copy runs as the given thread
    Parent(ThreadId),
    /// This is the copy
    Child,
    /// Cloning is not possible here (evaluation thread)
    Refused,
}

/// Run a script to completion without a coroutine. Suspending primitives
/// must degrade; a suspension is a protocol violation.
pub fn evaluate_inline(
    script: &Script,
    api: &mut dyn ThreadApi,
) -> Result<Value, RuntimeError> {
    let thread = api.thread_id();
    let mut cx = ScriptCx::inline(api);
    let result = script.run(&mut cx);
    if let Some(fault) = cx.take_fault() {
        return Err(fault);
    }
    result.map_err(|halt| RuntimeError::protocol(thread, format!("inline evaluation: {}", halt)))
}

enum Link<'h> {
    Inline {
        api: &'h mut dyn ThreadApi,
        fault: Option<RuntimeError>,
    },
    Channel(ChannelLink),
}

/// A script body's handle on its thread
///
/// Every call returns `Err(Halt)` once the thread is torn down, and the body
/// is expected to return it with `?`. On a coroutine, a body that discards
/// the halt and calls again is unwound by force. A body that loops without
/// calling into its `ScriptCx` at all cannot be torn down and blocks the
/// drop of its thread.
pub struct ScriptCx<'h> {
    link: Link<'h>,
}

impl<'h> ScriptCx<'h> {
    pub(crate) fn inline(api: &'h mut dyn ThreadApi) -> Self {
        Self {
            link: Link::Inline { api, fault: None },
        }
    }

    pub(crate) fn channel(link: ChannelLink) -> Self {
        Self {
            link: Link::Channel(link),
        }
    }

    /// Halt handed to a coroutine body, if any
    pub(crate) fn halted(&self) -> Option<Halt> {
        match &self.link {
            Link::Channel(link) => link.halted(),
            Link::Inline { .. } => None,
        }
    }

    fn take_fault(&mut self) -> Option<RuntimeError> {
        match &mut self.link {
            Link::Inline { fault, .. } => fault.take(),
            Link::Channel(_) => None,
        }
    }

    fn call(
        &mut self,
        call: Call,
        at: Span,
    ) -> ScriptResult<Reply> {
        match &mut self.link {
            Link::Channel(link) => link.call(call, at),
            Link::Inline { api, fault } => {
                if fault.is_some() {
                    return Err(Halt::Unwound);
                }
                let primitive = call.primitive();
                match serve_call(&mut **api, call, at) {
                    Ok(Served::Reply(reply)) => Ok(reply),
                    Ok(Served::Suspend(_)) => {
                        *fault = Some(RuntimeError::protocol(
                            api.thread_id(),
                            format!("{}() suspended an inline evaluation", primitive),
                        ));
                        Err(Halt::Unwound)
                    }
                    Err(err) => {
                        *fault = Some(err);
                        Err(Halt::Unwound)
                    }
                }
            }
        }
    }

    /// Read a variable; `Void` if undefined
    #[track_caller]
    pub fn get(
        &mut self,
        name: &str,
    ) -> ScriptResult<Value> {
        match self.call(Call::Read(Arc::from(name)), Span::caller())? {
            Reply::Value(value) => Ok(value),
            _ => Err(Halt::Diverged),
        }
    }

    /// Assign a variable, notifying the threads that wait on it
    #[track_caller]
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> ScriptResult<()> {
        self.call(Call::Write(Arc::from(name), value.into()), Span::caller())
            .map(|_| ())
    }

    /// Delete a variable, returning its last value
    #[track_caller]
    pub fn unset(
        &mut self,
        name: &str,
    ) -> ScriptResult<Value> {
        match self.call(Call::Remove(Arc::from(name)), Span::caller())? {
            Reply::Value(value) => Ok(value),
            _ => Err(Halt::Diverged),
        }
    }

    /// Current simulated time
    #[track_caller]
    pub fn now(&mut self) -> ScriptResult<f64> {
        match self.call(Call::Now, Span::caller())? {
            Reply::Time(t) => Ok(t),
            _ => Err(Halt::Diverged),
        }
    }

    #[track_caller]
    pub fn thread_id(&mut self) -> ScriptResult<ThreadId> {
        match self.call(Call::Whoami, Span::caller())? {
            Reply::Thread(id) => Ok(id),
            _ => Err(Halt::Diverged),
        }
    }

    /// Make the current wait condition also depend on `name`
    #[track_caller]
    pub fn depend_on(
        &mut self,
        name: &str,
    ) -> ScriptResult<()> {
        self.call(Call::Depend(Arc::from(name), true), Span::caller())
            .map(|_| ())
    }

    #[track_caller]
    pub fn drop_dependency(
        &mut self,
        name: &str,
    ) -> ScriptResult<()> {
        self.call(Call::Depend(Arc::from(name), false), Span::caller())
            .map(|_| ())
    }

    /// Give up the processor until the next pass. Returns false if the
    /// thread may not suspend.
    #[track_caller]
    pub fn yield_now(&mut self) -> ScriptResult<bool> {
        let reply = self.call(Call::Yield, Span::caller())?;
        Ok(reply != Reply::Degraded)
    }

    /// Sleep for `duration` units of simulated time
    #[track_caller]
    pub fn delay(
        &mut self,
        duration: f64,
    ) -> ScriptResult<bool> {
        let reply = self.call(Call::Delay(duration), Span::caller())?;
        Ok(reply != Reply::Degraded)
    }

    /// Duplicate the thread. Both copies continue from here; the copy
    /// starts running on the next pass.
    #[track_caller]
    pub fn clone_thread(&mut self) -> ScriptResult<Cloned> {
        match self.call(Call::Clone, Span::caller())? {
            Reply::Forked(Fork::Parent(child)) => Ok(Cloned::Parent(child)),
            Reply::Forked(Fork::Child) => Ok(Cloned::Child),
            Reply::Degraded => Ok(Cloned::Refused),
            _ => Err(Halt::Diverged),
        }
    }

    /// Terminate the thread. Only returns on a thread that cannot be
    /// killed.
    #[track_caller]
    pub fn kill(&mut self) -> ScriptResult<()> {
        self.call(Call::Kill, Span::caller())?;
        Ok(())
    }

    /// Suspend until `until` holds.
    ///
    /// The condition is evaluated right away; every variable it reads
    /// becomes a dependency. While it is false the thread parks and the
    /// condition is re-evaluated when a dependency changes: immediately
    /// for [`PollPolicy::Eager`], once per pass for `Batched`. Re-checks
    /// must not suspend.
    #[track_caller]
    pub fn wait<F>(
        &mut self,
        poll: PollPolicy,
        mut until: F,
    ) -> ScriptResult<()>
    where
        F: FnMut(&mut ScriptCx<'h>) -> ScriptResult<bool>,
    {
        let at = Span::caller();
        if self.call(Call::WaitBegin(poll), at)? == Reply::Degraded {
            return Ok(());
        }
        loop {
            let holds = until(self)?;
            match self.call(Call::Verdict(holds), at)? {
                Reply::Recheck => continue,
                _ => return Ok(()),
            }
        }
    }

    /// Poll `until` once per pass, yielding in between
    #[track_caller]
    pub fn pwait<F>(
        &mut self,
        mut until: F,
    ) -> ScriptResult<()>
    where
        F: FnMut(&mut ScriptCx<'h>) -> ScriptResult<bool>,
    {
        let at = Span::caller();
        loop {
            if until(self)? {
                return Ok(());
            }
            if self.call(Call::Yield, at)? == Reply::Degraded {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests;

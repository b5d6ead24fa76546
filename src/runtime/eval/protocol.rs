//! Messages between a script body and the scheduler
//!
//! A body issues [`Call`]s; the scheduler answers each with a [`Reply`].
//! The same vocabulary is used whether the body runs inline on the caller's
//! stack or inside a coroutine.

use std::sync::Arc;

use crate::runtime::errors::{RuntimeError, ScriptResult};
use crate::runtime::scheduler::{Admission, PollPolicy, ThreadApi, ThreadId};
use crate::runtime::value::Value;
use crate::util::span::Span;

/// A primitive invoked by a script body
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Read(Arc<str>),
    Write(Arc<str>, Value),
    Remove(Arc<str>),
    /// Install (`true`) or drop a wait dependency
    Depend(Arc<str>, bool),
    Now,
    Whoami,
    Clone,
    Yield,
    Delay(f64),
    Kill,
    WaitBegin(PollPolicy),
    Verdict(bool),
}

impl Call {
    /// Name of the primitive, for diagnostics
    pub(crate) fn primitive(&self) -> &'static str {
        match self {
            Call::Read(_) => "get",
            Call::Write(..) => "set",
            Call::Remove(_) => "unset",
            Call::Depend(..) => "depend",
            Call::Now => "now",
            Call::Whoami => "thread_id",
            Call::Clone => "clone",
            Call::Yield => "yield",
            Call::Delay(_) => "delay",
            Call::Kill => "kill",
            Call::WaitBegin(_) | Call::Verdict(_) => "wait",
        }
    }
}

/// Which side of a clone a continuation is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fork {
    Parent(ThreadId),
    Child,
}

/// The scheduler's answer to a [`Call`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    /// First resume of a fresh coroutine
    Start,
    Value(Value),
    Time(f64),
    Thread(ThreadId),
    Ack,
    /// The primitive was ignored
    Degraded,
    Forked(Fork),
    /// Evaluate the wait condition again
    Recheck,
    /// The thread is being torn down
    Halt,
}

impl Reply {
    /// Whether the reply is part of the history a clone replays
    #[inline]
    pub(crate) fn is_journaled(&self) -> bool {
        !matches!(self, Reply::Start | Reply::Halt)
    }

    /// Whether the reply is a possible answer to `call`
    pub(crate) fn answers(
        &self,
        call: &Call,
    ) -> bool {
        match (call, self) {
            (Call::Whoami, Reply::Thread(_))
            | (Call::Now, Reply::Time(_))
            | (Call::Read(_) | Call::Remove(_), Reply::Value(_))
            | (Call::Write(..) | Call::Depend(..), Reply::Ack)
            | (Call::Clone, Reply::Forked(_) | Reply::Degraded)
            | (Call::Verdict(_), Reply::Ack | Reply::Recheck | Reply::Degraded) => true,
            (
                Call::Yield | Call::Delay(_) | Call::Kill | Call::WaitBegin(_),
                Reply::Ack | Reply::Degraded,
            ) => true,
            _ => false,
        }
    }
}

/// A coroutine's message to the scheduler
#[derive(Debug)]
pub(crate) enum Request {
    Call(Call, Span),
    /// A replaying clone reached the fork point
    Parked,
    Finished(ScriptResult<Value>),
}

/// Outcome of serving one call
#[derive(Debug)]
pub(crate) enum Served {
    /// Answer immediately
    Reply(Reply),
    /// Suspend; the reply (if already known) is sent on the next resume
    Suspend(Option<Reply>),
}

fn admitted(
    admission: Admission,
    on_suspend: Option<Reply>,
) -> Served {
    match admission {
        Admission::Continue => Served::Reply(Reply::Ack),
        Admission::Degraded => Served::Reply(Reply::Degraded),
        Admission::Suspend => Served::Suspend(on_suspend),
    }
}

/// Perform `call` against the thread's api
pub(crate) fn serve_call(
    api: &mut dyn ThreadApi,
    call: Call,
    at: Span,
) -> Result<Served, RuntimeError> {
    let served = match call {
        Call::Read(name) => Served::Reply(Reply::Value(api.read(&name, at))),
        Call::Write(name, value) => {
            api.write(&name, value, at);
            Served::Reply(Reply::Ack)
        }
        Call::Remove(name) => Served::Reply(Reply::Value(api.remove(&name, at))),
        Call::Depend(name, install) => {
            if install {
                api.install_dependency(&name);
            } else {
                api.remove_dependency(&name);
            }
            Served::Reply(Reply::Ack)
        }
        Call::Now => Served::Reply(Reply::Time(api.now())),
        Call::Whoami => Served::Reply(Reply::Thread(api.thread_id())),
        // the fork supplies the reply
        Call::Clone => admitted(api.request_clone(at)?, None),
        Call::Yield => admitted(api.request_yield(at)?, Some(Reply::Ack)),
        Call::Delay(duration) => admitted(api.request_delay(duration, at)?, Some(Reply::Ack)),
        Call::Kill => admitted(api.request_kill(at)?, None),
        Call::WaitBegin(poll) => admitted(api.request_wait(poll, at)?, Some(Reply::Ack)),
        // a parked condition is answered by the first successful re-check
        Call::Verdict(holds) => admitted(api.wait_verdict(holds, at)?, None),
    };
    Ok(served)
}

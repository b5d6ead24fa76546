//! Coroutine-backed continuations
//!
//! Each script thread's body runs on a dedicated OS thread that is only
//! ever active while the scheduler waits for it. The two sides talk over a
//! pair of channels and strictly alternate: the body sends a [`Request`]
//! and blocks for the [`Reply`]; the scheduler serves calls until the body
//! suspends or finishes, then stops listening until the next resume.
//!
//! # Cloning
//!
//! A stack cannot be copied, so a clone is rebuilt by replay. The
//! scheduler journals every reply it sends. The child coroutine runs the
//! same body from the start, answering each call from the parent's journal
//! without contacting anyone, until it reaches the `clone_thread` call the
//! parent is suspended in. There it parks and the scheduler owns a second,
//! independent continuation at the same point. Bodies must therefore be
//! deterministic with respect to everything outside `ScriptCx`.
//!
//! The journal is capped by [`SchedulerConfig::max_journal_len`]. Scripts
//! declared [`Script::without_clones`] keep none.
//!
//! # Teardown
//!
//! Dropping a coroutine answers its pending call with a halt. A body that
//! swallows the halt and calls into `ScriptCx` again is unwound by force.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::trace;

use crate::runtime::errors::{Halt, RuntimeError, ScriptResult};
use crate::runtime::scheduler::{SchedulerConfig, ThreadApi, ThreadId};
use crate::runtime::value::Value;
use crate::util::span::Span;

use super::protocol::{serve_call, Call, Fork, Reply, Request, Served};
use super::{Continuation, Evaluator, Script, ScriptCx, Step};

/// Default stack size of a coroutine
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Default cap on the replies journaled per coroutine
pub const DEFAULT_JOURNAL_LIMIT: usize = 1 << 20;

/// Evaluator running every thread as a [`Coroutine`]
#[derive(Debug, Clone)]
pub struct CoroutineEvaluator {
    stack_size: usize,
    journal_limit: usize,
}

impl Default for CoroutineEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SIZE)
    }
}

impl CoroutineEvaluator {
    pub fn new(stack_size: usize) -> Self {
        Self {
            stack_size,
            journal_limit: DEFAULT_JOURNAL_LIMIT,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.stack_size).with_journal_limit(config.max_journal_len)
    }

    pub fn with_journal_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.journal_limit = limit;
        self
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    #[inline]
    pub fn journal_limit(&self) -> usize {
        self.journal_limit
    }
}

impl Evaluator for CoroutineEvaluator {
    fn spawn(
        &self,
        script: &Script,
        thread: ThreadId,
    ) -> Result<Box<dyn Continuation>, RuntimeError> {
        let coroutine =
            Coroutine::launch(script, thread, self.stack_size, self.journal_limit, None)?;
        Ok(Box::new(coroutine))
    }
}

/// Panic payload unwinding a body that ignored its halt
struct ForcedUnwind;

/// Body side of the channel pair
pub(crate) struct ChannelLink {
    requests: Sender<Request>,
    replies: Receiver<Reply>,
    /// Parent history still to replay
    replay: VecDeque<Reply>,
    /// Replaying clone that has not reached its fork point yet
    forking: bool,
    /// Halt already handed to the body
    halted: Option<Halt>,
}

impl ChannelLink {
    pub(crate) fn call(
        &mut self,
        call: Call,
        at: Span,
    ) -> ScriptResult<Reply> {
        if self.halted.is_some() {
            // the body swallowed its halt
            panic::resume_unwind(Box::new(ForcedUnwind));
        }
        if let Some(reply) = self.replay.pop_front() {
            if reply.answers(&call) {
                return Ok(reply);
            }
            return self.diverge();
        }
        if self.forking {
            self.forking = false;
            if call != Call::Clone {
                return self.diverge();
            }
            self.send(Request::Parked)?;
            return self.receive();
        }
        self.send(Request::Call(call, at))?;
        self.receive()
    }

    #[inline]
    pub(crate) fn halted(&self) -> Option<Halt> {
        self.halted
    }

    fn halt(
        &mut self,
        halt: Halt,
    ) -> Halt {
        self.halted = Some(halt);
        halt
    }

    fn diverge(&mut self) -> ScriptResult<Reply> {
        Err(self.halt(Halt::Diverged))
    }

    fn send(
        &mut self,
        request: Request,
    ) -> ScriptResult<()> {
        self.requests
            .send(request)
            .map_err(|_| self.halt(Halt::Unwound))
    }

    fn receive(&mut self) -> ScriptResult<Reply> {
        match self.replies.recv() {
            Ok(Reply::Halt) | Err(_) => Err(self.halt(Halt::Unwound)),
            Ok(reply) => Ok(reply),
        }
    }

    /// Block until the first resume. False if torn down before starting.
    fn await_start(&mut self) -> bool {
        matches!(self.replies.recv(), Ok(Reply::Start))
    }
}

fn run_body(
    script: Script,
    mut link: ChannelLink,
) {
    if !link.forking && !link.await_start() {
        return;
    }
    let requests = link.requests.clone();
    let mut cx = ScriptCx::channel(link);
    let result = match panic::catch_unwind(AssertUnwindSafe(|| script.run(&mut cx))) {
        Ok(result) => result,
        Err(payload) if payload.is::<ForcedUnwind>() => Err(cx.halted().unwrap_or(Halt::Unwound)),
        Err(payload) => panic::resume_unwind(payload),
    };
    let _ = requests.send(Request::Finished(result));
}

/// What a round of serving ended with
enum Outcome {
    Done(Value),
    Suspended,
    Verdict(bool),
}

/// A script body running on its own stack
pub struct Coroutine {
    thread: ThreadId,
    script: Script,
    stack_size: usize,
    requests: Receiver<Request>,
    replies: Sender<Reply>,
    /// Every journaled reply sent so far
    journal: Vec<Reply>,
    /// False for scripts declared without clones
    journaling: bool,
    journal_limit: usize,
    /// Reply owed on the next resume
    pending: Option<Reply>,
    handle: Option<JoinHandle<()>>,
}

impl Coroutine {
    fn launch(
        script: &Script,
        id: ThreadId,
        stack_size: usize,
        journal_limit: usize,
        replay: Option<Vec<Reply>>,
    ) -> Result<Self, RuntimeError> {
        let (request_tx, request_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        let forking = replay.is_some();
        let link = ChannelLink {
            requests: request_tx,
            replies: reply_rx,
            replay: replay.unwrap_or_default().into(),
            forking,
            halted: None,
        };
        let body = script.clone();
        let handle = thread::Builder::new()
            .name(format!("{}#{}", script.name(), id.inner()))
            .stack_size(stack_size)
            .spawn(move || run_body(body, link))
            .map_err(|source| RuntimeError::Spawn { thread: id, source })?;
        Ok(Self {
            thread: id,
            script: script.clone(),
            stack_size,
            requests: request_rx,
            replies: reply_tx,
            journal: Vec::new(),
            journaling: script.can_clone(),
            journal_limit,
            pending: if forking { None } else { Some(Reply::Start) },
            handle: Some(handle),
        })
    }

    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Number of replies a clone of this coroutine would replay
    #[inline]
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn lost(&self) -> RuntimeError {
        RuntimeError::CoroutineLost {
            thread: self.thread,
        }
    }

    fn send(
        &mut self,
        reply: Reply,
    ) -> Result<(), RuntimeError> {
        if self.journaling && reply.is_journaled() {
            if self.journal.len() >= self.journal_limit {
                return Err(RuntimeError::JournalFull {
                    thread: self.thread,
                    limit: self.journal_limit,
                });
            }
            self.journal.push(reply.clone());
        }
        self.replies.send(reply).map_err(|_| self.lost())
    }

    /// Serve calls until the body suspends, finishes, or (while re-checking)
    /// reports a verdict
    fn serve(
        &mut self,
        api: &mut dyn ThreadApi,
        rechecking: bool,
    ) -> Result<Outcome, RuntimeError> {
        loop {
            let request = self.requests.recv().map_err(|_| self.lost())?;
            match request {
                Request::Call(Call::Verdict(holds), _) if rechecking => {
                    return Ok(Outcome::Verdict(holds));
                }
                Request::Call(Call::Clone, span) if !self.journaling => {
                    return Err(RuntimeError::CloneDisabled {
                        thread: self.thread,
                        span,
                    })
                }
                Request::Call(call, at) => match serve_call(api, call, at)? {
                    Served::Reply(reply) => self.send(reply)?,
                    Served::Suspend(reply) => {
                        self.pending = reply;
                        return Ok(Outcome::Suspended);
                    }
                },
                Request::Finished(Ok(value)) => return Ok(Outcome::Done(value)),
                Request::Finished(Err(Halt::Diverged)) => {
                    return Err(RuntimeError::ReplayDiverged {
                        thread: self.thread,
                    })
                }
                Request::Finished(Err(Halt::Unwound)) => return Err(self.lost()),
                Request::Parked => {
                    return Err(RuntimeError::protocol(
                        self.thread,
                        "coroutine parked outside a fork",
                    ))
                }
            }
        }
    }
}

impl Continuation for Coroutine {
    fn resume(
        &mut self,
        api: &mut dyn ThreadApi,
    ) -> Result<Step, RuntimeError> {
        let reply = self
            .pending
            .take()
            .ok_or_else(|| RuntimeError::protocol(self.thread, "resumed with no pending reply"))?;
        self.send(reply)?;
        match self.serve(api, false)? {
            Outcome::Done(value) => Ok(Step::Done(value)),
            Outcome::Suspended => Ok(Step::Suspended),
            Outcome::Verdict(_) => Err(RuntimeError::protocol(
                self.thread,
                "wait verdict intercepted outside a re-check",
            )),
        }
    }

    fn recheck(
        &mut self,
        api: &mut dyn ThreadApi,
    ) -> Result<bool, RuntimeError> {
        if self.pending.is_some() {
            return Err(RuntimeError::protocol(
                self.thread,
                "re-check of a thread that is not parked in a wait",
            ));
        }
        self.send(Reply::Recheck)?;
        match self.serve(api, true)? {
            Outcome::Verdict(holds) => {
                if holds {
                    self.pending = Some(Reply::Ack);
                }
                Ok(holds)
            }
            Outcome::Done(_) => Err(RuntimeError::protocol(
                self.thread,
                "script finished inside a wait condition",
            )),
            Outcome::Suspended => Err(RuntimeError::protocol(
                self.thread,
                "wait condition suspended during re-check",
            )),
        }
    }

    fn fork(
        &mut self,
        child: ThreadId,
    ) -> Result<Box<dyn Continuation>, RuntimeError> {
        if !self.journaling {
            return Err(RuntimeError::protocol(
                self.thread,
                "fork of a coroutine that keeps no journal",
            ));
        }
        let mut copy = Coroutine::launch(
            &self.script,
            child,
            self.stack_size,
            self.journal_limit,
            Some(self.journal.clone()),
        )?;
        match copy.requests.recv() {
            Ok(Request::Parked) => {}
            Ok(Request::Finished(Err(Halt::Unwound))) | Err(_) => {
                return Err(RuntimeError::CoroutineLost { thread: child })
            }
            Ok(_) => return Err(RuntimeError::ReplayDiverged { thread: child }),
        }
        trace!(
            "{} forked into {} after {} replies",
            self.thread,
            child,
            self.journal.len()
        );
        copy.journal = self.journal.clone();
        copy.pending = Some(Reply::Forked(Fork::Child));
        self.pending = Some(Reply::Forked(Fork::Parent(child)));
        Ok(Box::new(copy))
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        let _ = self.replies.send(Reply::Halt);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

//! Runtime errors
//!
//! [`RuntimeError`] covers everything the scheduler refuses to recover
//! from: a broken contract between a primitive and the scheduler, a lost
//! coroutine, or a failing backend. The context that raised one is marked
//! aborted. Recoverable script mistakes never reach this type; they become
//! warnings (see [`crate::util::diagnostic`]).
//!
//! [`Halt`] is the script-side counterpart: the reason a `ScriptCx` call
//! refused to return a value, propagated through script bodies with `?`.

use thiserror::Error;

use crate::runtime::backend::{FrameError, SolverError};
use crate::runtime::scheduler::{ScheduleRequest, ThreadId, ThreadState};
use crate::util::span::Span;

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result of a script-side call
pub type ScriptResult<T> = Result<T, Halt>;

/// Fatal runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{thread}: unexpected schedule request {request}")]
    UnexpectedRequest {
        thread: ThreadId,
        request: ScheduleRequest,
    },

    #[error("{span}: {thread}: {primitive}() suspended inside a wait condition re-check (pending request {request})")]
    NestedSuspension {
        thread: ThreadId,
        request: ScheduleRequest,
        primitive: &'static str,
        span: Span,
    },

    #[error("{span}: {thread}: wait() started while another wait condition is active")]
    NestedWait { thread: ThreadId, span: Span },

    #[error("context `{context}`: {} threads running at once ({threads:?})", threads.len())]
    MultipleRunning {
        context: String,
        threads: Vec<ThreadId>,
    },

    #[error("{thread} is not runnable (state {state}, request {request})")]
    NotRunnable {
        thread: ThreadId,
        state: ThreadState,
        request: ScheduleRequest,
    },

    #[error("{0} does not exist")]
    UnknownThread(ThreadId),

    #[error("{0} has no continuation")]
    MissingContinuation(ThreadId),

    #[error("{thread}: evaluator protocol violation: {detail}")]
    Protocol { thread: ThreadId, detail: String },

    #[error("{thread}: coroutine terminated unexpectedly")]
    CoroutineLost { thread: ThreadId },

    #[error("{thread}: cloned continuation diverged from its parent during replay")]
    ReplayDiverged { thread: ThreadId },

    #[error("{thread}: replay journal exceeded {limit} replies")]
    JournalFull { thread: ThreadId, limit: usize },

    #[error("{span}: {thread}: clone() in a script declared without clones")]
    CloneDisabled { thread: ThreadId, span: Span },

    #[error("{thread}: cannot start coroutine: {source}")]
    Spawn {
        thread: ThreadId,
        #[source]
        source: std::io::Error,
    },

    #[error("context `{context}`: more than {limit} steps in one pass")]
    StepLimit { context: String, limit: usize },

    #[error("context `{context}`: solver `{solver}` failed: {source}")]
    Solver {
        context: String,
        solver: String,
        #[source]
        source: SolverError,
    },

    #[error("context `{context}`: frame output failed: {source}")]
    Frame {
        context: String,
        #[source]
        source: FrameError,
    },

    #[error("context `{context}` has no solver attached")]
    NoSolver { context: String },

    #[error("context `{context}` was aborted: {reason}")]
    Aborted { context: String, reason: String },
}

impl RuntimeError {
    /// Shorthand for a protocol violation
    pub fn protocol(
        thread: ThreadId,
        detail: impl Into<String>,
    ) -> Self {
        RuntimeError::Protocol {
            thread,
            detail: detail.into(),
        }
    }

    /// Thread the error is about, if any
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            RuntimeError::UnexpectedRequest { thread, .. }
            | RuntimeError::NestedSuspension { thread, .. }
            | RuntimeError::NestedWait { thread, .. }
            | RuntimeError::NotRunnable { thread, .. }
            | RuntimeError::Protocol { thread, .. }
            | RuntimeError::CoroutineLost { thread }
            | RuntimeError::ReplayDiverged { thread }
            | RuntimeError::JournalFull { thread, .. }
            | RuntimeError::CloneDisabled { thread, .. }
            | RuntimeError::Spawn { thread, .. } => Some(*thread),
            RuntimeError::UnknownThread(thread) | RuntimeError::MissingContinuation(thread) => {
                Some(*thread)
            }
            _ => None,
        }
    }

    /// Source location of the offending primitive, if known
    pub fn span(&self) -> Option<Span> {
        match self {
            RuntimeError::NestedSuspension { span, .. }
            | RuntimeError::NestedWait { span, .. }
            | RuntimeError::CloneDisabled { span, .. } => Some(*span),
            _ => None,
        }
    }
}

/// Why a script-side call did not return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Halt {
    /// The thread was killed or torn down; unwind without touching anything
    #[error("thread was torn down")]
    Unwound,

    /// A cloned continuation did not follow its parent's history
    #[error("cloned thread diverged from its parent while replaying")]
    Diverged,
}

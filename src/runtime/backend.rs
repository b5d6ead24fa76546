//! External solver and frame output
//!
//! An animation context is driven by one or more [`Solver`]s that own the
//! simulated time. Each frame the scheduler runs one pass over the script
//! threads, asks every solver to compute the frame, hands the frame to a
//! [`FrameWriter`] and finally advances time.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runtime::context::AnimationContext;
use crate::runtime::errors::RuntimeError;
use crate::runtime::eval::Script;
use crate::runtime::scope::ScopeSnapshot;
use crate::runtime::value::Value;

/// Simulated time range of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub begin: f64,
    pub end: f64,
    /// Time advanced per frame
    pub step: f64,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            begin: 0.0,
            end: 10.0,
            step: 0.04,
        }
    }
}

impl TimeRange {
    pub fn new(
        begin: f64,
        end: f64,
        step: f64,
    ) -> Self {
        Self { begin, end, step }
    }

    /// Number of frames the range covers, both ends included
    pub fn frame_count(&self) -> u64 {
        if self.step <= 0.0 || self.end < self.begin {
            return 0;
        }
        ((self.end - self.begin) / self.step + 1e-9).floor() as u64 + 1
    }
}

impl fmt::Display for TimeRange {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[{}, {}] step {}", self.begin, self.end, self.step)
    }
}

/// Solver failure
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SolverError {
    message: String,
}

impl SolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Owner of simulated time
pub trait Solver: Send {
    fn name(&self) -> &str;

    fn set_time_range(
        &mut self,
        range: TimeRange,
    );

    /// Compute the current frame
    fn compute_all(&mut self) -> Result<(), SolverError>;

    /// Advance to the next frame. Returns true once the range is exhausted.
    fn time_step(&mut self) -> Result<bool, SolverError>;

    fn current_time(&self) -> f64;

    /// Called when the owning context is torn down
    fn detach(&mut self) {}
}

/// Solver that steps through a [`TimeRange`] at a fixed rate
#[derive(Debug, Clone)]
pub struct FixedStepSolver {
    name: String,
    range: TimeRange,
    frame: u64,
    computed: u64,
    detached: bool,
}

impl FixedStepSolver {
    pub fn new(range: TimeRange) -> Self {
        Self {
            name: "fixed-step".to_string(),
            range,
            frame: 0,
            computed: 0,
            detached: false,
        }
    }

    pub fn with_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self
    }

    #[inline]
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Frames computed so far
    #[inline]
    pub fn computed(&self) -> u64 {
        self.computed
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl Solver for FixedStepSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_time_range(
        &mut self,
        range: TimeRange,
    ) {
        self.range = range;
        self.frame = 0;
    }

    fn compute_all(&mut self) -> Result<(), SolverError> {
        if self.detached {
            return Err(SolverError::new("solver is detached"));
        }
        self.computed += 1;
        Ok(())
    }

    fn time_step(&mut self) -> Result<bool, SolverError> {
        self.frame += 1;
        Ok(self.frame >= self.range.frame_count())
    }

    fn current_time(&self) -> f64 {
        self.range.begin + self.frame as f64 * self.range.step
    }

    fn detach(&mut self) {
        debug!("solver `{}` detached at frame {}", self.name, self.frame);
        self.detached = true;
    }
}

/// Frame output failure
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("expression evaluation failed: {0}")]
    Eval(#[source] Box<RuntimeError>),
}

impl From<RuntimeError> for FrameError {
    fn from(err: RuntimeError) -> Self {
        FrameError::Eval(Box::new(err))
    }
}

/// A computed frame, handed to the [`FrameWriter`]
pub struct Frame<'a> {
    ctx: &'a mut AnimationContext,
    index: u64,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(
        ctx: &'a mut AnimationContext,
        index: u64,
    ) -> Self {
        Self { ctx, index }
    }

    /// Name of the context being rendered
    pub fn context_name(&self) -> &str {
        self.ctx.name()
    }

    /// Frame number, starting at 0
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn time(&self) -> f64 {
        self.ctx.current_time()
    }

    /// Read a scope variable; `Void` if undefined
    pub fn get(
        &self,
        name: &str,
    ) -> Value {
        self.ctx.scope().get(name).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> ScopeSnapshot {
        self.ctx.scope().snapshot()
    }

    /// Evaluate an output expression on the context's evaluation thread
    pub fn evaluate(
        &mut self,
        script: &Script,
    ) -> Result<Value, RuntimeError> {
        self.ctx.evaluate(script)
    }
}

/// Sink for computed frames
pub trait FrameWriter {
    fn write_frame(
        &mut self,
        frame: &mut Frame<'_>,
    ) -> Result<(), FrameError>;
}

/// Writer that discards frames
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

impl FrameWriter for NullWriter {
    fn write_frame(
        &mut self,
        _frame: &mut Frame<'_>,
    ) -> Result<(), FrameError> {
        Ok(())
    }
}

/// Writer producing one JSON object per frame and line
#[derive(Debug)]
pub struct JsonLinesWriter<W: io::Write> {
    out: W,
    frames: u64,
}

#[derive(Serialize)]
struct FrameRecord<'r> {
    context: &'r str,
    frame: u64,
    time: f64,
    scope: ScopeSnapshot,
}

impl<W: io::Write> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, frames: 0 }
    }

    /// Frames written so far
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> FrameWriter for JsonLinesWriter<W> {
    fn write_frame(
        &mut self,
        frame: &mut Frame<'_>,
    ) -> Result<(), FrameError> {
        let record = FrameRecord {
            context: frame.context_name(),
            frame: frame.index(),
            time: frame.time(),
            scope: frame.snapshot(),
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }
}

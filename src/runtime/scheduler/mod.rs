//! Cooperative thread scheduler
//!
//! The scheduler interleaves the script threads of one animation context
//! with an external solver. Each frame it runs one *pass*: every runnable
//! thread gets the processor in list order until it suspends, parked waits
//! whose dependencies changed are re-checked, and expired delays wake up.
//! Then the solver computes the frame, the frame is written and time
//! advances.
//!
//! Only one thread runs at any instant and it runs until it asks to
//! suspend. A thread that yields or was just cloned becomes runnable again
//! on the next pass, so a pass always ends.

pub mod delay;
pub(crate) mod host;
pub mod thread;
pub mod wait;

pub use delay::DelayTimer;
pub use host::{Admission, ThreadApi};
pub use thread::{ScheduleRequest, ScriptThread, ThreadId, ThreadState};
pub use wait::{PollPolicy, TrackerState, WaitTracker};

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::runtime::backend::{Frame, FrameWriter};
use crate::runtime::context::AnimationContext;
use crate::runtime::errors::RuntimeError;
use crate::runtime::eval::coroutine::{DEFAULT_JOURNAL_LIMIT, DEFAULT_STACK_SIZE};
use crate::runtime::eval::Step;
use crate::util::diagnostic::Diagnostic;

use host::HostMode;
use thread::Transition;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Stack size of each script thread's coroutine.
    pub stack_size: usize,
    /// Replies a thread may journal for cloning before the run is aborted.
    pub max_journal_len: usize,
    /// Thread activations allowed in one pass before the run is aborted.
    pub max_steps_per_pass: usize,
    /// Stop after this many frames even if the solver is not done.
    pub max_frames: Option<u64>,
    /// Relative tolerance when comparing simulated times.
    pub time_epsilon: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            max_journal_len: DEFAULT_JOURNAL_LIMIT,
            max_steps_per_pass: 100_000,
            max_frames: None,
            time_epsilon: 1e-9,
        }
    }
}

/// What happened during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pass number, starting at 1
    pub pass: u64,
    /// Threads driven, in order
    pub ran: Vec<ThreadId>,
    /// Threads that finished or were killed
    pub exited: Vec<ThreadId>,
    /// Wait conditions re-evaluated
    pub rechecks: usize,
    /// Waits that ended
    pub woken: usize,
    /// Delays that expired
    pub expired: usize,
}

/// Result of a complete run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub passes: u64,
    /// Simulated time after the last step
    pub final_time: f64,
    /// Threads still alive when the run ended
    pub live_threads: usize,
}

/// How a driven thread stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Parked,
    Finished,
    Killed,
}

/// First runnable thread at or after `start`, wrapping
fn runnable_from(
    threads: &[ScriptThread],
    start: usize,
) -> Option<usize> {
    let n = threads.len();
    (0..n)
        .map(|k| (start + k) % n)
        .find(|&i| threads[i].is_runnable())
}

/// Scheduler driving animation contexts
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the context until its solver completes.
    pub fn run(
        &self,
        ctx: &mut AnimationContext,
        writer: &mut dyn FrameWriter,
    ) -> Result<RunSummary, RuntimeError> {
        while !self.frame(ctx, writer)? {}
        let summary = RunSummary {
            frames: ctx.stats.frames,
            passes: ctx.stats.passes,
            final_time: ctx.current_time(),
            live_threads: ctx.threads.len(),
        };
        debug!(
            "context `{}` finished: {} frames, {} live threads",
            ctx.name(),
            summary.frames,
            summary.live_threads
        );
        Ok(summary)
    }

    /// Run one frame: a pass, the solver computation, frame output and
    /// the time step. Returns true when the run is complete.
    pub fn frame(
        &self,
        ctx: &mut AnimationContext,
        writer: &mut dyn FrameWriter,
    ) -> Result<bool, RuntimeError> {
        Self::ensure_alive(ctx)?;
        self.frame_inner(ctx, writer)
            .map_err(|err| Self::abort(ctx, err))
    }

    /// Run one scheduling pass without touching the solvers.
    pub fn run_pass(
        &self,
        ctx: &mut AnimationContext,
    ) -> Result<PassReport, RuntimeError> {
        Self::ensure_alive(ctx)?;
        self.pass(ctx).map_err(|err| Self::abort(ctx, err))
    }

    fn ensure_alive(ctx: &AnimationContext) -> Result<(), RuntimeError> {
        match &ctx.aborted {
            Some(reason) => Err(RuntimeError::Aborted {
                context: ctx.name().to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Record a fatal error and poison the context
    fn abort(
        ctx: &mut AnimationContext,
        err: RuntimeError,
    ) -> RuntimeError {
        let pending = err
            .thread()
            .and_then(|id| ctx.thread(id))
            .map(|t| t.request().to_string())
            .unwrap_or_else(|| "none".to_string());
        let origin = match err.thread() {
            Some(id) => format!("{}#{}", ctx.name(), id.inner()),
            None => ctx.name().to_string(),
        };
        let diagnostic = Diagnostic::error(
            format!("{} (pending request: {})", err, pending),
            err.span().unwrap_or_default(),
        )
        .with_origin(origin);
        diagnostic.emit();
        ctx.diagnostics.push(diagnostic);
        ctx.aborted = Some(err.to_string());
        err
    }

    fn frame_inner(
        &self,
        ctx: &mut AnimationContext,
        writer: &mut dyn FrameWriter,
    ) -> Result<bool, RuntimeError> {
        Self::prepare(ctx)?;
        let report = self.pass(ctx)?;
        trace!(
            "pass {}: ran {:?}, {} re-checks",
            report.pass,
            report.ran,
            report.rechecks
        );

        let context = ctx.name().to_string();
        for solver in ctx.solvers.iter_mut() {
            solver.compute_all().map_err(|source| RuntimeError::Solver {
                context: context.clone(),
                solver: solver.name().to_string(),
                source,
            })?;
        }

        let index = ctx.stats.frames;
        writer
            .write_frame(&mut Frame::new(ctx, index))
            .map_err(|source| RuntimeError::Frame {
                context: context.clone(),
                source,
            })?;
        ctx.stats.frames += 1;

        let mut done = false;
        for solver in ctx.solvers.iter_mut() {
            done |= solver.time_step().map_err(|source| RuntimeError::Solver {
                context: context.clone(),
                solver: solver.name().to_string(),
                source,
            })?;
        }
        if let Some(limit) = self.config.max_frames {
            done |= ctx.stats.frames >= limit;
        }
        Ok(done)
    }

    /// Hand the time range to every solver that has not received it yet
    fn prepare(ctx: &mut AnimationContext) -> Result<(), RuntimeError> {
        if ctx.solvers.is_empty() {
            return Err(RuntimeError::NoSolver {
                context: ctx.name().to_string(),
            });
        }
        if let Some(range) = ctx.time_range {
            for solver in ctx.solvers.iter_mut().skip(ctx.prepared) {
                solver.set_time_range(range);
            }
        }
        ctx.prepared = ctx.solvers.len();
        Ok(())
    }

    fn step_limit(
        &self,
        ctx: &AnimationContext,
    ) -> RuntimeError {
        RuntimeError::StepLimit {
            context: ctx.name().to_string(),
            limit: self.config.max_steps_per_pass,
        }
    }

    fn pass(
        &self,
        ctx: &mut AnimationContext,
    ) -> Result<PassReport, RuntimeError> {
        ctx.stats.passes += 1;
        let mut report = PassReport {
            pass: ctx.stats.passes,
            ..PassReport::default()
        };
        if !ctx.started {
            ctx.started = true;
            ctx.spawn_main()?;
        }

        let now = ctx.current_time();
        let epsilon = self.config.time_epsilon;
        for thread in ctx.threads.iter_mut() {
            thread.promote();
            if thread.state == ThreadState::Delayed && thread.timer.test_expired(now, epsilon) {
                thread.wake();
                report.expired += 1;
            }
        }

        self.sweep(ctx, &mut report)?;
        let batched: SmallVec<[ThreadId; 8]> = ctx
            .threads
            .iter()
            .filter(|t| {
                t.state == ThreadState::Waiting
                    && !t.tracker.poll().is_eager()
                    && t.tracker.dirty() > 0
            })
            .map(|t| t.id)
            .collect();
        for id in batched {
            self.recheck(ctx, id, &mut report)?;
        }
        self.sweep(ctx, &mut report)?;

        let mut next = self.select_first(ctx)?;
        while let Some(index) = next {
            if report.ran.len() >= self.config.max_steps_per_pass {
                return Err(self.step_limit(ctx));
            }
            let id = ctx.threads[index].id;
            let exit = self.drive(ctx, index)?;
            report.ran.push(id);
            self.sweep(ctx, &mut report)?;

            ctx.last_active = Some((id, index));
            let resume_at = match exit {
                Exit::Parked => index + 1,
                Exit::Finished | Exit::Killed => {
                    ctx.remove_at(index);
                    report.exited.push(id);
                    index
                }
            };
            next = runnable_from(&ctx.threads, resume_at);
        }
        Ok(report)
    }

    /// The Running thread if there is one, else the first runnable thread
    /// after the previously active one
    fn select_first(
        &self,
        ctx: &AnimationContext,
    ) -> Result<Option<usize>, RuntimeError> {
        let running: SmallVec<[usize; 2]> = ctx
            .threads
            .iter()
            .enumerate()
            .filter(|(_, t)| t.state == ThreadState::Running)
            .map(|(i, _)| i)
            .collect();
        match running.as_slice() {
            [] => {}
            [only] => return Ok(Some(*only)),
            many => {
                return Err(RuntimeError::MultipleRunning {
                    context: ctx.name().to_string(),
                    threads: many.iter().map(|&i| ctx.threads[i].id).collect(),
                })
            }
        }
        let start = match ctx.last_active {
            Some((id, at)) => ctx.position(id).map(|i| i + 1).unwrap_or(at),
            None => 0,
        };
        Ok(runnable_from(&ctx.threads, start))
    }

    /// Resume the thread at `index` until it parks or exits. Clones are
    /// created on the way.
    fn drive(
        &self,
        ctx: &mut AnimationContext,
        index: usize,
    ) -> Result<Exit, RuntimeError> {
        let thread = &mut ctx.threads[index];
        let id = thread.id;
        if !thread.is_runnable() && thread.state != ThreadState::Running {
            return Err(RuntimeError::NotRunnable {
                thread: id,
                state: thread.state,
                request: thread.request,
            });
        }
        thread.state = ThreadState::Running;
        thread.tracker.reattach();
        let mut continuation = thread.take_continuation()?;
        ctx.stats.steps += 1;

        let mut resumes = 0;
        loop {
            resumes += 1;
            if resumes > self.config.max_steps_per_pass {
                return Err(self.step_limit(ctx));
            }
            let step = match ctx.host_at(index, HostMode::Step) {
                Some(mut host) => continuation.resume(&mut host)?,
                None => return Err(RuntimeError::UnknownThread(id)),
            };
            if let Step::Done(value) = step {
                debug!("{} finished with {}", id, value);
                return Ok(Exit::Finished);
            }

            let thread = &mut ctx.threads[index];
            match thread.settle()? {
                Transition::Continue => {
                    thread.tracker.reattach();
                }
                Transition::Parked => {
                    trace!("{} parked ({})", id, thread.request);
                    if thread.state == ThreadState::Waiting && thread.tracker.dirty() > 0 {
                        // a dependency changed while the condition was being registered
                        ctx.notifications.push(id);
                    }
                    ctx.threads[index].restore(continuation);
                    return Ok(Exit::Parked);
                }
                Transition::Exit => {
                    debug!("{} killed", id);
                    return Ok(Exit::Killed);
                }
                Transition::Fork => {
                    let child = ctx.alloc_id();
                    ctx.threads[index].request = ScheduleRequest::Spawned(child);
                    let copy = continuation.fork(child)?;
                    let tracker = ctx.threads[index].tracker.fork();
                    ctx.insert_child(index, ScriptThread::forked(child, copy, tracker));
                    let parent = &mut ctx.threads[index];
                    parent.request = ScheduleRequest::Ready;
                    parent.tracker.reattach();
                    ctx.stats.clones += 1;
                    debug!("{} cloned into {}", id, child);
                }
            }
        }
    }

    /// Pick up queued notifications until none are left, re-checking the
    /// eager waiters they concern
    fn sweep(
        &self,
        ctx: &mut AnimationContext,
        report: &mut PassReport,
    ) -> Result<(), RuntimeError> {
        let mut rounds = 0;
        while !ctx.notifications.is_empty() {
            rounds += 1;
            if rounds > self.config.max_steps_per_pass {
                return Err(self.step_limit(ctx));
            }
            let pending = std::mem::take(&mut ctx.notifications);
            let mut eager = HashSet::new();
            let mut order: SmallVec<[ThreadId; 8]> = SmallVec::new();
            for id in pending {
                let Some(thread) = ctx.thread_mut(id) else {
                    continue;
                };
                thread.tracker.mark_dirty();
                if thread.state == ThreadState::Waiting
                    && thread.tracker.poll().is_eager()
                    && eager.insert(id)
                {
                    order.push(id);
                }
            }
            for id in order {
                self.recheck(ctx, id, report)?;
            }
        }
        Ok(())
    }

    /// Re-evaluate the wait condition of a Waiting thread
    fn recheck(
        &self,
        ctx: &mut AnimationContext,
        id: ThreadId,
        report: &mut PassReport,
    ) -> Result<bool, RuntimeError> {
        let Some(index) = ctx.position(id) else {
            return Ok(false);
        };
        let thread = &mut ctx.threads[index];
        if thread.state != ThreadState::Waiting {
            return Ok(false);
        }
        thread.tracker.take_dirty();
        let mut continuation = thread.take_continuation()?;
        let verdict = match ctx.host_at(index, HostMode::Recheck) {
            Some(mut host) => continuation.recheck(&mut host),
            None => return Err(RuntimeError::UnknownThread(id)),
        };
        ctx.threads[index].restore(continuation);
        let holds = verdict?;
        report.rechecks += 1;
        ctx.stats.rechecks += 1;
        if holds {
            let thread = &mut ctx.threads[index];
            let deps = thread.tracker.release();
            thread.wake();
            ctx.scope.unsubscribe_all(id, &deps);
            report.woken += 1;
            trace!("{} wait satisfied", id);
        }
        Ok(holds)
    }
}

#[cfg(test)]
mod tests;

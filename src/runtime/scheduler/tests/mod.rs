//! Scheduler unit tests
//!
//! Thread state, wait tracker and delay timer on their own; whole passes
//! over real coroutine threads live in the submodules.

use std::num::NonZeroU32;
use std::sync::Arc;

use crate::runtime::backend::{FixedStepSolver, Frame, FrameError, FrameWriter, TimeRange};
use crate::runtime::context::{AnimationContext, ScopeId};
use crate::runtime::errors::RuntimeError;
use crate::runtime::eval::{Continuation, CoroutineEvaluator, Script, Step};
use crate::runtime::scheduler::{
    DelayTimer, PollPolicy, ScheduleRequest, Scheduler, SchedulerConfig, ScriptThread, ThreadApi,
    ThreadId, ThreadState, TrackerState, WaitTracker,
};
use crate::runtime::scheduler::thread::Transition;
use crate::runtime::scope::ScopeSnapshot;


/// Range used by the pass tests: five frames, t = 0, 0.25 .. 1
pub(super) fn test_range() -> TimeRange {
    TimeRange::new(0.0, 1.0, 0.25)
}

/// Context running `script` on coroutines, driven by a fixed-step solver
pub(super) fn context(script: Script) -> AnimationContext {
    let evaluator = Arc::new(CoroutineEvaluator::default());
    let mut ctx = AnimationContext::new(ScopeId(1), "test", script, evaluator);
    ctx.set_time_range(test_range());
    ctx.attach_solver(Box::new(FixedStepSolver::new(test_range())));
    ctx
}

/// Frame writer keeping every frame's time and scope
#[derive(Default)]
pub(super) struct Recorder {
    pub frames: Vec<(u64, f64, ScopeSnapshot)>,
}

impl FrameWriter for Recorder {
    fn write_frame(
        &mut self,
        frame: &mut Frame<'_>,
    ) -> Result<(), FrameError> {
        self.frames
            .push((frame.index(), frame.time(), frame.snapshot()));
        Ok(())
    }
}

/// Continuation that suspends forever without asking for anything
pub(super) struct Spinner;

impl Continuation for Spinner {
    fn resume(
        &mut self,
        _api: &mut dyn ThreadApi,
    ) -> Result<Step, RuntimeError> {
        Ok(Step::Suspended)
    }

    fn recheck(
        &mut self,
        _api: &mut dyn ThreadApi,
    ) -> Result<bool, RuntimeError> {
        Ok(false)
    }

    fn fork(
        &mut self,
        _child: ThreadId,
    ) -> Result<Box<dyn Continuation>, RuntimeError> {
        Ok(Box::new(Spinner))
    }
}

#[cfg(test)]
mod thread_id_tests {
    use super::*;

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId(3).to_string(), "Thread(3)");
        assert_eq!(ThreadId::MAIN, ThreadId(1));
        assert_eq!(u32::from(ThreadId::EVAL), 0);
    }

    #[test]
    fn test_schedule_request_display() {
        assert_eq!(ScheduleRequest::EnterWait.to_string(), "enter-wait");
        assert_eq!(ScheduleRequest::Spawned(ThreadId(4)).to_string(), "spawned(4)");
    }
}

#[cfg(test)]
mod script_thread_tests {
    use super::*;

    #[test]
    fn test_new_thread_is_runnable() {
        let thread = ScriptThread::new(ThreadId(1), Box::new(Spinner));
        assert!(thread.is_runnable());
        assert!(!thread.is_deferred());
        assert_eq!(thread.state(), ThreadState::Inactive);
    }

    #[test]
    fn test_deferred_requests_promote() {
        let mut thread = ScriptThread::forked(ThreadId(2), Box::new(Spinner), WaitTracker::new());
        assert_eq!(thread.request(), ScheduleRequest::CloneDone);
        assert!(!thread.is_runnable());
        assert!(thread.promote());
        assert!(thread.is_runnable());
        assert!(!thread.promote());
    }

    #[test]
    fn test_settle_yield_parks() {
        let mut thread = ScriptThread::new(ThreadId(1), Box::new(Spinner));
        thread.state = ThreadState::Running;
        thread.request = ScheduleRequest::Yield;
        assert!(matches!(thread.settle(), Ok(Transition::Parked)));
        assert_eq!(thread.state(), ThreadState::Inactive);
        assert!(thread.is_deferred());
    }

    #[test]
    fn test_settle_unexpected_request_is_fatal() {
        let mut thread = ScriptThread::forked(ThreadId(7), Box::new(Spinner), WaitTracker::new());
        match thread.settle() {
            Err(RuntimeError::UnexpectedRequest { thread, request }) => {
                assert_eq!(thread, ThreadId(7));
                assert_eq!(request, ScheduleRequest::CloneDone);
            }
            other => panic!("expected UnexpectedRequest, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_settle_wait_without_parked_tracker_is_fatal() {
        let mut thread = ScriptThread::new(ThreadId(1), Box::new(Spinner));
        thread.request = ScheduleRequest::EnterWait;
        assert!(matches!(
            thread.settle(),
            Err(RuntimeError::UnexpectedRequest { .. })
        ));
    }

    #[test]
    fn test_disabled_thread() {
        let thread = ScriptThread::disabled(ThreadId::EVAL);
        assert!(thread.is_disabled());
        assert!(!thread.is_runnable());
    }
}

#[cfg(test)]
mod wait_tracker_tests {
    use super::*;

    #[test]
    fn test_poll_policy_from_raw() {
        assert_eq!(PollPolicy::from_raw(0), PollPolicy::Eager);
        assert_eq!(
            PollPolicy::from_raw(-3),
            PollPolicy::Batched(NonZeroU32::new(3).unwrap())
        );
        assert!(!PollPolicy::from_raw(i64::MIN).is_eager());
        assert!(!PollPolicy::from_raw(1).is_eager());
        assert!(!PollPolicy::from_raw(i64::MAX).is_eager());
    }

    #[test]
    fn test_full_cycle() {
        let mut tracker = WaitTracker::new();
        tracker.begin(PollPolicy::Eager).unwrap();
        assert!(tracker.install("x"));
        assert!(!tracker.install("x"));
        assert!(tracker.install("y"));
        tracker.complete().unwrap();
        assert_eq!(tracker.state(), TrackerState::PendingStart);
        tracker.park().unwrap();
        assert!(tracker.is_waiting());

        tracker.mark_dirty();
        tracker.mark_dirty();
        assert_eq!(tracker.take_dirty(), 2);
        assert_eq!(tracker.dirty(), 0);

        let deps = tracker.release();
        assert_eq!(deps.len(), 2);
        assert!(tracker.is_idle());
        assert!(tracker.dependencies().is_empty());
    }

    #[test]
    fn test_second_begin_fails() {
        let mut tracker = WaitTracker::new();
        tracker.begin(PollPolicy::Eager).unwrap();
        assert_eq!(
            tracker.begin(PollPolicy::Eager),
            Err(TrackerState::RegisteringDependencies)
        );
    }

    #[test]
    fn test_detach_blocks_install() {
        let mut tracker = WaitTracker::new();
        tracker.begin(PollPolicy::from_raw(2)).unwrap();
        assert!(tracker.detach());
        assert!(!tracker.install("ignored"));
        assert!(tracker.complete().is_err());
        assert!(tracker.reattach());
        assert!(tracker.install("x"));
    }

    #[test]
    fn test_install_needs_active_wait() {
        let mut tracker = WaitTracker::new();
        assert!(!tracker.install("x"));
        assert!(!tracker.remove("x"));
    }

    #[test]
    fn test_fork_detaches_child() {
        let mut tracker = WaitTracker::new();
        tracker.begin(PollPolicy::Eager).unwrap();
        tracker.install("x");
        tracker.mark_dirty();

        let child = tracker.fork();
        assert_eq!(child.state(), TrackerState::TemporarilyDetached);
        assert_eq!(child.dependencies().len(), 1);
        assert_eq!(child.dirty(), 0);
        assert!(tracker.is_registering());
    }
}

#[cfg(test)]
mod delay_timer_tests {
    use super::*;

    #[test]
    fn test_expires_at_target() {
        let mut timer = DelayTimer::new();
        assert_eq!(timer.start(1.0, 0.5), 1.5);
        assert!(!timer.test_expired(1.25, 1e-9));
        assert!(timer.is_active());
        assert!(timer.test_expired(1.5, 1e-9));
        assert!(!timer.is_active());
        assert!(!timer.test_expired(2.0, 1e-9));
    }

    #[test]
    fn test_epsilon_absorbs_rounding() {
        let mut timer = DelayTimer::new();
        timer.start(0.0, 0.3);
        assert!(timer.test_expired(0.1 + 0.2 - 1e-12, 1e-9));
    }

    #[test]
    fn test_cancel() {
        let mut timer = DelayTimer::new();
        timer.start(0.0, 0.0);
        timer.cancel();
        assert!(!timer.test_expired(10.0, 1e-9));
    }
}

#[cfg(test)]
mod scheduler_config_tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert!(config.stack_size >= 64 * 1024);
        assert!(config.max_steps_per_pass > 0);
        assert!(config.max_frames.is_none());
    }

    #[test]
    fn test_scheduler_keeps_config() {
        let config = SchedulerConfig {
            max_frames: Some(3),
            ..SchedulerConfig::default()
        };
        assert_eq!(Scheduler::with_config(config.clone()).config(), &config);
    }
}

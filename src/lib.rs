//! animscript - runtime core of an animation scripting language
//!
//! Animation scripts run as cooperative *script threads* inside an
//! *animation context*. Threads suspend through a handful of primitives
//! (`wait`, `pwait`, `delay`, `clone`, `yield`, `kill`) and a scheduler
//! interleaves them with an external solver that owns simulated time:
//! every frame, one scheduling pass, then `compute_all`, frame output and
//! a time step.
//!
//! # Example
//!
//! ```no_run
//! use animscript::runtime::backend::{FixedStepSolver, NullWriter, TimeRange};
//! use animscript::runtime::context::{AnimationContext, ScopeId};
//! use animscript::runtime::eval::Script;
//! use animscript::runtime::scheduler::{Scheduler, SchedulerConfig};
//! use animscript::runtime::value::Value;
//!
//! let script = Script::new("fade", |cx| {
//!     let mut alpha = 1.0;
//!     while alpha > 0.0 {
//!         alpha -= 0.25;
//!         cx.set("alpha", alpha)?;
//!         cx.yield_now()?;
//!     }
//!     Ok(Value::Void)
//! });
//!
//! let config = SchedulerConfig::default();
//! let mut ctx = AnimationContext::with_config(ScopeId(0), "fade", script, &config);
//! let range = TimeRange::new(0.0, 1.0, 0.25);
//! ctx.set_time_range(range);
//! ctx.attach_solver(Box::new(FixedStepSolver::new(range)));
//!
//! let summary = Scheduler::with_config(config)
//!     .run(&mut ctx, &mut NullWriter)
//!     .unwrap();
//! assert_eq!(summary.frames, 5);
//! ```

#![warn(rust_2018_idioms)]

pub mod demo;
pub mod runtime;
pub mod util;

pub use runtime::backend::{FixedStepSolver, Frame, FrameWriter, Solver, TimeRange};
pub use runtime::context::{AnimationContext, ContextRegistry, ScopeId};
pub use runtime::errors::{Halt, RuntimeError, ScriptResult};
pub use runtime::eval::{Cloned, Script, ScriptCx};
pub use runtime::scheduler::{PollPolicy, Scheduler, SchedulerConfig, ThreadId};
pub use runtime::value::Value;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "animscript";

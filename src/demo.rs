//! Bundled demo scene
//!
//! Two balls dropped from different heights. The main thread clones
//! itself: the parent waits a moment and drops ball `a`; the child waits
//! until `a` has landed and then drops ball `b`.

use crate::runtime::backend::{FixedStepSolver, FrameWriter};
use crate::runtime::context::{AnimationContext, ScopeId};
use crate::runtime::errors::{RuntimeError, ScriptResult};
use crate::runtime::eval::{Cloned, Script, ScriptCx};
use crate::runtime::scheduler::{PollPolicy, RunSummary, Scheduler};
use crate::runtime::value::Value;
use crate::util::config::RuntimeConfig;

const GRAVITY: f64 = 9.81;

/// Let `ball` fall from `height` until it reaches the ground, one frame
/// per step
fn drop_ball(
    cx: &mut ScriptCx<'_>,
    ball: &str,
    height: f64,
) -> ScriptResult<()> {
    let mut y = height;
    let mut speed = 0.0;
    let mut last = cx.now()?;
    cx.set(ball, y)?;
    while y > 0.0 {
        if !cx.yield_now()? {
            break;
        }
        let now = cx.now()?;
        let dt = now - last;
        last = now;
        speed += GRAVITY * dt;
        y = (y - speed * dt).max(0.0);
        cx.set(ball, y)?;
    }
    Ok(())
}

/// The demo script
pub fn bouncing_balls() -> Script {
    Script::new("balls", |cx| {
        cx.set("landed", false)?;
        match cx.clone_thread()? {
            Cloned::Child => {
                cx.wait(PollPolicy::Eager, |cx| Ok(cx.get("landed")?.is_truthy()))?;
                drop_ball(cx, "b", 2.0)?;
            }
            Cloned::Parent(_) | Cloned::Refused => {
                cx.delay(0.2)?;
                drop_ball(cx, "a", 1.0)?;
                cx.set("landed", true)?;
            }
        }
        Ok(Value::Void)
    })
}

/// Run the demo scene with `config`, writing every frame to `writer`
pub fn run_demo(
    config: &RuntimeConfig,
    writer: &mut dyn FrameWriter,
) -> Result<RunSummary, RuntimeError> {
    let script = bouncing_balls();
    let mut ctx = AnimationContext::with_config(ScopeId(0), "demo", script, &config.scheduler);
    ctx.set_time_range(config.time);
    ctx.attach_solver(Box::new(FixedStepSolver::new(config.time)));
    let scheduler = Scheduler::with_config(config.scheduler.clone());
    scheduler.run(&mut ctx, writer)
}

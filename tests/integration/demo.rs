use std::sync::Arc;

use animscript::demo::{bouncing_balls, run_demo};
use animscript::runtime::backend::{FrameError, JsonLinesWriter};
use animscript::runtime::eval::CoroutineEvaluator;
use animscript::util::config::RuntimeConfig;
use animscript::{
    AnimationContext, FixedStepSolver, Frame, FrameWriter, Scheduler, ScopeId, TimeRange, Value,
};

/// Ball heights and the landed flag of every frame
#[derive(Default)]
struct Heights {
    rows: Vec<(f64, Value, Value, Value)>,
}

impl FrameWriter for Heights {
    fn write_frame(
        &mut self,
        frame: &mut Frame<'_>,
    ) -> Result<(), FrameError> {
        self.rows.push((
            frame.time(),
            frame.get("a"),
            frame.get("b"),
            frame.get("landed"),
        ));
        Ok(())
    }
}

fn short_config() -> RuntimeConfig {
    RuntimeConfig {
        time: TimeRange::new(0.0, 3.0, 0.04),
        ..RuntimeConfig::default()
    }
}

#[test]
fn test_demo_drops_both_balls() {
    let mut heights = Heights::default();
    let summary = run_demo(&short_config(), &mut heights).unwrap();

    assert_eq!(summary.frames, 76);
    assert_eq!(summary.live_threads, 0);

    let (_, a, b, landed) = heights.rows.last().unwrap();
    assert_eq!(*a, Value::Float(0.0));
    assert_eq!(*b, Value::Float(0.0));
    assert_eq!(*landed, Value::Bool(true));
}

#[test]
fn test_demo_ordering() {
    let mut heights = Heights::default();
    run_demo(&short_config(), &mut heights).unwrap();

    // `a` starts falling once the delay expires
    let first_a = heights.rows.iter().position(|r| !r.1.is_void()).unwrap();
    assert!((heights.rows[first_a].0 - 0.2).abs() < 1e-9);

    // `b` appears in the same frame `a` lands, never earlier
    let first_b = heights.rows.iter().position(|r| !r.2.is_void()).unwrap();
    assert_eq!(heights.rows[first_b].1, Value::Float(0.0));
    assert_eq!(heights.rows[first_b].2, Value::Float(2.0));
    assert!(heights.rows[..first_b]
        .iter()
        .all(|r| r.3 != Value::Bool(true)));

    // heights never increase
    for pair in heights.rows.windows(2) {
        let (before, after) = (pair[0].1.as_f64(), pair[1].1.as_f64());
        if !pair[0].1.is_void() {
            assert!(after <= before);
        }
    }
}

#[test]
fn test_demo_stops_at_frame_limit() {
    let mut config = short_config();
    config.scheduler.max_frames = Some(10);
    let mut writer = JsonLinesWriter::new(Vec::new());
    let summary = run_demo(&config, &mut writer).unwrap();

    assert_eq!(summary.frames, 10);
    assert_eq!(summary.live_threads, 2);
    let output = String::from_utf8(writer.into_inner()).unwrap();
    assert_eq!(output.lines().count(), 10);
    assert!(output.lines().all(|line| line.contains("\"context\":\"demo\"")));
}

#[test]
fn test_demo_script_in_own_context() {
    let range = TimeRange::new(0.0, 0.2, 0.04);
    let mut ctx = AnimationContext::new(
        ScopeId(3),
        "balls",
        bouncing_balls(),
        Arc::new(CoroutineEvaluator::default()),
    );
    ctx.set_time_range(range);
    ctx.attach_solver(Box::new(FixedStepSolver::new(range)));
    let mut heights = Heights::default();
    Scheduler::new().run(&mut ctx, &mut heights).unwrap();

    assert_eq!(heights.rows.len(), 6);
    assert!(ctx.diagnostics().is_empty());
    assert_eq!(ctx.thread_ids().len(), 2);
}

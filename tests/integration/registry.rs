use animscript::runtime::backend::NullWriter;
use animscript::{
    Cloned, ContextRegistry, FixedStepSolver, PollPolicy, Scheduler, SchedulerConfig, ScopeId,
    Script, ThreadId, TimeRange, Value,
};

fn counter(step: i64) -> Script {
    Script::new("counter", move |cx| loop {
        let n = cx.get("n")?.to_int().unwrap_or(0);
        cx.set("n", n + step)?;
        cx.yield_now()?;
    })
}

#[test]
fn test_contexts_in_one_scope_are_independent() {
    let config = SchedulerConfig::default();
    let mut registry = ContextRegistry::with_config(&config);
    let range = TimeRange::new(0.0, 1.0, 0.5);
    let scheduler = Scheduler::with_config(config);

    for (name, step) in [("ones", 1), ("tens", 10)] {
        let ctx = registry.lookup_or_create(ScopeId(1), name, &counter(step));
        ctx.set_time_range(range);
        ctx.attach_solver(Box::new(FixedStepSolver::new(range)));
        scheduler.run(ctx, &mut NullWriter).unwrap();
    }

    let ones = registry.get(ScopeId(1), "ones").unwrap();
    let tens = registry.get(ScopeId(1), "tens").unwrap();
    assert_eq!(ones.scope().get("n"), Some(&Value::Int(3)));
    assert_eq!(tens.scope().get("n"), Some(&Value::Int(30)));
    assert_eq!(ones.thread_ids(), vec![ThreadId::MAIN]);
}

#[test]
fn test_scope_teardown_stops_threads() {
    let mut registry = ContextRegistry::default();
    let script = Script::new("watcher", |cx| {
        if cx.clone_thread()? == Cloned::Child {
            cx.delay(50.0)?;
        }
        cx.wait(PollPolicy::from_raw(2), |cx| Ok(cx.get("stop")?.is_truthy()))?;
        Ok(Value::Void)
    });
    let scheduler = Scheduler::new();

    for scope in [ScopeId(1), ScopeId(2)] {
        let ctx = registry.lookup_or_create(scope, "watch", &script);
        scheduler.run_pass(ctx).unwrap();
        scheduler.run_pass(ctx).unwrap();
        assert_eq!(ctx.threads().len(), 2);
    }

    assert_eq!(registry.teardown_scope(ScopeId(1)), 1);
    assert!(registry.get(ScopeId(1), "watch").is_none());

    // the other scope keeps running and can still be released from outside
    let ctx = registry.get_mut(ScopeId(2), "watch").unwrap();
    ctx.set_variable("stop", true);
    let report = scheduler.run_pass(ctx).unwrap();
    assert_eq!(report.rechecks, 1);
    assert_eq!(report.exited, vec![ThreadId::MAIN]);
    assert_eq!(ctx.threads().len(), 1);
}

#[test]
fn test_external_evaluation_wakes_threads() {
    let mut registry = ContextRegistry::default();
    let script = Script::new("gate", |cx| {
        cx.wait(PollPolicy::Eager, |cx| Ok(cx.get("open")?.is_truthy()))?;
        cx.set("passed", true)?;
        Ok(Value::Void)
    });
    let scheduler = Scheduler::new();
    let ctx = registry.lookup_or_create(ScopeId(9), "gate", &script);
    scheduler.run_pass(ctx).unwrap();
    assert!(ctx.scope().get("passed").is_none());

    ctx.evaluate(&Script::new("opener", |cx| {
        cx.set("open", true)?;
        Ok(Value::Void)
    }))
    .unwrap();
    let report = scheduler.run_pass(ctx).unwrap();
    assert_eq!(report.woken, 1);
    assert_eq!(ctx.scope().get("passed"), Some(&Value::Bool(true)));
    assert!(ctx.threads().is_empty());
}

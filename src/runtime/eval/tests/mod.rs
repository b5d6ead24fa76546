//! Script evaluation tests

use std::sync::Arc;

use indexmap::IndexMap;

use crate::runtime::backend::{FixedStepSolver, TimeRange};
use crate::runtime::context::{AnimationContext, ScopeId};
use crate::runtime::errors::{Halt, RuntimeError};
use crate::runtime::eval::{evaluate_inline, Cloned, CoroutineEvaluator, Script};
use crate::runtime::scheduler::{Admission, PollPolicy, ThreadApi, ThreadId};
use crate::runtime::value::Value;
use crate::util::span::Span;

/// In-memory [`ThreadApi`] where every suspending primitive suspends
pub(crate) struct FakeApi {
    pub id: ThreadId,
    pub values: IndexMap<String, Value>,
    /// Suspending primitives in call order
    pub requests: Vec<&'static str>,
    pub last_span: Option<Span>,
}

impl FakeApi {
    pub(crate) fn new(id: ThreadId) -> Self {
        Self {
            id,
            values: IndexMap::new(),
            requests: Vec::new(),
            last_span: None,
        }
    }

    fn suspend(
        &mut self,
        primitive: &'static str,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        self.requests.push(primitive);
        self.last_span = Some(at);
        Ok(Admission::Suspend)
    }
}

impl ThreadApi for FakeApi {
    fn thread_id(&self) -> ThreadId {
        self.id
    }

    fn now(&self) -> f64 {
        0.0
    }

    fn read(
        &mut self,
        name: &str,
        _at: Span,
    ) -> Value {
        self.values.get(name).cloned().unwrap_or_default()
    }

    fn write(
        &mut self,
        name: &str,
        value: Value,
        _at: Span,
    ) {
        self.values.insert(name.to_string(), value);
    }

    fn remove(
        &mut self,
        name: &str,
        _at: Span,
    ) -> Value {
        self.values.shift_remove(name).unwrap_or_default()
    }

    fn install_dependency(
        &mut self,
        _name: &str,
    ) -> bool {
        false
    }

    fn remove_dependency(
        &mut self,
        _name: &str,
    ) -> bool {
        false
    }

    fn request_clone(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        self.suspend("clone", at)
    }

    fn request_yield(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        self.suspend("yield", at)
    }

    fn request_delay(
        &mut self,
        _duration: f64,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        self.suspend("delay", at)
    }

    fn request_kill(
        &mut self,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        self.suspend("kill", at)
    }

    fn request_wait(
        &mut self,
        _poll: PollPolicy,
        _at: Span,
    ) -> Result<Admission, RuntimeError> {
        Ok(Admission::Continue)
    }

    fn wait_verdict(
        &mut self,
        holds: bool,
        at: Span,
    ) -> Result<Admission, RuntimeError> {
        if holds {
            Ok(Admission::Continue)
        } else {
            self.suspend("wait", at)
        }
    }
}

fn eval_context() -> AnimationContext {
    let range = TimeRange::new(2.0, 3.0, 0.5);
    let mut ctx = AnimationContext::new(
        ScopeId(4),
        "eval",
        Script::new("idle", |_| Ok(Value::Void)),
        Arc::new(CoroutineEvaluator::default()),
    );
    ctx.set_time_range(range);
    ctx.attach_solver(Box::new(FixedStepSolver::new(range)));
    ctx
}

#[test]
fn test_inline_reads_and_writes() {
    let mut ctx = eval_context();
    let value = ctx
        .evaluate(&Script::new("math", |cx| {
            cx.set("x", 3i64)?;
            let x = cx.get("x")?.as_f64();
            cx.set("y", x * 1.5)?;
            let old = cx.unset("x")?;
            Ok(old)
        }))
        .unwrap();
    assert_eq!(value, Value::Int(3));
    assert!(ctx.scope().get("x").is_none());
    assert_eq!(ctx.scope().get("y"), Some(&Value::Float(4.5)));
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_eval_thread_identity_and_time() {
    let mut ctx = eval_context();
    let value = ctx
        .evaluate(&Script::new("who", |cx| {
            let id = cx.thread_id()?;
            let t = cx.now()?;
            Ok(Value::Vector([f64::from(id.inner()), t, 0.0]))
        }))
        .unwrap();
    assert_eq!(value, Value::Vector([0.0, 2.0, 0.0]));
}

#[test]
fn test_suspending_primitives_degrade() {
    let mut ctx = eval_context();
    let value = ctx
        .evaluate(&Script::new("degrade", |cx| {
            assert!(!cx.yield_now()?);
            assert!(!cx.delay(1.0)?);
            assert_eq!(cx.clone_thread()?, Cloned::Refused);
            cx.kill()?;
            cx.wait(PollPolicy::Eager, |_| panic!("condition must not run"))?;
            cx.pwait(|_| Ok(false))?;
            Ok(Value::from("survived"))
        }))
        .unwrap();
    assert_eq!(value, Value::from("survived"));

    let diagnostics = ctx.take_diagnostics();
    let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "yield() outside an animation thread has no effect",
            "delay() outside an animation thread has no effect",
            "clone() outside an animation thread has no effect",
            "kill() outside an animation thread has no effect",
            "wait() outside an animation thread has no effect",
            "yield() outside an animation thread has no effect",
        ]
    );
    for diagnostic in &diagnostics {
        assert!(diagnostic.is_warning());
        assert_eq!(diagnostic.span.file, file!());
        assert_eq!(diagnostic.origin.as_deref(), Some("eval#0"));
    }
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_undefined_access_warns() {
    let mut ctx = eval_context();
    let value = ctx
        .evaluate(&Script::new("missing", |cx| {
            let a = cx.get("nowhere")?;
            let b = cx.unset("nowhere")?;
            Ok(Value::Bool(a.is_void() && b.is_void()))
        }))
        .unwrap();
    assert_eq!(value, Value::Bool(true));
    let messages: Vec<_> = ctx.diagnostics().iter().map(|d| d.message.clone()).collect();
    assert_eq!(
        messages,
        vec![
            "`nowhere` is undefined".to_string(),
            "cannot delete undefined `nowhere`".to_string(),
        ]
    );
}

#[test]
fn test_halting_body_is_a_protocol_error() {
    let mut ctx = eval_context();
    let err = ctx
        .evaluate(&Script::new("bail", |_| Err(Halt::Diverged)))
        .unwrap_err();
    match err {
        RuntimeError::Protocol { thread, detail } => {
            assert_eq!(thread, ThreadId::EVAL);
            assert!(detail.contains("inline evaluation"));
        }
        other => panic!("expected Protocol, got {:?}", other),
    }
}

#[test]
fn test_inline_suspension_is_a_fault() {
    let mut api = FakeApi::new(ThreadId(3));
    let script = Script::new("eager", |cx| {
        cx.set("before", true)?;
        cx.yield_now()?;
        // unreachable once the yield faulted
        cx.set("after", true)?;
        Ok(Value::Void)
    });
    let err = evaluate_inline(&script, &mut api).unwrap_err();
    assert!(matches!(err, RuntimeError::Protocol { thread: ThreadId(3), .. }));
    assert!(err.to_string().contains("yield() suspended an inline evaluation"));
    assert!(api.values.contains_key("before"));
    assert!(!api.values.contains_key("after"));
}

#[test]
fn test_script_debug_shows_name() {
    let script = Script::new("spin", |_| Ok(Value::Void));
    assert_eq!(script.name(), "spin");
    assert!(format!("{:?}", script).contains("spin"));
}

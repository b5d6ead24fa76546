//! Animation contexts
//!
//! An animation context is one running instance of an animation script: a
//! scope instance with its variables, the ordered list of script threads
//! executing in it, and the solvers that drive its simulated time. Contexts
//! are found through a [`ContextRegistry`] keyed by scope instance and
//! name, so evaluating the same animation twice in one scope reuses the
//! context.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::runtime::backend::{Solver, TimeRange};
use crate::runtime::errors::RuntimeError;
use crate::runtime::eval::{CoroutineEvaluator, Evaluator, Script};
use crate::runtime::scheduler::host::{HostMode, ThreadHost};
use crate::runtime::scheduler::{SchedulerConfig, ScriptThread, ThreadId};
use crate::runtime::scope::Scope;
use crate::runtime::value::Value;
use crate::util::diagnostic::Diagnostic;
use crate::util::span::Span;

/// Identifier of a scope instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ScopeId(pub u64);

impl fmt::Display for ScopeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Scope({})", self.0)
    }
}

/// Counters kept per context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Scheduling passes run
    pub passes: u64,
    /// Thread activations
    pub steps: u64,
    /// Wait conditions re-evaluated
    pub rechecks: u64,
    /// Threads created by cloning
    pub clones: u64,
    /// Threads that finished or were killed
    pub exits: u64,
    /// Frames written
    pub frames: u64,
}

/// One running animation
pub struct AnimationContext {
    name: Arc<str>,
    scope_id: ScopeId,
    script: Script,
    evaluator: Arc<dyn Evaluator>,
    /// Script threads in scheduling order
    pub(crate) threads: Vec<ScriptThread>,
    /// Disabled thread for entry and output evaluation
    pub(crate) eval_thread: ScriptThread,
    pub(crate) scope: Scope,
    pub(crate) solvers: Vec<Box<dyn Solver>>,
    /// Threads notified of a change and not yet processed
    pub(crate) notifications: Vec<ThreadId>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) stats: ContextStats,
    pub(crate) time_range: Option<TimeRange>,
    /// Last thread run, with its position at the time
    pub(crate) last_active: Option<(ThreadId, usize)>,
    /// The main thread has been created
    pub(crate) started: bool,
    /// Leading solvers that received the time range
    pub(crate) prepared: usize,
    pub(crate) aborted: Option<String>,
    main_issued: bool,
    torn_down: bool,
}

impl fmt::Debug for AnimationContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("AnimationContext")
            .field("name", &self.name)
            .field("scope_id", &self.scope_id)
            .field("threads", &self.threads)
            .field("solvers", &self.solvers.len())
            .field("stats", &self.stats)
            .field("aborted", &self.aborted)
            .finish()
    }
}

impl AnimationContext {
    pub fn new(
        scope_id: ScopeId,
        name: impl Into<Arc<str>>,
        script: Script,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        let name = name.into();
        debug!("created context `{}` in {}", name, scope_id);
        Self {
            name,
            scope_id,
            script,
            evaluator,
            threads: Vec::new(),
            eval_thread: ScriptThread::disabled(ThreadId::EVAL),
            scope: Scope::new(),
            solvers: Vec::new(),
            notifications: Vec::new(),
            diagnostics: Vec::new(),
            stats: ContextStats::default(),
            time_range: None,
            last_active: None,
            started: false,
            prepared: 0,
            aborted: None,
            main_issued: false,
            torn_down: false,
        }
    }

    /// Context using the coroutine evaluator
    pub fn with_config(
        scope_id: ScopeId,
        name: impl Into<Arc<str>>,
        script: Script,
        config: &SchedulerConfig,
    ) -> Self {
        let evaluator = Arc::new(CoroutineEvaluator::from_config(config));
        Self::new(scope_id, name, script, evaluator)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    #[inline]
    pub fn script(&self) -> &Script {
        &self.script
    }

    #[inline]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Script threads in scheduling order
    #[inline]
    pub fn threads(&self) -> &[ScriptThread] {
        &self.threads
    }

    pub fn thread(
        &self,
        id: ThreadId,
    ) -> Option<&ScriptThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|t| t.id).collect()
    }

    #[inline]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    #[inline]
    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    #[inline]
    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Set the range handed to the solvers. Ignored with a warning once
    /// the context has started.
    #[track_caller]
    pub fn set_time_range(
        &mut self,
        range: TimeRange,
    ) {
        if self.started {
            let diagnostic = Diagnostic::warning(
                format!(
                    "set_time_range() on running context `{}` ignored",
                    self.name
                ),
                Span::caller(),
            )
            .with_origin(self.name.to_string());
            diagnostic.emit();
            self.diagnostics.push(diagnostic);
            return;
        }
        self.time_range = Some(range);
        self.prepared = 0;
    }

    /// Add a solver. One attached after the start receives the time range
    /// before its first frame; the others keep their time.
    pub fn attach_solver(
        &mut self,
        solver: Box<dyn Solver>,
    ) {
        debug!("context `{}`: attached solver `{}`", self.name, solver.name());
        self.solvers.push(solver);
    }

    #[inline]
    pub fn solver_count(&self) -> usize {
        self.solvers.len()
    }

    /// Simulated time of the first solver; the range start (or 0) without
    /// one
    pub fn current_time(&self) -> f64 {
        match self.solvers.first() {
            Some(solver) => solver.current_time(),
            None => self.time_range.map(|r| r.begin).unwrap_or(0.0),
        }
    }

    /// Run a script to completion on the evaluation thread. Suspending
    /// primitives are ignored with a warning.
    pub fn evaluate(
        &mut self,
        script: &Script,
    ) -> Result<Value, RuntimeError> {
        let now = self.current_time();
        let evaluator = Arc::clone(&self.evaluator);
        let mut host = ThreadHost::new(
            &self.name,
            &mut self.eval_thread,
            &mut self.scope,
            &mut self.notifications,
            &mut self.diagnostics,
            now,
            HostMode::Step,
        );
        evaluator.evaluate(script, &mut host)
    }

    /// Assign a scope variable from outside the script, notifying waiters
    pub fn set_variable(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) {
        let watchers = self.scope.set(name, value.into());
        self.notifications.extend(watchers);
    }

    /// Allocate a thread id: 1 for the first thread ever, then the smallest
    /// free id from 2 on
    pub(crate) fn alloc_id(&mut self) -> ThreadId {
        if !self.main_issued {
            self.main_issued = true;
            return ThreadId::MAIN;
        }
        let mut candidate = 2;
        while self.threads.iter().any(|t| t.id.0 == candidate) {
            candidate += 1;
        }
        ThreadId(candidate)
    }

    /// Create the main thread from the context's script
    pub(crate) fn spawn_main(&mut self) -> Result<ThreadId, RuntimeError> {
        let id = self.alloc_id();
        let continuation = self.evaluator.spawn(&self.script, id)?;
        self.threads.push(ScriptThread::new(id, continuation));
        info!("context `{}`: started {}", self.name, id);
        Ok(id)
    }

    pub(crate) fn position(
        &self,
        id: ThreadId,
    ) -> Option<usize> {
        self.threads.iter().position(|t| t.id == id)
    }

    pub(crate) fn thread_mut(
        &mut self,
        id: ThreadId,
    ) -> Option<&mut ScriptThread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    /// Borrow the context as the host of the thread at `index`
    pub(crate) fn host_at(
        &mut self,
        index: usize,
        mode: HostMode,
    ) -> Option<ThreadHost<'_>> {
        let now = self.current_time();
        let thread = self.threads.get_mut(index)?;
        Some(ThreadHost::new(
            &self.name,
            thread,
            &mut self.scope,
            &mut self.notifications,
            &mut self.diagnostics,
            now,
            mode,
        ))
    }

    /// Insert a cloned thread right after its parent, subscribing it to
    /// the parent's wait dependencies
    pub(crate) fn insert_child(
        &mut self,
        parent_index: usize,
        child: ScriptThread,
    ) {
        for name in child.tracker.dependencies() {
            self.scope.subscribe(name, child.id);
        }
        let at = (parent_index + 1).min(self.threads.len());
        self.threads.insert(at, child);
    }

    /// Remove the thread at `index`, releasing everything it holds
    pub(crate) fn remove_at(
        &mut self,
        index: usize,
    ) -> Option<ScriptThread> {
        if index >= self.threads.len() {
            return None;
        }
        let mut thread = self.threads.remove(index);
        self.release(&mut thread);
        self.stats.exits += 1;
        Some(thread)
    }

    fn release(
        &mut self,
        thread: &mut ScriptThread,
    ) {
        let deps = thread.tracker.release();
        self.scope.unsubscribe_all(thread.id, &deps);
        thread.timer.cancel();
        self.notifications.retain(|n| *n != thread.id);
        // dropping the continuation unwinds the coroutine
        thread.continuation = None;
    }

    /// Kill a thread from outside the script
    pub fn kill_thread(
        &mut self,
        id: ThreadId,
    ) -> Result<(), RuntimeError> {
        let index = self.position(id).ok_or(RuntimeError::UnknownThread(id))?;
        self.remove_at(index);
        debug!("context `{}`: killed {}", self.name, id);
        Ok(())
    }

    /// Detach the solvers, kill every thread and release the scope
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        for solver in self.solvers.iter_mut() {
            solver.detach();
        }
        while !self.threads.is_empty() {
            self.remove_at(self.threads.len() - 1);
        }
        self.notifications.clear();
        self.scope.clear();
        debug!("context `{}` torn down", self.name);
    }

    #[inline]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for AnimationContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// All animation contexts, keyed by scope instance and name
pub struct ContextRegistry {
    evaluator: Arc<dyn Evaluator>,
    contexts: IndexMap<(ScopeId, Arc<str>), AnimationContext>,
}

impl fmt::Debug for ContextRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list()
            .entries(self.contexts.keys())
            .finish()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new(Arc::new(CoroutineEvaluator::default()))
    }
}

impl ContextRegistry {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            contexts: IndexMap::new(),
        }
    }

    pub fn with_config(config: &SchedulerConfig) -> Self {
        Self::new(Arc::new(CoroutineEvaluator::from_config(config)))
    }

    /// Find the context for `(scope, name)`, creating it from `script` if
    /// there is none
    pub fn lookup_or_create(
        &mut self,
        scope: ScopeId,
        name: &str,
        script: &Script,
    ) -> &mut AnimationContext {
        let evaluator = &self.evaluator;
        self.contexts
            .entry((scope, Arc::from(name)))
            .or_insert_with(|| {
                AnimationContext::new(scope, name, script.clone(), Arc::clone(evaluator))
            })
    }

    pub fn get(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Option<&AnimationContext> {
        self.contexts.get(&(scope, Arc::from(name)))
    }

    pub fn get_mut(
        &mut self,
        scope: ScopeId,
        name: &str,
    ) -> Option<&mut AnimationContext> {
        self.contexts.get_mut(&(scope, Arc::from(name)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Tear down and forget every context of a scope instance. Returns how
    /// many there were.
    pub fn teardown_scope(
        &mut self,
        scope: ScopeId,
    ) -> usize {
        let keys: Vec<_> = self
            .contexts
            .keys()
            .filter(|(s, _)| *s == scope)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(mut ctx) = self.contexts.shift_remove(key) {
                ctx.teardown();
            }
        }
        keys.len()
    }
}

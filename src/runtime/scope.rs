//! Script-scope instance
//!
//! The variables every thread of one animation context shares, together with
//! the subscriptions wait conditions place on them. Subscriptions are keyed
//! by name and live independently of the values, so a condition may watch a
//! variable that does not exist yet, and deleting a variable notifies its
//! watchers like any other change.

use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::runtime::scheduler::ThreadId;
use crate::runtime::value::Value;

/// Threads watching one variable
pub type Watchers = SmallVec<[ThreadId; 4]>;

/// Variables of one scope instance
#[derive(Debug, Default)]
pub struct Scope {
    /// Values in definition order
    values: IndexMap<Arc<str>, Value>,
    /// Change/delete subscriptions
    watchers: HashMap<Arc<str>, Watchers>,
}

/// Serializable copy of a scope's values
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ScopeSnapshot(pub IndexMap<Arc<str>, Value>);

impl Scope {
    /// Create an empty scope
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a variable
    #[inline]
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check whether a variable is defined
    #[inline]
    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.values.contains_key(name)
    }

    /// Assign a variable and return the threads to notify.
    ///
    /// Assigning the value a variable already holds is not a change.
    pub fn set(
        &mut self,
        name: &str,
        value: Value,
    ) -> Watchers {
        match self.values.get_mut(name) {
            Some(slot) if *slot == value => return Watchers::new(),
            Some(slot) => *slot = value,
            None => {
                self.values.insert(Arc::from(name), value);
            }
        }
        self.watchers(name).iter().copied().collect()
    }

    /// Delete a variable, returning its last value and the threads to notify
    pub fn remove(
        &mut self,
        name: &str,
    ) -> (Option<Value>, Watchers) {
        match self.values.shift_remove(name) {
            Some(old) => (Some(old), self.watchers(name).iter().copied().collect()),
            None => (None, Watchers::new()),
        }
    }

    /// Subscribe a thread to a variable. Returns false if it already was.
    pub fn subscribe(
        &mut self,
        name: &str,
        thread: ThreadId,
    ) -> bool {
        let list = self.watchers.entry_ref(name).or_default();
        if list.contains(&thread) {
            return false;
        }
        list.push(thread);
        true
    }

    /// Drop one subscription
    pub fn unsubscribe(
        &mut self,
        name: &str,
        thread: ThreadId,
    ) {
        if let Some(list) = self.watchers.get_mut(name) {
            list.retain(|t| *t != thread);
            if list.is_empty() {
                self.watchers.remove(name);
            }
        }
    }

    /// Drop every listed subscription of a thread
    pub fn unsubscribe_all<'n>(
        &mut self,
        thread: ThreadId,
        names: impl IntoIterator<Item = &'n Arc<str>>,
    ) {
        for name in names {
            self.unsubscribe(name, thread);
        }
    }

    /// Threads watching a variable
    #[inline]
    pub fn watchers(
        &self,
        name: &str,
    ) -> &[ThreadId] {
        self.watchers.get(name).map(|w| w.as_slice()).unwrap_or(&[])
    }

    /// Total number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.watchers.values().map(|w| w.len()).sum()
    }

    /// Number of defined variables
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no variable is defined
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy all values out
    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot(self.values.clone())
    }

    /// Release everything
    pub fn clear(&mut self) {
        self.values.clear();
        self.watchers.clear();
    }
}

use std::cell::RefCell;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::rc::Rc;

use rustc_hash::{FxHashSet, FxHasher};

type FxSet<K> = std::collections::HashSet<K, BuildHasherDefault<FxHasher>>;

/// A pending path-observer attachment. `try_install` attempts to resolve
/// and wire up a [`crate::chain_observer::ChainObserver`] given an optional
/// candidate root (the object whose `flush` triggered this attempt);
/// returns `true` once installed, after which the entry is dropped from
/// the queue. Boxing the attempt as a closure keeps this module free of a
/// direct dependency on the chain-observer graph-node types.
struct PendingObserver {
    dedup_key: (String, usize, String),
    try_install: Box<dyn Fn(Option<usize>) -> bool>,
}

impl fmt::Debug for PendingObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingObserver{:?}", self.dedup_key)
    }
}

/// The process-wide (or, in this port, context-scoped) pending-observer
/// queue and suspension counter from spec §4.D. The source's global
/// singleton becomes an explicit `ObservationContext` value per the design
/// notes §9 recommendation; [`with_default_context`] gives back the
/// ergonomics of a true global via a thread-local default instance.
pub struct ObservationContext {
    inner: RefCell<Inner>,
}

struct Inner {
    pending: Vec<PendingObserver>,
    dedup: FxSet<(String, usize, String)>,
    objects_with_pending_changes: FxSet<usize>,
    suspend_count: u32,
}

impl Default for ObservationContext {
    fn default() -> Self {
        ObservationContext {
            inner: RefCell::new(Inner {
                pending: Vec::new(),
                dedup: FxHashSet::default(),
                objects_with_pending_changes: FxHashSet::default(),
                suspend_count: 0,
            }),
        }
    }
}

impl ObservationContext {
    pub fn new() -> Self {
        ObservationContext::default()
    }

    /// Registers a path observer. `path`/`target_id`/`method` form the
    /// dedup tuple (spec §4.D invariant: installed at most once per
    /// `(path, target, method, root)`). If `try_install` resolves
    /// immediately against no candidate root, the entry is never enqueued.
    pub fn add_observer<F>(&self, path: &str, target_id: usize, method: &str, try_install: F)
    where
        F: Fn(Option<usize>) -> bool + 'static,
    {
        let key = (path.to_string(), target_id, method.to_string());
        let mut inner = self.inner.borrow_mut();
        if inner.dedup.contains(&key) {
            return;
        }
        if try_install(None) {
            return;
        }
        inner.dedup.insert(key.clone());
        inner.pending.push(PendingObserver {
            dedup_key: key,
            try_install: Box::new(try_install),
        });
    }

    /// Attempts to resolve every still-pending entry using `candidate_root`
    /// as a root match. Idempotent; safe to call often (spec §4.D).
    pub fn flush(&self, candidate_root: usize) {
        let mut inner = self.inner.borrow_mut();
        let mut remaining = Vec::with_capacity(inner.pending.len());
        for entry in inner.pending.drain(..) {
            if (entry.try_install)(Some(candidate_root)) {
                inner.dedup.remove(&entry.dedup_key);
            } else {
                remaining.push(entry);
            }
        }
        inner.pending = remaining;
    }

    pub fn is_observing_suspended(&self) -> bool {
        self.inner.borrow().suspend_count > 0
    }

    pub fn suspend(&self) {
        self.inner.borrow_mut().suspend_count += 1;
    }

    /// Decrements the suspension counter; if it reaches zero, returns the
    /// set of object identities that accumulated pending changes while
    /// suspended so the caller can nudge their typed `flush_changes`
    /// (the queue itself has no typed handle to arbitrary observable
    /// objects).
    pub fn resume(&self) -> Vec<usize> {
        let mut inner = self.inner.borrow_mut();
        inner.suspend_count = inner.suspend_count.saturating_sub(1);
        if inner.suspend_count == 0 {
            inner.objects_with_pending_changes.drain().collect()
        } else {
            Vec::new()
        }
    }

    pub fn object_has_pending_changes(&self, object_id: usize) {
        self.inner.borrow_mut().objects_with_pending_changes.insert(object_id);
    }
}

thread_local! {
    static DEFAULT_CONTEXT: Rc<ObservationContext> = Rc::new(ObservationContext::new());
}

/// Runs `f` with the thread-local default [`ObservationContext`], so
/// callers that don't need multiple independent observation graphs can
/// skip threading one through explicitly.
pub fn with_default_context<R>(f: impl FnOnce(&ObservationContext) -> R) -> R {
    DEFAULT_CONTEXT.with(|ctx| f(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn pending_entry_is_removed_once_installed() {
        let ctx = ObservationContext::new();
        let installed = Rc::new(Cell::new(false));
        {
            let installed = installed.clone();
            ctx.add_observer("a.b", 1, "onChange", move |root| {
                if root == Some(42) {
                    installed.set(true);
                    true
                } else {
                    false
                }
            });
        }
        assert!(!installed.get());
        ctx.flush(7);
        assert!(!installed.get());
        ctx.flush(42);
        assert!(installed.get());
        assert_eq!(ctx.inner.borrow().pending.len(), 0);
    }

    #[test]
    fn dedups_by_tuple() {
        let ctx = ObservationContext::new();
        let calls = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            ctx.add_observer("a.b", 1, "onChange", move |_| {
                calls.set(calls.get() + 1);
                false
            });
        }
        assert_eq!(ctx.inner.borrow().pending.len(), 1);
    }

    #[test]
    fn suspension_counter_gates_resume_drain() {
        let ctx = ObservationContext::new();
        ctx.suspend();
        ctx.suspend();
        ctx.object_has_pending_changes(1);
        assert!(ctx.resume().is_empty());
        let drained = ctx.resume();
        assert_eq!(drained, vec![1]);
    }
}

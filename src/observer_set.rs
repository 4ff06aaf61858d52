use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::revision::Revision;

type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// A token identifying the caller-supplied `context` an observer was
/// registered with. Opaque; compared only for equality.
pub type ContextToken = u64;

/// Receiving end of an observer registration. Implementors are whatever a
/// statically-typed port uses in place of "an object with a named method" —
/// the capability union design notes §9 describes.
pub trait ObserverTarget {
    /// Invoked once per (key, revision) notification. `source` is the
    /// observable object that changed; `context` mirrors whatever token the
    /// observer was registered with, if any.
    fn notify(&self, source: &dyn Any, key: &str, revision: Revision, context: Option<ContextToken>);
}

impl fmt::Debug for dyn ObserverTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObserverTarget@{:p}", self)
    }
}

fn target_identity(target: &Arc<dyn ObserverTarget>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

struct Entry {
    target: Arc<dyn ObserverTarget>,
    context: Option<ContextToken>,
    last_notified_revision: Rc<Cell<Revision>>,
}

/// A snapshot member returned by [`ObserverSet::get_members`]. `revision`
/// shares storage with the live entry it was snapshotted from, so marking
/// it notified during fan-out is visible to any later snapshot of the same
/// live entry within the same revision — but each fan-out pass takes its
/// own fresh snapshot Vec, so removing an entry mid-pass never invalidates
/// an in-flight iteration (spec §9 open question: observer removal during
/// fan-out).
#[derive(Clone)]
pub struct ObserverMember {
    pub target: Arc<dyn ObserverTarget>,
    pub method: Arc<str>,
    pub context: Option<ContextToken>,
    revision: Rc<Cell<Revision>>,
}

impl ObserverMember {
    pub fn last_notified_revision(&self) -> Revision {
        self.revision.get()
    }

    pub fn mark_notified(&self, revision: Revision) {
        self.revision.set(revision);
    }
}

/// A small multiset of `(target, method, context)` triples keyed by
/// identity. At most one entry exists per `(target, method)` pair; adding
/// an already-present pair overwrites its context (last writer wins, spec
/// invariant 1).
#[derive(Default)]
pub struct ObserverSet {
    by_target: FxIndexMap<usize, FxIndexMap<Arc<str>, Entry>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        ObserverSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.values().all(|methods| methods.is_empty())
    }

    pub fn add(&mut self, target: Arc<dyn ObserverTarget>, method: Arc<str>, context: Option<ContextToken>) {
        let id = target_identity(&target);
        let methods = self.by_target.entry(id).or_insert_with(FxIndexMap::default);
        match methods.get_mut(&method) {
            Some(entry) => {
                entry.context = context;
            }
            None => {
                methods.insert(
                    method,
                    Entry {
                        target,
                        context,
                        last_notified_revision: Rc::new(Cell::new(Revision::default())),
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, target: &Arc<dyn ObserverTarget>, method: &str) {
        let id = target_identity(target);
        if let Some(methods) = self.by_target.get_mut(&id) {
            methods.shift_remove(method);
            if methods.is_empty() {
                self.by_target.shift_remove(&id);
            }
        }
    }

    /// Returns a stable snapshot, in registration order, so callers may
    /// safely mutate the live set while iterating the result.
    pub fn get_members(&self) -> Vec<ObserverMember> {
        let mut out = Vec::new();
        for methods in self.by_target.values() {
            for (method, entry) in methods.iter() {
                out.push(ObserverMember {
                    target: entry.target.clone(),
                    method: method.clone(),
                    context: entry.context,
                    revision: entry.last_notified_revision.clone(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        calls: RefCell<Vec<(String, Revision)>>,
    }

    impl ObserverTarget for Recorder {
        fn notify(&self, _source: &dyn Any, key: &str, revision: Revision, _context: Option<ContextToken>) {
            self.calls.borrow_mut().push((key.to_string(), revision));
        }
    }

    #[test]
    fn add_is_idempotent_on_pair_but_overwrites_context() {
        let mut set = ObserverSet::new();
        let target: Arc<dyn ObserverTarget> = Arc::new(Recorder { calls: RefCell::new(vec![]) });
        set.add(target.clone(), Arc::from("onChange"), Some(1));
        set.add(target.clone(), Arc::from("onChange"), Some(2));
        let members = set.get_members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].context, Some(2));
    }

    #[test]
    fn remove_drops_entry_and_empty_target_bucket() {
        let mut set = ObserverSet::new();
        let target: Arc<dyn ObserverTarget> = Arc::new(Recorder { calls: RefCell::new(vec![]) });
        set.add(target.clone(), Arc::from("onChange"), None);
        assert!(!set.is_empty());
        set.remove(&target, "onChange");
        assert!(set.is_empty());
    }

    #[test]
    fn last_notified_revision_shares_storage_across_snapshots() {
        let mut set = ObserverSet::new();
        let target: Arc<dyn ObserverTarget> = Arc::new(Recorder { calls: RefCell::new(vec![]) });
        set.add(target, Arc::from("onChange"), None);
        let first = set.get_members();
        first[0].mark_notified(Revision::default().next());
        let second = set.get_members();
        assert_eq!(second[0].last_notified_revision(), first[0].last_notified_revision());
    }
}

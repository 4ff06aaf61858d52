use std::any::Any;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use log::trace;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use smallvec::SmallVec;

use crate::descriptor::PropertyDescriptor;
use crate::observer_queue::ObservationContext;
use crate::observer_set::{ContextToken, ObserverSet, ObserverTarget};
use crate::revision::{AtomicRevision, Revision};
use crate::value::PropertyValue;

type FxMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Per-object KVO state. Allocated lazily the first time observation is
/// used on an object (mirrors the source's `initObservable` pass); there is
/// no prototype to share it with in a Rust port, so the copy-on-first-write
/// bookkeeping the source needs (`_kvo_for`) has no counterpart here — state
/// is simply owned per instance from the start.
pub struct ObservableState {
    revision: AtomicRevision,
    change_level: u32,
    changes: Vec<Arc<str>>,
    cache: FxMap<Arc<str>, PropertyValue>,
    cache_dep: FxMap<Arc<str>, Vec<Arc<str>>>,
    dependents: FxMap<Arc<str>, Vec<Arc<str>>>,
    last_set_values: FxMap<Arc<str>, PropertyValue>,
    observers: FxMap<Arc<str>, ObserverSet>,
    local_observers: FxMap<Arc<str>, SmallVec<[Arc<str>; 2]>>,
    observed_keys: FxHashSet<Arc<str>>,
    /// Last revision at which `key`'s local (string-named) observers ran,
    /// mirroring the per-member `lastNotifiedRevision` slot the per-key
    /// `ObserverSet` already carries — without it a key queued twice in one
    /// coalesced batch fires its local observers once per duplicate instead
    /// of once per revision.
    local_observer_revision: FxMap<Arc<str>, Revision>,
}

impl Default for ObservableState {
    fn default() -> Self {
        ObservableState {
            revision: AtomicRevision::start(),
            change_level: 0,
            changes: Vec::new(),
            cache: FxHashMap::default(),
            cache_dep: FxHashMap::default(),
            dependents: FxHashMap::default(),
            last_set_values: FxHashMap::default(),
            observers: FxHashMap::default(),
            local_observers: FxHashMap::default(),
            observed_keys: FxHashSet::default(),
            local_observer_revision: FxHashMap::default(),
        }
    }
}

impl ObservableState {
    pub fn revision(&self) -> Revision {
        self.revision.load()
    }
}

/// The capability a dynamically-typed observable target exposes: storage
/// for plain property values, the descriptor protocol for computed
/// properties, and the lazily-allocated KVO bookkeeping state.
pub trait KvoObject: Any {
    fn kvo_state(&self) -> &ObservableState;
    fn kvo_state_mut(&mut self) -> &mut ObservableState;

    /// Reads a plain (non-computed) stored property. Returns
    /// `PropertyValue::Undefined` if never set.
    fn raw_get(&self, key: &str) -> PropertyValue;

    /// Writes a plain (non-computed) stored property.
    fn raw_set(&mut self, key: &str, value: PropertyValue);

    /// Looks up the computed-property descriptor for `key`, if any.
    fn descriptor(&self, _key: &str) -> Option<PropertyDescriptor> {
        None
    }

    /// Delegate hook invoked when `get` finds no stored value and no
    /// descriptor for `key`. Default returns `Undefined` (spec §4.B
    /// supplement).
    fn unknown_property(&self, _key: &str) -> PropertyValue {
        PropertyValue::Undefined
    }

    /// Default true; returning false suppresses the automatic
    /// `propertyWillChange`/`propertyDidChange` bracket around `set`.
    fn automatically_notifies_observers_for(&self, _key: &str) -> bool {
        true
    }

    /// Resolves a local observer method name against `self` and invokes it.
    /// Default no-op; concrete types override this to dispatch to their own
    /// methods by name.
    fn invoke_local_observer(&mut self, _method: &str, _key: &str, _revision: Revision) {}

    /// Optional `propertyObserver(self, key, revision)` hook fired after
    /// every other observer in a pass.
    fn property_observer(&mut self, _key: &str, _revision: Revision) {}
}

/// Computes (and memoizes under `cache_dep[dep]`) the transitive closure of
/// *cacheable* descriptors reachable from `dep` through `dependents`, using
/// a seen-set to tolerate user-declared cycles (spec §4.B, §9).
fn cacheable_dependents_of<T: KvoObject>(obj: &mut T, dep: &str) -> Vec<Arc<str>> {
    if let Some(memo) = obj.kvo_state().cache_dep.get(dep) {
        return memo.clone();
    }
    let mut seen: FxHashSet<Arc<str>> = FxHashSet::default();
    let mut out = Vec::new();
    let mut frontier: Vec<Arc<str>> = vec![Arc::from(dep)];
    while let Some(k) = frontier.pop() {
        let direct = obj.kvo_state().dependents.get(&*k).cloned().unwrap_or_default();
        for candidate in direct {
            if !seen.insert(candidate.clone()) {
                continue;
            }
            if let Some(desc) = obj.descriptor(&candidate) {
                if desc.cacheable {
                    out.push(candidate.clone());
                }
            }
            frontier.push(candidate);
        }
    }
    obj.kvo_state_mut().cache_dep.insert(Arc::from(dep), out.clone());
    out
}

fn invalidate_dependents<T: KvoObject>(obj: &mut T, dep: &str) {
    let descriptors = cacheable_dependents_of(obj, dep);
    for key in &descriptors {
        if let Some(desc) = obj.descriptor(key) {
            obj.kvo_state_mut().cache.remove(&desc.cache_key);
        }
    }
}

/// Blanket extension trait implementing the KVO contract (spec §4.B) over
/// any [`KvoObject`]. Mirrors the source's `Em.Observable` mixin: every
/// method here is a thin, derived operation layered on `get`/`set`/
/// `propertyDidChange`.
pub trait Observable: KvoObject + Sized {
    fn get(&mut self, key: &str) -> PropertyValue {
        trace!("get {}", key);
        if let Some(desc) = self.descriptor(key) {
            if desc.cacheable {
                if let Some(v) = self.kvo_state().cache.get(&desc.cache_key) {
                    return v.clone();
                }
            }
            let value = desc.invoke(key, None);
            if desc.cacheable {
                self.kvo_state_mut().cache.insert(desc.cache_key.clone(), value.clone());
            }
            return value;
        }
        let value = self.raw_get(key);
        if value.is_undefined() {
            self.unknown_property(key)
        } else {
            value
        }
    }

    fn set(&mut self, ctx: &ObservationContext, key: &str, value: PropertyValue) -> &mut Self {
        trace!("set {}", key);
        invalidate_dependents(self, key);
        if let Some(desc) = self.descriptor(key) {
            let unchanged = !desc.volatile
                && self.kvo_state().last_set_values.get(&desc.last_set_key) == Some(&value);
            if !unchanged {
                let notifies = self.automatically_notifies_observers_for(key);
                if notifies {
                    self.property_will_change(key);
                }
                let ret = desc.invoke(key, Some(&value));
                self.kvo_state_mut()
                    .last_set_values
                    .insert(desc.last_set_key.clone(), value.clone());
                if desc.cacheable {
                    self.kvo_state_mut().cache.insert(desc.cache_key.clone(), ret.clone());
                }
                if notifies {
                    self.property_did_change(ctx, key, Some(ret), true);
                }
            }
            return self;
        }
        let old = self.raw_get(key);
        if old != value {
            let notifies = self.automatically_notifies_observers_for(key);
            if notifies {
                self.property_will_change(key);
            }
            self.raw_set(key, value.clone());
            if notifies {
                self.property_did_change(ctx, key, Some(value), false);
            }
        }
        self
    }

    fn set_if_changed(&mut self, ctx: &ObservationContext, key: &str, value: PropertyValue) -> &mut Self {
        if self.get(key) == value {
            return self;
        }
        self.set(ctx, key, value)
    }

    fn property_will_change(&mut self, _key: &str) -> &mut Self {
        self
    }

    fn property_did_change(
        &mut self,
        ctx: &ObservationContext,
        key: &str,
        _value: Option<PropertyValue>,
        keep_cache: bool,
    ) -> &mut Self {
        let revision = self.kvo_state_mut().revision.increment();
        if !keep_cache {
            if let Some(desc) = self.descriptor(key) {
                self.kvo_state_mut().cache.remove(&desc.cache_key);
            }
        }
        invalidate_dependents(self, key);

        let suspended = ctx.is_observing_suspended();
        let change_level = self.kvo_state().change_level;
        if change_level > 0 || suspended {
            let state = self.kvo_state_mut();
            if !state.changes.iter().any(|k| &**k == key) {
                state.changes.push(Arc::from(key));
            }
            if suspended {
                ctx.object_has_pending_changes(self.kvo_object_identity());
            }
        } else {
            self.notify_property_observers(ctx, key, revision);
        }
        self
    }

    fn begin_property_changes(&mut self) -> &mut Self {
        self.kvo_state_mut().change_level += 1;
        self
    }

    fn end_property_changes(&mut self, ctx: &ObservationContext) -> &mut Self {
        let level = {
            let state = self.kvo_state_mut();
            state.change_level = state.change_level.saturating_sub(1);
            state.change_level
        };
        if level == 0 && !ctx.is_observing_suspended() && !self.kvo_state().changes.is_empty() {
            let revision = self.kvo_state().revision();
            self.flush_changes(ctx, revision);
        }
        self
    }

    fn flush_changes(&mut self, ctx: &ObservationContext, revision: Revision) {
        loop {
            let pending = std::mem::take(&mut self.kvo_state_mut().changes);
            if pending.is_empty() {
                break;
            }
            let mut stack = pending;
            while let Some(key) = stack.pop() {
                self.notify_property_observers(ctx, &key, revision);
            }
        }
    }

    fn add_observer(
        &mut self,
        key: &str,
        target: Arc<dyn ObserverTarget>,
        method: Arc<str>,
        context: Option<ContextToken>,
    ) -> &mut Self {
        let state = self.kvo_state_mut();
        state
            .observers
            .entry(Arc::from(key))
            .or_insert_with(ObserverSet::new)
            .add(target, method, context);
        state.observed_keys.insert(Arc::from(key));
        self
    }

    fn remove_observer(&mut self, key: &str, target: &Arc<dyn ObserverTarget>, method: &str) -> &mut Self {
        let state = self.kvo_state_mut();
        if let Some(set) = state.observers.get_mut(key) {
            set.remove(target, method);
            if set.is_empty() {
                state.observers.remove(key);
                state.observed_keys.remove(key);
            }
        }
        self
    }

    fn add_local_observer(&mut self, key: &str, method_name: &str) -> &mut Self {
        let state = self.kvo_state_mut();
        state
            .local_observers
            .entry(Arc::from(key))
            .or_insert_with(SmallVec::new)
            .push(Arc::from(method_name));
        state.observed_keys.insert(Arc::from(key));
        self
    }

    fn has_observer_for(&mut self, ctx: &ObservationContext, key: &str) -> bool {
        ctx.flush(self.kvo_object_identity());
        let state = self.kvo_state();
        state
            .observers
            .get(key)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
            || state.local_observers.get(key).map(|v| !v.is_empty()).unwrap_or(false)
    }

    fn notify_property_change(&mut self, ctx: &ObservationContext, key: &str, value: PropertyValue) -> &mut Self {
        self.property_did_change(ctx, key, Some(value), false)
    }

    fn all_properties_did_change(&mut self, ctx: &ObservationContext) -> &mut Self {
        self.property_did_change(ctx, "*", None, false)
    }

    fn register_dependent_key<I, S>(&mut self, key: &str, deps: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let state = self.kvo_state_mut();
        for dep in deps {
            state
                .dependents
                .entry(Arc::from(dep.as_ref()))
                .or_insert_with(Vec::new)
                .push(Arc::from(key));
        }
        state.cache_dep.clear();
        self
    }

    fn get_each<'a, I>(&mut self, keys: I) -> Vec<PropertyValue>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter().map(|k| self.get(k)).collect()
    }

    fn increment_property(&mut self, ctx: &ObservationContext, key: &str) -> &mut Self {
        let current = self.get(key).as_number().unwrap_or(0.0);
        self.set(ctx, key, PropertyValue::Number(current + 1.0))
    }

    fn decrement_property(&mut self, ctx: &ObservationContext, key: &str) -> &mut Self {
        let current = self.get(key).as_number().unwrap_or(0.0);
        self.set(ctx, key, PropertyValue::Number(current - 1.0))
    }

    fn toggle_property(
        &mut self,
        ctx: &ObservationContext,
        key: &str,
        true_value: PropertyValue,
        false_value: PropertyValue,
    ) -> &mut Self {
        let current = self.get(key);
        let next = if current == true_value { false_value } else { true_value };
        self.set(ctx, key, next)
    }

    /// Identity used by the [`ObserverQueue`](crate::observer_queue) to
    /// track pending-changes bookkeeping per object. Defaults to the
    /// object's own address.
    fn kvo_object_identity(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// The notification routine (`_notifyPropertyObservers`). Preserves the
    /// eight invariants spec §4.B lists.
    fn notify_property_observers(&mut self, ctx: &ObservationContext, driving_key: &str, revision: Revision) {
        ctx.flush(self.kvo_object_identity());
        self.kvo_state_mut().change_level += 1;

        let mut pending: Vec<Arc<str>> = vec![Arc::from(driving_key)];
        if driving_key == "*" {
            let all: Vec<Arc<str>> = self.kvo_state().observed_keys.iter().cloned().collect();
            pending.extend(all);
        }

        // Expand with dependent keys until the set stops growing, clearing
        // cacheable descriptor caches as each dependent is discovered
        // (invariant 4: expansion completes before any observer fires).
        let mut seen: FxHashSet<Arc<str>> = pending.iter().cloned().collect();
        let mut cursor = 0;
        while cursor < pending.len() {
            let k = pending[cursor].clone();
            cursor += 1;
            let deps = cacheable_dependents_of(self, &k);
            for d in deps {
                if seen.insert(d.clone()) {
                    if let Some(desc) = self.descriptor(&d) {
                        self.kvo_state_mut().cache.remove(&desc.cache_key);
                    }
                    pending.push(d);
                }
            }
        }

        loop {
            while let Some(key) = pending.pop() {
                self.notify_observers_for_key(ctx, &key, driving_key, revision);
            }
            let refilled = std::mem::take(&mut self.kvo_state_mut().changes);
            if refilled.is_empty() {
                break;
            }
            pending = refilled;
        }

        let state = self.kvo_state_mut();
        state.change_level = state.change_level.saturating_sub(1);
    }

    fn notify_observers_for_key(&mut self, ctx: &ObservationContext, key: &str, driving_key: &str, revision: Revision) {
        let members = self
            .kvo_state()
            .observers
            .get(key)
            .map(|s| s.get_members())
            .unwrap_or_default();
        for member in &members {
            if member.last_notified_revision() != revision {
                member.mark_notified(revision);
                member.target.notify(self.as_any(), key, revision, member.context);
            }
        }

        let already_notified_locally = self.kvo_state().local_observer_revision.get(key) == Some(&revision);
        if !already_notified_locally {
            let local: SmallVec<[Arc<str>; 2]> = self
                .kvo_state()
                .local_observers
                .get(key)
                .cloned()
                .unwrap_or_default();
            self.kvo_state_mut().local_observer_revision.insert(Arc::from(key), revision);
            for method in local {
                self.invoke_local_observer(&method, key, revision);
            }
        }

        if key != "*" {
            let star_members = self
                .kvo_state()
                .observers
                .get("*")
                .map(|s| s.get_members())
                .unwrap_or_default();
            for member in &star_members {
                if member.last_notified_revision() != revision {
                    member.mark_notified(revision);
                    member.target.notify(self.as_any(), key, revision, member.context);
                }
            }
        }

        let _ = driving_key;
        self.property_observer(key, revision);
    }

    fn as_any(&self) -> &dyn Any
    where
        Self: 'static,
    {
        self
    }
}

impl<T: KvoObject + Sized> Observable for T {}

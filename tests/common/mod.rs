//! Shared fixtures for the cross-component scenario tests (spec §8). Not a
//! test module itself — included via `mod common;` from each scenario file.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use hub_core::{
    ContextToken, GraphNode, KvoObject, ObservableState, ObserverTarget, PropertyDescriptor,
    PropertyValue, Revision,
};
use rustc_hash::FxHashMap;

/// Turns on env_logger's test-capture output; safe to call from every test,
/// only the first call actually installs a logger.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A plain dynamically-keyed observable node: the harness stand-in for
/// "any object exposing get/set/addObserver" (spec §9's capability union).
/// Used directly for the KVO scenarios and, via [`GraphNode`], for the
/// chain-observer scenarios.
pub struct Node {
    pub state: ObservableState,
    /// Boxed separately from `Node` itself (rather than inline) so a
    /// computed-property descriptor can close over a clone of this handle
    /// and read the node's plain fields without re-entering the `RefCell`
    /// that wraps the whole `Node` — descriptors are invoked without a
    /// `self` reference (spec §6), so they must own whatever state they
    /// read, and that state cannot be the same `RefCell` a caller is
    /// already holding borrowed while invoking `get`/`set`.
    fields: Rc<RefCell<FxHashMap<Arc<str>, PropertyValue>>>,
    descriptors: FxHashMap<Arc<str>, PropertyDescriptor>,
}

impl Node {
    pub fn new() -> Rc<RefCell<Node>> {
        Rc::new(RefCell::new(Node {
            state: ObservableState::default(),
            fields: Rc::new(RefCell::new(FxHashMap::default())),
            descriptors: FxHashMap::default(),
        }))
    }

    /// Registers a computed-property descriptor for `key`, overriding
    /// whatever plain stored value it might otherwise have.
    pub fn define_computed(&mut self, key: &str, descriptor: PropertyDescriptor) {
        self.descriptors.insert(Arc::from(key), descriptor);
    }

    /// A clone of this node's field-storage handle, for descriptor
    /// closures to read independently of the owning `Node`'s own borrow.
    pub fn fields_handle(&self) -> Rc<RefCell<FxHashMap<Arc<str>, PropertyValue>>> {
        self.fields.clone()
    }
}

impl KvoObject for Node {
    fn kvo_state(&self) -> &ObservableState {
        &self.state
    }

    fn kvo_state_mut(&mut self) -> &mut ObservableState {
        &mut self.state
    }

    fn raw_get(&self, key: &str) -> PropertyValue {
        self.fields.borrow().get(key).cloned().unwrap_or(PropertyValue::Undefined)
    }

    fn raw_set(&mut self, key: &str, value: PropertyValue) {
        self.fields.borrow_mut().insert(Arc::from(key), value);
    }

    fn descriptor(&self, key: &str) -> Option<PropertyDescriptor> {
        self.descriptors.get(key).cloned()
    }
}

impl GraphNode for Node {
    fn node_get(&mut self, key: &str) -> PropertyValue {
        use hub_core::Observable;
        self.get(key)
    }

    fn node_add_observer(
        &mut self,
        key: &str,
        target: Arc<dyn ObserverTarget>,
        method: Arc<str>,
        context: Option<ContextToken>,
    ) {
        use hub_core::Observable;
        self.add_observer(key, target, method, context);
    }

    fn node_remove_observer(&mut self, key: &str, target: &Arc<dyn ObserverTarget>, method: &str) {
        use hub_core::Observable;
        self.remove_observer(key, target, method);
    }

    fn resolve_child(&mut self, key: &str) -> Option<Rc<RefCell<dyn GraphNode>>> {
        match self.raw_get(key) {
            PropertyValue::Object(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Records the [`PropertyValue`] read off `source` (downcast back to
/// [`Node`]) for the notified key, for plain per-key observer scenarios
/// (S2, S6).
pub struct ValueRecorder {
    pub calls: RefCell<Vec<PropertyValue>>,
}

impl ValueRecorder {
    pub fn new() -> Arc<ValueRecorder> {
        Arc::new(ValueRecorder { calls: RefCell::new(Vec::new()) })
    }
}

impl ObserverTarget for ValueRecorder {
    fn notify(&self, source: &dyn Any, key: &str, _revision: Revision, _context: Option<ContextToken>) {
        if let Some(node) = source.downcast_ref::<Node>() {
            self.calls.borrow_mut().push(node.raw_get(key));
        } else {
            let _ = key;
        }
    }
}

/// Records each terminal value handed to the master of a chained-path
/// observer (the `source` a [`hub_core::ChainObserver`] notifies with is
/// the terminal `PropertyValue` itself, not the owning node).
pub struct ChainRecorder {
    pub calls: RefCell<Vec<PropertyValue>>,
    pub call_count: Cell<u32>,
}

impl ChainRecorder {
    pub fn new() -> Arc<ChainRecorder> {
        Arc::new(ChainRecorder { calls: RefCell::new(Vec::new()), call_count: Cell::new(0) })
    }
}

impl ObserverTarget for ChainRecorder {
    fn notify(&self, source: &dyn Any, _key: &str, _revision: Revision, _context: Option<ContextToken>) {
        self.call_count.set(self.call_count.get() + 1);
        if let Some(v) = source.downcast_ref::<PropertyValue>() {
            self.calls.borrow_mut().push(v.clone());
        }
    }
}

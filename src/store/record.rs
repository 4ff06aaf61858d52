use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::chain_observer::GraphNode;
use crate::descriptor::PropertyDescriptor;
use crate::observable::{KvoObject, Observable, ObservableState};
use crate::observer_set::{ContextToken, ObserverTarget};
use crate::value::PropertyValue;

use super::{empty_data_hash, DataStore, Status, StoreKey};

/// A per-attribute coercion pair, applied when a record attribute is read
/// from or written to its underlying data hash (spec §1: "the
/// per-module type coercion helpers", kept here as the one piece of that
/// mechanical surface the commit/read path actually depends on).
#[derive(Clone)]
pub struct RecordAttribute {
    to_type: Arc<dyn Fn(&PropertyValue) -> PropertyValue>,
    from_type: Arc<dyn Fn(&PropertyValue) -> PropertyValue>,
}

impl RecordAttribute {
    pub fn new<ToFn, FromFn>(to_type: ToFn, from_type: FromFn) -> Self
    where
        ToFn: Fn(&PropertyValue) -> PropertyValue + 'static,
        FromFn: Fn(&PropertyValue) -> PropertyValue + 'static,
    {
        RecordAttribute {
            to_type: Arc::new(to_type),
            from_type: Arc::new(from_type),
        }
    }

    /// An attribute with no coercion: stored and read back unchanged.
    pub fn identity() -> Self {
        RecordAttribute::new(|v| v.clone(), |v| v.clone())
    }
}

/// A materialized record: a `StoreKey` plus the attribute coercion table
/// for its record type, backed by the owning store's data hash (spec
/// §4.E "Record materialization").
pub struct Record {
    store_key: StoreKey,
    store: Rc<dyn DataStore>,
    attributes: Rc<FxHashMap<Arc<str>, RecordAttribute>>,
    state: ObservableState,
}

impl Record {
    pub fn new(store_key: StoreKey, store: Rc<dyn DataStore>, attributes: Rc<FxHashMap<Arc<str>, RecordAttribute>>) -> Self {
        Record {
            store_key,
            store,
            attributes,
            state: ObservableState::default(),
        }
    }

    pub fn store_key(&self) -> StoreKey {
        self.store_key
    }
}

impl KvoObject for Record {
    fn kvo_state(&self) -> &ObservableState {
        &self.state
    }

    fn kvo_state_mut(&mut self) -> &mut ObservableState {
        &mut self.state
    }

    fn raw_get(&self, key: &str) -> PropertyValue {
        match self.store.read_data_hash(self.store_key) {
            Ok(hash) => {
                let raw = hash.get(key).cloned().unwrap_or(PropertyValue::Undefined);
                match self.attributes.get(key) {
                    Some(attr) => (attr.to_type)(&raw),
                    None => raw,
                }
            }
            Err(_) => PropertyValue::Undefined,
        }
    }

    fn raw_set(&mut self, key: &str, value: PropertyValue) {
        let hash = self
            .store
            .read_editable_data_hash(self.store_key)
            .unwrap_or_else(|_| empty_data_hash());
        let mut map = (*hash).clone();
        let coerced = match self.attributes.get(key) {
            Some(attr) => (attr.from_type)(&value),
            None => value,
        };
        map.insert(Arc::from(key), coerced);

        let current_status = self.store.read_status(self.store_key);
        let next_status = if current_status == Status::READY_NEW {
            Status::READY_NEW
        } else {
            Status::READY_DIRTY
        };
        let _ = self.store.write_data_hash(self.store_key, Rc::new(map), Some(next_status));
    }

    fn descriptor(&self, _key: &str) -> Option<PropertyDescriptor> {
        None
    }
}

impl GraphNode for Record {
    fn node_get(&mut self, key: &str) -> PropertyValue {
        self.get(key)
    }

    fn node_add_observer(
        &mut self,
        key: &str,
        target: Arc<dyn ObserverTarget>,
        method: Arc<str>,
        context: Option<ContextToken>,
    ) {
        self.add_observer(key, target, method, context);
    }

    fn node_remove_observer(&mut self, key: &str, target: &Arc<dyn ObserverTarget>, method: &str) {
        self.remove_observer(key, target, method);
    }

    fn resolve_child(&mut self, _key: &str) -> Option<Rc<RefCell<dyn GraphNode>>> {
        // Records reference each other through `StoreKey`s coerced by a
        // `RecordAttribute`, not through live object handles, so a record's
        // own attributes never chain directly into another record. Chained
        // observation across records goes through a `RecordCache` lookup
        // at the call site instead.
        None
    }
}

/// Resolves record types by name and caches one [`Record`] per `StoreKey`
/// (spec §4.E `find`). Owned as a field by each [`Store`](super::Store) and
/// [`EditingContext`](super::EditingContext) — the store/context itself is
/// passed into [`RecordCache::find`] rather than held here, since it isn't
/// available as an `Rc` yet at the point a `Store`/`EditingContext` first
/// constructs its own cache.
#[derive(Default)]
pub struct RecordCache {
    attributes_by_type: RefCell<FxHashMap<Arc<str>, Rc<FxHashMap<Arc<str>, RecordAttribute>>>>,
    records: RefCell<FxHashMap<StoreKey, Rc<RefCell<Record>>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        RecordCache::default()
    }

    pub fn register_type(&self, type_name: &str, attributes: FxHashMap<Arc<str>, RecordAttribute>) {
        self.attributes_by_type.borrow_mut().insert(Arc::from(type_name), Rc::new(attributes));
    }

    pub fn find(&self, store: &Rc<dyn DataStore>, type_name: &str, id: &str) -> Rc<RefCell<Record>> {
        let sk = store.store_key_for(type_name, id);
        if let Some(existing) = self.records.borrow().get(&sk) {
            return existing.clone();
        }
        let attrs = self
            .attributes_by_type
            .borrow()
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| Rc::new(FxHashMap::default()));
        let record = Rc::new(RefCell::new(Record::new(sk, store.clone(), attrs)));
        self.records.borrow_mut().insert(sk, record.clone());
        record
    }

    pub fn find_by_store_key(&self, sk: StoreKey) -> Option<Rc<RefCell<Record>>> {
        self.records.borrow().get(&sk).cloned()
    }
}

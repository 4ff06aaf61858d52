use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::{HubResult, StoreStateViolation};

use super::editing_context::EditingContext;
use super::record::{Record, RecordAttribute, RecordCache};
use super::{empty_data_hash, DataHash, DataStore, EditState, Status, StoreKey};

struct Slot {
    data_hash: DataHash,
    status: Status,
    record_type: Option<Arc<str>>,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            data_hash: empty_data_hash(),
            status: Status::EMPTY,
            record_type: None,
        }
    }
}

pub(super) struct SharedArrays {
    slots: Vec<Slot>,
    ids_by_type: FxHashMap<Arc<str>, FxHashMap<Arc<str>, StoreKey>>,
}

impl SharedArrays {
    fn new() -> Self {
        SharedArrays {
            slots: Vec::new(),
            ids_by_type: FxHashMap::default(),
        }
    }

    fn allocate(&mut self, record_type: Option<Arc<str>>) -> StoreKey {
        let sk = StoreKey(self.slots.len() as u64);
        self.slots.push(Slot {
            record_type,
            ..Slot::default()
        });
        sk
    }

    fn slot(&self, sk: StoreKey) -> &Slot {
        &self.slots[sk.0 as usize]
    }

    fn slot_mut(&mut self, sk: StoreKey) -> &mut Slot {
        &mut self.slots[sk.0 as usize]
    }
}

/// The root store: owns the canonical `StoreKey` allocator, the
/// `(recordType, id) -> StoreKey` map, and the authoritative data hash for
/// every key not shadowed by a live [`EditingContext`].
pub struct Store {
    pub(super) shared: Rc<RefCell<SharedArrays>>,
    record_cache: RecordCache,
}

impl Store {
    pub fn new() -> Rc<Store> {
        Rc::new(Store {
            shared: Rc::new(RefCell::new(SharedArrays::new())),
            record_cache: RecordCache::new(),
        })
    }

    /// Registers the attribute coercion table for a record type name, so
    /// `find` can build records of that type (spec §4.E `find`).
    pub fn register_record_type(&self, type_name: &str, attributes: FxHashMap<Arc<str>, RecordAttribute>) {
        self.record_cache.register_type(type_name, attributes);
    }

    /// Resolves a cached [`Record`] for `(type_name, id)`, creating one if
    /// this is the first reference (spec §4.E "Record materialization").
    pub fn find(self: &Rc<Store>, type_name: &str, id: &str) -> Rc<RefCell<Record>> {
        let handle: Rc<dyn DataStore> = self.clone();
        self.record_cache.find(&handle, type_name, id)
    }

    /// Bulk-allocates `StoreKey`s for a batch of data hashes, without a
    /// per-record round trip through `find` (spec §4.E supplement).
    pub fn load_records(&self, record_type: &str, hashes: Vec<(Arc<str>, DataHash)>) -> Vec<StoreKey> {
        let mut shared = self.shared.borrow_mut();
        let rt: Arc<str> = Arc::from(record_type);
        let mut out = Vec::with_capacity(hashes.len());
        for (id, hash) in hashes {
            let sk = shared.allocate(Some(rt.clone()));
            {
                let slot = shared.slot_mut(sk);
                slot.data_hash = hash;
                slot.status = Status::READY_CLEAN;
            }
            shared.ids_by_type.entry(rt.clone()).or_default().insert(id, sk);
            out.push(sk);
        }
        out
    }

    /// Creates a child [`EditingContext`] whose `StoreKey`s all start
    /// `INHERITED` (spec §3 lifecycle).
    pub fn create_editing_context(self: &Rc<Store>) -> EditingContext {
        debug!("creating editing context over root store");
        EditingContext::new(self.shared.clone(), self.clone())
    }
}

impl DataStore for Store {
    fn read_data_hash(&self, sk: StoreKey) -> HubResult<DataHash> {
        let shared = self.shared.borrow();
        if sk.0 as usize >= shared.slots.len() {
            return Err(StoreStateViolation::EmptyStoreKey(sk).into());
        }
        let slot = shared.slot(sk);
        if slot.status.is_empty() {
            return Err(StoreStateViolation::EmptyStoreKey(sk).into());
        }
        Ok(slot.data_hash.clone())
    }

    fn read_editable_data_hash(&self, sk: StoreKey) -> HubResult<DataHash> {
        // The root store has no ancestor to copy from; it always already
        // owns its own hash, so this degrades to a plain read.
        self.read_data_hash(sk)
    }

    fn write_data_hash(&self, sk: StoreKey, hash: DataHash, status: Option<Status>) -> HubResult<()> {
        let mut shared = self.shared.borrow_mut();
        if sk.0 as usize >= shared.slots.len() {
            return Err(StoreStateViolation::EmptyStoreKey(sk).into());
        }
        let slot = shared.slot_mut(sk);
        slot.data_hash = hash;
        if let Some(s) = status {
            slot.status = s;
        }
        Ok(())
    }

    fn read_status(&self, sk: StoreKey) -> Status {
        self.shared
            .borrow()
            .slots
            .get(sk.0 as usize)
            .map(|s| s.status)
            .unwrap_or(Status::EMPTY)
    }

    fn write_status(&self, sk: StoreKey, status: Status) {
        if let Some(slot) = self.shared.borrow_mut().slots.get_mut(sk.0 as usize) {
            slot.status = status;
        }
    }

    fn store_key_edit_state(&self, _sk: StoreKey) -> EditState {
        // The root store owns every key it has allocated outright; there
        // is no ancestor for it to inherit from.
        EditState::Editable
    }

    fn store_key_for(&self, record_type: &str, id: &str) -> StoreKey {
        let mut shared = self.shared.borrow_mut();
        if let Some(sk) = shared.ids_by_type.get(record_type).and_then(|m| m.get(id)).copied() {
            return sk;
        }
        let rt: Arc<str> = Arc::from(record_type);
        let sk = shared.allocate(Some(rt.clone()));
        shared.ids_by_type.entry(rt).or_default().insert(Arc::from(id), sk);
        sk
    }

    fn store_keys(&self) -> Vec<StoreKey> {
        (0..self.shared.borrow().slots.len() as u64).map(StoreKey).collect()
    }

    fn record_type_of(&self, sk: StoreKey) -> Option<Arc<str>> {
        self.shared.borrow().slots.get(sk.0 as usize).and_then(|s| s.record_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyValue;
    use rustc_hash::FxHashMap;

    #[test]
    fn allocates_unique_store_keys() {
        let store = Store::new();
        let a = store.store_key_for("Person", "1");
        let b = store.store_key_for("Person", "2");
        let c = store.store_key_for("Person", "1");
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = Store::new();
        let sk = store.store_key_for("Person", "1");
        let mut hash = FxHashMap::default();
        hash.insert(Arc::from("name"), PropertyValue::from("Ada"));
        store.write_data_hash(sk, Rc::new(hash), Some(Status::READY_NEW)).unwrap();
        let read = store.read_data_hash(sk).unwrap();
        assert_eq!(read.get("name"), Some(&PropertyValue::from("Ada")));
        assert_eq!(store.read_status(sk), Status::READY_NEW);
    }

    #[test]
    fn empty_store_key_is_a_violation() {
        let store = Store::new();
        let sk = store.store_key_for("Person", "1");
        assert!(store.read_data_hash(sk).is_err());
    }
}

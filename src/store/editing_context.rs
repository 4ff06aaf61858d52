use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::HubResult;

use super::record::{Record, RecordAttribute, RecordCache};
use super::store_impl::SharedArrays;
use super::{empty_data_hash, DataHash, DataStore, EditState, Status, StoreKey};

struct Overlay {
    state: EditState,
    hash: Option<DataHash>,
    status: Option<Status>,
}

impl Overlay {
    fn inherited() -> Self {
        Overlay {
            state: EditState::Inherited,
            hash: None,
            status: None,
        }
    }
}

/// A store overlaying a parent store with copy-on-write semantics per
/// `StoreKey` (spec §4.E). The parent may itself be the root [`Store`]
/// (`super::Store`) or another `EditingContext`, arbitrarily nested.
pub struct EditingContext {
    pub(super) shared: Rc<RefCell<SharedArrays>>,
    parent: Rc<dyn DataStore>,
    overlay: RefCell<FxHashMap<StoreKey, Overlay>>,
    record_cache: RecordCache,
}

impl EditingContext {
    pub(super) fn new(shared: Rc<RefCell<SharedArrays>>, parent: Rc<dyn DataStore>) -> EditingContext {
        EditingContext {
            shared,
            parent,
            overlay: RefCell::new(FxHashMap::default()),
            record_cache: RecordCache::new(),
        }
    }

    pub fn create_editing_context(self: &Rc<EditingContext>) -> EditingContext {
        debug!("creating nested editing context");
        EditingContext::new(self.shared.clone(), self.clone())
    }

    /// Registers the attribute coercion table for a record type name, so
    /// `find` can build records of that type (spec §4.E `find`). Scoped to
    /// this context, matching the per-context `RecordCache`.
    pub fn register_record_type(&self, type_name: &str, attributes: FxHashMap<Arc<str>, RecordAttribute>) {
        self.record_cache.register_type(type_name, attributes);
    }

    /// Resolves a cached [`Record`] for `(type_name, id)` against this
    /// context's own view of the store, creating one if this is the first
    /// reference (spec §4.E "Record materialization").
    pub fn find(self: &Rc<EditingContext>, type_name: &str, id: &str) -> Rc<RefCell<Record>> {
        let handle: Rc<dyn DataStore> = self.clone();
        self.record_cache.find(&handle, type_name, id)
    }

    fn entry_state(&self, sk: StoreKey) -> EditState {
        self.overlay.borrow().get(&sk).map(|o| o.state).unwrap_or(EditState::Inherited)
    }

    /// Merges every `EDITABLE` overlay entry back into the parent,
    /// replacing its hash and status, then resets those entries to
    /// `INHERITED` (spec §4.E "Commit flow", `commitChanges`).
    pub fn commit_changes(&self) -> HubResult<()> {
        let editable: Vec<(StoreKey, DataHash, Option<Status>)> = {
            let overlay = self.overlay.borrow();
            overlay
                .iter()
                .filter(|(_, o)| matches!(o.state, EditState::Editable))
                .filter_map(|(sk, o)| o.hash.clone().map(|h| (*sk, h, o.status)))
                .collect()
        };
        for (sk, hash, status) in editable {
            self.parent.write_data_hash(sk, hash, status)?;
            self.overlay.borrow_mut().insert(sk, Overlay::inherited());
        }
        Ok(())
    }
}

impl DataStore for EditingContext {
    fn read_data_hash(&self, sk: StoreKey) -> HubResult<DataHash> {
        match self.entry_state(sk) {
            EditState::Inherited => {
                let hash = self.parent.read_data_hash(sk)?;
                self.overlay.borrow_mut().insert(
                    sk,
                    Overlay {
                        state: EditState::Locked,
                        hash: Some(hash.clone()),
                        status: None,
                    },
                );
                Ok(hash)
            }
            EditState::Locked => {
                // Still shared with the parent: keep reading through so a
                // later parent write stays visible until this context
                // actually becomes `Editable` (spec invariant 6, S4).
                self.parent.read_data_hash(sk)
            }
            EditState::Editable => {
                let overlay = self.overlay.borrow();
                Ok(overlay.get(&sk).and_then(|o| o.hash.clone()).unwrap_or_else(empty_data_hash))
            }
        }
    }

    fn read_editable_data_hash(&self, sk: StoreKey) -> HubResult<DataHash> {
        let state = self.entry_state(sk);
        let hash = match state {
            EditState::Inherited | EditState::Locked => {
                let parent_hash = self.parent.read_data_hash(sk)?;
                // A shallow copy: clone the top-level map so this context's
                // writes stop propagating to the parent. Values inside are
                // `Rc`/`Arc`-backed and remain shared until replaced.
                let copy: DataHash = Rc::new((*parent_hash).clone());
                copy
            }
            EditState::Editable => self
                .overlay
                .borrow()
                .get(&sk)
                .and_then(|o| o.hash.clone())
                .unwrap_or_else(empty_data_hash),
        };
        self.overlay.borrow_mut().insert(
            sk,
            Overlay {
                state: EditState::Editable,
                hash: Some(hash.clone()),
                status: self.overlay.borrow().get(&sk).and_then(|o| o.status),
            },
        );
        Ok(hash)
    }

    fn write_data_hash(&self, sk: StoreKey, hash: DataHash, status: Option<Status>) -> HubResult<()> {
        let mut overlay = self.overlay.borrow_mut();
        let existing_status = overlay.get(&sk).and_then(|o| o.status);
        overlay.insert(
            sk,
            Overlay {
                state: EditState::Editable,
                hash: Some(hash),
                status: status.or(existing_status),
            },
        );
        Ok(())
    }

    fn read_status(&self, sk: StoreKey) -> Status {
        self.overlay
            .borrow()
            .get(&sk)
            .and_then(|o| o.status)
            .unwrap_or_else(|| self.parent.read_status(sk))
    }

    fn write_status(&self, sk: StoreKey, status: Status) {
        let mut overlay = self.overlay.borrow_mut();
        let entry = overlay.entry(sk).or_insert_with(Overlay::inherited);
        entry.status = Some(status);
    }

    fn store_key_edit_state(&self, sk: StoreKey) -> EditState {
        self.entry_state(sk)
    }

    fn store_key_for(&self, record_type: &str, id: &str) -> StoreKey {
        self.parent.store_key_for(record_type, id)
    }

    fn store_keys(&self) -> Vec<StoreKey> {
        let mut keys = self.parent.store_keys();
        for sk in self.overlay.borrow().keys() {
            if !keys.contains(sk) {
                keys.push(*sk);
            }
        }
        keys
    }

    fn record_type_of(&self, sk: StoreKey) -> Option<Arc<str>> {
        self.parent.record_type_of(sk)
    }

    /// Limited to this context's own overlay entries rather than the
    /// default full `store_keys()` scan — a context only ever needs to
    /// report what *it* touched (spec §4.E "collects all dirty StoreKeys
    /// in the receiver").
    fn dirty_store_keys(&self) -> Vec<StoreKey> {
        self.overlay
            .borrow()
            .iter()
            .filter_map(|(sk, o)| {
                let status = o.status.unwrap_or_else(|| self.parent.read_status(*sk));
                if status.is_dirty() {
                    Some(*sk)
                } else {
                    None
                }
            })
            .collect()
    }
}

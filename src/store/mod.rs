//! Component E: the copy-on-write data-hash store and its nested editing
//! contexts (spec §4.E).

mod data_source;
mod editing_context;
mod record;
mod status;
mod store_impl;

pub use data_source::{commit_records, DataSource, FixtureDataSource};
pub use editing_context::EditingContext;
pub use record::{Record, RecordAttribute, RecordCache};
pub use status::Status;
pub use store_impl::Store;

use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{HubResult, StoreStateViolation};
use crate::value::PropertyValue;

/// A process-unique integer identifying one logical record across all
/// editing contexts. Allocated on first reference and never reused.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StoreKey(pub u64);

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sk{}", self.0)
    }
}

/// The shallow, copy-on-write attribute map backing one record's data hash.
/// Shared by `Rc` between a parent context and any child still `INHERITED`
/// for this key; `read_editable_data_hash` breaks sharing with a clone.
pub type DataHash = Rc<FxHashMap<Arc<str>, PropertyValue>>;

pub fn empty_data_hash() -> DataHash {
    Rc::new(FxHashMap::default())
}

/// Per-`(context, storeKey)` edit state (spec §3/§4.E).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EditState {
    /// Not yet touched in this context; resolves to the nearest ancestor.
    Inherited,
    /// Holds a shared reference to an ancestor's data hash; not writable
    /// here without first becoming `Editable`.
    Locked,
    /// This context owns a private, independently-writable data hash.
    Editable,
}

/// Shared read/write surface implemented by both [`Store`] (the root) and
/// [`EditingContext`] (a nested, copy-on-write overlay). Mirrors spec §6's
/// "Store surface" operation list.
pub trait DataStore {
    fn read_data_hash(&self, sk: StoreKey) -> HubResult<DataHash>;
    fn read_editable_data_hash(&self, sk: StoreKey) -> HubResult<DataHash>;
    fn write_data_hash(&self, sk: StoreKey, hash: DataHash, status: Option<Status>) -> HubResult<()>;
    fn read_status(&self, sk: StoreKey) -> Status;
    fn write_status(&self, sk: StoreKey, status: Status);
    fn store_key_edit_state(&self, sk: StoreKey) -> EditState;
    fn store_key_for(&self, record_type: &str, id: &str) -> StoreKey;
    fn store_keys(&self) -> Vec<StoreKey>;
    fn record_type_of(&self, sk: StoreKey) -> Option<Arc<str>>;

    fn require_editable(&self, sk: StoreKey) -> HubResult<()> {
        if self.read_status(sk).is_empty() {
            return Err(StoreStateViolation::EmptyStoreKey(sk).into());
        }
        Ok(())
    }

    /// Every `StoreKey` visible to this receiver with a dirty status
    /// (`READY_DIRTY`, `READY_NEW`, or `DESTROYED_DIRTY`) — the default
    /// store-key list `commit_records` collects when none is given
    /// explicitly (spec §4.E "Commit flow"). [`EditingContext`] overrides
    /// this with a cheaper scan limited to its own overlay entries.
    fn dirty_store_keys(&self) -> Vec<StoreKey> {
        self.store_keys().into_iter().filter(|&sk| self.read_status(sk).is_dirty()).collect()
    }
}

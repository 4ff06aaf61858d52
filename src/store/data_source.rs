use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::error::{DataSourceFailure, HubResult};

use super::{DataHash, StoreKey};

/// The backend a `commitRecords` pipeline talks to. Spec §1 puts a
/// concrete, network-backed data source out of scope; §4.E's commit flow
/// still names these three operations, so the trait is specified here and
/// exercised in tests through [`FixtureDataSource`].
pub trait DataSource {
    fn create_record(&self, sk: StoreKey, hash: &DataHash) -> HubResult<()>;
    fn update_record(&self, sk: StoreKey, hash: &DataHash) -> HubResult<()>;
    fn destroy_record(&self, sk: StoreKey) -> HubResult<()>;
}

/// An in-memory `DataSource` — no I/O, no async — used by the fixture
/// tests exercising the commit pipeline (spec §4.E supplement).
#[derive(Default)]
pub struct FixtureDataSource {
    records: RefCell<FxHashMap<StoreKey, DataHash>>,
    fail_on: RefCell<Vec<StoreKey>>,
}

impl FixtureDataSource {
    pub fn new() -> Self {
        FixtureDataSource::default()
    }

    /// Test hook: make the next attempt to commit `sk` fail, so callers can
    /// exercise `commitRecords`'s partial-success reporting.
    pub fn fail_next(&self, sk: StoreKey) {
        self.fail_on.borrow_mut().push(sk);
    }

    fn should_fail(&self, sk: StoreKey) -> bool {
        let mut fail_on = self.fail_on.borrow_mut();
        if let Some(pos) = fail_on.iter().position(|&k| k == sk) {
            fail_on.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn get(&self, sk: StoreKey) -> Option<DataHash> {
        self.records.borrow().get(&sk).cloned()
    }
}

impl DataSource for FixtureDataSource {
    fn create_record(&self, sk: StoreKey, hash: &DataHash) -> HubResult<()> {
        if self.should_fail(sk) {
            return Err(DataSourceFailure {
                failed: vec![sk],
                succeeded: vec![],
                message: "fixture configured to fail create".to_string(),
            }
            .into());
        }
        self.records.borrow_mut().insert(sk, hash.clone());
        Ok(())
    }

    fn update_record(&self, sk: StoreKey, hash: &DataHash) -> HubResult<()> {
        if self.should_fail(sk) {
            return Err(DataSourceFailure {
                failed: vec![sk],
                succeeded: vec![],
                message: "fixture configured to fail update".to_string(),
            }
            .into());
        }
        self.records.borrow_mut().insert(sk, hash.clone());
        Ok(())
    }

    fn destroy_record(&self, sk: StoreKey) -> HubResult<()> {
        if self.should_fail(sk) {
            return Err(DataSourceFailure {
                failed: vec![sk],
                succeeded: vec![],
                message: "fixture configured to fail destroy".to_string(),
            }
            .into());
        }
        self.records.borrow_mut().remove(&sk);
        Ok(())
    }
}

/// Groups `store_keys` by status and invokes the matching `DataSource`
/// operation for each, per spec §4.E's commit flow. Returns the keys that
/// committed successfully; a failure on one key does not abort the rest.
///
/// `store_keys = None` collects the receiver's own dirty `StoreKey`s first
/// (spec §4.E: "collects all dirty StoreKeys in the receiver"), matching
/// `commitRecords()` called with no explicit key list.
pub fn commit_records<S: super::DataStore>(
    store: &S,
    data_source: &dyn DataSource,
    store_keys: Option<&[StoreKey]>,
) -> Result<Vec<StoreKey>, DataSourceFailure> {
    let owned_keys;
    let store_keys: &[StoreKey] = match store_keys {
        Some(keys) => keys,
        None => {
            owned_keys = store.dirty_store_keys();
            &owned_keys
        }
    };

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut message = String::new();

    for &sk in store_keys {
        let status = store.read_status(sk);
        let hash = match store.read_data_hash(sk) {
            Ok(h) => h,
            Err(_) => {
                failed.push(sk);
                continue;
            }
        };

        let result = if status.is_destroyed() {
            data_source.destroy_record(sk)
        } else if status == super::Status::READY_NEW {
            data_source.create_record(sk, &hash)
        } else {
            data_source.update_record(sk, &hash)
        };

        match result {
            Ok(()) => {
                store.write_status(sk, super::Status::READY_CLEAN);
                succeeded.push(sk);
            }
            Err(crate::error::HubError::DataSource(e)) => {
                store.write_status(sk, super::Status::ERROR);
                failed.push(sk);
                message = e.message;
            }
            Err(_) => {
                store.write_status(sk, super::Status::ERROR);
                failed.push(sk);
            }
        }
    }

    if failed.is_empty() {
        Ok(succeeded)
    } else {
        Err(DataSourceFailure {
            failed,
            succeeded,
            message: if message.is_empty() {
                "one or more store keys failed to commit".to_string()
            } else {
                message
            },
        })
    }
}

#![warn(rust_2018_idioms)]

//! A reactive object-graph substrate: key-value observation (computed
//! properties, dependent-key invalidation, change coalescing, path-based
//! chained observation, a process-wide observer queue) plus a copy-on-write
//! record store with nested editing contexts.
//!
//! Remote transport, a query language, asynchronous fetches, disk
//! persistence, and multi-process concurrency are out of scope: this crate
//! is single-threaded cooperative, and specifies *when* notifications may
//! fire, not *how* to move bytes.

pub mod chain_observer;
pub mod descriptor;
pub mod error;
pub mod observable;
pub mod observer_queue;
pub mod observer_set;
pub mod path;
pub mod revision;
pub mod store;
pub mod value;

pub use chain_observer::{ChainObserver, GraphNode};
pub use descriptor::PropertyDescriptor;
pub use error::{DataSourceFailure, HubError, HubResult, ProgrammerError, StoreStateViolation};
pub use observable::{KvoObject, Observable, ObservableState};
pub use observer_queue::{with_default_context, ObservationContext};
pub use observer_set::{ContextToken, ObserverSet, ObserverTarget};
pub use path::{Path, PathRoot};
pub use revision::Revision;
pub use store::{commit_records, DataSource, DataStore, EditState, EditingContext, FixtureDataSource, Record, RecordAttribute, Store, StoreKey};
pub use value::PropertyValue;

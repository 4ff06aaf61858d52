use std::fmt;

use crate::store::StoreKey;

/// Missing observer method, a malformed path, or a path observed with a
/// root that never resolves. Surfaced synchronously at the call site.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProgrammerError {
    UnresolvedObserverMethod { key: String, method: String },
    MalformedPath { path: String },
    UnresolvedRoot { path: String },
}

impl fmt::Display for ProgrammerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgrammerError::UnresolvedObserverMethod { key, method } => {
                write!(f, "no observer method `{}` for key `{}`", method, key)
            }
            ProgrammerError::MalformedPath { path } => {
                write!(f, "malformed observation path `{}`", path)
            }
            ProgrammerError::UnresolvedRoot { path } => {
                write!(f, "path `{}` has no resolvable root", path)
            }
        }
    }
}

/// Writing through a context whose edit state forbids it, or requesting a
/// hash for a [`StoreKey`] marked `EMPTY`. Spec §7 treats this class as a
/// status change rather than an exception in the source system; here it is
/// returned as a `Result` so callers can branch on it without inspecting a
/// status bitfield out of band.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreStateViolation {
    EmptyStoreKey(StoreKey),
    NotEditable(StoreKey),
    CommitWhileDestroyed(StoreKey),
}

impl fmt::Display for StoreStateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStateViolation::EmptyStoreKey(sk) => {
                write!(f, "store key {:?} has no data hash (status EMPTY)", sk)
            }
            StoreStateViolation::NotEditable(sk) => {
                write!(f, "store key {:?} is not writable in this context", sk)
            }
            StoreStateViolation::CommitWhileDestroyed(sk) => {
                write!(f, "cannot commit store key {:?}: already destroyed", sk)
            }
        }
    }
}

/// Raised by the commit pipeline when a `DataSource` operation fails for one
/// or more store keys. Carries the keys that *did* succeed so the caller can
/// decide what to retry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataSourceFailure {
    pub failed: Vec<StoreKey>,
    pub succeeded: Vec<StoreKey>,
    pub message: String,
}

impl fmt::Display for DataSourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commit failed for {} of {} store keys: {}",
            self.failed.len(),
            self.failed.len() + self.succeeded.len(),
            self.message
        )
    }
}

/// The error type returned by every fallible public operation.
///
/// `CacheInvariant` failures (spec §7's fourth kind — revision regressions,
/// a corrupt dependent-key cache) are not represented here: per the spec
/// they indicate a bug in the library itself, not a condition a caller can
/// recover from, so they are raised as `debug_assert!`/`unreachable!` at the
/// point of detection instead of forcing every caller to match on a
/// "the library is broken" variant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HubError {
    Programmer(ProgrammerError),
    StoreState(StoreStateViolation),
    DataSource(DataSourceFailure),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Programmer(e) => write!(f, "{}", e),
            HubError::StoreState(e) => write!(f, "{}", e),
            HubError::DataSource(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HubError {}

impl From<ProgrammerError> for HubError {
    fn from(e: ProgrammerError) -> Self {
        HubError::Programmer(e)
    }
}

impl From<StoreStateViolation> for HubError {
    fn from(e: StoreStateViolation) -> Self {
        HubError::StoreState(e)
    }
}

impl From<DataSourceFailure> for HubError {
    fn from(e: DataSourceFailure) -> Self {
        HubError::DataSource(e)
    }
}

pub type HubResult<T> = Result<T, HubError>;

use std::fmt;
use std::num::NonZeroU32;

use crossbeam_utils::atomic::AtomicCell;

/// A monotonically increasing stamp. Every object in the observation graph,
/// and the store as a whole, hands out revisions from a counter that only
/// ever moves forward; observers compare their last-seen revision against
/// the current one to decide whether they have already been notified.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(NonZeroU32);

impl Revision {
    fn start() -> Self {
        Self::from(1)
    }

    fn from(v: usize) -> Self {
        Revision(NonZeroU32::new(v as u32).unwrap())
    }

    fn as_u32(self) -> u32 {
        self.0.get()
    }

    pub(crate) fn next(self) -> Revision {
        Revision::from(self.as_u32() as usize + 1)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl Default for Revision {
    fn default() -> Self {
        Revision::start()
    }
}

/// An atomically-updatable cell holding a [`Revision`]. Shared between an
/// `ObservationContext` and every object it stamps, so a fresh object always
/// starts one tick behind "now" and its first mutation produces a revision
/// no other object has already observed.
#[derive(Debug)]
pub struct AtomicRevision {
    data: AtomicCell<u32>,
}

impl AtomicRevision {
    pub(crate) fn start() -> Self {
        AtomicRevision {
            data: AtomicCell::new(Revision::start().as_u32()),
        }
    }

    pub(crate) fn load(&self) -> Revision {
        Revision::from(self.data.load() as usize)
    }

    /// Advances the stored revision to `r.next()` and returns the new value.
    /// Panics (a `CacheInvariant`-class bug) if another writer has already
    /// advanced past this point — revisions never move backward.
    pub(crate) fn increment(&self) -> Revision {
        let next = self.load().next();
        self.data.store(next.as_u32());
        next
    }
}

impl Default for AtomicRevision {
    fn default() -> Self {
        AtomicRevision::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_is_monotonic() {
        let r = AtomicRevision::start();
        let a = r.load();
        let b = r.increment();
        let c = r.increment();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn revision_ordering() {
        let a = Revision::start();
        let b = a.next();
        assert!(a < b);
        assert_eq!(b, a.next());
    }
}

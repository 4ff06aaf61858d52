use std::sync::Arc;

use crate::value::PropertyValue;

/// A computed-property function: reading a key backed by one invokes it
/// with the key name; writing invokes it with the key name and the new
/// value, and should return the value that was actually stored. Not
/// `Send`/`Sync` (matching every other callback surface in this crate) so a
/// descriptor can close over `Rc`/`RefCell` state belonging to its owning
/// object.
pub trait ComputedFn: Fn(&str, Option<&PropertyValue>) -> PropertyValue {}
impl<F> ComputedFn for F where F: Fn(&str, Option<&PropertyValue>) -> PropertyValue {}

/// The tagged-record descriptor protocol spec §6/§9 requires implementations
/// to accept unchanged: a computed property is any callable carrying
/// `isProperty`, optionally `isCacheable`/`cacheKey`, optionally
/// `lastSetValueKey`, optionally `isVolatile`, optionally `dependentKeys`.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub(crate) func: Arc<dyn ComputedFn>,
    pub cacheable: bool,
    pub volatile: bool,
    pub cache_key: Arc<str>,
    pub last_set_key: Arc<str>,
    pub dependent_keys: Vec<Arc<str>>,
}

impl PropertyDescriptor {
    pub fn new<F>(key: &str, func: F) -> Self
    where
        F: ComputedFn + 'static,
    {
        PropertyDescriptor {
            func: Arc::new(func),
            cacheable: false,
            volatile: false,
            cache_key: Arc::from(format!("__cache_{}", key)),
            last_set_key: Arc::from(format!("__lastSet_{}", key)),
            dependent_keys: Vec::new(),
        }
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dependent_keys = keys.into_iter().map(|k| Arc::from(k.as_ref())).collect();
        self
    }

    pub fn invoke(&self, key: &str, new_value: Option<&PropertyValue>) -> PropertyValue {
        (self.func)(key, new_value)
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("cacheable", &self.cacheable)
            .field("volatile", &self.volatile)
            .field("dependent_keys", &self.dependent_keys)
            .finish()
    }
}

//! Process-wide callback registry
//!
//! Maps the address of every live shadow instance to the Rust object it stands
//! for. Thunks resolve through this map before touching anything else, so a
//! call through a pointer whose shadow is gone fails with a status code
//! instead of reading freed memory.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::shape::ShapeId;
use crate::status::Status;

/// A Rust object exposed through one or more shadow shapes.
///
/// Holds one type-erased `Arc<dyn Trait>` per callback contract the object
/// implements. All views point at the same allocation; [`identity`] is the
/// address of that allocation.
///
/// [`identity`]: ManagedObject::identity
pub struct ManagedObject {
    identity: usize,
    views: Vec<(TypeId, Box<dyn Any + Send + Sync>)>,
}

impl ManagedObject {
    pub fn of<V: ?Sized + Send + Sync + 'static>(view: Arc<V>) -> Self {
        let identity = Arc::as_ptr(&view) as *const () as usize;
        Self { identity, views: Vec::new() }.with_view(view)
    }

    /// Add another contract view. A view of the same type replaces the old one.
    pub fn with_view<V: ?Sized + Send + Sync + 'static>(mut self, view: Arc<V>) -> Self {
        let key = TypeId::of::<Arc<V>>();
        self.views.retain(|(id, _)| *id != key);
        self.views.push((key, Box::new(view)));
        self
    }

    pub fn view<V: ?Sized + 'static>(&self) -> Option<Arc<V>> {
        let key = TypeId::of::<Arc<V>>();
        self.views
            .iter()
            .find(|(id, _)| *id == key)
            .and_then(|(_, view)| view.downcast_ref::<Arc<V>>())
            .cloned()
    }

    pub fn identity(&self) -> usize {
        self.identity
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("identity", &format_args!("0x{:x}", self.identity))
            .field("views", &self.views.len())
            .finish()
    }
}

/// What a shadow address resolves to
#[derive(Debug)]
pub struct Registration {
    pub object: ManagedObject,
    pub shape: ShapeId,
}

pub struct CallbackRegistry {
    entries: RwLock<HashMap<usize, Arc<Registration>>>,
}

static REGISTRY: LazyLock<CallbackRegistry> = LazyLock::new(|| CallbackRegistry {
    entries: RwLock::new(HashMap::new()),
});

impl CallbackRegistry {
    pub fn global() -> &'static CallbackRegistry {
        &REGISTRY
    }

    pub(crate) fn insert(&self, address: usize, registration: Registration) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(address, Arc::new(registration));
        debug_assert!(previous.is_none(), "shadow address 0x{:x} registered twice", address);
    }

    /// Look up a shadow address. Never dereferences it.
    pub fn resolve(&self, address: usize) -> Result<Arc<Registration>, Status> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .cloned()
            .ok_or(Status::E_NO_SUCH_OBJECT)
    }

    pub(crate) fn remove(&self, address: usize) -> Option<Arc<Registration>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(&address)
    }

    pub fn contains(&self, address: usize) -> bool {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).contains_key(&address)
    }

    /// Number of live shadow instances
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Shadow instances
//!
//! The object native code actually holds: a vtable pointer followed by an
//! atomic refcount and the bookkeeping the bridge needs. The instance is
//! registered in the [`CallbackRegistry`] for exactly as long as its refcount
//! is above zero.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace, warn};

use crate::bridge::panic_message;

use crate::guid::Guid;
use crate::marshal::buffer::PinnedBuffers;
use crate::marshal::handle::ComPtr;
use crate::marshal::string::RetainedStrings;
use crate::registry::{CallbackRegistry, ManagedObject, Registration};
use crate::shape::{MarshalKind, MethodSig, ResultKind, ShapeDef, ShapeError, ShapeId, ShapeRegistry, Thunk};
use crate::status::Status;

// ============================================================================
// Object layout: [vtable, refcount, shape, object, session]
// ============================================================================

#[repr(C)]
pub struct ShadowInstance {
    vtable: *const Thunk,
    refcount: AtomicU32,
    shape: ShapeId,
    object: usize,
    session: Mutex<Session>,
}

/// Native-facing memory owned by one shadow instance.
///
/// Everything here is released when the instance is torn down.
#[derive(Default)]
pub struct Session {
    /// Strings handed to native code, one per method slot
    pub strings: RetainedStrings,
    /// Buffers native code reads until it hands the context back
    pub pins: PinnedBuffers,
    children: Vec<ComPtr>,
}

impl Session {
    /// Keep `child` alive until this instance is torn down
    pub fn adopt(&mut self, child: ComPtr) {
        self.children.push(child);
    }

    pub fn children(&self) -> usize {
        self.children.len()
    }
}

impl ShadowInstance {
    /// Create a shadow of `shape` for `object`. The returned pointer owns the
    /// initial reference.
    pub fn create(shape: ShapeId, object: ManagedObject) -> Result<ComPtr, ShapeError> {
        let raw = Self::create_raw(shape, object)?;
        // SAFETY: fresh instance with one reference that the ComPtr adopts
        Ok(unsafe { ComPtr::from_non_null(raw) })
    }

    pub(crate) fn create_raw(shape: ShapeId, object: ManagedObject) -> Result<NonNull<c_void>, ShapeError> {
        let vtable = ShapeRegistry::global().vtable(shape)?;
        let identity = object.identity();

        let instance = Box::new(ShadowInstance {
            vtable: vtable.as_ptr(),
            refcount: AtomicU32::new(1),
            shape,
            object: identity,
            session: Mutex::default(),
        });
        let ptr = NonNull::from(Box::leak(instance));

        CallbackRegistry::global().insert(ptr.as_ptr() as usize, Registration { object, shape });
        debug!("Created {} shadow at {:p} for object 0x{:x}", shape, ptr, identity);
        Ok(ptr.cast())
    }

    /// The instance behind `this`, or `None` when `this` is not a live shadow.
    ///
    /// # Safety
    /// The caller must hold a reference to `this` for as long as it uses the
    /// returned instance.
    pub unsafe fn from_live<'a>(this: *const c_void) -> Option<&'a ShadowInstance> {
        if CallbackRegistry::global().contains(this as usize) {
            Some(&*(this as *const ShadowInstance))
        } else {
            None
        }
    }

    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// Address of the Rust object this shadow stands for
    pub fn object_identity(&self) -> usize {
        self.object
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ShadowInstance {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        trace!(
            "Tearing down {} shadow: {} strings, {} pins, {} children",
            self.shape,
            session.strings.len(),
            session.pins.len(),
            session.children.len()
        );
    }
}

// ============================================================================
// Reference counting
// ============================================================================

/// Increment the refcount of a live shadow.
///
/// # Safety
/// `this` must be null or a shadow instance with at least one reference.
pub unsafe fn add_ref(this: *mut c_void) -> u32 {
    if this.is_null() {
        return 0;
    }
    let instance = &*(this as *const ShadowInstance);
    instance.refcount.fetch_add(1, Ordering::Relaxed) + 1
}

/// Decrement the refcount; the last release unregisters and frees the shadow.
///
/// # Safety
/// `this` must be null or a shadow instance with at least one reference.
/// Releasing more times than references were taken is undefined behavior, as
/// it is for any COM object.
pub unsafe fn release(this: *mut c_void) -> u32 {
    if this.is_null() {
        return 0;
    }
    let instance = &*(this as *const ShadowInstance);
    let previous = instance.refcount.fetch_sub(1, Ordering::Release);
    if previous != 1 {
        return previous.wrapping_sub(1);
    }
    fence(Ordering::Acquire);
    destroy(this as *mut ShadowInstance);
    0
}

unsafe fn destroy(ptr: *mut ShadowInstance) {
    // Unregister first so a racing thunk resolves to "no such object"
    let registration = CallbackRegistry::global().remove(ptr as usize);
    let instance = Box::from_raw(ptr);
    let shape = instance.shape;

    // Both drops can run managed Drop code (children, the last object Arc)
    contain_teardown(shape, "session", move || drop(instance));
    contain_teardown(shape, "managed object", move || drop(registration));
    debug!("Destroyed {} shadow at {:p}", shape, ptr);
}

fn contain_teardown(shape: ShapeId, part: &str, teardown: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(teardown)) {
        warn!("{} shadow: dropping the {} panicked: {}", shape, part, panic_message(payload.as_ref()));
    }
}

/// Look up the registration for a shadow pointer without dereferencing it
pub fn resolve(this: *const c_void) -> Result<Arc<Registration>, Status> {
    CallbackRegistry::global().resolve(this as usize)
}

// ============================================================================
// IUnknown thunks
// ============================================================================

unsafe extern "system" fn query_interface_thunk(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> Status {
    if out.is_null() {
        return Status::E_POINTER;
    }
    *out = ptr::null_mut();
    if iid.is_null() {
        return Status::E_POINTER;
    }

    let registration = match resolve(this) {
        Ok(registration) => registration,
        Err(status) => {
            error!("QueryInterface called on {:p}, which is not a live shadow object", this);
            return status;
        }
    };

    let iid = &*iid;
    if *iid == Guid::IUNKNOWN || ShapeRegistry::global().supports(registration.shape, iid) {
        add_ref(this);
        *out = this;
        Status::OK
    } else {
        trace!("{} does not implement {}", registration.shape, iid);
        Status::E_NOINTERFACE
    }
}

unsafe extern "system" fn add_ref_thunk(this: *mut c_void) -> u32 {
    add_ref(this)
}

unsafe extern "system" fn release_thunk(this: *mut c_void) -> u32 {
    release(this)
}

pub(crate) fn iunknown_shape() -> ShapeDef {
    ShapeDef::new(ShapeId::IUNKNOWN, Guid::IUNKNOWN)
        .method(
            MethodSig::new("QueryInterface")
                .input("riid", MarshalKind::structure::<Guid>("GUID"))
                .output("ppvObject", MarshalKind::HANDLE),
            query_interface_thunk as *const c_void,
        )
        .method(MethodSig::new("AddRef").returns(ResultKind::RefCount), add_ref_thunk as *const c_void)
        .method(MethodSig::new("Release").returns(ResultKind::RefCount), release_thunk as *const c_void)
}

//! Interface pointers
//!
//! [`ComPtr`] owns one reference to a native (or shadow) COM object and calls
//! its `AddRef`/`Release` through vtable slots 1 and 2.

use std::ffi::c_void;
use std::fmt;
use std::ptr::{self, NonNull};

use crate::guid::Guid;
use crate::status::Status;

type QueryInterfaceFn = unsafe extern "system" fn(*mut c_void, *const Guid, *mut *mut c_void) -> Status;
type RefCountFn = unsafe extern "system" fn(*mut c_void) -> u32;

/// Owned reference to a COM object
pub struct ComPtr(NonNull<c_void>);

// The objects this bridge passes around are free-threaded
unsafe impl Send for ComPtr {}
unsafe impl Sync for ComPtr {}

impl ComPtr {
    /// Take over a reference the caller already owns
    ///
    /// # Safety
    /// `raw` must be null or a COM object pointer carrying a reference that is
    /// transferred to the returned value.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    /// Take a new reference to a borrowed pointer (e.g. a callback argument)
    ///
    /// # Safety
    /// `raw` must be null or a live COM object pointer.
    pub unsafe fn from_borrowed(raw: *mut c_void) -> Option<Self> {
        let ptr = NonNull::new(raw)?;
        let add_ref: RefCountFn = std::mem::transmute(vtable_entry(raw, 1));
        add_ref(raw);
        Some(Self(ptr))
    }

    pub(crate) unsafe fn from_non_null(ptr: NonNull<c_void>) -> Self {
        Self(ptr)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Give the reference away without releasing it
    pub fn into_raw(self) -> *mut c_void {
        let raw = self.0.as_ptr();
        std::mem::forget(self);
        raw
    }

    /// Method pointer in vtable slot `index`
    ///
    /// # Safety
    /// `F` must be the `extern "system"` fn pointer type of that slot.
    pub unsafe fn method<F: Copy>(&self, index: usize) -> F {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const c_void>());
        let entry = vtable_entry(self.as_raw(), index);
        std::mem::transmute_copy(&entry)
    }

    pub fn query_interface(&self, iid: &Guid) -> Result<ComPtr, Status> {
        let mut out = ptr::null_mut();
        // SAFETY: self holds a reference, slot 0 is QueryInterface
        let status = unsafe {
            let qi: QueryInterfaceFn = std::mem::transmute(vtable_entry(self.as_raw(), 0));
            qi(self.as_raw(), iid, &mut out)
        };
        status.ok()?;
        // SAFETY: a successful QueryInterface hands us one reference
        unsafe { ComPtr::from_raw(out) }.ok_or(Status::E_POINTER)
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        unsafe {
            let add_ref: RefCountFn = std::mem::transmute(vtable_entry(self.as_raw(), 1));
            add_ref(self.as_raw());
        }
        Self(self.0)
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        unsafe {
            let release: RefCountFn = std::mem::transmute(vtable_entry(self.as_raw(), 2));
            release(self.as_raw());
        }
    }
}

impl PartialEq for ComPtr {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ComPtr {}

impl fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComPtr({:p})", self.0)
    }
}

/// Function pointer stored in slot `index` of `obj`'s vtable
///
/// # Safety
/// `obj` must be a live COM object whose vtable has more than `index` slots.
pub unsafe fn vtable_entry(obj: *mut c_void, index: usize) -> *const c_void {
    let vtable = *(obj as *const *const *const c_void);
    *vtable.add(index)
}

/// Write an interface out-parameter, adding a reference for the receiver.
/// `None` writes null.
///
/// # Safety
/// `out` must be null or valid for a pointer write.
pub unsafe fn hand_out(value: Option<&ComPtr>, out: *mut *mut c_void) -> Result<(), Status> {
    if out.is_null() {
        return Err(Status::E_POINTER);
    }
    *out = value.map_or(ptr::null_mut(), |p| p.clone().into_raw());
    Ok(())
}

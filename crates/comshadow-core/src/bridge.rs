//! Exception bridge
//!
//! Every thunk body runs inside [`guard`] (or [`guard_value`] for slots that do
//! not return a status). The guard resolves the shadow, runs the callback under
//! `catch_unwind`, and turns whatever comes back into a status code. Nothing
//! unwinds into native frames.

use std::any::Any;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, MutexGuard};

use tracing::{error, trace, warn};

use crate::instance::{self, Session, ShadowInstance};
use crate::registry::Registration;
use crate::shape::ShapeId;
use crate::status::{CallbackError, CallbackResult, Status};

/// One native→Rust call in progress
pub struct Call<'a> {
    this: *mut c_void,
    registration: &'a Registration,
    method: &'static str,
}

impl<'a> Call<'a> {
    /// The callback contract `V` of the target object.
    ///
    /// `E_NOINTERFACE` when the object was registered without that view.
    pub fn view<V: ?Sized + 'static>(&self) -> CallbackResult<Arc<V>> {
        self.registration.object.view::<V>().ok_or_else(|| {
            warn!(
                "{}::{}: object 0x{:x} has no {} view",
                self.registration.shape,
                self.method,
                self.registration.object.identity(),
                std::any::type_name::<V>()
            );
            CallbackError::Status(Status::E_NOINTERFACE)
        })
    }

    pub fn shape(&self) -> ShapeId {
        self.registration.shape
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Per-instance memory (retained strings, pinned buffers, children)
    pub fn session(&self) -> MutexGuard<'_, Session> {
        // SAFETY: the registry resolved `this`, so the instance is live for
        // the duration of the call
        unsafe { (*(self.this as *const ShadowInstance)).session() }
    }

    pub fn this(&self) -> *mut c_void {
        self.this
    }
}

/// Run a status-returning callback body on behalf of a thunk
pub fn guard<F>(this: *mut c_void, method: &'static str, body: F) -> Status
where
    F: FnOnce(&Call<'_>) -> CallbackResult<()>,
{
    match invoke(this, method, body) {
        Ok(()) => Status::OK,
        Err(status) => status,
    }
}

/// Like [`guard`], for slots whose native signature returns a plain value.
/// `fallback` is returned on any failure.
pub fn guard_value<T, F>(this: *mut c_void, method: &'static str, fallback: T, body: F) -> T
where
    F: FnOnce(&Call<'_>) -> CallbackResult<T>,
{
    invoke(this, method, body).unwrap_or(fallback)
}

fn invoke<T, F>(this: *mut c_void, method: &'static str, body: F) -> Result<T, Status>
where
    F: FnOnce(&Call<'_>) -> CallbackResult<T>,
{
    if crate::trace_calls() {
        trace!(target: "comshadow::thunk", "{} on {:p}", method, this);
    }

    let registration = instance::resolve(this).map_err(|status| {
        error!("{} called on {:p}, which is not a live shadow object", method, this);
        status
    })?;

    let call = Call { this, registration: &registration, method };
    match panic::catch_unwind(AssertUnwindSafe(|| body(&call))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            let status = err.status();
            warn!("{}::{} failed: {} -> {}", registration.shape, method, err, status);
            Err(status)
        }
        Err(payload) => {
            warn!(
                "{}::{} panicked: {} -> {}",
                registration.shape,
                method,
                panic_message(payload.as_ref()),
                Status::E_FAIL
            );
            Err(Status::E_FAIL)
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ManagedObject;
    use crate::testing::{self, call_get_count, Broken, Counter, Failing, Fixed, Panicking, COUNTER};
    use crate::ShadowInstance;

    fn shadow_of(counter: Arc<dyn Counter>) -> crate::ComPtr {
        testing::register_shapes();
        ShadowInstance::create(COUNTER, ManagedObject::of(counter)).unwrap()
    }

    #[test]
    fn test_successful_call() {
        let _serial = testing::serial();
        let shadow = shadow_of(Arc::new(Fixed(42)));
        assert_eq!(unsafe { call_get_count(shadow.as_raw()) }, (Status::OK, 42));
    }

    #[test]
    fn test_stale_pointer_reports_no_such_object() {
        let _serial = testing::serial();
        let shadow = shadow_of(Arc::new(Fixed(42)));
        let raw = shadow.as_raw();
        let get_count = unsafe { testing::get_count_fn(raw) };
        let live = crate::CallbackRegistry::global().len();
        drop(shadow);
        assert_eq!(crate::CallbackRegistry::global().len(), live - 1);

        // The thunk resolves through the registry before touching `raw`
        let mut out = -1;
        assert_eq!(unsafe { get_count(raw, &mut out) }, Status::E_NO_SUCH_OBJECT);
        assert_eq!(out, -1);
    }

    struct PanicOnDrop;

    impl Counter for PanicOnDrop {
        fn count(&self) -> CallbackResult<i32> {
            Ok(0)
        }
    }

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("counter teardown exploded");
        }
    }

    #[test]
    fn test_panic_in_final_release_is_contained() {
        type ReleaseFn = unsafe extern "system" fn(*mut c_void) -> u32;

        let _serial = testing::serial();
        let live = crate::CallbackRegistry::global().len();
        let raw = shadow_of(Arc::new(PanicOnDrop)).into_raw();
        let release: ReleaseFn = unsafe { std::mem::transmute(crate::marshal::handle::vtable_entry(raw, 2)) };

        // Native code sees an ordinary last release
        assert_eq!(unsafe { release(raw) }, 0);
        assert_eq!(instance::resolve(raw).unwrap_err(), Status::E_NO_SUCH_OBJECT);
        assert_eq!(crate::CallbackRegistry::global().len(), live);
    }

    #[test]
    fn test_status_error_passes_through() {
        let _serial = testing::serial();
        let shadow = shadow_of(Arc::new(Failing(Status::E_BOUNDS)));
        assert_eq!(unsafe { call_get_count(shadow.as_raw()) }.0, Status::E_BOUNDS);
    }

    #[test]
    fn test_other_error_is_e_fail() {
        let _serial = testing::serial();
        let shadow = shadow_of(Arc::new(Broken));
        assert_eq!(unsafe { call_get_count(shadow.as_raw()) }.0, Status::E_FAIL);
    }

    #[test]
    fn test_panic_is_contained() {
        let _serial = testing::serial();
        let shadow = shadow_of(Arc::new(Panicking));
        assert_eq!(unsafe { call_get_count(shadow.as_raw()) }.0, Status::E_FAIL);
        // Still usable after the panic
        assert!(instance::resolve(shadow.as_raw()).is_ok());
    }

    #[test]
    fn test_missing_view_is_no_interface() {
        let _serial = testing::serial();
        trait Unrelated: Send + Sync {}
        struct Nothing;
        impl Unrelated for Nothing {}

        testing::register_shapes();
        let shadow =
            ShadowInstance::create(COUNTER, ManagedObject::of::<dyn Unrelated>(Arc::new(Nothing))).unwrap();
        assert_eq!(unsafe { call_get_count(shadow.as_raw()) }.0, Status::E_NOINTERFACE);
    }

    #[test]
    fn test_guard_value_fallback() {
        let _serial = testing::serial();
        let shadow = shadow_of(Arc::new(Fixed(1)));
        let value = guard_value(shadow.as_raw(), "IsPixelSnappingDisabled", 0, |_| {
            Err(CallbackError::Status(Status::E_FAIL))
        });
        assert_eq!(value, 0);
        let value = guard_value(std::ptr::null_mut(), "IsPixelSnappingDisabled", 7u32, |_| Ok(1));
        assert_eq!(value, 7);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

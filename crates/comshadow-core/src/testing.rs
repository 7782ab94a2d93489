//! Shapes and callback objects shared by the unit tests

use std::ffi::c_void;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::bridge::guard;
use crate::marshal::{handle::vtable_entry, write_out};
use crate::registry::ManagedObject;
use crate::shape::{MarshalKind, MethodSig, ShapeDef, ShapeId, ShapeRegistry};
use crate::status::{CallbackError, CallbackResult, Status};
use crate::{ComPtr, Guid, ShadowInstance};

pub(crate) const COUNTER: ShapeId = ShapeId::new("ITestCounter");
pub(crate) const COUNTER_IID: Guid = Guid::from_u128(0x3c0d_0001_0000_4000_8000_0000_0000_0001);
pub(crate) const COUNTER_EX: ShapeId = ShapeId::new("ITestCounterEx");
pub(crate) const COUNTER_EX_IID: Guid = Guid::from_u128(0x3c0d_0002_0000_4000_8000_0000_0000_0002);

pub(crate) type GetCountFn = unsafe extern "system" fn(*mut c_void, *mut i32) -> Status;

pub(crate) trait Counter: Send + Sync {
    fn count(&self) -> CallbackResult<i32>;

    fn reset(&self) -> CallbackResult<()> {
        Ok(())
    }
}

pub(crate) struct Fixed(pub i32);

impl Counter for Fixed {
    fn count(&self) -> CallbackResult<i32> {
        Ok(self.0)
    }
}

pub(crate) struct Failing(pub Status);

impl Counter for Failing {
    fn count(&self) -> CallbackResult<i32> {
        Err(CallbackError::Status(self.0))
    }
}

pub(crate) struct Broken;

impl Counter for Broken {
    fn count(&self) -> CallbackResult<i32> {
        Err(anyhow::anyhow!("counter storage unavailable").into())
    }
}

pub(crate) struct Panicking;

impl Counter for Panicking {
    fn count(&self) -> CallbackResult<i32> {
        panic!("counter exploded")
    }
}

unsafe extern "system" fn get_count(this: *mut c_void, count: *mut i32) -> Status {
    guard(this, "GetCount", |call| {
        let counter = call.view::<dyn Counter>()?;
        let value = counter.count()?;
        write_out(count, value)?;
        Ok(())
    })
}

unsafe extern "system" fn reset(this: *mut c_void) -> Status {
    guard(this, "Reset", |call| call.view::<dyn Counter>()?.reset())
}

/// Held by every test that allocates or frees shadows, so a freed address is
/// never reused by another test before the stale-address checks run
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = Mutex::new(());
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register_shapes() {
    static REGISTERED: OnceLock<()> = OnceLock::new();
    REGISTERED.get_or_init(|| {
        let registry = ShapeRegistry::global();
        registry
            .register(
                ShapeDef::new(COUNTER, COUNTER_IID)
                    .slots(4)
                    .method(MethodSig::new("GetCount").output("count", MarshalKind::I32), get_count as *const c_void),
            )
            .unwrap();
        registry
            .register(
                ShapeDef::new(COUNTER_EX, COUNTER_EX_IID)
                    .extends(COUNTER)
                    .slots(5)
                    .method(MethodSig::new("Reset"), reset as *const c_void),
            )
            .unwrap();
    });
}

pub(crate) fn counter_shadow(value: i32) -> ComPtr {
    register_shapes();
    ShadowInstance::create(COUNTER, ManagedObject::of::<dyn Counter>(Arc::new(Fixed(value)))).unwrap()
}

/// Slot 3 of a counter shadow, read while the shadow is alive
pub(crate) unsafe fn get_count_fn(obj: *mut c_void) -> GetCountFn {
    std::mem::transmute(vtable_entry(obj, 3))
}

pub(crate) unsafe fn call_get_count(obj: *mut c_void) -> (Status, i32) {
    let mut out = 0;
    let status = get_count_fn(obj)(obj, &mut out);
    (status, out)
}

//! Shadow callback bridge
//!
//! Lets reference-counted Rust objects stand in for native COM callback
//! objects. Native code calls through an ordinary vtable; every slot is an
//! `extern "system"` thunk that recovers the Rust object from the pointer it was
//! handed, marshals the arguments, runs the callback and returns a status code.
//!
//! ## Pieces
//! - [`shape`] – closed-set description of a callback interface and its vtable
//! - [`instance`] – the `#[repr(C)]` shadow object native code holds a pointer to
//! - [`registry`] – process-wide map from shadow address to Rust object
//! - [`bridge`] – catch-and-translate wrapper applied inside every thunk
//! - [`marshal`] – strings, buffers, nullable values and `ComPtr` handles
//!
//! ## Object layout handed to native code
//! ```text
//! +0x00  vtable ──► [QueryInterface, AddRef, Release, slot 3, ...]
//! +0x08  refcount (atomic)
//!        shape id, object identity, session state
//! ```

pub mod bridge;
pub mod guid;
pub mod instance;
pub mod marshal;
pub mod registry;
pub mod shape;
pub mod status;

#[cfg(test)]
mod testing;

use std::sync::atomic::{AtomicBool, Ordering};

use comshadow_common::BridgeConfig;

pub use bridge::{guard, guard_value, Call};
pub use guid::Guid;
pub use instance::{add_ref, release, resolve, Session, ShadowInstance};
pub use marshal::handle::ComPtr;
pub use registry::{CallbackRegistry, ManagedObject, Registration};
pub use shape::{
    Direction, Length, MarshalKind, MethodSig, Param, Primitive, ResultKind, ShadowVtable, ShapeDef,
    ShapeError, ShapeId, ShapeInfo, ShapeRegistry, Thunk,
};
pub use status::{CallbackError, CallbackResult, Status};

/// Global flag for per-thunk call tracing
static TRACE_CALLS: AtomicBool = AtomicBool::new(false);

/// Apply bridge settings. Safe to call more than once.
pub fn configure(config: &BridgeConfig) {
    TRACE_CALLS.store(config.trace_calls, Ordering::SeqCst);
    tracing::debug!("Bridge configured (trace_calls={})", config.trace_calls);
}

pub(crate) fn trace_calls() -> bool {
    TRACE_CALLS.load(Ordering::Relaxed)
}

/// `true` when no shadow object is alive, i.e. native code holds no reference
/// into this bridge
pub fn can_unload_now() -> bool {
    CallbackRegistry::global().is_empty()
}

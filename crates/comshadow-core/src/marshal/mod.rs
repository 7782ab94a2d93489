//! Argument marshalling between native calls and Rust callbacks
//!
//! - [`string`] – UTF-16 in and out, with per-instance retention
//! - [`buffer`] – two-call buffer queries and pinned read buffers
//! - [`memory`] – native-owned allocations
//! - [`handle`] – reference-counted interface pointers

pub mod buffer;
pub mod handle;
pub mod memory;
pub mod string;

use crate::status::Status;

/// Native 4-byte `BOOL`
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeBool(pub i32);

impl NativeBool {
    pub const FALSE: NativeBool = NativeBool(0);
    pub const TRUE: NativeBool = NativeBool(1);

    pub fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for NativeBool {
    fn from(value: bool) -> Self {
        NativeBool(value as i32)
    }
}

impl From<NativeBool> for bool {
    fn from(value: NativeBool) -> Self {
        value.get()
    }
}

/// Read a nullable input value; null means absent
///
/// # Safety
/// `ptr` must be null or valid for reads of `T`.
pub unsafe fn read_optional<T: Copy>(ptr: *const T) -> Option<T> {
    if ptr.is_null() {
        None
    } else {
        Some(ptr.read_unaligned())
    }
}

/// Store a required output value
///
/// # Safety
/// `ptr` must be null or valid for writes of `T`.
pub unsafe fn write_out<T>(ptr: *mut T, value: T) -> Result<(), Status> {
    if ptr.is_null() {
        return Err(Status::E_POINTER);
    }
    ptr.write_unaligned(value);
    Ok(())
}

/// Store an output the caller may not have asked for; a null destination is
/// skipped
///
/// # Safety
/// `ptr` must be null or valid for writes of `T`.
pub unsafe fn write_optional<T>(ptr: *mut T, value: T) {
    if !ptr.is_null() {
        ptr.write_unaligned(value);
    }
}

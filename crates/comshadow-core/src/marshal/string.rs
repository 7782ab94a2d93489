//! UTF-16 strings
//!
//! Inbound strings are copied into Rust `String`s for the duration of the
//! call. Outbound strings are encoded into native-owned memory and kept alive
//! by the shadow instance that returned them, one string per method slot: the
//! previous string returned by a slot is freed when the slot returns a new one
//! (or none), and all of them are freed when the instance is torn down.

use std::collections::HashMap;
use std::ptr;

use crate::marshal::memory::NativeBuffer;
use crate::status::Status;

/// NUL-terminated UTF-16 string in native-owned memory
pub struct WideString {
    units: NativeBuffer<u16>,
    len: u32,
}

impl WideString {
    pub fn new(s: &str) -> Result<Self, Status> {
        let mut units: Vec<u16> = s.encode_utf16().collect();
        let len = u32::try_from(units.len()).map_err(|_| Status::E_INVALIDARG)?;
        units.push(0);
        Ok(Self { units: NativeBuffer::from_slice(&units)?, len })
    }

    pub fn as_ptr(&self) -> *const u16 {
        self.units.as_ptr()
    }

    /// Length in code units, terminator excluded
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn units(&self) -> &[u16] {
        &self.units.as_slice()[..self.len as usize]
    }
}

/// Decode `len` UTF-16 code units; `None` for a null pointer.
/// Unpaired surrogates are replaced.
///
/// # Safety
/// `ptr` must be null or valid for reads of `len` code units.
pub unsafe fn read_wide(ptr: *const u16, len: u32) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let units = std::slice::from_raw_parts(ptr, len as usize);
    Some(String::from_utf16_lossy(units))
}

/// Decode a NUL-terminated UTF-16 string; `None` for a null pointer
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated run of code units.
pub unsafe fn read_wide_nul(ptr: *const u16) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    Some(String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len)))
}

/// Outbound strings kept alive for native code, keyed by method slot
#[derive(Default)]
pub struct RetainedStrings {
    slots: HashMap<&'static str, WideString>,
}

impl RetainedStrings {
    /// Encode `value` for native code and keep it until `slot` returns again.
    ///
    /// Returns the pointer and code-unit length to hand out; `(null, 0)` for
    /// `None`.
    pub fn retain(&mut self, slot: &'static str, value: Option<&str>) -> Result<(*const u16, u32), Status> {
        match value {
            None => {
                self.slots.remove(slot);
                Ok((ptr::null(), 0))
            }
            Some(s) => {
                let wide = WideString::new(s)?;
                let handed_out = (wide.as_ptr(), wide.len());
                self.slots.insert(slot, wide);
                Ok(handed_out)
            }
        }
    }

    pub fn get(&self, slot: &str) -> Option<&WideString> {
        self.slots.get(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

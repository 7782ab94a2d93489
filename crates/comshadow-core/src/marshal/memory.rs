//! Native-owned allocations
//!
//! Memory handed to native code comes from the COM task allocator on Windows
//! (`CoTaskMemAlloc`), so native code may free anything it receives with
//! `CoTaskMemFree`. Elsewhere the global allocator stands in.

use std::alloc::Layout;
use std::ptr::{self, NonNull};

use crate::status::Status;

/// Fixed-size array in native-owned memory
pub struct NativeBuffer<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
}

// Plain-old-data with unique ownership
unsafe impl<T: Copy + Send> Send for NativeBuffer<T> {}
unsafe impl<T: Copy + Sync> Sync for NativeBuffer<T> {}

impl<T: Copy> NativeBuffer<T> {
    pub fn from_slice(items: &[T]) -> Result<Self, Status> {
        if items.is_empty() {
            return Ok(Self { ptr: NonNull::dangling(), len: 0 });
        }
        let ptr = allocate::<T>(items.len())?;
        // SAFETY: fresh allocation of items.len() elements
        unsafe { ptr::copy_nonoverlapping(items.as_ptr(), ptr.as_ptr(), items.len()) };
        Ok(Self { ptr, len: items.len() })
    }

    /// Null when empty
    pub fn as_ptr(&self) -> *const T {
        if self.len == 0 {
            ptr::null()
        } else {
            self.ptr.as_ptr()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid (or dangling with len 0)
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Give up ownership; native code frees the memory
    pub fn into_raw(self) -> *mut T {
        let ptr = self.as_ptr() as *mut T;
        std::mem::forget(self);
        ptr
    }
}

impl<T: Copy> Drop for NativeBuffer<T> {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated by `allocate` with this length
            unsafe { free(self.ptr, self.len) };
        }
    }
}

fn allocate<T>(count: usize) -> Result<NonNull<T>, Status> {
    let layout = Layout::array::<T>(count).map_err(|_| Status::E_OUTOFMEMORY)?;
    if layout.size() == 0 {
        return Ok(NonNull::dangling());
    }

    #[cfg(windows)]
    let raw = unsafe { windows::Win32::System::Com::CoTaskMemAlloc(layout.size()) } as *mut T;
    #[cfg(not(windows))]
    let raw = unsafe { std::alloc::alloc(layout) } as *mut T;

    NonNull::new(raw).ok_or(Status::E_OUTOFMEMORY)
}

unsafe fn free<T>(ptr: NonNull<T>, count: usize) {
    let Ok(layout) = Layout::array::<T>(count) else {
        return;
    };
    if layout.size() == 0 {
        return;
    }

    #[cfg(windows)]
    windows::Win32::System::Com::CoTaskMemFree(Some(ptr.as_ptr() as *const std::ffi::c_void));
    #[cfg(not(windows))]
    std::alloc::dealloc(ptr.as_ptr() as *mut u8, layout);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_in() {
        let buffer = NativeBuffer::from_slice(&[1u16, 2, 3]).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
        assert!(!buffer.as_ptr().is_null());
    }

    #[test]
    fn test_empty_is_null() {
        let buffer = NativeBuffer::<u32>::from_slice(&[]).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.as_ptr().is_null());
        assert!(buffer.into_raw().is_null());
    }
}

//! Array parameters
//!
//! Output arrays follow the two-call convention: a call with a null
//! destination (or zero capacity) only reports the required count; a second
//! call with enough room copies the data.

use std::collections::HashMap;

use crate::status::Status;

/// Serve one side of a two-call query.
///
/// Writes `src.len()` to `out_count` in every case. With a null `dst` or zero
/// capacity this is a size query and succeeds. With room for fewer than
/// `src.len()` elements it fails with `E_NOT_SUFFICIENT_BUFFER` and writes
/// nothing to `dst`.
///
/// # Safety
/// `dst` must be null or valid for writes of `capacity` elements; `out_count`
/// must be null or valid for a write.
pub unsafe fn fill<T: Copy>(src: &[T], dst: *mut T, capacity: u32, out_count: *mut u32) -> Result<(), Status> {
    if out_count.is_null() {
        return Err(Status::E_POINTER);
    }
    let required = u32::try_from(src.len()).map_err(|_| Status::E_INVALIDARG)?;
    *out_count = required;

    if dst.is_null() || capacity == 0 {
        return Ok(());
    }
    if capacity < required {
        return Err(Status::E_NOT_SUFFICIENT_BUFFER);
    }
    std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
    Ok(())
}

/// Caller side of the two-call query: ask for the size, then fetch.
///
/// `call(dst, capacity, out_count)` is invoked at most twice.
pub fn query_then_fill<T, F>(mut call: F) -> Result<Vec<T>, Status>
where
    T: Copy + Default,
    F: FnMut(*mut T, u32, *mut u32) -> Status,
{
    let mut required = 0u32;
    call(std::ptr::null_mut(), 0, &mut required).ok()?;
    if required == 0 {
        return Ok(Vec::new());
    }

    let mut items = vec![T::default(); required as usize];
    let mut written = 0u32;
    call(items.as_mut_ptr(), required, &mut written).ok()?;
    items.truncate(written as usize);
    Ok(items)
}

/// Borrow an input array; a null pointer reads as empty only when `count` is 0
///
/// # Safety
/// `ptr` must be valid for reads of `count` elements when non-null.
pub unsafe fn read_slice<'a, T>(ptr: *const T, count: u32) -> Result<&'a [T], Status> {
    match (ptr.is_null(), count) {
        (_, 0) => Ok(&[]),
        (true, _) => Err(Status::E_POINTER),
        (false, n) => Ok(std::slice::from_raw_parts(ptr, n as usize)),
    }
}

/// Reject parallel arrays whose lengths disagree with the count they share.
///
/// `None` entries are optional arrays the caller did not supply.
pub fn check_parallel(count: usize, lengths: &[Option<usize>]) -> Result<(), Status> {
    if lengths.iter().flatten().all(|&len| len == count) {
        Ok(())
    } else {
        Err(Status::E_INVALIDARG)
    }
}

/// Buffers native code reads until it hands the context token back
#[derive(Default)]
pub struct PinnedBuffers {
    next: usize,
    pins: HashMap<usize, Box<[u8]>>,
}

impl PinnedBuffers {
    /// Pin `data`; returns its address and a non-zero context token
    pub fn pin(&mut self, data: Vec<u8>) -> (*const u8, usize) {
        self.next += 1;
        let token = self.next;
        let data = data.into_boxed_slice();
        let ptr = data.as_ptr();
        self.pins.insert(token, data);
        (ptr, token)
    }

    /// Release a pin; `false` when the token was unknown
    pub fn unpin(&mut self, token: usize) -> bool {
        self.pins.remove(&token).is_some()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

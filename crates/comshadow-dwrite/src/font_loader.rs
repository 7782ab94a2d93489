//! Custom font file loading: `IDWriteFontFileLoader` and `IDWriteFontFileStream`
//!
//! A loader turns an opaque reference key into a stream. Streams hand out
//! fragments of the file; each fragment stays pinned in the stream's shadow
//! until native code releases it by context token, or until the stream is
//! torn down.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use anyhow::anyhow;
use comshadow_core::marshal::buffer::read_slice;
use comshadow_core::marshal::handle::hand_out;
use comshadow_core::marshal::write_out;
use comshadow_core::{
    guard, guard_value, CallbackResult, ComPtr, Guid, ManagedObject, MarshalKind, MethodSig, ResultKind,
    ShadowInstance, ShapeDef, ShapeError, ShapeId, Status,
};
use tracing::{debug, warn};

pub const FONT_FILE_LOADER: ShapeId = ShapeId::new("IDWriteFontFileLoader");
pub const IID_FONT_FILE_LOADER: Guid = Guid::from_u128(0x727cad4e_d6af_4c9e_8a08_d695b11caa49);

pub const FONT_FILE_STREAM: ShapeId = ShapeId::new("IDWriteFontFileStream");
pub const IID_FONT_FILE_STREAM: Guid = Guid::from_u128(0x6d4865fe_0ab8_4d91_8f62_5dd6be34a3e0);

pub trait FontFileLoader: Send + Sync {
    /// Open the font file identified by `key`
    fn create_stream_from_key(&self, key: &[u8]) -> CallbackResult<Arc<dyn FontFileStream>>;
}

pub trait FontFileStream: Send + Sync {
    /// Exactly `size` bytes starting at `offset`. Reads past the end of the
    /// file must fail.
    fn read_file_fragment(&self, offset: u64, size: u64) -> CallbackResult<Vec<u8>>;

    fn file_size(&self) -> CallbackResult<u64>;

    /// FILETIME-style timestamp; 0 when unknown
    fn last_write_time(&self) -> CallbackResult<u64> {
        Ok(0)
    }
}

/// Stream over a font file held in memory
pub struct InMemoryFontStream {
    data: Arc<[u8]>,
    last_write_time: u64,
}

impl InMemoryFontStream {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into(), last_write_time: 0 }
    }

    pub fn with_last_write_time(mut self, time: u64) -> Self {
        self.last_write_time = time;
        self
    }
}

impl FontFileStream for InMemoryFontStream {
    fn read_file_fragment(&self, offset: u64, size: u64) -> CallbackResult<Vec<u8>> {
        let len = self.data.len() as u64;
        let end = offset.checked_add(size).filter(|&end| end <= len).ok_or_else(|| {
            anyhow!("fragment {}+{} is outside the {}-byte file", offset, size, len)
        })?;
        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn file_size(&self) -> CallbackResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn last_write_time(&self) -> CallbackResult<u64> {
        Ok(self.last_write_time)
    }
}

pub fn shadow_font_file_loader(loader: Arc<dyn FontFileLoader>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(FONT_FILE_LOADER, ManagedObject::of(loader))
}

pub fn shadow_font_file_stream(stream: Arc<dyn FontFileStream>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(FONT_FILE_STREAM, ManagedObject::of(stream))
}

// ============================================================================
// Thunks
// ============================================================================

unsafe extern "system" fn create_stream_from_key(
    this: *mut c_void,
    key: *const c_void,
    key_size: u32,
    stream: *mut *mut c_void,
) -> Status {
    guard(this, "CreateStreamFromKey", |call| {
        hand_out(None, stream)?;
        let key = read_slice(key as *const u8, key_size)?;
        let loader = call.view::<dyn FontFileLoader>()?;

        let created = shadow_font_file_stream(loader.create_stream_from_key(key)?).map_err(anyhow::Error::from)?;
        hand_out(Some(&created), stream)?;
        call.session().adopt(created);
        Ok(())
    })
}

unsafe extern "system" fn read_file_fragment(
    this: *mut c_void,
    fragment_start: *mut *const c_void,
    file_offset: u64,
    fragment_size: u64,
    fragment_context: *mut *mut c_void,
) -> Status {
    guard(this, "ReadFileFragment", |call| {
        write_out(fragment_start, ptr::null())?;
        write_out(fragment_context, ptr::null_mut())?;
        let stream = call.view::<dyn FontFileStream>()?;

        let data = stream.read_file_fragment(file_offset, fragment_size)?;
        if data.len() as u64 != fragment_size {
            return Err(anyhow!("stream returned {} bytes for a {}-byte fragment", data.len(), fragment_size).into());
        }
        let (start, token) = call.session().pins.pin(data);
        *fragment_start = start as *const c_void;
        *fragment_context = token as *mut c_void;
        Ok(())
    })
}

unsafe extern "system" fn release_file_fragment(this: *mut c_void, fragment_context: *mut c_void) {
    guard_value(this, "ReleaseFileFragment", (), |call| {
        if !call.session().pins.unpin(fragment_context as usize) {
            warn!("ReleaseFileFragment: unknown fragment context {:p}", fragment_context);
        }
        Ok(())
    })
}

unsafe extern "system" fn get_file_size(this: *mut c_void, file_size: *mut u64) -> Status {
    guard(this, "GetFileSize", |call| {
        let size = call.view::<dyn FontFileStream>()?.file_size()?;
        write_out(file_size, size)?;
        Ok(())
    })
}

unsafe extern "system" fn get_last_write_time(this: *mut c_void, last_write_time: *mut u64) -> Status {
    guard(this, "GetLastWriteTime", |call| {
        let time = call.view::<dyn FontFileStream>()?.last_write_time()?;
        write_out(last_write_time, time)?;
        Ok(())
    })
}

pub(crate) fn shapes() -> Vec<ShapeDef> {
    vec![
        ShapeDef::new(FONT_FILE_LOADER, IID_FONT_FILE_LOADER).slots(4).method(
            MethodSig::new("CreateStreamFromKey")
                .input("fontFileReferenceKey", MarshalKind::buffer::<u8>("u8", "fontFileReferenceKeySize"))
                .input("fontFileReferenceKeySize", MarshalKind::U32)
                .output("fontFileStream", MarshalKind::handle(IID_FONT_FILE_STREAM)),
            create_stream_from_key as *const c_void,
        ),
        ShapeDef::new(FONT_FILE_STREAM, IID_FONT_FILE_STREAM)
            .slots(7)
            .method(
                MethodSig::new("ReadFileFragment")
                    .output("fragmentStart", MarshalKind::buffer::<u8>("u8", "fragmentSize"))
                    .input("fileOffset", MarshalKind::U64)
                    .input("fragmentSize", MarshalKind::U64)
                    .output("fragmentContext", MarshalKind::CONTEXT),
                read_file_fragment as *const c_void,
            )
            .method(
                MethodSig::new("ReleaseFileFragment")
                    .input("fragmentContext", MarshalKind::CONTEXT)
                    .returns(ResultKind::Void),
                release_file_fragment as *const c_void,
            )
            .method(
                MethodSig::new("GetFileSize").output("fileSize", MarshalKind::U64),
                get_file_size as *const c_void,
            )
            .method(
                MethodSig::new("GetLastWriteTime").output("lastWriteTime", MarshalKind::U64),
                get_last_write_time as *const c_void,
            ),
    ]
}

// ============================================================================
// Calling native implementations
// ============================================================================

type CreateStreamFromKeyFn = unsafe extern "system" fn(*mut c_void, *const c_void, u32, *mut *mut c_void) -> Status;
type ReadFileFragmentFn =
    unsafe extern "system" fn(*mut c_void, *mut *const c_void, u64, u64, *mut *mut c_void) -> Status;
type ReleaseFileFragmentFn = unsafe extern "system" fn(*mut c_void, *mut c_void);
type U64OutFn = unsafe extern "system" fn(*mut c_void, *mut u64) -> Status;

/// `IDWriteFontFileLoader` implemented by someone else
#[derive(Debug, Clone)]
pub struct NativeFontFileLoader(pub ComPtr);

impl NativeFontFileLoader {
    pub fn create_stream_from_key(&self, key: &[u8]) -> Result<NativeFontFileStream, Status> {
        let key_size = u32::try_from(key.len()).map_err(|_| Status::E_INVALIDARG)?;
        let mut stream = ptr::null_mut();
        unsafe {
            let f: CreateStreamFromKeyFn = self.0.method(3);
            f(self.0.as_raw(), key.as_ptr() as *const c_void, key_size, &mut stream).ok()?;
            ComPtr::from_raw(stream).map(NativeFontFileStream).ok_or(Status::E_POINTER)
        }
    }
}

/// `IDWriteFontFileStream` implemented by someone else
#[derive(Debug, Clone)]
pub struct NativeFontFileStream(pub ComPtr);

impl NativeFontFileStream {
    /// Read a fragment and copy it out, releasing it before returning
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, Status> {
        let mut start = ptr::null();
        let mut context = ptr::null_mut();
        unsafe {
            let read: ReadFileFragmentFn = self.0.method(3);
            read(self.0.as_raw(), &mut start, offset, size, &mut context).ok()?;
            let bytes = read_slice(start as *const u8, u32::try_from(size).map_err(|_| Status::E_INVALIDARG)?)
                .map(<[u8]>::to_vec);
            let release: ReleaseFileFragmentFn = self.0.method(4);
            release(self.0.as_raw(), context);
            debug!("Read {} bytes at offset {} from {:?}", size, offset, self.0);
            bytes
        }
    }

    pub fn file_size(&self) -> Result<u64, Status> {
        self.read_u64(5)
    }

    pub fn last_write_time(&self) -> Result<u64, Status> {
        self.read_u64(6)
    }

    fn read_u64(&self, slot: usize) -> Result<u64, Status> {
        let mut value = 0;
        unsafe {
            let f: U64OutFn = self.0.method(slot);
            f(self.0.as_raw(), &mut value).ok()?;
        }
        Ok(value)
    }
}

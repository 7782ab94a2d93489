//! Custom font collections: `IDWriteFontCollectionLoader` and
//! `IDWriteFontFileEnumerator`

use std::ffi::c_void;
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

use comshadow_core::marshal::buffer::read_slice;
use comshadow_core::marshal::handle::hand_out;
use comshadow_core::marshal::{write_out, NativeBool};
use comshadow_core::{
    guard, CallbackError, CallbackResult, ComPtr, Guid, ManagedObject, MarshalKind, MethodSig, ShadowInstance,
    ShapeDef, ShapeError, ShapeId, Status,
};

pub const FONT_COLLECTION_LOADER: ShapeId = ShapeId::new("IDWriteFontCollectionLoader");
pub const IID_FONT_COLLECTION_LOADER: Guid = Guid::from_u128(0xcca920e4_52f0_492b_bfa8_29c72ee0a468);

pub const FONT_FILE_ENUMERATOR: ShapeId = ShapeId::new("IDWriteFontFileEnumerator");
pub const IID_FONT_FILE_ENUMERATOR: Guid = Guid::from_u128(0x72755049_5ff7_435d_8348_4be97cfa6c7c);

pub trait FontCollectionLoader: Send + Sync {
    /// `factory` is the calling factory, borrowed for the duration of the call
    /// unless the loader keeps the clone
    fn create_enumerator_from_key(
        &self,
        factory: Option<ComPtr>,
        key: &[u8],
    ) -> CallbackResult<Arc<dyn FontFileEnumerator>>;
}

pub trait FontFileEnumerator: Send + Sync {
    /// Advance; `false` once the files are exhausted
    fn move_next(&self) -> CallbackResult<bool>;

    /// The `IDWriteFontFile` at the current position
    fn current_font_file(&self) -> CallbackResult<ComPtr>;
}

/// Enumerator over a fixed list of font files
pub struct ListFontFileEnumerator {
    files: Vec<ComPtr>,
    cursor: Mutex<Option<usize>>,
}

impl ListFontFileEnumerator {
    pub fn new(files: Vec<ComPtr>) -> Self {
        Self { files, cursor: Mutex::new(None) }
    }
}

impl FontFileEnumerator for ListFontFileEnumerator {
    fn move_next(&self) -> CallbackResult<bool> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let next = cursor.map_or(0, |i| (i + 1).min(self.files.len()));
        *cursor = Some(next);
        Ok(next < self.files.len())
    }

    fn current_font_file(&self) -> CallbackResult<ComPtr> {
        let cursor = *self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        cursor
            .and_then(|i| self.files.get(i))
            .cloned()
            .ok_or(CallbackError::Status(Status::E_BOUNDS))
    }
}

pub fn shadow_font_collection_loader(loader: Arc<dyn FontCollectionLoader>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(FONT_COLLECTION_LOADER, ManagedObject::of(loader))
}

pub fn shadow_font_file_enumerator(enumerator: Arc<dyn FontFileEnumerator>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(FONT_FILE_ENUMERATOR, ManagedObject::of(enumerator))
}

// ============================================================================
// Thunks
// ============================================================================

unsafe extern "system" fn create_enumerator_from_key(
    this: *mut c_void,
    factory: *mut c_void,
    key: *const c_void,
    key_size: u32,
    enumerator: *mut *mut c_void,
) -> Status {
    guard(this, "CreateEnumeratorFromKey", |call| {
        hand_out(None, enumerator)?;
        let key = read_slice(key as *const u8, key_size)?;
        let loader = call.view::<dyn FontCollectionLoader>()?;

        let created = loader.create_enumerator_from_key(ComPtr::from_borrowed(factory), key)?;
        let created = shadow_font_file_enumerator(created).map_err(anyhow::Error::from)?;
        hand_out(Some(&created), enumerator)?;
        call.session().adopt(created);
        Ok(())
    })
}

unsafe extern "system" fn move_next(this: *mut c_void, has_current_file: *mut NativeBool) -> Status {
    guard(this, "MoveNext", |call| {
        write_out(has_current_file, NativeBool::FALSE)?;
        let more = call.view::<dyn FontFileEnumerator>()?.move_next()?;
        *has_current_file = more.into();
        Ok(())
    })
}

unsafe extern "system" fn get_current_font_file(this: *mut c_void, font_file: *mut *mut c_void) -> Status {
    guard(this, "GetCurrentFontFile", |call| {
        hand_out(None, font_file)?;
        let file = call.view::<dyn FontFileEnumerator>()?.current_font_file()?;
        hand_out(Some(&file), font_file)?;
        Ok(())
    })
}

pub(crate) fn shapes() -> Vec<ShapeDef> {
    vec![
        ShapeDef::new(FONT_COLLECTION_LOADER, IID_FONT_COLLECTION_LOADER).slots(4).method(
            MethodSig::new("CreateEnumeratorFromKey")
                .input("factory", MarshalKind::HANDLE)
                .input("collectionKey", MarshalKind::buffer::<u8>("u8", "collectionKeySize"))
                .input("collectionKeySize", MarshalKind::U32)
                .output("fontFileEnumerator", MarshalKind::handle(IID_FONT_FILE_ENUMERATOR)),
            create_enumerator_from_key as *const c_void,
        ),
        ShapeDef::new(FONT_FILE_ENUMERATOR, IID_FONT_FILE_ENUMERATOR)
            .slots(5)
            .method(MethodSig::new("MoveNext").output("hasCurrentFile", MarshalKind::BOOL), move_next as *const c_void)
            .method(
                MethodSig::new("GetCurrentFontFile").output("fontFile", MarshalKind::HANDLE),
                get_current_font_file as *const c_void,
            ),
    ]
}

// ============================================================================
// Calling native implementations
// ============================================================================

type CreateEnumeratorFromKeyFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, *const c_void, u32, *mut *mut c_void) -> Status;
type MoveNextFn = unsafe extern "system" fn(*mut c_void, *mut NativeBool) -> Status;
type GetCurrentFontFileFn = unsafe extern "system" fn(*mut c_void, *mut *mut c_void) -> Status;

#[derive(Debug, Clone)]
pub struct NativeFontCollectionLoader(pub ComPtr);

impl NativeFontCollectionLoader {
    pub fn create_enumerator_from_key(
        &self,
        factory: Option<&ComPtr>,
        key: &[u8],
    ) -> Result<NativeFontFileEnumerator, Status> {
        let key_size = u32::try_from(key.len()).map_err(|_| Status::E_INVALIDARG)?;
        let mut enumerator = ptr::null_mut();
        unsafe {
            let f: CreateEnumeratorFromKeyFn = self.0.method(3);
            f(
                self.0.as_raw(),
                factory.map_or(ptr::null_mut(), ComPtr::as_raw),
                key.as_ptr() as *const c_void,
                key_size,
                &mut enumerator,
            )
            .ok()?;
            ComPtr::from_raw(enumerator).map(NativeFontFileEnumerator).ok_or(Status::E_POINTER)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NativeFontFileEnumerator(pub ComPtr);

impl NativeFontFileEnumerator {
    pub fn move_next(&self) -> Result<bool, Status> {
        let mut has_current = NativeBool::FALSE;
        unsafe {
            let f: MoveNextFn = self.0.method(3);
            f(self.0.as_raw(), &mut has_current).ok()?;
        }
        Ok(has_current.get())
    }

    pub fn current_font_file(&self) -> Result<ComPtr, Status> {
        let mut file = ptr::null_mut();
        unsafe {
            let f: GetCurrentFontFileFn = self.0.method(4);
            f(self.0.as_raw(), &mut file).ok()?;
            ComPtr::from_raw(file).ok_or(Status::E_POINTER)
        }
    }

    /// Drain the enumerator
    pub fn collect(&self) -> Result<Vec<ComPtr>, Status> {
        let mut files = Vec::new();
        while self.move_next()? {
            files.push(self.current_font_file()?);
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font_loader::{shadow_font_file_stream, InMemoryFontStream};

    fn file(byte: u8) -> ComPtr {
        // Any live COM object will do as a stand-in font file
        shadow_font_file_stream(Arc::new(InMemoryFontStream::new(vec![byte]))).unwrap()
    }

    #[test]
    fn test_list_enumerator_cursor() {
        let files = vec![file(1), file(2)];
        let list = ListFontFileEnumerator::new(files.clone());

        assert_eq!(list.current_font_file().unwrap_err().status(), Status::E_BOUNDS);
        assert!(list.move_next().unwrap());
        assert_eq!(list.current_font_file().unwrap(), files[0]);
        assert!(list.move_next().unwrap());
        assert!(!list.move_next().unwrap());
        assert!(!list.move_next().unwrap());
        assert!(list.current_font_file().is_err());
    }

    #[test]
    fn test_enumerator_through_vtable() {
        let files = vec![file(1), file(2), file(3)];
        let shadow = shadow_font_file_enumerator(Arc::new(ListFontFileEnumerator::new(files.clone()))).unwrap();
        let enumerator = NativeFontFileEnumerator(shadow);
        assert_eq!(enumerator.collect().unwrap(), files);
    }
}

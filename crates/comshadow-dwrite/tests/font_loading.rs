//! A native font system loading fonts through Rust loaders

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use comshadow_core::{CallbackResult, ComPtr, Status};
use comshadow_dwrite::{
    shadow_font_collection_loader, shadow_font_file_loader, shadow_font_file_stream, FontCollectionLoader,
    FontFileEnumerator, FontFileLoader, FontFileStream, InMemoryFontStream, ListFontFileEnumerator,
    NativeFontCollectionLoader, NativeFontFileLoader,
};

/// Fonts keyed by name
struct Library {
    fonts: HashMap<Vec<u8>, Arc<[u8]>>,
}

impl Library {
    fn new() -> Self {
        let mut fonts = HashMap::new();
        fonts.insert(b"sans".to_vec(), Arc::from(&b"OTTO sans font data"[..]));
        fonts.insert(b"serif".to_vec(), Arc::from(&b"OTTO serif"[..]));
        Self { fonts }
    }
}

impl FontFileLoader for Library {
    fn create_stream_from_key(&self, key: &[u8]) -> CallbackResult<Arc<dyn FontFileStream>> {
        let data = self
            .fonts
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no font for key {:?}", String::from_utf8_lossy(key)))?;
        Ok(Arc::new(InMemoryFontStream::new(data).with_last_write_time(0x01d9_0000_0000_0000)))
    }
}

#[test]
fn test_loader_issues_streams() {
    let loader = NativeFontFileLoader(shadow_font_file_loader(Arc::new(Library::new())).unwrap());

    let stream = loader.create_stream_from_key(b"sans").unwrap();
    assert_eq!(stream.file_size().unwrap(), 19);
    assert_eq!(stream.last_write_time().unwrap(), 0x01d9_0000_0000_0000);
    assert_eq!(stream.read(5, 4).unwrap(), b"sans");
    assert_eq!(stream.read(0, 0).unwrap(), b"");

    // Reads past the end fail without handing out memory
    assert_eq!(stream.read(15, 10), Err(Status::E_FAIL));

    // Unknown keys surface as a failure status
    assert_eq!(loader.create_stream_from_key(b"mono").unwrap_err(), Status::E_FAIL);
}

#[test]
fn test_stream_outlives_native_reference() {
    let loader = NativeFontFileLoader(shadow_font_file_loader(Arc::new(Library::new())).unwrap());
    let stream = loader.create_stream_from_key(b"serif").unwrap();
    let raw = stream.0.as_raw();
    drop(stream);

    // The loader's session still holds the stream
    let again = unsafe { ComPtr::from_borrowed(raw) }.map(comshadow_dwrite::NativeFontFileStream).unwrap();
    assert_eq!(again.file_size().unwrap(), 10);
    drop(again);
    drop(loader);
}

struct Collections {
    files: Vec<ComPtr>,
}

impl FontCollectionLoader for Collections {
    fn create_enumerator_from_key(
        &self,
        factory: Option<ComPtr>,
        key: &[u8],
    ) -> CallbackResult<Arc<dyn FontFileEnumerator>> {
        if factory.is_none() {
            return Err(Status::E_INVALIDARG.into());
        }
        let take = key.first().copied().unwrap_or(0) as usize;
        Ok(Arc::new(ListFontFileEnumerator::new(self.files.iter().take(take).cloned().collect())))
    }
}

#[test]
fn test_collection_enumeration() {
    let files: Vec<ComPtr> = (0..3u8)
        .map(|i| shadow_font_file_stream(Arc::new(InMemoryFontStream::new(vec![i; 4]))).unwrap())
        .collect();
    let loader = NativeFontCollectionLoader(
        shadow_font_collection_loader(Arc::new(Collections { files: files.clone() })).unwrap(),
    );
    // Any COM object can stand in for the factory
    let factory = &files[0];

    let enumerator = loader.create_enumerator_from_key(Some(factory), &[2]).unwrap();
    assert_eq!(enumerator.collect().unwrap(), files[..2].to_vec());
    assert!(!enumerator.move_next().unwrap());

    assert_eq!(loader.create_enumerator_from_key(None, &[2]).unwrap_err(), Status::E_INVALIDARG);
}

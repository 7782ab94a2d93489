//! Whether the bridge can be unloaded once native code lets go.
//!
//! Lives in its own test binary so no other shadow is alive concurrently.

use std::sync::Arc;

use comshadow_core::can_unload_now;
use comshadow_dwrite::{shadow_font_file_loader, FontFileLoader, FontFileStream, InMemoryFontStream, NativeFontFileLoader};

struct Single;

impl FontFileLoader for Single {
    fn create_stream_from_key(&self, key: &[u8]) -> comshadow_core::CallbackResult<Arc<dyn FontFileStream>> {
        Ok(Arc::new(InMemoryFontStream::new(key.to_vec())))
    }
}

#[test]
fn test_can_unload_after_last_release() {
    comshadow_dwrite::install().unwrap();
    assert!(can_unload_now());

    let loader = NativeFontFileLoader(shadow_font_file_loader(Arc::new(Single)).unwrap());
    let stream = loader.create_stream_from_key(b"abc").unwrap();
    assert!(!can_unload_now());

    drop(loader);
    // The stream still has a native reference
    assert!(!can_unload_now());
    assert_eq!(stream.read(0, 3).unwrap(), b"abc");

    drop(stream);
    assert!(can_unload_now());
}

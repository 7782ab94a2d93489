//! DirectWrite callback contracts
//!
//! Rust traits for the interfaces a text engine calls back into (font
//! loaders, text analysis sources and sinks, renderers) together with the
//! shapes that expose them to native code through `comshadow-core`.
//!
//! Every `shadow_*` constructor registers the shapes on first use; call
//! [`install`] up front to surface registration errors early.

pub mod collection_loader;
pub mod font_loader;
pub mod renderer;
pub mod text_sink;
pub mod text_source;
pub mod types;

use std::sync::OnceLock;

use comshadow_core::{ShapeError, ShapeRegistry};

pub use collection_loader::{
    shadow_font_collection_loader, shadow_font_file_enumerator, FontCollectionLoader, FontFileEnumerator,
    ListFontFileEnumerator, NativeFontCollectionLoader, NativeFontFileEnumerator,
};
pub use font_loader::{
    shadow_font_file_loader, shadow_font_file_stream, FontFileLoader, FontFileStream, InMemoryFontStream,
    NativeFontFileLoader, NativeFontFileStream,
};
pub use renderer::{
    shadow_pixel_snapping, shadow_text_renderer, NativeTextRenderer, Origin, PixelSnapping, TextRenderer,
};
pub use text_sink::{
    shadow_text_analysis_sink, shadow_text_analysis_sink1, GlyphOrientation, NativeTextAnalysisSink,
    TextAnalysisSink, TextAnalysisSink1,
};
pub use text_source::{
    shadow_text_analysis_source, shadow_text_analysis_source1, NativeTextAnalysisSource, StringSource,
    TextAnalysisSource, TextAnalysisSource1, VerticalOrientation,
};
pub use types::*;

static INSTALLED: OnceLock<Result<(), ShapeError>> = OnceLock::new();

/// Register every DirectWrite shape with the global shape registry.
///
/// Idempotent; a failure is remembered and returned on every later call.
pub fn install() -> Result<(), ShapeError> {
    INSTALLED.get_or_init(register_all).clone()
}

fn register_all() -> Result<(), ShapeError> {
    let registry = ShapeRegistry::global();
    // Bases precede the shapes that extend them
    let defs = font_loader::shapes()
        .into_iter()
        .chain(collection_loader::shapes())
        .chain(text_source::shapes())
        .chain(text_sink::shapes())
        .chain(renderer::shapes());

    for def in defs {
        let id = def.id();
        registry.register(def).inspect_err(|e| tracing::error!("Failed to register {}: {}", id, e))?;
    }
    tracing::info!("DirectWrite callback shapes installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        install().unwrap();
        install().unwrap();

        let registry = ShapeRegistry::global();
        for id in [
            font_loader::FONT_FILE_LOADER,
            font_loader::FONT_FILE_STREAM,
            collection_loader::FONT_COLLECTION_LOADER,
            collection_loader::FONT_FILE_ENUMERATOR,
            text_source::TEXT_ANALYSIS_SOURCE,
            text_source::TEXT_ANALYSIS_SOURCE1,
            text_sink::TEXT_ANALYSIS_SINK,
            text_sink::TEXT_ANALYSIS_SINK1,
            renderer::PIXEL_SNAPPING,
            renderer::TEXT_RENDERER,
        ] {
            assert!(registry.contains(id), "{} missing", id);
        }
    }

    #[test]
    fn test_derived_shapes_answer_base_iids() {
        install().unwrap();
        let registry = ShapeRegistry::global();
        assert!(registry.supports(renderer::TEXT_RENDERER, &renderer::IID_PIXEL_SNAPPING));
        assert!(registry.supports(text_sink::TEXT_ANALYSIS_SINK1, &text_sink::IID_TEXT_ANALYSIS_SINK));
        assert!(!registry.supports(text_sink::TEXT_ANALYSIS_SINK, &text_sink::IID_TEXT_ANALYSIS_SINK1));

        let info = registry.describe(renderer::TEXT_RENDERER).unwrap();
        assert_eq!(info.slots.len(), 10);
        assert_eq!(info.slots[3].owner, renderer::PIXEL_SNAPPING);
        assert_eq!(info.slots[9].method.name, "DrawInlineObject");
    }
}

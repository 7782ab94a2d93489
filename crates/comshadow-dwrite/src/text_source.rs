//! Text analysis sources: `IDWriteTextAnalysisSource` and
//! `IDWriteTextAnalysisSource1`
//!
//! Strings returned to the analyzer stay valid until the same method returns
//! again on the same source, or until the source is released.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use comshadow_core::marshal::handle::hand_out;
use comshadow_core::marshal::string::{read_wide, read_wide_nul};
use comshadow_core::marshal::write_out;
use comshadow_core::{
    guard, guard_value, Call, CallbackResult, ComPtr, Guid, Length, ManagedObject, MarshalKind, MethodSig, Primitive,
    ResultKind, ShadowInstance, ShapeDef, ShapeError, ShapeId, Status,
};

use crate::types::{ReadingDirection, Ranged, VerticalGlyphOrientation};

pub const TEXT_ANALYSIS_SOURCE: ShapeId = ShapeId::new("IDWriteTextAnalysisSource");
pub const IID_TEXT_ANALYSIS_SOURCE: Guid = Guid::from_u128(0x688e1a58_5094_47c8_adc8_fbcea60ae92b);

pub const TEXT_ANALYSIS_SOURCE1: ShapeId = ShapeId::new("IDWriteTextAnalysisSource1");
pub const IID_TEXT_ANALYSIS_SOURCE1: Guid = Guid::from_u128(0x639cfad8_0fb4_4b21_a58a_067920120009);

pub trait TextAnalysisSource: Send + Sync {
    /// Text from `position` to the end of the run, `None` past the end
    fn text_at_position(&self, position: u32) -> CallbackResult<Option<String>>;

    /// Text from the start of the run up to `position`, `None` at the start
    fn text_before_position(&self, position: u32) -> CallbackResult<Option<String>>;

    fn paragraph_reading_direction(&self) -> CallbackResult<ReadingDirection>;

    fn locale_name(&self, position: u32) -> CallbackResult<Ranged<Option<String>>>;

    /// `IDWriteNumberSubstitution` in effect at `position`, if any
    fn number_substitution(&self, position: u32) -> CallbackResult<Ranged<Option<ComPtr>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerticalOrientation {
    pub orientation: VerticalGlyphOrientation,
    pub bidi_level: u8,
}

pub trait TextAnalysisSource1: TextAnalysisSource {
    fn vertical_glyph_orientation(&self, position: u32) -> CallbackResult<Ranged<VerticalOrientation>>;
}

/// Source over a single string with one locale and direction.
/// Positions are UTF-16 code-unit offsets.
pub struct StringSource {
    text: Vec<u16>,
    locale: String,
    direction: ReadingDirection,
}

impl StringSource {
    pub fn new(text: &str, locale: &str) -> Self {
        Self {
            text: text.encode_utf16().collect(),
            locale: locale.to_string(),
            direction: ReadingDirection::LEFT_TO_RIGHT,
        }
    }

    pub fn with_direction(mut self, direction: ReadingDirection) -> Self {
        self.direction = direction;
        self
    }

    fn remaining(&self, position: u32) -> u32 {
        (self.text.len() as u32).saturating_sub(position)
    }
}

impl TextAnalysisSource for StringSource {
    fn text_at_position(&self, position: u32) -> CallbackResult<Option<String>> {
        Ok(self.text.get(position as usize..).filter(|rest| !rest.is_empty()).map(String::from_utf16_lossy))
    }

    fn text_before_position(&self, position: u32) -> CallbackResult<Option<String>> {
        if position == 0 {
            return Ok(None);
        }
        Ok(self.text.get(..position as usize).map(String::from_utf16_lossy))
    }

    fn paragraph_reading_direction(&self) -> CallbackResult<ReadingDirection> {
        Ok(self.direction)
    }

    fn locale_name(&self, position: u32) -> CallbackResult<Ranged<Option<String>>> {
        Ok(Ranged::new(self.remaining(position), Some(self.locale.clone())))
    }

    fn number_substitution(&self, position: u32) -> CallbackResult<Ranged<Option<ComPtr>>> {
        Ok(Ranged::new(self.remaining(position), None))
    }
}

impl TextAnalysisSource1 for StringSource {
    fn vertical_glyph_orientation(&self, position: u32) -> CallbackResult<Ranged<VerticalOrientation>> {
        let bidi_level = (self.direction == ReadingDirection::RIGHT_TO_LEFT) as u8;
        Ok(Ranged::new(
            self.remaining(position),
            VerticalOrientation { orientation: VerticalGlyphOrientation::DEFAULT, bidi_level },
        ))
    }
}

pub fn shadow_text_analysis_source(source: Arc<dyn TextAnalysisSource>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(TEXT_ANALYSIS_SOURCE, ManagedObject::of(source))
}

/// Shadow answering for both `IDWriteTextAnalysisSource1` and its base
pub fn shadow_text_analysis_source1<S>(source: Arc<S>) -> Result<ComPtr, ShapeError>
where
    S: TextAnalysisSource1 + 'static,
{
    crate::install()?;
    let base: Arc<dyn TextAnalysisSource> = source.clone();
    let derived: Arc<dyn TextAnalysisSource1> = source;
    ShadowInstance::create(TEXT_ANALYSIS_SOURCE1, ManagedObject::of(derived).with_view(base))
}

// ============================================================================
// Thunks
// ============================================================================

unsafe fn return_string(
    call: &Call<'_>,
    slot: &'static str,
    value: Option<&str>,
    text: *mut *const u16,
    length: *mut u32,
) -> Result<(), Status> {
    let (ptr, len) = call.session().strings.retain(slot, value)?;
    *text = ptr;
    *length = len;
    Ok(())
}

unsafe extern "system" fn get_text_at_position(
    this: *mut c_void,
    text_position: u32,
    text_string: *mut *const u16,
    text_length: *mut u32,
) -> Status {
    guard(this, "GetTextAtPosition", |call| {
        write_out(text_string, ptr::null())?;
        write_out(text_length, 0)?;
        let text = call.view::<dyn TextAnalysisSource>()?.text_at_position(text_position)?;
        return_string(call, "GetTextAtPosition", text.as_deref(), text_string, text_length)?;
        Ok(())
    })
}

unsafe extern "system" fn get_text_before_position(
    this: *mut c_void,
    text_position: u32,
    text_string: *mut *const u16,
    text_length: *mut u32,
) -> Status {
    guard(this, "GetTextBeforePosition", |call| {
        write_out(text_string, ptr::null())?;
        write_out(text_length, 0)?;
        let text = call.view::<dyn TextAnalysisSource>()?.text_before_position(text_position)?;
        return_string(call, "GetTextBeforePosition", text.as_deref(), text_string, text_length)?;
        Ok(())
    })
}

unsafe extern "system" fn get_paragraph_reading_direction(this: *mut c_void) -> ReadingDirection {
    guard_value(this, "GetParagraphReadingDirection", ReadingDirection::LEFT_TO_RIGHT, |call| {
        call.view::<dyn TextAnalysisSource>()?.paragraph_reading_direction()
    })
}

unsafe extern "system" fn get_locale_name(
    this: *mut c_void,
    text_position: u32,
    text_length: *mut u32,
    locale_name: *mut *const u16,
) -> Status {
    guard(this, "GetLocaleName", |call| {
        write_out(locale_name, ptr::null())?;
        write_out(text_length, 0)?;
        let locale = call.view::<dyn TextAnalysisSource>()?.locale_name(text_position)?;
        let (name, _) = call.session().strings.retain("GetLocaleName", locale.value.as_deref())?;
        *locale_name = name;
        *text_length = locale.length;
        Ok(())
    })
}

unsafe extern "system" fn get_number_substitution(
    this: *mut c_void,
    text_position: u32,
    text_length: *mut u32,
    number_substitution: *mut *mut c_void,
) -> Status {
    guard(this, "GetNumberSubstitution", |call| {
        hand_out(None, number_substitution)?;
        write_out(text_length, 0)?;
        let substitution = call.view::<dyn TextAnalysisSource>()?.number_substitution(text_position)?;
        hand_out(substitution.value.as_ref(), number_substitution)?;
        *text_length = substitution.length;
        Ok(())
    })
}

unsafe extern "system" fn get_vertical_glyph_orientation(
    this: *mut c_void,
    text_position: u32,
    text_length: *mut u32,
    glyph_orientation: *mut VerticalGlyphOrientation,
    bidi_level: *mut u8,
) -> Status {
    guard(this, "GetVerticalGlyphOrientation", |call| {
        write_out(text_length, 0)?;
        write_out(glyph_orientation, VerticalGlyphOrientation::DEFAULT)?;
        write_out(bidi_level, 0)?;
        let run = call.view::<dyn TextAnalysisSource1>()?.vertical_glyph_orientation(text_position)?;
        *text_length = run.length;
        *glyph_orientation = run.value.orientation;
        *bidi_level = run.value.bidi_level;
        Ok(())
    })
}

fn text_getter(name: &'static str) -> MethodSig {
    MethodSig::new(name)
        .input("textPosition", MarshalKind::U32)
        .output("textString", MarshalKind::string(Length::Param("textLength")))
        .output("textLength", MarshalKind::U32)
}

pub(crate) fn shapes() -> Vec<ShapeDef> {
    vec![
        ShapeDef::new(TEXT_ANALYSIS_SOURCE, IID_TEXT_ANALYSIS_SOURCE)
            .slots(8)
            .method(text_getter("GetTextAtPosition"), get_text_at_position as *const c_void)
            .method(text_getter("GetTextBeforePosition"), get_text_before_position as *const c_void)
            .method(
                MethodSig::new("GetParagraphReadingDirection").returns(ResultKind::Primitive(Primitive::Enum)),
                get_paragraph_reading_direction as *const c_void,
            )
            .method(
                MethodSig::new("GetLocaleName")
                    .input("textPosition", MarshalKind::U32)
                    .output("textLength", MarshalKind::U32)
                    .output("localeName", MarshalKind::string(Length::NulTerminated)),
                get_locale_name as *const c_void,
            )
            .method(
                MethodSig::new("GetNumberSubstitution")
                    .input("textPosition", MarshalKind::U32)
                    .output("textLength", MarshalKind::U32)
                    .output("numberSubstitution", MarshalKind::HANDLE),
                get_number_substitution as *const c_void,
            ),
        ShapeDef::new(TEXT_ANALYSIS_SOURCE1, IID_TEXT_ANALYSIS_SOURCE1)
            .extends(TEXT_ANALYSIS_SOURCE)
            .slots(9)
            .method(
                MethodSig::new("GetVerticalGlyphOrientation")
                    .input("textPosition", MarshalKind::U32)
                    .output("textLength", MarshalKind::U32)
                    .output("glyphOrientation", MarshalKind::ENUM)
                    .output("bidiLevel", MarshalKind::U8),
                get_vertical_glyph_orientation as *const c_void,
            ),
    ]
}

// ============================================================================
// Calling native implementations
// ============================================================================

type TextGetterFn = unsafe extern "system" fn(*mut c_void, u32, *mut *const u16, *mut u32) -> Status;
type ReadingDirectionFn = unsafe extern "system" fn(*mut c_void) -> ReadingDirection;
type LocaleNameFn = unsafe extern "system" fn(*mut c_void, u32, *mut u32, *mut *const u16) -> Status;
type NumberSubstitutionFn = unsafe extern "system" fn(*mut c_void, u32, *mut u32, *mut *mut c_void) -> Status;
type VerticalGlyphOrientationFn =
    unsafe extern "system" fn(*mut c_void, u32, *mut u32, *mut VerticalGlyphOrientation, *mut u8) -> Status;

/// An analysis source as the text analyzer sees it
#[derive(Debug, Clone)]
pub struct NativeTextAnalysisSource(pub ComPtr);

impl NativeTextAnalysisSource {
    pub fn text_at_position(&self, position: u32) -> Result<Option<String>, Status> {
        self.text(3, position)
    }

    pub fn text_before_position(&self, position: u32) -> Result<Option<String>, Status> {
        self.text(4, position)
    }

    fn text(&self, slot: usize, position: u32) -> Result<Option<String>, Status> {
        let mut text = ptr::null();
        let mut length = 0;
        unsafe {
            let f: TextGetterFn = self.0.method(slot);
            f(self.0.as_raw(), position, &mut text, &mut length).ok()?;
            Ok(read_wide(text, length))
        }
    }

    pub fn paragraph_reading_direction(&self) -> ReadingDirection {
        unsafe {
            let f: ReadingDirectionFn = self.0.method(5);
            f(self.0.as_raw())
        }
    }

    pub fn locale_name(&self, position: u32) -> Result<Ranged<Option<String>>, Status> {
        let mut length = 0;
        let mut locale = ptr::null();
        unsafe {
            let f: LocaleNameFn = self.0.method(6);
            f(self.0.as_raw(), position, &mut length, &mut locale).ok()?;
            Ok(Ranged::new(length, read_wide_nul(locale)))
        }
    }

    pub fn number_substitution(&self, position: u32) -> Result<Ranged<Option<ComPtr>>, Status> {
        let mut length = 0;
        let mut substitution = ptr::null_mut();
        unsafe {
            let f: NumberSubstitutionFn = self.0.method(7);
            f(self.0.as_raw(), position, &mut length, &mut substitution).ok()?;
            Ok(Ranged::new(length, ComPtr::from_raw(substitution)))
        }
    }

    /// Only valid on sources that answer for `IDWriteTextAnalysisSource1`
    pub fn vertical_glyph_orientation(&self, position: u32) -> Result<Ranged<VerticalOrientation>, Status> {
        let source1 = self.0.query_interface(&IID_TEXT_ANALYSIS_SOURCE1)?;
        let mut length = 0;
        let mut orientation = VerticalGlyphOrientation::DEFAULT;
        let mut bidi_level = 0;
        unsafe {
            let f: VerticalGlyphOrientationFn = source1.method(8);
            f(source1.as_raw(), position, &mut length, &mut orientation, &mut bidi_level).ok()?;
        }
        Ok(Ranged::new(length, VerticalOrientation { orientation, bidi_level }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_source_positions() {
        let source = StringSource::new("abc", "en-US");
        assert_eq!(source.text_at_position(1).unwrap().as_deref(), Some("bc"));
        assert_eq!(source.text_at_position(3).unwrap(), None);
        assert_eq!(source.text_at_position(9).unwrap(), None);
        assert_eq!(source.text_before_position(2).unwrap().as_deref(), Some("ab"));
        assert_eq!(source.text_before_position(0).unwrap(), None);
        assert_eq!(source.locale_name(1).unwrap(), Ranged::new(2, Some("en-US".to_string())));
    }

    #[test]
    fn test_source_through_vtable() {
        let shadow = shadow_text_analysis_source(Arc::new(
            StringSource::new("שלום", "he-IL").with_direction(ReadingDirection::RIGHT_TO_LEFT),
        ))
        .unwrap();
        let source = NativeTextAnalysisSource(shadow);

        assert_eq!(source.text_at_position(2).unwrap().as_deref(), Some("ום"));
        assert_eq!(source.paragraph_reading_direction(), ReadingDirection::RIGHT_TO_LEFT);
        assert_eq!(source.locale_name(0).unwrap(), Ranged::new(4, Some("he-IL".to_string())));
        let substitution = source.number_substitution(0).unwrap();
        assert_eq!(substitution.length, 4);
        assert!(substitution.value.is_none());
    }

    #[test]
    fn test_plain_source_is_not_source1() {
        let shadow = shadow_text_analysis_source(Arc::new(StringSource::new("x", "en-US"))).unwrap();
        let source = NativeTextAnalysisSource(shadow);
        assert_eq!(source.vertical_glyph_orientation(0).unwrap_err(), Status::E_NOINTERFACE);
    }

    #[test]
    fn test_source1_answers_both_shapes() {
        let shadow = shadow_text_analysis_source1(Arc::new(
            StringSource::new("abc", "ar-EG").with_direction(ReadingDirection::RIGHT_TO_LEFT),
        ))
        .unwrap();
        let source = NativeTextAnalysisSource(shadow);

        assert_eq!(source.text_before_position(1).unwrap().as_deref(), Some("a"));
        let run = source.vertical_glyph_orientation(1).unwrap();
        assert_eq!(run.length, 2);
        assert_eq!(run.value.bidi_level, 1);
        assert_eq!(run.value.orientation, VerticalGlyphOrientation::DEFAULT);
    }
}

//! Analysis results: `IDWriteTextAnalysisSink` and `IDWriteTextAnalysisSink1`

use std::ffi::c_void;
use std::sync::Arc;

use comshadow_core::marshal::buffer::read_slice;
use comshadow_core::marshal::{read_optional, NativeBool};
use comshadow_core::{
    guard, CallbackResult, ComPtr, Guid, ManagedObject, MarshalKind, MethodSig, ShadowInstance, ShapeDef, ShapeError,
    ShapeId, Status,
};

use crate::types::{GlyphOrientationAngle, LineBreakpoint, ScriptAnalysis};

pub const TEXT_ANALYSIS_SINK: ShapeId = ShapeId::new("IDWriteTextAnalysisSink");
pub const IID_TEXT_ANALYSIS_SINK: Guid = Guid::from_u128(0x5810cd44_0ca0_4701_b3fa_bec5182ae4f6);

pub const TEXT_ANALYSIS_SINK1: ShapeId = ShapeId::new("IDWriteTextAnalysisSink1");
pub const IID_TEXT_ANALYSIS_SINK1: Guid = Guid::from_u128(0xb0d941a0_85e7_4d8b_9fd3_5ced9934482a);

pub trait TextAnalysisSink: Send + Sync {
    fn set_script_analysis(&self, position: u32, length: u32, analysis: ScriptAnalysis) -> CallbackResult<()>;

    /// One breakpoint per code unit starting at `position`
    fn set_line_breakpoints(&self, position: u32, breakpoints: &[LineBreakpoint]) -> CallbackResult<()>;

    fn set_bidi_level(&self, position: u32, length: u32, explicit_level: u8, resolved_level: u8)
        -> CallbackResult<()>;

    fn set_number_substitution(
        &self,
        position: u32,
        length: u32,
        substitution: Option<ComPtr>,
    ) -> CallbackResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphOrientation {
    pub angle: GlyphOrientationAngle,
    pub adjusted_bidi_level: u8,
    pub is_sideways: bool,
    pub is_right_to_left: bool,
}

pub trait TextAnalysisSink1: TextAnalysisSink {
    fn set_glyph_orientation(&self, position: u32, length: u32, orientation: GlyphOrientation) -> CallbackResult<()>;
}

pub fn shadow_text_analysis_sink(sink: Arc<dyn TextAnalysisSink>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(TEXT_ANALYSIS_SINK, ManagedObject::of(sink))
}

/// Shadow answering for both `IDWriteTextAnalysisSink1` and its base
pub fn shadow_text_analysis_sink1<S>(sink: Arc<S>) -> Result<ComPtr, ShapeError>
where
    S: TextAnalysisSink1 + 'static,
{
    crate::install()?;
    let base: Arc<dyn TextAnalysisSink> = sink.clone();
    let derived: Arc<dyn TextAnalysisSink1> = sink;
    ShadowInstance::create(TEXT_ANALYSIS_SINK1, ManagedObject::of(derived).with_view(base))
}

// ============================================================================
// Thunks
// ============================================================================

unsafe extern "system" fn set_script_analysis(
    this: *mut c_void,
    text_position: u32,
    text_length: u32,
    script_analysis: *const ScriptAnalysis,
) -> Status {
    guard(this, "SetScriptAnalysis", |call| {
        let analysis = read_optional(script_analysis).ok_or(Status::E_POINTER)?;
        call.view::<dyn TextAnalysisSink>()?.set_script_analysis(text_position, text_length, analysis)
    })
}

unsafe extern "system" fn set_line_breakpoints(
    this: *mut c_void,
    text_position: u32,
    text_length: u32,
    line_breakpoints: *const LineBreakpoint,
) -> Status {
    guard(this, "SetLineBreakpoints", |call| {
        let breakpoints = read_slice(line_breakpoints, text_length)?;
        call.view::<dyn TextAnalysisSink>()?.set_line_breakpoints(text_position, breakpoints)
    })
}

unsafe extern "system" fn set_bidi_level(
    this: *mut c_void,
    text_position: u32,
    text_length: u32,
    explicit_level: u8,
    resolved_level: u8,
) -> Status {
    guard(this, "SetBidiLevel", |call| {
        call.view::<dyn TextAnalysisSink>()?.set_bidi_level(text_position, text_length, explicit_level, resolved_level)
    })
}

unsafe extern "system" fn set_number_substitution(
    this: *mut c_void,
    text_position: u32,
    text_length: u32,
    number_substitution: *mut c_void,
) -> Status {
    guard(this, "SetNumberSubstitution", |call| {
        let substitution = ComPtr::from_borrowed(number_substitution);
        call.view::<dyn TextAnalysisSink>()?.set_number_substitution(text_position, text_length, substitution)
    })
}

unsafe extern "system" fn set_glyph_orientation(
    this: *mut c_void,
    text_position: u32,
    text_length: u32,
    glyph_orientation_angle: GlyphOrientationAngle,
    adjusted_bidi_level: u8,
    is_sideways: NativeBool,
    is_right_to_left: NativeBool,
) -> Status {
    guard(this, "SetGlyphOrientation", |call| {
        let orientation = GlyphOrientation {
            angle: glyph_orientation_angle,
            adjusted_bidi_level,
            is_sideways: is_sideways.get(),
            is_right_to_left: is_right_to_left.get(),
        };
        call.view::<dyn TextAnalysisSink1>()?.set_glyph_orientation(text_position, text_length, orientation)
    })
}

fn range_setter(name: &'static str) -> MethodSig {
    MethodSig::new(name).input("textPosition", MarshalKind::U32).input("textLength", MarshalKind::U32)
}

pub(crate) fn shapes() -> Vec<ShapeDef> {
    vec![
        ShapeDef::new(TEXT_ANALYSIS_SINK, IID_TEXT_ANALYSIS_SINK)
            .slots(7)
            .method(
                range_setter("SetScriptAnalysis")
                    .input("scriptAnalysis", MarshalKind::structure::<ScriptAnalysis>("DWRITE_SCRIPT_ANALYSIS")),
                set_script_analysis as *const c_void,
            )
            .method(
                range_setter("SetLineBreakpoints").input(
                    "lineBreakpoints",
                    MarshalKind::buffer::<LineBreakpoint>("DWRITE_LINE_BREAKPOINT", "textLength"),
                ),
                set_line_breakpoints as *const c_void,
            )
            .method(
                range_setter("SetBidiLevel")
                    .input("explicitLevel", MarshalKind::U8)
                    .input("resolvedLevel", MarshalKind::U8),
                set_bidi_level as *const c_void,
            )
            .method(
                range_setter("SetNumberSubstitution").input("numberSubstitution", MarshalKind::HANDLE),
                set_number_substitution as *const c_void,
            ),
        ShapeDef::new(TEXT_ANALYSIS_SINK1, IID_TEXT_ANALYSIS_SINK1).extends(TEXT_ANALYSIS_SINK).slots(8).method(
            range_setter("SetGlyphOrientation")
                .input("glyphOrientationAngle", MarshalKind::ENUM)
                .input("adjustedBidiLevel", MarshalKind::U8)
                .input("isSideways", MarshalKind::BOOL)
                .input("isRightToLeft", MarshalKind::BOOL),
            set_glyph_orientation as *const c_void,
        ),
    ]
}

// ============================================================================
// Calling native implementations
// ============================================================================

type SetScriptAnalysisFn = unsafe extern "system" fn(*mut c_void, u32, u32, *const ScriptAnalysis) -> Status;
type SetLineBreakpointsFn = unsafe extern "system" fn(*mut c_void, u32, u32, *const LineBreakpoint) -> Status;
type SetBidiLevelFn = unsafe extern "system" fn(*mut c_void, u32, u32, u8, u8) -> Status;
type SetNumberSubstitutionFn = unsafe extern "system" fn(*mut c_void, u32, u32, *mut c_void) -> Status;
type SetGlyphOrientationFn =
    unsafe extern "system" fn(*mut c_void, u32, u32, GlyphOrientationAngle, u8, NativeBool, NativeBool) -> Status;

/// An analysis sink as the text analyzer sees it
#[derive(Debug, Clone)]
pub struct NativeTextAnalysisSink(pub ComPtr);

impl NativeTextAnalysisSink {
    pub fn set_script_analysis(&self, position: u32, length: u32, analysis: &ScriptAnalysis) -> Result<(), Status> {
        unsafe {
            let f: SetScriptAnalysisFn = self.0.method(3);
            f(self.0.as_raw(), position, length, analysis).ok()
        }
    }

    pub fn set_line_breakpoints(&self, position: u32, breakpoints: &[LineBreakpoint]) -> Result<(), Status> {
        let length = u32::try_from(breakpoints.len()).map_err(|_| Status::E_INVALIDARG)?;
        unsafe {
            let f: SetLineBreakpointsFn = self.0.method(4);
            f(self.0.as_raw(), position, length, breakpoints.as_ptr()).ok()
        }
    }

    pub fn set_bidi_level(&self, position: u32, length: u32, explicit_level: u8, resolved_level: u8) -> Result<(), Status> {
        unsafe {
            let f: SetBidiLevelFn = self.0.method(5);
            f(self.0.as_raw(), position, length, explicit_level, resolved_level).ok()
        }
    }

    pub fn set_number_substitution(
        &self,
        position: u32,
        length: u32,
        substitution: Option<&ComPtr>,
    ) -> Result<(), Status> {
        unsafe {
            let f: SetNumberSubstitutionFn = self.0.method(6);
            f(self.0.as_raw(), position, length, substitution.map_or(std::ptr::null_mut(), ComPtr::as_raw)).ok()
        }
    }

    /// Only valid on sinks that answer for `IDWriteTextAnalysisSink1`
    pub fn set_glyph_orientation(&self, position: u32, length: u32, orientation: GlyphOrientation) -> Result<(), Status> {
        let sink1 = self.0.query_interface(&IID_TEXT_ANALYSIS_SINK1)?;
        unsafe {
            let f: SetGlyphOrientationFn = sink1.method(7);
            f(
                sink1.as_raw(),
                position,
                length,
                orientation.angle,
                orientation.adjusted_bidi_level,
                orientation.is_sideways.into(),
                orientation.is_right_to_left.into(),
            )
            .ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::types::BreakCondition;

    #[derive(Default)]
    struct Breaks(Mutex<Vec<(u32, Vec<LineBreakpoint>)>>);

    impl TextAnalysisSink for Breaks {
        fn set_script_analysis(&self, _: u32, _: u32, _: ScriptAnalysis) -> CallbackResult<()> {
            Ok(())
        }

        fn set_line_breakpoints(&self, position: u32, breakpoints: &[LineBreakpoint]) -> CallbackResult<()> {
            self.0.lock().unwrap().push((position, breakpoints.to_vec()));
            Ok(())
        }

        fn set_bidi_level(&self, _: u32, _: u32, _: u8, _: u8) -> CallbackResult<()> {
            Err(Status::E_NOTIMPL.into())
        }

        fn set_number_substitution(&self, _: u32, _: u32, _: Option<ComPtr>) -> CallbackResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_breakpoints_array() {
        let breaks = Arc::new(Breaks::default());
        let sink = NativeTextAnalysisSink(shadow_text_analysis_sink(breaks.clone()).unwrap());

        let bp = LineBreakpoint::new(BreakCondition::NEUTRAL, BreakCondition::CAN_BREAK, true, false);
        sink.set_line_breakpoints(4, &[bp, LineBreakpoint::default()]).unwrap();
        sink.set_line_breakpoints(6, &[]).unwrap();

        let seen = breaks.0.lock().unwrap();
        assert_eq!(seen[0], (4, vec![bp, LineBreakpoint::default()]));
        assert_eq!(seen[1], (6, vec![]));
    }

    #[test]
    fn test_null_struct_and_status_passthrough() {
        let sink = shadow_text_analysis_sink(Arc::new(Breaks::default())).unwrap();
        unsafe {
            let f: SetScriptAnalysisFn = sink.method(3);
            assert_eq!(f(sink.as_raw(), 0, 1, std::ptr::null()), Status::E_POINTER);
        }
        let sink = NativeTextAnalysisSink(sink);
        assert_eq!(sink.set_bidi_level(0, 1, 0, 0), Err(Status::E_NOTIMPL));
        assert_eq!(
            sink.set_glyph_orientation(0, 1, GlyphOrientation::default()),
            Err(Status::E_NOINTERFACE)
        );
    }
}

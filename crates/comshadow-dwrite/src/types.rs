//! Native value types and their Rust-side forms
//!
//! The `#[repr(C)]` structs match the DirectWrite headers field for field.
//! Structs that point at arrays or strings have an owned counterpart
//! ([`GlyphRunData`], [`GlyphRunDescriptionData`], [`DecorationData`]) that is
//! what callbacks actually see.

use std::ffi::c_void;
use std::ptr;

use comshadow_core::marshal::buffer::{check_parallel, read_slice};
use comshadow_core::marshal::memory::NativeBuffer;
use comshadow_core::marshal::string::read_wide_nul;
use comshadow_core::marshal::NativeBool;
use comshadow_core::{ComPtr, Status};

/// A callback result that applies to the next `length` code units
#[derive(Debug, Clone, PartialEq)]
pub struct Ranged<T> {
    pub length: u32,
    pub value: T,
}

impl<T> Ranged<T> {
    pub fn new(length: u32, value: T) -> Self {
        Self { length, value }
    }
}

/// Opaque `clientDrawingContext` pointer, passed through untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DrawingContext(pub usize);

impl DrawingContext {
    pub fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

// ============================================================================
// Enumerations (4-byte values on the wire)
// ============================================================================

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadingDirection(pub u32);

impl ReadingDirection {
    pub const LEFT_TO_RIGHT: Self = Self(0);
    pub const RIGHT_TO_LEFT: Self = Self(1);
    pub const TOP_TO_BOTTOM: Self = Self(2);
    pub const BOTTOM_TO_TOP: Self = Self(3);
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowDirection(pub u32);

impl FlowDirection {
    pub const TOP_TO_BOTTOM: Self = Self(0);
    pub const BOTTOM_TO_TOP: Self = Self(1);
    pub const LEFT_TO_RIGHT: Self = Self(2);
    pub const RIGHT_TO_LEFT: Self = Self(3);
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasuringMode(pub u32);

impl MeasuringMode {
    pub const NATURAL: Self = Self(0);
    pub const GDI_CLASSIC: Self = Self(1);
    pub const GDI_NATURAL: Self = Self(2);
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerticalGlyphOrientation(pub u32);

impl VerticalGlyphOrientation {
    pub const DEFAULT: Self = Self(0);
    pub const STACKED: Self = Self(1);
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphOrientationAngle(pub u32);

impl GlyphOrientationAngle {
    pub const DEG_0: Self = Self(0);
    pub const DEG_90: Self = Self(1);
    pub const DEG_180: Self = Self(2);
    pub const DEG_270: Self = Self(3);
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakCondition(pub u8);

impl BreakCondition {
    pub const NEUTRAL: Self = Self(0);
    pub const CAN_BREAK: Self = Self(1);
    pub const MAY_NOT_BREAK: Self = Self(2);
    pub const MUST_BREAK: Self = Self(3);
}

// ============================================================================
// Plain structs
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptAnalysis {
    pub script: u16,
    pub shapes: u32,
}

/// Packed break information for one code unit
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineBreakpoint(pub u8);

impl LineBreakpoint {
    pub fn new(before: BreakCondition, after: BreakCondition, whitespace: bool, soft_hyphen: bool) -> Self {
        Self((before.0 & 0b11) | ((after.0 & 0b11) << 2) | ((whitespace as u8) << 4) | ((soft_hyphen as u8) << 5))
    }

    pub fn break_condition_before(self) -> BreakCondition {
        BreakCondition(self.0 & 0b11)
    }

    pub fn break_condition_after(self) -> BreakCondition {
        BreakCondition((self.0 >> 2) & 0b11)
    }

    pub fn is_whitespace(self) -> bool {
        self.0 & 0x10 != 0
    }

    pub fn is_soft_hyphen(self) -> bool {
        self.0 & 0x20 != 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Matrix {
    pub m11: f32,
    pub m12: f32,
    pub m21: f32,
    pub m22: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix { m11: 1.0, m12: 0.0, m21: 0.0, m22: 1.0, dx: 0.0, dy: 0.0 };
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphOffset {
    pub advance_offset: f32,
    pub ascender_offset: f32,
}

// ============================================================================
// Glyph runs
// ============================================================================

/// `DWRITE_GLYPH_RUN`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GlyphRun {
    pub font_face: *mut c_void,
    pub font_em_size: f32,
    pub glyph_count: u32,
    pub glyph_indices: *const u16,
    pub glyph_advances: *const f32,
    pub glyph_offsets: *const GlyphOffset,
    pub is_sideways: NativeBool,
    pub bidi_level: u32,
}

/// Owned glyph run. The three glyph arrays are parallel; advances and offsets
/// are optional.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlyphRunData {
    pub font_face: Option<ComPtr>,
    pub font_em_size: f32,
    pub glyph_indices: Vec<u16>,
    pub glyph_advances: Option<Vec<f32>>,
    pub glyph_offsets: Option<Vec<GlyphOffset>>,
    pub is_sideways: bool,
    pub bidi_level: u32,
}

impl GlyphRunData {
    /// Copy a native run. The font face is borrowed, so it gains a reference.
    ///
    /// # Safety
    /// Every non-null array in `run` must hold `glyph_count` elements and
    /// `font_face` must be null or a live COM object.
    pub unsafe fn from_native(run: &GlyphRun) -> Result<Self, Status> {
        Ok(Self {
            font_face: ComPtr::from_borrowed(run.font_face),
            font_em_size: run.font_em_size,
            glyph_indices: read_slice(run.glyph_indices, run.glyph_count)?.to_vec(),
            glyph_advances: optional_array(run.glyph_advances, run.glyph_count)?,
            glyph_offsets: optional_array(run.glyph_offsets, run.glyph_count)?,
            is_sideways: run.is_sideways.get(),
            bidi_level: run.bidi_level,
        })
    }

    pub fn glyph_count(&self) -> usize {
        self.glyph_indices.len()
    }

    /// Lay the run out in native memory, one allocation per array.
    ///
    /// Parallel arrays whose lengths disagree are rejected with
    /// `E_INVALIDARG` before anything is allocated.
    pub fn to_native(&self) -> Result<GlyphRunBuffers, Status> {
        let count = self.glyph_indices.len();
        check_parallel(
            count,
            &[
                self.glyph_advances.as_ref().map(Vec::len),
                self.glyph_offsets.as_ref().map(Vec::len),
            ],
        )?;
        let glyph_count = u32::try_from(count).map_err(|_| Status::E_INVALIDARG)?;

        let indices = NativeBuffer::from_slice(&self.glyph_indices)?;
        let advances = self.glyph_advances.as_deref().map(NativeBuffer::from_slice).transpose()?;
        let offsets = self.glyph_offsets.as_deref().map(NativeBuffer::from_slice).transpose()?;

        let run = GlyphRun {
            font_face: self.font_face.as_ref().map_or(ptr::null_mut(), ComPtr::as_raw),
            font_em_size: self.font_em_size,
            glyph_count,
            glyph_indices: indices.as_ptr(),
            glyph_advances: advances.as_ref().map_or(ptr::null(), NativeBuffer::as_ptr),
            glyph_offsets: offsets.as_ref().map_or(ptr::null(), NativeBuffer::as_ptr),
            is_sideways: self.is_sideways.into(),
            bidi_level: self.bidi_level,
        };
        Ok(GlyphRunBuffers {
            run,
            _indices: indices,
            _advances: advances,
            _offsets: offsets,
            _font_face: self.font_face.clone(),
        })
    }
}

unsafe fn optional_array<T: Copy>(ptr: *const T, count: u32) -> Result<Option<Vec<T>>, Status> {
    if ptr.is_null() {
        Ok(None)
    } else {
        read_slice(ptr, count).map(|items| Some(items.to_vec()))
    }
}

/// A native `GlyphRun` together with the memory it points into
pub struct GlyphRunBuffers {
    run: GlyphRun,
    _indices: NativeBuffer<u16>,
    _advances: Option<NativeBuffer<f32>>,
    _offsets: Option<NativeBuffer<GlyphOffset>>,
    _font_face: Option<ComPtr>,
}

impl GlyphRunBuffers {
    pub fn run(&self) -> &GlyphRun {
        &self.run
    }
}

/// `DWRITE_GLYPH_RUN_DESCRIPTION`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GlyphRunDescription {
    pub locale_name: *const u16,
    pub string: *const u16,
    pub string_length: u32,
    pub cluster_map: *const u16,
    pub text_position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlyphRunDescriptionData {
    pub locale_name: Option<String>,
    pub text: Option<String>,
    /// One entry per code unit of `text`
    pub cluster_map: Vec<u16>,
    pub text_position: u32,
}

impl GlyphRunDescriptionData {
    /// # Safety
    /// `string` and `cluster_map` must be null or hold `string_length`
    /// elements; `locale_name` must be null or NUL-terminated.
    pub unsafe fn from_native(desc: &GlyphRunDescription) -> Result<Self, Status> {
        let text = read_slice(desc.string, desc.string_length)?;
        let cluster_map = if desc.cluster_map.is_null() {
            Vec::new()
        } else {
            read_slice(desc.cluster_map, desc.string_length)?.to_vec()
        };
        Ok(Self {
            locale_name: read_wide_nul(desc.locale_name),
            text: (!desc.string.is_null()).then(|| String::from_utf16_lossy(text)),
            cluster_map,
            text_position: desc.text_position,
        })
    }
}

// ============================================================================
// Decorations
// ============================================================================

/// `DWRITE_UNDERLINE`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Underline {
    pub width: f32,
    pub thickness: f32,
    pub offset: f32,
    pub run_height: f32,
    pub reading_direction: ReadingDirection,
    pub flow_direction: FlowDirection,
    pub locale_name: *const u16,
    pub measuring_mode: MeasuringMode,
}

/// `DWRITE_STRIKETHROUGH`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Strikethrough {
    pub width: f32,
    pub thickness: f32,
    pub offset: f32,
    pub reading_direction: ReadingDirection,
    pub flow_direction: FlowDirection,
    pub locale_name: *const u16,
    pub measuring_mode: MeasuringMode,
}

/// Owned underline or strikethrough; `run_height` is 0 for strikethroughs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecorationData {
    pub width: f32,
    pub thickness: f32,
    pub offset: f32,
    pub run_height: f32,
    pub reading_direction: ReadingDirection,
    pub flow_direction: FlowDirection,
    pub locale_name: Option<String>,
    pub measuring_mode: MeasuringMode,
}

impl DecorationData {
    /// # Safety
    /// `locale_name` must be null or NUL-terminated.
    pub unsafe fn from_underline(u: &Underline) -> Self {
        Self {
            width: u.width,
            thickness: u.thickness,
            offset: u.offset,
            run_height: u.run_height,
            reading_direction: u.reading_direction,
            flow_direction: u.flow_direction,
            locale_name: read_wide_nul(u.locale_name),
            measuring_mode: u.measuring_mode,
        }
    }

    /// # Safety
    /// `locale_name` must be null or NUL-terminated.
    pub unsafe fn from_strikethrough(s: &Strikethrough) -> Self {
        Self {
            width: s.width,
            thickness: s.thickness,
            offset: s.offset,
            run_height: 0.0,
            reading_direction: s.reading_direction,
            flow_direction: s.flow_direction,
            locale_name: read_wide_nul(s.locale_name),
            measuring_mode: s.measuring_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_native_sizes() {
        assert_eq!(size_of::<ScriptAnalysis>(), 8);
        assert_eq!(size_of::<LineBreakpoint>(), 1);
        assert_eq!(size_of::<Matrix>(), 24);
        assert_eq!(size_of::<GlyphOffset>(), 8);
        if cfg!(target_pointer_width = "64") {
            assert_eq!(size_of::<GlyphRun>(), 48);
            assert_eq!(size_of::<GlyphRunDescription>(), 40);
        }
    }

    #[test]
    fn test_line_breakpoint_bits() {
        let bp = LineBreakpoint::new(BreakCondition::MAY_NOT_BREAK, BreakCondition::CAN_BREAK, true, false);
        assert_eq!(bp.break_condition_before(), BreakCondition::MAY_NOT_BREAK);
        assert_eq!(bp.break_condition_after(), BreakCondition::CAN_BREAK);
        assert!(bp.is_whitespace());
        assert!(!bp.is_soft_hyphen());
        assert_eq!(bp.0, 0b0001_0110);
    }

    #[test]
    fn test_glyph_run_to_native_and_back() {
        let data = GlyphRunData {
            font_em_size: 12.0,
            glyph_indices: vec![36, 72, 72],
            glyph_advances: Some(vec![7.0, 6.5, 6.5]),
            glyph_offsets: None,
            bidi_level: 1,
            ..Default::default()
        };
        let buffers = data.to_native().unwrap();
        let run = buffers.run();
        assert_eq!(run.glyph_count, 3);
        assert!(run.glyph_offsets.is_null());

        let copy = unsafe { GlyphRunData::from_native(run) }.unwrap();
        assert_eq!(copy, data);
    }

    #[test]
    fn test_glyph_run_rejects_mismatched_arrays() {
        let data = GlyphRunData {
            glyph_indices: vec![1, 2, 3],
            glyph_offsets: Some(vec![GlyphOffset::default(); 2]),
            ..Default::default()
        };
        assert_eq!(data.to_native().err(), Some(Status::E_INVALIDARG));
    }

    #[test]
    fn test_glyph_run_missing_indices() {
        let run = GlyphRun {
            font_face: ptr::null_mut(),
            font_em_size: 10.0,
            glyph_count: 2,
            glyph_indices: ptr::null(),
            glyph_advances: ptr::null(),
            glyph_offsets: ptr::null(),
            is_sideways: NativeBool::FALSE,
            bidi_level: 0,
        };
        assert_eq!(unsafe { GlyphRunData::from_native(&run) }.unwrap_err(), Status::E_POINTER);
    }

    #[test]
    fn test_description_from_native() {
        let text: Vec<u16> = "fi".encode_utf16().collect();
        let locale: Vec<u16> = "en-us\0".encode_utf16().collect();
        let clusters = [0u16, 0];
        let desc = GlyphRunDescription {
            locale_name: locale.as_ptr(),
            string: text.as_ptr(),
            string_length: 2,
            cluster_map: clusters.as_ptr(),
            text_position: 40,
        };
        let data = unsafe { GlyphRunDescriptionData::from_native(&desc) }.unwrap();
        assert_eq!(data.locale_name.as_deref(), Some("en-us"));
        assert_eq!(data.text.as_deref(), Some("fi"));
        assert_eq!(data.cluster_map, vec![0, 0]);
        assert_eq!(data.text_position, 40);
    }
}

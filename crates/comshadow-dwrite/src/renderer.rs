//! Layout rendering callbacks: `IDWritePixelSnapping` and `IDWriteTextRenderer`

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use comshadow_core::marshal::{read_optional, write_out, NativeBool};
use comshadow_core::{
    guard, CallbackResult, ComPtr, Guid, ManagedObject, MarshalKind, MethodSig, ShadowInstance, ShapeDef, ShapeError,
    ShapeId, Status,
};

use crate::types::{
    DecorationData, DrawingContext, GlyphRun, GlyphRunData, GlyphRunDescription, GlyphRunDescriptionData, Matrix,
    MeasuringMode, Strikethrough, Underline,
};

pub const PIXEL_SNAPPING: ShapeId = ShapeId::new("IDWritePixelSnapping");
pub const IID_PIXEL_SNAPPING: Guid = Guid::from_u128(0xeaf3a2da_ecf4_4d24_b644_b34f6842024b);

pub const TEXT_RENDERER: ShapeId = ShapeId::new("IDWriteTextRenderer");
pub const IID_TEXT_RENDERER: Guid = Guid::from_u128(0xef8a8135_5cc6_45fe_8825_c5a0724eb819);

/// Baseline origin of a drawing call, in DIPs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Origin {
    pub x: f32,
    pub y: f32,
}

pub trait PixelSnapping: Send + Sync {
    fn is_pixel_snapping_disabled(&self, context: DrawingContext) -> CallbackResult<bool>;

    fn current_transform(&self, context: DrawingContext) -> CallbackResult<Matrix>;

    fn pixels_per_dip(&self, context: DrawingContext) -> CallbackResult<f32>;
}

/// Receives the drawing calls of `IDWriteTextLayout::Draw`.
///
/// Everything borrowed by a draw call is only valid for that call; clone out
/// of the arguments to keep anything.
pub trait TextRenderer: PixelSnapping {
    fn draw_glyph_run(
        &self,
        context: DrawingContext,
        origin: Origin,
        measuring_mode: MeasuringMode,
        run: &GlyphRunData,
        description: Option<&GlyphRunDescriptionData>,
        client_effect: Option<ComPtr>,
    ) -> CallbackResult<()>;

    fn draw_underline(
        &self,
        context: DrawingContext,
        origin: Origin,
        underline: &DecorationData,
        client_effect: Option<ComPtr>,
    ) -> CallbackResult<()>;

    fn draw_strikethrough(
        &self,
        context: DrawingContext,
        origin: Origin,
        strikethrough: &DecorationData,
        client_effect: Option<ComPtr>,
    ) -> CallbackResult<()>;

    fn draw_inline_object(
        &self,
        context: DrawingContext,
        origin: Origin,
        inline_object: ComPtr,
        sideways: bool,
        right_to_left: bool,
        client_effect: Option<ComPtr>,
    ) -> CallbackResult<()>;
}

pub fn shadow_pixel_snapping(snapping: Arc<dyn PixelSnapping>) -> Result<ComPtr, ShapeError> {
    crate::install()?;
    ShadowInstance::create(PIXEL_SNAPPING, ManagedObject::of(snapping))
}

/// Shadow answering for `IDWriteTextRenderer` and `IDWritePixelSnapping`
pub fn shadow_text_renderer<R>(renderer: Arc<R>) -> Result<ComPtr, ShapeError>
where
    R: TextRenderer + 'static,
{
    crate::install()?;
    let base: Arc<dyn PixelSnapping> = renderer.clone();
    let derived: Arc<dyn TextRenderer> = renderer;
    ShadowInstance::create(TEXT_RENDERER, ManagedObject::of(derived).with_view(base))
}

// ============================================================================
// Thunks
// ============================================================================

unsafe extern "system" fn is_pixel_snapping_disabled(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    is_disabled: *mut NativeBool,
) -> Status {
    guard(this, "IsPixelSnappingDisabled", |call| {
        write_out(is_disabled, NativeBool::FALSE)?;
        let disabled = call
            .view::<dyn PixelSnapping>()?
            .is_pixel_snapping_disabled(DrawingContext::from_raw(client_drawing_context))?;
        *is_disabled = disabled.into();
        Ok(())
    })
}

unsafe extern "system" fn get_current_transform(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    transform: *mut Matrix,
) -> Status {
    guard(this, "GetCurrentTransform", |call| {
        write_out(transform, Matrix::IDENTITY)?;
        *transform = call.view::<dyn PixelSnapping>()?.current_transform(DrawingContext::from_raw(client_drawing_context))?;
        Ok(())
    })
}

unsafe extern "system" fn get_pixels_per_dip(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    pixels_per_dip: *mut f32,
) -> Status {
    guard(this, "GetPixelsPerDip", |call| {
        write_out(pixels_per_dip, 1.0)?;
        *pixels_per_dip = call.view::<dyn PixelSnapping>()?.pixels_per_dip(DrawingContext::from_raw(client_drawing_context))?;
        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn draw_glyph_run(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    baseline_origin_x: f32,
    baseline_origin_y: f32,
    measuring_mode: MeasuringMode,
    glyph_run: *const GlyphRun,
    glyph_run_description: *const GlyphRunDescription,
    client_drawing_effect: *mut c_void,
) -> Status {
    guard(this, "DrawGlyphRun", |call| {
        let run = read_optional(glyph_run).ok_or(Status::E_POINTER)?;
        let run = GlyphRunData::from_native(&run)?;
        let description = read_optional(glyph_run_description)
            .map(|desc| GlyphRunDescriptionData::from_native(&desc))
            .transpose()?;

        call.view::<dyn TextRenderer>()?.draw_glyph_run(
            DrawingContext::from_raw(client_drawing_context),
            Origin { x: baseline_origin_x, y: baseline_origin_y },
            measuring_mode,
            &run,
            description.as_ref(),
            ComPtr::from_borrowed(client_drawing_effect),
        )
    })
}

unsafe extern "system" fn draw_underline(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    baseline_origin_x: f32,
    baseline_origin_y: f32,
    underline: *const Underline,
    client_drawing_effect: *mut c_void,
) -> Status {
    guard(this, "DrawUnderline", |call| {
        let underline = read_optional(underline).ok_or(Status::E_POINTER)?;
        call.view::<dyn TextRenderer>()?.draw_underline(
            DrawingContext::from_raw(client_drawing_context),
            Origin { x: baseline_origin_x, y: baseline_origin_y },
            &DecorationData::from_underline(&underline),
            ComPtr::from_borrowed(client_drawing_effect),
        )
    })
}

unsafe extern "system" fn draw_strikethrough(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    baseline_origin_x: f32,
    baseline_origin_y: f32,
    strikethrough: *const Strikethrough,
    client_drawing_effect: *mut c_void,
) -> Status {
    guard(this, "DrawStrikethrough", |call| {
        let strikethrough = read_optional(strikethrough).ok_or(Status::E_POINTER)?;
        call.view::<dyn TextRenderer>()?.draw_strikethrough(
            DrawingContext::from_raw(client_drawing_context),
            Origin { x: baseline_origin_x, y: baseline_origin_y },
            &DecorationData::from_strikethrough(&strikethrough),
            ComPtr::from_borrowed(client_drawing_effect),
        )
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn draw_inline_object(
    this: *mut c_void,
    client_drawing_context: *mut c_void,
    origin_x: f32,
    origin_y: f32,
    inline_object: *mut c_void,
    is_sideways: NativeBool,
    is_right_to_left: NativeBool,
    client_drawing_effect: *mut c_void,
) -> Status {
    guard(this, "DrawInlineObject", |call| {
        let inline_object = ComPtr::from_borrowed(inline_object).ok_or(Status::E_POINTER)?;
        call.view::<dyn TextRenderer>()?.draw_inline_object(
            DrawingContext::from_raw(client_drawing_context),
            Origin { x: origin_x, y: origin_y },
            inline_object,
            is_sideways.get(),
            is_right_to_left.get(),
            ComPtr::from_borrowed(client_drawing_effect),
        )
    })
}

fn draw_call(name: &'static str) -> MethodSig {
    MethodSig::new(name)
        .input("clientDrawingContext", MarshalKind::CONTEXT)
        .input("baselineOriginX", MarshalKind::F32)
        .input("baselineOriginY", MarshalKind::F32)
}

pub(crate) fn shapes() -> Vec<ShapeDef> {
    vec![
        ShapeDef::new(PIXEL_SNAPPING, IID_PIXEL_SNAPPING)
            .slots(6)
            .method(
                MethodSig::new("IsPixelSnappingDisabled")
                    .input("clientDrawingContext", MarshalKind::CONTEXT)
                    .output("isDisabled", MarshalKind::BOOL),
                is_pixel_snapping_disabled as *const c_void,
            )
            .method(
                MethodSig::new("GetCurrentTransform")
                    .input("clientDrawingContext", MarshalKind::CONTEXT)
                    .output("transform", MarshalKind::structure::<Matrix>("DWRITE_MATRIX")),
                get_current_transform as *const c_void,
            )
            .method(
                MethodSig::new("GetPixelsPerDip")
                    .input("clientDrawingContext", MarshalKind::CONTEXT)
                    .output("pixelsPerDip", MarshalKind::F32),
                get_pixels_per_dip as *const c_void,
            ),
        ShapeDef::new(TEXT_RENDERER, IID_TEXT_RENDERER)
            .extends(PIXEL_SNAPPING)
            .slots(10)
            .method(
                draw_call("DrawGlyphRun")
                    .input("measuringMode", MarshalKind::ENUM)
                    .input("glyphRun", MarshalKind::structure::<GlyphRun>("DWRITE_GLYPH_RUN"))
                    .input(
                        "glyphRunDescription",
                        MarshalKind::nullable(MarshalKind::structure::<GlyphRunDescription>(
                            "DWRITE_GLYPH_RUN_DESCRIPTION",
                        )),
                    )
                    .input("clientDrawingEffect", MarshalKind::HANDLE),
                draw_glyph_run as *const c_void,
            )
            .method(
                draw_call("DrawUnderline")
                    .input("underline", MarshalKind::structure::<Underline>("DWRITE_UNDERLINE"))
                    .input("clientDrawingEffect", MarshalKind::HANDLE),
                draw_underline as *const c_void,
            )
            .method(
                draw_call("DrawStrikethrough")
                    .input("strikethrough", MarshalKind::structure::<Strikethrough>("DWRITE_STRIKETHROUGH"))
                    .input("clientDrawingEffect", MarshalKind::HANDLE),
                draw_strikethrough as *const c_void,
            )
            .method(
                draw_call("DrawInlineObject")
                    .input("inlineObject", MarshalKind::HANDLE)
                    .input("isSideways", MarshalKind::BOOL)
                    .input("isRightToLeft", MarshalKind::BOOL)
                    .input("clientDrawingEffect", MarshalKind::HANDLE),
                draw_inline_object as *const c_void,
            ),
    ]
}

// ============================================================================
// Calling native implementations
// ============================================================================

type IsPixelSnappingDisabledFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *mut NativeBool) -> Status;
type GetCurrentTransformFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *mut Matrix) -> Status;
type GetPixelsPerDipFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *mut f32) -> Status;
type DrawGlyphRunFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    f32,
    f32,
    MeasuringMode,
    *const GlyphRun,
    *const GlyphRunDescription,
    *mut c_void,
) -> Status;
type DrawUnderlineFn = unsafe extern "system" fn(*mut c_void, *mut c_void, f32, f32, *const Underline, *mut c_void) -> Status;
type DrawInlineObjectFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, f32, f32, *mut c_void, NativeBool, NativeBool, *mut c_void) -> Status;

/// A renderer as a text layout sees it while drawing
#[derive(Debug, Clone)]
pub struct NativeTextRenderer(pub ComPtr);

impl NativeTextRenderer {
    pub fn is_pixel_snapping_disabled(&self, context: DrawingContext) -> Result<bool, Status> {
        let mut disabled = NativeBool::FALSE;
        unsafe {
            let f: IsPixelSnappingDisabledFn = self.0.method(3);
            f(self.0.as_raw(), context.as_raw(), &mut disabled).ok()?;
        }
        Ok(disabled.get())
    }

    pub fn current_transform(&self, context: DrawingContext) -> Result<Matrix, Status> {
        let mut transform = Matrix::default();
        unsafe {
            let f: GetCurrentTransformFn = self.0.method(4);
            f(self.0.as_raw(), context.as_raw(), &mut transform).ok()?;
        }
        Ok(transform)
    }

    pub fn pixels_per_dip(&self, context: DrawingContext) -> Result<f32, Status> {
        let mut pixels_per_dip = 0.0;
        unsafe {
            let f: GetPixelsPerDipFn = self.0.method(5);
            f(self.0.as_raw(), context.as_raw(), &mut pixels_per_dip).ok()?;
        }
        Ok(pixels_per_dip)
    }

    /// Lays `run` out in native memory for the duration of the call
    pub fn draw_glyph_run(
        &self,
        context: DrawingContext,
        origin: Origin,
        measuring_mode: MeasuringMode,
        run: &GlyphRunData,
        description: Option<&GlyphRunDescription>,
        client_effect: Option<&ComPtr>,
    ) -> Result<(), Status> {
        let buffers = run.to_native()?;
        unsafe {
            let f: DrawGlyphRunFn = self.0.method(6);
            f(
                self.0.as_raw(),
                context.as_raw(),
                origin.x,
                origin.y,
                measuring_mode,
                buffers.run(),
                description.map_or(ptr::null(), |d| d as *const GlyphRunDescription),
                client_effect.map_or(ptr::null_mut(), ComPtr::as_raw),
            )
            .ok()
        }
    }

    pub fn draw_underline(
        &self,
        context: DrawingContext,
        origin: Origin,
        underline: &Underline,
        client_effect: Option<&ComPtr>,
    ) -> Result<(), Status> {
        unsafe {
            let f: DrawUnderlineFn = self.0.method(7);
            f(
                self.0.as_raw(),
                context.as_raw(),
                origin.x,
                origin.y,
                underline,
                client_effect.map_or(ptr::null_mut(), ComPtr::as_raw),
            )
            .ok()
        }
    }

    pub fn draw_inline_object(
        &self,
        context: DrawingContext,
        origin: Origin,
        inline_object: &ComPtr,
        sideways: bool,
        right_to_left: bool,
    ) -> Result<(), Status> {
        unsafe {
            let f: DrawInlineObjectFn = self.0.method(9);
            f(
                self.0.as_raw(),
                context.as_raw(),
                origin.x,
                origin.y,
                inline_object.as_raw(),
                sideways.into(),
                right_to_left.into(),
                ptr::null_mut(),
            )
            .ok()
        }
    }
}

//! Interface shapes and shadow vtables
//!
//! A shape is the closed-set description of one callback interface: its IID,
//! the shape it extends, and one signature + thunk per vtable slot. Shapes are
//! validated when registered, so a bad description fails at startup instead of
//! on the first native call.
//!
//! The vtable of a derived shape is the base vtable followed by the derived
//! slots. The prefix is copied from the base table entry by entry, so a
//! pointer to a derived shadow is also a valid pointer to its base interface.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock, PoisonError, RwLock};

use thiserror::Error;

use crate::guid::Guid;
use crate::instance;

// ============================================================================
// Identifiers and errors
// ============================================================================

/// Name of a registered shape
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(&'static str);

impl ShapeId {
    /// Root of every shape: QueryInterface, AddRef, Release
    pub const IUNKNOWN: ShapeId = ShapeId("IUnknown");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Shape {0} is already registered")]
    Duplicate(ShapeId),

    #[error("Shape {id} reuses IID {iid} already claimed by {owner}")]
    DuplicateIid { id: ShapeId, iid: Guid, owner: ShapeId },

    #[error("Shape {id} extends unregistered shape {base}")]
    UnknownBase { id: ShapeId, base: ShapeId },

    #[error("Shape {0} must extend IUnknown or another registered shape")]
    MissingBase(ShapeId),

    #[error("Shape {0} declares no methods of its own")]
    Empty(ShapeId),

    #[error("Shape {id} declares {declared} vtable slots but builds {actual}")]
    SlotCountMismatch { id: ShapeId, declared: usize, actual: usize },

    #[error("Shape {id}, method {method}: thunk is null")]
    NullThunk { id: ShapeId, method: &'static str },

    #[error("Shape {id}, method {method}: {reason}")]
    InvalidSignature { id: ShapeId, method: &'static str, reason: String },

    #[error("Shape {0} is not registered")]
    Unknown(ShapeId),
}

pub type Result<T> = std::result::Result<T, ShapeError>;

// ============================================================================
// Signatures (closed set of marshalling kinds)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    /// 4-byte native `BOOL`
    Bool,
    U8,
    U16,
    I32,
    U32,
    U64,
    F32,
    /// 4-byte enumeration value
    Enum,
    /// Opaque pointer-sized value passed through untouched (drawing contexts,
    /// fragment tokens)
    Context,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::Bool => "BOOL",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::I32 => "i32",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::Enum => "enum",
            Primitive::Context => "context",
        })
    }
}

/// Where a UTF-16 string's length comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Length {
    /// Code-unit count carried by another integer parameter of the same direction
    Param(&'static str),
    NulTerminated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarshalKind {
    Primitive(Primitive),
    String(Length),
    Struct { name: &'static str, size: usize },
    /// Homogeneous array; `count` names the integer input parameter holding its length
    Buffer { element: &'static str, size: usize, count: &'static str },
    Nullable(Box<MarshalKind>),
    /// Reference-counted interface pointer, optionally of a known interface
    Handle(Option<Guid>),
}

impl MarshalKind {
    pub const BOOL: MarshalKind = MarshalKind::Primitive(Primitive::Bool);
    pub const U8: MarshalKind = MarshalKind::Primitive(Primitive::U8);
    pub const U16: MarshalKind = MarshalKind::Primitive(Primitive::U16);
    pub const I32: MarshalKind = MarshalKind::Primitive(Primitive::I32);
    pub const U32: MarshalKind = MarshalKind::Primitive(Primitive::U32);
    pub const U64: MarshalKind = MarshalKind::Primitive(Primitive::U64);
    pub const F32: MarshalKind = MarshalKind::Primitive(Primitive::F32);
    pub const ENUM: MarshalKind = MarshalKind::Primitive(Primitive::Enum);
    pub const CONTEXT: MarshalKind = MarshalKind::Primitive(Primitive::Context);
    pub const HANDLE: MarshalKind = MarshalKind::Handle(None);

    pub fn structure<T>(name: &'static str) -> Self {
        MarshalKind::Struct { name, size: std::mem::size_of::<T>() }
    }

    pub fn buffer<T>(element: &'static str, count: &'static str) -> Self {
        MarshalKind::Buffer { element, size: std::mem::size_of::<T>(), count }
    }

    pub fn nullable(inner: MarshalKind) -> Self {
        MarshalKind::Nullable(Box::new(inner))
    }

    pub fn string(length: Length) -> Self {
        MarshalKind::String(length)
    }

    pub fn handle(iid: Guid) -> Self {
        MarshalKind::Handle(Some(iid))
    }
}

impl fmt::Display for MarshalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarshalKind::Primitive(p) => write!(f, "{}", p),
            MarshalKind::String(Length::Param(len)) => write!(f, "wstr[{}]", len),
            MarshalKind::String(Length::NulTerminated) => f.write_str("wstr"),
            MarshalKind::Struct { name, .. } => f.write_str(name),
            MarshalKind::Buffer { element, count, .. } => write!(f, "{}[{}]", element, count),
            MarshalKind::Nullable(inner) => write!(f, "{}?", inner),
            MarshalKind::Handle(Some(iid)) => write!(f, "handle<{}>", iid),
            MarshalKind::Handle(None) => f.write_str("handle"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: MarshalKind,
    pub dir: Direction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultKind {
    Status,
    Primitive(Primitive),
    Void,
    /// AddRef/Release only
    RefCount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSig {
    pub name: &'static str,
    pub params: Vec<Param>,
    pub result: ResultKind,
}

impl MethodSig {
    /// New signature returning a status code
    pub fn new(name: &'static str) -> Self {
        Self { name, params: Vec::new(), result: ResultKind::Status }
    }

    pub fn input(mut self, name: &'static str, kind: MarshalKind) -> Self {
        self.params.push(Param { name, kind, dir: Direction::In });
        self
    }

    pub fn output(mut self, name: &'static str, kind: MarshalKind) -> Self {
        self.params.push(Param { name, kind, dir: Direction::Out });
        self
    }

    pub fn returns(mut self, result: ResultKind) -> Self {
        self.result = result;
        self
    }

    fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let dir = match p.dir {
                Direction::In => "in",
                Direction::Out => "out",
            };
            write!(f, "{} {}: {}", dir, p.name, p.kind)?;
        }
        f.write_str(")")?;
        match &self.result {
            ResultKind::Status => f.write_str(" -> status"),
            ResultKind::Primitive(p) => write!(f, " -> {}", p),
            ResultKind::Void => Ok(()),
            ResultKind::RefCount => f.write_str(" -> refcount"),
        }
    }
}

// ============================================================================
// Thunks and shape definitions
// ============================================================================

/// Address of an `extern "system"` thunk, as stored in a vtable slot
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Thunk(*const c_void);

// Function pointers are immutable code addresses
unsafe impl Send for Thunk {}
unsafe impl Sync for Thunk {}

impl Thunk {
    pub const fn new(ptr: *const c_void) -> Self {
        Self(ptr)
    }

    pub const fn as_ptr(self) -> *const c_void {
        self.0
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

/// Shape description handed to [`ShapeRegistry::register`]
#[derive(Debug, Clone)]
pub struct ShapeDef {
    id: ShapeId,
    iid: Guid,
    base: Option<ShapeId>,
    declared_slots: Option<usize>,
    methods: Vec<(MethodSig, Thunk)>,
}

impl ShapeDef {
    /// New shape extending IUnknown
    pub fn new(id: ShapeId, iid: Guid) -> Self {
        let base = (id != ShapeId::IUNKNOWN).then_some(ShapeId::IUNKNOWN);
        Self { id, iid, base, declared_slots: None, methods: Vec::new() }
    }

    pub fn extends(mut self, base: ShapeId) -> Self {
        self.base = Some(base);
        self
    }

    /// Total vtable size (inherited slots included) the native header declares
    pub fn slots(mut self, total: usize) -> Self {
        self.declared_slots = Some(total);
        self
    }

    pub fn method(mut self, sig: MethodSig, thunk: *const c_void) -> Self {
        self.methods.push((sig, Thunk::new(thunk)));
        self
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    fn validate(&self, base: &RegisteredShape) -> Result<()> {
        if self.methods.is_empty() {
            return Err(ShapeError::Empty(self.id));
        }

        let actual = base.slot_total() + self.methods.len();
        if let Some(declared) = self.declared_slots {
            if declared != actual {
                return Err(ShapeError::SlotCountMismatch { id: self.id, declared, actual });
            }
        }

        for (sig, thunk) in &self.methods {
            if thunk.as_ptr().is_null() {
                return Err(ShapeError::NullThunk { id: self.id, method: sig.name });
            }
            validate_signature(sig).map_err(|reason| ShapeError::InvalidSignature {
                id: self.id,
                method: sig.name,
                reason,
            })?;
        }
        Ok(())
    }
}

fn validate_signature(sig: &MethodSig) -> std::result::Result<(), String> {
    if sig.result == ResultKind::RefCount {
        return Err("reference-count results are reserved for IUnknown".into());
    }

    for (i, p) in sig.params.iter().enumerate() {
        if sig.params[..i].iter().any(|q| q.name == p.name) {
            return Err(format!("parameter {} declared twice", p.name));
        }
        validate_kind(sig, p, &p.kind)?;
    }
    Ok(())
}

fn validate_kind(sig: &MethodSig, p: &Param, kind: &MarshalKind) -> std::result::Result<(), String> {
    let length_channel = |name: &str, dir: Direction| match sig.param(name) {
        Some(q) if matches!(q.kind, MarshalKind::U32 | MarshalKind::U64) && q.dir == dir => Ok(()),
        Some(_) => Err(format!("{}: length channel {} must be an {:?} integer", p.name, name, dir)),
        None => Err(format!("{}: length channel {} does not exist", p.name, name)),
    };

    match kind {
        MarshalKind::Primitive(_) | MarshalKind::Handle(_) => Ok(()),
        MarshalKind::String(Length::Param(len)) => length_channel(len, p.dir),
        MarshalKind::String(Length::NulTerminated) => Ok(()),
        MarshalKind::Struct { name, size } => {
            if *size == 0 {
                Err(format!("{}: struct {} has no native layout", p.name, name))
            } else {
                Ok(())
            }
        }
        MarshalKind::Buffer { element, size, count } => {
            if *size == 0 {
                return Err(format!("{}: element {} has no native layout", p.name, element));
            }
            length_channel(count, Direction::In)
        }
        MarshalKind::Nullable(inner) => match inner.as_ref() {
            MarshalKind::Primitive(_) | MarshalKind::Struct { .. } => validate_kind(sig, p, inner),
            other => Err(format!("{}: {} cannot be nullable", p.name, other)),
        },
    }
}

// ============================================================================
// Vtables
// ============================================================================

/// Immutable table of thunk addresses shared by every shadow of one shape
pub struct ShadowVtable {
    shape: ShapeId,
    slots: Box<[Thunk]>,
}

impl ShadowVtable {
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    pub fn slots(&self) -> &[Thunk] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Address stored in the first word of every shadow instance
    pub fn as_ptr(&self) -> *const Thunk {
        self.slots.as_ptr()
    }
}

impl fmt::Debug for ShadowVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowVtable")
            .field("shape", &self.shape)
            .field("slots", &self.slots.len())
            .finish()
    }
}

struct RegisteredShape {
    def: ShapeDef,
    base: Option<Arc<RegisteredShape>>,
    vtable: OnceLock<&'static ShadowVtable>,
}

impl RegisteredShape {
    fn slot_total(&self) -> usize {
        self.base.as_ref().map_or(0, |b| b.slot_total()) + self.def.methods.len()
    }

    fn supports(&self, iid: &Guid) -> bool {
        self.def.iid == *iid || self.base.as_ref().is_some_and(|b| b.supports(iid))
    }

    /// Built on first use, then lives for the rest of the process
    fn vtable(&self) -> &'static ShadowVtable {
        self.vtable.get_or_init(|| {
            let mut slots: Vec<Thunk> = match &self.base {
                Some(base) => base.vtable().slots().to_vec(),
                None => Vec::new(),
            };
            slots.extend(self.def.methods.iter().map(|(_, thunk)| *thunk));
            tracing::debug!("Built vtable for {} ({} slots)", self.def.id, slots.len());
            Box::leak(Box::new(ShadowVtable { shape: self.def.id, slots: slots.into_boxed_slice() }))
        })
    }

    fn collect_slots(&self, out: &mut Vec<SlotInfo>) {
        if let Some(base) = &self.base {
            base.collect_slots(out);
        }
        for (sig, _) in &self.def.methods {
            out.push(SlotInfo { index: out.len(), owner: self.def.id, method: sig.clone() });
        }
    }

    fn info(&self) -> ShapeInfo {
        let mut slots = Vec::with_capacity(self.slot_total());
        self.collect_slots(&mut slots);
        ShapeInfo {
            id: self.def.id,
            iid: self.def.iid,
            base: self.def.base,
            slots,
        }
    }
}

/// Read-only view of a registered shape
#[derive(Debug, Clone)]
pub struct ShapeInfo {
    pub id: ShapeId,
    pub iid: Guid,
    pub base: Option<ShapeId>,
    pub slots: Vec<SlotInfo>,
}

#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub index: usize,
    /// Shape that introduced this slot
    pub owner: ShapeId,
    pub method: MethodSig,
}

// ============================================================================
// Registry
// ============================================================================

/// Process-wide set of registered shapes
pub struct ShapeRegistry {
    shapes: RwLock<HashMap<ShapeId, Arc<RegisteredShape>>>,
}

static SHAPES: LazyLock<ShapeRegistry> = LazyLock::new(ShapeRegistry::with_root);

impl ShapeRegistry {
    pub fn global() -> &'static ShapeRegistry {
        &SHAPES
    }

    fn with_root() -> Self {
        let root = instance::iunknown_shape();
        let mut shapes = HashMap::new();
        shapes.insert(
            root.id,
            Arc::new(RegisteredShape { def: root, base: None, vtable: OnceLock::new() }),
        );
        Self { shapes: RwLock::new(shapes) }
    }

    /// Validate and register a shape. The vtable itself is built lazily.
    pub fn register(&self, def: ShapeDef) -> Result<ShapeId> {
        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);

        if shapes.contains_key(&def.id) {
            return Err(ShapeError::Duplicate(def.id));
        }
        if let Some(owner) = shapes.values().find(|s| s.def.iid == def.iid) {
            return Err(ShapeError::DuplicateIid { id: def.id, iid: def.iid, owner: owner.def.id });
        }
        let base_id = def.base.ok_or(ShapeError::MissingBase(def.id))?;
        let base = shapes
            .get(&base_id)
            .cloned()
            .ok_or(ShapeError::UnknownBase { id: def.id, base: base_id })?;

        def.validate(&base)?;

        let id = def.id;
        tracing::debug!(
            "Registered shape {} ({}) extending {} with {} methods",
            id,
            def.iid,
            base_id,
            def.methods.len()
        );
        shapes.insert(id, Arc::new(RegisteredShape { def, base: Some(base), vtable: OnceLock::new() }));
        Ok(id)
    }

    fn get(&self, id: ShapeId) -> Option<Arc<RegisteredShape>> {
        self.shapes.read().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.get(id).is_some()
    }

    /// Vtable for `id`; the same table on every call
    pub fn vtable(&self, id: ShapeId) -> Result<&'static ShadowVtable> {
        self.get(id).map(|s| s.vtable()).ok_or(ShapeError::Unknown(id))
    }

    /// Whether a shadow of shape `id` answers QueryInterface for `iid`
    pub fn supports(&self, id: ShapeId, iid: &Guid) -> bool {
        self.get(id).is_some_and(|s| s.supports(iid))
    }

    pub fn describe(&self, id: ShapeId) -> Option<ShapeInfo> {
        self.get(id).map(|s| s.info())
    }

    /// All registered shapes, sorted by name
    pub fn shapes(&self) -> Vec<ShapeInfo> {
        let mut all: Vec<ShapeInfo> = self
            .shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.info())
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, COUNTER, COUNTER_EX};

    unsafe extern "system" fn noop(_this: *mut c_void) -> i32 {
        0
    }

    fn noop_ptr() -> *const c_void {
        noop as *const c_void
    }

    #[test]
    fn test_vtable_is_cached() {
        testing::register_shapes();
        let a = ShapeRegistry::global().vtable(COUNTER).unwrap();
        let b = ShapeRegistry::global().vtable(COUNTER).unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn test_derived_vtable_prefix_matches_base() {
        testing::register_shapes();
        let base = ShapeRegistry::global().vtable(COUNTER).unwrap();
        let derived = ShapeRegistry::global().vtable(COUNTER_EX).unwrap();
        assert_eq!(derived.len(), base.len() + 1);
        assert_eq!(&derived.slots()[..base.len()], base.slots());

        let root = ShapeRegistry::global().vtable(ShapeId::IUNKNOWN).unwrap();
        assert_eq!(&base.slots()[..3], root.slots());
    }

    #[test]
    fn test_describe_lists_inherited_slots() {
        testing::register_shapes();
        let info = ShapeRegistry::global().describe(COUNTER_EX).unwrap();
        let names: Vec<_> = info.slots.iter().map(|s| (s.method.name, s.owner)).collect();
        assert_eq!(
            names,
            vec![
                ("QueryInterface", ShapeId::IUNKNOWN),
                ("AddRef", ShapeId::IUNKNOWN),
                ("Release", ShapeId::IUNKNOWN),
                ("GetCount", COUNTER),
                ("Reset", COUNTER_EX),
            ]
        );
        assert!(ShapeRegistry::global().supports(COUNTER_EX, &testing::COUNTER_IID));
        assert!(!ShapeRegistry::global().supports(COUNTER, &testing::COUNTER_EX_IID));
    }

    #[test]
    fn test_duplicate_shape_rejected() {
        testing::register_shapes();
        let def = ShapeDef::new(COUNTER, Guid::from_u128(0x1111))
            .method(MethodSig::new("GetCount"), noop_ptr());
        assert_eq!(ShapeRegistry::global().register(def), Err(ShapeError::Duplicate(COUNTER)));
    }

    #[test]
    fn test_duplicate_iid_rejected() {
        let def = ShapeDef::new(ShapeId::new("IShapeTestIidClash"), Guid::IUNKNOWN)
            .method(MethodSig::new("Nothing"), noop_ptr());
        let err = ShapeRegistry::global().register(def).unwrap_err();
        assert!(matches!(err, ShapeError::DuplicateIid { owner: ShapeId::IUNKNOWN, .. }));
    }

    #[test]
    fn test_unknown_base_rejected() {
        let id = ShapeId::new("IShapeTestOrphan");
        let def = ShapeDef::new(id, Guid::from_u128(0x5eed_0001))
            .extends(ShapeId::new("INeverRegistered"))
            .method(MethodSig::new("Nothing"), noop_ptr());
        assert_eq!(
            ShapeRegistry::global().register(def),
            Err(ShapeError::UnknownBase { id, base: ShapeId::new("INeverRegistered") })
        );
        assert!(!ShapeRegistry::global().contains(id));
    }

    #[test]
    fn test_slot_count_mismatch_rejected() {
        let id = ShapeId::new("IShapeTestMiscounted");
        let def = ShapeDef::new(id, Guid::from_u128(0x5eed_0002))
            .slots(5)
            .method(MethodSig::new("Only"), noop_ptr());
        assert_eq!(
            ShapeRegistry::global().register(def),
            Err(ShapeError::SlotCountMismatch { id, declared: 5, actual: 4 })
        );
    }

    #[test]
    fn test_empty_and_null_thunk_rejected() {
        let empty = ShapeDef::new(ShapeId::new("IShapeTestEmpty"), Guid::from_u128(0x5eed_0003));
        assert!(matches!(ShapeRegistry::global().register(empty), Err(ShapeError::Empty(_))));

        let null = ShapeDef::new(ShapeId::new("IShapeTestNull"), Guid::from_u128(0x5eed_0004))
            .method(MethodSig::new("Missing"), std::ptr::null());
        assert!(matches!(
            ShapeRegistry::global().register(null),
            Err(ShapeError::NullThunk { method: "Missing", .. })
        ));
    }

    #[test]
    fn test_signature_rules() {
        let reject = |name: &'static str, sig: MethodSig| {
            let def = ShapeDef::new(ShapeId::new(name), Guid::from_u128(0x5eed_1000 + name.len() as u128))
                .method(sig, noop_ptr());
            match ShapeRegistry::global().register(def) {
                Err(ShapeError::InvalidSignature { reason, .. }) => reason,
                other => panic!("{} was not rejected: {:?}", name, other),
            }
        };

        let reason = reject(
            "IShapeTestA",
            MethodSig::new("GetText").output("text", MarshalKind::string(Length::Param("textLength"))),
        );
        assert!(reason.contains("does not exist"));

        let reason = reject(
            "IShapeTestBB",
            MethodSig::new("GetText")
                .output("text", MarshalKind::string(Length::Param("textLength")))
                .input("textLength", MarshalKind::U32),
        );
        assert!(reason.contains("must be an Out integer"));

        let reason = reject(
            "IShapeTestCCC",
            MethodSig::new("Lookup").input("target", MarshalKind::nullable(MarshalKind::HANDLE)),
        );
        assert!(reason.contains("cannot be nullable"));

        let reason = reject(
            "IShapeTestDDDD",
            MethodSig::new("SetBreaks").input("breaks", MarshalKind::buffer::<u8>("u8", "count")),
        );
        assert!(reason.contains("count"));

        let reason = reject("IShapeTestEEEEE", MethodSig::new("AddRef").returns(ResultKind::RefCount));
        assert!(reason.contains("reserved"));
    }

    #[test]
    fn test_signature_display() {
        let sig = MethodSig::new("GetTextAtPosition")
            .input("textPosition", MarshalKind::U32)
            .output("textString", MarshalKind::string(Length::Param("textLength")))
            .output("textLength", MarshalKind::U32);
        assert_eq!(
            sig.to_string(),
            "GetTextAtPosition(in textPosition: u32, out textString: wstr[textLength], out textLength: u32) -> status"
        );
    }

    #[test]
    fn test_unknown_shape_vtable() {
        let id = ShapeId::new("IShapeTestNeverSeen");
        assert_eq!(ShapeRegistry::global().vtable(id).unwrap_err(), ShapeError::Unknown(id));
    }
}

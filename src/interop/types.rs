//! Type definitions for FFI interoperability
//!
//! Defines the closed set of C ABI value classes, the host-side type
//! descriptors that map onto them, and the dynamic value carried across a
//! call frame.

use super::abi::DataModel;
use super::ctypes::Pointer;

/// C ABI value class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Pointer,
    /// Null-terminated byte string, passed as a pointer
    CString,
    /// 16-byte scalar with no portable register class (`long double`, `__int128`)
    Opaque128,
}

impl CType {
    /// Width in bytes on the running target
    #[inline]
    pub fn size(self) -> usize {
        width_of(self)
    }

    /// Alignment requirement on the running target
    #[inline]
    pub fn align(self) -> usize {
        align_of(self)
    }

    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Passed as an address (plain pointers and C strings)
    #[inline]
    pub const fn is_pointer(self) -> bool {
        matches!(self, Self::Pointer | Self::CString)
    }

    #[inline]
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Opaque128)
    }

    /// Fits a single integer or float register
    #[inline]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Bool) || self.is_integer() || self.is_float() || self.is_pointer()
    }

    /// C spelling, used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::I8 => "int8_t",
            Self::I16 => "int16_t",
            Self::I32 => "int32_t",
            Self::I64 => "int64_t",
            Self::U8 => "uint8_t",
            Self::U16 => "uint16_t",
            Self::U32 => "uint32_t",
            Self::U64 => "uint64_t",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Pointer => "void*",
            Self::CString => "char*",
            Self::Opaque128 => "opaque128",
        }
    }
}

impl core::fmt::Display for CType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Width of a value class in bytes, per the running target's data model
pub fn width_of(ty: CType) -> usize {
    let model = DataModel::current();
    match ty {
        CType::Void => 0,
        CType::Bool | CType::I8 | CType::U8 => 1,
        CType::I16 | CType::U16 => 2,
        CType::I32 | CType::U32 | CType::F32 => 4,
        CType::I64 | CType::U64 | CType::F64 => 8,
        CType::Pointer | CType::CString => model.pointer,
        CType::Opaque128 => 16,
    }
}

/// Alignment of a value class in bytes
pub fn align_of(ty: CType) -> usize {
    match ty {
        CType::Void => 1,
        CType::Opaque128 => DataModel::current().max_align,
        other => width_of(other),
    }
}

/// C scalar spellings whose width depends on the data model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CScalar {
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Size,
    Float,
    Double,
    LongDouble,
    Int128,
}

impl CScalar {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "_Bool",
            Self::Char => "char",
            Self::SignedChar => "signed char",
            Self::UnsignedChar => "unsigned char",
            Self::Short => "short",
            Self::UnsignedShort => "unsigned short",
            Self::Int => "int",
            Self::UnsignedInt => "unsigned int",
            Self::Long => "long",
            Self::UnsignedLong => "unsigned long",
            Self::LongLong => "long long",
            Self::UnsignedLongLong => "unsigned long long",
            Self::Size => "size_t",
            Self::Float => "float",
            Self::Double => "double",
            Self::LongDouble => "long double",
            Self::Int128 => "__int128",
        }
    }
}

/// Host-side type descriptor
///
/// Every type that can appear in a header field's signature describes itself
/// with one of these. `classify` turns it into a [`CType`] or rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Void,
    Bool,
    Int { bits: u16, signed: bool },
    Float { bits: u16 },
    Pointer { pointee: &'static str },
    CString,
    /// A C spelling resolved through the data model
    C(CScalar),
    /// Distinct nominal type with the layout of `inner`
    Named { name: &'static str, inner: Box<TypeDesc> },
    /// Fixed-size blob with no register class
    Opaque { name: &'static str, size: usize },
    /// Host collection (slices, vectors); never crosses the boundary by value
    Sequence { name: &'static str },
    /// Host struct passed by value
    Record { name: &'static str },
}

impl TypeDesc {
    /// Descriptor for `name` wrapping the C `int` layout
    pub fn named_int(name: &'static str) -> Self {
        Self::Named { name, inner: Box::new(Self::C(CScalar::Int)) }
    }

    /// Name used in error messages
    pub fn name(&self) -> String {
        match self {
            Self::Void => "void".into(),
            Self::Bool => "bool".into(),
            Self::Int { bits, signed: true } => format!("i{}", bits),
            Self::Int { bits, signed: false } => format!("u{}", bits),
            Self::Float { bits } => format!("f{}", bits),
            Self::Pointer { pointee } => format!("*{}", pointee),
            Self::CString => "cstring".into(),
            Self::C(scalar) => scalar.name().into(),
            Self::Named { name, .. }
            | Self::Opaque { name, .. }
            | Self::Sequence { name }
            | Self::Record { name } => (*name).into(),
        }
    }
}

/// Classification failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    Unsupported { type_name: String },
}

impl core::fmt::Display for TypeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unsupported { type_name } => {
                write!(f, "type {} has no C ABI representation", type_name)
            }
        }
    }
}

impl std::error::Error for TypeError {}

/// Map a host type descriptor onto its C ABI value class
pub fn classify(desc: &TypeDesc) -> Result<CType, TypeError> {
    let unsupported = || TypeError::Unsupported { type_name: desc.name() };

    match desc {
        TypeDesc::Void => Ok(CType::Void),
        TypeDesc::Bool => Ok(CType::Bool),
        TypeDesc::Int { bits, signed } if bits % 8 == 0 => {
            int_class(*bits as usize / 8, *signed).ok_or_else(unsupported)
        }
        TypeDesc::Int { .. } => Err(unsupported()),
        TypeDesc::Float { bits: 32 } => Ok(CType::F32),
        TypeDesc::Float { bits: 64 } => Ok(CType::F64),
        TypeDesc::Float { .. } => Err(unsupported()),
        TypeDesc::Pointer { .. } => Ok(CType::Pointer),
        TypeDesc::CString => Ok(CType::CString),
        TypeDesc::C(scalar) => classify_scalar(*scalar, DataModel::current()).ok_or_else(unsupported),
        TypeDesc::Named { inner, .. } => classify(inner).map_err(|_| unsupported()),
        TypeDesc::Opaque { size: 16, .. } => Ok(CType::Opaque128),
        TypeDesc::Opaque { .. } | TypeDesc::Sequence { .. } | TypeDesc::Record { .. } => Err(unsupported()),
    }
}

/// Resolve a C spelling under a specific data model
pub fn classify_scalar(scalar: CScalar, model: DataModel) -> Option<CType> {
    match scalar {
        CScalar::Bool => Some(CType::Bool),
        CScalar::Char => int_class(1, model.char_signed),
        CScalar::SignedChar => Some(CType::I8),
        CScalar::UnsignedChar => Some(CType::U8),
        CScalar::Short => int_class(model.short, true),
        CScalar::UnsignedShort => int_class(model.short, false),
        CScalar::Int => int_class(model.int, true),
        CScalar::UnsignedInt => int_class(model.int, false),
        CScalar::Long => int_class(model.long, true),
        CScalar::UnsignedLong => int_class(model.long, false),
        CScalar::LongLong => int_class(model.long_long, true),
        CScalar::UnsignedLongLong => int_class(model.long_long, false),
        CScalar::Size => int_class(model.pointer, false),
        CScalar::Float => Some(CType::F32),
        CScalar::Double => Some(CType::F64),
        CScalar::LongDouble => match model.long_double {
            8 => Some(CType::F64),
            16 => Some(CType::Opaque128),
            _ => None,
        },
        CScalar::Int128 => Some(CType::Opaque128),
    }
}

fn int_class(bytes: usize, signed: bool) -> Option<CType> {
    Some(match (bytes, signed) {
        (1, true) => CType::I8,
        (2, true) => CType::I16,
        (4, true) => CType::I32,
        (8, true) => CType::I64,
        (1, false) => CType::U8,
        (2, false) => CType::U16,
        (4, false) => CType::U32,
        (8, false) => CType::U64,
        (16, _) => CType::Opaque128,
        _ => return None,
    })
}

/// Host value crossing a call frame
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(Pointer),
    Text(String),
}

impl Value {
    /// Value class this value pushes as
    pub const fn class(&self) -> CType {
        match self {
            Self::Void => CType::Void,
            Self::Bool(_) => CType::Bool,
            Self::I8(_) => CType::I8,
            Self::I16(_) => CType::I16,
            Self::I32(_) => CType::I32,
            Self::I64(_) => CType::I64,
            Self::U8(_) => CType::U8,
            Self::U16(_) => CType::U16,
            Self::U32(_) => CType::U32,
            Self::U64(_) => CType::U64,
            Self::F32(_) => CType::F32,
            Self::F64(_) => CType::F64,
            Self::Pointer(_) => CType::Pointer,
            Self::Text(_) => CType::CString,
        }
    }

    /// Zero of its class: false, 0, null or the empty string
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Void => true,
            Self::Bool(v) => !v,
            Self::I8(v) => *v == 0,
            Self::I16(v) => *v == 0,
            Self::I32(v) => *v == 0,
            Self::I64(v) => *v == 0,
            Self::U8(v) => *v == 0,
            Self::U16(v) => *v == 0,
            Self::U32(v) => *v == 0,
            Self::U64(v) => *v == 0,
            Self::F32(v) => *v == 0.0,
            Self::F64(v) => *v == 0.0,
            Self::Pointer(p) => p.is_null(),
            Self::Text(s) => s.is_empty(),
        }
    }
}

/// Classified native signature of one bound function
///
/// `outs` are the result classes after the first; each travels as an extra
/// trailing pointer parameter the callee writes through. A fallible
/// signature treats a zero result as failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<CType>,
    result: CType,
    outs: Vec<CType>,
    fallible: bool,
}

impl Signature {
    pub fn new(params: Vec<CType>, result: CType) -> Self {
        Self { params, result, outs: Vec::new(), fallible: false }
    }

    pub fn with_outs(mut self, outs: Vec<CType>) -> Self {
        self.outs = outs;
        self
    }

    pub fn with_fallible(mut self, fallible: bool) -> Self {
        self.fallible = fallible;
        self
    }

    pub fn is_fallible(&self) -> bool {
        self.fallible
    }

    pub fn params(&self) -> &[CType] {
        &self.params
    }

    pub fn result(&self) -> CType {
        self.result
    }

    pub fn outs(&self) -> &[CType] {
        &self.outs
    }

    /// Parameter classes as the callee sees them, out-pointers included
    pub fn native_params(&self) -> impl Iterator<Item = CType> + '_ {
        self.params
            .iter()
            .copied()
            .chain(self.outs.iter().map(|_| CType::Pointer))
    }

    pub fn has_cstring(&self) -> bool {
        self.params.contains(&CType::CString)
    }

    /// Arena words a frame needs when no strings are copied
    pub fn frame_words(&self) -> usize {
        self.params.len() + 2 * self.outs.len()
    }
}

impl core::fmt::Display for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(")?;
        for (i, ty) in self.native_params().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(ty.name())?;
        }
        write!(f, ") -> {}", self.result)?;
        if self.fallible {
            f.write_str(" or error")?;
        }
        Ok(())
    }
}

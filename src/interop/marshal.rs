//! Type marshaling - host ↔ C conversions
//!
//! Host types describe themselves once (`Foreign`) so the installer can
//! classify a field's signature up front; at call time they only convert to
//! and from [`Value`], the frame's currency.

use core::any::type_name;
use core::ffi::c_void;

use super::call::NativeError;
use super::ctypes::{Opaque, Pointer};
use super::types::{CScalar, TypeDesc, Value};

/// A host type that may appear in a native signature
pub trait Foreign {
    fn describe() -> TypeDesc;
}

/// A host type that can be pushed as an argument
pub trait Argument: Foreign {
    fn into_value(self) -> Value;
}

/// A host type that can be produced from a native result
pub trait Return: Foreign + Sized {
    fn from_value(value: Value) -> Option<Self>;
}

/// Ordered parameter list of a field
pub trait Params {
    fn describe() -> Vec<TypeDesc>;
}

/// Parameter list whose members can all be pushed
pub trait Arguments: Params {
    fn into_values(self) -> Vec<Value>;
}

/// Result list of a field: empty (void), one value, or a tuple whose tail is
/// returned through out-pointers
pub trait Results {
    fn describe() -> Vec<TypeDesc>;

    /// Whether a zero first result is reported as a [`NativeError`]
    fn fallible() -> bool {
        false
    }
}

/// Result list whose members can all be read back
pub trait Returns: Results + Sized {
    fn from_values(values: Vec<Value>) -> Option<Self>;

    /// Build from a call that may have reported failure; only fallible
    /// result lists accept one
    fn from_outcome(outcome: Result<Vec<Value>, NativeError>) -> Option<Self> {
        outcome.ok().and_then(Self::from_values)
    }
}

macro_rules! single_result {
    ($ty:ty) => {
        impl Results for $ty {
            fn describe() -> Vec<TypeDesc> {
                vec![<$ty as Foreign>::describe()]
            }
        }

        impl Returns for $ty {
            fn from_values(values: Vec<Value>) -> Option<Self> {
                let mut values = values.into_iter();
                let value = <$ty as Return>::from_value(values.next()?)?;
                values.next().is_none().then_some(value)
            }
        }
    };
}

macro_rules! scalar {
    ($($ty:ty => $variant:ident, $desc:expr;)*) => {$(
        impl Foreign for $ty {
            fn describe() -> TypeDesc {
                $desc
            }
        }

        impl Argument for $ty {
            #[inline]
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }

        impl Return for $ty {
            #[inline]
            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        single_result!($ty);
    )*};
}

scalar! {
    bool => Bool, TypeDesc::Bool;
    i8 => I8, TypeDesc::Int { bits: 8, signed: true };
    i16 => I16, TypeDesc::Int { bits: 16, signed: true };
    i32 => I32, TypeDesc::Int { bits: 32, signed: true };
    i64 => I64, TypeDesc::Int { bits: 64, signed: true };
    u8 => U8, TypeDesc::Int { bits: 8, signed: false };
    u16 => U16, TypeDesc::Int { bits: 16, signed: false };
    u32 => U32, TypeDesc::Int { bits: 32, signed: false };
    u64 => U64, TypeDesc::Int { bits: 64, signed: false };
    f32 => F32, TypeDesc::Float { bits: 32 };
    f64 => F64, TypeDesc::Float { bits: 64 };
    Pointer => Pointer, TypeDesc::Pointer { pointee: "void" };
    String => Text, TypeDesc::CString;
}

impl Foreign for usize {
    fn describe() -> TypeDesc {
        TypeDesc::C(CScalar::Size)
    }
}

impl Argument for usize {
    fn into_value(self) -> Value {
        if usize::BITS == 64 {
            Value::U64(self as u64)
        } else {
            Value::U32(self as u32)
        }
    }
}

impl Return for usize {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::U64(v) => usize::try_from(v).ok(),
            Value::U32(v) => usize::try_from(v).ok(),
            _ => None,
        }
    }
}

single_result!(usize);

impl Foreign for isize {
    fn describe() -> TypeDesc {
        TypeDesc::Int { bits: isize::BITS as u16, signed: true }
    }
}

impl Argument for isize {
    fn into_value(self) -> Value {
        if isize::BITS == 64 {
            Value::I64(self as i64)
        } else {
            Value::I32(self as i32)
        }
    }
}

impl Return for isize {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::I64(v) => isize::try_from(v).ok(),
            Value::I32(v) => isize::try_from(v).ok(),
            _ => None,
        }
    }
}

single_result!(isize);

impl Foreign for &'static str {
    fn describe() -> TypeDesc {
        TypeDesc::CString
    }
}

impl Argument for &'static str {
    fn into_value(self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl<T> Foreign for *mut T {
    fn describe() -> TypeDesc {
        TypeDesc::Pointer { pointee: type_name::<T>() }
    }
}

impl<T> Argument for *mut T {
    fn into_value(self) -> Value {
        Value::Pointer(Pointer::from(self))
    }
}

impl<T> Return for *mut T {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Pointer(p) => Some(p.as_ptr().cast()),
            _ => None,
        }
    }
}

impl<T> Results for *mut T {
    fn describe() -> Vec<TypeDesc> {
        vec![<Self as Foreign>::describe()]
    }
}

impl<T> Returns for *mut T {
    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut values = values.into_iter();
        let value = <Self as Return>::from_value(values.next()?)?;
        values.next().is_none().then_some(value)
    }
}

impl<T> Foreign for *const T {
    fn describe() -> TypeDesc {
        TypeDesc::Pointer { pointee: type_name::<T>() }
    }
}

impl<T> Argument for *const T {
    fn into_value(self) -> Value {
        Value::Pointer(Pointer::from(self))
    }
}

impl<T> Return for *const T {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Pointer(p) => Some(p.as_ptr() as *const c_void as *const T),
            _ => None,
        }
    }
}

impl<T> Results for *const T {
    fn describe() -> Vec<TypeDesc> {
        vec![<Self as Foreign>::describe()]
    }
}

impl<T> Returns for *const T {
    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut values = values.into_iter();
        let value = <Self as Return>::from_value(values.next()?)?;
        values.next().is_none().then_some(value)
    }
}

impl<T> Foreign for Opaque<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Pointer { pointee: type_name::<T>() }
    }
}

impl<T> Argument for Opaque<T> {
    fn into_value(self) -> Value {
        Value::Pointer(self.pointer())
    }
}

impl<T> Return for Opaque<T> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Pointer(p) => Some(Self::from_pointer(p)),
            _ => None,
        }
    }
}

impl<T> Results for Opaque<T> {
    fn describe() -> Vec<TypeDesc> {
        vec![<Self as Foreign>::describe()]
    }
}

impl<T> Returns for Opaque<T> {
    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut values = values.into_iter();
        let value = <Self as Return>::from_value(values.next()?)?;
        values.next().is_none().then_some(value)
    }
}

// Host collections describe themselves so a header that mentions one fails
// at install with the type's name; they never marshal.
impl<T> Foreign for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Sequence { name: type_name::<Self>() }
    }
}

impl<T> Results for Vec<T> {
    fn describe() -> Vec<TypeDesc> {
        vec![<Self as Foreign>::describe()]
    }
}

impl<T, const N: usize> Foreign for [T; N] {
    fn describe() -> TypeDesc {
        TypeDesc::Sequence { name: type_name::<Self>() }
    }
}

impl Results for () {
    fn describe() -> Vec<TypeDesc> {
        Vec::new()
    }
}

impl Returns for () {
    fn from_values(values: Vec<Value>) -> Option<Self> {
        values.is_empty().then_some(())
    }
}

// A trailing error result: the native function fails by returning zero and
// the header's error field supplies the text.
impl<T: Results> Results for Result<T, NativeError> {
    fn describe() -> Vec<TypeDesc> {
        T::describe()
    }

    fn fallible() -> bool {
        true
    }
}

impl<T: Returns> Returns for Result<T, NativeError> {
    fn from_values(values: Vec<Value>) -> Option<Self> {
        T::from_values(values).map(Ok)
    }

    fn from_outcome(outcome: Result<Vec<Value>, NativeError>) -> Option<Self> {
        match outcome {
            Ok(values) => Self::from_values(values),
            Err(err) => Some(Err(err)),
        }
    }
}

macro_rules! params_tuple {
    ($($name:ident),*) => {
        impl<$($name: Foreign),*> Params for ($($name,)*) {
            fn describe() -> Vec<TypeDesc> {
                vec![$(<$name as Foreign>::describe()),*]
            }
        }

        impl<$($name: Argument),*> Arguments for ($($name,)*) {
            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)*) = self;
                vec![$($name.into_value()),*]
            }
        }
    };
}

params_tuple!();
params_tuple!(A);
params_tuple!(A, B);
params_tuple!(A, B, C);
params_tuple!(A, B, C, D);
params_tuple!(A, B, C, D, E);
params_tuple!(A, B, C, D, E, F);
params_tuple!(A, B, C, D, E, F, G);
params_tuple!(A, B, C, D, E, F, G, H);

macro_rules! results_tuple {
    ($($name:ident),+) => {
        impl<$($name: Foreign),+> Results for ($($name,)+) {
            fn describe() -> Vec<TypeDesc> {
                vec![$(<$name as Foreign>::describe()),+]
            }
        }

        impl<$($name: Return),+> Returns for ($($name,)+) {
            fn from_values(values: Vec<Value>) -> Option<Self> {
                let mut values = values.into_iter();
                let out = ($(<$name as Return>::from_value(values.next()?)?,)+);
                values.next().is_none().then_some(out)
            }
        }
    };
}

results_tuple!(A, B);
results_tuple!(A, B, C);
results_tuple!(A, B, C, D);

/// Declare nominal C `int` types
///
/// Each type is a transparent wrapper that classifies exactly like `int`
/// while staying distinct in host signatures.
///
/// ```
/// ffibind::c_int_newtype! {
///     /// Status returned by the device layer
///     DeviceStatus;
/// }
/// assert_eq!(DeviceStatus(3).0, 3);
/// ```
#[macro_export]
macro_rules! c_int_newtype {
    ($($(#[$meta:meta])* $name:ident;)*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(pub $crate::c::Int);

        impl $crate::Foreign for $name {
            fn describe() -> $crate::TypeDesc {
                $crate::TypeDesc::named_int(stringify!($name))
            }
        }

        impl $crate::Argument for $name {
            fn into_value(self) -> $crate::Value {
                $crate::Argument::into_value(self.0)
            }
        }

        impl $crate::Return for $name {
            fn from_value(value: $crate::Value) -> Option<Self> {
                <$crate::c::Int as $crate::Return>::from_value(value).map(Self)
            }
        }

        impl $crate::Results for $name {
            fn describe() -> Vec<$crate::TypeDesc> {
                vec![<Self as $crate::Foreign>::describe()]
            }
        }

        impl $crate::Returns for $name {
            fn from_values(values: Vec<$crate::Value>) -> Option<Self> {
                let mut values = values.into_iter();
                let value = <Self as $crate::Return>::from_value(values.next()?)?;
                values.next().is_none().then_some(value)
            }
        }
    )*};
}

/// Human-readable name of a value's kind, for mismatch diagnostics
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Void => "void",
        Value::Text(_) => "string",
        other => other.class().name(),
    }
}

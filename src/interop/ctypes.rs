//! C ABI vocabulary for header declarations
//!
//! Fixed-width aliases for the C scalar spellings of the running target,
//! opaque pointer types, and the nominal integer types C libraries use for
//! error codes, signals and modes. Re-exported as `ffibind::c`.

use core::ffi::c_void;
use core::fmt;
use core::marker::PhantomData;

pub type Bool = bool;
pub type Char = core::ffi::c_char;
pub type CharSigned = core::ffi::c_schar;
pub type CharUnsigned = core::ffi::c_uchar;
pub type Short = core::ffi::c_short;
pub type ShortUnsigned = core::ffi::c_ushort;
pub type Int = core::ffi::c_int;
pub type IntUnsigned = core::ffi::c_uint;
pub type Long = core::ffi::c_long;
pub type LongUnsigned = core::ffi::c_ulong;
pub type LongLong = core::ffi::c_longlong;
pub type LongLongUnsigned = core::ffi::c_ulonglong;
pub type Size = usize;
pub type Float = f32;
pub type Double = f64;

/// Opaque native address
///
/// The binding layer passes it through untouched; dereferencing is the
/// caller's business.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Pointer(*mut c_void);

// Pointer carries an address, not access to the memory behind it
unsafe impl Send for Pointer {}
unsafe impl Sync for Pointer {}

impl Pointer {
    #[inline]
    pub const fn null() -> Self {
        Self(core::ptr::null_mut())
    }

    #[inline]
    pub const fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    #[inline]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl Default for Pointer {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({:p})", self.0)
    }
}

impl<T> From<*mut T> for Pointer {
    fn from(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }
}

impl<T> From<*const T> for Pointer {
    fn from(ptr: *const T) -> Self {
        Self(ptr as *mut c_void)
    }
}

/// Handle to a native object of type `T` that host code never looks inside
#[repr(transparent)]
pub struct Opaque<T> {
    ptr: Pointer,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Opaque<T> {
    #[inline]
    pub const fn null() -> Self {
        Self::from_pointer(Pointer::null())
    }

    #[inline]
    pub const fn from_pointer(ptr: Pointer) -> Self {
        Self { ptr, _marker: PhantomData }
    }

    #[inline]
    pub const fn pointer(self) -> Pointer {
        self.ptr
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.ptr.is_null()
    }
}

impl<T> Clone for Opaque<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Opaque<T> {}

impl<T> PartialEq for Opaque<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for Opaque<T> {}

impl<T> Default for Opaque<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Opaque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>({:p})", core::any::type_name::<T>(), self.ptr.as_ptr())
    }
}

crate::c_int_newtype! {
    /// Generic C enumeration value
    Enum;
    /// `errno`-style error code
    Error;
    /// Floating-point exception flags (`FE_*`)
    FloatException;
    /// Rounding direction (`FE_TONEAREST`, ...)
    FloatRoundingMode;
    /// Result of `fpclassify`
    FloatClass;
    /// `LC_*` locale category
    LocaleCategory;
    /// Signal number
    Signal;
    /// `_IOFBF`, `_IOLBF`, `_IONBF`
    BufferMode;
    /// `SEEK_SET`, `SEEK_CUR`, `SEEK_END`
    SeekMode;
    /// `TIME_UTC` and friends
    TimeType;
}

impl Error {
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl SeekMode {
    pub const SET: Self = Self(0);
    pub const CUR: Self = Self(1);
    pub const END: Self = Self(2);
}

//! Dynamic library loading and symbol resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibraryW, plus the
//! process-wide table of open handles shared by every installed binding.

use core::ffi::c_void;
use core::fmt;
use core::ptr::NonNull;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

#[cfg(unix)]
use std::ffi::{CStr, CString};

use crate::logging;

/// Handle to dynamically loaded library
pub struct Library {
    handle: NonNull<c_void>,
    name: String,
}

/// Resolved native code address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(NonNull<c_void>);

// Code addresses are immutable for the lifetime of the library
unsafe impl Send for SymbolAddress {}
unsafe impl Sync for SymbolAddress {}

impl SymbolAddress {
    /// Wrap a raw code address; `None` for null
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr as *mut c_void).map(Self)
    }

    #[inline]
    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({:p})", self.0.as_ptr())
    }
}

impl Library {
    /// Load a library with immediate symbol binding
    ///
    /// `filename` is handed to the platform loader verbatim, so bare names
    /// go through the system search path.
    pub fn open(filename: &str) -> Result<Self, LoadError> {
        let handle = Self::open_impl(filename)?;
        logging::log_library_open(filename);
        Ok(Self { handle, name: filename.to_owned() })
    }

    #[cfg(unix)]
    fn open_impl(filename: &str) -> Result<NonNull<c_void>, LoadError> {
        let cname = CString::new(filename).map_err(|_| LoadError {
            library: filename.to_owned(),
            text: "library name contains an interior nul byte".into(),
        })?;

        // cname lives until the end of this scope, past the dlopen call
        let handle = unsafe { libc::dlopen(cname.as_ptr(), libc::RTLD_NOW) };
        NonNull::new(handle).ok_or_else(|| LoadError {
            library: filename.to_owned(),
            text: last_error(),
        })
    }

    #[cfg(windows)]
    fn open_impl(filename: &str) -> Result<NonNull<c_void>, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::libloaderapi::LoadLibraryW;

        if filename.contains('\0') {
            return Err(LoadError {
                library: filename.to_owned(),
                text: "library name contains an interior nul byte".into(),
            });
        }

        let wide: Vec<u16> = OsStr::new(filename).encode_wide().chain(Some(0)).collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        NonNull::new(handle.cast::<c_void>()).ok_or_else(|| LoadError {
            library: filename.to_owned(),
            text: last_error(),
        })
    }

    /// Filename the library was opened with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a symbol to its code address
    pub fn symbol(&self, name: &str) -> Result<SymbolAddress, SymbolError> {
        let address = self.symbol_impl(name)?;
        logging::log_symbol(&self.name, name, address.as_ptr());
        Ok(address)
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &str) -> Result<SymbolAddress, SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName { symbol: name.to_owned() })?;

        unsafe {
            // Clear any stale error so a null result reports this lookup
            libc::dlerror();
            let ptr = libc::dlsym(self.handle.as_ptr(), cname.as_ptr());
            SymbolAddress::from_ptr(ptr).ok_or_else(|| SymbolError::Missing {
                symbol: name.to_owned(),
                text: last_error(),
            })
        }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &str) -> Result<SymbolAddress, SymbolError> {
        use std::ffi::CString;
        use winapi::um::libloaderapi::GetProcAddress;

        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName { symbol: name.to_owned() })?;

        unsafe {
            let ptr = GetProcAddress(self.handle.as_ptr().cast(), cname.as_ptr());
            SymbolAddress::from_ptr(ptr as *const c_void).ok_or_else(|| SymbolError::Missing {
                symbol: name.to_owned(),
                text: last_error(),
            })
        }
    }

    /// Close the library now rather than when the last reference drops
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
        logging::log_library_close(&self.name);
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        use winapi::um::libloaderapi::FreeLibrary;
        unsafe {
            FreeLibrary(self.handle.as_ptr().cast());
        }
        logging::log_library_close(&self.name);
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

/// Most recent loader error on this thread; empty when none is pending
#[cfg(unix)]
pub fn last_error() -> String {
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            String::new()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

/// Most recent loader error on this thread; empty when none is pending
#[cfg(windows)]
pub fn last_error() -> String {
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::winbase::{FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS};

    let code = unsafe { GetLastError() };
    if code == 0 {
        return String::new();
    }

    let mut buf = [0u16; 512];
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            core::ptr::null(),
            code,
            0,
            buf.as_mut_ptr(),
            buf.len() as u32,
            core::ptr::null_mut(),
        )
    };
    if len == 0 {
        return format!("error code {}", code);
    }
    String::from_utf16_lossy(&buf[..len as usize]).trim_end().to_owned()
}

/// Process-wide cache of open libraries, keyed by filename
///
/// Bindings hold their own `Arc`, so removing an entry never invalidates an
/// installed field; the library closes when its last holder drops.
pub struct LibraryTable {
    libraries: DashMap<String, Arc<Library>>,
}

static GLOBAL_TABLE: Lazy<LibraryTable> = Lazy::new(LibraryTable::new);

impl LibraryTable {
    pub fn new() -> Self {
        Self { libraries: DashMap::new() }
    }

    /// The table shared by every installer in the process
    pub fn global() -> &'static Self {
        &GLOBAL_TABLE
    }

    /// Open `filename`, or return the handle already held for it
    pub fn open(&self, filename: &str) -> Result<Arc<Library>, LoadError> {
        if let Some(lib) = self.libraries.get(filename) {
            return Ok(Arc::clone(lib.value()));
        }

        match self.libraries.entry(filename.to_owned()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let lib = Arc::new(Library::open(filename)?);
                entry.insert(Arc::clone(&lib));
                super::record_library_loaded();
                Ok(lib)
            }
        }
    }

    /// Drop the table's reference to `filename`
    pub fn close(&self, filename: &str) -> bool {
        self.libraries.remove(filename).is_some()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.libraries.contains_key(filename)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl Default for LibraryTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Library loading errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub library: String,
    pub text: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load library '{}': {}", self.library, self.text)
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    InvalidName { symbol: String },
    Missing { symbol: String, text: String },
}

impl SymbolError {
    pub fn symbol(&self) -> &str {
        match self {
            Self::InvalidName { symbol } | Self::Missing { symbol, .. } => symbol,
        }
    }

    /// Loader text, if the platform loader produced any
    pub fn text(&self) -> &str {
        match self {
            Self::InvalidName { .. } => "symbol name contains an interior nul byte",
            Self::Missing { text, .. } => text,
        }
    }
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { symbol } => write!(f, "invalid symbol name {:?}", symbol),
            Self::Missing { symbol, text } if text.is_empty() => write!(f, "symbol '{}' not found", symbol),
            Self::Missing { symbol, text } => write!(f, "symbol '{}' not found: {}", symbol, text),
        }
    }
}

impl std::error::Error for SymbolError {}

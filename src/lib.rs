//! Schema-driven bindings to C shared libraries
//!
//! Declare a header record with [`header!`], then [`install`] it: the
//! library is loaded, every field's symbol resolved and its signature
//! classified against the platform C ABI. Installed fields are callable from
//! any thread.
//!
//! ```no_run
//! use ffibind::c::Pointer;
//!
//! ffibind::header! {
//!     pub struct LibC {
//!         linux: "libc.so.6",
//!         darwin: "libSystem.dylib",
//!         windows: "ucrtbase.dll";
//!
//!         pub time: fn(Pointer) -> i64;
//!         pub is_alphanumeric as "isalnum": fn(i32) -> i32;
//!     }
//! }
//!
//! let libc = LibC::new();
//! ffibind::install(&libc, None)?;
//! let now = libc.time.call((Pointer::null(),))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod config;
pub mod interop;
pub mod logging;

pub use interop::ctypes as c;

// Re-export commonly used items
pub use config::BindConfig;
pub use interop::{
    classify, install, link, stats, width_of, Argument, Arguments, Binding, CType, CallError, CallFrame, Extern,
    Field, Foreign, Function, Header, InstallError, Installer, InteropStats, Libraries, Library, LibraryTable,
    LoadError, NativeError, Params, Prototype, Results, Return, Returns, Signature, Slot, SymbolAddress, SymbolError,
    TypeDesc, Value, WORD,
};

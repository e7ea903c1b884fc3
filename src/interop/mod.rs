//! Interoperability - bind C shared libraries from declarative headers
//!
//! Architecture:
//! - `types.rs` - C ABI value classes, host descriptors, classification
//! - `abi.rs` - Data models, platform tags, register/stack planning
//! - `ctypes.rs` - C scalar aliases and nominal types (`ffibind::c`)
//! - `marshal.rs` - Host ↔ C value conversions
//! - `library.rs` - Dynamic library loading (dlopen/LoadLibrary)
//! - `call.rs` - Per-call frame and typed invocation through libffi
//! - `header.rs` - Header records and their function fields
//! - `install.rs` - Resolving and installing bindings

use core::sync::atomic::{AtomicUsize, Ordering};

pub mod abi;
pub mod call;
pub mod ctypes;
pub mod header;
pub mod install;
pub mod library;
pub mod marshal;
pub mod types;

pub use abi::{CallingConvention, DataModel, Platform, RegisterAllocator, SlotPlan};
pub use call::{CallError, CallFrame, NativeError, OutSlot, DEFAULT_FRAME_SIZE, MIN_FRAME_SIZE, WORD};
pub use header::{Extern, Field, Function, Header, Libraries, Prototype, Slot};
pub use install::{install, link, signature_of, Binding, InstallError, Installer};
pub use library::{last_error, Library, LibraryTable, LoadError, SymbolAddress, SymbolError};
pub use marshal::{Argument, Arguments, Foreign, Params, Results, Return, Returns};
pub use types::{align_of, classify, classify_scalar, width_of, CScalar, CType, Signature, TypeDesc, TypeError, Value};

static CALLS_MADE: AtomicUsize = AtomicUsize::new(0);
static CALL_ERRORS: AtomicUsize = AtomicUsize::new(0);
static FRAMES_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static FRAMES_RELEASED: AtomicUsize = AtomicUsize::new(0);
static LIBRARIES_LOADED: AtomicUsize = AtomicUsize::new(0);
static BINDINGS_INSTALLED: AtomicUsize = AtomicUsize::new(0);

/// Initialize interop subsystem
///
/// Sets up logging from the environment. Binding works without it; this
/// only makes the loader and installer events visible.
pub fn init() {
    crate::logging::init();
}

/// Initialize interop with the logging level a bind configuration names
///
/// `log_level` from the configuration overrides `FFIBIND_LOG_LEVEL`; the
/// other logging settings still come from the environment.
pub fn init_with(config: &crate::config::BindConfig) {
    crate::logging::init_with_config(config.log_config());
}

/// Get interop statistics
pub fn stats() -> InteropStats {
    InteropStats {
        calls_made: CALLS_MADE.load(Ordering::Relaxed),
        call_errors: CALL_ERRORS.load(Ordering::Relaxed),
        frames_allocated: FRAMES_ALLOCATED.load(Ordering::Relaxed),
        frames_released: FRAMES_RELEASED.load(Ordering::Relaxed),
        libraries_loaded: LIBRARIES_LOADED.load(Ordering::Relaxed),
        bindings_installed: BINDINGS_INSTALLED.load(Ordering::Relaxed),
    }
}

/// Interop statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropStats {
    pub calls_made: usize,
    pub call_errors: usize,
    pub frames_allocated: usize,
    pub frames_released: usize,
    pub libraries_loaded: usize,
    pub bindings_installed: usize,
}

impl InteropStats {
    /// Frames currently alive
    pub fn frames_live(&self) -> usize {
        self.frames_allocated.saturating_sub(self.frames_released)
    }
}

#[inline]
pub(crate) fn record_call() {
    CALLS_MADE.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_call_error() {
    CALL_ERRORS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_frame_allocated() {
    FRAMES_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_frame_released() {
    FRAMES_RELEASED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_library_loaded() {
    LIBRARIES_LOADED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_binding_installed() {
    BINDINGS_INSTALLED.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests;

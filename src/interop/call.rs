//! Per-call VM: typed argument pushes into a scratch arena, then a typed
//! invocation through a symbol address.
//!
//! The arena is a fixed block of zeroed words allocated when the frame is
//! created and freed when it drops. Every pushed slot occupies one word, C
//! strings are copied into consecutive words, and out-pointer storage is a
//! word whose address is pushed. Register and stack placement is delegated to
//! libffi, which builds the call interface from the pushed slot classes.

use core::cell::Cell;
use core::ffi::c_void;
use core::fmt;
use std::ffi::CStr;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use libffi::raw::{ffi_arg, ffi_sarg};

use super::ctypes::Pointer;
use super::library::SymbolAddress;
use super::types::{CType, Signature, Value};

/// Arena size for frames that copy strings
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Smallest arena a frame will allocate
pub const MIN_FRAME_SIZE: usize = WORD;

/// Bytes per arena word; every slot occupies one
pub const WORD: usize = core::mem::size_of::<u64>();

#[derive(Debug, Clone, Copy)]
struct Slot {
    class: CType,
    word: usize,
}

/// Storage reserved for a value the callee writes through a pushed pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutSlot {
    class: CType,
    word: usize,
}

impl OutSlot {
    pub fn class(&self) -> CType {
        self.class
    }
}

/// Scratch state for one native call
pub struct CallFrame {
    arena: Box<[Cell<u64>]>,
    cursor: usize,
    slots: Vec<Slot>,
}

impl CallFrame {
    /// Allocate a frame with at least `capacity` bytes of arena
    pub fn new(capacity: usize) -> Self {
        let words = capacity.max(MIN_FRAME_SIZE).div_ceil(WORD);
        super::record_frame_allocated();
        Self {
            arena: (0..words).map(|_| Cell::new(0)).collect(),
            cursor: 0,
            slots: Vec::new(),
        }
    }

    /// Arena size in bytes
    pub fn capacity(&self) -> usize {
        self.arena.len() * WORD
    }

    /// Arena bytes consumed so far
    pub fn used(&self) -> usize {
        self.cursor * WORD
    }

    /// Number of pushed argument slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Classes of the pushed slots, in push order
    pub fn classes(&self) -> impl Iterator<Item = CType> + '_ {
        self.slots.iter().map(|slot| slot.class)
    }

    fn alloc(&mut self, words: usize) -> Result<usize, CallError> {
        let start = self.cursor;
        match start.checked_add(words) {
            Some(end) if end <= self.arena.len() => {
                self.cursor = end;
                Ok(start)
            }
            _ => Err(CallError::CallFrameExhausted {
                capacity: self.capacity(),
                requested: start.saturating_add(words).saturating_mul(WORD),
            }),
        }
    }

    fn word_addr(&self, word: usize) -> usize {
        self.arena[word].as_ptr() as usize
    }

    fn push_bytes(&mut self, class: CType, bytes: &[u8]) -> Result<(), CallError> {
        let word = self.alloc(1)?;
        self.arena[word].set(pack(bytes));
        self.slots.push(Slot { class, word });
        Ok(())
    }

    pub fn push_bool(&mut self, value: bool) -> Result<(), CallError> {
        self.push_bytes(CType::Bool, &[value as u8])
    }

    pub fn push_i8(&mut self, value: i8) -> Result<(), CallError> {
        self.push_bytes(CType::I8, &value.to_ne_bytes())
    }

    pub fn push_i16(&mut self, value: i16) -> Result<(), CallError> {
        self.push_bytes(CType::I16, &value.to_ne_bytes())
    }

    pub fn push_i32(&mut self, value: i32) -> Result<(), CallError> {
        self.push_bytes(CType::I32, &value.to_ne_bytes())
    }

    pub fn push_i64(&mut self, value: i64) -> Result<(), CallError> {
        self.push_bytes(CType::I64, &value.to_ne_bytes())
    }

    pub fn push_u8(&mut self, value: u8) -> Result<(), CallError> {
        self.push_bytes(CType::U8, &value.to_ne_bytes())
    }

    pub fn push_u16(&mut self, value: u16) -> Result<(), CallError> {
        self.push_bytes(CType::U16, &value.to_ne_bytes())
    }

    pub fn push_u32(&mut self, value: u32) -> Result<(), CallError> {
        self.push_bytes(CType::U32, &value.to_ne_bytes())
    }

    pub fn push_u64(&mut self, value: u64) -> Result<(), CallError> {
        self.push_bytes(CType::U64, &value.to_ne_bytes())
    }

    pub fn push_f32(&mut self, value: f32) -> Result<(), CallError> {
        self.push_bytes(CType::F32, &value.to_ne_bytes())
    }

    pub fn push_f64(&mut self, value: f64) -> Result<(), CallError> {
        self.push_bytes(CType::F64, &value.to_ne_bytes())
    }

    pub fn push_pointer(&mut self, value: Pointer) -> Result<(), CallError> {
        self.push_bytes(CType::Pointer, &value.addr().to_ne_bytes())
    }

    /// Copy `value` into the arena as a C string and push its address
    ///
    /// The copy stops at the first interior nul, so the callee sees the same
    /// string C would. An empty string pushes a pointer to a lone nul.
    pub fn push_cstring(&mut self, value: &str) -> Result<(), CallError> {
        let bytes = value.as_bytes();
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let bytes = &bytes[..len];

        // One extra byte for the terminator; the arena starts zeroed
        let start = self.alloc((len + 1).div_ceil(WORD))?;
        for (i, chunk) in bytes.chunks(WORD).enumerate() {
            self.arena[start + i].set(pack(chunk));
        }

        let addr = self.word_addr(start);
        self.push_bytes(CType::CString, &addr.to_ne_bytes())
    }

    /// Reserve zeroed storage for an out-parameter and push its address
    pub fn push_out(&mut self, class: CType) -> Result<OutSlot, CallError> {
        if !class.is_scalar() || class.size() > WORD {
            return Err(CallError::mismatch(format!("{} cannot be returned through an out-pointer", class)));
        }

        let word = self.alloc(1)?;
        let addr = self.word_addr(word);
        self.push_bytes(CType::Pointer, &addr.to_ne_bytes())?;
        Ok(OutSlot { class, word })
    }

    /// Read what the callee stored through an out-pointer
    pub fn read_out(&self, slot: OutSlot) -> Value {
        unpack(slot.class, self.arena[slot.word].get())
    }

    /// Push a host value as the given class
    ///
    /// A pointer is accepted where a C string is expected and is passed
    /// through untouched; every other combination must match exactly.
    pub fn push_value(&mut self, class: CType, value: Value) -> Result<(), CallError> {
        match (class, value) {
            (CType::Bool, Value::Bool(v)) => self.push_bool(v),
            (CType::I8, Value::I8(v)) => self.push_i8(v),
            (CType::I16, Value::I16(v)) => self.push_i16(v),
            (CType::I32, Value::I32(v)) => self.push_i32(v),
            (CType::I64, Value::I64(v)) => self.push_i64(v),
            (CType::U8, Value::U8(v)) => self.push_u8(v),
            (CType::U16, Value::U16(v)) => self.push_u16(v),
            (CType::U32, Value::U32(v)) => self.push_u32(v),
            (CType::U64, Value::U64(v)) => self.push_u64(v),
            (CType::F32, Value::F32(v)) => self.push_f32(v),
            (CType::F64, Value::F64(v)) => self.push_f64(v),
            (CType::Pointer, Value::Pointer(p)) => self.push_pointer(p),
            (CType::CString, Value::Text(s)) => self.push_cstring(&s),
            (CType::CString, Value::Pointer(p)) => self.push_bytes(CType::CString, &p.addr().to_ne_bytes()),
            (class, value) => Err(CallError::mismatch(format!(
                "argument {} expects {}, got {}",
                self.slots.len() + 1,
                class,
                super::marshal::value_kind(&value)
            ))),
        }
    }

    /// Verify the pushed slots against the signature's native parameters
    pub fn check(&self, signature: &Signature) -> Result<(), CallError> {
        if self.classes().eq(signature.native_params()) {
            return Ok(());
        }
        let pushed: Vec<&str> = self.classes().map(CType::name).collect();
        Err(CallError::mismatch(format!(
            "signature {} does not match pushed ({})",
            signature,
            pushed.join(", ")
        )))
    }

    fn cif(&self, ret: CType) -> Cif {
        Cif::new(self.slots.iter().map(|slot| ffi_type(slot.class)), ffi_type(ret))
    }

    fn args(&self) -> Vec<Arg> {
        // Cell<u64> is layout-compatible with u64, and the callee reads
        // through these addresses only for the duration of the call
        self.slots.iter().map(|slot| Arg::new(&self.arena[slot.word])).collect()
    }

    unsafe fn invoke<R>(&self, symbol: SymbolAddress, ret: CType) -> R {
        let cif = self.cif(ret);
        let args = self.args();
        cif.call::<R>(CodePtr::from_ptr(symbol.as_ptr()), &args)
    }

    /// Call a function returning nothing
    ///
    /// # Safety
    /// `symbol` must be a C function whose parameters match the pushed slots
    /// and whose return type matches the call variant.
    pub unsafe fn call_void(&self, symbol: SymbolAddress) {
        self.invoke::<()>(symbol, CType::Void)
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_bool(&self, symbol: SymbolAddress) -> bool {
        // Integer results narrower than a register come back widened
        self.invoke::<ffi_arg>(symbol, CType::Bool) as u8 != 0
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_i8(&self, symbol: SymbolAddress) -> i8 {
        self.invoke::<ffi_sarg>(symbol, CType::I8) as i8
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_i16(&self, symbol: SymbolAddress) -> i16 {
        self.invoke::<ffi_sarg>(symbol, CType::I16) as i16
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_i32(&self, symbol: SymbolAddress) -> i32 {
        self.invoke::<ffi_sarg>(symbol, CType::I32) as i32
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_i64(&self, symbol: SymbolAddress) -> i64 {
        self.invoke::<i64>(symbol, CType::I64)
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_u8(&self, symbol: SymbolAddress) -> u8 {
        self.invoke::<ffi_arg>(symbol, CType::U8) as u8
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_u16(&self, symbol: SymbolAddress) -> u16 {
        self.invoke::<ffi_arg>(symbol, CType::U16) as u16
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_u32(&self, symbol: SymbolAddress) -> u32 {
        self.invoke::<ffi_arg>(symbol, CType::U32) as u32
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_u64(&self, symbol: SymbolAddress) -> u64 {
        self.invoke::<u64>(symbol, CType::U64)
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_f32(&self, symbol: SymbolAddress) -> f32 {
        self.invoke::<f32>(symbol, CType::F32)
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_f64(&self, symbol: SymbolAddress) -> f64 {
        self.invoke::<f64>(symbol, CType::F64)
    }

    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call_pointer(&self, symbol: SymbolAddress) -> Pointer {
        Pointer::from_raw(self.invoke::<*mut c_void>(symbol, CType::Pointer))
    }

    /// Call with the variant selected by `ret`
    ///
    /// A C string result is copied into a host `String` (lossily, null gives
    /// an empty string); the native buffer stays owned by the callee.
    ///
    /// # Safety
    /// See [`CallFrame::call_void`].
    pub unsafe fn call(&self, symbol: SymbolAddress, ret: CType) -> Result<Value, CallError> {
        Ok(match ret {
            CType::Void => {
                self.call_void(symbol);
                Value::Void
            }
            CType::Bool => Value::Bool(self.call_bool(symbol)),
            CType::I8 => Value::I8(self.call_i8(symbol)),
            CType::I16 => Value::I16(self.call_i16(symbol)),
            CType::I32 => Value::I32(self.call_i32(symbol)),
            CType::I64 => Value::I64(self.call_i64(symbol)),
            CType::U8 => Value::U8(self.call_u8(symbol)),
            CType::U16 => Value::U16(self.call_u16(symbol)),
            CType::U32 => Value::U32(self.call_u32(symbol)),
            CType::U64 => Value::U64(self.call_u64(symbol)),
            CType::F32 => Value::F32(self.call_f32(symbol)),
            CType::F64 => Value::F64(self.call_f64(symbol)),
            CType::Pointer => Value::Pointer(self.call_pointer(symbol)),
            CType::CString => {
                let ptr = self.call_pointer(symbol);
                if ptr.is_null() {
                    Value::Text(String::new())
                } else {
                    Value::Text(CStr::from_ptr(ptr.as_ptr().cast()).to_string_lossy().into_owned())
                }
            }
            CType::Opaque128 => {
                return Err(CallError::mismatch("opaque128 has no return register class"));
            }
        })
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        super::record_frame_released();
    }
}

impl fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// libffi descriptor for a value class
fn ffi_type(ty: CType) -> Type {
    match ty {
        CType::Void => Type::void(),
        CType::Bool | CType::U8 => Type::u8(),
        CType::I8 => Type::i8(),
        CType::I16 => Type::i16(),
        CType::I32 => Type::i32(),
        CType::I64 => Type::i64(),
        CType::U16 => Type::u16(),
        CType::U32 => Type::u32(),
        CType::U64 => Type::u64(),
        CType::F32 => Type::f32(),
        CType::F64 => Type::f64(),
        CType::Pointer | CType::CString => Type::pointer(),
        CType::Opaque128 => Type::structure(vec![Type::u64(), Type::u64()]),
    }
}

/// Bytes at the start of a word, remainder zeroed
fn pack(bytes: &[u8]) -> u64 {
    let mut word = [0u8; WORD];
    word[..bytes.len()].copy_from_slice(bytes);
    u64::from_ne_bytes(word)
}

fn unpack(class: CType, word: u64) -> Value {
    let bytes = word.to_ne_bytes();
    match class {
        CType::Void | CType::Opaque128 => Value::Void,
        CType::Bool => Value::Bool(bytes[0] != 0),
        CType::I8 => Value::I8(i8::from_ne_bytes([bytes[0]])),
        CType::U8 => Value::U8(bytes[0]),
        CType::I16 => Value::I16(i16::from_ne_bytes([bytes[0], bytes[1]])),
        CType::U16 => Value::U16(u16::from_ne_bytes([bytes[0], bytes[1]])),
        CType::I32 => Value::I32(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        CType::U32 => Value::U32(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        CType::F32 => Value::F32(f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        CType::I64 => Value::I64(i64::from_ne_bytes(bytes)),
        CType::U64 => Value::U64(u64::from_ne_bytes(bytes)),
        CType::F64 => Value::F64(f64::from_ne_bytes(bytes)),
        CType::Pointer | CType::CString => {
            const ADDR: usize = core::mem::size_of::<usize>();
            let mut addr = [0u8; ADDR];
            addr.copy_from_slice(&bytes[..ADDR]);
            Value::Pointer(Pointer::from_raw(usize::from_ne_bytes(addr) as *mut c_void))
        }
    }
}

/// Function call errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The frame's arena could not hold the pushed data
    CallFrameExhausted { capacity: usize, requested: usize },
    /// Pushed arguments or results disagree with the installed signature
    SignatureMismatch { symbol: Option<String>, detail: String },
    /// The field was called before its header was installed
    NotInstalled { field: String },
    /// A fallible function returned zero
    Native(NativeError),
}

impl CallError {
    pub(crate) fn mismatch(detail: impl Into<String>) -> Self {
        Self::SignatureMismatch { symbol: None, detail: detail.into() }
    }

    /// Attach the symbol a mismatch was raised for
    pub fn with_symbol(self, name: &str) -> Self {
        match self {
            Self::SignatureMismatch { symbol: None, detail } => {
                Self::SignatureMismatch { symbol: Some(name.to_owned()), detail }
            }
            other => other,
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallFrameExhausted { capacity, requested } => {
                write!(f, "call frame exhausted: {} bytes needed, {} available", requested, capacity)
            }
            Self::SignatureMismatch { symbol: Some(symbol), detail } => {
                write!(f, "signature mismatch calling '{}': {}", symbol, detail)
            }
            Self::SignatureMismatch { symbol: None, detail } => write!(f, "signature mismatch: {}", detail),
            Self::NotInstalled { field } => write!(f, "'{}' was called before its header was installed", field),
            Self::Native(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Native(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure reported by a fallible native function
///
/// The text comes from the header's error field, read right after the
/// failing call; it is empty when the header declares none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    symbol: String,
    text: String,
}

impl NativeError {
    pub fn new(symbol: impl Into<String>, text: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), text: text.into() }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "'{}' reported failure", self.symbol)
        } else {
            write!(f, "'{}' failed: {}", self.symbol, self.text)
        }
    }
}

impl std::error::Error for NativeError {}

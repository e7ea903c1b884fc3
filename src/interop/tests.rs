//! Unit tests for the interop module, calling local `extern "C"` functions

use core::ffi::{c_char, c_void, CStr};

use super::abi::*;
use super::call::*;
use super::ctypes::Pointer;
use super::header::*;
use super::install::*;
use super::marshal::*;
use super::types::*;
use super::*;

// Test helpers
extern "C" fn add_i32(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn mul_f64(a: f64, b: f64) -> f64 {
    a * b
}

extern "C" fn identity_ptr(ptr: *const c_void) -> *const c_void {
    ptr
}

extern "C" fn no_args() -> i32 {
    42
}

extern "C" fn negate_i8(v: i8) -> i8 {
    -v
}

extern "C" fn high_u32(v: u32) -> u32 {
    v | 0x8000_0000
}

extern "C" fn is_even(v: u64) -> bool {
    v % 2 == 0
}

extern "C" fn half_f32(v: f32) -> f32 {
    v / 2.0
}

extern "C" fn c_len(s: *const c_char) -> usize {
    unsafe { CStr::from_ptr(s).to_bytes().len() }
}

extern "C" fn first_byte(s: *const c_char) -> i32 {
    unsafe { *s as i32 }
}

extern "C" fn greeting() -> *const c_char {
    b"hello\0".as_ptr().cast()
}

extern "C" fn null_string() -> *const c_char {
    core::ptr::null()
}

extern "C" fn split(x: f64, exp: *mut i32) -> f64 {
    unsafe { *exp = 3 };
    x / 8.0
}

extern "C" fn store(value: i64, out: *mut i64) {
    unsafe { *out = value * 2 };
}

extern "C" fn fill(small: *mut u16, ratio: *mut f32, flag: *mut bool, addr: *mut *mut c_void) -> u64 {
    unsafe {
        *small = 0xBEEF;
        *ratio = 0.25;
        *flag = true;
        *addr = small.cast();
    }
    u64::MAX - 1
}

#[allow(clippy::too_many_arguments)]
extern "C" fn many_ints(a: i64, b: i64, c: i64, d: i64, e: i64, f: i64, g: i64, h: i64, i: i64, j: i64) -> i64 {
    a + 2 * b + 3 * c + 4 * d + 5 * e + 6 * f + 7 * g + 8 * h + 9 * i + 10 * j
}

#[allow(clippy::too_many_arguments)]
extern "C" fn mixed(a: f64, b: i32, c: f32, d: i64, e: f64, f: u8, g: f64, h: f64, i: f64, j: f64, k: f64, l: f64) -> f64 {
    a + b as f64 + c as f64 + d as f64 + e + f as f64 + g + h + i + j + k + l
}

fn addr(f: *const c_void) -> SymbolAddress {
    SymbolAddress::from_ptr(f).expect("function address is never null")
}

#[test]
fn test_ctype_sizes() {
    assert_eq!(CType::I8.size(), 1);
    assert_eq!(CType::I16.size(), 2);
    assert_eq!(CType::I32.size(), 4);
    assert_eq!(CType::I64.size(), 8);
    assert_eq!(CType::F32.size(), 4);
    assert_eq!(CType::F64.size(), 8);
    assert_eq!(CType::Pointer.size(), core::mem::size_of::<usize>());
    assert_eq!(CType::Opaque128.size(), 16);
    assert_eq!(width_of(CType::Void), 0);
}

#[test]
fn test_ctype_alignment() {
    assert_eq!(CType::I8.align(), 1);
    assert_eq!(CType::I16.align(), 2);
    assert_eq!(CType::I32.align(), 4);
    assert_eq!(CType::I64.align(), 8);
    assert_eq!(CType::F64.align(), 8);
    assert_eq!(align_of(CType::Void), 1);
}

#[test]
fn test_ctype_predicates() {
    assert!(CType::F32.is_float());
    assert!(!CType::I32.is_float());
    assert!(CType::U16.is_integer());
    assert!(!CType::U16.is_signed());
    assert!(CType::I16.is_signed());
    assert!(CType::CString.is_pointer());
    assert!(CType::Opaque128.is_aggregate());
    assert!(!CType::Opaque128.is_scalar());
    assert!(!CType::Void.is_scalar());
}

#[test]
fn test_classify_host_types() {
    assert_eq!(classify(&<f64 as Foreign>::describe()), Ok(CType::F64));
    assert_eq!(classify(&<i32 as Foreign>::describe()), Ok(CType::I32));
    assert_eq!(classify(&<u8 as Foreign>::describe()), Ok(CType::U8));
    assert_eq!(classify(&<bool as Foreign>::describe()), Ok(CType::Bool));
    assert_eq!(classify(&<String as Foreign>::describe()), Ok(CType::CString));
    assert_eq!(classify(&<Pointer as Foreign>::describe()), Ok(CType::Pointer));
    assert_eq!(classify(&<*mut u8 as Foreign>::describe()), Ok(CType::Pointer));
    assert_eq!(classify(&<crate::c::Opaque<u32> as Foreign>::describe()), Ok(CType::Pointer));
}

#[test]
fn test_classify_nominal_int() {
    let int = classify(&TypeDesc::C(CScalar::Int)).unwrap();
    assert_eq!(classify(&<crate::c::Error as Foreign>::describe()), Ok(int));
    assert_eq!(classify(&<crate::c::Signal as Foreign>::describe()), Ok(int));
    assert_eq!(classify(&<crate::c::SeekMode as Foreign>::describe()), Ok(int));
    assert_eq!(<crate::c::Signal as Foreign>::describe().name(), "Signal");
}

#[test]
fn test_classify_rejects_unrepresentable() {
    let err = classify(&<Vec<u8> as Foreign>::describe()).unwrap_err();
    let TypeError::Unsupported { type_name } = err;
    assert!(type_name.contains("Vec<u8>"));

    assert!(classify(&TypeDesc::Int { bits: 12, signed: true }).is_err());
    assert!(classify(&TypeDesc::Float { bits: 16 }).is_err());
    assert!(classify(&TypeDesc::Record { name: "Point" }).is_err());
    assert!(classify(&TypeDesc::Opaque { name: "Blob", size: 24 }).is_err());
    assert_eq!(classify(&TypeDesc::Int { bits: 128, signed: true }), Ok(CType::Opaque128));
}

#[test]
fn test_data_models() {
    assert_eq!(classify_scalar(CScalar::Long, DataModel::LP64), Some(CType::I64));
    assert_eq!(classify_scalar(CScalar::Long, DataModel::LLP64), Some(CType::I32));
    assert_eq!(classify_scalar(CScalar::UnsignedLong, DataModel::ILP32), Some(CType::U32));
    assert_eq!(classify_scalar(CScalar::Size, DataModel::ILP32), Some(CType::U32));
    assert_eq!(classify_scalar(CScalar::LongDouble, DataModel::LP64), Some(CType::Opaque128));
    assert_eq!(classify_scalar(CScalar::LongDouble, DataModel::LLP64), Some(CType::F64));
    assert_eq!(classify_scalar(CScalar::LongDouble, DataModel::ILP32), None);
    assert_eq!(classify_scalar(CScalar::Int128, DataModel::LP64), Some(CType::Opaque128));
}

#[test]
fn test_platform_tags() {
    assert_eq!(Platform::from_tag("darwin"), Some(Platform::Darwin));
    assert_eq!(Platform::from_tag("plan9"), None);
    for platform in Platform::ALL {
        assert_eq!(Platform::from_tag(platform.tag()), Some(platform));
    }
    #[cfg(target_os = "linux")]
    assert_eq!(Platform::current_tag(), "linux");
}

#[test]
fn test_calling_convention() {
    let conv = CallingConvention::current();

    #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
    assert_eq!(conv, CallingConvention::SysV);

    #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
    assert_eq!(conv, CallingConvention::Win64);

    #[cfg(target_arch = "aarch64")]
    assert_eq!(conv, CallingConvention::Aarch64);

    let _ = conv;
}

#[test]
fn test_register_allocator_sysv() {
    let mut alloc = RegisterAllocator::new(CallingConvention::SysV);

    // Use all 6 integer registers
    for _ in 0..6 {
        assert!(alloc.can_use_register(false));
        alloc.use_register(false);
    }
    assert!(!alloc.can_use_register(false));

    // Float registers are tracked separately
    assert!(alloc.can_use_register(true));
}

#[test]
fn test_slot_plan_spills() {
    let ints = vec![CType::I64; 10];
    let plan = CallingConvention::SysV.plan(ints.iter().copied());
    assert_eq!(plan, SlotPlan { int_registers: 6, float_registers: 0, stack_slots: 4 });

    // Win64 shares four positional registers across classes
    let mixed = [CType::F64, CType::I32, CType::F64, CType::I32, CType::F64];
    let plan = CallingConvention::Win64.plan(mixed);
    assert_eq!(plan.int_registers + plan.float_registers, 4);
    assert_eq!(plan.stack_slots, 1);

    let plan = CallingConvention::C.plan([CType::I32, CType::F32]);
    assert_eq!(plan.stack_slots, 2);
}

#[test]
fn test_frame_call_i32() {
    let mut frame = CallFrame::new(64);
    frame.push_i32(10).unwrap();
    frame.push_i32(32).unwrap();

    let result = unsafe { frame.call_i32(addr(add_i32 as *const c_void)) };
    assert_eq!(result, 42);
}

#[test]
fn test_frame_call_f64() {
    let mut frame = CallFrame::new(64);
    frame.push_f64(2.5).unwrap();
    frame.push_f64(4.0).unwrap();

    let result = unsafe { frame.call_f64(addr(mul_f64 as *const c_void)) };
    assert!((result - 10.0).abs() < 1e-10);
}

#[test]
fn test_frame_call_pointer() {
    let mut frame = CallFrame::new(64);
    let ptr = Pointer::from_raw(0x1234 as *mut c_void);
    frame.push_pointer(ptr).unwrap();

    let result = unsafe { frame.call_pointer(addr(identity_ptr as *const c_void)) };
    assert_eq!(result, ptr);
}

#[test]
fn test_frame_no_args() {
    let frame = CallFrame::new(MIN_FRAME_SIZE);
    assert!(frame.is_empty());
    let result = unsafe { frame.call_i32(addr(no_args as *const c_void)) };
    assert_eq!(result, 42);
}

#[test]
fn test_frame_narrow_and_unsigned() {
    let mut frame = CallFrame::new(64);
    frame.push_i8(5).unwrap();
    assert_eq!(unsafe { frame.call_i8(addr(negate_i8 as *const c_void)) }, -5);

    let mut frame = CallFrame::new(64);
    frame.push_u32(7).unwrap();
    assert_eq!(unsafe { frame.call_u32(addr(high_u32 as *const c_void)) }, 0x8000_0007);

    let mut frame = CallFrame::new(64);
    frame.push_u64(10).unwrap();
    assert!(unsafe { frame.call_bool(addr(is_even as *const c_void)) });

    let mut frame = CallFrame::new(64);
    frame.push_f32(3.0).unwrap();
    assert_eq!(unsafe { frame.call_f32(addr(half_f32 as *const c_void)) }, 1.5);
}

#[test]
fn test_frame_stack_spill() {
    let mut frame = CallFrame::new(128);
    for v in 1..=10 {
        frame.push_i64(v).unwrap();
    }
    let result = unsafe { frame.call_i64(addr(many_ints as *const c_void)) };
    assert_eq!(result, (1..=10).map(|v| v * v).sum::<i64>());
}

#[test]
fn test_frame_mixed_classes() {
    let mut frame = CallFrame::new(128);
    frame.push_f64(1.0).unwrap();
    frame.push_i32(2).unwrap();
    frame.push_f32(3.0).unwrap();
    frame.push_i64(4).unwrap();
    frame.push_f64(5.0).unwrap();
    frame.push_u8(6).unwrap();
    for v in 7..=12 {
        frame.push_f64(v as f64).unwrap();
    }

    let result = unsafe { frame.call_f64(addr(mixed as *const c_void)) };
    assert_eq!(result, 78.0);
}

#[test]
fn test_push_cstring() {
    let mut frame = CallFrame::new(DEFAULT_FRAME_SIZE);
    frame.push_cstring("hello world").unwrap();
    let len = unsafe { frame.call_u64(addr(c_len as *const c_void)) };
    assert_eq!(len, 11);
}

#[test]
fn test_push_cstring_empty() {
    let mut frame = CallFrame::new(DEFAULT_FRAME_SIZE);
    frame.push_cstring("").unwrap();
    assert_eq!(frame.used(), 16);
    let first = unsafe { frame.call_i32(addr(first_byte as *const c_void)) };
    assert_eq!(first, 0);
}

#[test]
fn test_push_cstring_truncates_at_nul() {
    let mut frame = CallFrame::new(DEFAULT_FRAME_SIZE);
    frame.push_cstring("abc\0def").unwrap();
    let len = unsafe { frame.call_u64(addr(c_len as *const c_void)) };
    assert_eq!(len, 3);
}

#[test]
fn test_push_cstring_word_boundary() {
    // Eight bytes fill a word exactly; the terminator needs a second one
    let mut frame = CallFrame::new(DEFAULT_FRAME_SIZE);
    frame.push_cstring("12345678").unwrap();
    assert_eq!(frame.used(), 24);
    let len = unsafe { frame.call_u64(addr(c_len as *const c_void)) };
    assert_eq!(len, 8);
}

#[test]
fn test_frame_exhausted() {
    let mut frame = CallFrame::new(16);
    frame.push_i32(1).unwrap();
    frame.push_i32(2).unwrap();

    let err = frame.push_i32(3).unwrap_err();
    assert_eq!(err, CallError::CallFrameExhausted { capacity: 16, requested: 24 });

    let mut frame = CallFrame::new(16);
    let err = frame.push_cstring("far too long for sixteen bytes").unwrap_err();
    assert!(matches!(err, CallError::CallFrameExhausted { capacity: 16, .. }));
    assert!(frame.is_empty());
}

#[test]
fn test_frame_capacity_rounding() {
    assert_eq!(CallFrame::new(0).capacity(), MIN_FRAME_SIZE);
    assert_eq!(CallFrame::new(9).capacity(), 16);
}

#[test]
fn test_out_slot() {
    let mut frame = CallFrame::new(64);
    frame.push_f64(16.0).unwrap();
    let out = frame.push_out(CType::I32).unwrap();
    assert_eq!(out.class(), CType::I32);

    let ret = unsafe { frame.call(addr(split as *const c_void), CType::F64) }.unwrap();
    assert_eq!(ret, Value::F64(2.0));
    assert_eq!(frame.read_out(out), Value::I32(3));
}

#[test]
fn test_narrow_and_pointer_out_slots() {
    let mut frame = CallFrame::new(64);
    let small = frame.push_out(CType::U16).unwrap();
    let ratio = frame.push_out(CType::F32).unwrap();
    let flag = frame.push_out(CType::Bool).unwrap();
    let ptr = frame.push_out(CType::Pointer).unwrap();

    let ret = unsafe { frame.call(addr(fill as *const c_void), CType::U64).unwrap() };
    assert_eq!(ret, Value::U64(u64::MAX - 1));
    assert_eq!(frame.read_out(small), Value::U16(0xBEEF));
    assert_eq!(frame.read_out(ratio), Value::F32(0.25));
    assert_eq!(frame.read_out(flag), Value::Bool(true));

    // The callee stored the address of the first out word
    let Value::Pointer(stored) = frame.read_out(ptr) else {
        panic!("pointer out slot read back as another class");
    };
    assert!(!stored.is_null());
    assert_eq!(unsafe { *(stored.as_ptr() as *const u16) }, 0xBEEF);
}

#[test]
fn test_out_slot_rejects_aggregate() {
    let mut frame = CallFrame::new(64);
    assert!(matches!(frame.push_out(CType::Opaque128), Err(CallError::SignatureMismatch { .. })));
}

#[test]
fn test_call_void() {
    let mut frame = CallFrame::new(64);
    frame.push_i64(21).unwrap();
    let out = frame.push_out(CType::I64).unwrap();
    let ret = unsafe { frame.call(addr(store as *const c_void), CType::Void) }.unwrap();
    assert_eq!(ret, Value::Void);
    assert_eq!(frame.read_out(out), Value::I64(42));
}

#[test]
fn test_call_cstring_result() {
    let frame = CallFrame::new(MIN_FRAME_SIZE);
    let ret = unsafe { frame.call(addr(greeting as *const c_void), CType::CString) }.unwrap();
    assert_eq!(ret, Value::Text("hello".into()));

    let ret = unsafe { frame.call(addr(null_string as *const c_void), CType::CString) }.unwrap();
    assert_eq!(ret, Value::Text(String::new()));
}

#[test]
fn test_push_value_mismatch() {
    let mut frame = CallFrame::new(64);
    let err = frame.push_value(CType::I32, Value::F64(1.0)).unwrap_err();
    assert_eq!(err.to_string(), "signature mismatch: argument 1 expects int32_t, got double");
    assert!(frame.is_empty());

    // Raw pointers may stand in for strings
    frame.push_value(CType::CString, Value::Pointer(Pointer::null())).unwrap();
    assert_eq!(frame.classes().collect::<Vec<_>>(), vec![CType::CString]);
}

#[test]
fn test_frame_check() {
    let signature = Signature::new(vec![CType::F64], CType::F64).with_outs(vec![CType::I32]);
    let mut frame = CallFrame::new(64);
    frame.push_f64(1.0).unwrap();
    assert!(frame.check(&signature).is_err());

    frame.push_out(CType::I32).unwrap();
    assert!(frame.check(&signature).is_ok());
}

#[test]
fn test_call_error_symbol() {
    let err = CallError::mismatch("bad").with_symbol("sqrt");
    assert_eq!(err.to_string(), "signature mismatch calling 'sqrt': bad");

    let err = CallError::NotInstalled { field: "sqrt".into() }.with_symbol("other");
    assert_eq!(err, CallError::NotInstalled { field: "sqrt".into() });
}

#[test]
fn test_frames_counted() {
    let before = stats().frames_allocated;
    {
        let _frame = CallFrame::new(8);
    }
    let after = stats();
    assert!(after.frames_allocated > before);
    assert!(after.frames_released > 0);
}

#[test]
fn test_signature_display() {
    let signature = Signature::new(vec![CType::F64], CType::F64).with_outs(vec![CType::I32]);
    assert_eq!(signature.to_string(), "(double, void*) -> double");
    assert_eq!(signature.frame_words(), 3);
    assert!(!signature.has_cstring());
}

#[test]
fn test_signature_of_multi_result() {
    let prototype = Prototype::of::<(f64,), (f64, i32)>();
    let signature = signature_of("frexp", &prototype).unwrap();
    assert_eq!(signature.params(), &[CType::F64]);
    assert_eq!(signature.result(), CType::F64);
    assert_eq!(signature.outs(), &[CType::I32]);
    assert_eq!(signature.native_params().collect::<Vec<_>>(), vec![CType::F64, CType::Pointer]);
}

#[test]
fn test_signature_of_void() {
    let signature = signature_of("abort", &Prototype::of::<(), ()>()).unwrap();
    assert_eq!(signature.result(), CType::Void);
    assert!(signature.params().is_empty());
}

#[test]
fn test_signature_of_rejections() {
    let err = signature_of("printf", &Prototype::of::<(String,), i32>().variadic()).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedSignature { .. }));

    let err = signature_of("write", &Prototype::of::<(Vec<u8>,), i64>()).unwrap_err();
    match err {
        InstallError::UnsupportedType { field, type_name } => {
            assert_eq!(field, "write");
            assert!(type_name.contains("Vec<u8>"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let wide = TypeDesc::C(CScalar::Int128);
    let err = signature_of("f", &Prototype::new(vec![wide.clone()], vec![])).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedSignature { .. }));

    let err = signature_of("f", &Prototype::new(vec![], vec![wide])).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedReturn { .. }));

    let err = signature_of("f", &Prototype::of::<(), (i32, String)>()).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedReturn { .. }));

    let err = signature_of("f", &Prototype::new(vec![TypeDesc::Void], vec![])).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedSignature { .. }));

    let err = signature_of("f", &Prototype::new(vec![], vec![TypeDesc::Void, TypeDesc::Bool])).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedSignature { .. }));
}

#[test]
fn test_prototype_display() {
    assert_eq!(Prototype::of::<(f64,), (f64, i32)>().to_string(), "fn(f64) -> (f64, i32)");
    assert_eq!(Prototype::of::<(String,), i32>().variadic().to_string(), "fn(cstring, ...) -> i32");
    assert_eq!(Prototype::of::<(), ()>().to_string(), "fn()");
}

#[test]
fn test_libraries_table() {
    let libs = Libraries::new()
        .with("linux", "libm.so.6")
        .with("darwin", "libSystem.dylib")
        .with("windows", "");
    assert_eq!(libs.for_platform(Platform::Linux), Some("libm.so.6"));
    assert_eq!(libs.get("windows"), None);
    assert_eq!(libs.get("freebsd"), None);

    let libs = libs.with("linux", "libm.so");
    assert_eq!(libs.get("linux"), Some("libm.so"));
    assert_eq!(libs.iter().count(), 3);
}

crate::header! {
    struct Local {
        linux: "liblocal.so";

        add: fn(i32, i32) -> i32;
        frexp as "split": fn(f64) -> (f64, i32);
        reset: fn();
    }
}

#[test]
fn test_header_macro() {
    let header = Local::new();
    assert_eq!(header.name(), "Local");
    assert_eq!(header.libraries().get("linux"), Some("liblocal.so"));

    let fields = header.fields();
    let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
    assert_eq!(names, ["add", "frexp", "reset"]);
    assert_eq!(fields[0].symbol_name(), "add");
    assert_eq!(fields[1].symbol_name(), "split");
    assert_eq!(fields[1].slot.prototype(), Prototype::of::<(f64,), (f64, i32)>());
    assert!(fields[2].slot.prototype().results.is_empty());
}

#[test]
fn test_extern_not_installed() {
    let header = Local::new();
    assert!(!header.add.is_installed());
    assert_eq!(header.add.call((1, 2)), Err(CallError::NotInstalled { field: "add".into() }));

    let function = Function::new("dynamic", Prototype::of::<(i32,), i32>());
    assert_eq!(function.call(vec![Value::I32(1)]), Err(CallError::NotInstalled { field: "dynamic".into() }));
}

#[test]
fn test_no_library_for_platform() {
    struct Nowhere;

    impl Header for Nowhere {
        fn name(&self) -> &str {
            "Nowhere"
        }

        fn libraries(&self) -> Libraries {
            Libraries::new().with("plan9", "libnothing.so")
        }

        fn fields(&self) -> Vec<Field<'_>> {
            Vec::new()
        }
    }

    let err = install(&Nowhere, None).unwrap_err();
    assert!(matches!(err, InstallError::NoLibraryForPlatform { ref header, .. } if header == "Nowhere"));
    assert_eq!(err.field(), None);
}

#[test]
fn test_load_error_carries_loader_text() {
    let header = Local::new();
    let err = install(&header, Some("libffibind-does-not-exist.so")).unwrap_err();
    match &err {
        InstallError::Load(load) => {
            assert_eq!(load.library, "libffibind-does-not-exist.so");
            #[cfg(unix)]
            assert!(!load.text.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!header.add.is_installed());
}

#[test]
fn test_library_open_rejects_nul() {
    let err = Library::open("lib\0c.so").unwrap_err();
    assert!(err.text.contains("nul"));
}

#[test]
fn test_marshal_round_trip() {
    assert_eq!(<(i32, f64) as Returns>::from_values(vec![Value::I32(1), Value::F64(2.0)]), Some((1, 2.0)));
    assert_eq!(<(i32, f64) as Returns>::from_values(vec![Value::I32(1)]), None);
    assert_eq!(<i32 as Returns>::from_values(vec![Value::I64(1)]), None);
    assert_eq!(<() as Returns>::from_values(Vec::new()), Some(()));
    assert_eq!(<crate::c::Error as Return>::from_value(Value::I32(2)), Some(crate::c::Error(2)));
    assert_eq!((1u8, "x", 2.0f32).into_values(), vec![Value::U8(1), Value::Text("x".into()), Value::F32(2.0)]);
    assert_eq!(marshal::value_kind(&Value::Text("x".into())), "string");
}

#[test]
fn test_value_is_zero() {
    assert!(Value::Pointer(Pointer::null()).is_zero());
    assert!(Value::I32(0).is_zero());
    assert!(Value::Bool(false).is_zero());
    assert!(Value::F64(0.0).is_zero());
    assert!(Value::Text(String::new()).is_zero());
    assert!(!Value::I32(-1).is_zero());
    assert!(!Value::U64(1 << 40).is_zero());
    assert!(!Value::Text("x".into()).is_zero());
}

#[test]
fn test_signature_of_fallible() {
    let prototype = Prototype::of::<(String, i32), Result<Pointer, NativeError>>();
    assert!(prototype.fallible);
    assert_eq!(prototype.to_string(), "fn(cstring, i32) -> *void or error");

    let signature = signature_of("dlopen", &prototype).unwrap();
    assert!(signature.is_fallible());
    assert_eq!(signature.result(), CType::Pointer);
    assert_eq!(signature.params(), &[CType::CString, CType::I32]);
    // The error travels on the host side only
    assert!(signature.outs().is_empty());
    assert_eq!(signature.to_string(), "(char*, int32_t) -> void* or error");

    let plain = signature_of("open", &Prototype::of::<(String, i32), Pointer>()).unwrap();
    assert!(!plain.is_fallible());

    let err = signature_of("close", &Prototype::of::<(Pointer,), Result<(), NativeError>>()).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedSignature { ref field, .. } if field == "close"));
}

#[test]
fn test_fallible_outcome() {
    type Opened = Result<Pointer, NativeError>;

    let ptr = Pointer::from_raw(0x1000 as *mut c_void);
    assert_eq!(<Opened as Returns>::from_outcome(Ok(vec![Value::Pointer(ptr)])), Some(Ok(ptr)));

    let failure = NativeError::new("dlopen", "no such file");
    assert_eq!(<Opened as Returns>::from_outcome(Err(failure.clone())), Some(Err(failure.clone())));

    // Plain results never absorb a failure
    assert_eq!(<Pointer as Returns>::from_outcome(Err(failure)), None);
    assert!(<Opened as Results>::fallible());
    assert!(!<Pointer as Results>::fallible());
}

#[test]
fn test_native_error_display() {
    let err = NativeError::new("dlopen", "libx.so: cannot open shared object file");
    assert_eq!(err.to_string(), "'dlopen' failed: libx.so: cannot open shared object file");
    assert_eq!(NativeError::new("getenv", "").to_string(), "'getenv' reported failure");

    let call = CallError::Native(err.clone());
    assert_eq!(call.to_string(), err.to_string());
    assert!(std::error::Error::source(&call).is_some());
    assert_eq!(call.clone().with_symbol("other"), call);
}

#[test]
fn test_init_with_config_enables_logging() {
    let config = crate::config::BindConfig::parse("log_level = \"debug\"").unwrap();
    assert_eq!(config.log_config().level, tracing::Level::DEBUG);

    init_with(&config);
    assert!(crate::logging::is_initialized());
}

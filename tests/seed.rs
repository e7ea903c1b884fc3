//! End-to-end scenarios against the platform C and math libraries

#![cfg(any(target_os = "linux", target_os = "macos"))]

mod common;

use std::time::{SystemTime, UNIX_EPOCH};

use common::{LibC, LibM};
use ffibind::c::Pointer;
use ffibind::{install, InstallError};

#[test]
fn test_sqrt() {
    let libm = LibM::new();
    install(&libm, None).unwrap();

    let root = libm.sqrt.call((2.0,)).unwrap();
    assert!((root - std::f64::consts::SQRT_2).abs() < 1e-12);
}

#[test]
fn test_isalnum() {
    let libc = LibC::new();
    install(&libc, None).unwrap();

    assert_ne!(libc.is_alphanumeric.call(('a' as i32,)).unwrap(), 0);
    assert_eq!(libc.is_alphanumeric.call((' ' as i32,)).unwrap(), 0);
}

#[test]
fn test_time() {
    let libc = LibC::new();
    install(&libc, None).unwrap();

    let native = libc.time.call((Pointer::null(),)).unwrap();
    let host = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    assert!((native - host).abs() <= 5, "native {} host {}", native, host);
}

#[test]
fn test_frexp() {
    let libm = LibM::new();
    install(&libm, None).unwrap();

    let (fraction, exponent) = libm.frexp.call((2.2,)).unwrap();
    assert!((0.5..1.0).contains(&fraction));
    assert_eq!(exponent, 2);
    assert_eq!(fraction * 2f64.powi(exponent), 2.2);
}

ffibind::header! {
    struct Incomplete {
        linux: "libm.so.6",
        darwin: "libSystem.dylib";

        sqrt: fn(f64) -> f64;
        missing as "ffibind_no_such_symbol": fn() -> i32;
    }
}

#[test]
fn test_missing_symbol() {
    let header = Incomplete::new();
    let err = install(&header, None).unwrap_err();

    match &err {
        InstallError::SymbolMissing { field, symbol, .. } => {
            assert_eq!(field, "missing");
            assert_eq!(symbol, "ffibind_no_such_symbol");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("ffibind_no_such_symbol"));

    // Nothing was installed, not even the fields that resolved
    assert!(!header.sqrt.is_installed());
    assert!(!header.missing.is_installed());
}

ffibind::header! {
    struct SliceTaking {
        linux: "libc.so.6",
        darwin: "libSystem.dylib";

        strlen: fn(Vec<u8>) -> usize;
    }
}

#[test]
fn test_unsupported_type() {
    let header = SliceTaking::new();
    let err = install(&header, None).unwrap_err();

    match &err {
        InstallError::UnsupportedType { field, type_name } => {
            assert_eq!(field, "strlen");
            assert!(type_name.contains("Vec<u8>"), "{}", type_name);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("Vec<u8>"));
    assert!(!header.strlen.is_installed());
}

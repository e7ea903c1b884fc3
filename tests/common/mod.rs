//! Headers shared by the integration tests

#![allow(dead_code)]

use ffibind::c::{self, Pointer};

ffibind::header! {
    /// The C math library
    pub struct LibM {
        linux: "libm.so.6",
        darwin: "libSystem.dylib",
        windows: "ucrtbase.dll";

        pub sqrt: fn(f64) -> f64;
        pub frexp: fn(f64) -> (f64, i32);
        pub ldexp: fn(f64, i32) -> f64;
        pub cube_root as "cbrt": fn(f64) -> f64;
        pub floorf: fn(f32) -> f32;
    }
}

ffibind::header! {
    /// The C standard library
    pub struct LibC {
        linux: "libc.so.6",
        darwin: "libSystem.dylib",
        windows: "ucrtbase.dll";

        pub is_alphanumeric as "isalnum": fn(i32) -> i32;
        pub time: fn(Pointer) -> i64;
        pub strlen: fn(String) -> usize;
        pub strerror: fn(c::Error) -> String;
        pub labs: fn(c::Long) -> c::Long;
        pub toupper: fn(i32) -> i32;
        pub srand: fn(u32);
        pub rand: fn() -> i32;
    }
}

pub const LIBC: &str = if cfg!(target_os = "macos") { "libSystem.dylib" } else { "libc.so.6" };
pub const LIBM: &str = if cfg!(target_os = "macos") { "libSystem.dylib" } else { "libm.so.6" };

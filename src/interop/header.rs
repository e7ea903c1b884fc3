//! Header records - the declarative description of a native library
//!
//! A header is a value implementing [`Header`]: a platform table of library
//! filenames plus a list of function fields. Each field exposes its host
//! signature as a [`Prototype`] and accepts the [`Binding`] the installer
//! builds for it. The [`header!`](crate::header) macro generates both the
//! struct and its `Header` impl.

use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use super::abi::Platform;
use super::call::CallError;
use super::install::Binding;
use super::marshal::{Arguments, Params, Results, Returns};
use super::types::{TypeDesc, Value};

/// Platform tag to library filename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Libraries {
    entries: Vec<(String, String)>,
}

impl Libraries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the filename for `tag`
    pub fn with(mut self, tag: &str, filename: &str) -> Self {
        self.insert(tag, filename);
        self
    }

    pub fn insert(&mut self, tag: &str, filename: &str) {
        match self.entries.iter_mut().find(|(t, _)| t == tag) {
            Some(entry) => entry.1 = filename.to_owned(),
            None => self.entries.push((tag.to_owned(), filename.to_owned())),
        }
    }

    /// Filename for a platform tag; empty entries count as absent
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, file)| file.as_str())
            .filter(|file| !file.is_empty())
    }

    pub fn for_platform(&self, platform: Platform) -> Option<&str> {
        self.get(platform.tag())
    }

    /// Filename for the running platform
    pub fn current(&self) -> Option<&str> {
        self.get(Platform::current_tag())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, f)| (t.as_str(), f.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Host-level signature of a field, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    pub params: Vec<TypeDesc>,
    /// Empty for a void function; entries after the first travel as
    /// out-pointer parameters
    pub results: Vec<TypeDesc>,
    /// Declares a C variadic tail (`...`)
    pub variadic: bool,
    /// A zero first result means failure, described by the header's error
    /// field
    pub fallible: bool,
}

impl Prototype {
    pub fn new(params: Vec<TypeDesc>, results: Vec<TypeDesc>) -> Self {
        Self { params, results, variadic: false, fallible: false }
    }

    /// Prototype of a typed field
    pub fn of<A: Params, R: Results>() -> Self {
        Self {
            fallible: R::fallible(),
            ..Self::new(A::describe(), R::describe())
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn fallible(mut self) -> Self {
        self.fallible = true;
        self
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(TypeDesc::name).collect();
        write!(f, "fn({}", params.join(", "))?;
        if self.variadic {
            f.write_str(if self.params.is_empty() { "..." } else { ", ..." })?;
        }
        f.write_str(")")?;
        match self.results.as_slice() {
            [] => {}
            [one] => write!(f, " -> {}", one.name())?,
            many => {
                let results: Vec<String> = many.iter().map(TypeDesc::name).collect();
                write!(f, " -> ({})", results.join(", "))?;
            }
        }
        if self.fallible {
            f.write_str(" or error")?;
        }
        Ok(())
    }
}

/// A field the installer can fill
pub trait Slot: Send + Sync {
    fn prototype(&self) -> Prototype;

    /// Replace the field's binding
    fn store(&self, binding: Arc<Binding>);

    fn binding(&self) -> Option<Arc<Binding>>;
}

/// One function field of a header
#[derive(Clone, Copy)]
pub struct Field<'a> {
    pub name: &'a str,
    /// Symbol override; the field name is used when absent
    pub symbol: Option<&'a str>,
    pub slot: &'a dyn Slot,
}

impl<'a> Field<'a> {
    pub fn new(name: &'a str, slot: &'a dyn Slot) -> Self {
        Self { name, symbol: None, slot }
    }

    pub fn with_symbol(mut self, symbol: &'a str) -> Self {
        self.symbol = Some(symbol);
        self
    }

    /// Name looked up in the library
    pub fn symbol_name(&self) -> &'a str {
        self.symbol.filter(|s| !s.is_empty()).unwrap_or(self.name)
    }
}

impl fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("symbol", &self.symbol_name())
            .field("prototype", &self.slot.prototype().to_string())
            .finish()
    }
}

/// Declarative description of a native library
pub trait Header {
    /// Record name, also the key for configured library overrides
    fn name(&self) -> &str;

    fn libraries(&self) -> Libraries;

    fn fields(&self) -> Vec<Field<'_>>;

    /// Field that describes the last failure of a fallible field; it must
    /// take nothing and return a string
    fn error_field(&self) -> &str {
        "error"
    }
}

/// Typed function field: arguments `A` (a tuple) and results `R`
///
/// Calls fail with [`CallError::NotInstalled`] until the owning header has
/// been installed.
pub struct Extern<A, R> {
    name: &'static str,
    binding: RwLock<Option<Arc<Binding>>>,
    _signature: PhantomData<fn(A) -> R>,
}

impl<A, R> Extern<A, R> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            binding: RwLock::new(None),
            _signature: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_installed(&self) -> bool {
        self.binding.read().is_some()
    }

    fn current(&self) -> Result<Arc<Binding>, CallError> {
        self.binding
            .read()
            .clone()
            .ok_or_else(|| CallError::NotInstalled { field: self.name.to_owned() })
    }
}

impl<A: Arguments, R: Returns> Extern<A, R> {
    /// Invoke the bound native function
    pub fn call(&self, args: A) -> Result<R, CallError> {
        let binding = self.current()?;
        let outcome = match binding.invoke(args.into_values()) {
            Ok(values) => Ok(values),
            Err(CallError::Native(err)) if R::fallible() => Err(err),
            Err(err) => return Err(err),
        };
        R::from_outcome(outcome).ok_or_else(|| CallError::SignatureMismatch {
            symbol: Some(binding.symbol().to_owned()),
            detail: "native results do not convert to the declared host types".into(),
        })
    }
}

impl<A: Params, R: Results> Slot for Extern<A, R> {
    fn prototype(&self) -> Prototype {
        Prototype::of::<A, R>()
    }

    fn store(&self, binding: Arc<Binding>) {
        *self.binding.write() = Some(binding);
    }

    fn binding(&self) -> Option<Arc<Binding>> {
        self.binding.read().clone()
    }
}

impl<A, R> fmt::Debug for Extern<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extern")
            .field("name", &self.name)
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Function field whose signature is only known at runtime
pub struct Function {
    name: String,
    prototype: Prototype,
    binding: RwLock<Option<Arc<Binding>>>,
}

impl Function {
    pub fn new(name: impl Into<String>, prototype: Prototype) -> Self {
        Self {
            name: name.into(),
            prototype,
            binding: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_installed(&self) -> bool {
        self.binding.read().is_some()
    }

    /// Invoke with dynamically typed arguments; returns every declared result
    ///
    /// A fallible prototype reports failure as [`CallError::Native`].
    pub fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
        let binding = self
            .binding
            .read()
            .clone()
            .ok_or_else(|| CallError::NotInstalled { field: self.name.clone() })?;
        binding.invoke(args)
    }
}

impl Slot for Function {
    fn prototype(&self) -> Prototype {
        self.prototype.clone()
    }

    fn store(&self, binding: Arc<Binding>) {
        *self.binding.write() = Some(binding);
    }

    fn binding(&self) -> Option<Arc<Binding>> {
        self.binding.read().clone()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("prototype", &self.prototype.to_string())
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Declare a header record
///
/// ```no_run
/// ffibind::header! {
///     /// The C math library
///     pub struct LibM {
///         linux: "libm.so.6",
///         darwin: "libSystem.dylib",
///         windows: "ucrtbase.dll";
///
///         pub sqrt: fn(f64) -> f64;
///         pub frexp: fn(f64) -> (f64, i32);
///         pub cube_root as "cbrt": fn(f64) -> f64;
///     }
/// }
///
/// let libm = LibM::new();
/// ffibind::install(&libm, None).unwrap();
/// assert_eq!(libm.sqrt.call((9.0,)).unwrap(), 3.0);
/// ```
///
/// Fields without `-> ...` return nothing. Multiple results are written as a
/// tuple; everything after the first is read back through an out-pointer the
/// native function receives as its trailing parameters.
///
/// A result of `Result<T, NativeError>` marks a function that fails by
/// returning zero. The failure text is read from the header's `error`
/// field, a `fn() -> String` such as `dlerror`.
#[macro_export]
macro_rules! header {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($tag:ident : $file:literal),* $(,)? ;
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident $(as $symbol:literal)? : fn($($arg:ty),* $(,)?) $(-> $ret:ty)? ;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $crate::Extern<($($arg,)*), $crate::__header_result!($($ret)?)>,
            )*
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    $($field: $crate::Extern::new(stringify!($field)),)*
                }
            }
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::Header for $name {
            fn name(&self) -> &str {
                stringify!($name)
            }

            fn libraries(&self) -> $crate::Libraries {
                $crate::Libraries::new()$(.with(stringify!($tag), $file))*
            }

            fn fields(&self) -> ::std::vec::Vec<$crate::Field<'_>> {
                ::std::vec![
                    $($crate::Field {
                        name: stringify!($field),
                        symbol: $crate::__header_symbol!($($symbol)?),
                        slot: &self.$field,
                    },)*
                ]
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __header_result {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __header_symbol {
    () => { ::core::option::Option::None };
    ($symbol:literal) => { ::core::option::Option::Some($symbol) };
}

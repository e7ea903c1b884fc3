//! Binding installer
//!
//! Walks a header's fields, resolves and classifies each one, and only when
//! every field succeeded stores the resulting bindings. A failed install
//! leaves every field as it was.

use core::fmt;
use std::sync::Arc;

use super::abi::{CallingConvention, Platform, SlotPlan};
use super::call::{CallError, CallFrame, NativeError, OutSlot, MIN_FRAME_SIZE, WORD};
use super::header::{Field, Header, Prototype, Slot};
use super::library::{Library, LibraryTable, LoadError, SymbolAddress, SymbolError};
use super::types::{classify, CType, Signature, TypeDesc, Value};
use crate::config::BindConfig;
use crate::logging::{self, perf};

/// An installed function: where it lives and how to call it
#[derive(Clone)]
pub struct Binding {
    name: String,
    symbol: String,
    signature: Signature,
    address: SymbolAddress,
    library: Arc<Library>,
    frame_capacity: usize,
    slot_plan: SlotPlan,
    /// Error field of the header, for fallible signatures
    error_source: Option<Arc<Binding>>,
}

impl Binding {
    /// Field name the binding was installed into
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn address(&self) -> SymbolAddress {
        self.address
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Arena bytes each call allocates
    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    pub fn slot_plan(&self) -> SlotPlan {
        self.slot_plan
    }

    /// Call the native function
    ///
    /// Arguments are pushed in order by the class fixed at install. Returns
    /// the native return value (omitted for void) followed by each
    /// out-pointer result. A fallible function that returns zero fails with
    /// [`CallError::Native`].
    pub fn invoke(&self, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
        logging::log_call(&self.symbol, args.len());
        super::record_call();

        let result = self.invoke_frame(args).map_err(|e| e.with_symbol(&self.symbol));
        match &result {
            Err(CallError::Native(err)) => logging::log_native_failure(&self.symbol, err.text()),
            Err(err) => {
                super::record_call_error();
                logging::log_call_error(&self.symbol, &err.to_string());
            }
            Ok(_) => {}
        }
        result
    }

    fn invoke_frame(&self, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
        let params = self.signature.params();
        if args.len() != params.len() {
            return Err(CallError::mismatch(format!(
                "expected {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }

        let mut frame = CallFrame::new(self.frame_capacity);
        for (&class, value) in params.iter().zip(args) {
            frame.push_value(class, value)?;
        }
        let outs = self
            .signature
            .outs()
            .iter()
            .map(|&class| frame.push_out(class))
            .collect::<Result<Vec<OutSlot>, _>>()?;
        frame.check(&self.signature)?;

        // Signature was classified from the field's prototype and checked
        // against the pushed slots above
        let ret = unsafe { frame.call(self.address, self.signature.result())? };
        if self.signature.is_fallible() && ret.is_zero() {
            return Err(CallError::Native(NativeError::new(&self.symbol, self.error_text())));
        }

        let mut values = Vec::with_capacity(1 + outs.len());
        if self.signature.result() != CType::Void {
            values.push(ret);
        }
        values.extend(outs.into_iter().map(|slot| frame.read_out(slot)));
        Ok(values)
    }

    /// Ask the header's error field what went wrong
    fn error_text(&self) -> String {
        let Some(source) = &self.error_source else {
            return String::new();
        };
        match source.invoke(Vec::new()) {
            Ok(values) => match values.into_iter().next() {
                Some(Value::Text(text)) => text,
                _ => String::new(),
            },
            Err(err) => err.to_string(),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("symbol", &self.symbol)
            .field("signature", &self.signature.to_string())
            .field("address", &self.address)
            .field("library", &self.library.name())
            .field("frame_capacity", &self.frame_capacity)
            .field("error_source", &self.error_source.as_ref().map(|b| b.symbol()))
            .finish()
    }
}

/// Installs headers against the process-wide library table
#[derive(Debug, Clone)]
pub struct Installer {
    config: BindConfig,
    convention: CallingConvention,
}

impl Installer {
    pub fn new(config: BindConfig) -> Self {
        Self {
            config,
            convention: CallingConvention::current(),
        }
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    /// Install every field of `header`
    ///
    /// `library` overrides the header's platform table when non-empty.
    pub fn install(&self, header: &dyn Header, library: Option<&str>) -> Result<(), InstallError> {
        let _perf = perf::track("install");
        let result = self.try_install(header, library);
        if let Err(err) = &result {
            logging::log_install_error(header.name(), &err.to_string());
        }
        result
    }

    fn try_install(&self, header: &dyn Header, library: Option<&str>) -> Result<(), InstallError> {
        let filename = self.library_filename(header, library)?;
        let library = LibraryTable::global().open(&filename).map_err(InstallError::Load)?;

        let fields = header.fields();
        let mut bindings = Vec::with_capacity(fields.len());
        for field in &fields {
            bindings.push(self.bind(&library, field)?);
        }

        if bindings.iter().any(|b| b.signature.is_fallible()) {
            let source = error_source(header, &bindings)?;
            for binding in bindings.iter_mut().filter(|b| b.signature.is_fallible()) {
                binding.error_source = source.clone();
            }
        }

        for (field, binding) in fields.iter().zip(bindings) {
            field.slot.store(Arc::new(binding));
            super::record_binding_installed();
        }

        logging::log_install(header.name(), library.name(), fields.len());
        Ok(())
    }

    fn library_filename(&self, header: &dyn Header, library: Option<&str>) -> Result<String, InstallError> {
        if let Some(path) = library.filter(|p| !p.is_empty()) {
            return Ok(path.to_owned());
        }
        if let Some(path) = self.config.library_for(header.name()) {
            return Ok(path.to_owned());
        }
        header
            .libraries()
            .current()
            .map(str::to_owned)
            .ok_or_else(|| InstallError::NoLibraryForPlatform {
                header: header.name().to_owned(),
                platform: Platform::current_tag().to_owned(),
            })
    }

    fn bind(&self, library: &Arc<Library>, field: &Field<'_>) -> Result<Binding, InstallError> {
        let symbol = field.symbol_name();
        let address = library.symbol(symbol).map_err(|err| InstallError::symbol(field.name, err))?;

        let signature = signature_of(field.name, &field.slot.prototype())?;
        let slot_plan = self.convention.plan(signature.native_params());

        tracing::debug!(
            target: "ffibind::install",
            field = field.name,
            symbol,
            signature = %signature,
            int_registers = slot_plan.int_registers,
            float_registers = slot_plan.float_registers,
            stack_slots = slot_plan.stack_slots,
            "field bound"
        );

        Ok(Binding {
            name: field.name.to_owned(),
            symbol: symbol.to_owned(),
            frame_capacity: self.frame_capacity(&signature),
            signature,
            address,
            library: Arc::clone(library),
            slot_plan,
            error_source: None,
        })
    }

    /// Exact word count for plain signatures; strings get the configured arena
    fn frame_capacity(&self, signature: &Signature) -> usize {
        let exact = (signature.frame_words() * WORD).max(MIN_FRAME_SIZE);
        if signature.has_cstring() {
            self.config.arena_size.max(exact)
        } else {
            exact
        }
    }
}

impl Default for Installer {
    fn default() -> Self {
        Self::new(BindConfig::default())
    }
}

/// The header's error field, checked to be `fn() -> String`
///
/// A header without one still installs; its fallible fields then fail with
/// empty text.
fn error_source(header: &dyn Header, bindings: &[Binding]) -> Result<Option<Arc<Binding>>, InstallError> {
    let name = header.error_field();
    let Some(binding) = bindings.iter().find(|b| b.name == name) else {
        return Ok(None);
    };
    let signature = &binding.signature;
    if !signature.params().is_empty()
        || signature.result() != CType::CString
        || !signature.outs().is_empty()
        || signature.is_fallible()
    {
        return Err(InstallError::UnsupportedSignature {
            field: name.to_owned(),
            reason: format!("error field must take nothing and return a string, found {}", signature),
        });
    }
    Ok(Some(Arc::new(binding.clone())))
}

/// Install `header` with the default configuration
pub fn install(header: &dyn Header, library: Option<&str>) -> Result<(), InstallError> {
    Installer::default().install(header, library)
}

/// Install several headers, each from its platform table
///
/// Stops at the first failure; headers before it stay installed.
pub fn link(headers: &[&dyn Header]) -> Result<(), InstallError> {
    let installer = Installer::default();
    for header in headers {
        installer.install(*header, None)?;
    }
    Ok(())
}

/// Classify a field's prototype into its native signature
pub fn signature_of(field: &str, prototype: &Prototype) -> Result<Signature, InstallError> {
    if prototype.variadic {
        return Err(InstallError::UnsupportedSignature {
            field: field.to_owned(),
            reason: "variadic functions are not supported".into(),
        });
    }

    let classify_field = |desc: &TypeDesc| {
        classify(desc).map_err(|_| InstallError::UnsupportedType {
            field: field.to_owned(),
            type_name: desc.name(),
        })
    };

    let mut params = Vec::with_capacity(prototype.params.len());
    for (i, desc) in prototype.params.iter().enumerate() {
        let class = classify_field(desc)?;
        if class == CType::Void || class.is_aggregate() {
            return Err(InstallError::UnsupportedSignature {
                field: field.to_owned(),
                reason: format!("parameter {} has type {}, which cannot be passed by value", i + 1, desc.name()),
            });
        }
        params.push(class);
    }

    let (result, outs) = match prototype.results.split_first() {
        None => (CType::Void, Vec::new()),
        Some((first, rest)) => {
            let result = classify_field(first)?;
            if result == CType::Void && !rest.is_empty() {
                return Err(InstallError::UnsupportedSignature {
                    field: field.to_owned(),
                    reason: "void may only appear as the sole result".into(),
                });
            }
            if result.is_aggregate() {
                return Err(InstallError::UnsupportedReturn {
                    field: field.to_owned(),
                    type_name: first.name(),
                });
            }

            let mut outs = Vec::with_capacity(rest.len());
            for desc in rest {
                let class = classify_field(desc)?;
                if class == CType::Void {
                    return Err(InstallError::UnsupportedSignature {
                        field: field.to_owned(),
                        reason: "void may only appear as the sole result".into(),
                    });
                }
                // Out storage is a single word the callee fills; strings
                // would need ownership rules the boundary does not have
                if class.is_aggregate() || class == CType::CString {
                    return Err(InstallError::UnsupportedReturn {
                        field: field.to_owned(),
                        type_name: desc.name(),
                    });
                }
                outs.push(class);
            }
            (result, outs)
        }
    };

    if prototype.fallible && result == CType::Void {
        return Err(InstallError::UnsupportedSignature {
            field: field.to_owned(),
            reason: "a fallible function needs a result to test for failure".into(),
        });
    }

    Ok(Signature::new(params, result).with_outs(outs).with_fallible(prototype.fallible))
}

/// Install errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    /// Neither an explicit path, a configured one, nor the header's table
    /// names a library for this platform
    NoLibraryForPlatform { header: String, platform: String },
    Load(LoadError),
    SymbolMissing { field: String, symbol: String, text: String },
    UnsupportedType { field: String, type_name: String },
    UnsupportedSignature { field: String, reason: String },
    UnsupportedReturn { field: String, type_name: String },
}

impl InstallError {
    fn symbol(field: &str, err: SymbolError) -> Self {
        Self::SymbolMissing {
            field: field.to_owned(),
            symbol: err.symbol().to_owned(),
            text: err.text().to_owned(),
        }
    }

    /// Field the error was raised for, if it concerns a single field
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::NoLibraryForPlatform { .. } | Self::Load(_) => None,
            Self::SymbolMissing { field, .. }
            | Self::UnsupportedType { field, .. }
            | Self::UnsupportedSignature { field, .. }
            | Self::UnsupportedReturn { field, .. } => Some(field),
        }
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLibraryForPlatform { header, platform } => {
                write!(f, "header {} names no library for platform '{}'", header, platform)
            }
            Self::Load(err) => write!(f, "{}", err),
            Self::SymbolMissing { field, symbol, text } if text.is_empty() => {
                write!(f, "field {}: symbol '{}' not found", field, symbol)
            }
            Self::SymbolMissing { field, symbol, text } => {
                write!(f, "field {}: symbol '{}' not found: {}", field, symbol, text)
            }
            Self::UnsupportedType { field, type_name } => {
                write!(f, "field {}: type {} has no C ABI representation", field, type_name)
            }
            Self::UnsupportedSignature { field, reason } => {
                write!(f, "field {}: unsupported signature: {}", field, reason)
            }
            Self::UnsupportedReturn { field, type_name } => {
                write!(f, "field {}: type {} cannot be returned", field, type_name)
            }
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LoadError> for InstallError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

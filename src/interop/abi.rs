//! ABI (Application Binary Interface) handling
//!
//! Per-target width tables, platform tags, and the register/stack placement
//! of argument slots for the supported calling conventions.

use super::types::CType;

/// Widths (in bytes) of the C scalar spellings on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataModel {
    pub char_signed: bool,
    pub short: usize,
    pub int: usize,
    pub long: usize,
    pub long_long: usize,
    pub pointer: usize,
    pub long_double: usize,
    pub max_align: usize,
}

impl DataModel {
    /// 64-bit Unix (Linux, macOS, BSD)
    pub const LP64: Self = Self {
        char_signed: true,
        short: 2,
        int: 4,
        long: 8,
        long_long: 8,
        pointer: 8,
        long_double: 16,
        max_align: 16,
    };

    /// 64-bit Windows
    pub const LLP64: Self = Self {
        char_signed: true,
        short: 2,
        int: 4,
        long: 4,
        long_long: 8,
        pointer: 8,
        long_double: 8,
        max_align: 16,
    };

    /// 32-bit targets
    pub const ILP32: Self = Self {
        char_signed: true,
        short: 2,
        int: 4,
        long: 4,
        long_long: 8,
        pointer: 4,
        long_double: 12,
        max_align: 8,
    };

    /// Data model of the running target
    pub fn current() -> Self {
        let mut model = if cfg!(target_pointer_width = "64") {
            if cfg!(windows) {
                Self::LLP64
            } else {
                Self::LP64
            }
        } else {
            Self::ILP32
        };

        // AAPCS makes plain char unsigned everywhere except Apple and Windows
        if cfg!(any(target_arch = "aarch64", target_arch = "arm"))
            && !cfg!(any(target_vendor = "apple", windows))
        {
            model.char_signed = false;
        }
        if cfg!(any(windows, all(target_vendor = "apple", target_arch = "aarch64"))) {
            model.long_double = 8;
        }
        model
    }
}

/// Platform tag selecting a library filename in a header's dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Self::Linux, Self::Darwin, Self::Windows];

    /// Platform the process is running on, if it is one of the tagged ones
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Self::Darwin)
        } else if cfg!(windows) {
            Some(Self::Windows)
        } else {
            None
        }
    }

    /// Tag for the running OS; falls back to the Rust OS name for untagged platforms
    pub fn current_tag() -> &'static str {
        Self::current().map_or(std::env::consts::OS, Self::tag)
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tag() == tag)
    }
}

/// Calling convention specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallingConvention {
    /// Fallback for targets without a dedicated model; everything on the stack
    C,
    /// System V AMD64 ABI (Unix x86-64)
    SysV,
    /// Microsoft x64 calling convention (Windows)
    Win64,
    /// ARM AAPCS (ARM 32-bit)
    Aapcs,
    /// ARM64 calling convention
    Aarch64,
}

impl CallingConvention {
    /// Convention of the running target
    #[inline]
    pub const fn current() -> Self {
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        return Self::Win64;

        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        return Self::SysV;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(target_arch = "arm")]
        return Self::Aapcs;

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm")))]
        return Self::C;
    }

    /// Integer argument registers
    #[inline]
    pub const fn max_int_registers(self) -> usize {
        match self {
            Self::C => 0,
            Self::SysV => 6,    // RDI, RSI, RDX, RCX, R8, R9
            Self::Win64 => 4,   // RCX, RDX, R8, R9
            Self::Aapcs => 4,   // R0-R3
            Self::Aarch64 => 8, // X0-X7
        }
    }

    /// Floating-point argument registers
    #[inline]
    pub const fn max_float_registers(self) -> usize {
        match self {
            Self::C | Self::Aapcs => 0, // soft-float: floats travel in core registers
            Self::SysV => 8,            // XMM0-XMM7
            Self::Win64 => 4,           // XMM0-XMM3
            Self::Aarch64 => 8,         // V0-V7
        }
    }

    /// Check if floating-point args use separate registers
    #[inline]
    pub const fn has_fp_registers(self) -> bool {
        matches!(self, Self::SysV | Self::Win64 | Self::Aarch64)
    }

    /// Win64 assigns registers by argument position, not per class
    #[inline]
    pub const fn positional(self) -> bool {
        matches!(self, Self::Win64)
    }

    /// Register/stack placement for an ordered list of argument classes
    pub fn plan<I>(self, params: I) -> SlotPlan
    where
        I: IntoIterator<Item = CType>,
    {
        let mut allocator = RegisterAllocator::new(self);
        for ty in params {
            allocator.place(ty);
        }
        allocator.finish()
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::current()
    }
}

/// Where a signature's arguments land
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotPlan {
    pub int_registers: usize,
    pub float_registers: usize,
    pub stack_slots: usize,
}

/// Register allocation strategy for function calls
pub struct RegisterAllocator {
    convention: CallingConvention,
    int_regs_used: usize,
    fp_regs_used: usize,
    stack_slots: usize,
}

impl RegisterAllocator {
    #[inline]
    pub const fn new(convention: CallingConvention) -> Self {
        Self {
            convention,
            int_regs_used: 0,
            fp_regs_used: 0,
            stack_slots: 0,
        }
    }

    /// Check if the next arg of this class goes in a register
    #[inline]
    pub fn can_use_register(&self, is_float: bool) -> bool {
        let conv = self.convention;
        if conv.positional() {
            return self.int_regs_used + self.fp_regs_used < conv.max_int_registers();
        }
        if is_float && conv.has_fp_registers() {
            self.fp_regs_used < conv.max_float_registers()
        } else {
            self.int_regs_used < conv.max_int_registers()
        }
    }

    /// Mark register as used
    #[inline]
    pub fn use_register(&mut self, is_float: bool) {
        if is_float && self.convention.has_fp_registers() {
            self.fp_regs_used += 1;
        } else {
            self.int_regs_used += 1;
        }
    }

    /// Place one argument, spilling to the stack when its class is exhausted
    pub fn place(&mut self, ty: CType) {
        let is_float = ty.is_float();
        if self.can_use_register(is_float) {
            self.use_register(is_float);
        } else {
            self.stack_slots += 1;
        }
    }

    pub fn finish(&self) -> SlotPlan {
        SlotPlan {
            int_registers: self.int_regs_used,
            float_registers: self.fp_regs_used,
            stack_slots: self.stack_slots,
        }
    }
}

//! Shared target profile registry.
//!
//! The resolution core only needs one fact about the target: the pointer width
//! that `isize`/`usize` bind to during monomorphization. The profile is plain
//! `Copy` data so it can be shared read-only across units resolved in parallel.

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum TargetId {
    #[default]
    #[cfg_attr(feature = "clap", value(name = "x86-64"))]
    X86_64,
    Aarch64,
    I686,
    Wasm32,
    Riscv32,
    Riscv64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PointerWidth {
    W32,
    W64,
}

impl PointerWidth {
    pub fn bits(self) -> u8 {
        match self {
            PointerWidth::W32 => 32,
            PointerWidth::W64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(PointerWidth::W32),
            64 => Some(PointerWidth::W64),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TargetProfile {
    pub id: TargetId,
    pub pointer_width: PointerWidth,
}

impl Default for TargetProfile {
    fn default() -> Self {
        TargetId::default().profile()
    }
}

impl TargetProfile {
    pub fn with_pointer_width(self, pointer_width: PointerWidth) -> Self {
        Self {
            id: self.id,
            pointer_width,
        }
    }
}

impl TargetId {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetId::X86_64 => "x86-64",
            TargetId::Aarch64 => "aarch64",
            TargetId::I686 => "i686",
            TargetId::Wasm32 => "wasm32",
            TargetId::Riscv32 => "riscv32",
            TargetId::Riscv64 => "riscv64",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "x86-64" | "x86_64" => Some(TargetId::X86_64),
            "aarch64" => Some(TargetId::Aarch64),
            "i686" => Some(TargetId::I686),
            "wasm32" => Some(TargetId::Wasm32),
            "riscv32" => Some(TargetId::Riscv32),
            "riscv64" => Some(TargetId::Riscv64),
            _ => None,
        }
    }

    pub fn profile(self) -> TargetProfile {
        let pointer_width = match self {
            TargetId::X86_64 | TargetId::Aarch64 | TargetId::Riscv64 => PointerWidth::W64,
            TargetId::I686 | TargetId::Wasm32 | TargetId::Riscv32 => PointerWidth::W32,
        };
        TargetProfile {
            id: self,
            pointer_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[TargetId] = &[
        TargetId::X86_64,
        TargetId::Aarch64,
        TargetId::I686,
        TargetId::Wasm32,
        TargetId::Riscv32,
        TargetId::Riscv64,
    ];

    #[test]
    fn names_round_trip() {
        for &t in ALL {
            assert_eq!(TargetId::parse(t.as_str()), Some(t));
        }
        assert_eq!(TargetId::parse("sparc"), None);
    }

    #[test]
    fn default_target_is_64_bit() {
        assert_eq!(TargetProfile::default().pointer_width, PointerWidth::W64);
        assert_eq!(TargetProfile::default().pointer_width.bits(), 64);
    }

    #[test]
    fn pointer_width_override_keeps_target_id() {
        let p = TargetId::Aarch64
            .profile()
            .with_pointer_width(PointerWidth::W32);
        assert_eq!(p.id, TargetId::Aarch64);
        assert_eq!(p.pointer_width.bits(), 32);
        assert_eq!(PointerWidth::from_bits(16), None);
    }
}

//! Image-level header state of a .NET module.
//!
//! The string externalization pass adds native code to a module, which changes what the
//! container may claim about itself: it is no longer IL-only, and the native stubs pin the
//! image to one architecture. This module models exactly the header fields involved:
//!
//! - [`MachineType`] - COFF `Machine` field
//! - [`PeKind`] - optional header magic (PE32 vs PE32+)
//! - [`CorFlags`] - the `Flags` field of the CLR 2.0 (Cor20) header
//!
//! # Reference
//! - [ECMA-335 II.25.3.3.1](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Runtime flags of the CLR 2.0 header
    pub struct CorFlags: u32 {
        /// Image contains only IL code
        const ILONLY = 0x0000_0001;
        /// Image can only be loaded into a 32-bit process
        const BIT32_REQUIRED = 0x0000_0002;
        /// Image is an IL library
        const IL_LIBRARY = 0x0000_0004;
        /// Image is strong-name signed
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Entry point is a native method
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Runtime tracks debug data
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Image prefers to run in a 32-bit process
        const BIT32_PREFERRED = 0x0002_0000;
    }
}

/// COFF machine type of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum MachineType {
    /// Intel 386 and compatible; also used by AnyCPU images
    I386,
    /// x64
    Amd64,
    /// ARM little endian (Thumb-2)
    Arm,
    /// ARM64 little endian
    Arm64,
    /// Any other raw machine value
    Other(u16),
}

impl MachineType {
    /// Raw `Machine` value as stored in the COFF header
    #[must_use]
    pub fn value(self) -> u16 {
        match self {
            MachineType::I386 => 0x014C,
            MachineType::Amd64 => 0x8664,
            MachineType::Arm => 0x01C4,
            MachineType::Arm64 => 0xAA64,
            MachineType::Other(raw) => raw,
        }
    }
}

impl From<u16> for MachineType {
    fn from(raw: u16) -> Self {
        match raw {
            0x014C => MachineType::I386,
            0x8664 => MachineType::Amd64,
            0x01C4 => MachineType::Arm,
            0xAA64 => MachineType::Arm64,
            other => MachineType::Other(other),
        }
    }
}

impl From<MachineType> for u16 {
    fn from(machine: MachineType) -> Self {
        machine.value()
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineType::I386 => write!(f, "I386"),
            MachineType::Amd64 => write!(f, "AMD64"),
            MachineType::Arm => write!(f, "ARM"),
            MachineType::Arm64 => write!(f, "ARM64"),
            MachineType::Other(raw) => write!(f, "0x{raw:04X}"),
        }
    }
}

/// Optional header flavor of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeKind {
    /// 32-bit optional header (magic `0x10B`)
    Pe32,
    /// 64-bit optional header (magic `0x20B`)
    Pe32Plus,
}

impl PeKind {
    /// Optional header magic
    #[must_use]
    pub fn magic(self) -> u16 {
        match self {
            PeKind::Pe32 => 0x010B,
            PeKind::Pe32Plus => 0x020B,
        }
    }
}

/// Header fields of the image that the externalization pass reads or adjusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    /// COFF machine
    pub machine: MachineType,
    /// Optional header flavor
    pub pe_kind: PeKind,
    /// CLR header flags
    #[serde(with = "cor_flags_repr")]
    pub cor_flags: CorFlags,
}

impl ImageHeader {
    /// Returns true if the header still claims the image is pure IL
    #[must_use]
    pub fn is_il_only(&self) -> bool {
        self.cor_flags.contains(CorFlags::ILONLY)
    }
}

impl Default for ImageHeader {
    /// An AnyCPU, IL-only image as emitted by the C# compiler
    fn default() -> Self {
        ImageHeader {
            machine: MachineType::I386,
            pe_kind: PeKind::Pe32,
            cor_flags: CorFlags::ILONLY,
        }
    }
}

mod cor_flags_repr {
    use super::{CorFlags, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flags: &CorFlags, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CorFlags, D::Error> {
        Ok(CorFlags::from_bits_retain(u32::deserialize(deserializer)?))
    }
}

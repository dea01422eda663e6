//! Method attribute and implementation flags.
//!
//! Raw `MethodDef.Flags` and `MethodDef.ImplFlags` values are kept on [`super::MethodDef`]
//! as stored in metadata; the bitflags in this module split them into logical groups.
//!
//! # Key Types
//! - [`MethodImplCodeType`], [`MethodImplManagement`], [`MethodImplOptions`]: Implementation flags
//! - [`MethodAccessFlags`], [`MethodModifiers`]: Attribute flags

use bitflags::bitflags;

/// Bitmask for `CODE_TYPE` extraction
pub const METHOD_IMPL_CODE_TYPE_MASK: u32 = 0x0003;
/// Bitmask for `MANAGED` state extraction
pub const METHOD_IMPL_MANAGED_MASK: u32 = 0x0004;
/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;
/// Bitmask for `VTABLE_LAYOUT` information extraction
pub const METHOD_VTABLE_LAYOUT_MASK: u32 = 0x0100;

// Method implementation flags split into logical groups
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method implementation code type flags
    pub struct MethodImplCodeType: u32 {
        /// Method impl is IL
        const IL = 0x0000;
        /// Method impl is native
        const NATIVE = 0x0001;
        /// Method impl is OPTIL
        const OPTIL = 0x0002;
        /// Method impl is provided by the runtime
        const RUNTIME = 0x0003;
    }
}

impl MethodImplCodeType {
    /// Extract code type from raw implementation flags
    #[must_use]
    pub fn from_impl_flags(flags: u32) -> Self {
        let code_type = flags & METHOD_IMPL_CODE_TYPE_MASK;
        Self::from_bits_truncate(code_type)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method implementation management flags
    pub struct MethodImplManagement: u32 {
        /// Method impl is unmanaged, otherwise managed
        const UNMANAGED = 0x0004;
    }
}

impl MethodImplManagement {
    /// Extract management type from raw implementation flags
    #[must_use]
    pub fn from_impl_flags(flags: u32) -> Self {
        let management = flags & METHOD_IMPL_MANAGED_MASK;
        Self::from_bits_truncate(management)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method implementation additional options
    pub struct MethodImplOptions: u32 {
        /// Method cannot be inlined
        const NO_INLINING = 0x0008;
        /// Method is defined; used primarily in merge scenarios
        const FORWARD_REF = 0x0010;
        /// Method is a synchronized method
        const SYNCHRONIZED = 0x0020;
        /// Method signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Runtime shall check all types of parameters
        const INTERNAL_CALL = 0x1000;
    }
}

impl MethodImplOptions {
    /// Extract implementation options from raw implementation flags
    #[must_use]
    pub fn from_impl_flags(flags: u32) -> Self {
        let options = flags & !(METHOD_IMPL_CODE_TYPE_MASK | METHOD_IMPL_MANAGED_MASK);
        Self::from_bits_truncate(options)
    }
}

// Method attributes split into logical groups
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method access flags
    pub struct MethodAccessFlags: u32 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract access flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        let access = flags & METHOD_ACCESS_MASK;
        Self::from_bits_truncate(access)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Method has security associate with it
        const HAS_SECURITY = 0x4000;
        /// Method calls another method containing security code
        const REQUIRE_SEC_OBJECT = 0x8000;
        /// Reserved: shall be zero for conforming implementations
        const UNMANAGED_EXPORT = 0x0008;
    }
}

impl MethodModifiers {
    /// Extract method modifiers from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        let modifiers = flags & !METHOD_ACCESS_MASK & !METHOD_VTABLE_LAYOUT_MASK;
        Self::from_bits_truncate(modifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_impl_flags() {
        // native | unmanaged | preservesig
        let raw = 0x0001 | 0x0004 | 0x0080;
        assert_eq!(
            MethodImplCodeType::from_impl_flags(raw),
            MethodImplCodeType::NATIVE
        );
        assert!(MethodImplManagement::from_impl_flags(raw).contains(MethodImplManagement::UNMANAGED));
        assert_eq!(
            MethodImplOptions::from_impl_flags(raw),
            MethodImplOptions::PRESERVE_SIG
        );
    }

    #[test]
    fn split_method_flags() {
        // public | static | hidebysig | pinvokeimpl
        let raw = 0x0006 | 0x0010 | 0x0080 | 0x2000;
        assert_eq!(
            MethodAccessFlags::from_method_flags(raw),
            MethodAccessFlags::PUBLIC
        );
        let modifiers = MethodModifiers::from_method_flags(raw);
        assert!(modifiers.contains(MethodModifiers::STATIC));
        assert!(modifiers.contains(MethodModifiers::PINVOKE_IMPL));
        assert!(!modifiers.contains(MethodModifiers::VIRTUAL));
    }

    #[test]
    fn il_code_type_is_empty() {
        assert_eq!(MethodImplCodeType::from_impl_flags(0), MethodImplCodeType::IL);
        assert!(MethodImplCodeType::from_impl_flags(0).is_empty());
    }
}

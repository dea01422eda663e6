//! Registration of native stub methods in the `<Module>` type.

use rand::RngCore;
use uguid::Guid;

use crate::{
    metadata::{
        method::{
            MethodAccessFlags, MethodBody, MethodDef, MethodImplCodeType, MethodImplManagement,
            MethodImplOptions, MethodModifiers, NativeBody,
        },
        module::Module,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
    },
    transform::encoding::EncodingPlan,
    Result,
};

/// `MethodAttributes` of every stub: `public static pinvokeimpl`
pub const STUB_FLAGS: u32 = MethodAccessFlags::PUBLIC.bits()
    | MethodModifiers::STATIC.bits()
    | MethodModifiers::PINVOKE_IMPL.bits();

/// `MethodImplAttributes` of every stub: `native unmanaged preservesig`
pub const STUB_IMPL_FLAGS: u32 = MethodImplCodeType::NATIVE.bits()
    | MethodImplManagement::UNMANAGED.bits()
    | MethodImplOptions::PRESERVE_SIG.bits();

/// A random RFC 4122 version 4 GUID, used as a stub name.
#[must_use]
pub fn random_guid() -> Guid {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    // version 4, variant 10xx; `Guid::from_bytes` keeps the first three fields little-endian
    bytes[7] = (bytes[7] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Guid::from_bytes(bytes)
}

/// The `static T* ()` signature of a stub returning a payload of the given width
#[must_use]
pub fn stub_signature(plan: EncodingPlan) -> SignatureMethod {
    let element = if plan.wide {
        TypeSignature::Char
    } else {
        TypeSignature::I1
    };
    SignatureMethod::static_method(TypeSignature::ptr(element), vec![])
}

/// Adds a native method with body `code` to `<Module>` and returns its token.
///
/// The `<Module>` type is created if the module has none. The method count of the module
/// grows by exactly one.
///
/// # Errors
/// Propagates errors from [`Module::add_method`].
pub fn register(module: &mut Module, code: Vec<u8>, plan: EncodingPlan) -> Result<Token> {
    let holder = module.module_type_index();
    let method = MethodDef::new(
        &random_guid().to_string(),
        STUB_FLAGS,
        STUB_IMPL_FLAGS,
        stub_signature(plan),
        MethodBody::Native(NativeBody { code }),
    );
    module.add_method(holder, method)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{metadata::header::ImageHeader, transform::encoding::select};

    #[test]
    fn flag_values() {
        assert_eq!(STUB_FLAGS, 0x2016);
        assert_eq!(STUB_IMPL_FLAGS, 0x0085);
    }

    #[test]
    fn guids_are_v4_and_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let name = random_guid().to_string();
            assert_eq!(name.len(), 36);
            assert_eq!(name.as_bytes()[14], b'4');
            assert!(matches!(name.as_bytes()[19], b'8' | b'9' | b'a' | b'b'));
            assert!(seen.insert(name));
        }
    }

    #[test]
    fn register_creates_native_method_in_module_type() {
        let mut module = Module::new("a.exe", ImageHeader::default());
        let before = module.method_count();

        let token = register(&mut module, vec![0xC3, b'x', 0], select(&"x".into())).unwrap();

        assert_eq!(module.method_count(), before + 1);
        let holder = module.module_type_index();
        assert_eq!(module.types()[holder].methods.len(), 1);

        let stub = module.method(token).unwrap();
        assert!(stub.is_native());
        assert!(stub.modifiers().contains(MethodModifiers::PINVOKE_IMPL));
        assert_eq!(stub.access(), MethodAccessFlags::PUBLIC);
        assert_eq!(stub.native_body().unwrap().code, vec![0xC3, b'x', 0]);
        assert_eq!(stub.signature.to_string(), "sbyte* ()");
    }

    #[test]
    fn wide_stub_returns_char_pointer() {
        let mut module = Module::new("a.exe", ImageHeader::default());
        let token = register(&mut module, vec![0xC3], select(&"\u{e9}".into())).unwrap();
        assert_eq!(module.method(token).unwrap().signature.to_string(), "char* ()");
    }
}

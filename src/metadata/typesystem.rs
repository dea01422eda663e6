//! Type definitions and member references of the module graph.

use serde::{Deserialize, Serialize};

use crate::metadata::{method::MethodDef, signatures::SignatureMethod, token::Token};

/// Name of the implicit global type every module carries
pub const MODULE_TYPE_NAME: &str = "<Module>";

/// A type defined in the module, owning its methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// `TypeDef` token, assigned by [`crate::Module::add_type`]
    #[serde(default)]
    pub token: Token,
    /// Namespace, empty for the global namespace
    #[serde(default)]
    pub namespace: String,
    /// Type name
    pub name: String,
    /// Raw `TypeAttributes`
    #[serde(default)]
    pub flags: u32,
    /// Methods in declaration order
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Creates an empty type that has not been added to a module yet
    #[must_use]
    pub fn new(namespace: &str, name: &str, flags: u32) -> Self {
        TypeDef {
            token: Token::new(0),
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            methods: Vec::new(),
        }
    }

    /// `Namespace.Name`, or just `Name` in the global namespace
    #[must_use]
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns true for the `<Module>` type
    #[must_use]
    pub fn is_module_type(&self) -> bool {
        self.namespace.is_empty() && self.name == MODULE_TYPE_NAME
    }
}

/// A reference to a member of another assembly, e.g. `System.String::.ctor(char*)`.
///
/// Two references are the same member when declaring type, name and signature agree; the
/// token is not part of that identity (see [`MemberRef::same_member`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRef {
    /// `MemberRef` token, assigned by [`crate::Module::import_member`]
    #[serde(default)]
    pub token: Token,
    /// Full name of the declaring type
    pub class: String,
    /// Member name
    pub name: String,
    /// Member signature
    pub signature: SignatureMethod,
}

impl MemberRef {
    /// Creates a reference that has not been imported yet
    #[must_use]
    pub fn new(class: &str, name: &str, signature: SignatureMethod) -> Self {
        MemberRef {
            token: Token::new(0),
            class: class.to_string(),
            name: name.to_string(),
            signature,
        }
    }

    /// Returns true if both refer to the same member, regardless of token
    #[must_use]
    pub fn same_member(&self, other: &MemberRef) -> bool {
        self.class == other.class && self.name == other.name && self.signature == other.signature
    }
}

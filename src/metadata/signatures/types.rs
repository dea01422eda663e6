use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded type signature (ECMA-335 II.23.2.12), restricted to the shapes that appear in
/// member references and stub signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeSignature {
    /// Type could not be decoded by the binary-format layer
    #[default]
    Unknown,
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `native int`
    I,
    /// `native uint`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// Unmanaged pointer to the inner type
    Ptr(Box<TypeSignature>),
    /// Managed reference to the inner type
    ByRef(Box<TypeSignature>),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
    /// Reference type by full name
    Class(String),
    /// Value type by full name
    ValueType(String),
}

impl TypeSignature {
    /// Convenience constructor for `inner*`
    #[must_use]
    pub fn ptr(inner: TypeSignature) -> Self {
        TypeSignature::Ptr(Box::new(inner))
    }

    /// Returns true for `void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Unknown => write!(f, "?"),
            TypeSignature::Void => write!(f, "void"),
            TypeSignature::Boolean => write!(f, "bool"),
            TypeSignature::Char => write!(f, "char"),
            TypeSignature::I1 => write!(f, "sbyte"),
            TypeSignature::U1 => write!(f, "byte"),
            TypeSignature::I2 => write!(f, "short"),
            TypeSignature::U2 => write!(f, "ushort"),
            TypeSignature::I4 => write!(f, "int"),
            TypeSignature::U4 => write!(f, "uint"),
            TypeSignature::I8 => write!(f, "long"),
            TypeSignature::U8 => write!(f, "ulong"),
            TypeSignature::R4 => write!(f, "float"),
            TypeSignature::R8 => write!(f, "double"),
            TypeSignature::I => write!(f, "native int"),
            TypeSignature::U => write!(f, "native uint"),
            TypeSignature::String => write!(f, "string"),
            TypeSignature::Object => write!(f, "object"),
            TypeSignature::Ptr(inner) => write!(f, "{inner}*"),
            TypeSignature::ByRef(inner) => write!(f, "{inner}&"),
            TypeSignature::SzArray(inner) => write!(f, "{inner}[]"),
            TypeSignature::Class(name) => write!(f, "class {name}"),
            TypeSignature::ValueType(name) => write!(f, "valuetype {name}"),
        }
    }
}

/// A decoded method signature (ECMA-335 II.23.2.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SignatureMethod {
    /// The method takes an implicit `this`
    pub has_this: bool,
    /// Return type
    pub return_type: TypeSignature,
    /// Parameter types, excluding `this`
    pub params: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// A static method signature
    #[must_use]
    pub fn static_method(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            return_type,
            params,
        }
    }

    /// An instance method signature
    #[must_use]
    pub fn instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            return_type,
            params,
        }
    }

    /// Values a `call` to this method pops, including `this`
    #[must_use]
    pub fn stack_pops(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Values a `call` to this method pushes
    #[must_use]
    pub fn stack_pushes(&self) -> usize {
        usize::from(!self.return_type.is_void())
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        write!(f, "{} (", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

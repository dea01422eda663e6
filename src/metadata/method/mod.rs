//! Method definitions and their bodies.
//!
//! A [`MethodDef`] owns exactly one [`MethodBody`]:
//!
//! - [`MethodBody::Cil`] - managed code, an ordered and mutable instruction list
//! - [`MethodBody::Native`] - raw machine code, as produced for string stubs
//! - [`MethodBody::None`] - abstract, extern or runtime-provided methods
//!
//! # Examples
//!
//! ```rust
//! use dotstub::assembly::{Instruction, OpCode};
//! use dotstub::metadata::method::{CilBody, MethodBody, MethodDef};
//! use dotstub::metadata::signatures::{SignatureMethod, TypeSignature};
//!
//! let method = MethodDef::new(
//!     "Greet",
//!     0x0016, // public static
//!     0,
//!     SignatureMethod::static_method(TypeSignature::String, vec![]),
//!     MethodBody::Cil(CilBody::new(vec![
//!         Instruction::ldstr("Hi"),
//!         Instruction::simple(OpCode::Ret),
//!     ])),
//! );
//! assert!(method.is_cil());
//! assert_eq!(method.cil_body().unwrap().instructions.len(), 2);
//! ```

mod exceptions;
mod types;

pub use exceptions::*;
pub use types::*;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::Instruction,
    metadata::{signatures::SignatureMethod, token::Token},
};

/// A managed method body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CilBody {
    /// Maximum evaluation stack depth declared in the method header
    pub max_stack: u16,
    /// Zero-initialize locals
    #[serde(default)]
    pub init_locals: bool,
    /// The instruction stream
    pub instructions: Vec<Instruction>,
    /// Exception handling clauses, boundaries are instruction indices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl CilBody {
    /// Creates a body with the given instructions and a default `max_stack` of 8
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        CilBody {
            max_stack: 8,
            init_locals: true,
            instructions,
            exception_handlers: Vec::new(),
        }
    }
}

/// Machine code attached to a method whose implementation is native.
///
/// The bytes are emitted verbatim into the image at the method's RVA; anything after the
/// executable prefix (such as embedded string data) is never executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBody {
    /// The raw code bytes
    pub code: Vec<u8>,
}

/// The implementation of a method.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum MethodBody {
    /// No body (abstract, extern, runtime-implemented)
    #[default]
    None,
    /// CIL method body
    Cil(CilBody),
    /// Native machine code body
    Native(NativeBody),
}

/// A row of the `MethodDef` table together with its decoded signature and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// `MethodDef` token, assigned by [`crate::Module::add_method`]
    #[serde(default)]
    pub token: Token,
    /// Method name
    pub name: String,
    /// Raw `MethodAttributes`
    pub flags: u32,
    /// Raw `MethodImplAttributes`
    pub impl_flags: u32,
    /// Decoded signature
    pub signature: SignatureMethod,
    /// Implementation
    #[serde(default)]
    pub body: MethodBody,
}

impl MethodDef {
    /// Creates a method that has not been added to a module yet (null token)
    #[must_use]
    pub fn new(
        name: &str,
        flags: u32,
        impl_flags: u32,
        signature: SignatureMethod,
        body: MethodBody,
    ) -> Self {
        MethodDef {
            token: Token::new(0),
            name: name.to_string(),
            flags,
            impl_flags,
            signature,
            body,
        }
    }

    /// Access flags
    #[must_use]
    pub fn access(&self) -> MethodAccessFlags {
        MethodAccessFlags::from_method_flags(self.flags)
    }

    /// Modifier flags
    #[must_use]
    pub fn modifiers(&self) -> MethodModifiers {
        MethodModifiers::from_method_flags(self.flags)
    }

    /// Implementation code type
    #[must_use]
    pub fn impl_code_type(&self) -> MethodImplCodeType {
        MethodImplCodeType::from_impl_flags(self.impl_flags)
    }

    /// Implementation management
    #[must_use]
    pub fn impl_management(&self) -> MethodImplManagement {
        MethodImplManagement::from_impl_flags(self.impl_flags)
    }

    /// Implementation options
    #[must_use]
    pub fn impl_options(&self) -> MethodImplOptions {
        MethodImplOptions::from_impl_flags(self.impl_flags)
    }

    /// Returns true if the method has a CIL body
    #[must_use]
    pub fn is_cil(&self) -> bool {
        matches!(self.body, MethodBody::Cil(_))
    }

    /// Returns true if the method is implemented in native code
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.impl_code_type() == MethodImplCodeType::NATIVE
    }

    /// The CIL body, if any
    #[must_use]
    pub fn cil_body(&self) -> Option<&CilBody> {
        match &self.body {
            MethodBody::Cil(body) => Some(body),
            _ => None,
        }
    }

    /// The CIL body for modification, if any
    pub fn cil_body_mut(&mut self) -> Option<&mut CilBody> {
        match &mut self.body {
            MethodBody::Cil(body) => Some(body),
            _ => None,
        }
    }

    /// The native body, if any
    #[must_use]
    pub fn native_body(&self) -> Option<&NativeBody> {
        match &self.body {
            MethodBody::Native(body) => Some(body),
            _ => None,
        }
    }
}

//! Method and type signatures of the module graph.
//!
//! Signatures are kept in decoded form: the binary-format layer turns `#Blob` entries into
//! [`TypeSignature`] / [`SignatureMethod`] values before the module reaches this crate, and
//! encodes them again on the way out.
//!
//! The transform only needs signatures for two things: giving generated stubs a proper
//! `static T* ()` shape, and computing the stack effect of `call` / `newobj` when verifying
//! that a rewrite kept the evaluation stack balanced.
//!
//! # Examples
//!
//! ```rust
//! use dotstub::metadata::signatures::{SignatureMethod, TypeSignature};
//!
//! // string::.ctor(sbyte*)
//! let ctor = SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::ptr(TypeSignature::I1)]);
//! assert_eq!(ctor.to_string(), "instance void (sbyte*)");
//! assert_eq!(ctor.stack_pops(), 2);
//! ```

mod types;

pub use types::*;

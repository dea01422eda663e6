//! The module graph the transform operates on.
//!
//! This is the in-memory representation a binary-format layer produces from a .NET image:
//! the image header, types with their methods and method bodies, and imported member
//! references.
//!
//! # Key Components
//!
//! - [`module::Module`] - The whole graph, token allocation and lookups
//! - [`header`] - Machine, PE flavor and CLR header flags
//! - [`method`] - Method definitions, CIL and native bodies, exception handlers
//! - [`typesystem`] - Type definitions and member references
//! - [`signatures`] - Decoded method and type signatures
//! - [`token`] - Metadata table row references used throughout .NET
//! - [`userstring`] - String literals as UTF-16 code units, unpaired surrogates included
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotstub::{JsonStore, ModuleStore};
//! use std::path::Path;
//!
//! let module = JsonStore::new().load(Path::new("app.exe.json"))?;
//! println!("Machine: {}", module.header.machine);
//! println!("Methods: {}", module.method_count());
//! println!("Types: {}", module.types().len());
//! # Ok::<(), dotstub::Error>(())
//! ```

/// Image header fields
pub mod header;
/// Method definitions and bodies
pub mod method;
/// The module graph
pub mod module;
/// Method and type signatures
pub mod signatures;
/// Commonly used metadata token type
pub mod token;
/// Type definitions and member references
pub mod typesystem;
/// `ldstr` literals as raw UTF-16
pub mod userstring;

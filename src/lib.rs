// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotstub
//!
//! Moves the string literals of a .NET module out of the user-string heap and into
//! small, position-independent native stubs.
//!
//! Every `ldstr "..."` in every method body is replaced by a `call` to a freshly
//! generated native method whose body is a handful of x86 / x64 instructions
//! followed by the encoded string bytes. At run time the stub returns the address
//! of its own trailing data and the rewritten IL turns that pointer back into a
//! `System.String` via one of the pointer-taking string constructors. Static
//! scanners looking at the `#US` heap find nothing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotstub::prelude::*;
//! use std::path::Path;
//!
//! let store = JsonStore::new();
//! let outcome = process_file(Path::new("app.exe.json"), &store, &TransformOptions::default())?;
//! println!(
//!     "{} literals moved into {} stubs, written to {}",
//!     outcome.report.strings_externalized,
//!     outcome.report.stubs_created,
//!     outcome.output.display()
//! );
//! # Ok::<(), dotstub::Error>(())
//! ```
//!
//! ## Working on an in-memory module
//!
//! ```rust,no_run
//! use dotstub::prelude::*;
//!
//! fn protect(module: &mut Module) -> dotstub::Result<()> {
//!     let report = StringExternalizer::new(TransformOptions::default()).run(module)?;
//!     println!("{} stubs created", report.stubs_created);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the module graph: types, methods, member references and the image header
//! - [`assembly`] - CIL instructions, operands and stack behavior
//! - [`transform`] - the string externalization pass (selector, synthesizer, registrar,
//!   dedup cache, rewriter and driver)
//! - [`file`] - loading and writing modules through a [`file::ModuleStore`]
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Error Handling
//!
//! ```rust,no_run
//! use dotstub::{Error, prelude::*};
//! use std::path::Path;
//!
//! match process_file(Path::new("missing.json"), &JsonStore::new(), &TransformOptions::default()) {
//!     Ok(outcome) => println!("wrote {}", outcome.output.display()),
//!     Err(Error::InputNotFound(path)) => eprintln!("no such file: {}", path.display()),
//!     Err(Error::MalformedInstruction { method, index, .. }) => {
//!         eprintln!("corrupt ldstr in {method} at {index}")
//!     }
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

pub mod assembly;
pub mod file;
pub mod metadata;
pub mod prelude;
pub mod transform;

#[cfg(test)]
pub(crate) mod test;

pub use error::Error;

/// `dotstub` Result type
pub type Result<T> = std::result::Result<T, Error>;

pub use file::{File, JsonStore, ModuleStore};
pub use metadata::module::Module;
pub use transform::{
    output_path, process_file, Architecture, EncodingPlan, FileOutcome, StringExternalizer,
    TransformOptions, TransformReport,
};

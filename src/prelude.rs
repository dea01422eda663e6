//! Convenient re-exports of the most commonly used types.
//!
//! ```rust,no_run
//! use dotstub::prelude::*;
//! use std::path::Path;
//!
//! let outcome = process_file(Path::new("app.exe.json"), &JsonStore::new(), &TransformOptions::default())?;
//! println!("{}", outcome.report);
//! # Ok::<(), dotstub::Error>(())
//! ```

pub use crate::{
    assembly::{Instruction, OpCode, Operand},
    file::{File, JsonStore, ModuleStore},
    metadata::{
        header::{CorFlags, ImageHeader, MachineType, PeKind},
        method::{CilBody, MethodBody, MethodDef, NativeBody},
        module::Module,
        token::Token,
        typesystem::{MemberRef, TypeDef},
    },
    transform::{
        output_path, process_file, Architecture, EncodingPlan, FileOutcome, StringExternalizer,
        TransformOptions, TransformReport,
    },
    Error, Result,
};

use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::InputNotFound`] - The input path does not resolve to a file
/// - [`Error::NotSupported`] - The input is in a container format the store cannot read
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::OutOfBounds`] - A read past the end of the input data
///
/// ## Module Errors
/// - [`Error::Malformed`] - Structurally broken module graph
/// - [`Error::MalformedInstruction`] - An `ldstr` carrying something other than a string
/// - [`Error::MethodNotFound`] - A token that does not resolve to a method
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Json`] - Module document (de)serialization errors
///
/// Unencodable string content is *not* an error: the affected site is left
/// untouched, a warning is logged and the run continues.
///
/// # Examples
///
/// ```rust,no_run
/// use dotstub::{Error, JsonStore, ModuleStore};
/// use std::path::Path;
///
/// match JsonStore::new().load(Path::new("module.json")) {
///     Ok(module) => println!("{} types", module.types().len()),
///     Err(Error::InputNotFound(path)) => eprintln!("missing: {}", path.display()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed module: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input path does not resolve to an existing file.
    ///
    /// Reported to the user before any loading is attempted; nothing is written.
    #[error("File not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The module is damaged and could not be processed.
    ///
    /// Carries the source location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occurred
        file: &'static str,
        /// The source line in which this error occurred
        line: u32,
    },

    /// A string-load instruction whose operand is not a string.
    ///
    /// This indicates a corrupt or adversarial module and aborts the whole run; no partially
    /// transformed output is ever written.
    #[error("Invalid ldstr in method {method} at instruction {index}: {message}")]
    MalformedInstruction {
        /// Token of the method containing the instruction
        method: Token,
        /// Position of the instruction inside the method body
        index: usize,
        /// What was found instead of a string operand
        message: String,
    },

    /// A token did not resolve to a method definition or member reference.
    #[error("Method not found - {0}")]
    MethodNotFound(Token),

    /// This file type is not supported.
    ///
    /// Returned by stores that are handed a container they cannot read, e.g. a raw PE image
    /// given to the JSON module store.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// A read past the end of the input data.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Module document could not be serialized or deserialized.
    #[error("Invalid module document - {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

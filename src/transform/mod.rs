//! The string externalization pass.
//!
//! Components, leaf first:
//!
//! - [`encoding`] - picks narrow/wide and terminated/explicit-length per literal
//! - [`trampoline`] - emits the x86 / x64 code returning the address of the payload
//! - [`stub`] - adds the native stub methods to `<Module>`
//! - [`cache`] - shares one stub between identical literals
//! - [`rewriter`] - replaces `ldstr` sites inside a method body
//! - [`driver`] - adjusts the image header, walks all methods and handles file I/O
//!
//! Data flows one way: the driver calls the rewriter, which uses the other components to
//! mutate the module. Nothing reads back from the store's writer.

pub mod cache;
pub mod driver;
pub mod encoding;
pub mod rewriter;
pub mod stub;
pub mod trampoline;

pub use driver::{
    adjust_header, output_path, process_file, FileOutcome, StringExternalizer, TransformOptions,
    TransformReport,
};
pub use encoding::EncodingPlan;
pub use trampoline::Architecture;

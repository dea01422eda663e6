//! Module input and output.
//!
//! Reading goes through [`File`], which abstracts over where the input bytes live:
//!
//! - [`physical::Physical`] - memory-mapped files on disk
//! - [`memory::Memory`] - buffers already in memory
//!
//! Turning those bytes into a [`crate::Module`] (and back) is the job of a [`ModuleStore`].
//! The bundled [`JsonStore`] reads and writes *module documents*, the JSON form of the
//! module graph exchanged with a binary-format layer. Raw PE images are not parsed here.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotstub::{File, JsonStore, ModuleStore};
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("app.exe.json"))?;
//! println!("{} bytes, PE image: {}", file.len(), file.is_pe());
//!
//! let store = JsonStore::new();
//! let module = store.decode(&file)?;
//! store.write(&module, Path::new("copy.json"))?;
//! # Ok::<(), dotstub::Error>(())
//! ```

mod json;
mod memory;
mod physical;

pub use json::JsonStore;

use std::path::Path;

use crate::{metadata::module::Module, Error::Empty, Result};
use memory::Memory;
use physical::Physical;

/// Source of raw input bytes.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// All bytes
    fn data(&self) -> &[u8];

    /// Number of bytes
    fn len(&self) -> usize;
}

/// Loads and persists modules.
///
/// The transform never touches the filesystem itself; everything goes through a store so
/// the binary format stays pluggable.
pub trait ModuleStore {
    /// Loads the module at `path`
    ///
    /// # Errors
    /// Returns an error if the path does not exist or its content is not a valid module.
    fn load(&self, path: &Path) -> Result<Module>;

    /// Writes `module` to `path`, replacing any existing file
    ///
    /// # Errors
    /// Returns an error if the module cannot be encoded or the file cannot be written.
    fn write(&self, module: &Module, path: &Path) -> Result<()>;
}

/// Input data, either mapped from disk or held in memory.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Maps the file at `file`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if it cannot be opened and [`crate::Error::Empty`]
    /// if it has no content.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Wraps a buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// All bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// `len` bytes starting at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Number of bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false, empty input is rejected on load
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns true if the data starts with the DOS `MZ` signature
    #[must_use]
    pub fn is_pe(&self) -> bool {
        self.data_slice(0, 2).is_ok_and(|magic| magic == b"MZ")
    }
}

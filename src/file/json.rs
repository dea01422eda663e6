//! The bundled module store: module graphs as JSON documents.

use std::{fs, io::ErrorKind, path::Path};

use log::debug;

use crate::{
    file::{File, ModuleStore},
    metadata::module::Module,
    Error, Result,
};

/// Reads and writes module documents.
///
/// Loading validates the graph ([`Module::validate`]) so the transform only ever sees
/// structurally sound modules. A raw PE image is rejected with [`Error::NotSupported`].
///
/// # Examples
///
/// ```rust
/// use dotstub::{File, JsonStore};
///
/// let doc = br#"{"name":"demo.exe","types":[]}"#.to_vec();
/// let module = JsonStore::new().decode(&File::from_mem(doc)?)?;
/// assert_eq!(module.name(), "demo.exe");
/// # Ok::<(), dotstub::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JsonStore {
    pretty: bool,
}

impl Default for JsonStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStore {
    /// A store writing indented documents
    #[must_use]
    pub fn new() -> Self {
        JsonStore { pretty: true }
    }

    /// A store writing single-line documents
    #[must_use]
    pub fn compact() -> Self {
        JsonStore { pretty: false }
    }

    /// Decodes and validates a module document.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for PE images, [`Error::Json`] for invalid documents and
    /// [`Error::Malformed`] for graphs that fail validation.
    pub fn decode(&self, file: &File) -> Result<Module> {
        if file.is_pe() {
            return Err(Error::NotSupported);
        }

        let module: Module = serde_json::from_slice(file.data())?;
        module.validate()?;
        Ok(module)
    }

    /// Encodes a module document.
    ///
    /// # Errors
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self, module: &Module) -> Result<Vec<u8>> {
        let data = if self.pretty {
            serde_json::to_vec_pretty(module)?
        } else {
            serde_json::to_vec(module)?
        };
        Ok(data)
    }
}

impl ModuleStore for JsonStore {
    fn load(&self, path: &Path) -> Result<Module> {
        let file = match File::from_file(path) {
            Ok(file) => file,
            Err(Error::FileError(error)) if error.kind() == ErrorKind::NotFound => {
                return Err(Error::InputNotFound(path.to_path_buf()))
            }
            Err(error) => return Err(error),
        };

        debug!("Loaded {} bytes from {}", file.len(), path.display());
        self.decode(&file)
    }

    fn write(&self, module: &Module, path: &Path) -> Result<()> {
        // encode fully before touching the target
        let data = self.encode(module)?;
        fs::write(path, &data)?;

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

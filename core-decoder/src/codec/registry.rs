//! Format-keyed table of codec backend factories.

use super::{CodecAdapter, PassthroughAdapter, PcmAdapter};
use crate::format::CodecFormat;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a fresh backend instance for one stream.
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn CodecAdapter> + Send + Sync>;

/// Static dispatch table from format to backend.
///
/// Dynamically loaded backends register themselves here at construction
/// time; nothing else in the decode path knows how a backend was obtained.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    factories: HashMap<CodecFormat, AdapterFactory>,
}

impl CodecRegistry {
    /// Empty registry; every format falls back to passthrough.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in PCM family backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for format in [
            CodecFormat::PcmS16Le,
            CodecFormat::PcmS16Be,
            CodecFormat::PcmU8,
            CodecFormat::PcmBluray,
            CodecFormat::WifiDisplay,
            CodecFormat::Alaw,
            CodecFormat::Mulaw,
        ] {
            registry.register(format, || Box::new(PcmAdapter::new()));
        }
        registry
    }

    /// Register (or replace) the backend for `format`.
    pub fn register<F>(&mut self, format: CodecFormat, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn CodecAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(format, Arc::new(factory));
        self
    }

    pub fn supports(&self, format: CodecFormat) -> bool {
        self.factories.contains_key(&format)
    }

    /// Instantiate the backend for `format`.
    ///
    /// Compressed passthrough formats and formats without a backend get a
    /// [`PassthroughAdapter`].
    pub fn create(&self, format: CodecFormat) -> Box<dyn CodecAdapter> {
        match self.factories.get(&format) {
            Some(factory) => {
                let adapter = factory();
                debug!(%format, backend = adapter.name(), "Codec backend selected");
                adapter
            }
            None => {
                if !format.is_compressed_passthrough() {
                    warn!(%format, "No codec backend registered, using passthrough");
                }
                Box::new(PassthroughAdapter::new())
            }
        }
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<String> = self.factories.keys().map(|k| k.to_string()).collect();
        formats.sort();
        f.debug_struct("CodecRegistry")
            .field("formats", &formats)
            .finish()
    }
}

#![forbid(unsafe_code)]

//! DSig context: the key store, an optional explicit key and document
//! processing settings for one sign or verify call.

use std::path::PathBuf;

use xseal_keys::{Key, KeysManager};

/// Context for XML-DSig operations.
pub struct DsigContext<'a> {
    /// Store consulted for named keys and trusted certificates.
    pub keys_manager: &'a KeysManager,
    /// The signing key, or for verification a key that replaces whatever
    /// `KeyInfo` says.
    pub key: Option<Key>,
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// Base directory for resolving relative external URI references.
    pub base_dir: Option<PathBuf>,
}

impl<'a> DsigContext<'a> {
    /// Create a new DSig context over the given keys manager.
    pub fn new(keys_manager: &'a KeysManager) -> Self {
        Self {
            keys_manager,
            key: None,
            id_attrs: Vec::new(),
            base_dir: None,
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }
}

#![forbid(unsafe_code)]

//! Key store: named keys plus the trusted and untrusted certificates used
//! when validating `ds:X509Data`.

use crate::key::{Key, KeyData};

/// Manages a collection of keys for lookup during signature/encryption processing.
///
/// Keys are adopted by value, so a key handle can only ever be owned by one
/// store.
#[derive(Debug, Default)]
pub struct KeysManager {
    keys: Vec<Key>,
    /// Trusted certificates (DER-encoded).
    trusted_certs: Vec<Vec<u8>>,
    /// Untrusted intermediate certificates (DER-encoded).
    untrusted_certs: Vec<Vec<u8>>,
}

impl KeysManager {
    /// Create an empty keys manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `key`.  A key already stored under the same name
    /// is dropped.
    pub fn adopt_key(&mut self, key: Key) {
        if let Some(name) = key.name.as_deref() {
            let before = self.keys.len();
            self.keys.retain(|k| k.name.as_deref() != Some(name));
            if self.keys.len() != before {
                tracing::debug!(name, "replacing key");
            }
        }
        tracing::debug!(name = ?key.name, kind = ?key.data, "adopting key");
        self.keys.push(key);
    }

    /// Find a key by name; the most recently adopted key wins.
    pub fn find_by_name(&self, name: &str) -> Option<&Key> {
        self.keys().find(|k| k.name.as_deref() == Some(name))
    }

    /// Find a symmetric key by name.
    pub fn find_symmetric(&self, name: &str) -> Option<&[u8]> {
        self.keys()
            .filter(|k| k.name.as_deref() == Some(name))
            .find_map(Key::symmetric_key_bytes)
    }

    /// Find the most recently adopted RSA key with a private component.
    pub fn find_rsa_private(&self) -> Option<&Key> {
        self.keys().find(|k| {
            matches!(
                &k.data,
                KeyData::Rsa {
                    private: Some(_),
                    ..
                }
            )
        })
    }

    /// Iterator over all keys, most recently adopted first.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter().rev()
    }

    /// Add a trusted certificate (DER-encoded). Duplicates are ignored.
    pub fn add_trusted_cert(&mut self, der: Vec<u8>) {
        if !self.trusted_certs.contains(&der) {
            tracing::debug!(len = der.len(), "registering trusted certificate");
            self.trusted_certs.push(der);
        }
    }

    /// Add an untrusted intermediate certificate (DER-encoded).
    pub fn add_untrusted_cert(&mut self, der: Vec<u8>) {
        if !self.untrusted_certs.contains(&der) {
            self.untrusted_certs.push(der);
        }
    }

    /// Get the trusted certificates.
    pub fn trusted_certs(&self) -> &[Vec<u8>] {
        &self.trusted_certs
    }

    /// Get the untrusted intermediate certificates.
    pub fn untrusted_certs(&self) -> &[Vec<u8>] {
        &self.untrusted_certs
    }

    /// Check if any trusted certificates are loaded.
    pub fn has_trusted_certs(&self) -> bool {
        !self.trusted_certs.is_empty()
    }
}

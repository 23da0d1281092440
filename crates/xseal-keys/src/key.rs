#![forbid(unsafe_code)]

//! Key types and data structures.

use xseal_crypto::SigningKey;

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
    /// Raw bytes of a block cipher key (a document session key).
    Symmetric(Vec<u8>),
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visibility = |private: bool| if private { "private+public" } else { "public" };
        match self {
            Self::Rsa { private, .. } => write!(f, "RSA {} key", visibility(private.is_some())),
            Self::EcP256 { private, .. } => {
                write!(f, "EC P-256 {} key", visibility(private.is_some()))
            }
            Self::EcP384 { private, .. } => {
                write!(f, "EC P-384 {} key", visibility(private.is_some()))
            }
            Self::Symmetric(k) => write!(f, "symmetric key ({} bytes)", k.len()),
        }
    }
}

/// A named key with associated data.
#[derive(Debug, Clone)]
pub struct Key {
    /// Optional name for key lookup (`ds:KeyName`).
    pub name: Option<String>,
    /// The key data.
    pub data: KeyData,
    /// X.509 certificates travelling with the key (DER), leaf first.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    /// Create a new, unnamed key.
    pub fn new(data: KeyData) -> Self {
        Self {
            name: None,
            data,
            x509_chain: Vec::new(),
        }
    }

    /// A symmetric key wrapping `bytes`.
    pub fn symmetric(bytes: Vec<u8>) -> Self {
        Self::new(KeyData::Symmetric(bytes))
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the key holds private (or secret) material.
    pub fn has_private(&self) -> bool {
        match &self.data {
            KeyData::Rsa { private, .. } => private.is_some(),
            KeyData::EcP256 { private, .. } => private.is_some(),
            KeyData::EcP384 { private, .. } => private.is_some(),
            KeyData::Symmetric(_) => true,
        }
    }

    /// Convert to a `SigningKey` for the signature algorithms.
    ///
    /// Private keys convert to their signing form, public keys to their
    /// verifying form. Symmetric keys have no asymmetric counterpart.
    pub fn to_signing_key(&self) -> Option<SigningKey> {
        let key = match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { private: Some(sk), .. } => SigningKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
            KeyData::Symmetric(_) => return None,
        };
        Some(key)
    }

    /// A copy of this key without private material; symmetric keys have none.
    pub fn to_public(&self) -> Option<Key> {
        let data = match &self.data {
            KeyData::Rsa { public, .. } => KeyData::Rsa {
                private: None,
                public: public.clone(),
            },
            KeyData::EcP256 { public, .. } => KeyData::EcP256 {
                private: None,
                public: *public,
            },
            KeyData::EcP384 { public, .. } => KeyData::EcP384 {
                private: None,
                public: *public,
            },
            KeyData::Symmetric(_) => return None,
        };
        Some(Key {
            name: self.name.clone(),
            data,
            x509_chain: self.x509_chain.clone(),
        })
    }

    /// Get the raw symmetric key bytes.
    pub fn symmetric_key_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            KeyData::Symmetric(k) => Some(k),
            _ => None,
        }
    }

    /// Get the RSA public key if available.
    pub fn rsa_public_key(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.data {
            KeyData::Rsa { public, .. } => Some(public),
            _ => None,
        }
    }

    /// Get the RSA private key if available.
    pub fn rsa_private_key(&self) -> Option<&rsa::RsaPrivateKey> {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => Some(pk),
            _ => None,
        }
    }

    /// The leaf certificate (DER), if any certificate travels with the key.
    pub fn certificate(&self) -> Option<&[u8]> {
        self.x509_chain.first().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_key_has_no_signing_form() {
        let key = Key::symmetric(vec![7u8; 32]).with_name("key0");
        assert_eq!(key.name.as_deref(), Some("key0"));
        assert!(key.has_private());
        assert!(key.to_signing_key().is_none());
        assert!(key.to_public().is_none());
        assert_eq!(key.symmetric_key_bytes(), Some(&[7u8; 32][..]));
        assert_eq!(format!("{:?}", key.data), "symmetric key (32 bytes)");
    }

    #[test]
    fn ec_public_half() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let key = Key::new(KeyData::EcP256 {
            public: *sk.verifying_key(),
            private: Some(sk),
        });
        assert!(key.has_private());
        assert!(key.to_signing_key().unwrap().is_private());

        let public = key.to_public().unwrap();
        assert!(!public.has_private());
        assert!(!public.to_signing_key().unwrap().is_private());
        assert_eq!(format!("{:?}", public.data), "EC P-256 public key");
    }
}

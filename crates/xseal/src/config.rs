#![forbid(unsafe_code)]

//! Operation defaults and their TOML configuration file.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, XsecError};
use crate::options::{C14nAlgorithm, EncAlgorithm, EncFormat, HashAlgorithm, SignAlgorithm, SignFormat};

/// Values that replace `Unset` selectors at the top of each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    pub sign_format: SignFormat,
    pub c14n: C14nAlgorithm,
    pub hash: HashAlgorithm,
    pub signature: SignAlgorithm,
    pub enc_form: EncFormat,
    pub cipher: EncAlgorithm,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            sign_format: SignFormat::Enveloped,
            c14n: C14nAlgorithm::Inclusive11,
            hash: HashAlgorithm::Sha256,
            signature: SignAlgorithm::RsaSha256,
            enc_form: EncFormat::Root,
            cipher: EncAlgorithm::Aes256Cbc,
        }
    }
}

/// Picks `value` unless it is unset.
pub(crate) trait OrDefault: Sized {
    fn or_default_to(self, default: Self) -> Self;
}

macro_rules! or_default {
    ($($ty:ty),+) => {
        $(impl OrDefault for $ty {
            fn or_default_to(self, default: Self) -> Self {
                if self.is_unset() { default } else { self }
            }
        })+
    };
}

or_default!(SignFormat, C14nAlgorithm, HashAlgorithm, SignAlgorithm, EncFormat, EncAlgorithm);

/// Contents of an xseal configuration file.
///
/// ```toml
/// [defaults]
/// hash = "sha512"
/// cipher = "aes128-cbc"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsSection {
    pub sign_format: Option<SignFormat>,
    pub c14n: Option<C14nAlgorithm>,
    pub hash: Option<HashAlgorithm>,
    pub signature: Option<SignAlgorithm>,
    pub enc_form: Option<EncFormat>,
    pub cipher: Option<EncAlgorithm>,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| XsecError::Config(format!("failed to parse config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| XsecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Built-in defaults overridden by this file's `[defaults]`.
    pub fn defaults(&self) -> Result<Defaults> {
        let section = &self.defaults;
        let base = Defaults::default();
        Ok(Defaults {
            sign_format: pick("sign_format", section.sign_format, base.sign_format)?,
            c14n: pick("c14n", section.c14n, base.c14n)?,
            hash: pick("hash", section.hash, base.hash)?,
            signature: pick("signature", section.signature, base.signature)?,
            enc_form: pick("enc_form", section.enc_form, base.enc_form)?,
            cipher: pick("cipher", section.cipher, base.cipher)?,
        })
    }
}

fn pick<T: Copy + PartialEq + Default>(key: &str, value: Option<T>, base: T) -> Result<T> {
    match value {
        Some(v) if v == T::default() => Err(XsecError::Config(format!(
            "\"unset\" is not a valid default for {key}"
        ))),
        Some(v) => Ok(v),
        None => Ok(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults() {
        let d = Config::default().defaults().unwrap();
        assert_eq!(d, Defaults::default());
        assert_eq!(d.signature, SignAlgorithm::RsaSha256);
        assert_eq!(d.enc_form, EncFormat::Root);
    }

    #[test]
    fn file_overrides_some_defaults() {
        let config = Config::from_toml("[defaults]\nhash = \"sha512\"\ncipher = \"3des-cbc\"\n").unwrap();
        let d = config.defaults().unwrap();
        assert_eq!(d.hash, HashAlgorithm::Sha512);
        assert_eq!(d.cipher, EncAlgorithm::TripleDesCbc);
        assert_eq!(d.c14n, C14nAlgorithm::Inclusive11);
    }

    #[test]
    fn bad_files_are_rejected() {
        assert!(Config::from_toml("[defaults]\ncolour = \"red\"\n").is_err());
        assert!(Config::from_toml("[defaults]\nhash = \"md5\"\n").is_err());
        let unset = Config::from_toml("[defaults]\nhash = \"unset\"\n").unwrap();
        assert_eq!(unset.defaults().unwrap_err().status_code(), -10);
    }

    #[test]
    fn unset_selectors_fall_back() {
        assert_eq!(HashAlgorithm::Unset.or_default_to(HashAlgorithm::Sha1), HashAlgorithm::Sha1);
        assert_eq!(HashAlgorithm::Sha384.or_default_to(HashAlgorithm::Sha1), HashAlgorithm::Sha384);
    }
}

#![forbid(unsafe_code)]

//! Per-operation options and the algorithm selectors they carry.
//!
//! Every selector has an `Unset` value that the orchestrators resolve
//! against [`Defaults`](crate::Defaults) once, at the top of an operation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Generates a selector enum with kebab-case `FromStr`/`Display` names.
macro_rules! selector {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            #[default]
            Unset,
            $($variant),+
        }

        impl $name {
            /// Every value except `Unset`.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn is_unset(self) -> bool {
                self == $name::Unset
            }

            pub fn name(self) -> &'static str {
                match self {
                    $name::Unset => "unset",
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                if wanted == "unset" {
                    return Ok($name::Unset);
                }
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == wanted)
                    .ok_or_else(|| {
                        let known: Vec<&str> = $name::ALL.iter().map(|v| v.name()).collect();
                        format!("unknown {} \"{s}\" (expected one of: {})", stringify!($name), known.join(", "))
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

selector! {
    /// Where the signature goes relative to the signed content.
    #[derive(serde::Deserialize)]
    #[serde(try_from = "String")]
    SignFormat {
        Enveloped => "enveloped",
        Enveloping => "enveloping",
        Detached => "detached",
    }
}

selector! {
    /// What an encryption replaces: an element, its content, or the root.
    #[derive(serde::Deserialize)]
    #[serde(try_from = "String")]
    EncFormat {
        Element => "element",
        Content => "content",
        Root => "root",
    }
}

selector! {
    #[derive(serde::Deserialize)]
    #[serde(try_from = "String")]
    C14nAlgorithm {
        Inclusive11 => "c14n11",
        Inclusive => "c14n",
        Exclusive => "exclusive",
    }
}

selector! {
    #[derive(serde::Deserialize)]
    #[serde(try_from = "String")]
    SignAlgorithm {
        RsaSha1 => "rsa-sha1",
        RsaSha224 => "rsa-sha224",
        RsaSha256 => "rsa-sha256",
        RsaSha384 => "rsa-sha384",
        RsaSha512 => "rsa-sha512",
        EcdsaSha1 => "ecdsa-sha1",
        EcdsaSha224 => "ecdsa-sha224",
        EcdsaSha256 => "ecdsa-sha256",
        EcdsaSha384 => "ecdsa-sha384",
        EcdsaSha512 => "ecdsa-sha512",
    }
}

selector! {
    #[derive(serde::Deserialize)]
    #[serde(try_from = "String")]
    HashAlgorithm {
        Sha1 => "sha1",
        Sha224 => "sha224",
        Sha256 => "sha256",
        Sha384 => "sha384",
        Sha512 => "sha512",
    }
}

selector! {
    #[derive(serde::Deserialize)]
    #[serde(try_from = "String")]
    EncAlgorithm {
        Aes128Cbc => "aes128-cbc",
        Aes192Cbc => "aes192-cbc",
        Aes256Cbc => "aes256-cbc",
        TripleDesCbc => "3des-cbc",
    }
}

/// One signing reference.
///
/// An empty `uri` means the whole document.  `union` is only emitted
/// together with `intersect` or `subtract`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    pub hash: HashAlgorithm,
    /// Canonicalization transform appended after any filters.
    pub transform: C14nAlgorithm,
    pub uri: String,
    pub xpath_intersect: String,
    pub xpath_subtract: String,
    pub xpath_union: String,
}

impl Reference {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Whether an XPath Filter 2.0 transform is needed.
    pub fn has_filters(&self) -> bool {
        !self.xpath_intersect.is_empty() || !self.xpath_subtract.is_empty()
    }
}

const REFERENCE_KEYS: [&str; 5] = ["hash=", "c14n=", "intersect=", "subtract=", "union="];

/// `uri[,hash=..][,c14n=..][,intersect=..][,subtract=..][,union=..]`
///
/// A comma not followed by one of the keys belongs to the value before it,
/// so XPath expressions like `concat(a,b)` survive.
impl FromStr for Reference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<String> = Vec::new();
        for piece in s.split(',') {
            let starts_key = REFERENCE_KEYS.iter().any(|k| piece.trim_start().starts_with(k));
            match parts.last_mut() {
                Some(last) if !starts_key => {
                    last.push(',');
                    last.push_str(piece);
                }
                _ => parts.push(piece.to_owned()),
            }
        }

        let mut reference = Reference::default();
        let mut options = parts.as_slice();
        if let Some((first, rest)) = options.split_first() {
            if !REFERENCE_KEYS.iter().any(|k| first.trim_start().starts_with(k)) {
                reference.uri = first.trim().to_owned();
                options = rest;
            }
        }

        for part in options {
            let (key, value) = part
                .trim_start()
                .split_once('=')
                .ok_or_else(|| format!("malformed reference option \"{part}\""))?;
            match key {
                "hash" => reference.hash = value.parse()?,
                "c14n" => reference.transform = value.parse()?,
                "intersect" => reference.xpath_intersect = value.to_owned(),
                "subtract" => reference.xpath_subtract = value.to_owned(),
                "union" => reference.xpath_union = value.to_owned(),
                other => return Err(format!("unknown reference option \"{other}\"")),
            }
        }
        Ok(reference)
    }
}

/// Where an operation reads its document from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    /// The document text itself.
    Memory(String),
}

impl DocumentSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DocumentSource::Path(path.into())
    }

    pub fn memory(text: impl Into<String>) -> Self {
        DocumentSource::Memory(text.into())
    }
}

/// Where an operation puts its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Path(PathBuf),
    Memory,
}

/// The result an operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Written to this file.
    Path(PathBuf),
    Memory(Vec<u8>),
}

impl Output {
    /// The in-memory result as text, if it is in memory and UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Memory(bytes) => std::str::from_utf8(bytes).ok(),
            Output::Path(_) => None,
        }
    }
}

/// A private key file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// PEM (or DER) private key.
    Pem(PathBuf),
    /// PKCS#12 bundle; its certificates come along with the key.
    Pkcs12(PathBuf),
}

impl KeySource {
    pub fn path(&self) -> &PathBuf {
        match self {
            KeySource::Pem(p) | KeySource::Pkcs12(p) => p,
        }
    }
}

/// Public key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeySource {
    /// A bare PEM public key.
    Pem(PathBuf),
    /// An X.509 certificate, PEM or DER.
    Certificate(PathBuf),
    /// A PKCS#12 bundle, used for its certificates.
    Pkcs12(PathBuf),
}

impl PublicKeySource {
    pub fn path(&self) -> &PathBuf {
        match self {
            PublicKeySource::Pem(p) | PublicKeySource::Certificate(p) | PublicKeySource::Pkcs12(p) => p,
        }
    }

    /// Whether the material carries certificates for an `X509Data`.
    pub fn has_certificates(&self) -> bool {
        !matches!(self, PublicKeySource::Pem(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    pub format: SignFormat,
    pub c14n: C14nAlgorithm,
    pub signature: SignAlgorithm,
    pub hash: HashAlgorithm,
    pub private_key: Option<KeySource>,
    /// Certificate to attach (`X509Data`) or bare key to announce
    /// (`KeyValue`).
    pub public_key: Option<PublicKeySource>,
    pub key_password: Option<String>,
    /// Base for relative reference URIs; a file URL or path.
    pub base_url: Option<String>,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Key to verify with; without one the document's `KeyInfo` is used.
    pub public_key: Option<PublicKeySource>,
    pub key_password: Option<String>,
    /// Register the given or embedded certificate as trusted.
    pub trust_selfsigned: bool,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    pub form: EncFormat,
    pub algorithm: EncAlgorithm,
    /// The recipient the session key is wrapped for.
    pub recipient: Option<PublicKeySource>,
    pub key_password: Option<String>,
    pub trust_selfsigned: bool,
    /// Target expressions; empty means the document root.
    pub xpaths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    pub private_key: Option<KeySource>,
    pub key_password: Option<String>,
    pub trust_selfsigned: bool,
}

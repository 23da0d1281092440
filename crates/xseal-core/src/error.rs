#![forbid(unsafe_code)]

/// Errors produced by the xseal primitive crates (XML, C14N, crypto, keys,
/// transforms, dsig, enc).  The orchestration layer wraps these in its own
/// status-coded error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("XPath error: {0}")]
    XPath(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The input does not have the shape the operation needs: a required
    /// element or attribute is absent, an algorithm is unknown, or the tree
    /// is malformed.  Such errors stop an operation before any cryptographic
    /// result exists.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::XmlStructure(_)
                | Error::MissingElement(_)
                | Error::MissingAttribute(_)
                | Error::UnsupportedAlgorithm(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#![forbid(unsafe_code)]

//! Status-coded errors of the four operations.
//!
//! Each variant maps to one negative status code; `0` is success.

use std::path::PathBuf;

use xseal_core::Error as CoreError;

#[derive(Debug, thiserror::Error)]
pub enum XsecError {
    #[error("failed to parse document: {0}")]
    Parse(#[source] CoreError),

    #[error("failed to parse {}: {reason}", path.display())]
    ParseFile { path: PathBuf, reason: String },

    #[error("failed to build template: {0}")]
    Template(String),

    #[error("failed to add reference: {0}")]
    Reference(String),

    #[error("failed to add transform: {0}")]
    Transform(String),

    #[error("failed to embed object: {0}")]
    Object(String),

    #[error("detached signatures need at least one reference")]
    MissingReferences,

    #[error("failed to create context: {0}")]
    Context(String),

    #[error("no Signature element found")]
    NoSignature,

    #[error("no EncryptedData element found")]
    NoEncryptedData,

    #[error("no private key given")]
    MissingPrivateKey,

    #[error("no public key given")]
    MissingPublicKey,

    #[error("failed to load key {}: {source}", path.display())]
    KeyLoad {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error("failed to load certificate {}: {source}", path.display())]
    CertificateLoad {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error("embedded certificate could not be loaded: {0}")]
    EmbeddedCertificate(#[source] CoreError),

    #[error("XPath expression \"{expr}\" failed: {reason}")]
    XPath { expr: String, reason: String },

    #[error("decryption failed: {0}")]
    Decrypt(#[source] CoreError),

    #[error("decryption produced no output")]
    EmptyResult,

    #[error("verification could not run: {0}")]
    Verify(#[source] CoreError),

    #[error("encryption failed: {0}")]
    Encrypt(#[source] CoreError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signing failed: {0}")]
    Sign(#[source] CoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl XsecError {
    /// The negative status code for this failure.
    pub fn status_code(&self) -> i32 {
        match self {
            XsecError::Parse(_) => -1,
            XsecError::ParseFile { .. } => -2,
            XsecError::Template(_) => -3,
            XsecError::Reference(_) => -4,
            XsecError::Transform(_) => -5,
            XsecError::Object(_) => -6,
            XsecError::MissingReferences => -7,
            XsecError::Context(_) | XsecError::Config(_) => -10,
            XsecError::NoSignature => -11,
            XsecError::NoEncryptedData => -12,
            XsecError::MissingPrivateKey => -20,
            XsecError::MissingPublicKey => -21,
            XsecError::KeyLoad { .. } => -25,
            XsecError::CertificateLoad { .. } => -26,
            XsecError::EmbeddedCertificate(_) => -27,
            XsecError::XPath { .. } => -30,
            XsecError::Decrypt(_) => -50,
            XsecError::EmptyResult => -51,
            XsecError::Verify(_) => -60,
            XsecError::Encrypt(_) => -70,
            XsecError::Write { .. } => -80,
            XsecError::Read { .. } => -81,
            XsecError::Sign(_) => -90,
        }
    }
}

pub type Result<T> = std::result::Result<T, XsecError>;

/// The caller-facing status pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Status {
            code: 0,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

impl From<&XsecError> for Status {
    fn from(err: &XsecError) -> Self {
        Status {
            code: err.status_code(),
            message: err.to_string(),
        }
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::ok(),
            Err(e) => e.into(),
        }
    }
}

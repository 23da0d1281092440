#![forbid(unsafe_code)]

//! Selector to algorithm URI mapping.
//!
//! `Unset` maps to `None`.  Defaults are applied by the orchestrators, never
//! here.

use xseal_core::algorithm;

use crate::options::{C14nAlgorithm, EncAlgorithm, HashAlgorithm, SignAlgorithm};

pub fn c14n_uri(c14n: C14nAlgorithm) -> Option<&'static str> {
    match c14n {
        C14nAlgorithm::Unset => None,
        C14nAlgorithm::Inclusive11 => Some(algorithm::C14N11),
        C14nAlgorithm::Inclusive => Some(algorithm::C14N),
        C14nAlgorithm::Exclusive => Some(algorithm::EXC_C14N),
    }
}

pub fn digest_uri(hash: HashAlgorithm) -> Option<&'static str> {
    match hash {
        HashAlgorithm::Unset => None,
        HashAlgorithm::Sha1 => Some(algorithm::SHA1),
        HashAlgorithm::Sha224 => Some(algorithm::SHA224),
        HashAlgorithm::Sha256 => Some(algorithm::SHA256),
        HashAlgorithm::Sha384 => Some(algorithm::SHA384),
        HashAlgorithm::Sha512 => Some(algorithm::SHA512),
    }
}

pub fn signature_uri(sig: SignAlgorithm) -> Option<&'static str> {
    match sig {
        SignAlgorithm::Unset => None,
        SignAlgorithm::RsaSha1 => Some(algorithm::RSA_SHA1),
        SignAlgorithm::RsaSha224 => Some(algorithm::RSA_SHA224),
        SignAlgorithm::RsaSha256 => Some(algorithm::RSA_SHA256),
        SignAlgorithm::RsaSha384 => Some(algorithm::RSA_SHA384),
        SignAlgorithm::RsaSha512 => Some(algorithm::RSA_SHA512),
        SignAlgorithm::EcdsaSha1 => Some(algorithm::ECDSA_SHA1),
        SignAlgorithm::EcdsaSha224 => Some(algorithm::ECDSA_SHA224),
        SignAlgorithm::EcdsaSha256 => Some(algorithm::ECDSA_SHA256),
        SignAlgorithm::EcdsaSha384 => Some(algorithm::ECDSA_SHA384),
        SignAlgorithm::EcdsaSha512 => Some(algorithm::ECDSA_SHA512),
    }
}

pub fn cipher_uri(enc: EncAlgorithm) -> Option<&'static str> {
    match enc {
        EncAlgorithm::Unset => None,
        EncAlgorithm::Aes128Cbc => Some(algorithm::AES128_CBC),
        EncAlgorithm::Aes192Cbc => Some(algorithm::AES192_CBC),
        EncAlgorithm::Aes256Cbc => Some(algorithm::AES256_CBC),
        EncAlgorithm::TripleDesCbc => Some(algorithm::TRIPLEDES_CBC),
    }
}

/// Session key size in bytes for a cipher selector.
pub fn cipher_key_size(enc: EncAlgorithm) -> Option<usize> {
    match enc {
        EncAlgorithm::Unset => None,
        EncAlgorithm::Aes128Cbc => Some(16),
        EncAlgorithm::Aes192Cbc => Some(24),
        EncAlgorithm::Aes256Cbc => Some(32),
        EncAlgorithm::TripleDesCbc => Some(24),
    }
}

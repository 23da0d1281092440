#![forbid(unsafe_code)]

//! X.509 certificate chain validation.
//!
//! A leaf is accepted when a chain of valid signatures leads from it to a
//! certificate in the trusted set, optionally through intermediates taken
//! from the document or from the store's untrusted set.

use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use x509_cert::Certificate;
use xseal_core::{algorithm, Error};

const MAX_DEPTH: usize = 10;

const SHA1_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA224_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.14");
const SHA256_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const ECDSA_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
const ECDSA_SHA224: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.1");
const ECDSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");

/// Inputs for chain validation.
pub struct CertValidationConfig<'a> {
    /// Trusted certificates (DER-encoded).
    pub trusted_certs: &'a [Vec<u8>],
    /// Untrusted intermediate certificates (DER-encoded).
    pub untrusted_certs: &'a [Vec<u8>],
    /// Skip notBefore/notAfter checks.
    pub skip_time_checks: bool,
}

struct Parsed {
    cert: Certificate,
    der: Vec<u8>,
}

impl Parsed {
    fn parse(der: &[u8]) -> Option<Self> {
        Certificate::from_der(der).ok().map(|cert| Self {
            cert,
            der: der.to_vec(),
        })
    }

    fn subject(&self) -> Vec<u8> {
        self.cert.tbs_certificate.subject.to_der().unwrap_or_default()
    }
}

fn issuer_of(cert: &Certificate) -> Vec<u8> {
    cert.tbs_certificate.issuer.to_der().unwrap_or_default()
}

/// Validate `leaf_der` against the trusted certificates in `config`.
///
/// `additional_certs` are certificates that travelled with the signature
/// (the whole `ds:X509Data`); they may supply intermediates but are never
/// trusted themselves.
pub fn validate_cert_chain(
    leaf_der: &[u8],
    additional_certs: &[Vec<u8>],
    config: &CertValidationConfig<'_>,
) -> Result<(), Error> {
    let leaf = Certificate::from_der(leaf_der)
        .map_err(|e| Error::Certificate(format!("failed to parse leaf certificate: {e}")))?;

    let trusted: Vec<Parsed> = config
        .trusted_certs
        .iter()
        .filter_map(|der| Parsed::parse(der))
        .collect();
    if trusted.is_empty() {
        return Err(Error::Certificate("no trusted certificates available".into()));
    }
    let available: Vec<Parsed> = additional_certs
        .iter()
        .chain(config.untrusted_certs)
        .filter(|der| der.as_slice() != leaf_der)
        .filter_map(|der| Parsed::parse(der))
        .collect();

    let now = if config.skip_time_checks {
        None
    } else {
        Some(current_time()?)
    };
    if let Some(now) = &now {
        check_validity(&leaf, now)?;
    }

    // A directly trusted leaf needs no chain.
    if trusted.iter().any(|t| t.der == leaf_der) {
        return Ok(());
    }

    let mut current = leaf;
    let mut visited: Vec<&[u8]> = vec![leaf_der];
    for _ in 0..MAX_DEPTH {
        let issuer = issuer_of(&current);

        if let Some(anchor) = trusted
            .iter()
            .find(|t| t.subject() == issuer && verify_signed_by(&current, &t.cert).is_ok())
        {
            if let Some(now) = &now {
                check_validity(&anchor.cert, now)?;
            }
            return Ok(());
        }

        let next = available.iter().find(|c| {
            !visited.contains(&c.der.as_slice())
                && c.subject() == issuer
                && verify_signed_by(&current, &c.cert).is_ok()
        });
        let Some(next) = next else {
            return Err(Error::Certificate(
                "certificate does not chain to a trusted certificate".into(),
            ));
        };
        if let Some(now) = &now {
            check_validity(&next.cert, now)?;
        }
        visited.push(&next.der);
        current = next.cert.clone();
    }

    Err(Error::Certificate("certificate chain too long".into()))
}

fn current_time() -> Result<der::DateTime, Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
    der::DateTime::from_unix_duration(now)
        .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))
}

fn check_validity(cert: &Certificate, now: &der::DateTime) -> Result<(), Error> {
    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_date_time();
    let not_after = validity.not_after.to_date_time();
    if *now < not_before {
        return Err(Error::Certificate(format!(
            "certificate is not yet valid (notBefore: {not_before})"
        )));
    }
    if *now > not_after {
        return Err(Error::Certificate(format!(
            "certificate has expired (notAfter: {not_after})"
        )));
    }
    Ok(())
}

/// Check the signature on `cert` with the public key of `issuer`.
///
/// Certificate signature OIDs map onto the XML-DSig signature algorithms, so
/// the check goes through the same code that verifies `SignatureValue`.
fn verify_signed_by(cert: &Certificate, issuer: &Certificate) -> Result<(), Error> {
    let oid = cert.signature_algorithm.oid;
    let (uri, ecdsa) = match oid {
        SHA1_RSA => (algorithm::RSA_SHA1, false),
        SHA224_RSA => (algorithm::RSA_SHA224, false),
        SHA256_RSA => (algorithm::RSA_SHA256, false),
        SHA384_RSA => (algorithm::RSA_SHA384, false),
        SHA512_RSA => (algorithm::RSA_SHA512, false),
        ECDSA_SHA1 => (algorithm::ECDSA_SHA1, true),
        ECDSA_SHA224 => (algorithm::ECDSA_SHA224, true),
        ECDSA_SHA256 => (algorithm::ECDSA_SHA256, true),
        ECDSA_SHA384 => (algorithm::ECDSA_SHA384, true),
        ECDSA_SHA512 => (algorithm::ECDSA_SHA512, true),
        other => {
            return Err(Error::Certificate(format!(
                "unsupported certificate signature algorithm: {other}"
            )))
        }
    };

    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
    let sig = cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("certificate signature has unused bits".into()))?;

    let spki = issuer
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode issuer SPKI: {e}")))?;
    let key = crate::loader::load_spki_der(&spki)?
        .to_signing_key()
        .ok_or_else(|| Error::Certificate("issuer key cannot verify signatures".into()))?;

    // X.509 carries ECDSA signatures as DER; XML-DSig uses r || s.
    let sig = if ecdsa {
        der_ecdsa_to_fixed(&key, sig)?
    } else {
        sig.to_vec()
    };

    if xseal_crypto::sign::from_uri(uri)?.verify(&key, &tbs, &sig)? {
        Ok(())
    } else {
        Err(Error::Certificate("certificate signature verification failed".into()))
    }
}

fn der_ecdsa_to_fixed(key: &xseal_crypto::SigningKey, sig: &[u8]) -> Result<Vec<u8>, Error> {
    use xseal_crypto::SigningKey as K;
    let invalid = |e: p256::ecdsa::Error| Error::Certificate(format!("invalid ECDSA signature: {e}"));
    match key {
        K::EcP256(_) | K::EcP256Public(_) => Ok(p256::ecdsa::Signature::from_der(sig)
            .map_err(invalid)?
            .to_bytes()
            .to_vec()),
        K::EcP384(_) | K::EcP384Public(_) => Ok(p384::ecdsa::Signature::from_der(sig)
            .map_err(invalid)?
            .to_bytes()
            .to_vec()),
        _ => Err(Error::Certificate("ECDSA signature with a non-EC issuer key".into())),
    }
}

/// Index of the end-entity certificate among `certs` (DER).
///
/// The leaf is the first certificate that issued none of the others; with no
/// such certificate the first one is taken.
pub fn find_leaf(certs: &[Vec<u8>]) -> usize {
    let parsed: Vec<Option<Parsed>> = certs.iter().map(|der| Parsed::parse(der)).collect();
    let names: Vec<Option<(Vec<u8>, Vec<u8>)>> = parsed
        .iter()
        .map(|p| p.as_ref().map(|p| (p.subject(), issuer_of(&p.cert))))
        .collect();

    let issued_another = |i: usize, subject: &[u8]| {
        names
            .iter()
            .enumerate()
            .any(|(j, n)| j != i && n.as_ref().is_some_and(|(_, issuer)| issuer == subject))
    };

    names
        .iter()
        .enumerate()
        .find_map(|(i, n)| match n {
            Some((subject, _)) if !issued_another(i, subject) => Some(i),
            _ => None,
        })
        .unwrap_or(0)
}

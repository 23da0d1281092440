#![forbid(unsafe_code)]

//! Verify orchestration: pick the key resolution mode, register trust and
//! run the verifier.

use roxmltree::Node;
use xseal_core::ns;
use xseal_dsig::{DsigContext, VerifyResult};
use xseal_keys::{loader, Key, KeysManager};
use xseal_xml::document::{child_element, is_element, text_content};

use crate::document;
use crate::error::{Result, XsecError};
use crate::material;
use crate::options::{DocumentSource, PublicKeySource, VerifyOptions};

/// Outcome of a verification that could be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub valid: bool,
    /// Why the signature was rejected.
    pub diagnostic: Option<String>,
}

impl VerifyOutcome {
    fn valid() -> Self {
        Self {
            valid: true,
            diagnostic: None,
        }
    }

    fn invalid(reason: String) -> Self {
        Self {
            valid: false,
            diagnostic: Some(reason),
        }
    }
}

/// First `KeyInfo/X509Data/X509Certificate` of the signature.  Certificates
/// elsewhere, e.g. inside a signed `Object`, do not identify the key.
fn embedded_certificate(signature: Node<'_, '_>) -> Option<String> {
    let key_info = child_element(signature, ns::DSIG, ns::node::KEY_INFO)?;
    key_info
        .children()
        .filter(|n| is_element(n, ns::DSIG, ns::node::X509_DATA))
        .find_map(|data| child_element(data, ns::DSIG, ns::node::X509_CERTIFICATE))
        .map(text_content)
}

pub(crate) fn verify(
    keys: &mut KeysManager,
    source: &DocumentSource,
    options: &VerifyOptions,
) -> Result<VerifyOutcome> {
    let loaded = document::load(source)?;
    let embedded_cert = {
        let doc = xseal_xml::parse(&loaded.text).map_err(XsecError::Parse)?;
        let signature = xseal_dsig::find_signature(&doc).map_err(|_| XsecError::NoSignature)?;
        embedded_certificate(signature)
    };
    let base_dir = document::base_dir(options.base_url.as_deref(), &loaded)?;

    let explicit = resolve_mode(keys, options, embedded_cert.as_deref())?;

    let mut ctx = DsigContext::new(keys);
    ctx.key = explicit;
    ctx.base_dir = base_dir;
    let outcome = match xseal_dsig::verify(&ctx, &loaded.text) {
        Ok(VerifyResult::Valid) => VerifyOutcome::valid(),
        Ok(VerifyResult::Invalid { reason }) => VerifyOutcome::invalid(reason),
        Err(e) if e.is_structural() => return Err(XsecError::Verify(e)),
        Err(e) => VerifyOutcome::invalid(e.to_string()),
    };
    tracing::info!(valid = outcome.valid, diagnostic = ?outcome.diagnostic, "verification finished");
    Ok(outcome)
}

/// Load whatever the options name and return the key that must be used,
/// if the mode fixes one.
fn resolve_mode(
    keys: &mut KeysManager,
    options: &VerifyOptions,
    embedded_cert: Option<&str>,
) -> Result<Option<Key>> {
    let password = options.key_password.as_deref();
    match &options.public_key {
        Some(source @ PublicKeySource::Pem(_)) => {
            tracing::debug!(path = %source.path().display(), "verifying with a public key file");
            Ok(Some(material::load_public_key(source, password)?))
        }
        Some(source @ PublicKeySource::Certificate(_)) => {
            let key = material::load_public_key(source, password)?;
            if options.trust_selfsigned {
                material::register_certificates(keys, &key, true);
            }
            Ok(Some(key))
        }
        Some(source @ PublicKeySource::Pkcs12(_)) => {
            let bundle = material::load_public_key(source, password)?;
            material::register_certificates(keys, &bundle, options.trust_selfsigned);
            Ok(None)
        }
        None => {
            if options.trust_selfsigned {
                if let Some(body) = embedded_cert {
                    let pem = material::certificate_pem(body);
                    let certs = loader::load_certificates(pem.as_bytes())
                        .map_err(XsecError::EmbeddedCertificate)?;
                    for der in certs {
                        loader::load_x509_cert_der(&der).map_err(XsecError::EmbeddedCertificate)?;
                        keys.add_trusted_cert(der);
                    }
                    tracing::debug!("trusting the certificate embedded in the signature");
                }
            }
            Ok(None)
        }
    }
}

#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Locate `<Signature>` and read `<SignedInfo>`
//! 2. For each `<Reference>`: dereference, transform, digest, compare
//! 3. Resolve the verification key (context key, then `<KeyInfo>`, then the store)
//! 4. Canonicalize `<SignedInfo>` and check `<SignatureValue>`

use base64::Engine;
use roxmltree::{Document, Node};
use xseal_c14n::C14nMode;
use xseal_core::{ns, Error};
use xseal_keys::x509::{validate_cert_chain, CertValidationConfig};
use xseal_keys::{keyinfo, Key};
use xseal_xml::document::{child_element, child_elements, is_element, text_content};

use crate::context::DsigContext;
use crate::reference::{child_algorithm, compute_digest, read_inclusive_prefixes};

/// Result of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid.
    Invalid { reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }

    fn invalid(reason: impl Into<String>) -> Self {
        VerifyResult::Invalid {
            reason: reason.into(),
        }
    }
}

/// The first `ds:Signature` element in document order.
pub fn find_signature<'a, 'input>(doc: &'a Document<'input>) -> Result<Node<'a, 'input>, Error> {
    doc.descendants()
        .find(|n| is_element(n, ns::DSIG, ns::node::SIGNATURE))
        .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE.into()))
}

fn decode_b64(node: Node<'_, '_>, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text_content(node)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

/// Verify the first signature in a document.
///
/// Structural problems are returned as `Err`; a signature that is well
/// formed but does not check out is `Ok(VerifyResult::Invalid)`.
pub fn verify(ctx: &DsigContext<'_>, xml: &str) -> Result<VerifyResult, Error> {
    let doc = xseal_xml::parse(xml)?;
    let id_map = xseal_xml::document::build_id_map(&doc, &ctx.id_attrs);

    let signature = find_signature(&doc)?;
    let signed_info = child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement(ns::node::SIGNED_INFO.into()))?;

    let c14n_uri = child_algorithm(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {c14n_uri}")))?;
    let prefixes = child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .map(read_inclusive_prefixes)
        .unwrap_or_default();
    let sig_method_uri = child_algorithm(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)?;

    let references = child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);
    if references.is_empty() {
        return Err(Error::MissingElement(ns::node::REFERENCE.into()));
    }
    for (index, reference) in references.into_iter().enumerate() {
        let uri = reference.attribute(ns::attr::URI).unwrap_or("");
        let computed = compute_digest(
            reference,
            &doc,
            &id_map,
            xml,
            signature,
            ctx.base_dir.as_deref(),
        )?;
        let digest_value = child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement(ns::node::DIGEST_VALUE.into()))?;
        if computed != decode_b64(digest_value, "DigestValue")? {
            tracing::debug!(index, uri, "reference digest mismatch");
            return Ok(VerifyResult::invalid(format!(
                "digest mismatch for reference #{index} (URI=\"{uri}\")"
            )));
        }
    }

    let key = match resolve_key(ctx, signature) {
        Ok(key) => key,
        Err(e) => return Ok(VerifyResult::invalid(e.to_string())),
    };
    let verifying_key = key
        .to_signing_key()
        .ok_or_else(|| Error::Key("the resolved key cannot verify signatures".into()))?;

    let c14n_signed_info =
        xseal_c14n::canonicalize_subtree(&doc, signed_info, c14n_mode, &prefixes)?;
    let value_node = child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE_VALUE.into()))?;
    let signature_value = decode_b64(value_node, "SignatureValue")?;

    let valid = xseal_crypto::sign::from_uri(sig_method_uri)?.verify(
        &verifying_key,
        &c14n_signed_info,
        &signature_value,
    )?;
    tracing::debug!(
        algorithm = sig_method_uri,
        key = verifying_key.kind(),
        valid,
        "checked SignatureValue"
    );
    if valid {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::invalid("signature value does not match"))
    }
}

/// Pick the key that checks `SignatureValue`.
///
/// A context key wins outright.  Otherwise `<KeyInfo>` is consulted: an
/// inline `KeyValue` is used as is, certificates must chain to a trusted
/// certificate in the store, and `KeyName` looks the key up in the store.
/// Without any of these the first usable key in the store is taken.
fn resolve_key(ctx: &DsigContext<'_>, signature: Node<'_, '_>) -> Result<Key, Error> {
    if let Some(key) = &ctx.key {
        tracing::debug!("verifying with the key given by the caller");
        return Ok(key.clone());
    }

    if let Some(key_info) = child_element(signature, ns::DSIG, ns::node::KEY_INFO) {
        if let Some(key) = keyinfo::extract_key(key_info)? {
            if let Some((leaf, rest)) = key.x509_chain.split_first() {
                let config = CertValidationConfig {
                    trusted_certs: ctx.keys_manager.trusted_certs(),
                    untrusted_certs: ctx.keys_manager.untrusted_certs(),
                    skip_time_checks: false,
                };
                validate_cert_chain(leaf, rest, &config)?;
                tracing::debug!(chain = key.x509_chain.len(), "embedded certificate is trusted");
            } else {
                tracing::debug!("verifying with the KeyValue from the document");
            }
            return Ok(key);
        }
        for name in keyinfo::key_names(key_info) {
            if let Some(key) = ctx.keys_manager.find_by_name(&name) {
                return Ok(key.clone());
            }
        }
    }

    ctx.keys_manager
        .keys()
        .find(|k| k.to_signing_key().is_some())
        .cloned()
        .ok_or_else(|| Error::KeyNotFound("no key available to verify the signature".into()))
}

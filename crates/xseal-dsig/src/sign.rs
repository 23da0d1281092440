#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Signs a document containing a `<Signature>` template: every
//! `<DigestValue>` and the `<SignatureValue>` are computed, and empty
//! `X509Data`/`KeyValue` placeholders in `<KeyInfo>` are filled from the
//! signing key.

use base64::Engine;
use roxmltree::Node;
use xseal_c14n::C14nMode;
use xseal_core::{ns, Error};
use xseal_keys::keyinfo;
use xseal_keys::Key;
use xseal_xml::document::{child_element, child_elements, is_element};
use xseal_xml::{Splicer, XmlWriter};

use crate::context::DsigContext;
use crate::reference::{child_algorithm, compute_digest, read_inclusive_prefixes};
use crate::verify::find_signature;

/// Sign the first `<Signature>` template in `template_xml` with `ctx.key`.
///
/// Returns the signed document.  Text outside the filled elements is kept
/// byte for byte.
pub fn sign(ctx: &DsigContext<'_>, template_xml: &str) -> Result<String, Error> {
    let key = ctx
        .key
        .as_ref()
        .ok_or_else(|| Error::KeyNotFound("no signing key in context".into()))?;
    let signing_key = key
        .to_signing_key()
        .filter(|k| k.is_private())
        .ok_or_else(|| Error::Key("signing requires a private RSA or EC key".into()))?;

    // Pass 1: digests and KeyInfo material.
    let digested = {
        let doc = xseal_xml::parse(template_xml)?;
        let id_map = xseal_xml::document::build_id_map(&doc, &ctx.id_attrs);
        let signature = find_signature(&doc)?;
        let signed_info = child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNED_INFO.into()))?;

        let mut splicer = Splicer::new(template_xml);
        let references = child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);
        if references.is_empty() {
            return Err(Error::MissingElement(ns::node::REFERENCE.into()));
        }
        for reference in references {
            let digest = compute_digest(
                reference,
                &doc,
                &id_map,
                template_xml,
                signature,
                ctx.base_dir.as_deref(),
            )?;
            let digest_value = child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
                .ok_or_else(|| Error::MissingElement(ns::node::DIGEST_VALUE.into()))?;
            splicer.set_content(&digest_value, &encode(&digest))?;
        }

        if let Some(key_info) = child_element(signature, ns::DSIG, ns::node::KEY_INFO) {
            fill_key_info(&mut splicer, key_info, key)?;
        }
        splicer.apply()?
    };

    // Pass 2: SignedInfo is final now, sign it.
    let doc = xseal_xml::parse(&digested)?;
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

    let c14n_signed_info =
        xseal_c14n::canonicalize_subtree(&doc, signed_info, c14n_mode, &prefixes)?;
    let signature_value = xseal_crypto::sign::from_uri(sig_method_uri)?
        .sign(&signing_key, &c14n_signed_info)?;
    tracing::debug!(
        algorithm = sig_method_uri,
        c14n = c14n_uri,
        key = signing_key.kind(),
        "computed SignatureValue"
    );

    let value_node = child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE_VALUE.into()))?;
    let mut splicer = Splicer::new(&digested);
    splicer.set_content(&value_node, &encode(&signature_value))?;
    splicer.apply()
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Fill empty `X509Data` and `KeyValue` placeholders; anything else in
/// `<KeyInfo>` is left as the template has it.
fn fill_key_info(splicer: &mut Splicer<'_>, key_info: Node<'_, '_>, key: &Key) -> Result<(), Error> {
    for child in key_info.children().filter(|n| n.is_element()) {
        if child.has_children() {
            continue;
        }
        let mut w = XmlWriter::new();
        if is_element(&child, ns::DSIG, ns::node::X509_DATA) {
            if key.x509_chain.is_empty() {
                return Err(Error::Key(
                    "X509Data requested but the signing key has no certificate".into(),
                ));
            }
            keyinfo::write_x509_certificates(&mut w, &key.x509_chain);
        } else if is_element(&child, ns::DSIG, ns::node::KEY_VALUE) {
            keyinfo::write_key_value(&mut w, key)?;
        } else {
            continue;
        }
        splicer.set_content(&child, &w.into_string())?;
    }
    Ok(())
}

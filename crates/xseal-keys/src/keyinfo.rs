#![forbid(unsafe_code)]

//! `ds:KeyInfo` processing: reading inline key material out of a document
//! and writing `KeyValue` / `X509Data` content into templates.

use base64::Engine;
use rsa::traits::PublicKeyParts;
use xseal_core::{algorithm, ns, Error};
use xseal_xml::document::{child_elements, is_element, text_content};
use xseal_xml::XmlWriter;

use crate::key::{Key, KeyData};

fn decode_b64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

fn encode_b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Text of every `ds:KeyName` child of `key_info`.
pub fn key_names(key_info: roxmltree::Node<'_, '_>) -> Vec<String> {
    child_elements(key_info, ns::DSIG, ns::node::KEY_NAME)
        .into_iter()
        .map(|n| text_content(n))
        .filter(|name| !name.is_empty())
        .collect()
}

/// All `ds:X509Data/ds:X509Certificate` values below `key_info`, decoded.
pub fn x509_certificates(key_info: roxmltree::Node<'_, '_>) -> Result<Vec<Vec<u8>>, Error> {
    let mut certs = Vec::new();
    for data in child_elements(key_info, ns::DSIG, ns::node::X509_DATA) {
        for cert in child_elements(data, ns::DSIG, ns::node::X509_CERTIFICATE) {
            certs.push(decode_b64(&text_content(cert), "X509Certificate")?);
        }
    }
    Ok(certs)
}

/// Extract an inline key from `<KeyInfo>`: `KeyValue` first, then the leaf
/// of `X509Data`. The key's chain holds every certificate found.
pub fn extract_key(key_info: roxmltree::Node<'_, '_>) -> Result<Option<Key>, Error> {
    for kv in child_elements(key_info, ns::DSIG, ns::node::KEY_VALUE) {
        if let Some(key) = parse_key_value(kv)? {
            return Ok(Some(key));
        }
    }

    let certs = x509_certificates(key_info)?;
    if certs.is_empty() {
        return Ok(None);
    }
    let leaf = crate::x509::find_leaf(&certs);
    let mut key = crate::loader::load_x509_cert_der(&certs[leaf])?;
    let mut chain = certs;
    let leaf_der = chain.remove(leaf);
    chain.insert(0, leaf_der);
    key.x509_chain = chain;
    Ok(Some(key))
}

/// Parse the first recognised child of a `ds:KeyValue`.
pub fn parse_key_value(key_value: roxmltree::Node<'_, '_>) -> Result<Option<Key>, Error> {
    for child in key_value.children().filter(|n| n.is_element()) {
        if is_element(&child, ns::DSIG, ns::node::RSA_KEY_VALUE) {
            return parse_rsa_key_value(child).map(Some);
        }
        if is_element(&child, ns::DSIG11, ns::node::EC_KEY_VALUE) {
            return parse_ec_key_value(child).map(Some);
        }
        tracing::debug!(element = child.tag_name().name(), "ignoring unsupported KeyValue");
    }
    Ok(None)
}

fn required_child_text(
    parent: roxmltree::Node<'_, '_>,
    namespace: &str,
    local: &str,
) -> Result<String, Error> {
    parent
        .children()
        .find(|n| is_element(n, namespace, local))
        .map(text_content)
        .ok_or_else(|| Error::MissingElement(local.into()))
}

/// Read an RSA public key from `<RSAKeyValue>`.
pub fn parse_rsa_key_value(rsa_kv: roxmltree::Node<'_, '_>) -> Result<Key, Error> {
    let modulus = decode_b64(
        &required_child_text(rsa_kv, ns::DSIG, ns::node::RSA_MODULUS)?,
        "Modulus",
    )?;
    let exponent = decode_b64(
        &required_child_text(rsa_kv, ns::DSIG, ns::node::RSA_EXPONENT)?,
        "Exponent",
    )?;

    let public = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&modulus),
        rsa::BigUint::from_bytes_be(&exponent),
    )
    .map_err(|e| Error::Key(format!("invalid RSA public key: {e}")))?;
    Ok(Key::new(KeyData::Rsa {
        private: None,
        public,
    }))
}

/// Read an EC public key from `<dsig11:ECKeyValue>` (named curves P-256 and P-384).
pub fn parse_ec_key_value(ec_kv: roxmltree::Node<'_, '_>) -> Result<Key, Error> {
    let curve = ec_kv
        .children()
        .find(|n| is_element(n, ns::DSIG11, ns::node::NAMED_CURVE))
        .ok_or_else(|| Error::MissingElement(ns::node::NAMED_CURVE.into()))?
        .attribute(ns::attr::URI)
        .ok_or_else(|| Error::MissingAttribute("URI on NamedCurve".into()))?;
    let point = decode_b64(
        &required_child_text(ec_kv, ns::DSIG11, ns::node::PUBLIC_KEY)?,
        "EC PublicKey",
    )?;

    let data = match curve {
        algorithm::CURVE_P256 => KeyData::EcP256 {
            private: None,
            public: p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| Error::Key(format!("invalid P-256 point: {e}")))?,
        },
        algorithm::CURVE_P384 => KeyData::EcP384 {
            private: None,
            public: p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| Error::Key(format!("invalid P-384 point: {e}")))?,
        },
        other => return Err(Error::UnsupportedAlgorithm(format!("EC curve: {other}"))),
    };
    Ok(Key::new(data))
}

/// Write the content of a `ds:KeyValue` for the public half of `key`.
pub fn write_key_value(w: &mut XmlWriter, key: &Key) -> Result<(), Error> {
    let ds = |local: &str| format!("{}:{local}", ns::DSIG_PREFIX);
    let dsig11 = |local: &str| format!("{}:{local}", ns::DSIG11_PREFIX);

    let (curve, point) = match &key.data {
        KeyData::Rsa { public, .. } => {
            w.start_element(&ds(ns::node::RSA_KEY_VALUE), &[]);
            w.text_element(
                &ds(ns::node::RSA_MODULUS),
                &[],
                &encode_b64(&public.n().to_bytes_be()),
            );
            w.text_element(
                &ds(ns::node::RSA_EXPONENT),
                &[],
                &encode_b64(&public.e().to_bytes_be()),
            );
            w.end_element(&ds(ns::node::RSA_KEY_VALUE));
            return Ok(());
        }
        KeyData::EcP256 { public, .. } => (
            algorithm::CURVE_P256,
            public.to_encoded_point(false).as_bytes().to_vec(),
        ),
        KeyData::EcP384 { public, .. } => (
            algorithm::CURVE_P384,
            public.to_encoded_point(false).as_bytes().to_vec(),
        ),
        KeyData::Symmetric(_) => {
            return Err(Error::Key("a symmetric key has no KeyValue".into()));
        }
    };

    let xmlns = format!("xmlns:{}", ns::DSIG11_PREFIX);
    w.start_element(&dsig11(ns::node::EC_KEY_VALUE), &[(&xmlns, ns::DSIG11)]);
    w.empty_element(&dsig11(ns::node::NAMED_CURVE), &[(ns::attr::URI, curve)]);
    w.text_element(&dsig11(ns::node::PUBLIC_KEY), &[], &encode_b64(&point));
    w.end_element(&dsig11(ns::node::EC_KEY_VALUE));
    Ok(())
}

/// Write one `ds:X509Certificate` per certificate, in order.
pub fn write_x509_certificates(w: &mut XmlWriter, certs: &[Vec<u8>]) {
    let name = format!("{}:{}", ns::DSIG_PREFIX, ns::node::X509_CERTIFICATE);
    for der in certs {
        w.text_element(&name, &[], &encode_b64(der));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../test-data/keys")
            .join(name);
        std::fs::read(path).unwrap()
    }

    fn key_info_doc(content: &str) -> String {
        format!(
            r#"<ds:KeyInfo xmlns:ds="{}">{content}</ds:KeyInfo>"#,
            ns::DSIG
        )
    }

    fn written_key_value(key: &Key) -> String {
        let mut w = XmlWriter::new();
        w.start_element("ds:KeyValue", &[]);
        write_key_value(&mut w, key).unwrap();
        w.end_element("ds:KeyValue");
        key_info_doc(&w.into_string())
    }

    #[test]
    fn rsa_key_value_written_and_read() {
        let key = loader::load_pem(&fixture("rsa-key.pem"), None).unwrap();
        let xml = written_key_value(&key);
        let doc = roxmltree::Document::parse(&xml).unwrap();

        let read = extract_key(doc.root_element()).unwrap().unwrap();
        assert!(!read.has_private());
        assert_eq!(read.rsa_public_key(), key.rsa_public_key());
    }

    #[test]
    fn ec_key_value_written_and_read() {
        let key = loader::load_pem(&fixture("ec-key.pem"), None).unwrap();
        let xml = written_key_value(&key);
        assert!(xml.contains(algorithm::CURVE_P256));
        let doc = roxmltree::Document::parse(&xml).unwrap();

        let read = extract_key(doc.root_element()).unwrap().unwrap();
        match (&key.data, &read.data) {
            (KeyData::EcP256 { public: a, .. }, KeyData::EcP256 { public: b, .. }) => {
                assert_eq!(a, b)
            }
            other => panic!("unexpected key types: {other:?}"),
        }
    }

    #[test]
    fn x509_data_yields_leaf_and_chain() {
        let cert = loader::load_certificate(&fixture("rsa-cert.pem")).unwrap();
        let mut w = XmlWriter::new();
        w.start_element("ds:X509Data", &[]);
        write_x509_certificates(&mut w, &cert.x509_chain);
        w.end_element("ds:X509Data");
        let xml = key_info_doc(&format!("<ds:KeyName>recipient</ds:KeyName>{}", w.into_string()));
        let doc = roxmltree::Document::parse(&xml).unwrap();

        assert_eq!(key_names(doc.root_element()), vec!["recipient".to_string()]);
        assert_eq!(x509_certificates(doc.root_element()).unwrap(), cert.x509_chain);
        let key = extract_key(doc.root_element()).unwrap().unwrap();
        assert_eq!(key.x509_chain, cert.x509_chain);
        assert_eq!(key.rsa_public_key(), cert.rsa_public_key());
    }

    #[test]
    fn empty_and_broken_key_info() {
        let empty = key_info_doc("");
        let doc = roxmltree::Document::parse(&empty).unwrap();
        assert!(extract_key(doc.root_element()).unwrap().is_none());

        let broken = key_info_doc("<ds:X509Data><ds:X509Certificate>!!</ds:X509Certificate></ds:X509Data>");
        let doc = roxmltree::Document::parse(&broken).unwrap();
        assert!(matches!(extract_key(doc.root_element()), Err(Error::Base64(_))));
    }

    #[test]
    fn symmetric_keys_have_no_key_value() {
        let mut w = XmlWriter::new();
        assert!(write_key_value(&mut w, &Key::symmetric(vec![0; 16])).is_err());
    }
}

#![forbid(unsafe_code)]

//! XML-Enc encryption.
//!
//! Takes an `<EncryptedData>` template and a target element of a document,
//! encrypts the element (or its content, per the template's `Type`) with the
//! context's session key and splices the filled template into the document
//! in place of the plaintext.  An `<EncryptedKey>` in the template's
//! `<KeyInfo>` receives the session key wrapped for the recipient.

use base64::Engine;
use roxmltree::{Node, NodeId};
use xseal_core::{ns, Error};
use xseal_keys::{keyinfo, Key};
use xseal_xml::document::{child_element, is_element};
use xseal_xml::edit::content_range;
use xseal_xml::{Splicer, XmlWriter};

use crate::context::EncContext;

/// Encrypt the element `target` of `xml` using `template`.
///
/// `target` must be a node id of a parse of `xml`.  Returns the new
/// document text.
pub fn encrypt(
    ctx: &mut EncContext<'_>,
    xml: &str,
    target: NodeId,
    template: &str,
) -> Result<String, Error> {
    let doc = xseal_xml::parse(xml)?;
    let node = doc
        .get_node(target)
        .filter(|n| n.is_element())
        .ok_or_else(|| Error::XmlStructure("encryption target is not an element".into()))?;

    let tdoc = xseal_xml::parse(template)?;
    let enc_data = tdoc.root_element();
    if !is_element(&enc_data, ns::ENC, ns::node::ENCRYPTED_DATA) {
        return Err(Error::MissingElement(ns::node::ENCRYPTED_DATA.into()));
    }
    let content_only = match enc_data.attribute(ns::attr::TYPE) {
        Some(ns::ENC_TYPE_CONTENT) => true,
        Some(ns::ENC_TYPE_ELEMENT) | None => false,
        Some(other) => {
            return Err(Error::Encryption(format!(
                "cannot encrypt an element as type {other}"
            )))
        }
    };

    let plaintext = if content_only {
        content_range(xml, &node)?.map_or("", |r| &xml[r])
    } else {
        &xml[node.range()]
    };

    let filled = fill_encrypted_data(ctx, template, enc_data, plaintext.as_bytes())?;
    tracing::debug!(
        element = node.tag_name().name(),
        content_only,
        len = plaintext.len(),
        "encrypted target"
    );

    let mut splicer = Splicer::new(xml);
    if content_only {
        splicer.set_content(&node, &filled)?;
    } else {
        splicer.replace_node(&node, filled.as_str());
    }
    splicer.apply()
}

/// Fill `CipherValue` (and any inline `EncryptedKey`) of a parsed template.
fn fill_encrypted_data(
    ctx: &EncContext<'_>,
    template: &str,
    enc_data: Node<'_, '_>,
    plaintext: &[u8],
) -> Result<String, Error> {
    let method_uri = method_algorithm(enc_data)?;
    let cipher = xseal_crypto::cipher::from_uri(method_uri)?;
    let session = ctx
        .session_key()
        .and_then(Key::symmetric_key_bytes)
        .ok_or_else(|| Error::KeyNotFound("no session key in encryption context".into()))?;
    if session.len() != cipher.key_size() {
        return Err(Error::Key(format!(
            "session key is {} bytes, {method_uri} needs {}",
            session.len(),
            cipher.key_size()
        )));
    }

    let mut splicer = Splicer::new(template);
    let ciphertext = cipher.encrypt(session, plaintext)?;
    splicer.set_content(&cipher_value(enc_data)?, &encode(&ciphertext))?;

    if let Some(key_info) = child_element(enc_data, ns::DSIG, ns::node::KEY_INFO) {
        for encrypted_key in key_info
            .children()
            .filter(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_KEY))
        {
            fill_encrypted_key(ctx, &mut splicer, encrypted_key, session)?;
        }
    }
    splicer.apply()
}

/// Wrap the session key for the recipient named in the EncryptedKey's
/// `KeyInfo` and fill its recipient placeholders.
fn fill_encrypted_key(
    ctx: &EncContext<'_>,
    splicer: &mut Splicer<'_>,
    encrypted_key: Node<'_, '_>,
    session: &[u8],
) -> Result<(), Error> {
    let method_uri = method_algorithm(encrypted_key)?;
    let key_info = child_element(encrypted_key, ns::DSIG, ns::node::KEY_INFO);
    let recipient = find_recipient(ctx, key_info)?;
    let public = recipient
        .rsa_public_key()
        .ok_or_else(|| Error::Key("key transport requires an RSA recipient key".into()))?;

    let transport = xseal_crypto::keytransport::from_uri(method_uri)?;
    let wrapped = transport.encrypt(public, session)?;
    splicer.set_content(&cipher_value(encrypted_key)?, &encode(&wrapped))?;
    tracing::debug!(
        algorithm = method_uri,
        recipient = ?recipient.name,
        "wrapped session key"
    );

    if let Some(key_info) = key_info {
        fill_recipient_placeholders(splicer, key_info, recipient)?;
    }
    Ok(())
}

/// The recipient is the store key named by `KeyName`, else the first key
/// with an RSA public half.
fn find_recipient<'k>(
    ctx: &EncContext<'k>,
    key_info: Option<Node<'_, '_>>,
) -> Result<&'k Key, Error> {
    let keys = ctx.keys_manager;
    let named = key_info
        .map(keyinfo::key_names)
        .unwrap_or_default()
        .iter()
        .find_map(|name| keys.find_by_name(name).filter(|k| k.rsa_public_key().is_some()));
    named
        .or_else(|| keys.keys().find(|k| k.rsa_public_key().is_some()))
        .ok_or_else(|| Error::KeyNotFound("no recipient key for EncryptedKey".into()))
}

fn fill_recipient_placeholders(
    splicer: &mut Splicer<'_>,
    key_info: Node<'_, '_>,
    recipient: &Key,
) -> Result<(), Error> {
    for child in key_info.children().filter(|n| n.is_element()) {
        if child.has_children() {
            continue;
        }
        let mut w = XmlWriter::new();
        if is_element(&child, ns::DSIG, ns::node::X509_DATA) {
            if recipient.x509_chain.is_empty() {
                return Err(Error::Key(
                    "X509Data requested but the recipient key has no certificate".into(),
                ));
            }
            keyinfo::write_x509_certificates(&mut w, &recipient.x509_chain);
        } else if is_element(&child, ns::DSIG, ns::node::KEY_VALUE) {
            keyinfo::write_key_value(&mut w, recipient)?;
        } else {
            continue;
        }
        splicer.set_content(&child, &w.into_string())?;
    }
    Ok(())
}

pub(crate) fn method_algorithm<'a>(node: Node<'a, '_>) -> Result<&'a str, Error> {
    child_element(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .ok_or_else(|| Error::MissingElement(ns::node::ENCRYPTION_METHOD.into()))?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptionMethod".into()))
}

fn cipher_value<'a, 'i>(node: Node<'a, 'i>) -> Result<Node<'a, 'i>, Error> {
    child_element(node, ns::ENC, ns::node::CIPHER_DATA)
        .and_then(|cd| child_element(cd, ns::ENC, ns::node::CIPHER_VALUE))
        .ok_or_else(|| Error::MissingElement(ns::node::CIPHER_VALUE.into()))
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xseal_core::algorithm;
    use xseal_xml::document::text_content;
    use xseal_keys::KeysManager;

    fn recipient() -> Key {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../test-data/keys/rsa-cert.pem");
        xseal_keys::loader::load_certificate_file(&path)
            .unwrap()
            .with_name("rsa-cert.pem")
    }

    fn template(content: bool, key_info: &str) -> String {
        format!(
            r#"<xenc:EncryptedData xmlns:xenc="{enc}" Type="{ty}"><xenc:EncryptionMethod Algorithm="{aes}"/><ds:KeyInfo xmlns:ds="{ds}">{key_info}</ds:KeyInfo><xenc:CipherData><xenc:CipherValue/></xenc:CipherData></xenc:EncryptedData>"#,
            enc = ns::ENC,
            ds = ns::DSIG,
            ty = if content { ns::ENC_TYPE_CONTENT } else { ns::ENC_TYPE_ELEMENT },
            aes = algorithm::AES128_CBC,
        )
    }

    fn wrapped_key_info() -> String {
        format!(
            r#"<ds:KeyName>key0</ds:KeyName><xenc:EncryptedKey Id="key0"><xenc:EncryptionMethod Algorithm="{rsa}"/><ds:KeyInfo><ds:KeyName>rsa-cert.pem</ds:KeyName><ds:X509Data/></ds:KeyInfo><xenc:CipherData><xenc:CipherValue/></xenc:CipherData></xenc:EncryptedKey>"#,
            rsa = algorithm::RSA_PKCS1,
        )
    }

    fn target(xml: &str, name: &str) -> NodeId {
        let doc = xseal_xml::parse(xml).unwrap();
        let id = doc
            .descendants()
            .find(|n| n.tag_name().name() == name)
            .unwrap()
            .id();
        id
    }

    #[test]
    fn element_form_replaces_the_element() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        ctx.set_session_key(Key::symmetric(vec![3u8; 16]).with_name("key0"));

        let xml = "<doc><secret>pin</secret><open/></doc>";
        let out = ctx
            .unit(|c| {
                let tpl = template(false, "<ds:KeyName>key0</ds:KeyName>");
                encrypt(c, xml, target(xml, "secret"), &tpl)
            })
            .unwrap();

        assert!(out.starts_with("<doc><xenc:EncryptedData"));
        assert!(out.ends_with("</xenc:EncryptedData><open/></doc>"));
        assert!(!out.contains("pin"));
        assert!(!out.contains("<xenc:CipherValue/>"));
    }

    #[test]
    fn content_form_keeps_the_element() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        ctx.set_session_key(Key::symmetric(vec![3u8; 16]));

        let xml = r#"<doc><secret a="1">pin</secret></doc>"#;
        let out = encrypt(&mut ctx, xml, target(xml, "secret"), &template(true, "")).unwrap();
        assert!(out.starts_with(r#"<doc><secret a="1"><xenc:EncryptedData"#));
        assert!(out.ends_with("</xenc:EncryptedData></secret></doc>"));
    }

    #[test]
    fn encrypted_key_is_wrapped_for_the_recipient() {
        let mut keys = KeysManager::new();
        keys.adopt_key(recipient());
        let mut ctx = EncContext::new(&keys);
        ctx.set_session_key(Key::symmetric(vec![9u8; 16]).with_name("key0"));

        let xml = "<doc>text</doc>";
        let out = encrypt(&mut ctx, xml, target(xml, "doc"), &template(false, &wrapped_key_info()))
            .unwrap();
        let doc = xseal_xml::parse(&out).unwrap();
        let ek = doc
            .descendants()
            .find(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_KEY))
            .unwrap();
        assert!(!text_content(cipher_value(ek).unwrap()).is_empty());
        assert!(out.contains("<ds:X509Data><ds:X509Certificate>"));
    }

    #[test]
    fn missing_session_key_or_recipient_fails() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        let xml = "<doc>text</doc>";
        assert!(matches!(
            encrypt(&mut ctx, xml, target(xml, "doc"), &template(false, "")),
            Err(Error::KeyNotFound(_))
        ));

        ctx.set_session_key(Key::symmetric(vec![9u8; 16]));
        assert!(matches!(
            encrypt(&mut ctx, xml, target(xml, "doc"), &template(false, &wrapped_key_info())),
            Err(Error::KeyNotFound(_))
        ));
    }

    #[test]
    fn session_key_must_fit_the_cipher() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        ctx.set_session_key(Key::symmetric(vec![9u8; 32]));
        let xml = "<doc>text</doc>";
        assert!(matches!(
            encrypt(&mut ctx, xml, target(xml, "doc"), &template(false, "")),
            Err(Error::Key(_))
        ));
    }
}

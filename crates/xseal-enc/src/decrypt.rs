#![forbid(unsafe_code)]

//! XML-Enc decryption.
//!
//! Decrypts the first `<EncryptedData>` of a document.  `Element` and
//! `Content` data replace the EncryptedData in the document; any other type
//! is handed back as raw octets.

use std::collections::HashMap;

use base64::Engine;
use roxmltree::{Document, Node, NodeId};
use xseal_core::{ns, Error};
use xseal_crypto::keytransport::OaepParams;
use xseal_keys::{keyinfo, Key};
use xseal_xml::document::{child_element, is_element, text_content};
use xseal_xml::Splicer;

use crate::context::EncContext;
use crate::encrypt::method_algorithm;

/// Outcome of decrypting one EncryptedData.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// The plaintext replaced the EncryptedData; the new document text.
    Replaced(String),
    /// The plaintext is not XML to put back into the document.
    Data(Vec<u8>),
}

/// Find the first `<EncryptedData>` in document order.
pub fn find_encrypted_data<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_DATA))
}

/// Decrypt the first `<EncryptedData>` of `xml`.
///
/// The key that decrypted it becomes the context's session key, so
/// later units can still decrypt data whose wrapped key has already been
/// replaced away.
pub fn decrypt(ctx: &mut EncContext<'_>, xml: &str) -> Result<Decrypted, Error> {
    let doc = xseal_xml::parse(xml)?;
    let id_map = xseal_xml::document::build_id_map(&doc, &ctx.id_attrs);
    let enc_data = find_encrypted_data(&doc)
        .ok_or_else(|| Error::MissingElement(ns::node::ENCRYPTED_DATA.into()))?;

    let method_uri = method_algorithm(enc_data)?;
    let cipher = xseal_crypto::cipher::from_uri(method_uri)?;
    let key_info = child_element(enc_data, ns::DSIG, ns::node::KEY_INFO);
    let key = resolve_decryption_key(ctx, key_info, &doc, &id_map, cipher.key_size())?;

    let ciphertext = read_cipher_value(enc_data)?;
    let plaintext = cipher.decrypt(&key, &ciphertext)?;
    let key_name = key_info
        .and_then(|ki| child_element(ki, ns::DSIG, ns::node::KEY_NAME))
        .map(text_content);
    ctx.set_session_key(match &key_name {
        Some(name) => Key::symmetric(key).with_name(name.clone()),
        None => Key::symmetric(key),
    });

    let enc_type = enc_data.attribute(ns::attr::TYPE).unwrap_or("");
    let len = plaintext.len();
    let outcome = match enc_type {
        ns::ENC_TYPE_ELEMENT | ns::ENC_TYPE_CONTENT => {
            let text = std::str::from_utf8(&plaintext)
                .map_err(|e| Error::Decryption(format!("decrypted XML is not UTF-8: {e}")))?;
            let mut splicer = Splicer::new(xml);
            splicer.replace_node(&enc_data, text);
            let replaced = splicer.apply()?;
            xseal_xml::parse(&replaced).map_err(|e| {
                Error::Decryption(format!("decrypted data does not fit the document: {e}"))
            })?;
            Decrypted::Replaced(replaced)
        }
        _ => Decrypted::Data(plaintext),
    };
    tracing::debug!(
        algorithm = method_uri,
        r#type = enc_type,
        len,
        "decrypted EncryptedData"
    );
    Ok(outcome)
}

/// Resolve the symmetric key for an EncryptedData.
///
/// Tried in order: an inline `EncryptedKey`, a `RetrievalMethod` pointing at
/// one, a symmetric key named by `KeyName`, the context's session key.
fn resolve_decryption_key(
    ctx: &EncContext<'_>,
    key_info: Option<Node<'_, '_>>,
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
    key_size: usize,
) -> Result<Vec<u8>, Error> {
    let mut last_err = None;

    if let Some(key_info) = key_info {
        for ek in key_info
            .children()
            .filter(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_KEY))
        {
            match decrypt_encrypted_key(ctx, ek) {
                Ok(k) if k.len() == key_size => return Ok(k),
                Ok(k) => last_err = Some(size_error(k.len(), key_size)),
                Err(e) => last_err = Some(e),
            }
        }

        for rm in key_info
            .children()
            .filter(|n| is_element(n, ns::DSIG, ns::node::RETRIEVAL_METHOD))
        {
            let ty = rm.attribute(ns::attr::TYPE).unwrap_or("");
            if !ty.is_empty() && !ty.ends_with(ns::node::ENCRYPTED_KEY) {
                continue;
            }
            let Some(id) = rm.attribute(ns::attr::URI).and_then(|u| u.strip_prefix('#')) else {
                continue;
            };
            let target = id_map
                .get(id)
                .and_then(|nid| doc.get_node(*nid))
                .filter(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_KEY));
            match target.map(|ek| decrypt_encrypted_key(ctx, ek)) {
                Some(Ok(k)) if k.len() == key_size => return Ok(k),
                Some(Ok(k)) => last_err = Some(size_error(k.len(), key_size)),
                Some(Err(e)) => last_err = Some(e),
                None => tracing::debug!(id, "RetrievalMethod target not in document"),
            }
        }

        for name in keyinfo::key_names(key_info) {
            let found = ctx.keys_manager.find_symmetric(&name);
            if let Some(k) = found.filter(|k| k.len() == key_size) {
                return Ok(k.to_vec());
            }
        }
    }

    if let Some(k) = ctx
        .session_key()
        .and_then(Key::symmetric_key_bytes)
        .filter(|k| k.len() == key_size)
    {
        tracing::debug!("using carried session key");
        return Ok(k.to_vec());
    }

    Err(last_err.unwrap_or_else(|| {
        Error::KeyNotFound("no key available to decrypt EncryptedData".into())
    }))
}

/// Unwrap the session key held in an `<EncryptedKey>`.
fn decrypt_encrypted_key(
    ctx: &EncContext<'_>,
    encrypted_key: Node<'_, '_>,
) -> Result<Vec<u8>, Error> {
    let method = child_element(encrypted_key, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .ok_or_else(|| Error::MissingElement(ns::node::ENCRYPTION_METHOD.into()))?;
    let method_uri = method_algorithm(encrypted_key)?;
    let transport =
        xseal_crypto::keytransport::from_uri_with_params(method_uri, read_oaep_params(method)?)?;

    let keys = ctx.keys_manager;
    let names = child_element(encrypted_key, ns::DSIG, ns::node::KEY_INFO)
        .map(keyinfo::key_names)
        .unwrap_or_default();
    let private = names
        .iter()
        .find_map(|n| keys.find_by_name(n).and_then(Key::rsa_private_key))
        .or_else(|| keys.find_rsa_private().and_then(Key::rsa_private_key))
        .ok_or_else(|| Error::KeyNotFound("no RSA private key for EncryptedKey".into()))?;

    let wrapped = read_cipher_value(encrypted_key)?;
    transport.decrypt(private, &wrapped)
}

fn read_oaep_params(method: Node<'_, '_>) -> Result<OaepParams, Error> {
    let mut params = OaepParams::default();
    for child in method.children().filter(|n| n.is_element()) {
        if is_element(&child, ns::DSIG, ns::node::DIGEST_METHOD) {
            params.digest_uri = child.attribute(ns::attr::ALGORITHM).map(str::to_owned);
        } else if is_element(&child, ns::ENC, ns::node::OAEP_PARAMS) {
            params.label = Some(decode(&text_content(child))?);
        }
    }
    Ok(params)
}

fn read_cipher_value(node: Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let cipher_data = child_element(node, ns::ENC, ns::node::CIPHER_DATA)
        .ok_or_else(|| Error::MissingElement(ns::node::CIPHER_DATA.into()))?;
    if child_element(cipher_data, ns::ENC, ns::node::CIPHER_REFERENCE).is_some() {
        return Err(Error::Decryption("CipherReference is not supported".into()));
    }
    let value = child_element(cipher_data, ns::ENC, ns::node::CIPHER_VALUE)
        .ok_or_else(|| Error::MissingElement(ns::node::CIPHER_VALUE.into()))?;
    decode(&text_content(value))
}

fn decode(text: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(e.to_string()))
}

fn size_error(got: usize, want: usize) -> Error {
    Error::Decryption(format!("unwrapped key is {got} bytes, cipher needs {want}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::encrypt;
    use xseal_core::algorithm;
    use xseal_keys::KeysManager;

    fn key_file(name: &str) -> Key {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../test-data/keys")
            .join(name);
        xseal_keys::loader::load_key_file(&path, None).unwrap()
    }

    fn template(key_info: &str) -> String {
        format!(
            r#"<xenc:EncryptedData xmlns:xenc="{enc}" Type="{ty}"><xenc:EncryptionMethod Algorithm="{aes}"/><ds:KeyInfo xmlns:ds="{ds}">{key_info}</ds:KeyInfo><xenc:CipherData><xenc:CipherValue/></xenc:CipherData></xenc:EncryptedData>"#,
            enc = ns::ENC,
            ds = ns::DSIG,
            ty = ns::ENC_TYPE_ELEMENT,
            aes = algorithm::AES256_CBC,
        )
    }

    fn first_key_info(transport: &str) -> String {
        format!(
            r#"<ds:KeyName>key0</ds:KeyName><xenc:EncryptedKey Id="key0"><xenc:EncryptionMethod Algorithm="{transport}"/><ds:KeyInfo><ds:KeyName>recipient</ds:KeyName><ds:KeyValue/></ds:KeyInfo><xenc:CipherData><xenc:CipherValue/></xenc:CipherData></xenc:EncryptedKey>"#
        )
    }

    fn later_key_info() -> String {
        format!(
            r##"<ds:KeyName>key0</ds:KeyName><ds:RetrievalMethod URI="#key0" Type="{}"/>"##,
            algorithm::ENCRYPTED_KEY
        )
    }

    /// Encrypt `<b>` then `<a>` of a two-element document the way the
    /// orchestrator does: wrapped key on the last target, retrieval on the rest.
    fn encrypt_two(keys: &KeysManager, transport: &str) -> String {
        let mut ctx = EncContext::new(keys);
        ctx.set_session_key(
            Key::symmetric(xseal_crypto::cipher::generate_key(32))
                .with_name("key0"),
        );
        let mut xml = "<doc><a>first</a><b>second</b></doc>".to_owned();
        for (name, key_info) in [("b", first_key_info(transport)), ("a", later_key_info())] {
            let target = {
                let doc = xseal_xml::parse(&xml).unwrap();
                let id = doc.descendants().find(|n| n.tag_name().name() == name).unwrap().id();
                id
            };
            xml = ctx
                .unit(|c| encrypt(c, &xml, target, &template(&key_info)))
                .unwrap();
        }
        xml
    }

    fn private_store() -> KeysManager {
        let mut keys = KeysManager::new();
        keys.adopt_key(key_file("rsa-key.pem").with_name("recipient"));
        keys
    }

    fn decrypt_all(keys: &KeysManager, mut xml: String) -> (String, usize) {
        let mut ctx = EncContext::new(keys);
        let mut rounds = 0;
        while xml.contains("EncryptedData") {
            match ctx.unit(|c| decrypt(c, &xml)).unwrap() {
                Decrypted::Replaced(next) => xml = next,
                Decrypted::Data(_) => panic!("expected in-place replacement"),
            }
            rounds += 1;
        }
        (xml, rounds)
    }

    #[test]
    fn shared_session_key_round_trip() {
        let keys = private_store();
        let encrypted = encrypt_two(&keys, algorithm::RSA_PKCS1);
        assert_eq!(encrypted.matches("<xenc:EncryptedKey").count(), 1);
        assert_eq!(encrypted.matches("<ds:RetrievalMethod").count(), 1);

        let (plain, rounds) = decrypt_all(&keys, encrypted);
        assert_eq!(rounds, 2);
        assert_eq!(plain, "<doc><a>first</a><b>second</b></doc>");
    }

    #[test]
    fn oaep_wrapped_keys_decrypt() {
        let keys = private_store();
        let encrypted = encrypt_two(&keys, algorithm::RSA_OAEP);
        let (plain, _) = decrypt_all(&keys, encrypted);
        assert_eq!(plain, "<doc><a>first</a><b>second</b></doc>");
    }

    #[test]
    fn named_symmetric_key_from_store() {
        let mut keys = KeysManager::new();
        keys.adopt_key(Key::symmetric(vec![5u8; 32]).with_name("shared"));
        let xml = "<doc><s>v</s></doc>";
        let encrypted = {
            let mut ctx = EncContext::new(&keys);
            ctx.set_session_key(Key::symmetric(vec![5u8; 32]));
            let doc = xseal_xml::parse(xml).unwrap();
            let target = doc.root_element().first_element_child().unwrap().id();
            encrypt(&mut ctx, xml, target, &template("<ds:KeyName>shared</ds:KeyName>")).unwrap()
        };

        let mut ctx = EncContext::new(&keys);
        let out = ctx.unit(|c| decrypt(c, &encrypted));
        assert_eq!(out.unwrap(), Decrypted::Replaced(xml.to_owned()));
        assert_eq!(ctx.session_key().unwrap().name.as_deref(), Some("shared"));
    }

    #[test]
    fn non_xml_type_returns_data() {
        let mut keys = KeysManager::new();
        keys.adopt_key(Key::symmetric(vec![5u8; 16]).with_name("k"));
        let cipher = xseal_crypto::cipher::from_uri(algorithm::AES128_CBC).unwrap();
        let ct = cipher.encrypt(&[5u8; 16], b"raw octets").unwrap();
        let xml = format!(
            r#"<xenc:EncryptedData xmlns:xenc="{enc}" xmlns:ds="{ds}"><xenc:EncryptionMethod Algorithm="{aes}"/><ds:KeyInfo><ds:KeyName>k</ds:KeyName></ds:KeyInfo><xenc:CipherData><xenc:CipherValue>{ct}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#,
            enc = ns::ENC,
            ds = ns::DSIG,
            aes = algorithm::AES128_CBC,
            ct = base64::engine::general_purpose::STANDARD.encode(ct),
        );
        let mut ctx = EncContext::new(&keys);
        assert_eq!(
            decrypt(&mut ctx, &xml).unwrap(),
            Decrypted::Data(b"raw octets".to_vec())
        );
    }

    #[test]
    fn without_key_material_decryption_fails() {
        let keys = private_store();
        let encrypted = encrypt_two(&keys, algorithm::RSA_PKCS1);
        let empty = KeysManager::new();
        let mut ctx = EncContext::new(&empty);
        assert!(matches!(
            decrypt(&mut ctx, &encrypted),
            Err(Error::KeyNotFound(_))
        ));
        assert!(matches!(
            decrypt(&mut ctx, "<doc/>"),
            Err(Error::MissingElement(_))
        ));
    }
}

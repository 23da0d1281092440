mod common;

use base64::Engine;
use common::{doc, key, scratch, text};
use xseal::{
    DecryptOptions, Destination, DocumentSource, EncAlgorithm, EncFormat, EncryptOptions, KeySource,
    Output, PublicKeySource, Status, Xsec,
};
use xseal_core::{algorithm, ns};

fn to_cert(xpaths: &[&str]) -> EncryptOptions {
    EncryptOptions {
        recipient: Some(PublicKeySource::Certificate(key("rsa-cert.pem"))),
        xpaths: xpaths.iter().map(|x| x.to_string()).collect(),
        ..EncryptOptions::default()
    }
}

fn with_key(name: &str) -> DecryptOptions {
    DecryptOptions {
        private_key: Some(KeySource::Pem(key(name))),
        ..DecryptOptions::default()
    }
}

fn encrypt_order(options: &EncryptOptions) -> String {
    text(
        Xsec::new()
            .encrypt(&DocumentSource::path(doc("order.xml")), &Destination::Memory, options)
            .unwrap(),
    )
}

fn decrypt_text(xml: &str, options: &DecryptOptions) -> xseal::Result<String> {
    Xsec::new()
        .decrypt(&DocumentSource::memory(xml), &Destination::Memory, options)
        .map(text)
}

fn count(xml: &str, local: &str) -> usize {
    let namespace = if local == "EncryptedData" || local == "EncryptedKey" {
        ns::ENC
    } else {
        ns::DSIG
    };
    xseal_xml::parse(xml)
        .unwrap()
        .descendants()
        .filter(|n| n.has_tag_name((namespace, local)))
        .count()
}

fn original() -> String {
    std::fs::read_to_string(doc("order.xml")).unwrap()
}

#[test]
fn root_round_trip() {
    let encrypted = encrypt_order(&to_cert(&[]));
    assert!(!encrypted.contains("Ada Lovelace"));
    assert!(encrypted.contains(algorithm::AES256_CBC));
    assert_eq!(count(&encrypted, "EncryptedData"), 1);
    assert!(xseal::is_encrypted_str(&encrypted));

    let decrypted = decrypt_text(&encrypted, &with_key("rsa-key.pem")).unwrap();
    assert_eq!(decrypted, original());
}

#[test]
fn content_round_trip() {
    let options = EncryptOptions {
        form: EncFormat::Content,
        algorithm: EncAlgorithm::Aes128Cbc,
        ..to_cert(&["//customer"])
    };
    let encrypted = encrypt_order(&options);
    assert!(encrypted.contains("<customer><xenc:EncryptedData"));
    assert!(encrypted.contains(ns::ENC_TYPE_CONTENT));
    assert!(encrypted.contains(algorithm::AES128_CBC));
    assert!(!encrypted.contains("ada@example.org"));
    assert!(encrypted.contains("Punched card reader"));

    let decrypted = decrypt_text(&encrypted, &with_key("rsa-key.pem")).unwrap();
    assert_eq!(decrypted, original());
}

#[test]
fn nested_matches_are_encrypted_once() {
    let encrypted = encrypt_order(&to_cert(&["//items | //item"]));
    assert_eq!(count(&encrypted, "EncryptedData"), 1);
    assert!(!encrypted.contains("<items>"));
    assert!(encrypted.contains("<customer>"));

    let decrypted = decrypt_text(&encrypted, &with_key("rsa-key.pem")).unwrap();
    assert_eq!(decrypted, original());
}

#[test]
fn session_key_is_wrapped_once() {
    let encrypted = encrypt_order(&to_cert(&["//customer", "//item", "//notes"]));
    assert_eq!(count(&encrypted, "EncryptedData"), 4);
    assert_eq!(count(&encrypted, "EncryptedKey"), 1);
    assert_eq!(count(&encrypted, "RetrievalMethod"), 3);

    let decrypted = decrypt_text(&encrypted, &with_key("rsa-key.pem")).unwrap();
    assert_eq!(count(&decrypted, "EncryptedData"), 0);
    assert_eq!(decrypted, original());
}

#[test]
fn later_expression_over_the_wrapped_key_wraps_it_again() {
    let encrypted = encrypt_order(&to_cert(&["//notes", "/order"]));
    let parsed = xseal_xml::parse(&encrypted).unwrap();
    assert!(parsed.root_element().has_tag_name((ns::ENC, "EncryptedData")));
    assert_eq!(count(&encrypted, "EncryptedKey"), 1);
    assert_eq!(count(&encrypted, "RetrievalMethod"), 0);

    let decrypted = decrypt_text(&encrypted, &with_key("rsa-key.pem")).unwrap();
    assert_eq!(decrypted, original());
}

#[test]
fn retrieval_outside_a_target_that_swallowed_the_key() {
    // <item>s carry the key first, then <items> hides it from <customer>.
    let encrypted = encrypt_order(&to_cert(&["//item", "//customer", "//items"]));
    assert_eq!(count(&encrypted, "EncryptedData"), 2);
    assert_eq!(count(&encrypted, "EncryptedKey"), 1);
    assert_eq!(count(&encrypted, "RetrievalMethod"), 1);

    let decrypted = decrypt_text(&encrypted, &with_key("rsa-key.pem")).unwrap();
    assert_eq!(decrypted, original());
}

#[test]
fn triple_des_and_pkcs12_recipient() {
    let options = EncryptOptions {
        algorithm: EncAlgorithm::TripleDesCbc,
        recipient: Some(PublicKeySource::Pkcs12(key("rsa.p12"))),
        key_password: Some("secret".into()),
        trust_selfsigned: true,
        ..to_cert(&["//notes"])
    };
    let encrypted = encrypt_order(&options);
    assert!(encrypted.contains(algorithm::TRIPLEDES_CBC));
    assert!(encrypted.contains("<ds:X509Certificate>"));

    let bundle = DecryptOptions {
        private_key: Some(KeySource::Pkcs12(key("rsa.p12"))),
        key_password: Some("secret".into()),
        trust_selfsigned: true,
    };
    assert_eq!(decrypt_text(&encrypted, &bundle).unwrap(), original());
}

#[test]
fn wrong_or_missing_key_fails_to_decrypt() {
    let encrypted = encrypt_order(&to_cert(&["//notes"]));
    let err = decrypt_text(&encrypted, &with_key("other-key.pem")).unwrap_err();
    assert_eq!(err.status_code(), -50);

    let err = decrypt_text(&encrypted, &DecryptOptions::default()).unwrap_err();
    assert_eq!(err.status_code(), -50);
}

#[test]
fn repeated_operations_keep_one_key_per_file() {
    let encrypted = encrypt_order(&to_cert(&["//notes"]));
    let mut xsec = Xsec::new();
    let source = DocumentSource::memory(encrypted.as_str());

    let err = xsec
        .decrypt(&source, &Destination::Memory, &with_key("other-key.pem"))
        .unwrap_err();
    assert_eq!(err.status_code(), -50);
    for _ in 0..2 {
        let out = xsec
            .decrypt(&source, &Destination::Memory, &with_key("rsa-key.pem"))
            .unwrap();
        assert_eq!(text(out), original());
    }
    assert_eq!(xsec.keys().keys().count(), 2);

    for _ in 0..2 {
        xsec.encrypt(&DocumentSource::path(doc("order.xml")), &Destination::Memory, &to_cert(&[]))
            .unwrap();
    }
    assert_eq!(xsec.keys().keys().count(), 3);
}

#[test]
fn files_in_and_out() {
    let dir = scratch(&["order.xml"]);
    let encrypted = dir.path().join("order.enc.xml");
    let decrypted = dir.path().join("order.dec.xml");

    let mut xsec = Xsec::new();
    xsec.encrypt(
        &DocumentSource::path(dir.path().join("order.xml")),
        &Destination::Path(encrypted.clone()),
        &to_cert(&["/order/items"]),
    )
    .unwrap();
    assert!(xseal::is_encrypted(&encrypted));
    assert!(!xseal::has_signature(&encrypted));

    xsec.decrypt(
        &DocumentSource::path(&encrypted),
        &Destination::Path(decrypted.clone()),
        &with_key("rsa-key.pem"),
    )
    .unwrap();
    assert_eq!(std::fs::read_to_string(&decrypted).unwrap(), original());
    assert!(!xseal::is_encrypted(&decrypted));
}

#[test]
fn encryption_failures_carry_status_codes() {
    let mut xsec = Xsec::new();
    let missing_file = xsec.encrypt(
        &DocumentSource::path(doc("no-such-document.xml")),
        &Destination::Memory,
        &to_cert(&[]),
    );
    assert_eq!(Status::from(&missing_file).code, -81);

    let bad_recipient = EncryptOptions {
        recipient: Some(PublicKeySource::Certificate(key("no-such-cert.pem"))),
        ..EncryptOptions::default()
    };
    let result = xsec.encrypt(&DocumentSource::memory("<doc/>"), &Destination::Memory, &bad_recipient);
    assert_eq!(Status::from(&result).code, -26);

    let bad_expression = xsec.encrypt(&DocumentSource::memory("<doc/>"), &Destination::Memory, &to_cert(&["/doc["]));
    assert_eq!(Status::from(&bad_expression).code, -30);

    let plain = xsec.decrypt(
        &DocumentSource::path(doc("order.xml")),
        &Destination::Memory,
        &with_key("rsa-key.pem"),
    );
    assert_eq!(Status::from(&plain).code, -12);
}

/// An EncryptedData for `payload`, its AES-128 key wrapped for rsa-cert.pem.
fn sealed(type_uri: Option<&str>, payload: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD;
    let session = xseal_crypto::cipher::generate_key(16);
    let ciphertext = xseal_crypto::cipher::from_uri(algorithm::AES128_CBC)
        .unwrap()
        .encrypt(&session, payload)
        .unwrap();
    let recipient = xseal_keys::loader::load_certificate_file(&key("rsa-cert.pem")).unwrap();
    let wrapped = xseal_crypto::keytransport::from_uri(algorithm::RSA_PKCS1)
        .unwrap()
        .encrypt(recipient.rsa_public_key().unwrap(), &session)
        .unwrap();
    let type_attr = type_uri.map(|t| format!(r#" Type="{t}""#)).unwrap_or_default();
    format!(
        r#"<xenc:EncryptedData xmlns:xenc="{enc}" xmlns:ds="{ds}"{type_attr}><xenc:EncryptionMethod Algorithm="{aes}"/><ds:KeyInfo><xenc:EncryptedKey><xenc:EncryptionMethod Algorithm="{rsa}"/><xenc:CipherData><xenc:CipherValue>{key}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedKey></ds:KeyInfo><xenc:CipherData><xenc:CipherValue>{data}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#,
        enc = ns::ENC,
        ds = ns::DSIG,
        aes = algorithm::AES128_CBC,
        rsa = algorithm::RSA_PKCS1,
        key = b64.encode(wrapped),
        data = b64.encode(ciphertext),
    )
}

#[test]
fn binary_data_is_returned_as_is() {
    let payload = [0u8, 159, 146, 150, 255, 10];
    let xml = format!("<box>{}</box>", sealed(None, &payload));
    let out = Xsec::new()
        .decrypt(&DocumentSource::memory(xml.as_str()), &Destination::Memory, &with_key("rsa-key.pem"))
        .unwrap();
    assert!(matches!(out, Output::Memory(ref bytes) if bytes == &payload));

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("payload.bin");
    let out = Xsec::new()
        .decrypt(
            &DocumentSource::memory(xml.as_str()),
            &Destination::Path(target.clone()),
            &with_key("rsa-key.pem"),
        )
        .unwrap();
    assert!(matches!(out, Output::Path(ref p) if p == &target));
    assert_eq!(std::fs::read(&target).unwrap(), payload);
}

#[test]
fn binary_data_after_replacements_ends_decryption() {
    let xml = format!(
        "<box>{}{}</box>",
        sealed(Some(ns::ENC_TYPE_ELEMENT), b"<note>first</note>"),
        sealed(Some("http://www.isi.edu/in-notes/iana/assignments/media-types/text/plain"), b"second"),
    );
    let out = Xsec::new()
        .decrypt(&DocumentSource::memory(xml.as_str()), &Destination::Memory, &with_key("rsa-key.pem"))
        .unwrap();
    assert_eq!(text(out), "second");
}

#[test]
fn empty_plaintext_is_an_error() {
    let xml = format!("<box>{}</box>", sealed(None, b""));
    let result = Xsec::new().decrypt(
        &DocumentSource::memory(xml.as_str()),
        &Destination::Memory,
        &with_key("rsa-key.pem"),
    );
    assert_eq!(Status::from(&result).code, -51);
}

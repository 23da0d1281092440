#![forbid(unsafe_code)]

//! Encrypt orchestration: adopt the recipient, generate the session key and
//! encrypt every selected target, wrapping the session key only once.

use roxmltree::NodeId;
use xseal_core::ns::{self, node};
use xseal_enc::EncContext;
use xseal_keys::{Key, KeysManager};

use crate::builder::{self, RecipientInfo, SessionKeyRef, SESSION_KEY_NAME};
use crate::config::{Defaults, OrDefault};
use crate::document;
use crate::error::{Result, XsecError};
use crate::material;
use crate::options::{Destination, DocumentSource, EncFormat, EncryptOptions, Output};
use crate::resolver;

pub(crate) fn encrypt(
    keys: &mut KeysManager,
    defaults: &Defaults,
    source: &DocumentSource,
    destination: &Destination,
    options: &EncryptOptions,
) -> Result<Output> {
    let recipient_source = options.recipient.as_ref().ok_or(XsecError::MissingPublicKey)?;
    let form = options.form.or_default_to(defaults.enc_form);
    let cipher = options.algorithm.or_default_to(defaults.cipher);
    let (cipher_uri, key_size) = resolver::cipher_uri(cipher)
        .zip(resolver::cipher_key_size(cipher))
        .ok_or_else(|| XsecError::Template("no cipher algorithm resolved".into()))?;
    let type_uri = match form {
        EncFormat::Content => ns::ENC_TYPE_CONTENT,
        EncFormat::Element | EncFormat::Root | EncFormat::Unset => ns::ENC_TYPE_ELEMENT,
    };

    let loaded = document::load(source)?;

    let recipient_name = recipient_source.path().display().to_string();
    let recipient = material::load_public_key(recipient_source, options.key_password.as_deref())?;
    if options.trust_selfsigned {
        material::register_certificates(keys, &recipient, true);
    }
    keys.adopt_key(recipient.with_name(recipient_name.clone()));
    let info = if recipient_source.has_certificates() {
        RecipientInfo::X509Data
    } else {
        RecipientInfo::KeyValue
    };

    let session = xseal_crypto::cipher::generate_key(key_size);
    tracing::info!(%form, %cipher, targets = options.xpaths.len(), "encrypting document");

    let mut ctx = EncContext::new(keys);
    ctx.set_session_key(Key::symmetric(session).with_name(SESSION_KEY_NAME));

    let mut job = Job {
        text: loaded.text,
        wrapped: false,
        type_uri,
        cipher_uri,
        recipient: &recipient_name,
        info,
    };
    if options.xpaths.is_empty() {
        let root = {
            let doc = xseal_xml::parse(&job.text).map_err(XsecError::Parse)?;
            doc.root_element().id()
        };
        job.encrypt_target(&mut ctx, root)?;
    } else {
        for expr in &options.xpaths {
            let targets = {
                let doc = xseal_xml::parse(&job.text)
                    .map_err(|e| XsecError::Encrypt(document::reparse_error(e)))?;
                builder::select_targets(&doc, expr)?
            };
            tracing::debug!(expr = %expr, count = targets.len(), "selected encryption targets");
            for target in targets {
                job.encrypt_target(&mut ctx, target)?;
            }
        }
    }

    document::store(destination, job.text.into_bytes())
}

/// The document being encrypted and whether the session key has been
/// wrapped into it yet.
struct Job<'r> {
    text: String,
    wrapped: bool,
    type_uri: &'static str,
    cipher_uri: &'static str,
    recipient: &'r str,
    info: RecipientInfo,
}

impl Job<'_> {
    fn encrypt_target(&mut self, ctx: &mut EncContext<'_>, target: NodeId) -> Result<()> {
        let key_ref = if self.wrapped && !self.swallows_wrapped_key(target)? {
            SessionKeyRef::Retrieval
        } else {
            SessionKeyRef::Wrapped {
                recipient: self.recipient,
                info: self.info,
            }
        };
        let template = builder::encrypted_data_template(self.type_uri, self.cipher_uri, key_ref);
        let text = &self.text;
        let next = ctx
            .unit(|c| xseal_enc::encrypt(c, text, target, &template))
            .map_err(XsecError::Encrypt)?;
        self.text = next;
        self.wrapped = true;
        Ok(())
    }

    /// Whether `target` holds the visible `EncryptedKey`.  Encrypting it
    /// hides the key from every `RetrievalMethod`, so the target wraps the
    /// same session key again under the same Id.
    fn swallows_wrapped_key(&self, target: NodeId) -> Result<bool> {
        let doc = xseal_xml::parse(&self.text)
            .map_err(|e| XsecError::Encrypt(document::reparse_error(e)))?;
        let Some(node) = doc.get_node(target) else {
            return Ok(false);
        };
        let swallows = node.descendants().any(|n| {
            n.has_tag_name((ns::ENC, node::ENCRYPTED_KEY))
                && n.attribute(ns::attr::ID) == Some(SESSION_KEY_NAME)
        });
        if swallows {
            tracing::debug!("target contains the wrapped session key; wrapping it again");
        }
        Ok(swallows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use crate::options::PublicKeySource;

    fn keys_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-data/keys")
    }

    fn encrypt_text(xml: &str, options: &EncryptOptions) -> Result<String> {
        let mut keys = KeysManager::new();
        let out = encrypt(
            &mut keys,
            &Defaults::default(),
            &DocumentSource::memory(xml),
            &Destination::Memory,
            options,
        )?;
        Ok(out.as_text().unwrap().to_owned())
    }

    fn with_cert(xpaths: &[&str]) -> EncryptOptions {
        EncryptOptions {
            recipient: Some(PublicKeySource::Certificate(keys_dir().join("rsa-cert.pem"))),
            xpaths: xpaths.iter().map(|s| s.to_string()).collect(),
            ..EncryptOptions::default()
        }
    }

    #[test]
    fn recipient_is_required() {
        let err = encrypt_text("<doc/>", &EncryptOptions::default()).unwrap_err();
        assert_eq!(err.status_code(), -21);
    }

    #[test]
    fn root_is_encrypted_without_targets() {
        let out = encrypt_text("<doc><secret>1</secret></doc>", &with_cert(&[])).unwrap();
        let doc = xseal_xml::parse(&out).unwrap();
        let root = doc.root_element();
        assert!(root.has_tag_name((ns::ENC, "EncryptedData")));
        assert_eq!(root.attribute("Type"), Some(ns::ENC_TYPE_ELEMENT));
        assert!(!out.contains("secret"));
        assert!(out.contains("<ds:X509Data><ds:X509Certificate>"));
    }

    #[test]
    fn key_is_wrapped_once_across_expressions() {
        let xml = "<doc><a>1</a><b>2</b><c>3</c></doc>";
        let out = encrypt_text(xml, &with_cert(&["//a | //b", "//c"])).unwrap();
        assert_eq!(out.matches("<xenc:EncryptedKey").count(), 1);
        assert_eq!(out.matches("<ds:RetrievalMethod").count(), 2);
        assert_eq!(out.matches("<xenc:EncryptedData").count(), 3);
        // The last <b> match is encrypted first and carries the wrapped key.
        let doc = xseal_xml::parse(&out).unwrap();
        let second = doc
            .descendants()
            .filter(|n| n.has_tag_name((ns::ENC, "EncryptedData")))
            .nth(1)
            .unwrap();
        assert!(second
            .descendants()
            .any(|n| n.has_tag_name((ns::ENC, "EncryptedKey"))));
    }

    #[test]
    fn content_form_and_bad_expressions() {
        let mut options = with_cert(&["/doc/a"]);
        options.form = EncFormat::Content;
        let out = encrypt_text("<doc><a x=\"1\">text</a></doc>", &options).unwrap();
        assert!(out.starts_with("<doc><a x=\"1\"><xenc:EncryptedData"));

        let err = encrypt_text("<doc/>", &with_cert(&["/doc["])).unwrap_err();
        assert_eq!(err.status_code(), -30);
    }

    #[test]
    fn bare_public_key_recipient_gets_key_value() {
        let options = EncryptOptions {
            recipient: Some(PublicKeySource::Pem(keys_dir().join("rsa-pub.pem"))),
            ..EncryptOptions::default()
        };
        let out = encrypt_text("<doc/>", &options).unwrap();
        assert!(out.contains("<ds:KeyValue><ds:RSAKeyValue>"));
    }
}

#![forbid(unsafe_code)]

//! Decrypt orchestration: adopt the private key, then decrypt
//! EncryptedData elements until none are left.

use xseal_enc::{Decrypted, EncContext};
use xseal_keys::KeysManager;

use crate::document;
use crate::error::{Result, XsecError};
use crate::material;
use crate::options::{DecryptOptions, Destination, DocumentSource, KeySource, Output};

pub(crate) fn decrypt(
    keys: &mut KeysManager,
    source: &DocumentSource,
    destination: &Destination,
    options: &DecryptOptions,
) -> Result<Output> {
    let loaded = document::load(source)?;
    if let Some(private) = &options.private_key {
        let key = material::load_private_key(private, options.key_password.as_deref())?;
        if matches!(private, KeySource::Pkcs12(_)) && options.trust_selfsigned {
            material::register_certificates(keys, &key, true);
        }
        keys.adopt_key(key.with_name(private.path().display().to_string()));
    }

    if !has_encrypted_data(&loaded.text)? {
        return Err(XsecError::NoEncryptedData);
    }

    let mut ctx = EncContext::new(keys);
    let mut text = loaded.text;
    let mut replaced = 0usize;
    while has_encrypted_data(&text)? {
        let current = &text;
        let decrypted = ctx
            .unit(|c| xseal_enc::decrypt(c, current))
            .map_err(XsecError::Decrypt)?;
        match decrypted {
            Decrypted::Replaced(next) => {
                replaced += 1;
                tracing::debug!(iteration = replaced, "replaced EncryptedData");
                text = next;
            }
            Decrypted::Data(bytes) => {
                if bytes.is_empty() {
                    return Err(XsecError::EmptyResult);
                }
                if replaced > 0 {
                    tracing::warn!(
                        replaced,
                        "binary result ends decryption; the partly decrypted document is discarded"
                    );
                }
                tracing::info!(bytes = bytes.len(), "decrypted binary data");
                return document::store(destination, bytes);
            }
        }
    }

    tracing::info!(replaced, "decrypted document");
    document::store(destination, text.into_bytes())
}

fn has_encrypted_data(text: &str) -> Result<bool> {
    let doc = xseal_xml::parse(text).map_err(|e| XsecError::Decrypt(document::reparse_error(e)))?;
    Ok(xseal_enc::find_encrypted_data(&doc).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_documents_have_nothing_to_decrypt() {
        let mut keys = KeysManager::new();
        let err = decrypt(
            &mut keys,
            &DocumentSource::memory("<doc/>"),
            &Destination::Memory,
            &DecryptOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.status_code(), -12);
    }

    #[test]
    fn missing_key_material_fails_with_decrypt_code() {
        let xml = format!(
            r#"<doc><xenc:EncryptedData xmlns:xenc="{enc}" Type="{ty}"><xenc:EncryptionMethod Algorithm="{aes}"/><xenc:CipherData><xenc:CipherValue>AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData></doc>"#,
            enc = xseal_core::ns::ENC,
            ty = xseal_core::ns::ENC_TYPE_ELEMENT,
            aes = xseal_core::algorithm::AES128_CBC,
        );
        let mut keys = KeysManager::new();
        let err = decrypt(
            &mut keys,
            &DocumentSource::memory(xml),
            &Destination::Memory,
            &DecryptOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.status_code(), -50);
    }
}

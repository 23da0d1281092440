#![forbid(unsafe_code)]

//! Cheap structural checks.  Unreadable or malformed input is reported as
//! `false`, never as an error.

use std::path::Path;

use xseal_core::ns;
use xseal_xml::document::is_element;

fn contains(text: &str, namespace: &str, local: &str) -> bool {
    match xseal_xml::parse(text) {
        Ok(doc) => doc.descendants().any(|n| is_element(&n, namespace, local)),
        Err(e) => {
            tracing::debug!(error = %e, "document does not parse");
            false
        }
    }
}

fn inspect_file(path: &Path, namespace: &str, local: &str) -> bool {
    match std::fs::read_to_string(path) {
        Ok(text) => contains(&text, namespace, local),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "cannot read file");
            false
        }
    }
}

/// Whether the file holds a `ds:Signature` element.
pub fn has_signature(path: impl AsRef<Path>) -> bool {
    inspect_file(path.as_ref(), ns::DSIG, ns::node::SIGNATURE)
}

/// Whether the file holds an `xenc:EncryptedData` element.
pub fn is_encrypted(path: impl AsRef<Path>) -> bool {
    inspect_file(path.as_ref(), ns::ENC, ns::node::ENCRYPTED_DATA)
}

pub fn has_signature_str(text: &str) -> bool {
    contains(text, ns::DSIG, ns::node::SIGNATURE)
}

pub fn is_encrypted_str(text: &str) -> bool {
    contains(text, ns::ENC, ns::node::ENCRYPTED_DATA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_on_text() {
        let signed = format!(r#"<doc><ds:Signature xmlns:ds="{}"/></doc>"#, ns::DSIG);
        assert!(has_signature_str(&signed));
        assert!(!is_encrypted_str(&signed));

        let encrypted = format!(r#"<xenc:EncryptedData xmlns:xenc="{}"/>"#, ns::ENC);
        assert!(is_encrypted_str(&encrypted));
        assert!(!has_signature_str(&encrypted));

        // Right local name, wrong namespace.
        assert!(!has_signature_str("<doc><Signature/></doc>"));
        assert!(!has_signature_str("<doc>"));
    }

    #[test]
    fn checks_on_files() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.xml");
        std::fs::write(&plain, "<doc/>").unwrap();
        assert!(!has_signature(&plain));
        assert!(!is_encrypted(&plain));
        assert!(!is_encrypted(dir.path().join("missing.xml")));
    }
}

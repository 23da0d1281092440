#![forbid(unsafe_code)]

//! Reference URI dereferencing.
//!
//! Handles:
//! - `""`: the whole document without comments
//! - `#xpointer(/)`: the whole document with comments
//! - `#id` and `#xpointer(id('id'))`: the element with that ID and its
//!   subtree (comments only kept for the XPointer form)
//! - anything else: a local file, relative to a base directory, read as octets

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use roxmltree::{Document, NodeId};
use xseal_core::Error;
use xseal_xml::xpath;
use xseal_xml::NodeSet;

use crate::pipeline::TransformData;

/// Dereference `uri` against the document `doc` parsed from `xml_text`.
pub fn resolve_uri(
    uri: &str,
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
    xml_text: &str,
    base_dir: Option<&Path>,
) -> Result<TransformData, Error> {
    if uri.is_empty() {
        return Ok(TransformData::Xml {
            xml_text: xml_text.to_owned(),
            node_set: Some(NodeSet::all_without_comments(doc)),
        });
    }

    if let Some(fragment) = xpath::parse_same_document_ref(uri) {
        let node_set = resolve_fragment(fragment, doc, id_map)?;
        return Ok(TransformData::Xml {
            xml_text: xml_text.to_owned(),
            node_set: Some(node_set),
        });
    }

    tracing::debug!(uri, "reading external reference");
    Ok(TransformData::Binary(read_external(uri, base_dir)?))
}

/// Node set selected by a same-document fragment (the part after `#`).
pub fn resolve_fragment(
    fragment: &str,
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
) -> Result<NodeSet, Error> {
    if fragment == "xpointer(/)" {
        return Ok(NodeSet::all(doc));
    }
    if let Some(id) = xpath::parse_xpointer_id(fragment) {
        let node = xpath::resolve_id(doc, id_map, id)?;
        return Ok(NodeSet::tree(node, true));
    }
    if fragment.starts_with("xpointer(") {
        return Err(Error::InvalidUri(format!(
            "unsupported XPointer expression: #{fragment}"
        )));
    }
    let node = xpath::resolve_id(doc, id_map, fragment)?;
    Ok(NodeSet::tree(node, false))
}

/// Map a non-fragment URI onto a local path.
///
/// `file:` URLs are taken literally; other schemes are not fetched.
/// Relative paths are joined onto `base_dir` when one is given.
pub fn external_path(uri: &str, base_dir: Option<&Path>) -> Result<PathBuf, Error> {
    let path = if let Some(rest) = uri.strip_prefix("file://") {
        // file:///abs/path and file://localhost/abs/path
        PathBuf::from(rest.strip_prefix("localhost").unwrap_or(rest))
    } else if let Some(rest) = uri.strip_prefix("file:") {
        PathBuf::from(rest)
    } else if has_scheme(uri) {
        return Err(Error::InvalidUri(format!("remote URI not supported: {uri}")));
    } else {
        PathBuf::from(uri)
    };

    Ok(match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    })
}

/// Read the resource an external reference URI points at.
pub fn read_external(uri: &str, base_dir: Option<&Path>) -> Result<Vec<u8>, Error> {
    let path = external_path(uri, base_dir)?;
    std::fs::read(&path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}

/// Turn a base URL (`file:` URL or plain path) into a directory.  A value
/// naming a file resolves to the file's directory.
pub fn base_dir_of(base_url: &str) -> Result<PathBuf, Error> {
    let path = external_path(base_url, None)?;
    if base_url.ends_with('/') || path.is_dir() {
        Ok(path)
    } else {
        Ok(path.parent().map(Path::to_path_buf).unwrap_or_default())
    }
}

fn has_scheme(uri: &str) -> bool {
    match uri.split_once(':') {
        // Single letters are Windows drive names, not schemes.
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<doc><!-- top --><item Id="i1">a<!-- inner --></item></doc>"#;

    fn resolve(uri: &str, base: Option<&Path>) -> Result<Vec<u8>, Error> {
        let doc = xseal_xml::parse(DOC).unwrap();
        let ids = xseal_xml::document::build_id_map(&doc, &[]);
        resolve_uri(uri, &doc, &ids, DOC, base)?.into_binary()
    }

    #[test]
    fn whole_document_without_comments() {
        assert_eq!(resolve("", None).unwrap(), br#"<doc><item Id="i1">a</item></doc>"#);
    }

    #[test]
    fn same_document_id_forms() {
        assert_eq!(resolve("#i1", None).unwrap(), br#"<item Id="i1">a</item>"#);
        // Comments survive only in the node set; the default c14n drops them.
        assert_eq!(
            resolve("#xpointer(id('i1'))", None).unwrap(),
            br#"<item Id="i1">a</item>"#
        );
        assert!(matches!(resolve("#nope", None), Err(Error::InvalidUri(_))));
        assert!(resolve("#xpointer(//item)", None).is_err());
    }

    #[test]
    fn xpointer_root_keeps_comments_in_node_set() {
        let doc = xseal_xml::parse(DOC).unwrap();
        let ids = xseal_xml::document::build_id_map(&doc, &[]);
        let all = resolve_fragment("xpointer(/)", &doc, &ids).unwrap();
        let bare = resolve_fragment("i1", &doc, &ids).unwrap();
        assert!(all.len() > NodeSet::all_without_comments(&doc).len());
        assert!(bare.nodes_in_order(&doc).iter().all(|n| !n.is_comment()));
    }

    #[test]
    fn external_files_are_read_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), b"payload").unwrap();

        assert_eq!(resolve("data.txt", Some(dir.path())).unwrap(), b"payload");
        let url = format!("file://{}", dir.path().join("data.txt").display());
        assert_eq!(resolve(&url, None).unwrap(), b"payload");
        assert!(resolve("data.txt", None).is_err());
    }

    #[test]
    fn remote_schemes_are_refused() {
        assert!(matches!(
            external_path("https://example.org/doc.xml", None),
            Err(Error::InvalidUri(_))
        ));
        assert_eq!(
            external_path("c:relative", Some(Path::new("/base"))).unwrap(),
            PathBuf::from("/base/c:relative")
        );
    }

    #[test]
    fn base_url_of_a_file_is_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.xml");
        assert_eq!(base_dir_of(&file.display().to_string()).unwrap(), dir.path());
        let slashed = format!("{}/", dir.path().display());
        assert_eq!(base_dir_of(&slashed).unwrap(), dir.path());
    }
}

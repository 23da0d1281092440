#![forbid(unsafe_code)]

//! ID maps and element/attribute name helpers over `roxmltree`.

use std::collections::HashMap;

/// Attribute names treated as IDs without any registration.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

/// Build an ID map over the default ID attribute names plus `extra`.
///
/// The first element carrying a given ID value wins.
pub fn build_id_map(
    doc: &roxmltree::Document<'_>,
    extra: &[String],
) -> HashMap<String, roxmltree::NodeId> {
    let mut map = HashMap::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        for attr in node.attributes() {
            let name = attr.name();
            let registered = DEFAULT_ID_ATTRS.contains(&name) || extra.iter().any(|e| e == name);
            if registered {
                map.entry(attr.value().to_owned()).or_insert(node.id());
            }
        }
    }
    map
}

/// Is `node` an element with the given namespace and local name?
pub fn is_element(node: &roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// First child element with the given namespace and local name.
pub fn child_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|c| is_element(c, ns, local_name))
}

/// All child elements with the given namespace and local name.
pub fn child_elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(|c| is_element(c, ns, local_name))
        .collect()
}

/// Concatenated text content of an element, trimmed.
pub fn text_content(node: roxmltree::Node<'_, '_>) -> String {
    let mut out = String::new();
    for d in node.descendants().filter(|d| d.is_text()) {
        out.push_str(d.text().unwrap_or(""));
    }
    out.trim().to_owned()
}

/// The qualified name of an element as written in the source (`prefix:local`).
pub fn element_qname<'input>(node: &roxmltree::Node<'_, 'input>) -> &'input str {
    let text = node.document().input_text();
    let start = node.range().start + 1;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// The prefix of an element as written in the source, if any.
pub fn element_prefix<'input>(node: &roxmltree::Node<'_, 'input>) -> Option<&'input str> {
    element_qname(node).split_once(':').map(|(p, _)| p)
}

/// The qualified name of an attribute as written in the source.
pub fn attribute_qname<'input>(
    doc: &roxmltree::Document<'input>,
    attr: &roxmltree::Attribute<'_, 'input>,
) -> &'input str {
    &doc.input_text()[attr.range_qname()]
}

/// The prefix of an attribute as written in the source, if any.
pub fn attribute_prefix<'input>(
    doc: &roxmltree::Document<'input>,
    attr: &roxmltree::Attribute<'_, 'input>,
) -> Option<&'input str> {
    attribute_qname(doc, attr).split_once(':').map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_map_default_and_extra_attrs() {
        let xml = r#"<root><a Id="one"/><b id="two"/><c ref="three"/><d Id="one"/></root>"#;
        let doc = crate::parse(xml).unwrap();
        let map = build_id_map(&doc, &[]);
        assert!(map.contains_key("two"));
        assert!(!map.contains_key("three"));
        // First occurrence wins.
        let first = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        assert_eq!(map["one"], first.id());

        let map = build_id_map(&doc, &["ref".to_owned()]);
        assert!(map.contains_key("three"));
    }

    #[test]
    fn test_qualified_names_from_source() {
        let xml = r#"<p:root xmlns:p="urn:p" p:attr="1"><child/></p:root>"#;
        let doc = crate::parse(xml).unwrap();
        let root = doc.root_element();
        assert_eq!(element_qname(&root), "p:root");
        assert_eq!(element_prefix(&root), Some("p"));
        let attr = root.attributes().next().unwrap();
        assert_eq!(attribute_qname(&doc, &attr), "p:attr");
        let child = root.first_element_child().unwrap();
        assert_eq!(element_qname(&child), "child");
        assert_eq!(element_prefix(&child), None);
    }

    #[test]
    fn test_child_lookup_by_namespace() {
        let doc = crate::parse(r#"<r xmlns:x="urn:x"><x:a/><a/><x:a/></r>"#).unwrap();
        let root = doc.root_element();
        assert_eq!(child_elements(root, "urn:x", "a").len(), 2);
        assert!(child_element(root, "", "a").is_some());
        assert!(child_element(root, "urn:y", "a").is_none());
    }

    #[test]
    fn test_text_content_trims() {
        let doc = crate::parse("<a>\n  abc<b>def</b>\n</a>").unwrap();
        assert_eq!(text_content(doc.root_element()), "abcdef");
    }
}

#![forbid(unsafe_code)]

//! `<Reference>` processing shared by signing and verification:
//! dereference the URI, run the transforms, digest the result.

use std::collections::HashMap;
use std::path::Path;

use roxmltree::{Document, Node, NodeId};
use xseal_c14n::C14nMode;
use xseal_core::{algorithm, ns, Error};
use xseal_transforms::base64_transform::Base64DecodeTransform;
use xseal_transforms::enveloped::EnvelopedSignatureTransform;
use xseal_transforms::xpath_filter::XPathFilter2Transform;
use xseal_transforms::{uri, C14nTransform, Transform, TransformPipeline};
use xseal_xml::document::{child_element, child_elements, is_element};

/// The `Algorithm` attribute of the `ns:local` child of `parent`.
pub(crate) fn child_algorithm<'a>(
    parent: Node<'a, '_>,
    namespace: &str,
    local: &str,
) -> Result<&'a str, Error> {
    child_element(parent, namespace, local)
        .ok_or_else(|| Error::MissingElement(local.into()))?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {local}")))
}

/// `PrefixList` of an `ec:InclusiveNamespaces` child, if any.
pub fn read_inclusive_prefixes(node: Node<'_, '_>) -> Vec<String> {
    node.children()
        .find(|n| is_element(n, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES))
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Build the transform for one `<Transform>` element.
pub fn build_transform(
    transform: Node<'_, '_>,
    signature: Node<'_, '_>,
) -> Result<Box<dyn Transform>, Error> {
    let uri = transform
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;

    if let Some(mode) = C14nMode::from_uri(uri) {
        return Ok(Box::new(C14nTransform::new(
            mode,
            read_inclusive_prefixes(transform),
        )));
    }
    match uri {
        algorithm::ENVELOPED_SIGNATURE => {
            Ok(Box::new(EnvelopedSignatureTransform::from_node(signature)))
        }
        algorithm::XPATH2 => Ok(Box::new(XPathFilter2Transform::from_element(transform)?)),
        algorithm::BASE64 => Ok(Box::new(Base64DecodeTransform)),
        _ => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// Build the pipeline described by a reference's `<Transforms>`.
pub fn build_pipeline(
    reference: Node<'_, '_>,
    signature: Node<'_, '_>,
) -> Result<TransformPipeline, Error> {
    let mut pipeline = TransformPipeline::new();
    if let Some(transforms) = child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        for t in child_elements(transforms, ns::DSIG, ns::node::TRANSFORM) {
            pipeline.push(build_transform(t, signature)?);
        }
    }
    Ok(pipeline)
}

/// Dereference, transform and digest one `<Reference>`.
///
/// `doc` must be the parse of `xml_text`; `signature` is the enclosing
/// `<Signature>` in that same document.
pub fn compute_digest(
    reference: Node<'_, '_>,
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
    xml_text: &str,
    signature: Node<'_, '_>,
    base_dir: Option<&Path>,
) -> Result<Vec<u8>, Error> {
    let ref_uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let digest_uri = child_algorithm(reference, ns::DSIG, ns::node::DIGEST_METHOD)?;

    let pipeline = build_pipeline(reference, signature)?;
    let data = uri::resolve_uri(ref_uri, doc, id_map, xml_text, base_dir)?;
    let bytes = pipeline.execute(data)?.into_binary()?;
    tracing::debug!(
        uri = ref_uri,
        transforms = pipeline.len(),
        len = bytes.len(),
        "digesting reference"
    );
    xseal_crypto::digest::digest(digest_uri, &bytes)
}

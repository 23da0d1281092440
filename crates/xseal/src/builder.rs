#![forbid(unsafe_code)]

//! Signature and encryption templates, and encryption target selection.
//!
//! Templates are written without whitespace between elements so the
//! signed bytes are exactly the markup produced here.

use roxmltree::{Document, NodeId};
use xseal_core::{algorithm, ns, Error as CoreError};
use xseal_xml::xpath::{is_ancestor_or_self, Evaluator, XNode};
use xseal_xml::XmlWriter;

use crate::error::{Result, XsecError};

const DS_SIGNATURE: &str = "ds:Signature";
const DS_SIGNED_INFO: &str = "ds:SignedInfo";
const DS_REFERENCE: &str = "ds:Reference";
const DS_TRANSFORMS: &str = "ds:Transforms";
const DS_TRANSFORM: &str = "ds:Transform";
const DS_KEY_INFO: &str = "ds:KeyInfo";
const DS_KEY_NAME: &str = "ds:KeyName";
const XENC_ENCRYPTED_DATA: &str = "xenc:EncryptedData";
const XENC_ENCRYPTED_KEY: &str = "xenc:EncryptedKey";
const XENC_ENCRYPTION_METHOD: &str = "xenc:EncryptionMethod";
const XENC_CIPHER_DATA: &str = "xenc:CipherData";
const XENC_CIPHER_VALUE: &str = "xenc:CipherValue";
const XPATH2_XPATH: &str = "dsig-xpath:XPath";

/// Name of the session key, and `Id` of the one EncryptedKey wrapping it.
pub const SESSION_KEY_NAME: &str = "key0";

/// What `ds:KeyInfo` announces about the signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInfoPlan {
    /// Nothing; the verifier has the key out of band.
    Empty,
    X509Data,
    KeyValue,
}

/// One `ds:Reference` with its transforms, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePlan {
    pub uri: String,
    pub digest_uri: &'static str,
    pub enveloped: bool,
    /// `(Filter, expression)` pairs: intersect, subtract, union.
    pub filters: Vec<(&'static str, String)>,
    pub c14n_uri: Option<&'static str>,
}

impl ReferencePlan {
    pub fn new(uri: impl Into<String>, digest_uri: &'static str) -> Self {
        Self {
            uri: uri.into(),
            digest_uri,
            enveloped: false,
            filters: Vec::new(),
            c14n_uri: None,
        }
    }

    /// Add the XPath Filter 2.0 steps.  Nothing is added unless `intersect`
    /// or `subtract` is present; `union` then rides along.
    pub fn with_filters(mut self, intersect: &str, subtract: &str, union: &str) -> Self {
        if intersect.is_empty() && subtract.is_empty() {
            return self;
        }
        for (filter, expr) in [
            (ns::XPATH2_FILTER_INTERSECT, intersect),
            (ns::XPATH2_FILTER_SUBTRACT, subtract),
            (ns::XPATH2_FILTER_UNION, union),
        ] {
            if !expr.is_empty() {
                self.filters.push((filter, expr.to_owned()));
            }
        }
        self
    }

    fn has_transforms(&self) -> bool {
        self.enveloped || !self.filters.is_empty() || self.c14n_uri.is_some()
    }
}

/// Everything a `ds:Signature` template is built from.
#[derive(Debug, Clone)]
pub struct SignaturePlan {
    pub c14n_uri: &'static str,
    pub signature_uri: &'static str,
    pub references: Vec<ReferencePlan>,
    pub key_info: KeyInfoPlan,
    /// `(Id, markup)` of each enveloping `ds:Object`.
    pub objects: Vec<(String, String)>,
}

/// Object `Id` of the `index`th enveloped object.
pub fn object_id(index: usize) -> String {
    format!("res{index}")
}

/// Write the `ds:Signature` template.  DigestValue and SignatureValue are
/// left empty, KeyInfo holds at most an empty placeholder.
pub fn signature_template(plan: &SignaturePlan) -> String {
    let mut w = XmlWriter::new();
    w.start_element(DS_SIGNATURE, &[("xmlns:ds", ns::DSIG)]);
    w.start_element(DS_SIGNED_INFO, &[]);
    w.empty_element("ds:CanonicalizationMethod", &[(ns::attr::ALGORITHM, plan.c14n_uri)]);
    w.empty_element("ds:SignatureMethod", &[(ns::attr::ALGORITHM, plan.signature_uri)]);
    for reference in &plan.references {
        write_reference(&mut w, reference);
    }
    w.end_element(DS_SIGNED_INFO);
    w.empty_element("ds:SignatureValue", &[]);

    match plan.key_info {
        KeyInfoPlan::Empty => w.empty_element(DS_KEY_INFO, &[]),
        KeyInfoPlan::X509Data => {
            w.start_element(DS_KEY_INFO, &[]);
            w.empty_element("ds:X509Data", &[]);
            w.end_element(DS_KEY_INFO);
        }
        KeyInfoPlan::KeyValue => {
            w.start_element(DS_KEY_INFO, &[]);
            w.empty_element("ds:KeyValue", &[]);
            w.end_element(DS_KEY_INFO);
        }
    }

    for (id, markup) in &plan.objects {
        w.start_element("ds:Object", &[(ns::attr::ID, id)]);
        w.write_raw(markup);
        w.end_element("ds:Object");
    }
    w.end_element(DS_SIGNATURE);
    w.into_string()
}

fn write_reference(w: &mut XmlWriter, reference: &ReferencePlan) {
    w.start_element(DS_REFERENCE, &[(ns::attr::URI, &reference.uri)]);
    if reference.has_transforms() {
        w.start_element(DS_TRANSFORMS, &[]);
        if reference.enveloped {
            w.empty_element(DS_TRANSFORM, &[(ns::attr::ALGORITHM, algorithm::ENVELOPED_SIGNATURE)]);
        }
        if !reference.filters.is_empty() {
            w.start_element(DS_TRANSFORM, &[(ns::attr::ALGORITHM, algorithm::XPATH2)]);
            for (filter, expr) in &reference.filters {
                w.text_element(
                    XPATH2_XPATH,
                    &[("xmlns:dsig-xpath", ns::XPATH2), (ns::attr::FILTER, filter)],
                    expr,
                );
            }
            w.end_element(DS_TRANSFORM);
        }
        if let Some(c14n) = reference.c14n_uri {
            w.empty_element(DS_TRANSFORM, &[(ns::attr::ALGORITHM, c14n)]);
        }
        w.end_element(DS_TRANSFORMS);
    }
    w.empty_element("ds:DigestMethod", &[(ns::attr::ALGORITHM, reference.digest_uri)]);
    w.empty_element("ds:DigestValue", &[]);
    w.end_element(DS_REFERENCE);
}

/// Key material announced inside the wrapped key's KeyInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientInfo {
    X509Data,
    KeyValue,
}

/// How an EncryptedData finds its session key.
#[derive(Debug, Clone, Copy)]
pub enum SessionKeyRef<'a> {
    /// Wrap it here for the recipient stored under `recipient`.
    Wrapped {
        recipient: &'a str,
        info: RecipientInfo,
    },
    /// Point at the EncryptedKey of an earlier target.
    Retrieval,
}

/// Write an `xenc:EncryptedData` template of the given `Type`.
pub fn encrypted_data_template(type_uri: &str, cipher_uri: &str, key_ref: SessionKeyRef<'_>) -> String {
    let mut w = XmlWriter::new();
    w.start_element(
        XENC_ENCRYPTED_DATA,
        &[("xmlns:xenc", ns::ENC), (ns::attr::TYPE, type_uri)],
    );
    w.empty_element(XENC_ENCRYPTION_METHOD, &[(ns::attr::ALGORITHM, cipher_uri)]);
    w.start_element(DS_KEY_INFO, &[("xmlns:ds", ns::DSIG)]);
    w.text_element(DS_KEY_NAME, &[], SESSION_KEY_NAME);
    match key_ref {
        SessionKeyRef::Wrapped { recipient, info } => {
            w.start_element(XENC_ENCRYPTED_KEY, &[(ns::attr::ID, SESSION_KEY_NAME)]);
            w.empty_element(XENC_ENCRYPTION_METHOD, &[(ns::attr::ALGORITHM, algorithm::RSA_PKCS1)]);
            w.start_element(DS_KEY_INFO, &[]);
            w.text_element(DS_KEY_NAME, &[], recipient);
            match info {
                RecipientInfo::X509Data => w.empty_element("ds:X509Data", &[]),
                RecipientInfo::KeyValue => w.empty_element("ds:KeyValue", &[]),
            }
            w.end_element(DS_KEY_INFO);
            write_cipher_data(&mut w);
            w.end_element(XENC_ENCRYPTED_KEY);
        }
        SessionKeyRef::Retrieval => {
            let uri = format!("#{SESSION_KEY_NAME}");
            w.empty_element(
                "ds:RetrievalMethod",
                &[(ns::attr::URI, &uri), (ns::attr::TYPE, algorithm::ENCRYPTED_KEY)],
            );
        }
    }
    w.end_element(DS_KEY_INFO);
    write_cipher_data(&mut w);
    w.end_element(XENC_ENCRYPTED_DATA);
    w.into_string()
}

fn write_cipher_data(w: &mut XmlWriter) {
    w.start_element(XENC_CIPHER_DATA, &[]);
    w.empty_element(XENC_CIPHER_VALUE, &[]);
    w.end_element(XENC_CIPHER_DATA);
}

/// Elements `expr` selects for encryption, in the order to encrypt them.
///
/// Attributes count as their owner element and the document node as the
/// root element.  A candidate inside another candidate is dropped.  The
/// survivors come back in reverse document order, so encrypting one never
/// moves the text of those still to come.
pub fn select_targets(doc: &Document<'_>, expr: &str) -> Result<Vec<NodeId>> {
    let selected = Evaluator::new(doc).select(expr).map_err(|e| XsecError::XPath {
        expr: expr.to_owned(),
        reason: e.to_string(),
    })?;

    let mut candidates: Vec<NodeId> = Vec::with_capacity(selected.len());
    for xnode in selected {
        let id = match xnode {
            XNode::Attr(owner, _) => owner,
            XNode::Node(id) if id == doc.root().id() => doc.root_element().id(),
            XNode::Node(id) => id,
        };
        let is_element = doc.get_node(id).is_some_and(|n| n.is_element());
        if !is_element {
            return Err(XsecError::Encrypt(CoreError::Encryption(format!(
                "\"{expr}\" selects a node that is not an element"
            ))));
        }
        candidates.push(id);
    }
    candidates.sort_by_key(|id| id.get_usize());
    candidates.dedup();

    let mut targets = Vec::with_capacity(candidates.len());
    for i in (0..candidates.len()).rev() {
        let Some(node) = doc.get_node(candidates[i]) else {
            continue;
        };
        let covered = candidates[..i]
            .iter()
            .filter_map(|id| doc.get_node(*id))
            .any(|ancestor| is_ancestor_or_self(ancestor, node));
        if !covered {
            targets.push(candidates[i]);
        }
    }
    Ok(targets)
}

#![forbid(unsafe_code)]

//! Sign orchestration: build the Signature template for the requested
//! format, load the signing key and let the signer fill it in.

use std::path::Path;

use xseal_dsig::DsigContext;
use xseal_keys::{Key, KeysManager};
use xseal_xml::{Splicer, XmlWriter};

use crate::builder::{self, KeyInfoPlan, ReferencePlan, SignaturePlan};
use crate::config::{Defaults, OrDefault};
use crate::document::{self, Loaded};
use crate::error::{Result, XsecError};
use crate::material;
use crate::options::{
    Destination, DocumentSource, HashAlgorithm, KeySource, Output, PublicKeySource, Reference,
    SignFormat, SignOptions,
};
use crate::resolver;

/// Selectors after defaulting.
struct Resolved {
    format: SignFormat,
    c14n_uri: &'static str,
    signature_uri: &'static str,
    hash: HashAlgorithm,
}

impl Resolved {
    fn new(options: &SignOptions, defaults: &Defaults) -> Result<Self> {
        let missing = |what: &str| XsecError::Template(format!("no {what} algorithm resolved"));
        Ok(Self {
            format: options.format.or_default_to(defaults.sign_format),
            c14n_uri: resolver::c14n_uri(options.c14n.or_default_to(defaults.c14n))
                .ok_or_else(|| missing("canonicalization"))?,
            signature_uri: resolver::signature_uri(options.signature.or_default_to(defaults.signature))
                .ok_or_else(|| missing("signature"))?,
            hash: options.hash.or_default_to(defaults.hash),
        })
    }

    /// Digest URI for a reference; its own hash wins over the operation's.
    fn digest_uri(&self, reference: Option<&Reference>) -> Result<&'static str> {
        let hash = reference.map_or(self.hash, |r| r.hash.or_default_to(self.hash));
        resolver::digest_uri(hash).ok_or_else(|| XsecError::Reference("no digest algorithm resolved".into()))
    }
}

fn reference_plan(uri: String, digest_uri: &'static str, reference: Option<&Reference>) -> ReferencePlan {
    match reference {
        Some(r) => {
            let mut plan = ReferencePlan::new(uri, digest_uri).with_filters(
                &r.xpath_intersect,
                &r.xpath_subtract,
                &r.xpath_union,
            );
            plan.c14n_uri = resolver::c14n_uri(r.transform);
            plan
        }
        None => ReferencePlan::new(uri, digest_uri),
    }
}

pub(crate) fn sign(
    keys: &KeysManager,
    defaults: &Defaults,
    source: &DocumentSource,
    destination: &Destination,
    options: &SignOptions,
) -> Result<Output> {
    let resolved = Resolved::new(options, defaults)?;
    let loaded = document::load(source)?;
    let base_dir = document::base_dir(options.base_url.as_deref(), &loaded)?;
    tracing::info!(
        format = %resolved.format,
        references = options.references.len(),
        signature = resolved.signature_uri,
        "signing document"
    );

    let (references, objects) = match resolved.format {
        SignFormat::Enveloped | SignFormat::Unset => {
            let first = options.references.first();
            let uri = first.map(|r| r.uri.clone()).unwrap_or_default();
            let mut plan = reference_plan(uri, resolved.digest_uri(first)?, first);
            plan.enveloped = true;
            (vec![plan], Vec::new())
        }
        SignFormat::Enveloping => enveloping_references(&resolved, &loaded, options, base_dir.as_deref())?,
        SignFormat::Detached => {
            if options.references.is_empty() {
                return Err(XsecError::MissingReferences);
            }
            let plans = options
                .references
                .iter()
                .map(|r| Ok(reference_plan(r.uri.clone(), resolved.digest_uri(Some(r))?, Some(r))))
                .collect::<Result<Vec<_>>>()?;
            (plans, Vec::new())
        }
    };

    let private = options.private_key.as_ref().ok_or(XsecError::MissingPrivateKey)?;
    let (key, key_info) = signing_key(private, options.public_key.as_ref(), options.key_password.as_deref())?;

    let template = builder::signature_template(&SignaturePlan {
        c14n_uri: resolved.c14n_uri,
        signature_uri: resolved.signature_uri,
        references,
        key_info,
        objects,
    });
    let unsigned = match resolved.format {
        SignFormat::Enveloped | SignFormat::Unset => {
            let doc = xseal_xml::parse(&loaded.text).map_err(XsecError::Parse)?;
            let mut splicer = Splicer::new(&loaded.text);
            splicer
                .append_child(&doc.root_element(), &template)
                .map_err(|e| XsecError::Template(e.to_string()))?;
            splicer.apply().map_err(|e| XsecError::Template(e.to_string()))?
        }
        SignFormat::Enveloping | SignFormat::Detached => {
            let mut w = XmlWriter::new();
            w.write_declaration();
            w.write_raw(&template);
            w.into_string()
        }
    };

    let mut ctx = DsigContext::new(keys).with_key(key);
    ctx.base_dir = base_dir;
    let signed = xseal_dsig::sign(&ctx, &unsigned).map_err(XsecError::Sign)?;
    tracing::debug!(bytes = signed.len(), "signature computed");
    document::store(destination, signed.into_bytes())
}

/// One `res<N>` object and reference per supplied reference, or one for
/// the input document when none is supplied.
fn enveloping_references(
    resolved: &Resolved,
    loaded: &Loaded,
    options: &SignOptions,
    base_dir: Option<&Path>,
) -> Result<(Vec<ReferencePlan>, Vec<(String, String)>)> {
    let implicit = [Reference::default()];
    let supplied: &[Reference] = if options.references.is_empty() {
        &implicit
    } else {
        &options.references
    };

    let mut plans = Vec::with_capacity(supplied.len());
    let mut objects = Vec::with_capacity(supplied.len());
    for (index, reference) in supplied.iter().enumerate() {
        let id = builder::object_id(index);
        let markup = if reference.uri.is_empty() {
            root_markup(&loaded.text).map_err(|e| XsecError::Object(e.to_string()))?
        } else {
            let bytes = xseal_transforms::uri::read_external(&reference.uri, base_dir)
                .map_err(|e| XsecError::Object(format!("{}: {e}", reference.uri)))?;
            let text = String::from_utf8(bytes)
                .map_err(|e| XsecError::Object(format!("{}: {e}", reference.uri)))?;
            root_markup(&text).map_err(|e| XsecError::Object(format!("{}: {e}", reference.uri)))?
        };
        tracing::debug!(id = %id, uri = %reference.uri, "embedding object");
        plans.push(reference_plan(
            format!("#{id}"),
            resolved.digest_uri(Some(reference))?,
            Some(reference),
        ));
        objects.push((id, markup));
    }
    Ok((plans, objects))
}

/// The markup of a document's root element.
fn root_markup(text: &str) -> std::result::Result<String, xseal_core::Error> {
    let doc = xseal_xml::parse(text)?;
    Ok(text[doc.root_element().range()].to_owned())
}

/// Load the signing key and decide what KeyInfo announces.
fn signing_key(
    private: &KeySource,
    public: Option<&PublicKeySource>,
    password: Option<&str>,
) -> Result<(Key, KeyInfoPlan)> {
    let mut key = material::load_private_key(private, password)?;
    let plan = match public {
        Some(PublicKeySource::Certificate(path)) => {
            material::attach_certificate(&mut key, path)?;
            KeyInfoPlan::X509Data
        }
        Some(source @ PublicKeySource::Pkcs12(_)) => {
            let bundle = material::load_public_key(source, password)?;
            let matching = bundle
                .certificate()
                .is_some_and(|leaf| xseal_keys::loader::certificate_matches(&key, leaf));
            if !matching {
                return Err(XsecError::CertificateLoad {
                    path: source.path().clone(),
                    source: xseal_core::Error::Certificate(
                        "bundle certificate does not match the private key".into(),
                    ),
                });
            }
            key.x509_chain = bundle.x509_chain;
            KeyInfoPlan::X509Data
        }
        Some(source @ PublicKeySource::Pem(_)) => {
            material::load_public_key(source, password)?;
            KeyInfoPlan::KeyValue
        }
        None if matches!(private, KeySource::Pkcs12(_)) => KeyInfoPlan::X509Data,
        None => KeyInfoPlan::Empty,
    };
    Ok((key, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use xseal_core::ns;

    fn keys_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-data/keys")
    }

    fn options(format: SignFormat) -> SignOptions {
        SignOptions {
            format,
            private_key: Some(KeySource::Pem(keys_dir().join("rsa-key.pem"))),
            ..SignOptions::default()
        }
    }

    fn sign_text(xml: &str, options: &SignOptions) -> Result<String> {
        let keys = KeysManager::new();
        let out = sign(
            &keys,
            &Defaults::default(),
            &DocumentSource::memory(xml),
            &Destination::Memory,
            options,
        )?;
        Ok(out.as_text().unwrap().to_owned())
    }

    #[test]
    fn enveloped_signature_is_the_last_child_of_the_root() {
        let signed = sign_text("<doc><a>1</a></doc>", &options(SignFormat::Unset)).unwrap();
        assert!(signed.starts_with("<doc><a>1</a><ds:Signature"));
        assert!(signed.ends_with("</ds:Signature></doc>"));
        let doc = xseal_xml::parse(&signed).unwrap();
        let transforms: Vec<&str> = doc
            .descendants()
            .filter(|n| n.has_tag_name((ns::DSIG, "Transform")))
            .filter_map(|n| n.attribute("Algorithm"))
            .collect();
        assert_eq!(transforms, vec![xseal_core::algorithm::ENVELOPED_SIGNATURE]);
        let key_info = doc
            .descendants()
            .find(|n| n.has_tag_name((ns::DSIG, "KeyInfo")))
            .unwrap();
        assert!(!key_info.has_children());
    }

    #[test]
    fn reference_hash_overrides_the_default() {
        let mut opts = options(SignFormat::Enveloped);
        opts.hash = HashAlgorithm::Sha1;
        opts.references.push("intersect=//a".parse().unwrap());
        opts.references[0].hash = HashAlgorithm::Sha512;
        let signed = sign_text("<doc><a>1</a></doc>", &opts).unwrap();
        assert!(signed.contains(xseal_core::algorithm::SHA512));
        assert!(!signed.contains(xseal_core::algorithm::SHA1));
        assert!(signed.contains(r#"Filter="intersect">//a<"#));
    }

    #[test]
    fn detached_needs_references_before_a_key() {
        let mut opts = options(SignFormat::Detached);
        opts.private_key = None;
        let err = sign_text("<doc/>", &opts).unwrap_err();
        assert!(matches!(err, XsecError::MissingReferences));

        opts.format = SignFormat::Enveloped;
        let err = sign_text("<doc/>", &opts).unwrap_err();
        assert!(matches!(err, XsecError::MissingPrivateKey));
    }

    #[test]
    fn enveloping_embeds_the_input_document() {
        let signed = sign_text("<?xml version=\"1.0\"?>\n<doc><a>1</a></doc>", &options(SignFormat::Enveloping)).unwrap();
        assert!(signed.starts_with("<?xml"));
        let doc = xseal_xml::parse(&signed).unwrap();
        assert!(doc.root_element().has_tag_name((ns::DSIG, "Signature")));
        assert!(signed.contains(r#"<ds:Object Id="res0"><doc><a>1</a></doc></ds:Object>"#));
        assert!(signed.contains(r##"<ds:Reference URI="#res0">"##));
    }

    #[test]
    fn enveloping_reference_that_cannot_be_read() {
        let mut opts = options(SignFormat::Enveloping);
        opts.references.push(Reference::new("missing-file.xml"));
        let err = sign_text("<doc/>", &opts).unwrap_err();
        assert_eq!(err.status_code(), -6);
    }

    #[test]
    fn key_info_follows_the_supplied_material() {
        let mut opts = options(SignFormat::Enveloped);
        opts.public_key = Some(PublicKeySource::Certificate(keys_dir().join("rsa-cert.pem")));
        let signed = sign_text("<doc/>", &opts).unwrap();
        assert!(signed.contains("<ds:X509Data><ds:X509Certificate>"));

        opts.public_key = Some(PublicKeySource::Pem(keys_dir().join("rsa-pub.pem")));
        let signed = sign_text("<doc/>", &opts).unwrap();
        assert!(signed.contains("<ds:KeyValue><ds:RSAKeyValue>"));

        opts.public_key = Some(PublicKeySource::Certificate(keys_dir().join("other-cert.pem")));
        assert_eq!(sign_text("<doc/>", &opts).unwrap_err().status_code(), -26);
    }
}

#![forbid(unsafe_code)]

//! Reading operation inputs and writing their results.

use std::path::{Path, PathBuf};

use xseal_core::Error as CoreError;

use crate::error::{Result, XsecError};
use crate::options::{Destination, DocumentSource, Output};

/// A document read from its source and checked to be well-formed.
#[derive(Debug)]
pub(crate) struct Loaded {
    pub text: String,
    /// Directory of the file the document came from.
    pub dir: Option<PathBuf>,
}

pub(crate) fn load(source: &DocumentSource) -> Result<Loaded> {
    match source {
        DocumentSource::Path(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| XsecError::Read {
                path: path.clone(),
                source,
            })?;
            xseal_xml::parse(&text).map_err(|e| XsecError::ParseFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            Ok(Loaded {
                text,
                dir: path.parent().map(Path::to_path_buf),
            })
        }
        DocumentSource::Memory(text) => {
            xseal_xml::parse(text).map_err(XsecError::Parse)?;
            Ok(Loaded {
                text: text.clone(),
                dir: None,
            })
        }
    }
}

/// Directory relative URIs resolve against: `base_url` when given, else the
/// document's own directory.
pub(crate) fn base_dir(base_url: Option<&str>, loaded: &Loaded) -> Result<Option<PathBuf>> {
    match base_url {
        Some(url) => xseal_transforms::uri::base_dir_of(url)
            .map(Some)
            .map_err(|e| XsecError::Reference(format!("bad base URL \"{url}\": {e}"))),
        None => Ok(loaded.dir.clone()),
    }
}

pub(crate) fn store(destination: &Destination, bytes: Vec<u8>) -> Result<Output> {
    match destination {
        Destination::Path(path) => {
            std::fs::write(path, &bytes).map_err(|source| XsecError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote result");
            Ok(Output::Path(path.clone()))
        }
        Destination::Memory => Ok(Output::Memory(bytes)),
    }
}

/// Text this crate produced itself failed to re-parse.
pub(crate) fn reparse_error(e: CoreError) -> CoreError {
    CoreError::XmlStructure(format!("generated document is malformed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sources_parse_or_fail_with_minus_one() {
        let loaded = load(&DocumentSource::memory("<a/>")).unwrap();
        assert_eq!(loaded.text, "<a/>");
        assert!(loaded.dir.is_none());
        assert_eq!(load(&DocumentSource::memory("<a>")).unwrap_err().status_code(), -1);
    }

    #[test]
    fn file_sources() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xml");
        std::fs::write(&good, "<a/>").unwrap();
        let loaded = load(&DocumentSource::path(&good)).unwrap();
        assert_eq!(loaded.dir.as_deref(), Some(dir.path()));

        let bad = dir.path().join("bad.xml");
        std::fs::write(&bad, "<a>").unwrap();
        assert_eq!(load(&DocumentSource::path(&bad)).unwrap_err().status_code(), -2);
        let missing = dir.path().join("missing.xml");
        assert_eq!(load(&DocumentSource::path(missing)).unwrap_err().status_code(), -81);
    }

    #[test]
    fn results_go_to_memory_or_disk() {
        assert_eq!(
            store(&Destination::Memory, b"x".to_vec()).unwrap(),
            Output::Memory(b"x".to_vec())
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.xml");
        store(&Destination::Path(out.clone()), b"<a/>".to_vec()).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"<a/>");

        let unwritable = dir.path().join("no/such/dir/out.xml");
        assert_eq!(
            store(&Destination::Path(unwritable), Vec::new()).unwrap_err().status_code(),
            -80
        );
    }
}

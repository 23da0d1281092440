#![allow(dead_code)]

use std::path::{Path, PathBuf};

use xseal::Output;

pub fn test_data(dir: &str, name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-data")
        .join(dir)
        .join(name)
}

pub fn key(name: &str) -> PathBuf {
    test_data("keys", name)
}

pub fn doc(name: &str) -> PathBuf {
    test_data("docs", name)
}

pub fn text(out: Output) -> String {
    out.as_text().expect("in-memory UTF-8 output").to_owned()
}

/// Copy `names` from test-data/docs into a fresh directory.
pub fn scratch(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::copy(doc(name), dir.path().join(name)).unwrap();
    }
    dir
}

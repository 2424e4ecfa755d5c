#![allow(dead_code)]
use tmplsync_core::{Filesystem, MemoryFs};

/// Builds an in-memory template repository fixture.
pub fn repository_fixture() -> MemoryFs {
    let fs = MemoryFs::new();
    fs.write_file(".tmplsync/repository.json", br#"{"version":2,"templates":[]}"#)
        .expect("write manifest");
    fs.write_file("_common/readme.md", b"common").expect("write common");
    fs.write_file("template1/v1/src/manifest.jsonnet", b"{}")
        .expect("write template");
    fs.write_file("template1/v1/README.md", b"# Template 1")
        .expect("write readme");
    fs
}

mod common;

use tmplsync_core::{
    CoreError, Filesystem, LocalFs, MemoryFs, RepositoryType, Result, TemplateRepositoryRef,
    copy_fs,
};

#[test]
fn test_definition_roundtrip_through_json_list() {
    let json = r#"[
        {"type": "git", "name": "common", "url": "https://github.com/org/templates", "ref": "main"},
        {"type": "dir", "name": "local", "url": "/srv/templates"}
    ]"#;
    let defs: Vec<TemplateRepositoryRef> = serde_json::from_str(json).unwrap();

    assert_eq!(defs.len(), 2);
    assert_eq!(defs[0].repo_type(), RepositoryType::Git);
    assert_eq!(defs[0].to_string(), "https://github.com/org/templates:main");
    assert_eq!(defs[1].repo_type(), RepositoryType::Dir);
    assert!(defs.iter().all(|d| d.validate().is_ok()));
}

#[test]
fn test_error_propagation_with_question_mark() {
    fn load(fs: &dyn Filesystem) -> Result<String> {
        let content = fs.read_to_string(".tmplsync/missing.json")?;
        Ok(content)
    }

    let fs = common::repository_fixture();
    match load(&fs) {
        Err(CoreError::NotFound { path }) => assert_eq!(path, ".tmplsync/missing.json"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_copy_repository_to_disk_and_back() {
    let memory = common::repository_fixture();
    let tmp = tempfile::tempdir().unwrap();
    let local = LocalFs::new(tmp.path()).unwrap();

    copy_fs(&memory, "", &local, "").unwrap();
    assert!(tmp.path().join("template1/v1/src/manifest.jsonnet").is_file());

    let back = MemoryFs::new();
    copy_fs(&local, "template1", &back, "template1").unwrap();
    copy_fs(&local, "_common", &back, "_common").unwrap();

    assert_eq!(
        back.walk_files("").unwrap(),
        vec![
            "_common/readme.md",
            "template1/v1/README.md",
            "template1/v1/src/manifest.jsonnet",
        ]
    );
    assert!(!back.exists(".tmplsync"));
}

#[test]
fn test_invalid_utf8_is_decode_error() {
    let fs = MemoryFs::new();
    fs.write_file("bin", &[0xff, 0xfe]).unwrap();
    assert!(matches!(
        fs.read_to_string("bin"),
        Err(CoreError::Decode { .. })
    ));
}

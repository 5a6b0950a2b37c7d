//! Integration tests for reading work item documents from disk

use super::test_utils::{work_items, write_source};
use bugs_loader::source::load_work_items;
use bugs_loader::LoadError;
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_round_trips_fixture_document() {
    let dir = TempDir::new().unwrap();
    let items = work_items(5);
    let path = write_source(&dir, &items);

    let loaded = load_work_items(&path).await.unwrap();
    assert_eq!(loaded, items);
}

#[tokio::test]
async fn test_preserves_document_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bugs.yaml");
    fs::write(
        &path,
        r#"
bugs:
  - reference: CVE-2018-0002
    repo: https://github.com/example/b
    commit: bbb
  - reference: CVE-2018-0001
    repo: https://github.com/example/a
    commit: aaa
    description: listed second
  - reference: CVE-2018-0003
    repo: https://github.com/example/c
    commit: ccc
"#,
    )
    .unwrap();

    let references: Vec<String> = load_work_items(&path)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.reference)
        .collect();
    assert_eq!(
        references,
        vec!["CVE-2018-0002", "CVE-2018-0001", "CVE-2018-0003"]
    );
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = load_work_items(&path).await.unwrap_err();
    assert!(matches!(err, LoadError::NotFound(ref p) if p == &path));
}

#[tokio::test]
async fn test_directory_is_read_failure() {
    let dir = TempDir::new().unwrap();
    let err = load_work_items(dir.path()).await.unwrap_err();
    assert!(matches!(err, LoadError::ReadFailure { .. }));
}

#[tokio::test]
async fn test_document_without_bugs_key_is_schema_violation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bugs.yaml");
    fs::write(&path, "vulnerabilities:\n  - reference: CVE-2018-0001\n").unwrap();

    let err = load_work_items(&path).await.unwrap_err();
    assert!(matches!(err, LoadError::SchemaViolation { ref key, .. } if key == "bugs"));
}

#[tokio::test]
async fn test_malformed_yaml_is_parse_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bugs.yaml");
    fs::write(&path, "bugs: [\n  - reference: {\n").unwrap();

    let err = load_work_items(&path).await.unwrap_err();
    assert!(matches!(err, LoadError::ParseFailure { .. }));
}

#[tokio::test]
async fn test_empty_list_is_valid() {
    let dir = TempDir::new().unwrap();
    let path = write_source(&dir, &[]);
    assert!(load_work_items(&path).await.unwrap().is_empty());
}

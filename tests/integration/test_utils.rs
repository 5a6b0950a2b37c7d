//! Shared test utilities for integration tests
//!
//! Source document fixtures and serialized access to process environment variables.

use bugs_loader::source::WorkItem;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Work items with descriptions that exercise shell quoting
pub fn work_items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| WorkItem {
            reference: format!("CVE-2019-{:04}", 1000 + i),
            repo: format!("https://github.com/example/project-{}", i),
            commit: format!("fix{:05}", i),
            description: format!("Item {}: \"quoted\" text; $(not run) & 'single'", i),
            links: format!("https://nvd.nist.gov/vuln/detail/CVE-2019-{:04}", 1000 + i),
        })
        .collect()
}

/// Write `items` as a `bugs:` document and return its path
pub fn write_source(dir: &TempDir, items: &[WorkItem]) -> PathBuf {
    let mut text = String::from("bugs:");
    if items.is_empty() {
        text.push_str(" []\n");
    } else {
        text.push('\n');
        for item in items {
            text.push_str(&format!(
                "  - reference: {:?}\n    repo: {:?}\n    commit: {:?}\n    description: {:?}\n    links: {:?}\n",
                item.reference, item.repo, item.commit, item.description, item.links
            ));
        }
    }
    let path = dir.path().join("bugs.yaml");
    std::fs::write(&path, text).unwrap();
    path
}

/// Run `f` with the given environment variables set, restoring previous values afterwards.
pub fn with_env<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
        .collect();

    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let result = f();

    for (key, value) in previous {
        match value {
            Some(value) => std::env::set_var(&key, value),
            None => std::env::remove_var(&key),
        }
    }

    result
}

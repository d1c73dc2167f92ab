//! End-to-end hot reload through the file system.

use credstore_reload::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const ORIGINAL: &str = r#"
entries:
  default:
    kind: private_key
    key: "original-key"
    certificate_chain: ["original-leaf", "original-ca"]
"#;

const BOTH: &str = r#"
entries:
  default:
    kind: private_key
    key: "original-key"
    certificate_chain: ["original-leaf", "original-ca"]
  test:
    kind: private_key
    key: "updated-key"
    certificate_chain: ["updated-leaf"]
"#;

const UPDATED: &str = r#"
entries:
  test:
    kind: private_key
    key: "updated-key"
    certificate_chain: ["updated-leaf"]
"#;

fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

fn fast_watcher() -> Watcher {
    Watcher::new(WatcherConfig::default().with_debounce(Duration::from_millis(50))).unwrap()
}

/// Replace `path` the way editors and secret rotators do.
fn save_via_rename(path: &Path, contents: &str) {
    let temp = path.with_file_name("store.yaml.tmp");
    fs::write(&temp, contents).unwrap();
    fs::remove_file(path).unwrap();
    fs::rename(&temp, path).unwrap();
}

#[test]
fn test_store_follows_file_replacement() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.yaml");
    fs::write(&path, ORIGINAL).unwrap();

    let watcher = fast_watcher();
    let store = ReloadableStore::builder(&path)
        .watcher(watcher.clone())
        .open()
        .unwrap();

    assert_eq!(store.watch_status(), WatchStatus::Watching);
    assert!(store.contains("default").unwrap());
    assert!(!store.contains("test").unwrap());
    assert_eq!(store.certificate_chain("default").unwrap().len(), 2);

    // A second listener on the same file observes the same debounced change
    let probe_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&probe_hits);
    let probe: Arc<dyn Listener> = Arc::new(move |n: &Notification| {
        if *n == Notification::Modified {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    });
    watcher.register(&path, Arc::clone(&probe)).unwrap();

    save_via_rename(&path, BOTH);

    assert!(eventually(Duration::from_secs(10), || {
        probe_hits.load(Ordering::SeqCst) >= 1 && store.contains("test").unwrap_or(false)
    }));
    assert!(store.contains("default").unwrap());

    let seen = probe_hits.load(Ordering::SeqCst);
    save_via_rename(&path, UPDATED);

    assert!(eventually(Duration::from_secs(10), || {
        probe_hits.load(Ordering::SeqCst) > seen && !store.contains("default").unwrap_or(true)
    }));
    assert!(store.contains("test").unwrap());
    assert!(store.is_key_entry("test").unwrap());
    assert_eq!(store.certificate_chain("test").unwrap(), ["updated-leaf"]);

    watcher.deregister(&path, &probe);
    store.close();
    assert!(watcher.watched_paths().is_empty());
}

#[test]
fn test_in_place_write_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    fs::write(
        &path,
        r#"{"entries": {"ca": {"kind": "trusted_certificate", "certificate": "root-1"}}}"#,
    )
    .unwrap();

    let store = ReloadableStore::builder(&path)
        .watcher(fast_watcher())
        .open()
        .unwrap();
    let first = store.snapshot().unwrap();

    fs::write(
        &path,
        r#"{"entries": {"ca": {"kind": "trusted_certificate", "certificate": "root-2"}}}"#,
    )
    .unwrap();

    assert!(eventually(Duration::from_secs(10), || store.generation() >= 2));
    let expected = Credential::TrustedCertificate {
        certificate: "root-2".to_string(),
    };
    assert!(eventually(Duration::from_secs(5), || {
        store.get("ca").map(|c| c == expected).unwrap_or(false)
    }));

    // Readers holding the earlier snapshot keep a consistent view
    assert_eq!(
        first.get("ca"),
        Some(&Credential::TrustedCertificate {
            certificate: "root-1".to_string()
        })
    );
}

#[test]
fn test_broken_rewrite_keeps_serving_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.yaml");
    fs::write(&path, ORIGINAL).unwrap();

    let store = ReloadableStore::builder(&path)
        .watcher(fast_watcher())
        .open()
        .unwrap();

    fs::write(&path, "entries: [not, closed").unwrap();
    assert!(eventually(Duration::from_secs(10), || store.stats().failures >= 1));
    assert!(store.contains("default").unwrap());
    assert_eq!(store.generation(), 1);

    // The store recovers once the file is valid again
    fs::write(&path, UPDATED).unwrap();
    assert!(eventually(Duration::from_secs(10), || {
        store.contains("test").unwrap_or(false)
    }));
}

#[test]
fn test_closed_store_ignores_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.yaml");
    fs::write(&path, ORIGINAL).unwrap();

    let watcher = fast_watcher();
    let store = ReloadableStore::builder(&path)
        .watcher(watcher.clone())
        .open()
        .unwrap();
    store.close();

    fs::write(&path, UPDATED).unwrap();
    std::thread::sleep(Duration::from_millis(300));

    assert_eq!(store.generation(), 1);
    assert!(matches!(store.contains("test"), Err(StoreError::StoreClosed)));
    assert_eq!(watcher.listener_count(&path), 0);
}

//! End-to-end sync runs against in-process fakes.
//!
//! The local variant uses real temp directories for documents and state;
//! the object variant uses an in-memory bucket for both.

mod common;

use common::{fast_policy, Behavior, FakeStore, MemoryStorage};
use filesearch_sync::config::{LocalSourceConfig, ObjectSourceConfig};
use filesearch_sync::connector_fs::LocalSource;
use filesearch_sync::connector_s3::ObjectSource;
use filesearch_sync::error::Error;
use filesearch_sync::ingest::{run_sync, SyncContext};
use filesearch_sync::state::{LocalStateStore, ObjectStateStore};
use filesearch_sync::store_handle::load_handle;
use filesearch_sync::tracker::{self, content_hash, ChangeTracker};
use filesearch_sync::traits::{DocumentSource, StagedFile, StateStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

struct LocalEnv {
    _tmp: TempDir,
    data: PathBuf,
    state_dir: PathBuf,
}

impl LocalEnv {
    fn new(files: &[(&str, &str)]) -> Self {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let state_dir = tmp.path().join("state");
        fs::create_dir_all(&data).unwrap();
        for (name, content) in files {
            fs::write(data.join(name), content).unwrap();
        }
        Self {
            _tmp: tmp,
            data,
            state_dir,
        }
    }

    fn state(&self) -> Arc<dyn StateStore> {
        Arc::new(LocalStateStore::new(&self.state_dir))
    }

    fn ctx(&self, store: Arc<FakeStore>, max_attempts: u32) -> SyncContext {
        SyncContext {
            source: Arc::new(LocalSource::new(LocalSourceConfig {
                root: self.data.clone(),
                ..LocalSourceConfig::default()
            })),
            state: self.state(),
            store,
            policy: fast_policy(max_attempts),
            store_display_name: "my_docs_store".to_string(),
        }
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.data.join(name), content).unwrap();
    }

    async fn tracked(&self) -> Vec<String> {
        ChangeTracker::new(self.state())
            .load()
            .await
            .unwrap()
            .into_keys()
            .collect()
    }
}

#[tokio::test]
async fn first_run_creates_store_and_uploads_in_order() {
    let env = LocalEnv::new(&[("b.txt", "world"), ("a.txt", "hello"), ("skip.png", "x")]);
    let store = Arc::new(FakeStore::new());

    let report = run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();

    assert_eq!(report.store, "fileSearchStores/fake-0");
    assert_eq!(report.uploaded, vec!["a.txt", "b.txt"]);
    assert_eq!(report.unchanged, 0);
    assert!(report.failed.is_empty());
    assert_eq!(store.upload_names(), vec!["a.txt", "b.txt"]);

    let state = ChangeTracker::new(env.state()).load().await.unwrap();
    assert_eq!(state.get("a.txt"), Some(&content_hash(b"hello")));
    assert_eq!(state.get("b.txt"), Some(&content_hash(b"world")));
    assert_eq!(
        load_handle(env.state().as_ref()).await.unwrap().as_deref(),
        Some("fileSearchStores/fake-0")
    );
}

#[tokio::test]
async fn second_run_without_changes_uploads_nothing() {
    let env = LocalEnv::new(&[("a.txt", "hello"), ("b.pdf", "%PDF-1.4")]);
    let store = Arc::new(FakeStore::new());

    run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();
    let report = run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();

    assert!(report.uploaded.is_empty());
    assert_eq!(report.unchanged, 2);
    assert_eq!(store.upload_count(), 2);
    assert_eq!(store.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn only_changed_content_is_reuploaded() {
    let env = LocalEnv::new(&[("a.txt", "hello"), ("b.txt", "world")]);
    let store = Arc::new(FakeStore::new());
    run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();

    // Rewriting identical bytes changes mtime only.
    env.write("a.txt", "hello");
    env.write("b.txt", "goodbye");

    let report = run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();
    assert_eq!(report.uploaded, vec!["b.txt"]);
    assert_eq!(report.unchanged, 1);

    let uploads = store.uploads.lock().unwrap();
    let last = uploads.last().unwrap();
    assert_eq!(last.1, "b.txt");
    assert_eq!(last.2, "text/plain");
    assert_eq!(last.3, b"goodbye");
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let env = LocalEnv::new(&[("a.txt", "hello")]);
    let store = Arc::new(FakeStore::with_script(vec![
        Behavior::Status(503),
        Behavior::Status(429),
        Behavior::NeverDone,
        Behavior::Accept { polls: 2 },
    ]));

    let report = run_sync(&env.ctx(store.clone(), 5), false).await.unwrap();
    assert_eq!(report.uploaded, vec!["a.txt"]);
    assert!(report.failed.is_empty());
    assert_eq!(env.tracked().await, vec!["a.txt"]);
}

#[tokio::test]
async fn exhausted_retries_leave_file_uncommitted_and_run_completes() {
    let env = LocalEnv::new(&[("a.txt", "hello"), ("b.txt", "world")]);
    let store = Arc::new(FakeStore::with_script(vec![
        Behavior::Status(500),
        Behavior::Status(500),
        Behavior::Accept { polls: 0 },
    ]));

    let report = run_sync(&env.ctx(store.clone(), 2), false).await.unwrap();
    assert_eq!(report.uploaded, vec!["b.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "a.txt");
    assert!(report.failed[0].1.contains("gave up after 2 attempts"));
    assert_eq!(env.tracked().await, vec!["b.txt"]);

    // Next run picks the failed file up again.
    let report = run_sync(&env.ctx(store.clone(), 2), false).await.unwrap();
    assert_eq!(report.uploaded, vec!["a.txt"]);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let env = LocalEnv::new(&[("a.txt", "hello"), ("b.txt", "world")]);
    let store = Arc::new(FakeStore::with_script(vec![
        Behavior::Status(400),
        Behavior::OperationError("unsupported file".to_string()),
    ]));

    let report = run_sync(&env.ctx(store.clone(), 5), false).await.unwrap();
    assert!(report.uploaded.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[1].1.contains("unsupported file"));
    assert!(env.tracked().await.is_empty());
}

#[tokio::test]
async fn crash_after_commit_k_resumes_with_remaining_files() {
    let env = LocalEnv::new(&[
        ("f1.txt", "one"),
        ("f2.txt", "two"),
        ("f3.txt", "three"),
        ("f4.txt", "four"),
    ]);
    let store = Arc::new(FakeStore::with_script(vec![
        Behavior::Accept { polls: 0 },
        Behavior::Accept { polls: 1 },
        Behavior::Crash,
    ]));

    let ctx = Arc::new(env.ctx(store.clone(), 3));
    let handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { run_sync(&ctx, false).await }
    });
    let err = handle.await.unwrap_err();
    assert!(err.is_panic());

    assert_eq!(env.tracked().await, vec!["f1.txt", "f2.txt"]);

    let candidates = ctx.source.discover().await.unwrap().candidates;
    let known = ChangeTracker::new(env.state()).load().await.unwrap();
    let diff = tracker::diff_hashed(
        candidates.into_iter().map(|c| (c.id, c.hash)),
        &known,
    );
    assert_eq!(diff.to_upload, vec!["f3.txt", "f4.txt"]);

    let report = run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();
    assert_eq!(report.uploaded, vec!["f3.txt", "f4.txt"]);
}

#[tokio::test]
async fn store_creation_failure_aborts_run() {
    let env = LocalEnv::new(&[("a.txt", "hello")]);
    let store = Arc::new(FakeStore {
        fail_create: true,
        ..FakeStore::default()
    });

    let err = run_sync(&env.ctx(store.clone(), 3), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreCreation(_)));
    assert_eq!(store.upload_count(), 0);
    assert!(!env.state_dir.join(".indexed_files.json").exists());
}

#[tokio::test]
async fn existing_handle_is_reused_without_creation() {
    let env = LocalEnv::new(&[("a.txt", "hello")]);
    fs::create_dir_all(&env.state_dir).unwrap();
    fs::write(env.state_dir.join(".store_name"), "fileSearchStores/existing\n").unwrap();
    let store = Arc::new(FakeStore {
        fail_create: true,
        ..FakeStore::default()
    });

    let report = run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();
    assert_eq!(report.store, "fileSearchStores/existing");
    assert_eq!(store.uploads.lock().unwrap()[0].0, "fileSearchStores/existing");
}

#[tokio::test]
async fn corrupt_state_triggers_full_reindex() {
    let env = LocalEnv::new(&[("a.txt", "hello"), ("b.txt", "world")]);
    let store = Arc::new(FakeStore::new());
    run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();

    fs::write(env.state_dir.join(".indexed_files.json"), "[1, 2").unwrap();

    let report = run_sync(&env.ctx(store.clone(), 3), false).await.unwrap();
    assert_eq!(report.uploaded, vec!["a.txt", "b.txt"]);
    assert_eq!(env.tracked().await, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let env = LocalEnv::new(&[("a.txt", "hello")]);
    let store = Arc::new(FakeStore::new());

    let report = run_sync(&env.ctx(store.clone(), 3), true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.uploaded, vec!["a.txt"]);
    assert_eq!(store.upload_count(), 0);
    assert_eq!(store.created.load(Ordering::SeqCst), 0);
    assert!(!env.state_dir.exists());
}

// ─── Object storage variant ────────────────────────────────────────

fn object_config() -> ObjectSourceConfig {
    ObjectSourceConfig {
        bucket: "docs".to_string(),
        ..ObjectSourceConfig::default()
    }
}

fn object_ctx(storage: Arc<MemoryStorage>, store: Arc<FakeStore>) -> SyncContext {
    let cfg = object_config();
    SyncContext {
        source: Arc::new(ObjectSource::new(storage.clone(), &cfg).unwrap()),
        state: Arc::new(ObjectStateStore::new(storage, &cfg)),
        store,
        policy: fast_policy(3),
        store_display_name: "my_docs_store".to_string(),
    }
}

#[tokio::test]
async fn object_variant_persists_state_in_bucket() {
    let storage = Arc::new(MemoryStorage::new("docs"));
    storage.insert("PdfDocuments/", b"");
    storage.insert("PdfDocuments/guide.pdf", b"%PDF guide");
    storage.insert("PdfDocuments/notes/readme.txt", b"notes");
    storage.insert("PdfDocuments/photo.jpg", b"jpeg");
    storage.insert("Other/ignored.txt", b"elsewhere");
    let store = Arc::new(FakeStore::new());

    let report = run_sync(&object_ctx(storage.clone(), store.clone()), false)
        .await
        .unwrap();
    assert_eq!(
        report.uploaded,
        vec!["PdfDocuments/guide.pdf", "PdfDocuments/notes/readme.txt"]
    );
    assert_eq!(store.upload_names(), vec!["guide.pdf", "readme.txt"]);
    assert_eq!(store.uploads.lock().unwrap()[0].2, "application/pdf");

    assert_eq!(
        storage.read("config/store_name.txt").unwrap(),
        b"fileSearchStores/fake-0"
    );
    let state: serde_json::Value =
        serde_json::from_slice(&storage.read("config/indexed_files.json").unwrap()).unwrap();
    assert_eq!(
        state["PdfDocuments/guide.pdf"],
        serde_json::Value::String(content_hash(b"%PDF guide"))
    );

    storage.insert("PdfDocuments/guide.pdf", b"%PDF guide v2");
    let report = run_sync(&object_ctx(storage.clone(), store.clone()), false)
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["PdfDocuments/guide.pdf"]);
    assert_eq!(report.unchanged, 1);
}

#[tokio::test]
async fn staged_object_copies_are_removed_on_drop() {
    let storage = Arc::new(MemoryStorage::new("docs"));
    storage.insert("PdfDocuments/a.pdf", b"bytes");
    let source = ObjectSource::new(storage.clone(), &object_config()).unwrap();

    let candidates = source.discover().await.unwrap().candidates;
    let staged = source.stage(&candidates[0]).await.unwrap();
    // The copy made while hashing is reused.
    assert_eq!(storage.gets.load(Ordering::SeqCst), 1);
    let path: PathBuf = staged.path().to_path_buf();
    assert!(matches!(staged, StagedFile::Temp(_)));
    assert_eq!(fs::read(&path).unwrap(), b"bytes");
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));

    drop(staged);
    assert!(!Path::new(&path).exists());
}

#[tokio::test]
async fn unreadable_objects_are_reported_as_failed() {
    let storage = Arc::new(MemoryStorage::new("docs"));
    storage.insert("PdfDocuments/good.pdf", b"good");
    storage.insert("PdfDocuments/bad.pdf", b"bad");
    storage
        .unreadable
        .lock()
        .unwrap()
        .insert("PdfDocuments/bad.pdf".to_string());
    let store = Arc::new(FakeStore::new());

    let report = run_sync(&object_ctx(storage.clone(), store.clone()), false)
        .await
        .unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.uploaded, vec!["PdfDocuments/good.pdf"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "PdfDocuments/bad.pdf");
    assert!(report.failed[0].1.contains("503"));

    // Once readable again, the next run indexes it.
    storage.unreadable.lock().unwrap().clear();
    let report = run_sync(&object_ctx(storage.clone(), store.clone()), false)
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["PdfDocuments/bad.pdf"]);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn unreadable_objects_show_up_in_dry_run() {
    let storage = Arc::new(MemoryStorage::new("docs"));
    storage.insert("PdfDocuments/bad.pdf", b"bad");
    storage
        .unreadable
        .lock()
        .unwrap()
        .insert("PdfDocuments/bad.pdf".to_string());

    let report = run_sync(&object_ctx(storage, Arc::new(FakeStore::new())), true)
        .await
        .unwrap();
    assert!(report.uploaded.is_empty());
    assert_eq!(report.failed[0].0, "PdfDocuments/bad.pdf");
}

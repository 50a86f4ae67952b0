//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use filesearch_sync::error::{Error, Result};
use filesearch_sync::gemini::GenerateContentResponse;
use filesearch_sync::traits::{DocumentStore, ObjectInfo, ObjectStorage, Operation, UploadRequest};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use filesearch_sync::uploader::RetryPolicy;

/// What the fake store does with the next upload call.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Accept; the operation completes after `polls` refreshes.
    Accept { polls: usize },
    /// Return an HTTP error with this status.
    Status(u16),
    /// Accept the upload but finish the operation with an error.
    OperationError(String),
    /// Operation never completes.
    NeverDone,
    /// Panic, simulating a process crash mid-run.
    Crash,
}

#[derive(Default)]
pub struct FakeStore {
    pub created: AtomicUsize,
    pub fail_create: bool,
    pub script: Mutex<VecDeque<Behavior>>,
    pub pending: Mutex<HashMap<String, Option<usize>>>,
    pub next_op: AtomicUsize,
    /// `(store, display_name, mime_type, bytes)` of every upload call that
    /// reached the store.
    pub uploads: Mutex<Vec<(String, String, String, Vec<u8>)>>,
    pub response: Mutex<Option<serde_json::Value>>,
    pub generate_error: Option<u16>,
    pub generate_delay: Option<Duration>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(behaviors: Vec<Behavior>) -> Self {
        let store = Self::default();
        *store.script.lock().unwrap() = behaviors.into();
        store
    }

    pub fn upload_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name, _, _)| name.clone())
            .collect()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn create_store(&self, _display_name: &str) -> Result<String> {
        if self.fail_create {
            return Err(Error::Api {
                service: "fake",
                status: 400,
                body: "store creation unsupported".to_string(),
            });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fileSearchStores/fake-{}", n))
    }

    async fn upload(&self, store: &str, request: &UploadRequest) -> Result<Operation> {
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Behavior::Accept { polls: 0 });

        let name = format!("ops/{}", self.next_op.fetch_add(1, Ordering::SeqCst));
        match behavior {
            Behavior::Status(status) => {
                return Err(Error::Api {
                    service: "fake",
                    status,
                    body: "scripted failure".to_string(),
                })
            }
            Behavior::Crash => panic!("simulated crash"),
            Behavior::OperationError(message) => {
                return Ok(Operation {
                    name,
                    done: true,
                    error: Some(message),
                })
            }
            Behavior::Accept { polls } => {
                self.uploads.lock().unwrap().push((
                    store.to_string(),
                    request.display_name.clone(),
                    request.mime_type.clone(),
                    request.data.clone(),
                ));
                self.pending
                    .lock()
                    .unwrap()
                    .insert(name.clone(), Some(polls));
                Ok(Operation {
                    name,
                    done: polls == 0,
                    error: None,
                })
            }
            Behavior::NeverDone => {
                self.pending.lock().unwrap().insert(name.clone(), None);
                Ok(Operation {
                    name,
                    done: false,
                    error: None,
                })
            }
        }
    }

    async fn get_operation(&self, name: &str) -> Result<Operation> {
        let mut pending = self.pending.lock().unwrap();
        let remaining = pending.get_mut(name).expect("unknown operation");
        let done = match remaining {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
            None => false,
        };
        Ok(Operation {
            name: name.to_string(),
            done,
            error: None,
        })
    }

    async fn generate(
        &self,
        _model: &str,
        _store: &str,
        _query: &str,
    ) -> Result<GenerateContentResponse> {
        if let Some(delay) = self.generate_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.generate_error {
            return Err(Error::Api {
                service: "fake",
                status,
                body: "model overloaded".to_string(),
            });
        }
        let json = self
            .response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        Ok(serde_json::from_value(json).unwrap())
    }
}

/// A bucket held in memory.
pub struct MemoryStorage {
    bucket: String,
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Keys whose `get` fails with a 503.
    pub unreadable: Mutex<BTreeSet<String>>,
    pub gets: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            unreadable: Mutex::new(BTreeSet::new()),
            gets: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectInfo {
                key: k.clone(),
                size: v.len() as i64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.unreadable.lock().unwrap().contains(key) {
            return Err(Error::Api {
                service: "fake",
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(self.read(key))
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }
}

/// Short delays so retry tests finish quickly.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_base: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        poll_timeout: Duration::from_millis(25),
    }
}

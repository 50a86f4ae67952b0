//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment variables are
//! layered on top. Every field has a default, so a bare environment with an
//! API key is enough to run.
//!
//! ```toml
//! [api]
//! model = "gemini-2.5-flash"
//! store_display_name = "my_docs_store"
//!
//! [upload]
//! max_attempts = 5
//! poll_interval_ms = 2000
//!
//! [local]
//! root = "./data"
//! state_dir = "."
//!
//! [object]
//! bucket = "acme-docs"
//! docs_prefix = "PdfDocuments/"
//! config_prefix = "config/"
//! # endpoint_url = "https://storage.googleapis.com"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// File extensions accepted by both source variants.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx", "doc"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub local: LocalSourceConfig,
    #[serde(default)]
    pub object: ObjectSourceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Usually supplied through `GOOGLE_API_KEY` / `GEMINI_API_KEY` instead.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_store_display_name")]
    pub store_display_name: String,
    /// Timeout for a single query call.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            store_display_name: default_store_display_name(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_store_display_name() -> String {
    "my_docs_store".to_string()
}
fn default_query_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for the store to finish processing one file.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Per-request HTTP timeout for upload and poll calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_poll_timeout_secs() -> u64 {
    600
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl UploadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
    /// Directory holding `.store_name` and `.indexed_files.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for LocalSourceConfig {
    fn default() -> Self {
        Self {
            root: default_local_root(),
            state_dir: default_state_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

/// One `**/*.<ext>` glob per supported extension, matched case-insensitively.
pub fn default_include_globs() -> Vec<String> {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObjectSourceConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_docs_prefix")]
    pub docs_prefix: String,
    #[serde(default = "default_config_prefix")]
    pub config_prefix: String,
    /// Overrides `<config_prefix>store_name.txt`.
    #[serde(default)]
    pub store_name_key: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (GCS interoperability, MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for ObjectSourceConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            docs_prefix: default_docs_prefix(),
            config_prefix: default_config_prefix(),
            store_name_key: None,
            region: default_region(),
            endpoint_url: None,
            include_globs: default_include_globs(),
        }
    }
}

fn default_bucket() -> String {
    "adk-test-kd".to_string()
}
fn default_docs_prefix() -> String {
    "PdfDocuments/".to_string()
}
fn default_config_prefix() -> String {
    "config/".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}

impl ObjectSourceConfig {
    pub fn store_name_key(&self) -> String {
        self.store_name_key
            .clone()
            .unwrap_or_else(|| format!("{}store_name.txt", self.config_prefix))
    }

    pub fn index_state_key(&self) -> String {
        format!("{}indexed_files.json", self.config_prefix)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Overlay values from environment variables.
    ///
    /// `lookup` is injected so tests do not have to mutate the process
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GOOGLE_API_KEY").or_else(|| non_empty("GEMINI_API_KEY")) {
            self.api.api_key = Some(key);
        }
        if let Some(name) = non_empty("FILE_SEARCH_DISPLAY_NAME") {
            self.api.store_display_name = name;
        }
        if let Some(bucket) = non_empty("DOCS_BUCKET") {
            self.object.bucket = bucket;
        }
        if let Some(prefix) = non_empty("DOCS_PREFIX") {
            self.object.docs_prefix = prefix;
        }
        if let Some(prefix) = non_empty("CONFIG_PREFIX") {
            self.object.config_prefix = prefix;
        }
        if let Some(key) = non_empty("STORE_NAME_BLOB") {
            self.object.store_name_key = Some(key);
        }
    }

    /// The API credential, required for any call to the document store.
    pub fn api_key(&self) -> Result<&str, Error> {
        self.api
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("set GOOGLE_API_KEY or GEMINI_API_KEY".to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.upload.max_attempts == 0 {
            bail!("upload.max_attempts must be >= 1");
        }
        if self.upload.poll_interval_ms == 0 {
            bail!("upload.poll_interval_ms must be > 0");
        }
        if self.upload.poll_interval() > self.upload.poll_timeout() {
            bail!("upload.poll_interval_ms must not exceed upload.poll_timeout_secs");
        }
        if self.object.bucket.trim().is_empty() {
            bail!("object.bucket must not be empty");
        }
        if self.api.model.trim().is_empty() {
            bail!("api.model must not be empty");
        }
        Ok(())
    }
}

/// Parse a TOML document, overlay the given environment, and validate.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env(lookup);
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path` (if given) and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?,
        None => String::new(),
    };
    parse_config(&content, |key| std::env::var(key).ok())
}

//! Local filesystem source.
//!
//! Walks `local.root`, keeps files matching the include globs (by default
//! one per supported extension, case-insensitive) and not matching the
//! exclude globs, and hashes each one. Ids are paths relative to the root
//! with `/` separators.

use async_trait::async_trait;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::LocalSourceConfig;
use crate::error::{Error, Result};
use crate::models::{Candidate, Discovery};
use crate::tracker::file_hash;
use crate::traits::{DocumentSource, StagedFile};

pub struct LocalSource {
    config: LocalSourceConfig,
}

impl LocalSource {
    pub fn new(config: LocalSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DocumentSource for LocalSource {
    fn label(&self) -> &str {
        "local"
    }

    async fn discover(&self) -> Result<Discovery> {
        scan_filesystem(&self.config)
    }

    async fn stage(&self, candidate: &Candidate) -> Result<StagedFile> {
        Ok(StagedFile::InPlace(self.config.root.join(&candidate.id)))
    }
}

/// Scan the configured root and return sorted candidates.
///
/// Files that cannot be hashed are reported in [`Discovery::failed`].
pub fn scan_filesystem(config: &LocalSourceConfig) -> Result<Discovery> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "data directory not found: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut items = Vec::new();
    let mut failed = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_str.clone());

        let hash = match file_hash(path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(id = %rel_str, error = %e, "cannot read file");
                failed.push((rel_str, format!("cannot read: {}", e)));
                continue;
            }
        };

        items.push(Candidate {
            hash,
            id: rel_str,
            display_name,
        });
    }

    // Sort for deterministic ordering
    items.sort_by(|a, b| a.id.cmp(&b.id));
    failed.sort();

    Ok(Discovery {
        candidates: items,
        failed,
    })
}

/// Build a case-insensitive [`GlobSet`] from pattern strings.
pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob set: {}", e)))
}

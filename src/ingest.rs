//! Sync orchestration.
//!
//! One run walks a fixed sequence of steps:
//!
//! ```text
//! resolve store → load state → discover → diff → upload loop → report
//! ```
//!
//! Each accepted upload is committed and persisted before the next file is
//! attempted, so a crash loses at most the file in flight. A file that fails
//! is left out of the state and picked up again next run; it never aborts
//! the run. Only failing to resolve the store handle is fatal.

use std::sync::Arc;

use crate::error::Result;
use crate::models::SyncReport;
use crate::store_handle::{load_handle, StoreResolver};
use crate::tracker::{self, ChangeTracker};
use crate::traits::{DocumentSource, DocumentStore, StateStore};
use crate::uploader::{RetryPolicy, Uploader};

/// Everything a sync run needs, built by the entry point.
pub struct SyncContext {
    pub source: Arc<dyn DocumentSource>,
    pub state: Arc<dyn StateStore>,
    pub store: Arc<dyn DocumentStore>,
    pub policy: RetryPolicy,
    /// Display name used if a new store has to be created.
    pub store_display_name: String,
}

/// Run one incremental sync.
///
/// With `dry_run` the store is neither created nor written to and the state
/// is left untouched; the report lists what would be uploaded.
pub async fn run_sync(ctx: &SyncContext, dry_run: bool) -> Result<SyncReport> {
    let label = ctx.source.label().to_string();

    let store = if dry_run {
        load_handle(ctx.state.as_ref())
            .await?
            .unwrap_or_else(|| "<not created>".to_string())
    } else {
        StoreResolver::new(
            ctx.state.clone(),
            ctx.store.clone(),
            ctx.store_display_name.clone(),
        )
        .resolve()
        .await?
    };

    let tracker = ChangeTracker::new(ctx.state.clone());
    let mut state = tracker.load_or_empty().await?;

    tracing::info!(source = %label, "discovering documents");
    let discovery = ctx.source.discover().await?;
    let candidates = discovery.candidates;
    let diff = tracker::diff_hashed(
        candidates.iter().map(|c| (c.id.clone(), c.hash.clone())),
        &state,
    );

    for id in &diff.unchanged {
        tracing::info!(id = %id, "[SKIP] already indexed and unchanged");
    }
    for id in &diff.to_upload {
        if state.contains_key(id) {
            tracing::info!(id = %id, "[CHANGED]");
        } else {
            tracing::info!(id = %id, "[NEW]");
        }
    }

    let mut report = SyncReport {
        store: store.clone(),
        discovered: candidates.len() + discovery.failed.len(),
        unchanged: diff.unchanged.len(),
        failed: discovery.failed,
        dry_run,
        ..SyncReport::default()
    };

    if dry_run {
        report.uploaded = diff.to_upload;
        return Ok(report);
    }
    if diff.to_upload.is_empty() {
        tracing::info!("no new or changed documents, index is up to date");
        return Ok(report);
    }

    let uploader = Uploader::new(ctx.store.clone(), ctx.policy.clone());

    for id in &diff.to_upload {
        let Some(candidate) = candidates.iter().find(|c| &c.id == id) else {
            continue;
        };

        let staged = match ctx.source.stage(candidate).await {
            Ok(staged) => staged,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "could not stage file");
                report.failed.push((id.clone(), e.to_string()));
                continue;
            }
        };

        tracing::info!(id = %id, store = %store, "uploading");
        let result = uploader
            .upload_and_wait(&store, id, staged.path(), &candidate.display_name)
            .await;
        drop(staged);

        if result.accepted {
            state = tracker::commit(state, id, &candidate.hash);
            tracker.save(&state).await?;
            tracing::info!(id = %id, "indexed");
            report.uploaded.push(id.clone());
        } else {
            let reason = result.error.unwrap_or_else(|| "not accepted".to_string());
            tracing::warn!(id = %id, reason = %reason, "upload failed, will retry next run");
            report.failed.push((id.clone(), reason));
        }
    }

    Ok(report)
}

/// Print the run summary to stdout.
pub fn print_report(label: &str, report: &SyncReport) {
    if report.dry_run {
        println!("sync {} (dry-run)", label);
    } else {
        println!("sync {}", label);
    }
    println!("  store: {}", report.store);
    println!("  discovered: {}", report.discovered);
    println!("  unchanged: {}", report.unchanged);
    if report.dry_run {
        println!("  would upload: {}", report.uploaded.len());
        for id in &report.uploaded {
            println!("    {}", id);
        }
    } else {
        println!("  uploaded: {}", report.uploaded.len());
    }
    println!("  failed: {}", report.failed.len());
    for (id, reason) in &report.failed {
        println!("    {}: {}", id, reason);
    }
    if !report.dry_run && report.failed.is_empty() {
        println!("ok");
    }
}

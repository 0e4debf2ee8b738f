//! Deferred deletion ("staling") of uploads.
//!
//! A staled upload is deleted after a delay unless someone keeps it first.
//! The job table is the single source of truth for who wins: when the timer
//! fires, the task removes its own entry under the lock and only deletes if
//! the entry was still there. `cancel` removes the entry under the same lock,
//! so exactly one of "kept" or "deleted" happens.
//!
//! Jobs live in memory only. A restart forgets every pending deletion.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{
    errors::{FileError, FileResult},
    models::file_kind::FileKind,
    services::file_service::FileService,
};

struct StaleJob {
    /// Distinguishes this job from an earlier one for the same identifier.
    ticket: u64,
    kind: FileKind,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct StalingScheduler {
    files: FileService,
    jobs: Arc<Mutex<HashMap<String, StaleJob>>>,
    next_ticket: Arc<AtomicU64>,
}

impl StalingScheduler {
    pub fn new(files: FileService) -> Self {
        Self {
            files,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: Arc::new(AtomicU64::new(1)),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, StaleJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delete `{kind}/{file_id}` after `delay` unless cancelled.
    ///
    /// A pending job for the same identifier is replaced; its timer is dropped.
    pub fn schedule(&self, kind: FileKind, file_id: &str, delay: Duration) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let id = file_id.to_string();

        // Hold the lock while spawning so the task cannot observe the table
        // before its own entry is in it.
        let mut jobs = self.table();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(kind, &id, ticket).await;
        });
        let replaced = jobs.insert(
            file_id.to_string(),
            StaleJob {
                ticket,
                kind,
                handle,
            },
        );
        drop(jobs);

        if let Some(old) = replaced {
            old.handle.abort();
            debug!(file_id, old_kind = %old.kind, "replaced pending staling job");
        }
        info!(%kind, file_id, delay_secs = delay.as_secs(), "staling scheduled");
    }

    /// Claim the job and delete. Does nothing if the job was cancelled or
    /// replaced in the meantime.
    async fn fire(&self, kind: FileKind, file_id: &str, ticket: u64) {
        let claimed = {
            let mut jobs = self.table();
            let current = jobs.get(file_id).map(|job| job.ticket);
            current == Some(ticket) && jobs.remove(file_id).is_some()
        };
        if !claimed {
            debug!(file_id, "staling job no longer pending");
            return;
        }

        match self.files.delete(kind, file_id).await {
            Ok(()) => info!(%kind, file_id, "staled file deleted"),
            Err(err) => error!(%kind, file_id, error = %err, "staled file deletion failed"),
        }
    }

    /// Keep the upload: stop its pending deletion.
    ///
    /// Fails with `NotFound` if nothing is pending, including when the job
    /// already fired or was cancelled before.
    pub fn cancel(&self, file_id: &str) -> FileResult<()> {
        let job = self
            .table()
            .remove(file_id)
            .ok_or_else(|| FileError::NotFound(format!("staling job for `{}`", file_id)))?;
        job.handle.abort();
        info!(kind = %job.kind, file_id, "staling cancelled");
        Ok(())
    }

    #[cfg(test)]
    pub fn is_pending(&self, file_id: &str) -> bool {
        self.table().contains_key(file_id)
    }

    pub fn pending_count(&self) -> usize {
        self.table().len()
    }
}

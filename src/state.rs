//! Shared state handed to every handler.

use std::time::Duration;

use crate::services::{file_service::FileService, scheduler::StalingScheduler};

#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    pub scheduler: StalingScheduler,
    /// Largest accepted upload in bytes.
    pub max_file_size: usize,
    /// How long a staled upload lives before deletion.
    pub stale_delay: Duration,
}

impl AppState {
    pub fn new(files: FileService, max_file_size: usize, stale_delay: Duration) -> Self {
        Self {
            scheduler: StalingScheduler::new(files.clone()),
            files,
            max_file_size,
            stale_delay,
        }
    }
}

//! HTTP handlers. Each one parses the request, calls into `FileService` or
//! `StalingScheduler`, and shapes the JSON reply.

pub mod file_handlers;
pub mod health_handlers;
pub mod stale_handlers;

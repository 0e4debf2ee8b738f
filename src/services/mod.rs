//! Domain services: key layout, identifier allocation, metadata sidecars,
//! the file lifecycle and deferred deletion, plus the store backends they
//! run on.

pub mod allocator;
pub mod backend;
pub mod file_service;
pub mod key_layout;
pub mod metadata_store;
pub mod scheduler;
pub mod transform;

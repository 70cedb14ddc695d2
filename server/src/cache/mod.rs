//! In-memory caches

pub mod updates;

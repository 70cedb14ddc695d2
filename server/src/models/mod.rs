//! Data models

pub mod agent;
pub mod deployment;
pub mod task;

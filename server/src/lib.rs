//! Dockfleet Server Library
//!
//! Task orchestration for a fleet of remote Docker hosts. Agents register,
//! heartbeat and poll for work; the server queues tasks, tracks the
//! deployments they drive and offers blocking calls on top of polling.

pub mod app;
pub mod cache;
pub mod clock;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod liveness;
pub mod logs;
pub mod models;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod storage;
pub mod store;
pub mod tasks;
pub mod utils;

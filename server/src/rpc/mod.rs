//! Request/response semantics over polled agent tasks

pub mod decode;
pub mod emulator;

pub use emulator::{tokio_sleep, CallOptions, CallOutcome, CallState, RpcEmulator, SleepFn};

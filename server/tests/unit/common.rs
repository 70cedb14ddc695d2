//! Shared fixtures

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use dockfleet::app::state::AppState;
use dockfleet::clock::ManualClock;
use dockfleet::liveness::DEFAULT_LIVENESS_TIMEOUT;
use dockfleet::models::agent::{Agent, AgentRegistration};
use dockfleet::rpc::emulator::{tokio_sleep, CallOptions, SleepFn};
use dockfleet::store::Store;

pub struct Fleet {
    pub app: AppState,
    pub clock: Arc<ManualClock>,
}

/// Sleep that only yields, so polls run back to back
pub fn yield_sleep() -> SleepFn {
    Arc::new(|_| Box::pin(tokio::task::yield_now()))
}

pub fn quick_options(max_attempts: u32) -> CallOptions {
    CallOptions {
        max_attempts,
        delay: Duration::from_millis(10),
    }
}

pub fn fleet_with(rpc: CallOptions, sleep_fn: SleepFn) -> Fleet {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let app = AppState::assemble(
        Arc::new(Store::in_memory()),
        clock.clone(),
        DEFAULT_LIVENESS_TIMEOUT,
        rpc,
        sleep_fn,
    );
    Fleet { app, clock }
}

/// Fleet whose calls give up after three instant polls
pub fn fleet() -> Fleet {
    fleet_with(quick_options(3), yield_sleep())
}

/// Fleet whose calls wait on the real timer for up to a few seconds
pub fn patient_fleet() -> Fleet {
    fleet_with(
        CallOptions {
            max_attempts: 1000,
            delay: Duration::from_millis(2),
        },
        tokio_sleep(),
    )
}

pub async fn register(fleet: &Fleet, id: &str, hostname: &str) -> Agent {
    fleet
        .app
        .registry
        .register(AgentRegistration {
            id: id.to_string(),
            hostname: hostname.to_string(),
            platform: "linux/amd64".to_string(),
            version: "1.4.0".to_string(),
            capabilities: ["compose".to_string(), "docker".to_string()].into(),
            ..Default::default()
        })
        .await
        .unwrap()
}

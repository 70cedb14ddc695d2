//! Agent liveness derived at read time
//!
//! The stored `Agent::status` is only the last label a heartbeat or
//! registration wrote. Anything that needs to know whether an agent is
//! reachable asks the monitor, which compares `last_seen` against a fixed
//! timeout using the current clock. Nothing here writes to the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::models::agent::{Agent, AgentStatus};
use crate::utils::to_chrono;

/// Default liveness timeout
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(300);

/// `now - last_seen <= timeout`. A `last_seen` ahead of `now` counts as online.
pub fn is_online_at(last_seen: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    now.signed_duration_since(last_seen) <= to_chrono(timeout)
}

/// Derives online/offline from elapsed time since the last heartbeat
#[derive(Clone)]
pub struct LivenessMonitor {
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { timeout, clock }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_online(&self, agent: &Agent) -> bool {
        is_online_at(agent.last_seen, self.clock.now(), self.timeout)
    }

    pub fn effective_status(&self, agent: &Agent) -> AgentStatus {
        if self.is_online(agent) {
            AgentStatus::Online
        } else {
            AgentStatus::Offline
        }
    }

    /// Copy of `agent` with the stored label replaced by the derived one
    pub fn with_effective_status(&self, agent: &Agent) -> Agent {
        let mut agent = agent.clone();
        agent.status = self.effective_status(&agent);
        agent
    }
}

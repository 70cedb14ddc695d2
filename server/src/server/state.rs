//! Server state

use std::sync::Arc;

use crate::deploy::actions::DeploymentActions;
use crate::deploy::tracker::DeploymentTracker;
use crate::liveness::LivenessMonitor;
use crate::registry::AgentRegistry;
use crate::rpc::emulator::RpcEmulator;
use crate::tasks::queue::TaskQueue;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<AgentRegistry>,
    pub tasks: Arc<TaskQueue>,
    pub tracker: Arc<DeploymentTracker>,
    pub rpc: Arc<RpcEmulator>,
    pub actions: Arc<DeploymentActions>,
    pub liveness: LivenessMonitor,
}

impl ServerState {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tasks: Arc<TaskQueue>,
        tracker: Arc<DeploymentTracker>,
        rpc: Arc<RpcEmulator>,
        actions: Arc<DeploymentActions>,
        liveness: LivenessMonitor,
    ) -> Self {
        Self {
            registry,
            tasks,
            tracker,
            rpc,
            actions,
            liveness,
        }
    }
}

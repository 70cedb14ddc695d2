//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::app::options::StorageOptions;
use crate::cache::updates::UpdateGuard;
use crate::clock::{Clock, SystemClock};
use crate::deploy::actions::DeploymentActions;
use crate::deploy::tracker::DeploymentTracker;
use crate::errors::FleetError;
use crate::liveness::LivenessMonitor;
use crate::registry::AgentRegistry;
use crate::rpc::emulator::{tokio_sleep, CallOptions, RpcEmulator, SleepFn};
use crate::server::state::ServerState;
use crate::store::Store;
use crate::tasks::queue::TaskQueue;

/// Main application state
pub struct AppState {
    /// Agent, task and deployment tables
    pub store: Arc<Store>,

    pub clock: Arc<dyn Clock>,

    pub registry: Arc<AgentRegistry>,

    pub tasks: Arc<TaskQueue>,

    pub tracker: Arc<DeploymentTracker>,

    pub rpc: Arc<RpcEmulator>,

    pub actions: Arc<DeploymentActions>,

    pub liveness: LivenessMonitor,
}

impl AppState {
    /// Open the store and build the services on top of it
    pub async fn init(
        storage: &StorageOptions,
        liveness_timeout: Duration,
        rpc: CallOptions,
    ) -> Result<Self, FleetError> {
        info!("Initializing application state...");

        let store = if storage.persist {
            Store::open(&storage.layout.data_dir()).await?
        } else {
            info!("Persistence disabled, keeping state in memory");
            Store::in_memory()
        };

        Ok(Self::assemble(
            Arc::new(store),
            Arc::new(SystemClock),
            liveness_timeout,
            rpc,
            tokio_sleep(),
        ))
    }

    /// Wire services over an open store
    pub fn assemble(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        liveness_timeout: Duration,
        rpc: CallOptions,
        sleep_fn: SleepFn,
    ) -> Self {
        let liveness = LivenessMonitor::new(liveness_timeout, clock.clone());
        let registry = Arc::new(AgentRegistry::new(store.clone(), clock.clone()));
        let tracker = Arc::new(DeploymentTracker::new(store.clone(), clock.clone()));
        let tasks = Arc::new(TaskQueue::new(
            store.clone(),
            registry.clone(),
            liveness.clone(),
            tracker.clone(),
            clock.clone(),
        ));
        let rpc = Arc::new(RpcEmulator::new(tasks.clone(), sleep_fn, rpc));
        let actions = Arc::new(DeploymentActions::new(
            tasks.clone(),
            tracker.clone(),
            rpc.clone(),
            UpdateGuard::new(),
        ));

        Self {
            store,
            clock,
            registry,
            tasks,
            tracker,
            rpc,
            actions,
            liveness,
        }
    }

    /// Handler view of this state
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.registry.clone(),
            self.tasks.clone(),
            self.tracker.clone(),
            self.rpc.clone(),
            self.actions.clone(),
            self.liveness.clone(),
        )
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), FleetError> {
        info!("Shutting down application state...");
        self.store.flush().await
    }
}

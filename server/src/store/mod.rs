//! Persistent store for agents, tasks and deployments

pub mod flusher;
pub mod table;

use tracing::{debug, info};

use crate::errors::FleetError;
use crate::filesys::dir::Dir;
use crate::models::agent::Agent;
use crate::models::deployment::Deployment;
use crate::models::task::AgentTask;

pub use table::{Record, Table};

impl Record for Agent {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for AgentTask {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for Deployment {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// The three durable tables
pub struct Store {
    pub agents: Table<Agent>,
    pub tasks: Table<AgentTask>,
    pub deployments: Table<Deployment>,
}

impl Store {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            agents: Table::in_memory("agents"),
            tasks: Table::in_memory("tasks"),
            deployments: Table::in_memory("deployments"),
        }
    }

    /// Open the JSON-backed tables under `data_dir`
    pub async fn open(data_dir: &Dir) -> Result<Self, FleetError> {
        data_dir.create().await?;

        let store = Self {
            agents: Table::open("agents", data_dir.file("agents.json")).await?,
            tasks: Table::open("tasks", data_dir.file("tasks.json")).await?,
            deployments: Table::open("deployments", data_dir.file("deployments.json")).await?,
        };

        info!(
            agents = store.agents.len(),
            tasks = store.tasks.len(),
            deployments = store.deployments.len(),
            "Opened store at {}",
            data_dir.path().display()
        );
        Ok(store)
    }

    /// Write every table, dirty or not
    pub async fn flush(&self) -> Result<(), FleetError> {
        self.agents.persist().await?;
        self.tasks.persist().await?;
        self.deployments.persist().await?;
        debug!(
            agents = self.agents.flushes(),
            tasks = self.tasks.flushes(),
            deployments = self.deployments.flushes(),
            "Store flushed"
        );
        Ok(())
    }

    /// Write the tables holding deferred changes, returning how many were written
    pub async fn flush_dirty(&self) -> Result<usize, FleetError> {
        let mut written = 0;
        for flushed in [
            self.agents.flush_if_dirty().await?,
            self.tasks.flush_if_dirty().await?,
            self.deployments.flush_if_dirty().await?,
        ] {
            written += usize::from(flushed);
        }
        Ok(written)
    }
}

//! Agent registry: identity, capability metadata and heartbeat state

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::errors::FleetError;
use crate::models::agent::{
    Agent, AgentMetrics, AgentRegistration, AgentStatus, AgentUpdate, DockerInfo,
};
use crate::store::Store;

/// Agent registry built on the store
pub struct AgentRegistry {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register an agent, or refresh an existing registration with the same id.
    ///
    /// Re-registration keeps `registered_at` and forces the agent online.
    pub async fn register(&self, registration: AgentRegistration) -> Result<Agent, FleetError> {
        if registration.id.trim().is_empty() {
            return Err(FleetError::ValidationError("agent id must not be empty".to_string()));
        }
        if registration.hostname.trim().is_empty() {
            return Err(FleetError::ValidationError(
                "agent hostname must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let id = registration.id.clone();
        let agent = self
            .store
            .agents
            .merge(&id, |existing| match existing {
                Some(current) => {
                    let mut agent = current.clone();
                    agent.hostname = registration.hostname;
                    agent.platform = registration.platform;
                    agent.version = registration.version;
                    agent.capabilities = registration.capabilities;
                    if let Some(metrics) = registration.metrics {
                        agent.metrics = Some(metrics);
                    }
                    if let Some(docker_info) = registration.docker_info {
                        agent.docker_info = Some(docker_info);
                    }
                    if let Some(metadata) = registration.metadata {
                        agent.metadata = metadata;
                    }
                    agent.status = AgentStatus::Online;
                    agent.last_seen = now;
                    agent
                }
                None => Agent {
                    id: registration.id,
                    hostname: registration.hostname,
                    platform: registration.platform,
                    version: registration.version,
                    capabilities: registration.capabilities,
                    status: AgentStatus::Online,
                    last_seen: now,
                    registered_at: now,
                    metrics: registration.metrics,
                    docker_info: registration.docker_info,
                    metadata: registration.metadata.unwrap_or_default(),
                },
            })
            .await?;

        info!(
            agent_id = %agent.id,
            hostname = %agent.hostname,
            version = %agent.version,
            "Agent registered"
        );
        Ok(agent)
    }

    /// Get the stored agent record. Liveness is not derived here.
    pub fn get_agent(&self, id: &str) -> Result<Agent, FleetError> {
        self.store
            .agents
            .get(id)
            .ok_or_else(|| FleetError::AgentNotFound(id.to_string()))
    }

    /// All agents, most recently seen first
    pub fn list_agents(&self) -> Vec<Agent> {
        let mut agents = self.store.agents.list();
        agents.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        agents
    }

    /// Apply a partial update
    pub async fn update_agent(&self, id: &str, update: AgentUpdate) -> Result<Agent, FleetError> {
        let (_, agent) = self
            .store
            .agents
            .modify(id, |agent| {
                update.apply(agent);
                Ok(())
            })
            .await?
            .ok_or_else(|| FleetError::AgentNotFound(id.to_string()))?;
        Ok(agent)
    }

    /// Mark the agent online and bump `last_seen`. Touches nothing else.
    ///
    /// Heartbeats arrive with every poll, so the change is deferred and
    /// reaches disk with the next flush instead of rewriting the table.
    pub async fn update_heartbeat(&self, id: &str) -> Result<Agent, FleetError> {
        let now = self.clock.now();
        let (_, agent) = self
            .store
            .agents
            .modify_deferred(id, |agent| {
                agent.status = AgentStatus::Online;
                if now > agent.last_seen {
                    agent.last_seen = now;
                }
                Ok(())
            })?
            .ok_or_else(|| FleetError::AgentNotFound(id.to_string()))?;

        debug!(agent_id = %id, last_seen = %agent.last_seen, "Heartbeat");
        Ok(agent)
    }

    /// Store counts an agent piggybacked on its heartbeat. Deferred like the
    /// heartbeat itself.
    pub async fn record_telemetry(
        &self,
        id: &str,
        metrics: Option<AgentMetrics>,
        docker_info: Option<DockerInfo>,
    ) -> Result<Agent, FleetError> {
        let update = AgentUpdate {
            metrics,
            docker_info,
            ..Default::default()
        };
        let (_, agent) = self
            .store
            .agents
            .modify_deferred(id, |agent| {
                update.apply(agent);
                Ok(())
            })?
            .ok_or_else(|| FleetError::AgentNotFound(id.to_string()))?;
        Ok(agent)
    }

    /// Delete the agent and every task it owns. Deployments are left in place.
    pub async fn delete_agent(&self, id: &str) -> Result<usize, FleetError> {
        if !self.store.agents.contains(id) {
            return Err(FleetError::AgentNotFound(id.to_string()));
        }

        let mut removed_tasks = self.store.tasks.delete_where(|t| t.agent_id == id).await?;
        self.store.agents.delete(id).await?;
        // a dispatch that resolved the agent before the delete may have landed since
        removed_tasks += self.store.tasks.delete_where(|t| t.agent_id == id).await?;

        info!(agent_id = %id, removed_tasks, "Agent deleted");
        Ok(removed_tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn registration(id: &str, hostname: &str, caps: &[&str]) -> AgentRegistration {
        AgentRegistration {
            id: id.to_string(),
            hostname: hostname.to_string(),
            platform: "linux/amd64".to_string(),
            version: "1.0.0".to_string(),
            capabilities: caps.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            ..Default::default()
        }
    }

    fn registry() -> (AgentRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = AgentRegistry::new(Arc::new(Store::in_memory()), clock.clone());
        (registry, clock)
    }

    #[tokio::test]
    async fn test_register_rejects_empty_id() {
        let (registry, _) = registry();
        let result = registry.register(registration(" ", "host1", &[])).await;
        assert!(matches!(result, Err(FleetError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_heartbeat_only_touches_liveness() {
        let (registry, clock) = registry();
        registry.register(registration("A1", "host1", &["compose"])).await.unwrap();
        registry
            .update_agent(
                "A1",
                AgentUpdate {
                    status: Some(AgentStatus::Offline),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(10));
        let agent = registry.update_heartbeat("A1").await.unwrap();

        assert_eq!(agent.status, AgentStatus::Online);
        assert_eq!(agent.last_seen, clock.now());
        assert_eq!(agent.hostname, "host1");
        assert!(agent.capabilities.contains("compose"));
    }

    #[tokio::test]
    async fn test_heartbeat_never_moves_last_seen_backwards() {
        let (registry, clock) = registry();
        registry.register(registration("A1", "host1", &[])).await.unwrap();
        let seen = registry.get_agent("A1").unwrap().last_seen;

        clock.advance(chrono::Duration::seconds(-30));
        let agent = registry.update_heartbeat("A1").await.unwrap();
        assert_eq!(agent.last_seen, seen);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_agent() {
        let (registry, _) = registry();
        let result = registry.update_heartbeat("ghost").await;
        assert!(matches!(result, Err(FleetError::AgentNotFound(id)) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_update_unknown_agent() {
        let (registry, _) = registry();
        let result = registry.update_agent("ghost", AgentUpdate::default()).await;
        assert!(matches!(result, Err(FleetError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_agents_most_recent_first() {
        let (registry, clock) = registry();
        registry.register(registration("A1", "host1", &[])).await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        registry.register(registration("A2", "host2", &[])).await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        registry.update_heartbeat("A1").await.unwrap();

        let ids: Vec<String> = registry.list_agents().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["A1".to_string(), "A2".to_string()]);
    }

    #[tokio::test]
    async fn test_heartbeats_do_not_rewrite_the_table() {
        let dir = std::env::temp_dir().join(format!("dockfleet-hb-{}", uuid::Uuid::new_v4()));
        let data = crate::filesys::dir::Dir::new(&dir);
        let store = Arc::new(Store::open(&data).await.unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(AgentRegistry::new(store.clone(), clock.clone()));
        registry.register(registration("A1", "host1", &[])).await.unwrap();
        assert_eq!(store.agents.flushes(), 1);

        clock.advance(chrono::Duration::seconds(5));
        let beats = (0..200).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.update_heartbeat("A1").await })
        });
        for beat in futures::future::join_all(beats).await {
            beat.unwrap().unwrap();
        }
        registry
            .record_telemetry("A1", Some(AgentMetrics { containers: 3, ..Default::default() }), None)
            .await
            .unwrap();

        assert_eq!(store.agents.flushes(), 1);
        assert!(store.agents.is_dirty());

        assert_eq!(store.flush_dirty().await.unwrap(), 1);
        assert_eq!(store.agents.flushes(), 2);

        let reopened = Store::open(&data).await.unwrap();
        let agent = reopened.agents.get("A1").unwrap();
        assert_eq!(agent.last_seen, clock.now());
        assert_eq!(agent.metrics.unwrap().containers, 3);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_tasks_and_agent() {
        let (registry, clock) = registry();
        registry.register(registration("A1", "host1", &[])).await.unwrap();
        registry.register(registration("A2", "host2", &[])).await.unwrap();
        for (id, agent) in [("T1", "A1"), ("T2", "A1"), ("T3", "A2")] {
            registry
                .store
                .tasks
                .upsert(crate::models::task::AgentTask::new(
                    id.to_string(),
                    agent.to_string(),
                    crate::models::task::TaskType::StackList,
                    serde_json::json!({}),
                    clock.now(),
                ))
                .await
                .unwrap();
        }

        assert_eq!(registry.delete_agent("A1").await.unwrap(), 2);
        assert!(registry.store.tasks.get("T3").is_some());
        assert_eq!(registry.store.tasks.len(), 1);
        assert!(matches!(registry.get_agent("A1"), Err(FleetError::AgentNotFound(_))));
    }
}

//! Session registry: live onboarding sessions by id, plus the idle sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::manager::{FlowServices, OnboardingFlow};
use crate::error::FlowError;

/// How often the idle sweep runs.
const PRUNE_INTERVAL_SECS: u64 = 60;

/// All live onboarding sessions.
pub struct SessionRegistry {
    services: FlowServices,
    sessions: RwLock<HashMap<Uuid, Arc<OnboardingFlow>>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(services: FlowServices, idle_timeout: Duration) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Start a fresh session at `welcome`.
    pub async fn create(&self) -> Arc<OnboardingFlow> {
        let flow = Arc::new(OnboardingFlow::new(self.services.clone()));
        self.sessions.write().await.insert(flow.id(), flow.clone());
        debug!(session_id = %flow.id(), "Onboarding session started");
        flow
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<OnboardingFlow>, FlowError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(FlowError::SessionNotFound(id))
    }

    /// Drop a session ("leave"). Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            debug!(session_id = %id, "Onboarding session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle for longer than the timeout. Returns how many
    /// were dropped.
    pub async fn prune_idle(&self) -> usize {
        let flows: Vec<Arc<OnboardingFlow>> =
            self.sessions.read().await.values().cloned().collect();

        let mut stale = Vec::new();
        for flow in flows {
            if flow.idle_for().await > self.idle_timeout {
                stale.push(flow.id());
            }
        }
        if stale.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        for id in &stale {
            sessions.remove(id);
        }
        stale.len()
    }
}

/// Spawn the background loop that drops idle sessions.
pub fn spawn_session_pruner(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
        loop {
            tick.tick().await;
            let pruned = registry.prune_idle().await;
            if pruned > 0 {
                info!(pruned, "Dropped idle onboarding sessions");
            }
        }
    })
}

//! The cluster-manager's agent-listing contract (§6, out of core
//! scope): the pool only needs to know which AWS instances have a
//! registered agent and how much CPU that agent has allocated.

use std::sync::RwLock;
use std::time::Instant;

use clusterman_core::Market;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub instance_id: String,
    pub market: Market,
    pub allocated_cpu: f64,
}

impl AgentInfo {
    pub fn is_idle(&self) -> bool {
        self.allocated_cpu == 0.0
    }
}

/// A thin view over the cluster manager's agent listing. Implemented
/// once for real use (an HTTP client against the cluster manager's
/// API) and once as an in-memory double for tests.
pub trait ClusterManagerClient: Send + Sync {
    fn list_agents(&self) -> Vec<AgentInfo>;
}

/// The real `ClusterManagerClient`: an HTTP client against the cluster
/// manager's agent-listing API. `list_agents` is a synchronous trait
/// method so it can be called from the synchronous capacity math in
/// `PoolManager`; the HTTP round trip itself happens in `refresh`,
/// which callers are expected to `await` once per tick before reading
/// `list_agents` (mirroring the explicit per-property TTL cache used
/// for AWS launch-config lookups in `clusterman-resource-groups`).
pub struct HttpClusterManagerClient {
    base_url: String,
    http: reqwest::Client,
    cache: RwLock<(Vec<AgentInfo>, Instant)>,
}

#[derive(Deserialize)]
struct AgentsResponse {
    agents: Vec<AgentPayload>,
}

#[derive(Deserialize)]
struct AgentPayload {
    instance_id: String,
    instance_type: String,
    availability_zone: String,
    allocated_cpu: f64,
}

impl HttpClusterManagerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            cache: RwLock::new((Vec::new(), Instant::now())),
        }
    }

    /// Refresh the cached agent list from the cluster manager's API.
    /// Call this once per autoscaler tick; `list_agents` always reads
    /// whatever was last fetched here rather than making its own call.
    pub async fn refresh(&self) -> Result<(), reqwest::Error> {
        let url = format!("{}/v1/agents", self.base_url.trim_end_matches('/'));
        let resp: AgentsResponse = self.http.get(&url).send().await?.error_for_status()?.json().await?;
        let agents = resp
            .agents
            .into_iter()
            .map(|a| AgentInfo {
                instance_id: a.instance_id,
                market: Market::new(a.instance_type, a.availability_zone),
                allocated_cpu: a.allocated_cpu,
            })
            .collect();
        *self.cache.write().unwrap() = (agents, Instant::now());
        Ok(())
    }

    pub fn last_refreshed(&self) -> Instant {
        self.cache.read().unwrap().1
    }
}

impl ClusterManagerClient for HttpClusterManagerClient {
    fn list_agents(&self) -> Vec<AgentInfo> {
        self.cache.read().unwrap().0.clone()
    }
}

#[cfg(any(test, feature = "testutil"))]
pub struct StaticClusterManagerClient {
    agents: Vec<AgentInfo>,
}

#[cfg(any(test, feature = "testutil"))]
impl StaticClusterManagerClient {
    pub fn new(agents: Vec<AgentInfo>) -> Self {
        Self { agents }
    }
}

#[cfg(any(test, feature = "testutil"))]
impl ClusterManagerClient for StaticClusterManagerClient {
    fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.clone()
    }
}

//! Workload read/write: the one place the control loop performs blocking
//! I/O against the cluster (or, in tests, an in-memory double).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use reqwest::Url;

use resources::objects::node::Capacity;
use resources::objects::pod::PodSpec;

use crate::error::EngineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct ClusterStats {
    pub node_count: u32,
    pub node_sum_allocatable: Capacity,
}

#[async_trait::async_trait]
pub trait Target: Send + Sync {
    async fn read(&self, kind: &str, namespace: &str, name: &str) -> Result<PodSpec>;
    async fn update_resources(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        updates: &PodSpec,
        dry_run: bool,
    ) -> Result<()>;
    async fn read_cluster_state(&self) -> Result<ClusterStats>;
}

/// Normalizes a target kind case-insensitively against the three supported
/// workload kinds. Anything else is `EngineError::UnhandledKind`.
pub fn normalize_kind(kind: &str) -> Result<&'static str, EngineError> {
    match kind.to_ascii_lowercase().as_str() {
        "replicaset" => Ok("ReplicaSet"),
        "daemonset" => Ok("DaemonSet"),
        "deployment" => Ok("Deployment"),
        other => Err(EngineError::UnhandledKind(other.to_string())),
    }
}

/// Talks to the declarative-resource API over HTTP, as the rest of this
/// workspace's controllers do via `reqwest`.
pub struct KubernetesTarget {
    client: reqwest::Client,
    api_server_url: Url,
}

impl KubernetesTarget {
    pub fn new(api_server_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client for target adapter")?;
        Ok(KubernetesTarget { client, api_server_url })
    }

    fn resource_url(&self, kind: &str, namespace: &str, name: &str) -> Result<Url> {
        let path = format!(
            "apis/v1/namespaces/{}/{}s/{}",
            namespace,
            kind.to_ascii_lowercase(),
            name
        );
        self.api_server_url
            .join(&path)
            .context("failed to build target resource URL")
    }
}

#[async_trait::async_trait]
impl Target for KubernetesTarget {
    async fn read(&self, kind: &str, namespace: &str, name: &str) -> Result<PodSpec> {
        let normalized = normalize_kind(kind)?;
        let url = self.resource_url(normalized, namespace, name)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to reach target API")?
            .error_for_status()
            .context("target API returned an error status")?;
        resp.json::<PodSpec>().await.context("failed to decode pod spec")
    }

    async fn update_resources(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        updates: &PodSpec,
        dry_run: bool,
    ) -> Result<()> {
        let normalized = normalize_kind(kind)?;
        if dry_run {
            tracing::info!(kind = normalized, namespace, name, "dry-run: would patch resources");
            return Ok(());
        }
        let url = self.resource_url(normalized, namespace, name)?;
        self.client
            .patch(url)
            .json(updates)
            .send()
            .await
            .context("failed to patch target resources")?
            .error_for_status()
            .context("target API rejected the patch")?;
        Ok(())
    }

    async fn read_cluster_state(&self) -> Result<ClusterStats> {
        let url = self
            .api_server_url
            .join("apis/v1/nodes")
            .context("failed to build nodes URL")?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to list nodes")?
            .error_for_status()
            .context("node list request returned an error status")?;
        let nodes: Vec<resources::objects::node::Node> =
            resp.json().await.context("failed to decode node list")?;
        let mut sum = Capacity::default();
        for node in &nodes {
            sum.cpu += node.status.allocatable.cpu;
            sum.memory += node.status.allocatable.memory;
        }
        Ok(ClusterStats {
            node_count: nodes.len() as u32,
            node_sum_allocatable: sum,
        })
    }
}

/// In-memory target for tests and the synchronous simulation mode (§5):
/// no network, counts every update it receives.
pub struct SimulationTarget {
    state: Mutex<HashMap<(String, String, String), PodSpec>>,
    cluster: Mutex<ClusterStats>,
    update_count: Mutex<u64>,
}

impl SimulationTarget {
    pub fn new(cluster: ClusterStats) -> Self {
        SimulationTarget {
            state: Mutex::new(HashMap::new()),
            cluster: Mutex::new(cluster),
            update_count: Mutex::new(0),
        }
    }

    pub fn seed(&self, kind: &str, namespace: &str, name: &str, spec: PodSpec) {
        self.state
            .lock()
            .insert((kind.to_string(), namespace.to_string(), name.to_string()), spec);
    }

    pub fn set_cluster_state(&self, stats: ClusterStats) {
        *self.cluster.lock() = stats;
    }

    pub fn update_count(&self) -> u64 {
        *self.update_count.lock()
    }
}

#[async_trait::async_trait]
impl Target for SimulationTarget {
    async fn read(&self, kind: &str, namespace: &str, name: &str) -> Result<PodSpec> {
        let normalized = normalize_kind(kind)?;
        self.state
            .lock()
            .get(&(normalized.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("no simulated pod spec seeded for {}/{}/{}", normalized, namespace, name))
    }

    async fn update_resources(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        updates: &PodSpec,
        dry_run: bool,
    ) -> Result<()> {
        let normalized = normalize_kind(kind)?;
        if dry_run {
            tracing::info!(kind = normalized, namespace, name, "dry-run: would patch resources");
            return Ok(());
        }
        self.state.lock().insert(
            (normalized.to_string(), namespace.to_string(), name.to_string()),
            updates.clone(),
        );
        *self.update_count.lock() += 1;
        Ok(())
    }

    async fn read_cluster_state(&self) -> Result<ClusterStats> {
        Ok(self.cluster.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_kind_is_case_insensitive() {
        assert_eq!(normalize_kind("replicaSet").unwrap(), "ReplicaSet");
        assert_eq!(normalize_kind("DAEMONSET").unwrap(), "DaemonSet");
        assert!(normalize_kind("statefulset").is_err());
    }

    #[tokio::test]
    async fn simulation_target_counts_updates() {
        let target = SimulationTarget::new(ClusterStats::default());
        target.seed("ReplicaSet", "default", "demo", PodSpec::default());
        target
            .update_resources("ReplicaSet", "default", "demo", &PodSpec::default(), false)
            .await
            .unwrap();
        assert_eq!(target.update_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate_or_count() {
        let target = SimulationTarget::new(ClusterStats::default());
        target.seed("ReplicaSet", "default", "demo", PodSpec::default());
        target
            .update_resources("ReplicaSet", "default", "demo", &PodSpec::default(), true)
            .await
            .unwrap();
        assert_eq!(target.update_count(), 0);
    }
}

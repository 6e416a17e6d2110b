//! Top-level control loop: a registry of [`PolicyState`]s serviced by two
//! independent periodic tasks. The registry lock is only ever held around
//! insert/remove/snapshot-the-list; per-policy work happens outside it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use resources::objects::node::Capacity;
use resources::objects::scaling_policy::ScalingPolicy;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::factors::KubernetesSnapshot;
use crate::state::{PolicyInfo, PolicyState};
use crate::target::Target;

pub struct ControllerOptions {
    pub poll_period: Duration,
    pub update_period: Duration,
    pub dry_run: bool,
}

pub struct Controller {
    policies: Mutex<HashMap<String, Arc<PolicyState>>>,
    target: Arc<dyn Target>,
    clock: Arc<dyn Clock>,
    options: ControllerOptions,
}

impl Controller {
    pub fn new(target: Arc<dyn Target>, clock: Arc<dyn Clock>, options: ControllerOptions) -> Self {
        Controller {
            policies: Mutex::new(HashMap::new()),
            target,
            clock,
            options,
        }
    }

    /// Insert a freshly-seen policy, or reconcile an existing one in place.
    pub fn upsert(&self, policy: ScalingPolicy) {
        let key = policy_key(&policy);
        let mut policies = self.policies.lock();
        if let Some(existing) = policies.get(&key) {
            existing.update_policy(policy);
        } else {
            let state = Arc::new(PolicyState::new(policy, self.target.clone(), self.options.dry_run));
            policies.insert(key, state);
        }
    }

    pub fn remove(&self, key: &str) {
        self.policies.lock().remove(key);
    }

    fn snapshot_policies(&self) -> Vec<Arc<PolicyState>> {
        self.policies.lock().values().cloned().collect()
    }

    /// One observe tick: a single cluster-stats read, fanned out to every policy.
    pub async fn observe_once(&self) {
        let stats = match self.target.read_cluster_state().await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cluster state, skipping observe tick");
                return;
            }
        };
        let snapshot = KubernetesSnapshot::new(stats.node_count, cluster_capacity(&stats));
        for policy in self.snapshot_policies() {
            policy.add_observation(self.clock.as_ref(), &snapshot);
        }
    }

    /// One apply tick: ask every policy whether it wants to patch, and do so.
    /// A single failing policy is logged and does not block the others.
    pub async fn apply_once(&self) {
        for policy in self.snapshot_policies() {
            if let Err(err) = policy.update_values().await {
                tracing::warn!(policy = %policy.key(), error = %err, "failed to apply policy, will retry next tick");
            }
        }
    }

    pub fn query(&self) -> HashMap<String, PolicyInfo> {
        self.policies
            .lock()
            .iter()
            .map(|(key, state)| (key.clone(), state.query()))
            .collect()
    }

    /// Run both periodic tasks until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let observer = {
            let controller = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(controller.options.poll_period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => controller.observe_once().await,
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };
        let applier = {
            let controller = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(controller.options.update_period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => controller.apply_once().await,
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };
        let _ = tokio::join!(observer, applier);
    }
}

fn cluster_capacity(stats: &crate::target::ClusterStats) -> Capacity {
    stats.node_sum_allocatable.clone()
}

fn policy_key(policy: &ScalingPolicy) -> String {
    policy.key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::target::{ClusterStats, SimulationTarget};
    use resources::objects::pod::PodSpec;
    use resources::objects::scaling_policy::{
        ContainerScalingRule, ResourceScalingFunction, ResourceScalingRule, ScalingPolicySpec, TargetRef,
    };
    use resources::objects::Metadata;
    use resources::quantity::Quantity;

    fn demo_policy() -> ScalingPolicy {
        ScalingPolicy {
            metadata: Metadata {
                name: "demo".into(),
                namespace: Some("default".into()),
            },
            spec: ScalingPolicySpec {
                scale_target_ref: TargetRef {
                    kind: "ReplicaSet".into(),
                    name: "demo".into(),
                },
                containers: vec![ContainerScalingRule {
                    name: "app".into(),
                    limits: vec![],
                    requests: vec![ResourceScalingRule {
                        resource: "memory".into(),
                        function: ResourceScalingFunction {
                            input: Some("cores".into()),
                            base: Quantity::parse("100Mi").unwrap(),
                            slope: Quantity::parse("10Mi").unwrap(),
                            per: 1,
                            segments: vec![],
                            delay_scale_down: None,
                        },
                        max: None,
                    }],
                }],
                smoothing: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn observe_and_apply_drive_a_single_policy_to_a_patch() {
        let target = Arc::new(SimulationTarget::new(ClusterStats {
            node_count: 2,
            node_sum_allocatable: Capacity { cpu: 8, memory: 1024 },
        }));
        target.seed("ReplicaSet", "default", "demo", PodSpec::default());
        let clock = Arc::new(SimulatedClock::new());
        let controller = Arc::new(Controller::new(
            target.clone(),
            clock,
            ControllerOptions {
                poll_period: Duration::from_secs(30),
                update_period: Duration::from_secs(30),
                dry_run: false,
            },
        ));
        controller.upsert(demo_policy());
        controller.observe_once().await;
        controller.apply_once().await;
        assert_eq!(target.update_count(), 1);
    }

    #[tokio::test]
    async fn a_failing_policy_does_not_block_others() {
        let target = Arc::new(SimulationTarget::new(ClusterStats::default()));
        // "demo" is never seeded, so its read fails; "other" is seeded and should still apply.
        target.seed("ReplicaSet", "default", "other", PodSpec::default());
        let clock = Arc::new(SimulatedClock::new());
        let controller = Arc::new(Controller::new(
            target.clone(),
            clock,
            ControllerOptions {
                poll_period: Duration::from_secs(30),
                update_period: Duration::from_secs(30),
                dry_run: false,
            },
        ));
        controller.upsert(demo_policy());
        let mut other = demo_policy();
        other.metadata.name = "other".to_string();
        other.spec.scale_target_ref.name = "other".to_string();
        controller.upsert(other);

        controller.observe_once().await;
        controller.apply_once().await;
        assert_eq!(target.update_count(), 1);
    }

    #[test]
    fn remove_drops_a_policy_from_the_registry() {
        let target = Arc::new(SimulationTarget::new(ClusterStats::default()));
        let clock = Arc::new(SimulatedClock::new());
        let controller = Controller::new(
            target,
            clock,
            ControllerOptions {
                poll_period: Duration::from_secs(30),
                update_period: Duration::from_secs(30),
                dry_run: false,
            },
        );
        controller.upsert(demo_policy());
        assert_eq!(controller.query().len(), 1);
        controller.remove("default/demo");
        assert_eq!(controller.query().len(), 0);
    }
}

//! Per-policy state: the policy itself, its smoothing strategy, and the
//! last actual spec read back from the target. One mutex guards all three;
//! since evaluation and smoothing are pure CPU, lock hold time stays short.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use resources::objects::pod::PodSpec;
use resources::objects::scaling_policy::ScalingPolicy;

use crate::clock::Clock;
use crate::factors::Snapshot;
use crate::smoothing::{Smoothing, SmoothingInfo};
use crate::target::Target;

struct Locked {
    policy: ScalingPolicy,
    smoothing: Smoothing,
    latest_actual: Option<PodSpec>,
}

pub struct PolicyState {
    namespace: String,
    name: String,
    target: Arc<dyn Target>,
    dry_run: bool,
    locked: Mutex<Locked>,
}

pub struct PolicyInfo {
    pub policy: ScalingPolicy,
    pub latest_actual: Option<PodSpec>,
    pub smoothing: SmoothingInfo,
}

impl PolicyState {
    pub fn new(policy: ScalingPolicy, target: Arc<dyn Target>, dry_run: bool) -> Self {
        let namespace = policy.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = policy.metadata.name.clone();
        let smoothing = Smoothing::new(&policy.spec.smoothing);
        PolicyState {
            namespace,
            name,
            target,
            dry_run,
            locked: Mutex::new(Locked {
                policy,
                smoothing,
                latest_actual: None,
            }),
        }
    }

    /// Replace the policy value, reconciling the smoothing strategy in
    /// place when its tag is unchanged.
    pub fn update_policy(&self, policy: ScalingPolicy) {
        let mut locked = self.locked.lock();
        locked.smoothing.update_rule(&policy.spec.smoothing);
        locked.policy = policy;
    }

    /// The observe-tick half of the loop: evaluate the policy against
    /// `snapshot` and feed it to the smoothing strategy.
    pub fn add_observation(&self, clock: &dyn Clock, snapshot: &dyn Snapshot) {
        let mut locked = self.locked.lock();
        let spec = locked.policy.spec.clone();
        locked.smoothing.update_target(clock, snapshot, &spec);
    }

    /// The apply-tick half of the loop: read current state, ask the
    /// smoothing strategy whether to patch, and write back if so.
    pub async fn update_values(&self) -> Result<()> {
        let (kind, namespace, name, dry_run) = {
            let locked = self.locked.lock();
            (
                locked.policy.spec.scale_target_ref.kind.clone(),
                self.namespace.clone(),
                locked.policy.spec.scale_target_ref.name.clone(),
                self.dry_run,
            )
        };
        let current = self
            .target
            .read(&kind, &namespace, &name)
            .await
            .with_context(|| format!("reading current spec for {}/{}", namespace, name))?;

        let (changed, diffs) = {
            let mut locked = self.locked.lock();
            locked.latest_actual = Some(current.clone());
            locked.smoothing.compute_change(&current)
        };
        if !changed {
            return Ok(());
        }

        let updates = crate::smoothing::apply_diffs(&current, &diffs);
        self.target
            .update_resources(&kind, &namespace, &name, &updates, dry_run)
            .await
            .with_context(|| format!("patching resources for {}/{}", namespace, name))
    }

    pub fn query(&self) -> PolicyInfo {
        let locked = self.locked.lock();
        PolicyInfo {
            policy: locked.policy.clone(),
            latest_actual: locked.latest_actual.clone(),
            smoothing: locked.smoothing.info(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::factors::StaticSnapshot;
    use crate::target::{ClusterStats, SimulationTarget};
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
                            input: Some("pods".into()),
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
    async fn observe_then_apply_patches_changed_resources() {
        let target = Arc::new(SimulationTarget::new(ClusterStats::default()));
        target.seed("ReplicaSet", "default", "demo", PodSpec::default());
        let state = PolicyState::new(demo_policy(), target.clone(), false);

        let clock = SimulatedClock::new();
        let snapshot = StaticSnapshot::new().with("pods", 10.0);
        state.add_observation(&clock, &snapshot);
        state.update_values().await.unwrap();

        assert_eq!(target.update_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_never_increments_update_count() {
        let target = Arc::new(SimulationTarget::new(ClusterStats::default()));
        target.seed("ReplicaSet", "default", "demo", PodSpec::default());
        let state = PolicyState::new(demo_policy(), target.clone(), true);

        let clock = SimulatedClock::new();
        let snapshot = StaticSnapshot::new().with("pods", 10.0);
        state.add_observation(&clock, &snapshot);
        state.update_values().await.unwrap();

        assert_eq!(target.update_count(), 0);
    }
}

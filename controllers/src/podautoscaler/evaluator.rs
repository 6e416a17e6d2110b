//! Evaluates a policy's scaling rules against a factor snapshot, producing
//! a pod spec whose containers carry computed resource lists.

use std::collections::BTreeMap;

use resources::objects::pod::{Container, PodSpec, ResourceRequirements};
use resources::objects::scaling_policy::{
    ContainerScalingRule, ResourceScalingFunction, ResourceScalingRule, ScalingPolicySpec, Segment,
};
use resources::quantity::Quantity;

use crate::factors::Snapshot;

/// Round `x` to the segment matching it, then up to the next multiple of
/// that segment's `every`. Segments are chosen by "closest-from-below":
/// the segment with the largest `at <= x`. Empty segment lists, or `x`
/// below every segment's `at`, leave `x` unrounded.
pub fn round_input(x: f64, segments: &[Segment]) -> f64 {
    if segments.is_empty() {
        return x;
    }
    let chosen = segments
        .iter()
        .filter(|s| (s.at as f64) <= x)
        .max_by_key(|s| s.at);
    let segment = match chosen {
        Some(s) => s,
        None => return x,
    };
    let every = segment.every.max(1) as f64;
    (((x / every) - 1e-3).ceil()) * every
}

/// Evaluate one rule's contribution, adding it onto `acc`.
fn eval_rule(acc: Quantity, rule: &ResourceScalingFunction, snapshot: &dyn Snapshot) -> Quantity {
    let mut acc = acc;
    if !rule.base.is_zero() {
        acc = acc.add(rule.base);
    }
    if let Some(input) = &rule.input {
        if !rule.slope.is_zero() {
            match snapshot.get(input) {
                Ok((value, true)) => {
                    let rounded = round_input(value, &rule.segments);
                    acc = acc.add(rule.slope.mul_div(rounded as i64, rule.per.max(1)));
                }
                Ok((_, false)) => {
                    tracing::debug!(input = %input, "factor not recognized, skipping slope term");
                }
                Err(err) => {
                    tracing::warn!(input = %input, error = %err, "factor lookup failed, skipping slope term");
                }
            }
        }
    }
    acc
}

fn eval_resource_list(
    rules: &[ResourceScalingRule],
    snapshot: &dyn Snapshot,
) -> BTreeMap<String, Quantity> {
    let mut totals: BTreeMap<String, Quantity> = BTreeMap::new();
    for rule in rules {
        let contribution = eval_rule(Quantity::zero(), &rule.function, snapshot);
        let entry = totals.entry(rule.resource.clone()).or_insert_with(Quantity::zero);
        *entry = entry.add(contribution);
        if let Some(max) = rule.max {
            if entry.cmp_value(&max).is_gt() {
                *entry = max;
            }
        }
    }
    totals
}

/// Evaluate every container in `spec` against `snapshot`. Containers whose
/// computed limits and requests are both empty are omitted.
pub fn compute_resources(spec: &ScalingPolicySpec, snapshot: &dyn Snapshot) -> PodSpec {
    let containers: Vec<Container> = spec
        .containers
        .iter()
        .filter_map(|rule: &ContainerScalingRule| {
            let limits = eval_resource_list(&rule.limits, snapshot);
            let requests = eval_resource_list(&rule.requests, snapshot);
            if limits.is_empty() && requests.is_empty() {
                return None;
            }
            Some(Container {
                name: rule.name.clone(),
                image: String::new(),
                ports: Vec::new(),
                resources: ResourceRequirements { limits, requests },
            })
        })
        .collect();
    PodSpec { containers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::StaticSnapshot;
    use resources::objects::scaling_policy::TargetRef;

    fn policy_with(containers: Vec<ContainerScalingRule>) -> ScalingPolicySpec {
        ScalingPolicySpec {
            scale_target_ref: TargetRef {
                kind: "ReplicaSet".into(),
                name: "demo".into(),
            },
            containers,
            smoothing: Default::default(),
        }
    }

    fn rule(resource: &str, base: &str, slope: &str, input: Option<&str>, segments: Vec<Segment>) -> ResourceScalingRule {
        ResourceScalingRule {
            resource: resource.to_string(),
            function: ResourceScalingFunction {
                input: input.map(str::to_string),
                base: Quantity::parse(base).unwrap(),
                slope: Quantity::parse(slope).unwrap(),
                per: 1,
                segments,
                delay_scale_down: None,
            },
            max: None,
        }
    }

    #[test]
    fn scales_linearly_with_recognized_input() {
        let snapshot = StaticSnapshot::new().with("pods", 10.0);
        let spec = policy_with(vec![ContainerScalingRule {
            name: "app".into(),
            limits: vec![],
            requests: vec![rule("memory", "100Mi", "10Mi", Some("pods"), vec![])],
        }]);
        let pod = compute_resources(&spec, &snapshot);
        let memory = &pod.containers[0].resources.requests["memory"];
        assert_eq!(memory.unscaled_value(), 200 * 2i64.pow(20));
    }

    #[test]
    fn negative_slope_is_allowed() {
        let snapshot = StaticSnapshot::new().with("pods", 5.0);
        let spec = policy_with(vec![ContainerScalingRule {
            name: "app".into(),
            limits: vec![],
            requests: vec![rule("memory", "100Mi", "-10Mi", Some("pods"), vec![])],
        }]);
        let pod = compute_resources(&spec, &snapshot);
        let memory = &pod.containers[0].resources.requests["memory"];
        assert_eq!(memory.unscaled_value(), 50 * 2i64.pow(20));
    }

    #[test]
    fn multiple_rules_on_same_resource_sum() {
        let snapshot = StaticSnapshot::new().with("pods", 4.0).with("nodes", 2.0);
        let spec = policy_with(vec![ContainerScalingRule {
            name: "app".into(),
            limits: vec![],
            requests: vec![
                rule("memory", "100Mi", "10Mi", Some("pods"), vec![]),
                rule("memory", "0", "20Mi", Some("nodes"), vec![]),
            ],
        }]);
        let pod = compute_resources(&spec, &snapshot);
        let memory = &pod.containers[0].resources.requests["memory"];
        assert_eq!(memory.unscaled_value(), 180 * 2i64.pow(20));
    }

    #[test]
    fn zero_slope_is_identity_on_base() {
        let snapshot = StaticSnapshot::new();
        let spec = policy_with(vec![ContainerScalingRule {
            name: "app".into(),
            limits: vec![],
            requests: vec![rule("cpu", "500m", "0", None, vec![])],
        }]);
        let pod = compute_resources(&spec, &snapshot);
        let cpu = &pod.containers[0].resources.requests["cpu"];
        assert_eq!(cpu.milli_value(), Quantity::parse("500m").unwrap().milli_value());
    }

    #[test]
    fn containers_with_no_computed_resources_are_omitted() {
        let snapshot = StaticSnapshot::new();
        let spec = policy_with(vec![ContainerScalingRule {
            name: "sidecar".into(),
            limits: vec![],
            requests: vec![],
        }]);
        let pod = compute_resources(&spec, &snapshot);
        assert!(pod.containers.is_empty());
    }

    #[test]
    fn segment_rounding_rounds_up_to_next_multiple() {
        let segments = vec![Segment { at: 6, every: 2 }, Segment { at: 20, every: 5 }];
        assert_eq!(round_input(26.0, &segments) as i64, 30);
        assert_eq!(round_input(19.0, &segments) as i64, 20);
    }

    #[test]
    fn segment_rounding_picks_closest_segment_from_below() {
        let segments = vec![Segment { at: 0, every: 2 }, Segment { at: 10, every: 3 }];
        // 9 is below the at:10 segment's threshold, so the at:0 segment applies.
        assert_eq!(round_input(9.0, &segments) as i64, 10);
        // 12 clears the at:10 threshold.
        assert_eq!(round_input(12.0, &segments) as i64, 12);
    }

    #[test]
    fn segment_rounding_leaves_boundary_values_unbumped() {
        let segments = vec![Segment { at: 0, every: 5 }];
        assert_eq!(round_input(10.0, &segments) as i64, 10);
    }

    #[test]
    fn end_to_end_segment_scenario() {
        let snapshot = StaticSnapshot::new().with("pods", 26.0).with("nodes", 19.0);
        let spec = policy_with(vec![ContainerScalingRule {
            name: "app".into(),
            limits: vec![],
            requests: vec![
                rule(
                    "memory",
                    "200Mi",
                    "7Mi",
                    Some("pods"),
                    vec![Segment { at: 6, every: 2 }, Segment { at: 20, every: 5 }],
                ),
                rule(
                    "cpu",
                    "100m",
                    "23m",
                    Some("nodes"),
                    vec![Segment { at: 10, every: 5 }, Segment { at: 20, every: 10 }],
                ),
            ],
        }]);
        let pod = compute_resources(&spec, &snapshot);
        let container = &pod.containers[0];
        // 26 pods rounds to 30 under the {at:20, every:5} segment; 200Mi + 30*7Mi.
        assert_eq!(
            container.resources.requests["memory"].unscaled_value(),
            410 * 2i64.pow(20)
        );
        // 19 nodes rounds to 20 under the {at:10, every:5} segment; 100m + 20*23m.
        assert_eq!(
            container.resources.requests["cpu"].milli_value(),
            Quantity::parse("560m").unwrap().milli_value()
        );
    }
}

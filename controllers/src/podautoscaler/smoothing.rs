//! Hysteresis layer. Three strategies behind one tagged enum — a closed
//! sum type rather than open trait-object dispatch, so a policy edit that
//! keeps the same smoothing kind reconfigures in place instead of losing
//! accumulated history.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use resources::objects::pod::PodSpec;
use resources::objects::scaling_policy::{ScalingPolicySpec, SmoothingRule};
use resources::quantity::Quantity;

use crate::clock::Clock;
use crate::evaluator;
use crate::factors::{ShiftedSnapshot, Snapshot};
use crate::histogram::Histogram;

const HISTOGRAM_CAPACITY: usize = 30;

/// One container's worth of changed resources, keyed by resource name.
pub type ResourceDiff = BTreeMap<String, Quantity>;

#[derive(Debug, Default, Clone)]
pub struct ContainerDiff {
    pub name: String,
    pub limits: ResourceDiff,
    pub requests: ResourceDiff,
}

impl ContainerDiff {
    fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// Per-resource band exposed for introspection.
#[derive(Debug, Default, Clone)]
pub struct SmoothingInfo {
    pub latest_target: Option<PodSpec>,
    pub scale_down_threshold: Option<PodSpec>,
    pub scale_up_threshold: Option<PodSpec>,
}

pub enum Smoothing {
    NoOp(NoOpState),
    Percentile(PercentileState),
    ShiftScaleDown(ShiftState),
}

impl Smoothing {
    /// Construct fresh state for `rule`, per the no-op default.
    pub fn new(rule: &SmoothingRule) -> Self {
        build(rule)
    }

    /// Reconfigure in place when the rule's tag is unchanged; otherwise
    /// replace wholesale. This is the factory/reconciliation step that
    /// preserves histograms across a policy edit that doesn't change the
    /// smoothing strategy.
    pub fn update_rule(&mut self, rule: &SmoothingRule) {
        match (&mut *self, rule) {
            (Smoothing::Percentile(state), SmoothingRule { percentile: Some(p), .. }) => {
                state.apply_rule_defaults(*p);
            }
            (Smoothing::ShiftScaleDown(state), SmoothingRule { scale_down_shift: Some(s), .. }) => {
                state.inputs = s.inputs.clone();
            }
            (Smoothing::NoOp(_), SmoothingRule { percentile: None, scale_down_shift: None, .. }) => {}
            _ => *self = build(rule),
        }
    }

    pub fn update_target(&mut self, clock: &dyn Clock, snapshot: &dyn Snapshot, policy: &ScalingPolicySpec) {
        match self {
            Smoothing::NoOp(state) => state.update_target(snapshot, policy),
            Smoothing::Percentile(state) => state.update_target(clock, snapshot, policy),
            Smoothing::ShiftScaleDown(state) => state.update_target(snapshot, policy),
        }
    }

    pub fn compute_change(&mut self, current: &PodSpec) -> (bool, Vec<ContainerDiff>) {
        match self {
            Smoothing::NoOp(state) => state.compute_change(current),
            Smoothing::Percentile(state) => state.compute_change(current),
            Smoothing::ShiftScaleDown(state) => state.compute_change(current),
        }
    }

    pub fn info(&self) -> SmoothingInfo {
        match self {
            Smoothing::NoOp(state) => SmoothingInfo {
                latest_target: state.target.clone(),
                ..Default::default()
            },
            Smoothing::Percentile(state) => SmoothingInfo {
                latest_target: state.latest_target.clone(),
                scale_down_threshold: state.latest_scale_down.clone(),
                scale_up_threshold: state.latest_scale_up.clone(),
            },
            Smoothing::ShiftScaleDown(state) => SmoothingInfo {
                latest_target: state.latest_target.clone(),
                scale_down_threshold: state.latest_scale_down.clone(),
                ..Default::default()
            },
        }
    }
}

/// Build the patch body (only the changed containers/resources) that a
/// caller sends to the target adapter, starting from the current spec so
/// any resource the diff doesn't mention keeps its current value.
pub fn apply_diffs(current: &PodSpec, diffs: &[ContainerDiff]) -> PodSpec {
    let containers = diffs
        .iter()
        .filter_map(|diff| {
            let cc = current.containers.iter().find(|c| c.name == diff.name)?;
            let mut resources = cc.resources.clone();
            for (resource, value) in &diff.limits {
                resources.limits.insert(resource.clone(), *value);
            }
            for (resource, value) in &diff.requests {
                resources.requests.insert(resource.clone(), *value);
            }
            Some(resources::objects::pod::Container {
                name: diff.name.clone(),
                resources,
                ..cc.clone()
            })
        })
        .collect();
    PodSpec { containers }
}

fn build(rule: &SmoothingRule) -> Smoothing {
    if let Some(p) = rule.percentile {
        let mut state = PercentileState::default();
        state.apply_rule_defaults(p);
        Smoothing::Percentile(state)
    } else if let Some(s) = &rule.scale_down_shift {
        Smoothing::ShiftScaleDown(ShiftState {
            inputs: s.inputs.clone(),
            ..Default::default()
        })
    } else {
        Smoothing::NoOp(NoOpState::default())
    }
}

fn resource_cmp(target: &BTreeMap<String, Quantity>, current: &BTreeMap<String, Quantity>) -> ResourceDiff {
    let mut diff = ResourceDiff::new();
    for (resource, value) in target {
        match current.get(resource) {
            Some(cur) if cur.cmp_value(value) == Ordering::Equal => {}
            _ => {
                diff.insert(resource.clone(), *value);
            }
        }
    }
    diff
}

fn container_diffs(
    target: &PodSpec,
    current: &PodSpec,
    per_resource: impl Fn(&BTreeMap<String, Quantity>, &BTreeMap<String, Quantity>) -> ResourceDiff,
) -> Vec<ContainerDiff> {
    target
        .containers
        .iter()
        .filter_map(|tc| {
            let cc = match current.containers.iter().find(|c| c.name == tc.name) {
                Some(cc) => cc,
                None => {
                    tracing::warn!(container = %tc.name, "container missing from current spec, skipping");
                    return None;
                }
            };
            let diff = ContainerDiff {
                name: tc.name.clone(),
                limits: per_resource(&tc.resources.limits, &cc.resources.limits),
                requests: per_resource(&tc.resources.requests, &cc.resources.requests),
            };
            if diff.is_empty() {
                None
            } else {
                Some(diff)
            }
        })
        .collect()
}

// ---- No-op ----

#[derive(Debug, Default)]
pub struct NoOpState {
    target: Option<PodSpec>,
}

impl NoOpState {
    fn update_target(&mut self, snapshot: &dyn Snapshot, policy: &ScalingPolicySpec) {
        self.target = Some(evaluator::compute_resources(policy, snapshot));
    }

    fn compute_change(&mut self, current: &PodSpec) -> (bool, Vec<ContainerDiff>) {
        let target = match &self.target {
            Some(t) => t,
            None => return (false, Vec::new()),
        };
        let diffs = container_diffs(target, current, resource_cmp);
        (!diffs.is_empty(), diffs)
    }
}

// ---- Percentile ----

pub struct PercentileState {
    target: f32,
    low_threshold: f32,
    high_threshold: f32,
    latest_target: Option<PodSpec>,
    latest_scale_down: Option<PodSpec>,
    latest_scale_up: Option<PodSpec>,
    histograms: BTreeMap<(String, bool, String), Histogram>,
}

impl Default for PercentileState {
    fn default() -> Self {
        PercentileState {
            target: 0.80,
            low_threshold: 0.70,
            high_threshold: 0.90,
            latest_target: None,
            latest_scale_down: None,
            latest_scale_up: None,
            histograms: BTreeMap::new(),
        }
    }
}

impl PercentileState {
    fn apply_rule_defaults(&mut self, rule: resources::objects::scaling_policy::PercentileSmoothingRule) {
        self.target = if rule.target == 0.0 { 0.80 } else { rule.target };
        self.high_threshold = if rule.high_threshold == 0.0 {
            (self.target + 0.10).min(1.0)
        } else {
            rule.high_threshold
        };
        self.low_threshold = if rule.low_threshold == 0.0 {
            (self.target - 0.10).max(0.0)
        } else {
            rule.low_threshold
        };
    }

    fn histogram_for(&mut self, container: &str, is_limit: bool, resource: &str) -> &Histogram {
        self.histograms
            .entry((container.to_string(), is_limit, resource.to_string()))
            .or_insert_with(|| Histogram::new(HISTOGRAM_CAPACITY))
    }

    fn update_target(&mut self, clock: &dyn Clock, snapshot: &dyn Snapshot, policy: &ScalingPolicySpec) {
        let target = evaluator::compute_resources(policy, snapshot);
        let now = clock.now_nanos();
        for container in &target.containers {
            for (resource, value) in &container.resources.limits {
                self.histogram_for(&container.name, true, resource).add(now, *value);
            }
            for (resource, value) in &container.resources.requests {
                self.histogram_for(&container.name, false, resource).add(now, *value);
            }
        }
        self.latest_target = Some(target);
    }

    /// Records `pLow`/`pHigh` into `latest_scale_down`/`latest_scale_up` as
    /// it goes, so `/api/statz` can expose the live hysteresis band. Takes
    /// `&mut self` for exactly that reason.
    fn compute_change(&mut self, current: &PodSpec) -> (bool, Vec<ContainerDiff>) {
        let target = match &self.latest_target {
            Some(t) => t,
            None => return (false, Vec::new()),
        };
        let mut changed = false;
        let mut diffs = Vec::new();
        let mut scale_down_containers = Vec::new();
        let mut scale_up_containers = Vec::new();
        for tc in &target.containers {
            let cc = match current.containers.iter().find(|c| c.name == tc.name) {
                Some(cc) => cc,
                None => {
                    tracing::warn!(container = %tc.name, "container missing from current spec, skipping");
                    continue;
                }
            };
            let mut limits = ResourceDiff::new();
            let mut requests = ResourceDiff::new();
            let mut scale_down_limits = ResourceDiff::new();
            let mut scale_down_requests = ResourceDiff::new();
            let mut scale_up_limits = ResourceDiff::new();
            let mut scale_up_requests = ResourceDiff::new();
            for (is_limit, target_list, current_list, out, scale_down_out, scale_up_out) in [
                (
                    true,
                    &tc.resources.limits,
                    &cc.resources.limits,
                    &mut limits,
                    &mut scale_down_limits,
                    &mut scale_up_limits,
                ),
                (
                    false,
                    &tc.resources.requests,
                    &cc.resources.requests,
                    &mut requests,
                    &mut scale_down_requests,
                    &mut scale_up_requests,
                ),
            ] {
                for (resource, target_value) in target_list {
                    let hist = match self.histograms.get(&(tc.name.clone(), is_limit, resource.clone())) {
                        Some(h) => h,
                        None => continue,
                    };
                    let p_low = hist.percentile(self.low_threshold);
                    let p_high = hist.percentile(self.high_threshold);
                    let (p_low, p_high) = match (p_low, p_high) {
                        (Some(l), Some(h)) => (l, h),
                        _ => {
                            tracing::info!(container = %tc.name, resource = %resource, "insufficient histogram data, skipping");
                            continue;
                        }
                    };
                    scale_down_out.insert(resource.clone(), p_low);
                    scale_up_out.insert(resource.clone(), p_high);
                    match current_list.get(resource) {
                        Some(cur) if cur.cmp_value(&p_low) != Ordering::Less && cur.cmp_value(&p_high) != Ordering::Greater => {
                            // in [low, high]: no change
                        }
                        _ => {
                            let estimated = match hist.percentile(self.target) {
                                Some(e) => e,
                                None => continue,
                            };
                            out.insert(resource.clone(), estimated);
                        }
                    }
                    let _ = target_value;
                }
            }
            if !limits.is_empty() || !requests.is_empty() {
                changed = true;
                diffs.push(ContainerDiff {
                    name: tc.name.clone(),
                    limits,
                    requests,
                });
            }
            if !scale_down_limits.is_empty() || !scale_down_requests.is_empty() {
                scale_down_containers.push(resources::objects::pod::Container {
                    name: tc.name.clone(),
                    image: String::new(),
                    ports: Vec::new(),
                    resources: resources::objects::pod::ResourceRequirements {
                        limits: scale_down_limits,
                        requests: scale_down_requests,
                    },
                });
            }
            if !scale_up_limits.is_empty() || !scale_up_requests.is_empty() {
                scale_up_containers.push(resources::objects::pod::Container {
                    name: tc.name.clone(),
                    image: String::new(),
                    ports: Vec::new(),
                    resources: resources::objects::pod::ResourceRequirements {
                        limits: scale_up_limits,
                        requests: scale_up_requests,
                    },
                });
            }
        }
        self.latest_scale_down = Some(PodSpec {
            containers: scale_down_containers,
        });
        self.latest_scale_up = Some(PodSpec {
            containers: scale_up_containers,
        });
        (changed, diffs)
    }
}

// ---- Scale-down shift ----

#[derive(Default)]
pub struct ShiftState {
    inputs: BTreeMap<String, f64>,
    latest_target: Option<PodSpec>,
    latest_scale_down: Option<PodSpec>,
}

impl ShiftState {
    fn update_target(&mut self, snapshot: &dyn Snapshot, policy: &ScalingPolicySpec) {
        self.latest_target = Some(evaluator::compute_resources(policy, snapshot));
        let shifted = ShiftedSnapshot::new(snapshot, &self.inputs);
        self.latest_scale_down = Some(evaluator::compute_resources(policy, &shifted));
    }

    fn compute_change(&mut self, current: &PodSpec) -> (bool, Vec<ContainerDiff>) {
        let (target, scale_down) = match (&self.latest_target, &self.latest_scale_down) {
            (Some(t), Some(s)) => (t, s),
            _ => return (false, Vec::new()),
        };
        let mut changed = false;
        let mut diffs = Vec::new();
        for tc in &target.containers {
            let cc = match current.containers.iter().find(|c| c.name == tc.name) {
                Some(cc) => cc,
                None => {
                    tracing::warn!(container = %tc.name, "container missing from current spec, skipping");
                    continue;
                }
            };
            let sdc = scale_down.containers.iter().find(|c| c.name == tc.name);
            let mut limits = ResourceDiff::new();
            let mut requests = ResourceDiff::new();
            for (target_list, current_list, scale_down_list, out) in [
                (&tc.resources.limits, &cc.resources.limits, sdc.map(|c| &c.resources.limits), &mut limits),
                (&tc.resources.requests, &cc.resources.requests, sdc.map(|c| &c.resources.requests), &mut requests),
            ] {
                for (resource, target_value) in target_list {
                    let current_value = match current_list.get(resource) {
                        Some(v) => v,
                        None => {
                            out.insert(resource.clone(), *target_value);
                            continue;
                        }
                    };
                    match current_value.cmp_value(target_value) {
                        Ordering::Equal => {}
                        Ordering::Less => {
                            out.insert(resource.clone(), *target_value);
                        }
                        Ordering::Greater => {
                            let scale_down_threshold = scale_down_list.and_then(|l| l.get(resource));
                            let suppress = scale_down_threshold
                                .map(|threshold| current_value.cmp_value(threshold) != Ordering::Less)
                                .unwrap_or(false);
                            if !suppress {
                                out.insert(resource.clone(), *target_value);
                            }
                        }
                    }
                }
            }
            if !limits.is_empty() || !requests.is_empty() {
                changed = true;
                diffs.push(ContainerDiff {
                    name: tc.name.clone(),
                    limits,
                    requests,
                });
            }
        }
        (changed, diffs)
    }
}

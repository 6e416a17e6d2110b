//! Declarative scaling policy objects: the resource this crate's control
//! loop watches and reconciles against observed cluster signals.

use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;

use super::{Metadata, Object};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub metadata: Metadata,
    pub spec: ScalingPolicySpec,
}

impl Object for ScalingPolicy {
    fn kind(&self) -> &'static str {
        "ScalingPolicy"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }
}

impl ScalingPolicy {
    /// `"namespace/name"`, the key introspection and the policy registry use.
    pub fn key(&self) -> String {
        match &self.metadata.namespace {
            Some(ns) => format!("{}/{}", ns, self.metadata.name),
            None => format!("default/{}", self.metadata.name),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingPolicySpec {
    pub scale_target_ref: TargetRef,
    #[serde(default)]
    pub containers: Vec<ContainerScalingRule>,
    #[serde(default)]
    pub smoothing: SmoothingRule,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// One of `ReplicaSet`, `DaemonSet`, `Deployment`, matched case-insensitively.
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerScalingRule {
    pub name: String,
    #[serde(default)]
    pub limits: Vec<ResourceScalingRule>,
    #[serde(default)]
    pub requests: Vec<ResourceScalingRule>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceScalingRule {
    pub resource: String,
    pub function: ResourceScalingFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Quantity>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceScalingFunction {
    /// Name of the factor this function scales on, e.g. `"cores"`, `"pods"`, `"nodes"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default)]
    pub base: Quantity,
    #[serde(default)]
    pub slope: Quantity,
    #[serde(default = "default_per")]
    pub per: i64,
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// Carried for forward compatibility with delayed scale-down policies;
    /// not yet consulted by the evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_scale_down: Option<DelayScaling>,
}

fn default_per() -> i64 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub at: i64,
    pub every: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DelayScaling {
    pub delay_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SmoothingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<PercentileSmoothingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_shift: Option<ShiftSmoothingRule>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PercentileSmoothingRule {
    #[serde(default)]
    pub target: f32,
    #[serde(default)]
    pub low_threshold: f32,
    #[serde(default)]
    pub high_threshold: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShiftSmoothingRule {
    #[serde(default)]
    pub inputs: std::collections::BTreeMap<String, f64>,
}

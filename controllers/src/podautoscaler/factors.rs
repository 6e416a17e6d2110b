//! Named scalar inputs ("factors") that scaling rules evaluate against,
//! e.g. `cores`, `nodes`, `memory`.

use std::collections::BTreeMap;

use anyhow::Result;

use resources::objects::node::Capacity;

/// `recognized=false` means the key is outside this provider's vocabulary;
/// `recognized=true, value=0` means recognized but unavailable right now.
/// Both are non-fatal; only the caller decides what to do with either.
pub trait Snapshot: Send + Sync {
    fn get(&self, key: &str) -> Result<(f64, bool)>;
}

/// Cluster-derived factors: `cores`, `memory`, `nodes`.
pub struct KubernetesSnapshot {
    node_count: u32,
    sum_allocatable: Capacity,
}

impl KubernetesSnapshot {
    pub fn new(node_count: u32, sum_allocatable: Capacity) -> Self {
        KubernetesSnapshot {
            node_count,
            sum_allocatable,
        }
    }
}

impl Snapshot for KubernetesSnapshot {
    fn get(&self, key: &str) -> Result<(f64, bool)> {
        Ok(match key {
            "cores" => (self.sum_allocatable.cpu as f64, true),
            "memory" => (self.sum_allocatable.memory as f64, true),
            "nodes" => (self.node_count as f64, true),
            _ => (0.0, false),
        })
    }
}

/// A fixed map of named values, mostly useful for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
    values: BTreeMap<String, f64>,
}

impl StaticSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl Snapshot for StaticSnapshot {
    fn get(&self, key: &str) -> Result<(f64, bool)> {
        Ok(match self.values.get(key) {
            Some(v) => (*v, true),
            None => (0.0, false),
        })
    }
}

/// Wraps an inner snapshot, adding a per-key additive offset. Used by
/// scale-down-shift smoothing to compute a shifted threshold spec.
pub struct ShiftedSnapshot<'a> {
    inner: &'a dyn Snapshot,
    shift: &'a BTreeMap<String, f64>,
}

impl<'a> ShiftedSnapshot<'a> {
    pub fn new(inner: &'a dyn Snapshot, shift: &'a BTreeMap<String, f64>) -> Self {
        ShiftedSnapshot { inner, shift }
    }
}

impl<'a> Snapshot for ShiftedSnapshot<'a> {
    fn get(&self, key: &str) -> Result<(f64, bool)> {
        let (value, recognized) = self.inner.get(key)?;
        let offset = self.shift.get(key).copied().unwrap_or(0.0);
        Ok((value + offset, recognized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubernetes_snapshot_recognizes_fixed_vocabulary() {
        let snap = KubernetesSnapshot::new(3, Capacity { cpu: 8, memory: 1024 });
        assert_eq!(snap.get("cores").unwrap(), (8.0, true));
        assert_eq!(snap.get("nodes").unwrap(), (3.0, true));
        assert_eq!(snap.get("widgets").unwrap(), (0.0, false));
    }

    #[test]
    fn shifted_snapshot_adds_offset_and_preserves_recognition() {
        let inner = StaticSnapshot::new().with("pods", 10.0);
        let mut shift = BTreeMap::new();
        shift.insert("pods".to_string(), -2.0);
        let shifted = ShiftedSnapshot::new(&inner, &shift);
        assert_eq!(shifted.get("pods").unwrap(), (8.0, true));
        assert_eq!(shifted.get("other").unwrap(), (0.0, false));
    }
}

//! Bounded ring buffer of timestamped samples, queried by percentile.
//! This is the statistical memory behind percentile smoothing: it's what
//! makes a fluctuating target have to persist for several observations
//! before a write is emitted.

use parking_lot::Mutex;

use resources::quantity::{Format, Quantity};

const MIN_OBSERVATIONS_FOR_PERCENTILE: usize = 3;

#[derive(Debug, Clone, Copy)]
struct DataPoint {
    nanos: i64,
    milli: i64,
}

struct Inner {
    limit: usize,
    values: Vec<DataPoint>,
    pos: usize,
    last_format: Format,
}

/// Thread-safe; `Query` can run concurrently with `Add` from the observe task.
pub struct Histogram {
    inner: Mutex<Inner>,
}

impl Histogram {
    pub fn new(limit: usize) -> Self {
        Histogram {
            inner: Mutex::new(Inner {
                limit: limit.max(1),
                values: Vec::new(),
                pos: 0,
                last_format: Format::DecimalSI,
            }),
        }
    }

    /// Append a sample, overwriting the oldest once at capacity.
    pub fn add(&self, nanos: i64, value: Quantity) {
        let mut inner = self.inner.lock();
        inner.last_format = value.format();
        let point = DataPoint {
            nanos,
            milli: value.milli_value(),
        };
        if inner.values.len() < inner.limit {
            inner.values.push(point);
        } else {
            let pos = inner.pos;
            inner.values[pos] = point;
            inner.pos = (inner.pos + 1) % inner.limit;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `ratio` in `[0, 1]`. Returns `None` if fewer than
    /// `MIN_OBSERVATIONS_FOR_PERCENTILE` samples have been recorded.
    pub fn percentile(&self, ratio: f32) -> Option<Quantity> {
        let inner = self.inner.lock();
        if inner.values.len() < MIN_OBSERVATIONS_FOR_PERCENTILE {
            return None;
        }
        let mut sorted: Vec<i64> = inner.values.iter().map(|p| p.milli).collect();
        sorted.sort_unstable();
        let n = sorted.len();
        let mut index = ((n as f32) * ratio) as usize;
        if index >= n {
            index = n - 1;
        }
        Some(Quantity::from_milli_with_format(sorted[index], inner.last_format))
    }

    /// Samples in chronological order (oldest first), regardless of ring position.
    pub fn query(&self) -> Vec<(i64, Quantity)> {
        let inner = self.inner.lock();
        let n = inner.values.len();
        if n < inner.limit {
            return inner
                .values
                .iter()
                .map(|p| (p.nanos, Quantity::from_milli_with_format(p.milli, inner.last_format)))
                .collect();
        }
        (0..n)
            .map(|i| {
                let idx = (inner.pos + i) % n;
                let p = inner.values[idx];
                (p.nanos, Quantity::from_milli_with_format(p.milli, inner.last_format))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_samples_refuses_percentile() {
        let h = Histogram::new(30);
        h.add(1, Quantity::parse("100M").unwrap());
        h.add(2, Quantity::parse("200M").unwrap());
        assert!(h.percentile(0.5).is_none());
    }

    #[test]
    fn percentile_after_enough_samples() {
        let h = Histogram::new(30);
        for (i, v) in [100, 100, 100, 100, 200].iter().enumerate() {
            h.add(i as i64, Quantity::from_milli(*v * 1000));
        }
        let p80 = h.percentile(0.80).unwrap();
        assert_eq!(p80.milli_value(), 200_000);
    }

    #[test]
    fn ring_wraps_and_bounds_size() {
        let h = Histogram::new(3);
        for i in 0..5 {
            h.add(i, Quantity::from_milli(i * 1000));
        }
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn query_is_chronological_after_wrap() {
        let h = Histogram::new(3);
        for i in 0..5 {
            h.add(i, Quantity::from_milli(i * 1000));
        }
        let samples: Vec<i64> = h.query().into_iter().map(|(t, _)| t).collect();
        assert_eq!(samples, vec![2, 3, 4]);
    }
}

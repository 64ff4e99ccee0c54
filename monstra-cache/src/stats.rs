//! # Cache Statistics
//!
//! Purpose: running counters over cache accesses, mirroring the
//! accumulator-pattern metrics snapshot used elsewhere in this codebase —
//! plain atomics-free counters guarded by the same mutex as the rest of the
//! cache state, snapshotted into a plain `Clone` struct for callers and
//! optional external callbacks.

/// Classification of a single `get` call, handed to the optional
/// statistics callback alongside the updated running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessRecord {
    InvalidKey,
    AbsentHit,
    ValueHit,
    Miss,
}

/// Running counters over every `get` call made against a [`crate::CacheEngine`].
/// Plain data, so it serializes cleanly for callers wiring it into a metrics
/// exporter — unlike [`crate::CacheConfig`], which holds collaborator
/// closures and cannot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    pub invalid_key: u64,
    pub absent_hit: u64,
    pub value_hit: u64,
    pub miss: u64,
    pub total_accesses: u64,
}

impl Statistics {
    pub(crate) fn record(&mut self, record: AccessRecord) {
        self.total_accesses += 1;
        match record {
            AccessRecord::InvalidKey => self.invalid_key += 1,
            AccessRecord::AbsentHit => self.absent_hit += 1,
            AccessRecord::ValueHit => self.value_hit += 1,
            AccessRecord::Miss => self.miss += 1,
        }
    }

    /// `(absentHit + valueHit) / (absentHit + valueHit + miss)`. `NaN`
    /// guarded to `0.0` when the denominator is zero.
    pub fn hit_rate(&self) -> f64 {
        let hits = (self.absent_hit + self.value_hit) as f64;
        let denom = hits + self.miss as f64;
        if denom == 0.0 {
            0.0
        } else {
            hits / denom
        }
    }

    /// `(absentHit + valueHit) / totalAccesses`.
    pub fn success_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            (self.absent_hit + self.value_hit) as f64 / self.total_accesses as f64
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Statistics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_before_any_access() {
        let stats = Statistics::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn rates_after_mixed_accesses() {
        let mut stats = Statistics::default();
        stats.record(AccessRecord::ValueHit);
        stats.record(AccessRecord::AbsentHit);
        stats.record(AccessRecord::Miss);
        stats.record(AccessRecord::InvalidKey);
        assert_eq!(stats.total_accesses, 4);
        assert!((stats.hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
        assert!((stats.success_rate() - 0.5).abs() < 1e-9);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn statistics_round_trip_through_json() {
        let mut stats = Statistics::default();
        stats.record(AccessRecord::ValueHit);
        stats.record(AccessRecord::Miss);

        let json = serde_json::to_string(&stats).unwrap();
        let restored: Statistics = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, restored);
    }
}

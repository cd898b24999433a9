//! Run-level aggregates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::EvalResult;

/// Aggregate statistics across all evaluations of a run.
///
/// Every passed/total pair excludes errored results; `total_cost` does not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_evals: usize,
    pub failed_evals: usize,
    pub total_cost: f64,
    pub sizes_passed: usize,
    pub sizes_total: usize,
    pub tools_passed: f64,
    pub tools_total: f64,
    pub handoffs_passed: usize,
    pub handoffs_total: usize,
    pub relevance_passed: f64,
    pub relevance_total: f64,
}

/// One invocation of the harness: every result plus its summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRun {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time of the run, serialized as nanoseconds.
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    pub results: Vec<EvalResult>,
    pub summary: Summary,
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}

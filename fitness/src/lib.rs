//! Fitness scoring and Critic accept/reject logic: maps a candidate's
//! aggregated metrics and artifact size to a scalar score, and decides
//! whether a candidate meets a task's declared success criteria.

use std::collections::HashMap;

use forge_core::{Spec, Task};

const DEFAULT_SIZE_PENALTY_PER_KB: f64 = 0.001;

/// `score = Σ w_k · metrics[k] − sizePenaltyPerKB · (sizeBytes / 1024)`.
/// Missing metric keys contribute 0. Weights come from
/// `task.spec.metrics_weights`; a metric with no declared weight
/// contributes 0 regardless of its value.
pub fn score(task: &Task, metrics: &HashMap<String, f64>, size_bytes: usize) -> f64 {
    score_with_penalty(task, metrics, size_bytes, DEFAULT_SIZE_PENALTY_PER_KB)
}

pub fn score_with_penalty(
    task: &Task,
    metrics: &HashMap<String, f64>,
    size_bytes: usize,
    size_penalty_per_kb: f64,
) -> f64 {
    let weighted: f64 = task
        .spec
        .metrics_weights
        .iter()
        .map(|(k, w)| w * metrics.get(k).copied().unwrap_or(0.0))
        .sum();
    let size_penalty = size_penalty_per_kb * (size_bytes as f64 / 1024.0);
    weighted - size_penalty
}

/// `true` iff `score >= threshold`.
pub fn passed(score: f64, threshold: f64) -> bool {
    score >= threshold
}

/// Boolean accept/reject decision over a candidate's metrics given a task's
/// spec. If `spec.success_criteria` is empty, every candidate is accepted.
/// Otherwise acceptance requires `metrics["cases_failed"] == 0`; a missing
/// `cases_failed` metric is rejected conservatively.
pub fn accept(spec: &Spec, metrics: &HashMap<String, f64>) -> bool {
    if spec.success_criteria.is_empty() {
        return true;
    }
    matches!(metrics.get("cases_failed"), Some(v) if *v == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::SpecFlags;

    fn task_with_weights(weights: &[(&str, f64)]) -> Task {
        let mut t = Task::new("algorithms", serde_json::Value::Null);
        for (k, w) in weights {
            t.spec.metrics_weights.insert(k.to_string(), *w);
        }
        t
    }

    #[test]
    fn zero_weights_yield_only_the_size_penalty() {
        let t = task_with_weights(&[("cases_passed", 0.0)]);
        let mut m = HashMap::new();
        m.insert("cases_passed".to_string(), 10.0);
        let s = score_with_penalty(&t, &m, 1024, 0.5);
        assert_eq!(s, -0.5);
    }

    #[test]
    fn missing_metric_contributes_zero() {
        let t = task_with_weights(&[("cases_passed", 2.0)]);
        let m = HashMap::new();
        let s = score_with_penalty(&t, &m, 0, 0.0);
        assert_eq!(s, 0.0);
    }

    #[test]
    fn score_is_additive_in_weights() {
        let t = task_with_weights(&[("a", 1.0), ("b", 2.0)]);
        let mut m = HashMap::new();
        m.insert("a".to_string(), 3.0);
        m.insert("b".to_string(), 4.0);
        let s = score_with_penalty(&t, &m, 0, 0.0);
        assert_eq!(s, 1.0 * 3.0 + 2.0 * 4.0);
    }

    #[test]
    fn accept_with_empty_success_criteria_always_accepts() {
        let spec = Spec::default();
        assert!(accept(&spec, &HashMap::new()));
    }

    #[test]
    fn accept_requires_zero_cases_failed_when_criteria_present() {
        let mut spec = Spec::default();
        spec.success_criteria.push("must pass".into());
        spec.flags = SpecFlags::default();
        let mut m = HashMap::new();
        m.insert("cases_failed".to_string(), 0.0);
        assert!(accept(&spec, &m));
        m.insert("cases_failed".to_string(), 1.0);
        assert!(!accept(&spec, &m));
    }

    #[test]
    fn accept_rejects_conservatively_when_metric_missing() {
        let mut spec = Spec::default();
        spec.success_criteria.push("must pass".into());
        assert!(!accept(&spec, &HashMap::new()));
    }
}

//! Solver: orchestrates KB lookup, LLM proposal, and the bounded
//! evolutionary loop that refines a proposal into an accepted, persisted
//! hypothesis. Knows about every other crate in the workspace; nothing
//! depends back on this one except the `worker` binary.

pub mod error;
pub mod llm;

use std::sync::Arc;

use forge_core::{CancelScope, ErrorHint, Hypothesis, SolveResult, Task, TestCase};
use gateway::Gateway;
use kb::Kb;
use sandbox::Interpreter;

pub use error::SolverError;
pub use llm::LlmMode;

/// Upper bound on evolutionary-loop rounds. The pseudocode this mirrors
/// loops bare "while now < deadline"; since `mutate` is metadata-only and
/// deterministic given the same `best`, a round that doesn't improve
/// `best` would otherwise spin without ever producing a new candidate.
/// Capping rounds keeps the loop bounded even when the deadline is
/// generous and nothing in the search is improving.
const MAX_LOOP_ROUNDS: usize = 8;

/// Orchestrates a single task end to end: `TRY_KB` → `LLM_PROPOSE` →
/// evolutionary `LOOP` → persistence, per the heavy-tier state machine.
pub struct Solver {
    kb: Arc<Kb>,
    interp: Arc<Interpreter>,
    gateway: Arc<Gateway>,
    caller: String,
    llm_mode: LlmMode,
}

impl Solver {
    pub fn new(kb: Arc<Kb>, gateway: Arc<Gateway>, caller: impl Into<String>, llm_mode: LlmMode) -> Self {
        Solver {
            kb,
            interp: Arc::new(Interpreter::new()),
            gateway,
            caller: caller.into(),
            llm_mode,
        }
    }

    /// Solve `task`, bounded by `task.budget`'s effective timeout. Never
    /// fails outright: a candidate or proposal failure yields
    /// `SolveResult { success: false, .. }` rather than an error, per the
    /// state machine's failure semantics (KB errors non-fatal, LLM errors
    /// fatal-for-the-task-but-not-the-caller, interpreter errors swallowed).
    pub async fn solve(&self, task: &Task) -> SolveResult {
        let scope = CancelScope::with_timeout(task.budget.effective_timeout());

        if let Some(result) = self.try_kb(task, &scope).await {
            return result;
        }

        let (proposal, tests) =
            match llm::propose(&self.llm_mode, &self.gateway, &self.caller, task, &scope).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(task = %task.id, error = %e, "llm proposal failed");
                    return SolveResult::failure(e.user_hint());
                }
            };

        self.evolve(task, proposal, &tests, &scope).await
    }

    /// `TRY_KB`: native skills are tried first since they never touch the
    /// sandbox; WASM skills are projected to a `Hypothesis` and run once
    /// each. Returns `None` if no skill matched or every match failed,
    /// which falls through to `LLM_PROPOSE`.
    async fn try_kb(&self, task: &Task, scope: &CancelScope) -> Option<SolveResult> {
        let skills = self.kb.find(task);

        for skill in &skills {
            if let Some(result) = skill.try_solve_native(task) {
                if result.success {
                    return Some(result);
                }
            }
        }

        for skill in &skills {
            let Some(hypothesis) = skill.to_hypothesis() else {
                continue;
            };
            match self.interp.execute_scoped(&hypothesis, task, scope).await {
                Ok(result) if result.success => return Some(result),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(skill = skill.id(), error = %e, "kb candidate did not solve the task");
                    continue;
                }
            }
        }

        None
    }

    /// `LOOP` / `LOOP_END`: each round scores `[proposal] ∪ mutate(best)`
    /// against `tests`, tracks the highest-scoring passing candidate, and
    /// persists + returns as soon as one is accepted by the critic *and*
    /// succeeds on the real task (not merely on its own test suite). If the
    /// budget is exhausted first, the best candidate found gets one last
    /// real-task attempt before giving up.
    async fn evolve(
        &self,
        task: &Task,
        proposal: Hypothesis,
        tests: &[TestCase],
        scope: &CancelScope,
    ) -> SolveResult {
        let mut best: Option<(Hypothesis, f64)> = None;
        let mut round = 0usize;

        while round < MAX_LOOP_ROUNDS && !scope.is_cancelled() {
            round += 1;

            let mut candidates = vec![proposal.clone()];
            if let Some((best_hypothesis, _)) = &best {
                candidates.extend(mutator::mutate(best_hypothesis));
            }

            for candidate in candidates {
                if scope.is_cancelled() {
                    break;
                }

                let outcome = runner::run(&self.interp, &candidate, task, tests).await;
                let candidate_score = fitness::score(task, &outcome.metrics, candidate.bytes.len());

                if outcome.all_passed && best.as_ref().map_or(true, |(_, s)| candidate_score > *s) {
                    best = Some((candidate.clone(), candidate_score));
                }

                if fitness::accept(&task.spec, &outcome.metrics) {
                    if let Some(result) = self.try_persist(task, &candidate, candidate_score, scope).await {
                        return result;
                    }
                }
            }
        }

        match best {
            Some((hypothesis, score)) if score > 0.0 => self
                .try_persist(task, &hypothesis, score, scope)
                .await
                .unwrap_or_else(|| SolveResult::failure("budget exhausted without an accepted candidate")),
            _ => SolveResult::failure("budget exhausted without an accepted candidate"),
        }
    }

    /// Runs `candidate` once more against the real task (not its test
    /// suite) and, only on success, persists it to the KB. Returns `None`
    /// on any failure so the caller can keep searching or give up cleanly.
    async fn try_persist(
        &self,
        task: &Task,
        candidate: &Hypothesis,
        score: f64,
        scope: &CancelScope,
    ) -> Option<SolveResult> {
        let result = self.interp.execute_scoped(candidate, task, scope).await.ok()?;
        if !result.success {
            return None;
        }
        if let Err(e) = self.kb.save_hypothesis(candidate, score).await {
            tracing::warn!(task = %task.id, error = %e, "failed to persist accepted hypothesis");
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway::MemoryCostAggregator;

    async fn solver_with_kb(root: &std::path::Path) -> Solver {
        let kb = Arc::new(Kb::open(root).await.unwrap());
        let gateway = Arc::new(Gateway::mock(Arc::new(MemoryCostAggregator::new())));
        Solver::new(kb, gateway, "test-caller", LlmMode::Mock)
    }

    #[tokio::test]
    async fn kb_hit_short_circuits_the_llm_and_loop() {
        let dir = tempfile::tempdir().unwrap();
        let solver = solver_with_kb(dir.path()).await;
        let task = Task::new("text", serde_json::json!({"text": "hello"}));
        let result = solver.solve(&task).await;
        assert!(result.success);
        assert_eq!(result.output["reversed"], "olleh");
    }

    #[tokio::test]
    async fn kb_sort_skill_answers_algorithms_domain() {
        let dir = tempfile::tempdir().unwrap();
        let solver = solver_with_kb(dir.path()).await;
        let task = Task::new("algorithms", serde_json::json!({"numbers": [3, 1, 2]}));
        let result = solver.solve(&task).await;
        assert!(result.success);
        assert_eq!(result.output["sorted"], serde_json::json!([1.0, 2.0, 3.0]));
    }

    /// Spec §8 scenario 3 end to end: an unmatched domain falls through to
    /// `LLM_PROPOSE`, the mock proposal compiles and runs in the sandbox,
    /// the critic accepts (no `successCriteria` declared), the real-task
    /// execution succeeds, and the resulting hypothesis is persisted and
    /// subsequently re-findable by its domain.
    #[tokio::test]
    async fn llm_proposal_on_an_unmatched_domain_solves_and_persists_to_the_kb() {
        let dir = tempfile::tempdir().unwrap();
        let solver = solver_with_kb(dir.path()).await;
        let mut task = Task::new("widgets", serde_json::json!({"anything": true}));
        task.budget.timeout_millis = 500;

        let result = solver.solve(&task).await;
        assert!(result.success);

        let rediscovered = solver.kb.find(&Task::new("widgets", serde_json::Value::Null));
        assert!(rediscovered.iter().any(|s| s.domain() == "widgets"));
    }

    #[tokio::test]
    async fn exhausted_budget_does_not_write_to_the_kb() {
        let dir = tempfile::tempdir().unwrap();
        let solver = solver_with_kb(dir.path()).await;
        let mut task = Task::new("widgets", serde_json::Value::Null);
        task.budget.timeout_millis = 1;
        let before = solver.kb.find(&Task::new("generated", serde_json::Value::Null)).len();
        solver.solve(&task).await;
        let after = solver.kb.find(&Task::new("generated", serde_json::Value::Null)).len();
        assert_eq!(before, after);
    }
}

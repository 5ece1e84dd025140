use std::sync::Arc;

use forge_core::{Hypothesis, HypothesisSource, Lang, Manifest, SolveResult, Task};

/// A native, in-process capability: built-in knowledge that answers a task
/// without ever going through the sandbox. Resolves Open Question (a) --
/// the source's `Manifest`/plugin model is WASM-only, but the KB still
/// needs to answer from built-in knowledge without a pre-seeded WASM
/// corpus.
pub struct NativeSkill {
    pub id: String,
    pub domain: String,
    pub tags: Vec<String>,
    pub solve: Box<dyn Fn(&Task) -> Option<SolveResult> + Send + Sync>,
}

impl std::fmt::Debug for NativeSkill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSkill")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("tags", &self.tags)
            .finish()
    }
}

/// A capability the Solver can consume, independent of whether it is
/// backed by a compiled WASM manifest or a native closure. The Solver
/// depends only on this surface, never on which variant it received.
#[derive(Clone)]
pub enum Skill {
    Wasm {
        manifest: Manifest,
        code: Arc<Vec<u8>>,
    },
    Native(Arc<NativeSkill>),
}

impl Skill {
    pub fn domain(&self) -> &str {
        match self {
            Skill::Wasm { manifest, .. } => &manifest.domain,
            Skill::Native(n) => &n.domain,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Skill::Wasm { manifest, .. } => &manifest.tags,
            Skill::Native(n) => &n.tags,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Skill::Wasm { manifest, .. } => &manifest.id,
            Skill::Native(n) => &n.id,
        }
    }

    /// Attempt to solve `task` without the sandbox. Only [`Skill::Native`]
    /// variants can do this; a [`Skill::Wasm`] variant must first be
    /// converted with [`Skill::to_hypothesis`] and run through the
    /// interpreter.
    pub fn try_solve_native(&self, task: &Task) -> Option<SolveResult> {
        match self {
            Skill::Native(n) => (n.solve)(task),
            Skill::Wasm { .. } => None,
        }
    }

    /// Project a WASM skill into a [`Hypothesis`] the sandbox can execute.
    /// Returns `None` for native skills, which never go through the
    /// sandbox.
    pub fn to_hypothesis(&self) -> Option<Hypothesis> {
        match self {
            Skill::Wasm { manifest, code } => Some(Hypothesis {
                id: manifest.id.clone(),
                source: HypothesisSource::Kb,
                lang: Lang::Wasm,
                bytes: (**code).clone(),
                meta: Default::default(),
            }),
            Skill::Native(_) => None,
        }
    }
}

/// Built-in skills seeded at construction so KB-hit scenarios work without
/// a pre-built WASM corpus.
pub fn builtin_skills() -> Vec<NativeSkill> {
    vec![
        NativeSkill {
            id: "text/reverse.v1".to_string(),
            domain: "text".to_string(),
            tags: vec!["reverse".to_string()],
            solve: Box::new(|task| {
                let text = task.input.get("text")?.as_str()?;
                let reversed: String = text.chars().rev().collect();
                Some(SolveResult {
                    success: true,
                    score: 1.0,
                    output: serde_json::json!({
                        "reversed": reversed,
                        "original": text,
                        "length": text.chars().count(),
                    }),
                    logs: String::new(),
                    metrics: Default::default(),
                })
            }),
        },
        NativeSkill {
            id: "algorithms/sort.v1".to_string(),
            domain: "algorithms".to_string(),
            tags: vec!["sort".to_string()],
            solve: Box::new(|task| {
                let numbers = task.input.get("numbers")?.as_array()?;
                let mut nums: Vec<f64> = numbers.iter().filter_map(|v| v.as_f64()).collect();
                if nums.len() != numbers.len() {
                    return None;
                }
                nums.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                Some(SolveResult {
                    success: true,
                    score: 1.0,
                    output: serde_json::json!({
                        "sorted": nums,
                        "count": nums.len(),
                    }),
                    logs: String::new(),
                    metrics: Default::default(),
                })
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_skill_answers_text_domain() {
        let skills = builtin_skills();
        let reverse = skills.into_iter().find(|s| s.id == "text/reverse.v1").unwrap();
        let task = Task::new("text", serde_json::json!({"text": "hello"}));
        let result = (reverse.solve)(&task).unwrap();
        assert_eq!(result.output["reversed"], "olleh");
        assert_eq!(result.output["length"], 5);
    }

    #[test]
    fn sort_skill_sorts_numbers() {
        let skills = builtin_skills();
        let sort = skills.into_iter().find(|s| s.id == "algorithms/sort.v1").unwrap();
        let task = Task::new("algorithms", serde_json::json!({"numbers": [3, 1, 4, 1, 5]}));
        let result = (sort.solve)(&task).unwrap();
        assert_eq!(result.output["sorted"], serde_json::json!([1.0, 1.0, 3.0, 4.0, 5.0]));
    }
}

//! Turns a `Task` into an LLM proposal: a candidate `Hypothesis` plus the
//! `TestCase`s the evolutionary loop scores it against. `LLM_MODE=real`
//! asks the gateway's chat endpoint for a JSON envelope carrying
//! base64-encoded WASM bytes; `LLM_MODE=mock` synthesizes the envelope
//! locally so the state machine runs end to end without a live provider.

use forge_core::{base64_bytes, CancelScope, Hypothesis, HypothesisSource, Lang, Task, TestCase};
use gateway::provider::{ChatRequest, Message, MessageRole};
use gateway::{ErrorHint as _, Gateway};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SolverError;

const SYSTEM_PROMPT: &str = "You write a single WASM module exporting `solve(ptr,len)->(ptr,len)` \
that reads a JSON document {input, spec} from the supplied region and writes a JSON result to a \
returned region. Respond with exactly one JSON object: \
{\"wasmBase64\": \"<base64>\", \"tests\": [{\"name\":.., \"input\":.., \"oracle\":.., \"checks\":[..], \"weight\":..}]}.";

/// Which backend answers `LLM_PROPOSE`.
#[derive(Debug, Clone)]
pub enum LlmMode {
    Mock,
    Real { model: String },
}

#[derive(Debug, Deserialize)]
struct ProposalDoc {
    #[serde(rename = "wasmBase64")]
    wasm_base64: String,
    #[serde(default)]
    tests: Vec<TestCase>,
}

pub async fn propose(
    mode: &LlmMode,
    gateway: &Gateway,
    caller: &str,
    task: &Task,
    scope: &CancelScope,
) -> Result<(Hypothesis, Vec<TestCase>), SolverError> {
    match mode {
        LlmMode::Mock => Ok(mock_proposal(task)),
        LlmMode::Real { model } => real_proposal(gateway, caller, model, task, scope).await,
    }
}

async fn real_proposal(
    gateway: &Gateway,
    caller: &str,
    model: &str,
    task: &Task,
    scope: &CancelScope,
) -> Result<(Hypothesis, Vec<TestCase>), SolverError> {
    let req = ChatRequest {
        model: model.to_string(),
        messages: vec![
            Message {
                role: MessageRole::System,
                content: SYSTEM_PROMPT.to_string(),
            },
            Message {
                role: MessageRole::User,
                content: serde_json::json!({
                    "domain": task.domain,
                    "input": task.input,
                    "spec": task.spec,
                })
                .to_string(),
            },
        ],
        tools: vec![],
        temperature: None,
        top_p: None,
        max_tokens: None,
    };

    let outcome = gateway
        .chat(req, caller, scope)
        .await
        .map_err(|e| SolverError::ProposalFailed(e.user_hint()))?;

    let doc: ProposalDoc = serde_json::from_str(&outcome.response.content)
        .map_err(|e| SolverError::InvalidProposal(e.to_string()))?;
    let bytes = base64_bytes::decode(&doc.wasm_base64).map_err(SolverError::InvalidProposal)?;

    let mut h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, bytes);
    h.meta.insert("domain".to_string(), Value::String(task.domain.clone()));
    Ok((h, doc.tests))
}

/// [`LlmMode::Mock`] proposes the workspace's embedded echo module (see
/// [`forge_core::wasm_fixtures`]) for every domain -- a real, compilable
/// WASM module stands in for whatever an LLM would have authored, so the
/// evolutionary loop, critic, and KB persistence all run against an actual
/// sandbox execution instead of an immediate `CompileFailed`.
fn mock_proposal(task: &Task) -> (Hypothesis, Vec<TestCase>) {
    let tests = match task.domain.as_str() {
        "algorithms" => sort_tests(),
        _ => identity_tests(),
    };
    let mut h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, forge_core::wasm_fixtures::echo_module_bytes());
    h.meta.insert("domain".to_string(), Value::String(task.domain.clone()));
    h.meta.insert("mock".to_string(), Value::Bool(true));
    (h, tests)
}

fn sort_tests() -> Vec<TestCase> {
    vec![TestCase {
        name: "sorts_a_short_sequence".to_string(),
        input: serde_json::json!({"numbers": [3, 1, 4, 1, 5]}),
        oracle: None,
        checks: vec!["sorted_non_decreasing".to_string(), "permutes".to_string()],
        weight: 1.0,
    }]
}

fn identity_tests() -> Vec<TestCase> {
    vec![TestCase {
        name: "echoes_input".to_string(),
        input: serde_json::json!({"text": "hello"}),
        oracle: None,
        checks: vec![],
        weight: 1.0,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::Task;

    #[test]
    fn mock_proposal_for_algorithms_domain_yields_sort_tests() {
        let task = Task::new("algorithms", serde_json::json!({"numbers": [1, 2]}));
        let (h, tests) = mock_proposal(&task);
        assert_eq!(h.lang, Lang::Wasm);
        assert_eq!(h.source, HypothesisSource::Llm);
        assert_eq!(tests.len(), 1);
        assert!(tests[0].checks.contains(&"sorted_non_decreasing".to_string()));
    }

    #[test]
    fn mock_proposal_for_unknown_domain_yields_identity_test() {
        let task = Task::new("widgets", Value::Null);
        let (_, tests) = mock_proposal(&task);
        assert_eq!(tests[0].name, "echoes_input");
    }

    #[test]
    fn mock_proposal_bytes_are_a_real_compilable_wasm_module() {
        let task = Task::new("widgets", Value::Null);
        let (h, _) = mock_proposal(&task);
        assert!(h.bytes.starts_with(b"\0asm"));
    }
}

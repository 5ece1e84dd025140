use std::sync::Arc;

use dashmap::DashMap;
use extism::{Manifest as ExtismManifest, Plugin, Wasm};
use forge_core::{CancelScope, Hypothesis, SolveResult, Task};
use serde_json::Value;

use crate::error::SandboxError;

const PAGE_BYTES: u32 = 64 * 1024;
const DEFAULT_MEMORY_PAGES: u32 = 256; // 16 MiB, generous default for candidate modules
const ENTRY_POINT: &str = "solve";

/// Sandboxed executor of hypothesis bytecode.
///
/// Keeps a best-effort cache of each hypothesis's raw bytes keyed by id, so
/// repeated calls for the same candidate skip re-cloning the module bytes.
/// The cache carries no correctness dependency: every call still builds a
/// fresh [`Plugin`] instance, so no state leaks between calls even on a
/// cache hit.
pub struct Interpreter {
    cache: DashMap<String, Arc<Vec<u8>>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            cache: DashMap::new(),
        }
    }

    /// Run `h` against `t`, bounding execution by `t.budget`'s effective
    /// timeout (see [`forge_core::Budget::effective_timeout`]).
    pub async fn execute(&self, h: &Hypothesis, t: &Task) -> Result<SolveResult, SandboxError> {
        let scope = CancelScope::with_timeout(t.budget.effective_timeout());
        self.execute_scoped(h, t, &scope).await
    }

    /// Run `h` against `t` under an externally supplied cancellation scope,
    /// so a caller (the Solver's loop) can share one deadline across many
    /// candidates.
    pub async fn execute_scoped(
        &self,
        h: &Hypothesis,
        t: &Task,
        scope: &CancelScope,
    ) -> Result<SolveResult, SandboxError> {
        let bytes = self.cached_bytes(h);
        let mem_pages = if t.budget.mem_mb > 0 {
            (t.budget.mem_mb as u64 * 1024 * 1024 / PAGE_BYTES as u64).max(1) as u32
        } else {
            DEFAULT_MEMORY_PAGES
        };

        let payload = serde_json::json!({ "input": t.input, "spec": t.spec });
        let input_bytes = serde_json::to_vec(&payload)
            .map_err(|e| SandboxError::OutputDecodeFailed(format!("encoding input: {e}")))?;

        let remaining = scope.remaining();
        if remaining.is_zero() {
            return Err(SandboxError::Timeout);
        }

        let call = tokio::task::spawn_blocking(move || run_plugin(&bytes, mem_pages, &input_bytes));

        match tokio::time::timeout(remaining, call).await {
            Err(_) => Err(SandboxError::Timeout),
            Ok(Err(join_err)) => Err(SandboxError::InstantiateFailed(join_err.to_string())),
            Ok(Ok(inner)) => inner,
        }
    }

    fn cached_bytes(&self, h: &Hypothesis) -> Arc<Vec<u8>> {
        self.cache
            .entry(h.id.clone())
            .or_insert_with(|| Arc::new(h.bytes.clone()))
            .clone()
    }
}

/// Blocking body run on a `spawn_blocking` thread: builds a fresh manifest
/// and plugin instance, invokes the `solve` export, and decodes its output.
fn run_plugin(bytes: &[u8], mem_pages: u32, input: &[u8]) -> Result<SolveResult, SandboxError> {
    let manifest = ExtismManifest::new([Wasm::data(bytes.to_vec())]).with_memory_max(mem_pages);

    let mut plugin = Plugin::new(&manifest, [], true)
        .map_err(|e| SandboxError::CompileFailed(e.to_string()))?;

    if !plugin.function_exists(ENTRY_POINT) {
        return Err(SandboxError::NoEntry(ENTRY_POINT.into()));
    }

    let output = plugin
        .call::<&[u8], &[u8]>(ENTRY_POINT, input)
        .map_err(classify_call_error)?;

    let value: Value = serde_json::from_slice(output)
        .map_err(|e| SandboxError::OutputDecodeFailed(e.to_string()))?;

    Ok(SolveResult {
        success: true,
        score: 0.0,
        output: value,
        logs: String::new(),
        metrics: Default::default(),
    })
}

/// `extism::Error` does not expose a structured trap reason, so the call
/// error is classified by message content -- good enough to distinguish an
/// out-of-memory trap from every other instantiation failure.
fn classify_call_error(err: extism::Error) -> SandboxError {
    let msg = err.to_string();
    if msg.to_lowercase().contains("memory") || msg.to_lowercase().contains("oom") {
        SandboxError::OutOfMemory
    } else {
        SandboxError::InstantiateFailed(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{HypothesisSource, Lang};

    fn identity_task() -> Task {
        Task::new("text", serde_json::json!({"text": "hello"}))
    }

    #[tokio::test]
    async fn compile_failed_on_garbage_bytes() {
        let interp = Interpreter::new();
        let h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![0, 1, 2, 3]);
        let err = interp.execute(&h, &identity_task()).await.unwrap_err();
        assert!(matches!(err, SandboxError::CompileFailed(_)));
    }

    #[tokio::test]
    async fn zero_timeout_yields_timeout_error() {
        let interp = Interpreter::new();
        let mut t = identity_task();
        t.budget.timeout_millis = 0;
        t.budget.cpu_millis = 0;
        let scope = CancelScope::with_timeout(std::time::Duration::from_nanos(1));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![0, 1, 2, 3]);
        let err = interp.execute_scoped(&h, &t, &scope).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout));
    }

    #[test]
    fn memory_page_math_rounds_up_to_at_least_one_page() {
        let mb: u64 = 0;
        let pages = (mb * 1024 * 1024 / PAGE_BYTES as u64).max(1);
        assert_eq!(pages, 1);
    }

    fn echo_hypothesis() -> Hypothesis {
        Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, forge_core::wasm_fixtures::echo_module_bytes())
    }

    /// The interpreter's happy path: a real, compilable module runs to
    /// completion and its output decodes to exactly the `{input, spec}`
    /// envelope the interpreter wrote into the module's memory.
    #[tokio::test]
    async fn successful_execution_returns_the_envelope_the_module_echoed() {
        let interp = Interpreter::new();
        let h = echo_hypothesis();
        let task = identity_task();

        let result = interp.execute(&h, &task).await.unwrap();

        assert!(result.success);
        let expected = serde_json::json!({
            "input": task.input,
            "spec": serde_json::to_value(&task.spec).unwrap(),
        });
        assert_eq!(result.output, expected);
    }

    /// A compiled-bytes cache hit must still produce a fresh module
    /// instance per call: two different inputs against the same hypothesis
    /// id never bleed state into each other.
    #[tokio::test]
    async fn cache_hit_on_the_same_hypothesis_never_leaks_state_across_calls() {
        let interp = Interpreter::new();
        let h = echo_hypothesis();

        let first = Task::new("text", serde_json::json!({"text": "first"}));
        let second = Task::new("text", serde_json::json!({"text": "second"}));

        let r1 = interp.execute(&h, &first).await.unwrap();
        let r2 = interp.execute(&h, &second).await.unwrap();

        assert_eq!(r1.output["input"]["text"], "first");
        assert_eq!(r2.output["input"]["text"], "second");
    }
}

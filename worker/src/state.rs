use std::sync::Arc;
use std::time::Duration;

use kb::Kb;
use serde::Serialize;
use solver::Solver;

use crate::config::WorkerType;

/// Shared state behind every route. Cheap to clone -- every field is an
/// `Arc` or a small `Copy` value, matching the teacher's `ServerState`
/// pattern.
#[derive(Clone)]
pub struct AppState {
    pub worker_type: WorkerType,
    pub kb: Arc<Kb>,
    /// Present only for heavy workers; light workers never touch the
    /// sandbox or the gateway.
    pub solver: Option<Arc<Solver>>,
    pub task_timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub use_kb: bool,
    pub use_wasm: bool,
    pub use_llm: bool,
}

impl AppState {
    pub fn capabilities(&self) -> Capabilities {
        match self.worker_type {
            WorkerType::Light => Capabilities {
                use_kb: true,
                use_wasm: false,
                use_llm: false,
            },
            WorkerType::Heavy => Capabilities {
                use_kb: true,
                use_wasm: true,
                use_llm: true,
            },
        }
    }

    pub fn capabilities_string(&self) -> String {
        let caps = self.capabilities();
        let mut parts = Vec::new();
        if caps.use_kb {
            parts.push("kb");
        }
        if caps.use_wasm {
            parts.push("wasm");
        }
        if caps.use_llm {
            parts.push("llm");
        }
        parts.join(",")
    }
}

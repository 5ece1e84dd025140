//! Worker process configuration, loaded from CLI flags with environment
//! fallbacks via `clap`'s `env` feature — the same bootstrap idiom the
//! engine binary uses for its own config.

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkerType {
    Light,
    Heavy,
}

impl WorkerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::Light => "light",
            WorkerType::Heavy => "heavy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LlmModeArg {
    Mock,
    Real,
}

#[derive(Debug, Parser)]
#[command(name = "worker", about = "Forge solving-engine worker (light or heavy tier)")]
pub struct Config {
    /// Which tier this process serves. A light worker only ever tries
    /// native KB skills; a heavy worker runs the full solver pipeline.
    #[arg(long, env = "WORKER_TYPE", value_enum, default_value = "light")]
    pub worker_type: WorkerType,

    #[arg(long, env = "WORKER_PORT", default_value_t = 8080)]
    pub worker_port: u16,

    /// Backend for `LLM_PROPOSE`. Ignored by light workers.
    #[arg(long, env = "LLM_MODE", value_enum, default_value = "mock")]
    pub llm_mode: LlmModeArg,

    /// Default model id used when `llm_mode = real`.
    #[arg(long, env = "DEFAULT_MODEL", default_value = "mock:gpt-mini")]
    pub default_model: String,

    /// Per-task wall-clock ceiling in milliseconds, enforced in addition to
    /// (never looser than) each task's own `budget.timeout`.
    #[arg(long, env = "TASK_TIMEOUT", default_value_t = 30_000)]
    pub task_timeout_millis: u64,

    /// KB root directory. `ARTIFACTS_DIR` is accepted as a synonym for the
    /// same root when `HYPOTHESES_DIR` is unset -- the source exposes two
    /// names for what this system treats as one content-addressed store.
    #[arg(long, env = "HYPOTHESES_DIR")]
    pub hypotheses_dir: Option<String>,

    #[arg(long, env = "ARTIFACTS_DIR")]
    pub artifacts_dir: Option<String>,

    /// Model registry YAML path, used only when `llm_mode = real`.
    #[arg(long, env = "CONFIG")]
    pub config_path: Option<String>,

    /// Comma-separated hostnames a heavy worker's provider calls may reach.
    /// Empty means "no allowlist configured" (every host permitted).
    #[arg(long, env = "POLICY_ALLOW_TOOLS", default_value = "")]
    pub policy_allow_tools: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn kb_root(&self) -> String {
        self.hypotheses_dir
            .clone()
            .or_else(|| self.artifacts_dir.clone())
            .unwrap_or_else(|| "./kb-data".to_string())
    }

    pub fn allowed_hosts(&self) -> Vec<String> {
        self.policy_allow_tools
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

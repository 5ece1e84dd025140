//! Core data model: the declarative `Task`/`Spec`/`Budget` contract, the
//! `SolveResult`/`Hypothesis`/`TestCase` types the solver pipeline passes
//! around, the KB's `Manifest`, and the gateway's `CacheEntry`/`CostRecord`/
//! `ModelConfig`. Every type derives `Serialize`/`Deserialize` with
//! `#[serde(default)]` on fields added after v1 so a reload never breaks on
//! an older record, and uses `camelCase` on the wire to match the documented
//! external interfaces while staying idiomatic `snake_case` in Rust.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unit of work submitted to the solving engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub spec: Spec,
    /// Opaque task input; interpreted only by the skill that ends up solving it.
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(domain: impl Into<String>, input: Value) -> Self {
        Task {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            spec: Spec::default(),
            input,
            budget: Budget::default(),
            created_at: Utc::now(),
        }
    }
}

/// Declarative contract attached to a [`Task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub props: HashMap<String, Value>,
    #[serde(default)]
    pub metrics_weights: HashMap<String, f64>,
    #[serde(default)]
    pub flags: SpecFlags,
}

/// Routing-relevant flags embedded in a [`Spec`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecFlags {
    #[serde(default)]
    pub requires_sandbox: bool,
    #[serde(default)]
    pub max_complexity: u32,
}

/// Resource ceiling attached to a [`Task`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    #[serde(default)]
    pub cpu_millis: u64,
    #[serde(default)]
    pub mem_mb: u32,
    /// Wall-clock timeout in milliseconds. `0` means "unset" and the
    /// interpreter substitutes its own 30s default (see
    /// [`Budget::timeout_or_default`]).
    #[serde(default)]
    pub timeout_millis: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Budget {
            cpu_millis: 0,
            mem_mb: 0,
            timeout_millis: 0,
        }
    }
}

impl Budget {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// `min(timeout, cpuMillis)` per the interpreter's cancellation-scope
    /// rule, falling back to 30s when neither bound is set.
    pub fn effective_timeout(&self) -> Duration {
        let timeout = if self.timeout_millis > 0 {
            Some(Duration::from_millis(self.timeout_millis))
        } else {
            None
        };
        let cpu = if self.cpu_millis > 0 {
            Some(Duration::from_millis(self.cpu_millis))
        } else {
            None
        };
        match (timeout, cpu) {
            (Some(t), Some(c)) => t.min(c),
            (Some(t), None) => t,
            (None, Some(c)) => c,
            (None, None) => Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Outcome of attempting to solve a [`Task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub success: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl SolveResult {
    pub fn failure(logs: impl Into<String>) -> Self {
        SolveResult {
            success: false,
            score: 0.0,
            output: Value::Null,
            logs: logs.into(),
            metrics: HashMap::new(),
        }
    }
}

/// Source a [`Hypothesis`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisSource {
    Kb,
    Llm,
    Mutation,
}

/// Bytecode language a [`Hypothesis`]'s `bytes` are compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lang {
    Wasm,
    /// A built-in skill backed by a native Rust closure rather than bytecode.
    #[serde(rename = "go-skill")]
    NativeSkill,
}

/// A candidate solver: bytecode plus metadata, produced by the KB or an LLM
/// and refined by the Mutator. `bytes` is immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    pub id: String,
    pub source: HypothesisSource,
    pub lang: Lang,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl Hypothesis {
    pub fn new(source: HypothesisSource, lang: Lang, bytes: Vec<u8>) -> Self {
        Hypothesis {
            id: Uuid::new_v4().to_string(),
            source,
            lang,
            bytes,
            meta: HashMap::new(),
        }
    }
}

pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&data_encoding_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        data_decoding_base64(&s).map_err(serde::de::Error::custom)
    }

    /// Encode raw bytes the same way [`crate::Hypothesis::bytes`] does on
    /// the wire -- used by callers that need to embed bytes inside a larger
    /// JSON document (e.g. an LLM proposal envelope) rather than directly
    /// serializing a `Hypothesis`.
    pub fn encode(bytes: &[u8]) -> String {
        data_encoding_base64(bytes)
    }

    /// Decode a string produced by [`encode`]. Returns a plain `String`
    /// error, not `serde`'s `Error` trait, since callers outside a
    /// `Deserialize` impl have no deserializer to build one from.
    pub fn decode(s: &str) -> Result<Vec<u8>, String> {
        data_decoding_base64(s)
    }

    // Minimal, dependency-free base64 (standard alphabet, with padding) so
    // `Hypothesis.bytes` round-trips through JSON without pulling in a
    // dedicated base64 crate the rest of the workspace has no other use for.
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    fn data_encoding_base64(bytes: &[u8]) -> String {
        let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
        for chunk in bytes.chunks(3) {
            let b0 = chunk[0];
            let b1 = *chunk.get(1).unwrap_or(&0);
            let b2 = *chunk.get(2).unwrap_or(&0);
            let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32);
            out.push(ALPHABET[((n >> 18) & 0x3f) as usize] as char);
            out.push(ALPHABET[((n >> 12) & 0x3f) as usize] as char);
            out.push(if chunk.len() > 1 {
                ALPHABET[((n >> 6) & 0x3f) as usize] as char
            } else {
                '='
            });
            out.push(if chunk.len() > 2 {
                ALPHABET[(n & 0x3f) as usize] as char
            } else {
                '='
            });
        }
        out
    }

    fn data_decoding_base64(s: &str) -> Result<Vec<u8>, String> {
        fn val(c: u8) -> Result<u8, String> {
            match c {
                b'A'..=b'Z' => Ok(c - b'A'),
                b'a'..=b'z' => Ok(c - b'a' + 26),
                b'0'..=b'9' => Ok(c - b'0' + 52),
                b'+' => Ok(62),
                b'/' => Ok(63),
                _ => Err(format!("invalid base64 byte: {c}")),
            }
        }
        let s = s.trim_end_matches('=');
        let bytes: Vec<u8> = s.bytes().filter(|b| *b != b'\n' && *b != b'\r').collect();
        let mut out = Vec::with_capacity(bytes.len() / 4 * 3 + 3);
        for chunk in bytes.chunks(4) {
            let mut n: u32 = 0;
            for (i, &c) in chunk.iter().enumerate() {
                n |= (val(c)? as u32) << (18 - 6 * i);
            }
            out.push((n >> 16) as u8);
            if chunk.len() > 2 {
                out.push((n >> 8) as u8);
            }
            if chunk.len() > 3 {
                out.push(n as u8);
            }
        }
        Ok(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn round_trips_arbitrary_bytes() {
            for input in [&b""[..], b"a", b"ab", b"abc", b"abcd", b"hello, wasm!"] {
                let encoded = data_encoding_base64(input);
                let decoded = data_decoding_base64(&encoded).unwrap();
                assert_eq!(decoded, input);
            }
        }
    }
}

/// A named oracle/property check evaluated by the Test Runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub oracle: Option<Value>,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// A KB record: one versioned artifact, either a WASM module or a native
/// built-in skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// `<id>@<version>`, e.g. `algorithms/sort.v1@1.0.0`.
    pub id: String,
    pub version: String,
    pub domain: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub lang: Lang,
    pub entry: String,
    #[serde(default)]
    pub code_path: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    /// `<id>@<version>` used as the on-disk directory name.
    pub fn qualified_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}

/// A memoized LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub response: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One billing row appended after a successful provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRecord {
    pub ts: DateTime<Utc>,
    pub caller: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub currency: String,
    pub cost_in: f64,
    pub cost_out: f64,
    pub cost_total: f64,
    pub request_id: String,
}

/// Per-1k-token pricing for a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pricing {
    pub currency_in_per_1k: f64,
    pub currency_out_per_1k: f64,
}

/// What kind of call a [`ModelConfig`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Chat,
    Complete,
    Embed,
}

/// A registry entry describing one callable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// `provider:model`, e.g. `mock:gpt-mini`.
    pub id: String,
    pub provider: String,
    pub base_url: String,
    pub api_key_env: String,
    pub kind: ModelKind,
    pub currency: String,
    pub pricing: Pricing,
    pub max_rpm: f64,
    pub max_tpm: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_effective_timeout_defaults_to_30s_when_unset() {
        let b = Budget::default();
        assert_eq!(b.effective_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn budget_effective_timeout_is_min_of_timeout_and_cpu() {
        let b = Budget {
            cpu_millis: 500,
            mem_mb: 0,
            timeout_millis: 2000,
        };
        assert_eq!(b.effective_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn task_json_round_trip_is_lossless() {
        let t = Task::new("algorithms", serde_json::json!({"numbers": [3, 1, 2]}));
        let s = serde_json::to_string(&t).unwrap();
        let back: Task = serde_json::from_str(&s).unwrap();
        assert_eq!(back.id, t.id);
        assert_eq!(back.domain, t.domain);
        assert_eq!(back.input, t.input);
    }

    #[test]
    fn manifest_json_round_trip_is_lossless() {
        let m = Manifest {
            id: "algorithms/sort.v1".into(),
            version: "1.0.0".into(),
            domain: "algorithms".into(),
            tags: vec!["sort".into()],
            lang: Lang::Wasm,
            entry: "solve".into(),
            code_path: Some("code.wasm".into()),
            sha256: Some("deadbeef".into()),
            tests: vec![],
            created_at: Utc::now(),
        };
        let s = serde_json::to_string(&m).unwrap();
        let back: Manifest = serde_json::from_str(&s).unwrap();
        assert_eq!(back.qualified_id(), m.qualified_id());
        assert_eq!(back.sha256, m.sha256);
    }

    #[test]
    fn hypothesis_bytes_round_trip_through_json() {
        let h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![0, 1, 2, 255, 254]);
        let s = serde_json::to_string(&h).unwrap();
        let back: Hypothesis = serde_json::from_str(&s).unwrap();
        assert_eq!(back.bytes, h.bytes);
    }

    #[test]
    fn cost_record_json_round_trip_is_lossless() {
        let c = CostRecord {
            ts: Utc::now(),
            caller: "alice".into(),
            provider: "mock".into(),
            model: "gpt-mini".into(),
            prompt_tokens: 10,
            completion_tokens: 20,
            currency: "USD".into(),
            cost_in: 0.0001,
            cost_out: 0.0002,
            cost_total: 0.0003,
            request_id: "r1".into(),
        };
        let s = serde_json::to_string(&c).unwrap();
        let back: CostRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(back.request_id, c.request_id);
        assert_eq!(back.cost_total, c.cost_total);
    }

    #[test]
    fn unknown_fields_are_ignored_on_manifest_reload() {
        let json = serde_json::json!({
            "id": "text/reverse.v1",
            "version": "1.0.0",
            "domain": "text",
            "tags": [],
            "lang": "wasm",
            "entry": "solve",
            "futureField": "ignored",
        });
        let m: Manifest = serde_json::from_value(json).unwrap();
        assert_eq!(m.domain, "text");
    }
}

//! Shared vocabulary crossing every component of the solving engine: the
//! declarative `Task`/`Spec`/`Budget` contract, the `Result`/`Hypothesis`/
//! `TestCase` types produced and consumed by the solver pipeline, the KB's
//! `Manifest` record, the gateway's `CacheEntry`/`CostRecord`/`ModelConfig`,
//! a cancellation-scope primitive, and a small error-hint convention every
//! crate's leaf error type implements.

pub mod cancel;
pub mod error;
pub mod telemetry;
pub mod types;
pub mod wasm_fixtures;

pub use cancel::CancelScope;
pub use error::ErrorHint;
pub use types::*;

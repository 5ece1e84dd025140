//! Streaming event framing and usage aggregation. `StreamEvent` is the
//! `start -> chunk* -> done | error` sequence the gateway's SSE endpoint
//! serializes; `UsageAggregator` accumulates token counts across chunks
//! under a write lock so reads stay consistent at event boundaries.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::provider::Usage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Start { model: String },
    Chunk { delta: String },
    Done { usage: Usage, cost: f64, currency: String },
    Error { message: String },
}

impl StreamEvent {
    /// Render as an SSE frame: `event: <kind>\ndata: <json>\n\n`, with the
    /// documented `data: [DONE]` terminator appended after a `Done`/`Error`
    /// event (the SSE byte-framing itself is out of scope; this produces
    /// the event *shape* the spec fixes).
    pub fn to_sse(&self) -> String {
        let (kind, payload) = match self {
            StreamEvent::Start { .. } => ("start", serde_json::to_string(self)),
            StreamEvent::Chunk { .. } => ("chunk", serde_json::to_string(self)),
            StreamEvent::Done { .. } => ("done", serde_json::to_string(self)),
            StreamEvent::Error { .. } => ("error", serde_json::to_string(self)),
        };
        let body = payload.unwrap_or_else(|_| "null".to_string());
        let mut frame = format!("event: {kind}\ndata: {body}\n\n");
        if matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. }) {
            frame.push_str("data: [DONE]\n\n");
        }
        frame
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct AggregatedUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Accumulates `{prompt_tokens, completion_tokens, total_tokens}` across a
/// stream's chunks under a write lock; a concurrent reader always sees a
/// value that corresponds to some prefix of chunks actually applied, never
/// a torn half-update.
#[derive(Default)]
pub struct UsageAggregator {
    inner: RwLock<AggregatedUsage>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&self, usage: &Usage) {
        let mut guard = self.inner.write();
        guard.prompt_tokens += usage.prompt_tokens;
        guard.completion_tokens += usage.completion_tokens;
        guard.total_tokens = guard.prompt_tokens + guard.completion_tokens;
    }

    pub fn snapshot(&self) -> AggregatedUsage {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_chunks() {
        let agg = UsageAggregator::new();
        agg.accumulate(&Usage {
            prompt_tokens: 10,
            completion_tokens: 2,
        });
        agg.accumulate(&Usage {
            prompt_tokens: 0,
            completion_tokens: 3,
        });
        let snap = agg.snapshot();
        assert_eq!(snap.prompt_tokens, 10);
        assert_eq!(snap.completion_tokens, 5);
        assert_eq!(snap.total_tokens, 15);
    }

    #[test]
    fn done_event_sse_frame_includes_done_terminator() {
        let event = StreamEvent::Done {
            usage: Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
            },
            cost: 0.01,
            currency: "USD".to_string(),
        };
        let frame = event.to_sse();
        assert!(frame.starts_with("event: done\n"));
        assert!(frame.ends_with("data: [DONE]\n\n"));
    }

    #[test]
    fn chunk_event_sse_frame_has_no_done_terminator() {
        let event = StreamEvent::Chunk {
            delta: "hi".to_string(),
        };
        let frame = event.to_sse();
        assert!(frame.starts_with("event: chunk\n"));
        assert!(!frame.contains("[DONE]"));
    }
}

//! Cache key derivation: SHA-256 over a normalized request shape. Metadata,
//! caller, and cache-control flags are deliberately excluded so the key is
//! stable across processes and across callers making the same call.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::provider::ChatRequest;

#[derive(Serialize)]
struct NormalizedRequest<'a> {
    model: &'a str,
    messages: &'a [crate::provider::Message],
    tools: &'a [serde_json::Value],
    temperature: Option<f64>,
    top_p: Option<f64>,
    max_tokens: Option<u32>,
}

pub fn chat_cache_key(req: &ChatRequest) -> String {
    let normalized = NormalizedRequest {
        model: &req.model,
        messages: &req.messages,
        tools: &req.tools,
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_tokens,
    };
    // Serialization order is deterministic: serde_json preserves struct
    // field declaration order, and Vec/Option serialize their own content
    // verbatim, so identical logical requests always hash identically.
    let bytes = serde_json::to_vec(&normalized).expect("normalized request always serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, MessageRole};

    fn req(temp: Option<f64>) -> ChatRequest {
        ChatRequest {
            model: "mock:gpt-mini".into(),
            messages: vec![Message {
                role: MessageRole::User,
                content: "hi".into(),
            }],
            tools: vec![],
            temperature: temp,
            top_p: None,
            max_tokens: None,
        }
    }

    #[test]
    fn identical_requests_hash_identically() {
        assert_eq!(chat_cache_key(&req(Some(0.2))), chat_cache_key(&req(Some(0.2))));
    }

    #[test]
    fn differing_temperature_changes_the_key() {
        assert_ne!(chat_cache_key(&req(Some(0.2))), chat_cache_key(&req(Some(0.9))));
    }
}

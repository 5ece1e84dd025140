//! Mutator: produces a small, bounded set of derived hypotheses from a
//! base candidate. Mutation here is metadata-only -- `bytes` are identical
//! to the base across every variant; only `meta` toggles change. Bytecode
//! -level mutation would need a type-safe edit model this workspace does
//! not define; the loop still benefits because the interpreter and
//! downstream layers can read the meta hints.

use chrono::Utc;
use forge_core::{Hypothesis, HypothesisSource};
use rand::Rng;
use serde_json::Value;

/// One toggle applied by a variant: a meta key/value pair layered on top of
/// the base's existing meta.
struct Toggle {
    key: &'static str,
    value: &'static str,
}

const TOGGLES: &[Toggle] = &[
    Toggle { key: "order", value: "asc" },
    Toggle { key: "order", value: "desc" },
    Toggle { key: "cpu_hint", value: "low" },
    Toggle { key: "cpu_hint", value: "high" },
    Toggle { key: "mem_hint", value: "low" },
];

/// Produce the base's "keep" variant plus one variant per declared toggle
/// (currently 6 total). `base` itself is never modified; every returned
/// hypothesis is a fresh clone with a new id.
pub fn mutate(base: &Hypothesis) -> Vec<Hypothesis> {
    let mut variants = Vec::with_capacity(TOGGLES.len() + 1);
    variants.push(keep_variant(base));
    for toggle in TOGGLES {
        variants.push(toggle_variant(base, toggle.key, toggle.value));
    }
    variants
}

fn keep_variant(base: &Hypothesis) -> Hypothesis {
    let mut v = base.clone();
    v.id = derived_id(base);
    v.source = HypothesisSource::Mutation;
    v.meta.insert(
        "tag".to_string(),
        Value::String(format!("keep@{}", Utc::now().to_rfc3339())),
    );
    v
}

fn toggle_variant(base: &Hypothesis, key: &str, value: &str) -> Hypothesis {
    let mut v = base.clone();
    v.id = derived_id(base);
    v.source = HypothesisSource::Mutation;
    v.meta.insert(key.to_string(), Value::String(value.to_string()));
    v
}

fn derived_id(base: &Hypothesis) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-mut-{suffix:08x}", base.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::Lang;

    fn base() -> Hypothesis {
        Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![1, 2, 3])
    }

    #[test]
    fn produces_at_least_one_candidate() {
        let variants = mutate(&base());
        assert!(!variants.is_empty());
    }

    #[test]
    fn produces_at_most_six_candidates() {
        let variants = mutate(&base());
        assert!(variants.len() <= 6);
    }

    #[test]
    fn never_modifies_base_bytes() {
        let b = base();
        let original_bytes = b.bytes.clone();
        let variants = mutate(&b);
        assert_eq!(b.bytes, original_bytes);
        for v in &variants {
            assert_eq!(v.bytes, b.bytes);
        }
    }

    #[test]
    fn keep_variant_is_tagged_and_distinct_from_base_id() {
        let b = base();
        let variants = mutate(&b);
        let keep = &variants[0];
        assert!(keep.meta.contains_key("tag"));
        assert_ne!(keep.id, b.id);
    }

    #[test]
    fn variant_ids_are_unique() {
        let variants = mutate(&base());
        let mut ids: Vec<&str> = variants.iter().map(|v| v.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), variants.len());
    }
}

//! Cost accounting: append-only `CostRecord`s plus two interchangeable
//! aggregator backends (in-memory and a SQLite-relational variant) behind
//! one `CostAggregator` trait. Appends are serialized; queries return a
//! consistent snapshot of whatever has been appended so far.

use std::collections::HashMap;

use async_trait::async_trait;
use forge_core::CostRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Round to 1e-6, matching the spec's cost-rounding rule.
pub fn round_cost(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub fn compute_cost(
    prompt_tokens: u64,
    completion_tokens: u64,
    in_per_1k: f64,
    out_per_1k: f64,
) -> (f64, f64, f64) {
    let cost_in = round_cost(prompt_tokens as f64 * in_per_1k / 1000.0);
    let cost_out = round_cost(completion_tokens as f64 * out_per_1k / 1000.0);
    (cost_in, cost_out, round_cost(cost_in + cost_out))
}

#[derive(Debug, Clone, Default)]
pub struct CostFilter {
    pub caller: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

impl CostFilter {
    fn matches(&self, record: &CostRecord) -> bool {
        if let Some(caller) = &self.caller {
            if &record.caller != caller {
                return false;
            }
        }
        if let Some(provider) = &self.provider {
            if &record.provider != provider {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if &record.model != model {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.ts < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.ts > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Provider,
    Model,
    Caller,
    Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CostSummary {
    pub count: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetInfo {
    pub used: f64,
    pub remaining: f64,
    pub exceeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Common contract both aggregator backends implement.
#[async_trait]
pub trait CostAggregator: Send + Sync {
    async fn record(&self, record: CostRecord);
    async fn query(&self, filter: &CostFilter) -> Vec<CostRecord>;
    async fn summary(&self, filter: &CostFilter) -> CostSummary;
    async fn report(&self, filter: &CostFilter, group_by: GroupBy) -> HashMap<String, CostSummary>;
    async fn budget_info(&self, caller: &str, amount: f64, currency: &str) -> BudgetInfo;
    async fn export(&self, filter: &CostFilter, fmt: ExportFormat) -> String;
}

fn group_key(record: &CostRecord, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Provider => record.provider.clone(),
        GroupBy::Model => record.model.clone(),
        GroupBy::Caller => record.caller.clone(),
        GroupBy::Currency => record.currency.clone(),
    }
}

pub(crate) fn fold_summary_rows(records: &[CostRecord]) -> CostSummary {
    let mut summary = CostSummary::default();
    for r in records {
        summary.count += 1;
        summary.prompt_tokens += r.prompt_tokens;
        summary.completion_tokens += r.completion_tokens;
        summary.cost_total += r.cost_total;
    }
    summary.cost_total = round_cost(summary.cost_total);
    summary
}

pub(crate) fn export_records(records: &[CostRecord], fmt: ExportFormat) -> String {
    match fmt {
        ExportFormat::Json => serde_json::to_string_pretty(records).unwrap_or_default(),
        ExportFormat::Csv => {
            let mut out = String::from(
                "ts,caller,provider,model,prompt_tokens,completion_tokens,currency,cost_in,cost_out,cost_total,request_id\n",
            );
            for r in records {
                out.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{},{},{}\n",
                    r.ts.to_rfc3339(),
                    r.caller,
                    r.provider,
                    r.model,
                    r.prompt_tokens,
                    r.completion_tokens,
                    r.currency,
                    r.cost_in,
                    r.cost_out,
                    r.cost_total,
                    r.request_id,
                ));
            }
            out
        }
    }
}

/// In-memory aggregator backend: appends are serialized under a lock,
/// queries clone a consistent snapshot.
#[derive(Default)]
pub struct MemoryCostAggregator {
    records: Mutex<Vec<CostRecord>>,
}

impl MemoryCostAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CostAggregator for MemoryCostAggregator {
    async fn record(&self, record: CostRecord) {
        self.records.lock().push(record);
    }

    async fn query(&self, filter: &CostFilter) -> Vec<CostRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    async fn summary(&self, filter: &CostFilter) -> CostSummary {
        let matched = self.query(filter).await;
        fold_summary_rows(&matched)
    }

    async fn report(&self, filter: &CostFilter, group_by: GroupBy) -> HashMap<String, CostSummary> {
        let matched = self.query(filter).await;
        let mut groups: HashMap<String, Vec<CostRecord>> = HashMap::new();
        for r in matched {
            groups.entry(group_key(&r, group_by)).or_default().push(r);
        }
        groups
            .into_iter()
            .map(|(k, rs)| (k, fold_summary_rows(&rs)))
            .collect()
    }

    async fn budget_info(&self, caller: &str, amount: f64, currency: &str) -> BudgetInfo {
        let filter = CostFilter {
            caller: Some(caller.to_string()),
            ..Default::default()
        };
        let used: f64 = self
            .query(&filter)
            .await
            .into_iter()
            .filter(|r| r.currency == currency)
            .map(|r| r.cost_total)
            .sum();
        let used = round_cost(used);
        BudgetInfo {
            used,
            remaining: (amount - used).max(0.0),
            exceeded: used > amount,
        }
    }

    async fn export(&self, filter: &CostFilter, fmt: ExportFormat) -> String {
        export_records(&self.query(filter).await, fmt)
    }
}

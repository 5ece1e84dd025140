//! Relational cost-aggregator backend: the same `CostAggregator` contract
//! as [`crate::cost::MemoryCostAggregator`], backed by a SQLite table
//! instead of an in-process `Vec`. Grounded on the teacher's own use of
//! `sqlx`-backed SQLite for rate-limit/task bookkeeping -- reused here for
//! the one concern (durable cost history surviving a process restart)
//! where a relational store genuinely earns its keep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forge_core::CostRecord;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::cost::{
    fold_summary_rows, round_cost, BudgetInfo, CostAggregator, CostFilter, CostSummary,
    ExportFormat, GroupBy,
};

pub struct SqliteCostAggregator {
    pool: SqlitePool,
}

impl SqliteCostAggregator {
    /// Open (creating if absent) a SQLite database at `path` and ensure the
    /// `cost_records` table exists.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(4).connect(&url).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cost_records (
                ts TEXT NOT NULL,
                caller TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                prompt_tokens INTEGER NOT NULL,
                completion_tokens INTEGER NOT NULL,
                currency TEXT NOT NULL,
                cost_in REAL NOT NULL,
                cost_out REAL NOT NULL,
                cost_total REAL NOT NULL,
                request_id TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(SqliteCostAggregator { pool })
    }

    /// In-memory SQLite pool, handy for tests that want the relational
    /// code path exercised without a file on disk.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        Self::open(":memory:").await
    }

    fn build_where(filter: &CostFilter) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();
        if let Some(caller) = &filter.caller {
            clauses.push("caller = ?".to_string());
            binds.push(caller.clone());
        }
        if let Some(provider) = &filter.provider {
            clauses.push("provider = ?".to_string());
            binds.push(provider.clone());
        }
        if let Some(model) = &filter.model {
            clauses.push("model = ?".to_string());
            binds.push(model.clone());
        }
        if let Some(from) = filter.from {
            clauses.push("ts >= ?".to_string());
            binds.push(from.to_rfc3339());
        }
        if let Some(to) = filter.to {
            clauses.push("ts <= ?".to_string());
            binds.push(to.to_rfc3339());
        }
        if clauses.is_empty() {
            (String::new(), binds)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), binds)
        }
    }
}

#[async_trait]
impl CostAggregator for SqliteCostAggregator {
    async fn record(&self, record: CostRecord) {
        let result = sqlx::query(
            "INSERT INTO cost_records
             (ts, caller, provider, model, prompt_tokens, completion_tokens, currency, cost_in, cost_out, cost_total, request_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.ts.to_rfc3339())
        .bind(&record.caller)
        .bind(&record.provider)
        .bind(&record.model)
        .bind(record.prompt_tokens as i64)
        .bind(record.completion_tokens as i64)
        .bind(&record.currency)
        .bind(record.cost_in)
        .bind(record.cost_out)
        .bind(record.cost_total)
        .bind(&record.request_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "failed to append cost record to sqlite aggregator");
        }
    }

    async fn query(&self, filter: &CostFilter) -> Vec<CostRecord> {
        let (where_clause, binds) = Self::build_where(filter);
        let sql = format!(
            "SELECT ts, caller, provider, model, prompt_tokens, completion_tokens, currency, cost_in, cost_out, cost_total, request_id
             FROM cost_records{where_clause} ORDER BY ts ASC"
        );
        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let rows = match query.fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "cost query failed");
                return Vec::new();
            }
        };
        rows.into_iter()
            .filter_map(|row| {
                let ts_str: String = row.try_get("ts").ok()?;
                let ts: DateTime<Utc> = ts_str.parse().ok()?;
                Some(CostRecord {
                    ts,
                    caller: row.try_get("caller").ok()?,
                    provider: row.try_get("provider").ok()?,
                    model: row.try_get("model").ok()?,
                    prompt_tokens: row.try_get::<i64, _>("prompt_tokens").ok()? as u64,
                    completion_tokens: row.try_get::<i64, _>("completion_tokens").ok()? as u64,
                    currency: row.try_get("currency").ok()?,
                    cost_in: row.try_get("cost_in").ok()?,
                    cost_out: row.try_get("cost_out").ok()?,
                    cost_total: row.try_get("cost_total").ok()?,
                    request_id: row.try_get("request_id").ok()?,
                })
            })
            .collect()
    }

    async fn summary(&self, filter: &CostFilter) -> CostSummary {
        fold_summary_rows(&self.query(filter).await)
    }

    async fn report(&self, filter: &CostFilter, group_by: GroupBy) -> HashMap<String, CostSummary> {
        let matched = self.query(filter).await;
        let mut groups: HashMap<String, Vec<CostRecord>> = HashMap::new();
        for r in matched {
            let key = match group_by {
                GroupBy::Provider => r.provider.clone(),
                GroupBy::Model => r.model.clone(),
                GroupBy::Caller => r.caller.clone(),
                GroupBy::Currency => r.currency.clone(),
            };
            groups.entry(key).or_default().push(r);
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
        crate::cost::export_records(&self.query(filter).await, fmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(caller: &str, cost_total: f64) -> CostRecord {
        CostRecord {
            ts: Utc::now(),
            caller: caller.to_string(),
            provider: "mock".to_string(),
            model: "gpt-mini".to_string(),
            prompt_tokens: 10,
            completion_tokens: 20,
            currency: "USD".to_string(),
            cost_in: cost_total / 2.0,
            cost_out: cost_total / 2.0,
            cost_total,
            request_id: "r1".to_string(),
        }
    }

    #[tokio::test]
    async fn record_then_query_round_trips() {
        let agg = SqliteCostAggregator::open_in_memory().await.unwrap();
        agg.record(record("alice", 1.5)).await;
        let rows = agg.query(&CostFilter::default()).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].caller, "alice");
        assert_eq!(rows[0].cost_total, 1.5);
    }

    #[tokio::test]
    async fn summary_and_memory_backend_agree_on_the_same_inputs() {
        let sqlite = SqliteCostAggregator::open_in_memory().await.unwrap();
        let memory = crate::cost::MemoryCostAggregator::new();
        for caller_cost in [("alice", 1.0), ("bob", 3.0), ("alice", 2.0)] {
            sqlite.record(record(caller_cost.0, caller_cost.1)).await;
            memory.record(record(caller_cost.0, caller_cost.1)).await;
        }
        let sqlite_summary = sqlite.summary(&CostFilter::default()).await;
        let memory_summary = memory.summary(&CostFilter::default()).await;
        assert_eq!(sqlite_summary.count, memory_summary.count);
        assert_eq!(sqlite_summary.cost_total, memory_summary.cost_total);
    }

    #[tokio::test]
    async fn budget_info_flags_exceeded_spend() {
        let agg = SqliteCostAggregator::open_in_memory().await.unwrap();
        agg.record(record("alice", 8.0)).await;
        let info = agg.budget_info("alice", 5.0, "USD").await;
        assert!(info.exceeded);
    }
}

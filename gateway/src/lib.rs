//! LLM gateway resilience core: a uniform pipeline every outbound model
//! call passes through --
//! `cache -> singleflight -> rate limiter -> circuit breaker -> retry ->
//! provider -> cost accounting -> cache put` -- fronting many [`Provider`]
//! backends (mock and generic HTTP) behind one `Gateway` entry point.

pub mod cache;
pub mod cache_key;
pub mod circuit_breaker;
pub mod cost;
pub mod cost_relational;
pub mod error;
pub mod provider;
pub mod rate_limiter;
pub mod registry;
pub mod retry;
pub mod singleflight;
pub mod streaming;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use forge_core::{CancelScope, CostRecord, ModelConfig};
use serde::{Deserialize, Serialize};

pub use cache::ResponseCache;
pub use circuit_breaker::CircuitBreaker;
pub use cost::{CostAggregator, CostFilter, MemoryCostAggregator};
pub use error::GatewayError;
pub use provider::{
    ChatRequest, ChatResponse, CompleteRequest, EmbedRequest, EmbedResponse, HttpProvider,
    MockProvider, Provider, ProviderCallError,
};
pub use rate_limiter::RateLimiterRegistry;
pub use registry::ModelRegistry;
pub use retry::RetryPolicy;
pub use streaming::{AggregatedUsage, StreamEvent, UsageAggregator};

/// Which concrete [`Provider`] implementation backs every model in the
/// registry. Per-model vendor adapters are out of scope -- everything
/// behind this gateway speaks the uniform Chat/Embed shape already.
pub enum ProviderBackend {
    Mock,
    Http(reqwest::Client),
}

impl ProviderBackend {
    fn build(&self, cfg: &ModelConfig) -> Arc<dyn Provider> {
        match self {
            ProviderBackend::Mock => Arc::new(MockProvider),
            ProviderBackend::Http(client) => Arc::new(HttpProvider::new(client.clone(), cfg.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub cache_max_size: usize,
    pub cache_default_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            cache_max_size: 1024,
            cache_default_ttl: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// What `chat`/`complete`/`embed` return: the decoded response plus the
/// cost of the call (zero on a cache hit -- no new spend was incurred) and
/// whether this call was served from cache.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub response: T,
    pub cost_total: f64,
    pub currency: String,
    pub cache_hit: bool,
}

#[derive(Serialize, Deserialize)]
struct CachedChat {
    response: ChatResponse,
    cost_total: f64,
    currency: String,
}

/// The gateway's resilience core: per-model rate limiter and circuit
/// breaker registries, a shared response cache + singleflight map, a retry
/// policy, and a cost aggregator. Global maps are initialized once at
/// construction and torn down with the `Gateway` value; nothing here is
/// process-wide `static` state, so multiple gateways (e.g. in tests) never
/// share limiter/breaker state by accident.
pub struct Gateway {
    registry: ModelRegistry,
    backend: ProviderBackend,
    cache: ResponseCache,
    singleflight: singleflight::Singleflight,
    rate_limiters: RateLimiterRegistry,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    retry: RetryPolicy,
    pub cost: Arc<dyn CostAggregator>,
}

impl Gateway {
    pub fn new(
        registry: ModelRegistry,
        backend: ProviderBackend,
        cost: Arc<dyn CostAggregator>,
        config: GatewayConfig,
    ) -> Self {
        Gateway {
            registry,
            backend,
            cache: ResponseCache::new(config.cache_max_size, config.cache_default_ttl),
            singleflight: singleflight::Singleflight::new(),
            rate_limiters: RateLimiterRegistry::new(),
            breakers: DashMap::new(),
            retry: config.retry,
            cost,
        }
    }

    pub fn mock(cost: Arc<dyn CostAggregator>) -> Self {
        Gateway::new(ModelRegistry::mock(), ProviderBackend::Mock, cost, GatewayConfig::default())
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn cache_stats(&self) -> cache::CacheStatsSnapshot {
        self.cache.stats()
    }

    fn breaker_for(&self, cfg: &ModelConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(cfg.id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::from_model_config(cfg)))
            .clone()
    }

    /// `POST /v1/chat` pipeline stage. `caller` attributes the resulting
    /// [`CostRecord`] (absent on a cache hit, since no new spend occurred).
    pub async fn chat(
        &self,
        req: ChatRequest,
        caller: &str,
        scope: &CancelScope,
    ) -> Result<Outcome<ChatResponse>, GatewayError> {
        let key = cache_key::chat_cache_key(&req);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(cached) = serde_json::from_value::<CachedChat>(cached) {
                return Ok(Outcome {
                    response: cached.response,
                    cost_total: cached.cost_total,
                    currency: cached.currency,
                    cache_hit: true,
                });
            }
        }

        let cfg = self.registry.get(&req.model)?.clone();
        let cost_agg = self.cost.clone();
        let rate_limiter = self.rate_limiters.get_or_create(&cfg);
        let breaker = self.breaker_for(&cfg);
        let backend_provider = self.backend.build(&cfg);
        let retry = self.retry;
        let scope_for_call = scope.clone();
        let caller = caller.to_string();
        let req_for_call = req.clone();
        let cfg_for_call = cfg.clone();

        let result = self
            .singleflight
            .call(&key, move || {
                Box::pin(async move {
                    rate_limiter
                        .wait(&scope_for_call)
                        .await
                        .map_err(|e| e.to_string())?;

                    if !breaker.allow() {
                        return Err(GatewayError::CircuitOpen(cfg_for_call.id.clone()).to_string());
                    }

                    let mut attempts = 0u32;
                    let call_result = retry
                        .run(
                            &scope_for_call,
                            |e: &ProviderCallError| e.is_retryable(),
                            || {
                                attempts += 1;
                                backend_provider.chat(&req_for_call)
                            },
                        )
                        .await;

                    breaker.on_result(call_result.is_ok());

                    let response = call_result.map_err(|e| {
                        GatewayError::ProviderFailed {
                            attempts,
                            message: e.to_string(),
                        }
                        .to_string()
                    })?;

                    let (cost_in, cost_out, cost_total) = cost::compute_cost(
                        response.usage.prompt_tokens,
                        response.usage.completion_tokens,
                        cfg_for_call.pricing.currency_in_per_1k,
                        cfg_for_call.pricing.currency_out_per_1k,
                    );
                    cost_agg
                        .record(CostRecord {
                            ts: chrono::Utc::now(),
                            caller: caller.clone(),
                            provider: cfg_for_call.provider.clone(),
                            model: cfg_for_call.id.clone(),
                            prompt_tokens: response.usage.prompt_tokens,
                            completion_tokens: response.usage.completion_tokens,
                            currency: cfg_for_call.currency.clone(),
                            cost_in,
                            cost_out,
                            cost_total,
                            request_id: uuid::Uuid::new_v4().to_string(),
                        })
                        .await;

                    let cached = CachedChat {
                        response: response.clone(),
                        cost_total,
                        currency: cfg_for_call.currency.clone(),
                    };
                    serde_json::to_value(&cached).map_err(|e| e.to_string())
                })
            })
            .await;

        let value = result.map_err(GatewayError::InvalidRequest)?;
        let cached: CachedChat =
            serde_json::from_value(value.clone()).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        self.cache.put(key, value);

        Ok(Outcome {
            response: cached.response,
            cost_total: cached.cost_total,
            currency: cached.currency,
            cache_hit: false,
        })
    }

    /// `POST /v1/complete`. Shares the same resilience pipeline as `chat`
    /// but skips the response cache -- completion prompts are typically
    /// unique per call, so memoizing them has little value and is not
    /// required by the spec.
    pub async fn complete(
        &self,
        req: CompleteRequest,
        caller: &str,
        scope: &CancelScope,
    ) -> Result<Outcome<ChatResponse>, GatewayError> {
        let cfg = self.registry.get(&req.model)?.clone();
        let rate_limiter = self.rate_limiters.get_or_create(&cfg);
        let breaker = self.breaker_for(&cfg);
        let backend_provider = self.backend.build(&cfg);

        rate_limiter.wait(scope).await?;
        if !breaker.allow() {
            return Err(GatewayError::CircuitOpen(cfg.id.clone()));
        }

        let mut attempts = 0u32;
        let call_result = self
            .retry
            .run(scope, |e: &ProviderCallError| e.is_retryable(), || {
                attempts += 1;
                backend_provider.complete(&req)
            })
            .await;
        breaker.on_result(call_result.is_ok());

        let response = call_result.map_err(|e| GatewayError::ProviderFailed {
            attempts,
            message: e.to_string(),
        })?;

        let (cost_in, cost_out, cost_total) = cost::compute_cost(
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            cfg.pricing.currency_in_per_1k,
            cfg.pricing.currency_out_per_1k,
        );
        self.cost
            .record(CostRecord {
                ts: chrono::Utc::now(),
                caller: caller.to_string(),
                provider: cfg.provider.clone(),
                model: cfg.id.clone(),
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens,
                currency: cfg.currency.clone(),
                cost_in,
                cost_out,
                cost_total,
                request_id: uuid::Uuid::new_v4().to_string(),
            })
            .await;

        Ok(Outcome {
            response,
            cost_total,
            currency: cfg.currency.clone(),
            cache_hit: false,
        })
    }

    /// `POST /v1/embed`. Same pipeline minus caching, mirroring `complete`.
    pub async fn embed(
        &self,
        req: EmbedRequest,
        caller: &str,
        scope: &CancelScope,
    ) -> Result<Outcome<EmbedResponse>, GatewayError> {
        let cfg = self.registry.get(&req.model)?.clone();
        let rate_limiter = self.rate_limiters.get_or_create(&cfg);
        let breaker = self.breaker_for(&cfg);
        let backend_provider = self.backend.build(&cfg);

        rate_limiter.wait(scope).await?;
        if !breaker.allow() {
            return Err(GatewayError::CircuitOpen(cfg.id.clone()));
        }

        let mut attempts = 0u32;
        let call_result = self
            .retry
            .run(scope, |e: &ProviderCallError| e.is_retryable(), || {
                attempts += 1;
                backend_provider.embed(&req)
            })
            .await;
        breaker.on_result(call_result.is_ok());

        let response = call_result.map_err(|e| GatewayError::ProviderFailed {
            attempts,
            message: e.to_string(),
        })?;

        let (cost_in, cost_out, cost_total) = cost::compute_cost(
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            cfg.pricing.currency_in_per_1k,
            cfg.pricing.currency_out_per_1k,
        );
        self.cost
            .record(CostRecord {
                ts: chrono::Utc::now(),
                caller: caller.to_string(),
                provider: cfg.provider.clone(),
                model: cfg.id.clone(),
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens,
                currency: cfg.currency.clone(),
                cost_in,
                cost_out,
                cost_total,
                request_id: uuid::Uuid::new_v4().to_string(),
            })
            .await;

        Ok(Outcome {
            response,
            cost_total,
            currency: cfg.currency.clone(),
            cache_hit: false,
        })
    }

    /// `POST /v1/chat?stream=1`: run `chat`'s resilience pipeline, then
    /// fan the resulting content out as a `start -> chunk* -> done` event
    /// sequence. A failure becomes a single `error` event rather than a
    /// propagated `GatewayError`, matching the SSE contract's `error`
    /// terminal state.
    pub async fn chat_stream(
        &self,
        req: ChatRequest,
        caller: &str,
        scope: &CancelScope,
    ) -> Vec<StreamEvent> {
        let model = req.model.clone();
        let mut events = vec![StreamEvent::Start { model }];
        match self.chat(req, caller, scope).await {
            Ok(outcome) => {
                let aggregator = UsageAggregator::new();
                aggregator.accumulate(&outcome.response.usage);
                for word in outcome.response.content.split_inclusive(' ') {
                    events.push(StreamEvent::Chunk {
                        delta: word.to_string(),
                    });
                }
                let usage = aggregator.snapshot();
                events.push(StreamEvent::Done {
                    usage: provider::Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                    },
                    cost: outcome.cost_total,
                    currency: outcome.currency,
                });
            }
            Err(e) => events.push(StreamEvent::Error {
                message: e.user_hint(),
            }),
        }
        events
    }
}

impl From<GatewayError> for String {
    fn from(e: GatewayError) -> Self {
        e.to_string()
    }
}

pub use forge_core::ErrorHint;

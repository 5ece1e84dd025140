use forge_core::ErrorHint;
use thiserror::Error;

/// Errors the gateway pipeline surfaces. Ordered roughly by where in the
/// pipeline they originate (cache/singleflight -> rate limiter -> breaker
/// -> retry/provider -> cost).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no model registered with id '{0}'")]
    UnknownModel(String),

    #[error("request cancelled before a rate-limit token became available")]
    RateLimitCancelled,

    #[error("circuit breaker open for model '{0}'")]
    CircuitOpen(String),

    #[error("provider call failed after {attempts} attempt(s): {message}")]
    ProviderFailed { attempts: u32, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("budget of {amount} {currency} for caller '{caller}' would be exceeded")]
    BudgetExceeded {
        caller: String,
        amount: f64,
        currency: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ErrorHint for GatewayError {
    fn user_hint(&self) -> String {
        match self {
            GatewayError::UnknownModel(id) => format!("no model '{id}' is registered"),
            GatewayError::RateLimitCancelled => "rate limit wait was cancelled".into(),
            GatewayError::CircuitOpen(model) => {
                format!("'{model}' is temporarily unavailable (circuit open)")
            }
            GatewayError::ProviderFailed { .. } => "the upstream provider failed".into(),
            GatewayError::Cancelled => "the request was cancelled".into(),
            GatewayError::BudgetExceeded { .. } => "this call would exceed the caller's budget".into(),
            GatewayError::InvalidRequest(msg) => msg.clone(),
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimitCancelled
                | GatewayError::CircuitOpen(_)
                | GatewayError::ProviderFailed { .. }
        )
    }
}

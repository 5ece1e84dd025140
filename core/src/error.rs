//! Extension trait every leaf error enum in this workspace implements,
//! mirroring the SDK's `user_hint`/`is_recoverable` convention: a flat
//! `thiserror` enum carries the wire-safe `Display` message, while this
//! trait carries the operator-facing hint and whether a caller should retry.

/// A safe, user-facing hint plus a recoverability flag for an error variant.
///
/// Implementors keep `user_hint` free of internal paths, stack traces, or
/// secrets -- it is the text an HTTP handler is allowed to put in a 4xx/5xx
/// body. `is_recoverable` tells callers (the Solver's mutation loop, the
/// gateway's retry policy) whether retrying the same operation could ever
/// succeed without external state changing.
pub trait ErrorHint {
    /// A short, safe-to-display explanation of what went wrong.
    fn user_hint(&self) -> String;

    /// Whether retrying the same operation could plausibly succeed.
    fn is_recoverable(&self) -> bool;
}

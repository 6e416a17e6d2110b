//! Typed error taxonomy for the engine boundary. The control loop itself
//! logs and continues past all of these; none ever aborts a tick across
//! policies except `ConfigError`, which is fatal at startup only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] anyhow::Error),

    #[error("policy evaluation error in {policy}: {reason}")]
    PolicyEval { policy: String, reason: String },

    #[error("unhandled target kind: {0}")]
    UnhandledKind(String),
}

/// Not a real error: too few histogram samples to answer a percentile
/// query. Logged at info level and treated as a skip, never propagated
/// as an `EngineError`.
#[derive(Debug, Clone, Copy)]
pub struct InsufficientData;

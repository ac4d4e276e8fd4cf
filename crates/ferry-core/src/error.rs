//! Errors - エラー型と分類
//!
//! - 同期エラー（引数・payload の不備）は呼び出し元に即座に返す
//! - worker 内部の非同期エラーは owner の call stack には戻らず、`error` イベントでのみ観測できる

use thiserror::Error;

/// A value could not be converted to (or rebuilt from) a transportable snapshot.
///
/// Raised synchronously at the send call site; the channel is left untouched.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("value of kind `{kind}` cannot be cloned across contexts")]
    Unsupported { kind: &'static str },

    #[error("value nests arrays or objects deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("snapshot decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("snapshot references unknown node #{0}")]
    DanglingReference(u32),
}

/// Failures of a worker context.
///
/// `Startup` and `Uncaught` are never returned to the owner directly. They are
/// reported through the handle's `error` event.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker failed to start from `{locator}`: {reason}")]
    Startup { locator: String, reason: String },

    #[error("uncaught error in worker: {0}")]
    Uncaught(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("{0}")]
    Other(String),
}

impl WorkerError {
    /// Short machine-readable kind, used as `kind` in `error` event details.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Startup { .. } => "startup",
            _ => "uncaught",
        }
    }
}

/// ModuleRegistry の登録エラー
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("entry point for locator '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_classified_as_startup() {
        let err = WorkerError::Startup {
            locator: "helpers/worker".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.kind(), "startup");
        assert!(err.to_string().contains("helpers/worker"));
    }

    #[test]
    fn everything_else_is_uncaught() {
        assert_eq!(WorkerError::Uncaught("boom".into()).kind(), "uncaught");
        assert_eq!(WorkerError::Other("boom".into()).kind(), "uncaught");
        let ser: WorkerError = SerializationError::Unsupported { kind: "function" }.into();
        assert_eq!(ser.kind(), "uncaught");
    }
}

use std::collections::BTreeMap;

use thiserror::Error;

use crate::capability::BackendId;

/// Free-form context attached to every error so callers can log or render
/// `(backend, operation, context)` without downcasting (§7).
pub type ErrorContext = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("{backend}: failed to connect to {host}:{port}: {cause}")]
    Connection {
        backend: BackendId,
        host: String,
        port: u16,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{backend}: bad configuration for `{field}`: {reason}")]
    Configuration {
        backend: BackendId,
        field: String,
        reason: String,
    },

    #[error("{backend}: `{operation}` is not supported: {reason}")]
    Unsupported {
        backend: BackendId,
        operation: String,
        reason: String,
    },

    #[error("{backend}: invalid data in `{operation}`: {detail}")]
    InvalidData {
        backend: BackendId,
        operation: String,
        detail: String,
    },

    #[error("{backend}: {resource_kind} `{name}` not found")]
    NotFound {
        backend: BackendId,
        resource_kind: String,
        name: String,
    },

    #[error("{backend}: `{operation}` failed: {inner}")]
    Wrapped {
        backend: BackendId,
        operation: String,
        #[source]
        inner: Box<dyn std::error::Error + Send + Sync>,
        context: ErrorContext,
    },
}

impl AnchorError {
    pub fn unsupported(backend: BackendId, operation: impl Into<String>, reason: impl Into<String>) -> Self {
        AnchorError::Unsupported {
            backend,
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_data(backend: BackendId, operation: impl Into<String>, detail: impl Into<String>) -> Self {
        AnchorError::InvalidData {
            backend,
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(backend: BackendId, resource_kind: impl Into<String>, name: impl Into<String>) -> Self {
        AnchorError::NotFound {
            backend,
            resource_kind: resource_kind.into(),
            name: name.into(),
        }
    }

    pub fn wrapped(
        backend: BackendId,
        operation: impl Into<String>,
        inner: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AnchorError::Wrapped {
            backend,
            operation: operation.into(),
            inner: Box::new(inner),
            context: ErrorContext::default(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let AnchorError::Wrapped { context, .. } = &mut self {
            context.insert(key.into(), value.into());
        }
        self
    }

    /// `backend` is present on every variant; used by the config watcher
    /// and adapters to decide whether a failure is expected/transient.
    pub fn backend(&self) -> BackendId {
        match self {
            AnchorError::Connection { backend, .. }
            | AnchorError::Configuration { backend, .. }
            | AnchorError::Unsupported { backend, .. }
            | AnchorError::InvalidData { backend, .. }
            | AnchorError::NotFound { backend, .. }
            | AnchorError::Wrapped { backend, .. } => *backend,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, AnchorError::Unsupported { .. })
    }
}

pub type AnchorResult<T> = Result<T, AnchorError>;

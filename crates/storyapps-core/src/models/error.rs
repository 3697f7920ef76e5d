use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    StorageUnavailable,
    OpenError,
    WriteError,
    ReadError,
    AuthRequired,
    SubscriptionUnavailable,
    MalformedPushPayload,
    NetworkError,
    Api,
    InvalidInput,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: CoreErrorKind,
    pub operation: Option<&'static str>,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: None,
            message: message.into(),
        }
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation.get_or_insert(operation);
        self
    }

    /// Transaction-level and transport failures may succeed when retried;
    /// everything else needs the caller to change something first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            CoreErrorKind::OpenError
                | CoreErrorKind::WriteError
                | CoreErrorKind::ReadError
                | CoreErrorKind::NetworkError
        )
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database connection pool exhausted")]
    DbPoolExhausted,

    #[error("Channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    // --- Provider Port error surface ---
    #[error("Rate limited by provider{}", retry_after_secs.map(|s| format!(", retry in {s}s")).unwrap_or_default())]
    ProviderRateLimited { retry_after_secs: Option<u64> },

    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Provider rejected the request: {0}")]
    ProviderBadRequest(String),

    #[error("Provider returned an empty response")]
    ProviderEmptyResponse,

    #[error("Provider is overloaded: {0}")]
    ProviderOverloaded(String),

    #[error("Cannot connect to provider: {0}")]
    ProviderConnect(String),

    #[error("Provider does not support: {feature}")]
    ProviderNotImplemented { feature: String },

    #[error("Unexpected response shape: {0}")]
    ShapeMismatch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Short error code string for log correlation and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Config(_) => "CONFIG_ERROR",
            WardenError::AuthFailed(_) => "AUTH_FAILED",
            WardenError::PermissionDenied { .. } => "PERMISSION_DENIED",
            WardenError::UserNotFound { .. } => "USER_NOT_FOUND",
            WardenError::Database(_) => "DATABASE_ERROR",
            WardenError::DbPoolExhausted => "DB_POOL_EXHAUSTED",
            WardenError::Channel { .. } => "CHANNEL_ERROR",
            WardenError::Serialization(_) => "SERIALIZATION_ERROR",
            WardenError::Io(_) => "IO_ERROR",
            WardenError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            WardenError::Timeout { .. } => "TIMEOUT",
            WardenError::ProviderRateLimited { .. } => "PROVIDER_RATE_LIMITED",
            WardenError::ProviderAuth(_) => "PROVIDER_AUTH",
            WardenError::ProviderBadRequest(_) => "PROVIDER_BAD_REQUEST",
            WardenError::ProviderEmptyResponse => "PROVIDER_EMPTY_RESPONSE",
            WardenError::ProviderOverloaded(_) => "PROVIDER_OVERLOADED",
            WardenError::ProviderConnect(_) => "PROVIDER_CONNECT",
            WardenError::ProviderNotImplemented { .. } => "PROVIDER_NOT_IMPLEMENTED",
            WardenError::ShapeMismatch(_) => "SHAPE_MISMATCH",
            WardenError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("exists")]
    Exists,
    #[error("ack timeout")]
    AckTimeout,
    #[error("no ack pending")]
    NoAckPending,
    #[error("wrong ack")]
    WrongAck,
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The requested offset has already been evicted from the log.
    #[error("offset is off")]
    OffsetOff,
    #[error("message size too large")]
    MessageTooLarge,
    #[error("topic {0} not found")]
    TopicNotFound(String),
    #[error("broker error: {0}")]
    Backend(String),
}

/// Errors surfaced to API callers. Each variant maps onto a fixed http status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0} doesn't exist")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, serde::Serialize)]
struct ApiErrorBody {
    code: u16,
    message: String,
    status: &'static str,
}

#[derive(Debug, serde::Serialize)]
struct ApiErrorRoot {
    error: ApiErrorBody,
}

impl ApiError {
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidArgument(_) => 400,
            Self::AlreadyExists(_) | Self::Conflict(_) => 409,
            Self::Timeout(_) => 408,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::PayloadTooLarge(_) => 413,
            Self::Internal(_) => 500,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidArgument(_) | Self::PayloadTooLarge(_) => "INVALID_ARGUMENT",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Conflict(_) => "CONFLICT",
            Self::Timeout(_) => "TIMEOUT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Renders the json error body returned to clients.
    pub fn to_json(&self) -> String {
        let root = ApiErrorRoot {
            error: ApiErrorBody {
                code: self.code(),
                message: self.to_string(),
                status: self.status(),
            },
        };

        serde_json::to_string(&root).unwrap_or_default()
    }

    pub fn invalid_arguments(resource: &str) -> Self {
        Self::InvalidArgument(format!("Invalid {} Arguments", resource))
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("Access to this resource is forbidden".to_string())
    }

    pub fn push_disabled() -> Self {
        Self::Conflict("Push functionality is currently disabled".to_string())
    }

    pub fn push_unavailable() -> Self {
        Self::Internal("Push functionality is currently unavailable".to_string())
    }

    pub fn pull_no_topic() -> Self {
        Self::Conflict("Subscription's topic doesn't exist".to_string())
    }

    pub fn push_verification(reason: &str) -> Self {
        Self::Unauthorized(format!("Endpoint verification failed. {}", reason))
    }

    pub fn generic_backend() -> Self {
        Self::Internal("Backend Error".to_string())
    }

    pub fn subscription_not_found() -> Self {
        Self::NotFound("Subscription".to_string())
    }

    /// Maps store failures of subscription lookups and updates.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::subscription_not_found(),
            StoreError::Exists => Self::AlreadyExists("Subscription".to_string()),
            StoreError::AckTimeout => Self::Timeout(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::MessageTooLarge => {
                Self::PayloadTooLarge("Message size is too large".to_string())
            }
            _ => Self::generic_backend(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_code_and_status() {
        let err = ApiError::InvalidArgument("Invalid ack id".to_string());
        let body: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();

        assert_eq!(body["error"]["code"], 400);
        assert_eq!(body["error"]["message"], "Invalid ack id");
        assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
    }

    #[test]
    fn store_sentinels_map_to_fixed_statuses() {
        assert_eq!(ApiError::from_store(StoreError::NotFound).code(), 404);
        assert_eq!(ApiError::from_store(StoreError::Exists).code(), 409);

        let timeout = ApiError::from_store(StoreError::AckTimeout);
        assert_eq!(timeout.code(), 408);
        assert_eq!(timeout.to_string(), "ack timeout");

        assert_eq!(ApiError::from_store(StoreError::WrongAck).code(), 500);
    }

    #[test]
    fn oversized_messages_map_to_413() {
        assert_eq!(ApiError::from(BrokerError::MessageTooLarge).code(), 413);
        assert_eq!(ApiError::from(BrokerError::OffsetOff).code(), 500);
    }
}

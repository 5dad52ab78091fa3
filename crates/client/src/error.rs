//! Client-side API error taxonomy.

/// Outcome of an authenticated REST call after the response policy has been
/// applied. UI code renders these; it never interprets them further.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transient failure that survived the single silent retry.
    #[error("network error: {0}")]
    Network(String),

    /// A 401 was seen; the local session has already been evicted.
    #[error("your session has expired, please sign in again")]
    SessionExpired,

    #[error("permission denied")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// All field-level validation errors from a 422, concatenated.
    #[error("{0}")]
    Validation(String),

    /// The rate-limit retry budget ran out.
    #[error("too many requests, please try again later")]
    RateLimited,

    /// Any 5xx. Never retried automatically.
    #[error("server error, please try again later")]
    Server,

    /// Anything the policy does not recognize, passed through unchanged.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

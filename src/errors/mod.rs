use thiserror::Error;

/// Main error type for sqlgate operations.
///
/// Every variant maps to exactly one HTTP status via [`status_code`].
#[derive(Error, Debug)]
pub enum SqlGateError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("rate limit exceeded")]
    TooManyRequests { retry_after_sec: u64 },

    #[error("deadline exceeded")]
    Timeout,

    #[error("unknown database: {0}")]
    UnknownDb(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("template error: {0}")]
    TemplateError(String),

    #[error("missing key: {0}")]
    MissingKey(String),

    #[error("http call failed: {0}")]
    HttpCallError(String),

    #[error("pipeline panicked: {0}")]
    Panic(String),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template engine error: {0}")]
    Minijinja(#[from] minijinja::Error),

    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("sql server error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("sql server pool error: {0}")]
    TiberiusPool(String),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),

    #[error("invalid header name: {0}")]
    HeaderName(#[from] reqwest::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("schedule error: {0}")]
    ScheduleError(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("invalid cron expression: {0}")]
    CronParseError(String),
}

pub type Result<T> = std::result::Result<T, SqlGateError>;

/// HTTP status code for a given error, per the error taxonomy table.
pub fn status_code(err: &SqlGateError) -> http::StatusCode {
    use http::StatusCode as S;
    match err {
        SqlGateError::BadRequest(_) => S::BAD_REQUEST,
        SqlGateError::NotFound(_) => S::NOT_FOUND,
        SqlGateError::MethodNotAllowed(_) => S::METHOD_NOT_ALLOWED,
        SqlGateError::TooManyRequests { .. } => S::TOO_MANY_REQUESTS,
        SqlGateError::Timeout => S::GATEWAY_TIMEOUT,
        SqlGateError::Panic(_) => S::INTERNAL_SERVER_ERROR,
        _ => S::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqlGateError::ConfigError("missing url".to_string());
        assert_eq!(err.to_string(), "configuration error: missing url");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_code(&SqlGateError::BadRequest("x".into())),
            http::StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_code(&SqlGateError::TooManyRequests { retry_after_sec: 3 }),
            http::StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_code(&SqlGateError::Timeout), http::StatusCode::GATEWAY_TIMEOUT);
    }
}

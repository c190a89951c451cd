use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Machine-readable error codes carried in every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationFailed,
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidState,
    Expired,
    Gone,
    Oversize,
    UnsupportedMedia,
    PasswordRequired,
    PasswordIncorrect,
    QuotaExceeded,
    RateLimited,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidState => StatusCode::CONFLICT,
            ErrorCode::Expired | ErrorCode::Gone => StatusCode::GONE,
            ErrorCode::Oversize => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::PasswordRequired | ErrorCode::PasswordIncorrect => StatusCode::LOCKED,
            ErrorCode::QuotaExceeded => StatusCode::FORBIDDEN,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    /// Internal errors - logged but return a generic 500 to the user.
    Internal(anyhow::Error),
    /// User-facing errors - message is safe to show.
    External(ErrorCode, &'static str),
    /// Validation errors - safe to show.
    Validation(String),
    /// Over a rate limit; carries a Retry-After advisory in seconds.
    RateLimited { retry_after_secs: u64 },
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: ErrorCode,
    message: String,
}

fn error_response(code: ErrorCode, message: String) -> Response {
    (
        code.status(),
        Json(ErrorBody {
            error: ErrorDetail { code, message },
        }),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(err) => {
                tracing::error!("internal error: {:?}", err);
                error_response(ErrorCode::Internal, "Internal server error".into())
            }
            AppError::External(code, msg) => error_response(code, msg.into()),
            AppError::Validation(msg) => error_response(ErrorCode::ValidationFailed, msg),
            AppError::RateLimited { retry_after_secs } => {
                let mut response = error_response(
                    ErrorCode::RateLimited,
                    "Rate limit exceeded, slow down".into(),
                );
                if let Ok(value) = retry_after_secs.to_string().parse() {
                    response.headers_mut().insert("retry-after", value);
                }
                response
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn internal_error_returns_500_generic_message() {
        let err = AppError::Internal(anyhow::anyhow!("database connection failed"));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response_body(response).await;
        assert!(body.contains(r#""code":"internal""#));
        assert!(body.contains("Internal server error"));
    }

    #[tokio::test]
    async fn internal_error_hides_sensitive_details() {
        let err = AppError::Internal(anyhow::anyhow!("password=secret123 leaked"));
        let response = err.into_response();

        let body = response_body(response).await;

        assert!(!body.contains("secret123"));
    }

    #[tokio::test]
    async fn external_error_carries_code_and_status() {
        let err = AppError::External(ErrorCode::Expired, "Share is no longer available");
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::GONE);
        let body = response_body(response).await;
        assert!(body.contains(r#""code":"expired""#));
        assert!(body.contains("no longer available"));
    }

    #[tokio::test]
    async fn password_errors_map_to_423() {
        assert_eq!(ErrorCode::PasswordRequired.status(), StatusCode::LOCKED);
        assert_eq!(ErrorCode::PasswordIncorrect.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn validation_error_returns_400_with_details() {
        let err = AppError::Validation("filename: length is lower than 1".into());
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_body(response).await;
        assert!(body.contains(r#""code":"validation_failed""#));
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let err = AppError::RateLimited {
            retry_after_secs: 42,
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "42");
    }

    #[tokio::test]
    async fn io_error_converts_to_internal() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down");
        let err: AppError = io_err.into();

        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

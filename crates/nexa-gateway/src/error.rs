//! HTTP mapping for gateway errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nexa_kernel::GatewayError;
use serde_json::json;

/// Response wrapper for [`GatewayError`].
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

/// Status code for each error kind.
pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::ModelNotFound(_) | GatewayError::VersionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        GatewayError::InputValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
        GatewayError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::ManifestCorrupt(_) | GatewayError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let cases = [
            (GatewayError::Authentication("x".into()), 401),
            (GatewayError::ModelNotFound("x".into()), 404),
            (
                GatewayError::VersionNotFound { family: "bio".into(), version: "9".into() },
                404,
            ),
            (GatewayError::invalid("bio", "empty"), 422),
            (
                GatewayError::QuotaExceeded { tenant: "t".into(), limit: 3, window: "2026-10".into() },
                429,
            ),
            (GatewayError::Internal("boom".into()), 500),
            (GatewayError::StoreUnavailable("down".into()), 503),
            (GatewayError::Timeout(100), 504),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).as_u16(), status, "{err}");
        }
    }

    #[tokio::test]
    async fn body_carries_code_and_message() {
        let resp = ApiError(GatewayError::invalid("bio", "sequence must not be empty")).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"]["code"], "INPUT_VALIDATION");
        assert!(v["error"]["message"].as_str().unwrap().contains("must not be empty"));
    }
}

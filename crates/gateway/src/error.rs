//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。検出地点で即座にHTTPレスポンスへ変換される。
//! レスポンスは常に `{"error": ...}` を含むJSONで、種別によって追加フィールドを持つ。

use axum::http::{HeaderValue, StatusCode};
use axum::Json;
use packdepot_types::{
    ErrorBody, HEADER_RATELIMIT_LIMIT, HEADER_RATELIMIT_REMAINING, HEADER_RATELIMIT_USED,
};
use serde_json::json;

use crate::auth::AuthError;
use crate::storage::StorageError;

/// 未一致ルート時に返す有効なルート一覧
pub const ROUTES: [&str; 3] = [
    "GET /download/{key}",
    "PUT /upload",
    "DELETE /upload/{key}",
];

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 認証失敗（トークン欠落・検証失敗）
    #[error("Unauthorized")]
    Unauthorized(#[from] AuthError),
    /// 必要なロールを持たない
    #[error("Forbidden: {0} role required")]
    Forbidden(&'static str),
    /// 不正なリクエスト（ボディ欠落・パスパラメータ欠落）
    #[error("{0}")]
    BadRequest(String),
    /// アーカイブ検証に失敗。パーサ内部の詳細は返さない。
    #[error("Uploaded file is not a valid archive")]
    InvalidPack,
    /// ダウンロード対象が存在しない
    #[error("Object not found")]
    NotFound { key: String },
    /// 1日あたりのダウンロード上限に到達
    #[error("Rate limit exceeded")]
    RateLimited { limit: u64, used: u64 },
    /// どのルートにも一致しない
    #[error("Not found")]
    RouteNotFound,
    /// アップロードサイズ超過
    #[error("Payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    /// 検証サービスに到達できない
    #[error("Pack validator unavailable")]
    ValidatorUnavailable(String),
    /// ストレージ操作に失敗
    #[error("Storage operation failed")]
    Storage(#[from] StorageError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::BadRequest(_) | GatewayError::InvalidPack => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } | GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ValidatorUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `error` 以外にレスポンスへ載せる構造化フィールド。
    fn extra(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = match self {
            GatewayError::Unauthorized(e) => json!({ "detail": e.reason() }),
            GatewayError::NotFound { key } => json!({ "key": key }),
            GatewayError::RateLimited { limit, used } => json!({
                "limit": limit,
                "used": used,
                "remaining": 0,
            }),
            GatewayError::RouteNotFound => json!({ "routes": ROUTES }),
            _ => json!({}),
        };
        match value {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match &self {
            GatewayError::Storage(e) => tracing::error!(error = %e, "ストレージ操作に失敗"),
            GatewayError::ValidatorUnavailable(e) => {
                tracing::error!(error = %e, "アーカイブ検証サービスに到達できません")
            }
            _ => {}
        }

        let body = ErrorBody {
            error: self.to_string(),
            extra: self.extra(),
        };
        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimited { limit, used } = &self {
            let headers = response.headers_mut();
            headers.insert(HEADER_RATELIMIT_LIMIT, HeaderValue::from(*limit));
            headers.insert(HEADER_RATELIMIT_REMAINING, HeaderValue::from(0u64));
            headers.insert(HEADER_RATELIMIT_USED, HeaderValue::from(*used));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    async fn body_json(error: GatewayError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_rate_limited_body_and_headers() {
        let response = GatewayError::RateLimited { limit: 3, used: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[HEADER_RATELIMIT_REMAINING], "0");

        let (_, body) = body_json(GatewayError::RateLimited { limit: 3, used: 3 }).await;
        assert_eq!(
            body,
            json!({ "error": "Rate limit exceeded", "limit": 3, "used": 3, "remaining": 0 })
        );
    }

    #[tokio::test]
    async fn test_storage_error_hides_backend_detail() {
        let (status, body) =
            body_json(StorageError::Backend("connection reset".to_string()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Storage operation failed" }));
    }

    #[tokio::test]
    async fn test_route_not_found_lists_routes() {
        let (status, body) = body_json(GatewayError::RouteNotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["routes"], json!(ROUTES));
    }
}

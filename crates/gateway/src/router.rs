//! # ルーティング・CORS
//!
//! ## API エンドポイント
//! - `OPTIONS *`: CORSプリフライト（204、認証なし）
//! - `GET /download/{key}`: パックのダウンロード（Bearer）
//! - `PUT /upload`: パックのアップロード（Bearer + ADMIN）
//! - `DELETE /upload/{key}`: パックの削除（Bearer + ADMIN）
//!
//! それ以外は有効なルート一覧付きの404を返す。

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::Router;

use crate::config::GatewayState;
use crate::endpoints::{
    handle_delete, handle_delete_missing_key, handle_download, handle_download_missing_key,
    handle_not_found, handle_upload,
};

const ALLOWED_METHODS: &str = "GET, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type, X-Filename";
const MAX_AGE_SECS: &str = "86400";

/// Gatewayのルーターを構築する。
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(
            "/download",
            get(handle_download_missing_key).fallback(handle_not_found),
        )
        .route(
            "/download/",
            get(handle_download_missing_key).fallback(handle_not_found),
        )
        .route(
            "/download/{*key}",
            get(handle_download).fallback(handle_not_found),
        )
        .route(
            "/upload",
            put(handle_upload)
                .delete(handle_delete_missing_key)
                .fallback(handle_not_found),
        )
        .route(
            "/upload/",
            delete(handle_delete_missing_key).fallback(handle_not_found),
        )
        .route(
            "/upload/{*key}",
            delete(handle_delete).fallback(handle_not_found),
        )
        .fallback(handle_not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cors_middleware,
        ))
        .with_state(state)
}

/// 全レスポンスにCORSヘッダーを付与する。OPTIONSは以降の処理を経ずに204を返す。
async fn cors_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), &state.allowed_origin);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), &state.allowed_origin);
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, allowed_origin: &str) {
    let origin = HeaderValue::from_str(allowed_origin).unwrap_or_else(|_| {
        tracing::warn!(allowed_origin, "ALLOWED_ORIGINがヘッダー値として不正なため*を使用");
        HeaderValue::from_static("*")
    });
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------

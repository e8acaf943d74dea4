//! # GET /download/{key}
//!
//! 認証 → レート制限判定 → 取得 → カウンタ加算 の順で処理する。
//! 取得に失敗した場合はカウンタを加算しない。

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use packdepot_types::FALLBACK_CONTENT_TYPE;

use crate::auth::{authenticate, authorization_header};
use super::object_key;
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::ratelimit::{
    apply_rate_limit_headers, check_rate_limit, increment_download_count, resolve_client_ip,
    RateLimitStatus,
};

/// GET /download/{key}: パックのダウンロード。
pub async fn handle_download(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    key: Result<Path<String>, PathRejection>,
) -> Result<Response, GatewayError> {
    let principal = authenticate(state.verifier.as_ref(), authorization_header(&headers))?;
    let key = object_key(key)?;
    let key = key.as_str();

    let client_ip = resolve_client_ip(&headers);
    let today = state.clock.now().date_naive();

    let status = check_rate_limit(
        state.counter_store.as_ref(),
        today,
        &principal.subject_id,
        &client_ip,
        state.max_downloads_per_day,
    )
    .await?;

    if !status.allowed {
        tracing::info!(
            subject = %principal.subject_id,
            client_ip = %client_ip,
            used = status.current,
            limit = status.limit,
            "ダウンロード上限に到達"
        );
        return Err(GatewayError::RateLimited {
            limit: status.limit,
            used: status.current,
        });
    }

    let object = state
        .blob_store
        .get(key)
        .await?
        .ok_or_else(|| GatewayError::NotFound {
            key: key.to_string(),
        })?;

    let used = increment_download_count(
        state.counter_store.as_ref(),
        today,
        &principal.subject_id,
        &client_ip,
    )
    .await?;

    tracing::info!(
        subject = %principal.subject_id,
        key,
        size = object.body.len(),
        used,
        "ダウンロード"
    );

    let content_type = object
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let mut response = (StatusCode::OK, Body::from(object.body)).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(CONTENT_TYPE, content_type);
    response_headers.insert(CONTENT_DISPOSITION, content_disposition(key));
    response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    apply_rate_limit_headers(
        response_headers,
        &RateLimitStatus {
            allowed: true,
            limit: status.limit,
            current: used,
        },
    );

    Ok(response)
}

/// GET /download（キーなし）: 認証後に400を返す。
pub async fn handle_download_missing_key(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    authenticate(state.verifier.as_ref(), authorization_header(&headers))?;
    Err(GatewayError::BadRequest("Missing object key".to_string()))
}

/// キー末尾のセグメントをファイル名とする `attachment` 指定。
fn content_disposition(key: &str) -> HeaderValue {
    let filename: String = key
        .rsplit('/')
        .next()
        .unwrap_or(key)
        .chars()
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

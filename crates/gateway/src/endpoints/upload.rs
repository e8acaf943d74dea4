//! # PUT /upload
//!
//! ADMINロールのみ。ボディをパック検証器に通し、キーを割り当てて保存する。
//! 検証に失敗した場合はストレージへ一切書き込まない。

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::SecondsFormat;
use http_body_util::LengthLimitError;
use packdepot_types::{
    PackMetadata, UploadResponse, HEADER_FILENAME, PACK_CONTENT_TYPE, ROLE_ADMIN,
};

use crate::auth::{authenticate, authorization_header, require_role};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::keys::{generate_object_key, DEFAULT_PACK_EXTENSION};
use crate::validator::PackValidationError;

/// PUT /upload: パックのアップロード。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<UploadResponse>), GatewayError> {
    let principal = authenticate(state.verifier.as_ref(), authorization_header(&headers))?;
    require_role(&principal, ROLE_ADMIN)?;

    // 認証後にボディを読む。上限超過のみ413、それ以外の読み取り失敗は400。
    let bytes = axum::body::to_bytes(body, state.max_upload_size)
        .await
        .map_err(|e| {
            if exceeds_length_limit(&e) {
                tracing::info!(limit = state.max_upload_size, "アップロードサイズが上限を超過");
                GatewayError::PayloadTooLarge(state.max_upload_size)
            } else {
                tracing::info!(error = %e, "ボディの読み取りに失敗");
                GatewayError::BadRequest("Failed to read request body".to_string())
            }
        })?;

    if bytes.is_empty() {
        return Err(GatewayError::BadRequest("Request body is empty".to_string()));
    }

    let pack = state
        .validator
        .validate(bytes.clone())
        .await
        .map_err(|e| match e {
            PackValidationError::Invalid(reason) => {
                tracing::info!(
                    subject = %principal.subject_id,
                    reason = %reason,
                    "アーカイブ検証に失敗"
                );
                GatewayError::InvalidPack
            }
            PackValidationError::Unavailable(reason) => GatewayError::ValidatorUnavailable(reason),
        })?;

    let now = state.clock.now();
    let uploaded = now.to_rfc3339_opts(SecondsFormat::Millis, true);

    let key = generate_object_key(
        state.blob_store.as_ref(),
        now.date_naive(),
        &pack.name,
        DEFAULT_PACK_EXTENSION,
    )
    .await?;

    let original_filename = headers
        .get(HEADER_FILENAME)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let metadata = object_metadata(
        &principal.subject_id,
        &principal.username,
        &uploaded,
        original_filename,
        &pack,
    );

    let size = bytes.len() as u64;
    state
        .blob_store
        .put(&key, bytes, PACK_CONTENT_TYPE, metadata)
        .await?;

    tracing::info!(
        subject = %principal.subject_id,
        key = %key,
        size,
        files = pack.file_count(),
        "パックを保存"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            key,
            size,
            uploaded,
            metadata: pack.into(),
        }),
    ))
}

/// ボディ読み取りエラーの原因を辿り、サイズ上限による打ち切りかを判定する。
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// 保存オブジェクトに付与するカスタムメタデータ。
fn object_metadata(
    uploader_id: &str,
    uploader_name: &str,
    uploaded: &str,
    original_filename: Option<&str>,
    pack: &PackMetadata,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("uploaded-by".to_string(), uploader_id.to_string());
    metadata.insert("uploaded-by-name".to_string(), uploader_name.to_string());
    metadata.insert("uploaded-at".to_string(), uploaded.to_string());
    metadata.insert("pack-name".to_string(), pack.name.clone());
    metadata.insert("file-count".to_string(), pack.file_count().to_string());
    if let Some(author) = &pack.author {
        metadata.insert("pack-author".to_string(), author.clone());
    }
    if let Some(filename) = original_filename {
        metadata.insert("original-filename".to_string(), filename.to_string());
    }
    metadata
}

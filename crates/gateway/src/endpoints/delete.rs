//! # DELETE /upload/{key}
//!
//! ADMINロールのみ。削除は冪等で、存在しないキーでも同じレスポンスを返す。

use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use packdepot_types::{DeleteResponse, ROLE_ADMIN};

use crate::auth::{authenticate, authorization_header, require_role};
use super::object_key;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// DELETE /upload/{key}: パックの削除。
pub async fn handle_delete(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    key: Result<Path<String>, PathRejection>,
) -> Result<Json<DeleteResponse>, GatewayError> {
    let principal = authenticate(state.verifier.as_ref(), authorization_header(&headers))?;
    require_role(&principal, ROLE_ADMIN)?;
    let key = object_key(key)?;

    state.blob_store.delete(&key).await?;
    tracing::info!(subject = %principal.subject_id, key = %key, "パックを削除");

    Ok(Json(DeleteResponse { key, deleted: true }))
}

/// DELETE /upload（キーなし）: 認証・認可後に400を返す。
pub async fn handle_delete_missing_key(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, GatewayError> {
    let principal = authenticate(state.verifier.as_ref(), authorization_header(&headers))?;
    require_role(&principal, ROLE_ADMIN)?;
    Err(GatewayError::BadRequest("Missing object key".to_string()))
}

//! # Gatewayエンドポイント

pub mod delete;
pub mod download;
pub mod upload;

pub use delete::{handle_delete, handle_delete_missing_key};
pub use download::{handle_download, handle_download_missing_key};
pub use upload::handle_upload;

use axum::extract::rejection::PathRejection;
use axum::extract::Path;

use crate::error::GatewayError;

/// 未一致ルート: 有効なルート一覧付きの404。
pub async fn handle_not_found() -> GatewayError {
    GatewayError::RouteNotFound
}

/// パスからオブジェクトキーを取り出す。
///
/// 抽出の失敗（不正なパーセントエンコーディング等）もJSONの400として返すため、
/// ハンドラは認証後にこれを呼ぶ。
pub(crate) fn object_key(
    key: Result<Path<String>, PathRejection>,
) -> Result<String, GatewayError> {
    let Path(key) = key.map_err(|rejection| {
        tracing::debug!(reason = %rejection.body_text(), "パスパラメータを解釈できません");
        GatewayError::BadRequest("Invalid object key".to_string())
    })?;

    let key = key.trim_matches('/');
    if key.is_empty() {
        return Err(GatewayError::BadRequest("Missing object key".to_string()));
    }
    Ok(key.to_string())
}

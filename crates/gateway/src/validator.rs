//! # パック検証
//!
//! アップロードされたバイト列がLayerpackアーカイブとして正しいかを判定し、
//! 名前・作者・ファイル一覧を抽出する。アーカイブ形式の解析自体は外部の
//! 検証器が担い、Gatewayはこのトレイト経由でのみ利用する。

use axum::body::Bytes;
use packdepot_types::PackMetadata;
use serde::Deserialize;

/// パック検証のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum PackValidationError {
    /// アーカイブとして不正（クライアント起因）
    #[error("invalid archive: {0}")]
    Invalid(String),
    /// 検証器そのものが利用できない（サーバー起因）
    #[error("validator unavailable: {0}")]
    Unavailable(String),
}

/// パック検証器の抽象インターフェース。
///
/// 実装は検証中に確保したリソースを戻り値を返す前に解放すること。
#[async_trait::async_trait]
pub trait PackValidator: Send + Sync {
    async fn validate(&self, bytes: Bytes) -> Result<PackMetadata, PackValidationError>;
}

/// 外部の検証サービスにHTTPで中継する検証器。
///
/// 生のバイト列を `application/octet-stream` でPOSTし、
/// `{ "name", "author", "files" }` 形式のJSONを受け取る。
/// 4xxは不正なアーカイブ、それ以外の失敗は検証器の障害として扱う。
pub struct HttpPackValidator {
    endpoint: String,
    http_client: reqwest::Client,
}

/// 検証サービスのレスポンス。
#[derive(Debug, Deserialize)]
struct ValidatorResponse {
    name: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

impl HttpPackValidator {
    pub fn new(endpoint: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http_client,
        }
    }
}

#[async_trait::async_trait]
impl PackValidator for HttpPackValidator {
    async fn validate(&self, bytes: Bytes) -> Result<PackMetadata, PackValidationError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| PackValidationError::Unavailable(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            return Err(PackValidationError::Invalid(format!("HTTP {status}: {reason}")));
        }
        if !status.is_success() {
            return Err(PackValidationError::Unavailable(format!(
                "検証サービスがエラーを返しました: HTTP {status}"
            )));
        }

        let parsed: ValidatorResponse = response.json().await.map_err(|e| {
            PackValidationError::Unavailable(format!("レスポンスのパースに失敗: {e}"))
        })?;

        Ok(PackMetadata {
            name: parsed.name,
            author: parsed.author.filter(|a| !a.trim().is_empty()),
            file_list: parsed.files,
        })
    }
}

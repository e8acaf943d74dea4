//! # Layerpack Depot 共有型定義
//!
//! Gateway・CLI間で共有するデータ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - JSONレスポンスのフィールド名は camelCase
//! - 日時は RFC 3339（UTC、ミリ秒精度）

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ロール・ヘッダー定数
// ---------------------------------------------------------------------------

/// アップロード・削除に必要な管理者ロール
pub const ROLE_ADMIN: &str = "ADMIN";

/// アップロード時に保存するパックのContent-Type
pub const PACK_CONTENT_TYPE: &str = "application/vnd.layerpack";

/// 保存オブジェクトにContent-Typeがない場合のフォールバック
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// 元ファイル名を伝えるリクエストヘッダー（アップロード時のみ、任意）
pub const HEADER_FILENAME: &str = "x-filename";

/// 信頼されたプロキシが付与するクライアントIPヘッダー
pub const HEADER_CONNECTING_IP: &str = "cf-connecting-ip";

/// 汎用のクライアントIP転送ヘッダー
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

/// レート制限ヘッダー
pub const HEADER_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATELIMIT_USED: &str = "x-ratelimit-used";

// ---------------------------------------------------------------------------
// 認証主体
// ---------------------------------------------------------------------------

/// 検証済みトークンから導出される認証主体。
///
/// リクエストごとに生成され、永続化されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// トークンの subject
    pub subject_id: String,
    /// 表示名
    pub username: String,
    /// 付与されたロール
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// ロールの完全一致による所属判定。
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

// ---------------------------------------------------------------------------
// パックメタデータ
// ---------------------------------------------------------------------------

/// アーカイブ検証器が抽出するパックの記述メタデータ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMetadata {
    /// パックの宣言名
    pub name: String,
    /// 作者（宣言されていない場合はNone）
    pub author: Option<String>,
    /// アーカイブ内のファイル一覧
    pub file_list: Vec<String>,
}

impl PackMetadata {
    pub fn file_count(&self) -> usize {
        self.file_list.len()
    }
}

// ---------------------------------------------------------------------------
// PUT /upload
// ---------------------------------------------------------------------------

/// PUT /upload レスポンス（201）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// 割り当てられたオブジェクトキー
    pub key: String,
    /// 保存したバイト数
    pub size: u64,
    /// アップロード日時（RFC 3339）
    pub uploaded: String,
    /// 抽出済みメタデータ
    pub metadata: UploadedPackInfo,
}

/// アップロードレスポンスに含めるパック情報。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPackInfo {
    pub name: String,
    pub author: Option<String>,
    pub file_count: usize,
    pub files: Vec<String>,
}

impl From<PackMetadata> for UploadedPackInfo {
    fn from(meta: PackMetadata) -> Self {
        Self {
            file_count: meta.file_count(),
            name: meta.name,
            author: meta.author,
            files: meta.file_list,
        }
    }
}

// ---------------------------------------------------------------------------
// DELETE /upload/{key}
// ---------------------------------------------------------------------------

/// DELETE /upload/{key} レスポンス。
/// 存在しないキーの削除でも同じ形を返す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub key: String,
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// エラーボディ
// ---------------------------------------------------------------------------

/// 全エラーレスポンスの共通部分。追加フィールドはフラットに並ぶ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

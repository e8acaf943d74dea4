//! # Blob Storage
//!
//! パックを保存するオブジェクトストレージの抽象インターフェース。
//! S3互換ストレージ実装は `s3` サブモジュール、開発・テスト用の
//! プロセス内実装は `memory` サブモジュールを参照。

pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use memory::MemoryBlobStore;
#[cfg(feature = "vendor-aws")]
pub use s3::S3BlobStore;

use std::collections::HashMap;

use axum::body::Bytes;

/// ストレージ操作のエラー型。
/// Blob StoreとCounter Storeで共通。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// バックエンドとの通信・操作に失敗
    #[error("storage backend error: {0}")]
    Backend(String),
    /// 保存済みデータを解釈できない
    #[error("corrupt stored value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// 取得したオブジェクト。
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    /// 保存時のContent-Type
    pub content_type: Option<String>,
    /// カスタムメタデータ
    pub metadata: HashMap<String, String>,
}

/// 一覧取得の1ページ分。
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// 続きがある場合の継続トークン。Noneなら最終ページ。
    pub cursor: Option<String>,
}

/// Blob Storeの抽象インターフェース。
///
/// S3互換ストレージ（MinIO, AWS S3, Cloudflare R2等）や
/// その他のストレージバックエンドを実装として選択できる。
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// オブジェクトを書き込む。同一キーは上書きされる。
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError>;

    /// オブジェクトを取得する。存在しなければNone。
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError>;

    /// オブジェクトを削除する。存在しないキーの削除は成功扱い。
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// `prefix` 配下のキーを1ページ分列挙する。
    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<String>,
    ) -> Result<ListPage, StorageError>;
}

//! # S3互換 Counter Store 実装
//!
//! カウンタ値を `counters/` 配下の小さなテキストオブジェクトとして保持する。
//! 更新は読み取り→書き込みで、原子的ではない。
//! 期限切れはバケットのライフサイクルルール（`counters/` 接頭辞）に委ねる。

use std::time::Duration;

use s3::error::S3Error;

use super::CounterStore;
use crate::storage::s3::bucket_from_env;
use crate::storage::StorageError;

/// カウンタオブジェクトのキー接頭辞
const COUNTER_PREFIX: &str = "counters/";

/// S3互換バケットによるCounter Store実装。
pub struct S3CounterStore {
    bucket: s3::Bucket,
}

impl S3CounterStore {
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// 環境変数から構築する。`S3_COUNTER_BUCKET` 未設定時はパック用バケットと共用。
    pub fn from_env() -> anyhow::Result<Self> {
        let default_bucket =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "layerpacks".to_string());
        Ok(Self::new(bucket_from_env("S3_COUNTER_BUCKET", &default_bucket)?))
    }

    fn object_key(key: &str) -> String {
        format!("{COUNTER_PREFIX}{key}")
    }
}

#[async_trait::async_trait]
impl CounterStore for S3CounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let path = Self::object_key(key);
        let response = match self.bucket.get_object(&path).await {
            Ok(response) if response.status_code() == 404 => return Ok(None),
            Ok(response) => response,
            Err(S3Error::HttpFailWithBody(404, _)) => return Ok(None),
            Err(e) => return Err(StorageError::Backend(format!("GET {path}: {e}"))),
        };

        if !(200..300).contains(&response.status_code()) {
            return Err(StorageError::Backend(format!(
                "GET {path}: HTTP {}",
                response.status_code()
            )));
        }

        let text = String::from_utf8_lossy(response.as_slice());
        text.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: path,
                reason: e.to_string(),
            })
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StorageError> {
        let next = self.get(key).await?.unwrap_or(0) + 1;
        let path = Self::object_key(key);

        tracing::debug!(
            key = %path,
            ttl_secs = ttl.as_secs(),
            "S3カウンタのTTLはライフサイクルルールに委譲"
        );

        let response = self
            .bucket
            .put_object_with_content_type(&path, next.to_string().as_bytes(), "text/plain")
            .await
            .map_err(|e| StorageError::Backend(format!("PUT {path}: {e}")))?;

        if !(200..300).contains(&response.status_code()) {
            return Err(StorageError::Backend(format!(
                "PUT {path}: HTTP {}",
                response.status_code()
            )));
        }
        Ok(next)
    }
}

//! # S3互換 Blob Store 実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用するBlob Store実装。
//! カスタムメタデータは `x-amz-meta-*` ヘッダーとして保存する。

use std::collections::HashMap;

use axum::body::Bytes;
use s3::error::S3Error;

use super::{BlobStore, ListPage, StorageError, StoredObject};

/// S3ユーザーメタデータのヘッダー接頭辞
const META_PREFIX: &str = "x-amz-meta-";

/// S3互換ストレージによるBlob Store実装。
pub struct S3BlobStore {
    bucket: s3::Bucket,
}

impl S3BlobStore {
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(bucket_from_env("S3_BUCKET", "layerpacks")?))
    }
}

/// 既定のリージョン。AWS以外のエンドポイント（MinIO, R2）ではこれで十分。
const FALLBACK_REGION: &str = "us-east-1";

/// S3互換バケットへの接続情報。
pub(crate) struct BucketSettings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

impl BucketSettings {
    /// 共通のS3接続情報と、指定した環境変数のバケット名から組み立てる。
    ///
    /// `S3_REGION` 未設定時は `s3.<region>.amazonaws.com` 形式のエンドポイントから推定する。
    pub fn from_env(bucket_var: &str, default_bucket: &str) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let endpoint = var("S3_ENDPOINT").unwrap_or_else(|| "http://localhost:9000".to_string());
        let region = var("S3_REGION").unwrap_or_else(|| region_for_endpoint(&endpoint));

        Self {
            region,
            access_key: var("S3_ACCESS_KEY").unwrap_or_else(|| "minioadmin".to_string()),
            secret_key: var("S3_SECRET_KEY").unwrap_or_else(|| "minioadmin".to_string()),
            bucket: var(bucket_var).unwrap_or_else(|| default_bucket.to_string()),
            endpoint,
        }
    }

    /// パススタイルでアクセスするバケットハンドルを生成する。
    pub fn open(&self) -> anyhow::Result<s3::Bucket> {
        tracing::info!(
            s3_endpoint = %self.endpoint,
            region = %self.region,
            bucket = %self.bucket,
            "S3互換バケットを設定"
        );
        let region = s3::Region::Custom {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        };
        let credentials = s3::creds::Credentials::new(
            Some(&self.access_key),
            Some(&self.secret_key),
            None,
            None,
            None,
        )?;
        let bucket = s3::Bucket::new(&self.bucket, region, credentials)?.with_path_style();
        Ok(*bucket)
    }
}

/// AWSのエンドポイントホスト名からリージョンを取り出す。
fn region_for_endpoint(endpoint: &str) -> String {
    let host = endpoint
        .split("://")
        .last()
        .unwrap_or(endpoint)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();

    host.strip_suffix(".amazonaws.com")
        .and_then(|rest| rest.strip_prefix("s3."))
        .filter(|region| !region.is_empty() && !region.contains('.'))
        .unwrap_or(FALLBACK_REGION)
        .to_string()
}

/// 共通のS3接続情報とバケット名の環境変数からバケットを初期化する。
pub(crate) fn bucket_from_env(bucket_var: &str, default_bucket: &str) -> anyhow::Result<s3::Bucket> {
    BucketSettings::from_env(bucket_var, default_bucket).open()
}

/// S3のユーザーメタデータはUS-ASCIIのみ許容されるため、
/// それ以外のバイトと `%` をパーセントエンコードする。
fn encode_meta_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if (byte.is_ascii_graphic() || byte == b' ') && byte != b'%' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn decode_meta_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// S3の失敗を StorageError に変換する。
fn backend(op: &str, key: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("{op} {key}: {e}"))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let mut bucket = self.bucket.clone();
        for (name, value) in &metadata {
            bucket.add_header(&format!("{META_PREFIX}{name}"), &encode_meta_value(value));
        }

        let response = bucket
            .put_object_with_content_type(key, &body, content_type)
            .await
            .map_err(|e| backend("PUT", key, e))?;

        if !is_success(response.status_code()) {
            return Err(backend("PUT", key, format!("HTTP {}", response.status_code())));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let response = match self.bucket.get_object(key).await {
            Ok(response) => response,
            Err(S3Error::HttpFailWithBody(404, _)) => return Ok(None),
            Err(e) => return Err(backend("GET", key, e)),
        };

        match response.status_code() {
            404 => return Ok(None),
            status if !is_success(status) => {
                return Err(backend("GET", key, format!("HTTP {status}")));
            }
            _ => {}
        }

        let headers = response.headers();
        let content_type = headers.get("content-type").cloned();
        let metadata = headers
            .iter()
            .filter_map(|(name, value)| {
                name.to_ascii_lowercase()
                    .strip_prefix(META_PREFIX)
                    .map(|meta| (meta.to_string(), decode_meta_value(value)))
            })
            .collect();

        Ok(Some(StoredObject {
            body: Bytes::from(response.bytes().to_vec()),
            content_type,
            metadata,
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.bucket.delete_object(key).await {
            Ok(response) if is_success(response.status_code()) || response.status_code() == 404 => {
                Ok(())
            }
            Ok(response) => Err(backend("DELETE", key, format!("HTTP {}", response.status_code()))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(backend("DELETE", key, e)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let (result, status) = self
            .bucket
            .list_page(prefix.to_string(), None, cursor, None, None)
            .await
            .map_err(|e| backend("LIST", prefix, e))?;

        if !is_success(status) {
            return Err(backend("LIST", prefix, format!("HTTP {status}")));
        }

        let keys = result.contents.into_iter().map(|object| object.key).collect();
        let cursor = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };
        Ok(ListPage { keys, cursor })
    }
}

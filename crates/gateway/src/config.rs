//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 共有状態はリクエストを跨ぐキャッシュを持たず、永続化は全て外部ストアに委ねる。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use packdepot_crypto::TokenVerifier;

use crate::counter::CounterStore;
use crate::storage::BlobStore;
use crate::validator::PackValidator;

/// 1日あたりのダウンロード上限の既定値
pub const DEFAULT_MAX_DOWNLOADS_PER_DAY: u64 = 100;

/// アップロード最大サイズの既定値（100 MiB）
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// 既定の待ち受けアドレス
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// CORSの既定許可オリジン
pub const DEFAULT_ALLOWED_ORIGIN: &str = "*";

/// 時刻の取得元。日付境界をテストで固定できるように抽象化する。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// システム時計。
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定時刻を返す時計。
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// ストアのバックエンド選択。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// プロセス内（開発用）
    Memory,
    /// S3互換ストレージ
    S3,
}

impl Backend {
    fn parse(var: &str, raw: Option<&str>) -> anyhow::Result<Self> {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") => Ok(Self::default_for(var)),
            Some("memory") => Ok(Self::Memory),
            Some("s3") => Ok(Self::S3),
            Some(other) => Err(anyhow::anyhow!("{var}の値が不正です: {other}（memory|s3）")),
        }
    }

    fn default_for(var: &str) -> Self {
        if var == "STORAGE_BACKEND" && cfg!(feature = "vendor-aws") {
            Self::S3
        } else {
            Self::Memory
        }
    }
}

/// 環境変数から読み込む設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けアドレス（BIND_ADDR）
    pub bind_addr: String,
    /// トークン検証用の共有シークレット（JWT_SECRET）
    pub jwt_secret: String,
    /// 1日あたりのダウンロード上限（MAX_DOWNLOADS_PER_DAY）
    pub max_downloads_per_day: u64,
    /// CORS許可オリジン（ALLOWED_ORIGIN）
    pub allowed_origin: String,
    /// アップロード最大サイズ（MAX_UPLOAD_SIZE）
    pub max_upload_size: usize,
    /// パック検証サービスのURL（PACK_VALIDATOR_URL）
    pub pack_validator_url: String,
    /// Blob Store（STORAGE_BACKEND）
    pub storage_backend: Backend,
    /// Counter Store（COUNTER_BACKEND）
    pub counter_backend: Backend,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str| std::env::var(name).ok();

        let jwt_secret = var("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRETが設定されていません"))?;
        let pack_validator_url = var("PACK_VALIDATOR_URL")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("PACK_VALIDATOR_URLが設定されていません"))?;

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret,
            max_downloads_per_day: parse_max_downloads(var("MAX_DOWNLOADS_PER_DAY").as_deref()),
            allowed_origin: parse_allowed_origin(var("ALLOWED_ORIGIN").as_deref()),
            max_upload_size: parse_max_upload_size(var("MAX_UPLOAD_SIZE").as_deref()),
            pack_validator_url,
            storage_backend: Backend::parse(
                "STORAGE_BACKEND",
                var("STORAGE_BACKEND").as_deref(),
            )?,
            counter_backend: Backend::parse(
                "COUNTER_BACKEND",
                var("COUNTER_BACKEND").as_deref(),
            )?,
        })
    }
}

/// 上限値を解釈する。未設定・解釈不能なら既定値。
pub fn parse_max_downloads(raw: Option<&str>) -> u64 {
    match raw.map(str::trim) {
        None | Some("") => DEFAULT_MAX_DOWNLOADS_PER_DAY,
        Some(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!(
                value,
                default = DEFAULT_MAX_DOWNLOADS_PER_DAY,
                "MAX_DOWNLOADS_PER_DAYを解釈できないため既定値を使用"
            );
            DEFAULT_MAX_DOWNLOADS_PER_DAY
        }),
    }
}

fn parse_max_upload_size(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|size| *size > 0)
        .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE)
}

fn parse_allowed_origin(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ALLOWED_ORIGIN)
        .to_string()
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// トークン検証器
    pub verifier: Box<dyn TokenVerifier>,
    /// パックを保存するBlob Store
    pub blob_store: Arc<dyn BlobStore>,
    /// レート制限カウンタ
    pub counter_store: Arc<dyn CounterStore>,
    /// パック検証器
    pub validator: Box<dyn PackValidator>,
    /// 日付境界の判定に使う時計
    pub clock: Box<dyn Clock>,
    /// 1日あたりのダウンロード上限
    pub max_downloads_per_day: u64,
    /// CORS許可オリジン
    pub allowed_origin: String,
    /// アップロード最大サイズ（バイト）
    pub max_upload_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_downloads() {
        assert_eq!(parse_max_downloads(None), DEFAULT_MAX_DOWNLOADS_PER_DAY);
        assert_eq!(parse_max_downloads(Some("")), DEFAULT_MAX_DOWNLOADS_PER_DAY);
        assert_eq!(parse_max_downloads(Some("abc")), DEFAULT_MAX_DOWNLOADS_PER_DAY);
        assert_eq!(parse_max_downloads(Some("-3")), DEFAULT_MAX_DOWNLOADS_PER_DAY);
        assert_eq!(parse_max_downloads(Some(" 25 ")), 25);
        assert_eq!(parse_max_downloads(Some("0")), 0);
    }

    #[test]
    fn test_parse_allowed_origin() {
        assert_eq!(parse_allowed_origin(None), "*");
        assert_eq!(parse_allowed_origin(Some("  ")), "*");
        assert_eq!(
            parse_allowed_origin(Some("https://packs.example.com")),
            "https://packs.example.com"
        );
    }

    #[test]
    fn test_parse_max_upload_size() {
        assert_eq!(parse_max_upload_size(None), DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(parse_max_upload_size(Some("0")), DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(parse_max_upload_size(Some("1024")), 1024);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(
            Backend::parse("COUNTER_BACKEND", None).unwrap(),
            Backend::Memory
        );
        assert_eq!(
            Backend::parse("COUNTER_BACKEND", Some("S3")).unwrap(),
            Backend::S3
        );
        assert!(Backend::parse("COUNTER_BACKEND", Some("redis")).is_err());
    }
}

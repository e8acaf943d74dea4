//! # Layerpack Depot Gateway
//!
//! パック配布用バケットの前段に立つエッジゲートウェイ。
//!
//! ## 役割
//! - Bearerトークンによるクライアント認証
//! - ADMINロールによるアップロード・削除の認可
//! - (ユーザー, IP) 単位の1日あたりダウンロード回数制限
//! - アップロード時のアーカイブ検証と日付パーティションキーの割り当て
//!
//! ## API エンドポイント
//! - `GET /download/{key}`: パックのダウンロード
//! - `PUT /upload`: パックのアップロード（ADMIN）
//! - `DELETE /upload/{key}`: パックの削除（ADMIN）
//! - `OPTIONS *`: CORSプリフライト

mod auth;
mod config;
mod counter;
mod endpoints;
mod error;
mod keys;
mod ratelimit;
mod router;
mod storage;
mod validator;

use std::sync::Arc;

use packdepot_crypto::Hs256Verifier;
use tracing_subscriber::EnvFilter;

use crate::config::{Backend, GatewayConfig, GatewayState, SystemClock};
use crate::counter::{CounterStore, MemoryCounterStore};
use crate::storage::{BlobStore, MemoryBlobStore};
use crate::validator::HttpPackValidator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    let blob_store = build_blob_store(config.storage_backend)?;
    let counter_store = build_counter_store(config.counter_backend)?;

    tracing::info!(
        max_downloads_per_day = config.max_downloads_per_day,
        max_upload_size = config.max_upload_size,
        allowed_origin = %config.allowed_origin,
        validator = %config.pack_validator_url,
        "Gateway設定を読み込みました"
    );

    let state = Arc::new(GatewayState {
        verifier: Box::new(Hs256Verifier::new(config.jwt_secret.as_bytes())),
        blob_store,
        counter_store,
        validator: Box::new(HttpPackValidator::new(
            config.pack_validator_url.clone(),
            reqwest::Client::new(),
        )),
        clock: Box::new(SystemClock),
        max_downloads_per_day: config.max_downloads_per_day,
        allowed_origin: config.allowed_origin.clone(),
        max_upload_size: config.max_upload_size,
    });

    let app = router::build_router(state);

    tracing::info!("Gatewayを {} で起動します", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_blob_store(backend: Backend) -> anyhow::Result<Arc<dyn BlobStore>> {
    match backend {
        Backend::Memory => {
            tracing::warn!("プロセス内Blob Storeを使用します。再起動でパックは失われます（開発環境用）");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
        #[cfg(feature = "vendor-aws")]
        Backend::S3 => Ok(Arc::new(storage::S3BlobStore::from_env()?)),
        #[cfg(not(feature = "vendor-aws"))]
        Backend::S3 => Err(anyhow::anyhow!(
            "STORAGE_BACKEND=s3 には vendor-aws フィーチャーが必要です"
        )),
    }
}

fn build_counter_store(backend: Backend) -> anyhow::Result<Arc<dyn CounterStore>> {
    match backend {
        Backend::Memory => {
            tracing::warn!("プロセス内Counter Storeを使用します。カウンタはインスタンス間で共有されません");
            Ok(Arc::new(MemoryCounterStore::new()))
        }
        #[cfg(feature = "vendor-aws")]
        Backend::S3 => Ok(Arc::new(counter::S3CounterStore::from_env()?)),
        #[cfg(not(feature = "vendor-aws"))]
        Backend::S3 => Err(anyhow::anyhow!(
            "COUNTER_BACKEND=s3 には vendor-aws フィーチャーが必要です"
        )),
    }
}

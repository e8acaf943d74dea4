//! # Counter Store
//!
//! レート制限のカウンタを保持するキー・値ストアの抽象インターフェース。
//! プロセス内実装は `memory`、S3互換バケットを使う実装は `s3` を参照。

pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use memory::MemoryCounterStore;
#[cfg(feature = "vendor-aws")]
pub use s3::S3CounterStore;

use std::time::Duration;

use crate::storage::StorageError;

/// Counter Storeの抽象インターフェース。
///
/// 分散ロックは提供しない。read-your-writes整合性を前提とする。
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    /// 現在値を返す。レコードがなければNone。
    async fn get(&self, key: &str) -> Result<Option<u64>, StorageError>;

    /// 値を1増やし、増加後の値を返す。
    /// `ttl` は期限切れに対応するストアでのみ使われる。
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StorageError>;
}

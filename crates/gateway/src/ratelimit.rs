//! # ダウンロードレート制限
//!
//! (主体ID, クライアントIP) ごとの1日あたりダウンロード数を Counter Store で管理する。
//!
//! - キーにUTC日付を含めるため、日付が変わると自動的に新しいバケットになる
//! - 判定（`check_rate_limit`）は読み取りのみで状態を変更しない
//! - 加算（`increment_download_count`）はダウンロード成功後に1回だけ呼ぶ

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use chrono::NaiveDate;
use packdepot_types::{
    HEADER_CONNECTING_IP, HEADER_FORWARDED_FOR, HEADER_RATELIMIT_LIMIT,
    HEADER_RATELIMIT_REMAINING, HEADER_RATELIMIT_USED,
};

use crate::counter::CounterStore;
use crate::storage::StorageError;

/// クライアントIPを特定できない場合の共有バケット
pub const UNKNOWN_CLIENT_IP: &str = "0.0.0.0";

/// カウンタの保持期間。日付がキーに含まれるため、これは掃除用の余裕を持った値。
pub const COUNTER_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// レート制限の判定結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// 今回のダウンロードを許可するか
    pub allowed: bool,
    /// 1日あたりの上限
    pub limit: u64,
    /// 本日の使用済み回数
    pub current: u64,
}

impl RateLimitStatus {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current)
    }
}

/// 当日のカウンタキー。
pub fn rate_limit_key(date: NaiveDate, user_id: &str, client_ip: &str) -> String {
    format!("ratelimit:{}:{user_id}:{client_ip}", date.format("%Y-%m-%d"))
}

/// クライアントIPを解決する。
///
/// 信頼プロキシのヘッダー → `X-Forwarded-For` の先頭 → `0.0.0.0` の順。
pub fn resolve_client_ip(headers: &HeaderMap) -> String {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_str(HEADER_CONNECTING_IP) {
        return ip.to_string();
    }

    if let Some(ip) = header_str(HEADER_FORWARDED_FOR)
        .and_then(|list| list.split(',').map(str::trim).find(|entry| !entry.is_empty()))
    {
        return ip.to_string();
    }

    tracing::debug!("クライアントIPヘッダーがないため共有バケットを使用");
    UNKNOWN_CLIENT_IP.to_string()
}

/// 本日の使用状況を読み取り、上限未満かを判定する。状態は変更しない。
pub async fn check_rate_limit(
    store: &dyn CounterStore,
    today: NaiveDate,
    user_id: &str,
    client_ip: &str,
    max_per_day: u64,
) -> Result<RateLimitStatus, StorageError> {
    let key = rate_limit_key(today, user_id, client_ip);
    let current = store.get(&key).await?.unwrap_or(0);

    Ok(RateLimitStatus {
        allowed: current < max_per_day,
        limit: max_per_day,
        current,
    })
}

/// 本日のダウンロード数を1増やし、増加後の値を返す。
pub async fn increment_download_count(
    store: &dyn CounterStore,
    today: NaiveDate,
    user_id: &str,
    client_ip: &str,
) -> Result<u64, StorageError> {
    let key = rate_limit_key(today, user_id, client_ip);
    store.increment(&key, COUNTER_TTL).await
}

/// `X-RateLimit-*` ヘッダーを付与する。
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    headers.insert(HEADER_RATELIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(HEADER_RATELIMIT_REMAINING, HeaderValue::from(status.remaining()));
    headers.insert(HEADER_RATELIMIT_USED, HeaderValue::from(status.current));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemoryCounterStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_key_contains_utc_date() {
        assert_eq!(
            rate_limit_key(date(2024, 3, 5), "user-1", "203.0.113.7"),
            "ratelimit:2024-03-05:user-1:203.0.113.7"
        );
    }

    /// 接続IPヘッダー → X-Forwarded-For先頭 → 0.0.0.0 の順で解決されることを確認
    #[test]
    fn test_resolve_client_ip_chain() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers), UNKNOWN_CLIENT_IP);

        headers.insert(
            HEADER_FORWARDED_FOR,
            HeaderValue::from_static(" , 198.51.100.1, 10.0.0.1"),
        );
        assert_eq!(resolve_client_ip(&headers), "198.51.100.1");

        headers.insert(HEADER_CONNECTING_IP, HeaderValue::from_static("203.0.113.9"));
        assert_eq!(resolve_client_ip(&headers), "203.0.113.9");
    }

    /// N回目までは許可、N+1回目で拒否されることを確認
    #[tokio::test]
    async fn test_limit_reached_after_n_downloads() {
        let store = MemoryCounterStore::new();
        let today = date(2024, 3, 5);
        let max = 3;

        for expected in 1..=max {
            let status = check_rate_limit(&store, today, "u", "1.1.1.1", max).await.unwrap();
            assert!(status.allowed);
            assert_eq!(status.current, expected - 1);
            let count = increment_download_count(&store, today, "u", "1.1.1.1").await.unwrap();
            assert_eq!(count, expected);
        }

        let status = check_rate_limit(&store, today, "u", "1.1.1.1", max).await.unwrap();
        assert!(!status.allowed);
        assert_eq!(status.current, max);
        assert_eq!(status.remaining(), 0);
    }

    /// 判定は読み取りのみでカウンタを変更しないことを確認
    #[tokio::test]
    async fn test_check_does_not_mutate() {
        let store = MemoryCounterStore::new();
        let today = date(2024, 3, 5);
        for _ in 0..5 {
            check_rate_limit(&store, today, "u", "ip", 1).await.unwrap();
        }
        let key = rate_limit_key(today, "u", "ip");
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    /// 翌日（UTC）は別バケットになり、IPや主体が違えば独立することを確認
    #[tokio::test]
    async fn test_buckets_are_independent() {
        let store = MemoryCounterStore::new();
        let day1 = date(2024, 3, 5);
        let day2 = date(2024, 3, 6);

        increment_download_count(&store, day1, "u", "ip").await.unwrap();
        let status = check_rate_limit(&store, day1, "u", "ip", 1).await.unwrap();
        assert!(!status.allowed);

        let next_day = check_rate_limit(&store, day2, "u", "ip", 1).await.unwrap();
        assert!(next_day.allowed);
        assert_eq!(next_day.current, 0);

        let other_ip = check_rate_limit(&store, day1, "u", "ip2", 1).await.unwrap();
        assert!(other_ip.allowed);
        let other_user = check_rate_limit(&store, day1, "v", "ip", 1).await.unwrap();
        assert!(other_user.allowed);
    }

    #[test]
    fn test_headers_rendered() {
        let mut headers = HeaderMap::new();
        let status = RateLimitStatus {
            allowed: true,
            limit: 10,
            current: 4,
        };
        apply_rate_limit_headers(&mut headers, &status);
        assert_eq!(headers[HEADER_RATELIMIT_LIMIT], "10");
        assert_eq!(headers[HEADER_RATELIMIT_REMAINING], "6");
        assert_eq!(headers[HEADER_RATELIMIT_USED], "4");
    }
}

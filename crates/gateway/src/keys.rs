//! # オブジェクトキー割り当て
//!
//! 新規アップロードのキーを `YYYY/MM/DD/{連番}_{正規化名}{拡張子}` の形で割り当てる。
//! 連番は当日の接頭辞配下の既存オブジェクト数 + 1。
//!
//! 一覧→書き込みは原子的ではないため、同時アップロードが同じ連番を得ると
//! 後勝ちで上書きされる。

use chrono::NaiveDate;

use crate::storage::{BlobStore, StorageError};

/// パックの既定拡張子
pub const DEFAULT_PACK_EXTENSION: &str = ".lpack";

/// 正規化の結果が空になった場合の名前
const UNNAMED: &str = "unnamed";

/// UTC日付の接頭辞 `YYYY/MM/DD/`。
pub fn date_prefix(date: NaiveDate) -> String {
    date.format("%Y/%m/%d/").to_string()
}

/// パック名をキー用に正規化する。
///
/// 前後の空白を除いて小文字化し、英数字以外の連続を1つの `_` にまとめ、
/// 先頭・末尾の `_` を除く。空になれば `unnamed`。
pub fn sanitize_pack_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !sanitized.is_empty() {
                sanitized.push('_');
            }
            pending_separator = false;
            sanitized.push(c);
        } else {
            pending_separator = true;
        }
    }

    if sanitized.is_empty() {
        UNNAMED.to_string()
    } else {
        sanitized
    }
}

/// 拡張子を `.` 始まりに揃える。空なら既定拡張子。
pub fn normalize_extension(extension: &str) -> String {
    match extension.trim() {
        "" => DEFAULT_PACK_EXTENSION.to_string(),
        ext if ext.starts_with('.') => ext.to_string(),
        ext => format!(".{ext}"),
    }
}

/// 接頭辞配下のオブジェクト数を、継続トークンがなくなるまでページを辿って数える。
pub async fn count_objects(store: &dyn BlobStore, prefix: &str) -> Result<u64, StorageError> {
    let mut count = 0u64;
    let mut cursor = None;

    loop {
        let page = store.list_page(prefix, cursor).await?;
        count += page.keys.len() as u64;
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(count)
}

/// 当日の接頭辞で衝突しないキーを割り当てる。
pub async fn generate_object_key(
    store: &dyn BlobStore,
    today: NaiveDate,
    pack_name: &str,
    extension: &str,
) -> Result<String, StorageError> {
    let prefix = date_prefix(today);
    let sequence = count_objects(store, &prefix).await? + 1;

    Ok(format!(
        "{prefix}{sequence}_{}{}",
        sanitize_pack_name(pack_name),
        normalize_extension(extension)
    ))
}

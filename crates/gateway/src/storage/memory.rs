//! # プロセス内 Blob Store
//!
//! 開発・テスト用。プロセスを跨いで共有されないため、
//! 複数インスタンス構成ではS3互換ストレージを使用すること。

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use axum::body::Bytes;
use tokio::sync::RwLock;

use super::{BlobStore, ListPage, StorageError, StoredObject};

/// S3のListObjectsV2と同じ既定ページサイズ
const DEFAULT_PAGE_SIZE: usize = 1000;

/// キー順に保持するプロセス内Blob Store。
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// 一覧のページサイズを指定して構築する（ページング検証用）。
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let object = StoredObject {
            body,
            content_type: Some(content_type.to_string()),
            metadata,
        };
        self.objects.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let objects = self.objects.read().await;

        // 継続トークンは直前ページの最終キー
        let start = match cursor {
            Some(last) => Bound::Excluded(last),
            None => Bound::Included(prefix.to_string()),
        };

        let mut keys: Vec<String> = objects
            .range::<String, _>((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let cursor = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage { keys, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put_empty(store: &MemoryBlobStore, key: &str) {
        store
            .put(key, Bytes::from_static(b"x"), "text/plain", HashMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBlobStore::new();
        let mut metadata = HashMap::new();
        metadata.insert("pack-name".to_string(), "Test".to_string());

        store
            .put("a/b", Bytes::from_static(b"hello"), "text/plain", metadata)
            .await
            .unwrap();

        let object = store.get("a/b").await.unwrap().unwrap();
        assert_eq!(&object.body[..], b"hello");
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(object.metadata["pack-name"], "Test");

        store.delete("a/b").await.unwrap();
        assert!(store.get("a/b").await.unwrap().is_none());

        // 存在しないキーの削除も成功する
        store.delete("a/b").await.unwrap();
    }

    /// 接頭辞外のキーを含めず、ページを跨いで全キーを列挙できることを確認
    #[tokio::test]
    async fn test_list_pages_within_prefix() {
        let store = MemoryBlobStore::with_page_size(2);
        for key in [
            "2024/03/04/1_x.lpack",
            "2024/03/05/1_a.lpack",
            "2024/03/05/2_b.lpack",
            "2024/03/05/3_c.lpack",
            "2024/03/06/1_y.lpack",
        ] {
            put_empty(&store, key).await;
        }

        let first = store.list_page("2024/03/05/", None).await.unwrap();
        assert_eq!(first.keys.len(), 2);
        assert!(first.cursor.is_some());

        let second = store.list_page("2024/03/05/", first.cursor).await.unwrap();
        assert_eq!(second.keys, vec!["2024/03/05/3_c.lpack".to_string()]);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_empty_prefix_page() {
        let store = MemoryBlobStore::new();
        put_empty(&store, "2024/03/04/1_x.lpack").await;

        let page = store.list_page("2024/03/05/", None).await.unwrap();
        assert!(page.keys.is_empty());
        assert!(page.cursor.is_none());
    }
}

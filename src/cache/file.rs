use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use super::FrequencyCache;
use crate::client::FileService;
use crate::error::Result;
use crate::types::{FileContent, FileRef};

/// File service fronted by a [`FrequencyCache`] keyed by storage key.
///
/// Content reads are cached; deletes and uploads invalidate the affected key
/// so a later read never returns stale bytes.
pub struct FileCache {
    service: Arc<dyn FileService>,
    cache: FrequencyCache<String, FileContent>,
}

impl fmt::Debug for FileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// Creates a cache of at most `max_size` files.
    pub fn new(service: Arc<dyn FileService>, max_size: usize) -> Self {
        Self {
            service,
            cache: FrequencyCache::new(max_size),
        }
    }

    /// Content of `key`, fetched on miss.
    pub async fn content(&self, key: &str) -> Result<FileContent> {
        let service = &self.service;
        self.cache
            .get_or_fetch(key.to_string(), || service.content(key))
            .await
    }

    /// Lists files; not cached.
    pub async fn list(&self) -> Result<Vec<FileRef>> {
        self.service.list().await
    }

    /// Uploads a file and drops any stale cached content for its key.
    pub async fn upload(
        &self,
        project_id: i64,
        node_id: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<FileRef> {
        let file = self
            .service
            .upload(project_id, node_id, filename, content)
            .await?;
        self.cache.remove(&file.key);
        Ok(file)
    }

    /// Deletes a file and its cached content.
    ///
    /// The entry is removed only after the service acknowledged the delete.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.service.delete(key).await?;
        self.cache.remove(&key.to_string());
        Ok(())
    }

    /// The underlying cache.
    pub fn cache(&self) -> &FrequencyCache<String, FileContent> {
        &self.cache
    }
}

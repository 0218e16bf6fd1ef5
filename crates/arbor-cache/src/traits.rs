//! Cache backend trait

use arbor_common::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Key to byte-string cache shared between service instances.
///
/// Backends apply their configured namespace prefix and eviction window
/// themselves; callers pass bare keys. Every call may fail independently and
/// callers are expected to treat the cache as best-effort.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Fetch the value stored at `key`, `None` when absent or expired
    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` at `key`, restarting its eviction window
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}


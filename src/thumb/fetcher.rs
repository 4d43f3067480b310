use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use xxhash_rust::xxh3::xxh3_64;

use crate::backend::AssetStore;
use crate::stats::SyncStats;

/// 缩略图资产 key。投递按它匹配节点，不按请求先后——两次刷新之间
/// 节点可能已被 reconcile 换掉。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThumbKey {
    pub source_type: String,
    pub source_id: i64,
    pub field: String,
}

impl ThumbKey {
    pub fn new(source_type: impl Into<String>, source_id: i64, field: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            source_id,
            field: field.into(),
        }
    }

    fn cache_file_name(&self) -> String {
        let tag = format!("{}:{}:{}", self.source_type, self.source_id, self.field);
        format!("{:016x}.thumb", xxh3_64(tag.as_bytes()))
    }
}

/// 解码后的缩略图（RGBA8）。
#[derive(Clone, PartialEq)]
pub struct ThumbImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<Vec<u8>>,
}

impl std::fmt::Debug for ThumbImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThumbImage({}x{})", self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ThumbError {
    #[error("asset unavailable: {0}")]
    Unavailable(String),
    #[error("image decode failed: {0}")]
    Decode(String),
}

/// 异步缩略图取数器。
///
/// - 同 key 在途去重：第二次 request 只是搭车，不发起第二次取数；
///   向多个关注节点的扇出由模型按 key 匹配完成。
/// - 失败按 key 永久记账，不自动重试（消费层自己决定放占位图）。
/// - 解析顺序：磁盘缓存 → 远端取数（成功后原子回写缓存）→ RGBA8 解码。
pub struct ThumbnailFetcher {
    store: Arc<dyn AssetStore>,
    cache_dir: PathBuf,
    in_flight: Arc<DashMap<ThumbKey, ()>>,
    failed: Arc<DashMap<ThumbKey, ()>>,
    stats: Arc<SyncStats>,
}

impl ThumbnailFetcher {
    pub fn new(store: Arc<dyn AssetStore>, cache_dir: PathBuf, stats: Arc<SyncStats>) -> Self {
        Self {
            store,
            cache_dir,
            in_flight: Arc::new(DashMap::new()),
            failed: Arc::new(DashMap::new()),
            stats,
        }
    }

    /// 幂等请求。完成时在工作线程上调用 deliver（最多一次；搭车请求的
    /// deliver 被丢弃，结果统一经由首个请求送达）。
    pub fn request<F>(&self, key: ThumbKey, deliver: F)
    where
        F: FnOnce(ThumbKey, Result<ThumbImage, ThumbError>) + Send + 'static,
    {
        if self.failed.contains_key(&key) {
            tracing::debug!("thumbnail {:?} previously failed, not retrying", key);
            return;
        }
        if self.in_flight.insert(key.clone(), ()).is_some() {
            // 已有在途取数，搭车等同一份结果
            return;
        }

        self.stats.bump_thumb_requests();
        let store = self.store.clone();
        let cache_dir = self.cache_dir.clone();
        let in_flight = self.in_flight.clone();
        let failed = self.failed.clone();
        let stats = self.stats.clone();

        tokio::task::spawn_blocking(move || {
            let result = fetch_and_decode(&*store, &cache_dir, &key, &stats);
            if let Err(e) = &result {
                tracing::debug!("thumbnail {:?} failed permanently: {}", key, e);
                stats.bump_thumb_failures();
                failed.insert(key.clone(), ());
            }
            in_flight.remove(&key);
            deliver(key, result);
        });
    }
}

fn fetch_and_decode(
    store: &dyn AssetStore,
    cache_dir: &Path,
    key: &ThumbKey,
    stats: &SyncStats,
) -> Result<ThumbImage, ThumbError> {
    let cache_path = cache_dir.join(key.cache_file_name());

    let bytes = match std::fs::read(&cache_path) {
        Ok(bytes) if !bytes.is_empty() => {
            stats.bump_thumb_cache_hits();
            bytes
        }
        _ => {
            let bytes = store.resolve_thumbnail(key)?;
            stats.bump_thumb_fetches();
            write_cache_best_effort(cache_dir, &cache_path, &bytes);
            bytes
        }
    };

    decode(&bytes)
}

/// 缓存回写失败只降级，不影响本次投递。tmp+rename 保证并发读不到半截文件。
fn write_cache_best_effort(cache_dir: &Path, cache_path: &Path, bytes: &[u8]) {
    let write = || -> std::io::Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let tmp = cache_path.with_extension("thumb.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, cache_path)?;
        Ok(())
    };
    if let Err(e) = write() {
        tracing::warn!("thumbnail cache write failed for {:?}: {}", cache_path, e);
    }
}

fn decode(bytes: &[u8]) -> Result<ThumbImage, ThumbError> {
    let img = image::load_from_memory(bytes).map_err(|e| ThumbError::Decode(e.to_string()))?;
    let rgba = img.to_rgba8();
    Ok(ThumbImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: Arc::new(rgba.into_raw()),
    })
}

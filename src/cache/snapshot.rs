use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::key::cache_key;
use crate::query::spec::QuerySpec;
use crate::tree::node::NodeTree;

/// 快照文件 Header
const MAGIC: u32 = 0x5053_5431; // "PST1"
const VERSION_CURRENT: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 8; // magic + version + state + data_len + checksum

/// 快照体：查询描述随树一起落盘。读取时校验查询相等，
/// 兜住 hash 撞槽（两个查询绝不共享彼此的树）。
#[derive(Serialize, Deserialize)]
struct CachedQuery {
    query: QuerySpec,
    tree: NodeTree,
}

/// 查询树的原子快照存储。
///
/// 每个查询一个槽文件（cache::key 派生文件名），目录可被多个模型实例
/// 共享：不同槽互不干扰，同一槽 last-writer-wins。
///
/// 落盘流程：
/// 1) 序列化 body，算 len/checksum
/// 2) 完整 header + body 写进 <slot>.tmp
/// 3) fsync(tmp) → rename(tmp, slot) → fsync(dir)
///
/// 任何阶段崩溃，槽文件要么是旧快照要么不存在；读到半截 tmp 不可能。
/// 读取侧任何不一致（magic/version/state/len/checksum/反序列化/查询不符）
/// 都降级为 miss，绝不向上抛错。
pub struct TreeStore {
    dir: PathBuf,
}

impl TreeStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, query: &QuerySpec) -> PathBuf {
        self.dir.join(format!("{}.tree", cache_key(query)))
    }

    /// 读缓存快照。缓存只是起点，加载即视为过期，调用方随后必须 refresh。
    pub async fn read(&self, query: &QuerySpec) -> Option<NodeTree> {
        let path = self.slot_path(query);
        let data = match fs::read(&path).await {
            Ok(d) => d,
            Err(_) => return None, // 无缓存
        };

        if data.len() < HEADER_SIZE {
            tracing::warn!("tree snapshot {:?} too small, ignoring", path);
            return None;
        }

        let magic = u32::from_le_bytes(data[0..4].try_into().ok()?);
        let version = u32::from_le_bytes(data[4..8].try_into().ok()?);
        let state = u32::from_le_bytes(data[8..12].try_into().ok()?);
        let data_len = u32::from_le_bytes(data[12..16].try_into().ok()?) as usize;
        let stored_checksum = u64::from_le_bytes(data[16..24].try_into().ok()?);

        if magic != MAGIC {
            tracing::warn!("tree snapshot magic mismatch: {:#x} != {:#x}", magic, MAGIC);
            return None;
        }
        if version != VERSION_CURRENT {
            tracing::warn!("tree snapshot version {} != {}, ignoring", version, VERSION_CURRENT);
            return None;
        }
        if state != STATE_COMMITTED {
            tracing::warn!("tree snapshot state INCOMPLETE, ignoring");
            return None;
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != data_len {
            tracing::warn!("tree snapshot length mismatch, ignoring");
            return None;
        }
        let computed = xxh3_64(body);
        if computed != stored_checksum {
            tracing::warn!(
                "tree snapshot checksum mismatch: {:#x} != {:#x}",
                computed,
                stored_checksum
            );
            return None;
        }

        let cached: CachedQuery = match bincode::deserialize(body) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("tree snapshot deserialize failed: {}", e);
                return None;
            }
        };
        if &cached.query != query {
            tracing::warn!("tree snapshot query mismatch (hash collision), ignoring");
            return None;
        }

        tracing::info!(
            "loaded cached tree: {} nodes for {}",
            cached.tree.node_count(),
            query.entity_type
        );
        Some(cached.tree)
    }

    /// 原子写快照。树在消费序列上克隆后传入，写盘本身可放到后台任务。
    pub async fn write_atomic(&self, query: &QuerySpec, tree: &NodeTree) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let payload = CachedQuery {
            query: query.clone(),
            tree: tree.clone(),
        };
        let body = bincode::serialize(&payload)?;
        let data_len: u32 = body
            .len()
            .try_into()
            .map_err(|_| anyhow::anyhow!("tree snapshot too large (>{} bytes)", u32::MAX))?;
        let checksum = xxh3_64(&body);

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
        header[8..12].copy_from_slice(&STATE_COMMITTED.to_le_bytes());
        header[12..16].copy_from_slice(&data_len.to_le_bytes());
        header[16..24].copy_from_slice(&checksum.to_le_bytes());

        let path = self.slot_path(query);
        let tmp_path = path.with_extension("tree.tmp");

        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&header)?;
        file.write_all(&body)?;
        file.sync_all()?;

        // rename 原子替换（POSIX 保证），并发读者只会看到旧快照或新快照
        std::fs::rename(&tmp_path, &path)?;
        if let Ok(dir) = std::fs::File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        tracing::info!(
            "tree snapshot written: {} nodes, {} bytes",
            tree.node_count(),
            HEADER_SIZE + body.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::spec::FilterOp;
    use crate::tree::build::build_tree;
    use crate::tree::node::{Record, Value};

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("pub-sync-cache-{}-{}", tag, nanos))
    }

    fn sample_tree() -> NodeTree {
        let records = vec![
            Record::new("PublishedFile", 1)
                .with_field("name", Value::Text("A".into()))
                .with_field("version_number", Value::Int(1)),
            Record::new("PublishedFile", 2)
                .with_field("name", Value::Text("B".into()))
                .with_field("version_number", Value::Int(3)),
        ];
        build_tree(records, &["name".to_string()], &[])
    }

    fn sample_query() -> QuerySpec {
        QuerySpec::new("PublishedFile").with_hierarchy(&["name"])
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = TreeStore::new(unique_tmp_dir("roundtrip"));
        let query = sample_query();
        let tree = sample_tree();

        store.write_atomic(&query, &tree).await.unwrap();
        let loaded = store.read(&query).await.unwrap();
        assert_eq!(loaded, tree);
    }

    #[tokio::test]
    async fn missing_slot_is_a_miss() {
        let store = TreeStore::new(unique_tmp_dir("missing"));
        assert!(store.read(&sample_query()).await.is_none());
    }

    #[tokio::test]
    async fn corrupted_body_degrades_to_miss() {
        let dir = unique_tmp_dir("corrupt");
        let store = TreeStore::new(dir.clone());
        let query = sample_query();
        store.write_atomic(&query, &sample_tree()).await.unwrap();

        // 翻转 body 中间一个字节
        let path = dir.join(format!("{}.tree", cache_key(&query)));
        let mut data = std::fs::read(&path).unwrap();
        let mid = HEADER_SIZE + (data.len() - HEADER_SIZE) / 2;
        data[mid] ^= 0xFF;
        std::fs::write(&path, data).unwrap();

        assert!(store.read(&query).await.is_none());
    }

    #[tokio::test]
    async fn truncated_file_degrades_to_miss() {
        let dir = unique_tmp_dir("truncated");
        let store = TreeStore::new(dir.clone());
        let query = sample_query();
        store.write_atomic(&query, &sample_tree()).await.unwrap();

        let path = dir.join(format!("{}.tree", cache_key(&query)));
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() / 2]).unwrap();

        assert!(store.read(&query).await.is_none());
    }

    #[tokio::test]
    async fn wrong_magic_degrades_to_miss() {
        let dir = unique_tmp_dir("magic");
        let store = TreeStore::new(dir.clone());
        let query = sample_query();
        store.write_atomic(&query, &sample_tree()).await.unwrap();

        let path = dir.join(format!("{}.tree", cache_key(&query)));
        let mut data = std::fs::read(&path).unwrap();
        data[0] ^= 0xFF;
        std::fs::write(&path, data).unwrap();

        assert!(store.read(&query).await.is_none());
    }

    #[tokio::test]
    async fn different_filters_use_separate_slots() {
        let store = TreeStore::new(unique_tmp_dir("slots"));
        let plain = sample_query();
        let filtered =
            sample_query().with_filter("name", FilterOp::Is, Value::Text("A".into()));

        store.write_atomic(&plain, &sample_tree()).await.unwrap();
        assert!(store.read(&plain).await.is_some());
        assert!(store.read(&filtered).await.is_none());

        store
            .write_atomic(&filtered, &NodeTree::default())
            .await
            .unwrap();
        assert_eq!(store.read(&filtered).await.unwrap(), NodeTree::default());
        assert_eq!(store.read(&plain).await.unwrap(), sample_tree());
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{AssetStore, QueryBackend};
use crate::cache::TreeStore;
use crate::config::ModelConfig;
use crate::model::hooks::ModelHooks;
use crate::query::executor::QueryExecutor;
use crate::query::spec::{QueryError, QuerySpec};
use crate::stats::{StatsReport, SyncStats};
use crate::thumb::{ThumbError, ThumbImage, ThumbKey, ThumbnailFetcher};
use crate::tree::build::build_tree;
use crate::tree::diff::{reconcile, Change};
use crate::tree::node::{Node, NodeTree, Record, Value};

/// 模型可见状态机：Empty → LoadedFromCache → Refreshing → Live。
/// refresh 可重入；失败回落到刷新前的状态（树保持最近一次成功的内容）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Empty,
    LoadedFromCache,
    Refreshing,
    Live,
}

/// 后台工作完成包。全部经由模型的完成通道送回消费序列，
/// 在 apply 里统一落地——树永远只在消费序列上被改。
#[derive(Debug)]
pub enum Completion {
    Query {
        generation: u64,
        result: Result<Vec<Record>, QueryError>,
    },
    Thumb {
        key: ThumbKey,
        result: Result<ThumbImage, ThumbError>,
    },
}

/// 同步模型：缓存优先加载 + 后台刷新 + 原地 reconcile + 缩略图挂载。
///
/// 单实例单消费序列：load / refresh / apply / pump 都必须在同一个任务上
/// 调用。销毁即取消——模型一 drop，完成通道关闭，在途查询与缩略图的
/// 投递静默失败，不会回调进一个死掉的消费者。
pub struct SyncModel {
    cfg: ModelConfig,
    hooks: Arc<dyn ModelHooks>,
    executor: QueryExecutor,
    thumbs: ThumbnailFetcher,
    store: Arc<TreeStore>,
    stats: Arc<SyncStats>,

    tree: NodeTree,
    state: ModelState,
    fallback_state: ModelState,
    query: Option<QuerySpec>,
    /// 已在树上落地的最新查询代号
    settled_generation: u64,

    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl SyncModel {
    pub fn new(
        cfg: ModelConfig,
        backend: Arc<dyn QueryBackend>,
        assets: Arc<dyn AssetStore>,
        hooks: Arc<dyn ModelHooks>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(SyncStats::default());
        let thumbs = ThumbnailFetcher::new(assets, cfg.thumb_cache_dir.clone(), stats.clone());
        let store = Arc::new(TreeStore::new(cfg.cache_dir.clone()));
        Self {
            cfg,
            hooks,
            executor: QueryExecutor::new(backend),
            thumbs,
            store,
            stats,
            tree: NodeTree::default(),
            state: ModelState::Empty,
            fallback_state: ModelState::Empty,
            query: None,
            settled_generation: 0,
            tx,
            rx,
        }
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// 消费层的 side_data 挂载点。仅限消费序列上使用。
    pub fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn query(&self) -> Option<&QuerySpec> {
        self.query.as_ref()
    }

    pub fn stats(&self) -> StatsReport {
        self.stats.snapshot()
    }

    pub fn current_generation(&self) -> u64 {
        self.executor.current_generation()
    }

    /// 缓存优先加载：同步挂载磁盘快照（如有），随即触发后台刷新。
    /// 换查询等于整树重置；返回本次刷新的代号。
    pub async fn load(&mut self, query: QuerySpec) -> u64 {
        match self.store.read(&query).await {
            Some(cached) => {
                self.stats.bump_tree_cache_hits();
                self.tree = cached;
                self.state = ModelState::LoadedFromCache;
                // 缓存节点也走一遍 created 钩子 + 缩略图请求，
                // 展示层不必区分数据来自缓存还是后端
                let hooks = self.hooks.clone();
                self.tree.for_each(&mut |path, node| {
                    hooks.node_created(path, node);
                    self.maybe_request_thumbnail(node);
                });
            }
            None => {
                self.tree = NodeTree::default();
                self.state = ModelState::Empty;
            }
        }
        self.fallback_state = self.state;
        self.query = Some(query);
        self.refresh()
    }

    /// 触发一轮后台刷新，返回代号。可重入：刷新中再次调用会作废
    /// 在途提交（旧结果到达时被丢弃），可见的树不会被拆掉。
    pub fn refresh(&mut self) -> u64 {
        let Some(query) = self.query.clone() else {
            tracing::warn!("refresh() before load(), ignoring");
            return 0;
        };
        self.stats.bump_refreshes();
        if self.state != ModelState::Refreshing {
            self.fallback_state = self.state;
        }
        self.state = ModelState::Refreshing;

        let tx = self.tx.clone();
        self.executor.submit(query, move |generation, result| {
            let _ = tx.send(Completion::Query { generation, result });
        })
    }

    /// 把一个完成包落到树上。返回树是否发生变更。
    pub fn apply(&mut self, completion: Completion) -> bool {
        match completion {
            Completion::Query { generation, result } => self.apply_query(generation, result),
            Completion::Thumb { key, result } => self.apply_thumb(key, result),
        }
    }

    /// 非阻塞排空已就绪的完成包，返回处理个数。
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(c) = self.rx.try_recv() {
            self.apply(c);
            n += 1;
        }
        n
    }

    /// 等待并落地下一个完成包。通道关闭返回 false。
    pub async fn next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(c) => {
                self.apply(c);
                true
            }
            None => false,
        }
    }

    /// 等待指定代号的查询结果落地（成功或失败都算落地）。
    pub async fn wait_for(&mut self, generation: u64) {
        while self.settled_generation < generation {
            if !self.next().await {
                return;
            }
        }
    }

    /// refresh + 等待这一代落地（驱动循环与测试用）。
    pub async fn refresh_and_wait(&mut self) {
        let generation = self.refresh();
        if generation > 0 {
            self.wait_for(generation).await;
        }
    }

    fn apply_query(
        &mut self,
        generation: u64,
        result: Result<Vec<Record>, QueryError>,
    ) -> bool {
        if !self.executor.is_current(generation) {
            // 已被更新的提交作废；晚到的旧结果绝不碰树
            tracing::debug!("superseded query result dropped (generation {})", generation);
            self.stats.bump_superseded();
            return false;
        }
        self.settled_generation = generation;

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("query failed, keeping last known tree: {}", e);
                self.stats.bump_query_failures();
                self.state = self.fallback_state;
                self.hooks.query_failed(&e);
                return false;
            }
        };

        let query = match &self.query {
            Some(q) => q.clone(),
            None => return false,
        };

        self.stats.add_records_fetched(records.len() as u64);
        let records = self.hooks.before_data_processing(records);
        let new_tree = build_tree(records, &query.hierarchy, &query.order);
        let set = reconcile(&mut self.tree, new_tree);

        self.stats.add_changes(
            set.added() as u64,
            set.changed() as u64,
            set.removed() as u64,
            set.moved() as u64,
        );

        for change in &set.changes {
            match change {
                Change::Added { path, .. } => {
                    if let Some(node) = self.tree.get(path) {
                        self.hooks.node_created(path, node);
                        self.maybe_request_thumbnail(node);
                    }
                }
                Change::Changed { path, fields, .. } => {
                    if let Some(node) = self.tree.get(path) {
                        self.hooks.node_changed(path, node, fields);
                    }
                }
                Change::Removed { path, uid } => {
                    self.hooks.node_removed(path, *uid);
                }
                Change::Moved { path, uid, from, to } => {
                    self.hooks.node_moved(path, *uid, *from, *to);
                }
            }
        }

        self.state = ModelState::Live;
        self.fallback_state = ModelState::Live;

        // 快照回写放后台任务，大树不卡消费序列；失败只降级
        let store = self.store.clone();
        let tree = self.tree.clone();
        tokio::spawn(async move {
            if let Err(e) = store.write_atomic(&query, &tree).await {
                tracing::warn!("tree snapshot write failed: {}", e);
            }
        });

        tracing::info!(
            "refresh applied: +{} ~{} -{} moved {}",
            set.added(),
            set.changed(),
            set.removed(),
            set.moved()
        );
        !set.is_empty()
    }

    fn apply_thumb(&mut self, key: ThumbKey, result: Result<ThumbImage, ThumbError>) -> bool {
        let image = match result {
            Ok(image) => image,
            // 永久失败已在取数器里记账；占位图是展示层的事
            Err(e) => {
                tracing::debug!("thumbnail {:?} not applied: {}", key, e);
                return false;
            }
        };

        // 按 key 匹配节点，而不是按请求先后：中间可能隔着若干轮 reconcile
        let paths = self.tree.leaf_paths_where(|rec| {
            rec.entity_type == key.source_type
                && rec.id == key.source_id
                && rec.get(&key.field).is_some()
        });
        if paths.is_empty() {
            // 节点已不在树上：直接丢弃，不是错误
            tracing::debug!("thumbnail {:?} arrived for vanished node, dropped", key);
            return false;
        }

        for path in &paths {
            if let Some(node) = self.tree.get(path) {
                self.hooks.thumbnail_ready(path, node, &image);
            }
        }
        false
    }

    fn maybe_request_thumbnail(&self, node: &Node) {
        if !self.cfg.download_thumbnails {
            return;
        }
        let Some(rec) = &node.record else { return };
        let field = &self.cfg.fields.thumbnail;
        match rec.get(field) {
            None | Some(Value::Null) => return,
            Some(_) => {}
        }

        let key = ThumbKey::new(rec.entity_type.clone(), rec.id, field.clone());
        let tx = self.tx.clone();
        self.thumbs.request(key, move |key, result| {
            let _ = tx.send(Completion::Thumb { key, result });
        });
    }
}

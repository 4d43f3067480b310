use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::QueryBackend;
use crate::query::spec::{QueryError, QuerySpec};
use crate::tree::node::Record;

/// 异步查询执行器。
///
/// 每次 submit 递增一个代号（generation）：新提交天然作废旧提交，
/// 旧代结果照常送达，由消费端用 is_current 丢弃——不去打断在途的
/// 后端调用，只抑制它的效果。消费端销毁后 deliver 内的发送失败即静默结束。
pub struct QueryExecutor {
    backend: Arc<dyn QueryBackend>,
    generation: Arc<AtomicU64>,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            backend,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 提交查询，返回本次的代号。完成时在工作线程上调用 deliver。
    pub fn submit<F>(&self, query: QuerySpec, deliver: F) -> u64
    where
        F: FnOnce(u64, Result<Vec<Record>, QueryError>) + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || {
            let result = backend.find(&query);
            deliver(generation, result);
        });
        generation
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 该代号是否仍是最新一次提交
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.current_generation()
    }
}

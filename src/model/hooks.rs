use crate::query::spec::QueryError;
use crate::thumb::ThumbImage;
use crate::tree::node::{Node, NodePath, Record};

/// 展示层回调接缝。
///
/// 固定一组能力钩子在构造模型时传入，替代「子类覆写 populate_*」那种
/// 继承式扩展。全部钩子在消费序列上调用，默认实现为空操作——
/// 展示层只覆写自己关心的。
pub trait ModelHooks: Send + Sync {
    /// 后端数据落地前的预处理（聚合、去重、过滤）。
    /// 返回值替代原始记录集参与建树。
    fn before_data_processing(&self, records: Vec<Record>) -> Vec<Record> {
        records
    }

    fn node_created(&self, _path: &NodePath, _node: &Node) {}

    fn node_changed(&self, _path: &NodePath, _node: &Node, _fields: &[String]) {}

    fn node_removed(&self, _path: &NodePath, _uid: u64) {}

    /// 节点身份保持、仅在本层换了位置。只关心成员不关心顺序的
    /// 消费层可以忽略它。
    fn node_moved(&self, _path: &NodePath, _uid: u64, _from: usize, _to: usize) {}

    /// 缩略图就绪。占位图/合成由展示层决定，这里只给字节。
    fn thumbnail_ready(&self, _path: &NodePath, _node: &Node, _image: &ThumbImage) {}

    /// 后端查询失败。树保持最近一次成功的状态，重试 = 再次 refresh。
    fn query_failed(&self, _error: &QueryError) {}
}

/// 无操作钩子（演示与测试用）。
pub struct NoopHooks;

impl ModelHooks for NoopHooks {}

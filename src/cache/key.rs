use xxhash_rust::xxh3::xxh3_128;

use crate::query::spec::QuerySpec;

/// 查询 → 缓存槽名。对完整查询描述（实体类型、过滤器、字段、层级、排序）
/// 的 bincode 编码取 xxh3-128：确定性，且不同过滤器不会共享槽位。
pub fn cache_key(query: &QuerySpec) -> String {
    let bytes = match bincode::serialize(query) {
        Ok(b) => b,
        // 内存结构序列化失败基本不可能；兜底用 Debug 文本，保持确定性
        Err(_) => format!("{:?}", query).into_bytes(),
    };
    format!("{:032x}", xxh3_128(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::spec::FilterOp;
    use crate::tree::node::Value;

    #[test]
    fn equivalent_queries_share_a_slot() {
        let a = QuerySpec::new("PublishedFile").with_hierarchy(&["name"]);
        let b = QuerySpec::new("PublishedFile").with_hierarchy(&["name"]);
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn any_component_change_changes_the_slot() {
        let base = QuerySpec::new("PublishedFile").with_hierarchy(&["name"]);
        let filtered = base
            .clone()
            .with_filter("name", FilterOp::Is, Value::Text("A".into()));
        let regrouped = QuerySpec::new("PublishedFile").with_hierarchy(&["version_number"]);
        let other_type = QuerySpec::new("TankPublishedFile").with_hierarchy(&["name"]);

        let k = cache_key(&base);
        assert_ne!(k, cache_key(&filtered));
        assert_ne!(k, cache_key(&regrouped));
        assert_ne!(k, cache_key(&other_type));
    }
}

use crate::query::spec::{SortDirection, SortSpec};
use crate::tree::node::{Node, NodeKey, NodeTree, Record, Value};

/// 平铺记录 → 层级树。
///
/// - 给定排序时先整体排序，再按 hierarchy 逐级分组；
///   未给定排序时分组顺序 = 首次出现顺序。
/// - hierarchy 的每个字段产生一层分组节点，记录本身挂在最深层作为叶子。
/// - 同一父节点下叶子身份唯一：重复身份后到者覆盖（后端去重是它自己的事，
///   这里只保证树不出现重复叶子）。
pub fn build_tree(mut records: Vec<Record>, hierarchy: &[String], order: &[SortSpec]) -> NodeTree {
    if !order.is_empty() {
        sort_records(&mut records, order);
    }

    let mut tree = NodeTree::default();
    let mut next_uid = tree.next_uid;

    for rec in records {
        insert_record(&mut tree.roots, hierarchy, rec, &mut next_uid);
    }

    tree.next_uid = next_uid;
    tree
}

/// 多键稳定排序；缺失字段按 Null 参与比较。
pub fn sort_records(records: &mut [Record], order: &[SortSpec]) {
    let null = Value::Null;
    records.sort_by(|a, b| {
        for spec in order {
            let av = a.get(&spec.field).unwrap_or(&null);
            let bv = b.get(&spec.field).unwrap_or(&null);
            let mut ord = av.cmp_for_sort(bv);
            if spec.direction == SortDirection::Desc {
                ord = ord.reverse();
            }
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn insert_record(roots: &mut Vec<Node>, hierarchy: &[String], rec: Record, next_uid: &mut u64) {
    let mut level = roots;

    for field in hierarchy {
        let group_key = rec.display(field);
        let idx = match level
            .iter()
            .position(|n| matches!(&n.key, NodeKey::Group(g) if *g == group_key))
        {
            Some(i) => i,
            None => {
                let uid = *next_uid;
                *next_uid += 1;
                level.push(Node::group(uid, group_key));
                level.len() - 1
            }
        };
        level = &mut level[idx].children;
    }

    let label = leaf_label(&rec);
    if let Some(existing) = level.iter_mut().find(|n| {
        matches!(&n.key, NodeKey::Leaf { entity_type, id }
            if *entity_type == rec.entity_type && *id == rec.id)
    }) {
        tracing::warn!(
            "duplicate record identity {}#{} under one parent, keeping latest",
            rec.entity_type,
            rec.id
        );
        existing.label = label;
        existing.record = Some(rec);
    } else {
        let uid = *next_uid;
        *next_uid += 1;
        level.push(Node::leaf(uid, label, rec));
    }
}

fn leaf_label(rec: &Record) -> String {
    let name = rec.display("name");
    if name.is_empty() {
        format!("{} {}", rec.entity_type, rec.id)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(id: i64, name: &str, version: i64) -> Record {
        Record::new("PublishedFile", id)
            .with_field("name", Value::Text(name.into()))
            .with_field("version_number", Value::Int(version))
    }

    fn hierarchy(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn groups_by_name_with_leaves_per_record() {
        let records = vec![publish(1, "A", 1), publish(2, "A", 3), publish(3, "B", 1)];
        let tree = build_tree(records, &hierarchy(&["name"]), &[]);

        assert_eq!(tree.roots.len(), 2);
        assert_eq!(tree.roots[0].label, "A");
        assert_eq!(tree.roots[1].label, "B");
        assert_eq!(tree.roots[0].children.len(), 2);
        assert_eq!(tree.roots[1].children.len(), 1);
        // 插入序
        assert_eq!(tree.roots[0].children[0].record.as_ref().unwrap().id, 1);
        assert_eq!(tree.roots[0].children[1].record.as_ref().unwrap().id, 2);
        assert_eq!(tree.node_count(), 5);
    }

    #[test]
    fn explicit_order_sorts_before_grouping() {
        let records = vec![publish(2, "A", 3), publish(1, "A", 1), publish(3, "B", 1)];
        let order = vec![SortSpec {
            field: "version_number".into(),
            direction: SortDirection::Asc,
        }];
        let tree = build_tree(records, &hierarchy(&["name"]), &order);

        let a = &tree.roots[0];
        assert_eq!(a.label, "A");
        assert_eq!(a.children[0].record.as_ref().unwrap().id, 1);
        assert_eq!(a.children[1].record.as_ref().unwrap().id, 2);
    }

    #[test]
    fn two_level_hierarchy_nests_groups() {
        let records = vec![
            publish(1, "A", 1).with_field("step", Value::Text("model".into())),
            publish(2, "B", 1).with_field("step", Value::Text("model".into())),
            publish(3, "C", 1).with_field("step", Value::Text("rig".into())),
        ];
        let tree = build_tree(records, &hierarchy(&["step", "name"]), &[]);

        assert_eq!(tree.roots.len(), 2);
        let model = &tree.roots[0];
        assert_eq!(model.label, "model");
        assert_eq!(model.children.len(), 2);
        assert!(model.children.iter().all(|g| g.children.len() == 1));
    }

    #[test]
    fn duplicate_identity_in_one_parent_keeps_latest() {
        let newer = publish(1, "A", 2);
        let records = vec![publish(1, "A", 1), newer.clone()];
        let tree = build_tree(records, &hierarchy(&["name"]), &[]);

        assert_eq!(tree.roots[0].children.len(), 1);
        assert_eq!(tree.roots[0].children[0].record, Some(newer));
    }

    #[test]
    fn uids_are_unique_and_monotone() {
        let records = vec![publish(1, "A", 1), publish(2, "A", 2), publish(3, "B", 1)];
        let tree = build_tree(records, &hierarchy(&["name"]), &[]);

        let mut uids = Vec::new();
        tree.for_each(&mut |_, n| uids.push(n.uid));
        let mut sorted = uids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), uids.len());
        assert_eq!(tree.next_uid, uids.len() as u64);
    }
}

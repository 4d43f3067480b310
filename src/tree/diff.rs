use std::collections::{HashMap, HashSet};

use crate::tree::node::{Node, NodePath, NodeTree, Record};

/// 一次 reconcile 产生的单条变更信号。
///
/// Moved 的 from 指“剔除已删除节点之后”的旧序号，to 指新树中的最终序号；
/// 纯删除不会让幸存节点误报 Moved。
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Added {
        path: NodePath,
        uid: u64,
        index: usize,
    },
    Changed {
        path: NodePath,
        uid: u64,
        fields: Vec<String>,
    },
    Removed {
        path: NodePath,
        uid: u64,
    },
    Moved {
        path: NodePath,
        uid: u64,
        from: usize,
        to: usize,
    },
}

#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn added(&self) -> usize {
        self.count(|c| matches!(c, Change::Added { .. }))
    }

    pub fn changed(&self) -> usize {
        self.count(|c| matches!(c, Change::Changed { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|c| matches!(c, Change::Removed { .. }))
    }

    pub fn moved(&self) -> usize {
        self.count(|c| matches!(c, Change::Moved { .. }))
    }

    fn count(&self, pred: impl Fn(&Change) -> bool) -> usize {
        self.changes.iter().filter(|c| pred(c)).count()
    }
}

/// 把新树按身份 key 合并进活树，原地最小变更。
///
/// - 新有旧无 → 插入（整棵子树逐节点报 Added，分配新 uid）
/// - 两边都有 → 字段有差异才更新（报 Changed；uid 与 side_data 原样保留）
/// - 旧有新无 → 剪除（子树内逐节点报 Removed）
/// - 顺序以新树为准，身份保持的节点位置变化报 Moved
///
/// 新树为空、活树非空时会把活树剪成空树，而不是 no-op。
pub fn reconcile(live: &mut NodeTree, new_tree: NodeTree) -> ChangeSet {
    let mut changes = Vec::new();
    let mut next_uid = live.next_uid;
    reconcile_level(
        &mut live.roots,
        new_tree.roots,
        &NodePath::root(),
        &mut next_uid,
        &mut changes,
    );
    live.next_uid = next_uid;
    ChangeSet { changes }
}

fn reconcile_level(
    live: &mut Vec<Node>,
    new_children: Vec<Node>,
    parent_path: &NodePath,
    next_uid: &mut u64,
    out: &mut Vec<Change>,
) {
    let new_keys: HashSet<_> = new_children.iter().map(|n| n.key.clone()).collect();

    // 第一遍：剪掉新树里不存在的身份
    let mut kept: HashMap<_, (usize, Node)> = HashMap::new();
    let mut kept_idx = 0;
    for node in live.drain(..) {
        if new_keys.contains(&node.key) {
            kept.insert(node.key.clone(), (kept_idx, node));
            kept_idx += 1;
        } else {
            emit_removed(&node, &parent_path.child(node.key.clone()), out);
        }
    }

    // 第二遍：按新树顺序重建本层，身份保持的节点原样搬运
    let mut result = Vec::with_capacity(new_children.len());
    for (to_idx, new_node) in new_children.into_iter().enumerate() {
        let path = parent_path.child(new_node.key.clone());
        match kept.remove(&new_node.key) {
            Some((from_idx, mut node)) => {
                let Node {
                    label,
                    record,
                    children,
                    ..
                } = new_node;
                let fields = changed_fields(&node.record, &record);
                if !fields.is_empty() {
                    node.label = label;
                    node.record = record;
                    out.push(Change::Changed {
                        path: path.clone(),
                        uid: node.uid,
                        fields,
                    });
                }
                reconcile_level(&mut node.children, children, &path, next_uid, out);
                if from_idx != to_idx {
                    out.push(Change::Moved {
                        path,
                        uid: node.uid,
                        from: from_idx,
                        to: to_idx,
                    });
                }
                result.push(node);
            }
            None => {
                result.push(adopt(new_node, &path, to_idx, next_uid, out));
            }
        }
    }

    *live = result;
}

/// 把新树的子树收编进活树：逐节点分配新 uid 并报 Added（先序）。
fn adopt(
    mut node: Node,
    path: &NodePath,
    index: usize,
    next_uid: &mut u64,
    out: &mut Vec<Change>,
) -> Node {
    node.uid = *next_uid;
    *next_uid += 1;
    out.push(Change::Added {
        path: path.clone(),
        uid: node.uid,
        index,
    });

    let children = std::mem::take(&mut node.children);
    for (i, child) in children.into_iter().enumerate() {
        let child_path = path.child(child.key.clone());
        let adopted = adopt(child, &child_path, i, next_uid, out);
        node.children.push(adopted);
    }
    node
}

/// 子树内逐节点报 Removed（先序）。
fn emit_removed(node: &Node, path: &NodePath, out: &mut Vec<Change>) {
    out.push(Change::Removed {
        path: path.clone(),
        uid: node.uid,
    });
    for child in &node.children {
        emit_removed(child, &path.child(child.key.clone()), out);
    }
}

fn changed_fields(old: &Option<Record>, new: &Option<Record>) -> Vec<String> {
    match (old, new) {
        (None, None) => Vec::new(),
        (Some(a), Some(b)) => {
            let mut fields = Vec::new();
            for (k, v) in &b.fields {
                if a.fields.get(k) != Some(v) {
                    fields.push(k.clone());
                }
            }
            for k in a.fields.keys() {
                if !b.fields.contains_key(k) {
                    fields.push(k.clone());
                }
            }
            fields
        }
        // 分组↔叶子不会同 key，这一支只防御性兜底
        _ => vec!["*".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build::build_tree;
    use crate::tree::node::Value;

    fn publish(id: i64, name: &str, version: i64) -> Record {
        Record::new("PublishedFile", id)
            .with_field("name", Value::Text(name.into()))
            .with_field("version_number", Value::Int(version))
    }

    fn by_name() -> Vec<String> {
        vec!["name".to_string()]
    }

    fn base_records() -> Vec<Record> {
        vec![publish(1, "A", 1), publish(2, "A", 3), publish(3, "B", 1)]
    }

    #[test]
    fn reconcile_identical_trees_is_empty() {
        let mut live = build_tree(base_records(), &by_name(), &[]);
        let new = build_tree(base_records(), &by_name(), &[]);
        let before = live.clone();

        let set = reconcile(&mut live, new);
        assert!(set.is_empty(), "unexpected changes: {:?}", set.changes);
        assert_eq!(live, before);
    }

    #[test]
    fn reconcile_to_empty_prunes_every_node() {
        let mut live = build_tree(base_records(), &by_name(), &[]);
        let total = live.node_count();

        let set = reconcile(&mut live, NodeTree::default());
        assert_eq!(set.removed(), total);
        assert_eq!(set.changes.len(), total);
        assert!(live.is_empty());
    }

    #[test]
    fn field_change_preserves_identity_and_side_data() {
        let mut live = build_tree(base_records(), &by_name(), &[]);
        let leaf_path = live.leaf_paths_where(|r| r.id == 1).remove(0);
        live.get_mut(&leaf_path)
            .unwrap()
            .side_data
            .insert("selected".into(), Value::Bool(true));
        let uid_before = live.get(&leaf_path).unwrap().uid;

        let mut records = base_records();
        records[0] = publish(1, "A", 2); // version 1 → 2
        let set = reconcile(&mut live, build_tree(records, &by_name(), &[]));

        assert_eq!(set.changes.len(), 1);
        match &set.changes[0] {
            Change::Changed { path, uid, fields } => {
                assert_eq!(path, &leaf_path);
                assert_eq!(*uid, uid_before);
                assert_eq!(fields, &vec!["version_number".to_string()]);
            }
            other => panic!("expected Changed, got {:?}", other),
        }

        let leaf = live.get(&leaf_path).unwrap();
        assert_eq!(leaf.uid, uid_before);
        assert_eq!(leaf.side_data.get("selected"), Some(&Value::Bool(true)));
        assert_eq!(
            leaf.record.as_ref().unwrap().get("version_number"),
            Some(&Value::Int(2))
        );
    }

    #[test]
    fn removed_record_prunes_one_leaf_only() {
        // §8 场景：去掉 id:2 之后 "A" 只剩一个孩子
        let mut live = build_tree(base_records(), &by_name(), &[]);
        let records = vec![publish(1, "A", 1), publish(3, "B", 1)];

        let set = reconcile(&mut live, build_tree(records, &by_name(), &[]));
        assert_eq!(set.removed(), 1);
        assert_eq!(set.added(), 0);
        assert_eq!(set.changed(), 0);
        assert_eq!(live.roots[0].children.len(), 1);
        assert_eq!(live.roots[0].children[0].record.as_ref().unwrap().id, 1);
    }

    #[test]
    fn new_identity_is_inserted_with_fresh_uid() {
        let mut live = build_tree(base_records(), &by_name(), &[]);
        let uid_floor = live.next_uid;

        let mut records = base_records();
        records.push(publish(4, "B", 2));
        let set = reconcile(&mut live, build_tree(records, &by_name(), &[]));

        assert_eq!(set.added(), 1);
        match &set.changes[0] {
            Change::Added { uid, index, .. } => {
                assert!(*uid >= uid_floor);
                assert_eq!(*index, 1);
            }
            other => panic!("expected Added, got {:?}", other),
        }
        assert_eq!(live.roots[1].children.len(), 2);
    }

    #[test]
    fn removing_a_group_emits_one_signal_per_subtree_node() {
        let mut live = build_tree(base_records(), &by_name(), &[]);
        // 去掉整个 "A" 组（组节点 + 两个叶子 = 3 个信号）
        let records = vec![publish(3, "B", 1)];

        let set = reconcile(&mut live, build_tree(records, &by_name(), &[]));
        assert_eq!(set.removed(), 3);
        assert_eq!(live.roots.len(), 1);
        assert_eq!(live.roots[0].label, "B");
    }

    #[test]
    fn reorder_preserves_identity_and_matches_new_order() {
        let mut live = build_tree(base_records(), &by_name(), &[]);
        let uid_a = live.roots[0].uid;
        let uid_b = live.roots[1].uid;

        // B 组先出现 → 本层顺序翻转
        let records = vec![publish(3, "B", 1), publish(1, "A", 1), publish(2, "A", 3)];
        let set = reconcile(&mut live, build_tree(records, &by_name(), &[]));

        assert_eq!(set.added(), 0);
        assert_eq!(set.removed(), 0);
        assert!(set.moved() > 0);
        assert_eq!(live.roots[0].label, "B");
        assert_eq!(live.roots[0].uid, uid_b);
        assert_eq!(live.roots[1].uid, uid_a);
    }
}

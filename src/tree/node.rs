use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type EntityId = i64;

/// 实体引用 `{type, id, name}`。
/// 相等性只看 (type, id)；name 仅用于展示（后端可能随时改名）。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: EntityId,
    pub name: String,
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type && self.id == other.id
    }
}

impl Eq for EntityRef {}

/// 后端字段值：标量 / 实体引用 / 列表。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Link(EntityRef),
    List(Vec<Value>),
}

impl Value {
    /// 展示字符串（同时用作分组 key）。Null 显示为空串。
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Link(l) => l.name.clone(),
            Value::List(vs) => {
                let parts: Vec<String> = vs.iter().map(|v| v.display()).collect();
                parts.join(", ")
            }
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Link(_) => 5,
            Value::List(_) => 6,
        }
    }

    /// 排序用全序：同类型按自然序，跨类型按类型序号。
    /// Float 用 total_cmp，NaN 不会破坏排序稳定性。
    pub fn cmp_for_sort(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Link(a), Value::Link(b)) => {
                a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
            }
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp_for_sort(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

/// 一条后端实体记录。(entity_type, id) 是稳定身份，字段表随查询而变。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity_type: String,
    pub id: EntityId,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(entity_type: impl Into<String>, id: EntityId) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn identity(&self) -> (&str, EntityId) {
        (&self.entity_type, self.id)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// 字段展示值；缺失字段显示为空串。
    pub fn display(&self, field: &str) -> String {
        self.get(field).map(|v| v.display()).unwrap_or_default()
    }
}

/// 节点身份 key。同一父节点下 key 唯一（建树时保证）。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    /// 中间层分组节点：分组字段的展示值
    Group(String),
    /// 叶子节点：记录身份
    Leaf { entity_type: String, id: EntityId },
}

/// 从根到节点的 key 序列。树内寻址用它代替父指针回溯。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodePath(pub Vec<NodeKey>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, key: NodeKey) -> Self {
        let mut segs = self.0.clone();
        segs.push(key);
        Self(segs)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for seg in &self.0 {
            if !first {
                write!(f, " / ")?;
            }
            first = false;
            match seg {
                NodeKey::Group(s) => write!(f, "{}", s)?,
                NodeKey::Leaf { entity_type, id } => write!(f, "{}#{}", entity_type, id)?,
            }
        }
        Ok(())
    }
}

/// 树节点。父节点独占子节点所有权；uid 在同一查询的多轮 reconcile 之间保持稳定。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uid: u64,
    pub key: NodeKey,
    pub label: String,
    /// 分组节点为 None，叶子持有完整记录
    pub record: Option<Record>,
    /// role 存储：消费层挂在节点上的任意附加状态（选中、展开等）。
    /// reconcile 永远不清空它。
    #[serde(default)]
    pub side_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(uid: u64, key: String) -> Self {
        Self {
            uid,
            label: key.clone(),
            key: NodeKey::Group(key),
            record: None,
            side_data: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn leaf(uid: u64, label: String, record: Record) -> Self {
        Self {
            uid,
            key: NodeKey::Leaf {
                entity_type: record.entity_type.clone(),
                id: record.id,
            },
            label,
            record: Some(record),
            side_data: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.key, NodeKey::Leaf { .. })
    }

    /// 本节点 + 全部后代的数量
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_size()).sum::<usize>()
    }
}

/// 查询结果树。next_uid 单调递增，随快照一起持久化，
/// 保证缓存加载后新插入的节点不会复用旧 uid。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTree {
    pub roots: Vec<Node>,
    pub next_uid: u64,
}

impl NodeTree {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn alloc_uid(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    pub fn node_count(&self) -> usize {
        self.roots.iter().map(|n| n.subtree_size()).sum()
    }

    pub fn leaf_count(&self) -> usize {
        let mut n = 0;
        self.for_each(&mut |_, node| {
            if node.is_leaf() {
                n += 1;
            }
        });
        n
    }

    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        let mut level = &self.roots;
        let mut found: Option<&Node> = None;
        for key in &path.0 {
            let node = level.iter().find(|n| &n.key == key)?;
            level = &node.children;
            found = Some(node);
        }
        found
    }

    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut level = &mut self.roots;
        let mut idx_path = Vec::with_capacity(path.0.len());
        for key in &path.0 {
            let i = level.iter().position(|n| &n.key == key)?;
            idx_path.push(i);
            level = &mut level[i].children;
        }
        // 用索引路径重走一遍，拿到最后一段的可变借用
        let (&last, rest) = idx_path.split_last()?;
        let mut level = &mut self.roots;
        for &i in rest {
            level = &mut level[i].children;
        }
        Some(&mut level[last])
    }

    /// 先序遍历
    pub fn for_each(&self, f: &mut impl FnMut(&NodePath, &Node)) {
        fn walk(nodes: &[Node], path: &NodePath, f: &mut impl FnMut(&NodePath, &Node)) {
            for node in nodes {
                let p = path.child(node.key.clone());
                f(&p, node);
                walk(&node.children, &p, f);
            }
        }
        walk(&self.roots, &NodePath::root(), f);
    }

    /// 收集满足条件的叶子路径
    pub fn leaf_paths_where(&self, pred: impl Fn(&Record) -> bool) -> Vec<NodePath> {
        let mut out = Vec::new();
        self.for_each(&mut |path, node| {
            if let Some(rec) = &node.record {
                if pred(rec) {
                    out.push(path.clone());
                }
            }
        });
        out
    }
}

use serde::{Deserialize, Serialize};

use crate::tree::node::{Record, Value};

/// 不可变查询描述。所有成员逐项相等的两个查询共享同一个缓存槽
/// （见 cache::key）。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub entity_type: String,
    pub filters: Vec<Filter>,
    /// 要取回的字段；空表示后端自行决定（通常是全部）
    pub fields: Vec<String>,
    /// 分组层级：每个字段产生树的一层
    pub hierarchy: Vec<String>,
    pub order: Vec<SortSpec>,
}

impl QuerySpec {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filters: Vec::new(),
            fields: Vec::new(),
            hierarchy: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_hierarchy(mut self, fields: &[&str]) -> Self {
        self.hierarchy = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_order(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Is,
    IsNot,
    Contains,
    In,
}

impl Filter {
    /// 本地求值（进程内后端与测试用；真实后端在服务端求值）。
    /// 缺失字段按 Null 参与比较；实体引用按 (type, id) 相等。
    pub fn matches(&self, rec: &Record) -> bool {
        let null = Value::Null;
        let actual = rec.get(&self.field).unwrap_or(&null);
        match self.op {
            FilterOp::Is => actual == &self.value,
            FilterOp::IsNot => actual != &self.value,
            FilterOp::Contains => actual.display().contains(&self.value.display()),
            FilterOp::In => match &self.value {
                Value::List(candidates) => candidates.iter().any(|c| c == actual),
                single => single == actual,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// 后端查询失败分类。Clone 是刻意的：错误要跨完成通道传回消费序列。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid query: {0}")]
    Validation(String),
}

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::query::spec::{QueryError, QuerySpec};
use crate::thumb::{ThumbError, ThumbKey};
use crate::tree::node::{EntityRef, Record, Value};

/// 后端查询服务的窄接口。阻塞式：执行器负责把它挪到工作线程上。
pub trait QueryBackend: Send + Sync + 'static {
    fn find(&self, query: &QuerySpec) -> Result<Vec<Record>, QueryError>;
}

/// 资产存储的窄接口：按 (source_type, source_id, field) 取缩略图原始字节。
pub trait AssetStore: Send + Sync + 'static {
    fn resolve_thumbnail(&self, key: &ThumbKey) -> Result<Vec<u8>, ThumbError>;
}

/// 进程内后端：在本地记录集上求值过滤器并做字段投影。演示与测试用。
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<Vec<Record>>,
}

impl InMemoryBackend {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.write() = records;
    }
}

impl QueryBackend for InMemoryBackend {
    fn find(&self, query: &QuerySpec) -> Result<Vec<Record>, QueryError> {
        let records = self.records.read();
        let out = records
            .iter()
            .filter(|r| r.entity_type == query.entity_type)
            .filter(|r| query.filters.iter().all(|f| f.matches(r)))
            .map(|r| project(r, query))
            .collect();
        Ok(out)
    }
}

/// 字段投影：fields 非空时只保留请求的字段（外加分组/排序要用到的字段）。
fn project(rec: &Record, query: &QuerySpec) -> Record {
    if query.fields.is_empty() {
        return rec.clone();
    }
    let mut keep: Vec<&str> = query.fields.iter().map(String::as_str).collect();
    keep.extend(query.hierarchy.iter().map(String::as_str));
    keep.extend(query.order.iter().map(|s| s.field.as_str()));

    let mut out = Record::new(rec.entity_type.clone(), rec.id);
    for field in keep {
        if let Some(v) = rec.get(field) {
            out.fields.insert(field.to_string(), v.clone());
        }
    }
    out
}

/// 进程内资产存储：key → 原始图片字节。
#[derive(Default)]
pub struct InMemoryAssets {
    assets: RwLock<BTreeMap<ThumbKey, Vec<u8>>>,
}

impl InMemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: ThumbKey, bytes: Vec<u8>) {
        self.assets.write().insert(key, bytes);
    }
}

impl AssetStore for InMemoryAssets {
    fn resolve_thumbnail(&self, key: &ThumbKey) -> Result<Vec<u8>, ThumbError> {
        self.assets
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ThumbError::Unavailable(format!("no asset for {:?}", key)))
    }
}

/// JSON 对象 → Record。`{type, id, name}` 形状的对象识别为实体引用。
/// 演示程序从文件读记录集时用。
pub fn record_from_json(obj: &serde_json::Value, default_type: &str) -> Option<Record> {
    let map = obj.as_object()?;
    let id = map.get("id")?.as_i64()?;
    let entity_type = map
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or(default_type);

    let mut rec = Record::new(entity_type, id);
    for (k, v) in map {
        if k == "id" || k == "type" {
            continue;
        }
        rec.fields.insert(k.clone(), value_from_json(v));
    }
    Some(rec)
}

fn value_from_json(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(vs) => Value::List(vs.iter().map(value_from_json).collect()),
        serde_json::Value::Object(map) => {
            let link = (|| {
                Some(EntityRef {
                    entity_type: map.get("type")?.as_str()?.to_string(),
                    id: map.get("id")?.as_i64()?,
                    name: map.get("name")?.as_str()?.to_string(),
                })
            })();
            match link {
                Some(l) => Value::Link(l),
                None => Value::Text(v.to_string()),
            }
        }
    }
}

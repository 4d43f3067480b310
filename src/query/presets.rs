use crate::config::ModelConfig;
use crate::query::spec::{FilterOp, QuerySpec, SortDirection};
use crate::tree::node::{EntityRef, Record, Value};

/// 「某实体下全部发布的最新版本」视图的查询。
///
/// entity_link 为 None 时查询不加实体过滤（浏览全库）。版本升序只影响
/// 同名发布在组内的展示顺序；去重由 latest_by_identity 显式完成，
/// 不依赖这里的顺序。
pub fn latest_publish_query(cfg: &ModelConfig, entity_link: Option<EntityRef>) -> QuerySpec {
    let f = &cfg.fields;
    let mut fields: Vec<&str> = vec![
        f.name.as_str(),
        f.entity_link.as_str(),
        f.version.as_str(),
        f.thumbnail.as_str(),
        f.publish_type.as_str(),
    ];
    for extra in &cfg.extra_fields {
        fields.push(extra.as_str());
    }

    let mut query = QuerySpec::new(cfg.entity_type.clone())
        .with_fields(&fields)
        .with_hierarchy(&[f.name.as_str()])
        .with_order(f.version.clone(), SortDirection::Asc);

    if let Some(link) = entity_link {
        query = query.with_filter(f.entity_link.clone(), FilterOp::Is, Value::Link(link));
    }
    query
}

/// 「单个发布的版本历史」视图的查询：按 group_by 字段钉住同一条发布线，
/// 按版本号分层。
pub fn publish_history_query(
    cfg: &ModelConfig,
    publish: &Record,
    group_by: &[String],
) -> QuerySpec {
    let f = &cfg.fields;
    let mut fields: Vec<&str> = vec![
        f.name.as_str(),
        f.version.as_str(),
        f.thumbnail.as_str(),
        f.publish_type.as_str(),
    ];
    for extra in &cfg.extra_fields {
        fields.push(extra.as_str());
    }

    let mut query = QuerySpec::new(publish.entity_type.clone())
        .with_fields(&fields)
        .with_hierarchy(&[f.version.as_str()])
        .with_order(f.version.clone(), SortDirection::Desc);

    for field in group_by {
        let value = publish.get(field).cloned().unwrap_or(Value::Null);
        query = query.with_filter(field.clone(), FilterOp::Is, value);
    }
    query
}

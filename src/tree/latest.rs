use std::collections::HashMap;

use crate::tree::node::Record;

/// 每个 (name, 发布类型) 身份只保留版本号最大的一条记录。
///
/// 旧实现依赖后端按版本升序返回、后写覆盖前写；这里改成显式取
/// max(version)，与输入顺序无关。版本号相同时保留 id 较大的一条，
/// 保证结果确定。输出顺序 = 各身份首次出现的顺序。
pub fn latest_by_identity(
    records: Vec<Record>,
    name_field: &str,
    type_field: &str,
    version_field: &str,
) -> Vec<Record> {
    let mut out: Vec<Record> = Vec::new();
    let mut slot: HashMap<(String, String), usize> = HashMap::new();

    for rec in records {
        let key = (rec.display(name_field), rec.display(type_field));
        let version = rec.get(version_field).and_then(|v| v.as_int()).unwrap_or(0);

        match slot.get(&key) {
            None => {
                slot.insert(key, out.len());
                out.push(rec);
            }
            Some(&i) => {
                let held = &out[i];
                let held_version = held
                    .get(version_field)
                    .and_then(|v| v.as_int())
                    .unwrap_or(0);
                if version > held_version || (version == held_version && rec.id > held.id) {
                    out[i] = rec;
                }
            }
        }
    }

    out
}

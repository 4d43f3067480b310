use std::path::PathBuf;

/// 后端 schema 变体的字段名映射。
///
/// 在查询构造期解析一次，运行期不做类型探测：旧 schema 的发布类型字段叫
/// `tank_type`，新 schema 叫 `published_file_type`，其余字段两边一致。
#[derive(Clone, Debug)]
pub struct FieldMap {
    pub name: String,
    pub version: String,
    pub publish_type: String,
    pub thumbnail: String,
    pub entity_link: String,
}

impl FieldMap {
    pub fn for_entity_type(entity_type: &str) -> Self {
        let publish_type = if entity_type == "PublishedFile" {
            "published_file_type"
        } else {
            "tank_type"
        };
        Self {
            name: "name".into(),
            version: "version_number".into(),
            publish_type: publish_type.into(),
            thumbnail: "image".into(),
            entity_link: "entity".into(),
        }
    }
}

/// 模型运行配置。全部显式传入，库内不做任何全局设置查找。
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// 发布实体类型（schema 变体由它决定）
    pub entity_type: String,
    /// 查询树快照目录
    pub cache_dir: PathBuf,
    /// 缩略图字节缓存目录
    pub thumb_cache_dir: PathBuf,
    pub download_thumbnails: bool,
    pub fields: FieldMap,
    /// 在预设字段之外额外取回的字段
    pub extra_fields: Vec<String>,
}

impl ModelConfig {
    pub fn new(cache_dir: PathBuf, entity_type: &str) -> Self {
        let thumb_cache_dir = cache_dir.join("thumbnails");
        Self {
            entity_type: entity_type.into(),
            cache_dir,
            thumb_cache_dir,
            download_thumbnails: true,
            fields: FieldMap::for_entity_type(entity_type),
            extra_fields: Vec::new(),
        }
    }

    /// 平台缓存目录下的默认位置（~/.cache/pub-sync）。
    pub fn with_default_dirs(entity_type: &str) -> Self {
        let base = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("pub-sync");
        Self::new(base, entity_type)
    }
}

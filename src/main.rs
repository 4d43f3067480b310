use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use pub_sync::backend::{record_from_json, InMemoryAssets, InMemoryBackend};
use pub_sync::query::presets::latest_publish_query;
use pub_sync::{ModelConfig, NoopHooks, SyncModel};

/// 演示程序：从 JSON 记录集起一个进程内后端，跑一轮「缓存加载 + 刷新」，
/// 打印结果树与同步报告。第二次运行同一份记录集可以看到缓存命中。
#[derive(Parser, Debug)]
#[command(name = "pub-sync", about = "Cache-first publish tree sync demo")]
struct Args {
    /// 记录集 JSON 文件（对象数组，`{type, id, name}` 形状的值识别为实体引用）
    records: PathBuf,

    /// 发布实体类型（决定 schema 字段变体）
    #[arg(long, default_value = "PublishedFile")]
    entity_type: String,

    /// 分组字段（可多次给出，覆盖默认的按 name 分组）
    #[arg(long = "group-by")]
    group_by: Vec<String>,

    /// 查询树快照目录（默认平台缓存目录下的 pub-sync/）
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// 不请求缩略图
    #[arg(long)]
    no_thumbs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.records)
        .with_context(|| format!("reading {:?}", args.records))?;
    let json: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {:?}", args.records))?;
    let records: Vec<_> = json
        .as_array()
        .context("records file must hold a JSON array")?
        .iter()
        .filter_map(|v| record_from_json(v, &args.entity_type))
        .collect();
    info!("loaded {} records from {:?}", records.len(), args.records);

    let mut cfg = match args.cache_dir {
        Some(dir) => ModelConfig::new(dir, &args.entity_type),
        None => ModelConfig::with_default_dirs(&args.entity_type),
    };
    cfg.download_thumbnails = !args.no_thumbs;

    let backend = Arc::new(InMemoryBackend::new(records));
    let assets = Arc::new(InMemoryAssets::new());
    let mut model = SyncModel::new(cfg.clone(), backend, assets, Arc::new(NoopHooks));

    let mut query = latest_publish_query(&cfg, None);
    if !args.group_by.is_empty() {
        query.hierarchy = args.group_by.clone();
    }
    let generation = model.load(query).await;
    if !model.tree().is_empty() {
        info!("cached tree mounted: {} nodes", model.tree().node_count());
    }
    model.wait_for(generation).await;

    println!("publish tree ({:?}):", model.state());
    model.tree().for_each(&mut |path, node| {
        let indent = "  ".repeat(path.depth());
        match &node.record {
            Some(rec) => println!(
                "{}{} (v{}, {}#{})",
                indent,
                node.label,
                rec.display(&cfg.fields.version),
                rec.entity_type,
                rec.id
            ),
            None => println!("{}{}", indent, node.label),
        }
    });

    println!("{}", model.stats());
    Ok(())
}

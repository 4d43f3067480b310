use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 同步核心的累计计数。跨线程共享（取数器在工作线程上计数），
/// 全部 relaxed 原子：只做观测，不参与同步。
#[derive(Debug, Default)]
pub struct SyncStats {
    refreshes: AtomicU64,
    tree_cache_hits: AtomicU64,
    records_fetched: AtomicU64,
    nodes_added: AtomicU64,
    nodes_changed: AtomicU64,
    nodes_removed: AtomicU64,
    nodes_moved: AtomicU64,
    superseded_results: AtomicU64,
    query_failures: AtomicU64,
    thumb_requests: AtomicU64,
    thumb_cache_hits: AtomicU64,
    thumb_fetches: AtomicU64,
    thumb_failures: AtomicU64,
}

macro_rules! bump {
    ($name:ident, $field:ident) => {
        pub fn $name(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl SyncStats {
    bump!(bump_refreshes, refreshes);
    bump!(bump_tree_cache_hits, tree_cache_hits);
    bump!(bump_superseded, superseded_results);
    bump!(bump_query_failures, query_failures);
    bump!(bump_thumb_requests, thumb_requests);
    bump!(bump_thumb_cache_hits, thumb_cache_hits);
    bump!(bump_thumb_fetches, thumb_fetches);
    bump!(bump_thumb_failures, thumb_failures);

    pub fn add_records_fetched(&self, n: u64) {
        self.records_fetched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_changes(&self, added: u64, changed: u64, removed: u64, moved: u64) {
        self.nodes_added.fetch_add(added, Ordering::Relaxed);
        self.nodes_changed.fetch_add(changed, Ordering::Relaxed);
        self.nodes_removed.fetch_add(removed, Ordering::Relaxed);
        self.nodes_moved.fetch_add(moved, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsReport {
        StatsReport {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            tree_cache_hits: self.tree_cache_hits.load(Ordering::Relaxed),
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            nodes_added: self.nodes_added.load(Ordering::Relaxed),
            nodes_changed: self.nodes_changed.load(Ordering::Relaxed),
            nodes_removed: self.nodes_removed.load(Ordering::Relaxed),
            nodes_moved: self.nodes_moved.load(Ordering::Relaxed),
            superseded_results: self.superseded_results.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            thumb_requests: self.thumb_requests.load(Ordering::Relaxed),
            thumb_cache_hits: self.thumb_cache_hits.load(Ordering::Relaxed),
            thumb_fetches: self.thumb_fetches.load(Ordering::Relaxed),
            thumb_failures: self.thumb_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StatsReport {
    pub refreshes: u64,
    pub tree_cache_hits: u64,
    pub records_fetched: u64,
    pub nodes_added: u64,
    pub nodes_changed: u64,
    pub nodes_removed: u64,
    pub nodes_moved: u64,
    pub superseded_results: u64,
    pub query_failures: u64,
    pub thumb_requests: u64,
    pub thumb_cache_hits: u64,
    pub thumb_fetches: u64,
    pub thumb_failures: u64,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════╗")?;
        writeln!(f, "║        pub-sync Sync Report          ║")?;
        writeln!(f, "╠══════════════════════════════════════╣")?;
        writeln!(f, "║ refreshes:        {:>10}         ║", self.refreshes)?;
        writeln!(f, "║ cache hits:       {:>10}         ║", self.tree_cache_hits)?;
        writeln!(f, "║ records fetched:  {:>10}         ║", self.records_fetched)?;
        writeln!(f, "╠──────────────────────────────────────╣")?;
        writeln!(f, "║ nodes added:      {:>10}         ║", self.nodes_added)?;
        writeln!(f, "║ nodes changed:    {:>10}         ║", self.nodes_changed)?;
        writeln!(f, "║ nodes removed:    {:>10}         ║", self.nodes_removed)?;
        writeln!(f, "║ nodes moved:      {:>10}         ║", self.nodes_moved)?;
        writeln!(f, "╠──────────────────────────────────────╣")?;
        writeln!(f, "║ superseded:       {:>10}         ║", self.superseded_results)?;
        writeln!(f, "║ query failures:   {:>10}         ║", self.query_failures)?;
        writeln!(f, "║ thumb requests:   {:>10}         ║", self.thumb_requests)?;
        writeln!(f, "║ thumb cache hits: {:>10}         ║", self.thumb_cache_hits)?;
        writeln!(f, "║ thumb fetches:    {:>10}         ║", self.thumb_fetches)?;
        writeln!(f, "║ thumb failures:   {:>10}         ║", self.thumb_failures)?;
        writeln!(f, "╚══════════════════════════════════════╝")?;
        Ok(())
    }
}

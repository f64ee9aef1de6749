// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic content-cache usage example.
//!
//! Demonstrates:
//! 1. Seeding an in-memory store with published rows
//! 2. Starting the cache (rebuild from store, file written in background)
//! 3. Publishing, reordering and clearing nodes
//! 4. Request-scoped snapshots and change notifications
//! 5. Restarting from the durable file
//! 6. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=content_cache=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Instant;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tracing_subscriber::EnvFilter;

use content_cache::{
    CacheConfig, CacheEvent, ContentCache, ContentNode, InMemoryStore, NodeId, ReadContext, Tree,
    ROOT_ID,
};

fn page(id: NodeId, parent: NodeId, level: u32, sort: i32, title: &str) -> ContentNode {
    ContentNode::new(id, parent, "page")
        .with_level(level)
        .with_sort_order(sort)
        .with_attribute("nodeName", title)
        .with_data("title", title)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("content_cache=info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           content-cache: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Seed the store
    // ─────────────────────────────────────────────────────────────────────────
    let store = Arc::new(InMemoryStore::new());
    for node in [
        page(1, ROOT_ID, 1, 0, "Home"),
        page(2, ROOT_ID, 1, 1, "Settings"),
        page(3, 1, 2, 0, "About"),
        page(4, 1, 2, 1, "Blog"),
        page(5, 4, 3, 0, "First post"),
    ] {
        store.put(&node)?;
    }
    println!("📦 Store seeded with {} published rows", store.len());

    let dir = tempfile::tempdir()?;
    let config = CacheConfig {
        content_file: dir.path().join("content.json"),
        persist_debounce_ms: 200,
        ..Default::default()
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Start (no file yet → rebuild from the store)
    // ─────────────────────────────────────────────────────────────────────────
    let cache = ContentCache::new(config.clone(), store.clone());
    println!("\n🚀 Starting cache... State: {}", cache.state());
    let start = Instant::now();
    cache.start().await?;
    println!("   ✅ Ready in {:?}", start.elapsed());
    print_tree(&*cache.current_snapshot().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Incremental updates
    // ─────────────────────────────────────────────────────────────────────────
    let mut events = cache.subscribe();
    let mut ctx = ReadContext::new();
    let pinned = cache.snapshot_in(&mut ctx).await;

    println!("\n📝 Publishing a new post and moving the blog to the top...");
    cache.publish_node(page(6, 4, 3, -1, "Second post"), false).await?;
    store.set_sort_order(4, -5);
    cache.update_sort_order(4).await?;

    println!("\n🗑️  Unpublishing 'Settings'...");
    cache.clear_cached_node(2).await?;

    while let Ok(event) = events.try_recv() {
        match event {
            CacheEvent::Updated { node } => println!("   └─ updated: {} ({})", node.id, node.content_type),
            CacheEvent::Cleared { node } => println!("   └─ cleared: {} ({})", node.id, node.content_type),
        }
    }

    println!("\n📖 Pinned request snapshot still shows {} nodes", pinned.len());
    print_tree(&*cache.current_snapshot().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Shutdown flushes the file; a second cache loads from it
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down (flushes the pending write)...");
    cache.shutdown().await;
    let stats = cache.stats();
    println!("   └─ State: {}, generation: {}", stats.state, stats.generation);

    store.clear();
    let restarted = ContentCache::new(config, store);
    restarted.start().await?;
    println!("\n♻️  Restarted from file with an empty store:");
    print_tree(&*restarted.current_snapshot().await);
    restarted.shutdown().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");
    Ok(())
}

fn print_tree(tree: &Tree) {
    println!("   🌳 {} ({} nodes)", tree.document_id(), tree.len());
    for node in tree.depth_first() {
        let indent = "   ".repeat(node.level as usize);
        println!(
            "   {}└─ [{}] {} (sort {})",
            indent,
            node.id,
            node.attribute("nodeName").unwrap_or("?"),
            node.sort_order
        );
    }
}

/// Print every captured metric, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let labels = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            match value {
                DebugValue::Counter(v) => format!("counter   {}{} = {}", key.name(), labels, v),
                DebugValue::Gauge(v) => format!("gauge     {}{} = {:.2}", key.name(), labels, v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let count = samples.len();
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("histogram {}{} count={} sum={:.4}", key.name(), labels, count, sum)
                }
            }
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}

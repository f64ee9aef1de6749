//! Integration tests for the content cache facade.
//!
//! Every test runs against an [`InMemoryStore`] and a scratch directory for
//! the durable file, so no external services are needed.
//!
//! Run with: `cargo test --test cache_lifecycle`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::Semaphore;

use content_cache::persistence::file;
use content_cache::{
    CacheConfig, CacheError, CacheEvent, CacheState, ContentCache, ContentNode, ContentStore,
    InMemoryStore, NodeId, ReadContext, StoreRow, ROOT_ID,
};

// =============================================================================
// Helpers
// =============================================================================

fn page(id: NodeId, parent: NodeId, level: u32, sort: i32) -> ContentNode {
    ContentNode::new(id, parent, "page")
        .with_level(level)
        .with_sort_order(sort)
        .with_data("title", format!("Page {id}"))
}

/// root ─┬─ 1 ─┬─ 3
///       │     └─ 4 ── 6
///       └─ 2 ── 5
fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for node in [
        page(1, ROOT_ID, 1, 0),
        page(2, ROOT_ID, 1, 1),
        page(3, 1, 2, 0),
        page(4, 1, 2, 1),
        page(5, 2, 2, 0),
        page(6, 4, 3, 0),
    ] {
        store.put(&node).unwrap();
    }
    store
}

fn config(path: &Path) -> CacheConfig {
    CacheConfig {
        content_file: path.to_path_buf(),
        persist_debounce_ms: 20,
        persist_max_wait_ms: 100,
        ..Default::default()
    }
}

async fn started(config: CacheConfig, store: Arc<InMemoryStore>) -> ContentCache {
    let cache = ContentCache::new(config, store);
    cache.start().await.expect("start failed");
    assert_eq!(cache.state(), CacheState::Ready);
    cache
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_rebuild_from_store_on_first_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("content.json");
    let cache = started(config(&path), seeded_store()).await;

    let tree = cache.current_snapshot().await;
    assert_eq!(tree.children(ROOT_ID), &[1, 2]);
    assert_eq!(tree.children(1), &[3, 4]);
    assert_eq!(tree.children(2), &[5]);
    assert_eq!(tree.children(4), &[6]);
    assert_eq!(tree.get(6).unwrap().level, 3);
    assert_eq!(tree.get(5).unwrap().data("title"), Some("Page 5"));
    tree.check_invariants().unwrap();

    // The rebuild is registered, so the persister writes it out.
    wait_for(|| path.exists()).await;
    cache.shutdown().await;
    assert_eq!(file::read_tree(&path).unwrap().unwrap().tree, *tree);
}

#[tokio::test]
async fn test_restart_loads_from_file_without_rewriting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("content.json");
    let store = seeded_store();

    let first = started(config(&path), store.clone()).await;
    let original = first.current_snapshot().await;
    first.shutdown().await;
    assert!(path.exists());

    // The store no longer matters: the file wins.
    store.clear();
    let second = started(config(&path), store).await;
    let reloaded = second.current_snapshot().await;
    assert_eq!(*reloaded, *original);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let persister = second.stats().persister.unwrap();
    assert_eq!(persister.requests, 0);
    assert_eq!(persister.saves, 0);
    second.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_starts_share_one_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let cache = Arc::new(ContentCache::new(config(&dir.path().join("c.json")), store.clone()));

    let (a, b) = tokio::join!(cache.start(), cache.start());
    a.unwrap();
    b.unwrap();
    cache.start().await.unwrap();

    assert_eq!(cache.stats().generation, 1);
    assert_eq!(store.query_count(), 1);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_operations_before_start_are_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ContentCache::new(config(&dir.path().join("c.json")), seeded_store());

    assert!(cache.current_snapshot().await.is_empty());
    assert_eq!(cache.publish_node(page(9, ROOT_ID, 1, 0), false).await.unwrap(), None);
    assert!(!cache.sort_siblings(ROOT_ID).await.unwrap());
    assert!(!cache.update_sort_order(1).await.unwrap());
    assert!(cache.clear_cached_node(1).await.unwrap().is_none());
    assert!(!cache.refresh_from_store().await.unwrap());
    assert_eq!(cache.stats().generation, 0);
}

// =============================================================================
// Incremental updates
// =============================================================================

#[tokio::test]
async fn test_publish_node_emits_update() {
    let dir = tempfile::tempdir().unwrap();
    let cache = started(config(&dir.path().join("c.json")), seeded_store()).await;
    let mut events = cache.subscribe();
    let before = cache.current_snapshot().await;

    let placed = cache.publish_node(page(7, 2, 2, -1), false).await.unwrap();
    assert_eq!(placed, Some(7));

    match events.try_recv().unwrap() {
        CacheEvent::Updated { node } => {
            assert_eq!(node.id, 7);
            assert_eq!(node.parent_id, 2);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let after = cache.current_snapshot().await;
    assert_eq!(after.children(2), &[7, 5]);
    // The snapshot taken before the commit never changes.
    assert!(!before.contains(7));
    cache.shutdown().await;
}

#[tokio::test]
async fn test_publish_under_missing_parent_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let cache = started(config(&dir.path().join("c.json")), seeded_store()).await;
    let mut events = cache.subscribe();
    let generation = cache.stats().generation;

    let placed = cache.publish_node(page(8, 404, 2, 0), false).await.unwrap();
    assert_eq!(placed, None);
    assert_eq!(cache.stats().generation, generation);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    cache.shutdown().await;
}

#[tokio::test]
async fn test_publish_creating_cycle_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let cache = started(config(&dir.path().join("c.json")), seeded_store()).await;

    // Moving 1 under its own grandchild would create a cycle.
    let placed = cache.publish_node(page(1, 6, 4, 0), false).await.unwrap();
    assert_eq!(placed, None);
    assert_eq!(cache.current_snapshot().await.children(ROOT_ID), &[1, 2]);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_publish_move_with_related_refreshes_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let cache = started(config(&dir.path().join("c.json")), store.clone()).await;

    // Move 4 (with child 6) under 2, and edit 6 in the store.
    store.put(&page(4, 2, 2, 5)).unwrap();
    store
        .put(&ContentNode::new(6, 4, "page").with_level(3).with_data("title", "Renamed"))
        .unwrap();

    let placed = cache.publish_node(page(4, 2, 2, 5), true).await.unwrap();
    assert_eq!(placed, Some(4));

    let tree = cache.current_snapshot().await;
    assert_eq!(tree.children(1), &[3]);
    assert_eq!(tree.children(2), &[5, 4]);
    assert_eq!(tree.children(4), &[6]);
    let six = tree.get(6).unwrap();
    assert_eq!(six.level, 3);
    assert_eq!(six.data("title"), Some("Renamed"));
    tree.check_invariants().unwrap();
    cache.shutdown().await;
}

#[tokio::test]
async fn test_sort_siblings_applies_store_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let cache = started(config(&dir.path().join("c.json")), store.clone()).await;
    let before = cache.current_snapshot().await;

    store.set_sort_order(3, 9);
    store.set_sort_order(4, 2);
    assert!(cache.sort_siblings(1).await.unwrap());

    let tree = cache.current_snapshot().await;
    assert_eq!(tree.children(1), &[4, 3]);
    assert_eq!(tree.children(4), &[6]);
    assert_eq!(tree.get(4).unwrap().data, before.get(4).unwrap().data);
    assert_eq!(tree.document_id(), before.document_id());

    // Nothing left to change.
    assert!(!cache.sort_siblings(1).await.unwrap());
    assert!(!cache.sort_siblings(404).await.unwrap());
    cache.shutdown().await;
}

#[tokio::test]
async fn test_sort_siblings_of_root_includes_level_one_rows_with_stray_parent() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    store.put(&page(7, 99, 1, 2)).unwrap();
    let cache = started(config(&dir.path().join("c.json")), store.clone()).await;
    assert_eq!(cache.current_snapshot().await.children(ROOT_ID), &[1, 2, 7]);

    store.set_sort_order(7, -1);
    assert!(cache.sort_siblings(ROOT_ID).await.unwrap());
    assert_eq!(cache.current_snapshot().await.children(ROOT_ID), &[7, 1, 2]);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_update_sort_order_repositions_one_node() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let cache = started(config(&dir.path().join("c.json")), store.clone()).await;

    store.set_sort_order(1, 10);
    assert!(cache.update_sort_order(1).await.unwrap());
    let tree = cache.current_snapshot().await;
    assert_eq!(tree.children(ROOT_ID), &[2, 1]);
    assert_eq!(tree.children(1), &[3, 4]);

    assert!(!cache.update_sort_order(1).await.unwrap());
    assert!(!cache.update_sort_order(404).await.unwrap());
    cache.shutdown().await;
}

#[tokio::test]
async fn test_clear_cached_node_removes_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let cache = started(config(&dir.path().join("c.json")), seeded_store()).await;
    let mut events = cache.subscribe();

    let removed = cache.clear_cached_node(1).await.unwrap().unwrap();
    assert_eq!(removed.id, 1);

    let tree = cache.current_snapshot().await;
    for id in [1, 3, 4, 6] {
        assert!(!tree.contains(id));
    }
    assert_eq!(tree.children(ROOT_ID), &[2]);

    match events.try_recv().unwrap() {
        CacheEvent::Cleared { node } => assert_eq!(node.id, 1),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(cache.clear_cached_node(1).await.unwrap().is_none());
    cache.shutdown().await;
}

#[tokio::test]
async fn test_refresh_from_store_replaces_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let cache = started(config(&dir.path().join("c.json")), store.clone()).await;

    store.remove(2);
    store.remove(5);
    store.put(&page(9, ROOT_ID, 1, 7)).unwrap();
    assert!(cache.refresh_from_store().await.unwrap());

    let tree = cache.current_snapshot().await;
    assert_eq!(tree.children(ROOT_ID), &[1, 9]);
    assert!(!tree.contains(5));
    cache.shutdown().await;
}

// =============================================================================
// Snapshots
// =============================================================================

#[tokio::test]
async fn test_read_context_pins_one_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let cache = started(config(&dir.path().join("c.json")), seeded_store()).await;

    let mut ctx = ReadContext::new();
    let first = cache.snapshot_in(&mut ctx).await;
    cache.publish_node(page(7, ROOT_ID, 1, 9), false).await.unwrap();

    let again = cache.snapshot_in(&mut ctx).await;
    assert!(Arc::ptr_eq(&first, &again));
    assert!(!again.contains(7));

    let mut fresh = ReadContext::new();
    assert!(cache.snapshot_in(&mut fresh).await.contains(7));
    cache.shutdown().await;
}

#[tokio::test]
async fn test_stale_file_reloads_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.json");
    let store = seeded_store();

    let writer = started(config(&path), store.clone()).await;
    wait_for(|| path.exists()).await;

    let reader_config = CacheConfig {
        sync_on_read: true,
        sync_check_interval_ms: 0,
        persist_debounce_ms: 60_000,
        persist_max_wait_ms: 60_000,
        ..config(&path)
    };
    let reader = Arc::new(started(reader_config, InMemoryStore::new().into()).await);
    assert_eq!(reader.current_snapshot().await.len(), 6);
    assert_eq!(reader.stats().stale_reloads, 0);
    let generation = reader.stats().generation;

    // Let the mtime move on before the writer rewrites the file.
    tokio::time::sleep(Duration::from_millis(20)).await;
    writer.publish_node(page(7, ROOT_ID, 1, 9), false).await.unwrap();
    writer.shutdown().await;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let reader = reader.clone();
        readers.push(tokio::spawn(async move { reader.current_snapshot().await }));
    }
    for handle in readers {
        handle.await.unwrap();
    }

    let tree = reader.current_snapshot().await;
    assert!(tree.contains(7));
    let stats = reader.stats();
    assert_eq!(stats.stale_reloads, 1);
    assert_eq!(stats.generation, generation + 1);
    // A reload from the file is not a change to persist.
    assert_eq!(stats.persister.unwrap().requests, 0);
    reader.shutdown().await;
}

// =============================================================================
// Ownership and shutdown
// =============================================================================

#[tokio::test]
async fn test_released_ownership_stops_file_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    let slow = CacheConfig {
        persist_debounce_ms: 60_000,
        persist_max_wait_ms: 60_000,
        ..config(&path)
    };
    let cache = started(slow, seeded_store()).await;
    assert!(cache.is_file_owner());

    cache.release_file_ownership();
    assert!(!cache.is_file_owner());

    // In-memory updates keep working.
    assert_eq!(cache.publish_node(page(7, ROOT_ID, 1, 9), false).await.unwrap(), Some(7));
    assert!(cache.current_snapshot().await.contains(7));

    cache.shutdown().await;
    assert!(!path.exists());
}

#[tokio::test]
async fn test_shutdown_flushes_and_refuses_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    let slow = CacheConfig {
        persist_debounce_ms: 60_000,
        persist_max_wait_ms: 60_000,
        ..config(&path)
    };
    let cache = started(slow, seeded_store()).await;
    let mut state = cache.state_receiver();

    cache.publish_node(page(7, ROOT_ID, 1, 9), false).await.unwrap();
    assert!(!path.exists());

    cache.shutdown().await;
    assert_eq!(cache.state(), CacheState::Stopped);
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), CacheState::Stopped);
    assert!(file::read_tree(&path).unwrap().unwrap().tree.contains(7));

    // Reads keep working, writes are ignored, start() stays a no-op.
    assert!(cache.current_snapshot().await.contains(7));
    assert_eq!(cache.publish_node(page(8, ROOT_ID, 1, 10), false).await.unwrap(), None);
    assert!(matches!(cache.start().await, Ok(())));
    cache.shutdown().await;
}

#[tokio::test]
async fn test_start_after_shutdown_without_start_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ContentCache::new(config(&dir.path().join("c.json")), seeded_store());
    cache.shutdown().await;
    assert!(matches!(cache.start().await, Err(CacheError::InvalidState(_))));
}

/// Holds every rebuild until the test opens the gate.
struct GatedStore {
    inner: Arc<InMemoryStore>,
    gate: Semaphore,
}

#[async_trait]
impl ContentStore for GatedStore {
    async fn published_rows(&self) -> Result<Vec<StoreRow>, CacheError> {
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.published_rows().await
    }
}

#[tokio::test]
async fn test_shutdown_while_loading_leaves_no_persister() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("content.json");
    let store = Arc::new(GatedStore { inner: seeded_store(), gate: Semaphore::new(0) });
    let cache = Arc::new(ContentCache::new(config(&path), store.clone()));

    let starter = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.start().await })
    };
    wait_for(|| cache.state() == CacheState::Loading).await;

    cache.shutdown().await;
    assert_eq!(cache.state(), CacheState::Stopped);

    store.gate.add_permits(1);
    let started = starter.await.unwrap();
    assert!(matches!(started, Err(CacheError::InvalidState(_))));

    assert_eq!(cache.state(), CacheState::Stopped);
    assert!(cache.stats().persister.is_none());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!path.exists());
}

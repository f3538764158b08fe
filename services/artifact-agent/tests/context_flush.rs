//! Background flushing of task context into the coordination store.

use std::sync::Arc;
use std::time::Duration;

use nimbus_artifact_agent::context::{ContextAggregator, ContextError, FlushConfig};
use nimbus_coordination::{CoordinationStore, FsStore, MemoryStore, StoreLayout};
use nimbus_id::TaskId;
use nimbus_testing::{init_tracing, job};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn read_context(store: &dyn CoordinationStore, path: &str) -> Option<Value> {
    let data = store.get(path).await.ok()?;
    serde_json::from_slice(&data).ok()
}

async fn wait_for(store: &dyn CoordinationStore, path: &str, expected: &Value) {
    for _ in 0..200 {
        if read_context(store, path).await.as_ref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("{path} never reached {expected}");
}

fn fast() -> FlushConfig {
    FlushConfig {
        interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_flush_loop_delivers_latest_values() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let layout = StoreLayout::default();
    let ctx = Arc::new(ContextAggregator::new());
    let wc = job("wc-1");

    ctx.put(&wc, TaskId::new(4), "offset", json!(100));
    assert!(ctx.start_flush(store.clone(), layout.clone(), fast()).unwrap());
    assert!(!ctx.start_flush(store.clone(), layout.clone(), fast()).unwrap());
    assert!(ctx.is_flushing());

    let path = layout.task_context(&wc, TaskId::new(4));
    assert_eq!(path, "/storm/customercontext/wc-1/4");
    wait_for(store.as_ref(), &path, &json!({"offset": 100})).await;

    ctx.put(&wc, TaskId::new(4), "offset", json!(200));
    wait_for(store.as_ref(), &path, &json!({"offset": 200})).await;

    ctx.stop_flush().await;
    assert!(!ctx.is_flushing());
}

#[tokio::test]
async fn test_flush_to_filesystem_store() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FsStore::new(temp.path()));
    let layout = StoreLayout::new("/prod/storm").unwrap();
    let ctx = Arc::new(ContextAggregator::new());

    ctx.put(&job("a"), TaskId::new(1), "k", json!("a1"));
    ctx.put(&job("b"), TaskId::new(9), "k", json!({"nested": [1, 2]}));
    ctx.start_flush(store.clone(), layout.clone(), fast()).unwrap();

    wait_for(
        store.as_ref(),
        &layout.task_context(&job("a"), TaskId::new(1)),
        &json!({"k": "a1"}),
    )
    .await;
    wait_for(
        store.as_ref(),
        &layout.task_context(&job("b"), TaskId::new(9)),
        &json!({"k": {"nested": [1, 2]}}),
    )
    .await;

    ctx.stop_flush().await;
}

#[tokio::test]
async fn test_evicted_job_is_not_flushed_again() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let layout = StoreLayout::default();
    let ctx = Arc::new(ContextAggregator::new());

    ctx.put(&job("done"), TaskId::new(1), "k", json!(1));
    ctx.remove_job(&job("done"));
    ctx.put(&job("live"), TaskId::new(1), "k", json!(2));
    ctx.start_flush(store.clone(), layout.clone(), fast()).unwrap();

    wait_for(
        store.as_ref(),
        &layout.task_context(&job("live"), TaskId::new(1)),
        &json!({"k": 2}),
    )
    .await;
    assert!(!store
        .exists(&layout.job_context(&job("done")))
        .await
        .unwrap());

    ctx.stop_flush().await;
}

#[tokio::test]
async fn test_zero_flush_interval_is_rejected() {
    init_tracing();
    let ctx = Arc::new(ContextAggregator::new());
    let result = ctx.start_flush(
        Arc::new(MemoryStore::new()),
        StoreLayout::default(),
        FlushConfig {
            interval: Duration::ZERO,
        },
    );

    assert!(matches!(result, Err(ContextError::InvalidConfig(_))));
    assert!(!ctx.is_flushing());
    assert!(ctx
        .start_flush(Arc::new(MemoryStore::new()), StoreLayout::default(), fast())
        .unwrap());
    ctx.stop_flush().await;
}

#[tokio::test]
async fn test_dropping_aggregator_stops_flush_loop() {
    init_tracing();
    let ctx = Arc::new(ContextAggregator::new());
    ctx.put(&job("wc-1"), TaskId::new(1), "k", json!(1));
    assert!(ctx
        .start_flush(
            Arc::new(MemoryStore::new()),
            StoreLayout::default(),
            FlushConfig {
                interval: Duration::from_secs(3600),
            },
        )
        .unwrap());

    let weak = Arc::downgrade(&ctx);
    drop(ctx);
    assert!(weak.upgrade().is_none());
}

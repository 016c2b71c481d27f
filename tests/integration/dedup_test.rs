//! Deduplicators driven from many tasks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;

use authkit::{AsyncDeduplicator, KeyedDeduplicator};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_tasks_share_one_invocation() {
    let dedup = Arc::new(AsyncDeduplicator::<u32, String>::with_name("answer"));
    let calls = Arc::new(AtomicUsize::new(0));

    let first = dedup.fetch({
        let calls = Arc::clone(&calls);
        move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(50)).await;
            Ok(42)
        }
    });

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let dedup = Arc::clone(&dedup);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup
                    .fetch(move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(0)
                    })
                    .await
            })
        })
        .collect();

    assert_eq!(first.await, Ok(42));
    for result in join_all(handles).await {
        assert_eq!(result.unwrap(), Ok(42));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!dedup.is_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keyed_fetches_across_tasks() {
    let keyed = KeyedDeduplicator::<String, String, String>::with_name("profiles");
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let keyed = keyed.clone();
            let calls = Arc::clone(&calls);
            let key = format!("user-{}", i % 3);
            tokio::spawn(async move {
                let label = key.clone();
                keyed
                    .fetch(key, move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(label.to_uppercase())
                    })
                    .await
            })
        })
        .collect();

    let results: Vec<String> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    for (i, result) in results.iter().enumerate() {
        assert_eq!(result, &format!("USER-{}", i % 3));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(keyed.len(), 3);
    assert_eq!(keyed.prune_idle(), 3);
    assert!(keyed.is_empty());
}

//! Integration tests for the bounded work queue.
//!
//! These tests exercise the queue the way the pipeline does: one producer,
//! many consumers, and a drain wait.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bulkfetch_core::queue::{BoundedQueue, QueueError, TaskDoneGuard};
use tokio_test::task;
use tokio_test::{assert_pending, assert_ready};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_consumers_drain_every_item_once() {
    let queue = Arc::new(BoundedQueue::new(3));
    let consumed = Arc::new(std::sync::Mutex::new(Vec::new()));

    let consumers: Vec<_> = (0..5)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            tokio::spawn(async move {
                loop {
                    let item: u32 = queue.get().await;
                    consumed.lock().unwrap().push(item);
                    queue.task_done();
                }
            })
        })
        .collect();

    for item in 0..200 {
        queue.put(item).await;
    }
    tokio::time::timeout(Duration::from_secs(10), queue.join())
        .await
        .expect("queue should drain");

    for consumer in consumers {
        consumer.abort();
    }

    let consumed = consumed.lock().unwrap();
    assert_eq!(consumed.len(), 200);
    let unique: HashSet<_> = consumed.iter().copied().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(queue.unfinished(), 0);
}

#[test]
fn test_put_parks_until_space_frees() {
    let queue = BoundedQueue::new(1);
    let mut first = task::spawn(queue.put("a"));
    assert_ready!(first.poll());
    drop(first);

    let mut second = task::spawn(queue.put("b"));
    assert_pending!(second.poll());

    let mut get = task::spawn(queue.get());
    assert_eq!(assert_ready!(get.poll()), "a");

    assert!(second.is_woken());
    assert_ready!(second.poll());
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_get_parks_until_batch_arrives() {
    let queue: BoundedQueue<u8> = BoundedQueue::new(2);
    let mut get = task::spawn(queue.get());
    assert_pending!(get.poll());

    queue.batch_put([1, 2, 3, 4]);

    assert!(get.is_woken());
    assert_eq!(assert_ready!(get.poll()), 1);
    assert_eq!(queue.len(), 3);
}

#[test]
fn test_join_released_only_by_last_task_done() {
    let queue = BoundedQueue::unbounded();
    queue.batch_put(["a", "b"]);

    let mut join = task::spawn(queue.join());
    assert_pending!(join.poll());

    let _ = assert_ready!(task::spawn(queue.get()).poll());
    let _ = assert_ready!(task::spawn(queue.get()).poll());
    queue.task_done();
    assert_pending!(join.poll());

    queue.task_done();
    assert!(join.is_woken());
    assert_ready!(join.poll());
}

#[test]
fn test_extra_task_done_is_reported() {
    let queue: BoundedQueue<u8> = BoundedQueue::unbounded();
    queue.batch_put([1]);
    let _ = assert_ready!(task::spawn(queue.get()).poll());

    assert_eq!(queue.try_task_done(), Ok(()));
    assert_eq!(queue.try_task_done(), Err(QueueError::TaskDoneWithoutGet));
}

#[tokio::test]
async fn test_guards_release_join_after_cancellation() {
    let queue = Arc::new(BoundedQueue::new(10));
    queue.batch_put(0..6);

    // Two items go in flight and are aborted; the rest are cleared.
    let mut in_flight = Vec::new();
    for _ in 0..2 {
        let _item = queue.get().await;
        let guard = TaskDoneGuard::new(Arc::clone(&queue));
        in_flight.push(tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        }));
    }
    assert_eq!(queue.clear_pending(), vec![2, 3, 4, 5]);

    for handle in in_flight {
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    tokio::time::timeout(Duration::from_secs(5), queue.join())
        .await
        .expect("queue should drain");
}

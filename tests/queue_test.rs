//! Integration tests for the job queue and worker pool, run against the
//! in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use beaver_rs::allocator::AllocationMode;
use beaver_rs::error::Error;
use beaver_rs::model::Job;
use beaver_rs::queue::{JobQueue, Lifecycle, PoolConfig};
use beaver_rs::storage::MemoryStore;

fn fast_config(allocation: AllocationMode) -> PoolConfig {
    PoolConfig {
        allocation,
        grace_period: Duration::from_millis(200),
        min_work: Duration::from_millis(1),
        max_work: Duration::from_millis(5),
        max_sticks: 9,
    }
}

fn seed(queue: &JobQueue<MemoryStore>, count: i64) {
    for i in 0..count {
        queue.enqueue(Job::new(i, format!("Job {i}")));
    }
}

async fn drain(queue: &JobQueue<MemoryStore>) {
    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .expect("queue should drain");
}

async fn recorded_ids(store: &MemoryStore) -> Vec<String> {
    store
        .list()
        .await
        .into_iter()
        .map(|e| e.id.to_string())
        .collect()
}

fn expected_ids(n: u64) -> Vec<String> {
    (1..=n).map(|i| i.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Draining
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_jobs_five_workers_record_five_distinct_excursions() {
    let store = Arc::new(MemoryStore::new());
    let queue = JobQueue::new(Arc::clone(&store), fast_config(AllocationMode::Atomic));

    seed(&queue, 5);
    queue.start(5).unwrap();
    drain(&queue).await;
    queue.stop().await;

    let excursions = store.list().await;
    assert_eq!(excursions.len(), 5);
    assert_eq!(recorded_ids(&store).await, expected_ids(5));
    assert!(
        excursions
            .iter()
            .all(|e| (0..=9).contains(&e.sticks_collected))
    );

    let stats = queue.stats();
    assert_eq!(stats.enqueued, 5);
    assert_eq!(stats.claimed, 5);
    assert_eq!(stats.recorded, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(queue.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_job_is_claimed_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let queue = JobQueue::new(Arc::clone(&store), fast_config(AllocationMode::Atomic));

    queue.start(6).unwrap();
    seed(&queue, 60);
    drain(&queue).await;
    queue.stop().await;

    let stats = queue.stats();
    assert_eq!(stats.claimed, 60);
    assert_eq!(stats.recorded, 60);
    assert_eq!(store.len().await, 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_ids_increase_by_one() {
    let store = Arc::new(MemoryStore::new());
    // Racy allocation has nothing to race against with one worker.
    let queue = JobQueue::new(Arc::clone(&store), fast_config(AllocationMode::Racy));

    seed(&queue, 15);
    queue.start(1).unwrap();
    drain(&queue).await;
    queue.stop().await;

    // Crosses "9" → "10", where a text MAX() would stall.
    assert_eq!(recorded_ids(&store).await, expected_ids(15));
    assert_eq!(queue.stats().failed, 0);
}

// ---------------------------------------------------------------------------
// Allocation under concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn atomic_allocation_never_duplicates_under_load() {
    let store = Arc::new(MemoryStore::new().with_read_latency(Duration::from_millis(1)));
    let mut config = fast_config(AllocationMode::Atomic);
    config.min_work = Duration::ZERO;
    config.max_work = Duration::from_millis(2);
    let queue = JobQueue::new(Arc::clone(&store), config);

    seed(&queue, 40);
    queue.start(8).unwrap();
    drain(&queue).await;
    queue.stop().await;

    assert_eq!(queue.stats().failed, 0);
    assert_eq!(recorded_ids(&store).await, expected_ids(40));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racy_allocation_can_collide_and_loses_the_job() {
    // Both workers claim at once, both read "0" during the slow read, both
    // try to insert "1"; the loser's excursion is dropped.
    let store = Arc::new(MemoryStore::new().with_read_latency(Duration::from_millis(150)));
    let mut config = fast_config(AllocationMode::Racy);
    config.min_work = Duration::from_millis(1);
    config.max_work = Duration::from_millis(1);
    let queue = JobQueue::new(Arc::clone(&store), config);

    seed(&queue, 2);
    queue.start(2).unwrap();
    drain(&queue).await;
    queue.stop().await;

    let stats = queue.stats();
    assert_eq!(stats.claimed, 2);
    assert_eq!(stats.recorded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(recorded_ids(&store).await, vec!["1".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_failure_loses_one_job_and_worker_keeps_going() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next_reads(1);
    let queue = JobQueue::new(Arc::clone(&store), fast_config(AllocationMode::Racy));

    seed(&queue, 3);
    queue.start(1).unwrap();
    drain(&queue).await;
    queue.stop().await;

    let stats = queue.stats();
    assert_eq!(stats.claimed, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.recorded, 2);
    assert_eq!(recorded_ids(&store).await, expected_ids(2));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_twice_is_a_noop() {
    let queue = JobQueue::new(
        Arc::new(MemoryStore::new()),
        fast_config(AllocationMode::Atomic),
    );
    queue.start(3).unwrap();

    queue.stop().await;
    assert_eq!(queue.state(), Lifecycle::Stopped);
    queue.stop().await;
    assert_eq!(queue.state(), Lifecycle::Stopped);
}

#[tokio::test]
async fn start_while_running_is_a_state_error() {
    let queue = JobQueue::new(
        Arc::new(MemoryStore::new()),
        fast_config(AllocationMode::Atomic),
    );
    queue.start(2).unwrap();

    let err = queue.start(2).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: Lifecycle::Running,
            to: Lifecycle::Running
        }
    ));
    assert_eq!(queue.state(), Lifecycle::Running);

    queue.stop().await;
    assert!(matches!(
        queue.start(2),
        Err(Error::InvalidTransition {
            from: Lifecycle::Stopped,
            ..
        })
    ));
}

#[tokio::test]
async fn start_with_zero_workers_is_rejected() {
    let queue = JobQueue::new(
        Arc::new(MemoryStore::new()),
        fast_config(AllocationMode::Atomic),
    );
    assert!(matches!(queue.start(0), Err(Error::Config(_))));
    assert_eq!(queue.state(), Lifecycle::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nothing_is_claimed_after_stop() {
    let store = Arc::new(MemoryStore::new());
    let queue = JobQueue::new(Arc::clone(&store), fast_config(AllocationMode::Atomic));

    queue.start(3).unwrap();
    queue.stop().await;

    seed(&queue, 4);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(queue.pending(), 4);
    assert_eq!(queue.stats().claimed, 0);
    assert!(store.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backlog_is_left_pending_after_stop() {
    let store = Arc::new(MemoryStore::new());
    let mut config = fast_config(AllocationMode::Atomic);
    config.min_work = Duration::from_millis(30);
    config.max_work = Duration::from_millis(30);
    let queue = JobQueue::new(Arc::clone(&store), config);

    seed(&queue, 20);
    queue.start(2).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.stop().await;

    let pending_at_stop = queue.pending();
    assert!(pending_at_stop >= 16, "only {pending_at_stop} left pending");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.pending(), pending_at_stop);

    let stats = queue.stats();
    assert_eq!(stats.claimed as usize, 20 - pending_at_stop);
    assert_eq!(stats.finished(), stats.claimed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn claimed_job_finishes_after_stop_returns() {
    let store = Arc::new(MemoryStore::new());
    let config = PoolConfig {
        allocation: AllocationMode::Atomic,
        grace_period: Duration::from_millis(10),
        min_work: Duration::from_millis(150),
        max_work: Duration::from_millis(150),
        max_sticks: 9,
    };
    let queue = JobQueue::new(Arc::clone(&store), config);

    seed(&queue, 1);
    queue.start(1).unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while queue.stats().claimed == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("job should be claimed");

    queue.stop().await;
    assert_eq!(queue.stats().recorded, 0, "stop returned after the grace period");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(queue.stats().recorded, 1);
    assert_eq!(recorded_ids(&store).await, expected_ids(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enqueue_and_claim_keep_the_count() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(JobQueue::new(
        Arc::clone(&store),
        fast_config(AllocationMode::Atomic),
    ));
    queue.start(4).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                for i in 0..50 {
                    queue.enqueue(Job::new(p * 1000 + i, "concurrent"));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.stop().await;
    // Let anything claimed right before the signal finish.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = queue.stats();
    assert_eq!(stats.enqueued, 200);
    assert_eq!(queue.pending() as u64, stats.enqueued - stats.claimed);
    assert_eq!(stats.finished(), stats.claimed);
    assert_eq!(store.len().await as u64, stats.recorded);
}

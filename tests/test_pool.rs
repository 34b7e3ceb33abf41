use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use rampart::error::PoolError;
use rampart::server::pool::WorkerPool;

#[test]
fn test_jobs_are_executed() {
    let pool = WorkerPool::new(2, 16).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    for _ in 0..8 {
        let counter = Arc::clone(&counter);
        let tx = tx.clone();
        pool.execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        })
        .unwrap();
    }
    for _ in 0..8 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 8);
}

#[test]
fn test_worker_count_is_at_least_one() {
    let pool = WorkerPool::new(0, 4).unwrap();
    assert_eq!(pool.worker_count(), 1);
}

#[test]
fn test_saturated_queue_rejects_submissions() {
    let pool = WorkerPool::new(1, 1).unwrap();

    // park the single worker so queued jobs cannot drain
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    pool.execute(move || {
        started_tx.send(()).unwrap();
        release_rx.recv().ok();
    })
    .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // worker busy, queue depth 1: one submission fits, the next is rejected
    pool.execute(|| {}).unwrap();
    let rejected = pool.execute(|| {});
    assert_eq!(rejected, Err(PoolError::Saturated));

    release_tx.send(()).unwrap();
}

#[test]
fn test_panicking_job_does_not_kill_the_worker() {
    let pool = WorkerPool::new(1, 4).unwrap();
    let (tx, rx) = mpsc::channel();

    pool.execute(|| panic!("boom")).unwrap();
    pool.execute(move || {
        tx.send(()).unwrap();
    })
    .unwrap();

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_drop_joins_workers_after_draining() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = WorkerPool::new(2, 16).unwrap();
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

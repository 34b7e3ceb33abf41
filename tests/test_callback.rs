use std::sync::Arc;

use rampart::server::callback::CallbackQueue;

type Log = Vec<String>;

#[test]
fn test_callbacks_run_in_submission_order() {
    let queue: CallbackQueue<Log> = CallbackQueue::new();
    queue.submit(|log: &mut Log| log.push("first".to_string()));
    queue.submit(|log: &mut Log| log.push("second".to_string()));
    queue.submit(|log: &mut Log| log.push("third".to_string()));

    let mut log = Log::new();
    assert!(queue.drain(&mut log));
    assert_eq!(log, vec!["first", "second", "third"]);
}

#[test]
fn test_drain_reports_whether_work_was_done() {
    let queue: CallbackQueue<Log> = CallbackQueue::new();
    let mut log = Log::new();
    assert!(!queue.drain(&mut log));

    queue.submit(|_: &mut Log| {});
    assert!(queue.drain(&mut log));
    assert!(!queue.drain(&mut log));
}

#[test]
fn test_each_callback_runs_exactly_once() {
    let queue: CallbackQueue<Log> = CallbackQueue::new();
    queue.submit(|log: &mut Log| log.push("once".to_string()));

    let mut log = Log::new();
    queue.drain(&mut log);
    queue.drain(&mut log);
    queue.drain(&mut log);
    assert_eq!(log, vec!["once"]);
}

#[test]
fn test_callback_submitted_during_drain_waits_for_next_drain() {
    let queue: Arc<CallbackQueue<Log>> = Arc::new(CallbackQueue::new());

    let inner = Arc::clone(&queue);
    queue.submit(move |log: &mut Log| {
        log.push("outer".to_string());
        inner.submit(|log: &mut Log| log.push("inner".to_string()));
    });

    let mut log = Log::new();
    assert!(queue.drain(&mut log));
    assert_eq!(log, vec!["outer"]);
    assert_eq!(queue.pending(), 1);

    assert!(queue.drain(&mut log));
    assert_eq!(log, vec!["outer", "inner"]);
}

#[test]
fn test_submissions_from_other_threads_are_seen() {
    let queue: Arc<CallbackQueue<Log>> = Arc::new(CallbackQueue::new());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                queue.submit(move |log: &mut Log| log.push(format!("t{i}")));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut log = Log::new();
    assert!(queue.drain(&mut log));
    assert_eq!(log.len(), 4);
}

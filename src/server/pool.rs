use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::PoolError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded pool of worker threads for request processing.
///
/// Submissions beyond the queue depth are rejected rather than queued, so a
/// slow application can never buffer unbounded work inside the server.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize, queue_depth: usize) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded::<Job>(queue_depth.max(1));
        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let receiver: Receiver<Job> = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("rampart-worker-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // a panicking job must not take the worker down with it
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("worker job panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolError> {
        let sender = self.sender.as_ref().ok_or(PoolError::Closed)?;
        sender.try_send(Box::new(job)).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::Saturated,
            TrySendError::Disconnected(_) => PoolError::Closed,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // closing the channel lets each worker drain and exit
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

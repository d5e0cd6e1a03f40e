
//! A fixed pool of worker threads with a future-returning submit.
//!
//! Workers pull from one shared queue; task ordering across workers is
//! not guaranteed. Dropping the pool lets queued tasks run to completion,
//! while dropped futures simply discard their results.

use std::fmt;

use flume::{Receiver, Sender};

use crate::error::{Error, Result};


/// A handle to a value that a worker thread is still producing.
pub struct TaskFuture<T> {
    receiver: Receiver<T>,
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("TaskFuture")
            .field("is_ready", &self.is_ready())
            .finish()
    }
}

impl<T> TaskFuture<T> {

    /// Block until the task has completed and return its result.
    /// If the worker died before completing, for example because the
    /// task panicked, this re-raises that as an error.
    pub fn get(self) -> Result<T> {
        self.receiver.recv().map_err(|_|
            Error::invalid("a worker thread terminated before completing its task"))
    }

    /// Whether the result is available without blocking.
    pub fn is_ready(&self) -> bool {
        !self.receiver.is_empty() || self.receiver.is_disconnected()
    }
}


/// A fixed-size pool of worker threads.
pub struct ThreadPool {
    workers: threadpool::ThreadPool,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ThreadPool")
            .field("thread_count", &self.thread_count())
            .finish()
    }
}

impl ThreadPool {

    /// Create a pool with the given number of worker threads.
    pub fn new(thread_count: usize) -> Self {
        let workers = threadpool::Builder::new()
            .num_threads(thread_count.max(1))
            .thread_name("pargz chunk decoder".to_string())
            .build();

        Self { workers }
    }

    /// The number of worker threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.workers.max_count()
    }

    /// Queue a task. The returned future blocks on `get` until a worker
    /// has produced the task's return value.
    pub fn submit<T, F>(&self, task: F) -> TaskFuture<T>
        where T: Send + 'static, F: FnOnce() -> T + Send + 'static
    {
        let (sender, receiver): (Sender<T>, Receiver<T>) = flume::bounded(1);

        self.workers.execute(move || {
            // the future may have been dropped already, which is fine
            let _ = sender.send(task());
        });

        TaskFuture { receiver }
    }

    /// Wait for every queued and running task to finish.
    pub fn join(&self) {
        self.workers.join();
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    /// Submits tasks that sleep, then checks that every future delivers.
    /// Because the workers block without spinning, hardware concurrency
    /// does not limit this test.
    fn run_pool(thread_count: usize, task_count: usize) {
        let pool = ThreadPool::new(thread_count);

        let futures: Vec<TaskFuture<usize>> = (0 .. task_count)
            .map(|index| pool.submit(move || {
                std::thread::sleep(Duration::from_millis(10));
                1 << index
            }))
            .collect();

        for (index, future) in futures.into_iter().enumerate() {
            assert_eq!(future.get().unwrap(), 1 << index);
        }
    }

    #[test]
    fn all_tasks_complete() {
        run_pool(1, 1);
        run_pool(1, 2);
        run_pool(2, 1);
        run_pool(2, 6);
        run_pool(16, 17);
    }

    #[test]
    fn task_errors_travel_through_the_future() {
        let pool = ThreadPool::new(2);

        let future = pool.submit(|| -> crate::error::Result<u32> {
            Err(Error::invalid("task failed"))
        });

        assert!(future.get().unwrap().is_err());
    }

    #[test]
    fn a_panicking_task_does_not_hang_its_future() {
        let pool = ThreadPool::new(1);
        let future = pool.submit(|| -> u32 { panic!("worker went down") });
        assert!(future.get().is_err());

        // the pool replaces panicked workers and keeps accepting tasks
        let future = pool.submit(|| 42);
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn discarded_futures_do_not_block_workers() {
        let pool = ThreadPool::new(2);
        for _ in 0 .. 32 { let _ = pool.submit(|| ()); }
        pool.join();

        let future = pool.submit(|| "still alive");
        assert_eq!(future.get().unwrap(), "still alive");
    }
}

//! Bounded worker pool.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::observability::metrics;
use crate::pool::Threading;
use crate::subsystem::{Job, ThreadPool};

/// State shared between the pool handle and its workers.
struct Shared {
    queue: Mutex<VecDeque<Job>>,
    job_ready: Condvar,
    accepting: AtomicBool,
    active: AtomicUsize,
}

impl Shared {
    /// Close the queue and wake every idle worker.
    fn close(&self) {
        {
            let _queue = self.queue.lock();
            self.accepting.store(false, Ordering::SeqCst);
        }
        self.job_ready.notify_all();
    }

    /// Wait for the next job. `None` once closed and drained.
    fn next_job(&self) -> Option<Job> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(job) = queue.pop_front() {
                self.active.fetch_add(1, Ordering::SeqCst);
                return Some(job);
            }
            if !self.accepting.load(Ordering::SeqCst) {
                return None;
            }
            self.job_ready.wait(&mut queue);
        }
    }

    fn try_next_job(&self) -> Option<Job> {
        let mut queue = self.queue.lock();
        let job = queue.pop_front()?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Some(job)
    }

    fn run(&self, pool: &str, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(pool = pool, "Job panicked");
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fixed-size pool of named threads pulling from one queue.
///
/// In [`Threading::Single`] no threads are spawned; queued jobs run when
/// the owner calls [`ThreadPool::pump`].
pub struct WorkerPool {
    name: String,
    threads: usize,
    threading: Threading,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool of `threads` workers (at least one) named `name-N`.
    pub fn new(threads: usize, name: &str, threading: Threading) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            job_ready: Condvar::new(),
            accepting: AtomicBool::new(true),
            active: AtomicUsize::new(0),
        });

        let mut workers = Vec::new();
        if !threading.is_cooperative() {
            for idx in 0..threads {
                let worker_shared = Arc::clone(&shared);
                let pool = name.to_string();
                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", name, idx))
                    .spawn(move || worker_loop(&pool, &worker_shared));

                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        shared.close();
                        for handle in workers {
                            let _ = handle.join();
                        }
                        return Err(e);
                    }
                }
            }
        }

        tracing::info!(pool = name, threads, threading = ?threading, "Thread pool started");

        Ok(Self {
            name: name.to_string(),
            threads,
            threading,
            shared,
            workers: Mutex::new(workers),
        })
    }
}

fn worker_loop(pool: &str, shared: &Shared) {
    while let Some(job) = shared.next_job() {
        shared.run(pool, job);
    }
    tracing::trace!(pool = pool, "Worker exiting");
}

impl ThreadPool for WorkerPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn threads(&self) -> usize {
        self.threads
    }

    fn submit(&self, job: Job) -> bool {
        {
            let mut queue = self.shared.queue.lock();
            if !self.shared.accepting.load(Ordering::SeqCst) {
                drop(queue);
                tracing::debug!(pool = %self.name, "Rejecting job, pool stopped");
                metrics::record_job_rejected(&self.name);
                return false;
            }
            queue.push_back(job);
        }
        self.shared.job_ready.notify_one();
        metrics::record_job_submitted(&self.name);
        true
    }

    fn stop(&self) {
        self.shared.close();
        tracing::info!(pool = %self.name, queued = self.queued(), "Thread pool stopped");
    }

    fn join(&self) {
        if self.threading.is_cooperative() {
            let drained = self.pump();
            tracing::debug!(pool = %self.name, drained, "Cooperative pool drained");
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!(pool = %self.name, "Worker thread panicked");
            }
        }
        tracing::info!(pool = %self.name, "Thread pool joined");
    }

    fn pump(&self) -> usize {
        if !self.threading.is_cooperative() {
            return 0;
        }

        // Jobs queued by the jobs we run wait for the next pump.
        let budget = self.queued();
        let mut ran = 0;
        while ran < budget {
            let Some(job) = self.shared.try_next_job() else {
                break;
            };
            self.shared.run(&self.name, job);
            ran += 1;
        }
        ran
    }

    fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    fn active(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Idle workers exit on their own; a dropped pool never blocks.
        self.shared.close();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("threading", &self.threading)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn sixth_job_queues_behind_five_blocked_workers() {
        let pool = WorkerPool::new(5, "saturate", Threading::Multi).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicBool::new(false));

        for _ in 0..6 {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            assert!(pool.submit(Box::new(move || {
                started.fetch_add(1, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            })));
        }

        assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::SeqCst) == 5));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(started.load(Ordering::SeqCst), 5);
        assert_eq!(pool.active(), 5);
        assert_eq!(pool.queued(), 1);

        release.store(true, Ordering::SeqCst);
        pool.stop();
        pool.join();
        assert_eq!(started.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn stopped_pool_rejects_jobs_but_drains_queue() {
        let pool = WorkerPool::new(1, "drain", Threading::Multi).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop();
        assert!(!pool.submit(Box::new(|| {})));

        pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, "panics", Threading::Multi).unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        pool.submit(Box::new(|| panic!("boom")));
        let flag = Arc::clone(&ran);
        pool.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));

        pool.stop();
        pool.join();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cooperative_pool_runs_only_when_pumped() {
        let pool = WorkerPool::new(4, "coop", Threading::Single).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert_eq!(pool.pump(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(pool.pump(), 0);
    }

    #[test]
    fn zero_threads_rounds_up_to_one() {
        let pool = WorkerPool::new(0, "tiny", Threading::Multi).unwrap();
        assert_eq!(pool.threads(), 1);
        pool.stop();
        pool.join();
    }
}

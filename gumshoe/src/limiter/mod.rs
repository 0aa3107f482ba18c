//! Bounded-concurrency task admission.
//!
//! A [`ConcurrencyLimiter`] runs at most `capacity` submitted tasks at once.
//! Tasks wait in a FIFO queue and the oldest one is admitted as soon as a
//! running task finishes. There is no priority, preemption, cancellation or
//! timeout: an admitted task always runs to its own completion or failure.
//! Dropping a [`TaskHandle`] detaches the task, it does not cancel it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{trace, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors returned when awaiting a limited task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// The task panicked or was dropped by a shutting-down runtime.
    #[error("limited task '{0}' ended without producing a result")]
    TaskAborted(String),
}

struct Inner {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    /// Submission queue, created with its dispatcher on first use.
    queue: OnceLock<mpsc::UnboundedSender<Job>>,
}

impl Inner {
    fn queue(&self) -> &mpsc::UnboundedSender<Job> {
        self.queue.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(dispatch(
                self.name.clone(),
                self.semaphore.clone(),
                self.queued.clone(),
                rx,
            ));
            tx
        })
    }
}

/// Admit queued jobs in submission order, one permit each. Ends once every
/// limiter clone is dropped and the queue is drained.
async fn dispatch(
    name: String,
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        queued.fetch_sub(1, Ordering::SeqCst);
        trace!(limiter = %name, available = semaphore.available_permits(), "task admitted");

        // The permit is released when the task ends, including by panic
        tokio::spawn(async move {
            let _permit = permit;
            job.await;
        });
    }
    trace!(limiter = %name, "dispatcher stopped");
}

/// FIFO bounded-concurrency pool.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

impl ConcurrencyLimiter {
    /// Create a limiter. A capacity of zero is raised to one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                capacity,
                semaphore: Arc::new(Semaphore::new(capacity)),
                queued: Arc::new(AtomicUsize::new(0)),
                queue: OnceLock::new(),
            }),
        }
    }

    /// Queue a task. It starts once every earlier task has been admitted and a
    /// slot is free.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = task.await;
            // Receiver may have been dropped (detached task)
            let _ = tx.send(output);
        });

        let queued = self.inner.queued.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(limiter = %self.inner.name, active = self.active(), queued, "task submitted");

        if self.inner.queue().send(job).is_err() {
            // Dispatcher gone with its runtime; the handle reports TaskAborted
            self.inner.queued.fetch_sub(1, Ordering::SeqCst);
            warn!(limiter = %self.inner.name, "Limiter dispatcher stopped; dropping task");
        }

        TaskHandle {
            name: self.inner.name.clone(),
            rx,
        }
    }

    /// Submit a task and wait for its output.
    pub async fn run<F, T>(&self, task: F) -> Result<T, LimiterError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task).await
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of tasks currently running.
    pub fn active(&self) -> usize {
        self.inner.capacity - self.inner.semaphore.available_permits()
    }

    /// Number of tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("active", &self.active())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Output of a submitted task.
pub struct TaskHandle<T> {
    name: String,
    rx: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, LimiterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let name = self.name.clone();
        Pin::new(&mut self.rx)
            .poll(cx)
            .map_err(|_| LimiterError::TaskAborted(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limiter_never_exceeds_capacity() {
        let limiter = ConcurrencyLimiter::new("catalog", 10);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..25)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                limiter.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            futures::future::join_all(handles),
        )
        .await
        .expect("all tasks should complete");

        let outputs: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(outputs, (0..25).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 10);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn test_limiter_admits_in_fifo_order() {
        let limiter = ConcurrencyLimiter::new("email", 1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = order.clone();
                limiter.submit(async move {
                    tokio::task::yield_now().await;
                    order.lock().push(i);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_limiter_frees_slot_after_panic() {
        let limiter = ConcurrencyLimiter::new("email", 1);

        let failed = limiter.submit(async {
            panic!("send exploded");
        });
        let next = limiter.submit(async { 42 });

        assert!(matches!(failed.await, Err(LimiterError::TaskAborted(_))));
        assert_eq!(next.await.unwrap(), 42);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_detached_task_still_runs() {
        let limiter = ConcurrencyLimiter::new("email", 1);
        let done = Arc::new(AtomicUsize::new(0));

        let counter = done.clone();
        drop(limiter.submit(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        limiter.run(async {}).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let limiter = ConcurrencyLimiter::new("zero", 0);
        assert_eq!(limiter.capacity(), 1);
    }
}

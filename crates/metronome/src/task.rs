// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type BlockingFn = dyn Fn() + Send + Sync;
type AsyncFn = dyn Fn() -> BoxedFuture + Send + Sync;

/// The user callback dispatched on every firing.
///
/// A task is either a plain function, which runs on Tokio's blocking thread pool, or a
/// function returning a future, which is spawned as a Tokio task. Cloning a task is inexpensive.
///
/// Failures inside the callback are the callback's own business: a panicking run is contained
/// by the runtime and does not affect later dispatches.
///
/// # Examples
///
/// ```
/// use metronome::Task;
///
/// let blocking = Task::from_fn(|| println!("tick"));
/// let non_blocking = Task::from_async(|| async { println!("tock") });
/// ```
#[derive(Clone)]
pub struct Task(TaskKind);

#[derive(Clone)]
enum TaskKind {
    Blocking(Arc<BlockingFn>),
    Async(Arc<AsyncFn>),
}

impl Task {
    /// Creates a task from a synchronous callback. Each run gets its own blocking thread.
    #[must_use]
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(TaskKind::Blocking(Arc::new(callback)))
    }

    /// Creates a task from a callback that returns a future. Each run is a separate Tokio task.
    #[must_use]
    pub fn from_async<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(TaskKind::Async(Arc::new(move || -> BoxedFuture { Box::pin(callback()) })))
    }

    fn spawn<G>(&self, handle: &Handle, guard: G)
    where
        G: Send + 'static,
    {
        match &self.0 {
            TaskKind::Blocking(callback) => {
                let callback = Arc::clone(callback);
                drop(handle.spawn_blocking(move || {
                    let _guard = guard;
                    callback();
                }));
            }
            TaskKind::Async(callback) => {
                let callback = Arc::clone(callback);
                drop(handle.spawn(async move {
                    let _guard = guard;
                    callback().await;
                }));
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TaskKind::Blocking(_) => f.write_str("Task::Blocking"),
            TaskKind::Async(_) => f.write_str("Task::Async"),
        }
    }
}

/// Decides whether a firing actually runs the task.
///
/// Every firing is routed through the same guard around the task. The policy is that
/// guard's contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum DispatchPolicy {
    /// Runs the task on every firing. Runs may overlap when the task is slower than the interval.
    #[default]
    EveryFiring,

    /// Runs the task on a firing only when no earlier run is still in flight. Overlapping
    /// dispatches collapse into the run that is already executing.
    SkipWhileRunning,

    /// Runs the task on the first dispatched firing only. Later firings are ignored.
    AtMostOnce,
}

/// Routes firings to the task according to the dispatch policy and the optional
/// concurrency bound.
#[derive(Debug)]
pub(crate) struct TaskGuard {
    task: Task,
    policy: DispatchPolicy,
    running: Arc<AtomicBool>,
    fired: AtomicBool,
    permits: Option<Arc<Semaphore>>,
}

/// Clears the running flag when a run finishes, including by panic.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TaskGuard {
    pub(crate) fn new(task: Task, policy: DispatchPolicy, max_concurrent: Option<usize>) -> Self {
        Self {
            task,
            policy,
            running: Arc::new(AtomicBool::new(false)),
            fired: AtomicBool::new(false),
            permits: max_concurrent.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    /// Dispatches one run of the task without waiting for it. Returns `false` when the run
    /// was skipped.
    pub(crate) fn trigger(&self, handle: &Handle) -> bool {
        let permit = match self.acquire_permit() {
            Ok(permit) => permit,
            Err(()) => {
                tracing::debug!("skipping dispatch, concurrency limit reached");
                return false;
            }
        };

        match self.policy {
            DispatchPolicy::EveryFiring => {
                self.task.spawn(handle, permit);
            }
            DispatchPolicy::SkipWhileRunning => {
                if self
                    .running
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    tracing::debug!("skipping dispatch, previous run still in flight");
                    return false;
                }
                self.task.spawn(handle, (permit, RunningFlag(Arc::clone(&self.running))));
            }
            DispatchPolicy::AtMostOnce => {
                if self.fired.swap(true, Ordering::AcqRel) {
                    tracing::debug!("skipping dispatch, task already ran once");
                    return false;
                }
                self.task.spawn(handle, permit);
            }
        }

        true
    }

    fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>, ()> {
        match &self.permits {
            None => Ok(None),
            Some(permits) => Arc::clone(permits).try_acquire_owned().map(Some).map_err(drop),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Task::from_async(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    /// A task that counts its starts and then blocks until released.
    fn gated_task(started: &Arc<AtomicUsize>, gate: &Arc<Notify>) -> Task {
        let started = Arc::clone(started);
        let gate = Arc::clone(gate);
        Task::from_async(move || {
            let started = Arc::clone(&started);
            let gate = Arc::clone(&gate);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
            }
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Task: Send, Sync, Clone);
        static_assertions::assert_impl_all!(DispatchPolicy: Send, Sync, Copy);
        static_assertions::assert_impl_all!(TaskGuard: Send, Sync);
    }

    #[test]
    fn default_policy_runs_every_firing() {
        assert_eq!(DispatchPolicy::default(), DispatchPolicy::EveryFiring);
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", Task::from_fn(|| {})), "Task::Blocking");
        assert_eq!(format!("{:?}", Task::from_async(|| async {})), "Task::Async");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn policy_uses_snake_case_names() {
        let policy: DispatchPolicy = serde_json::from_str(r#""skip_while_running""#).unwrap();

        assert_eq!(policy, DispatchPolicy::SkipWhileRunning);
        assert_eq!(serde_json::to_string(&DispatchPolicy::AtMostOnce).unwrap(), r#""at_most_once""#);
    }

    #[tokio::test]
    async fn every_firing_runs_each_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = TaskGuard::new(counting_task(&counter), DispatchPolicy::EveryFiring, None);
        let handle = Handle::current();

        for _ in 0..3 {
            assert!(guard.trigger(&handle));
        }
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn at_most_once_runs_a_single_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = TaskGuard::new(counting_task(&counter), DispatchPolicy::AtMostOnce, None);
        let handle = Handle::current();

        assert!(guard.trigger(&handle));
        assert!(!guard.trigger(&handle));
        settle().await;
        assert!(!guard.trigger(&handle));
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_while_running_collapses_overlaps() {
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let guard = TaskGuard::new(gated_task(&started, &gate), DispatchPolicy::SkipWhileRunning, None);
        let handle = Handle::current();

        assert!(guard.trigger(&handle));
        settle().await;
        assert!(!guard.trigger(&handle));
        assert!(!guard.trigger(&handle));
        assert_eq!(started.load(Ordering::SeqCst), 1);

        gate.notify_one();
        settle().await;

        assert!(guard.trigger(&handle));
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        gate.notify_one();
    }

    #[tokio::test]
    async fn concurrency_limit_skips_excess_runs() {
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let guard = TaskGuard::new(gated_task(&started, &gate), DispatchPolicy::EveryFiring, Some(2));
        let handle = Handle::current();

        assert!(guard.trigger(&handle));
        assert!(guard.trigger(&handle));
        assert!(!guard.trigger(&handle));
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        gate.notify_waiters();
        settle().await;

        assert!(guard.trigger(&handle));
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 3);
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn async_callback_is_called_inside_the_spawned_run() {
        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = Arc::clone(&called);
        let task = Task::from_async(move || {
            // Synchronous work before the future is built.
            called_clone.fetch_add(1, Ordering::SeqCst);
            async {}
        });
        let guard = TaskGuard::new(task, DispatchPolicy::EveryFiring, None);

        assert!(guard.trigger(&Handle::current()));
        assert_eq!(called.load(Ordering::SeqCst), 0);

        settle().await;
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_task_runs_off_the_runtime() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let task = Task::from_fn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        let guard = TaskGuard::new(task, DispatchPolicy::EveryFiring, None);

        assert!(guard.trigger(&Handle::current()));

        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

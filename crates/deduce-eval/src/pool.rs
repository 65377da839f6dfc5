//! Counting fork-join task pool.
//!
//! Tasks may spawn further tasks. The pool counts tasks that have been
//! submitted but not yet finished; [`TaskPool::block_until_finished`] returns
//! once that count drops to zero. The first failing task's error is kept and
//! reported after quiescence; the remaining tasks still run.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::config::EvalConfig;
use crate::error::{EvalError, SetupError};

/// A unit of work. It receives a [`Spawner`] for submitting follow-up tasks.
pub type Task = Box<dyn FnOnce(&Spawner) -> Result<(), EvalError> + Send + 'static>;

enum Message {
    Run(Task),
    Shutdown,
}

enum Queue {
    /// Tasks run on the thread that blocks on the pool.
    Inline(Mutex<VecDeque<Task>>),
    Workers(Sender<Message>),
}

struct Shared {
    queue: Queue,
    outstanding: Mutex<usize>,
    quiescent: Condvar,
    failure: Mutex<Option<EvalError>>,
}

impl Shared {
    fn record_failure(&self, err: EvalError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            debug!("task failed: {err}");
            *failure = Some(err);
        } else {
            trace!("ignoring later task failure: {err}");
        }
    }

    fn finish_one(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.quiescent.notify_all();
        }
    }
}

fn run_task(shared: &Arc<Shared>, task: Task) {
    let spawner = Spawner {
        shared: Arc::clone(shared),
    };
    let result = match panic::catch_unwind(AssertUnwindSafe(|| task(&spawner))) {
        Ok(result) => result,
        Err(payload) => Err(EvalError::Panicked(panic_message(payload.as_ref()))),
    };
    if let Err(err) = result {
        shared.record_failure(err);
    }
    shared.finish_one();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle for submitting tasks to a pool. Cheap to clone.
#[derive(Clone)]
pub struct Spawner {
    shared: Arc<Shared>,
}

impl Spawner {
    /// Submit a task. The outstanding count is raised before the task is
    /// queued, so a parent's children are always accounted for before the
    /// parent finishes.
    pub fn spawn(&self, task: Task) {
        *self.shared.outstanding.lock() += 1;
        match &self.shared.queue {
            Queue::Inline(queue) => queue.lock().push_back(task),
            Queue::Workers(sender) => {
                if sender.send(Message::Run(task)).is_err() {
                    self.shared
                        .record_failure(EvalError::Panicked("task pool is shut down".to_string()));
                    self.shared.finish_one();
                }
            }
        }
    }

    /// Submit a closure as a task.
    pub fn spawn_fn<F>(&self, f: F)
    where
        F: FnOnce(&Spawner) -> Result<(), EvalError> + Send + 'static,
    {
        self.spawn(Box::new(f));
    }
}

/// Worker pool, or an inline queue drained by the blocking caller.
pub struct TaskPool {
    spawner: Spawner,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// The pool described by `config`: inline when sequential, otherwise
    /// `config.parallelism` worker threads.
    pub fn new(config: &EvalConfig) -> Result<Self, SetupError> {
        if config.sequential {
            Ok(Self::inline())
        } else {
            Self::with_threads(config.parallelism.max(1))
                .map_err(|e| SetupError::WorkerStart(e.to_string()))
        }
    }

    /// A pool that runs every task on the thread calling
    /// [`TaskPool::block_until_finished`].
    pub fn inline() -> Self {
        Self {
            spawner: Spawner {
                shared: Arc::new(Shared {
                    queue: Queue::Inline(Mutex::new(VecDeque::new())),
                    outstanding: Mutex::new(0),
                    quiescent: Condvar::new(),
                    failure: Mutex::new(None),
                }),
            },
            workers: Vec::new(),
        }
    }

    pub fn with_threads(threads: usize) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            queue: Queue::Workers(sender),
            outstanding: Mutex::new(0),
            quiescent: Condvar::new(),
            failure: Mutex::new(None),
        });
        let mut pool = Self {
            spawner: Spawner {
                shared: Arc::clone(&shared),
            },
            workers: Vec::with_capacity(threads),
        };
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let receiver: Receiver<Message> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("deduce-worker-{i}"))
                .spawn(move || {
                    while let Ok(Message::Run(task)) = receiver.recv() {
                        run_task(&shared, task);
                    }
                })?;
            pool.workers.push(handle);
        }
        debug!("started task pool with {threads} workers");
        Ok(pool)
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    /// Submit a task from outside the pool.
    pub fn spawn(&self, task: Task) {
        self.spawner.spawn(task);
    }

    pub fn spawn_fn<F>(&self, f: F)
    where
        F: FnOnce(&Spawner) -> Result<(), EvalError> + Send + 'static,
    {
        self.spawner.spawn_fn(f);
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self.spawner.shared.queue, Queue::Inline(_))
    }

    /// Wait until every submitted task, and every task they spawned, has run.
    pub fn block_until_finished(&self) {
        let shared = &self.spawner.shared;
        if let Queue::Inline(queue) = &shared.queue {
            loop {
                let next = queue.lock().pop_front();
                match next {
                    Some(task) => run_task(shared, task),
                    None => break,
                }
            }
        }
        let mut outstanding = shared.outstanding.lock();
        while *outstanding > 0 {
            shared.quiescent.wait(&mut outstanding);
        }
    }

    pub fn has_failed(&self) -> bool {
        self.spawner.shared.failure.lock().is_some()
    }

    /// The first recorded failure, if any.
    pub fn failure_cause(&self) -> Option<EvalError> {
        self.spawner.shared.failure.lock().clone()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if let Queue::Workers(sender) = &self.spawner.shared.queue {
            for _ in &self.workers {
                let _ = sender.send(Message::Shutdown);
            }
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pools() -> Vec<TaskPool> {
        vec![TaskPool::inline(), TaskPool::with_threads(4).unwrap()]
    }

    /// Each task spawns `fanout` children until `depth` reaches zero.
    fn tree(spawner: &Spawner, depth: u32, fanout: u32, count: Arc<AtomicUsize>) {
        count.fetch_add(1, Ordering::SeqCst);
        if depth == 0 {
            return;
        }
        for _ in 0..fanout {
            let count = Arc::clone(&count);
            spawner.spawn_fn(move |sp| {
                tree(sp, depth - 1, fanout, count);
                Ok(())
            });
        }
    }

    #[test]
    fn test_quiescence_with_recursive_fanout() {
        for pool in pools() {
            let count = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&count);
            pool.spawn_fn(move |sp| {
                tree(sp, 5, 3, c);
                Ok(())
            });
            pool.block_until_finished();
            // 1 + 3 + 9 + 27 + 81 + 243
            assert_eq!(count.load(Ordering::SeqCst), 364);
            assert!(!pool.has_failed());
        }
    }

    #[test]
    fn test_first_failure_wins_and_others_still_run() {
        for pool in pools() {
            let ran = Arc::new(AtomicUsize::new(0));
            let r = Arc::clone(&ran);
            pool.spawn_fn(move |sp| {
                for i in 0..10 {
                    let r = Arc::clone(&r);
                    sp.spawn_fn(move |_| {
                        r.fetch_add(1, Ordering::SeqCst);
                        if i == 3 {
                            return Err(EvalError::UnknownFunction("f".to_string()));
                        }
                        Ok(())
                    });
                }
                Err(EvalError::UnknownFunction("first".to_string()))
            });
            pool.block_until_finished();
            assert_eq!(ran.load(Ordering::SeqCst), 10);
            assert!(pool.has_failed());
            let Some(EvalError::UnknownFunction(name)) = pool.failure_cause() else {
                panic!("expected a recorded failure");
            };
            if pool.is_sequential() {
                assert_eq!(name, "first");
            } else {
                assert!(name == "first" || name == "f");
            }
        }
    }

    #[test]
    fn test_panic_becomes_failure() {
        for pool in pools() {
            pool.spawn_fn(|_| panic!("boom"));
            pool.spawn_fn(|_| Ok(()));
            pool.block_until_finished();
            assert!(matches!(
                pool.failure_cause(),
                Some(EvalError::Panicked(msg)) if msg == "boom"
            ));
        }
    }

    #[test]
    fn test_pool_is_reusable_across_barriers() {
        let pool = TaskPool::with_threads(2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            for _ in 0..50 {
                let c = Arc::clone(&count);
                pool.spawn_fn(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            pool.block_until_finished();
        }
        assert_eq!(count.load(Ordering::SeqCst), 150);
    }

    #[test]
    fn test_block_on_idle_pool_returns() {
        for pool in pools() {
            pool.block_until_finished();
        }
        assert!(TaskPool::new(&EvalConfig::sequential()).unwrap().is_sequential());
    }
}

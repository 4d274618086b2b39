//! Task launcher: marshals control-thread requests onto the audio thread.
//!
//! One-shot tasks are queued lock-free and drained on every `run`; cyclic
//! tasks are launched on every `run` until removed. `run` is called once per
//! tick by whoever owns the target context, so a batch of requests crosses
//! the thread boundary once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;

/// A unit of work launched against a context of type `C`.
pub trait Task<C>: Send {
    fn launch(&mut self, ctx: &mut C);
}

impl<C, F: FnMut(&mut C) + Send> Task<C> for F {
    fn launch(&mut self, ctx: &mut C) {
        self(ctx)
    }
}

/// Handle to a registered cyclic task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CyclicId(u64);

type Completion = Arc<(Mutex<bool>, Condvar)>;

/// Wraps a task so the caller of `sync_run` is woken once it has launched.
struct Signalled<C> {
    task: Box<dyn Task<C>>,
    completion: Completion,
}

impl<C> Task<C> for Signalled<C> {
    fn launch(&mut self, ctx: &mut C) {
        self.task.launch(ctx);
        let (done, cvar) = &*self.completion;
        *done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}

/// Queue of one-shot and cyclic tasks for one execution context.
pub struct TaskLauncher<C> {
    oneshot: SegQueue<Box<dyn Task<C>>>,
    cyclic: Mutex<Vec<(CyclicId, Box<dyn Task<C>>)>>,
    removed: Mutex<Vec<CyclicId>>,
    next_id: AtomicU64,
}

impl<C: 'static> Default for TaskLauncher<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: 'static> TaskLauncher<C> {
    pub fn new() -> Self {
        Self {
            oneshot: SegQueue::new(),
            cyclic: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue a task to launch once on the next `run`.
    pub fn add_task(&self, task: impl Task<C> + 'static) {
        self.oneshot.push(Box::new(task));
    }

    /// Register a task to launch on every `run`.
    pub fn add_cyclic_task(&self, task: impl Task<C> + 'static) -> CyclicId {
        let id = CyclicId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.cyclic).push((id, Box::new(task)));
        id
    }

    /// Unregister a cyclic task. Takes effect before the next launch.
    pub fn remove_cyclic_task(&self, id: CyclicId) {
        lock(&self.removed).push(id);
    }

    pub fn pending(&self) -> usize {
        self.oneshot.len()
    }

    pub fn cyclic_count(&self) -> usize {
        lock(&self.cyclic).len()
    }

    /// Launch the one-shots queued before this call, then every cyclic task.
    ///
    /// Tasks may queue further tasks while running. Anything queued during
    /// the call, one-shot or cyclic, first launches on the next one, so a task
    /// that re-queues itself cannot stall the caller.
    pub fn run(&self, ctx: &mut C) {
        for _ in 0..self.oneshot.len() {
            let Some(mut task) = self.oneshot.pop() else {
                break;
            };
            task.launch(ctx);
        }

        self.apply_removals();
        let mut tasks = core::mem::take(&mut *lock(&self.cyclic));
        for (_, task) in tasks.iter_mut() {
            task.launch(ctx);
        }
        let mut cyclic = lock(&self.cyclic);
        tasks.append(&mut cyclic);
        *cyclic = tasks;
        drop(cyclic);
        self.apply_removals();
    }

    fn apply_removals(&self) {
        let removed = core::mem::take(&mut *lock(&self.removed));
        if !removed.is_empty() {
            lock(&self.cyclic).retain(|(id, _)| !removed.contains(id));
        }
    }

    /// Queue a task and block until a `run` has launched it.
    pub fn sync_run(&self, task: impl Task<C> + 'static) {
        let completion = self.queue_signalled(task);
        let (done, cvar) = &*completion;
        let mut finished = lock(done);
        while !*finished {
            finished = cvar.wait(finished).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`sync_run`](Self::sync_run) but gives up after `timeout`.
    ///
    /// Returns whether the task launched in time. A task that timed out stays
    /// queued and still launches on a later `run`.
    pub fn sync_run_timeout(&self, task: impl Task<C> + 'static, timeout: Duration) -> bool {
        let completion = self.queue_signalled(task);
        let deadline = Instant::now() + timeout;
        let (done, cvar) = &*completion;
        let mut finished = lock(done);
        while !*finished {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            finished = cvar
                .wait_timeout(finished, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn queue_signalled(&self, task: impl Task<C> + 'static) -> Completion {
        let completion: Completion = Arc::new((Mutex::new(false), Condvar::new()));
        self.oneshot.push(Box::new(Signalled {
            task: Box::new(task),
            completion: completion.clone(),
        }));
        completion
    }
}

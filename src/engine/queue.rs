//! Serial task queues used as the engine's worker and notification contexts.

use log::{debug, error};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex, MutexGuard};
use std::thread;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Proof that the current code runs inside a task of a specific queue.
///
/// Only the queue hands these out, so holding one for queue `q` means nested
/// work for `q` can run inline instead of being re-enqueued.
#[derive(Debug)]
pub struct QueueToken {
    queue_id: u64,
}

pub type Task = Box<dyn FnOnce(&QueueToken) + Send + 'static>;

enum Backend {
    Thread(Mutex<mpsc::Sender<Task>>),
    Manual(Mutex<VecDeque<Task>>),
}

/// Runs tasks one at a time, in arrival order.
///
/// A threaded queue owns a dedicated thread that exits once the queue is
/// dropped and the backlog is drained. A manual queue only runs tasks when
/// [`run_pending`](Self::run_pending) is called, which keeps tests
/// deterministic and single-threaded.
pub struct TaskQueue {
    id: u64,
    label: String,
    backend: Backend,
}

impl TaskQueue {
    pub fn spawn(label: &str) -> std::io::Result<Self> {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel::<Task>();
        thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                let token = QueueToken { queue_id: id };
                while let Ok(task) = receiver.recv() {
                    task(&token);
                }
            })?;
        debug!("spawned task queue {} ({})", label, id);
        Ok(Self {
            id,
            label: label.to_string(),
            backend: Backend::Thread(Mutex::new(sender)),
        })
    }

    pub fn manual(label: &str) -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            label: label.to_string(),
            backend: Backend::Manual(Mutex::new(VecDeque::new())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether `token` was issued by this queue.
    pub fn owns(&self, token: Option<&QueueToken>) -> bool {
        token.is_some_and(|t| t.queue_id == self.id)
    }

    /// Run `task` inline when `token` proves we are already on this queue,
    /// otherwise enqueue it behind earlier tasks.
    pub fn dispatch<F>(&self, token: Option<&QueueToken>, task: F)
    where
        F: FnOnce(&QueueToken) + Send + 'static,
    {
        match token {
            Some(token) if token.queue_id == self.id => task(token),
            _ => self.enqueue(Box::new(task)),
        }
    }

    pub fn enqueue(&self, task: Task) {
        match &self.backend {
            Backend::Thread(sender) => {
                if lock(sender).send(task).is_err() {
                    error!("task queue {} has stopped; task dropped", self.label);
                }
            }
            Backend::Manual(pending) => lock(pending).push_back(task),
        }
    }

    /// Drain a manual queue, including tasks enqueued while draining.
    /// Returns the number of tasks run; always zero for threaded queues.
    pub fn run_pending(&self) -> usize {
        let Backend::Manual(pending) = &self.backend else {
            return 0;
        };
        let token = QueueToken { queue_id: self.id };
        let mut ran = 0;
        loop {
            // lock released before running so tasks can enqueue more work
            let next = lock(pending).pop_front();
            match next {
                Some(task) => {
                    task(&token);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending(&self) -> usize {
        match &self.backend {
            Backend::Thread(_) => 0,
            Backend::Manual(pending) => lock(pending).len(),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn manual_queue_runs_in_arrival_order() {
        let queue = TaskQueue::manual("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue.dispatch(None, move |_| log.lock().unwrap().push(i));
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(queue.pending(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn nested_dispatch_with_own_token_runs_inline() {
        let queue = Arc::new(TaskQueue::manual("test"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let (inner_queue, inner_log) = (queue.clone(), log.clone());
        queue.dispatch(None, move |token| {
            inner_log.lock().unwrap().push("outer-start");
            let nested_log = inner_log.clone();
            inner_queue.dispatch(Some(token), move |_| nested_log.lock().unwrap().push("nested"));
            inner_log.lock().unwrap().push("outer-end");
        });
        queue.run_pending();
        assert_eq!(*log.lock().unwrap(), vec!["outer-start", "nested", "outer-end"]);
    }

    #[test]
    fn foreign_token_enqueues() {
        let a = Arc::new(TaskQueue::manual("a"));
        let b = Arc::new(TaskQueue::manual("b"));
        let b_inner = b.clone();
        a.dispatch(None, move |token| {
            assert!(!b_inner.owns(Some(token)));
            b_inner.dispatch(Some(token), |_| {});
        });
        a.run_pending();
        assert_eq!(b.pending(), 1);
        assert_eq!(b.run_pending(), 1);
    }

    #[test]
    fn threaded_queue_runs_tasks_in_order() {
        let queue = TaskQueue::spawn("test-worker").unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            queue.dispatch(None, move |_| tx.send(i).unwrap());
        }
        let received: Vec<i32> = (0..5).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }
}

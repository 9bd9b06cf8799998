#[cfg(not(feature = "loom"))]
mod loom {
    pub use std::sync;
}

#[cfg(feature = "loom")]
use loom;

mod hazard;
pub mod queue;
pub mod harness;

use std::fmt;
use per_thread_object::ThreadLocal;

pub use hazard::Handle;
pub use queue::MsQueue;


/// Unbounded lock-free FIFO queue.
///
/// Same algorithm as [`MsQueue`], but each thread's hazard handle is
/// registered on first use and cached, so no context is passed around.
pub struct Queue<T> {
    queue: MsQueue<T>,
    context: ThreadLocal<Handle>
}

impl<T> Queue<T> {
    pub fn new() -> Queue<T> {
        Queue {
            queue: MsQueue::new(),
            context: ThreadLocal::new()
        }
    }

    pub fn enqueue(&self, val: T) {
        let ctx = self.context.get_or(|| self.queue.register());
        self.queue.enqueue(ctx, val);
    }

    pub fn dequeue(&self) -> Option<T> {
        let ctx = self.context.get_or(|| self.queue.register());
        self.queue.dequeue(ctx)
    }

    /// Snapshot of the "head has no successor" condition.
    pub fn is_empty(&self) -> bool {
        let ctx = self.context.get_or(|| self.queue.register());
        self.queue.is_empty(ctx)
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Queue<T> {
        Queue::new()
    }
}

impl<T> Extend<T> for Queue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for val in iter {
            self.enqueue(val);
        }
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Queue { .. }")
    }
}

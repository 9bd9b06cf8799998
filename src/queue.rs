//! Michael-Scott queue implemention

use std::ptr;
use std::mem::MaybeUninit;
use std::marker::PhantomData;
use cache_padded::CachePadded;
use crate::hazard::{ Domain, Handle };
use crate::loom::sync::atomic::{ AtomicPtr, Ordering };


const HP_FIRST: usize = 0;
const HP_NEXT: usize = 1;
const HP_LAST: usize = 0;

/// Unbounded lock-free MPMC queue.
///
/// `head` always points at a sentinel whose successor holds the front
/// element. `tail` points at the last node or lags one link behind it.
pub struct MsQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    domain: Domain,
    _phantom: PhantomData<Box<Node<T>>>
}

struct Node<T> {
    // uninit in the sentinel, and moved out by the dequeue that makes
    // this node the sentinel
    value: MaybeUninit<T>,
    next: AtomicPtr<Node<T>>
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> MsQueue<T> {
    pub fn new() -> MsQueue<T> {
        let sentinel = Box::into_raw(Box::new(Node::sentinel()));

        MsQueue {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            domain: Domain::new(),
            _phantom: PhantomData
        }
    }

    /// Register the calling thread.
    ///
    /// Each thread should keep using the handle it registered. A handle
    /// belongs to exactly one queue, and its hazard record stays allocated
    /// until the queue is dropped, so registering once per operation grows
    /// memory and scan cost without bound.
    pub fn register(&self) -> Handle {
        self.domain.register()
    }

    #[cfg(test)]
    pub(crate) fn handles(&self) -> usize {
        self.domain.registered()
    }

    pub fn enqueue(&self, handle: &Handle, val: T) {
        self.check(handle);

        let node = Box::into_raw(Box::new(Node::new(val)));

        loop {
            let last = handle.protect(HP_LAST, &self.tail);
            let next = unsafe { (*last).next.load(Ordering::Acquire) };

            if last != self.tail.load(Ordering::SeqCst) {
                continue;
            }

            if next.is_null() {
                let linked = unsafe {
                    (*last).next.compare_exchange(ptr::null_mut(), node, Ordering::Release, Ordering::Relaxed)
                };

                if linked.is_ok() {
                    // best effort, a later operation helps if this loses
                    let _ = self.tail.compare_exchange(last, node, Ordering::SeqCst, Ordering::Relaxed);
                    handle.clear();
                    return;
                }
            } else {
                let _ = self.tail.compare_exchange(last, next, Ordering::SeqCst, Ordering::Relaxed);
            }
        }
    }

    pub fn dequeue(&self, handle: &Handle) -> Option<T> {
        self.check(handle);

        loop {
            let first = handle.protect(HP_FIRST, &self.head);
            let last = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*first).next.load(Ordering::Acquire) };
            handle.publish(HP_NEXT, next);

            // also validates the `next` hazard: `next` is only retired
            // after head has moved past `first`
            if first != self.head.load(Ordering::SeqCst) {
                continue;
            }

            if first == last {
                if next.is_null() {
                    handle.clear();
                    return None;
                }

                let _ = self.tail.compare_exchange(last, next, Ordering::SeqCst, Ordering::Relaxed);
            } else {
                debug_assert!(!next.is_null());

                if self.head.compare_exchange(first, next, Ordering::SeqCst, Ordering::Relaxed).is_ok() {
                    // only the winner of the head swing reads the value
                    let val = unsafe { (*next).value.as_ptr().read() };
                    handle.clear();

                    unsafe {
                        self.domain.retire(handle, first);
                    }

                    return Some(val);
                }
            }
        }
    }

    pub fn is_empty(&self, handle: &Handle) -> bool {
        self.check(handle);

        let first = handle.protect(HP_FIRST, &self.head);
        let next = unsafe { (*first).next.load(Ordering::Acquire) };
        handle.clear();

        next.is_null()
    }

    /// Free every retired node of `handle` that no thread still reads.
    pub fn reclaim(&self, handle: &Handle) {
        self.check(handle);
        self.domain.flush(handle);
    }

    #[inline]
    fn check(&self, handle: &Handle) {
        assert!(handle.is_registered_with(&self.domain), "handle registered with another queue");
    }
}

impl<T> Default for MsQueue<T> {
    fn default() -> MsQueue<T> {
        MsQueue::new()
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        let sentinel = self.head.load(Ordering::Relaxed);
        let mut curr = unsafe { Box::from_raw(sentinel) }.next.load(Ordering::Relaxed);

        while !curr.is_null() {
            let mut node = unsafe { Box::from_raw(curr) };

            unsafe {
                ptr::drop_in_place(node.value.as_mut_ptr());
            }

            curr = node.next.load(Ordering::Relaxed);
        }
    }
}

impl<T> Node<T> {
    fn new(val: T) -> Node<T> {
        Node {
            value: MaybeUninit::new(val),
            next: AtomicPtr::new(ptr::null_mut())
        }
    }

    fn sentinel() -> Node<T> {
        Node {
            value: MaybeUninit::uninit(),
            next: AtomicPtr::new(ptr::null_mut())
        }
    }
}

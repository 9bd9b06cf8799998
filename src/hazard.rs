//! Hazard pointer reclamation.
//!
//! Before dereferencing a shared node a thread publishes its address in one
//! of the hazard slots of its [`Handle`]. A node unlinked from a structure is
//! retired into the retiring thread's record and only freed by a scan that
//! finds it unpublished in every record of the [`Domain`].

use std::cell::{ Cell, UnsafeCell };
use std::marker::PhantomData;
use std::ptr::{ self, NonNull };
use crate::loom::sync::atomic::{ AtomicPtr, AtomicUsize, Ordering };


/// Hazard slots per handle.
pub const HAZARDS: usize = 2;

#[cfg(not(feature = "loom"))]
const SCAN_THRESHOLD: usize = 64;

#[cfg(feature = "loom")]
const SCAN_THRESHOLD: usize = 1;

/// Pending pointers per record before a scan.
#[cfg(not(feature = "loom"))]
fn scan_threshold(registered: usize) -> usize {
    SCAN_THRESHOLD.max(2 * HAZARDS * registered)
}

// every retire scans, so models see frees while other threads hold hazards
#[cfg(feature = "loom")]
fn scan_threshold(_registered: usize) -> usize {
    SCAN_THRESHOLD
}

// Identity only, not part of any modelled state.
static NEXT_ID: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);

pub(crate) struct Domain {
    id: usize,
    records: AtomicPtr<Record>,
    registered: AtomicUsize
}

/// A thread's registration in a [`Domain`].
///
/// A handle may move between threads but is never shared, so at most one
/// thread publishes through its slots and touches its retired list.
pub struct Handle {
    domain: usize,
    record: NonNull<Record>,
    _not_sync: PhantomData<Cell<()>>
}

struct Record {
    hazards: [AtomicPtr<u8>; HAZARDS],
    retired: UnsafeCell<Vec<Retired>>,

    // written before the record is published, immutable after
    next: *mut Record
}

struct Retired {
    ptr: *mut u8,
    reclaim: unsafe fn(*mut u8)
}

unsafe impl Send for Handle {}

impl Domain {
    pub(crate) fn new() -> Domain {
        Domain {
            id: NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            records: AtomicPtr::new(ptr::null_mut()),
            registered: AtomicUsize::new(0)
        }
    }

    /// Number of handles ever registered with this domain.
    #[inline]
    pub(crate) fn registered(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Allocate a fresh record and link it in front of the record list.
    ///
    /// Records are only freed with the domain, so callers keep one handle
    /// per thread rather than registering per operation.
    pub(crate) fn register(&self) -> Handle {
        let record = Box::into_raw(Box::new(Record::new()));
        let mut head = self.records.load(Ordering::Acquire);

        loop {
            unsafe {
                (*record).next = head;
            }

            match self.records.compare_exchange(head, record, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => head = actual
            }
        }

        self.registered.fetch_add(1, Ordering::Relaxed);

        Handle {
            domain: self.id,
            record: unsafe { NonNull::new_unchecked(record) },
            _not_sync: PhantomData
        }
    }

    /// Hand an unlinked allocation over to the domain.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::<N>::into_raw`, must no longer be reachable
    /// from the shared structure, and must be retired exactly once.
    /// `handle` must be registered with this domain.
    pub(crate) unsafe fn retire<N>(&self, handle: &Handle, ptr: *mut N) {
        debug_assert!(handle.is_registered_with(self));

        let record = handle.record();
        let len = {
            let retired = &mut *record.retired.get();
            retired.push(Retired { ptr: ptr as *mut u8, reclaim: reclaim::<N> });
            retired.len()
        };

        if len >= scan_threshold(self.registered()) {
            self.scan(record);
        }
    }

    /// Scan immediately, regardless of how many pointers are pending.
    pub(crate) fn flush(&self, handle: &Handle) {
        assert!(handle.is_registered_with(self));

        unsafe {
            self.scan(handle.record());
        }
    }

    /// Free every retired pointer of `record` that no record publishes.
    ///
    /// Only the owner of `record` may call this.
    unsafe fn scan(&self, record: &Record) {
        let mut hazards = Vec::new();
        let mut curr = self.records.load(Ordering::Acquire);

        while let Some(rec) = curr.as_ref() {
            for hazard in rec.hazards.iter() {
                let ptr = hazard.load(Ordering::SeqCst);

                if !ptr.is_null() {
                    hazards.push(ptr);
                }
            }

            curr = rec.next;
        }

        hazards.sort_unstable();

        let retired = &mut *record.retired.get();
        let before = retired.len();

        retired.retain(|entry| {
            if hazards.binary_search(&entry.ptr).is_ok() {
                true
            } else {
                (entry.reclaim)(entry.ptr);
                false
            }
        });

        log::trace!(
            "hazard scan: freed {}, kept {}, {} published",
            before - retired.len(),
            retired.len(),
            hazards.len()
        );
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        let mut curr = self.records.load(Ordering::Relaxed);

        while !curr.is_null() {
            let record = unsafe { Box::from_raw(curr) };
            let Record { retired, next, .. } = *record;

            for retired in retired.into_inner() {
                unsafe {
                    (retired.reclaim)(retired.ptr);
                }
            }

            curr = next;
        }
    }
}

impl Handle {
    #[inline]
    pub(crate) fn is_registered_with(&self, domain: &Domain) -> bool {
        self.domain == domain.id
    }

    /// Publish the pointer held by `src` in `slot` and return it once it is
    /// known to have still been in `src` after publication.
    pub(crate) fn protect<N>(&self, slot: usize, src: &AtomicPtr<N>) -> *mut N {
        let hazard = &self.record().hazards[slot];
        let mut ptr = src.load(Ordering::Acquire);

        loop {
            hazard.store(ptr as *mut u8, Ordering::SeqCst);

            let current = src.load(Ordering::SeqCst);
            if current == ptr {
                return ptr;
            }

            ptr = current;
        }
    }

    /// Publish `ptr` in `slot` without validation.
    ///
    /// The caller must re-check whatever makes `ptr` reachable before
    /// relying on the protection.
    #[inline]
    pub(crate) fn publish<N>(&self, slot: usize, ptr: *mut N) {
        self.record().hazards[slot].store(ptr as *mut u8, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn clear(&self) {
        for hazard in self.record().hazards.iter() {
            hazard.store(ptr::null_mut(), Ordering::Release);
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        unsafe { (*self.record().retired.get()).len() }
    }

    #[inline]
    fn record(&self) -> &Record {
        // records live as long as the domain, and every method that reaches
        // here is only called through the owning domain
        unsafe { self.record.as_ref() }
    }
}

impl Record {
    fn new() -> Record {
        Record {
            hazards: [AtomicPtr::new(ptr::null_mut()), AtomicPtr::new(ptr::null_mut())],
            retired: UnsafeCell::new(Vec::new()),
            next: ptr::null_mut()
        }
    }
}

unsafe fn reclaim<N>(ptr: *mut u8) {
    drop(Box::from_raw(ptr as *mut N));
}

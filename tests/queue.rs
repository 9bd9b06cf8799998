#[cfg(not(feature = "loom"))]
mod loom {
    pub use std::thread;
    pub use std::sync;

    pub fn model<F>(f: F)
    where
        F: Fn() + Sync + Send + 'static
    {
        f()
    }
}


use loom::sync::Arc;
use loom::thread;
use msqueue::MsQueue;


#[test]
fn one_thread() {
    loom::model(|| {
        let queue = MsQueue::new();
        let handle = queue.register();

        assert!(queue.is_empty(&handle));
        assert_eq!(queue.dequeue(&handle), None);

        queue.enqueue(&handle, 0x42);
        assert!(!queue.is_empty(&handle));
        assert_eq!(queue.dequeue(&handle), Some(0x42));
        assert_eq!(queue.dequeue(&handle), None);

        queue.enqueue(&handle, 1);
        queue.enqueue(&handle, 2);
        queue.enqueue(&handle, 3);
        assert_eq!(queue.dequeue(&handle), Some(1));
        assert_eq!(queue.dequeue(&handle), Some(2));
        assert_eq!(queue.dequeue(&handle), Some(3));
        assert_eq!(queue.dequeue(&handle), None);
        assert!(queue.is_empty(&handle));

        queue.reclaim(&handle);
        queue.enqueue(&handle, 4);
        assert_eq!(queue.dequeue(&handle), Some(4));
    });
}

#[test]
fn two_thread() {
    loom::model(|| {
        let queue = Arc::new(MsQueue::new());
        let queue2 = queue.clone();

        let h = thread::spawn(move || {
            let handle = queue2.register();

            for i in 0..3 {
                queue2.enqueue(&handle, 0x42 + i);
            }
        });

        let handle = queue.register();
        let mut next = 0x42;

        while next < 0x42 + 3 {
            match queue.dequeue(&handle) {
                Some(val) => {
                    assert_eq!(val, next);
                    next += 1;
                },
                None => thread::yield_now()
            }
        }

        h.join().unwrap();
        assert_eq!(queue.dequeue(&handle), None);
    });
}

#[test]
fn three_thread_s2r1() {
    loom::model(|| {
        let queue = Arc::new(MsQueue::new());
        let queue2 = queue.clone();
        let queue3 = queue.clone();

        let h = thread::spawn(move || {
            let handle = queue2.register();

            for i in 0..2 {
                queue2.enqueue(&handle, 0x42 + i);
            }
        });

        let h2 = thread::spawn(move || {
            let handle = queue3.register();

            for i in 2..4 {
                queue3.enqueue(&handle, 0x42 + i);
            }
        });

        let handle = queue.register();
        let mut output = Vec::new();

        while output.len() < 4 {
            match queue.dequeue(&handle) {
                Some(val) => output.push(val),
                None => thread::yield_now()
            }
        }

        h.join().unwrap();
        h2.join().unwrap();

        // per-producer order
        let first = output.iter().filter(|&&v| v < 0x44).copied().collect::<Vec<usize>>();
        let second = output.iter().filter(|&&v| v >= 0x44).copied().collect::<Vec<usize>>();
        assert_eq!(first, [0x42, 0x43]);
        assert_eq!(second, [0x44, 0x45]);

        // check
        output.sort();
        let expected = (0..4).map(|n| 0x42 + n).collect::<Vec<usize>>();
        assert_eq!(expected, output.as_slice());
    });
}

#[test]
fn three_thread_s1r2() {
    loom::model(|| {
        let queue = Arc::new(MsQueue::new());
        let queue2 = queue.clone();
        let queue3 = queue.clone();

        let h = thread::spawn(move || {
            let handle = queue2.register();

            for i in 0..2 {
                queue2.enqueue(&handle, 0x42 + i);
            }
        });

        let h2 = thread::spawn(move || {
            let handle = queue3.register();
            let val = queue3.dequeue(&handle);
            queue3.reclaim(&handle);
            val
        });

        let handle = queue.register();
        let mine = queue.dequeue(&handle);
        queue.reclaim(&handle);

        h.join().unwrap();
        let theirs = h2.join().unwrap();

        let mut output = mine.into_iter().chain(theirs).collect::<Vec<usize>>();
        while let Some(val) = queue.dequeue(&handle) {
            output.push(val);
        }

        // check
        output.sort();
        assert_eq!(output, [0x42, 0x43]);
    });
}

#[test]
fn concurrent_empty_dequeue() {
    loom::model(|| {
        let queue = Arc::new(MsQueue::new());
        let queue2 = queue.clone();

        let h = thread::spawn(move || {
            let handle = queue2.register();
            queue2.enqueue(&handle, 1usize);
            queue2.dequeue(&handle)
        });

        let handle = queue.register();
        let mine = queue.dequeue(&handle);
        let theirs = h.join().unwrap();

        // exactly one of the two dequeues takes the element
        match (mine, theirs) {
            (Some(1), None) | (None, Some(1)) => (),
            other => panic!("unexpected {:?}", other)
        }

        assert_eq!(queue.dequeue(&handle), None);
    });
}

#[cfg(not(feature = "loom"))]
#[test]
#[should_panic(expected = "handle registered with another queue")]
fn foreign_handle_is_rejected() {
    let queue = MsQueue::<usize>::new();
    let other = MsQueue::<usize>::new();
    let handle = other.register();

    queue.enqueue(&handle, 1);
}

// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Bounded FIFO between request producers and the worker.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::semaphore::Semaphore;

/// Fixed-capacity ring of pending requests.
///
/// Any thread may push; a full ring applies backpressure by blocking the
/// producer. Each successful push signals the paired semaphore so the worker
/// wakes exactly as many times as there are items. Popping is nonblocking and
/// reserved for the worker side.
pub(crate) struct RingQueue<T> {
    inner: Mutex<Inner<T>>,
    wake: Arc<Semaphore>,
    capacity: usize,
}

struct Inner<T> {
    buf: Vec<Option<T>>,
    read: usize,
    write: usize,
    // read == write is ambiguous between empty and full; this flag resolves it
    full: bool,
}

impl<T> RingQueue<T> {
    pub fn new(capacity: usize, wake: Arc<Semaphore>) -> Self {
        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, || None);
        RingQueue {
            inner: Mutex::new(Inner {
                buf,
                read: 0,
                write: 0,
                full: false,
            }),
            wake,
            capacity,
        }
    }

    /// Push an item, blocking while the ring is full.
    pub fn push(&self, v: T) {
        let mut v = Some(v);
        loop {
            {
                let mut q = self.inner.lock().unwrap();
                if !q.full {
                    let write = q.write;
                    q.buf[write] = v.take();
                    q.write = (write + 1) % self.capacity;
                    if q.write == q.read {
                        q.full = true;
                    }
                    drop(q);
                    self.wake.notify();
                    return;
                }
            }
            thread::yield_now();
        }
    }

    /// Pop the oldest item, or `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let mut q = self.inner.lock().unwrap();
        if q.full || q.read != q.write {
            let read = q.read;
            let v = q.buf[read].take();
            q.read = (read + 1) % self.capacity;
            q.full = false;
            v
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        let q = self.inner.lock().unwrap();
        if q.full {
            self.capacity
        } else if q.read <= q.write {
            q.write - q.read
        } else {
            self.capacity - q.read + q.write
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue(capacity: usize) -> RingQueue<u32> {
        RingQueue::new(capacity, Arc::new(Semaphore::new()))
    }

    #[test]
    fn test_fifo_order() {
        let q = queue(4);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let q = queue(3);
        assert_eq!(q.len(), 0);
        for i in 0..3 {
            q.push(i);
            assert!(q.len() <= q.capacity());
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(0));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_wraparound() {
        let q = queue(2);
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(), Some(1));
        q.push(3);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_push_blocks_until_pop() {
        let q = Arc::new(queue(1));
        q.push(1);

        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                q.push(2);
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        producer.join().unwrap();
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn test_push_signals_semaphore() {
        let wake = Arc::new(Semaphore::new());
        let q = RingQueue::new(2, wake.clone());
        q.push(7u32);
        // a push must leave one wakeup behind
        wake.wait();
    }
}

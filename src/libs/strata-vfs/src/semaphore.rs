// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Counting semaphore used to park the worker while the queue is empty.

use std::sync::{Condvar, Mutex};

pub(crate) struct Semaphore {
    value: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Semaphore {
            value: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and wake one waiter.
    pub fn notify(&self) {
        {
            let mut value = self.value.lock().unwrap();
            *value += 1;
        }
        self.cond.notify_one();
    }

    /// Block while the count is zero, then decrement.
    pub fn wait(&self) {
        let mut value = self.value.lock().unwrap();
        while *value == 0 {
            value = self.cond.wait(value).unwrap();
        }
        *value -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_notify_before_wait() {
        let sem = Semaphore::new();
        sem.notify();
        // does not block
        sem.wait();
    }

    #[test]
    fn test_wait_blocks_until_notify() {
        let sem = Arc::new(Semaphore::new());
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || {
                sem.wait();
            })
        };
        thread::sleep(Duration::from_millis(20));
        sem.notify();
        waiter.join().unwrap();
    }

    #[test]
    fn test_counts_accumulate() {
        let sem = Semaphore::new();
        sem.notify();
        sem.notify();
        sem.notify();
        sem.wait();
        sem.wait();
        sem.wait();
    }
}

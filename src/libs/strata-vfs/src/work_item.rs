// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Work item records and their completion contract.
//!
//! A work item is the unit the engine processes: one request's operation,
//! inputs, result and completion state. Items are either *handle-owned* (the
//! caller got a [`crate::WorkItemHandle`] and the slot is returned when the
//! handle is released) or *engine-owned* (a callback was supplied and the
//! worker releases the slot after invoking it). The two classes are disjoint
//! and fixed at submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use strata_types::{Error, Result};

/// Slot index marking an item that never came from the pool.
pub(crate) const NO_SLOT: usize = usize::MAX;

/// The kind of request a work item carries. Fixed at allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Exists,
    Size,
    Read,
    Write,
    WriteSegment,
    Append,
    Delete,
    CreateDir,
    DeleteDir,
}

/// What the worker does with a read's output buffer after a completion
/// callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAction {
    /// Leave the buffer on the item for the callback to take.
    Keep,
    /// Drop the buffer once the callback has returned.
    Free,
}

pub(crate) type Callback = Box<dyn FnOnce(&WorkItem) + Send + 'static>;

/// Who releases the item back to the pool.
pub(crate) enum Ownership {
    /// The caller holds a handle and releases it.
    Handle,
    /// The worker invokes the callback and releases the item itself.
    Engine {
        callback: Callback,
        buffer_action: BufferAction,
    },
}

pub(crate) struct ItemState {
    pub op: Operation,
    /// Canonical virtual path; set once at submission.
    pub path: String,
    /// Payload for write-class operations, owned for the request's lifetime.
    pub input: Vec<u8>,
    /// Device-allocated output of a successful read.
    pub output: Option<Vec<u8>>,
    /// Read cap on submission (`u64::MAX` = whole file); bytes moved or file
    /// size once completed. Never counts a NUL terminator.
    pub bytes: u64,
    pub offset: u64,
    pub null_terminate: bool,
    pub result: Result<()>,
    pub ownership: Ownership,
}

impl ItemState {
    fn new(op: Operation, path: String, ownership: Ownership) -> Self {
        ItemState {
            op,
            path,
            input: Vec::new(),
            output: None,
            bytes: 0,
            offset: 0,
            null_terminate: false,
            result: Ok(()),
            ownership,
        }
    }

    pub fn take_ownership(&mut self) -> Ownership {
        std::mem::replace(&mut self.ownership, Ownership::Handle)
    }
}

/// One request record.
///
/// Once [`WorkItem::completed`] observes `true`, the result, byte count and
/// buffer are stable for as long as the item is held; accessors may be used
/// from any thread and from completion callbacks.
pub struct WorkItem {
    slot: usize,
    completed: AtomicBool,
    state: Mutex<ItemState>,
}

impl WorkItem {
    pub(crate) fn empty(slot: usize) -> Self {
        WorkItem {
            slot,
            completed: AtomicBool::new(false),
            state: Mutex::new(ItemState::new(Operation::Exists, String::new(), Ownership::Handle)),
        }
    }

    /// Build the transient record handed to a callback when the pool is
    /// exhausted. It owns no slot and no buffer, and is already complete.
    pub(crate) fn exhausted(op: Operation, path: String) -> Self {
        let mut state = ItemState::new(op, path, Ownership::Handle);
        state.result = Err(Error::OutOfWorkItems);
        WorkItem {
            slot: NO_SLOT,
            completed: AtomicBool::new(true),
            state: Mutex::new(state),
        }
    }

    /// Re-initialize a slot freshly taken from the pool. Drops any leftover
    /// buffer from the slot's previous life.
    pub(crate) fn reset(&self, op: Operation, path: String, ownership: Ownership) {
        let mut state = self.state.lock().unwrap();
        *state = ItemState::new(op, path, ownership);
        drop(state);
        self.completed.store(false, Ordering::Release);
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap()
    }

    /// Publish completion. Caller must hold the engine's completion mutex.
    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// Whether the request has finished processing.
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Terminal status of the request.
    pub fn result(&self) -> Result<()> {
        self.state().result
    }

    /// The operation this item was submitted with.
    pub fn operation(&self) -> Operation {
        self.state().op
    }

    /// The canonical virtual path of the request.
    pub fn path(&self) -> String {
        self.state().path.clone()
    }

    /// Bytes read, written, or the file size, depending on the operation.
    /// Excludes the NUL terminator of a null-terminated read.
    pub fn bytes(&self) -> u64 {
        self.state().bytes
    }

    /// Take ownership of a successful read's output buffer. Subsequent calls
    /// return `None`. For a null-terminated read the final byte is the
    /// terminator.
    pub fn take_buffer(&self) -> Option<Vec<u8>> {
        self.state().output.take()
    }

    /// Drop the output buffer, if any. A no-op when no buffer was allocated.
    pub fn free_buffer(&self) {
        drop(self.take_buffer());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_previous_request() {
        let item = WorkItem::empty(0);
        {
            let mut state = item.state();
            state.output = Some(vec![1, 2, 3]);
            state.bytes = 3;
            state.result = Err(Error::Generic);
        }
        item.mark_completed();

        item.reset(Operation::Write, "/a".to_string(), Ownership::Handle);
        assert!(!item.completed());
        assert_eq!(item.bytes(), 0);
        assert_eq!(item.result(), Ok(()));
        assert!(item.take_buffer().is_none());
        assert_eq!(item.operation(), Operation::Write);
        assert_eq!(item.path(), "/a");
    }

    #[test]
    fn test_exhausted_item_contract() {
        let item = WorkItem::exhausted(Operation::Read, "/missing".to_string());
        assert!(item.completed());
        assert_eq!(item.result(), Err(Error::OutOfWorkItems));
        assert_eq!(item.bytes(), 0);
        assert!(item.take_buffer().is_none());
        // freeing with no buffer is a no-op
        item.free_buffer();
        assert_eq!(item.slot(), NO_SLOT);
    }

    #[test]
    fn test_take_buffer_is_one_shot() {
        let item = WorkItem::empty(0);
        item.state().output = Some(b"abc".to_vec());
        assert_eq!(item.take_buffer().as_deref(), Some(&b"abc"[..]));
        assert!(item.take_buffer().is_none());
    }
}

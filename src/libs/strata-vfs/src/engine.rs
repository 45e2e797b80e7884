// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The request engine: mount management, the background worker, and the
//! public request API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;

use strata_types::{EngineConfig, Error, MountPermissions, Result, WriteMode};

use crate::device::{DeviceDriver, DirectoryDriver};
use crate::mount::MountEntry;
use crate::path;
use crate::pool::WorkItemPool;
use crate::queue::RingQueue;
use crate::semaphore::Semaphore;
use crate::sl;
use crate::work_item::{BufferAction, Callback, ItemState, Operation, Ownership, WorkItem};

/// Opaque identifier of a mount created by [`FileEngine::create_mount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mount {
    id: u64,
}

struct Shared {
    drivers: RwLock<Vec<Arc<dyn DeviceDriver>>>,
    mounts: RwLock<Vec<Arc<MountEntry>>>,
    next_mount_id: AtomicU64,
    pool: WorkItemPool,
    queue: RingQueue<Arc<WorkItem>>,
    wake: Arc<Semaphore>,
    running: AtomicBool,
    // guards completion publication; handle waiters sleep on the condvar
    completion: Mutex<()>,
    completion_cv: Condvar,
}

/// A layered virtual filesystem with one background worker.
///
/// Devices are mounted onto prefixes of a virtual path tree. Later mounts
/// shadow earlier ones; reads fall through shadowing mounts that do not hold
/// the file, while mutations target the newest matching mount that grants
/// the required permission.
///
/// Every request method returns immediately; processing happens on the
/// worker in submission order. Completion callbacks also run on the worker,
/// one at a time — a callback that blocks on another work item of the same
/// engine deadlocks. Submitting follow-up requests from a callback is safe
/// as long as the queue is not full.
pub struct FileEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FileEngine {
    /// Device type index of the built-in host directory backend.
    pub const DIRECTORY_DEVICE: u32 = 0;

    /// Create an engine and start its worker thread.
    pub fn new(mut config: EngineConfig) -> Result<Self> {
        config.adjust();

        let wake = Arc::new(Semaphore::new());
        let shared = Arc::new(Shared {
            drivers: RwLock::new(vec![Arc::new(DirectoryDriver) as Arc<dyn DeviceDriver>]),
            mounts: RwLock::new(Vec::new()),
            next_mount_id: AtomicU64::new(0),
            pool: WorkItemPool::new(config.work_item_pool_size),
            queue: RingQueue::new(config.max_queued_work_items, wake.clone()),
            wake,
            running: AtomicBool::new(false),
            completion: Mutex::new(()),
            completion_cv: Condvar::new(),
        });

        let engine = FileEngine {
            shared,
            worker: Mutex::new(None),
        };
        engine.start_worker()?;
        Ok(engine)
    }

    /// Install a new backend type. The returned index is the `device_type`
    /// accepted by [`FileEngine::create_mount`].
    pub fn register_device_driver(&self, driver: Arc<dyn DeviceDriver>) -> u32 {
        let mut drivers = self.shared.drivers.write().unwrap();
        drivers.push(driver);
        (drivers.len() - 1) as u32
    }

    /// Mount a device onto `mount_point`.
    ///
    /// `permissions` restricts what the mount grants; `None` grants
    /// everything the backend supports. Requesting a permission the backend
    /// does not support fails with [`Error::Permissions`]; an unknown
    /// `device_type` fails with [`Error::InvalidDevice`]; a backing location
    /// the driver cannot open reports the driver's error (typically
    /// [`Error::NotFound`]).
    ///
    /// The mount point is used verbatim — callers supply a canonical
    /// absolute prefix without a trailing slash (the root `/` excepted).
    pub fn create_mount(
        &self,
        device_type: u32,
        mount_point: &str,
        device_path: &str,
        permissions: Option<MountPermissions>,
    ) -> Result<Mount> {
        let driver = {
            let drivers = self.shared.drivers.read().unwrap();
            drivers
                .get(device_type as usize)
                .cloned()
                .ok_or(Error::InvalidDevice)?
        };

        let supported = MountPermissions::READ | driver.capabilities();
        let granted = match permissions {
            None => supported,
            Some(requested) => {
                if requested.is_empty() || !supported.contains(requested) {
                    warn!(sl!(), "mount permissions exceed device capabilities";
                          "driver" => driver.name(),
                          "mount_point" => mount_point);
                    return Err(Error::Permissions);
                }
                requested
            }
        };

        let device = match driver.create(device_path) {
            Ok(device) => device,
            Err(e) => {
                warn!(sl!(), "unable to mount device";
                      "driver" => driver.name(),
                      "device_path" => device_path,
                      "mount_point" => mount_point);
                return Err(e);
            }
        };

        let id = self.shared.next_mount_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(MountEntry {
            id,
            prefix: mount_point.to_string(),
            device,
            permissions: granted,
        });
        self.shared.mounts.write().unwrap().push(entry);

        info!(sl!(), "mounted device";
              "driver" => driver.name(),
              "device_path" => device_path,
              "mount_point" => mount_point);
        Ok(Mount { id })
    }

    /// Remove a mount, destroying its device instance.
    ///
    /// The worker is stopped for the duration of the removal and restarted
    /// afterwards; queued requests are not drained. Returns whether the
    /// mount was found. Callers are responsible for quiescing requests that
    /// target the mount first.
    pub fn release_mount(&self, mount: &Mount) -> bool {
        self.stop_worker();

        let removed = {
            let mut mounts = self.shared.mounts.write().unwrap();
            match mounts.iter().position(|m| m.id == mount.id) {
                Some(idx) => {
                    let entry = mounts.remove(idx);
                    info!(sl!(), "released mount"; "mount_point" => entry.prefix.as_str());
                    true
                }
                None => false,
            }
        };

        if self.start_worker().is_err() {
            error!(sl!(), "failed to restart worker after mount release");
        }
        removed
    }

    /// Read the entirety of a file.
    ///
    /// With `null_terminate` the output buffer gets one extra `0` byte after
    /// the payload, so it can be handed to C string consumers.
    pub fn read_file(&self, path: &str, null_terminate: bool) -> WorkItemHandle {
        self.read_file_segment(path, 0, u64::MAX, null_terminate)
    }

    /// Read up to `max_bytes` of a file starting at `offset`.
    pub fn read_file_segment(
        &self,
        path: &str,
        offset: u64,
        max_bytes: u64,
        null_terminate: bool,
    ) -> WorkItemHandle {
        self.submit_handle(Operation::Read, path, move |state| {
            state.offset = offset;
            state.bytes = max_bytes;
            state.null_terminate = null_terminate;
        })
    }

    /// Read the entirety of a file and deliver the result to `callback` on
    /// the worker thread.
    pub fn read_file_with_callback<F>(
        &self,
        path: &str,
        null_terminate: bool,
        buffer_action: BufferAction,
        callback: F,
    ) where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.read_file_segment_with_callback(path, 0, u64::MAX, null_terminate, buffer_action, callback)
    }

    /// Read a file segment and deliver the result to `callback` on the
    /// worker thread.
    pub fn read_file_segment_with_callback<F>(
        &self,
        path: &str,
        offset: u64,
        max_bytes: u64,
        null_terminate: bool,
        buffer_action: BufferAction,
        callback: F,
    ) where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.submit_callback(
            Operation::Read,
            path,
            Box::new(callback),
            buffer_action,
            move |state| {
                state.offset = offset;
                state.bytes = max_bytes;
                state.null_terminate = null_terminate;
            },
        )
    }

    /// Replace the file at `path` with `data`.
    pub fn write_file(&self, path: &str, data: &[u8]) -> WorkItemHandle {
        let data = data.to_vec();
        self.submit_handle(Operation::Write, path, move |state| {
            state.input = data;
        })
    }

    /// Replace the file at `path` with `data`, delivering the result to
    /// `callback` on the worker thread.
    pub fn write_file_with_callback<F>(&self, path: &str, data: &[u8], callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        let data = data.to_vec();
        self.submit_callback(
            Operation::Write,
            path,
            Box::new(callback),
            BufferAction::Keep,
            move |state| {
                state.input = data;
            },
        )
    }

    /// Overwrite `data.len()` bytes of the file at `path` in place, starting
    /// at `offset`.
    pub fn write_file_segment(&self, path: &str, offset: u64, data: &[u8]) -> WorkItemHandle {
        let data = data.to_vec();
        self.submit_handle(Operation::WriteSegment, path, move |state| {
            state.offset = offset;
            state.input = data;
        })
    }

    /// Segment-write variant delivering the result to `callback` on the
    /// worker thread.
    pub fn write_file_segment_with_callback<F>(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        callback: F,
    ) where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        let data = data.to_vec();
        self.submit_callback(
            Operation::WriteSegment,
            path,
            Box::new(callback),
            BufferAction::Keep,
            move |state| {
                state.offset = offset;
                state.input = data;
            },
        )
    }

    /// Append `data` to the file at `path`, creating it if absent.
    pub fn append_file(&self, path: &str, data: &[u8]) -> WorkItemHandle {
        let data = data.to_vec();
        self.submit_handle(Operation::Append, path, move |state| {
            state.input = data;
        })
    }

    /// Append variant delivering the result to `callback` on the worker
    /// thread.
    pub fn append_file_with_callback<F>(&self, path: &str, data: &[u8], callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        let data = data.to_vec();
        self.submit_callback(
            Operation::Append,
            path,
            Box::new(callback),
            BufferAction::Keep,
            move |state| {
                state.input = data;
            },
        )
    }

    /// Determine whether a file exists on any readable mount.
    pub fn file_exists(&self, path: &str) -> WorkItemHandle {
        self.submit_handle(Operation::Exists, path, |_| {})
    }

    /// Existence check delivering the result to `callback` on the worker
    /// thread.
    pub fn file_exists_with_callback<F>(&self, path: &str, callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.submit_callback(
            Operation::Exists,
            path,
            Box::new(callback),
            BufferAction::Keep,
            |_| {},
        )
    }

    /// Get the size of a file; the result's `bytes()` holds the size.
    pub fn file_size(&self, path: &str) -> WorkItemHandle {
        self.submit_handle(Operation::Size, path, |_| {})
    }

    /// Size query delivering the result to `callback` on the worker thread.
    pub fn file_size_with_callback<F>(&self, path: &str, callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.submit_callback(
            Operation::Size,
            path,
            Box::new(callback),
            BufferAction::Keep,
            |_| {},
        )
    }

    /// Delete the file at `path`.
    pub fn delete_file(&self, path: &str) -> WorkItemHandle {
        self.submit_handle(Operation::Delete, path, |_| {})
    }

    /// Delete variant delivering the result to `callback` on the worker
    /// thread.
    pub fn delete_file_with_callback<F>(&self, path: &str, callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.submit_callback(
            Operation::Delete,
            path,
            Box::new(callback),
            BufferAction::Keep,
            |_| {},
        )
    }

    /// Create the directory at `path`.
    pub fn create_dir(&self, path: &str) -> WorkItemHandle {
        self.submit_handle(Operation::CreateDir, path, |_| {})
    }

    /// Directory creation delivering the result to `callback` on the worker
    /// thread.
    pub fn create_dir_with_callback<F>(&self, path: &str, callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.submit_callback(
            Operation::CreateDir,
            path,
            Box::new(callback),
            BufferAction::Keep,
            |_| {},
        )
    }

    /// Delete the directory at `path` and everything below it.
    pub fn delete_dir(&self, path: &str) -> WorkItemHandle {
        self.submit_handle(Operation::DeleteDir, path, |_| {})
    }

    /// Directory deletion delivering the result to `callback` on the worker
    /// thread.
    pub fn delete_dir_with_callback<F>(&self, path: &str, callback: F)
    where
        F: FnOnce(&WorkItem) + Send + 'static,
    {
        self.submit_callback(
            Operation::DeleteDir,
            path,
            Box::new(callback),
            BufferAction::Keep,
            |_| {},
        )
    }

    fn submit_handle(
        &self,
        op: Operation,
        path: &str,
        configure: impl FnOnce(&mut ItemState),
    ) -> WorkItemHandle {
        let item = self.submit(op, path, Ownership::Handle, configure);
        WorkItemHandle {
            shared: self.shared.clone(),
            item,
        }
    }

    fn submit_callback(
        &self,
        op: Operation,
        path: &str,
        callback: Callback,
        buffer_action: BufferAction,
        configure: impl FnOnce(&mut ItemState),
    ) {
        self.submit(
            op,
            path,
            Ownership::Engine {
                callback,
                buffer_action,
            },
            configure,
        );
    }

    fn submit(
        &self,
        op: Operation,
        path: &str,
        ownership: Ownership,
        configure: impl FnOnce(&mut ItemState),
    ) -> Option<Arc<WorkItem>> {
        let mut normalized = path.to_string();
        path::normalize(&mut normalized);

        match self.shared.pool.alloc() {
            Some(item) => {
                item.reset(op, normalized, ownership);
                configure(&mut *item.state());
                self.shared.queue.push(item.clone());
                Some(item)
            }
            None => {
                error!(sl!(), "unable to allocate work item";
                       "pool_capacity" => self.shared.pool.capacity());
                if let Ownership::Engine { callback, .. } = ownership {
                    // the contract is one callback per request, even when the
                    // request never made it into the pool
                    let transient = WorkItem::exhausted(op, normalized);
                    callback(&transient);
                }
                None
            }
        }
    }

    fn start_worker(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_none() {
            self.shared.running.store(true, Ordering::Release);
            let shared = self.shared.clone();
            let handle = thread::Builder::new()
                .name("strata-vfs-worker".to_string())
                .spawn(move || worker_loop(shared))
                .map_err(|e| {
                    error!(sl!(), "failed to spawn worker thread"; "error" => e.to_string());
                    self.shared.running.store(false, Ordering::Release);
                    Error::Generic
                })?;
            *worker = Some(handle);
        }
        Ok(())
    }

    fn stop_worker(&self) {
        let mut worker = self.worker.lock().unwrap();
        if let Some(handle) = worker.take() {
            self.shared.running.store(false, Ordering::Release);
            self.shared.wake.notify();
            if handle.join().is_err() {
                error!(sl!(), "worker thread panicked during shutdown");
            }
        }
    }

    #[cfg(test)]
    fn work_items_in_use(&self) -> usize {
        self.shared.pool.in_use()
    }
}

impl Drop for FileEngine {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    while shared.running.load(Ordering::Acquire) {
        match shared.queue.pop() {
            Some(item) => process(&shared, &item),
            None => shared.wake.wait(),
        }
    }
}

fn required_permission(op: Operation) -> MountPermissions {
    match op {
        Operation::Write | Operation::WriteSegment | Operation::Append => {
            MountPermissions::WRITE_FILE
        }
        Operation::Delete => MountPermissions::DELETE_FILE,
        Operation::CreateDir => MountPermissions::CREATE_DIR,
        Operation::DeleteDir => MountPermissions::DELETE_DIR,
        _ => MountPermissions::READ,
    }
}

// Mutation targeting: newest matching mount that grants the required
// permission; a prefix match without the permission falls through to the
// next mount, never back to the caller.
fn find_mutable<'a>(
    mounts: &'a [Arc<MountEntry>],
    path: &'a str,
    required: MountPermissions,
) -> Option<(&'a MountEntry, &'a str)> {
    debug!(sl!(), "searching for writable mount"; "path" => path);

    for entry in mounts.iter().rev() {
        if let Some(rel) = entry.match_path(path) {
            debug!(sl!(), "found matching mount"; "mount_point" => entry.prefix.as_str());
            if entry.permissions.contains(required) {
                return Some((&**entry, rel));
            }
        }
    }
    None
}

fn process(shared: &Shared, item: &Arc<WorkItem>) {
    let mounts: Vec<Arc<MountEntry>> = shared.mounts.read().unwrap().clone();

    {
        let mut guard = item.state();
        let state = &mut *guard;
        let path = state.path.clone();

        match state.op {
            Operation::Exists => {
                state.result = Err(Error::NotFound);
                for (entry, rel) in read_candidates(&mounts, &path) {
                    if entry.device.exists(rel) {
                        state.result = Ok(());
                        break;
                    }
                }
            }
            Operation::Size => {
                state.result = Err(Error::NotFound);
                state.bytes = 0;
                for (entry, rel) in read_candidates(&mounts, &path) {
                    match entry.device.size(rel) {
                        Ok(size) => {
                            state.bytes = size;
                            state.result = Ok(());
                            break;
                        }
                        Err(Error::NotFound) => continue,
                        Err(e) => {
                            state.result = Err(e);
                            break;
                        }
                    }
                }
            }
            Operation::Read => {
                let max_bytes = state.bytes;
                state.result = Err(Error::NotFound);
                state.bytes = 0;
                for (entry, rel) in read_candidates(&mounts, &path) {
                    match entry
                        .device
                        .read(rel, state.offset, max_bytes, state.null_terminate)
                    {
                        Ok(buf) => {
                            state.bytes =
                                buf.len().saturating_sub(state.null_terminate as usize) as u64;
                            state.output = Some(buf);
                            state.result = Ok(());
                            break;
                        }
                        Err(Error::NotFound) => continue,
                        Err(e) => {
                            state.result = Err(e);
                            break;
                        }
                    }
                }
            }
            Operation::Write | Operation::WriteSegment | Operation::Append => {
                let mode = match state.op {
                    Operation::Write => WriteMode::Truncate,
                    Operation::Append => WriteMode::Append,
                    _ => WriteMode::Segment,
                };
                match find_mutable(&mounts, &path, required_permission(state.op)) {
                    Some((entry, rel)) => {
                        match entry.device.write(rel, state.offset, &state.input, mode) {
                            Ok(written) => {
                                state.bytes = written;
                                state.result = Ok(());
                            }
                            Err(e) => {
                                state.bytes = 0;
                                state.result = Err(e);
                            }
                        }
                    }
                    None => {
                        state.bytes = 0;
                        state.result = Err(Error::Unsupported);
                    }
                }
            }
            Operation::Delete | Operation::CreateDir | Operation::DeleteDir => {
                match find_mutable(&mounts, &path, required_permission(state.op)) {
                    Some((entry, rel)) => {
                        state.result = match state.op {
                            Operation::Delete => entry.device.delete(rel),
                            Operation::CreateDir => entry.device.create_dir(rel),
                            _ => entry.device.delete_dir(rel),
                        };
                    }
                    None => state.result = Err(Error::Unsupported),
                }
            }
        }
    }

    // The ownership tag is taken before completion is published: once a
    // handle waiter can observe completion it may release the slot, and the
    // slot may be handed to a new request.
    let ownership = item.state().take_ownership();

    {
        let _guard = shared.completion.lock().unwrap();
        item.mark_completed();
    }

    match ownership {
        Ownership::Engine {
            callback,
            buffer_action,
        } => {
            callback(item.as_ref());
            if buffer_action == BufferAction::Free {
                item.free_buffer();
            }
            shared.pool.free(item);
        }
        Ownership::Handle => {
            shared.completion_cv.notify_all();
        }
    }
}

// Read resolution: candidates in reverse insertion order, restricted to
// mounts granting READ. The caller tries each candidate until something
// other than NotFound comes back.
fn read_candidates<'a>(
    mounts: &'a [Arc<MountEntry>],
    path: &'a str,
) -> impl Iterator<Item = (&'a MountEntry, &'a str)> {
    mounts
        .iter()
        .rev()
        .filter(|entry| entry.permissions.contains(MountPermissions::READ))
        .filter_map(move |entry| entry.match_path(path).map(|rel| (&**entry, rel)))
}

fn wait_completed(shared: &Shared, item: &WorkItem) {
    let mut guard = shared.completion.lock().unwrap();
    while !item.completed() {
        guard = shared.completion_cv.wait(guard).unwrap();
    }
}

/// Handle to a submitted request.
///
/// The handle owns the underlying work item slot: dropping (or explicitly
/// [`WorkItemHandle::release`]-ing) it waits for completion and returns the
/// slot to the engine's pool. A handle whose request could not be allocated
/// reports [`Error::OutOfWorkItems`] from [`WorkItemHandle::result`] and is
/// already complete.
pub struct WorkItemHandle {
    shared: Arc<Shared>,
    item: Option<Arc<WorkItem>>,
}

impl WorkItemHandle {
    /// Whether the request has finished processing.
    pub fn completed(&self) -> bool {
        self.item.as_ref().map_or(true, |item| item.completed())
    }

    /// Block until the request has finished processing.
    pub fn wait(&self) {
        if let Some(item) = &self.item {
            wait_completed(&self.shared, item);
        }
    }

    /// Terminal status of the request. Only meaningful once completed.
    pub fn result(&self) -> Result<()> {
        self.item
            .as_ref()
            .map_or(Err(Error::OutOfWorkItems), |item| item.result())
    }

    /// Bytes read, written, or the file size, depending on the operation.
    pub fn bytes(&self) -> u64 {
        self.item.as_ref().map_or(0, |item| item.bytes())
    }

    /// Take ownership of a successful read's output buffer.
    pub fn take_buffer(&self) -> Option<Vec<u8>> {
        self.item.as_ref().and_then(|item| item.take_buffer())
    }

    /// Drop the output buffer, if any.
    pub fn free_buffer(&self) {
        if let Some(item) = &self.item {
            item.free_buffer();
        }
    }

    /// Release the work item back to the engine, waiting for completion
    /// first. Equivalent to dropping the handle.
    pub fn release(self) {}
}

impl Drop for WorkItemHandle {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            // the slot must not be recycled while the worker still owns it
            wait_completed(&self.shared, &item);
            item.free_buffer();
            self.shared.pool.free(&item);
        }
    }
}

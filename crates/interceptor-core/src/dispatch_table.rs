use std::sync::{Arc, PoisonError, RwLock};

use nix::errno::Errno;

use crate::{Call, DispatchTable, Handler};

/// In-memory dispatch table: one handler per operation id.
///
/// Calls are issued with [`SyscallTable::invoke`]. The table lock is only
/// held to fetch the handler, never while running it.
pub struct SyscallTable {
    handlers: RwLock<Vec<Handler>>,
}

impl SyscallTable {
    /// Create a table of `size` operations, all answering `-ENOSYS`.
    pub fn new(size: usize) -> Self {
        let not_implemented: Handler = Arc::new(|_call: &Call| -(Errno::ENOSYS as i64));
        Self {
            handlers: RwLock::new(vec![not_implemented; size]),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current handler of `op`.
    pub fn handler(&self, op: usize) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(op)
            .cloned()
    }

    /// Replace the handler of `op`, ignoring ids outside the table.
    pub fn set(&self, op: usize, handler: Handler) {
        if self.swap(op, handler).is_none() {
            log::warn!("operation {op} is outside the dispatch table");
        }
    }

    /// Issue a call, `-ENOSYS` for ids outside the table.
    pub fn invoke(&self, call: &Call) -> i64 {
        match self.handler(call.op) {
            Some(handler) => handler(call),
            None => -(Errno::ENOSYS as i64),
        }
    }
}

impl DispatchTable for SyscallTable {
    fn swap(&self, op: usize, target: Handler) -> Option<Handler> {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = handlers.get_mut(op)?;
        Some(std::mem::replace(slot, target))
    }

    fn restore(&self, op: usize, target: Handler) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match handlers.get_mut(op) {
            Some(slot) => *slot = target,
            None => log::warn!("cannot restore operation {op}: outside the dispatch table"),
        }
    }
}

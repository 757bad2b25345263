//! Collaborators owned by the host environment.

use std::{fmt, sync::Arc};

use nix::unistd::{Pid, Uid};

use crate::MAX_ARGS;

/// A single invocation of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// Calling process
    pub pid: Pid,
    /// Operation id
    pub op: usize,
    pub args: [u64; MAX_ARGS],
}

impl Call {
    pub fn new(pid: Pid, op: usize, args: [u64; MAX_ARGS]) -> Self {
        Self { pid, op, args }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}(", self.pid, self.op)?;
        let mut sep = "";
        for arg in self.args {
            write!(f, "{sep}{arg:#x}")?;
            sep = ", ";
        }
        write!(f, ")")
    }
}

/// Dispatch target of an operation. Returns the operation result verbatim.
pub type Handler = Arc<dyn Fn(&Call) -> i64 + Send + Sync>;

/// A live process, as resolved by the [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: Pid,
    pub owner: Uid,
}

/// Process and credential lookups.
pub trait Host: Send + Sync {
    /// Returns a handle if `pid` currently names a live process.
    fn resolve_process(&self, pid: Pid) -> Option<ProcessHandle>;

    /// Credential owner of a resolved process.
    fn owner_of(&self, process: &ProcessHandle) -> Uid {
        process.owner
    }

    /// Principal of the embedding process, used by requests issued through
    /// the registry API rather than the administrative operation.
    fn current_principal(&self) -> Uid;

    /// Principal of a calling process, `None` if it cannot be resolved.
    fn principal_of(&self, pid: Pid) -> Option<Uid> {
        self.resolve_process(pid)
            .map(|process| self.owner_of(&process))
    }

    fn is_privileged(&self, principal: Uid) -> bool {
        principal.is_root()
    }
}

/// Table mapping operation ids to their dispatch targets.
pub trait DispatchTable: Send + Sync {
    /// Install `target` for `op`, returning the previous target.
    /// Returns `None` if the table has no slot for `op`.
    fn swap(&self, op: usize, target: Handler) -> Option<Handler>;

    /// Put back a target previously returned by [`DispatchTable::swap`].
    fn restore(&self, op: usize, target: Handler);
}

/// Destination of logged invocations. Recording is fire-and-forget.
pub trait LogSink: Send + Sync {
    fn record(&self, call: &Call);
}

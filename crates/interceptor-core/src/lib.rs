//! # Interception registry
//!
//! This crate contains the policy registry deciding, on every invocation of
//! an intercepted operation (a system call of the host), whether the calling
//! process should have its arguments recorded. The invocation itself always
//! proceeds unmodified.
//!
//! # General design
//!
//! For every operation id the [`Registry`] keeps:
//! - whether the operation is intercepted, together with the original
//!   dispatch target it replaced
//! - a [`MonitorPolicy`]: `Off`, `Whitelist(pids)` (log only these pids) or
//!   `BlacklistAll(pids)` (log everybody except these pids)
//!
//! Administrative requests ([`Command`]) change interception and monitoring,
//! enforcing the permission model through the [`Host`] collaborator.
//! Intercepted operations are routed to a decorator that consults the
//! registry, optionally records the call on the [`LogSink`] and forwards it
//! to the original target. When a process exits, its pid is purged from
//! every monitored set.
//!
//! # Synchronization
//!
//! Two coarse locks cover the whole table:
//! - the *table lock* guards interception state and original targets
//! - the *set lock* guards monitoring policies
//!
//! Whenever both are needed they are acquired table first, set second, and
//! released in reverse order.

mod command;
mod config;
mod dispatch_table;
mod error;
mod host;
mod hot_path;
mod monitor_set;
mod policy;
pub mod procfs;
mod reaper;
mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command::{Command, status_code};
pub use config::{ConfigError, RegistryConfig, SectionConfig};
pub use dispatch_table::SyscallTable;
pub use error::RegistryError;
pub use host::{Call, DispatchTable, Handler, Host, LogSink, ProcessHandle};
pub use monitor_set::MonitorSet;
pub use policy::{MonitorMode, MonitorPolicy, MonitorTarget};
pub use registry::{OperationOverview, Registry};

pub use nix::unistd::{Pid, Uid};

/// Number of arguments carried by every [`Call`].
pub const MAX_ARGS: usize = 6;

use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use nix::{errno::Errno, unistd::Pid};

use crate::{
    Call, DispatchTable, Handler, Host, LogSink, MonitorMode, MonitorPolicy, RegistryConfig,
    RegistryError,
    hot_path::{Decorator, DecoratorKind},
};

/// Interception state of a single operation.
#[derive(Default)]
pub(crate) struct TableEntry {
    pub(crate) intercepted: bool,
    /// Target replaced by the interceptor, taken back on release
    pub(crate) original_target: Option<Handler>,
}

/// Data guarded by the table lock.
pub(crate) struct Table {
    pub(crate) entries: Vec<TableEntry>,
    /// Original targets of the administrative and exit operations
    pub(crate) hooks: Option<InstalledHooks>,
}

pub(crate) struct InstalledHooks {
    admin: Handler,
    exit: Handler,
}

/// Both registry locks, taken table first.
pub(crate) struct Locked<'a> {
    // Fields drop in declaration order: the set lock is released first.
    pub(crate) sets: MutexGuard<'a, Vec<MonitorPolicy>>,
    pub(crate) table: MutexGuard<'a, Table>,
}

/// Interception and monitoring state of every operation.
///
/// The registry is created with [`Registry::new`], hooked into the dispatch
/// table with [`Registry::install`] and unhooked by [`Registry::teardown`],
/// which also runs when the last reference is dropped.
pub struct Registry {
    pub(crate) config: RegistryConfig,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) dispatch: Arc<dyn DispatchTable>,
    pub(crate) sink: Arc<dyn LogSink>,
    table: Mutex<Table>,
    sets: Mutex<Vec<MonitorPolicy>>,
    /// Handed to the decorators installed in the dispatch table
    pub(crate) this: Weak<Registry>,
}

/// State of an operation which is either intercepted or monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOverview {
    pub op: usize,
    pub intercepted: bool,
    pub mode: MonitorMode,
    pub pids: Vec<Pid>,
}

impl fmt::Display for OperationOverview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pids: Vec<String> = self.pids.iter().map(Pid::to_string).collect();
        write!(
            f,
            "operation {}: intercepted={} mode={} pids=[{}]",
            self.op,
            self.intercepted,
            self.mode,
            pids.join(",")
        )
    }
}

impl Registry {
    pub fn new(
        config: RegistryConfig,
        host: Arc<dyn Host>,
        dispatch: Arc<dyn DispatchTable>,
        sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        let size = config.max_operations;
        Arc::new_cyclic(|this| Self {
            config,
            host,
            dispatch,
            sink,
            table: Mutex::new(Table {
                entries: (0..size).map(|_| TableEntry::default()).collect(),
                hooks: None,
            }),
            sets: Mutex::new(vec![MonitorPolicy::Off; size]),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // A panic can't leave a half applied transition behind: every mutation
    // is validated first, so poisoned locks are recovered.
    pub(crate) fn lock_table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_sets(&self) -> MutexGuard<'_, Vec<MonitorPolicy>> {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_all(&self) -> Locked<'_> {
        let table = self.lock_table();
        let sets = self.lock_sets();
        Locked { sets, table }
    }

    /// Route the administrative and the exit operations through the registry.
    ///
    /// The administrative operation decodes `(command, operation, pid)` from
    /// the first three call arguments, on behalf of the calling process. The
    /// exit operation purges the calling pid from every monitored set before
    /// forwarding to the original target.
    pub fn install(&self) -> Result<(), RegistryError> {
        let RegistryConfig {
            admin_operation,
            exit_operation,
            ..
        } = self.config;

        let mut table = self.lock_table();
        if table.hooks.is_some() {
            return Err(RegistryError::AlreadyActive);
        }

        let admin = self
            .dispatch
            .swap(admin_operation, self.admin_handler())
            .ok_or(RegistryError::InvalidArgument)?;

        let (decorator, handler) =
            Decorator::new(self.this.clone(), exit_operation, DecoratorKind::Exit);
        let Some(exit) = self.dispatch.swap(exit_operation, handler) else {
            self.dispatch.restore(admin_operation, admin);
            return Err(RegistryError::InvalidArgument);
        };
        decorator.set_original(exit.clone());

        table.hooks = Some(InstalledHooks { admin, exit });
        log::debug!(
            "registry installed (admin operation {admin_operation}, exit operation {exit_operation})"
        );
        Ok(())
    }

    fn admin_handler(&self) -> Handler {
        let registry = self.this.clone();
        Arc::new(move |call: &Call| match registry.upgrade() {
            Some(registry) => registry.request(
                call.pid,
                call.args[0] as i64,
                call.args[1] as i64,
                call.args[2] as i64,
            ),
            None => -(Errno::ENOSYS as i64),
        })
    }

    /// Release every intercepted operation, then restore the administrative
    /// and exit operations. Calling it more than once is harmless.
    pub fn teardown(&self) {
        let mut table = self.lock_table();
        for (op, entry) in table.entries.iter_mut().enumerate() {
            if let Some(original) = entry.original_target.take() {
                self.dispatch.restore(op, original);
                log::debug!("operation {op} released on teardown");
            }
            entry.intercepted = false;
        }
        if let Some(InstalledHooks { admin, exit }) = table.hooks.take() {
            self.dispatch.restore(self.config.exit_operation, exit);
            self.dispatch.restore(self.config.admin_operation, admin);
            log::debug!("registry uninstalled");
        }
    }

    pub fn is_intercepted(&self, op: usize) -> bool {
        self.lock_table()
            .entries
            .get(op)
            .is_some_and(|entry| entry.intercepted)
    }

    /// Monitoring mode of an operation, `None` for ids outside the table.
    pub fn mode(&self, op: usize) -> Option<MonitorMode> {
        self.lock_sets().get(op).map(MonitorPolicy::mode)
    }

    /// Check if `pid` belongs to the monitored set of `op`: a listed pid
    /// under `Whitelist`, an excluded one under `BlacklistAll`.
    pub fn check_monitored(&self, op: usize, pid: Pid) -> bool {
        self.lock_sets()
            .get(op)
            .and_then(MonitorPolicy::pids)
            .is_some_and(|pids| pids.contains(pid))
    }

    /// Check if calls of `op` issued by `pid` would be logged.
    pub fn would_log(&self, op: usize, pid: Pid) -> bool {
        self.lock_sets()
            .get(op)
            .is_some_and(|policy| policy.should_log(pid))
    }

    /// Every pid referenced by a monitored set, in ascending order.
    pub fn monitored_pids(&self) -> Vec<Pid> {
        let sets = self.lock_sets();
        let pids: BTreeSet<i32> = sets
            .iter()
            .filter_map(MonitorPolicy::pids)
            .flat_map(|pids| pids.iter().map(|pid| pid.as_raw()))
            .collect();
        pids.into_iter().map(Pid::from_raw).collect()
    }

    /// Consistent snapshot of every intercepted or monitored operation.
    pub fn overview(&self) -> Vec<OperationOverview> {
        let locked = self.lock_all();
        locked
            .table
            .entries
            .iter()
            .zip(locked.sets.iter())
            .enumerate()
            .filter(|(_, (entry, policy))| entry.intercepted || policy.mode() != MonitorMode::Off)
            .map(|(op, (entry, policy))| OperationOverview {
                op,
                intercepted: entry.intercepted,
                mode: policy.mode(),
                pids: policy.pids().map(|pids| pids.sorted()).unwrap_or_default(),
            })
            .collect()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.teardown();
    }
}

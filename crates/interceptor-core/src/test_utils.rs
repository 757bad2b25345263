//! In-memory collaborators for testing the registry.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use nix::unistd::{Pid, Uid};

use crate::{
    Call, Handler, Host, LogSink, ProcessHandle, Registry, RegistryConfig, SyscallTable,
};

/// Host with a fake process list and a settable caller.
#[derive(Debug, Default)]
pub struct FakeHost {
    processes: Mutex<HashMap<Pid, Uid>>,
    // root by default
    principal: Mutex<Option<Uid>>,
}

impl FakeHost {
    pub fn spawn(&self, pid: Pid, owner: Uid) {
        self.processes.lock().unwrap().insert(pid, owner);
    }

    pub fn kill(&self, pid: Pid) {
        self.processes.lock().unwrap().remove(&pid);
    }

    pub fn set_principal(&self, principal: Uid) {
        *self.principal.lock().unwrap() = Some(principal);
    }
}

impl Host for FakeHost {
    fn resolve_process(&self, pid: Pid) -> Option<ProcessHandle> {
        self.processes
            .lock()
            .unwrap()
            .get(&pid)
            .map(|owner| ProcessHandle { pid, owner: *owner })
    }

    fn current_principal(&self) -> Uid {
        self.principal.lock().unwrap().unwrap_or(Uid::from_raw(0))
    }
}

/// Sink keeping every recorded call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Call>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<Call> {
        self.records.lock().unwrap().clone()
    }

    pub fn logged_pids(&self) -> Vec<Pid> {
        self.records().iter().map(|call| call.pid).collect()
    }
}

impl LogSink for RecordingSink {
    fn record(&self, call: &Call) {
        self.records.lock().unwrap().push(*call);
    }
}

/// An installed registry with a counting handler behind [`TestBed::OP`].
pub struct TestBed {
    pub registry: Arc<Registry>,
    pub dispatch: Arc<SyscallTable>,
    pub host: Arc<FakeHost>,
    pub sink: Arc<RecordingSink>,
    /// Calls which reached the original handler of [`TestBed::OP`]
    pub forwarded: Arc<AtomicUsize>,
}

impl TestBed {
    pub const OP: usize = 59;
    pub const RESULT: i64 = 1234;

    pub fn new() -> Self {
        let config = RegistryConfig::default();
        let dispatch = Arc::new(SyscallTable::new(config.max_operations));
        let forwarded = Arc::new(AtomicUsize::new(0));
        {
            let forwarded = forwarded.clone();
            dispatch.set(
                Self::OP,
                Arc::new(move |_call: &Call| {
                    forwarded.fetch_add(1, Ordering::SeqCst);
                    Self::RESULT
                }),
            );
        }
        let host = Arc::new(FakeHost::default());
        let sink = Arc::new(RecordingSink::default());
        let registry = Registry::new(config, host.clone(), dispatch.clone(), sink.clone());
        registry.install().unwrap();
        Self {
            registry,
            dispatch,
            host,
            sink,
            forwarded,
        }
    }

    /// Handler currently installed for `op`.
    pub fn original(&self, op: usize) -> Handler {
        self.dispatch.handler(op).unwrap()
    }

    /// Issue a call to [`TestBed::OP`].
    pub fn call(&self, pid: Pid) -> i64 {
        self.dispatch.invoke(&Call::new(pid, Self::OP, [0; 6]))
    }

    /// Call to the administrative operation.
    pub fn admin_call(pid: Pid, command: u64, op: u64, target: u64) -> Call {
        Call::new(
            pid,
            RegistryConfig::default().admin_operation,
            [command, op, target, 0, 0, 0],
        )
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}

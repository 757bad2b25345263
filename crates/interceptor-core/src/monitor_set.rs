use std::collections::{HashSet, hash_set::Iter};

use nix::unistd::Pid;

use crate::RegistryError;

/// Duplicate-free set of process ids attached to one operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorSet {
    pids: HashSet<Pid>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pid to the set.
    ///
    /// Fails with [`RegistryError::AlreadyActive`] if the pid is already present
    /// and with [`RegistryError::ResourceExhausted`] if the set cannot grow.
    pub fn insert(&mut self, pid: Pid) -> Result<(), RegistryError> {
        if self.pids.contains(&pid) {
            return Err(RegistryError::AlreadyActive);
        }
        self.pids
            .try_reserve(1)
            .map_err(|_| RegistryError::ResourceExhausted)?;
        self.pids.insert(pid);
        Ok(())
    }

    /// Remove a pid, returning whether it was present.
    pub fn remove(&mut self, pid: Pid) -> bool {
        self.pids.remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    pub fn clear(&mut self) {
        self.pids.clear();
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Pid> {
        self.pids.iter()
    }

    /// Pids sorted by their raw value.
    pub fn sorted(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.pids.iter().copied().collect();
        pids.sort_by_key(|pid| pid.as_raw());
        pids
    }
}

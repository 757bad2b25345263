use nix::unistd::Pid;

use crate::{MonitorSet, RegistryError};

/// Monitoring mode of an operation, without its pid set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MonitorMode {
    Off,
    Whitelist,
    BlacklistAll,
}

/// Pid argument of a monitoring request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTarget {
    /// Every process (pid `0` on the administrative protocol)
    All,
    Process(Pid),
}

impl MonitorTarget {
    pub fn from_pid(pid: Pid) -> Self {
        if pid.as_raw() == 0 {
            Self::All
        } else {
            Self::Process(pid)
        }
    }
}

/// Monitoring policy of a single operation.
///
/// The pid set means different things depending on the variant, so it lives
/// inside it: a `Whitelist` set lists the monitored pids, a `BlacklistAll`
/// set lists the pids excluded from blanket monitoring. A `Whitelist` is
/// never empty, it turns into `Off` as soon as its last pid is removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum MonitorPolicy {
    #[default]
    Off,
    Whitelist(MonitorSet),
    BlacklistAll(MonitorSet),
}

impl MonitorPolicy {
    pub fn mode(&self) -> MonitorMode {
        match self {
            Self::Off => MonitorMode::Off,
            Self::Whitelist(_) => MonitorMode::Whitelist,
            Self::BlacklistAll(_) => MonitorMode::BlacklistAll,
        }
    }

    /// Pid set backing the current mode, `None` when monitoring is off.
    pub fn pids(&self) -> Option<&MonitorSet> {
        match self {
            Self::Off => None,
            Self::Whitelist(pids) | Self::BlacklistAll(pids) => Some(pids),
        }
    }

    /// Check if calls issued by `pid` must be logged.
    pub fn should_log(&self, pid: Pid) -> bool {
        match self {
            Self::Off => false,
            Self::Whitelist(pids) => pids.contains(pid),
            Self::BlacklistAll(exceptions) => !exceptions.contains(pid),
        }
    }

    /// Apply a start monitoring request.
    ///
    /// Under `BlacklistAll`, starting a single pid means it is no longer
    /// excluded.
    pub fn start(&mut self, target: MonitorTarget) -> Result<(), RegistryError> {
        let pid = match target {
            MonitorTarget::All => {
                if matches!(self, Self::BlacklistAll(_)) {
                    return Err(RegistryError::AlreadyActive);
                }
                *self = Self::BlacklistAll(MonitorSet::new());
                return Ok(());
            }
            MonitorTarget::Process(pid) => pid,
        };
        match self {
            Self::Off => {
                let mut pids = MonitorSet::new();
                pids.insert(pid)?;
                *self = Self::Whitelist(pids);
                Ok(())
            }
            Self::Whitelist(pids) => pids.insert(pid),
            Self::BlacklistAll(exceptions) => {
                if exceptions.remove(pid) {
                    Ok(())
                } else {
                    Err(RegistryError::NotFound)
                }
            }
        }
    }

    /// Apply a stop monitoring request.
    ///
    /// Under `BlacklistAll`, stopping a single pid adds it to the exceptions.
    /// Stopping every process is only meaningful under `BlacklistAll`.
    pub fn stop(&mut self, target: MonitorTarget) -> Result<(), RegistryError> {
        let pid = match target {
            MonitorTarget::All => {
                if !matches!(self, Self::BlacklistAll(_)) {
                    return Err(RegistryError::NotActive);
                }
                *self = Self::Off;
                return Ok(());
            }
            MonitorTarget::Process(pid) => pid,
        };
        match self {
            Self::Off => Err(RegistryError::NotFound),
            Self::Whitelist(pids) => {
                if !pids.remove(pid) {
                    return Err(RegistryError::NotFound);
                }
                if pids.is_empty() {
                    *self = Self::Off;
                }
                Ok(())
            }
            Self::BlacklistAll(exceptions) => exceptions.insert(pid),
        }
    }

    /// Drop every reference to an exited process, returning whether
    /// it was present.
    pub fn forget(&mut self, pid: Pid) -> bool {
        match self {
            Self::Off => false,
            Self::Whitelist(pids) => {
                let found = pids.remove(pid);
                if pids.is_empty() {
                    *self = Self::Off;
                }
                found
            }
            Self::BlacklistAll(exceptions) => exceptions.remove(pid),
        }
    }
}

use std::{fmt, str::FromStr};

use interceptor_core::{ConfigError, Pid, Registry, SectionConfig};

/// A `op:pid` monitoring request. Pid 0 stands for every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorRequest {
    pub op: usize,
    pub pid: Pid,
}

impl FromStr for MonitorRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (op, pid) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <operation>:<pid>, got '{s}'"))?;
        let op = op
            .trim()
            .parse()
            .map_err(|err| format!("invalid operation '{op}': {err}"))?;
        let pid = pid
            .trim()
            .parse()
            .map_err(|err| format!("invalid pid '{pid}': {err}"))?;
        Ok(Self {
            op,
            pid: Pid::from_raw(pid),
        })
    }
}

impl fmt::Display for MonitorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.op, self.pid)
    }
}

/// Requests applied once the registry is installed, with the privileges of
/// the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupPolicy {
    pub intercept: Vec<usize>,
    pub monitor_all: Vec<usize>,
    pub monitor: Vec<MonitorRequest>,
}

impl TryFrom<&SectionConfig> for StartupPolicy {
    type Error = ConfigError;

    fn try_from(config: &SectionConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            intercept: config.get_list_with_default("intercept", Vec::new())?,
            monitor_all: config.get_list_with_default("monitor_all", Vec::new())?,
            monitor: config.get_list_with_default("monitor", Vec::new())?,
        })
    }
}

impl StartupPolicy {
    /// Apply every request. Rejected requests are logged and skipped.
    ///
    /// Returns the number of rejected requests.
    pub fn apply(&self, registry: &Registry) -> usize {
        let mut rejected = 0;

        for &op in &self.intercept {
            if let Err(err) = registry.intercept(op) {
                log::warn!("Cannot intercept operation {op}: {err}");
                rejected += 1;
            }
        }

        let blanket = self.monitor_all.iter().map(|&op| MonitorRequest {
            op,
            pid: Pid::from_raw(0),
        });
        for request in blanket.chain(self.monitor.iter().copied()) {
            if let Err(err) = registry.start_monitor(request.op, request.pid) {
                log::warn!("Cannot monitor {request}: {err}");
                rejected += 1;
            }
        }

        rejected
    }
}

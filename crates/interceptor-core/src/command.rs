use nix::unistd::{Pid, Uid};

use crate::{
    MonitorTarget, Registry, RegistryError,
    hot_path::{Decorator, DecoratorKind},
};

/// Administrative requests understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Command {
    Intercept = 1,
    Release = 2,
    StartMonitor = 3,
    StopMonitor = 4,
}

impl TryFrom<i64> for Command {
    type Error = RegistryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Intercept),
            2 => Ok(Self::Release),
            3 => Ok(Self::StartMonitor),
            4 => Ok(Self::StopMonitor),
            _ => Err(RegistryError::InvalidArgument),
        }
    }
}

/// Status code of the administrative protocol: `0` or a negated errno.
pub fn status_code(result: Result<(), RegistryError>) -> i64 {
    match result {
        Ok(()) => 0,
        Err(err) => -(err.errno() as i64),
    }
}

impl Registry {
    /// Entry point of the administrative protocol, called by process `caller`.
    ///
    /// Permissions are checked against the credential owner of `caller`.
    /// `pid` is ignored by [`Command::Intercept`] and [`Command::Release`].
    pub fn request(&self, caller: Pid, command: i64, op: i64, pid: i64) -> i64 {
        let result = self
            .host
            .principal_of(caller)
            .ok_or(RegistryError::PermissionDenied)
            .and_then(|principal| self.decode_request(principal, command, op, pid));
        if let Err(err) = result {
            log::debug!("request ({command}, {op}, {pid}) from {caller} rejected: {err}");
        }
        status_code(result)
    }

    fn decode_request(
        &self,
        principal: Uid,
        command: i64,
        op: i64,
        pid: i64,
    ) -> Result<(), RegistryError> {
        let command = Command::try_from(command)?;
        let op = usize::try_from(op).map_err(|_| RegistryError::InvalidArgument)?;
        let pid = || {
            i32::try_from(pid)
                .map(Pid::from_raw)
                .map_err(|_| RegistryError::InvalidArgument)
        };
        match command {
            Command::Intercept => self.intercept_as(principal, op),
            Command::Release => self.release_as(principal, op),
            Command::StartMonitor => self.start_monitor_as(principal, op, pid()?),
            Command::StopMonitor => self.stop_monitor_as(principal, op, pid()?),
        }
    }

    /// Run a command with the privileges of [`Host::current_principal`](crate::Host::current_principal).
    pub fn execute(&self, command: Command, op: usize, pid: Pid) -> Result<(), RegistryError> {
        let principal = self.host.current_principal();
        match command {
            Command::Intercept => self.intercept_as(principal, op),
            Command::Release => self.release_as(principal, op),
            Command::StartMonitor => self.start_monitor_as(principal, op, pid),
            Command::StopMonitor => self.stop_monitor_as(principal, op, pid),
        }
    }

    /// Route `op` through the registry. Privileged callers only.
    pub fn intercept(&self, op: usize) -> Result<(), RegistryError> {
        self.execute(Command::Intercept, op, Pid::from_raw(0))
    }

    /// Give `op` back its original target. Privileged callers only.
    pub fn release(&self, op: usize) -> Result<(), RegistryError> {
        self.execute(Command::Release, op, Pid::from_raw(0))
    }

    /// Start monitoring `pid` for `op`, or every process if `pid` is 0.
    pub fn start_monitor(&self, op: usize, pid: Pid) -> Result<(), RegistryError> {
        self.execute(Command::StartMonitor, op, pid)
    }

    /// Stop monitoring `pid` for `op`, or every process if `pid` is 0.
    pub fn stop_monitor(&self, op: usize, pid: Pid) -> Result<(), RegistryError> {
        self.execute(Command::StopMonitor, op, pid)
    }

    fn intercept_as(&self, principal: Uid, op: usize) -> Result<(), RegistryError> {
        self.validate_operation(op)?;
        self.ensure_privileged(principal)?;

        let mut table = self.lock_table();
        let entry = table
            .entries
            .get_mut(op)
            .ok_or(RegistryError::InvalidArgument)?;
        if entry.intercepted {
            return Err(RegistryError::AlreadyActive);
        }

        let (decorator, handler) = Decorator::new(self.this.clone(), op, DecoratorKind::Intercept);
        let original = self
            .dispatch
            .swap(op, handler)
            .ok_or(RegistryError::InvalidArgument)?;
        decorator.set_original(original.clone());
        entry.original_target = Some(original);
        entry.intercepted = true;

        log::debug!("operation {op} intercepted");
        Ok(())
    }

    fn release_as(&self, principal: Uid, op: usize) -> Result<(), RegistryError> {
        self.validate_operation(op)?;
        self.ensure_privileged(principal)?;

        let mut table = self.lock_table();
        let entry = table
            .entries
            .get_mut(op)
            .ok_or(RegistryError::InvalidArgument)?;
        if !entry.intercepted {
            return Err(RegistryError::NotActive);
        }
        let original = entry
            .original_target
            .take()
            .ok_or(RegistryError::NotActive)?;
        self.dispatch.restore(op, original);
        entry.intercepted = false;

        log::debug!("operation {op} released");
        Ok(())
    }

    fn start_monitor_as(&self, principal: Uid, op: usize, pid: Pid) -> Result<(), RegistryError> {
        self.validate_operation(op)?;
        let target = self.authorize_monitor(principal, pid)?;

        self.lock_sets()
            .get_mut(op)
            .ok_or(RegistryError::InvalidArgument)?
            .start(target)?;

        log::debug!("operation {op}: start monitoring {target:?}");
        Ok(())
    }

    fn stop_monitor_as(&self, principal: Uid, op: usize, pid: Pid) -> Result<(), RegistryError> {
        self.validate_operation(op)?;
        let target = self.authorize_monitor(principal, pid)?;

        self.lock_sets()
            .get_mut(op)
            .ok_or(RegistryError::InvalidArgument)?
            .stop(target)?;

        log::debug!("operation {op}: stop monitoring {target:?}");
        Ok(())
    }

    /// Valid ids are `1..max_operations`, except the administrative operation.
    fn validate_operation(&self, op: usize) -> Result<(), RegistryError> {
        if op == 0 || op >= self.config.max_operations || op == self.config.admin_operation {
            return Err(RegistryError::InvalidArgument);
        }
        Ok(())
    }

    fn ensure_privileged(&self, principal: Uid) -> Result<(), RegistryError> {
        if self.host.is_privileged(principal) {
            Ok(())
        } else {
            Err(RegistryError::PermissionDenied)
        }
    }

    /// Validate the pid of a monitoring request and check `principal` may use it.
    ///
    /// Unprivileged principals can only target processes they own, and never
    /// every process.
    fn authorize_monitor(&self, principal: Uid, pid: Pid) -> Result<MonitorTarget, RegistryError> {
        if pid.as_raw() < 0 {
            return Err(RegistryError::InvalidArgument);
        }
        let target = MonitorTarget::from_pid(pid);
        let process = match target {
            MonitorTarget::All => None,
            MonitorTarget::Process(pid) => Some(
                self.host
                    .resolve_process(pid)
                    .ok_or(RegistryError::InvalidArgument)?,
            ),
        };

        if self.host.is_privileged(principal) {
            return Ok(target);
        }
        match process {
            Some(process) if self.host.owner_of(&process) == principal => Ok(target),
            _ => Err(RegistryError::PermissionDenied),
        }
    }
}

#[cfg(test)]
mod tests {
    use nix::{errno::Errno, unistd::Uid};

    use super::*;
    use crate::{MonitorMode, test_utils::TestBed};

    const PID_1: Pid = Pid::from_raw(42);
    const PID_2: Pid = Pid::from_raw(43);
    const ALL: Pid = Pid::from_raw(0);
    const USER: Uid = Uid::from_raw(1000);
    const OTHER_USER: Uid = Uid::from_raw(1001);
    const ROOT_PID: Pid = Pid::from_raw(1);
    const ROOT: Uid = Uid::from_raw(0);

    #[test]
    fn intercept_release() {
        let bed = TestBed::new();
        assert_eq!(bed.registry.intercept(TestBed::OP), Ok(()));
        assert!(bed.registry.is_intercepted(TestBed::OP));
        assert_eq!(
            bed.registry.intercept(TestBed::OP),
            Err(RegistryError::AlreadyActive)
        );
        assert_eq!(bed.registry.release(TestBed::OP), Ok(()));
        assert!(!bed.registry.is_intercepted(TestBed::OP));
        assert_eq!(
            bed.registry.release(TestBed::OP),
            Err(RegistryError::NotActive)
        );
        // can be intercepted again
        assert_eq!(bed.registry.intercept(TestBed::OP), Ok(()));
    }

    #[test]
    fn invalid_operations() {
        let bed = TestBed::new();
        let config = *bed.registry.config();
        for op in [0, config.admin_operation, config.max_operations, usize::MAX] {
            assert_eq!(
                bed.registry.intercept(op),
                Err(RegistryError::InvalidArgument)
            );
            assert_eq!(bed.registry.release(op), Err(RegistryError::InvalidArgument));
            assert_eq!(
                bed.registry.start_monitor(op, ALL),
                Err(RegistryError::InvalidArgument)
            );
            assert_eq!(
                bed.registry.stop_monitor(op, ALL),
                Err(RegistryError::InvalidArgument)
            );
        }
        assert_eq!(
            bed.registry.intercept(config.max_operations - 1),
            Ok(())
        );
    }

    #[test]
    fn intercept_requires_privileges() {
        let bed = TestBed::new();
        bed.host.set_principal(USER);
        assert_eq!(
            bed.registry.intercept(TestBed::OP),
            Err(RegistryError::PermissionDenied)
        );
        bed.host.set_principal(Uid::from_raw(0));
        bed.registry.intercept(TestBed::OP).unwrap();
        bed.host.set_principal(USER);
        assert_eq!(
            bed.registry.release(TestBed::OP),
            Err(RegistryError::PermissionDenied)
        );
        assert!(bed.registry.is_intercepted(TestBed::OP));
    }

    #[test]
    fn monitor_all_twice() {
        let bed = TestBed::new();
        assert_eq!(bed.registry.start_monitor(TestBed::OP, ALL), Ok(()));
        assert_eq!(
            bed.registry.start_monitor(TestBed::OP, ALL),
            Err(RegistryError::AlreadyActive)
        );
        assert_eq!(bed.registry.stop_monitor(TestBed::OP, ALL), Ok(()));
        assert_eq!(bed.registry.mode(TestBed::OP), Some(MonitorMode::Off));
        assert_eq!(bed.registry.start_monitor(TestBed::OP, ALL), Ok(()));
    }

    #[test]
    fn stop_all_under_whitelist() {
        let bed = TestBed::new();
        bed.host.spawn(PID_1, USER);
        bed.registry.start_monitor(TestBed::OP, PID_1).unwrap();
        assert_eq!(
            bed.registry.stop_monitor(TestBed::OP, ALL),
            Err(RegistryError::NotActive)
        );
        assert!(bed.registry.check_monitored(TestBed::OP, PID_1));
    }

    #[test]
    fn invalid_pids() {
        let bed = TestBed::new();
        assert_eq!(
            bed.registry.start_monitor(TestBed::OP, Pid::from_raw(-1)),
            Err(RegistryError::InvalidArgument)
        );
        // not running
        assert_eq!(
            bed.registry.start_monitor(TestBed::OP, PID_1),
            Err(RegistryError::InvalidArgument)
        );
        assert_eq!(
            bed.registry.stop_monitor(TestBed::OP, PID_1),
            Err(RegistryError::InvalidArgument)
        );
    }

    #[test]
    fn unprivileged_monitoring() {
        let bed = TestBed::new();
        bed.host.spawn(PID_1, USER);
        bed.host.spawn(PID_2, OTHER_USER);
        bed.host.set_principal(USER);

        assert_eq!(
            bed.registry.start_monitor(TestBed::OP, PID_2),
            Err(RegistryError::PermissionDenied)
        );
        assert_eq!(bed.registry.start_monitor(TestBed::OP, PID_1), Ok(()));
        assert_eq!(
            bed.registry.start_monitor(TestBed::OP, ALL),
            Err(RegistryError::PermissionDenied)
        );
        assert_eq!(
            bed.registry.stop_monitor(TestBed::OP, ALL),
            Err(RegistryError::PermissionDenied)
        );
        assert_eq!(
            bed.registry.stop_monitor(TestBed::OP, PID_2),
            Err(RegistryError::PermissionDenied)
        );
        assert_eq!(bed.registry.stop_monitor(TestBed::OP, PID_1), Ok(()));
    }

    #[test]
    fn root_monitors_anybody() {
        let bed = TestBed::new();
        bed.host.spawn(PID_2, OTHER_USER);
        assert_eq!(bed.registry.start_monitor(TestBed::OP, PID_2), Ok(()));
        assert_eq!(
            bed.registry.start_monitor(TestBed::OP, PID_2),
            Err(RegistryError::AlreadyActive)
        );
    }

    #[test]
    fn protocol_status_codes() {
        let bed = TestBed::new();
        bed.host.spawn(ROOT_PID, ROOT);
        bed.host.spawn(PID_1, USER);
        let op = TestBed::OP as i64;
        let request = |caller, command, op, pid| bed.registry.request(caller, command, op, pid);

        assert_eq!(request(ROOT_PID, 1, op, 0), 0);
        assert_eq!(request(ROOT_PID, 1, op, 0), -(Errno::EBUSY as i64));
        assert_eq!(request(ROOT_PID, 2, op, 0), 0);
        assert_eq!(request(ROOT_PID, 2, op, 0), -(Errno::EINVAL as i64));
        assert_eq!(request(ROOT_PID, 3, op, -5), -(Errno::EINVAL as i64));
        assert_eq!(request(ROOT_PID, 3, -1, 0), -(Errno::EINVAL as i64));
        assert_eq!(request(ROOT_PID, 3, op, i64::MAX), -(Errno::EINVAL as i64));
        assert_eq!(request(ROOT_PID, 9, op, 0), -(Errno::EINVAL as i64));

        assert_eq!(request(PID_1, 1, op, 0), -(Errno::EPERM as i64));
        assert_eq!(request(PID_1, 3, op, 0), -(Errno::EPERM as i64));
        assert_eq!(request(PID_1, 3, op, PID_1.as_raw() as i64), 0);
        // callers which are not running have no credentials
        assert_eq!(request(PID_2, 3, op, 0), -(Errno::EPERM as i64));
    }

    #[test]
    fn pid_ignored_by_intercept_and_release() {
        let bed = TestBed::new();
        bed.host.spawn(ROOT_PID, ROOT);
        let op = TestBed::OP as i64;
        assert_eq!(bed.registry.request(ROOT_PID, 1, op, 1 << 40), 0);
        assert!(bed.registry.is_intercepted(TestBed::OP));
        assert_eq!(bed.registry.request(ROOT_PID, 2, op, -7), 0);
        assert!(!bed.registry.is_intercepted(TestBed::OP));
    }

    #[test]
    fn protocol_through_dispatch_table() {
        let bed = TestBed::new();
        bed.host.spawn(ROOT_PID, ROOT);
        bed.host.spawn(PID_1, USER);
        bed.host.spawn(PID_2, OTHER_USER);
        let op = TestBed::OP as u64;
        let invoke = |caller, command: Command, target: u64| {
            bed.dispatch
                .invoke(&TestBed::admin_call(caller, command as u64, op, target))
        };

        // the principal is the owner of the calling process, not the daemon
        assert_eq!(invoke(PID_1, Command::Intercept, 0), -(Errno::EPERM as i64));
        assert!(!bed.registry.is_intercepted(TestBed::OP));
        assert_eq!(invoke(ROOT_PID, Command::Intercept, 0), 0);
        assert!(bed.registry.is_intercepted(TestBed::OP));
        assert_eq!(invoke(PID_1, Command::Release, 0), -(Errno::EPERM as i64));

        assert_eq!(
            invoke(PID_1, Command::StartMonitor, PID_2.as_raw() as u64),
            -(Errno::EPERM as i64)
        );
        assert_eq!(invoke(PID_1, Command::StartMonitor, PID_1.as_raw() as u64), 0);
        assert!(bed.registry.check_monitored(TestBed::OP, PID_1));

        // negative pids travel as two's complement
        assert_eq!(
            invoke(ROOT_PID, Command::StopMonitor, -3i64 as u64),
            -(Errno::EINVAL as i64)
        );
    }

    #[test]
    fn command_names() {
        assert_eq!(Command::StartMonitor.to_string(), "start-monitor");
        assert_eq!(Command::try_from(4), Ok(Command::StopMonitor));
        assert_eq!(Command::try_from(0), Err(RegistryError::InvalidArgument));
    }
}

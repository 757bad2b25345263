use nix::unistd::Pid;

use crate::Registry;

impl Registry {
    /// Purge an exited process from every monitored set.
    ///
    /// Whitelists left empty are turned off, blanket monitoring is kept.
    /// Returns whether the pid was found in at least one set.
    pub fn reap(&self, pid: Pid) -> bool {
        let mut locked = self.lock_all();
        let mut found = false;
        for policy in locked.sets.iter_mut() {
            found |= policy.forget(pid);
        }
        if found {
            log::trace!("process {pid} exited, removed from monitored sets");
        }
        found
    }

    /// Reap every monitored pid which is no longer live on the host.
    ///
    /// Covers processes whose exit never went through the exit operation.
    /// Returns the reaped pids.
    pub fn reap_exited(&self) -> Vec<Pid> {
        self.monitored_pids()
            .into_iter()
            .filter(|pid| self.host.resolve_process(*pid).is_none())
            .filter(|pid| self.reap(*pid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::Ordering,
        thread,
    };

    use nix::unistd::Uid;

    use super::*;
    use crate::{MonitorMode, MonitorPolicy, test_utils::TestBed};

    const PID_1: Pid = Pid::from_raw(42);
    const PID_2: Pid = Pid::from_raw(43);
    const ALL: Pid = Pid::from_raw(0);
    const USER: Uid = Uid::from_raw(1000);

    #[test]
    fn reap_whitelists() {
        let bed = TestBed::new();
        bed.host.spawn(PID_1, USER);
        bed.host.spawn(PID_2, USER);
        for op in [2, 3, 4] {
            bed.registry.start_monitor(op, PID_1).unwrap();
        }
        bed.registry.start_monitor(3, PID_2).unwrap();
        // PID_1 excluded from blanket monitoring
        bed.registry.start_monitor(5, ALL).unwrap();
        bed.registry.stop_monitor(5, PID_1).unwrap();
        assert!(bed.registry.check_monitored(5, PID_1));

        assert!(bed.registry.reap(PID_1));
        for op in 1..bed.registry.config().max_operations {
            assert!(!bed.registry.check_monitored(op, PID_1));
        }
        assert_eq!(bed.registry.mode(2), Some(MonitorMode::Off));
        assert_eq!(bed.registry.mode(3), Some(MonitorMode::Whitelist));
        assert_eq!(bed.registry.mode(4), Some(MonitorMode::Off));
        assert!(bed.registry.check_monitored(3, PID_2));
        assert_eq!(bed.registry.mode(5), Some(MonitorMode::BlacklistAll));

        assert!(!bed.registry.reap(PID_1));
    }

    #[test]
    fn reap_keeps_blanket_monitoring() {
        let bed = TestBed::new();
        bed.host.spawn(PID_1, USER);
        bed.registry.start_monitor(TestBed::OP, ALL).unwrap();
        bed.registry.stop_monitor(TestBed::OP, PID_1).unwrap();

        assert!(bed.registry.reap(PID_1));
        assert_eq!(bed.registry.mode(TestBed::OP), Some(MonitorMode::BlacklistAll));
        assert!(bed.registry.monitored_pids().is_empty());
        assert!(!bed.registry.check_monitored(TestBed::OP, PID_1));
        // a new process reusing the pid is logged
        assert!(bed.registry.would_log(TestBed::OP, PID_1));
    }

    #[test]
    fn reap_vanished_processes() {
        let bed = TestBed::new();
        bed.host.spawn(PID_1, USER);
        bed.host.spawn(PID_2, USER);
        bed.registry.start_monitor(2, PID_1).unwrap();
        bed.registry.start_monitor(TestBed::OP, ALL).unwrap();
        bed.registry.stop_monitor(TestBed::OP, PID_2).unwrap();

        assert!(bed.registry.reap_exited().is_empty());

        bed.host.kill(PID_1);
        bed.host.kill(PID_2);
        assert_eq!(bed.registry.reap_exited(), vec![PID_1, PID_2]);
        assert_eq!(bed.registry.mode(2), Some(MonitorMode::Off));
        assert_eq!(bed.registry.mode(TestBed::OP), Some(MonitorMode::BlacklistAll));
        assert!(bed.registry.monitored_pids().is_empty());
    }

    #[test]
    fn concurrent_commands_and_calls() {
        const MONITORS: i32 = 8;
        const CALLERS: usize = 8;
        const ROUNDS: usize = 200;

        let bed = TestBed::new();
        for pid in 1..=MONITORS {
            bed.host.spawn(Pid::from_raw(pid), USER);
        }
        bed.registry.intercept(TestBed::OP).unwrap();

        thread::scope(|s| {
            for pid in 1..=MONITORS {
                let registry = &bed.registry;
                s.spawn(move || {
                    let pid = Pid::from_raw(pid);
                    for _ in 0..ROUNDS {
                        registry.start_monitor(TestBed::OP, pid).unwrap();
                        registry.stop_monitor(TestBed::OP, pid).unwrap();
                    }
                    registry.start_monitor(TestBed::OP, pid).unwrap();
                });
            }
            for caller in 0..CALLERS {
                let bed = &bed;
                s.spawn(move || {
                    let pid = Pid::from_raw(caller as i32 % MONITORS + 1);
                    for _ in 0..ROUNDS {
                        assert_eq!(bed.call(pid), TestBed::RESULT);
                        if caller % 2 == 0 {
                            bed.registry.reap(Pid::from_raw(9999));
                        }
                        let sets = bed.registry.lock_sets();
                        assert!(!matches!(&sets[TestBed::OP], MonitorPolicy::Whitelist(pids) if pids.is_empty()));
                    }
                });
            }
        });

        assert_eq!(bed.forwarded.load(Ordering::SeqCst), CALLERS * ROUNDS);
        assert_eq!(bed.registry.mode(TestBed::OP), Some(MonitorMode::Whitelist));
        assert_eq!(bed.registry.monitored_pids().len(), MONITORS as usize);
    }
}

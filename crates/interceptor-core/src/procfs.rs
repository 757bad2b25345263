//! [`Host`] backed by procfs and the credentials of the running process.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use nix::unistd::{Pid, Uid, geteuid};
use thiserror::Error;

use crate::{Host, ProcessHandle};

#[derive(Error, Debug)]
pub enum ProcfsError {
    #[error("reading file failed {path}")]
    ReadFile {
        #[source]
        source: io::Error,
        path: String,
    },
    #[error("user id for process {0} not found")]
    UserNotFound(Pid),
    #[error(transparent)]
    ParseIntError(#[from] std::num::ParseIntError),
}

/// Returns the real user id of a given process.
pub fn get_process_user_id(pid: Pid) -> Result<Uid, ProcfsError> {
    get_process_user_id_at(Path::new(ProcfsHost::DEFAULT_ROOT), pid)
}

fn get_process_user_id_at(root: &Path, pid: Pid) -> Result<Uid, ProcfsError> {
    let path = root.join(pid.to_string()).join("status");
    let file = File::open(&path).map_err(|source| ProcfsError::ReadFile {
        source,
        path: path.display().to_string(),
    })?;

    let reader = BufReader::new(file);
    for line in reader.lines().map_while(Result::ok) {
        if let Some(uid) = parse_uid_line(&line) {
            return uid;
        }
    }

    Err(ProcfsError::UserNotFound(pid))
}

/// Parse the real uid out of a `Uid:` line of `/proc/<pid>/status`.
///
/// The line lists real, effective, saved and filesystem uid in this order.
fn parse_uid_line(line: &str) -> Option<Result<Uid, ProcfsError>> {
    let values = line.strip_prefix("Uid:")?;
    let real = values.split_whitespace().next()?;
    Some(real.parse().map(Uid::from_raw).map_err(ProcfsError::from))
}

/// Processes are looked up in procfs and a calling process acts as its real
/// user. Requests issued through the registry API act as the effective user
/// of this process. Root is the only privileged user.
#[derive(Debug, Clone)]
pub struct ProcfsHost {
    root: PathBuf,
}

impl ProcfsHost {
    pub const DEFAULT_ROOT: &'static str = "/proc";

    /// Host reading from a procfs mounted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcfsHost {
    fn default() -> Self {
        Self::with_root(Self::DEFAULT_ROOT)
    }
}

impl Host for ProcfsHost {
    fn resolve_process(&self, pid: Pid) -> Option<ProcessHandle> {
        if pid.as_raw() <= 0 {
            return None;
        }
        match get_process_user_id_at(&self.root, pid) {
            Ok(owner) => Some(ProcessHandle { pid, owner }),
            Err(ProcfsError::ReadFile { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                None
            }
            Err(err) => {
                log::debug!("cannot resolve process {pid}: {err}");
                None
            }
        }
    }

    fn current_principal(&self) -> Uid {
        geteuid()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const STATUS: &str = "Name:\tcat\nUmask:\t0022\nState:\tR (running)\nTgid:\t4242\nPid:\t4242\nPPid:\t1\nUid:\t1000\t0\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n";

    fn fake_procfs(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("interceptor-procfs-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("4242")).unwrap();
        fs::write(root.join("4242").join("status"), STATUS).unwrap();
        fs::create_dir_all(root.join("4343")).unwrap();
        fs::write(root.join("4343").join("status"), "Name:\tbroken\n").unwrap();
        root
    }

    #[test]
    fn parse_real_uid() {
        assert_eq!(
            parse_uid_line("Uid:\t1000\t0\t1000\t1000").unwrap().unwrap(),
            Uid::from_raw(1000)
        );
        assert!(parse_uid_line("Gid:\t1000\t1000\t1000\t1000").is_none());
        assert!(parse_uid_line("Uid:\tabc").unwrap().is_err());
    }

    #[test]
    fn resolve_from_status() {
        let root = fake_procfs("resolve");
        let host = ProcfsHost::with_root(&root);

        let process = host.resolve_process(Pid::from_raw(4242)).unwrap();
        assert_eq!(process.pid, Pid::from_raw(4242));
        assert_eq!(host.owner_of(&process), Uid::from_raw(1000));
        assert_eq!(host.principal_of(Pid::from_raw(4242)), Some(Uid::from_raw(1000)));
        assert_eq!(host.principal_of(Pid::from_raw(4444)), None);

        assert!(host.resolve_process(Pid::from_raw(4343)).is_none());
        assert!(host.resolve_process(Pid::from_raw(4444)).is_none());
        assert!(host.resolve_process(Pid::from_raw(0)).is_none());
        assert!(host.resolve_process(Pid::from_raw(-1)).is_none());

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn current_process_is_live() {
        let host = ProcfsHost::default();
        let process = host.resolve_process(Pid::this()).unwrap();
        assert_eq!(host.owner_of(&process), nix::unistd::getuid());
        assert_eq!(host.current_principal(), geteuid());
    }

    #[test]
    fn root_is_privileged() {
        let host = ProcfsHost::default();
        assert!(host.is_privileged(Uid::from_raw(0)));
        assert!(!host.is_privileged(Uid::from_raw(1000)));
    }
}

use nix::errno::Errno;
use thiserror::Error;

/// Error returned by administrative requests against the [`Registry`](crate::Registry).
///
/// Every failure is detected before the registry is modified.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("permission denied")]
    PermissionDenied,
    #[error("already active")]
    AlreadyActive,
    #[error("not active")]
    NotActive,
    #[error("not found")]
    NotFound,
    #[error("cannot allocate memory for the monitored set")]
    ResourceExhausted,
}

impl RegistryError {
    /// Errno reported on the administrative protocol.
    pub fn errno(&self) -> Errno {
        match self {
            Self::InvalidArgument | Self::NotActive | Self::NotFound => Errno::EINVAL,
            Self::PermissionDenied => Errno::EPERM,
            Self::AlreadyActive => Errno::EBUSY,
            Self::ResourceExhausted => Errno::ENOMEM,
        }
    }
}

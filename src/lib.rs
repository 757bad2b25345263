//! Interceptor monitors the invocations of selected operations (system calls)
//! on a per process basis.
//!
//! The policy engine lives in [`interceptor_core`]: an owned
//! [`Registry`](interceptor_core::Registry) tracks which operations are
//! intercepted and, for each one, which processes have their invocations
//! recorded. This crate provides `interceptord`, the daemon which:
//!
//! - loads the `INI` [configuration](crate::interceptord::InterceptorConfig)
//! - installs the registry in an in-process dispatch table, with the
//!   [invocation logger](invocation_logger::InvocationLogger) as sink of the
//!   calls issued through that table
//! - applies the startup [policy](crate::interceptord::StartupPolicy) and
//!   logs the resulting overview
//! - keeps the monitored sets clean with an
//!   [exit watcher](crate::interceptord::ExitWatcher)
//!
//! ```sh
//! interceptord --config-file /etc/interceptor.ini -v
//! ```

pub mod cli;
pub mod interceptord;
pub mod utils;

pub mod metadata {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Init logger. We log from info level and above, hide timestamp
/// and module path.
/// If RUST_LOG is set, we assume the user wants to debug something
/// and use env_logger default behaviour.
pub fn init_logger(override_log_level: Option<log::LevelFilter>) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    } else {
        let level_filter = override_log_level.unwrap_or(log::LevelFilter::Info);

        env_logger::builder().filter_level(level_filter).init();
    }
}

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use interceptor_core::{Registry, RegistryConfig, SyscallTable, procfs::ProcfsHost};
use invocation_logger::InvocationLogger;
use nix::unistd::geteuid;
use tokio::signal::unix::{SignalKind, signal};

use crate::cli::InterceptorDaemonOpts;

mod config;
mod exit_watcher;
mod policy;

pub use config::InterceptorConfig;
pub use exit_watcher::ExitWatcher;
pub use policy::{MonitorRequest, StartupPolicy};

/// Configuration section of the registry.
const REGISTRY_CONFIG: &str = "registry";
/// Configuration section of the startup policy.
const POLICY_CONFIG: &str = "policy";
/// Configuration section of the invocation logger.
const LOGGER_CONFIG: &str = "invocation-logger";
/// Configuration section of the daemon itself.
const DAEMON_CONFIG: &str = "interceptord";

const DEFAULT_EXIT_POLL_INTERVAL_MS: u64 = 250;

pub async fn interceptor_daemon_run(options: &InterceptorDaemonOpts) -> Result<()> {
    log::trace!("Interceptor Daemon Options: {:?}", options);

    ensure!(geteuid().is_root(), "You must run this as root user!!!");

    let config = if let Some(custom_file) = &options.config_file {
        InterceptorConfig::with_custom_file(custom_file)?
    } else {
        InterceptorConfig::new()?
    };

    let registry_config = RegistryConfig::try_from(&config.get_section(REGISTRY_CONFIG))
        .context("Invalid registry configuration")?;
    let policy = StartupPolicy::try_from(&config.get_section(POLICY_CONFIG))
        .context("Invalid policy configuration")?;
    let logger_config = invocation_logger::Config::try_from(&config.get_section(LOGGER_CONFIG))
        .context("Invalid invocation logger configuration")?;
    let exit_poll_interval = config
        .get_section(DAEMON_CONFIG)
        .with_default("exit_poll_interval_ms", DEFAULT_EXIT_POLL_INTERVAL_MS)
        .map(Duration::from_millis)
        .context("Invalid daemon configuration")?;

    let logger = match InvocationLogger::from_config(&logger_config) {
        Ok(logger) => logger,
        Err(logger) => {
            log::warn!("Failed to connect to syslog");
            logger
        }
    };

    let dispatch = Arc::new(SyscallTable::new(registry_config.max_operations));
    let registry = Registry::new(
        registry_config,
        Arc::new(ProcfsHost::default()),
        dispatch,
        Arc::new(logger),
    );
    registry
        .install()
        .context("Cannot install the registry in the dispatch table")?;

    let rejected = policy.apply(&registry);
    if rejected > 0 {
        log::warn!("{rejected} startup requests rejected");
    }
    for operation in registry.overview() {
        log::debug!("{operation}");
    }

    let exit_watcher = (!exit_poll_interval.is_zero())
        .then(|| ExitWatcher::start(registry.clone(), exit_poll_interval));

    log::info!("Interceptor Daemon started");

    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_hup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sig_int.recv() => log::trace!("SIGINT received"),
        _ = sig_term.recv() => log::trace!("SIGTERM received"),
        _ = sig_hup.recv() => log::trace!("SIGHUP received"),
    }

    if let Some(exit_watcher) = exit_watcher {
        log::info!("Terminating the Exit Watcher...");
        exit_watcher.stop().await;
    }

    log::info!("Terminating Interceptor Daemon...");
    registry.teardown();

    Ok(())
}

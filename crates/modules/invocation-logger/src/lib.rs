//! Log sink writing monitored invocations to the console and to syslog.

use std::{
    cell::OnceCell,
    env,
    fs::File,
    io,
    os::{
        fd::AsFd,
        unix::{fs::MetadataExt, net::UnixDatagram},
    },
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use interceptor_core::{Call, ConfigError, LogSink, MAX_ARGS, SectionConfig};
use serde::Serialize;
use thiserror::Error;

const UNIX_SOCK_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];
const PRIORITY: u8 = 30; // facility * 8 + severity. facility: daemon (3); severity: info (6)

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Plaintext,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;
    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "plaintext" => Ok(OutputFormat::Plaintext),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: String::from("output_format"),
                value: format.to_string(),
                err: String::from("Output format must be one of [plaintext, json]"),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub console: bool,
    pub syslog: bool,
    pub output_format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: true,
            syslog: false,
            output_format: OutputFormat::Plaintext,
        }
    }
}

impl TryFrom<&SectionConfig> for Config {
    type Error = ConfigError;

    fn try_from(config: &SectionConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            console: config.with_default("console", true)?,
            syslog: config.with_default("syslog", false)?,
            output_format: config.with_default("output_format", OutputFormat::Plaintext)?,
        })
    }
}

/// A single recorded invocation, as serialized in json output.
#[derive(Debug, Serialize)]
struct InvocationRecord {
    pid: i32,
    op: usize,
    args: [u64; MAX_ARGS],
}

impl From<&Call> for InvocationRecord {
    fn from(call: &Call) -> Self {
        Self {
            pid: call.pid.as_raw(),
            op: call.op,
            args: call.args,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvocationLoggerError {
    #[error("error serializing invocation: {0}")]
    Json(String),
    #[error("io error")]
    IO(#[from] io::Error),
}

#[derive(Debug)]
pub struct InvocationLogger {
    console: bool,
    syslog: Option<UnixDatagram>,
    syslog_enabled: AtomicBool,
    output_format: OutputFormat,
}

impl InvocationLogger {
    /// Build the logger. When syslog is requested but unreachable the logger
    /// is still usable and returned as `Err`.
    pub fn from_config(config: &Config) -> Result<Self, Self> {
        let Config {
            console,
            syslog,
            output_format,
        } = config;

        let connected_to_journal = io::stderr()
            .as_fd()
            .try_clone_to_owned()
            .and_then(|fd| File::from(fd).metadata())
            .map(|meta| format!("{}:{}", meta.dev(), meta.ino()))
            .ok()
            .and_then(|stderr| {
                env::var_os("JOURNAL_STREAM").map(|s| s.to_string_lossy() == stderr.as_str())
            })
            .unwrap_or(false);

        let opt_sock = (*syslog && !connected_to_journal)
            .then(|| {
                let sock = UnixDatagram::unbound().ok()?;
                UNIX_SOCK_PATHS
                    .iter()
                    .find_map(|path| sock.connect(path).ok())
                    .map(|_| sock)
            })
            .flatten();

        let failed = *syslog && !connected_to_journal && opt_sock.is_none();
        let logger = Self::new(*console, opt_sock, *output_format);
        if failed { Err(logger) } else { Ok(logger) }
    }

    fn new(console: bool, syslog: Option<UnixDatagram>, output_format: OutputFormat) -> Self {
        Self {
            console,
            syslog_enabled: AtomicBool::new(syslog.is_some()),
            syslog,
            output_format,
        }
    }

    pub fn syslog_enabled(&self) -> bool {
        self.syslog_enabled.load(Ordering::Relaxed)
    }

    fn render(&self, call: &Call) -> Result<String, InvocationLoggerError> {
        match self.output_format {
            OutputFormat::Plaintext => Ok(format!("intercepted {call}")),
            OutputFormat::Json => serde_json::to_string(&InvocationRecord::from(call))
                .map_err(|err| InvocationLoggerError::Json(err.to_string())),
        }
    }

    fn process(&self, call: &Call) -> Result<(), InvocationLoggerError> {
        let line = OnceCell::new();
        let line = || -> Result<&String, InvocationLoggerError> {
            line.get_or_init(|| self.render(call))
                .as_ref()
                .map_err(|err| InvocationLoggerError::Json(err.to_string()))
        };

        if self.console {
            println!("{}", line()?);
        }

        if let Some(syslog) = self.syslog.as_ref().filter(|_| self.syslog_enabled()) {
            let out = format!("<{PRIORITY}>{}", line()?);
            syslog.send(out.as_bytes())?;
        }
        Ok(())
    }

    /// Only socket errors disable syslog.
    fn report_failure(&self, err: &InvocationLoggerError) {
        match err {
            InvocationLoggerError::IO(_)
                if self.syslog_enabled.swap(false, Ordering::Relaxed) =>
            {
                log::warn!("Writing to logs failed: {err}, syslog disabled");
            }
            _ => log::warn!("Writing to logs failed: {err}"),
        }
    }
}

impl LogSink for InvocationLogger {
    fn record(&self, call: &Call) {
        if let Err(e) = self.process(call) {
            self.report_failure(&e);
        }
    }
}

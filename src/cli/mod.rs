use std::ffi::OsString;

use clap::{ArgAction, Parser};

pub const NAME: &str = "interceptord";

#[derive(Parser, Debug, Clone)]
#[clap(name = NAME)]
#[clap(about = "Syscall interception daemon")]
#[clap(version = crate::metadata::VERSION)]
#[clap(disable_help_subcommand = true)]
pub struct InterceptorDaemonOpts {
    /// Path of the INI configuration file
    #[clap(long)]
    pub config_file: Option<String>,

    /// Pass many times for a more verbose output. Passing `-v` adds debug logs, `-vv` enables trace logging
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,
}

impl InterceptorDaemonOpts {
    pub fn log_level(&self) -> log::LevelFilter {
        log_level_from_verbosity_flag_count(self.verbosity)
    }
}

pub fn parse_from_args() -> InterceptorDaemonOpts {
    parse_from(std::env::args_os())
}

pub fn parse_from<I, T>(args: I) -> InterceptorDaemonOpts
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    InterceptorDaemonOpts::try_parse_from(args).unwrap_or_else(|e| e.exit())
}

fn log_level_from_verbosity_flag_count(num: u8) -> log::LevelFilter {
    match num {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        2..=u8::MAX => log::LevelFilter::Trace,
    }
}

use anyhow::Result;
use interceptor::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse cli and handle clap errors
    let options = cli::parse_from_args();

    // Override the default log_level if there is a greater verbosity flag
    interceptor::init_logger(Some(options.log_level()));

    match interceptor::interceptord::interceptor_daemon_run(&options).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            interceptor::utils::report_error(&e);
            std::process::exit(1);
        }
    }
}

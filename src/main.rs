//! HTTP Ping - command-line entry point

use anyhow::Context;
use clap::Parser;
use http_ping::{
    cli::Cli,
    config::{display_config_summary, load_config, validate_config, EnvManager},
    error::{AppError, ErrorReporter},
    logging::ConsoleSink,
    HttpPing, PKG_NAME, VERSION,
};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();

    if let Err(message) = cli.validate() {
        eprintln!("error: {}", message);
        process::exit(2);
    }

    if let Err(e) = run_application(cli.clone()).await {
        let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);
        match e.downcast_ref::<AppError>() {
            Some(app_error) => {
                eprintln!("{}", reporter.render(app_error));
                process::exit(app_error.exit_code());
            }
            None => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        }
    }
}

async fn run_application(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    if config.debug {
        eprintln!("{} v{}", PKG_NAME, VERSION);
        eprintln!("{}", display_config_summary(&config));
        for warning in EnvManager::validate_current_env() {
            eprintln!("{}", warning);
        }
        eprintln!();
    }

    for warning in validate_config(&config)? {
        eprintln!("{}", warning.format(config.enable_color));
    }

    let app = HttpPing::new(config, Arc::new(ConsoleSink::new())).context("failed to start the pinger")?;
    app.run().await?;

    Ok(())
}

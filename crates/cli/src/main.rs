#![forbid(unsafe_code)]

use clap::Parser;
use config::Config;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{debug, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use waeup_identifier::{
    cli::{Cli, Command},
    commands,
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. `WAEUP_LOG` can still tune single crates, e.g.
    // `WAEUP_LOG=webservice=debug waeup-identifier fetch -s AB123456`.
    let env_filter = EnvFilter::builder()
        .with_default_directive("hyper=warn".parse()?)
        .with_env_var("WAEUP_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    // load config
    let config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        None => {
            let candidates = Config::default_location();
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?cli, scanner = ?config.scanner, server = %config.server.url, "starting");

    let mut out = io::stdout().lock();
    let result = match &cli.command {
        Command::Detect => commands::detect(&config, &mut out),
        Command::Scan { timeout } => commands::scan(&config, *timeout, &mut out).await,
        Command::Compare { stored, timeout } => {
            commands::compare(&config, stored, *timeout, &mut out).await
        }
        Command::Store {
            student,
            finger,
            file,
        } => commands::store(&config, student, *finger, file.as_deref(), &mut out).await,
        Command::Fetch { student } => commands::fetch(&config, student, &mut out).await,
        Command::Ping => commands::ping(&config, &mut out).await,
    };

    if let Err(err) = result {
        writeln!(io::stderr(), "{err:#}")?;
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

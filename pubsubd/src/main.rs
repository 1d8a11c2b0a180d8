#![warn(clippy::all, rust_2018_idioms)]

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use pubsubd::{App, Fixture};
use pubsubd_backend::config::Config;

#[derive(Parser, Debug)]
struct Args {
    /// JSON config file; defaults apply to every missing field.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON fixture with the projects, users, topics and subscriptions to serve.
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Enables push delivery regardless of the config file.
    #[arg(long)]
    push_enabled: bool,

    /// Overrides the token resolving the push worker.
    #[arg(long)]
    push_worker_token: Option<String>,

    /// Seconds between push status reports.
    #[arg(long, default_value_t = 60)]
    report_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if args.push_enabled {
        config.push_enabled = true;
    }
    if let Some(token) = args.push_worker_token {
        config.push_worker_token = token;
    }

    // RUST_LOG takes precedence over the configured level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let fixture = args.fixture.map(Fixture::from_file).transpose()?;

    let app = App::new(
        config,
        fixture,
        Duration::from_secs(args.report_interval_secs.max(1)),
    )
    .await?;

    app.run().await?;
    Ok(())
}

use std::io;

use bidsfetch_core::{config_error_outcome, fetch_dataset, Config};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing_subscriber::EnvFilter;

mod cli;
mod output;
mod style;

use cli::BidsfetchCli;
use output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = BidsfetchCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let outcome = match Config::from_env() {
        Ok(config) => fetch_dataset(&config, &cli.request()).map_err(|err| eyre!("{err:?}"))?,
        Err(err) => {
            tracing::debug!(error = %err, "rejected configuration");
            config_error_outcome(&err)
        }
    };
    let options = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = emit_output(options, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };

    // Target directives match by prefix, so `bidsfetch` covers the core crate.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,bidsfetch={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

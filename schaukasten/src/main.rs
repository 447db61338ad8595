use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use log::error;

mod cli;

fn setup_logging() {
    if env::var("LOG").is_err() {
        env::set_var("LOG", "schaukasten=info");
    }

    pretty_env_logger::init_custom_env("LOG");
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = cli::parse(env::args().skip(1).collect());

    setup_logging();

    let parsed = schaukasten::pipeline::load(&args.config).await?;

    if args.json {
        let json = serde_json::to_string_pretty(&parsed.snapshot)
            .context("Failed to serialize events")?;
        println!("{json}");
    }

    let report = schaukasten::pipeline::render_all(&args.config, parsed).await?;

    if report.success() {
        return Ok(ExitCode::SUCCESS);
    }

    for outcome in &report.outcomes {
        if let Err(err) = &outcome.result {
            error!("No output for locale `{}`: {err}", outcome.locale);
        }
    }
    if let Some(Err(err)) = &report.ics {
        error!("No ICS export: {err}");
    }

    Ok(ExitCode::FAILURE)
}

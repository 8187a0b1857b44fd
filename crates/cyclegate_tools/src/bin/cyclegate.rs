#![forbid(unsafe_code)]

use std::io;

use chrono::Utc;
use clap::Parser;
use cyclegate_os::error::exit_codes;
use cyclegate_os::summary::Summary;
use cyclegate_os::CycleContext;
use cyclegate_tools::cli::{execute, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let config = match cli.config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return err.exit_code();
        }
    };
    let ctx = CycleContext::new(config);
    match execute(&ctx, &cli.command, Utc::now()) {
        Ok(summary) => match print_summary(cli, &summary) {
            Ok(()) => summary.exit_code(),
            Err(code) => code,
        },
        Err(err) => {
            if let Some(partial) = err.partial_summary() {
                let _ = print_summary(cli, partial);
            }
            eprintln!("{err}");
            err.exit_code()
        }
    }
}

fn print_summary(cli: &Cli, summary: &Summary) -> Result<(), i32> {
    if cli.json {
        match summary.render_json() {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("failed to render summary: {err}");
                return Err(exit_codes::HARD_FAILURE);
            }
        }
    } else {
        print!("{}", summary.render_text());
    }
    Ok(())
}

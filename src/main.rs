mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use gauthctl::config::{self, SYSTEM_CONFIG_PATH, Settings};
use gauthctl::{Controller, Outcome, auth, state};

fn main() -> ExitCode {
    // RUST_LOG overrides the quiet default
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Nowhere left to report a failed write of the usage text.
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match real_main(args) {
        Ok(outcome) => {
            eprintln!("{outcome}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn real_main(args: cli::Args) -> Result<Outcome> {
    let settings = config::init(
        Settings::load(Path::new(SYSTEM_CONFIG_PATH)).context("Failed to load configuration")?,
    );

    // Before anything can create a file.
    state::restrict_umask(settings.umask);

    let gate = auth::system_gate(&settings.service_name);
    let outcome = Controller::new(settings, gate).run(args.sub.into())?;
    Ok(outcome)
}

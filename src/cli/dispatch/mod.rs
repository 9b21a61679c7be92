use crate::cli::{
    actions::{server::Args, Action},
    commands::{auth::Options, ARG_DSN, ARG_PORT},
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Turn parsed arguments into the action to run.
///
/// # Errors
/// Returns an error if a required argument is missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|s| SecretString::from(s.clone()))
        .context("missing required argument: --dsn")?;

    Ok(Action::Server(Args {
        port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
        dsn,
        auth: Options::parse(matches)?,
    }))
}

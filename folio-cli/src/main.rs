mod cmd;
mod config;

use clap::{Arg, ArgAction, Command};
use folio_core::{BuildFailure, ErrorKind};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn make_command() -> Command {
    Command::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build static sites from Markdown and templates")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logging; repeat for trace output")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(cmd::build::make_subcommand())
        .subcommand(cmd::serve::make_subcommand())
        .subcommand(cmd::new::make_subcommand())
}

fn init_tracing(verbose: u8) {
    // -v wins over RUST_LOG
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Exit status for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(failure) = err.downcast_ref::<BuildFailure>() {
        return match failure.kind() {
            ErrorKind::Config => 2,
            ErrorKind::Discover => 1,
            ErrorKind::Parse => 3,
            ErrorKind::Route => 4,
            ErrorKind::Template => 5,
            ErrorKind::Asset => 6,
            ErrorKind::Write => 7,
            ErrorKind::Cancelled => 130,
        };
    }
    if err.downcast_ref::<folio_core::ConfigError>().is_some()
        || err.downcast_ref::<::config::ConfigError>().is_some()
    {
        return 2;
    }
    1
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = make_command().get_matches();
    init_tracing(matches.get_count("verbose"));

    let result = match matches.subcommand() {
        Some(("build", args)) => cmd::build::execute(args),
        Some(("serve", args)) => cmd::serve::execute(args).await,
        Some(("new", args)) => cmd::new::execute(args),
        _ => Err(anyhow::anyhow!("Unknown command")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<BuildFailure>() {
                Some(failure) => eprintln!("error: {failure}"),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::BuildError;

    #[test]
    fn command_is_well_formed() {
        make_command().debug_assert();
    }

    #[test]
    fn build_failures_map_to_distinct_codes() {
        let cancelled = anyhow::Error::new(BuildFailure::from(vec![BuildError::Cancelled]));
        assert_eq!(exit_code(&cancelled), 130);

        let discover = anyhow::Error::new(BuildFailure::from(vec![BuildError::Discover {
            path: "content".into(),
            source: std::io::Error::other("gone"),
        }]));
        assert_eq!(exit_code(&discover), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("anything else")), 1);
    }

    #[test]
    fn config_errors_exit_with_usage_code() {
        let err = anyhow::Error::new(::config::ConfigError::Message("bad".into()));
        assert_eq!(exit_code(&err), 2);
    }
}

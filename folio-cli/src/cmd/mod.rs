pub mod build;
pub mod new;
pub mod serve;

use clap::{Arg, Command};
use folio_core::{BuildFailure, BuildOptions, BuildReport};
use tracing::{error, info};

use crate::config::BuildSettings;

pub fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .help("Site root containing folio.toml")
        .default_value(".")
}

pub fn drafts_arg() -> Arg {
    Arg::new("drafts")
        .short('D')
        .long("drafts")
        .help("Include pages marked as drafts")
        .action(clap::ArgAction::SetTrue)
}

pub fn add_common_args(command: Command) -> Command {
    command.arg(root_arg()).arg(drafts_arg()).arg(
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("Configuration file, relative to the site root"),
    )
}

pub fn build_options(settings: &BuildSettings) -> BuildOptions {
    BuildOptions {
        include_drafts: settings.drafts,
        ..BuildOptions::default()
    }
}

pub fn log_report(report: &BuildReport) {
    info!(
        "Wrote {} pages, {} generated files and {} assets to {} in {:.2?}",
        report.pages,
        report.generated,
        report.assets,
        report.output_dir.display(),
        report.elapsed
    );
    if report.drafts_skipped > 0 {
        info!("Skipped {} drafts (use --drafts to include them)", report.drafts_skipped);
    }
}

pub fn log_failure(failure: &BuildFailure) {
    for err in &failure.errors {
        error!("{}", err);
    }
}

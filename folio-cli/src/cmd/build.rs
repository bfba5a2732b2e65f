use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use folio_core::build_site;

use crate::cmd::{add_common_args, build_options, log_report};
use crate::config::{FolioConfig, site_root};

pub fn make_subcommand() -> Command {
    add_common_args(Command::new("build"))
        .about("Build the site into its output directory")
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory, relative to the site root"),
        )
}

pub fn execute(args: &ArgMatches) -> Result<()> {
    let root = site_root(args)?;
    let config = FolioConfig::load(args, &root)?;
    let options = build_options(&config.build);

    let report = build_site(&root, config.site, options)?;
    log_report(&report);

    Ok(())
}

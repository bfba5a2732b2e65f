use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use folio_core::{ContentKind, new_content, new_site};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cmd::root_arg;
use crate::config::site_root;

fn content_subcommand(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(Arg::new("title").required(true).help("Title; the file name is derived from it"))
        .arg(root_arg())
        .arg(
            Arg::new("draft")
                .long("draft")
                .help("Mark the new file as a draft")
                .action(clap::ArgAction::SetTrue),
        )
}

pub fn make_subcommand() -> Command {
    Command::new("new")
        .about("Create a site or a content file")
        .subcommand_required(true)
        .subcommand(
            Command::new("site")
                .about("Create a starter site")
                .arg(Arg::new("path").required(true).value_name("PATH"))
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .value_name("TITLE")
                        .help("Site title (defaults to the directory name)"),
                ),
        )
        .subcommand(content_subcommand("page", "Create a page in the content directory"))
        .subcommand(content_subcommand("post", "Create a dated post under posts/"))
}

pub fn execute(args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("site", sub)) => create_site(sub),
        Some(("page", sub)) => create_content(sub, ContentKind::Page),
        Some(("post", sub)) => create_content(sub, ContentKind::Post),
        _ => Err(anyhow::anyhow!("Expected one of: site, page, post")),
    }
}

fn create_site(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<String>("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let title = args
        .get_one::<String>("title")
        .cloned()
        .unwrap_or_else(|| default_title(&path));

    let written = new_site(&path, &title)?;
    for file in &written {
        info!("  {}", file.display());
    }
    info!("Run `folio serve --root {}` to preview it", path.display());
    Ok(())
}

fn default_title(path: &Path) -> String {
    std::fs::canonicalize(path)
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .map(|name| folio_core::content::humanize(&name.to_string_lossy()))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "My Site".to_string())
}

fn create_content(args: &ArgMatches, kind: ContentKind) -> Result<()> {
    let root = site_root(args)?;
    let title = args
        .get_one::<String>("title")
        .map(String::as_str)
        .unwrap_or_default();
    let draft = args.get_flag("draft");

    new_content(&root, kind, title, draft)?;
    Ok(())
}

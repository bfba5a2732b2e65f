use anyhow::{Context, Result};
use clap::ArgMatches;
use config::{Config as ConfigBuilder, Environment};
use folio_core::{CONFIG_FILE, SiteConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete configuration that merges CLI args, env vars, the site's
/// `folio.toml`, and defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FolioConfig {
    /// Settings that only matter to the CLI
    pub build: BuildSettings,
    /// Site configuration (from folio-core)
    #[serde(flatten)]
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Render pages marked `draft: true`
    pub drafts: bool,
    /// Host for dev server
    pub host: String,
    /// Port for dev server
    pub port: u16,
    /// Open browser automatically
    pub open: bool,
    /// Rebuild when sources change while serving
    pub watch: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            drafts: false,
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: false,
            watch: true,
        }
    }
}

/// The site root named by `--root`, made absolute.
pub fn site_root(args: &ArgMatches) -> Result<PathBuf> {
    let root = args
        .try_get_one::<String>("root")
        .ok()
        .flatten()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::canonicalize(&root)
        .with_context(|| format!("Site root {} does not exist", root.display()))
}

fn flag(args: &ArgMatches, id: &str) -> bool {
    args.try_get_one::<bool>(id).ok().flatten().copied().unwrap_or(false)
}

fn value<'a>(args: &'a ArgMatches, id: &str) -> Option<&'a String> {
    args.try_get_one::<String>(id).ok().flatten()
}

impl FolioConfig {
    /// Load configuration with cascading precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables (FOLIO_*)
    /// 3. The site's config file
    /// 4. Defaults (lowest priority)
    pub fn load(args: &ArgMatches, root: &Path) -> Result<Self> {
        // The file goes through SiteConfig so its key aliases and errors
        // are the same as when the core reads it directly.
        let site = match value(args, "config") {
            Some(file) => SiteConfig::read(root.join(file))?,
            None => SiteConfig::load(root)?,
        };
        let base = Self {
            build: BuildSettings::default(),
            site,
        };

        let mut builder = ConfigBuilder::builder()
            .add_source(ConfigBuilder::try_from(&base)?)
            .add_source(
                Environment::with_prefix("FOLIO")
                    .prefix_separator("_")
                    .separator("__") // Use double underscore for nested keys
                    .try_parsing(true),
            );

        // Only override with CLI args that are actually defined for this command
        if let Some(output) = value(args, "output") {
            builder = builder.set_override("output_dir", output.as_str())?;
        }
        if let Some(host) = value(args, "host") {
            builder = builder.set_override("build.host", host.as_str())?;
        }
        if let Some(port) = args.try_get_one::<u16>("port").ok().flatten() {
            builder = builder.set_override("build.port", i64::from(*port))?;
        }
        if flag(args, "open") {
            builder = builder.set_override("build.open", true)?;
        }
        if flag(args, "drafts") {
            builder = builder.set_override("build.drafts", true)?;
        }
        if flag(args, "no-watch") {
            builder = builder.set_override("build.watch", false)?;
        }

        let config: FolioConfig = builder
            .build()?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.site.validate(root)?;
        Ok(config)
    }

    pub fn config_file(args: &ArgMatches, root: &Path) -> PathBuf {
        match value(args, "config") {
            Some(file) => root.join(file),
            None => root.join(CONFIG_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction, Command};

    fn command() -> Command {
        Command::new("test")
            .arg(Arg::new("root").long("root").value_name("DIR"))
            .arg(Arg::new("output").long("output").value_name("DIR"))
            .arg(Arg::new("config").long("config").value_name("FILE"))
            .arg(
                Arg::new("port")
                    .long("port")
                    .value_parser(clap::value_parser!(u16)),
            )
            .arg(Arg::new("drafts").long("drafts").action(ArgAction::SetTrue))
    }

    #[test]
    fn test_default_config() {
        let config = FolioConfig::default();
        assert_eq!(config.build.port, 3000);
        assert!(config.build.watch);
        assert_eq!(config.site.output_dir, PathBuf::from("public"));
    }

    #[test]
    fn test_file_then_cli_args_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "title = \"From File\"\noutput_dir = \"dist\"\ncleanUrls = false\n",
        )
        .unwrap();

        let matches = command()
            .try_get_matches_from(vec!["test", "--port", "4000", "--drafts"])
            .unwrap();
        let config = FolioConfig::load(&matches, dir.path()).unwrap();
        assert_eq!(config.site.title, "From File");
        assert_eq!(config.site.output_dir, PathBuf::from("dist"));
        assert!(!config.site.clean_urls);
        assert_eq!(config.build.port, 4000);
        assert!(config.build.drafts);

        let matches = command()
            .try_get_matches_from(vec!["test", "--output", "out"])
            .unwrap();
        let config = FolioConfig::load(&matches, dir.path()).unwrap();
        assert_eq!(config.site.output_dir, PathBuf::from("out"));
        // Should still have defaults for non-overridden values
        assert_eq!(config.build.host, "127.0.0.1");
    }

    #[test]
    fn test_unsafe_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let matches = command()
            .try_get_matches_from(vec!["test", "--output", "."])
            .unwrap();
        assert!(FolioConfig::load(&matches, dir.path()).is_err());
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let matches = command()
            .try_get_matches_from(vec!["test", "--config", "other.toml"])
            .unwrap();
        assert!(FolioConfig::load(&matches, dir.path()).is_err());
    }
}

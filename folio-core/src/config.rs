use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the site configuration, at the site root.
pub const CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration in {}: {source}", path.display())]
    Parsing {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("output directory {} would replace {what}", path.display())]
    UnsafeOutputDir { path: PathBuf, what: &'static str },
}

/// Site-wide settings, read once per build and never mutated during it.
///
/// Relative paths are resolved against the site root.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    #[serde(alias = "baseUrl", alias = "baseURL")]
    pub base_url: String,
    pub description: String,
    pub language: String,
    pub author: String,
    #[serde(alias = "contentDir")]
    pub content_dir: PathBuf,
    #[serde(alias = "templateDir")]
    pub template_dir: PathBuf,
    #[serde(alias = "assetDirs")]
    pub asset_dirs: Vec<PathBuf>,
    #[serde(alias = "outputDir")]
    pub output_dir: PathBuf,
    /// `/about/` instead of `/about.html`.
    #[serde(alias = "cleanUrls")]
    pub clean_urls: bool,
    pub default_template: String,
    pub highlight: bool,
    pub syntax_theme: String,
    pub summary_words: usize,
    pub sitemap: bool,
    /// Free-form values exposed to templates as `site.params`.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Folio".into(),
            base_url: String::new(),
            description: String::new(),
            language: "en".into(),
            author: String::new(),
            content_dir: PathBuf::from("content"),
            template_dir: PathBuf::from("templates"),
            asset_dirs: vec![PathBuf::from("static")],
            output_dir: PathBuf::from("public"),
            clean_urls: true,
            default_template: "page.html".into(),
            highlight: true,
            syntax_theme: "base16-ocean.dark".into(),
            summary_words: 70,
            sitemap: true,
            params: BTreeMap::new(),
        }
    }
}

impl SiteConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parsing {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `folio.toml` from the site root, or fall back to defaults when
    /// there is none.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self, ConfigError> {
        let path = root.as_ref().join(CONFIG_FILE);
        if path.is_file() {
            Self::read(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn content_path(&self, root: &Path) -> PathBuf {
        normalize(&root.join(&self.content_dir))
    }

    pub fn template_path(&self, root: &Path) -> PathBuf {
        normalize(&root.join(&self.template_dir))
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        normalize(&root.join(&self.output_dir))
    }

    pub fn asset_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.asset_dirs
            .iter()
            .map(|dir| normalize(&root.join(dir)))
            .collect()
    }

    /// `base_url` without its trailing slash, ready to prefix a route URL.
    pub fn base_url_prefix(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// The output root is deleted and replaced on every build, so it must not
    /// overlap anything the build reads.
    pub fn validate(&self, root: &Path) -> Result<(), ConfigError> {
        let root = normalize(root);
        let output = self.output_path(&root);
        let unsafe_dir = |what| ConfigError::UnsafeOutputDir {
            path: output.clone(),
            what,
        };

        if root.starts_with(&output) {
            return Err(unsafe_dir("the site root"));
        }
        let content = self.content_path(&root);
        if content.starts_with(&output) || output.starts_with(&content) {
            return Err(unsafe_dir("the content directory"));
        }
        let templates = self.template_path(&root);
        if templates.starts_with(&output) {
            return Err(unsafe_dir("the template directory"));
        }
        for assets in self.asset_paths(&root) {
            if assets.starts_with(&output) || output.starts_with(&assets) {
                return Err(unsafe_dir("an asset directory"));
            }
        }
        Ok(())
    }
}

/// Lexically clean a path: drop `.` and fold `..` into its parent.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_fill_missing_keys() {
        let config: SiteConfig = toml::from_str("title = \"Mine\"").unwrap();
        assert_eq!(config.title, "Mine");
        assert_eq!(config.output_dir, PathBuf::from("public"));
        assert!(config.clean_urls);
    }

    #[test]
    fn camel_case_aliases() {
        let config: SiteConfig =
            toml::from_str("cleanUrls = false\nbaseUrl = \"https://x.dev/\"").unwrap();
        assert!(!config.clean_urls);
        assert_eq!(config.base_url_prefix(), "https://x.dev");
    }

    #[test]
    fn params_pass_through() {
        let config: SiteConfig =
            toml::from_str("[params]\ngithub = \"folio\"\nstars = 3").unwrap();
        assert_eq!(config.params["github"], serde_json::json!("folio"));
        assert_eq!(config.params["stars"], serde_json::json!(3));
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(SiteConfig::load(dir.path()).unwrap(), SiteConfig::default());
    }

    #[test]
    fn read_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "title = ").unwrap();
        assert!(matches!(
            SiteConfig::read(&path),
            Err(ConfigError::Parsing { .. })
        ));
    }

    #[test]
    fn output_may_not_overlap_inputs() {
        let root = Path::new("/site");
        let mut config = SiteConfig::default();
        assert!(config.validate(root).is_ok());

        config.output_dir = PathBuf::from(".");
        assert!(matches!(
            config.validate(root),
            Err(ConfigError::UnsafeOutputDir { what: "the site root", .. })
        ));

        config.output_dir = PathBuf::from("content/out");
        assert!(matches!(
            config.validate(root),
            Err(ConfigError::UnsafeOutputDir { what: "the content directory", .. })
        ));

        config.output_dir = PathBuf::from("static");
        assert!(config.validate(root).is_err());
    }

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }
}

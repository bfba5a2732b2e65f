//! Starter sites and new content files.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::{CONFIG_FILE, ConfigError, SiteConfig};
use crate::markdown::{slugify, theme_css};

#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("cannot derive a file name from `{0}`")]
    EmptySlug(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not serialize front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

const CONFIG_TEMPLATE: &str = include_str!("../scaffold/folio.toml");

const FILES: &[(&str, &str)] = &[
    ("content/index.md", include_str!("../scaffold/content/index.md")),
    ("content/about.md", include_str!("../scaffold/content/about.md")),
    (
        "content/posts/hello-world.md",
        include_str!("../scaffold/content/posts/hello-world.md"),
    ),
    ("templates/base.html", include_str!("../scaffold/templates/base.html")),
    ("templates/page.html", include_str!("../scaffold/templates/page.html")),
    ("templates/tag.html", include_str!("../scaffold/templates/tag.html")),
    ("static/css/style.css", include_str!("../scaffold/static/css/style.css")),
    ("static/js/main.js", include_str!("../scaffold/static/js/main.js")),
];

fn write_file(path: &Path, contents: &str) -> Result<(), ScaffoldError> {
    let io_err = |source| ScaffoldError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}

/// Create a starter site at `path`, which may already exist but must not
/// hold a `folio.toml`.
pub fn new_site(path: &Path, title: &str) -> Result<Vec<PathBuf>, ScaffoldError> {
    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(ScaffoldError::AlreadyExists(config_path));
    }

    let quoted_title = toml::Value::String(title.to_string()).to_string();
    let config = CONFIG_TEMPLATE.replace("__TITLE__", &quoted_title);

    let mut written = Vec::new();
    write_file(&config_path, &config)?;
    written.push(config_path);

    for (relative, contents) in FILES {
        let target = path.join(relative);
        write_file(&target, contents)?;
        written.push(target);
    }

    let defaults = SiteConfig::default();
    let css = theme_css(&defaults.syntax_theme).unwrap_or_default();
    let syntax = path.join("static/css/syntax.css");
    write_file(&syntax, &css)?;
    written.push(syntax);

    info!("Created new site in {}", path.display());
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Page,
    Post,
}

#[derive(Serialize)]
struct NewFrontMatter<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    draft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

/// Create a Markdown file for `title` under the site's content dir.
///
/// Posts go in `posts/` and carry today's date.
pub fn new_content(
    root: &Path,
    kind: ContentKind,
    title: &str,
    draft: bool,
) -> Result<PathBuf, ScaffoldError> {
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(ScaffoldError::EmptySlug(title.to_string()));
    }

    let config = SiteConfig::load(root)?;
    let mut path = config.content_path(root);
    if kind == ContentKind::Post {
        path.push("posts");
    }
    path.push(format!("{slug}.md"));

    if path.exists() {
        return Err(ScaffoldError::AlreadyExists(path));
    }

    let front_matter = NewFrontMatter {
        title,
        date: (kind == ContentKind::Post).then(|| Utc::now().format("%Y-%m-%d").to_string()),
        draft,
        tags: (kind == ContentKind::Post).then(Vec::new),
    };
    let yaml = serde_yaml::to_string(&front_matter)?;
    write_file(&path, &format!("---\n{yaml}---\n\n"))?;

    info!("Created {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::read_and_parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_site_writes_starter_files() {
        let dir = tempfile::tempdir().unwrap();
        let written = new_site(dir.path(), "My \"Quoted\" Site").unwrap();

        assert_eq!(written.len(), FILES.len() + 2);
        let config = SiteConfig::load(dir.path()).unwrap();
        assert_eq!(config.title, "My \"Quoted\" Site");
        assert!(dir.path().join("static/css/syntax.css").is_file());
        let base = fs::read_to_string(dir.path().join("templates/base.html")).unwrap();
        assert!(base.contains("id=\"current-year\""));
    }

    #[test]
    fn new_site_refuses_existing_site() {
        let dir = tempfile::tempdir().unwrap();
        new_site(dir.path(), "One").unwrap();
        assert!(matches!(
            new_site(dir.path(), "Two"),
            Err(ScaffoldError::AlreadyExists(_))
        ));
    }

    #[test]
    fn new_post_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = new_content(dir.path(), ContentKind::Post, "Rust: A Love Story!", true).unwrap();
        assert_eq!(path, dir.path().join("content/posts/rust-a-love-story.md"));

        let seed = read_and_parse(
            &dir.path().join("content"),
            Path::new("posts/rust-a-love-story.md"),
        )
        .unwrap();
        assert_eq!(seed.title, "Rust: A Love Story!");
        assert!(seed.meta.draft);
        assert!(seed.meta.date.is_some());
        assert!(seed.meta.tags.is_empty());
    }

    #[test]
    fn new_page_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        new_content(dir.path(), ContentKind::Page, "Contact", false).unwrap();
        assert!(matches!(
            new_content(dir.path(), ContentKind::Page, "contact", false),
            Err(ScaffoldError::AlreadyExists(_))
        ));
    }

    #[test]
    fn title_without_letters_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            new_content(dir.path(), ContentKind::Page, "???", false),
            Err(ScaffoldError::EmptySlug(_))
        ));
    }
}

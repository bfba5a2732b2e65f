//! Change classification for watch mode.
//!
//! The file watcher itself lives in the CLI; this module decides what a
//! changed path means for the next build.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assets::is_markdown;
use crate::config::{CONFIG_FILE, SiteConfig, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Content,
    Template,
    Asset,
    Config,
    /// Output, staging dirs, editor droppings, and anything outside the site.
    Ignored,
}

/// Where a site's inputs and output live on disk.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    root: PathBuf,
    content: PathBuf,
    templates: PathBuf,
    assets: Vec<PathBuf>,
    output: PathBuf,
}

impl SiteLayout {
    pub fn new(root: &Path, config: &SiteConfig) -> Self {
        let root = normalize(root);
        Self {
            content: config.content_path(&root),
            templates: config.template_path(&root),
            assets: config.asset_paths(&root),
            output: config.output_path(&root),
            root,
        }
    }

    pub fn classify(&self, path: &Path) -> ChangeKind {
        let path = normalize(path);

        if path.starts_with(&self.output) || !path.starts_with(&self.root) {
            return ChangeKind::Ignored;
        }
        let hidden = path
            .strip_prefix(&self.root)
            .map(|rel| rel.components().any(is_hidden_component))
            .unwrap_or(true);
        if hidden {
            return ChangeKind::Ignored;
        }

        if path == self.root.join(CONFIG_FILE) {
            ChangeKind::Config
        } else if path.starts_with(&self.templates) {
            ChangeKind::Template
        } else if path.starts_with(&self.content) {
            if is_markdown(&path) {
                ChangeKind::Content
            } else {
                ChangeKind::Asset
            }
        } else if self.assets.iter().any(|dir| path.starts_with(dir)) {
            ChangeKind::Asset
        } else {
            ChangeKind::Ignored
        }
    }

    /// Directories worth watching. The root itself is watched
    /// non-recursively for the config file.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.content.clone(), self.templates.clone()];
        roots.extend(self.assets.iter().cloned());
        roots.retain(|dir| dir.is_dir());
        roots
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

fn is_hidden_component(component: Component<'_>) -> bool {
    match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name.ends_with('~')
        }
        _ => false,
    }
}

/// Paths changed since the last build, deduplicated.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    paths: BTreeMap<PathBuf, ChangeKind>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, layout: &SiteLayout, path: &Path) -> ChangeKind {
        let kind = layout.classify(path);
        if kind != ChangeKind::Ignored {
            self.paths.insert(path.to_path_buf(), kind);
        }
        kind
    }

    pub fn needs_rebuild(&self) -> bool {
        !self.paths.is_empty()
    }

    pub fn config_changed(&self) -> bool {
        self.paths.values().any(|kind| *kind == ChangeKind::Config)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, ChangeKind)> {
        self.paths.iter().map(|(p, k)| (p.as_path(), *k))
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

/// Shared flag a running build polls between stages and per page.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SiteLayout {
        SiteLayout::new(Path::new("/site"), &SiteConfig::default())
    }

    #[test]
    fn classifies_by_directory() {
        let layout = layout();
        let cases = [
            ("/site/content/a.md", ChangeKind::Content),
            ("/site/content/img/a.png", ChangeKind::Asset),
            ("/site/templates/page.html", ChangeKind::Template),
            ("/site/static/css/style.css", ChangeKind::Asset),
            ("/site/folio.toml", ChangeKind::Config),
            ("/site/README.md", ChangeKind::Ignored),
            ("/elsewhere/a.md", ChangeKind::Ignored),
        ];
        for (path, expected) in cases {
            assert_eq!(layout.classify(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn output_and_staging_are_ignored() {
        let layout = layout();
        for path in [
            "/site/public/index.html",
            "/site/.folio-staging-abc/index.html",
            "/site/content/.a.md.swp",
            "/site/content/a.md~",
        ] {
            assert_eq!(layout.classify(Path::new(path)), ChangeKind::Ignored, "{path}");
        }
    }

    #[test]
    fn change_set_coalesces() {
        let layout = layout();
        let mut changes = ChangeSet::new();
        assert!(!changes.needs_rebuild());

        changes.record(&layout, Path::new("/site/content/a.md"));
        changes.record(&layout, Path::new("/site/content/a.md"));
        changes.record(&layout, Path::new("/site/public/a.html"));
        assert_eq!(changes.len(), 1);
        assert!(changes.needs_rebuild());
        assert!(!changes.config_changed());

        changes.record(&layout, Path::new("/site/folio.toml"));
        assert!(changes.config_changed());

        changes.clear();
        assert!(changes.is_empty());
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let cancel = Cancellation::new();
        let handle = cancel.clone();
        assert!(!handle.is_cancelled());
        cancel.cancel();
        assert!(handle.is_cancelled());
    }
}

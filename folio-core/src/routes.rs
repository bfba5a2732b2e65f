//! Route resolution and the navigation tree.
//!
//! Resolution happens in two passes once every content file is parsed:
//! the first maps each source path to an output path and URL, the second
//! groups pages by directory into the nav tree. Pages live in one flat
//! vector; the tree and the parent/child links only hold indices into it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use tracing::debug;

use crate::config::SiteConfig;
use crate::content::{PageSeed, humanize};
use crate::front_matter::{FrontMatter, PageMeta};
use crate::markdown::tag_slug;

/// Two things want the same output file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{first} and {second} both resolve to {}", output.display())]
pub struct RouteConflictError {
    pub output: PathBuf,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Relative to the output root.
    pub output: PathBuf,
    /// Absolute path on the site, always starting with `/`.
    pub url: String,
}

impl Route {
    /// Route for a content file at `source` (relative to the content root).
    pub fn for_source(source: &Path, slug: Option<&str>, clean_urls: bool) -> Self {
        let dirs = directory_segments(source);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if slug.is_none() && stem == "index" {
            return Self::directory_index(&dirs);
        }

        let name = slug.unwrap_or(&stem);
        Self::leaf(&dirs, name, clean_urls)
    }

    /// Route for a generated page, e.g. `tags/rust`.
    pub fn generated(dirs: &[&str], name: &str, clean_urls: bool) -> Self {
        let dirs: Vec<String> = dirs.iter().map(|d| d.to_string()).collect();
        Self::leaf(&dirs, name, clean_urls)
    }

    fn directory_index(dirs: &[String]) -> Self {
        let mut output: PathBuf = dirs.iter().collect();
        output.push("index.html");
        let url = if dirs.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", url_path(dirs.iter().map(String::as_str)))
        };
        Self { output, url }
    }

    fn leaf(dirs: &[String], name: &str, clean_urls: bool) -> Self {
        let mut output: PathBuf = dirs.iter().collect();
        let mut segments: Vec<&str> = dirs.iter().map(String::as_str).collect();

        // `name` may itself hold `/` when it comes from a nested slug.
        if clean_urls {
            output.push(name);
            output.push("index.html");
            segments.extend(name.split('/'));
            Self {
                output,
                url: format!("/{}/", url_path(segments)),
            }
        } else {
            let file = format!("{name}.html");
            output.push(&file);
            segments.extend(file.split('/'));
            Self {
                output,
                url: format!("/{}", url_path(segments)),
            }
        }
    }
}

/// Characters a browser escapes in a path, plus the ones that would change
/// what a raw file name means inside a URL.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\');

/// Join raw path segments into the form `location.pathname` reports.
fn url_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn directory_segments(source: &Path) -> Vec<String> {
    source
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A parsed page with its route and place in the content tree.
#[derive(Debug, Clone)]
pub struct Page {
    pub source: PathBuf,
    pub title: String,
    pub front_matter: FrontMatter,
    pub meta: PageMeta,
    pub body: String,
    /// First directory component of the source path; `None` at the root.
    pub section: Option<String>,
    pub route: Route,
    pub permalink: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Page {
    pub fn is_index(&self) -> bool {
        self.meta.slug.is_none()
            && self.source.file_stem().and_then(|s| s.to_str()) == Some("index")
    }

    fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// One entry of the navigation tree.
///
/// Directory nodes without an `index` page have no page and no URL.
#[derive(Debug, Clone, PartialEq)]
pub struct NavNode {
    pub page: Option<usize>,
    pub title: String,
    pub url: Option<String>,
    pub order: Option<i64>,
    /// File name, or directory name for directory nodes.
    pub name: String,
    /// Source path, or directory path for directory nodes.
    pub path: PathBuf,
    pub children: Vec<usize>,
}

impl NavNode {
    fn sort_key_cmp(&self, other: &NavNode) -> Ordering {
        // Nodes with an explicit order sort before nodes without one.
        self.order
            .is_none()
            .cmp(&other.order.is_none())
            .then_with(|| self.order.cmp(&other.order))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.path.cmp(&other.path))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NavTree {
    nodes: Vec<NavNode>,
    roots: Vec<usize>,
}

impl NavTree {
    pub fn node(&self, index: usize) -> &NavNode {
        &self.nodes[index]
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Page indices in depth-first nav order.
    pub fn page_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if let Some(page) = node.page {
                order.push(page);
            }
            stack.extend(node.children.iter().rev());
        }
        order
    }

    /// Entries with `active`/`ancestor` flags for the page at `current_url`.
    pub fn entries_for(&self, current_url: &str) -> Vec<NavEntry> {
        self.roots
            .iter()
            .map(|&index| self.entry(index, current_url))
            .collect()
    }

    fn entry(&self, index: usize, current_url: &str) -> NavEntry {
        let node = &self.nodes[index];
        let (active, ancestor) = match node.url.as_deref() {
            Some(url) => {
                let active = url == current_url;
                let ancestor = !active && url != "/" && current_url.starts_with(url);
                (active, ancestor)
            }
            None => (false, false),
        };

        NavEntry {
            title: node.title.clone(),
            url: node.url.clone(),
            active,
            ancestor,
            children: node
                .children
                .iter()
                .map(|&child| self.entry(child, current_url))
                .collect(),
        }
    }

    fn sort(&mut self) {
        let mut roots = std::mem::take(&mut self.roots);
        roots.sort_by(|&a, &b| self.nodes[a].sort_key_cmp(&self.nodes[b]));
        self.roots = roots;

        for index in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[index].children);
            children.sort_by(|&a, &b| self.nodes[a].sort_key_cmp(&self.nodes[b]));
            self.nodes[index].children = children;
        }
    }
}

/// What templates see for one nav entry.
///
/// `active` is exact equality with the current URL; `ancestor` is a path
/// prefix match excluding `/`. The client script performs the same tests
/// against `window.location.pathname`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub title: String,
    pub url: Option<String>,
    pub active: bool,
    pub ancestor: bool,
    pub children: Vec<NavEntry>,
}

/// Pages sharing a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagGroup {
    pub name: String,
    pub slug: String,
    /// Newest first, then by URL.
    pub pages: Vec<usize>,
}

/// Tracks which source owns each output path.
#[derive(Debug, Clone, Default)]
pub struct OutputClaims {
    owners: BTreeMap<PathBuf, String>,
}

impl OutputClaims {
    pub fn claim(&mut self, output: &Path, owner: String) -> Result<(), RouteConflictError> {
        match self.owners.get(output) {
            Some(existing) => {
                let (first, second) = if *existing <= owner {
                    (existing.clone(), owner)
                } else {
                    (owner, existing.clone())
                };
                Err(RouteConflictError {
                    output: output.to_path_buf(),
                    first,
                    second,
                })
            }
            None => {
                self.owners.insert(output.to_path_buf(), owner);
                Ok(())
            }
        }
    }

    pub fn contains(&self, output: &Path) -> bool {
        self.owners.contains_key(output)
    }
}

/// Every routed page of one build plus the structures derived from them.
#[derive(Debug, Clone)]
pub struct SiteIndex {
    pages: Vec<Page>,
    nav: NavTree,
    claims: OutputClaims,
    sections: BTreeMap<String, Vec<usize>>,
    drafts_skipped: usize,
}

impl SiteIndex {
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> &Page {
        &self.pages[index]
    }

    pub fn nav(&self) -> &NavTree {
        &self.nav
    }

    pub fn drafts_skipped(&self) -> usize {
        self.drafts_skipped
    }

    /// Register a non-page output (asset, tag page, sitemap).
    pub fn claim(&mut self, output: &Path, owner: String) -> Result<(), RouteConflictError> {
        self.claims.claim(output, owner)
    }

    pub fn is_claimed(&self, output: &Path) -> bool {
        self.claims.contains(output)
    }

    /// Tags grouped case-insensitively, so `Rust` and `rust` share a page.
    ///
    /// Distinct tags whose slugs collide (`C`, `C#`, `C++`) each keep their
    /// own page; later ones in name order get a numeric suffix.
    pub fn tags(&self) -> Vec<TagGroup> {
        let mut groups: BTreeMap<String, TagGroup> = BTreeMap::new();
        for (index, page) in self.pages.iter().enumerate() {
            for tag in &page.meta.tags {
                let name = tag.trim();
                if name.is_empty() {
                    debug!("{}: skipping empty tag", page.source.display());
                    continue;
                }
                let group = groups.entry(name.to_lowercase()).or_insert_with(|| TagGroup {
                    name: name.to_string(),
                    slug: String::new(),
                    pages: Vec::new(),
                });
                if !group.pages.contains(&index) {
                    group.pages.push(index);
                }
            }
        }

        let mut groups: Vec<TagGroup> = groups.into_values().collect();
        let mut slug_owners: BTreeMap<String, String> = BTreeMap::new();
        for group in &mut groups {
            let base = tag_slug(&group.name);
            let mut slug = base.clone();
            let mut n = 2;
            while let Some(owner) = slug_owners.get(&slug) {
                debug!(
                    "Tag `{}` shares the slug `{}` with `{}`",
                    group.name, slug, owner
                );
                slug = format!("{base}-{n}");
                n += 1;
            }
            slug_owners.insert(slug.clone(), group.name.clone());
            group.slug = slug;
        }

        for group in &mut groups {
            group.pages.sort_by(|&a, &b| newest_first(&self.pages[a], &self.pages[b]));
        }
        groups
    }

    /// Pages below each top-level directory, newest first, for listings.
    /// A section's own `index.md` and drafts are left out.
    pub fn sections(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.sections
    }
}

/// Route every page and build the nav tree.
///
/// Drafts are dropped first unless `include_drafts` is set. Every output
/// path collision is reported, not just the first.
pub fn resolve(
    mut seeds: Vec<PageSeed>,
    config: &SiteConfig,
    include_drafts: bool,
) -> Result<SiteIndex, Vec<RouteConflictError>> {
    seeds.sort_by(|a, b| a.source.cmp(&b.source));

    let before = seeds.len();
    if !include_drafts {
        seeds.retain(|seed| {
            if seed.meta.draft {
                debug!("Skipping draft {}", seed.source.display());
            }
            !seed.meta.draft
        });
    }
    let drafts_skipped = before - seeds.len();

    // Pass 1: output paths and URLs.
    let mut claims = OutputClaims::default();
    let mut conflicts = Vec::new();
    let mut pages = Vec::with_capacity(seeds.len());

    for seed in seeds {
        let route = Route::for_source(&seed.source, seed.meta.slug.as_deref(), config.clean_urls);
        if let Err(conflict) = claims.claim(&route.output, seed.source.display().to_string()) {
            conflicts.push(conflict);
            continue;
        }

        let section = (directory_segments(&seed.source).first()).cloned();
        let permalink = format!("{}{}", config.base_url_prefix(), route.url);
        pages.push(Page {
            source: seed.source,
            title: seed.title,
            front_matter: seed.front_matter,
            meta: seed.meta,
            body: seed.body,
            section,
            route,
            permalink,
            parent: None,
            children: Vec::new(),
        });
    }

    if !conflicts.is_empty() {
        return Err(conflicts);
    }

    // Pass 2: nav tree and page links.
    let nav = build_nav(&pages);
    link_pages(&mut pages, &nav);
    let sections = collect_sections(&pages);

    Ok(SiteIndex {
        pages,
        nav,
        claims,
        sections,
        drafts_skipped,
    })
}

/// Dated pages first, newest to oldest, then undated ones by URL.
fn newest_first(a: &Page, b: &Page) -> Ordering {
    b.meta
        .date
        .cmp(&a.meta.date)
        .then_with(|| a.route.url.cmp(&b.route.url))
}

fn collect_sections(pages: &[Page]) -> BTreeMap<String, Vec<usize>> {
    let mut sections: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, page) in pages.iter().enumerate() {
        let Some(section) = &page.section else {
            continue;
        };
        let section_index = page.is_index() && page.source.parent() == Some(Path::new(section));
        if page.meta.draft || section_index {
            continue;
        }
        sections.entry(section.clone()).or_default().push(index);
    }
    for listed in sections.values_mut() {
        listed.sort_by(|&a, &b| newest_first(&pages[a], &pages[b]));
    }
    sections
}

fn build_nav(pages: &[Page]) -> NavTree {
    let mut tree = NavTree::default();
    let mut directories: BTreeMap<PathBuf, usize> = BTreeMap::new();

    for (index, page) in pages.iter().enumerate() {
        let dir = page.source.parent().unwrap_or(Path::new("")).to_path_buf();
        let is_dir_index = page.is_index() && !dir.as_os_str().is_empty();

        if is_dir_index {
            let node = ensure_directory(&mut tree, &mut directories, &dir);
            let node = &mut tree.nodes[node];
            node.page = Some(index);
            node.title = page.title.clone();
            node.url = Some(page.route.url.clone());
            node.order = page.meta.order;
            continue;
        }

        let node = tree.nodes.len();
        tree.nodes.push(NavNode {
            page: Some(index),
            title: page.title.clone(),
            url: Some(page.route.url.clone()),
            order: page.meta.order,
            name: page.file_name(),
            path: page.source.clone(),
            children: Vec::new(),
        });
        match ensure_directory_opt(&mut tree, &mut directories, &dir) {
            Some(parent) => tree.nodes[parent].children.push(node),
            None => tree.roots.push(node),
        }
    }

    tree.sort();
    tree
}

fn ensure_directory_opt(
    tree: &mut NavTree,
    directories: &mut BTreeMap<PathBuf, usize>,
    dir: &Path,
) -> Option<usize> {
    if dir.as_os_str().is_empty() {
        None
    } else {
        Some(ensure_directory(tree, directories, dir))
    }
}

fn ensure_directory(
    tree: &mut NavTree,
    directories: &mut BTreeMap<PathBuf, usize>,
    dir: &Path,
) -> usize {
    if let Some(&node) = directories.get(dir) {
        return node;
    }

    let parent = dir
        .parent()
        .and_then(|p| ensure_directory_opt(tree, directories, p));
    let name = dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let node = tree.nodes.len();
    tree.nodes.push(NavNode {
        page: None,
        title: humanize(&name),
        url: None,
        order: None,
        name,
        path: dir.to_path_buf(),
        children: Vec::new(),
    });
    directories.insert(dir.to_path_buf(), node);
    match parent {
        Some(parent) => tree.nodes[parent].children.push(node),
        None => tree.roots.push(node),
    }
    node
}

/// A page's parent is the index page of the nearest enclosing directory
/// that has one; the root `index` page parents top-level pages.
fn link_pages(pages: &mut [Page], nav: &NavTree) {
    let mut dir_index: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for (index, page) in pages.iter().enumerate() {
        if page.is_index() {
            let dir = page.source.parent().unwrap_or(Path::new("")).to_path_buf();
            dir_index.insert(dir, index);
        }
    }

    for index in 0..pages.len() {
        let page = &pages[index];
        let own_dir = page.source.parent().unwrap_or(Path::new(""));
        let mut search = if page.is_index() {
            if own_dir.as_os_str().is_empty() {
                None
            } else {
                Some(own_dir.parent().unwrap_or(Path::new("")))
            }
        } else {
            Some(own_dir)
        };

        let mut parent = None;
        while let Some(dir) = search {
            if let Some(&candidate) = dir_index.get(dir) {
                parent = Some(candidate);
                break;
            }
            search = if dir.as_os_str().is_empty() {
                None
            } else {
                Some(dir.parent().unwrap_or(Path::new("")))
            };
        }
        pages[index].parent = parent;
    }

    for index in nav.page_order() {
        if let Some(parent) = pages[index].parent {
            pages[parent].children.push(index);
        }
    }
}

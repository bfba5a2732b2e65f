use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::front_matter::FrontMatter;
use crate::markdown::{Heading, RenderedBody};
use crate::routes::{Page, Route, SiteIndex, TagGroup};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("could not load templates from {}: {message}", dir.display())]
    Load { dir: PathBuf, message: String },
    #[error("default template `{name}` not found in {}", dir.display())]
    MissingDefault { dir: PathBuf, name: String },
    #[error("{}: template `{name}` failed: {message}", page.display())]
    Render {
        name: String,
        page: PathBuf,
        message: String,
    },
}

/// Flatten tera's error chain; the top-level message alone rarely says
/// which variable or filter broke.
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Autoescape that leaves `/` alone, so URLs come out as written.
fn escape_html(input: &str) -> String {
    html_escape::encode_quoted_attribute(input).into_owned()
}

/// The compiled template set for one build.
pub struct TemplateEngine {
    tera: Tera,
    dir: PathBuf,
    default: String,
}

impl TemplateEngine {
    /// Compile every `.html` file under `dir`.
    pub fn load(dir: &Path, default: &str) -> Result<Self, TemplateError> {
        if !dir.is_dir() {
            return Err(TemplateError::MissingDirectory(dir.to_path_buf()));
        }

        let glob = format!("{}/**/*.html", dir.display());
        let tera = Tera::new(&glob).map_err(|e| TemplateError::Load {
            dir: dir.to_path_buf(),
            message: describe(&e),
        })?;
        debug!(
            "Loaded {} templates from {}",
            tera.get_template_names().count(),
            dir.display()
        );

        Self::with_tera(tera, dir.to_path_buf(), default)
    }

    /// Build an engine from in-memory templates.
    pub fn from_templates(templates: Vec<(&str, &str)>, default: &str) -> Result<Self, TemplateError> {
        let dir = PathBuf::from("<memory>");
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Load {
                dir: dir.clone(),
                message: describe(&e),
            })?;
        Self::with_tera(tera, dir, default)
    }

    fn with_tera(mut tera: Tera, dir: PathBuf, default: &str) -> Result<Self, TemplateError> {
        tera.set_escape_fn(escape_html);
        let engine = Self {
            tera,
            dir,
            default: default.to_string(),
        };
        if !engine.has(default) {
            return Err(TemplateError::MissingDefault {
                dir: engine.dir,
                name: default.to_string(),
            });
        }
        Ok(engine)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Pick the template for a page: its own `template`, then the section
    /// default, then the global default.
    pub fn resolve(&self, explicit: Option<&str>, section: Option<&str>, page: &Path) -> String {
        if let Some(name) = explicit {
            let name = if Path::new(name).extension().is_some() {
                name.to_string()
            } else {
                format!("{name}.html")
            };
            if self.has(&name) {
                return name;
            }
            warn!(
                "{}: template `{}` not found, falling back",
                page.display(),
                name
            );
        }

        if let Some(section) = section {
            let name = format!("{section}/{}", self.default);
            if self.has(&name) {
                return name;
            }
        }

        self.default.clone()
    }

    pub fn render(&self, name: &str, context: &Context, page: &Path) -> Result<String, TemplateError> {
        self.tera
            .render(name, context)
            .map_err(|e| TemplateError::Render {
                name: name.to_string(),
                page: page.to_path_buf(),
                message: describe(&e),
            })
    }
}

#[derive(Serialize)]
struct SiteContext<'a> {
    title: &'a str,
    base_url: &'a str,
    description: &'a str,
    language: &'a str,
    author: &'a str,
    params: &'a std::collections::BTreeMap<String, serde_json::Value>,
}

impl<'a> SiteContext<'a> {
    fn new(config: &'a SiteConfig) -> Self {
        Self {
            title: &config.title,
            base_url: config.base_url_prefix(),
            description: &config.description,
            language: &config.language,
            author: &config.author,
            params: &config.params,
        }
    }
}

#[derive(Serialize)]
struct Link<'a> {
    title: &'a str,
    url: &'a str,
}

impl<'a> Link<'a> {
    fn to(page: &'a Page) -> Self {
        Self {
            title: &page.title,
            url: &page.route.url,
        }
    }
}

#[derive(Serialize)]
struct PageContext<'a> {
    title: &'a str,
    description: Option<&'a str>,
    url: &'a str,
    permalink: &'a str,
    section: Option<&'a str>,
    source: String,
    date: Option<String>,
    tags: &'a [String],
    draft: bool,
    summary: &'a str,
    toc: &'a [Heading],
    extra: &'a FrontMatter,
    parent: Option<Link<'a>>,
    children: Vec<Link<'a>>,
}

#[derive(Serialize)]
struct Now {
    year: i32,
    build_time: String,
}

impl Now {
    fn at(time: DateTime<Utc>) -> Self {
        Self {
            year: time.year(),
            build_time: time.to_rfc3339(),
        }
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// One line of a listing: a section index or a tag page.
#[derive(Serialize)]
struct ListedPage<'a> {
    title: &'a str,
    url: &'a str,
    date: Option<String>,
    description: Option<&'a str>,
}

impl<'a> ListedPage<'a> {
    fn of(page: &'a Page) -> Self {
        Self {
            title: &page.title,
            url: &page.route.url,
            date: format_date(page.meta.date),
            description: page.meta.description.as_deref(),
        }
    }
}

fn listing<'a>(site: &'a SiteIndex, pages: &[usize]) -> Vec<ListedPage<'a>> {
    pages.iter().map(|&i| ListedPage::of(site.page(i))).collect()
}

/// Values every rendered page receives.
fn base_context(config: &SiteConfig, site: &SiteIndex, url: &str, build_time: DateTime<Utc>) -> Context {
    let sections: BTreeMap<&str, Vec<ListedPage>> = site
        .sections()
        .iter()
        .map(|(name, pages)| (name.as_str(), listing(site, pages)))
        .collect();

    let mut context = Context::new();
    context.insert("site", &SiteContext::new(config));
    context.insert("sections", &sections);
    context.insert("nav", &site.nav().entries_for(url));
    context.insert("current_url", url);
    context.insert("now", &Now::at(build_time));
    context
}

/// Context for rendering `site.page(index)` with its converted body.
pub fn page_context(
    config: &SiteConfig,
    site: &SiteIndex,
    index: usize,
    body: &RenderedBody,
    build_time: DateTime<Utc>,
) -> Context {
    let page = site.page(index);
    let summary = page.meta.description.as_deref().unwrap_or(&body.summary);

    let page_ctx = PageContext {
        title: &page.title,
        description: page.meta.description.as_deref(),
        url: &page.route.url,
        permalink: &page.permalink,
        section: page.section.as_deref(),
        source: page.source.display().to_string(),
        date: format_date(page.meta.date),
        tags: &page.meta.tags,
        draft: page.meta.draft,
        summary,
        toc: &body.headings,
        extra: &page.front_matter,
        parent: page.parent.map(|p| Link::to(site.page(p))),
        children: page.children.iter().map(|&c| Link::to(site.page(c))).collect(),
    };

    let mut context = base_context(config, site, &page.route.url, build_time);
    context.insert("page", &page_ctx);
    context.insert("content", &body.html);
    context
}

#[derive(Serialize)]
struct TagContext<'a> {
    name: &'a str,
    slug: &'a str,
    url: &'a str,
}

/// Context for a generated tag listing page.
pub fn tag_context(
    config: &SiteConfig,
    site: &SiteIndex,
    group: &TagGroup,
    route: &Route,
    build_time: DateTime<Utc>,
) -> Context {
    let pages = listing(site, &group.pages);

    let mut context = base_context(config, site, &route.url, build_time);
    context.insert(
        "tag",
        &TagContext {
            name: &group.name,
            slug: &group.slug,
            url: &route.url,
        },
    );
    context.insert("pages", &pages);
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::parse;
    use crate::markdown::MarkdownRenderer;
    use crate::routes::resolve;
    use chrono::TimeZone;

    fn engine(templates: Vec<(&str, &str)>) -> TemplateEngine {
        TemplateEngine::from_templates(templates, "page.html").unwrap()
    }

    #[test]
    fn missing_default_is_fatal() {
        let result = TemplateEngine::from_templates(vec![("other.html", "x")], "page.html");
        assert!(matches!(result, Err(TemplateError::MissingDefault { .. })));
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = TemplateEngine::load(&dir.path().join("nope"), "page.html");
        assert!(matches!(result, Err(TemplateError::MissingDirectory(_))));
    }

    #[test]
    fn syntax_errors_fail_loading() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "{% if %}").unwrap();
        let result = TemplateEngine::load(dir.path(), "page.html");
        assert!(matches!(result, Err(TemplateError::Load { .. })));
    }

    #[test]
    fn loads_nested_templates_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("posts")).unwrap();
        std::fs::write(dir.path().join("page.html"), "page").unwrap();
        std::fs::write(dir.path().join("posts/page.html"), "post").unwrap();

        let engine = TemplateEngine::load(dir.path(), "page.html").unwrap();
        assert!(engine.has("posts/page.html"));
    }

    #[test]
    fn resolution_chain() {
        let engine = engine(vec![
            ("page.html", "default"),
            ("wide.html", "wide"),
            ("posts/page.html", "post"),
        ]);
        let page = Path::new("posts/a.md");

        assert_eq!(engine.resolve(Some("wide"), Some("posts"), page), "wide.html");
        assert_eq!(engine.resolve(Some("wide.html"), None, page), "wide.html");
        assert_eq!(engine.resolve(Some("missing"), Some("posts"), page), "posts/page.html");
        assert_eq!(engine.resolve(None, Some("posts"), page), "posts/page.html");
        assert_eq!(engine.resolve(Some("missing"), Some("docs"), page), "page.html");
        assert_eq!(engine.resolve(None, None, page), "page.html");
    }

    #[test]
    fn render_errors_name_the_template_and_page() {
        let engine = engine(vec![("page.html", "{{ missing.value }}")]);
        let err = engine
            .render("page.html", &Context::new(), Path::new("a.md"))
            .unwrap_err();
        assert!(matches!(&err, TemplateError::Render { name, .. } if name == "page.html"));
        assert!(err.to_string().starts_with("a.md: template `page.html` failed"));
    }

    #[test]
    fn page_context_exposes_page_site_and_nav() {
        let config = SiteConfig {
            title: "Site".into(),
            ..SiteConfig::default()
        };
        let seeds = vec![
            parse(Path::new("index.md"), b"").unwrap(),
            parse(
                Path::new("about.md"),
                b"---\ntitle: About\nhero: big\ndate: 2024-05-06\n---\n# About\n\nHello there.\n",
            )
            .unwrap(),
        ];
        let site = resolve(seeds, &config, false).unwrap();
        let about = site
            .pages()
            .iter()
            .position(|p| p.route.url == "/about/")
            .unwrap();
        let body = MarkdownRenderer::new(false, 70).render(&site.page(about).body);
        let time = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let engine = engine(vec![(
            "page.html",
            "{{ site.title }}|{{ page.title }}|{{ page.extra.hero }}|{{ page.date }}|\
             {{ page.summary }}|{{ page.parent.url }}|{{ now.year }}|\
             {% for item in nav %}{% if item.active %}[{{ item.url }}]{% endif %}{% endfor %}|\
             {{ content | safe }}",
        )]);
        let context = page_context(&config, &site, about, &body, time);
        let html = engine.render("page.html", &context, Path::new("about.md")).unwrap();

        assert_eq!(
            html,
            "Site|About|big|2024-05-06|Hello there.|/|2025|[/about/]|\
             <h1 id=\"about\">About</h1>\n<p>Hello there.</p>\n"
        );
    }

    #[test]
    fn sections_are_listed_newest_first() {
        let config = SiteConfig::default();
        let seeds = vec![
            parse(Path::new("index.md"), b"").unwrap(),
            parse(Path::new("posts/old.md"), b"---\ntitle: Old\ndate: 2022-01-01\n---\n").unwrap(),
            parse(
                Path::new("posts/new.md"),
                b"---\ntitle: New\ndate: 2024-01-01\ndescription: Latest\n---\n",
            )
            .unwrap(),
        ];
        let site = resolve(seeds, &config, false).unwrap();
        let home = site
            .pages()
            .iter()
            .position(|p| p.route.url == "/")
            .unwrap();
        let body = MarkdownRenderer::new(false, 70).render("");
        let time = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let engine = engine(vec![(
            "page.html",
            "{% for p in sections.posts %}{{ p.title }} {{ p.date }} {{ p.url }} {% if p.description %}{{ p.description }}{% endif %};{% endfor %}",
        )]);
        let context = page_context(&config, &site, home, &body, time);
        let html = engine.render("page.html", &context, Path::new("index.md")).unwrap();

        assert_eq!(html, "New 2024-01-01 /posts/new/ Latest;Old 2022-01-01 /posts/old/ ;");
    }

    #[test]
    fn content_is_escaped_without_safe() {
        let engine = engine(vec![("page.html", "{{ content }}")]);
        let mut context = Context::new();
        context.insert("content", "<b>x</b>");
        let html = engine.render("page.html", &context, Path::new("a.md")).unwrap();
        assert_eq!(html, "&lt;b&gt;x&lt;/b&gt;");
    }
}

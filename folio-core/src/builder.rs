use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use rayon::prelude::*;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::assets::{self, AssetError, AssetJob, is_hidden, is_markdown};
use crate::config::{ConfigError, SiteConfig};
use crate::content::{self, ParseError, PageSeed};
use crate::markdown::MarkdownRenderer;
use crate::routes::{self, Route, RouteConflictError, SiteIndex, TagGroup};
use crate::sitemap;
use crate::template::{self, TemplateEngine, TemplateError};
use crate::watch::Cancellation;

const STAGING_PREFIX: &str = ".folio-staging-";
const PREVIOUS_PREFIX: &str = ".folio-previous-";
const TAG_TEMPLATE: &str = "tag.html";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub include_drafts: bool,
    /// Exposed to templates as `now`; fixed for the whole build.
    pub build_time: DateTime<Utc>,
    /// Run parse, render and write on the rayon pool.
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_drafts: false,
            build_time: build_time_from_env(),
            parallel: true,
        }
    }
}

/// `SOURCE_DATE_EPOCH` when set, otherwise the current time.
pub fn build_time_from_env() -> DateTime<Utc> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| parse_epoch(&raw))
        .unwrap_or_else(Utc::now)
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let secs = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Idle,
    Discovering,
    Parsing,
    Resolving,
    Rendering,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Idle => "idle",
            BuildStage::Discovering => "discovering",
            BuildStage::Parsing => "parsing",
            BuildStage::Resolving => "resolving",
            BuildStage::Rendering => "rendering",
            BuildStage::Writing => "writing",
            BuildStage::Done => "done",
            BuildStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("could not create staging directory in {}: {source}", path.display())]
    Staging { path: PathBuf, source: io::Error },
    #[error("{}: could not write output: {source}", path.display())]
    File { path: PathBuf, source: io::Error },
    #[error("could not publish output to {}: {source}", path.display())]
    Publish { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Discover,
    Parse,
    Route,
    Template,
    Asset,
    Write,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}: could not scan content: {source}", path.display())]
    Discover { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Route(#[from] RouteConflictError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Config(_) => ErrorKind::Config,
            BuildError::Discover { .. } => ErrorKind::Discover,
            BuildError::Parse(_) => ErrorKind::Parse,
            BuildError::Route(_) => ErrorKind::Route,
            BuildError::Template(_) => ErrorKind::Template,
            BuildError::Asset(_) => ErrorKind::Asset,
            BuildError::Write(_) => ErrorKind::Write,
            BuildError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Everything that went wrong in one build.
#[derive(Debug)]
pub struct BuildFailure {
    pub errors: Vec<BuildError>,
}

impl BuildFailure {
    /// Kind of the first error, which decides the exit status.
    pub fn kind(&self) -> ErrorKind {
        self.errors
            .first()
            .map(BuildError::kind)
            .unwrap_or(ErrorKind::Write)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cancelled() {
            return f.write_str("build cancelled");
        }
        let count = self.errors.len();
        write!(
            f,
            "build failed with {count} error{}",
            if count == 1 { "" } else { "s" }
        )?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailure {}

impl From<Vec<BuildError>> for BuildFailure {
    fn from(errors: Vec<BuildError>) -> Self {
        Self { errors }
    }
}

/// A finished file waiting to be written. Never changes once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl RenderedOutput {
    pub fn new(path: PathBuf, bytes: Vec<u8>) -> Self {
        Self { path, bytes }
    }

    /// Relative to the output root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub pages: usize,
    /// Tag pages and the sitemap.
    pub generated: usize,
    pub assets: usize,
    pub drafts_skipped: usize,
    pub output_dir: PathBuf,
    pub elapsed: Duration,
}

/// Drives one full build of a site.
///
/// Output is rendered into a staging directory next to the output root and
/// swapped in only when every stage succeeded, so a failed build leaves the
/// previous output untouched.
pub struct Builder {
    root: PathBuf,
    config: SiteConfig,
    options: BuildOptions,
    cancel: Cancellation,
    stage: BuildStage,
}

type Errors = Vec<BuildError>;

impl Builder {
    pub fn new<P: AsRef<Path>>(root: P, config: SiteConfig, options: BuildOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config,
            options,
            cancel: Cancellation::new(),
            stage: BuildStage::Idle,
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn build(&mut self) -> Result<BuildReport, BuildFailure> {
        let start = Instant::now();
        match self.run(start) {
            Ok(report) => {
                self.enter(BuildStage::Done);
                info!(
                    "Built {} pages and {} assets in {:.2?}",
                    report.pages, report.assets, report.elapsed
                );
                Ok(report)
            }
            Err(errors) => {
                self.enter(BuildStage::Failed);
                Err(BuildFailure::from(errors))
            }
        }
    }

    fn enter(&mut self, stage: BuildStage) {
        debug!("Build stage {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn checkpoint(&self) -> Result<(), Errors> {
        if self.cancel.is_cancelled() {
            info!("Build cancelled during {}", self.stage);
            Err(vec![BuildError::Cancelled])
        } else {
            Ok(())
        }
    }

    fn fan_out<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        if self.options.parallel {
            items.par_iter().map(f).collect()
        } else {
            items.iter().map(f).collect()
        }
    }

    fn run(&mut self, start: Instant) -> Result<BuildReport, Errors> {
        self.config
            .validate(&self.root)
            .map_err(|e| vec![BuildError::from(e)])?;

        self.enter(BuildStage::Discovering);
        let content_dir = self.config.content_path(&self.root);
        info!("Scanning {}", content_dir.display());
        let sources = discover(&content_dir).map_err(|e| vec![e])?;
        self.checkpoint()?;

        self.enter(BuildStage::Parsing);
        let mut errors: Errors = Vec::new();
        let seeds = self.parse(&content_dir, &sources, &mut errors);
        self.checkpoint()?;

        self.enter(BuildStage::Resolving);
        let engine = match TemplateEngine::load(
            &self.config.template_path(&self.root),
            &self.config.default_template,
        ) {
            Ok(engine) => Some(engine),
            Err(err) => {
                errors.push(err.into());
                None
            }
        };

        let mut site = match routes::resolve(seeds, &self.config, self.options.include_drafts) {
            Ok(site) => Some(site),
            Err(conflicts) => {
                errors.extend(conflicts.into_iter().map(BuildError::from));
                None
            }
        };

        let jobs = match assets::collect(&self.root, &self.config) {
            Ok(jobs) => jobs,
            Err(asset_errors) => {
                errors.extend(asset_errors.into_iter().map(BuildError::from));
                Vec::new()
            }
        };

        let mut tags = Vec::new();
        if let Some(site) = site.as_mut() {
            self.claim_generated(site, engine.as_ref(), &jobs, &mut tags, &mut errors);
        }
        self.checkpoint()?;

        let (Some(site), Some(engine)) = (site, engine) else {
            return Err(errors);
        };

        self.enter(BuildStage::Rendering);
        let outputs = self.render(&site, &engine, &tags, &mut errors);
        self.checkpoint()?;

        if !errors.is_empty() {
            return Err(errors);
        }

        self.enter(BuildStage::Writing);
        let output_dir = self.config.output_path(&self.root);
        let staging = self.stage_outputs(&output_dir, &outputs, &jobs)?;
        self.checkpoint()?;
        publish(staging, &output_dir).map_err(|e| vec![e.into()])?;

        Ok(BuildReport {
            pages: site.pages().len(),
            generated: outputs.len() - site.pages().len(),
            assets: jobs.len(),
            drafts_skipped: site.drafts_skipped(),
            output_dir,
            elapsed: start.elapsed(),
        })
    }

    fn parse(&self, content_dir: &Path, sources: &[PathBuf], errors: &mut Errors) -> Vec<PageSeed> {
        let results = self.fan_out(sources, |relative| {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            debug!("Parsing {}", relative.display());
            content::read_and_parse(content_dir, relative).map_err(BuildError::from)
        });

        let mut seeds = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(seed) => seeds.push(seed),
                Err(BuildError::Cancelled) => {}
                Err(err) => errors.push(err),
            }
        }
        seeds
    }

    /// Register asset, tag page and sitemap outputs alongside the pages so
    /// any overlap is reported as a conflict.
    fn claim_generated(
        &self,
        site: &mut SiteIndex,
        engine: Option<&TemplateEngine>,
        jobs: &[AssetJob],
        tags: &mut Vec<(TagGroup, Route)>,
        errors: &mut Errors,
    ) {
        for job in jobs {
            let owner = job
                .source
                .strip_prefix(&self.root)
                .unwrap_or(&job.source)
                .display()
                .to_string();
            if let Err(conflict) = site.claim(&job.output, owner) {
                errors.push(conflict.into());
            }
        }

        if engine.is_some_and(|e| e.has(TAG_TEMPLATE)) {
            for group in site.tags() {
                let route = Route::generated(&["tags"], &group.slug, self.config.clean_urls);
                match site.claim(&route.output, format!("tag page `{}`", group.name)) {
                    Ok(()) => tags.push((group, route)),
                    Err(conflict) => errors.push(conflict.into()),
                }
            }
        }

        if self.sitemap_enabled()
            && let Err(conflict) = site.claim(sitemap::output_path(), "generated sitemap".into())
        {
            errors.push(conflict.into());
        }
    }

    fn sitemap_enabled(&self) -> bool {
        self.config.sitemap && !self.config.base_url.is_empty()
    }

    fn render(
        &self,
        site: &SiteIndex,
        engine: &TemplateEngine,
        tags: &[(TagGroup, Route)],
        errors: &mut Errors,
    ) -> Vec<RenderedOutput> {
        let markdown = MarkdownRenderer::new(self.config.highlight, self.config.summary_words);
        let build_time = self.options.build_time;
        let indices: Vec<usize> = (0..site.pages().len()).collect();

        let mut results = self.fan_out(&indices, |&index| {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let page = site.page(index);
            let body = markdown.render(&page.body);
            let name = engine.resolve(
                page.meta.template.as_deref(),
                page.section.as_deref(),
                &page.source,
            );
            let context = template::page_context(&self.config, site, index, &body, build_time);
            let html = engine.render(&name, &context, &page.source)?;
            debug!("Rendered {} with {}", page.source.display(), name);
            Ok(RenderedOutput::new(page.route.output.clone(), html.into_bytes()))
        });

        results.extend(self.fan_out(tags, |(group, route)| -> Result<_, BuildError> {
            let context = template::tag_context(&self.config, site, group, route, build_time);
            let html = engine.render(TAG_TEMPLATE, &context, &route.output)?;
            Ok(RenderedOutput::new(route.output.clone(), html.into_bytes()))
        }));

        if self.sitemap_enabled() {
            results.push(
                sitemap::render(site)
                    .map(|xml| RenderedOutput::new(sitemap::output_path().to_path_buf(), xml))
                    .map_err(|source| {
                        BuildError::from(WriteError::File {
                            path: sitemap::output_path().to_path_buf(),
                            source,
                        })
                    }),
            );
        }

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(BuildError::Cancelled) => {}
                Err(err) => errors.push(err),
            }
        }
        outputs
    }

    /// Write pages and assets into a fresh staging directory beside the
    /// output root. The directory is removed on drop unless published.
    fn stage_outputs(
        &self,
        output_dir: &Path,
        outputs: &[RenderedOutput],
        jobs: &[AssetJob],
    ) -> Result<TempDir, Errors> {
        let staging = create_staging(output_dir).map_err(|e| vec![e.into()])?;
        debug!("Staging output in {}", staging.path().display());

        let mut errors: Errors = self
            .fan_out(outputs, |output| write_output(staging.path(), output))
            .into_iter()
            .filter_map(|r| r.err())
            .map(BuildError::from)
            .collect();

        // Assets go in after pages; a page and an asset never share a path.
        if let Err(asset_errors) = assets::copy_all(jobs, staging.path()) {
            errors.extend(asset_errors.into_iter().map(BuildError::from));
        }

        if errors.is_empty() {
            Ok(staging)
        } else {
            Err(errors)
        }
    }
}

/// Build the site at `root` once.
pub fn build_site<P: AsRef<Path>>(
    root: P,
    config: SiteConfig,
    options: BuildOptions,
) -> Result<BuildReport, BuildFailure> {
    Builder::new(root, config, options).build()
}

/// Markdown files under `content_dir`, relative to it, in path order.
fn discover(content_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !content_dir.is_dir() {
        return Err(BuildError::Discover {
            path: content_dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "content directory does not exist"),
        });
    }

    let mut sources = Vec::new();
    let walker = WalkDir::new(content_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(|err| BuildError::Discover {
            path: err.path().unwrap_or(content_dir).to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(content_dir) {
            sources.push(relative.to_path_buf());
        }
    }

    debug!("Found {} content files", sources.len());
    Ok(sources)
}

fn parent_dir(output_dir: &Path) -> &Path {
    match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn create_staging(output_dir: &Path) -> Result<TempDir, WriteError> {
    let parent = parent_dir(output_dir);
    let staging_err = |source| WriteError::Staging {
        path: parent.to_path_buf(),
        source,
    };

    fs::create_dir_all(parent).map_err(staging_err)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(staging_err)?;

    // Temp dirs are private; published output should not be.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755))
            .map_err(staging_err)?;
    }

    Ok(staging)
}

fn write_output(staging: &Path, output: &RenderedOutput) -> Result<(), WriteError> {
    let file_err = |source| WriteError::File {
        path: output.path().to_path_buf(),
        source,
    };
    let inside = output
        .path()
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !inside {
        return Err(file_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "output path leaves the output directory",
        )));
    }

    let target = staging.join(output.path());
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(file_err)?;
    }
    fs::write(&target, output.bytes()).map_err(file_err)
}

/// Swap the staged tree in for `output_dir`.
///
/// The previous output is moved into a temporary directory first and put
/// back if the final rename fails.
fn publish(staging: TempDir, output_dir: &Path) -> Result<(), WriteError> {
    let publish_err = |source| WriteError::Publish {
        path: output_dir.to_path_buf(),
        source,
    };

    let previous = if output_dir.exists() {
        let holder = tempfile::Builder::new()
            .prefix(PREVIOUS_PREFIX)
            .tempdir_in(parent_dir(output_dir))
            .map_err(publish_err)?;
        let moved = holder.path().join("site");
        fs::rename(output_dir, &moved).map_err(publish_err)?;
        Some((holder, moved))
    } else {
        None
    };

    if let Err(source) = fs::rename(staging.path(), output_dir) {
        if let Some((_, moved)) = &previous
            && let Err(restore) = fs::rename(moved, output_dir)
        {
            warn!(
                "Could not restore previous output from {}: {}",
                moved.display(),
                restore
            );
        }
        return Err(publish_err(source));
    }

    // The staging path now is the output root; it must not be cleaned up.
    let _ = staging.keep();
    debug!("Published {}", output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn options() -> BuildOptions {
        BuildOptions {
            include_drafts: false,
            build_time: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            parallel: false,
        }
    }

    fn minimal_site(root: &Path) {
        write(root, "templates/page.html", "{{ page.title }}");
        write(root, "content/index.md", "# Home\n");
    }

    #[test]
    fn stages_end_in_done() {
        let dir = tempfile::tempdir().unwrap();
        minimal_site(dir.path());

        let mut builder = Builder::new(dir.path(), SiteConfig::default(), options());
        assert_eq!(builder.stage(), BuildStage::Idle);
        let report = builder.build().unwrap();
        assert_eq!(builder.stage(), BuildStage::Done);
        assert_eq!(report.pages, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("public/index.html")).unwrap(),
            "Home"
        );
    }

    #[test]
    fn failures_end_in_failed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "content/index.md", "");

        let mut builder = Builder::new(dir.path(), SiteConfig::default(), options());
        let failure = builder.build().unwrap_err();
        assert_eq!(builder.stage(), BuildStage::Failed);
        assert_eq!(failure.kind(), ErrorKind::Template);
    }

    #[test]
    fn missing_content_dir_is_a_discover_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "templates/page.html", "");
        let failure = build_site(dir.path(), SiteConfig::default(), options()).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Discover);
    }

    #[test]
    fn all_parse_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        minimal_site(dir.path());
        write(dir.path(), "content/a.md", "---\ntitle: [\n---\n");
        write(dir.path(), "content/b.md", "---\ndraft: 3\n---\n");

        let failure = build_site(dir.path(), SiteConfig::default(), options()).unwrap_err();
        assert_eq!(failure.errors.len(), 2);
        assert!(failure.errors.iter().all(|e| e.kind() == ErrorKind::Parse));
        let message = failure.to_string();
        assert!(message.starts_with("build failed with 2 errors"));
        assert!(message.contains("a.md"));
        assert!(message.contains("b.md"));
    }

    #[test]
    fn asset_colliding_with_page_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        minimal_site(dir.path());
        write(dir.path(), "static/index.html", "<p>static</p>");

        let failure = build_site(dir.path(), SiteConfig::default(), options()).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Route);
    }

    #[test]
    fn pre_cancelled_build_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        minimal_site(dir.path());

        let cancel = Cancellation::new();
        cancel.cancel();
        let failure = Builder::new(dir.path(), SiteConfig::default(), options())
            .with_cancellation(cancel)
            .build()
            .unwrap_err();
        assert!(failure.is_cancelled());
        assert!(!dir.path().join("public").exists());
    }

    #[test]
    fn staging_dirs_do_not_linger() {
        let dir = tempfile::tempdir().unwrap();
        minimal_site(dir.path());
        build_site(dir.path(), SiteConfig::default(), options()).unwrap();
        build_site(dir.path(), SiteConfig::default(), options()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".folio-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn publish_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("public");
        write(&output, "stale.html", "old");

        let staging = create_staging(&output).unwrap();
        fs::write(staging.path().join("index.html"), "new").unwrap();
        publish(staging, &output).unwrap();

        assert!(!output.join("stale.html").exists());
        assert_eq!(fs::read_to_string(output.join("index.html")).unwrap(), "new");
    }

    #[test]
    fn vanished_asset_discards_the_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        minimal_site(dir.path());
        write(dir.path(), "static/logo.svg", "<svg/>");
        let jobs = assets::collect(dir.path(), &SiteConfig::default()).unwrap();
        fs::remove_file(dir.path().join("static/logo.svg")).unwrap();

        let builder = Builder::new(dir.path(), SiteConfig::default(), options());
        let pages = vec![RenderedOutput::new(PathBuf::from("index.html"), b"Home".to_vec())];
        let errors = builder
            .stage_outputs(&dir.path().join("public"), &pages, &jobs)
            .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Asset);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn outputs_stay_inside_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();

        for path in ["../outside.html", "/abs.html", "a/../../b.html"] {
            let output = RenderedOutput::new(PathBuf::from(path), b"x".to_vec());
            assert!(write_output(&staging, &output).is_err(), "{path}");
        }
        assert!(!dir.path().join("outside.html").exists());

        let output = RenderedOutput::new(PathBuf::from("a/b.html"), b"x".to_vec());
        write_output(&staging, &output).unwrap();
        assert!(staging.join("a/b.html").is_file());
    }

    #[test]
    fn source_date_epoch_values() {
        let parsed = parse_epoch(" 1700000000\n").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(parse_epoch("soon"), None);
    }
}

pub mod assets;
pub mod builder;
pub mod config;
pub mod content;
pub mod front_matter;
pub mod markdown;
pub mod routes;
pub mod scaffold;
pub mod sitemap;
pub mod template;
pub mod watch;

// Re-export main types
pub use builder::{
    BuildError, BuildFailure, BuildOptions, BuildReport, BuildStage, Builder, ErrorKind,
    build_site, build_time_from_env,
};
pub use config::{CONFIG_FILE, ConfigError, SiteConfig};
pub use content::{PageSeed, ParseError};
pub use front_matter::{FrontMatter, PageMeta, Value};
pub use markdown::{MarkdownRenderer, slugify};
pub use routes::{NavEntry, Page, Route, RouteConflictError, SiteIndex};
pub use scaffold::{ContentKind, ScaffoldError, new_content, new_site};
pub use template::{TemplateEngine, TemplateError};
pub use watch::{Cancellation, ChangeKind, ChangeSet, SiteLayout};

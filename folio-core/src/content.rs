//! Content files: front matter splitting and page seeds.

use std::path::{Path, PathBuf};

use crate::front_matter::{FieldError, FrontMatter, PageMeta, Value};
use crate::markdown::first_heading;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{}: could not read file: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: content is not valid UTF-8", path.display())]
    Encoding { path: PathBuf },
    #[error("{}: front matter opened with `{delimiter}` is never closed", path.display())]
    Unterminated {
        path: PathBuf,
        delimiter: &'static str,
    },
    #[error("{}: invalid {format} front matter: {message}", path.display())]
    Invalid {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("{}: front matter must be a mapping of keys to values", path.display())]
    NotAMapping { path: PathBuf },
    #[error("{}: {source}", path.display())]
    Field { path: PathBuf, source: FieldError },
}

impl ParseError {
    pub fn path(&self) -> &Path {
        match self {
            ParseError::Read { path, .. }
            | ParseError::Encoding { path }
            | ParseError::Unterminated { path, .. }
            | ParseError::Invalid { path, .. }
            | ParseError::NotAMapping { path }
            | ParseError::Field { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
}

impl Format {
    fn from_delimiter(line: &str) -> Option<Self> {
        match line.trim_end() {
            "---" => Some(Format::Yaml),
            "+++" => Some(Format::Toml),
            _ => None,
        }
    }

    fn delimiter(self) -> &'static str {
        match self {
            Format::Yaml => "---",
            Format::Toml => "+++",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Format::Yaml => "YAML",
            Format::Toml => "TOML",
        }
    }
}

/// A parsed content file that has not been routed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSeed {
    /// Path relative to the content directory.
    pub source: PathBuf,
    pub front_matter: FrontMatter,
    pub meta: PageMeta,
    /// Everything after the front matter block, untouched.
    pub body: String,
    pub title: String,
}

/// Parse one content file.
///
/// A file without a front matter block is valid and gets empty metadata.
pub fn parse(source: &Path, bytes: &[u8]) -> Result<PageSeed, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding {
        path: source.to_path_buf(),
    })?;

    let (front_matter, body) = match split(text) {
        Split::None => (FrontMatter::new(), text),
        Split::Unterminated(format) => {
            return Err(ParseError::Unterminated {
                path: source.to_path_buf(),
                delimiter: format.delimiter(),
            });
        }
        Split::Block {
            format,
            block,
            body,
        } => (parse_block(source, format, block)?, body),
    };

    let meta = PageMeta::from_front_matter(&front_matter).map_err(|source_err| {
        ParseError::Field {
            path: source.to_path_buf(),
            source: source_err,
        }
    })?;

    let title = meta
        .title
        .clone()
        .or_else(|| first_heading(body))
        .unwrap_or_else(|| default_title(source));

    Ok(PageSeed {
        source: source.to_path_buf(),
        front_matter,
        meta,
        body: body.to_string(),
        title,
    })
}

/// Read `content_root/relative` and parse it.
pub fn read_and_parse(content_root: &Path, relative: &Path) -> Result<PageSeed, ParseError> {
    let bytes = std::fs::read(content_root.join(relative)).map_err(|source| ParseError::Read {
        path: relative.to_path_buf(),
        source,
    })?;
    parse(relative, &bytes)
}

enum Split<'a> {
    None,
    Unterminated(Format),
    Block {
        format: Format,
        block: &'a str,
        body: &'a str,
    },
}

fn split(text: &str) -> Split<'_> {
    let Some(first_end) = text.find('\n') else {
        return match Format::from_delimiter(text) {
            Some(format) => Split::Unterminated(format),
            None => Split::None,
        };
    };
    let Some(format) = Format::from_delimiter(&text[..first_end]) else {
        return Split::None;
    };

    let block_start = first_end + 1;
    let mut pos = block_start;
    while pos <= text.len() {
        let line_end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
        if text[pos..line_end].trim_end() == format.delimiter() {
            let body_start = (line_end + 1).min(text.len());
            return Split::Block {
                format,
                block: &text[block_start..pos],
                body: &text[body_start..],
            };
        }
        if line_end == text.len() {
            break;
        }
        pos = line_end + 1;
    }

    Split::Unterminated(format)
}

fn parse_block(source: &Path, format: Format, block: &str) -> Result<FrontMatter, ParseError> {
    let invalid = |message: String| ParseError::Invalid {
        path: source.to_path_buf(),
        format: format.name(),
        message,
    };

    let value = match format {
        Format::Yaml => {
            if block.trim().is_empty() {
                return Ok(FrontMatter::new());
            }
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(block).map_err(|e| invalid(e.to_string()))?;
            Value::from_yaml(yaml).map_err(invalid)?
        }
        Format::Toml => {
            let table: toml::Table = toml::from_str(block).map_err(|e| invalid(e.to_string()))?;
            Value::from_toml(toml::Value::Table(table))
        }
    };

    match value {
        Value::Table(fields) => Ok(FrontMatter::from_map(fields)),
        Value::Null => Ok(FrontMatter::new()),
        _ => Err(ParseError::NotAMapping {
            path: source.to_path_buf(),
        }),
    }
}

/// Title for a page with neither a `title` key nor a level-1 heading.
fn default_title(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    if stem == "index" {
        return match source.parent().and_then(Path::file_name) {
            Some(dir) => humanize(&dir.to_string_lossy()),
            None => "Home".to_string(),
        };
    }
    humanize(&stem)
}

/// `getting-started` becomes `Getting started`.
pub fn humanize(name: &str) -> String {
    let spaced = name.replace(['-', '_'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

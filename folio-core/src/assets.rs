//! Static files copied verbatim into the output tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::SiteConfig;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("{}: could not read asset: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: could not write asset: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl AssetError {
    pub fn path(&self) -> &Path {
        match self {
            AssetError::Read { path, .. } | AssetError::Write { path, .. } => path,
        }
    }
}

/// One file to copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetJob {
    pub source: PathBuf,
    /// Relative to the output root.
    pub output: PathBuf,
}

pub(crate) fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

pub(crate) fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

/// Find every asset to copy.
///
/// Asset directories are walked in configured order, then the content
/// directory for anything that is not Markdown. When two roots provide the
/// same relative path the later one wins.
pub fn collect(root: &Path, config: &SiteConfig) -> Result<Vec<AssetJob>, Vec<AssetError>> {
    let mut jobs: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    let mut errors = Vec::new();

    let mut roots: Vec<(PathBuf, bool)> = config
        .asset_paths(root)
        .into_iter()
        .map(|dir| (dir, false))
        .collect();
    roots.push((config.content_path(root), true));

    for (dir, skip_markdown) in roots {
        if !dir.is_dir() {
            debug!("Asset directory {} does not exist, skipping", dir.display());
            continue;
        }

        let walker = WalkDir::new(&dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(&dir).to_path_buf();
                    errors.push(AssetError::Read {
                        path,
                        source: err.into(),
                    });
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let source = entry.path();
            if skip_markdown && is_markdown(source) {
                continue;
            }

            let Ok(relative) = source.strip_prefix(&dir) else {
                continue;
            };
            if let Some(previous) = jobs.insert(relative.to_path_buf(), source.to_path_buf()) {
                debug!(
                    "{} overrides {}",
                    source.display(),
                    previous.display()
                );
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(jobs
        .into_iter()
        .map(|(output, source)| AssetJob { source, output })
        .collect())
}

/// Copy every job into `dest`, reporting all failures.
pub fn copy_all(jobs: &[AssetJob], dest: &Path) -> Result<usize, Vec<AssetError>> {
    let errors: Vec<AssetError> = jobs
        .par_iter()
        .filter_map(|job| copy_one(job, dest).err())
        .collect();

    if errors.is_empty() {
        Ok(jobs.len())
    } else {
        Err(errors)
    }
}

fn copy_one(job: &AssetJob, dest: &Path) -> Result<(), AssetError> {
    let bytes = fs::read(&job.source).map_err(|source| AssetError::Read {
        path: job.source.clone(),
        source,
    })?;

    let target = dest.join(&job.output);
    let write_err = |source| AssetError::Write {
        path: target.clone(),
        source,
    };
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(&target, bytes).map_err(write_err)?;
    debug!("Copied {}", job.output.display());
    Ok(())
}

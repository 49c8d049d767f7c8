//! Source tree enumeration
//!
//! Walks a unit's local source roots through include/exclude glob sets and
//! reads every match into a transient `FileRecord`. Reads run through a
//! bounded worker pool; results are re-sorted by path so downstream digest
//! and archive work stays deterministic.

use anyhow::{anyhow, Context, Result};
use camino::Utf8PathBuf;
use futures::{stream, StreamExt, TryStreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use nimbus_core::types::{LocalSource, SourceReference, Unit};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// One enumerated file, alive for a single packaging pass
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Archive-relative path, forward slashes
    pub path: String,

    /// File bytes; for a symlink, the link target
    pub content: Vec<u8>,

    /// Permission bits from stat
    pub mode: u32,

    pub is_symlink: bool,
}

/// Enumerate and read every file referenced by the unit's local sources.
///
/// For the multi-function component the per-function roots are walked
/// independently and unioned, each prefixed with its function name.
pub async fn collect_files(unit: &Unit, concurrency: usize) -> Result<Vec<FileRecord>> {
    let mut pending: Vec<(String, PathBuf, bool)> = Vec::new();

    for (function, source) in unit.source_references() {
        let SourceReference::Local(local) = source else {
            continue;
        };
        let root = resolve_root(&unit.root, &local);
        let matcher = SourceMatcher::new(&local)?;

        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {root}"))?;
            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(root.as_std_path())
                .with_context(|| format!("Failed to relativize {:?}", entry.path()))?;
            if !matcher.matches(rel) {
                continue;
            }

            let archive_path = match &function {
                Some(name) => format!("{}/{}", name, unix_path(rel)),
                None => unix_path(rel),
            };
            pending.push((archive_path, entry.into_path(), file_type.is_symlink()));
        }
    }

    debug!("Enumerated {} candidate files", pending.len());

    let mut files: Vec<FileRecord> = stream::iter(pending)
        .map(|(path, disk_path, is_symlink)| async move {
            read_record(path, &disk_path, is_symlink).await
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn resolve_root(unit_root: &camino::Utf8Path, local: &LocalSource) -> Utf8PathBuf {
    let root = Utf8PathBuf::from(local.root.as_str());
    if root.is_absolute() {
        root
    } else {
        unit_root.join(root)
    }
}

async fn read_record(path: String, disk_path: &Path, is_symlink: bool) -> Result<FileRecord> {
    let metadata = tokio::fs::symlink_metadata(disk_path)
        .await
        .with_context(|| format!("Failed to stat {disk_path:?}"))?;

    let content = if is_symlink {
        let target = tokio::fs::read_link(disk_path)
            .await
            .with_context(|| format!("Failed to read link target of {disk_path:?}"))?;
        target.to_string_lossy().into_owned().into_bytes()
    } else {
        tokio::fs::read(disk_path)
            .await
            .with_context(|| format!("Failed to read {disk_path:?}"))?
    };

    Ok(FileRecord {
        path,
        content,
        mode: file_mode(&metadata),
        is_symlink,
    })
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

fn unix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Compiled include/exclude sets for one source root
struct SourceMatcher {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl SourceMatcher {
    fn new(local: &LocalSource) -> Result<Self> {
        let include = if local.include.is_empty() {
            None
        } else {
            Some(build_globset(&local.include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(&local.exclude)?,
        })
    }

    fn matches(&self, rel: &Path) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(rel) {
                return false;
            }
        }
        !self.exclude.is_match(rel)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| anyhow!("Invalid source glob '{}': {}", pattern, e))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| anyhow!("Failed to build source globset: {}", e))
}

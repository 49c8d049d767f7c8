//! Content digests and cache-manifest diffing
//!
//! The cache manifest is the filename→digest map left behind by the last
//! successful upload. Diffing against it yields the minimal set of archive
//! entries plus the filenames the remote side must delete.

use crate::files::FileRecord;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// filename → hex SHA-256 digest
pub type CacheManifest = BTreeMap<String, String>;

/// Hex SHA-256 of a byte slice
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Outcome of diffing the enumerated files against the previous manifest
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Paths whose content is new or differs from the cache
    pub included: BTreeSet<String>,

    /// Filenames present in the cache but no longer enumerated
    pub deleted: Vec<String>,

    /// The full new filename→digest mapping, superseding the cache
    pub manifest: CacheManifest,

    /// Symlinks disable caching: link targets are not reliably diffable
    /// by content across runs, so the whole tree is re-sent.
    pub force: bool,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.included.is_empty() || !self.deleted.is_empty()
    }
}

/// Diff enumerated files against the previous cache manifest.
pub fn diff_against_cache(files: &[FileRecord], previous: &CacheManifest) -> ChangeSet {
    let force = files.iter().any(|f| f.is_symlink);
    let empty = CacheManifest::new();
    let effective = if force { &empty } else { previous };

    let mut manifest = CacheManifest::new();
    let mut included = BTreeSet::new();

    for file in files {
        let digest = content_digest(&file.content);
        if effective.get(&file.path) != Some(&digest) {
            included.insert(file.path.clone());
        }
        manifest.insert(file.path.clone(), digest);
    }

    let deleted: Vec<String> = effective
        .keys()
        .filter(|name| !manifest.contains_key(*name))
        .cloned()
        .collect();

    debug!(
        "Change detection: {} changed, {} deleted, force={}",
        included.len(),
        deleted.len(),
        force
    );

    ChangeSet {
        included,
        deleted,
        manifest,
        force,
    }
}

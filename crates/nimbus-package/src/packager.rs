//! The packaging pass
//!
//! Ties enumeration, change detection, archive assembly, the size budget,
//! and the pre-signed upload together for one unit.

use crate::archive::build_archive;
use crate::cache::{diff_against_cache, CacheManifest};
use crate::files::collect_files;
use crate::store::ObjectStore;
use anyhow::{Context, Result};
use nimbus_core::types::Unit;
use nimbus_core::Error;
use tracing::{debug, warn};

/// Default upload budget: 500 MiB of raw content
pub const DEFAULT_MAX_PACKAGE_SIZE: u64 = 500 * 1024 * 1024;

/// Default bounded-pool width for file reads and hashing
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Pre-signed destinations for one unit's packaging pass, as issued by the
/// control plane
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PackageTarget {
    /// Where to PUT the archive
    pub upload_url: String,

    /// Where the previous cache manifest lives (may be absent)
    pub previous_manifest_url: String,

    /// The handle the component downloads the package from; replaces the
    /// unit's source reference after upload
    pub download_url: String,
}

#[derive(Debug, Clone)]
pub struct PackagerConfig {
    pub max_package_size: u64,
    pub concurrency: usize,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// What one packaging pass produced
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    /// Whether any file content changed relative to the cache manifest
    pub has_changes: bool,

    /// Files carried in the archive (synthetic entries excluded)
    pub files_included: usize,

    /// Raw content bytes of the included files
    pub bytes: u64,

    /// The new digest manifest, superseding the remote one
    pub manifest: CacheManifest,

    /// Filenames the remote side must delete
    pub deleted: Vec<String>,

    /// Caching was disabled for this pass (symlink present)
    pub force: bool,

    /// The previous manifest could not be used (absent or fetch failed)
    pub cache_outdated: bool,

    /// Pre-signed download handle for the uploaded archive
    pub download_url: String,

    /// The uploaded archive bytes, kept for the code-update fast path
    pub archive: Vec<u8>,
}

/// Run the full packaging pass for one unit: enumerate, diff, assemble,
/// enforce the budget, upload. The budget check happens strictly before
/// the upload call; an over-budget tree never partially uploads.
pub async fn package_unit(
    unit: &Unit,
    target: &PackageTarget,
    store: &dyn ObjectStore,
    config: &PackagerConfig,
) -> Result<PackageOutcome> {
    let files = collect_files(unit, config.concurrency).await?;

    let previous = fetch_cache_manifest(store, &target.previous_manifest_url).await;
    let cache_outdated = previous.is_none();
    let previous = previous.unwrap_or_default();

    let changes = diff_against_cache(&files, &previous);

    let total_bytes: u64 = files
        .iter()
        .filter(|f| changes.included.contains(&f.path))
        .map(|f| f.content.len() as u64)
        .sum();
    if total_bytes > config.max_package_size {
        return Err(Error::package_too_large(
            unit.identity.qualified_name(),
            total_bytes,
            config.max_package_size,
        )
        .into());
    }

    let archive = build_archive(&files, &changes)?;
    debug!(
        "Packaged {}: {} files, {} raw bytes, {} archive bytes",
        unit.identity.qualified_name(),
        changes.included.len(),
        total_bytes,
        archive.len()
    );

    store
        .put(&target.upload_url, archive.clone())
        .await
        .context("Failed to upload package archive")?;

    Ok(PackageOutcome {
        has_changes: changes.has_changes(),
        files_included: changes.included.len(),
        bytes: total_bytes,
        deleted: changes.deleted,
        force: changes.force,
        cache_outdated: cache_outdated || changes.force,
        manifest: changes.manifest,
        download_url: target.download_url.clone(),
        archive,
    })
}

/// Best-effort fetch of the previous cache manifest. Any failure falls
/// back to an empty manifest, which forces a full package.
async fn fetch_cache_manifest(store: &dyn ObjectStore, url: &str) -> Option<CacheManifest> {
    match store.get(url).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!("Previous cache manifest is unreadable ({err}), forcing full package");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!("Cache manifest fetch failed ({err}), forcing full package");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use camino::Utf8PathBuf;
    use nimbus_core::types::UnitIdentity;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn unit(dir: &TempDir) -> Unit {
        Unit {
            identity: UnitIdentity {
                org: None,
                app: "demo".to_string(),
                stage: "dev".to_string(),
                name: "api".to_string(),
                component: "scf".to_string(),
            },
            inputs: json!({ "src": "./code" }),
            deps: BTreeSet::new(),
            root: Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap(),
        }
    }

    fn target() -> PackageTarget {
        PackageTarget {
            upload_url: "mem://upload".to_string(),
            previous_manifest_url: "mem://manifest".to_string(),
            download_url: "mem://download".to_string(),
        }
    }

    fn write_source(dir: &TempDir, files: &[(&str, &[u8])]) {
        fs::create_dir_all(dir.path().join("code")).unwrap();
        for (name, content) in files {
            fs::write(dir.path().join("code").join(name), content).unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_pass_packages_everything() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.js", b"aa"), ("b.js", b"bb")]);
        let store = MemoryObjectStore::new();

        let outcome = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();

        assert!(outcome.has_changes);
        assert!(outcome.cache_outdated);
        assert_eq!(outcome.files_included, 2);
        assert_eq!(outcome.bytes, 4);
        assert!(store.object("mem://upload").is_some());
    }

    #[tokio::test]
    async fn test_unchanged_round_trip_reports_no_changes() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.js", b"aa")]);
        let store = MemoryObjectStore::new();

        let first = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();
        store.insert(
            "mem://manifest",
            serde_json::to_vec(&first.manifest).unwrap(),
        );

        let second = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();

        assert!(!second.has_changes);
        assert!(!second.cache_outdated);
        assert_eq!(second.files_included, 0);
        assert_eq!(second.manifest, first.manifest);
    }

    #[tokio::test]
    async fn test_size_budget_boundary() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.bin", &[0u8; 1024])]);
        let store = MemoryObjectStore::new();

        // exactly at budget: succeeds
        let config = PackagerConfig {
            max_package_size: 1024,
            ..PackagerConfig::default()
        };
        assert!(package_unit(&unit(&dir), &target(), &store, &config)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_one_byte_over_budget_fails_before_upload() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.bin", &[0u8; 1025])]);
        let store = MemoryObjectStore::new();

        let config = PackagerConfig {
            max_package_size: 1024,
            ..PackagerConfig::default()
        };
        let err = package_unit(&unit(&dir), &target(), &store, &config)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::PackageTooLarge { .. })
        ));
        // nothing reached the store
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_cache_manifest_is_best_effort() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.js", b"aa")]);
        let store = MemoryObjectStore::new();
        store.insert("mem://manifest", b"{not json".to_vec());

        let outcome = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();
        assert!(outcome.has_changes);
        assert!(outcome.cache_outdated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_disables_caching() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.js", b"aa")]);
        std::os::unix::fs::symlink("a.js", dir.path().join("code/link.js")).unwrap();
        let store = MemoryObjectStore::new();

        let first = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();
        store.insert(
            "mem://manifest",
            serde_json::to_vec(&first.manifest).unwrap(),
        );

        let second = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();

        assert!(second.force);
        assert!(second.cache_outdated);
        // matching manifest notwithstanding, everything re-sends
        assert_eq!(second.files_included, 2);
    }

    #[tokio::test]
    async fn test_deterministic_manifest() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, &[("a.js", b"aa"), ("b.js", b"bb")]);
        let store = MemoryObjectStore::new();

        let first = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();
        let second = package_unit(&unit(&dir), &target(), &store, &PackagerConfig::default())
            .await
            .unwrap();

        assert_eq!(first.manifest, second.manifest);
    }
}

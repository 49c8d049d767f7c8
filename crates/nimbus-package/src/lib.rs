//! Change detection and incremental packaging
//!
//! This crate handles:
//! - Source tree enumeration through include/exclude glob sets
//! - Content digests and cache-manifest diffing
//! - Minimal archive assembly with the synthetic manifest entries
//! - Pre-signed object-storage upload/download

pub mod archive;
pub mod cache;
pub mod files;
pub mod packager;
pub mod store;

pub use archive::{build_archive, DELETED_FILES_ENTRY, SRC_MAP_ENTRY};
pub use cache::{content_digest, diff_against_cache, CacheManifest, ChangeSet};
pub use files::{collect_files, FileRecord};
pub use packager::{
    package_unit, PackageOutcome, PackageTarget, PackagerConfig, DEFAULT_MAX_PACKAGE_SIZE,
};
pub use store::{HttpObjectStore, MemoryObjectStore, ObjectStore};

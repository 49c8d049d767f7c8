//! Incremental archive assembly
//!
//! Builds one gzipped tar containing the changed files plus two synthetic
//! entries: `src.map` (the superseding digest manifest) and `deleted.files`
//! (filenames the remote side must remove). Entry order and metadata are
//! fixed so the same inputs produce the same member list.

use crate::cache::ChangeSet;
use crate::files::FileRecord;
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder as TarBuilder, EntryType, Header};

/// Synthetic entry carrying the new digest manifest
pub const SRC_MAP_ENTRY: &str = "src.map";

/// Synthetic entry carrying filenames to delete remotely
pub const DELETED_FILES_ENTRY: &str = "deleted.files";

/// Build the archive bytes for one packaging pass.
pub fn build_archive(files: &[FileRecord], changes: &ChangeSet) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = TarBuilder::new(encoder);

    // `files` is path-sorted by enumeration; included entries inherit that
    for file in files {
        if !changes.included.contains(&file.path) {
            continue;
        }

        if file.is_symlink {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(file.mode);
            header.set_mtime(0);
            let target = String::from_utf8_lossy(&file.content).into_owned();
            tar.append_link(&mut header, &file.path, &target)
                .with_context(|| format!("Failed to append symlink {}", file.path))?;
        } else {
            let mut header = Header::new_gnu();
            header.set_size(file.content.len() as u64);
            header.set_mode(file.mode);
            header.set_mtime(0);
            tar.append_data(&mut header, &file.path, file.content.as_slice())
                .with_context(|| format!("Failed to append {}", file.path))?;
        }
    }

    append_synthetic(&mut tar, SRC_MAP_ENTRY, serde_json::to_vec(&changes.manifest)?)?;
    append_synthetic(
        &mut tar,
        DELETED_FILES_ENTRY,
        serde_json::to_vec(&changes.deleted)?,
    )?;

    let encoder = tar.into_inner().context("Failed to finish archive")?;
    encoder.finish().context("Failed to finish compression")
}

fn append_synthetic<W: std::io::Write>(
    tar: &mut TarBuilder<W>,
    name: &str,
    content: Vec<u8>,
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    tar.append_data(&mut header, name, content.as_slice())
        .with_context(|| format!("Failed to append {name}"))
}

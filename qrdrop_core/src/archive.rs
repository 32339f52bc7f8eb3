//! Normalizes a shared path into exactly one servable file.
//!
//! Regular files are served in place. Directories are zipped next to the
//! source and the archive becomes a temp artifact owned by the session.

use crate::error::{Result, ShareError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ARCHIVE_EXTENSION: &str = "zip";

/// A single file ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedResource {
    /// Directory the server serves from
    pub root_dir: PathBuf,
    /// Raw (unencoded) file name clients must request
    pub served_name: String,
    /// Archive created for this session, deleted at teardown
    pub temp_artifact: Option<PathBuf>,
}

impl StagedResource {
    pub fn file_path(&self) -> PathBuf {
        self.root_dir.join(&self.served_name)
    }
}

/// Stage `path` without blocking the async runtime.
pub async fn stage(path: &Path) -> Result<StagedResource> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || stage_blocking(&path))
        .await
        .map_err(|e| ShareError::Archive(format!("staging task failed: {}", e)))?
}

pub fn stage_blocking(path: &Path) -> Result<StagedResource> {
    let abs_path = fs::canonicalize(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ShareError::NotFound(path.to_path_buf()),
        _ => ShareError::Io(e),
    })?;

    let name = utf8_file_name(&abs_path)?;
    let root_dir = abs_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ShareError::InvalidRequest("cannot share the filesystem root".to_string()))?;

    if abs_path.is_dir() {
        let archive_path = reserve_archive_path(&root_dir, &name)?;
        zip_directory(&abs_path, &archive_path)?;
        tracing::info!(
            "Archived {} into {}",
            abs_path.display(),
            archive_path.display()
        );

        Ok(StagedResource {
            root_dir,
            served_name: utf8_file_name(&archive_path)?,
            temp_artifact: Some(archive_path),
        })
    } else {
        Ok(StagedResource {
            root_dir,
            served_name: name,
            temp_artifact: None,
        })
    }
}

fn utf8_file_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .ok_or_else(|| ShareError::InvalidRequest(format!("{} has no file name", path.display())))?;
    name.to_str().map(str::to_string).ok_or_else(|| {
        ShareError::InvalidRequest(format!("{} is not valid UTF-8", path.display()))
    })
}

/// Reserve `<dir>/<name>.zip`, or `<name>-<suffix>.zip` when that is
/// already taken, by creating it empty. Creation is atomic, so an existing
/// file or a concurrent staging of the same directory is never shared.
fn reserve_archive_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let preferred = dir.join(format!("{}.{}", name, ARCHIVE_EXTENSION));
    if try_reserve(&preferred)? {
        return Ok(preferred);
    }

    loop {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let candidate = dir.join(format!("{}-{}.{}", name, &suffix[..8], ARCHIVE_EXTENSION));
        if try_reserve(&candidate)? {
            return Ok(candidate);
        }
    }
}

fn try_reserve(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(ShareError::Io(e)),
    }
}

/// Zip the contents of `src_dir` (entries relative to it) into the reserved
/// `dest`. Written to a `.part` file unique to this call and renamed over the
/// placeholder once complete.
fn zip_directory(src_dir: &Path, dest: &Path) -> Result<()> {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let part_path = dest.with_extension(format!("{}.{}.part", ARCHIVE_EXTENSION, &suffix[..8]));

    let result = write_archive(src_dir, &part_path).and_then(|()| {
        fs::rename(&part_path, dest)?;
        Ok(())
    });
    if result.is_err() {
        let _ = fs::remove_file(&part_path);
        let _ = fs::remove_file(dest);
    }
    result
}

fn write_archive(src_dir: &Path, part_path: &Path) -> Result<()> {
    let file = File::create(part_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut file_count = 0usize;
    for entry in WalkDir::new(src_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| ShareError::Archive(e.to_string()))?;
        let entry_name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        // Follows symlinks that point at regular files, skips the rest
        let metadata = match fs::metadata(entry.path()) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry {}: {}", entry.path().display(), e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", entry_name), options)?;
        } else if metadata.is_file() {
            let file_options = options.large_file(metadata.len() > u32::MAX as u64);
            zip.start_file(entry_name, file_options)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut zip)?;
            file_count += 1;
        } else {
            tracing::debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    tracing::debug!("Wrote {} file(s) to {}", file_count, part_path.display());
    Ok(())
}

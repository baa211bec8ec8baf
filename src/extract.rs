//! Archive extraction and payload discovery.

use crate::error::ArchiveError;
use flate2::read::GzDecoder;
use std::error::Error as StdError;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Container formats the extractor understands, chosen by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detects the format from the file name. Returns `None` for names that do
    /// not look like an archive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }
}

/// Extracts every entry of `archive` into `dest_dir`.
///
/// Unknown extensions are attempted as ZIP. Entries whose path would escape
/// `dest_dir` are skipped.
///
/// # Returns
///
/// The number of files written, [`ArchiveError::Corrupt`] when the archive
/// cannot be opened, parsed or read back (checksum mismatch, broken or
/// truncated compressed data), or [`ArchiveError::Io`] for failures opening
/// the archive file or writing into `dest_dir`.
pub(crate) fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    std::fs::create_dir_all(dest_dir)?;
    let file = File::open(archive)?;

    match ArchiveKind::from_path(archive).unwrap_or(ArchiveKind::Zip) {
        ArchiveKind::Zip => extract_zip(file, dest_dir),
        ArchiveKind::Tar => extract_tar(BufReader::new(file), dest_dir),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(BufReader::new(file)), dest_dir),
    }
}

fn extract_zip(file: File, dest_dir: &Path) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;
    let mut file_count = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_error)?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping ZIP entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out_path)?;
        io::copy(&mut SourceReader::new(&mut entry), &mut outfile).map_err(classify_io)?;
        file_count += 1;
    }

    debug!("Extracted {} ZIP entries into {:?}", file_count, dest_dir);
    Ok(file_count)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<usize, ArchiveError> {
    let mut archive = Archive::new(SourceReader::new(reader));
    let mut file_count = 0usize;

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    for entry in entries {
        // Header and decompression failures both surface here.
        let mut entry = entry.map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let is_file = entry.header().entry_type().is_file();

        if entry.unpack_in(dest_dir).map_err(classify_io)? {
            if is_file {
                file_count += 1;
            }
        } else {
            warn!("Skipping tar entry with unsafe path");
        }
    }

    debug!("Extracted {} tar entries into {:?}", file_count, dest_dir);
    Ok(file_count)
}

fn zip_error(e: zip::result::ZipError) -> ArchiveError {
    match e {
        zip::result::ZipError::Io(e) => classify_io(e),
        other => ArchiveError::Corrupt(other.to_string()),
    }
}

/// A read failure on the archive stream itself: bad checksums, broken
/// compressed data, truncated input.
#[derive(Error, Debug)]
#[error("{0}")]
struct SourceReadError(io::Error);

/// Wraps every read error of the archive stream in [`SourceReadError`].
struct SourceReader<R> {
    inner: R,
}

impl<R> SourceReader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .read(buf)
            .map_err(|e| io::Error::new(e.kind(), SourceReadError(e)))
    }
}

/// `Corrupt` when `e` wraps a [`SourceReadError`] anywhere in its cause chain,
/// `Io` otherwise.
fn classify_io(e: io::Error) -> ArchiveError {
    match source_read_failure(&e) {
        Some(reason) => ArchiveError::Corrupt(reason),
        None => ArchiveError::Io(e),
    }
}

fn source_read_failure(e: &io::Error) -> Option<String> {
    let mut current = e
        .get_ref()
        .map(|inner| inner as &(dyn StdError + 'static));

    while let Some(err) = current {
        if let Some(read_err) = err.downcast_ref::<SourceReadError>() {
            return Some(read_err.to_string());
        }
        // `io::Error::source` skips its own payload, so unwrap it by hand.
        current = match err.downcast_ref::<io::Error>() {
            Some(io_err) => io_err
                .get_ref()
                .map(|inner| inner as &(dyn StdError + 'static)),
            None => err.source(),
        };
    }
    None
}

/// Whether `name` ends with one of `extensions`, ignoring ASCII case.
pub(crate) fn matches_payload(name: &str, extensions: &[String]) -> bool {
    let name = name.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| name.ends_with(&ext.to_ascii_lowercase()))
}

/// Recursively lists regular files under `dir` whose name matches one of
/// `extensions`, in file-name order.
pub(crate) fn find_payload_files(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable path while scanning {:?}: {}", dir, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| matches_payload(name, extensions))
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Lists archives directly inside `dir`, sorted by path.
pub(crate) fn discover_archives(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut archives = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && ArchiveKind::from_path(&path).is_some() {
            archives.push(path);
        }
    }

    archives.sort();
    Ok(archives)
}

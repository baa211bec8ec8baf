//! Sequential extract stage.
//!
//! Each archive is unpacked into its own scratch directory under the working
//! directory, payload files are moved up into the working directory under a
//! collision-free name, and the scratch directory is removed again.

use crate::error::{ArchiveError, ItemError};
use crate::events::{Emitter, EventSink, PipelineEvent, Stage};
use crate::extract::{extract_archive, find_payload_files};
use crate::types::ExtractJob;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of the scratch directories created inside the working directory.
const SCRATCH_PREFIX: &str = ".extract-";

/// What the extract stage produced when it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub destination: PathBuf,
    /// Final paths of relocated payload files.
    pub relocated: Vec<PathBuf>,
    /// Archives handled, successfully or not.
    pub processed: usize,
    /// Whether the run stopped early because of cancellation.
    pub cancelled: bool,
}

/// Unpacks an ordered list of archives into a working directory.
pub struct ExtractStage {
    job: ExtractJob,
    work_dir: PathBuf,
    extensions: Vec<String>,
    cancel: CancellationToken,
}

impl ExtractStage {
    pub fn new(
        archives: Vec<PathBuf>,
        work_dir: impl Into<PathBuf>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            job: ExtractJob::new(archives),
            work_dir: work_dir.into(),
            extensions,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` as the stage's cancellation flag.
    ///
    /// Cancellation is checked between archives only; an archive that is
    /// already being extracted is finished first.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Processes every archive and emits the terminal `Finished` event
    /// exactly once.
    pub async fn run(mut self, sink: &dyn EventSink) -> ExtractOutcome {
        let events = Emitter::new(Stage::Extract, sink);
        let total = self.job.archives.len();

        info!("Extracting {} archives into {:?}", total, self.work_dir);
        events.emit(PipelineEvent::Started {
            message: format!("Extracting {} archives...", total),
        });

        loop {
            tokio::task::yield_now().await;

            if self.job.is_done() {
                break;
            }
            if self.cancel.is_cancelled() {
                let remaining = total - self.job.index;
                warn!(
                    "Extraction cancelled, {} archive(s) left unprocessed",
                    remaining
                );
                events.emit(PipelineEvent::Started {
                    message: format!(
                        "Extraction cancelled, {} archive(s) left unprocessed",
                        remaining
                    ),
                });
                break;
            }

            self.extract_next(&events).await;
        }

        let outcome = ExtractOutcome {
            destination: self.work_dir,
            relocated: self.job.relocated,
            processed: self.job.index,
            cancelled: self.job.index < total,
        };
        events.emit(PipelineEvent::Finished {
            destination: outcome.destination.clone(),
            paths: outcome.relocated.clone(),
        });
        outcome
    }

    async fn extract_next(&mut self, events: &Emitter<'_>) {
        let index = self.job.index;
        let archive = self.job.archives[index].clone();
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| archive.display().to_string());

        events.emit(PipelineEvent::ItemStarted { name, index });

        match self.process_archive(&archive).await {
            Ok(0) => {
                let warning = ItemError::NoPayload {
                    archive: archive.clone(),
                };
                warn!("{}", warning);
                events.emit(PipelineEvent::Error(warning));
            }
            Ok(moved) => info!("Relocated {} payload file(s) from {:?}", moved, archive),
            Err(e) => {
                warn!("{}", e);
                events.emit(PipelineEvent::Error(e));
            }
        }

        self.job.index += 1;
        events.emit(PipelineEvent::Progress {
            received: self.job.index as u64,
            total: self.job.archives.len() as u64,
        });
        events.emit(PipelineEvent::ItemFinished);
    }

    /// Returns the number of payload files moved into the working directory.
    ///
    /// The whole job runs on the blocking pool. Payloads moved before a
    /// failure are still recorded.
    async fn process_archive(&mut self, archive: &Path) -> Result<usize, ItemError> {
        let archive_owned = archive.to_path_buf();
        let work_dir = self.work_dir.clone();
        let extensions = self.extensions.clone();

        let (moved, result) = tokio::task::spawn_blocking(move || {
            unpack_into(&archive_owned, &work_dir, &extensions)
        })
        .await
        .map_err(|e| ItemError::Extraction {
            archive: archive.to_path_buf(),
            reason: format!("extraction task panicked: {}", e),
        })?;

        let count = moved.len();
        self.job.relocated.extend(moved);
        result.map(|()| count)
    }
}

/// Extracts `archive` into a scratch directory under `work_dir` and moves its
/// payload files up into `work_dir`.
///
/// Returns the relocated paths alongside the outcome.
fn unpack_into(
    archive: &Path,
    work_dir: &Path,
    extensions: &[String],
) -> (Vec<PathBuf>, Result<(), ItemError>) {
    let mut moved = Vec::new();
    let result = unpack_into_inner(archive, work_dir, extensions, &mut moved);
    (moved, result)
}

fn unpack_into_inner(
    archive: &Path,
    work_dir: &Path,
    extensions: &[String],
    moved: &mut Vec<PathBuf>,
) -> Result<(), ItemError> {
    let extraction_error = |reason: String| ItemError::Extraction {
        archive: archive.to_path_buf(),
        reason,
    };

    // Dropping `scratch` removes the directory on every early return.
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(work_dir)
        .map_err(|e| extraction_error(format!("failed to create scratch directory: {}", e)))?;

    match extract_archive(archive, scratch.path()) {
        Ok(count) => debug!("Unpacked {} files from {:?}", count, archive),
        Err(ArchiveError::Corrupt(reason)) => {
            return Err(ItemError::CorruptArchive {
                archive: archive.to_path_buf(),
                reason,
            })
        }
        Err(ArchiveError::Io(e)) => return Err(extraction_error(e.to_string())),
    }

    for payload in find_payload_files(scratch.path(), extensions) {
        let dest = relocate(&payload, work_dir).map_err(|e| {
            extraction_error(format!("failed to move {:?}: {}", payload.file_name(), e))
        })?;
        debug!("Moved {:?} to {:?}", payload, dest);
        moved.push(dest);
    }

    if let Err(e) = scratch.close() {
        debug!("Ignoring failure to remove scratch directory: {}", e);
    }

    Ok(())
}

/// Moves `source` into `dir` under a name no existing file uses.
pub(crate) fn relocate(source: &Path, dir: &Path) -> io::Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name")
    })?;

    let dest = unique_destination(dir, file_name);
    move_file(source, &dest)?;
    Ok(dest)
}

/// `dir/file_name`, or `dir/<stem>_<n>.<ext>` with the smallest `n >= 1` that
/// is not taken.
pub fn unique_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or(file_name).to_string_lossy();
    let ext = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u64;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Falls back to copy+delete when the rename crosses filesystems.
            debug!("rename failed ({}), copying {:?} instead", rename_err, source);
            std::fs::copy(source, dest)?;
            std::fs::remove_file(source)
        }
    }
}

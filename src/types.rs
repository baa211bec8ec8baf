//! Data structures for pipeline runs.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a fetch-and-extract run.
///
/// # Example
///
/// ```
/// use rasterfetch::{ExecutionStage, PipelineConfig};
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     destination_dir: "rasters".into(),
///     payload_extensions: vec![".tif".to_string()],
///     connect_timeout: Duration::from_secs(10),
///     user_agent: "rasterfetch-test".to_string(),
///     stage: ExecutionStage::All,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Working directory: receives fetched archives and relocated payloads.
    pub destination_dir: PathBuf,
    /// File name suffixes selected from each archive, matched case-insensitively
    /// (default: `.tif`, `.tiff`).
    pub payload_extensions: Vec<String>,
    /// Timeout for establishing each connection (default: 30s).
    ///
    /// No overall request timeout is applied; cancel the run to stop a slow
    /// transfer.
    pub connect_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Which stages to run.
    pub stage: ExecutionStage,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            destination_dir: PathBuf::from("rasters"),
            payload_extensions: vec![".tif".to_string(), ".tiff".to_string()],
            connect_timeout: Duration::from_secs(30),
            user_agent: concat!("rasterfetch/", env!("CARGO_PKG_VERSION")).to_string(),
            stage: ExecutionStage::All,
        }
    }
}

/// Stage control for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    /// Fetch, then extract what was fetched
    All,
    /// Only fetch archives
    FetchOnly,
    /// Only extract archives already present in the destination directory
    ExtractOnly,
}

impl ExecutionStage {
    pub(crate) fn should_fetch(self) -> bool {
        matches!(self, ExecutionStage::All | ExecutionStage::FetchOnly)
    }

    pub(crate) fn should_extract(self) -> bool {
        matches!(self, ExecutionStage::All | ExecutionStage::ExtractOnly)
    }
}

/// Runtime state of the fetch stage.
#[derive(Debug)]
pub(crate) struct FetchJob {
    pub locators: Vec<String>,
    /// Index of the next locator to fetch. Only ever increases.
    pub index: usize,
    /// Local paths of successfully written archives, in locator order.
    pub completed: Vec<PathBuf>,
}

impl FetchJob {
    pub fn new(locators: Vec<String>) -> Self {
        Self {
            locators,
            index: 0,
            completed: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.locators.len()
    }
}

/// Runtime state of the extract stage.
#[derive(Debug)]
pub(crate) struct ExtractJob {
    pub archives: Vec<PathBuf>,
    /// Index of the next archive to extract. Only ever increases.
    pub index: usize,
    /// Final destinations of relocated payload files.
    pub relocated: Vec<PathBuf>,
}

impl ExtractJob {
    pub fn new(archives: Vec<PathBuf>) -> Self {
        Self {
            archives,
            index: 0,
            relocated: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.archives.len()
    }
}

/// Terminal snapshot of a pipeline run.
///
/// Compare `requested` with the lengths of `archives` and `payloads` to detect
/// partial failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    /// Working directory the run wrote into.
    pub destination: PathBuf,
    /// Number of locators (or discovered archives) the run started with.
    pub requested: usize,
    /// Archives written by the fetch stage.
    pub archives: Vec<PathBuf>,
    /// Payload files relocated by the extract stage.
    pub payloads: Vec<PathBuf>,
    /// Whether a cancellation request was observed during the run.
    pub cancelled: bool,
}

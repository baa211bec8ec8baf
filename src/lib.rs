//! RasterFetch - sequential raster tile downloader and GeoTIFF extractor
//!
//! This library fetches a list of remote archives one at a time and extracts
//! the raster payloads (`.tif`/`.tiff` by default) they contain into a shared
//! working directory.
//!
//! # Features
//!
//! - **Sequential Fetching**: One transfer at a time, with byte-level progress
//! - **Cancellation**: Aborts the in-flight transfer and stops between items
//! - **Failure Isolation**: A missing or corrupt archive never stops the batch
//! - **Collision-Safe Naming**: Same-named payloads become `name_1.tif`, `name_2.tif`, ...
//! - **Event Stream**: Every stage reports lifecycle, progress and errors to one sink
//!
//! # Example
//!
//! ```no_run
//! use rasterfetch::{Pipeline, PipelineConfig, StageEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let locators = vec![
//!     "http://www.dsr.inpe.br/topodata/data/geotiff/12S45ZN.zip".to_string(),
//!     "http://www.dsr.inpe.br/topodata/data/geotiff/13S45ZN.zip".to_string(),
//! ];
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StageEvent>();
//! let pipeline = Pipeline::new(config, locators)?;
//! let result = pipeline.run(&tx).await;
//! drop(tx);
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! println!("{} of {} archives fetched", result.archives.len(), result.requested);
//! # Ok(())
//! # }
//! ```

mod catalog;
mod download;
mod error;
mod events;
mod extract;
mod fetch;
mod orchestrator;
mod progress;
mod types;
mod unpack;

pub use catalog::{suffix_description, CatalogEntry, LocatorSource, TileCatalog, TOPODATA_BASE_URL};
pub use download::TransferClient;
pub use error::{ItemError, PipelineError};
pub use events::{EventSink, NullSink, PipelineEvent, Stage, StageEvent};
pub use fetch::{file_name_for, FetchOutcome, FetchStage};
pub use orchestrator::{Canceller, Pipeline};
pub use progress::ProgressRenderer;
pub use types::{ExecutionStage, PipelineConfig, PipelineResult};
pub use unpack::{unique_destination, ExtractOutcome, ExtractStage};

/// Re-exported so callers can share a cancellation token with the stages.
pub use tokio_util::sync::CancellationToken;

//! Main orchestration logic: fetch the archives, then extract their payloads.

use crate::download::TransferClient;
use crate::error::{ItemError, PipelineError};
use crate::events::{Emitter, EventSink, PipelineEvent, Stage};
use crate::extract::discover_archives;
use crate::fetch::FetchStage;
use crate::types::{PipelineConfig, PipelineResult};
use crate::unpack::ExtractStage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fetch,
    Extract,
    Done,
}

/// Single cancellation switch for a pipeline run.
///
/// Forwards to whichever stage is active. Cancelling during the fetch stage
/// stops fetching; the archives fetched so far are still extracted. Cancelling
/// during the extract stage stops before the next archive. Calling it again,
/// or after the run finished, has no effect.
#[derive(Debug, Clone)]
pub struct Canceller {
    fetch: CancellationToken,
    extract: CancellationToken,
    phase: Arc<Mutex<Phase>>,
}

impl Canceller {
    fn new(initial_phase: Phase) -> Self {
        Self {
            fetch: CancellationToken::new(),
            extract: CancellationToken::new(),
            phase: Arc::new(Mutex::new(initial_phase)),
        }
    }

    pub fn cancel(&self) {
        let phase = self.lock_phase();
        match *phase {
            Phase::Fetch => {
                info!("Cancelling fetch stage");
                self.fetch.cancel();
            }
            Phase::Extract => {
                info!("Cancelling extract stage after the current archive");
                self.extract.cancel();
            }
            Phase::Done => debug!("Cancel requested after the pipeline finished"),
        }
    }

    /// Whether either stage has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.fetch.is_cancelled() || self.extract.is_cancelled()
    }

    /// Hands cancellation over to the extract stage.
    ///
    /// `fetch_stopped_early` is the fetch stage's own verdict. A cancel that
    /// reached the fetch token after the stage stopped looking at it is moved
    /// over to the extract token.
    fn enter_extract(&self, fetch_stopped_early: bool) {
        let mut phase = self.lock_phase();
        *phase = Phase::Extract;
        if self.fetch.is_cancelled() && !fetch_stopped_early {
            info!("Cancel arrived after fetching finished, cancelling extract stage");
            self.extract.cancel();
        }
    }

    fn finish(&self) {
        *self.lock_phase() = Phase::Done;
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fetch stage followed by extract stage, sharing one working directory.
///
/// # Example
///
/// ```no_run
/// use rasterfetch::{NullSink, Pipeline, PipelineConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let locators = vec!["http://www.dsr.inpe.br/topodata/data/geotiff/12S45ZN.zip".to_string()];
/// let result = Pipeline::new(config, locators)?.run(&NullSink).await;
/// println!("{} rasters in {:?}", result.payloads.len(), result.destination);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    locators: Vec<String>,
    client: TransferClient,
    canceller: Canceller,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, locators: Vec<String>) -> Result<Self, PipelineError> {
        let client = TransferClient::new(&config)?;
        let initial_phase = if config.stage.should_fetch() {
            Phase::Fetch
        } else {
            Phase::Extract
        };

        Ok(Self {
            config,
            locators,
            client,
            canceller: Canceller::new(initial_phase),
        })
    }

    /// Handle for cancelling the run from another task.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Runs the configured stages and returns the terminal snapshot.
    ///
    /// Every stage event is forwarded to `sink`, tagged with its stage.
    /// Per-item failures are reported there and never end the run early.
    pub async fn run(self, sink: &dyn EventSink) -> PipelineResult {
        let Pipeline {
            config,
            locators,
            client,
            canceller,
        } = self;
        let destination = config.destination_dir.clone();

        let mut fetch_stopped_early = false;
        let (requested, archives) = if config.stage.should_fetch() {
            let requested = locators.len();
            let outcome = FetchStage::new(locators, destination.clone(), client)
                .with_cancel_token(canceller.fetch.clone())
                .run(sink)
                .await;
            fetch_stopped_early = outcome.cancelled;
            (requested, outcome.completed)
        } else {
            let archives = match discover_archives(&destination) {
                Ok(found) => found,
                Err(e) => {
                    let error = ItemError::Extraction {
                        archive: destination.clone(),
                        reason: format!("failed to list archives: {}", e),
                    };
                    warn!("{}", error);
                    Emitter::new(Stage::Extract, sink).emit(PipelineEvent::Error(error));
                    Vec::new()
                }
            };
            (archives.len(), archives)
        };

        let payloads = if config.stage.should_extract() {
            canceller.enter_extract(fetch_stopped_early);
            ExtractStage::new(
                archives.clone(),
                destination.clone(),
                config.payload_extensions.clone(),
            )
            .with_cancel_token(canceller.extract.clone())
            .run(sink)
            .await
            .relocated
        } else {
            Vec::new()
        };

        canceller.finish();

        info!(
            "Pipeline finished: {}/{} archives, {} payload files",
            archives.len(),
            requested,
            payloads.len()
        );

        PipelineResult {
            destination,
            requested,
            archives,
            payloads,
            cancelled: canceller.is_cancelled(),
        }
    }
}

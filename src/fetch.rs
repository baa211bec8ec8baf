//! Sequential fetch stage.
//!
//! Locators are fetched strictly one at a time. Each locator is handled on its
//! own scheduling turn: the stage yields to the runtime before looking at the
//! next one, so a cancellation requested between items is always seen before
//! another transfer starts.

use crate::download::TransferClient;
use crate::error::{ItemError, TransferError};
use crate::events::{Emitter, EventSink, PipelineEvent, Stage};
use crate::types::FetchJob;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the fetch stage handed over when it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub destination: PathBuf,
    /// Written archive paths, in locator order.
    pub completed: Vec<PathBuf>,
    /// Whether the run stopped early because of cancellation.
    pub cancelled: bool,
}

/// Drives a [`TransferClient`] over an ordered list of locators.
pub struct FetchStage {
    job: FetchJob,
    destination: PathBuf,
    client: TransferClient,
    cancel: CancellationToken,
}

impl FetchStage {
    pub fn new(
        locators: Vec<String>,
        destination: impl Into<PathBuf>,
        client: TransferClient,
    ) -> Self {
        Self {
            job: FetchJob::new(locators),
            destination: destination.into(),
            client,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` as the stage's cancellation flag.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels this stage when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Aborts the in-flight transfer, if any, and stops before the next locator.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs every locator to completion (or until cancelled) and emits the
    /// terminal `Finished` event exactly once.
    pub async fn run(mut self, sink: &dyn EventSink) -> FetchOutcome {
        let events = Emitter::new(Stage::Fetch, sink);
        let total = self.job.locators.len();

        info!("Starting download of {} files into {:?}", total, self.destination);
        events.emit(PipelineEvent::Started {
            message: format!("Starting download of {} files...", total),
        });

        loop {
            tokio::task::yield_now().await;

            if self.cancel.is_cancelled() {
                info!(
                    "Download cancelled after {} of {} files",
                    self.job.index, total
                );
                break;
            }
            if self.job.is_done() {
                break;
            }

            self.fetch_next(&events).await;
        }

        let outcome = FetchOutcome {
            destination: self.destination,
            completed: self.job.completed,
            cancelled: self.cancel.is_cancelled(),
        };
        events.emit(PipelineEvent::Finished {
            destination: outcome.destination.clone(),
            paths: outcome.completed.clone(),
        });
        outcome
    }

    async fn fetch_next(&mut self, events: &Emitter<'_>) {
        let index = self.job.index;
        let locator = self.job.locators[index].clone();
        let name = file_name_for(&locator);

        events.emit(PipelineEvent::ItemStarted {
            name: name.clone().unwrap_or_else(|| locator.clone()),
            index,
        });

        match self.fetch_one(&locator, name, events).await {
            Ok(Some(path)) => {
                info!("Saved {} to {:?}", locator, path);
                self.job.completed.push(path);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}", e);
                events.emit(PipelineEvent::Error(e));
            }
        }

        events.emit(PipelineEvent::ItemFinished);
        self.job.index += 1;
    }

    /// `Ok(None)` means the transfer was aborted by cancellation.
    async fn fetch_one(
        &self,
        locator: &str,
        name: Option<String>,
        events: &Emitter<'_>,
    ) -> Result<Option<PathBuf>, ItemError> {
        let Some(name) = name else {
            return Err(ItemError::Write {
                locator: locator.to_string(),
                path: self.destination.clone(),
                reason: "locator has no file name".to_string(),
            });
        };

        let path = self.destination.join(name);
        let transfer = self
            .client
            .fetch(locator, &path, &self.cancel, |received, total| {
                events.emit(PipelineEvent::Progress { received, total })
            })
            .await;

        match transfer {
            Ok(bytes) => {
                debug!("Wrote {} bytes for {}", bytes, locator);
                Ok(Some(path))
            }
            Err(TransferError::Cancelled) => {
                info!("Download of {} aborted", locator);
                Ok(None)
            }
            Err(TransferError::Write(e)) => Err(ItemError::Write {
                locator: locator.to_string(),
                path,
                reason: e.to_string(),
            }),
            Err(e @ TransferError::Http(_)) => Err(ItemError::Transport {
                locator: locator.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Local file name for a locator: the last segment of its URL path.
///
/// Returns `None` when the path ends in `/` or the segment is `.`/`..`.
pub fn file_name_for(locator: &str) -> Option<String> {
    let path = match reqwest::Url::parse(locator) {
        Ok(url) => url.path().to_string(),
        Err(_) => locator.split(['?', '#']).next().unwrap_or("").to_string(),
    };

    path.rsplit('/')
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
}

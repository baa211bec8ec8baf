//! Single-resource HTTP transfers.

use crate::error::{PipelineError, TransferError};
use crate::types::PipelineConfig;
use futures_util::StreamExt;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Prefix of the partial files a transfer writes before it is complete.
const PARTIAL_PREFIX: &str = ".download-";

/// Performs one GET per call, streaming the body to disk.
#[derive(Debug, Clone)]
pub struct TransferClient {
    client: reqwest::Client,
}

impl TransferClient {
    /// Builds a client from the pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Downloads `url` into `dest` and returns the number of bytes written.
    ///
    /// The body is streamed into a partial file next to `dest`, which is
    /// renamed to `dest` only once the whole body has arrived; on any failure
    /// or cancellation the partial file is removed and `dest` is untouched.
    ///
    /// `on_progress(received, total)` is called after every chunk, but only
    /// when the server announced a positive `Content-Length`. Cancelling
    /// `cancel` drops the in-flight request immediately and yields
    /// [`TransferError::Cancelled`].
    pub(crate) async fn fetch<F>(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<u64, TransferError>
    where
        F: FnMut(u64, u64),
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Aborting transfer of {}", url);
                Err(TransferError::Cancelled)
            }
            written = self.stream_to_file(url, dest, on_progress) => written,
        }
    }

    async fn stream_to_file<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<u64, TransferError>
    where
        F: FnMut(u64, u64),
    {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(TransferError::Write)?;

        // Dropping `partial_path` deletes the file on every early return.
        let (file, partial_path) = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(dir)
            .map_err(TransferError::Write)?
            .into_parts();
        let mut writer = BufWriter::new(tokio::fs::File::from_std(file));

        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length().unwrap_or(0);

        let mut received = 0u64;
        let mut byte_stream = response.bytes_stream();

        while let Some(piece) = byte_stream.next().await {
            let chunk = piece?;
            writer
                .write_all(&chunk)
                .await
                .map_err(TransferError::Write)?;
            received += chunk.len() as u64;

            if total > 0 {
                on_progress(received, total);
            }
        }

        writer.flush().await.map_err(TransferError::Write)?;
        drop(writer);

        partial_path
            .persist(dest)
            .map_err(|e| TransferError::Write(e.error))?;
        debug!("Wrote {} bytes to {:?}", received, dest);

        Ok(received)
    }
}

//! Fetch command handler.

use anyhow::{Result, bail};
use indicatif::ProgressBar;

use batchdl_core::{BatchError, DownloadRequest};
use batchdl_download::{BatchHandle, ProgressEvent};

use crate::bootstrap::CliContext;
use crate::presentation::{bar_position, batch_bar, status_label};

/// Submit `requests` as one batch and follow it to the end.
///
/// Ctrl-C cancels the batch. Batches left over from earlier runs resume
/// alongside it but are not waited for.
pub async fn execute(ctx: &CliContext, requests: Vec<DownloadRequest>) -> Result<()> {
    let bar = batch_bar()?;
    let engine = ctx.start_engine()?;
    let batch = engine.submit(requests).await?;
    let outcome = follow(&batch, &bar).await;
    engine.shutdown().await?;

    match outcome {
        Ok(()) => {
            for download in batch.downloads() {
                println!("✓ {}", download.request().destination.display());
            }
            Ok(())
        }
        Err(err) => {
            for download in batch.downloads() {
                let request = download.request();
                println!("  {:<12} {}", status_label(&download.status()), request.url);
            }
            if err.is_cancelled() {
                bail!("Batch {} cancelled", batch.id());
            }
            bail!("Batch {} failed: {err}", batch.id())
        }
    }
}

async fn follow(batch: &BatchHandle, bar: &ProgressBar) -> Result<(), BatchError> {
    bar.set_message(format!("batch {} ({} files)", batch.id(), batch.requests().len()));

    let mut events = batch.progress().subscribe();
    let outcome = loop {
        tokio::select! {
            event = events.next() => match event {
                Some(ProgressEvent::Progress(snapshot)) => bar.set_position(bar_position(snapshot)),
                Some(ProgressEvent::Finished(outcome)) => break outcome,
                None => break Err(BatchError::Stopped),
            },
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    tracing::debug!(batch_id = %batch.id(), "Interrupted; cancelling batch");
                    bar.set_message("cancelling");
                    batch.cancel().await;
                }
            }
        }
    };

    match &outcome {
        Ok(()) => bar.finish_with_message("done"),
        Err(err) => bar.abandon_with_message(err.to_string()),
    }
    outcome
}

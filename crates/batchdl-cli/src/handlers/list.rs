//! List command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{print_separator, status_label, truncate_string};

/// Print every batch in the store with its downloads.
///
/// Reads the store directly; listing does not resume anything.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let batches = ctx.persistence().retrieve_all().await?;

    if batches.is_empty() {
        println!("No batches in the store.");
        println!("Use 'batchdl fetch URL=DEST...' to start one.");
        return Ok(());
    }

    println!("Found {} batch(es):\n", batches.len());
    println!("{:<6} {:<6} {:<14} {:<40} Destination", "Batch", "Row", "Status", "URL");
    print_separator(100);

    for batch in batches {
        for download in &batch.downloads {
            println!(
                "{:<6} {:<6} {:<14} {:<40} {}",
                batch.id,
                download.id,
                truncate_string(&status_label(&download.status), 13),
                truncate_string(&download.request.url, 39),
                download.request.destination.display()
            );
        }
    }

    Ok(())
}

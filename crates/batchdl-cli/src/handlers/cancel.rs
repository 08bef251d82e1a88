//! Cancel-all command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;

/// Cancel every ongoing batch and remove it from the store.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let engine = ctx.start_engine()?;
    let ongoing = engine.get_ongoing().await?;

    if ongoing.is_empty() {
        println!("Nothing to cancel.");
    } else {
        engine.cancel(&ongoing).await?;
        println!("Cancelled {} batch(es).", ongoing.len());
    }

    engine.shutdown().await?;
    Ok(())
}

//! Terminal formatting helpers.

use indicatif::{ProgressBar, ProgressStyle};

use batchdl_core::DownloadStatus;
use batchdl_download::ProgressSnapshot;

/// Steps on a batch progress bar.
pub const BAR_LENGTH: u64 = 1000;

/// Truncates a string to a maximum length, adding "..." if needed.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Print a horizontal separator line.
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Short status label for tables.
pub fn status_label(status: &DownloadStatus) -> String {
    match status {
        DownloadStatus::Failed { error } => format!("failed: {}", error.user_message()),
        other => other.as_str().to_string(),
    }
}

/// Bar position for a batch snapshot.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn bar_position(snapshot: ProgressSnapshot) -> u64 {
    snapshot
        .fraction()
        .map_or(0, |f| (f.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64)
}

/// Progress bar for one batch.
pub fn batch_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(BAR_LENGTH);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("█▓░"),
    );
    Ok(pb)
}

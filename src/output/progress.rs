//! Progress bars for batch inference and imagery downloads.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create a progress bar over a batch of images.
pub fn create_image_progress(total_images: usize, enabled: bool) -> Option<ProgressBar> {
    counted_bar(
        total_images,
        enabled,
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} images ({eta}) {msg}",
    )
}

/// Create a progress bar over image downloads.
pub fn create_download_progress(total_images: usize, enabled: bool) -> Option<ProgressBar> {
    counted_bar(
        total_images,
        enabled,
        "[{elapsed_precise}] {bar:40.green/white} {pos}/{len} downloads ({eta})",
    )
}

/// Create a spinner for open-ended work such as paging through search results.
pub fn create_spinner(message: &str, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn counted_bar(total: usize, enabled: bool, template: &str) -> Option<ProgressBar> {
    if !enabled || total == 0 {
        return None;
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(PROGRESS_CHARS),
    );
    Some(pb)
}

/// Finish a progress bar with a message.
pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

/// Increment a progress bar.
pub fn inc_progress(pb: Option<&ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}

/// Update the trailing message of a progress bar.
pub fn set_progress_message(pb: Option<&ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.set_message(message.to_string());
    }
}

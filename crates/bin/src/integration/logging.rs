//! Tracing subscriber and progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use indicatif::style::TemplateError;
use tracing_subscriber::{EnvFilter, fmt};

/// Log to stderr, filtered by `RUST_LOG` (default `tidyfin=info`).
///
/// Set `TIDYFIN_LOG_JSON` for one JSON object per event.
pub(crate) fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tidyfin=info"));

    if std::env::var_os("TIDYFIN_LOG_JSON").is_some() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Progress bar for a batch of `len` requests.
pub(crate) fn progress_bar(len: u64) -> Result<ProgressBar, TemplateError> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    Ok(pb)
}

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/tidyfin/tidyfin/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod dates;
pub mod error;
pub mod frame;
pub mod panel;
pub mod sources;
pub mod store;

pub use error::{DataError, Result};
pub use panel::{Exchange, FirmYear, Industry, StockDay, StockMonth};
pub use store::{Database, DatabaseStats};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/tidyfin/tidyfin/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod beta;
pub mod characteristics;
pub mod error;
pub mod registry;
pub mod replication;
pub mod sorts;
pub mod standardize;

pub use beta::{BetaConfig, BetaEstimate, BetaObservation, BetaRow, estimate_betas};
pub use characteristics::{Characteristic, CharacteristicValue, LogMarketCap};
pub use error::{FactorError, Result};
pub use registry::{
    CharacteristicCategory, CharacteristicInfo, available_characteristics,
    characteristics_by_category, get_characteristic_info,
};
pub use sorts::{PortfolioReturn, SortConfig, Weighting};

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

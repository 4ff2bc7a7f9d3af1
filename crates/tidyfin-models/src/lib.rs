#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/tidyfin/tidyfin/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod capm;
pub mod did;
pub mod error;
pub mod fama_macbeth;
pub mod linalg;
pub mod newey_west;
pub mod ols;
pub mod options;
pub mod panel;
pub mod penalized;
pub mod portfolio_choice;

pub use capm::{CapmEstimate, estimate_capm};
pub use did::{DidEstimate, DidObservation, EventCoefficient, EventStudyConfig, estimate_did, event_study};
pub use error::{ModelError, Result};
pub use fama_macbeth::{CrossSectionObservation, FamaMacBethConfig, FamaMacBethResult, RiskPremium, fama_macbeth};
pub use ols::{Clusters, CovarianceType, OlsFit, ols};
pub use options::{OptionContract, OptionPricer, SimulationGrid, black_scholes_call, simulate_options};
pub use panel::{ClusterBy, FixedEffects, PanelConfig, PanelFit, PanelObservation, estimate_panel};
pub use penalized::{CvResult, ElasticNet, ElasticNetConfig, cross_validate, lambda_max, lambda_path};
pub use portfolio_choice::{
    CrossSection, PolicyEvaluation, ThetaOptimization, compute_portfolio_weights, efficient_weights,
    minimum_variance_weights, optimize_theta,
};

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

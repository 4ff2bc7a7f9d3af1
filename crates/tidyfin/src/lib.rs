#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/tidyfin/tidyfin/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod workflow;

// Re-export main types from sub-crates
pub use tidyfin_data as data;
pub use tidyfin_factors as factors;
pub use tidyfin_models as models;
pub use tidyfin_output as output;

pub use config::{ConfigError, SamplePeriod, Settings};
pub use error::{Error, Result};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

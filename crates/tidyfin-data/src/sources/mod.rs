//! External data sources.
//!
//! Public sources are downloaded over HTTP; WRDS datasets are read from
//! CSV extracts.

pub mod extracts;
pub mod french;
pub mod fred;
pub mod macro_predictors;
pub mod yahoo;

pub use extracts::{CcmLinkRecord, CompustatRecord, CrspDailyRecord, CrspMonthlyRecord};
pub use french::{FactorRow, FrenchDataset, FrenchLibrary, FrenchTable};
pub use fred::{CpiRow, FredClient, FredObservation};
pub use macro_predictors::MacroPredictors;
pub use yahoo::YahooQuoteProvider;

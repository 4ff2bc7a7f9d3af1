//! Settings read from `tidyfin.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. The `TIDYFIN_DATABASE` environment variable takes
//! precedence over the configured database path.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tidyfin_factors::{BetaConfig, SortConfig, Weighting};
use tidyfin_models::{FamaMacBethConfig, SimulationGrid};

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tidyfin.toml";

/// Environment variable overriding the database path.
pub const DATABASE_ENV: &str = "TIDYFIN_DATABASE";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Cannot read {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Settings`]
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid setting: {0}")]
    Invalid(String),

    /// No platform data directory and no explicit database path
    #[error("No data directory found; set {DATABASE_ENV} or `database` in {DEFAULT_CONFIG_FILE}")]
    NoDataDirectory,
}

/// First and last month of the research sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplePeriod {
    /// First day of the sample
    pub start: NaiveDate,
    /// Last day of the sample
    pub end: NaiveDate,
}

impl Default for SamplePeriod {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(1960, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
        }
    }
}

impl SamplePeriod {
    /// Whether `date` falls inside the sample, both ends included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Rolling beta windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaSettings {
    /// Window for monthly returns
    pub monthly: BetaConfig,
    /// Window for daily returns
    pub daily: BetaConfig,
}

impl Default for BetaSettings {
    fn default() -> Self {
        Self {
            monthly: BetaConfig::monthly(),
            daily: BetaConfig::daily(),
        }
    }
}

/// Portfolio sort settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSettings {
    /// Number of portfolios
    pub n_portfolios: usize,
    /// Member weighting
    pub weighting: Weighting,
    /// Breakpoints from NYSE stocks only
    pub nyse_breakpoints: bool,
    /// Newey-West lags for the CAPM alphas of the portfolios
    pub nw_lags: usize,
}

impl Default for SortSettings {
    fn default() -> Self {
        Self {
            n_portfolios: 10,
            weighting: Weighting::Value,
            nyse_breakpoints: false,
            nw_lags: 6,
        }
    }
}

impl SortSettings {
    /// Configuration of the univariate sort.
    pub const fn sort_config(&self) -> SortConfig {
        SortConfig {
            n_portfolios: self.n_portfolios,
            weighting: self.weighting,
            nyse_breakpoints: self.nyse_breakpoints,
        }
    }
}

/// Fama-MacBeth settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamaMacBethSettings {
    /// Minimum stocks per cross-section
    pub min_obs: Option<usize>,
    /// Newey-West lags for the averaged slopes
    pub nw_lags: usize,
}

impl Default for FamaMacBethSettings {
    fn default() -> Self {
        Self {
            min_obs: None,
            nw_lags: 6,
        }
    }
}

impl FamaMacBethSettings {
    /// Estimator configuration.
    pub const fn config(&self) -> FamaMacBethConfig {
        FamaMacBethConfig {
            min_obs: self.min_obs,
            nw_lags: self.nw_lags,
        }
    }
}

/// Elastic-net selection of industry return drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorSelectionSettings {
    /// Mixing weights tried by cross validation (0 = ridge, 1 = lasso)
    pub alphas: Vec<f64>,
    /// Penalties on the log-spaced path
    pub n_lambdas: usize,
    /// Smallest penalty as a share of the largest
    pub min_lambda_ratio: f64,
    /// Contiguous cross-validation folds
    pub folds: usize,
}

impl Default for FactorSelectionSettings {
    fn default() -> Self {
        Self {
            alphas: vec![0.0, 0.5, 1.0],
            n_lambdas: 20,
            min_lambda_ratio: 1e-3,
            folds: 5,
        }
    }
}

/// Machine-learning option pricing on simulated contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionPricingSettings {
    /// Contract terms to price
    pub grid: SimulationGrid,
    /// Standard deviation of the noise added to Black-Scholes prices
    pub noise_sd: f64,
    /// Share of contracts held out for testing
    pub test_share: f64,
    /// Degree of the polynomial features
    pub degree: usize,
    /// Elastic-net mixing weight
    pub alpha: f64,
    /// Elastic-net penalty
    pub lambda: f64,
    /// Seed of the noise and the split
    pub seed: u64,
}

impl Default for OptionPricingSettings {
    /// A coarse version of the full simulation grid.
    fn default() -> Self {
        let grid = SimulationGrid {
            spot: vec![40.0, 45.0, 50.0, 55.0, 60.0],
            strike: (4..=18).map(|k| 5.0 * f64::from(k)).collect(),
            rate: vec![0.0, 0.025, 0.05],
            maturity: (1..=8).map(|q| f64::from(q) / 4.0).collect(),
            volatility: (1..=8).map(|v| f64::from(v) / 10.0).collect(),
        };
        Self {
            grid,
            noise_sd: 0.15,
            test_share: 0.2,
            degree: 3,
            alpha: 1.0,
            lambda: 0.01,
            seed: 2023,
        }
    }
}

/// Mean-variance and parametric portfolio choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioChoiceSettings {
    /// Efficient portfolio target as a multiple of the highest mean return
    pub target_multiple: f64,
    /// Relative risk aversion of the parametric policy
    pub gamma: f64,
    /// Allow negative policy weights
    pub allow_short_selling: bool,
    /// Months with fewer stocks are skipped by the parametric policy
    pub min_stocks: usize,
}

impl Default for PortfolioChoiceSettings {
    fn default() -> Self {
        Self {
            target_multiple: 3.0,
            gamma: 5.0,
            allow_short_selling: true,
            min_stocks: 10,
        }
    }
}

/// Price download settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Ticker symbols fetched by `download prices`
    pub symbols: Vec<String>,
    /// Concurrent requests
    pub concurrency: usize,
    /// Delay between requests in milliseconds
    pub rate_limit_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            symbols: [
                "AAPL", "AMGN", "AXP", "BA", "CAT", "CSCO", "CVX", "DIS", "GS", "HD", "HON", "IBM",
                "JNJ", "JPM", "KO", "MCD", "MMM", "MRK", "MSFT", "NKE", "PG", "TRV", "UNH", "V",
                "VZ", "WMT",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            concurrency: 10,
            rate_limit_ms: 100,
        }
    }
}

/// All settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database file; defaults to the platform data directory
    pub database: Option<PathBuf>,
    /// Research sample
    pub sample: SamplePeriod,
    /// Rolling beta windows
    pub betas: BetaSettings,
    /// Portfolio sorts
    pub sorts: SortSettings,
    /// Fama-MacBeth regressions
    pub fama_macbeth: FamaMacBethSettings,
    /// Penalized factor selection
    pub factor_selection: FactorSelectionSettings,
    /// Option pricing
    pub option_pricing: OptionPricingSettings,
    /// Portfolio choice
    pub portfolio_choice: PortfolioChoiceSettings,
    /// Price downloads
    pub download: DownloadSettings,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Settings from `explicit`, else from `tidyfin.toml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(Path::new(DEFAULT_CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sample.start > self.sample.end {
            return Err(ConfigError::Invalid(format!(
                "sample start {} is after end {}",
                self.sample.start, self.sample.end
            )));
        }
        if self.sorts.n_portfolios < 2 {
            return Err(ConfigError::Invalid("sorts.n_portfolios must be at least 2".into()));
        }
        let selection = &self.factor_selection;
        if selection.alphas.is_empty() || selection.alphas.iter().any(|a| !(0.0..=1.0).contains(a)) {
            return Err(ConfigError::Invalid(
                "factor_selection.alphas must be non-empty and lie in [0, 1]".into(),
            ));
        }
        if selection.n_lambdas == 0 || selection.folds < 2 {
            return Err(ConfigError::Invalid(
                "factor_selection needs n_lambdas >= 1 and folds >= 2".into(),
            ));
        }
        if !(selection.min_lambda_ratio > 0.0 && selection.min_lambda_ratio <= 1.0) {
            return Err(ConfigError::Invalid("factor_selection.min_lambda_ratio must lie in (0, 1]".into()));
        }
        let options = &self.option_pricing;
        if options.grid.is_empty() || options.degree == 0 || !(options.test_share > 0.0 && options.test_share < 1.0) {
            return Err(ConfigError::Invalid(
                "option_pricing needs a non-empty grid, degree >= 1 and test_share in (0, 1)".into(),
            ));
        }
        if self.portfolio_choice.gamma <= 0.0 || self.portfolio_choice.min_stocks == 0 {
            return Err(ConfigError::Invalid(
                "portfolio_choice needs gamma > 0 and min_stocks >= 1".into(),
            ));
        }
        if self.download.concurrency == 0 {
            return Err(ConfigError::Invalid("download.concurrency must be positive".into()));
        }
        Ok(())
    }

    /// Database path: `TIDYFIN_DATABASE`, then `database`, then the data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        self.resolve_database_path(std::env::var_os(DATABASE_ENV).map(PathBuf::from))
    }

    fn resolve_database_path(&self, from_env: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(path);
        }
        if let Some(path) = &self.database {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("tidyfin").join("tidy_finance.sqlite"))
            .ok_or(ConfigError::NoDataDirectory)
    }
}

//! Downloads from public providers into the research database.
//!
//! French library files, FRED series and the Welch-Goyal predictors are one
//! request each. Prices are fetched concurrently per symbol, skipping
//! symbols whose quotes are already stored unless a refresh is forced.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use polars::prelude::*;
use std::time::Duration;
use tidyfin::SamplePeriod;
use tidyfin::data::Database;
use tidyfin::data::sources::french::{FactorRow, FrenchDataset, FrenchLibrary};
use tidyfin::data::sources::fred::{CPI_SERIES, FredClient, cpi_index};
use tidyfin::data::sources::macro_predictors::{compute_predictors, fetch_predictors};
use tidyfin::data::sources::yahoo::YahooQuoteProvider;
use tidyfin::data::store::tables::INDUSTRIES_FF_MONTHLY;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Error type for downloads.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DownloadError {
    /// Provider or storage error.
    #[error(transparent)]
    Data(#[from] tidyfin::data::DataError),
    /// Polars DataFrame error.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    /// Every price request failed.
    #[error("No quotes fetched for any of {0} symbols")]
    NoQuotes(usize),
}

type Result<T> = std::result::Result<T, DownloadError>;

fn to_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Fetch a factor file and replace `table` with the rows in the sample.
pub(crate) async fn download_factors(
    db: &Database,
    dataset: FrenchDataset,
    table: &str,
    sample: &SamplePeriod,
) -> Result<usize> {
    let data = FrenchLibrary::new()
        .fetch(&dataset)
        .await?
        .filter_dates(sample.start, sample.end);
    let rows = FactorRow::from_table(&data)?;
    let written = db.save_factors(table, &rows)?;
    info!(table, rows = written, "stored factors");
    Ok(written)
}

/// Fetch the ten monthly industry portfolios.
pub(crate) async fn download_industries(db: &Database, sample: &SamplePeriod) -> Result<usize> {
    let data = FrenchLibrary::new()
        .fetch(&FrenchDataset::Industries10Monthly)
        .await?
        .filter_dates(sample.start, sample.end);
    let written = db.save_industries(&data)?;
    info!(table = INDUSTRIES_FF_MONTHLY, rows = written, "stored industry portfolios");
    Ok(written)
}

/// Fetch and derive the Welch-Goyal predictors.
pub(crate) async fn download_macro_predictors(db: &Database, sample: &SamplePeriod) -> Result<usize> {
    let client = reqwest::Client::new();
    let raw = fetch_predictors(&client).await?;
    let rows = compute_predictors(&raw, sample.start, sample.end);
    Ok(db.save_macro_predictors(&rows)?)
}

/// Fetch CPI from FRED, rescaled to the last month of the sample.
pub(crate) async fn download_cpi(db: &Database, sample: &SamplePeriod) -> Result<usize> {
    let observations = FredClient::new().fetch_series(CPI_SERIES).await?;
    Ok(db.save_cpi(&cpi_index(&observations, sample.start, sample.end))?)
}

/// Outcome of a price download.
#[derive(Debug, Default)]
pub(crate) struct PriceSummary {
    /// Symbols fetched from Yahoo
    pub fetched: usize,
    /// Symbols already stored
    pub cached: usize,
    /// Symbols whose request failed
    pub failed: Vec<String>,
    /// Quote rows written
    pub rows: usize,
}

/// Settings of a price download.
#[derive(Debug, Clone)]
pub(crate) struct PriceRequest {
    /// Ticker symbols
    pub symbols: Vec<String>,
    /// Concurrent requests
    pub concurrency: usize,
    /// Delay between requests
    pub rate_limit: Duration,
    /// Ignore stored quotes
    pub refresh: bool,
}

/// Fetch daily quotes for every symbol into the `quotes` table.
pub(crate) async fn download_prices(
    db: &Database,
    request: PriceRequest,
    sample: &SamplePeriod,
    progress: &ProgressBar,
) -> Result<PriceSummary> {
    let mut summary = PriceSummary::default();
    let mut to_fetch = Vec::with_capacity(request.symbols.len());
    for symbol in request.symbols {
        if !request.refresh && db.has_quotes(&symbol, sample.start, sample.end)? {
            summary.cached += 1;
        } else {
            to_fetch.push(symbol);
        }
    }
    progress.set_length(to_fetch.len() as u64);
    if to_fetch.is_empty() {
        return Ok(summary);
    }

    let provider = YahooQuoteProvider::with_rate_limit(request.rate_limit)?;
    let (start, end) = (to_utc(sample.start), to_utc(sample.end));
    let requested = to_fetch.len();
    let frames: Mutex<Vec<DataFrame>> = Mutex::new(Vec::with_capacity(requested));
    let failed: Mutex<Vec<String>> = Mutex::new(Vec::new());

    stream::iter(to_fetch)
        .map(|symbol| {
            let provider = &provider;
            async move {
                match provider.fetch_quotes(&symbol, start, end).await {
                    Ok(df) => Ok(df),
                    Err(e) => Err((symbol, e)),
                }
            }
        })
        .buffer_unordered(request.concurrency)
        .for_each(|result| {
            let (frames, failed) = (&frames, &failed);
            async move {
                match result {
                    Ok(df) => frames.lock().await.push(df),
                    Err((symbol, e)) => {
                        progress.suspend(|| warn!(%symbol, error = %e, "failed to fetch quotes"));
                        failed.lock().await.push(symbol);
                    }
                }
                progress.inc(1);
            }
        })
        .await;

    let frames = frames.into_inner();
    summary.failed = failed.into_inner();
    if frames.is_empty() {
        return Err(DownloadError::NoQuotes(requested));
    }
    summary.fetched = frames.len();
    for df in &frames {
        summary.rows += db.put_quotes(df)?;
    }
    Ok(summary)
}

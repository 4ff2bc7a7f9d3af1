//! Daily prices from Yahoo Finance.

use crate::error::{DataError, Result};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use yahoo_finance_api as yahoo;

/// Yahoo Finance quote provider with rate limiting.
pub struct YahooQuoteProvider {
    provider: yahoo::YahooConnector,
    rate_limit_delay: Duration,
}

impl std::fmt::Debug for YahooQuoteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooQuoteProvider")
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish_non_exhaustive()
    }
}

impl YahooQuoteProvider {
    /// Create a provider that waits one second between requests.
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(Duration::from_millis(1000))
    }

    /// Create a provider with a custom delay between requests.
    pub fn with_rate_limit(rate_limit_delay: Duration) -> Result<Self> {
        Ok(Self {
            provider: yahoo::YahooConnector::new()?,
            rate_limit_delay,
        })
    }

    /// Fetch daily prices for one symbol.
    ///
    /// # Returns
    /// A frame with columns: symbol, date, open, high, low, close, volume, adjusted_close
    pub async fn fetch_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DataFrame> {
        if start > end {
            return Err(DataError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        if symbol.is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        let start_time = time::OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| DataError::TimeConversion(e.to_string()))?;
        let end_time = time::OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| DataError::TimeConversion(e.to_string()))?;

        let response = self
            .provider
            .get_quote_history(symbol, start_time, end_time)
            .await?;
        let quotes = response
            .quotes()
            .map_err(|e| DataError::YahooApi(e.to_string()))?;

        if quotes.is_empty() {
            return Err(DataError::MissingData {
                dataset: symbol.to_string(),
                reason: "No data returned from Yahoo Finance".to_string(),
            });
        }

        let df = DataFrame::new(vec![
            Series::new("symbol".into(), vec![symbol; quotes.len()]).into(),
            Series::new(
                "timestamp".into(),
                quotes.iter().map(|q| q.timestamp).collect::<Vec<i64>>(),
            )
            .into(),
            Series::new("open".into(), quotes.iter().map(|q| q.open).collect::<Vec<_>>()).into(),
            Series::new("high".into(), quotes.iter().map(|q| q.high).collect::<Vec<_>>()).into(),
            Series::new("low".into(), quotes.iter().map(|q| q.low).collect::<Vec<_>>()).into(),
            Series::new("close".into(), quotes.iter().map(|q| q.close).collect::<Vec<_>>())
                .into(),
            Series::new("volume".into(), quotes.iter().map(|q| q.volume).collect::<Vec<_>>())
                .into(),
            Series::new(
                "adjusted_close".into(),
                quotes.iter().map(|q| q.adjclose).collect::<Vec<_>>(),
            )
            .into(),
        ])?;

        let df = df
            .lazy()
            .with_column(
                (col("timestamp") * lit(1_000_000_000))
                    .cast(DataType::Datetime(TimeUnit::Nanoseconds, None))
                    .cast(DataType::Date)
                    .alias("date"),
            )
            .select([
                col("symbol"),
                col("date"),
                col("open"),
                col("high"),
                col("low"),
                col("close"),
                col("volume"),
                col("adjusted_close"),
            ])
            .collect()?;

        sleep(self.rate_limit_delay).await;

        Ok(df)
    }

    /// Fetch several symbols one after another, skipping failures.
    pub async fn fetch_quotes_batch(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DataFrame> {
        let mut frames = Vec::new();
        for symbol in symbols {
            match self.fetch_quotes(symbol, start, end).await {
                Ok(df) => frames.push(df.lazy()),
                Err(e) => warn!(%symbol, error = %e, "failed to fetch quotes"),
            }
        }

        if frames.is_empty() {
            return Err(DataError::MissingData {
                dataset: "batch".to_string(),
                reason: "No data fetched for any symbol".to_string(),
            });
        }

        Ok(concat(frames, UnionArgs::default())?.collect()?)
    }
}

/// Daily simple returns from adjusted close prices, per symbol.
///
/// Returns a frame with columns: symbol, date, ret. The first observation
/// of each symbol has no return and is dropped.
pub fn daily_returns(quotes: &DataFrame) -> Result<DataFrame> {
    Ok(quotes
        .clone()
        .lazy()
        .sort(["symbol", "date"], SortMultipleOptions::default())
        .with_column(
            (col("adjusted_close") / col("adjusted_close").shift(lit(1)).over([col("symbol")])
                - lit(1.0))
            .alias("ret"),
        )
        .filter(col("ret").is_not_null())
        .select([col("symbol"), col("date"), col("ret")])
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{date_column, f64_values, str_values};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    #[test]
    fn test_daily_returns_per_symbol() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d);
        let quotes = DataFrame::new(vec![
            Series::new("symbol".into(), vec!["MSFT", "AAPL", "AAPL", "MSFT", "AAPL"]).into(),
            date_column("date", &[day(2), day(3), day(2), day(3), day(4)]).unwrap(),
            Series::new("adjusted_close".into(), vec![100.0, 110.0, 100.0, 90.0, 99.0]).into(),
        ])
        .unwrap();

        let returns = daily_returns(&quotes).unwrap();
        assert_eq!(returns.height(), 3);
        let symbols = str_values(&returns, "symbol").unwrap();
        let rets = f64_values(&returns, "ret").unwrap();
        assert_eq!(symbols[0].as_deref(), Some("AAPL"));
        assert_relative_eq!(rets[0].unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(rets[1].unwrap(), -0.10, epsilon = 1e-12);
        assert_relative_eq!(rets[2].unwrap(), -0.10, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn test_invalid_date_range() {
        let provider = YahooQuoteProvider::new().unwrap();
        let start = Utc::now();
        let end = start - chrono::Duration::days(30);
        let result = provider.fetch_quotes("AAPL", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_invalid_symbol() {
        let provider = YahooQuoteProvider::new().unwrap();
        let end = Utc::now();
        let start = end - chrono::Duration::days(30);
        let result = provider.fetch_quotes("", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidSymbol(_))));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_quotes() {
        let provider = YahooQuoteProvider::new().unwrap();
        let end = Utc::now();
        let start = end - chrono::Duration::days(30);
        let df = provider.fetch_quotes("AAPL", start, end).await.unwrap();
        assert!(df.height() > 0);
    }
}

//! Point-in-time stock panels built from WRDS extracts.
//!
//! The builders turn raw extract rows into the cleaned panels every analysis
//! reads: monthly and daily excess returns for CRSP stocks, and annual
//! accounting characteristics for Compustat firms. Nothing here looks ahead:
//! lagged market capitalisation comes from the previous calendar month and
//! investment from the previous fiscal year.

use crate::dates::{add_months, floor_month, parse_date};
use crate::error::Result;
use crate::frame::{date_column, f64_values, i64_values, required_dates, required_i64, str_values};
use crate::sources::extracts::{CcmLinkRecord, CompustatRecord, CrspDailyRecord, CrspMonthlyRecord};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Primary listing exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// New York Stock Exchange
    Nyse,
    /// American Stock Exchange
    Amex,
    /// NASDAQ
    Nasdaq,
    /// Anything else
    Other,
}

impl Exchange {
    /// Map a CRSP exchange code (regular and when-issued variants).
    pub fn from_exchcd(code: Option<i64>) -> Self {
        match code {
            Some(1 | 31) => Self::Nyse,
            Some(2 | 32) => Self::Amex,
            Some(3 | 33) => Self::Nasdaq,
            _ => Self::Other,
        }
    }

    /// Label stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nyse => "NYSE",
            Self::Amex => "AMEX",
            Self::Nasdaq => "NASDAQ",
            Self::Other => "Other",
        }
    }

    /// Parse a stored label; unknown labels map to [`Exchange::Other`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "NYSE" => Self::Nyse,
            "AMEX" => Self::Amex,
            "NASDAQ" => Self::Nasdaq,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad industry from the SIC division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Industry {
    Agriculture,
    Mining,
    Construction,
    Manufacturing,
    Transportation,
    Utilities,
    Wholesale,
    Retail,
    Finance,
    Services,
    Public,
    Missing,
}

impl Industry {
    const ALL: [Self; 12] = [
        Self::Agriculture,
        Self::Mining,
        Self::Construction,
        Self::Manufacturing,
        Self::Transportation,
        Self::Utilities,
        Self::Wholesale,
        Self::Retail,
        Self::Finance,
        Self::Services,
        Self::Public,
        Self::Missing,
    ];

    /// Map a standard industrial classification code.
    pub fn from_siccd(code: Option<i64>) -> Self {
        match code {
            Some(1..=999) => Self::Agriculture,
            Some(1000..=1499) => Self::Mining,
            Some(1500..=1799) => Self::Construction,
            Some(2000..=3999) => Self::Manufacturing,
            Some(4000..=4899) => Self::Transportation,
            Some(4900..=4999) => Self::Utilities,
            Some(5000..=5199) => Self::Wholesale,
            Some(5200..=5999) => Self::Retail,
            Some(6000..=6799) => Self::Finance,
            Some(7000..=8999) => Self::Services,
            Some(9000..=9999) => Self::Public,
            _ => Self::Missing,
        }
    }

    /// Label stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agriculture => "Agriculture",
            Self::Mining => "Mining",
            Self::Construction => "Construction",
            Self::Manufacturing => "Manufacturing",
            Self::Transportation => "Transportation",
            Self::Utilities => "Utilities",
            Self::Wholesale => "Wholesale",
            Self::Retail => "Retail",
            Self::Finance => "Finance",
            Self::Services => "Services",
            Self::Public => "Public",
            Self::Missing => "Missing",
        }
    }

    /// Parse a stored label; unknown labels map to [`Industry::Missing`].
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == label)
            .unwrap_or(Self::Missing)
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stock in one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMonth {
    /// CRSP permanent number
    pub permno: i64,
    /// Compustat company key, when a valid link exists
    pub gvkey: Option<String>,
    /// Month (first day)
    pub month: NaiveDate,
    /// Raw monthly return
    pub ret: f64,
    /// Return in excess of the risk-free rate, floored at -1
    pub ret_excess: f64,
    /// Market capitalisation in USD millions
    pub mktcap: f64,
    /// Market capitalisation at the end of the previous month
    pub mktcap_lag: f64,
    /// Listing exchange
    pub exchange: Exchange,
    /// Industry
    pub industry: Industry,
}

/// One stock on one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockDay {
    /// CRSP permanent number
    pub permno: i64,
    /// Trading day
    pub date: NaiveDate,
    /// Daily return in excess of the risk-free rate, floored at -1
    pub ret_excess: f64,
}

/// Annual accounting characteristics of one firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmYear {
    /// Compustat company key
    pub gvkey: String,
    /// Fiscal period end
    pub datadate: NaiveDate,
    /// Calendar year of `datadate`
    pub year: i32,
    /// Book equity (positive or missing)
    pub be: Option<f64>,
    /// Operating profitability
    pub op: Option<f64>,
    /// Asset growth over the previous fiscal year
    pub inv: Option<f64>,
    /// Total assets
    pub at: Option<f64>,
}

fn excess_return(ret: Option<f64>, rf: Option<f64>) -> Option<f64> {
    Some((ret? - rf?).max(-1.0))
}

fn market_cap(shrout: Option<f64>, altprc: Option<f64>) -> Option<f64> {
    let mktcap = shrout? * altprc?.abs() / 1000.0;
    (mktcap > 0.0).then_some(mktcap)
}

#[derive(Debug)]
struct Link {
    gvkey: String,
    start: NaiveDate,
    end: Option<NaiveDate>,
}

fn valid_links(links: &[CcmLinkRecord]) -> Result<HashMap<i64, Vec<Link>>> {
    let mut by_permno: HashMap<i64, Vec<Link>> = HashMap::new();
    for link in links {
        let linktype_ok = matches!(link.linktype.as_deref(), Some("LU" | "LC"));
        let linkprim_ok = matches!(link.linkprim.as_deref(), Some("P" | "C"));
        if !linktype_ok || !linkprim_ok {
            continue;
        }
        let end = match link.linkenddt.as_deref().map(str::trim) {
            None | Some("" | "E") => None,
            Some(value) => Some(parse_date(value)?),
        };
        by_permno.entry(link.permno).or_default().push(Link {
            gvkey: link.gvkey.clone(),
            start: parse_date(&link.linkdt)?,
            end,
        });
    }
    Ok(by_permno)
}

/// Build the cleaned monthly CRSP panel.
///
/// `rf_by_month` maps months to the monthly risk-free rate. Rows without a
/// return, a risk-free rate, a positive market cap or a market cap in the
/// immediately preceding month are dropped. When `links` are given, the
/// `gvkey` of a valid primary link covering the observation date is attached.
pub fn build_crsp_monthly(
    raw: &[CrspMonthlyRecord],
    rf_by_month: &HashMap<NaiveDate, f64>,
    links: Option<&[CcmLinkRecord]>,
) -> Result<Vec<StockMonth>> {
    let dates: Vec<NaiveDate> = raw
        .iter()
        .map(|r| parse_date(&r.date))
        .collect::<Result<_>>()?;

    let mut mktcaps: HashMap<(i64, NaiveDate), f64> = HashMap::new();
    for (record, date) in raw.iter().zip(&dates) {
        if let Some(mktcap) = market_cap(record.shrout, record.altprc) {
            mktcaps.insert((record.permno, floor_month(*date)), mktcap);
        }
    }

    let links = links.map(valid_links).transpose()?;

    let mut panel: Vec<StockMonth> = raw
        .iter()
        .zip(&dates)
        .filter_map(|(record, date)| {
            let month = floor_month(*date);
            let mktcap = market_cap(record.shrout, record.altprc)?;
            let mktcap_lag = *mktcaps.get(&(record.permno, add_months(month, -1)))?;
            let ret = record.ret?;
            let ret_excess = excess_return(Some(ret), rf_by_month.get(&month).copied())?;
            let gvkey = links.as_ref().and_then(|links| {
                links.get(&record.permno)?.iter().find_map(|link| {
                    let covers = link.start <= *date && link.end.is_none_or(|end| *date <= end);
                    covers.then(|| link.gvkey.clone())
                })
            });
            Some(StockMonth {
                permno: record.permno,
                gvkey,
                month,
                ret,
                ret_excess,
                mktcap,
                mktcap_lag,
                exchange: Exchange::from_exchcd(record.exchcd),
                industry: Industry::from_siccd(record.siccd),
            })
        })
        .collect();

    panel.sort_by_key(|r| (r.permno, r.month));
    debug!(raw = raw.len(), kept = panel.len(), "built CRSP monthly panel");
    Ok(panel)
}

/// Build the cleaned daily CRSP panel.
///
/// Days without a return or without a risk-free rate in `rf_by_day` are
/// dropped.
pub fn build_crsp_daily(
    raw: &[CrspDailyRecord],
    rf_by_day: &HashMap<NaiveDate, f64>,
) -> Result<Vec<StockDay>> {
    let mut panel = Vec::with_capacity(raw.len());
    for record in raw {
        let date = parse_date(&record.date)?;
        if let Some(ret_excess) = excess_return(record.ret, rf_by_day.get(&date).copied()) {
            panel.push(StockDay {
                permno: record.permno,
                date,
                ret_excess,
            });
        }
    }
    panel.sort_by_key(|r| (r.permno, r.date));
    Ok(panel)
}

/// Book equity: shareholders' equity plus deferred taxes minus preferred stock.
pub fn book_equity(record: &CompustatRecord) -> Option<f64> {
    let equity = record
        .seq
        .or_else(|| Some(record.ceq? + record.pstk?))
        .or_else(|| Some(record.at? - record.lt?))?;
    let deferred_taxes = record
        .txditc
        .or_else(|| Some(record.txdb? + record.itcb?))
        .unwrap_or(0.0);
    let preferred = record
        .pstkrv
        .or(record.pstkl)
        .or(record.pstk)
        .unwrap_or(0.0);
    let be = equity + deferred_taxes - preferred;
    (be > 0.0).then_some(be)
}

/// Operating profitability scaled by book equity.
pub fn operating_profitability(record: &CompustatRecord, be: Option<f64>) -> Option<f64> {
    let costs = record.cogs.unwrap_or(0.0) + record.xsga.unwrap_or(0.0) + record.xint.unwrap_or(0.0);
    Some((record.sale? - costs) / be?)
}

/// Build annual firm characteristics.
///
/// Only the last fiscal period per (gvkey, calendar year) is kept.
pub fn build_compustat(raw: &[CompustatRecord]) -> Result<Vec<FirmYear>> {
    let mut latest: HashMap<(String, i32), (NaiveDate, &CompustatRecord)> = HashMap::new();
    for record in raw {
        let datadate = parse_date(&record.datadate)?;
        let key = (record.gvkey.clone(), datadate.year());
        match latest.get(&key) {
            Some((existing, _)) if *existing >= datadate => {}
            _ => {
                latest.insert(key, (datadate, record));
            }
        }
    }

    let assets: HashMap<(&str, i32), f64> = latest
        .iter()
        .filter_map(|((gvkey, year), (_, record))| Some(((gvkey.as_str(), *year), record.at?)))
        .collect();

    let mut firms: Vec<FirmYear> = latest
        .iter()
        .map(|((gvkey, year), (datadate, record))| {
            let be = book_equity(record);
            let inv = assets
                .get(&(gvkey.as_str(), year - 1))
                .filter(|at_lag| **at_lag > 0.0)
                .and_then(|at_lag| Some(record.at? / at_lag - 1.0));
            FirmYear {
                gvkey: gvkey.clone(),
                datadate: *datadate,
                year: *year,
                be,
                op: operating_profitability(record, be),
                inv,
                at: record.at,
            }
        })
        .collect();

    firms.sort_by(|a, b| a.gvkey.cmp(&b.gvkey).then(a.datadate.cmp(&b.datadate)));
    debug!(raw = raw.len(), kept = firms.len(), "built Compustat panel");
    Ok(firms)
}

impl StockMonth {
    /// Convert rows into a frame.
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let months: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.month)).collect();
        Ok(DataFrame::new(vec![
            Series::new("permno".into(), rows.iter().map(|r| r.permno).collect::<Vec<_>>()).into(),
            Series::new(
                "gvkey".into(),
                rows.iter().map(|r| r.gvkey.clone()).collect::<Vec<_>>(),
            )
            .into(),
            date_column("month", &months)?,
            Series::new("ret".into(), rows.iter().map(|r| r.ret).collect::<Vec<_>>()).into(),
            Series::new(
                "ret_excess".into(),
                rows.iter().map(|r| r.ret_excess).collect::<Vec<_>>(),
            )
            .into(),
            Series::new("mktcap".into(), rows.iter().map(|r| r.mktcap).collect::<Vec<_>>()).into(),
            Series::new(
                "mktcap_lag".into(),
                rows.iter().map(|r| r.mktcap_lag).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "exchange".into(),
                rows.iter().map(|r| r.exchange.as_str()).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "industry".into(),
                rows.iter().map(|r| r.industry.as_str()).collect::<Vec<_>>(),
            )
            .into(),
        ])?)
    }

    /// Read rows back from a frame written by [`StockMonth::to_frame`].
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let permno = required_i64(df, "permno")?;
        let gvkey = str_values(df, "gvkey")?;
        let month = required_dates(df, "month")?;
        let ret = f64_values(df, "ret")?;
        let ret_excess = f64_values(df, "ret_excess")?;
        let mktcap = f64_values(df, "mktcap")?;
        let mktcap_lag = f64_values(df, "mktcap_lag")?;
        let exchange = str_values(df, "exchange")?;
        let industry = str_values(df, "industry")?;

        Ok((0..df.height())
            .filter_map(|i| {
                Some(Self {
                    permno: permno[i],
                    gvkey: gvkey[i].clone(),
                    month: month[i],
                    ret: ret[i]?,
                    ret_excess: ret_excess[i]?,
                    mktcap: mktcap[i]?,
                    mktcap_lag: mktcap_lag[i]?,
                    exchange: exchange[i]
                        .as_deref()
                        .map_or(Exchange::Other, Exchange::from_label),
                    industry: industry[i]
                        .as_deref()
                        .map_or(Industry::Missing, Industry::from_label),
                })
            })
            .collect())
    }
}

impl StockDay {
    /// Convert rows into a frame.
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.date)).collect();
        Ok(DataFrame::new(vec![
            Series::new("permno".into(), rows.iter().map(|r| r.permno).collect::<Vec<_>>()).into(),
            date_column("date", &dates)?,
            Series::new(
                "ret_excess".into(),
                rows.iter().map(|r| r.ret_excess).collect::<Vec<_>>(),
            )
            .into(),
        ])?)
    }

    /// Read rows back from a frame.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let permno = required_i64(df, "permno")?;
        let date = required_dates(df, "date")?;
        let ret_excess = f64_values(df, "ret_excess")?;
        Ok((0..df.height())
            .filter_map(|i| {
                Some(Self {
                    permno: permno[i],
                    date: date[i],
                    ret_excess: ret_excess[i]?,
                })
            })
            .collect())
    }
}

impl FirmYear {
    /// Convert rows into a frame.
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.datadate)).collect();
        Ok(DataFrame::new(vec![
            Series::new(
                "gvkey".into(),
                rows.iter().map(|r| r.gvkey.as_str()).collect::<Vec<_>>(),
            )
            .into(),
            date_column("datadate", &dates)?,
            Series::new("year".into(), rows.iter().map(|r| r.year).collect::<Vec<_>>()).into(),
            Series::new("be".into(), rows.iter().map(|r| r.be).collect::<Vec<_>>()).into(),
            Series::new("op".into(), rows.iter().map(|r| r.op).collect::<Vec<_>>()).into(),
            Series::new("inv".into(), rows.iter().map(|r| r.inv).collect::<Vec<_>>()).into(),
            Series::new("at".into(), rows.iter().map(|r| r.at).collect::<Vec<_>>()).into(),
        ])?)
    }

    /// Read rows back from a frame.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let gvkey = str_values(df, "gvkey")?;
        let datadate = required_dates(df, "datadate")?;
        let year = i64_values(df, "year")?;
        let be = f64_values(df, "be")?;
        let op = f64_values(df, "op")?;
        let inv = f64_values(df, "inv")?;
        let at = f64_values(df, "at")?;
        Ok((0..df.height())
            .filter_map(|i| {
                Some(Self {
                    gvkey: gvkey[i].clone()?,
                    datadate: datadate[i],
                    year: i32::try_from(year[i].unwrap_or(i64::from(datadate[i].year()))).ok()?,
                    be: be[i],
                    op: op[i],
                    inv: inv[i],
                    at: at[i],
                })
            })
            .collect())
    }
}

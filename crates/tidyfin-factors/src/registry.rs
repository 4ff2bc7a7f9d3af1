//! Characteristic Registry
//!
//! Metadata for every stock characteristic the workflows can sort on or use
//! as a regressor, with lookup by name.

use std::collections::HashMap;
use std::fmt;

/// Characteristic categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicCategory {
    /// Market risk exposure (CAPM betas)
    Risk,
    /// Firm size
    Size,
    /// Book-to-market
    Value,
    /// Past returns
    Momentum,
    /// Operating profitability
    Profitability,
    /// Asset growth
    Investment,
}

impl fmt::Display for CharacteristicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Risk => "risk",
            Self::Size => "size",
            Self::Value => "value",
            Self::Momentum => "momentum",
            Self::Profitability => "profitability",
            Self::Investment => "investment",
        };
        f.write_str(label)
    }
}

/// Characteristic metadata
#[derive(Debug, Clone)]
pub struct CharacteristicInfo {
    /// Characteristic name (unique identifier)
    pub name: &'static str,
    /// Category
    pub category: CharacteristicCategory,
    /// What the characteristic measures
    pub description: &'static str,
    /// Table holding the inputs
    pub source_table: &'static str,
    /// Required input columns
    pub required_columns: &'static [&'static str],
}

/// All known characteristics
pub fn available_characteristics() -> Vec<CharacteristicInfo> {
    vec![
        CharacteristicInfo {
            name: "beta_monthly",
            category: CharacteristicCategory::Risk,
            description: "CAPM beta from 60 months of monthly returns",
            source_table: "beta",
            required_columns: &["permno", "month", "beta_monthly"],
        },
        CharacteristicInfo {
            name: "beta_daily",
            category: CharacteristicCategory::Risk,
            description: "CAPM beta from 3 months of daily returns",
            source_table: "beta",
            required_columns: &["permno", "month", "beta_daily"],
        },
        CharacteristicInfo {
            name: "log_mktcap",
            category: CharacteristicCategory::Size,
            description: "Natural logarithm of market capitalization",
            source_table: "crsp_monthly",
            required_columns: &["permno", "month", "mktcap"],
        },
        CharacteristicInfo {
            name: "mktcap_lag",
            category: CharacteristicCategory::Size,
            description: "Market capitalization at the end of the previous month",
            source_table: "crsp_monthly",
            required_columns: &["permno", "month", "mktcap_lag"],
        },
        CharacteristicInfo {
            name: "bm",
            category: CharacteristicCategory::Value,
            description: "Book equity over December market equity, Fama-French timing",
            source_table: "compustat",
            required_columns: &["permno", "month", "gvkey", "mktcap", "be"],
        },
        CharacteristicInfo {
            name: "mom_12_2",
            category: CharacteristicCategory::Momentum,
            description: "Cumulative return from month t-12 to t-2",
            source_table: "crsp_monthly",
            required_columns: &["permno", "month", "ret"],
        },
        CharacteristicInfo {
            name: "op",
            category: CharacteristicCategory::Profitability,
            description: "Revenue minus costs and interest over book equity",
            source_table: "compustat",
            required_columns: &["permno", "month", "gvkey", "op"],
        },
        CharacteristicInfo {
            name: "inv",
            category: CharacteristicCategory::Investment,
            description: "Growth in total assets over the previous fiscal year",
            source_table: "compustat",
            required_columns: &["permno", "month", "gvkey", "inv"],
        },
    ]
}

/// Characteristics in one category
pub fn characteristics_by_category(category: CharacteristicCategory) -> Vec<CharacteristicInfo> {
    available_characteristics()
        .into_iter()
        .filter(|c| c.category == category)
        .collect()
}

/// Look up a characteristic by name
pub fn get_characteristic_info(name: &str) -> Option<CharacteristicInfo> {
    available_characteristics().into_iter().find(|c| c.name == name)
}

/// All characteristics indexed by name
pub fn characteristic_map() -> HashMap<&'static str, CharacteristicInfo> {
    available_characteristics()
        .into_iter()
        .map(|c| (c.name, c))
        .collect()
}

/// List all characteristic names
pub fn list_characteristic_names() -> Vec<&'static str> {
    available_characteristics().into_iter().map(|c| c.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_characteristics_count() {
        assert_eq!(available_characteristics().len(), 8);
    }

    #[test]
    fn test_by_category() {
        assert_eq!(characteristics_by_category(CharacteristicCategory::Risk).len(), 2);
        assert_eq!(characteristics_by_category(CharacteristicCategory::Size).len(), 2);
        assert_eq!(characteristics_by_category(CharacteristicCategory::Value).len(), 1);
    }

    #[test]
    fn test_lookup() {
        let bm = get_characteristic_info("bm").unwrap();
        assert_eq!(bm.category, CharacteristicCategory::Value);
        assert_eq!(bm.source_table, "compustat");
        assert!(get_characteristic_info("nonexistent").is_none());
        assert_eq!(CharacteristicCategory::Momentum.to_string(), "momentum");
    }

    #[test]
    fn test_names_unique() {
        assert_eq!(characteristic_map().len(), list_characteristic_names().len());
    }

    #[test]
    fn test_all_keyed_by_stock_month() {
        for info in available_characteristics() {
            assert!(
                info.required_columns.contains(&"permno") && info.required_columns.contains(&"month"),
                "{} is not keyed by permno and month",
                info.name
            );
        }
    }
}

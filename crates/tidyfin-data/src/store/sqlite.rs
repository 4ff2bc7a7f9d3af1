//! SQLite-backed analytical database.
//!
//! Every dataset lives in one flat table. [`Database::write_table`] drops and
//! recreates the table, so re-running a download overwrites the previous
//! copy. Column types follow the frame: floats map to `REAL`, integers and
//! booleans to `INTEGER`, strings and dates to `TEXT` (dates as ISO
//! `YYYY-MM-DD`).

use crate::error::{DataError, Result};
use crate::frame::{date_values, f64_values, i64_values, str_values};
use chrono::{NaiveDate, Utc};
use polars::prelude::*;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, params, params_from_iter};
use std::path::Path;
use tracing::{debug, info};

/// Local analytical database.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

/// Row count of a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// Table name
    pub name: String,
    /// Number of rows
    pub rows: usize,
}

/// Database statistics.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Per-table row counts, ordered by table name
    pub tables: Vec<TableStats>,
    /// Size of the database file in bytes (page count times page size)
    pub size_bytes: u64,
}

impl DatabaseStats {
    /// Total rows across all tables.
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Values of one frame column, grouped by SQL storage class.
enum SqlValues {
    Real(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

struct SqlColumn {
    name: String,
    values: SqlValues,
}

impl SqlColumn {
    fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        df.get_columns()
            .iter()
            .map(|column| {
                let name = column.name().to_string();
                let values = match column.dtype() {
                    DataType::Float32 | DataType::Float64 => {
                        SqlValues::Real(f64_values(df, &name)?)
                    }
                    DataType::Boolean
                    | DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64 => SqlValues::Integer(i64_values(df, &name)?),
                    DataType::Date => SqlValues::Text(
                        date_values(df, &name)?
                            .into_iter()
                            .map(|d| d.map(|d| d.to_string()))
                            .collect(),
                    ),
                    _ => SqlValues::Text(str_values(df, &name)?),
                };
                Ok(Self { name, values })
            })
            .collect()
    }

    const fn sql_type(&self) -> &'static str {
        match self.values {
            SqlValues::Real(_) => "REAL",
            SqlValues::Integer(_) => "INTEGER",
            SqlValues::Text(_) => "TEXT",
        }
    }

    fn value(&self, row: usize) -> Value {
        match &self.values {
            SqlValues::Real(v) => v[row].map_or(Value::Null, Value::Real),
            SqlValues::Integer(v) => v[row].map_or(Value::Null, Value::Integer),
            SqlValues::Text(v) => v[row].clone().map_or(Value::Null, Value::Text),
        }
    }
}

/// Storage class implied by a declared column type (SQLite affinity rules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
    #[default]
    Unknown,
}

impl Affinity {
    fn from_declared(declared: Option<&str>) -> Self {
        let Some(declared) = declared.map(str::to_ascii_uppercase) else {
            return Self::Unknown;
        };
        if declared.contains("INT") {
            Self::Integer
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
            Self::Text
        } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| declared.contains(t)) {
            Self::Real
        } else {
            Self::Unknown
        }
    }
}

/// Accumulates one result column while reading rows.
///
/// The stored values decide the column type. When they cannot (no rows or
/// only NULLs), the declared type of the table column does.
#[derive(Default)]
struct ColumnBuilder {
    cells: Vec<Value>,
    affinity: Affinity,
    has_text: bool,
    has_real: bool,
    has_integer: bool,
}

impl ColumnBuilder {
    fn new(affinity: Affinity) -> Self {
        Self {
            affinity,
            ..Self::default()
        }
    }

    fn push(&mut self, value: ValueRef<'_>) {
        let cell = match value {
            ValueRef::Null | ValueRef::Blob(_) => Value::Null,
            ValueRef::Integer(i) => {
                self.has_integer = true;
                Value::Integer(i)
            }
            ValueRef::Real(r) => {
                self.has_real = true;
                Value::Real(r)
            }
            ValueRef::Text(bytes) => {
                self.has_text = true;
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        };
        self.cells.push(cell);
    }

    fn storage(&self) -> Affinity {
        if self.has_text {
            Affinity::Text
        } else if self.has_real {
            Affinity::Real
        } else if self.has_integer {
            if self.affinity == Affinity::Real {
                Affinity::Real
            } else {
                Affinity::Integer
            }
        } else {
            self.affinity
        }
    }

    fn finish(self, name: &str) -> Column {
        match self.storage() {
            Affinity::Text => {
                let values: Vec<Option<String>> = self
                    .cells
                    .into_iter()
                    .map(|c| match c {
                        Value::Text(s) => Some(s),
                        Value::Integer(i) => Some(i.to_string()),
                        Value::Real(r) => Some(r.to_string()),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), values).into()
            }
            Affinity::Integer => {
                let values: Vec<Option<i64>> = self
                    .cells
                    .into_iter()
                    .map(|c| match c {
                        Value::Integer(i) => Some(i),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), values).into()
            }
            Affinity::Real | Affinity::Unknown => {
                let values: Vec<Option<f64>> = self
                    .cells
                    .into_iter()
                    .map(|c| match c {
                        Value::Real(r) => Some(r),
                        Value::Integer(i) => Some(i as f64),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), values).into()
            }
        }
    }
}

/// Reject anything that is not a plain SQL identifier.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(DataError::InvalidTableName(name.to_string()))
    }
}

fn quote_column(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Database {
    /// Open (or create) a database file.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened database");
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Create the quote cache, the only table with a fixed schema.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS quotes (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                adjusted_close REAL NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (symbol, date)
            )",
            [],
        )?;
        Ok(())
    }

    /// Replace `name` with the contents of `df`.
    ///
    /// Returns the number of rows written.
    pub fn write_table(&self, name: &str, df: &DataFrame) -> Result<usize> {
        validate_identifier(name)?;
        let columns = SqlColumn::from_frame(df)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {name}"), [])?;
        tx.execute(&create_statement(name, &columns), [])?;
        let rows = insert_rows(&tx, name, &columns, df.height())?;
        tx.commit()?;

        info!(table = name, rows, "wrote table");
        Ok(rows)
    }

    /// Append `df` to `name`, creating the table when it does not exist.
    pub fn append_table(&self, name: &str, df: &DataFrame) -> Result<usize> {
        validate_identifier(name)?;
        let columns = SqlColumn::from_frame(df)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &create_statement(name, &columns).replacen(
                "CREATE TABLE",
                "CREATE TABLE IF NOT EXISTS",
                1,
            ),
            [],
        )?;
        let rows = insert_rows(&tx, name, &columns, df.height())?;
        tx.commit()?;

        debug!(table = name, rows, "appended rows");
        Ok(rows)
    }

    /// Read a whole table.
    pub fn read_table(&self, name: &str) -> Result<DataFrame> {
        validate_identifier(name)?;
        if !self.has_table(name)? {
            return Err(DataError::UnknownTable(name.to_string()));
        }
        self.query(&format!("SELECT * FROM {name}"))
    }

    /// Read a table and convert the listed ISO text columns to `Date`.
    pub fn read_table_with_dates(&self, name: &str, date_columns: &[&str]) -> Result<DataFrame> {
        let mut df = self.read_table(name)?;
        for column in date_columns {
            let dates = date_values(&df, column)?;
            df.with_column(crate::frame::date_column(column, &dates)?)?;
        }
        Ok(df)
    }

    /// Run a `SELECT` and collect the result into a frame.
    pub fn query(&self, sql: &str) -> Result<DataFrame> {
        let mut stmt = self.conn.prepare(sql)?;
        let (names, mut builders): (Vec<String>, Vec<ColumnBuilder>) = stmt
            .columns()
            .iter()
            .map(|c| {
                (
                    c.name().to_string(),
                    ColumnBuilder::new(Affinity::from_declared(c.decl_type())),
                )
            })
            .unzip();

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, builder) in builders.iter_mut().enumerate() {
                builder.push(row.get_ref(i)?);
            }
        }

        let columns: Vec<Column> = builders
            .into_iter()
            .zip(names.iter())
            .map(|(builder, name)| builder.finish(name))
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    /// Names of all user tables.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Whether a table exists.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Number of rows in a table.
    pub fn row_count(&self, name: &str) -> Result<usize> {
        validate_identifier(name)?;
        if !self.has_table(name)? {
            return Err(DataError::UnknownTable(name.to_string()));
        }
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {name}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Drop a table if it exists.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {name}"), [])?;
        Ok(())
    }

    /// Rebuild the database file, reclaiming space left by replaced tables.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        info!("vacuumed database");
        Ok(())
    }

    /// Get database statistics.
    pub fn stats(&self) -> Result<DatabaseStats> {
        let tables = self
            .table_names()?
            .into_iter()
            .map(|name| {
                let rows = self.row_count(&name)?;
                Ok(TableStats { name, rows })
            })
            .collect::<Result<Vec<_>>>()?;

        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            tables,
            size_bytes: (page_count * page_size) as u64,
        })
    }

    /// Check if quotes are cached for a symbol and date range.
    ///
    /// Roughly 70% of calendar days are trading days, so fewer cached rows
    /// than that means the range has gaps worth re-fetching.
    pub fn has_quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM quotes WHERE symbol = ?1 AND date >= ?2 AND date <= ?3",
            params![symbol, start.to_string(), end.to_string()],
            |row| row.get(0),
        )?;
        let expected = ((end - start).num_days() as f64 * 0.7) as i64;
        Ok(count > 0 && count >= expected)
    }

    /// Get cached quotes for a symbol and date range.
    pub fn get_quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, date, open, high, low, close, volume, adjusted_close
             FROM quotes
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let mut dates = Vec::new();
        let mut fields: [Vec<f64>; 5] = Default::default();
        let mut volumes = Vec::new();

        let rows = stmt.query_map(params![symbol, start.to_string(), end.to_string()], |row| {
            Ok((
                row.get::<_, String>(1)?,
                [
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(7)?,
                ],
                row.get::<_, i64>(6)?,
            ))
        })?;
        for row in rows {
            let (date, values, volume) = row?;
            dates.push(Some(crate::dates::parse_date(&date)?));
            for (field, value) in fields.iter_mut().zip(values) {
                field.push(value);
            }
            volumes.push(volume as u64);
        }

        if dates.is_empty() {
            return Err(DataError::MissingData {
                dataset: symbol.to_string(),
                reason: "No cached quotes".to_string(),
            });
        }

        let [opens, highs, lows, closes, adjusted] = fields;
        Ok(DataFrame::new(vec![
            Series::new("symbol".into(), vec![symbol; dates.len()]).into(),
            crate::frame::date_column("date", &dates)?,
            Series::new("open".into(), opens).into(),
            Series::new("high".into(), highs).into(),
            Series::new("low".into(), lows).into(),
            Series::new("close".into(), closes).into(),
            Series::new("volume".into(), volumes).into(),
            Series::new("adjusted_close".into(), adjusted).into(),
        ])?)
    }

    /// Store quotes in the cache, replacing rows with the same symbol and date.
    pub fn put_quotes(&self, df: &DataFrame) -> Result<usize> {
        let cached_at = Utc::now().to_rfc3339();
        let symbols = str_values(df, "symbol")?;
        let dates = date_values(df, "date")?;
        let opens = f64_values(df, "open")?;
        let highs = f64_values(df, "high")?;
        let lows = f64_values(df, "low")?;
        let closes = f64_values(df, "close")?;
        let volumes = i64_values(df, "volume")?;
        let adjusted = f64_values(df, "adjusted_close")?;

        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO quotes
                 (symbol, date, open, high, low, close, volume, adjusted_close, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for i in 0..df.height() {
                let (Some(symbol), Some(date)) = (&symbols[i], dates[i]) else {
                    return Err(DataError::Parse(format!("Quote row {i} lacks symbol or date")));
                };
                let (Some(open), Some(high), Some(low), Some(close), Some(volume), Some(adj)) = (
                    opens[i], highs[i], lows[i], closes[i], volumes[i], adjusted[i],
                ) else {
                    continue;
                };
                stmt.execute(params![
                    symbol,
                    date.to_string(),
                    open,
                    high,
                    low,
                    close,
                    volume,
                    adj,
                    cached_at
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}

fn create_statement(name: &str, columns: &[SqlColumn]) -> String {
    let definitions: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_column(&c.name), c.sql_type()))
        .collect();
    format!("CREATE TABLE {name} ({})", definitions.join(", "))
}

fn insert_rows(conn: &Connection, name: &str, columns: &[SqlColumn], height: usize) -> Result<usize> {
    if columns.is_empty() {
        return Ok(0);
    }
    let column_list: Vec<String> = columns.iter().map(|c| quote_column(&c.name)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {name} ({}) VALUES ({})",
        column_list.join(", "),
        placeholders.join(", ")
    ))?;
    for row in 0..height {
        stmt.execute(params_from_iter(columns.iter().map(|c| c.value(row))))?;
    }
    Ok(height)
}

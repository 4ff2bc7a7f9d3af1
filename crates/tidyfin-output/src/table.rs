//! Fixed-width ASCII and Markdown tables.

use std::fmt;

/// Horizontal alignment of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Text columns
    Left,
    /// Numeric columns
    #[default]
    Right,
}

/// A titled table of preformatted cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    /// Title printed above the table
    pub title: String,
    /// Column headers
    pub headers: Vec<String>,
    /// Column alignments; missing entries default to right
    pub alignments: Vec<Alignment>,
    /// Rows of cells
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table. The first column is left-aligned.
    pub fn new<S: Into<String>>(title: impl Into<String>, headers: impl IntoIterator<Item = S>) -> Self {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let alignments = (0..headers.len())
            .map(|i| if i == 0 { Alignment::Left } else { Alignment::Right })
            .collect();
        Self {
            title: title.into(),
            headers,
            alignments,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    pub fn push_row<S: Into<String>>(&mut self, cells: impl IntoIterator<Item = S>) {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Builder-style [`Table::push_row`].
    pub fn with_row<S: Into<String>>(mut self, cells: impl IntoIterator<Item = S>) -> Self {
        self.push_row(cells);
        self
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let n = self.rows.iter().map(Vec::len).chain([self.headers.len()]).max().unwrap_or(0);
        (0..n)
            .map(|i| {
                self.rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .chain(self.headers.get(i))
                    .map(|c| c.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn pad(&self, cell: &str, column: usize, width: usize) -> String {
        match self.alignments.get(column).copied().unwrap_or_default() {
            Alignment::Left => format!("{cell:<width$}"),
            Alignment::Right => format!("{cell:>width$}"),
        }
    }

    fn line(&self, cells: &[String], widths: &[usize], separator: &str) -> String {
        widths
            .iter()
            .enumerate()
            .map(|(i, w)| self.pad(cells.get(i).map_or("", String::as_str), i, *w))
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Format for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let widths = self.widths();
        let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        let rule = "=".repeat(total.max(self.title.chars().count()));
        let mut output = String::new();
        if !self.title.is_empty() {
            output.push_str(&self.title);
            output.push('\n');
        }
        output.push_str(&rule);
        output.push('\n');
        output.push_str(self.line(&self.headers, &widths, "  ").trim_end());
        output.push('\n');
        output.push_str(&"-".repeat(rule.len()));
        output.push('\n');
        for row in &self.rows {
            output.push_str(self.line(row, &widths, "  ").trim_end());
            output.push('\n');
        }
        output.push_str(&rule);
        output.push('\n');
        output
    }

    /// Format as a GitHub-flavoured Markdown table.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        if !self.title.is_empty() {
            output.push_str(&format!("### {}\n\n", self.title));
        }
        output.push_str(&format!("| {} |\n", self.headers.join(" | ")));
        let rule: Vec<&str> = (0..self.headers.len())
            .map(|i| match self.alignments.get(i).copied().unwrap_or_default() {
                Alignment::Left => ":---",
                Alignment::Right => "---:",
            })
            .collect();
        output.push_str(&format!("| {} |\n", rule.join(" | ")));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        output
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii_table())
    }
}

/// Format a float with `decimals` places; non-finite values print as `NA`.
pub fn format_number(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{value:.decimals$}")
    } else {
        "NA".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new("Portfolios", ["portfolio", "ret", "n"])
            .with_row(["1", "0.0100", "25"])
            .with_row(["10", "-0.0020", "3"])
    }

    #[test]
    fn test_ascii_alignment() {
        let ascii = sample().to_ascii_table();
        let lines: Vec<&str> = ascii.lines().collect();
        assert_eq!(lines[0], "Portfolios");
        assert_eq!(lines[2], "portfolio      ret   n");
        assert_eq!(lines[4], "1           0.0100  25");
        assert_eq!(lines[5], "10         -0.0020   3");
    }

    #[test]
    fn test_markdown() {
        let md = sample().to_markdown();
        assert!(md.starts_with("### Portfolios"));
        assert!(md.contains("| portfolio | ret | n |"));
        assert!(md.contains("| :--- | ---: | ---: |"));
        assert!(md.contains("| 10 | -0.0020 | 3 |"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.123456, 3), "0.123");
        assert_eq!(format_number(f64::NAN, 3), "NA");
        assert!(Table::new("", ["a"]).is_empty());
    }
}

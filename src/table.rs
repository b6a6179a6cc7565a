//! Plain-text table formatting for tabular output

use chrono::DateTime;

/// Column alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Fixed-width text table
#[derive(Debug)]
pub struct TextTable {
    headers: Vec<String>,
    align: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    /// Create a table with left-aligned columns
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let align = vec![Align::Left; headers.len()];
        Self {
            headers,
            align,
            rows: Vec::new(),
        }
    }

    /// Set alignment of one column
    pub fn align(mut self, column: usize, align: Align) -> Self {
        if let Some(slot) = self.align.get_mut(column) {
            *slot = align;
        }
        self
    }

    /// Add a row; missing cells render empty, extra cells are dropped
    pub fn add_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn format_row(&self, cells: &[String], widths: &[usize]) -> String {
        let line = cells
            .iter()
            .zip(widths)
            .zip(&self.align)
            .map(|((cell, &width), align)| match align {
                Align::Left => format!("{:<width$}", cell, width = width),
                Align::Right => format!("{:>width$}", cell, width = width),
            })
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    }

    /// Render header, separator and rows
    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut output = String::new();

        output.push_str(&self.format_row(&self.headers, &widths));
        output.push('\n');
        let separator: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        output.push_str(&separator.join("  "));
        output.push('\n');

        for row in &self.rows {
            output.push_str(&self.format_row(row, &widths));
            output.push('\n');
        }

        output
    }
}

/// Render a Unix timestamp as UTC date-time, falling back to the raw value
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Render a signed percentage like `+50.0%`
pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{:+.1}%", p),
        None => "n/a".to_string(),
    }
}

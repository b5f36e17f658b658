//! In-memory table model with strict CSV parsing and emission.
//!
//! A [`Table`] is an ordered sequence of named [`Column`]s sharing a uniform
//! row count. Cells keep their original text so columns that must round-trip
//! exactly can be re-emitted byte-for-byte; numeric interpretation happens
//! on demand via [`Column::numeric_values`].
//!
//! The parser is strict: ragged rows, duplicate headers, and invalid UTF-8
//! are hard errors. The line-ending convention and trailing-newline state of
//! the source are recorded so emission reproduces them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Inferred column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    /// All non-null cells parse as i64.
    Int,
    /// All non-null cells parse as finite f64.
    Float,
    /// Anything else.
    Str,
}

impl Dtype {
    /// Whether values of this type can be handed to the numeric codec.
    pub fn is_numeric(self) -> bool {
        matches!(self, Dtype::Int | Dtype::Float)
    }
}

/// Line-ending convention of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    /// Unix newlines.
    #[default]
    Lf,
    /// Windows newlines.
    CrLf,
}

impl LineEnding {
    /// The terminator as a string slice.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A single named column. Cells are stored as text; the empty string is null.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name from the header row.
    pub name: String,
    /// Cell text, one entry per row.
    pub cells: Vec<String>,
    /// Inferred data type.
    pub dtype: Dtype,
}

impl Column {
    /// Build a column from raw cells, inferring the dtype.
    pub fn new(name: impl Into<String>, cells: Vec<String>) -> Self {
        let dtype = infer_dtype(&cells);
        Column {
            name: name.into(),
            cells,
            dtype,
        }
    }

    /// Rebuild a numeric column from decoded values and a null mask.
    ///
    /// `nulls` holds row indices whose cells are empty; `values` must cover
    /// every row (null positions are ignored).
    pub fn from_numeric(name: impl Into<String>, dtype: Dtype, values: &[f64], nulls: &[u32]) -> Self {
        let mut null_iter = nulls.iter().peekable();
        let cells = values
            .iter()
            .enumerate()
            .map(|(row, &v)| {
                if null_iter.peek() == Some(&&(row as u32)) {
                    null_iter.next();
                    return String::new();
                }
                match dtype {
                    Dtype::Int => (v.round() as i64).to_string(),
                    _ => format_float(v),
                }
            })
            .collect();
        Column {
            name: name.into(),
            cells,
            dtype,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether the cell at `row` is null (empty text).
    pub fn is_null(&self, row: usize) -> bool {
        self.cells[row].is_empty()
    }

    /// Whether the column carries a numeric dtype.
    pub fn is_numeric(&self) -> bool {
        self.dtype.is_numeric()
    }

    /// Extract values as f64 plus the sorted indices of null rows.
    ///
    /// Null positions hold 0.0 in the value vector so it stays row-aligned.
    pub fn numeric_values(&self) -> Result<(Vec<f64>, Vec<u32>)> {
        if !self.is_numeric() {
            return Err(Error::NotNumeric {
                column: self.name.clone(),
            });
        }
        let mut values = Vec::with_capacity(self.cells.len());
        let mut nulls = Vec::new();
        for (row, cell) in self.cells.iter().enumerate() {
            if cell.is_empty() {
                nulls.push(row as u32);
                values.push(0.0);
            } else {
                let v: f64 = cell.trim().parse().map_err(|_| {
                    Error::parse_at(format!("non-numeric cell '{}' in column '{}'", cell, self.name), row)
                })?;
                values.push(v);
            }
        }
        Ok((values, nulls))
    }

    /// Ratio of distinct non-null cells to total rows, in [0, 1].
    pub fn distinct_ratio(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        let mut seen: Vec<&str> = self
            .cells
            .iter()
            .filter(|c| !c.is_empty())
            .map(String::as_str)
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len() as f64 / self.cells.len() as f64
    }

    /// Whether the column is a strictly increasing integer sequence
    /// (timestamp-like). Null cells disqualify it.
    pub fn is_strictly_increasing(&self) -> bool {
        if self.dtype != Dtype::Int || self.cells.len() < 2 {
            return false;
        }
        let mut prev: Option<i64> = None;
        for cell in &self.cells {
            let Ok(v) = cell.trim().parse::<i64>() else {
                return false;
            };
            if let Some(p) = prev {
                if v <= p {
                    return false;
                }
            }
            prev = Some(v);
        }
        true
    }

    /// Approximate byte footprint of the column in the source file.
    pub fn byte_size(&self) -> usize {
        self.name.len() + self.cells.iter().map(String::len).sum::<usize>() + self.cells.len()
    }
}

/// An ordered collection of columns with a uniform row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Columns in source order.
    pub columns: Vec<Column>,
    /// Line-ending convention of the source.
    pub line_ending: LineEnding,
    /// Whether the source ended with a newline.
    pub trailing_newline: bool,
}

impl Table {
    /// Assemble a table from columns, validating the uniform-row-count and
    /// unique-name invariants.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let table = Table {
            columns,
            line_ending: LineEnding::Lf,
            trailing_newline: true,
        };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::parse("table has no columns"));
        }
        let rows = self.columns[0].len();
        for col in &self.columns {
            if col.len() != rows {
                return Err(Error::parse(format!(
                    "column '{}' has {} rows, expected {}",
                    col.name,
                    col.len(),
                    rows
                )));
            }
        }
        let mut names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                return Err(Error::parse(format!("duplicate column name '{}'", pair[0])));
            }
        }
        Ok(())
    }

    /// Parse CSV bytes into a table.
    pub fn parse_csv(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::parse(format!("invalid UTF-8: {e}")))?;
        if text.is_empty() {
            return Err(Error::parse("empty input"));
        }

        let line_ending = if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        let trailing_newline = text.ends_with('\n');

        let records = parse_records(text)?;
        let mut records = records.into_iter();
        let header = records.next().ok_or_else(|| Error::parse("missing header row"))?;
        if header.iter().any(String::is_empty) {
            return Err(Error::parse("empty column name in header"));
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); header.len()];
        for (row, record) in records.enumerate() {
            if record.len() != header.len() {
                return Err(Error::parse_at(
                    format!("expected {} fields, got {}", header.len(), record.len()),
                    row + 1,
                ));
            }
            for (i, field) in record.into_iter().enumerate() {
                cells[i].push(field);
            }
        }

        let columns = header
            .into_iter()
            .zip(cells)
            .map(|(name, cells)| Column::new(name, cells))
            .collect();

        let mut table = Table::new(columns)?;
        table.line_ending = line_ending;
        table.trailing_newline = trailing_newline;
        Ok(table)
    }

    /// Emit the table as CSV, reproducing the recorded line-ending and
    /// trailing-newline convention. Fields are quoted only when required.
    pub fn to_csv(&self) -> Vec<u8> {
        let eol = self.line_ending.as_str();
        let mut out = String::new();

        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        write_record(&mut out, &header);

        for row in 0..self.row_count() {
            out.push_str(eol);
            let fields: Vec<&str> = self.columns.iter().map(|c| c.cells[row].as_str()).collect();
            write_record(&mut out, &fields);
        }
        if self.trailing_newline {
            out.push_str(eol);
        }
        out.into_bytes()
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in source order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Total byte footprint estimate.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(Column::byte_size).sum()
    }
}

/// Split text into records of fields, honoring RFC 4180 quoting.
fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut field_started = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            '"' => {
                return Err(Error::parse_at("stray quote inside unquoted field", records.len()));
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                field_started = false;
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }
    if in_quotes {
        return Err(Error::parse("unterminated quoted field"));
    }
    // Final record without a trailing newline.
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    // Drop a trailing all-empty record produced by a final newline.
    if records.last().is_some_and(|r| r.len() == 1 && r[0].is_empty()) {
        records.pop();
    }
    if records.is_empty() {
        return Err(Error::parse("no records in input"));
    }
    Ok(records)
}

fn write_record(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
            out.push('"');
            for c in field.chars() {
                if c == '"' {
                    out.push('"');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
}

fn infer_dtype(cells: &[String]) -> Dtype {
    let mut saw_value = false;
    let mut all_int = true;
    let mut all_float = true;
    for cell in cells {
        if cell.is_empty() {
            continue;
        }
        saw_value = true;
        let t = cell.trim();
        if all_int && t.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_float && !t.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
            all_float = false;
        }
        if !all_int && !all_float {
            return Dtype::Str;
        }
    }
    if !saw_value {
        Dtype::Str
    } else if all_int {
        Dtype::Int
    } else if all_float {
        Dtype::Float
    } else {
        Dtype::Str
    }
}

/// Format a float the way the emitter expects: shortest text that
/// round-trips through f64 parsing.
fn format_float(v: f64) -> String {
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Table {
        Table::parse_csv(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let t = parse("a,b,c\n1,2.5,x\n2,3.5,y\n");
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.column_names(), vec!["a", "b", "c"]);
        assert_eq!(t.column("a").unwrap().dtype, Dtype::Int);
        assert_eq!(t.column("b").unwrap().dtype, Dtype::Float);
        assert_eq!(t.column("c").unwrap().dtype, Dtype::Str);
    }

    #[test]
    fn test_roundtrip_lf() {
        let src = "a,b\n1,hello\n2,world\n";
        assert_eq!(parse(src).to_csv(), src.as_bytes());
    }

    #[test]
    fn test_roundtrip_crlf_no_trailing_newline() {
        let src = "a,b\r\n1,x\r\n2,y";
        let t = parse(src);
        assert_eq!(t.line_ending, LineEnding::CrLf);
        assert!(!t.trailing_newline);
        assert_eq!(t.to_csv(), src.as_bytes());
    }

    #[test]
    fn test_quoted_fields() {
        let t = parse("a,b\n\"x,y\",\"he said \"\"hi\"\"\"\n");
        assert_eq!(t.column("a").unwrap().cells[0], "x,y");
        assert_eq!(t.column("b").unwrap().cells[0], "he said \"hi\"");
        // Re-emission keeps required quoting.
        assert_eq!(t.to_csv(), b"a,b\n\"x,y\",\"he said \"\"hi\"\"\"\n");
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = Table::parse_csv(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = Table::parse_csv(b"a,a\n1,2\n").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unterminated_quote_rejected() {
        assert!(Table::parse_csv(b"a\n\"oops\n").is_err());
    }

    #[test]
    fn test_null_cells() {
        let t = parse("a,b\n1,\n,2\n");
        let col = t.column("a").unwrap();
        assert_eq!(col.dtype, Dtype::Int);
        assert!(col.is_null(1));
        let (values, nulls) = col.numeric_values().unwrap();
        assert_eq!(values, vec![1.0, 0.0]);
        assert_eq!(nulls, vec![1]);
    }

    #[test]
    fn test_from_numeric_rebuild() {
        let col = Column::from_numeric("x", Dtype::Int, &[1.0, 0.0, 3.0], &[1]);
        assert_eq!(col.cells, vec!["1", "", "3"]);
        let col = Column::from_numeric("y", Dtype::Float, &[1.5, 2.25], &[]);
        assert_eq!(col.cells, vec!["1.5", "2.25"]);
    }

    #[test]
    fn test_monotonic_detection() {
        let t = parse("ts,v\n100,1\n101,1\n105,2\n");
        assert!(t.column("ts").unwrap().is_strictly_increasing());
        assert!(!t.column("v").unwrap().is_strictly_increasing());
    }

    #[test]
    fn test_distinct_ratio() {
        let t = parse("id,k\n1,a\n2,a\n3,a\n4,b\n");
        assert_eq!(t.column("id").unwrap().distinct_ratio(), 1.0);
        assert_eq!(t.column("k").unwrap().distinct_ratio(), 0.5);
    }

    #[test]
    fn test_float_formatting_roundtrips() {
        for v in [0.1, 1e10, -2.5, 1234.5678, f64::MIN_POSITIVE] {
            let text = format_float(v);
            assert_eq!(text.parse::<f64>().unwrap(), v);
        }
    }
}

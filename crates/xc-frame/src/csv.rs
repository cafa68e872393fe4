//! Delimited text codec.
//!
//! Header row, RFC 4180 quoting (doubled quotes inside quoted fields, quoted
//! fields may span lines), CRLF or LF line endings. Cells equal to one of the
//! NA tokens are missing. Numbers are written at full round-trip precision.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::debug;

use crate::column::{format_number, Column, ColumnType};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Reader and writer options.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub separator: char,

    /// Cells that read as missing.
    pub na_tokens: Vec<String>,

    /// How a missing cell is written.
    pub na_output: String,

    /// Forced column types; other columns are inferred (numeric when every
    /// non-missing cell parses as a number, categorical otherwise).
    pub column_types: HashMap<String, ColumnType>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: ',',
            na_tokens: vec!["".to_string(), "NA".to_string(), "NaN".to_string()],
            na_output: "NA".to_string(),
            column_types: HashMap::new(),
        }
    }
}

impl CsvOptions {
    pub fn with_type(mut self, column: impl Into<String>, kind: ColumnType) -> Self {
        self.column_types.insert(column.into(), kind);
        self
    }

    fn is_na(&self, cell: &str) -> bool {
        self.na_tokens.iter().any(|t| t == cell.trim())
    }
}

/// A quoted field is never read as missing.
struct Field {
    text: String,
    quoted: bool,
}

/// One parsed record and the line it started on (1-based).
struct Record {
    line: usize,
    fields: Vec<Field>,
}

fn parse_records(text: &str, sep: char) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut fields: Vec<Field> = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut after_quote = false;
    let mut had_content = false;
    let mut line = 1usize;
    let mut record_line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if had_content || !fields.is_empty() || !field.is_empty() {
                    fields.push(Field {
                        text: std::mem::take(&mut field),
                        quoted,
                    });
                    records.push(Record {
                        line: record_line,
                        fields: std::mem::take(&mut fields),
                    });
                }
                had_content = false;
                after_quote = false;
                quoted = false;
                line += 1;
                record_line = line;
            }
            c if c == sep => {
                fields.push(Field {
                    text: std::mem::take(&mut field),
                    quoted,
                });
                had_content = true;
                after_quote = false;
                quoted = false;
            }
            _ if after_quote => {
                return Err(FrameError::Malformed {
                    line,
                    message: format!("unexpected character '{}' after closing quote", c),
                });
            }
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
                had_content = true;
            }
            _ => {
                field.push(c);
                had_content = true;
            }
        }
    }

    if in_quotes {
        return Err(FrameError::Malformed {
            line: record_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if had_content || !fields.is_empty() || !field.is_empty() {
        fields.push(Field {
            text: field,
            quoted,
        });
        records.push(Record {
            line: record_line,
            fields,
        });
    }
    Ok(records)
}

fn infer_type(cells: &[Option<&str>]) -> ColumnType {
    let numeric = cells
        .iter()
        .flatten()
        .all(|s| s.trim().parse::<f64>().is_ok());
    if numeric {
        ColumnType::Numeric
    } else {
        ColumnType::Categorical
    }
}

fn build_column(
    name: &str,
    kind: ColumnType,
    cells: &[Option<&str>],
    lines: &[usize],
) -> Result<Column> {
    let bad = |row: usize, cell: &str, what: &str| FrameError::Malformed {
        line: lines[row],
        message: format!("column '{}': cannot parse '{}' as {}", name, cell, what),
    };
    Ok(match kind {
        ColumnType::Numeric => {
            let mut values = Vec::with_capacity(cells.len());
            for (row, cell) in cells.iter().enumerate() {
                values.push(match cell {
                    Some(s) => {
                        let v: f64 = s.trim().parse().map_err(|_| bad(row, *s, "a number"))?;
                        if v.is_nan() {
                            None
                        } else {
                            Some(v)
                        }
                    }
                    None => None,
                });
            }
            Column::Numeric(values)
        }
        ColumnType::Time => {
            let mut values = Vec::with_capacity(cells.len());
            for (row, cell) in cells.iter().enumerate() {
                values.push(match cell {
                    Some(s) => Some(
                        s.trim()
                            .parse::<i64>()
                            .map_err(|_| bad(row, *s, "epoch milliseconds"))?,
                    ),
                    None => None,
                });
            }
            Column::Time(values)
        }
        ColumnType::Categorical => {
            Column::Categorical(cells.iter().map(|c| c.map(str::to_string)).collect())
        }
        ColumnType::Str => Column::Str(cells.iter().map(|c| c.map(str::to_string)).collect()),
    })
}

/// Parse delimited text into a frame.
pub fn read_csv_str(text: &str, options: &CsvOptions) -> Result<Frame> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_records(text, options.separator)?.into_iter();
    let header = records.next().ok_or(FrameError::MissingHeader)?;
    let names: Vec<String> = header
        .fields
        .iter()
        .map(|h| h.text.trim().to_string())
        .collect();
    let width = names.len();

    let rows: Vec<Record> = records.collect();
    for record in &rows {
        if record.fields.len() != width {
            return Err(FrameError::Malformed {
                line: record.line,
                message: format!(
                    "expected {} fields, found {}",
                    width,
                    record.fields.len()
                ),
            });
        }
    }
    let lines: Vec<usize> = rows.iter().map(|r| r.line).collect();

    let mut columns = Vec::with_capacity(width);
    for (i, name) in names.into_iter().enumerate() {
        let cells: Vec<Option<&str>> = rows
            .iter()
            .map(|r| {
                let field = &r.fields[i];
                if !field.quoted && options.is_na(&field.text) {
                    None
                } else {
                    Some(field.text.as_str())
                }
            })
            .collect();
        let kind = options
            .column_types
            .get(&name)
            .copied()
            .unwrap_or_else(|| infer_type(&cells));
        let column = build_column(&name, kind, &cells, &lines)?;
        columns.push((name, column));
    }

    let frame = Frame::new(columns)?;
    debug!(rows = frame.nrows(), cols = frame.ncols(), "parsed delimited text");
    Ok(frame)
}

/// Read a delimited text file.
pub fn read_csv(path: &Path, options: &CsvOptions) -> Result<Frame> {
    let text = std::fs::read_to_string(path)?;
    read_csv_str(&text, options)
}

fn needs_quotes(cell: &str, options: &CsvOptions) -> bool {
    cell.contains(options.separator)
        || cell.contains(|c: char| matches!(c, '"' | '\n' | '\r'))
        || cell != cell.trim()
        || options.is_na(cell)
}

fn push_field(out: &mut String, cell: &str, options: &CsvOptions) {
    if needs_quotes(cell, options) {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

/// Render a frame as delimited text, header first, in column order.
pub fn write_csv_string(frame: &Frame, options: &CsvOptions) -> String {
    let mut out = String::new();
    for (i, name) in frame.names().iter().enumerate() {
        if i > 0 {
            out.push(options.separator);
        }
        push_field(&mut out, name, options);
    }
    out.push('\n');

    for row in 0..frame.nrows() {
        for (i, column) in frame.columns().iter().enumerate() {
            if i > 0 {
                out.push(options.separator);
            }
            match column {
                Column::Numeric(v) => match v[row] {
                    Some(x) => out.push_str(&format_number(x)),
                    None => out.push_str(&options.na_output),
                },
                Column::Time(v) => match v[row] {
                    Some(ms) => {
                        let _ = write!(out, "{}", ms);
                    }
                    None => out.push_str(&options.na_output),
                },
                Column::Categorical(v) | Column::Str(v) => match &v[row] {
                    Some(s) => push_field(&mut out, s, options),
                    None => out.push_str(&options.na_output),
                },
            }
        }
        out.push('\n');
    }
    out
}

/// Write a frame to a delimited text file.
pub fn write_csv(frame: &Frame, path: &Path, options: &CsvOptions) -> Result<()> {
    std::fs::write(path, write_csv_string(frame, options))?;
    debug!(path = %path.display(), rows = frame.nrows(), "wrote delimited text");
    Ok(())
}

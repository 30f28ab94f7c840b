//! Loading comma-separated tables into timestamps and value rows.
//!
//! The first column is the timestamp, parsed as a float and truncated to an
//! integer. Every other column is an `f64`; empty cells become NaN.
//!
//! Cells may be wrapped in double quotes, with `""` standing for a literal
//! quote. A quoted cell must end on the line it starts on.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::debug;
use thiserror::Error;

/// Errors raised while loading a table.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: cannot parse {value:?} in column {column}")]
    Parse {
        line: usize,
        column: usize,
        value: String,
    },

    #[error("line {line}: missing timestamp")]
    MissingTimestamp { line: usize },

    #[error("line {line}: unterminated quoted cell")]
    UnterminatedQuote { line: usize },

    #[error("line {line}: expected {expected} columns, found {actual}")]
    Ragged {
        line: usize,
        expected: usize,
        actual: usize,
    },
}

/// Parallel timestamp and value arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub timestamps: Vec<i64>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    /// Number of value columns (the timestamp column excluded).
    pub fn columns(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Loads a table from a file, optionally skipping a header line.
pub fn load_csv<P: AsRef<Path>>(path: P, skip_header: bool) -> Result<Table, IngestError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let table = parse_csv(BufReader::new(file), skip_header)?;
    debug!(
        "loaded {} rows x {} columns from {}",
        table.len(),
        table.columns(),
        path.display()
    );
    Ok(table)
}

/// Parses a table from any buffered reader. Blank lines are ignored.
pub fn parse_csv<R: BufRead>(reader: R, skip_header: bool) -> Result<Table, IngestError> {
    let mut table = Table::default();
    let mut width = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let number = idx + 1;
        if skip_header && idx == 0 {
            continue;
        }
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let cells = split_cells(line, number)?;
        let mut cells = cells.iter();
        let ts_cell = cells.next().map_or("", |c| c.trim());
        if ts_cell.is_empty() {
            return Err(IngestError::MissingTimestamp { line: number });
        }
        let ts = parse_cell(ts_cell, number, 0)?;

        let values = cells
            .enumerate()
            .map(|(i, cell)| {
                let cell = cell.trim();
                if cell.is_empty() {
                    Ok(f64::NAN)
                } else {
                    parse_cell(cell, number, i + 1)
                }
            })
            .collect::<Result<Vec<f64>, _>>()?;

        match width {
            None => width = Some(values.len()),
            Some(expected) if expected != values.len() => {
                return Err(IngestError::Ragged {
                    line: number,
                    expected,
                    actual: values.len(),
                });
            }
            Some(_) => {}
        }

        table.timestamps.push(ts as i64);
        table.rows.push(values);
    }

    Ok(table)
}

/// Splits one line at commas outside double quotes. Quoted cells are
/// unescaped; plain cells are borrowed from the line.
fn split_cells(line: &str, number: usize) -> Result<Vec<Cow<'_, str>>, IngestError> {
    let mut cells = Vec::new();
    let mut rest = line;
    loop {
        let (cell, tail) = match rest.trim_start().strip_prefix('"') {
            Some(quoted) => {
                let (mut cell, after) = unquote(quoted, number)?;
                let (junk, tail) = match after.find(',') {
                    Some(comma) => (&after[..comma], Some(&after[comma + 1..])),
                    None => (after, None),
                };
                cell.push_str(junk);
                (Cow::Owned(cell), tail)
            }
            None => match rest.find(',') {
                Some(comma) => (Cow::Borrowed(&rest[..comma]), Some(&rest[comma + 1..])),
                None => (Cow::Borrowed(rest), None),
            },
        };
        cells.push(cell);
        match tail {
            Some(tail) => rest = tail,
            None => return Ok(cells),
        }
    }
}

/// Reads a quoted cell up to its closing quote, returning the unescaped text
/// and whatever follows the quote.
fn unquote(quoted: &str, number: usize) -> Result<(String, &str), IngestError> {
    let mut cell = String::new();
    let mut chars = quoted.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            cell.push(c);
        } else if chars.next_if(|&(_, next)| next == '"').is_some() {
            cell.push('"');
        } else {
            return Ok((cell, &quoted[i + 1..]));
        }
    }
    Err(IngestError::UnterminatedQuote { line: number })
}

fn parse_cell(cell: &str, line: usize, column: usize) -> Result<f64, IngestError> {
    cell.parse::<f64>().map_err(|_| IngestError::Parse {
        line,
        column,
        value: cell.to_string(),
    })
}

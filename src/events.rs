//! Event recorder report parsing.
//!
//! `ReportEventRecorder.csv` starts with a header line naming the columns,
//! then carries one row per broadcast event. The format never quotes fields,
//! so rows split cleanly on commas.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Column name for the event timestep.
pub const TIME_COLUMN: &str = "Time";
/// Column name for the node the event fired in.
pub const NODE_ID_COLUMN: &str = "Node_ID";
/// Column name for the broadcast event name.
pub const EVENT_NAME_COLUMN: &str = "Event_Name";

#[derive(Error, Debug)]
pub enum EventRecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Event report has no header line")]
    MissingHeader,
    #[error("Line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("Column {0:?} not found in event report")]
    MissingColumn(String),
    #[error("Line {line}: cannot parse {value:?} in column {column:?}")]
    BadValue {
        line: usize,
        column: String,
        value: String,
    },
}

/// A column-indexed event recorder table. Each row remembers its source
/// line so diagnostics stay accurate past blank lines.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecords {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    line_numbers: Vec<usize>,
}

impl EventRecords {
    /// Parses the report text. Every row must have exactly as many fields
    /// as the header; blank lines are skipped.
    pub fn from_csv(text: &str) -> Result<Self, EventRecordError> {
        let mut lines = text.lines().enumerate();
        let columns: Vec<String> = loop {
            match lines.next() {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((_, line)) => break line.split(',').map(|f| f.trim().to_string()).collect(),
                None => return Err(EventRecordError::MissingHeader),
            }
        };

        let mut rows = Vec::new();
        let mut line_numbers = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
            if fields.len() != columns.len() {
                return Err(EventRecordError::FieldCount {
                    line: index + 1,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }
            rows.push(fields);
            line_numbers.push(index + 1);
        }

        Ok(Self {
            columns,
            rows,
            line_numbers,
        })
    }

    pub fn read(path: &Path) -> Result<Self, EventRecordError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv(&text)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, name: &str) -> Result<usize, EventRecordError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EventRecordError::MissingColumn(name.to_string()))
    }

    /// All values of one column as strings, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&str>, EventRecordError> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// The `Time` column parsed as floats.
    pub fn times(&self) -> Result<Vec<f64>, EventRecordError> {
        self.parse_column(TIME_COLUMN)
    }

    /// The `Node_ID` column parsed as node ids.
    pub fn node_ids(&self) -> Result<Vec<i32>, EventRecordError> {
        self.parse_column(NODE_ID_COLUMN)
    }

    fn parse_column<T: std::str::FromStr>(&self, name: &str) -> Result<Vec<T>, EventRecordError> {
        let index = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, fields)| {
                fields[index]
                    .parse()
                    .map_err(|_| EventRecordError::BadValue {
                        line: self.line_numbers[row],
                        column: name.to_string(),
                        value: fields[index].clone(),
                    })
            })
            .collect()
    }

    /// A new table holding only the rows whose `Event_Name` matches.
    pub fn filter_event(&self, event_name: &str) -> Result<Self, EventRecordError> {
        let index = self.column_index(EVENT_NAME_COLUMN)?;
        let mut rows = Vec::new();
        let mut line_numbers = Vec::new();
        for (row, &line) in self.rows.iter().zip(self.line_numbers.iter()) {
            if row[index] == event_name {
                rows.push(row.clone());
                line_numbers.push(line);
            }
        }
        Ok(Self {
            columns: self.columns.clone(),
            rows,
            line_numbers,
        })
    }

    /// Distinct event names with their total counts.
    pub fn event_counts(&self) -> Result<BTreeMap<String, usize>, EventRecordError> {
        let index = self.column_index(EVENT_NAME_COLUMN)?;
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row[index].clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Counts of one event per timestep, ordered by time.
    pub fn counts_by_time(&self, event_name: &str) -> Result<Vec<(f64, usize)>, EventRecordError> {
        let filtered = self.filter_event(event_name)?;
        let mut times = filtered.times()?;
        times.sort_by(|a, b| a.total_cmp(b));

        let mut counts: Vec<(f64, usize)> = Vec::new();
        for time in times {
            match counts.last_mut() {
                Some((last, count)) if *last == time => *count += 1,
                _ => counts.push((time, 1)),
            }
        }
        Ok(counts)
    }
}

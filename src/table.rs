//! In-memory model of one CSV input file.
//!
//! A [`CsvTable`] owns the header, the data rows in file order and (once a
//! primary key is bound) a key→row index. The whole file is read up front:
//! the merge needs random access by key to detect moved rows, so there is
//! nothing to gain from streaming the inputs.
//!
//! Loading enforces the shape contract: a header must exist, its column
//! names must be unique, and every data row must have exactly the header's
//! width. Binding a key enforces uniqueness of key values (the empty string
//! is a legal key, but like any other key it may occur at most once).

use std::collections::{HashMap, HashSet};

use crate::csv;
use crate::error::MergeError;

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One data row of an input file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    /// 1-based record number in the source file; the header is record 1,
    /// so the first data row is 2.
    pub linenr: usize,
    /// Verbatim source text, terminator included.
    pub raw: String,
    /// Decoded fields, indexed by the source file's header.
    pub fields: Vec<String>,
}

impl Row {
    /// The field at `column`, or `None` past the row's width.
    #[must_use]
    pub fn field(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// CsvTable
// ---------------------------------------------------------------------------

/// A fully loaded CSV input file.
#[derive(Clone, Debug)]
pub struct CsvTable {
    /// Display name used in diagnostics and conflict blocks.
    pub name: String,
    /// The header record (record 1).
    pub header: Row,
    /// Data rows in file order.
    pub rows: Vec<Row>,
    /// Index of the primary-key column, once bound.
    key_column: Option<usize>,
    /// key value → index into `rows`, once bound.
    by_key: HashMap<String, usize>,
}

impl CsvTable {
    /// Tokenize and shape-check one input file.
    ///
    /// # Errors
    /// - [`MergeError::HeaderEmpty`] if the input has no records.
    /// - [`MergeError::DuplicateColumn`] if a header name repeats.
    /// - [`MergeError::MalformedRow`] on tokenizer errors or a data row
    ///   whose width differs from the header's.
    pub fn parse(name: &str, input: &str) -> Result<Self, MergeError> {
        let records = csv::parse(input).map_err(|e| match e {
            csv::ParseError::UnterminatedQuote { record } => MergeError::MalformedRow {
                file: name.to_owned(),
                record,
                detail: "unterminated quoted field".to_owned(),
            },
        })?;

        let mut records = records.into_iter();
        let Some(header_rec) = records.next() else {
            return Err(MergeError::HeaderEmpty {
                file: name.to_owned(),
            });
        };

        let mut seen = HashSet::new();
        for column in &header_rec.fields {
            if !seen.insert(column.clone()) {
                return Err(MergeError::DuplicateColumn {
                    file: name.to_owned(),
                    column: column.clone(),
                });
            }
        }

        let width = header_rec.fields.len();
        let header = Row {
            linenr: 1,
            raw: header_rec.raw,
            fields: header_rec.fields,
        };

        let mut rows = Vec::new();
        for (i, rec) in records.enumerate() {
            let linenr = i + 2;
            if rec.fields.len() != width {
                return Err(MergeError::MalformedRow {
                    file: name.to_owned(),
                    record: linenr,
                    detail: format!(
                        "expected {width} fields per the header, found {}",
                        rec.fields.len()
                    ),
                });
            }
            rows.push(Row {
                linenr,
                raw: rec.raw,
                fields: rec.fields,
            });
        }

        Ok(Self {
            name: name.to_owned(),
            header,
            rows,
            key_column: None,
            by_key: HashMap::new(),
        })
    }

    /// Bind the primary-key column and build the key index.
    ///
    /// # Errors
    /// - [`MergeError::MissingKeyColumn`] if `column` is not in the header.
    /// - [`MergeError::DuplicateKey`] if a key value repeats.
    pub fn bind_key(&mut self, column: &str) -> Result<(), MergeError> {
        let Some(index) = self.header.fields.iter().position(|c| c == column) else {
            return Err(MergeError::MissingKeyColumn {
                spec: column.to_owned(),
            });
        };

        let mut by_key = HashMap::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            let key = row.fields[index].clone();
            if let Some(&first) = by_key.get(&key) {
                let first_row: &Row = &self.rows[first];
                return Err(MergeError::DuplicateKey {
                    file: self.name.clone(),
                    key,
                    first: first_row.linenr,
                    second: row.linenr,
                });
            }
            by_key.insert(key, i);
        }

        self.key_column = Some(index);
        self.by_key = by_key;
        Ok(())
    }

    /// Index of the bound primary-key column.
    ///
    /// # Errors
    /// [`MergeError::Internal`] if no key has been bound; the merge entry
    /// point always binds before driving.
    pub fn key_column(&self) -> Result<usize, MergeError> {
        self.key_column
            .ok_or_else(|| MergeError::Internal(format!("{}: key column not bound", self.name)))
    }

    /// The primary-key value of a row by index.
    #[must_use]
    pub fn key_of(&self, row: usize) -> &str {
        let column = self.key_column.unwrap_or(0);
        self.rows[row].field(column).unwrap_or("")
    }

    /// Position of the row carrying `key`, if any.
    #[must_use]
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// True if `column` names a header column.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.header.fields.iter().any(|c| c == column)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Unified error type for the merge pipeline.
//!
//! Defines [`MergeError`], covering every fatal condition the loaders, the
//! merge driver and the output writer can hit. Row-level conflicts are *not*
//! errors — they are rendered into the output stream and reported through
//! the merge summary — so they do not appear here.
//!
//! Each error kind maps to a distinct process exit code via
//! [`MergeError::exit_code`]; the codes are part of the CLI contract.

use std::fmt;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Row-level conflicts were emitted into the output.
pub const EXIT_CONFLICTS: i32 = 1;
/// Malformed input: bad CSV syntax, ragged rows, empty or duplicated headers,
/// or a field that cannot be written under `quote = none`.
pub const EXIT_MALFORMED: i32 = 2;
/// A primary-key value occurred more than once in one input file.
pub const EXIT_DUPLICATE_KEY: i32 = 3;
/// No usable primary-key column.
pub const EXIT_MISSING_KEY: i32 = 4;
/// I/O failure reading inputs or writing output.
pub const EXIT_IO: i32 = 5;
/// A merge-state invariant was violated; this is a bug, not bad input.
pub const EXIT_INTERNAL: i32 = 6;

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// Fatal error raised while loading, merging or writing CSV files.
#[derive(Debug)]
pub enum MergeError {
    /// A record could not be tokenized, or its width disagrees with the
    /// file's header.
    MalformedRow {
        /// Display name of the offending file.
        file: String,
        /// 1-based record number (the header is record 1).
        record: usize,
        /// What exactly was wrong.
        detail: String,
    },

    /// An input file has no header row.
    HeaderEmpty {
        /// Display name of the offending file.
        file: String,
    },

    /// A column name occurs more than once in one file's header.
    DuplicateColumn {
        /// Display name of the offending file.
        file: String,
        /// The repeated column name.
        column: String,
    },

    /// A primary-key value occurs on more than one row of one file.
    DuplicateKey {
        /// Display name of the offending file.
        file: String,
        /// The repeated key value.
        key: String,
        /// Record number of the first occurrence.
        first: usize,
        /// Record number of the second occurrence.
        second: usize,
    },

    /// No candidate from the key specification names a column present in
    /// all three input headers.
    MissingKeyColumn {
        /// The key specification as given (may contain `|` alternatives).
        spec: String,
    },

    /// A field cannot be encoded under `quote = none` because it contains
    /// the delimiter, a quote character or a line terminator.
    Unquotable {
        /// The offending field content.
        field: String,
    },

    /// An I/O error from reading inputs or writing output.
    Io(std::io::Error),

    /// The merge state machine reached a state it proves impossible.
    Internal(String),
}

impl MergeError {
    /// The process exit code for this error kind.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::MalformedRow { .. }
            | Self::HeaderEmpty { .. }
            | Self::DuplicateColumn { .. }
            | Self::Unquotable { .. } => EXIT_MALFORMED,
            Self::DuplicateKey { .. } => EXIT_DUPLICATE_KEY,
            Self::MissingKeyColumn { .. } => EXIT_MISSING_KEY,
            Self::Io(_) => EXIT_IO,
            Self::Internal(_) => EXIT_INTERNAL,
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRow {
                file,
                record,
                detail,
            } => {
                write!(f, "{file}: record {record}: {detail}")
            }
            Self::HeaderEmpty { file } => {
                write!(f, "{file}: file has no header row")
            }
            Self::DuplicateColumn { file, column } => {
                write!(f, "{file}: duplicate column name {column:?} in header")
            }
            Self::DuplicateKey {
                file,
                key,
                first,
                second,
            } => {
                write!(
                    f,
                    "{file}: duplicate primary key {key:?} (records {first} and {second})"
                )
            }
            Self::MissingKeyColumn { spec } => {
                write!(
                    f,
                    "no usable primary key for {spec:?}: the column must be present in \
                     every input file's header"
                )
            }
            Self::Unquotable { field } => {
                write!(
                    f,
                    "field {field:?} needs quoting but quoting is disabled (quote = none)"
                )
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Internal(detail) => {
                write!(f, "internal merge invariant violated: {detail}")
            }
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_malformed_row() {
        let err = MergeError::MalformedRow {
            file: "a.csv".to_owned(),
            record: 7,
            detail: "unterminated quoted field".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("a.csv"));
        assert!(msg.contains("record 7"));
        assert!(msg.contains("unterminated"));
    }

    #[test]
    fn display_duplicate_key() {
        let err = MergeError::DuplicateKey {
            file: "b.csv".to_owned(),
            key: "42".to_owned(),
            first: 3,
            second: 9,
        };
        let msg = format!("{err}");
        assert!(msg.contains("b.csv"));
        assert!(msg.contains("\"42\""));
        assert!(msg.contains("records 3 and 9"));
    }

    #[test]
    fn display_missing_key_column() {
        let err = MergeError::MissingKeyColumn {
            spec: "id|[auto]".to_owned(),
        };
        assert!(format!("{err}").contains("id|[auto]"));
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let malformed = MergeError::MalformedRow {
            file: String::new(),
            record: 1,
            detail: String::new(),
        };
        let dup = MergeError::DuplicateKey {
            file: String::new(),
            key: String::new(),
            first: 1,
            second: 2,
        };
        let missing = MergeError::MissingKeyColumn {
            spec: String::new(),
        };
        let io = MergeError::Io(std::io::Error::other("x"));
        let internal = MergeError::Internal(String::new());

        let codes = [
            malformed.exit_code(),
            dup.exit_code(),
            missing.exit_code(),
            io.exit_code(),
            internal.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn header_errors_share_the_malformed_code() {
        let empty = MergeError::HeaderEmpty {
            file: String::new(),
        };
        let dup_col = MergeError::DuplicateColumn {
            file: String::new(),
            column: String::new(),
        };
        assert_eq!(empty.exit_code(), EXIT_MALFORMED);
        assert_eq!(dup_col.exit_code(), EXIT_MALFORMED);
    }

    #[test]
    fn io_error_has_source() {
        let err = MergeError::Io(std::io::Error::other("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn from_io_error() {
        let err: MergeError = std::io::Error::other("gone").into();
        assert!(matches!(err, MergeError::Io(_)));
    }
}

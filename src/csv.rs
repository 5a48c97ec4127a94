//! CSV tokenizer and encoder.
//!
//! The tokenizer yields one [`Record`] per CSV row, carrying both the decoded
//! field vector and the verbatim text of the row as it appeared in the input
//! (including the original line terminator, and spanning several physical
//! lines when a quoted field embeds a newline). The verbatim text is what
//! lets the merge re-emit untouched rows byte for byte.
//!
//! The encoder re-serializes a field vector under a configured
//! [`QuoteStyle`] and [`LineTerminator`]; the four quote styles and three
//! terminators mirror the conventional CSV dialect knobs.
//!
//! Dialect: comma delimiter, `"` quote, embedded quotes doubled. Input rows
//! may be terminated by LF, CRLF or a lone CR; output uses the configured
//! terminator only.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::Deserialize;

const DELIMITER: char = ',';
const QUOTE: char = '"';

// ---------------------------------------------------------------------------
// Dialect options
// ---------------------------------------------------------------------------

/// Field quoting style for re-encoded output rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    /// Quote only fields that contain the delimiter, a quote or a newline.
    #[default]
    Minimal,
    /// Quote every field.
    All,
    /// Quote every field that does not parse as a number.
    NonNumeric,
    /// Never quote; fields that would need quoting are an error.
    None,
}

impl fmt::Display for QuoteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::All => write!(f, "all"),
            Self::NonNumeric => write!(f, "nonnumeric"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for QuoteStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "minimal" => Ok(Self::Minimal),
            "all" => Ok(Self::All),
            "nonnumeric" => Ok(Self::NonNumeric),
            "none" => Ok(Self::None),
            _ => bail!("invalid quote style '{s}'. Use: minimal, all, nonnumeric, or none"),
        }
    }
}

/// Line terminator for re-encoded output rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    /// `\n`.
    Unix,
    /// `\r\n`.
    Dos,
    /// Whatever the build platform uses.
    #[default]
    Native,
}

impl LineTerminator {
    /// The terminator bytes to append to encoded rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unix => "\n",
            Self::Dos => "\r\n",
            #[cfg(windows)]
            Self::Native => "\r\n",
            #[cfg(not(windows))]
            Self::Native => "\n",
        }
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => write!(f, "unix"),
            Self::Dos => write!(f, "dos"),
            Self::Native => write!(f, "native"),
        }
    }
}

impl FromStr for LineTerminator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "unix" => Ok(Self::Unix),
            "dos" => Ok(Self::Dos),
            "native" => Ok(Self::Native),
            _ => bail!("invalid line terminator '{s}'. Use: unix, dos, or native"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// One tokenized CSV row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Verbatim input text of this row, terminator included (the final row
    /// of a file may lack one).
    pub raw: String,
    /// Decoded fields.
    pub fields: Vec<String>,
}

/// Tokenizer errors. Converted to `MergeError::MalformedRow` by the loader,
/// which adds the file name and record number.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// A quoted field was still open at end of input.
    UnterminatedQuote {
        /// 1-based record number of the offending row.
        record: usize,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedQuote { record } => {
                write!(f, "unterminated quoted field (record {record})")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Tokenize an entire CSV document into records.
///
/// Does not interpret a header and does not enforce uniform widths; both are
/// the loader's job. A trailing terminator does not produce an empty final
/// record.
///
/// # Errors
/// Returns [`ParseError::UnterminatedQuote`] if the input ends inside a
/// quoted field.
pub fn parse(input: &str) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let (fields, next) = parse_record(input, pos, records.len() + 1)?;
        pos = next;
        records.push(Record {
            raw: input[start..pos].to_owned(),
            fields,
        });
    }

    Ok(records)
}

/// Parse one record starting at byte `start`; returns the decoded fields and
/// the byte offset just past the record's terminator.
fn parse_record(
    input: &str,
    start: usize,
    record_nr: usize,
) -> Result<(Vec<String>, usize), ParseError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = input[start..].char_indices().peekable();
    let mut in_quotes = false;

    loop {
        let Some((off, c)) = chars.next() else {
            // End of input terminates the record (no trailing newline).
            if in_quotes {
                return Err(ParseError::UnterminatedQuote { record: record_nr });
            }
            fields.push(field);
            return Ok((fields, input.len()));
        };

        if in_quotes {
            if c == QUOTE {
                if let Some(&(_, QUOTE)) = chars.peek() {
                    chars.next();
                    field.push(QUOTE);
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            QUOTE => {
                // A quote opens quoted mode wherever it appears; stray
                // quotes inside an unquoted field are kept literally by the
                // doubled-quote rule never matching.
                if field.is_empty() {
                    in_quotes = true;
                } else {
                    field.push(c);
                }
            }
            DELIMITER => {
                fields.push(std::mem::take(&mut field));
            }
            '\n' => {
                fields.push(field);
                return Ok((fields, start + off + 1));
            }
            '\r' => {
                fields.push(field);
                // Swallow the LF of a CRLF pair.
                if let Some(&(lf_off, '\n')) = chars.peek() {
                    return Ok((fields, start + lf_off + 1));
                }
                return Ok((fields, start + off + 1));
            }
            _ => field.push(c),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// True if a field must be quoted to survive a round-trip.
fn needs_quoting(field: &str) -> bool {
    field.contains(DELIMITER) || field.contains(QUOTE) || field.contains('\n') || field.contains('\r')
}

/// True if the field looks like a number (for [`QuoteStyle::NonNumeric`]).
fn is_numeric(field: &str) -> bool {
    !field.is_empty() && field.parse::<f64>().is_ok()
}

/// Encode one field under the given quote style.
///
/// # Errors
/// [`QuoteStyle::None`] with a field that [`needs_quoting`] cannot be
/// represented; the caller maps this to `MergeError::Unquotable`.
fn encode_field(out: &mut String, field: &str, quote: QuoteStyle) -> Result<(), String> {
    let quoted = match quote {
        QuoteStyle::Minimal => needs_quoting(field),
        QuoteStyle::All => true,
        QuoteStyle::NonNumeric => !is_numeric(field),
        QuoteStyle::None => {
            if needs_quoting(field) {
                return Err(field.to_owned());
            }
            false
        }
    };

    if quoted {
        out.push(QUOTE);
        for c in field.chars() {
            if c == QUOTE {
                out.push(QUOTE);
            }
            out.push(c);
        }
        out.push(QUOTE);
    } else {
        out.push_str(field);
    }
    Ok(())
}

/// Encode a full row, terminator included.
///
/// # Errors
/// Returns the offending field when `quote` is [`QuoteStyle::None`] and a
/// field contains the delimiter, a quote or a newline.
pub fn encode_row<S: AsRef<str>>(
    fields: &[S],
    quote: QuoteStyle,
    terminator: LineTerminator,
) -> Result<String, String> {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        encode_field(&mut out, field.as_ref(), quote)?;
    }
    out.push_str(terminator.as_str());
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

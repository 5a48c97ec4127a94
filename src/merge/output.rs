//! Output stage: serialize merged rows and render conflict blocks.
//!
//! Unchanged rows pass through as their original text; everything else is
//! re-encoded under the configured quoting and terminator. Conflict blocks
//! use the `>>>>>>` / `======` / `<<<<<<` marker syntax:
//!
//! ```text
//! >>>>>> fileA @4 (key)
//! >>>>>> col = value_in_A
//! <A's row, verbatim>
//! ====== fileB @7 (key)
//! ====== col = value_in_B
//! <B's row, verbatim>
//! <<<<<<
//! ```
//!
//! A side that deleted the row renders as `Deleted @N` (the LCA row's
//! record number) with no row body. Field-marker lines always occupy one
//! physical line: newlines inside displayed values are rendered as the two
//! characters `\n`. Row bodies are verbatim and may span physical lines.

use std::io::Write;

use crate::csv::{self, LineTerminator, QuoteStyle};
use crate::error::MergeError;
use crate::merge::row::{ConflictBlock, ConflictSide, FieldConflict};

/// Serializes merge results to the output stream.
pub struct OutputDriver<W: Write> {
    out: W,
    quote: QuoteStyle,
    terminator: LineTerminator,
    /// Display name of the A-side input, used in conflict blocks.
    name_a: String,
    /// Display name of the B-side input.
    name_b: String,
}

impl<W: Write> OutputDriver<W> {
    /// A driver writing to `out` with the given dialect and side labels.
    pub fn new(
        out: W,
        quote: QuoteStyle,
        terminator: LineTerminator,
        name_a: &str,
        name_b: &str,
    ) -> Self {
        Self {
            out,
            quote,
            terminator,
            name_a: name_a.to_owned(),
            name_b: name_b.to_owned(),
        }
    }

    /// Emit original row text untouched.
    ///
    /// # Errors
    /// I/O only.
    pub fn emit_verbatim(&mut self, text: &str) -> Result<(), MergeError> {
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Encode and emit a field vector as one CSV row.
    ///
    /// # Errors
    /// I/O, or [`MergeError::Unquotable`] under `quote = none`.
    pub fn emit_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), MergeError> {
        let encoded = csv::encode_row(fields, self.quote, self.terminator)
            .map_err(|field| MergeError::Unquotable { field })?;
        self.out.write_all(encoded.as_bytes())?;
        Ok(())
    }

    /// Render one conflict block.
    ///
    /// # Errors
    /// I/O only.
    pub fn emit_conflict(&mut self, block: &ConflictBlock) -> Result<(), MergeError> {
        emit_side(&mut self.out, ">>>>>>", &self.name_a, block, block.a.as_ref(), |f| {
            f.a.as_deref()
        })?;
        emit_side(&mut self.out, "======", &self.name_b, block, block.b.as_ref(), |f| {
            f.b.as_deref()
        })?;
        self.out.write_all(b"<<<<<<\n")?;
        Ok(())
    }

    /// Flush the underlying stream.
    ///
    /// # Errors
    /// I/O only.
    pub fn flush(&mut self) -> Result<(), MergeError> {
        self.out.flush()?;
        Ok(())
    }
}

/// One side of a conflict block: header line, field-marker lines, then the
/// verbatim row body (nothing for a deleted side).
fn emit_side<W: Write>(
    out: &mut W,
    marker: &str,
    name: &str,
    block: &ConflictBlock,
    side: Option<&ConflictSide>,
    value_of: impl Fn(&FieldConflict) -> Option<&str>,
) -> Result<(), MergeError> {
    match side {
        Some(row) => {
            writeln!(
                out,
                "{marker} {name} @{} ({})",
                row.linenr,
                quote_newlines(&block.key)
            )?;
        }
        None => {
            writeln!(
                out,
                "{marker} {name} Deleted @{}",
                block.lca_linenr.unwrap_or(0)
            )?;
        }
    }

    for field in &block.fields {
        let shown = value_of(field).map_or_else(|| "None".to_owned(), quote_newlines);
        writeln!(out, "{marker} {} = {shown}", field.column)?;
    }

    if let Some(row) = side {
        out.write_all(row.raw.as_bytes())?;
    }
    Ok(())
}

/// Keep marker lines on one physical line: every newline sequence in a
/// displayed value becomes the two characters `\n`.
fn quote_newlines(text: &str) -> String {
    text.replace("\r\n", "\\n").replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::row::FieldConflict;

    fn driver(buf: &mut Vec<u8>) -> OutputDriver<&mut Vec<u8>> {
        OutputDriver::new(
            buf,
            QuoteStyle::Minimal,
            LineTerminator::Unix,
            "input",
            "input",
        )
    }

    fn conflict_fixture() -> ConflictBlock {
        ConflictBlock {
            key: "1".to_owned(),
            lca_linenr: Some(2),
            a: Some(ConflictSide {
                linenr: 2,
                raw: "1,b\n".to_owned(),
            }),
            b: Some(ConflictSide {
                linenr: 2,
                raw: "1,c\n".to_owned(),
            }),
            fields: vec![FieldConflict {
                column: "v".to_owned(),
                a: Some("b".to_owned()),
                b: Some("c".to_owned()),
            }],
        }
    }

    #[test]
    fn verbatim_passthrough() {
        let mut buf = Vec::new();
        driver(&mut buf).emit_verbatim("1,a\r\n").unwrap();
        assert_eq!(buf, b"1,a\r\n");
    }

    #[test]
    fn row_encoding_uses_dialect() {
        let mut buf = Vec::new();
        let mut d = OutputDriver::new(
            &mut buf,
            QuoteStyle::All,
            LineTerminator::Dos,
            "input",
            "input",
        );
        d.emit_row(&["1", "a"]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "\"1\",\"a\"\r\n");
    }

    #[test]
    fn unquotable_field_is_reported() {
        let mut buf = Vec::new();
        let mut d = OutputDriver::new(
            &mut buf,
            QuoteStyle::None,
            LineTerminator::Unix,
            "input",
            "input",
        );
        let err = d.emit_row(&["a,b"]).unwrap_err();
        assert!(matches!(err, MergeError::Unquotable { .. }));
    }

    #[test]
    fn conflict_block_format_is_exact() {
        let mut buf = Vec::new();
        driver(&mut buf).emit_conflict(&conflict_fixture()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            ">>>>>> input @2 (1)\n\
             >>>>>> v = b\n\
             1,b\n\
             ====== input @2 (1)\n\
             ====== v = c\n\
             1,c\n\
             <<<<<<\n"
        );
    }

    #[test]
    fn deleted_side_renders_deleted_label_and_no_body() {
        let mut block = conflict_fixture();
        block.a = None;
        block.fields[0].a = None;
        let mut buf = Vec::new();
        driver(&mut buf).emit_conflict(&block).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            ">>>>>> input Deleted @2\n\
             >>>>>> v = None\n\
             ====== input @2 (1)\n\
             ====== v = c\n\
             1,c\n\
             <<<<<<\n"
        );
    }

    #[test]
    fn embedded_newlines_stay_on_one_marker_line() {
        let mut block = conflict_fixture();
        block.fields[0].a = Some("x\ny".to_owned());
        block.fields[0].b = Some("p\r\nq".to_owned());
        let mut buf = Vec::new();
        driver(&mut buf).emit_conflict(&block).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(">>>>>> v = x\\ny\n"));
        assert!(text.contains("====== v = p\\nq\n"));
    }

    #[test]
    fn side_names_appear_in_block_headers() {
        let mut buf = Vec::new();
        let mut d = OutputDriver::new(
            &mut buf,
            QuoteStyle::Minimal,
            LineTerminator::Unix,
            "a.csv",
            "b.csv",
        );
        d.emit_conflict(&conflict_fixture()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(">>>>>> a.csv @2 (1)"));
        assert!(text.contains("====== b.csv @2 (1)"));
    }

    #[test]
    fn multiline_row_bodies_are_verbatim() {
        let mut block = conflict_fixture();
        block.a = Some(ConflictSide {
            linenr: 2,
            raw: "1,\"x\ny\"\n".to_owned(),
        });
        let mut buf = Vec::new();
        driver(&mut buf).emit_conflict(&block).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("1,\"x\ny\"\n======"));
    }
}

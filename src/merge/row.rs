//! Field-level three-way merge of one matched row.
//!
//! Given the (up to three) rows sharing a primary key and the output
//! schema's column maps, decide what the output row is: verbatim original
//! text, a re-encoded merged field vector, a conflict block, or nothing at
//! all for a clean deletion. The tagged [`RowOutcome`] drives the output
//! stage.

use tracing::debug;

use crate::headers::OutputSchema;
use crate::table::Row;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// One side of a conflict block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictSide {
    /// Record number of the side's row in its source file.
    pub linenr: usize,
    /// Verbatim row text.
    pub raw: String,
}

/// One column that could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldConflict {
    /// Output column name.
    pub column: String,
    /// A's value; `None` when A's row or column is absent.
    pub a: Option<String>,
    /// B's value; `None` when B's row or column is absent.
    pub b: Option<String>,
}

/// A whole-row conflict, rendered as a marker block in the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictBlock {
    /// The row's primary key.
    pub key: String,
    /// Record number of the LCA row, used for `Deleted @N` labels.
    pub lca_linenr: Option<usize>,
    /// A's row, or `None` if deleted in A.
    pub a: Option<ConflictSide>,
    /// B's row, or `None` if deleted in B.
    pub b: Option<ConflictSide>,
    /// The conflicting columns in output order.
    pub fields: Vec<FieldConflict>,
}

/// What the merge of one matched row produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowOutcome {
    /// The row is unchanged; emit this original text untouched.
    Verbatim(String),
    /// Re-encode these merged field values.
    Merged(Vec<String>),
    /// The row conflicts; emit a marker block.
    Conflict(ConflictBlock),
    /// The row was deleted without conflict; emit nothing.
    Deleted,
}

// ---------------------------------------------------------------------------
// choose3
// ---------------------------------------------------------------------------

/// Classic three-way value resolution. `None` means the value is absent
/// (row deleted on that side, or column absent from that file).
///
/// Returns `Err(())` when A and B changed the value in incompatible ways.
fn choose3<'v>(
    lca: Option<&'v str>,
    a: Option<&'v str>,
    b: Option<&'v str>,
) -> Result<Option<&'v str>, ()> {
    if lca == a {
        return Ok(b);
    }
    if lca == b {
        return Ok(a);
    }
    if a == b {
        return Ok(a);
    }
    Err(())
}

/// The value a row supplies for an output column, going through the
/// column map for that side.
fn lookup<'r>(row: Option<&'r Row>, column: Option<usize>) -> Option<&'r str> {
    row?.field(column?)
}

/// Two row versions are compatible when either is absent, or their raw
/// text matches, or (raw text aside) their decoded fields match.
fn compatible(x: Option<&Row>, y: Option<&Row>) -> bool {
    let (Some(x), Some(y)) = (x, y) else {
        return true;
    };
    x.raw == y.raw || x.fields == y.fields
}

// ---------------------------------------------------------------------------
// merge_row
// ---------------------------------------------------------------------------

/// Merge one matched row triple into a [`RowOutcome`].
///
/// `reformat_all` disables the verbatim fast path (it is also forced on by
/// the caller whenever the headers needed remapping, since raw text is laid
/// out against its source schema).
#[must_use]
pub fn merge_row(
    schema: &OutputSchema,
    key: &str,
    lca: Option<&Row>,
    a: Option<&Row>,
    b: Option<&Row>,
    reformat_all: bool,
) -> RowOutcome {
    // A row counts as deleted when the LCA has it but at least one side
    // dropped it; the field walk below still runs so that a deletion
    // conflicting with an edit is caught.
    let is_delete = lca.is_some() && !(a.is_some() && b.is_some());

    if compatible(lca, a) && compatible(lca, b) && compatible(a, b) {
        if is_delete {
            debug!(key, "row deleted on both sides of the change");
            return RowOutcome::Deleted;
        }
        if !reformat_all
            && let Some(row) = a.or(b)
        {
            return RowOutcome::Verbatim(row.raw.clone());
        }
    }

    let mut merged = Vec::with_capacity(schema.columns.len());
    let mut conflicts = Vec::new();

    for map in &schema.columns {
        let value_lca = lookup(lca, map.lca);
        let value_a = lookup(a, map.a);
        let value_b = lookup(b, map.b);

        match choose3(value_lca, value_a, value_b) {
            Ok(value) => merged.push(value.unwrap_or("").to_owned()),
            Err(()) => {
                conflicts.push(FieldConflict {
                    column: map.name.clone(),
                    a: value_a.map(str::to_owned),
                    b: value_b.map(str::to_owned),
                });
                merged.push(String::new());
            }
        }
    }

    if !conflicts.is_empty() {
        debug!(key, columns = conflicts.len(), "row conflict");
        return RowOutcome::Conflict(ConflictBlock {
            key: key.to_owned(),
            lca_linenr: lca.map(|r| r.linenr),
            a: a.map(|r| ConflictSide {
                linenr: r.linenr,
                raw: r.raw.clone(),
            }),
            b: b.map(|r| ConflictSide {
                linenr: r.linenr,
                raw: r.raw.clone(),
            }),
            fields: conflicts,
        });
    }

    if is_delete {
        debug!(key, "row deleted on one side, unchanged on the other");
        return RowOutcome::Deleted;
    }

    RowOutcome::Merged(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

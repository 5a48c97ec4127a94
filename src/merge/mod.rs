//! Three-way merge driver.
//!
//! One loop walks the LCA, A and B row streams behind three cursors and
//! decides, at every step, which rows can be matched and emitted next. The
//! rules, first match wins:
//!
//! 1. **Collect** — the current row of A (then B) was pre-paired with a
//!    deferred LCA row; the deferred match is complete, emit it.
//! 2. **Aligned** — all three heads share a key; merge and advance all
//!    three. This is the hot path for files in mostly the same order.
//! 3. **Insert** — A's (then B's) head key does not occur in the LCA's
//!    remaining rows: the row is new. Its counterpart in the other side, if
//!    any, is pulled forward into the merge.
//! 4. **Delete** — the LCA's head key no longer occurs in A (then B): the
//!    row was deleted on that side. The surviving side's row joins the
//!    merge so a delete-vs-edit clash is caught.
//! 5. **Resync** — every head key still occurs everywhere, but the heads
//!    disagree: something moved. Whichever key resynchronizes soonest
//!    decides: if the LCA's head reappears in the changed side *further*
//!    ahead than that side's head reappears in the LCA, the LCA head moved
//!    forward — defer it to the backlog (pre-pairing it with the rows that
//!    will collect it); otherwise the changed side's head moved backwards —
//!    force-emit it now, pulling its counterparts forward.
//!
//! Anything else means the state tables are corrupt and the merge aborts
//! with an internal-invariant error.
//!
//! Output row order follows consumption order in A and B; the LCA never
//! constrains ordering. All tie-breaks prefer A, so the merge is
//! deterministic for a given set of inputs and options.

pub mod output;
pub mod row;

use std::collections::HashMap;
use std::io::Write;

use tracing::debug;

use crate::csv::{LineTerminator, QuoteStyle};
use crate::cursor::Cursor;
use crate::error::MergeError;
use crate::headers::{OutputSchema, merge_headers};
use crate::key::resolve_key;
use crate::table::CsvTable;

use output::OutputDriver;
use row::{RowOutcome, merge_row};

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// One input to the merge: a display name (used in diagnostics and conflict
/// blocks) and the file's full contents.
#[derive(Clone, Copy, Debug)]
pub struct MergeInput<'a> {
    /// Display name; conventionally the input path, or `input`.
    pub name: &'a str,
    /// The file's entire text.
    pub text: &'a str,
}

impl<'a> MergeInput<'a> {
    /// An input with an explicit display name.
    #[must_use]
    pub const fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }

    /// An input with the default display name `input`.
    #[must_use]
    pub const fn unnamed(text: &'a str) -> Self {
        Self {
            name: "input",
            text,
        }
    }
}

/// Merge configuration, threaded through the loaders, the driver and the
/// writer. No ambient state: everything the merge depends on is here.
#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Primary-key specification: column names separated by `|`, tried in
    /// order; `[auto]` asks for guessing.
    pub key: String,
    /// Quoting style for re-encoded rows.
    pub quote: QuoteStyle,
    /// Line terminator for re-encoded rows.
    pub terminator: LineTerminator,
    /// Re-encode every row, even rows that did not change.
    pub reformat_all: bool,
}

impl MergeOptions {
    /// Options with the given key specification and default dialect.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            quote: QuoteStyle::default(),
            terminator: LineTerminator::default(),
            reformat_all: false,
        }
    }
}

/// What a completed merge produced, beyond the output stream itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of row-level conflict blocks emitted.
    pub conflicts: usize,
    /// Number of header-reorder collisions resolved in A's favour.
    pub reorder_conflicts: usize,
}

impl MergeSummary {
    /// True when no conflict blocks were emitted.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

/// Perform a full three-way merge, writing the result to `out`.
///
/// # Errors
/// Any [`MergeError`]: malformed input, duplicate keys, no usable key
/// column, I/O, or an internal invariant violation. Row-level conflicts are
/// *not* errors; they are written into the output and counted in the
/// summary.
pub fn merge3<W: Write>(
    lca: MergeInput<'_>,
    a: MergeInput<'_>,
    b: MergeInput<'_>,
    options: &MergeOptions,
    out: W,
) -> Result<MergeSummary, MergeError> {
    let mut table_lca = CsvTable::parse(lca.name, lca.text)?;
    let mut table_a = CsvTable::parse(a.name, a.text)?;
    let mut table_b = CsvTable::parse(b.name, b.text)?;

    let schema = merge_headers(
        &table_lca.header.fields,
        &table_a.header.fields,
        &table_b.header.fields,
    );

    let key = resolve_key(&options.key, &schema, &table_lca, &table_a, &table_b)?;
    debug!(%key, "primary key resolved");

    table_lca.bind_key(&key)?;
    table_a.bind_key(&key)?;
    table_b.bind_key(&key)?;

    // Raw row text is laid out against its source schema, so any header
    // remapping forces every row through re-encoding.
    let reformat_all = options.reformat_all || schema.need_remapping;

    let mut writer = OutputDriver::new(out, options.quote, options.terminator, a.name, b.name);

    // Header: verbatim when all three agree byte for byte, merged otherwise.
    if !reformat_all
        && table_lca.header.raw == table_a.header.raw
        && table_a.header.raw == table_b.header.raw
    {
        writer.emit_verbatim(&table_a.header.raw)?;
    } else {
        writer.emit_row(&schema.names())?;
    }

    let mut driver = Driver {
        lca: Side::new(&table_lca),
        a: Side::new(&table_a),
        b: Side::new(&table_b),
        schema: &schema,
        writer,
        reformat_all,
        conflicts: 0,
        deferred_pairs: HashMap::new(),
    };

    while !driver.at_eof() {
        driver.step()?;
    }
    driver.check_drained()?;
    driver.writer.flush()?;

    Ok(MergeSummary {
        conflicts: driver.conflicts,
        reorder_conflicts: schema.reorder_conflicts,
    })
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// One input file with its cursor.
struct Side<'t> {
    table: &'t CsvTable,
    cursor: Cursor,
}

impl<'t> Side<'t> {
    fn new(table: &'t CsvTable) -> Self {
        Self {
            table,
            cursor: Cursor::new(table),
        }
    }

    fn current(&self) -> Option<usize> {
        self.cursor.current()
    }

    fn current_key(&self) -> Option<String> {
        self.cursor.current_key(self.table).map(ToOwned::to_owned)
    }

    /// Next matchable occurrence of `key` with its distance.
    fn find(&self, key: &str) -> Option<(usize, usize)> {
        self.cursor.find_next_match(self.table, key)
    }

    /// Distance to the next use of `key` in this file (backlog counts as
    /// zero); `None` when the key is spent or absent.
    fn relevance(&self, key: &str) -> Option<usize> {
        self.cursor.relevance(self.table, key)
    }
}

/// The merge state machine.
struct Driver<'t, W: Write> {
    lca: Side<'t>,
    a: Side<'t>,
    b: Side<'t>,
    schema: &'t OutputSchema,
    writer: OutputDriver<W>,
    reformat_all: bool,
    conflicts: usize,
    /// Deferred LCA row → the forward rows in A and B recorded for it when
    /// it was pushed to the backlog.
    deferred_pairs: HashMap<usize, (Option<usize>, Option<usize>)>,
}

impl<W: Write> Driver<'_, W> {
    fn at_eof(&self) -> bool {
        self.lca.cursor.at_eof() && self.a.cursor.at_eof() && self.b.cursor.at_eof()
    }

    /// After the loop: every backlog must have been collected.
    fn check_drained(&self) -> Result<(), MergeError> {
        for (label, side) in [("LCA", &self.lca), ("A", &self.a), ("B", &self.b)] {
            if !side.cursor.is_drained() {
                return Err(MergeError::Internal(format!(
                    "{label} backlog still holds {} row(s) at end of merge",
                    side.cursor.backlog_len()
                )));
            }
        }
        Ok(())
    }

    /// The recorded counterparts of a deferred LCA row.
    fn take_pair(&mut self, lca_row: usize) -> Result<(Option<usize>, Option<usize>), MergeError> {
        self.deferred_pairs.remove(&lca_row).ok_or_else(|| {
            MergeError::Internal(format!("deferred LCA row {lca_row} has no recorded pair"))
        })
    }

    /// Make one step of progress: emit at most one output row and advance
    /// whichever cursors took part.
    fn step(&mut self) -> Result<(), MergeError> {
        // Rule 1: collect a deferred LCA row through its pre-paired match.
        if let Some(ai) = self.a.current()
            && let Some(li) = self.a.cursor.pending_match(ai)
        {
            let key = self.a.table.key_of(ai).to_owned();
            debug!(%key, lca_row = li, "collect deferred LCA row via A");
            let (_, bi) = self.take_pair(li)?;
            self.emit(Some(li), Some(ai), bi)?;
            self.consume(&key, Some(li), Some(ai), bi);
            return Ok(());
        }
        if let Some(bi) = self.b.current()
            && let Some(li) = self.b.cursor.pending_match(bi)
        {
            let key = self.b.table.key_of(bi).to_owned();
            debug!(%key, lca_row = li, "collect deferred LCA row via B");
            let (ai, _) = self.take_pair(li)?;
            self.emit(Some(li), ai, Some(bi))?;
            self.consume(&key, Some(li), ai, Some(bi));
            return Ok(());
        }

        let k_l = self.lca.current_key();
        let k_a = self.a.current_key();
        let k_b = self.b.current_key();
        debug!(?k_l, ?k_a, ?k_b, "step");

        // Rule 2: all aligned.
        if k_l == k_a
            && k_a == k_b
            && let Some(key) = k_l.clone()
        {
            let (li, ai, bi) = (self.lca.current(), self.a.current(), self.b.current());
            debug!(%key, "aligned on all three");
            self.emit(li, ai, bi)?;
            self.consume(&key, li, ai, bi);
            return Ok(());
        }

        // Rule 3: inserts. A key with no remaining relevance in the LCA
        // (not deferred, not ahead) is new; its counterpart on the other
        // side, if any, joins the merge.
        if let Some(key) = &k_a
            && self.lca.relevance(key).is_none()
        {
            let ai = self.a.current();
            let bi = self.b.find(key).map(|(i, _)| i);
            debug!(%key, "insert from A");
            self.emit(None, ai, bi)?;
            self.consume(key, None, ai, bi);
            return Ok(());
        }
        if let Some(key) = &k_b
            && self.lca.relevance(key).is_none()
        {
            let ai = self.a.find(key).map(|(i, _)| i);
            let bi = self.b.current();
            debug!(%key, "insert from B");
            self.emit(None, ai, bi)?;
            self.consume(key, None, ai, bi);
            return Ok(());
        }

        // Rules 4 and 5 need the LCA head; if the LCA is drained and
        // neither insert fired, the state tables are corrupt.
        let Some(key_l) = k_l else {
            return Err(MergeError::Internal(
                "LCA drained but neither side's head is an insert".to_owned(),
            ));
        };
        let li = self.lca.current();

        // Rule 4: deletions.
        let in_a = self.a.find(&key_l);
        let in_b = self.b.find(&key_l);
        let Some((a_idx, lca_dist_in_a)) = in_a else {
            debug!(key = %key_l, "deleted in A");
            let bi = in_b.map(|(i, _)| i);
            self.emit(li, None, bi)?;
            self.consume(&key_l, li, None, bi);
            return Ok(());
        };
        let Some((b_idx, lca_dist_in_b)) = in_b else {
            debug!(key = %key_l, "deleted in B");
            self.emit(li, Some(a_idx), None)?;
            self.consume(&key_l, li, Some(a_idx), None);
            return Ok(());
        };

        // Rule 5: resync. Every key is still present everywhere; decide
        // whether the disagreeing head moved forward (defer the LCA row)
        // or backward (force-emit the moved row now).
        if k_a.as_deref() != Some(key_l.as_str()) {
            let Some(key_a) = k_a else {
                return Err(MergeError::Internal(
                    "A drained while its rows still match the LCA".to_owned(),
                ));
            };
            let Some((a_match_in_lca, a_dist_in_lca)) =
                self.lca.find(&key_a)
            else {
                return Err(MergeError::Internal(
                    "resync reached with A's head unmatched in the LCA".to_owned(),
                ));
            };

            if lca_dist_in_a > a_dist_in_lca {
                self.defer_lca_head(&key_l, &k_b, a_idx, b_idx)?;
                return Ok(());
            }

            // A's head moved backwards: emit it now, pulling its LCA and B
            // counterparts forward.
            debug!(key = %key_a, "forced emit of A's head");
            let ai = self.a.current();
            let bi = self.b.find(&key_a).map(|(i, _)| i);
            self.emit(Some(a_match_in_lca), ai, bi)?;
            self.consume(&key_a, Some(a_match_in_lca), ai, bi);
            return Ok(());
        }

        // A agrees with the LCA, so B's head is the one that moved.
        let Some(key_b) = k_b else {
            return Err(MergeError::Internal(
                "B drained while its rows still match the LCA".to_owned(),
            ));
        };
        if key_b == key_l {
            return Err(MergeError::Internal(
                "all heads equal yet the aligned rule did not fire".to_owned(),
            ));
        }
        let Some((b_match_in_lca, b_dist_in_lca)) = self.lca.find(&key_b) else {
            return Err(MergeError::Internal(
                "resync reached with B's head unmatched in the LCA".to_owned(),
            ));
        };

        if lca_dist_in_b > b_dist_in_lca {
            self.defer_lca_head(&key_l, &k_a, a_idx, b_idx)?;
            return Ok(());
        }

        debug!(key = %key_b, "forced emit of B's head");
        let bi = self.b.current();
        let ai = self.a.find(&key_b).map(|(i, _)| i);
        self.emit(Some(b_match_in_lca), ai, bi)?;
        self.consume(&key_b, Some(b_match_in_lca), ai, bi);
        Ok(())
    }

    /// Defer the LCA head to the backlog, pre-pairing it with the rows in
    /// A and B that will later collect it. A side whose head carries the
    /// same key is deferred along with it.
    fn defer_lca_head(
        &mut self,
        key_l: &str,
        other_head: &Option<String>,
        a_idx: usize,
        b_idx: usize,
    ) -> Result<(), MergeError> {
        let Some(li) = self.lca.current() else {
            return Err(MergeError::Internal(
                "deferring the LCA head at EOF".to_owned(),
            ));
        };
        debug!(key = key_l, lca_row = li, "defer LCA row to backlog");

        self.lca.cursor.move_to_backlog(self.lca.table);
        if other_head.as_deref() == Some(key_l) {
            // The side still aligned with the LCA defers its head too; the
            // recorded pairing will fish it back out of that backlog.
            if self.a.current_key().as_deref() == Some(key_l) {
                self.a.cursor.move_to_backlog(self.a.table);
            } else {
                self.b.cursor.move_to_backlog(self.b.table);
            }
        }

        self.a.cursor.set_pending_match(a_idx, li);
        self.b.cursor.set_pending_match(b_idx, li);
        self.deferred_pairs.insert(li, (Some(a_idx), Some(b_idx)));
        Ok(())
    }

    /// Merge one matched triple and hand the outcome to the writer.
    fn emit(
        &mut self,
        li: Option<usize>,
        ai: Option<usize>,
        bi: Option<usize>,
    ) -> Result<(), MergeError> {
        let row_l = li.map(|i| &self.lca.table.rows[i]);
        let row_a = ai.map(|i| &self.a.table.rows[i]);
        let row_b = bi.map(|i| &self.b.table.rows[i]);

        let key = li
            .map(|i| self.lca.table.key_of(i))
            .or_else(|| ai.map(|i| self.a.table.key_of(i)))
            .or_else(|| bi.map(|i| self.b.table.key_of(i)))
            .ok_or_else(|| MergeError::Internal("merging three absent rows".to_owned()))?
            .to_owned();

        for (label, table, idx) in [
            ("LCA", self.lca.table, li),
            ("A", self.a.table, ai),
            ("B", self.b.table, bi),
        ] {
            if let Some(i) = idx
                && table.key_of(i) != key
            {
                return Err(MergeError::Internal(format!(
                    "matched rows disagree on key: {label} has {:?}, expected {key:?}",
                    table.key_of(i)
                )));
            }
        }

        let outcome = merge_row(self.schema, &key, row_l, row_a, row_b, self.reformat_all);
        match outcome {
            RowOutcome::Verbatim(text) => self.writer.emit_verbatim(&text),
            RowOutcome::Merged(fields) => self.writer.emit_row(&fields),
            RowOutcome::Conflict(block) => {
                self.conflicts += 1;
                self.writer.emit_conflict(&block)
            }
            RowOutcome::Deleted => Ok(()),
        }
    }

    /// Retire the matched rows on every side.
    fn consume(&mut self, key: &str, li: Option<usize>, ai: Option<usize>, bi: Option<usize>) {
        self.lca.cursor.consume(key, li);
        self.a.cursor.consume(key, ai);
        self.b.cursor.consume(key, bi);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

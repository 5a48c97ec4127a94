//! Per-file merge cursor: position, consumed marks, backlog and the
//! distance-to-next-match oracle.
//!
//! The driver walks each file with one [`Cursor`]. Rows leave the stream in
//! one of three ways:
//!
//! - consumed at the cursor (the common case),
//! - consumed *ahead* of the cursor, when a matching row was pulled forward
//!   to pair with another file's row (the cursor later skips it), or
//! - deferred into the backlog, when the row's counterpart moved later in
//!   another file and the match must wait.
//!
//! Backlogged LCA rows are pre-paired with the forward row that will
//! eventually collect them ([`Cursor::set_pending_match`]); the forward
//! search skips pre-paired rows so no row is ever matched twice.
//!
//! Every operation is O(1) amortized: lookups go through the table's key
//! index, and the cursor's skip loop touches each row at most once over the
//! whole merge.

use std::collections::BTreeMap;

use crate::table::CsvTable;

/// Cursor state over one file's row sequence.
#[derive(Debug)]
pub struct Cursor {
    /// Index into `rows` of the next row to consider; past the end at EOF.
    pos: usize,
    /// Rows already contributed to the output (possibly via lookahead).
    consumed: Vec<bool>,
    /// Deferred rows: key → row index, all before `pos`.
    backlog: BTreeMap<String, usize>,
    /// Pre-recorded pairing: row index → LCA row index it will be merged
    /// with once the cursor reaches it. Unused on the LCA's own cursor.
    pending_match: Vec<Option<usize>>,
}

impl Cursor {
    /// A cursor at the first data row of `table`.
    #[must_use]
    pub fn new(table: &CsvTable) -> Self {
        Self {
            pos: 0,
            consumed: vec![false; table.rows.len()],
            backlog: BTreeMap::new(),
            pending_match: vec![None; table.rows.len()],
        }
    }

    /// True once the cursor has passed the last row. The backlog may still
    /// hold deferred rows; see [`Cursor::is_drained`].
    #[must_use]
    pub fn at_eof(&self) -> bool {
        self.pos >= self.consumed.len()
    }

    /// True when the cursor is past the end *and* the backlog is empty.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.at_eof() && self.backlog.is_empty()
    }

    /// Index of the current row, or `None` at EOF.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        if self.at_eof() { None } else { Some(self.pos) }
    }

    /// Key of the current row, or `None` at EOF.
    #[must_use]
    pub fn current_key<'t>(&self, table: &'t CsvTable) -> Option<&'t str> {
        self.current().map(|i| table.key_of(i))
    }

    /// Move to the next not-yet-consumed row.
    pub fn advance(&mut self) {
        self.pos += 1;
        while self.pos < self.consumed.len() && self.consumed[self.pos] {
            self.pos += 1;
        }
    }

    /// Defer the current row into the backlog and advance.
    pub fn move_to_backlog(&mut self, table: &CsvTable) {
        if let Some(i) = self.current() {
            self.backlog.insert(table.key_of(i).to_owned(), i);
            self.advance();
        }
    }

    /// Row index held in the backlog for `key`, if any.
    #[must_use]
    pub fn backlog_get(&self, key: &str) -> Option<usize> {
        self.backlog.get(key).copied()
    }

    /// Record that row `row` is pre-paired with the LCA backlog row
    /// `lca_row` and must not be matched against anything else.
    pub fn set_pending_match(&mut self, row: usize, lca_row: usize) {
        self.pending_match[row] = Some(lca_row);
    }

    /// The LCA backlog row pre-paired with `row`, if any.
    #[must_use]
    pub fn pending_match(&self, row: usize) -> Option<usize> {
        self.pending_match.get(row).copied().flatten()
    }

    /// Find the next matchable occurrence of `key` at or ahead of the
    /// cursor, with its distance in rows.
    ///
    /// Rows that are consumed, backlogged, or pre-paired with an LCA
    /// backlog row are not matchable. Backlogged rows are reachable
    /// through [`Cursor::backlog_get`] instead.
    #[must_use]
    pub fn find_next_match(&self, table: &CsvTable, key: &str) -> Option<(usize, usize)> {
        let idx = table.position_of(key)?;
        if self.consumed[idx] || self.pending_match[idx].is_some() {
            return None;
        }
        if self.backlog.get(key) == Some(&idx) {
            return None;
        }
        debug_assert!(idx >= self.pos, "unconsumed row behind the cursor");
        if idx < self.pos {
            return None;
        }
        Some((idx, idx - self.pos))
    }

    /// Distance from the cursor to the next use of `key`: 0 for a
    /// backlogged row, the forward distance for an unseen row, `None`
    /// (infinity) when the key is spent or absent.
    #[must_use]
    pub fn relevance(&self, table: &CsvTable, key: &str) -> Option<usize> {
        if self.backlog.contains_key(key) {
            return Some(0);
        }
        self.find_next_match(table, key).map(|(_, d)| d)
    }

    /// Finish processing `row` for `key`: remove it from the backlog if it
    /// lives there, otherwise mark it consumed (advancing if it is the
    /// current row).
    pub fn consume(&mut self, key: &str, row: Option<usize>) {
        let Some(idx) = row else {
            // The row was deleted from this file; nothing to retire.
            return;
        };
        self.consumed[idx] = true;
        if self.backlog.get(key) == Some(&idx) {
            self.backlog.remove(key);
            return;
        }
        if idx == self.pos {
            self.advance();
        }
    }

    /// Number of rows still waiting in the backlog.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CsvTable;

    fn keyed_table(input: &str) -> CsvTable {
        let mut t = CsvTable::parse("input", input).unwrap();
        t.bind_key("k").unwrap();
        t
    }

    #[test]
    fn walks_rows_in_order() {
        let t = keyed_table("k\n1\n2\n3\n");
        let mut c = Cursor::new(&t);
        assert_eq!(c.current_key(&t), Some("1"));
        c.consume("1", c.current());
        assert_eq!(c.current_key(&t), Some("2"));
        c.consume("2", c.current());
        c.consume("3", c.current());
        assert!(c.at_eof());
        assert!(c.is_drained());
        assert_eq!(c.current_key(&t), None);
    }

    #[test]
    fn backlog_defers_and_is_collected_by_key() {
        let t = keyed_table("k\n1\n2\n");
        let mut c = Cursor::new(&t);
        c.move_to_backlog(&t);
        assert_eq!(c.current_key(&t), Some("2"));
        assert_eq!(c.backlog_get("1"), Some(0));
        assert_eq!(c.relevance(&t, "1"), Some(0));

        c.consume("1", Some(0));
        assert_eq!(c.backlog_get("1"), None);
        assert!(!c.is_drained(), "row 2 still pending");
        c.consume("2", c.current());
        assert!(c.is_drained());
    }

    #[test]
    fn consume_ahead_is_skipped_later() {
        let t = keyed_table("k\n1\n2\n3\n");
        let mut c = Cursor::new(&t);
        // Row "2" is pulled forward by another file's cursor.
        c.consume("2", Some(1));
        c.consume("1", c.current());
        // The cursor skips the consumed row and lands on "3".
        assert_eq!(c.current_key(&t), Some("3"));
    }

    #[test]
    fn find_next_match_distances() {
        let t = keyed_table("k\n1\n2\n3\n");
        let c = Cursor::new(&t);
        assert_eq!(c.find_next_match(&t, "1"), Some((0, 0)));
        assert_eq!(c.find_next_match(&t, "3"), Some((2, 2)));
        assert_eq!(c.find_next_match(&t, "9"), None);
    }

    #[test]
    fn consumed_rows_are_not_matchable() {
        let t = keyed_table("k\n1\n2\n");
        let mut c = Cursor::new(&t);
        c.consume("2", Some(1));
        assert_eq!(c.find_next_match(&t, "2"), None);
        assert_eq!(c.relevance(&t, "2"), None);
    }

    #[test]
    fn backlogged_rows_are_not_forward_matches() {
        let t = keyed_table("k\n1\n2\n");
        let mut c = Cursor::new(&t);
        c.move_to_backlog(&t);
        assert_eq!(c.find_next_match(&t, "1"), None);
        assert_eq!(c.relevance(&t, "1"), Some(0));
    }

    #[test]
    fn pending_match_blocks_rematching() {
        let t = keyed_table("k\n1\n2\n");
        let mut c = Cursor::new(&t);
        c.set_pending_match(1, 7);
        assert_eq!(c.find_next_match(&t, "2"), None);
        assert_eq!(c.pending_match(1), Some(7));
        assert_eq!(c.pending_match(0), None);
    }

    #[test]
    fn consume_none_is_a_no_op() {
        let t = keyed_table("k\n1\n");
        let mut c = Cursor::new(&t);
        c.consume("absent", None);
        assert_eq!(c.current_key(&t), Some("1"));
    }

    #[test]
    fn empty_table_starts_drained() {
        let t = keyed_table("k\n");
        let c = Cursor::new(&t);
        assert!(c.at_eof());
        assert!(c.is_drained());
    }
}

//! Three-way header reconciliation.
//!
//! Walks the LCA, A and B header column lists in step and produces the
//! output schema: an ordered list of [`ColumnMap`]s naming each output
//! column and locating it (by index) in each source file. Columns deleted
//! on either side relative to the LCA are dropped; columns added on either
//! side survive; when both sides reorder the same columns differently, A's
//! order wins and a non-fatal reorder conflict is recorded.
//!
//! The resulting maps are what the row merger uses to line up field values
//! across files whose headers no longer agree.

use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// ColumnMap / OutputSchema
// ---------------------------------------------------------------------------

/// One column of the output schema, with its position in each source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMap {
    /// The column name.
    pub name: String,
    /// Index into the LCA header, if the LCA has this column.
    pub lca: Option<usize>,
    /// Index into A's header, if A has this column.
    pub a: Option<usize>,
    /// Index into B's header, if B has this column.
    pub b: Option<usize>,
}

/// The merged output header and per-side column maps.
#[derive(Clone, Debug)]
pub struct OutputSchema {
    /// Output columns in order.
    pub columns: Vec<ColumnMap>,
    /// True unless all three headers agree exactly; forces re-encoding of
    /// every output row, since raw row text is laid out against its source
    /// schema.
    pub need_remapping: bool,
    /// Number of both-sides-reordered collisions resolved in A's favour.
    pub reorder_conflicts: usize,
}

impl OutputSchema {
    /// The output column names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Walk state
// ---------------------------------------------------------------------------

/// Working state of the header walk: the not-yet-placed tail of each header.
struct Walk<'h> {
    lca: Vec<&'h str>,
    a: Vec<&'h str>,
    b: Vec<&'h str>,
}

impl Walk<'_> {
    fn exhausted(&self) -> bool {
        self.lca.is_empty() && self.a.is_empty() && self.b.is_empty()
    }

    /// Remove the first occurrence of `name` from every working list.
    fn consume(&mut self, name: &str) {
        for list in [&mut self.lca, &mut self.a, &mut self.b] {
            if let Some(pos) = list.iter().position(|c| *c == name) {
                list.remove(pos);
            }
        }
    }
}

fn position_of(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|c| c == name)
}

fn contains(header: &[String], name: &str) -> bool {
    position_of(header, name).is_some()
}

// ---------------------------------------------------------------------------
// merge_headers
// ---------------------------------------------------------------------------

/// Reconcile three headers into the output schema.
///
/// The caller guarantees column-name uniqueness within each header (the
/// table loader rejects duplicates).
#[must_use]
pub fn merge_headers(lca: &[String], a: &[String], b: &[String]) -> OutputSchema {
    let need_remapping = !(lca == a && a == b);
    let mut reorder_conflicts = 0;
    let mut columns = Vec::new();

    let mut walk = Walk {
        lca: lca.iter().map(String::as_str).collect(),
        a: a.iter().map(String::as_str).collect(),
        b: b.iter().map(String::as_str).collect(),
    };

    let emit = |columns: &mut Vec<ColumnMap>, name: &str| {
        columns.push(ColumnMap {
            name: name.to_owned(),
            lca: position_of(lca, name),
            a: position_of(a, name),
            b: position_of(b, name),
        });
    };

    while !walk.exhausted() {
        let next_l = walk.lca.first().copied();
        let next_a = walk.a.first().copied();
        let next_b = walk.b.first().copied();

        // All three agree on the next column.
        if next_l == next_a && next_l == next_b {
            let name = next_a.unwrap_or_default();
            emit(&mut columns, name);
            walk.consume(name);
            continue;
        }

        // A and B agree; the LCA disagrees, so the column was moved, added
        // or deleted identically on both sides.
        if next_a == next_b {
            let Some(name) = next_a else {
                // A and B are exhausted: whatever is left of the LCA was
                // deleted on both sides.
                break;
            };
            emit(&mut columns, name);
            walk.consume(name);
            continue;
        }

        // LCA exhausted: everything left in A and B is new or carried
        // forward from earlier moves; A's columns first.
        if next_l.is_none() {
            if let Some(name) = next_a {
                emit(&mut columns, name);
                walk.consume(name);
            } else if let Some(name) = next_b {
                emit(&mut columns, name);
                walk.consume(name);
            }
            continue;
        }

        // A matches the LCA, so the change to honour is on B's side.
        if next_l == next_a {
            let name_l = next_l.unwrap_or_default();
            if !contains(b, name_l) {
                // Deleted in B: drop without a map.
                debug!(column = name_l, side = "B", "column deleted");
                walk.consume(name_l);
                continue;
            }
            if let Some(name_b) = next_b
                && contains(a, name_b)
            {
                // B moved `name_b` to an earlier position; place it here.
                emit(&mut columns, name_b);
                walk.consume(name_b);
                continue;
            }
            // B moved the current column to a later position; skip past it
            // in LCA and A and pick it up from B's side as an insert.
            walk.lca.remove(0);
            walk.a.remove(0);
            continue;
        }

        // B matches the LCA, so the change to honour is on A's side.
        if next_l == next_b {
            let name_l = next_l.unwrap_or_default();
            if !contains(a, name_l) {
                debug!(column = name_l, side = "A", "column deleted");
                walk.consume(name_l);
                continue;
            }
            if let Some(name_a) = next_a
                && contains(b, name_a)
            {
                emit(&mut columns, name_a);
                walk.consume(name_a);
                continue;
            }
            walk.lca.remove(0);
            walk.b.remove(0);
            continue;
        }

        // All three differ. A missing or B missing means the LCA head was
        // deleted on that side.
        if next_a.is_none() || next_b.is_none() {
            let name_l = next_l.unwrap_or_default();
            walk.consume(name_l);
            continue;
        }

        // All three differ and all are present: both sides rearranged this
        // stretch; A's order wins.
        let name_a = next_a.unwrap_or_default();
        let name_b = next_b.unwrap_or_default();
        if contains(lca, name_a) && contains(lca, name_b) {
            warn!(
                a = name_a,
                b = name_b,
                "header reordered differently on both sides; using A's order"
            );
            reorder_conflicts += 1;
        }
        emit(&mut columns, name_a);
        walk.consume(name_a);
    }

    OutputSchema {
        columns,
        need_remapping,
        reorder_conflicts,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn merged_names(l: &[&str], a: &[&str], b: &[&str]) -> Vec<String> {
        merge_headers(&cols(l), &cols(a), &cols(b))
            .columns
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    #[test]
    fn identical_headers_pass_through() {
        let schema = merge_headers(&cols(&["k", "v"]), &cols(&["k", "v"]), &cols(&["k", "v"]));
        assert_eq!(schema.names(), vec!["k", "v"]);
        assert!(!schema.need_remapping);
        assert_eq!(schema.reorder_conflicts, 0);
    }

    #[test]
    fn column_maps_point_into_each_file() {
        let schema = merge_headers(&cols(&["k", "v"]), &cols(&["v", "k"]), &cols(&["k", "v"]));
        assert!(schema.need_remapping);
        for map in &schema.columns {
            match map.name.as_str() {
                "k" => assert_eq!((map.lca, map.a, map.b), (Some(0), Some(1), Some(0))),
                "v" => assert_eq!((map.lca, map.a, map.b), (Some(1), Some(0), Some(1))),
                other => panic!("unexpected column {other}"),
            }
        }
    }

    #[test]
    fn addition_in_one_side_survives() {
        assert_eq!(
            merged_names(&["k", "v"], &["k", "v", "w"], &["k", "v"]),
            vec!["k", "v", "w"]
        );
    }

    #[test]
    fn addition_in_both_sides_same_name() {
        let schema = merge_headers(
            &cols(&["k"]),
            &cols(&["k", "w"]),
            &cols(&["k", "w"]),
        );
        assert_eq!(schema.names(), vec!["k", "w"]);
        let w = &schema.columns[1];
        assert_eq!((w.lca, w.a, w.b), (None, Some(1), Some(1)));
    }

    #[test]
    fn deletion_propagates_from_either_side() {
        assert_eq!(merged_names(&["k", "v"], &["k"], &["k", "v"]), vec!["k"]);
        assert_eq!(merged_names(&["k", "v"], &["k", "v"], &["k"]), vec!["k"]);
    }

    #[test]
    fn deletion_in_both_sides() {
        assert_eq!(merged_names(&["k", "v", "w"], &["k"], &["k"]), vec!["k"]);
    }

    // Column added in A while B deletes an unrelated LCA column: the
    // addition survives and the deletion propagates.
    #[test]
    fn add_in_a_delete_in_b() {
        assert_eq!(
            merged_names(&["k", "v"], &["k", "v", "w"], &["k"]),
            vec!["k", "w"]
        );
    }

    #[test]
    fn move_in_one_side_wins() {
        // B moved "s" earlier; A is unchanged.
        assert_eq!(
            merged_names(&["p", "q", "r", "s"], &["p", "q", "r", "s"], &["p", "s", "q", "r"]),
            vec!["p", "s", "q", "r"]
        );
        // A moved "s" earlier; B is unchanged.
        assert_eq!(
            merged_names(&["p", "q", "r", "s"], &["p", "s", "q", "r"], &["p", "q", "r", "s"]),
            vec!["p", "s", "q", "r"]
        );
    }

    #[test]
    fn move_later_in_one_side() {
        // A moved "q" after "r": emitted when A reaches it.
        assert_eq!(
            merged_names(&["p", "q", "r"], &["p", "r", "q"], &["p", "q", "r"]),
            vec!["p", "r", "q"]
        );
    }

    #[test]
    fn same_move_on_both_sides() {
        assert_eq!(
            merged_names(&["p", "q", "r"], &["q", "p", "r"], &["q", "p", "r"]),
            vec!["q", "p", "r"]
        );
    }

    #[test]
    fn conflicting_reorders_prefer_a_and_count() {
        let schema = merge_headers(
            &cols(&["p", "q", "r"]),
            &cols(&["q", "p", "r"]),
            &cols(&["r", "p", "q"]),
        );
        assert_eq!(schema.names()[0], "q", "A's order should win");
        assert!(schema.reorder_conflicts > 0);
        // Every column survives; only the order was contested.
        let mut names = schema.names();
        names.sort_unstable();
        assert_eq!(names, vec!["p", "q", "r"]);
    }

    #[test]
    fn additions_from_both_sides_a_first_at_tail() {
        assert_eq!(
            merged_names(&["k"], &["k", "x"], &["k", "y"]),
            vec!["k", "x", "y"]
        );
    }

    #[test]
    fn deleted_column_with_remaining_tail() {
        // "v" deleted in A; "w" stays aligned afterwards.
        assert_eq!(
            merged_names(&["k", "v", "w"], &["k", "w"], &["k", "v", "w"]),
            vec!["k", "w"]
        );
    }

    #[test]
    fn output_is_union_minus_deletions() {
        let schema = merge_headers(
            &cols(&["a", "b", "c"]),
            &cols(&["a", "c", "x"]),
            &cols(&["b", "a", "c", "y"]),
        );
        let mut names = schema.names();
        names.sort_unstable();
        // "b" was deleted in A; everything else survives.
        assert_eq!(names, vec!["a", "c", "x", "y"]);
    }
}

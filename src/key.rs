//! Primary-key selection.
//!
//! The `--key` value is a `|`-separated list of candidate column names,
//! tried left to right; the special token `[auto]` asks for automatic
//! guessing. A candidate is usable only if the column is present in all
//! three input headers.
//!
//! Guessing samples up to the first [`SAMPLE_ROWS`] data rows of each file
//! and scores every usable output column by the total number of duplicated
//! values it shows across the three files. A zero-duplicate column wins
//! immediately; otherwise the strictly best scorer wins, with earlier
//! columns keeping ties.

use tracing::debug;

use crate::error::MergeError;
use crate::headers::OutputSchema;
use crate::table::CsvTable;

/// Token in a key specification requesting automatic guessing.
pub const AUTO_KEY: &str = "[auto]";

/// How many data rows per file the guesser samples.
const SAMPLE_ROWS: usize = 100;

/// Resolve a key specification against the three input files.
///
/// # Errors
/// [`MergeError::MissingKeyColumn`] when no candidate (explicit or guessed)
/// names a column present in every header.
pub fn resolve_key(
    spec: &str,
    schema: &OutputSchema,
    lca: &CsvTable,
    a: &CsvTable,
    b: &CsvTable,
) -> Result<String, MergeError> {
    for candidate in spec.split('|') {
        if candidate == AUTO_KEY {
            if let Some(guessed) = guess_key(schema, lca, a, b) {
                return Ok(guessed);
            }
            continue;
        }
        if is_usable(candidate, lca, a, b) {
            return Ok(candidate.to_owned());
        }
    }
    Err(MergeError::MissingKeyColumn {
        spec: spec.to_owned(),
    })
}

/// A column is usable as a key only if every file has it.
fn is_usable(column: &str, lca: &CsvTable, a: &CsvTable, b: &CsvTable) -> bool {
    lca.has_column(column) && a.has_column(column) && b.has_column(column)
}

/// Count duplicated values of `column` among a file's first sampled rows.
fn duplicate_score(column: &str, table: &CsvTable) -> usize {
    let Some(index) = table.header.fields.iter().position(|c| c == column) else {
        return 0;
    };

    let mut values = std::collections::HashSet::new();
    let mut sampled: usize = 0;
    for row in table.rows.iter().take(SAMPLE_ROWS) {
        if let Some(value) = row.field(index) {
            values.insert(value);
        }
        sampled += 1;
    }
    let score = sampled - values.len();

    debug!(
        column,
        file = %table.name,
        distinct = values.len(),
        sampled,
        score,
        "key guessing: scored column"
    );
    score
}

/// Guess the best key column, or `None` when no column is usable.
fn guess_key(schema: &OutputSchema, lca: &CsvTable, a: &CsvTable, b: &CsvTable) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for column in schema.names() {
        if !is_usable(column, lca, a, b) {
            continue;
        }

        let score =
            duplicate_score(column, lca) + duplicate_score(column, a) + duplicate_score(column, b);

        if score == 0 {
            debug!(column, "key guessing: perfect candidate");
            return Some(column.to_owned());
        }

        // Strictly better only: ties keep the earlier column.
        if best.is_none_or(|(_, s)| score < s) {
            best = Some((column, score));
        }
    }

    best.map(|(column, score)| {
        debug!(column, score, "key guessing: best imperfect candidate");
        column.to_owned()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::merge_headers;

    fn setup(lca: &str, a: &str, b: &str) -> (OutputSchema, CsvTable, CsvTable, CsvTable) {
        let lca = CsvTable::parse("LCA", lca).unwrap();
        let a = CsvTable::parse("A", a).unwrap();
        let b = CsvTable::parse("B", b).unwrap();
        let schema = merge_headers(&lca.header.fields, &a.header.fields, &b.header.fields);
        (schema, lca, a, b)
    }

    #[test]
    fn explicit_key_present_everywhere() {
        let (schema, l, a, b) = setup("k,v\n1,x\n", "k,v\n1,x\n", "k,v\n1,x\n");
        assert_eq!(resolve_key("k", &schema, &l, &a, &b).unwrap(), "k");
    }

    #[test]
    fn alternatives_fall_through_to_first_usable() {
        let (schema, l, a, b) = setup("k,v\n1,x\n", "k,v\n1,x\n", "k,v\n1,x\n");
        assert_eq!(resolve_key("id|k", &schema, &l, &a, &b).unwrap(), "k");
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let (schema, l, a, b) = setup("k,v\n1,x\n", "k,v\n1,x\n", "k,v\n1,x\n");
        let err = resolve_key("id", &schema, &l, &a, &b).unwrap_err();
        assert!(matches!(err, MergeError::MissingKeyColumn { .. }));
    }

    #[test]
    fn column_missing_in_one_file_is_unusable() {
        let (schema, l, a, b) = setup("k,v\n1,x\n", "k,v\n1,x\n", "k\n1\n");
        let err = resolve_key("v", &schema, &l, &a, &b).unwrap_err();
        assert!(matches!(err, MergeError::MissingKeyColumn { .. }));
    }

    #[test]
    fn auto_picks_the_unique_column() {
        // "v" repeats; "k" is unique in every file.
        let (schema, l, a, b) = setup(
            "k,v\n1,x\n2,x\n3,x\n",
            "k,v\n1,x\n2,x\n3,x\n",
            "k,v\n1,x\n2,x\n3,x\n",
        );
        assert_eq!(resolve_key(AUTO_KEY, &schema, &l, &a, &b).unwrap(), "k");
    }

    #[test]
    fn auto_prefers_fewest_duplicates() {
        // Both columns have duplicates; "v" has fewer.
        let (schema, l, a, b) = setup(
            "k,v\n1,x\n1,x\n1,y\n",
            "k,v\n1,x\n1,x\n1,y\n",
            "k,v\n1,x\n1,x\n1,y\n",
        );
        assert_eq!(resolve_key(AUTO_KEY, &schema, &l, &a, &b).unwrap(), "v");
    }

    #[test]
    fn auto_tie_keeps_the_earlier_column() {
        let (schema, l, a, b) = setup(
            "k,v\n1,x\n1,x\n",
            "k,v\n1,x\n1,x\n",
            "k,v\n1,x\n1,x\n",
        );
        assert_eq!(resolve_key(AUTO_KEY, &schema, &l, &a, &b).unwrap(), "k");
    }

    #[test]
    fn explicit_candidate_wins_over_auto_later_in_spec() {
        let (schema, l, a, b) = setup("k,v\n1,x\n", "k,v\n1,x\n", "k,v\n1,x\n");
        assert_eq!(resolve_key("v|[auto]", &schema, &l, &a, &b).unwrap(), "v");
    }
}

//! Embedded-aggregate detection for HYBRID source steps
//!
//! A source table is HYBRID when the metric's SQL reads it through a
//! sub-select that aggregates with `SUM`, e.g.
//! `(SELECT SUM(x) FROM l2.facility_exposure_snapshot WHERE ...)`.
//! This is a regex heuristic over free-form SQL and is kept behind
//! [`embeds_aggregate_of`] so it can be swapped for a real expression parser.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Opening of a sub-select, `( SELECT`
static SUB_SELECT_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\(\s*SELECT\b").expect("sub-select pattern is valid"));

/// `FROM [schema.]table`; group 1 is the schema, group 2 the table
static FROM_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bFROM\s+(?:([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*)?([A-Za-z_][A-Za-z0-9_]*)")
        .expect("FROM pattern is valid")
});

static SUM_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSUM\s*\(").expect("SUM pattern is valid"));

/// Text between the parenthesis at `open` and its matching close
///
/// An unbalanced group runs to the end of `sql`.
fn group_body(sql: &str, open: usize) -> &str {
    let mut depth = 0usize;
    for (offset, c) in sql[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return &sql[open + 1..open + offset];
                }
            }
            _ => {}
        }
    }
    &sql[open + 1..]
}

/// `body` with everything nested deeper than one group blanked out
///
/// Function-call parentheses stay, so `SUM(` is still visible, but a nested
/// sub-select can no longer contribute its FROM or its aggregates.
fn top_level(body: &str) -> String {
    let mut depth = 0usize;
    body.chars()
        .map(|c| match c {
            '(' => {
                depth += 1;
                if depth == 1 {
                    c
                } else {
                    ' '
                }
            }
            ')' => {
                let closes_outer = depth == 1;
                depth = depth.saturating_sub(1);
                if closes_outer {
                    c
                } else {
                    ' '
                }
            }
            _ if depth > 0 => ' ',
            _ => c,
        })
        .collect()
}

/// Table aggregated by one sub-select body, if it reads a qualified table with `SUM`
fn sub_select_target(body: &str) -> Option<String> {
    let flat = top_level(body);
    let from = FROM_TABLE.captures(&flat)?;
    from.get(1)?;

    let select_list = &flat[..from.get(0)?.start()];
    SUM_CALL.is_match(select_list).then(|| from[2].to_string())
}

/// Tables read through a `SUM` sub-select in `formula_sql`
pub fn aggregated_tables(formula_sql: &str) -> BTreeSet<String> {
    SUB_SELECT_OPEN
        .find_iter(formula_sql)
        .filter_map(|m| sub_select_target(group_body(formula_sql, m.start())))
        .collect()
}

/// Whether `table` is aggregated inside a sub-select of `formula_sql`
pub fn embeds_aggregate_of(formula_sql: Option<&str>, table: &str) -> bool {
    formula_sql
        .map(|sql| aggregated_tables(sql).contains(table))
        .unwrap_or(false)
}

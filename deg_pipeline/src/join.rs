//! Left outer joins between gene-level tables.

use std::collections::HashSet;

use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, Result};

const BASE_ROW: &str = "__base_row";

/// What to do when two non-empty tables share no key at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    #[default]
    Warn,
    Error,
}

/// Relational left join on `key`.
///
/// Every base row is kept in its original order; a base row matching `n`
/// rows of `other` appears `n` times, one that matches nothing carries
/// nulls in the columns coming from `other`. Clashing non-key column names
/// from `other` get polars' `_right` suffix.
pub fn left_join(base: &DataFrame, other: &DataFrame, key: &str) -> Result<DataFrame> {
    let indexed = base.with_row_index(PlSmallStr::from(BASE_ROW), None)?;
    let joined = indexed.join(other, [key], [key], JoinArgs::new(JoinType::Left), None)?;
    let ordered = joined.sort(
        [BASE_ROW],
        SortMultipleOptions::default().with_maintain_order(true),
    )?;
    Ok(ordered.drop(BASE_ROW)?)
}

/// Distinct non-null key values present in both tables.
pub fn shared_key_count(a: &DataFrame, b: &DataFrame, key: &str) -> Result<usize> {
    let keys_a = a.column(key)?.cast(&DataType::String)?;
    let keys_b = b.column(key)?.cast(&DataType::String)?;
    let set_a: HashSet<&str> = keys_a.str()?.into_iter().flatten().collect();
    let shared: HashSet<&str> = keys_b
        .str()?
        .into_iter()
        .flatten()
        .filter(|k| set_a.contains(k))
        .collect();
    Ok(shared.len())
}

/// [`left_join`] that first checks the two tables actually share keys.
///
/// Zero shared keys between two non-empty tables almost always means the
/// identifiers were normalized differently (annotation format, species).
pub fn left_join_checked(
    base: &DataFrame,
    base_name: &str,
    other: &DataFrame,
    other_name: &str,
    key: &str,
    policy: MismatchPolicy,
) -> Result<DataFrame> {
    if base.height() > 0 && other.height() > 0 {
        let shared = shared_key_count(base, other, key)?;
        debug!("'{base_name}' x '{other_name}': {shared} shared '{key}' values");
        if shared == 0 {
            match policy {
                MismatchPolicy::Error => {
                    error!("No '{key}' values shared between '{base_name}' and '{other_name}'");
                    return Err(PipelineError::JoinKeyMismatch {
                        left: base_name.to_string(),
                        right: other_name.to_string(),
                        key: key.to_string(),
                    });
                }
                MismatchPolicy::Warn => warn!(
                    "No '{key}' values shared between '{base_name}' and '{other_name}'; joined columns will be empty"
                ),
            }
        }
    }

    let joined = left_join(base, other, key)?;
    if joined.height() > base.height() {
        info!(
            "Joining '{other_name}' expanded '{base_name}' from {} to {} rows (duplicate '{key}' values)",
            base.height(),
            joined.height()
        );
    }
    Ok(joined)
}

/// Join several auxiliary tables onto `base` one after another.
///
/// With unique keys in `base` the final row set does not depend on the order
/// of `others`; with duplicate keys every join can multiply rows.
pub fn join_all(
    base: &DataFrame,
    base_name: &str,
    others: &[(&str, &DataFrame)],
    key: &str,
    policy: MismatchPolicy,
) -> Result<DataFrame> {
    let mut acc = base.clone();
    for (name, other) in others {
        acc = left_join_checked(&acc, base_name, other, name, key, policy)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn base() -> DataFrame {
        df![
            "gene_id" => &["A", "B", "C"],
            "log2_fold_change" => &[1.0, -2.0, 0.1],
        ]
        .unwrap()
    }

    #[test]
    fn keeps_every_base_row_and_value() {
        let other = df!["gene_id" => &["C", "A"], "tpm" => &[3.0, 1.0]].unwrap();
        let joined = left_join(&base(), &other, "gene_id").unwrap();
        assert_eq!(joined.height(), 3);
        for name in ["gene_id", "log2_fold_change"] {
            let kept = joined.column(name).unwrap().as_materialized_series();
            assert!(kept.equals(base().column(name).unwrap().as_materialized_series()));
        }
        let tpm: Vec<Option<f64>> = joined.column("tpm").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(tpm, vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn duplicate_keys_multiply_rows() {
        let other = df!["gene_id" => &["A", "A", "B"], "set" => &["s1", "s2", "s3"]].unwrap();
        let joined = left_join(&base(), &other, "gene_id").unwrap();
        // A x2, B x1, C unmatched
        assert_eq!(joined.height(), 4);
        let ids: Vec<&str> = joined.column("gene_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["A", "A", "B", "C"]);
    }

    #[test]
    fn chained_joins_are_order_independent_for_unique_base() {
        let tpm = df!["gene_id" => &["A", "C"], "tpm" => &[1.0, 3.0]].unwrap();
        let nes = df!["gene_id" => &["B"], "nes" => &[2.5]].unwrap();
        let p = MismatchPolicy::Warn;
        let ab = join_all(&base(), "de", &[("tpm", &tpm), ("nes", &nes)], "gene_id", p).unwrap();
        let ba = join_all(&base(), "de", &[("nes", &nes), ("tpm", &tpm)], "gene_id", p).unwrap();
        assert_eq!(ab.height(), ba.height());
        let ab = ab.select(["gene_id", "tpm", "nes"]).unwrap();
        let ba = ba.select(["gene_id", "tpm", "nes"]).unwrap();
        assert!(ab.equals_missing(&ba));
    }

    #[test]
    fn disjoint_keys_error_when_strict() {
        let other = df!["gene_id" => &["ENSG1"], "tpm" => &[1.0]].unwrap();
        let err = left_join_checked(&base(), "de", &other, "tpm", "gene_id", MismatchPolicy::Error).unwrap_err();
        assert!(matches!(err, PipelineError::JoinKeyMismatch { .. }));

        let warned = left_join_checked(&base(), "de", &other, "tpm", "gene_id", MismatchPolicy::Warn).unwrap();
        assert_eq!(warned.column("tpm").unwrap().null_count(), 3);
    }

    #[test]
    fn empty_auxiliary_table_is_not_a_mismatch() {
        let other = DataFrame::new(vec![
            Column::new("gene_id".into(), Vec::<String>::new()),
            Column::new("tpm".into(), Vec::<f64>::new()),
        ])
        .unwrap();
        let joined = left_join_checked(&base(), "de", &other, "tpm", "gene_id", MismatchPolicy::Error).unwrap();
        assert_eq!(joined.height(), 3);
    }
}

//! Two-list overlap statistics for the proportional Venn diagram.

use std::collections::BTreeSet;

use polars::prelude::*;
use serde::Serialize;

use crate::classify::{Regulation, REGULATION};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverlapResult {
    pub intersection: BTreeSet<String>,
    pub unique_to_a: BTreeSet<String>,
    pub unique_to_b: BTreeSet<String>,
    pub count_intersection: usize,
}

/// `(|A|, |B|, |A ∩ B|)`, all a diagram layout needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverlapCounts {
    pub a: usize,
    pub b: usize,
    pub both: usize,
}

impl OverlapResult {
    pub fn counts(&self) -> OverlapCounts {
        OverlapCounts {
            a: self.unique_to_a.len() + self.count_intersection,
            b: self.unique_to_b.len() + self.count_intersection,
            both: self.count_intersection,
        }
    }

    pub fn union_len(&self) -> usize {
        self.unique_to_a.len() + self.unique_to_b.len() + self.count_intersection
    }
}

pub fn compare(a: &BTreeSet<String>, b: &BTreeSet<String>) -> OverlapResult {
    let intersection: BTreeSet<String> = a.intersection(b).cloned().collect();
    OverlapResult {
        count_intersection: intersection.len(),
        unique_to_a: a.difference(b).cloned().collect(),
        unique_to_b: b.difference(a).cloned().collect(),
        intersection,
    }
}

/// Identifiers of a classified table carrying `label`, or any significant
/// label when `label` is `None`.
pub fn genes_with_label(df: &DataFrame, gene_col: &str, label: Option<Regulation>) -> Result<BTreeSet<String>> {
    let genes = df.column(gene_col)?.str()?;
    let labels = df.column(REGULATION)?.str()?;
    let mut out = BTreeSet::new();
    for (gene, reg) in genes.into_iter().zip(labels.into_iter()) {
        let (Some(gene), Some(reg)) = (gene, reg) else { continue };
        let reg: Regulation = reg.parse()?;
        let keep = match label {
            Some(wanted) => reg == wanted,
            None => reg.is_significant(),
        };
        if keep {
            out.insert(gene.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn overlap_scenario() {
        let r = compare(&set(&["g1", "g2", "g3"]), &set(&["g2", "g3", "g4"]));
        assert_eq!(r.intersection, set(&["g2", "g3"]));
        assert_eq!(r.count_intersection, 2);
        assert_eq!(r.unique_to_a, set(&["g1"]));
        assert_eq!(r.unique_to_b, set(&["g4"]));
        assert_eq!(r.counts(), OverlapCounts { a: 3, b: 3, both: 2 });
        assert_eq!(r.union_len(), 4);
    }

    #[test]
    fn identity_and_empty() {
        let a = set(&["x", "y"]);
        let same = compare(&a, &a);
        assert_eq!(same.intersection, a);
        assert!(same.unique_to_a.is_empty() && same.unique_to_b.is_empty());

        let with_empty = compare(&a, &BTreeSet::new());
        assert!(with_empty.intersection.is_empty());
        assert_eq!(with_empty.unique_to_a, a);

        let both_empty = compare(&BTreeSet::new(), &BTreeSet::new());
        assert_eq!(both_empty, OverlapResult::default());
    }

    #[test]
    fn collects_significant_genes() {
        let df = df![
            "gene_id" => &["A", "B", "C"],
            "regulation" => &["Upregulated", "NotSignificant", "Downregulated"],
        ]
        .unwrap();
        assert_eq!(genes_with_label(&df, "gene_id", None).unwrap(), set(&["A", "C"]));
        assert_eq!(
            genes_with_label(&df, "gene_id", Some(Regulation::Downregulated)).unwrap(),
            set(&["C"])
        );
    }
}

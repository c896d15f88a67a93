//! Fold-change / significance classification and GSEA ranking scores.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::helper_functions::{f64_values, neg_log10, str_values};

/// log2(1.5)
pub const DEFAULT_LOG2FC_THRESHOLD: f64 = 0.585;
pub const DEFAULT_PADJ_THRESHOLD: f64 = 0.05;

pub const REGULATION: &str = "regulation";
pub const RANKING_SCORE: &str = "ranking_score";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Regulation {
    Upregulated,
    Downregulated,
    NotSignificant,
}

impl Regulation {
    pub const ALL: [Regulation; 3] = [
        Regulation::Upregulated,
        Regulation::Downregulated,
        Regulation::NotSignificant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Regulation::Upregulated => "Upregulated",
            Regulation::Downregulated => "Downregulated",
            Regulation::NotSignificant => "NotSignificant",
        }
    }

    pub fn is_significant(&self) -> bool {
        !matches!(self, Regulation::NotSignificant)
    }

    /// A missing fold change counts as 0, so it can never pass the
    /// fold-change threshold. A missing p-value can never pass the p threshold.
    pub fn from_values(log2fc: Option<f64>, padj: Option<f64>, thresholds: &Thresholds) -> Self {
        let fc = log2fc.filter(|v| !v.is_nan()).unwrap_or(0.0);
        let significant = padj.map_or(false, |p| p <= thresholds.adjusted_p_value);
        if !significant {
            return Regulation::NotSignificant;
        }
        if fc >= thresholds.log2_fold_change {
            Regulation::Upregulated
        } else if fc <= -thresholds.log2_fold_change {
            Regulation::Downregulated
        } else {
            Regulation::NotSignificant
        }
    }
}

impl fmt::Display for Regulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Regulation {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Regulation::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| PipelineError::config(format!("unknown regulation label '{s}'")))
    }
}

/// Inclusive thresholds: `|log2fc| >= log2_fold_change` and `padj <= adjusted_p_value`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Thresholds {
    #[serde(default = "default_log2fc")]
    pub log2_fold_change: f64,
    #[serde(default = "default_padj")]
    pub adjusted_p_value: f64,
}

fn default_log2fc() -> f64 {
    DEFAULT_LOG2FC_THRESHOLD
}

fn default_padj() -> f64 {
    DEFAULT_PADJ_THRESHOLD
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            log2_fold_change: DEFAULT_LOG2FC_THRESHOLD,
            adjusted_p_value: DEFAULT_PADJ_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.log2_fold_change.is_finite() || self.log2_fold_change < 0.0 {
            return Err(PipelineError::config(format!(
                "log2 fold-change threshold must be finite and >= 0, got {}",
                self.log2_fold_change
            )));
        }
        if !(self.adjusted_p_value > 0.0 && self.adjusted_p_value <= 1.0) {
            return Err(PipelineError::config(format!(
                "adjusted p-value threshold must lie in (0, 1], got {}",
                self.adjusted_p_value
            )));
        }
        Ok(())
    }
}

/// Return a copy of `df` with a `regulation` column derived from `fc_col` and `p_col`.
pub fn classify(df: &DataFrame, fc_col: &str, p_col: &str, thresholds: &Thresholds) -> Result<DataFrame> {
    let fcs = f64_values(df, fc_col)?;
    let ps = f64_values(df, p_col)?;

    let labels: Vec<&str> = fcs
        .iter()
        .zip(ps.iter())
        .map(|(&fc, &p)| Regulation::from_values(fc, p, thresholds).as_str())
        .collect();

    let mut out = df.clone();
    out.with_column(Series::new(PlSmallStr::from(REGULATION), labels))?;

    let counts = label_counts(&out)?;
    info!(
        "Classified {} genes: {} up, {} down, {} not significant",
        out.height(),
        counts[&Regulation::Upregulated],
        counts[&Regulation::Downregulated],
        counts[&Regulation::NotSignificant]
    );
    Ok(out)
}

/// Per-label row counts of a classified frame (every label present, possibly 0).
pub fn label_counts(df: &DataFrame) -> Result<BTreeMap<Regulation, usize>> {
    let mut counts: BTreeMap<Regulation, usize> = Regulation::ALL.into_iter().map(|r| (r, 0)).collect();
    for label in df.column(REGULATION)?.str()?.into_iter().flatten() {
        *counts.entry(label.parse()?).or_insert(0) += 1;
    }
    Ok(counts)
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `-log10(p) * sign(fc)`, with a missing fold change counted as 0 (score 0).
pub fn ranking_score(log2fc: Option<f64>, padj: f64) -> f64 {
    let fc = log2fc.filter(|v| !v.is_nan()).unwrap_or(0.0);
    let score = neg_log10(padj) * sign(fc);
    if score == 0.0 { 0.0 } else { score }
}

/// Copy of `df` with a `ranking_score` column (null where the p-value is missing).
pub fn with_ranking_score(df: &DataFrame, fc_col: &str, p_col: &str) -> Result<DataFrame> {
    let fcs = f64_values(df, fc_col)?;
    let ps = f64_values(df, p_col)?;
    let scores: Vec<Option<f64>> = fcs
        .iter()
        .zip(ps.iter())
        .map(|(&fc, &p)| p.filter(|p| !p.is_nan()).map(|p| ranking_score(fc, p)))
        .collect();
    let mut out = df.clone();
    out.with_column(Series::new(PlSmallStr::from(RANKING_SCORE), scores))?;
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedGene {
    pub gene_id: String,
    pub score: f64,
}

/// Genes sorted by descending ranking score, one entry per gene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedList(Vec<RankedGene>);

impl RankedList {
    pub fn iter(&self) -> impl Iterator<Item = &RankedGene> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn gene_ids(&self) -> Vec<&str> {
        self.0.iter().map(|g| g.gene_id.as_str()).collect()
    }

    /// Two-column `.rnk` file as consumed by GSEA/fgsea.
    pub fn to_rnk(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for gene in &self.0 {
            writeln!(out, "{}\t{}", gene.gene_id, gene.score)?;
        }
        out.flush()?;
        debug!("Wrote {} ranked genes to {}", self.0.len(), path.display());
        Ok(())
    }
}

/// Ranked input for an enrichment engine.
///
/// Rows without a p-value are skipped, a gene seen twice keeps its first row,
/// and the sort is stable so equal scores stay in row order.
pub fn ranked_list(df: &DataFrame, gene_col: &str, fc_col: &str, p_col: &str) -> Result<RankedList> {
    let genes = str_values(df, gene_col)?;
    let fcs = f64_values(df, fc_col)?;
    let ps = f64_values(df, p_col)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut ranked = Vec::with_capacity(genes.len());
    let mut skipped = 0usize;
    let mut duplicates = 0usize;

    for ((gene, fc), p) in genes.into_iter().zip(fcs).zip(ps) {
        let (gene, p) = match (gene, p.filter(|p| !p.is_nan())) {
            (Some(g), Some(p)) => (g, p),
            _ => {
                skipped += 1;
                continue;
            }
        };
        if !seen.insert(gene.clone()) {
            duplicates += 1;
            continue;
        }
        ranked.push(RankedGene {
            score: ranking_score(fc, p),
            gene_id: gene,
        });
    }

    if skipped > 0 {
        warn!("Skipped {skipped} rows without a gene identifier or p-value while ranking");
    }
    if duplicates > 0 {
        warn!("Dropped {duplicates} duplicate gene identifiers while ranking (first row kept)");
    }

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    Ok(RankedList(ranked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn scenario() -> DataFrame {
        df![
            "gene_id" => &["GeneX", "GeneY", "GeneZ"],
            "log2_fold_change" => &[1.2, -0.7, 0.1],
            "adjusted_p_value" => &[0.01, 0.03, 0.2],
        ]
        .unwrap()
    }

    fn labels(df: &DataFrame) -> Vec<String> {
        str_values(df, REGULATION).unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn end_to_end_labels() {
        let out = classify(&scenario(), "log2_fold_change", "adjusted_p_value", &Thresholds::default()).unwrap();
        assert_eq!(labels(&out), vec!["Upregulated", "Downregulated", "NotSignificant"]);
    }

    #[test]
    fn classification_is_deterministic() {
        let t = Thresholds::default();
        let a = classify(&scenario(), "log2_fold_change", "adjusted_p_value", &t).unwrap();
        let b = classify(&scenario(), "log2_fold_change", "adjusted_p_value", &t).unwrap();
        assert!(a.equals_missing(&b));
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = Thresholds::default();
        assert_eq!(Regulation::from_values(Some(0.585), Some(0.05), &t), Regulation::Upregulated);
        assert_eq!(Regulation::from_values(Some(-0.585), Some(0.05), &t), Regulation::Downregulated);
        assert_eq!(Regulation::from_values(Some(0.584999), Some(0.05), &t), Regulation::NotSignificant);
        assert_eq!(Regulation::from_values(Some(2.0), Some(0.050001), &t), Regulation::NotSignificant);
    }

    #[test]
    fn missing_values_are_not_significant() {
        let t = Thresholds::default();
        assert_eq!(Regulation::from_values(None, Some(0.01), &t), Regulation::NotSignificant);
        assert_eq!(Regulation::from_values(Some(3.0), None, &t), Regulation::NotSignificant);
        assert_eq!(Regulation::from_values(Some(f64::NAN), Some(0.01), &t), Regulation::NotSignificant);
    }

    #[test]
    fn label_counts_cover_all_labels() {
        let out = classify(&scenario(), "log2_fold_change", "adjusted_p_value", &Thresholds::default()).unwrap();
        let counts = label_counts(&out).unwrap();
        assert_eq!(counts[&Regulation::Upregulated], 1);
        assert_eq!(counts[&Regulation::Downregulated], 1);
        assert_eq!(counts[&Regulation::NotSignificant], 1);
    }

    #[test]
    fn ranking_scenario() {
        let ranked = ranked_list(&scenario(), "gene_id", "log2_fold_change", "adjusted_p_value").unwrap();
        assert_eq!(ranked.gene_ids(), vec!["GeneX", "GeneZ", "GeneY"]);
        let scores: Vec<f64> = ranked.iter().map(|g| g.score).collect();
        assert!((scores[0] - 2.0).abs() < 1e-9);
        assert!((scores[1] - 0.69897).abs() < 1e-4);
        assert!((scores[2] + 1.52288).abs() < 1e-4);
    }

    #[test]
    fn zero_scores_keep_row_order() {
        let df = df![
            "gene_id" => &["A", "B", "C", "D", "A"],
            "log2_fold_change" => &[None, Some(0.0), Some(1.0), None, Some(5.0)],
            "adjusted_p_value" => &[Some(0.5), Some(0.01), Some(0.1), Some(0.9), Some(0.001)],
        ]
        .unwrap();
        let ranked = ranked_list(&df, "gene_id", "log2_fold_change", "adjusted_p_value").unwrap();
        // duplicate "A" dropped; A, B and D tie at 0 and keep row order
        assert_eq!(ranked.gene_ids(), vec!["C", "A", "B", "D"]);
        assert!(ranked.iter().skip(1).all(|g| g.score == 0.0));
    }

    #[test]
    fn rows_without_p_value_are_not_ranked() {
        let df = df![
            "gene_id" => &["A", "B"],
            "log2_fold_change" => &[1.0, 1.0],
            "adjusted_p_value" => &[None, Some(0.1)],
        ]
        .unwrap();
        let ranked = ranked_list(&df, "gene_id", "log2_fold_change", "adjusted_p_value").unwrap();
        assert_eq!(ranked.gene_ids(), vec!["B"]);

        let scored = with_ranking_score(&df, "log2_fold_change", "adjusted_p_value").unwrap();
        assert_eq!(scored.column(RANKING_SCORE).unwrap().null_count(), 1);
    }

    #[test]
    fn thresholds_validate() {
        assert!(Thresholds::default().validate().is_ok());
        let bad = Thresholds { log2_fold_change: -1.0, adjusted_p_value: 0.05 };
        assert!(bad.validate().is_err());
        let bad = Thresholds { log2_fold_change: 1.0, adjusted_p_value: 0.0 };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn writes_rnk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genes.rnk");
        let ranked = ranked_list(&scenario(), "gene_id", "log2_fold_change", "adjusted_p_value").unwrap();
        ranked.to_rnk(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("GeneX\t2"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn integer_fold_changes_classify_and_rank() {
        let df = df![
            "gene_id" => &["A", "B"],
            "fc" => &[2i64, -1],
            "p" => &[0.01, 0.5],
        ]
        .unwrap();
        let out = classify(&df, "fc", "p", &Thresholds::default()).unwrap();
        assert_eq!(labels(&out), vec!["Upregulated", "NotSignificant"]);

        let ranked = ranked_list(&df, "gene_id", "fc", "p").unwrap();
        assert_eq!(ranked.gene_ids(), vec!["A", "B"]);
        let scored = with_ranking_score(&df, "fc", "p").unwrap();
        assert_eq!(scored.column(RANKING_SCORE).unwrap().null_count(), 0);
    }
}

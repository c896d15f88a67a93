//! Reading delimited gene-level tables and bringing their columns and
//! identifiers into canonical form.

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::helper_functions::read_tsv;

/// Separator between the gene identifier and the rest of a composite
/// annotation (e.g. `TP53|ENSG00000141510|protein_coding`).
pub const ANNOTATION_SEPARATOR: char = '|';

/// Versioned positional layout for tables whose headers cannot be trusted.
///
/// The width is checked before any position is renamed, so a batch exported
/// with an extra or missing column fails loudly instead of shifting names.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnContract {
    pub version: String,
    pub expected_columns: usize,
    /// `(zero-based index, new name)` pairs
    pub positions: Vec<(usize, String)>,
}

impl ColumnContract {
    pub fn apply(&self, mut df: DataFrame, source: &Path) -> Result<DataFrame> {
        if df.width() != self.expected_columns {
            return Err(PipelineError::malformed(
                source,
                format!(
                    "column contract '{}' expects {} columns, found {}",
                    self.version,
                    self.expected_columns,
                    df.width()
                ),
            ));
        }

        let mut names = df.get_column_names_owned();
        for (idx, name) in &self.positions {
            let slot = names.get_mut(*idx).ok_or_else(|| {
                PipelineError::malformed(
                    source,
                    format!("column contract '{}' names position {idx} beyond the table width", self.version),
                )
            })?;
            *slot = PlSmallStr::from(name.as_str());
        }
        df.set_column_names(names)
            .map_err(|e| PipelineError::malformed(source, e.to_string()))?;
        debug!("Applied column contract '{}'", self.version);
        Ok(df)
    }
}

/// Canonical identifier from a composite annotation: everything from the
/// first `|` onwards is discarded.
pub fn canonical_gene_id(raw: &str) -> &str {
    match raw.find(ANNOTATION_SEPARATOR) {
        Some(i) => &raw[..i],
        None => raw,
    }
}

/// Rename columns in one pass. Every source column must exist.
pub fn rename_columns(
    mut df: DataFrame,
    renames: &BTreeMap<String, String>,
    source: &Path,
) -> Result<DataFrame> {
    let present: Vec<PlSmallStr> = df.get_column_names_owned();
    for old in renames.keys() {
        if !present.iter().any(|c| c.as_str() == old) {
            return Err(PipelineError::malformed(
                source,
                format!("rename source column '{old}' not found"),
            ));
        }
    }

    let names: Vec<PlSmallStr> = present
        .into_iter()
        .map(|c| match renames.get(c.as_str()) {
            Some(new) => PlSmallStr::from(new.as_str()),
            None => c,
        })
        .collect();
    df.set_column_names(names)
        .map_err(|e| PipelineError::malformed(source, e.to_string()))?;
    Ok(df)
}

/// Replace the values of `gene_col` by their canonical identifiers: cut at the
/// first `|`, then strip surrounding whitespace (`" TP53 |ENSG…"` → `"TP53"`).
///
/// Fails if any identifier is null or empty after truncation.
pub fn normalize_gene_ids(mut df: DataFrame, gene_col: &str, source: &Path) -> Result<DataFrame> {
    let column = df.column(gene_col).map_err(|_| {
        PipelineError::malformed(source, format!("gene identifier column '{gene_col}' not found"))
    })?;
    let as_str = column.cast(&DataType::String)?;
    let ca = as_str.str()?;

    let normalized: Vec<Option<String>> = ca
        .into_iter()
        .map(|v| v.map(|raw| canonical_gene_id(raw).trim().to_string()))
        .collect();

    if let Some(row) = normalized
        .iter()
        .position(|v| v.as_deref().map_or(true, str::is_empty))
    {
        let bad = normalized.iter().filter(|v| v.as_deref().map_or(true, str::is_empty)).count();
        return Err(PipelineError::malformed(
            source,
            format!("{bad} row(s) have no gene identifier in '{gene_col}' (first at data row {})", row + 1),
        ));
    }

    df.with_column(Series::new(PlSmallStr::from(gene_col), normalized))?;
    Ok(df)
}

/// `load(path, renames)`: read, optionally apply a positional contract,
/// rename, then canonicalize the gene identifier column.
pub fn load_table(
    path: &Path,
    renames: &BTreeMap<String, String>,
    contract: Option<&ColumnContract>,
    gene_col: &str,
) -> Result<DataFrame> {
    let df = read_tsv(path)?;
    let df = match contract {
        Some(contract) => contract.apply(df, path)?,
        None => df,
    };
    let df = rename_columns(df, renames, path)?;
    let df = normalize_gene_ids(df, gene_col, path)?;
    info!("Loaded {} ({} genes)", path.display(), df.height());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use std::io::Write;

    fn write(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn truncates_at_first_separator() {
        assert_eq!(canonical_gene_id("TP53|ENSG00000141510|protein_coding"), "TP53");
        assert_eq!(canonical_gene_id("MYC"), "MYC");
        assert_eq!(canonical_gene_id("|orphan"), "");
    }

    #[test]
    fn load_applies_renames_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "de.tsv",
            &[
                "annotation\tlogFC\tFDR",
                "TP53|ENSG1|pc\t1.2\t0.01",
                "MYC|ENSG2|pc\t-0.7\t0.03",
            ],
        );
        let renames = BTreeMap::from([
            ("annotation".to_string(), "gene_id".to_string()),
            ("logFC".to_string(), "log2_fold_change".to_string()),
        ]);
        let df = load_table(&path, &renames, None, "gene_id").unwrap();
        let ids: Vec<&str> = df.column("gene_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["TP53", "MYC"]);
        assert!(df.column("log2_fold_change").is_ok());
        assert!(df.column("FDR").is_ok());
    }

    #[test]
    fn missing_rename_source_fails() {
        let df = df!["a" => &[1i32]].unwrap();
        let renames = BTreeMap::from([("b".to_string(), "c".to_string())]);
        let err = rename_columns(df, &renames, Path::new("x.tsv")).unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn swapping_renames_apply_simultaneously() {
        let df = df!["a" => &[1i32], "b" => &[2i32]].unwrap();
        let renames = BTreeMap::from([
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ]);
        let df = rename_columns(df, &renames, Path::new("x.tsv")).unwrap();
        assert_eq!(df.column("b").unwrap().i32().unwrap().get(0), Some(1));
    }

    #[test]
    fn null_identifier_is_rejected() {
        let df = df!["gene_id" => &[Some("A|x"), None]].unwrap();
        let err = normalize_gene_ids(df, "gene_id", Path::new("x.tsv")).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }

    #[test]
    fn contract_checks_width_before_renaming() {
        let contract = ColumnContract {
            version: "tpm-v1".into(),
            expected_columns: 3,
            positions: vec![(1, "sgScr_1".into()), (2, "sgScr_2".into())],
        };
        let ok = df!["id" => &["A"], "c9" => &[1.0], "c10" => &[2.0]].unwrap();
        let renamed = contract.apply(ok, Path::new("tpm.tsv")).unwrap();
        assert!(renamed.column("sgScr_2").is_ok());

        let wide = df!["id" => &["A"], "c9" => &[1.0], "c10" => &[2.0], "c11" => &[3.0]].unwrap();
        let err = contract.apply(wide, Path::new("tpm.tsv")).unwrap_err();
        assert!(err.to_string().contains("tpm-v1"));

        let beyond = ColumnContract {
            positions: vec![(3, "sgKO_1".into())],
            ..contract
        };
        let narrow = df!["id" => &["A"], "c9" => &[1.0], "c10" => &[2.0]].unwrap();
        let err = beyond.apply(narrow, Path::new("tpm.tsv")).unwrap_err();
        assert!(err.to_string().contains("position 3 beyond the table width"));
    }

    #[test]
    fn identifiers_are_trimmed_after_truncation() {
        let df = df!["gene_id" => &[" TP53 |ENSG1", "MYC\t|ENSG2"]].unwrap();
        let df = normalize_gene_ids(df, "gene_id", Path::new("x.tsv")).unwrap();
        let ids: Vec<&str> = df.column("gene_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["TP53", "MYC"]);
    }

    #[test]
    fn duplicate_identifiers_survive_loading() {
        let df = df!["gene_id" => &["A|1", "A|2"]].unwrap();
        let df = normalize_gene_ids(df, "gene_id", Path::new("x.tsv")).unwrap();
        assert_eq!(df.height(), 2);
    }
}

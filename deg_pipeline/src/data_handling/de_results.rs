use std::collections::BTreeMap;
use std::path::PathBuf;

use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::data_handling::loader::{load_table, ColumnContract};
use crate::data_handling::{Dataset, GENE_ID, LOG2FC, PADJ};
use crate::error::{PipelineError, Result};
use crate::helper_functions::{cast_numeric, f64_values, require_columns};

/// A differential-expression result table (edgeR/DESeq2 export).
///
/// After loading it always carries `gene_id`, `log2_fold_change` (nullable)
/// and `adjusted_p_value` as `Float64`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeResultsDataset {
    pub path: PathBuf,
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    #[serde(default)]
    pub contract: Option<ColumnContract>,
}

impl Dataset for DeResultsDataset {
    fn load(&self) -> Result<DataFrame> {
        info!("Reading differential expression results from {}", self.path.display());
        let mut df = load_table(&self.path, &self.renames, self.contract.as_ref(), GENE_ID)?;
        require_columns(&df, &[GENE_ID, LOG2FC, PADJ], &self.path)?;

        cast_numeric(&mut df, LOG2FC, &self.path)?;
        cast_numeric(&mut df, PADJ, &self.path)?;

        if let Some((row, p)) = f64_values(&df, PADJ)?
            .into_iter()
            .enumerate()
            .find_map(|(i, p)| p.filter(|p| !(0.0..=1.0).contains(p)).map(|p| (i, p)))
        {
            return Err(PipelineError::malformed(
                &self.path,
                format!("'{PADJ}' must lie in [0, 1], found {p} at data row {}", row + 1),
            ));
        }

        debug!(
            "{}: {} rows, {} without a fold change",
            self.path.display(),
            df.height(),
            df.column(LOG2FC)?.null_count()
        );
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dataset(lines: &[&str]) -> (tempfile::TempDir, DeResultsDataset) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.tsv");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        let renames = BTreeMap::from([
            ("Geneid".to_string(), GENE_ID.to_string()),
            ("logFC".to_string(), LOG2FC.to_string()),
            ("FDR".to_string(), PADJ.to_string()),
        ]);
        (dir, DeResultsDataset { path, renames, contract: None })
    }

    #[test]
    fn loads_and_casts() {
        let (_dir, ds) = dataset(&[
            "Geneid\tlogFC\tFDR",
            "GeneX|a\t1.2\t0.01",
            "GeneY|b\tNA\t0.03",
        ]);
        let df = ds.load().unwrap();
        assert_eq!(df.column(LOG2FC).unwrap().dtype(), &DataType::Float64);
        assert_eq!(f64_values(&df, LOG2FC).unwrap(), vec![Some(1.2), None]);
    }

    #[test]
    fn unparsable_p_value_aborts() {
        let (_dir, ds) = dataset(&["Geneid\tlogFC\tFDR", "GeneX\t1.2\tlow"]);
        let err = ds.load().unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }

    #[test]
    fn p_value_out_of_range_aborts() {
        let (_dir, ds) = dataset(&["Geneid\tlogFC\tFDR", "GeneX\t1.2\t1.5"]);
        let err = ds.load().unwrap_err();
        assert!(err.to_string().contains("[0, 1]"));
    }

    #[test]
    fn missing_required_column_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.tsv");
        std::fs::write(&path, "gene_id\tlog2_fold_change\nA\t1.0\n").unwrap();
        let ds = DeResultsDataset { path, renames: BTreeMap::new(), contract: None };
        let err = ds.load().unwrap_err();
        assert!(err.to_string().contains(PADJ));
    }

    #[test]
    fn whole_number_rows_before_a_decimal_load() {
        let mut lines = vec!["Geneid\tlogFC\tFDR".to_string()];
        lines.extend((0..10_001).map(|i| format!("G{i}|x\t1\t1")));
        lines.push("GLATE|x\t1.5\t0.01".to_string());
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

        let (_dir, ds) = dataset(&lines);
        let df = ds.load().unwrap();
        assert_eq!(df.height(), 10_002);
        let fcs = f64_values(&df, LOG2FC).unwrap();
        assert_eq!(fcs[10_001], Some(1.5));
        assert_eq!(f64_values(&df, PADJ).unwrap()[10_001], Some(0.01));
    }
}

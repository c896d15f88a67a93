use std::collections::BTreeSet;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, error, info};

use crate::error::{PipelineError, Result};

/// Token written by R/Bioconductor for missing values.
pub const NA_TOKEN: &str = "NA";

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Read a tab-delimited file with a header row.
///
/// Column types are inferred from every row, so a late decimal in a column
/// of whole numbers still reads as float. Any failure (missing file, ragged
/// rows, undecodable bytes) is reported as `MalformedInput` carrying the
/// offending path.
pub fn read_tsv(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        error!("Input table not found: {}", path.display());
        return Err(PipelineError::malformed(path, "file does not exist or is not readable"));
    }

    info!("Reading {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|o| {
            o.with_separator(b'\t')
                .with_null_values(Some(NullValues::AllColumns(vec![NA_TOKEN.into()])))
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| {
            error!("Failed to parse {}: {}", path.display(), e);
            PipelineError::malformed(path, e.to_string())
        })?;

    debug!("{} -> {} rows x {} cols", path.display(), df.height(), df.width());
    Ok(df)
}

/// Write a frame as TSV, creating parent directories on demand.
pub fn dataframe_to_tsv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .finish(df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Fail with `MalformedInput` unless every column in `required` is present.
pub fn require_columns(df: &DataFrame, required: &[&str], source: &Path) -> Result<()> {
    for &name in required {
        if !has_column(df, name) {
            let available: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
            return Err(PipelineError::malformed(
                source,
                format!("required column '{name}' not found (available: {})", available.join(", ")),
            ));
        }
    }
    Ok(())
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Strictly cast a column to `Float64` in place; values that do not parse are an error
/// rather than silently becoming null.
pub fn cast_numeric(df: &mut DataFrame, name: &str, source: &Path) -> Result<()> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::malformed(source, format!("column '{name}' not found")))?;
    if column.dtype() == &DataType::Float64 {
        return Ok(());
    }
    let cast = column
        .as_materialized_series()
        .strict_cast(&DataType::Float64)
        .map_err(|e| {
            PipelineError::malformed(source, format!("column '{name}' has non-numeric values: {e}"))
        })?;
    df.with_column(cast)?;
    Ok(())
}

/// Values of a numeric column as `f64`, keeping nulls. Integer columns are
/// widened; text that does not parse is an error.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    if column.dtype() == &DataType::Float64 {
        return Ok(column.f64()?.into_iter().collect());
    }
    let cast = column.as_materialized_series().strict_cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Collect string values of a column, keeping nulls.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let ca = df.column(name)?.str()?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Distinct non-null identifiers in a string column.
pub fn gene_set(df: &DataFrame, gene_col: &str) -> Result<BTreeSet<String>> {
    let ca = df.column(gene_col)?.str()?;
    Ok(ca.into_iter().flatten().map(str::to_string).collect())
}

/// `-log10(p)` with `p = 0` clamped to the smallest positive double.
pub fn neg_log10(p: f64) -> f64 {
    let score = -p.max(f64::MIN_POSITIVE).log10();
    if score == 0.0 { 0.0 } else { score }
}

//! Run configuration, read once from JSON and passed explicitly to every stage.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::classify::{Regulation, Thresholds};
use crate::data_handling::de_results::DeResultsDataset;
use crate::data_handling::expression::ExpressionDataset;
use crate::enrichment::{CommandEngine, EnrichmentEngine, PrecomputedEngine, DEFAULT_LABEL_PREFIXES};
use crate::error::{PipelineError, Result};
use crate::helper_functions::project_root;
use crate::highlight::HighlightSet;
use crate::join::MismatchPolicy;
use crate::plots::PlotStyle;

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Base for every relative path (defaults to `$PROJECT_ROOT` or the current directory)
    #[serde(default = "project_root")]
    pub working_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Name of the primary contrast, used in captions and file names
    #[serde(default = "default_contrast")]
    pub contrast: String,
    pub de_table: DeResultsDataset,
    #[serde(default)]
    pub comparison: Option<ComparisonConfig>,
    #[serde(default)]
    pub expression_table: Option<ExpressionDataset>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub highlights: HighlightSet,
    #[serde(default)]
    pub enrichment: Option<EnrichmentConfig>,
    #[serde(default)]
    pub join_mismatch: MismatchPolicy,
    #[serde(default)]
    pub plots: PlotStyle,
}

/// A second DE table whose significant genes are compared against the primary one.
#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonConfig {
    pub name: String,
    pub table: DeResultsDataset,
    /// Restrict both gene lists to one direction; any significant gene otherwise
    #[serde(default)]
    pub regulation: Option<Regulation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// GMT file
    pub gene_sets: PathBuf,
    /// Precomputed result table
    #[serde(default)]
    pub results: Option<PathBuf>,
    /// External engine: program followed by its leading arguments
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    #[serde(default = "default_label_prefixes")]
    pub label_prefixes: Vec<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("figures")
}

fn default_contrast() -> String {
    "contrast".to_string()
}

fn default_label_prefixes() -> Vec<String> {
    DEFAULT_LABEL_PREFIXES.iter().map(|s| s.to_string()).collect()
}

impl EnrichmentConfig {
    pub fn engine(&self) -> Result<Box<dyn EnrichmentEngine>> {
        match (&self.results, &self.command) {
            (Some(path), None) => Ok(Box::new(PrecomputedEngine {
                path: path.clone(),
                renames: self.renames.clone(),
            })),
            (None, Some(command)) => {
                let (program, args) = command
                    .split_first()
                    .ok_or_else(|| PipelineError::config("enrichment command is empty"))?;
                Ok(Box::new(CommandEngine {
                    program: program.clone(),
                    args: args.to_vec(),
                    renames: self.renames.clone(),
                }))
            }
            _ => Err(PipelineError::config(
                "enrichment needs exactly one of 'results' or 'command'",
            )),
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        info!("Reading run configuration from {}", path.display());
        let file = File::open(path)
            .map_err(|e| PipelineError::config(format!("cannot open {}: {e}", path.display())))?;
        let config: RunConfig = serde_json::from_reader(BufReader::new(file))?;
        let config = config.with_resolved_paths();
        config.validate()?;
        debug!("Run configuration: {:?}", config);
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Rebase every relative path on `working_dir`.
    pub fn with_resolved_paths(mut self) -> Self {
        self.output_dir = self.resolve(&self.output_dir);
        self.de_table.path = self.resolve(&self.de_table.path);
        if let Some(comparison) = self.comparison.as_ref() {
            let resolved = self.resolve(&comparison.table.path);
            if let Some(c) = self.comparison.as_mut() {
                c.table.path = resolved;
            }
        }
        if let Some(expression) = self.expression_table.as_ref() {
            let resolved = self.resolve(&expression.path);
            if let Some(e) = self.expression_table.as_mut() {
                e.path = resolved;
            }
        }
        if let Some(enrichment) = self.enrichment.as_ref() {
            let gene_sets = self.resolve(&enrichment.gene_sets);
            let results = enrichment.results.as_deref().map(|p| self.resolve(p));
            if let Some(e) = self.enrichment.as_mut() {
                e.gene_sets = gene_sets;
                e.results = results;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.contrast.trim().is_empty() {
            return Err(PipelineError::config("contrast name must not be empty"));
        }
        if let Some(expression) = &self.expression_table {
            if expression.groups.is_empty() {
                return Err(PipelineError::config("expression_table needs at least one group"));
            }
        }
        if let Some(enrichment) = &self.enrichment {
            enrichment.engine()?;
        }
        if self.plots.width == 0 || self.plots.height == 0 {
            return Err(PipelineError::config("plot dimensions must be positive"));
        }
        Ok(())
    }

    /// `<output_dir>/<contrast>_<suffix>`
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}", self.contrast, suffix))
    }
}

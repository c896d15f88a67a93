use polars::frame::DataFrame;

use crate::error::Result;

pub mod de_results;
pub mod expression;
pub mod gene_sets;
pub mod loader;

/// Canonical gene identifier column, the join key across every table.
pub const GENE_ID: &str = "gene_id";
pub const LOG2FC: &str = "log2_fold_change";
pub const PADJ: &str = "adjusted_p_value";

/// An input table that knows how to read and normalize itself.
pub trait Dataset {
    fn load(&self) -> Result<DataFrame>;
}

//! Load → classify → join → highlight/compare → render.
//!
//! All inputs are read and every view is built before the first figure is
//! drawn, so a bad file aborts the run without leaving partial plots behind.

use std::collections::BTreeMap;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::classify::{classify, label_counts, ranked_list, with_ranking_score, RankedList, Regulation};
use crate::config::RunConfig;
use crate::data_handling::gene_sets::GeneSetCollection;
use crate::data_handling::{Dataset, GENE_ID, LOG2FC, PADJ};
use crate::enrichment::annotate_enrichment;
use crate::error::Result;
use crate::helper_functions::dataframe_to_tsv;
use crate::highlight::{missing_highlights, select_highlights};
use crate::join::left_join_checked;
use crate::overlap::{compare, genes_with_label, OverlapCounts, OverlapResult};
use crate::plots::dotplot::render_dotplot;
use crate::plots::heatmap::render_heatmap;
use crate::plots::ma::render_ma;
use crate::plots::venn::render_venn;
use crate::plots::volcano::render_volcano;
use crate::views::{heatmap_view, ma_view, volcano_view};

/// Every table the renderers and reports need, built from one run's inputs.
#[derive(Debug, Clone)]
pub struct PreparedViews {
    pub classified: DataFrame,
    pub highlighted: DataFrame,
    pub missing_highlights: Vec<String>,
    pub volcano: DataFrame,
    pub ma: Option<DataFrame>,
    pub heatmap: Option<DataFrame>,
    pub groups: Vec<String>,
    pub overlap: Option<OverlapResult>,
    pub ranked: RankedList,
    pub enrichment: Option<DataFrame>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub label_counts: BTreeMap<Regulation, usize>,
    pub missing_highlights: Vec<String>,
    pub overlap: Option<OverlapCounts>,
    pub ranked_genes: usize,
    pub files: Vec<PathBuf>,
}

pub fn prepare(config: &RunConfig) -> Result<PreparedViews> {
    let policy = config.join_mismatch;

    // ── inputs ───────────────────────────────────────────────────────────────
    let de = config.de_table.load()?;
    let expression = match &config.expression_table {
        Some(table) => Some(table.load()?),
        None => None,
    };
    let comparison = match &config.comparison {
        Some(c) => Some((c, c.table.load()?)),
        None => None,
    };
    let gene_sets = match &config.enrichment {
        Some(e) => Some((e, GeneSetCollection::read_gmt(&e.gene_sets)?)),
        None => None,
    };

    // ── classification ───────────────────────────────────────────────────────
    let classified = classify(&de, LOG2FC, PADJ, &config.thresholds)?;
    let classified = with_ranking_score(&classified, LOG2FC, PADJ)?;
    let ranked = ranked_list(&classified, GENE_ID, LOG2FC, PADJ)?;

    // ── joined views ─────────────────────────────────────────────────────────
    let missing = missing_highlights(&classified, GENE_ID, &config.highlights)?;
    let annotated = match &expression {
        Some(expr) => left_join_checked(&classified, "differential expression", expr, "expression", GENE_ID, policy)?,
        None => classified.clone(),
    };
    let highlighted = select_highlights(&annotated, GENE_ID, config.highlights.iter())?;

    let volcano = volcano_view(&classified, &config.highlights)?;
    let groups: Vec<String> = config
        .expression_table
        .as_ref()
        .map(|t| t.groups.iter().map(|g| g.name.clone()).collect())
        .unwrap_or_default();
    let (ma, heatmap) = match &expression {
        Some(expr) => (
            Some(ma_view(&volcano, expr, policy)?),
            Some(heatmap_view(&classified, expr, &groups, &config.highlights, policy)?),
        ),
        None => (None, None),
    };

    // ── overlap ──────────────────────────────────────────────────────────────
    let overlap = match comparison {
        Some((cfg, table)) => {
            let other = classify(&table, LOG2FC, PADJ, &config.thresholds)?;
            let a = genes_with_label(&classified, GENE_ID, cfg.regulation)?;
            let b = genes_with_label(&other, GENE_ID, cfg.regulation)?;
            let result = compare(&a, &b);
            info!(
                "Overlap {} vs {}: {} / {} genes, {} shared",
                config.contrast,
                cfg.name,
                a.len(),
                b.len(),
                result.count_intersection
            );
            Some(result)
        }
        None => None,
    };

    // ── enrichment ───────────────────────────────────────────────────────────
    let enrichment = match gene_sets {
        Some((cfg, sets)) => {
            let raw = cfg.engine()?.run(&ranked, &sets)?;
            Some(annotate_enrichment(&raw, &sets, &cfg.label_prefixes)?)
        }
        None => None,
    };

    Ok(PreparedViews {
        classified,
        highlighted,
        missing_highlights: missing,
        volcano,
        ma,
        heatmap,
        groups,
        overlap,
        ranked,
        enrichment,
    })
}

/// One row per gene in either list, with its membership.
fn overlap_table(overlap: &OverlapResult, name_a: &str, name_b: &str) -> Result<DataFrame> {
    let mut genes: Vec<&str> = Vec::with_capacity(overlap.union_len());
    let mut membership: Vec<String> = Vec::with_capacity(overlap.union_len());
    for (set, label) in [
        (&overlap.intersection, "both".to_string()),
        (&overlap.unique_to_a, format!("{name_a} only")),
        (&overlap.unique_to_b, format!("{name_b} only")),
    ] {
        for gene in set {
            genes.push(gene);
            membership.push(label.clone());
        }
    }
    Ok(DataFrame::new(vec![
        Column::new(PlSmallStr::from(GENE_ID), genes),
        Column::new(PlSmallStr::from("membership"), membership),
    ])?)
}

/// Tables next to the figures: classified genes, highlights, overlap, enrichment.
pub fn write_tables(config: &RunConfig, views: &PreparedViews) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let path = config.output_path("classified.tsv");
    dataframe_to_tsv(&mut views.classified.clone(), &path)?;
    written.push(path);

    let path = config.output_path("highlights.tsv");
    dataframe_to_tsv(&mut views.highlighted.clone(), &path)?;
    written.push(path);

    let path = config.output_path("ranked.rnk");
    views.ranked.to_rnk(&path)?;
    written.push(path);

    if let (Some(overlap), Some(comparison)) = (&views.overlap, &config.comparison) {
        let path = config.output_path("overlap.tsv");
        dataframe_to_tsv(&mut overlap_table(overlap, &config.contrast, &comparison.name)?, &path)?;
        written.push(path);
    }

    if let Some(enrichment) = &views.enrichment {
        let path = config.output_path("enrichment.tsv");
        dataframe_to_tsv(&mut enrichment.clone(), &path)?;
        written.push(path);
    }
    Ok(written)
}

pub fn render_all(config: &RunConfig, views: &PreparedViews) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.output_dir)?;
    let style = &config.plots;
    let contrast = &config.contrast;
    let mut written = Vec::new();

    let path = config.output_path("volcano.png");
    render_volcano(&views.volcano, &config.thresholds, style, &format!("{contrast}: volcano"), &path)?;
    written.push(path);

    if let Some(ma) = &views.ma {
        let path = config.output_path("ma.png");
        render_ma(ma, &config.thresholds, style, &format!("{contrast}: MA"), &path)?;
        written.push(path);
    }

    if let Some(heatmap) = &views.heatmap {
        let path = config.output_path("heatmap.png");
        render_heatmap(heatmap, &views.groups, style, &format!("{contrast}: significant genes (z-score)"), &path)?;
        written.push(path);
    }

    if let Some(enrichment) = &views.enrichment {
        let path = config.output_path("enrichment_dotplot.png");
        render_dotplot(enrichment, style, &format!("{contrast}: gene set enrichment"), &path)?;
        written.push(path);
    }

    if let (Some(overlap), Some(comparison)) = (&views.overlap, &config.comparison) {
        let path = config.output_path("venn.png");
        render_venn(
            overlap.counts(),
            (contrast.as_str(), comparison.name.as_str()),
            style,
            "Differentially expressed genes",
            &path,
        )?;
        written.push(path);
    }

    Ok(written)
}

pub fn run(config: &RunConfig) -> Result<RunSummary> {
    info!("Starting run '{}'", config.contrast);
    let views = prepare(config)?;

    let mut files = write_tables(config, &views)?;
    files.extend(render_all(config, &views)?);

    Ok(RunSummary {
        label_counts: label_counts(&views.classified)?,
        missing_highlights: views.missing_highlights.clone(),
        overlap: views.overlap.as_ref().map(OverlapResult::counts),
        ranked_genes: views.ranked.len(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::de_results::DeResultsDataset;
    use crate::data_handling::expression::{ExpressionDataset, SampleGroup};
    use crate::config::{ComparisonConfig, EnrichmentConfig};
    use crate::highlight::HighlightSet;
    use crate::join::MismatchPolicy;
    use crate::plots::PlotStyle;
    use crate::classify::Thresholds;
    use std::path::Path;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn config(dir: &Path) -> RunConfig {
        let de = write(
            dir,
            "de.tsv",
            "annotation\tlogFC\tFDR\n\
             GeneX|ENSG1|pc\t1.2\t0.01\n\
             GeneY|ENSG2|pc\t-0.7\t0.03\n\
             GeneZ|ENSG3|pc\t0.1\t0.2\n",
        );
        let de2 = write(
            dir,
            "de2.tsv",
            "annotation\tlogFC\tFDR\n\
             GeneX|ENSG1|pc\t2.0\t0.001\n\
             GeneZ|ENSG3|pc\t1.0\t0.01\n\
             GeneQ|ENSG4|pc\tNA\t0.5\n",
        );
        let tpm = write(
            dir,
            "tpm.tsv",
            "gene\tc1\tc2\tc3\tc4\n\
             GeneX|ENSG1\t1\t3\t5\t7\n\
             GeneY|ENSG2\t8\t8\t2\t2\n\
             GeneZ|ENSG3\t1\t1\t1\t1\n",
        );
        let results = write(
            dir,
            "fgsea.tsv",
            "gene_set\tnes\tadjusted_p_value\tcore_member_count\n\
             HALLMARK_SET_ONE\t1.9\t0.01\t1\n\
             HALLMARK_SET_TWO\t-1.4\t0.04\t1\n",
        );
        let gmt = write(dir, "h.gmt", "HALLMARK_SET_ONE\tna\tGeneX\tGeneZ\nHALLMARK_SET_TWO\tna\tGeneY\n");

        let renames = BTreeMap::from([
            ("annotation".to_string(), GENE_ID.to_string()),
            ("logFC".to_string(), LOG2FC.to_string()),
            ("FDR".to_string(), PADJ.to_string()),
        ]);
        RunConfig {
            working_dir: dir.to_path_buf(),
            output_dir: dir.join("out"),
            contrast: "KO_vs_Scr".into(),
            de_table: DeResultsDataset { path: de, renames: renames.clone(), contract: None },
            comparison: Some(ComparisonConfig {
                name: "KO2_vs_Scr".into(),
                table: DeResultsDataset { path: de2, renames, contract: None },
                regulation: None,
            }),
            expression_table: Some(ExpressionDataset {
                path: tpm,
                renames: BTreeMap::from([("gene".to_string(), GENE_ID.to_string())]),
                contract: None,
                groups: vec![
                    SampleGroup::new("ko", ["c3", "c4"]),
                    SampleGroup::new("ctrl", ["c1", "c2"]),
                ],
            }),
            thresholds: Thresholds::default(),
            highlights: HighlightSet::new("targets", ["GeneY", "GeneMissing"]),
            enrichment: Some(EnrichmentConfig {
                gene_sets: gmt,
                results: Some(results),
                command: None,
                renames: BTreeMap::new(),
                label_prefixes: vec!["HALLMARK_".into()],
            }),
            join_mismatch: MismatchPolicy::Error,
            plots: PlotStyle::default(),
        }
    }

    #[test]
    fn prepares_consistent_views() {
        let dir = tempfile::tempdir().unwrap();
        let views = prepare(&config(dir.path())).unwrap();

        let counts = label_counts(&views.classified).unwrap();
        assert_eq!(counts[&Regulation::Upregulated], 1);
        assert_eq!(counts[&Regulation::Downregulated], 1);
        assert_eq!(views.ranked.gene_ids(), vec!["GeneX", "GeneZ", "GeneY"]);

        assert_eq!(views.missing_highlights, vec!["GeneMissing"]);
        assert_eq!(views.highlighted.height(), 1);
        assert!(views.highlighted.column("mean_ctrl").is_ok());

        assert_eq!(views.ma.as_ref().unwrap().height(), 3);
        assert_eq!(views.heatmap.as_ref().unwrap().height(), 2);
        assert_eq!(views.groups, vec!["ko", "ctrl"]);

        // KO: {GeneX, GeneY}; KO2: {GeneX, GeneZ}
        let overlap = views.overlap.as_ref().unwrap();
        assert_eq!(overlap.counts(), OverlapCounts { a: 2, b: 2, both: 1 });

        let enrichment = views.enrichment.as_ref().unwrap();
        assert_eq!(enrichment.height(), 2);
        assert!(enrichment.column("gene_ratio").is_ok());
    }

    #[test]
    fn writes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let views = prepare(&config).unwrap();
        let files = write_tables(&config, &views).unwrap();
        assert_eq!(files.len(), 5);
        assert!(files.iter().all(|f| f.exists()));

        let overlap = std::fs::read_to_string(config.output_path("overlap.tsv")).unwrap();
        assert!(overlap.contains("GeneX\tboth"));
        assert!(overlap.contains("GeneY\tKO_vs_Scr only"));
    }

    #[test]
    fn run_writes_tables_and_figures() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let summary = run(&config).unwrap();

        assert_eq!(summary.files.len(), 10);
        for suffix in [
            "volcano.png",
            "ma.png",
            "heatmap.png",
            "enrichment_dotplot.png",
            "venn.png",
            "classified.tsv",
            "ranked.rnk",
        ] {
            let path = config.output_path(suffix);
            assert!(summary.files.contains(&path), "{} not reported", path.display());
            let size = std::fs::metadata(&path).unwrap().len();
            assert!(size > 0, "{} is empty", path.display());
        }
        assert_eq!(summary.label_counts[&Regulation::Upregulated], 1);
        assert_eq!(summary.overlap, Some(OverlapCounts { a: 2, b: 2, both: 1 }));
        assert_eq!(summary.missing_highlights, vec!["GeneMissing"]);
        assert_eq!(summary.ranked_genes, 3);
    }

    #[test]
    fn bad_input_aborts_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.de_table.path = write(dir.path(), "broken.tsv", "annotation\tlogFC\tFDR\nGeneX\t1.0\tlow\n");
        assert!(run(&config).is_err());
        assert!(!config.output_dir.exists());
    }

    #[test]
    fn strict_join_policy_catches_unnormalized_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        let tpm = write(dir.path(), "tpm_ens.tsv", "gene\tc1\tc2\tc3\tc4\nENSG1\t1\t1\t1\t1\n");
        if let Some(expr) = config.expression_table.as_mut() {
            expr.path = tpm;
        }
        let err = prepare(&config).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::JoinKeyMismatch { .. }));
    }
}

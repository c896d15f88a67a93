//! Gene-set collections in GMT format
//! (`name<TAB>description<TAB>gene<TAB>gene...`, one set per line).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::data_handling::loader::canonical_gene_id;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct GeneSet {
    pub name: String,
    pub description: String,
    pub genes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GeneSetCollection {
    sets: Vec<GeneSet>,
    index: HashMap<String, usize>,
}

impl GeneSetCollection {
    pub fn new(sets: Vec<GeneSet>) -> Self {
        let mut collection = GeneSetCollection::default();
        for set in sets {
            collection.push(set);
        }
        collection
    }

    /// Later sets with an already-seen name are dropped.
    fn push(&mut self, set: GeneSet) {
        if self.index.contains_key(&set.name) {
            warn!("Duplicate gene set '{}' ignored", set.name);
            return;
        }
        self.index.insert(set.name.clone(), self.sets.len());
        self.sets.push(set);
    }

    pub fn read_gmt(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| PipelineError::malformed(path, format!("cannot open gene sets: {e}")))?;
        let mut collection = GeneSetCollection::default();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| PipelineError::malformed(path, e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default().trim();
            let description = fields.next().ok_or_else(|| {
                PipelineError::malformed(path, format!("line {} has no description field", line_no + 1))
            })?;
            if name.is_empty() {
                return Err(PipelineError::malformed(path, format!("line {} has no set name", line_no + 1)));
            }

            let mut genes: Vec<String> = Vec::new();
            for raw in fields {
                let gene = canonical_gene_id(raw.trim());
                if !gene.is_empty() && !genes.iter().any(|g| g == gene) {
                    genes.push(gene.to_string());
                }
            }
            collection.push(GeneSet {
                name: name.to_string(),
                description: description.to_string(),
                genes,
            });
        }

        info!("Read {} gene sets from {}", collection.len(), path.display());
        Ok(collection)
    }

    pub fn write_gmt(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for set in &self.sets {
            write!(out, "{}\t{}", set.name, set.description)?;
            for gene in &set.genes {
                write!(out, "\t{gene}")?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&GeneSet> {
        self.index.get(name).map(|&i| &self.sets[i])
    }

    pub fn size_of(&self, name: &str) -> Option<usize> {
        self.get(name).map(|s| s.genes.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneSet> {
        self.sets.iter()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_gmt_and_dedups_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets.gmt");
        std::fs::write(
            &path,
            "HALLMARK_P53_PATHWAY\thttp://x\tTP53\tMDM2\tTP53\n\nKEGG_CELL_CYCLE\tna\tCDK1|ENSG\tMDM2\n",
        )
        .unwrap();

        let sets = GeneSetCollection::read_gmt(&path).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets.size_of("HALLMARK_P53_PATHWAY"), Some(2));
        assert_eq!(sets.get("KEGG_CELL_CYCLE").unwrap().genes, vec!["CDK1", "MDM2"]);
        assert_eq!(sets.size_of("MISSING"), None);
    }

    #[test]
    fn line_without_description_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.gmt");
        std::fs::write(&path, "ONLY_NAME\n").unwrap();
        assert!(GeneSetCollection::read_gmt(&path).is_err());
    }

    #[test]
    fn write_then_read_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gmt");
        let sets = GeneSetCollection::new(vec![
            GeneSet { name: "B".into(), description: "-".into(), genes: vec!["g2".into()] },
            GeneSet { name: "A".into(), description: "-".into(), genes: vec!["g1".into(), "g3".into()] },
        ]);
        sets.write_gmt(&path).unwrap();
        let back = GeneSetCollection::read_gmt(&path).unwrap();
        let names: Vec<&str> = back.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}

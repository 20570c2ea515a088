use crate::engine::error::EngineError;
use std::path::{Path, PathBuf};

const BATCH_PREFIX: &str = "batch_";
const TABLE_EXTENSION: &str = "csv";

/// File layout of a search run directory.
///
/// ```text
/// <root>/batches/batch_<g>.csv        batch that seeds generation g
/// <root>/reserve.csv                  evaluated structures not yet used
/// <root>/evaluations.csv              every evaluated record, keep-first
/// <root>/structures/<id>.vasp         relaxed structure of each record
/// <root>/seed/{inputs,relax}/         initial population
/// <root>/generation_<g>/candidates.csv
/// <root>/generation_<g>/synthesis/<id>/
/// <root>/generation_<g>/relax/<id>/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn batches_dir(&self) -> PathBuf {
        self.root.join("batches")
    }

    pub fn batch(&self, generation: u32) -> PathBuf {
        self.batches_dir()
            .join(format!("{BATCH_PREFIX}{generation}.{TABLE_EXTENSION}"))
    }

    pub fn reserve(&self) -> PathBuf {
        self.root.join("reserve.csv")
    }

    pub fn archive(&self) -> PathBuf {
        self.root.join("evaluations.csv")
    }

    pub fn structures_dir(&self) -> PathBuf {
        self.root.join("structures")
    }

    pub fn structure(&self, material_id: &str) -> PathBuf {
        self.structures_dir().join(format!("{material_id}.vasp"))
    }

    pub fn seed_inputs_dir(&self) -> PathBuf {
        self.root.join("seed").join("inputs")
    }

    pub fn seed_relax_dir(&self) -> PathBuf {
        self.root.join("seed").join("relax")
    }

    pub fn generation_dir(&self, generation: u32) -> PathBuf {
        self.root.join(format!("generation_{generation}"))
    }

    pub fn candidates(&self, generation: u32) -> PathBuf {
        self.generation_dir(generation).join("candidates.csv")
    }

    pub fn synthesis_dir(&self, generation: u32) -> PathBuf {
        self.generation_dir(generation).join("synthesis")
    }

    pub fn relax_dir(&self, generation: u32) -> PathBuf {
        self.generation_dir(generation).join("relax")
    }

    pub(crate) fn create_dirs(&self) -> Result<(), EngineError> {
        for dir in [self.batches_dir(), self.structures_dir()] {
            std::fs::create_dir_all(&dir).map_err(EngineError::io(&dir))?;
        }
        Ok(())
    }

    /// The highest generation that has a batch file, if any.
    pub fn latest_batch(&self) -> Result<Option<u32>, EngineError> {
        let dir = self.batches_dir();
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut latest = None;
        for entry in std::fs::read_dir(&dir).map_err(EngineError::io(&dir))? {
            let path = entry.map_err(EngineError::io(&dir))?.path();
            if path.extension().is_none_or(|ext| ext != TABLE_EXTENSION) {
                continue;
            }
            let generation = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.strip_prefix(BATCH_PREFIX))
                .and_then(|g| g.parse::<u32>().ok());
            if let Some(g) = generation {
                latest = latest.max(Some(g));
            }
        }
        Ok(latest)
    }

    /// Copies a relaxed structure into the run's structure archive.
    pub(crate) fn archive_structure(
        &self,
        material_id: &str,
        relaxed: &Path,
    ) -> Result<PathBuf, EngineError> {
        let target = self.structure(material_id);
        std::fs::copy(relaxed, &target).map_err(EngineError::io(&target))?;
        Ok(target)
    }
}

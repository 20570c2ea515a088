use super::schema::{KeySchema, UnseenKeyPolicy};
use super::sro::{DescriptorError, DescriptorMode, SroDescriptor, compute_sro};
use crate::core::io::poscar::{PoscarError, PoscarFile};
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::Structure;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum BatchFailure {
    #[error("could not read structure: {0}")]
    Read(#[from] PoscarError),
    #[error("could not compute descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Descriptors of a set of structure files, with the failures kept apart.
#[derive(Debug, Default)]
pub struct BatchDescription {
    /// Sorted union of the keys of every successful descriptor.
    pub schema: KeySchema,
    pub entries: Vec<(PathBuf, SroDescriptor)>,
    pub failures: Vec<(PathBuf, BatchFailure)>,
}

impl BatchDescription {
    /// Vectorizes every entry against [`Self::schema`].
    ///
    /// Fails on a descriptor key the schema does not hold, which only
    /// happens if the schema was replaced after describing.
    pub fn vectors(&self) -> Result<Vec<(&Path, Vec<f64>)>, DescriptorError> {
        self.entries
            .iter()
            .map(|(path, descriptor)| {
                let vector = self.schema.vectorize(descriptor, UnseenKeyPolicy::Reject)?;
                Ok((path.as_path(), vector))
            })
            .collect()
    }
}

/// Lists the regular files of `dir` whose names match the optional prefix
/// and suffix, sorted by name.
pub fn collect_structure_files(
    dir: &Path,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let prefix_ok = prefix.is_none_or(|p| name.starts_with(p));
        let suffix_ok = suffix.is_none_or(|s| name.ends_with(s));
        if prefix_ok && suffix_ok {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Computes descriptors for in-memory structures in parallel, preserving order.
pub fn describe_structures(
    structures: &[Structure],
    cutoff: f64,
    modes: &[DescriptorMode],
) -> Vec<Result<SroDescriptor, DescriptorError>> {
    structures
        .par_iter()
        .map(|s| compute_sro(s, cutoff, modes))
        .collect()
}

/// Reads and describes every file in `paths` in parallel.
///
/// A file that cannot be read or described is recorded in
/// [`BatchDescription::failures`] and does not affect the others.
#[instrument(skip_all, name = "describe_batch")]
pub fn describe_batch(
    paths: &[PathBuf],
    cutoff: f64,
    modes: &[DescriptorMode],
) -> BatchDescription {
    info!(files = paths.len(), cutoff, "Describing structure batch.");

    let results: Vec<(PathBuf, Result<SroDescriptor, BatchFailure>)> = paths
        .par_iter()
        .map(|path| {
            let result = PoscarFile::read_from_path(path)
                .map_err(BatchFailure::from)
                .and_then(|(structure, _)| {
                    compute_sro(&structure, cutoff, modes).map_err(BatchFailure::from)
                });
            (path.clone(), result)
        })
        .collect();

    let mut batch = BatchDescription::default();
    for (path, result) in results {
        match result {
            Ok(descriptor) => batch.entries.push((path, descriptor)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping structure.");
                batch.failures.push((path, e));
            }
        }
    }
    batch.schema = KeySchema::from_descriptors(batch.entries.iter().map(|(_, d)| d));

    info!(
        described = batch.entries.len(),
        failed = batch.failures.len(),
        keys = batch.schema.len(),
        "Batch description complete."
    );
    batch
}

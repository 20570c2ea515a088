use crate::core::descriptor::{SroDescriptor, describe_structures};
use crate::core::io::poscar::PoscarFile;
use crate::core::io::traits::StructureFile;
use crate::engine::config::DescriptorConfig;
use crate::engine::scheduler::TaskOutcome;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// A relaxed structure together with its energy and descriptor.
#[derive(Debug, Clone)]
pub(crate) struct DescribedStructure {
    pub material_id: String,
    pub energy: f64,
    pub structure: PathBuf,
    pub descriptor: SroDescriptor,
}

/// Describes every relaxed outcome, ordered as the ids appear in `order`.
///
/// Skipped and failed tasks are dropped, as are relaxed structures that
/// cannot be read back or described.
pub(crate) fn describe_relaxed(
    outcomes: Vec<TaskOutcome>,
    order: &[String],
    config: &DescriptorConfig,
) -> Vec<DescribedStructure> {
    let rank: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut relaxed: Vec<(String, f64, PathBuf)> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            TaskOutcome::Relaxed {
                material_id,
                energy,
                structure,
            } => Some((material_id, energy, structure)),
            _ => None,
        })
        .collect();
    relaxed.sort_by_key(|(id, _, _)| rank.get(id.as_str()).copied().unwrap_or(usize::MAX));

    let mut readable = Vec::with_capacity(relaxed.len());
    let mut structures = Vec::with_capacity(relaxed.len());
    for (material_id, energy, path) in relaxed {
        match PoscarFile::read_from_path(&path) {
            Ok((structure, _)) => {
                structures.push(structure);
                readable.push((material_id, energy, path));
            }
            Err(e) => {
                warn!(material_id = %material_id, path = %path.display(), error = %e, "Cannot read relaxed structure; dropping it.");
            }
        }
    }

    describe_structures(&structures, config.cutoff, &config.modes)
        .into_iter()
        .zip(readable)
        .filter_map(|(result, (material_id, energy, structure))| match result {
            Ok(descriptor) => Some(DescribedStructure {
                material_id,
                energy,
                structure,
                descriptor,
            }),
            Err(e) => {
                warn!(material_id = %material_id, error = %e, "Cannot describe relaxed structure; dropping it.");
                None
            }
        })
        .collect()
}

//! Fakes for the external collaborators used by workflow tests.

use crate::core::descriptor::compute_sro;
use crate::core::io::poscar::PoscarFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::{Lattice, Species, Structure};
use crate::engine::config::{DescriptorConfig, SchedulerConfig};
use crate::engine::generator::{GenerationRequest, GeneratorError, StructureGenerator};
use crate::engine::process::ProcessError;
use crate::engine::relax::{RELAXED_SUFFIX, RelaxError, Relaxation, Relaxer};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Four Co and four Fe atoms on a simple cubic 2x2x2 grid of spacing 2.
pub fn binary_template() -> Structure {
    let fractional: Vec<Vector3<f64>> = (0..8)
        .map(|i| {
            Vector3::new(
                f64::from(i & 1) * 0.5,
                f64::from((i >> 1) & 1) * 0.5,
                f64::from((i >> 2) & 1) * 0.5,
            )
        })
        .collect();
    Structure::from_fractional(
        Lattice::cubic(4.0).unwrap(),
        vec![Species::new("Co", 4), Species::new("Fe", 4)],
        &fractional,
    )
    .unwrap()
}

/// Thirteen Co and fourteen Fe atoms on a simple cubic 3x3x3 grid of
/// spacing 2, giving 81 nearest-neighbour pairs.
pub fn alloy_template() -> Structure {
    let fractional: Vec<Vector3<f64>> = (0..27)
        .map(|i| {
            Vector3::new(
                f64::from(i % 3) / 3.0,
                f64::from((i / 3) % 3) / 3.0,
                f64::from(i / 9) / 3.0,
            )
        })
        .collect();
    Structure::from_fractional(
        Lattice::cubic(6.0).unwrap(),
        vec![Species::new("Co", 13), Species::new("Fe", 14)],
        &fractional,
    )
    .unwrap()
}

pub fn descriptor_config() -> DescriptorConfig {
    DescriptorConfig {
        cutoff: 2.5,
        ..DescriptorConfig::default()
    }
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_workers: 2,
        memory_threshold_bytes: 0,
        poll_interval: Duration::from_millis(5),
        min_distance: 0.6,
    }
}

/// Energy is minus the number of unlike nearest-neighbour pairs.
pub struct BondCountingRelaxer;

impl Relaxer for BondCountingRelaxer {
    fn relax(&self, input: &Path, _workdir: &Path) -> Result<Relaxation, RelaxError> {
        let (structure, _) = PoscarFile::read_from_path(input)
            .map_err(|_| RelaxError::InvalidInput(input.to_path_buf()))?;
        let descriptor = compute_sro(&structure, 2.5, &descriptor_config().modes)
            .map_err(|_| RelaxError::InvalidInput(input.to_path_buf()))?;
        let unlike = descriptor.get("CoFe").copied().unwrap_or(0);

        let mut relaxed = input.as_os_str().to_owned();
        relaxed.push(RELAXED_SUFFIX);
        let relaxed = PathBuf::from(relaxed);
        std::fs::copy(input, &relaxed).map_err(|_| RelaxError::MissingOutput(relaxed.clone()))?;
        Ok(Relaxation {
            energy: -f64::from(unlike),
            structure: relaxed,
        })
    }
}

pub struct FailingRelaxer;

impl Relaxer for FailingRelaxer {
    fn relax(&self, input: &Path, workdir: &Path) -> Result<Relaxation, RelaxError> {
        Err(RelaxError::Process(ProcessError::Exit {
            program: "relax".to_string(),
            status: format!("exit status: 1 ({})", input.display()),
            workdir: workdir.to_path_buf(),
        }))
    }
}

/// Writes a shuffled copy of the template for every request, except for
/// identifiers listed in `fail_ids`.
pub struct ShufflingGenerator {
    pub template: Structure,
    pub fail_ids: Vec<String>,
}

impl StructureGenerator for ShufflingGenerator {
    fn generate(
        &self,
        request: &GenerationRequest,
        workdir: &Path,
    ) -> Result<Vec<PathBuf>, GeneratorError> {
        if self.fail_ids.contains(&request.material_id) {
            return Err(GeneratorError::NoOutput(workdir.to_path_buf()));
        }
        let seed = request
            .material_id
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let mut rng = StdRng::seed_from_u64(seed);
        let path = workdir.join(format!("{}.vasp", request.material_id));
        PoscarFile::write_structure_to_path(&self.template.shuffled(&mut rng), &path)
            .map_err(|_| GeneratorError::NoOutput(workdir.to_path_buf()))?;
        Ok(vec![path])
    }
}

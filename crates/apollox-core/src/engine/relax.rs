use crate::engine::process::{ExternalCommand, ProcessError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the energy summary written by the relaxation engine.
pub const ENERGY_TABLE: &str = "sorted_energies.csv";
/// Suffix appended to the input file name for the relaxed structure.
pub const RELAXED_SUFFIX: &str = ".optdone";

#[derive(Debug, Error)]
pub enum RelaxError {
    #[error("Relaxation engine failed: {0}")]
    Process(#[from] ProcessError),
    #[error("Input path '{0}' has no file name")]
    InvalidInput(PathBuf),
    #[error("Failed to read energy table '{path}': {source}")]
    EnergyTable { path: PathBuf, source: csv::Error },
    #[error("Energy table '{path}' has no entry for '{name}'")]
    MissingEnergy { path: PathBuf, name: String },
    #[error("Relaxed structure '{0}' was not produced")]
    MissingOutput(PathBuf),
}

/// The result of one successful relaxation.
#[derive(Debug, Clone, PartialEq)]
pub struct Relaxation {
    pub energy: f64,
    /// Path of the relaxed structure file.
    pub structure: PathBuf,
}

/// Relaxes one structure file and reports its final energy.
///
/// Implementations are called concurrently, each with its own `workdir`
/// that already contains `input`.
pub trait Relaxer: Send + Sync {
    fn relax(&self, input: &Path, workdir: &Path) -> Result<Relaxation, RelaxError>;
}

#[derive(Debug, Deserialize)]
struct EnergyRow {
    name: String,
    energy: f64,
}

/// Reads the energy reported for `name` from a `name,energy` table.
pub fn read_energy(path: &Path, name: &str) -> Result<f64, RelaxError> {
    let to_err = |source| RelaxError::EnergyTable {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(to_err)?;
    for row in reader.deserialize::<EnergyRow>() {
        let row = row.map_err(to_err)?;
        if row.name == name {
            return Ok(row.energy);
        }
    }
    Err(RelaxError::MissingEnergy {
        path: path.to_path_buf(),
        name: name.to_string(),
    })
}

/// Drives an external relaxation program through its file contract.
///
/// The program is run inside the task directory as
/// `<program> <args..> --input_pattern <file> --mlp_optstep <n> --fmax <f> --output_csv sorted_energies.csv`
/// and must leave `<file>.optdone` and a `name,energy` table behind.
#[derive(Debug, Clone)]
pub struct ExternalRelaxer {
    command: ExternalCommand,
    max_steps: u32,
    fmax: f64,
}

impl ExternalRelaxer {
    pub fn new(command: ExternalCommand, max_steps: u32, fmax: f64) -> Self {
        Self {
            command,
            max_steps,
            fmax,
        }
    }
}

impl Relaxer for ExternalRelaxer {
    fn relax(&self, input: &Path, workdir: &Path) -> Result<Relaxation, RelaxError> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RelaxError::InvalidInput(input.to_path_buf()))?;

        self.command.run(
            [
                "--input_pattern".to_string(),
                name.clone(),
                "--mlp_optstep".to_string(),
                self.max_steps.to_string(),
                "--fmax".to_string(),
                self.fmax.to_string(),
                "--output_csv".to_string(),
                ENERGY_TABLE.to_string(),
            ],
            workdir,
        )?;

        let energy = read_energy(&workdir.join(ENERGY_TABLE), &name)?;
        let structure = workdir.join(format!("{name}{RELAXED_SUFFIX}"));
        if !structure.is_file() {
            return Err(RelaxError::MissingOutput(structure));
        }
        Ok(Relaxation { energy, structure })
    }
}

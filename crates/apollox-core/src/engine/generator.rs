use crate::core::descriptor::collect_structure_files;
use crate::engine::process::{ExternalCommand, ProcessError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Structure generator failed: {0}")]
    Process(#[from] ProcessError),
    #[error("Failed to list generator output in '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Generator produced no structure files in '{0}'")]
    NoOutput(PathBuf),
}

/// What the generator is asked to realize.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub material_id: String,
    /// Composition formula such as `Co12Fe12`.
    pub formula: String,
    /// Target descriptor values in schema order.
    pub element_values: Vec<f64>,
}

impl GenerationRequest {
    /// The comma-separated value string handed to the generator.
    pub fn element_values_arg(&self) -> String {
        self.element_values
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Turns a target descriptor into one or more structure files.
///
/// Implementations are called concurrently, each with its own `workdir`.
pub trait StructureGenerator: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
        workdir: &Path,
    ) -> Result<Vec<PathBuf>, GeneratorError>;
}

/// Runs an external generative model inside `workdir` as
/// `<program> <args..> --formula=<f> --pressure=<p> --label=<id> --element_values=<v1,v2,..> --batch_size=1 --num_batches_to_samples=<n>`
/// and collects the structure files it leaves there.
#[derive(Debug, Clone)]
pub struct ExternalGenerator {
    command: ExternalCommand,
    pressure: f64,
    samples: u32,
    output_prefix: Option<String>,
    output_suffix: Option<String>,
}

impl ExternalGenerator {
    pub fn new(command: ExternalCommand) -> Self {
        Self {
            command,
            pressure: 0.0,
            samples: 1,
            output_prefix: None,
            output_suffix: None,
        }
    }

    pub fn pressure(mut self, pressure: f64) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Restricts collected outputs to names with this prefix.
    pub fn output_prefix(mut self, prefix: Option<String>) -> Self {
        self.output_prefix = prefix;
        self
    }

    /// Restricts collected outputs to names with this suffix.
    pub fn output_suffix(mut self, suffix: Option<String>) -> Self {
        self.output_suffix = suffix;
        self
    }
}

impl StructureGenerator for ExternalGenerator {
    fn generate(
        &self,
        request: &GenerationRequest,
        workdir: &Path,
    ) -> Result<Vec<PathBuf>, GeneratorError> {
        self.command.run(
            [
                format!("--formula={}", request.formula),
                format!("--pressure={}", self.pressure),
                format!("--label={}", request.material_id),
                format!("--element_values={}", request.element_values_arg()),
                "--batch_size=1".to_string(),
                format!("--num_batches_to_samples={}", self.samples),
            ],
            workdir,
        )?;

        let files = collect_structure_files(
            workdir,
            self.output_prefix.as_deref(),
            self.output_suffix.as_deref(),
        )
        .map_err(|source| GeneratorError::Io {
            path: workdir.to_path_buf(),
            source,
        })?;
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| !p.file_name().is_some_and(|n| n.to_string_lossy().ends_with(".log")))
            .collect();
        if files.is_empty() {
            return Err(GeneratorError::NoOutput(workdir.to_path_buf()));
        }
        Ok(files)
    }
}

use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use super::scaler::ScalerError;
use super::scheduler::SchedulerError;
use super::surrogate::SurrogateError;
use super::swarm::SwarmError;
use crate::core::descriptor::DescriptorError;
use crate::core::io::poscar::PoscarError;
use crate::core::io::table::TableError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Surrogate model error: {0}")]
    Surrogate(#[from] SurrogateError),

    #[error("Particle swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Feature scaling error: {0}")]
    Scaler(#[from] ScalerError),

    #[error("Evaluation table error: {0}")]
    Table(#[from] TableError),

    #[error("Structure file error: {0}")]
    Structure(#[from] PoscarError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Generation {generation} produced no usable records and the reserve table is exhausted"
    )]
    Exhausted { generation: u32 },

    #[error("Nothing to resume from in '{0}'")]
    NothingToResume(PathBuf),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| EngineError::Io { path, source }
    }
}

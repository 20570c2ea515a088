use crate::error::{CliError, Result};
use apollox::core::descriptor::{DescriptorMode, UnseenKeyPolicy};
use apollox::engine::surrogate::PolynomialTail;
use serde::Deserialize;
use serde::de::IntoDeserializer;
use serde::de::value::StrDeserializer;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSearchConfig {
    pub run_dir: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub generations: Option<u32>,
    pub structures_per_generation: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileDescriptorConfig {
    pub cutoff: Option<f64>,
    pub modes: Option<Vec<DescriptorMode>>,
    pub unseen_keys: Option<UnseenKeyPolicy>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSurrogateConfig {
    pub tail: Option<PolynomialTail>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSwarmConfig {
    pub swarm_ratio: Option<f64>,
    pub iterations: Option<usize>,
    pub inertia: Option<f64>,
    pub cognitive: Option<f64>,
    pub social: Option<f64>,
    pub lower_scale: Option<f64>,
    pub upper_scale: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSchedulerConfig {
    pub max_workers: Option<usize>,
    pub memory_threshold_gb: Option<f64>,
    pub poll_interval_secs: Option<f64>,
    pub min_distance: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRelaxerConfig {
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    pub max_steps: Option<u32>,
    pub fmax: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileGeneratorConfig {
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    pub pressure: Option<f64>,
    pub samples: Option<u32>,
    pub output_prefix: Option<String>,
    pub output_suffix: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileScalerConfig {
    pub path: Option<PathBuf>,
}

/// The run configuration file. Every value is optional here; requirements
/// are enforced when it is merged with the command line.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub search: Option<FileSearchConfig>,
    pub descriptor: Option<FileDescriptorConfig>,
    pub surrogate: Option<FileSurrogateConfig>,
    pub swarm: Option<FileSwarmConfig>,
    pub scheduler: Option<FileSchedulerConfig>,
    pub relaxer: Option<FileRelaxerConfig>,
    pub generator: Option<FileGeneratorConfig>,
    pub scaler: Option<FileScalerConfig>,
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

/// Parses a kebab-case enum variant name such as `affine` or `reject`.
fn parse_enum<'a, T: Deserialize<'a>>(key: &str, value: &'a str) -> Result<T> {
    let deserializer: StrDeserializer<'a, serde::de::value::Error> = value.into_deserializer();
    T::deserialize(deserializer)
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Applies repeated `KEY=VALUE` overrides, keys being `section.field`
    /// in the file's kebab-case spelling.
    pub fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            match key {
                "search.generations" => {
                    self.search.get_or_insert_with(Default::default).generations =
                        Some(parse_value(key, value, "integer")?);
                }
                "search.structures-per-generation" => {
                    self.search
                        .get_or_insert_with(Default::default)
                        .structures_per_generation = Some(parse_value(key, value, "integer")?);
                }
                "search.seed" => {
                    self.search.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value, "integer")?);
                }
                "descriptor.cutoff" => {
                    self.descriptor.get_or_insert_with(Default::default).cutoff =
                        Some(parse_value(key, value, "float")?);
                }
                "descriptor.unseen-keys" => {
                    self.descriptor
                        .get_or_insert_with(Default::default)
                        .unseen_keys = Some(parse_enum(key, value)?);
                }
                "surrogate.tail" => {
                    self.surrogate.get_or_insert_with(Default::default).tail =
                        Some(parse_enum(key, value)?);
                }
                "swarm.swarm-ratio" => {
                    self.swarm.get_or_insert_with(Default::default).swarm_ratio =
                        Some(parse_value(key, value, "float")?);
                }
                "swarm.iterations" => {
                    self.swarm.get_or_insert_with(Default::default).iterations =
                        Some(parse_value(key, value, "integer")?);
                }
                "swarm.inertia" => {
                    self.swarm.get_or_insert_with(Default::default).inertia =
                        Some(parse_value(key, value, "float")?);
                }
                "swarm.cognitive" => {
                    self.swarm.get_or_insert_with(Default::default).cognitive =
                        Some(parse_value(key, value, "float")?);
                }
                "swarm.social" => {
                    self.swarm.get_or_insert_with(Default::default).social =
                        Some(parse_value(key, value, "float")?);
                }
                "scheduler.max-workers" => {
                    self.scheduler
                        .get_or_insert_with(Default::default)
                        .max_workers = Some(parse_value(key, value, "integer")?);
                }
                "scheduler.memory-threshold-gb" => {
                    self.scheduler
                        .get_or_insert_with(Default::default)
                        .memory_threshold_gb = Some(parse_value(key, value, "float")?);
                }
                "scheduler.poll-interval-secs" => {
                    self.scheduler
                        .get_or_insert_with(Default::default)
                        .poll_interval_secs = Some(parse_value(key, value, "float")?);
                }
                "scheduler.min-distance" => {
                    self.scheduler
                        .get_or_insert_with(Default::default)
                        .min_distance = Some(parse_value(key, value, "float")?);
                }
                "relaxer.max-steps" => {
                    self.relaxer.get_or_insert_with(Default::default).max_steps =
                        Some(parse_value(key, value, "integer")?);
                }
                "relaxer.fmax" => {
                    self.relaxer.get_or_insert_with(Default::default).fmax =
                        Some(parse_value(key, value, "float")?);
                }
                "generator.pressure" => {
                    self.generator.get_or_insert_with(Default::default).pressure =
                        Some(parse_value(key, value, "float")?);
                }
                "generator.samples" => {
                    self.generator.get_or_insert_with(Default::default).samples =
                        Some(parse_value(key, value, "integer")?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

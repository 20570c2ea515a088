use crate::core::descriptor::{DescriptorMode, UnseenKeyPolicy};
use crate::engine::surrogate::PolynomialTail;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        parameter,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorConfig {
    pub cutoff: f64,
    pub modes: Vec<DescriptorMode>,
    pub unseen_keys: UnseenKeyPolicy,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            cutoff: 5.0,
            modes: DescriptorMode::default_modes(),
            unseen_keys: UnseenKeyPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurrogateConfig {
    pub tail: PolynomialTail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwarmConfig {
    /// Swarm size as a fraction of the labeled batch size.
    pub swarm_ratio: f64,
    pub iterations: usize,
    pub inertia: f64,
    pub cognitive: f64,
    pub social: f64,
    /// Factors applied to the observed per-dimension minimum and maximum.
    pub lower_scale: f64,
    pub upper_scale: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            swarm_ratio: 0.6,
            iterations: 100,
            inertia: 0.8,
            cognitive: 2.0,
            social: 2.0,
            lower_scale: 0.8,
            upper_scale: 1.2,
        }
    }
}

impl SwarmConfig {
    /// `floor(swarm_ratio * batch_len)`, never less than one particle.
    pub fn swarm_size(&self, batch_len: usize) -> usize {
        ((self.swarm_ratio * batch_len as f64).floor() as usize).max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    /// New tasks are held back while available memory is below this.
    pub memory_threshold_bytes: u64,
    pub poll_interval: Duration,
    /// Structures with any interatomic distance below this are skipped.
    pub min_distance: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            memory_threshold_bytes: 4 * GIB,
            poll_interval: Duration::from_secs(10),
            min_distance: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub run_dir: PathBuf,
    pub generations: u32,
    pub structures_per_generation: usize,
    pub seed: Option<u64>,
    pub descriptor: DescriptorConfig,
    pub surrogate: SurrogateConfig,
    pub swarm: SwarmConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Default)]
pub struct SearchConfigBuilder {
    run_dir: Option<PathBuf>,
    generations: Option<u32>,
    structures_per_generation: Option<usize>,
    seed: Option<u64>,
    descriptor: Option<DescriptorConfig>,
    surrogate: Option<SurrogateConfig>,
    swarm: Option<SwarmConfig>,
    scheduler: Option<SchedulerConfig>,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_dir(mut self, path: PathBuf) -> Self {
        self.run_dir = Some(path);
        self
    }
    pub fn generations(mut self, n: u32) -> Self {
        self.generations = Some(n);
        self
    }
    pub fn structures_per_generation(mut self, n: usize) -> Self {
        self.structures_per_generation = Some(n);
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn descriptor(mut self, config: DescriptorConfig) -> Self {
        self.descriptor = Some(config);
        self
    }
    pub fn surrogate(mut self, config: SurrogateConfig) -> Self {
        self.surrogate = Some(config);
        self
    }
    pub fn swarm(mut self, config: SwarmConfig) -> Self {
        self.swarm = Some(config);
        self
    }
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = Some(config);
        self
    }

    pub fn build(self) -> Result<SearchConfig, ConfigError> {
        let config = SearchConfig {
            run_dir: self
                .run_dir
                .ok_or(ConfigError::MissingParameter("run_dir"))?,
            generations: self
                .generations
                .ok_or(ConfigError::MissingParameter("generations"))?,
            structures_per_generation: self
                .structures_per_generation
                .ok_or(ConfigError::MissingParameter("structures_per_generation"))?,
            seed: self.seed,
            descriptor: self.descriptor.unwrap_or_default(),
            surrogate: self.surrogate.unwrap_or_default(),
            swarm: self.swarm.unwrap_or_default(),
            scheduler: self.scheduler.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generations == 0 {
            return Err(invalid("generations", "must be at least 1"));
        }
        if self.structures_per_generation == 0 {
            return Err(invalid("structures_per_generation", "must be at least 1"));
        }
        let d = &self.descriptor;
        if !d.cutoff.is_finite() || d.cutoff <= 0.0 {
            return Err(invalid("cutoff", format!("must be positive, got {}", d.cutoff)));
        }
        if d.modes.is_empty() {
            return Err(invalid("modes", "at least one descriptor mode is required"));
        }
        let s = &self.swarm;
        if !s.swarm_ratio.is_finite() || s.swarm_ratio <= 0.0 {
            return Err(invalid("swarm_ratio", "must be positive"));
        }
        if s.iterations == 0 {
            return Err(invalid("iterations", "must be at least 1"));
        }
        if s.lower_scale > s.upper_scale {
            return Err(invalid(
                "lower_scale",
                format!(
                    "lower scale {} exceeds upper scale {}",
                    s.lower_scale, s.upper_scale
                ),
            ));
        }
        if self.scheduler.max_workers == 0 {
            return Err(invalid("max_workers", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
            .run_dir(PathBuf::from("run"))
            .generations(3)
            .structures_per_generation(10)
    }

    #[test]
    fn builder_fills_documented_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.descriptor.cutoff, 5.0);
        assert_eq!(config.descriptor.modes, vec![DescriptorMode::Pair]);
        assert_eq!(config.swarm.iterations, 100);
        assert_eq!(config.swarm.inertia, 0.8);
        assert_eq!(config.swarm.cognitive, 2.0);
        assert_eq!(config.swarm.social, 2.0);
        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.scheduler.memory_threshold_bytes, 4 * GIB);
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(10));
        assert_eq!(config.surrogate.tail, PolynomialTail::Constant);
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let result = SearchConfigBuilder::new().generations(1).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("run_dir")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let result = minimal()
            .scheduler(SchedulerConfig {
                max_workers: 0,
                ..SchedulerConfig::default()
            })
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                parameter: "max_workers",
                ..
            })
        ));

        let result = minimal()
            .descriptor(DescriptorConfig {
                modes: vec![],
                ..DescriptorConfig::default()
            })
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                parameter: "modes",
                ..
            })
        ));
    }

    #[test]
    fn swarm_size_is_floored_fraction_with_minimum_one() {
        let swarm = SwarmConfig::default();
        assert_eq!(swarm.swarm_size(100), 60);
        assert_eq!(swarm.swarm_size(9), 5);
        assert_eq!(swarm.swarm_size(1), 1);
    }
}

mod defaults;
mod file;

use crate::cli::SearchArgs;
use crate::error::{CliError, Result};
use apollox::engine::config::{
    self as core_config, DescriptorConfig, GIB, SchedulerConfig, SearchConfig,
    SearchConfigBuilder, SurrogateConfig, SwarmConfig,
};
use apollox::engine::generator::ExternalGenerator;
use apollox::engine::process::ExternalCommand;
use apollox::engine::relax::ExternalRelaxer;
use defaults::DefaultsConfig;
use file::{
    FileConfig, FileDescriptorConfig, FileGeneratorConfig, FileRelaxerConfig,
    FileSchedulerConfig, FileSwarmConfig,
};
use std::path::PathBuf;
use std::time::Duration;

/// Everything a `seed` or `run` invocation needs, merged from the config
/// file, `--set` overrides, and command-line flags (highest priority last).
#[derive(Debug)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub template: Option<PathBuf>,
    pub relaxer: Option<ExternalRelaxer>,
    pub generator: Option<ExternalGenerator>,
    pub scaler: Option<PathBuf>,
}

impl AppConfig {
    pub fn require_template(&self) -> Result<&PathBuf> {
        self.template.as_ref().ok_or_else(|| {
            CliError::Config(
                "A template structure is required via `search.template` or --template."
                    .to_string(),
            )
        })
    }

    pub fn require_relaxer(&self) -> Result<&ExternalRelaxer> {
        self.relaxer.as_ref().ok_or_else(|| {
            CliError::Config("`relaxer.program` is required to relax structures.".to_string())
        })
    }

    pub fn require_generator(&self) -> Result<&ExternalGenerator> {
        self.generator.as_ref().ok_or_else(|| {
            CliError::Config(
                "`generator.program` is required to synthesize candidates.".to_string(),
            )
        })
    }
}

pub fn build_config(args: &SearchArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let mut file_config = FileConfig::from_file(&args.config)?;
    file_config.apply_set_values(&args.set_values)?;

    let search_file = file_config.search.take().unwrap_or_default();
    let run_dir = args
        .run_dir
        .clone()
        .or(search_file.run_dir)
        .unwrap_or(defaults.run_dir.clone());
    let generations = args
        .generations
        .or(search_file.generations)
        .ok_or_else(|| CliError::Config("`search.generations` is required.".to_string()))?;
    let structures_per_generation = args
        .structures_per_generation
        .or(search_file.structures_per_generation)
        .ok_or_else(|| {
            CliError::Config("`search.structures-per-generation` is required.".to_string())
        })?;

    let mut scheduler = merge_scheduler(file_config.scheduler.take().unwrap_or_default())?;
    if let Some(max_workers) = args.max_workers {
        scheduler.max_workers = max_workers;
    }

    let search = SearchConfigBuilder::new()
        .run_dir(run_dir)
        .generations(generations)
        .structures_per_generation(structures_per_generation)
        .seed(args.seed.or(search_file.seed))
        .descriptor(merge_descriptor(
            file_config.descriptor.take().unwrap_or_default(),
        ))
        .surrogate(SurrogateConfig {
            tail: file_config
                .surrogate
                .take()
                .and_then(|s| s.tail)
                .unwrap_or_default(),
        })
        .swarm(merge_swarm(file_config.swarm.take().unwrap_or_default()))
        .scheduler(scheduler)
        .build()
        .map_err(|e: core_config::ConfigError| CliError::Config(e.to_string()))?;

    Ok(AppConfig {
        search,
        template: args.template.clone().or(search_file.template),
        relaxer: file_config
            .relaxer
            .take()
            .and_then(|r| merge_relaxer(r, &defaults)),
        generator: file_config
            .generator
            .take()
            .and_then(|g| merge_generator(g, &defaults)),
        scaler: file_config.scaler.take().and_then(|s| s.path),
    })
}

fn merge_descriptor(file: FileDescriptorConfig) -> DescriptorConfig {
    let defaults = DescriptorConfig::default();
    DescriptorConfig {
        cutoff: file.cutoff.unwrap_or(defaults.cutoff),
        modes: file.modes.unwrap_or(defaults.modes),
        unseen_keys: file.unseen_keys.unwrap_or(defaults.unseen_keys),
    }
}

fn merge_swarm(file: FileSwarmConfig) -> SwarmConfig {
    let defaults = SwarmConfig::default();
    SwarmConfig {
        swarm_ratio: file.swarm_ratio.unwrap_or(defaults.swarm_ratio),
        iterations: file.iterations.unwrap_or(defaults.iterations),
        inertia: file.inertia.unwrap_or(defaults.inertia),
        cognitive: file.cognitive.unwrap_or(defaults.cognitive),
        social: file.social.unwrap_or(defaults.social),
        lower_scale: file.lower_scale.unwrap_or(defaults.lower_scale),
        upper_scale: file.upper_scale.unwrap_or(defaults.upper_scale),
    }
}

fn merge_scheduler(file: FileSchedulerConfig) -> Result<SchedulerConfig> {
    let defaults = SchedulerConfig::default();
    let memory_threshold_bytes = match file.memory_threshold_gb {
        Some(gb) if gb.is_finite() && gb >= 0.0 => (gb * GIB as f64) as u64,
        Some(gb) => {
            return Err(CliError::Config(format!(
                "`scheduler.memory-threshold-gb` must be non-negative, got {}",
                gb
            )));
        }
        None => defaults.memory_threshold_bytes,
    };
    let poll_interval = match file.poll_interval_secs {
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
            CliError::Config(format!(
                "`scheduler.poll-interval-secs` must be a non-negative number, got {}",
                secs
            ))
        })?,
        None => defaults.poll_interval,
    };
    Ok(SchedulerConfig {
        max_workers: file.max_workers.unwrap_or(defaults.max_workers),
        memory_threshold_bytes,
        poll_interval,
        min_distance: file.min_distance.unwrap_or(defaults.min_distance),
    })
}

fn merge_relaxer(file: FileRelaxerConfig, defaults: &DefaultsConfig) -> Option<ExternalRelaxer> {
    let program = file.program?;
    Some(ExternalRelaxer::new(
        ExternalCommand {
            program,
            args: file.args,
        },
        file.max_steps.unwrap_or(defaults.relax_max_steps),
        file.fmax.unwrap_or(defaults.relax_fmax),
    ))
}

fn merge_generator(
    file: FileGeneratorConfig,
    defaults: &DefaultsConfig,
) -> Option<ExternalGenerator> {
    let program = file.program?;
    Some(
        ExternalGenerator::new(ExternalCommand {
            program,
            args: file.args,
        })
        .pressure(file.pressure.unwrap_or(defaults.generator_pressure))
        .samples(file.samples.unwrap_or(defaults.generator_samples))
        .output_prefix(file.output_prefix)
        .output_suffix(file.output_suffix),
    )
}

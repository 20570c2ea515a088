use std::path::PathBuf;

/// Values used when neither the config file nor the command line sets them.
pub struct DefaultsConfig {
    pub run_dir: PathBuf,
    pub relax_max_steps: u32,
    pub relax_fmax: f64,
    pub generator_pressure: f64,
    pub generator_samples: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("apollox-run"),
            relax_max_steps: 500,
            relax_fmax: 0.05,
            generator_pressure: 0.0,
            generator_samples: 1,
        }
    }
}

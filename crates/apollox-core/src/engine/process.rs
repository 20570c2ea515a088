use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to prepare log files in '{path}': {source}")]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status} (logs in '{workdir}')")]
    Exit {
        program: String,
        status: String,
        workdir: PathBuf,
    },
}

/// An opaque external program plus the arguments that precede the
/// per-invocation ones (for example an interpreter and a script path).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExternalCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn display_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Runs the program to completion inside `workdir`, capturing its output
    /// in [`STDOUT_LOG`] and [`STDERR_LOG`] there.
    pub fn run<I, S>(&self, extra_args: I, workdir: &Path) -> Result<(), ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let open_log = |name: &str| {
            let path = workdir.join(name);
            File::create(&path).map_err(|source| ProcessError::Log { path, source })
        };
        let stdout = open_log(STDOUT_LOG)?;
        let stderr = open_log(STDERR_LOG)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra_args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        debug!(command = ?command, "Launching external process.");

        let status = command.status().map_err(|source| ProcessError::Spawn {
            program: self.display_name(),
            source,
        })?;
        if !status.success() {
            return Err(ProcessError::Exit {
                program: self.display_name(),
                status: status.to_string(),
                workdir: workdir.to_path_buf(),
            });
        }
        Ok(())
    }
}

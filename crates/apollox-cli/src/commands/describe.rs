use crate::cli::{DescribeArgs, ModeArg};
use crate::error::{CliError, Result};
use apollox::core::descriptor::{DescriptorMode, collect_structure_files, describe_batch};
use apollox::core::io::table::write_candidates;
use apollox::core::models::evaluation::Candidate;
use apollox::engine::error::EngineError;
use tracing::{info, warn};

impl From<ModeArg> for DescriptorMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pair => DescriptorMode::Pair,
            ModeArg::Triple => DescriptorMode::Triple,
            ModeArg::Quadruple => DescriptorMode::Quadruple,
        }
    }
}

pub async fn run(args: DescribeArgs) -> Result<()> {
    if !(args.cutoff.is_finite() && args.cutoff > 0.0) {
        return Err(CliError::Argument(format!(
            "--cutoff must be a positive number, got {}",
            args.cutoff
        )));
    }
    let mut modes: Vec<DescriptorMode> = args.modes.iter().copied().map(Into::into).collect();
    modes.sort();
    modes.dedup();

    let files = collect_structure_files(
        &args.input_dir,
        args.prefix.as_deref(),
        args.suffix.as_deref(),
    )?;
    if files.is_empty() {
        return Err(CliError::Argument(format!(
            "No structure files found in {}",
            args.input_dir.display()
        )));
    }
    info!("Found {} structure file(s) to describe.", files.len());
    println!("Describing {} structure file(s)...", files.len());

    let batch = tokio::task::block_in_place(|| describe_batch(&files, args.cutoff, &modes));

    let candidates: Vec<Candidate> = batch
        .vectors()
        .map_err(EngineError::from)?
        .into_iter()
        .map(|(path, descriptor)| Candidate {
            material_id: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            descriptor,
        })
        .collect();
    write_candidates(&args.output, &batch.schema, &candidates).map_err(EngineError::from)?;

    for (path, failure) in &batch.failures {
        warn!("Could not describe {}: {}", path.display(), failure);
        println!("  Skipped {}: {}", path.display(), failure);
    }
    println!(
        "✓ {} descriptor(s) over {} key(s) written to: {}",
        candidates.len(),
        batch.schema.len(),
        args.output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollox::core::io::table::read_candidates;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn write_poscar(dir: &Path, name: &str, species: &str, counts: &str, coords: &[&str]) {
        let content = format!(
            "test\n1.0\n4.0 0.0 0.0\n0.0 4.0 0.0\n0.0 0.0 4.0\n{}\n{}\nDirect\n{}\n",
            species,
            counts,
            coords.join("\n")
        );
        fs::write(dir.join(name), content).unwrap();
    }

    fn describe_args(input_dir: PathBuf, output: PathBuf) -> DescribeArgs {
        DescribeArgs {
            input_dir,
            output,
            cutoff: 3.5,
            modes: vec![ModeArg::Pair],
            prefix: Some("POSCAR-".to_string()),
            suffix: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn describes_matching_files_and_skips_broken_ones() {
        let dir = tempdir().unwrap();
        write_poscar(
            dir.path(),
            "POSCAR-CoFe",
            "Co Fe",
            "1 1",
            &["0.0 0.0 0.0", "0.5 0.5 0.5"],
        );
        write_poscar(
            dir.path(),
            "POSCAR-Co2",
            "Co",
            "2",
            &["0.0 0.0 0.0", "0.5 0.5 0.5"],
        );
        fs::write(dir.path().join("POSCAR-broken"), "not a structure\n").unwrap();
        write_poscar(dir.path(), "notes.txt", "Co", "1", &["0.0 0.0 0.0"]);
        let output = dir.path().join("descriptors.csv");

        run(describe_args(dir.path().to_path_buf(), output.clone()))
            .await
            .unwrap();

        let (schema, candidates) = read_candidates(&output).unwrap();
        assert_eq!(schema.keys(), ["CoCo".to_string(), "CoFe".to_string()]);
        let ids: Vec<&str> = candidates.iter().map(|c| c.material_id.as_str()).collect();
        assert_eq!(ids, ["POSCAR-Co2", "POSCAR-CoFe"]);
        assert_eq!(candidates[0].descriptor, vec![1.0, 0.0]);
        assert_eq!(candidates[1].descriptor, vec![0.0, 1.0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_directory_is_an_argument_error() {
        let dir = tempdir().unwrap();
        let result = run(describe_args(
            dir.path().to_path_buf(),
            dir.path().join("out.csv"),
        ))
        .await;
        assert!(matches!(result, Err(CliError::Argument(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_positive_cutoff_is_rejected() {
        let dir = tempdir().unwrap();
        let mut args = describe_args(dir.path().to_path_buf(), dir.path().join("out.csv"));
        args.cutoff = 0.0;
        assert!(matches!(run(args).await, Err(CliError::Argument(_))));
    }
}

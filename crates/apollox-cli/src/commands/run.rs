use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use apollox::{
    core::io::{poscar::PoscarFile, traits::StructureFile},
    engine::{memory::SystemMemory, progress::ProgressReporter},
    workflows::search::GenerationOrchestrator,
};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args.search)?;
    let template_path = app.require_template()?;
    let relaxer = app.require_relaxer()?.clone();
    let generator = app.require_generator()?.clone();

    let (template, _) =
        PoscarFile::read_from_path(template_path).map_err(|e| CliError::FileParsing {
            path: template_path.clone(),
            source: e.into(),
        })?;
    let formula = template.formula();
    info!("Candidates will be synthesized as {}.", formula);

    let mut orchestrator = GenerationOrchestrator::new(
        app.search.clone(),
        formula,
        Arc::new(generator),
        Arc::new(relaxer),
        Arc::new(SystemMemory::new()),
    )?;
    if let Some(scaler) = args.scaler.or(app.scaler) {
        info!("Standardizing candidates with statistics from {:?}", scaler);
        orchestrator = orchestrator.with_scaler(scaler);
    }

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Running search in {} for up to {} generation(s)...",
        app.search.run_dir.display(),
        app.search.generations
    );
    let summary = tokio::task::block_in_place(|| orchestrator.run(&reporter))?;

    if summary.generations.is_empty() {
        warn!("Every configured generation had already been completed.");
        println!("Nothing to do: the run has already reached its last generation.");
    }
    for generation in &summary.generations {
        println!(
            "  Generation {}: {} candidate(s), {} synthesized, {} relaxed, {} evaluated, {} backfilled",
            generation.generation,
            generation.candidates,
            generation.synthesized,
            generation.relaxed,
            generation.evaluated,
            generation.backfilled
        );
    }
    match &summary.best {
        Some(best) => println!(
            "✓ Best structure: {} at {:.4} eV (generation {})",
            best.material_id, best.energy, best.generation
        ),
        None => println!("✓ Search finished without any evaluated structure."),
    }

    Ok(())
}

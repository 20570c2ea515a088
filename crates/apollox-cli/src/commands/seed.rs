use crate::cli::SeedArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use apollox::{
    core::io::{poscar::PoscarFile, traits::StructureFile},
    engine::{memory::SystemMemory, progress::ProgressReporter},
    workflows,
};
use std::sync::Arc;
use tracing::info;

pub async fn run(args: SeedArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args.search)?;
    let template_path = app.require_template()?;
    let relaxer = app.require_relaxer()?.clone();

    info!("Loading template structure from {:?}", template_path);
    let (template, _) =
        PoscarFile::read_from_path(template_path).map_err(|e| CliError::FileParsing {
            path: template_path.clone(),
            source: e.into(),
        })?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Seeding run in {} from {} ({} structures)...",
        app.search.run_dir.display(),
        template.formula(),
        app.search.generations as usize * app.search.structures_per_generation
    );
    info!("Invoking the seeding workflow...");

    let result = tokio::task::block_in_place(|| {
        workflows::seed::run(
            &template,
            &app.search,
            Arc::new(relaxer),
            Arc::new(SystemMemory::new()),
            &reporter,
        )
    })?;

    println!(
        "✓ {} of {} structures evaluated over {} descriptor key(s).",
        result.evaluated,
        result.generated,
        result.schema.len()
    );
    println!(
        "  Generation 1 batch: {} record(s), reserve: {} record(s).",
        result.batch_len, result.reserve_len
    );
    if let Some(best) = &result.best {
        println!(
            "  Lowest energy so far: {:.4} eV ({})",
            best.energy, best.material_id
        );
    }

    Ok(())
}

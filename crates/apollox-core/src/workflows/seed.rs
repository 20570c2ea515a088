use super::evaluate::describe_relaxed;
use super::layout::RunLayout;
use crate::core::descriptor::KeySchema;
use crate::core::io::poscar::PoscarFile;
use crate::core::io::table::write_table;
use crate::core::io::traits::StructureFile;
use crate::core::models::evaluation::{EvaluationRecord, EvaluationTable, material_id};
use crate::core::models::structure::Structure;
use crate::engine::config::SearchConfig;
use crate::engine::error::EngineError;
use crate::engine::memory::MemoryProbe;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::relax::Relaxer;
use crate::engine::scheduler::{RelaxationTask, Scheduler};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{info, instrument};

/// Generation number attached to the initial population.
pub const SEED_GENERATION: u32 = 0;

#[derive(Debug, Clone)]
pub struct SeedResult {
    pub schema: KeySchema,
    pub generated: usize,
    pub evaluated: usize,
    pub batch_len: usize,
    pub reserve_len: usize,
    pub best: Option<EvaluationRecord>,
}

/// Builds the initial population of a run from one template structure.
///
/// `generations * structures_per_generation` shuffled copies of `template`
/// are relaxed and described. The descriptor schema of the run is pinned
/// from their keys, the first `structures_per_generation` records become the
/// batch of generation 1 and the remainder the reserve table.
#[instrument(skip_all, name = "seed_workflow")]
pub fn run(
    template: &Structure,
    config: &SearchConfig,
    relaxer: Arc<dyn Relaxer>,
    memory: Arc<dyn MemoryProbe>,
    reporter: &ProgressReporter,
) -> Result<SeedResult, EngineError> {
    config.validate()?;
    let layout = RunLayout::new(&config.run_dir);
    layout.create_dirs()?;
    let inputs_dir = layout.seed_inputs_dir();
    std::fs::create_dir_all(&inputs_dir).map_err(EngineError::io(&inputs_dir))?;

    let total = config.generations as usize * config.structures_per_generation;
    let formula = template.formula();
    info!(formula = %formula, total, "Generating initial population.");

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let tasks = reporter.phase("Shuffling template", || {
        (0..total)
            .map(|i| {
                let id = material_id(&formula, SEED_GENERATION, i);
                let input = inputs_dir.join(&id);
                PoscarFile::write_structure_to_path(&template.shuffled(&mut rng), &input)?;
                Ok(RelaxationTask {
                    material_id: id,
                    input,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()
    })?;
    let order: Vec<String> = tasks.iter().map(|t| t.material_id.clone()).collect();

    reporter.report(Progress::PhaseStart {
        name: "Relaxing initial population",
    });
    let scheduler = Scheduler::new(config.scheduler.clone(), relaxer, memory);
    let outcomes = scheduler.run(tasks, &layout.seed_relax_dir(), reporter)?;
    reporter.report(Progress::PhaseFinish);

    let described = reporter.phase("Describing initial population", || {
        describe_relaxed(outcomes, &order, &config.descriptor)
    });
    if described.is_empty() {
        return Err(EngineError::Exhausted {
            generation: SEED_GENERATION,
        });
    }

    let schema = KeySchema::from_descriptors(described.iter().map(|d| &d.descriptor));
    info!(keys = ?schema.keys(), "Pinned descriptor schema.");
    let mut archive = EvaluationTable::new(schema.clone());
    for entry in &described {
        let vector = schema.vectorize(&entry.descriptor, config.descriptor.unseen_keys)?;
        layout.archive_structure(&entry.material_id, &entry.structure)?;
        archive.push(EvaluationRecord::new(
            entry.material_id.clone(),
            vector,
            entry.energy,
            SEED_GENERATION,
        ))?;
    }

    let mut reserve = archive.clone();
    let batch = EvaluationTable::with_records(
        schema.clone(),
        reserve.take_front(config.structures_per_generation),
    )?;
    write_table(&layout.archive(), &archive)?;
    write_table(&layout.reserve(), &reserve)?;
    write_table(&layout.batch(1), &batch)?;

    let result = SeedResult {
        schema,
        generated: total,
        evaluated: archive.len(),
        batch_len: batch.len(),
        reserve_len: reserve.len(),
        best: archive.best().cloned(),
    };
    info!(
        evaluated = result.evaluated,
        batch = result.batch_len,
        reserve = result.reserve_len,
        "Initial population ready."
    );
    Ok(result)
}

use super::evaluate::describe_relaxed;
use super::layout::RunLayout;
use crate::core::descriptor::KeySchema;
use crate::core::io::table::{read_table, read_table_with_schema, write_candidates, write_table};
use crate::core::models::evaluation::{Candidate, EvaluationRecord, EvaluationTable, material_id};
use crate::engine::config::SearchConfig;
use crate::engine::error::EngineError;
use crate::engine::generator::{GenerationRequest, StructureGenerator};
use crate::engine::memory::MemoryProbe;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::relax::Relaxer;
use crate::engine::scaler::FeatureScaler;
use crate::engine::scheduler::{RelaxationTask, Scheduler};
use crate::engine::surrogate::RbfSurrogate;
use crate::engine::swarm::{Bounds, ParticleSwarm};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: u32,
    pub candidates: usize,
    pub synthesized: usize,
    pub relaxed: usize,
    /// New records added to the archive.
    pub evaluated: usize,
    /// Records taken from the reserve to fill the next batch.
    pub backfilled: usize,
    pub best_energy: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchSummary {
    pub generations: Vec<GenerationSummary>,
    pub best: Option<EvaluationRecord>,
}

/// Drives generations of propose, synthesize, relax, describe and select.
///
/// Every generation reads its batch from the run directory and writes the
/// batch of the next one, so a run interrupted between generations resumes
/// from the latest batch file.
pub struct GenerationOrchestrator {
    config: SearchConfig,
    formula: String,
    generator: Arc<dyn StructureGenerator>,
    scheduler: Scheduler,
    scaler_path: Option<PathBuf>,
    layout: RunLayout,
}

impl GenerationOrchestrator {
    /// `formula` is the composition every candidate is synthesized with.
    pub fn new(
        config: SearchConfig,
        formula: impl Into<String>,
        generator: Arc<dyn StructureGenerator>,
        relaxer: Arc<dyn Relaxer>,
        memory: Arc<dyn MemoryProbe>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let scheduler = Scheduler::new(config.scheduler.clone(), relaxer, memory);
        let layout = RunLayout::new(&config.run_dir);
        Ok(Self {
            config,
            formula: formula.into(),
            generator,
            scheduler,
            scaler_path: None,
            layout,
        })
    }

    /// Standardizes candidate vectors with the statistics in `path` before
    /// they reach the generator.
    pub fn with_scaler(mut self, path: impl Into<PathBuf>) -> Self {
        self.scaler_path = Some(path.into());
        self
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Runs every generation from the latest batch file up to
    /// `config.generations`.
    #[instrument(skip_all, name = "search_workflow")]
    pub fn run(&self, reporter: &ProgressReporter) -> Result<SearchSummary, EngineError> {
        let start = self
            .layout
            .latest_batch()?
            .ok_or_else(|| EngineError::NothingToResume(self.layout.root().to_path_buf()))?;
        let schema = read_table(&self.layout.batch(start))?.schema().clone();
        let scaler = self
            .scaler_path
            .as_deref()
            .map(|path| FeatureScaler::load(path, &schema))
            .transpose()?;

        if start > 1 {
            info!(generation = start, "Resuming from existing batch.");
        }
        let mut summary = SearchSummary::default();
        for generation in start..=self.config.generations {
            reporter.report(Progress::GenerationStart {
                generation,
                total: self.config.generations,
            });
            let result = self.run_generation(generation, &schema, scaler.as_ref(), reporter)?;
            reporter.report(Progress::GenerationFinish {
                generation,
                evaluated: result.evaluated,
            });
            summary.generations.push(result);
        }

        let archive = self.layout.archive();
        if archive.is_file() {
            summary.best = read_table_with_schema(&archive, &schema)?.best().cloned();
        }
        Ok(summary)
    }

    fn run_generation(
        &self,
        generation: u32,
        schema: &KeySchema,
        scaler: Option<&FeatureScaler>,
        reporter: &ProgressReporter,
    ) -> Result<GenerationSummary, EngineError> {
        info!(generation, "Starting generation.");
        let batch = read_table_with_schema(&self.layout.batch(generation), schema)?;
        let mut reserve = self.read_or_empty(&self.layout.reserve(), schema)?;
        let mut archive = self.read_or_empty(&self.layout.archive(), schema)?;
        let generation_dir = self.layout.generation_dir(generation);
        std::fs::create_dir_all(&generation_dir).map_err(EngineError::io(&generation_dir))?;

        let candidates = reporter.phase("Proposing candidates", || {
            self.propose(generation, &batch)
        })?;
        write_candidates(&self.layout.candidates(generation), schema, &candidates)?;

        let tasks = self.synthesize(generation, &candidates, scaler, reporter)?;
        let synthesized = tasks.len();
        let order: Vec<String> = candidates.iter().map(|c| c.material_id.clone()).collect();

        reporter.report(Progress::PhaseStart { name: "Relaxing" });
        let outcomes = self
            .scheduler
            .run(tasks, &self.layout.relax_dir(generation), reporter)?;
        reporter.report(Progress::PhaseFinish);
        let relaxed = outcomes.iter().filter(|o| o.is_relaxed()).count();

        let described = reporter.phase("Describing", || {
            describe_relaxed(outcomes, &order, &self.config.descriptor)
        });
        let mut fresh = EvaluationTable::new(schema.clone());
        for entry in described {
            let vector = match schema.vectorize(&entry.descriptor, self.config.descriptor.unseen_keys) {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(material_id = %entry.material_id, error = %e, "Descriptor does not fit the pinned schema; dropping record.");
                    continue;
                }
            };
            if archive.contains(&entry.material_id) {
                debug!(material_id = %entry.material_id, "Record already archived; keeping the first.");
                continue;
            }
            self.layout
                .archive_structure(&entry.material_id, &entry.structure)?;
            fresh.merge_dedup([EvaluationRecord::new(
                entry.material_id,
                vector,
                entry.energy,
                generation,
            )])?;
        }
        let evaluated = archive.merge_dedup(fresh.records().iter().cloned())?;

        let target = self.config.structures_per_generation;
        let mut next = fresh.head(target);
        let backfill = reserve.take_front(target - next.len());
        let backfilled = next.merge_dedup(backfill)?;
        if next.is_empty() {
            return Err(EngineError::Exhausted { generation });
        }
        if next.len() < target {
            warn!(
                generation,
                batch = next.len(),
                target,
                "Reserve exhausted; next batch is partial."
            );
        }

        // The next batch file marks the generation as done, so it goes last.
        write_table(&self.layout.archive(), &archive)?;
        write_table(&self.layout.reserve(), &reserve)?;
        write_table(&self.layout.batch(generation + 1), &next)?;

        let result = GenerationSummary {
            generation,
            candidates: candidates.len(),
            synthesized,
            relaxed,
            evaluated,
            backfilled,
            best_energy: fresh.best().map(|r| r.energy),
        };
        info!(
            generation,
            candidates = result.candidates,
            relaxed = result.relaxed,
            evaluated = result.evaluated,
            backfilled = result.backfilled,
            best_energy = ?result.best_energy,
            "Generation complete."
        );
        Ok(result)
    }

    fn read_or_empty(&self, path: &Path, schema: &KeySchema) -> Result<EvaluationTable, EngineError> {
        if path.is_file() {
            Ok(read_table_with_schema(path, schema)?)
        } else {
            Ok(EvaluationTable::new(schema.clone()))
        }
    }

    /// Fits the surrogate on `batch` and runs a fresh swarm against it.
    fn propose(
        &self,
        generation: u32,
        batch: &EvaluationTable,
    ) -> Result<Vec<Candidate>, EngineError> {
        let observations = batch.descriptors();
        let surrogate =
            RbfSurrogate::fit(&observations, &batch.energies(), self.config.surrogate.tail)?;
        let swarm_config = &self.config.swarm;
        let bounds = Bounds::from_observations(
            &observations,
            swarm_config.lower_scale,
            swarm_config.upper_scale,
        )?;
        let size = swarm_config.swarm_size(batch.len());
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(generation))),
            None => StdRng::from_entropy(),
        };
        debug!(generation, size, dim = bounds.dim(), "Starting particle swarm.");

        let mut objective =
            |positions: &[Vec<f64>]| surrogate.predict(positions).map_err(EngineError::from);
        let swarm = ParticleSwarm::new(bounds, size, swarm_config, rng, &mut objective)?;
        let outcome = swarm.run(swarm_config.iterations, objective)?;
        info!(
            generation,
            predicted_best = outcome.best_fitness,
            "Particle swarm finished."
        );

        Ok(outcome
            .positions
            .into_iter()
            .enumerate()
            .map(|(i, descriptor)| Candidate {
                material_id: material_id(&self.formula, generation, i),
                descriptor,
            })
            .collect())
    }

    /// Asks the generator for one structure per candidate. Candidates the
    /// generator fails on are dropped.
    fn synthesize(
        &self,
        generation: u32,
        candidates: &[Candidate],
        scaler: Option<&FeatureScaler>,
        reporter: &ProgressReporter,
    ) -> Result<Vec<RelaxationTask>, EngineError> {
        reporter.report(Progress::PhaseStart {
            name: "Synthesizing structures",
        });
        reporter.report(Progress::TaskStart {
            total_steps: candidates.len() as u64,
        });
        let root = self.layout.synthesis_dir(generation);
        let mut tasks = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let element_values = match scaler {
                Some(scaler) => scaler.transform(&candidate.descriptor)?,
                None => candidate.descriptor.clone(),
            };
            let request = GenerationRequest {
                material_id: candidate.material_id.clone(),
                formula: self.formula.clone(),
                element_values,
            };
            let workdir = root.join(&candidate.material_id);
            std::fs::create_dir_all(&workdir).map_err(EngineError::io(&workdir))?;

            match self.generator.generate(&request, &workdir) {
                Ok(files) => {
                    if files.len() > 1 {
                        debug!(material_id = %candidate.material_id, outputs = files.len(), "Using the first generated structure.");
                    }
                    if let Some(input) = files.into_iter().next() {
                        tasks.push(RelaxationTask {
                            material_id: candidate.material_id.clone(),
                            input,
                        });
                    }
                }
                Err(e) => {
                    warn!(material_id = %candidate.material_id, error = %e, "Structure synthesis failed; dropping candidate.");
                }
            }
            reporter.report(Progress::TaskIncrement);
        }
        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);
        info!(
            generation,
            synthesized = tasks.len(),
            candidates = candidates.len(),
            "Structure synthesis complete."
        );
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::table::read_candidates;
    use crate::engine::config::SearchConfigBuilder;
    use crate::engine::memory::FixedMemory;
    use crate::engine::surrogate::PolynomialTail;
    use crate::workflows::seed;
    use crate::workflows::testing::{
        BondCountingRelaxer, FailingRelaxer, ShufflingGenerator, alloy_template,
        descriptor_config, scheduler_config,
    };
    use tempfile::{TempDir, tempdir};

    fn config(root: &Path, generations: u32) -> SearchConfig {
        SearchConfigBuilder::new()
            .run_dir(root.to_path_buf())
            .generations(generations)
            .structures_per_generation(8)
            .seed(Some(11))
            .descriptor(descriptor_config())
            .scheduler(scheduler_config())
            .build()
            .unwrap()
    }

    /// Seeds a run with 24 structures: a batch of 8 and a reserve of 16.
    fn seeded_run() -> TempDir {
        let dir = tempdir().unwrap();
        seed::run(
            &alloy_template(),
            &config(dir.path(), 3),
            Arc::new(BondCountingRelaxer),
            Arc::new(FixedMemory(u64::MAX)),
            &ProgressReporter::new(),
        )
        .unwrap();
        dir
    }

    fn orchestrator(dir: &Path, generations: u32, fail_ids: Vec<String>) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            config(dir, generations),
            "Co13Fe14",
            Arc::new(ShufflingGenerator {
                template: alloy_template(),
                fail_ids,
            }),
            Arc::new(BondCountingRelaxer),
            Arc::new(FixedMemory(u64::MAX)),
        )
        .unwrap()
    }

    #[test]
    fn generations_evaluate_candidates_and_carry_a_full_batch_forward() {
        let dir = seeded_run();
        let search = orchestrator(dir.path(), 2, Vec::new());

        let summary = search.run(&ProgressReporter::new()).unwrap();

        assert_eq!(summary.generations.len(), 2);
        for (g, generation) in summary.generations.iter().enumerate() {
            assert_eq!(generation.generation, g as u32 + 1);
            // Swarm size is floor(0.6 * 8).
            assert_eq!(generation.candidates, 4);
            assert_eq!(generation.relaxed, 4);
            assert_eq!(generation.evaluated, 4);
            assert_eq!(generation.backfilled, 4);
        }

        let layout = search.layout();
        let next = read_table(&layout.batch(3)).unwrap();
        assert_eq!(next.len(), 8);
        let ids: Vec<_> = next.records().iter().map(|r| r.material_id.as_str()).collect();
        assert_eq!(
            ids[..4],
            [
                "POSCAR-Co13Fe14-2_0",
                "POSCAR-Co13Fe14-2_1",
                "POSCAR-Co13Fe14-2_2",
                "POSCAR-Co13Fe14-2_3"
            ]
        );
        assert_eq!(read_table(&layout.reserve()).unwrap().len(), 8);
        assert_eq!(read_table(&layout.archive()).unwrap().len(), 32);

        let (schema, candidates) = read_candidates(&layout.candidates(1)).unwrap();
        assert_eq!(&schema, next.schema());
        assert_eq!(candidates.len(), 4);
        assert!(
            candidates
                .iter()
                .flat_map(|c| &c.descriptor)
                .all(|x| x.fract() == 0.0)
        );
        assert!(summary.best.is_some());
    }

    #[test]
    fn failed_synthesis_drops_only_that_candidate() {
        let dir = seeded_run();
        let search = orchestrator(dir.path(), 1, vec!["POSCAR-Co13Fe14-1_0".into()]);

        let summary = search.run(&ProgressReporter::new()).unwrap();

        let generation = &summary.generations[0];
        assert_eq!(generation.candidates, 4);
        assert_eq!(generation.synthesized, 3);
        assert_eq!(generation.evaluated, 3);
        assert_eq!(generation.backfilled, 5);
        let next = read_table(&search.layout().batch(2)).unwrap();
        assert_eq!(next.records()[0].material_id, "POSCAR-Co13Fe14-1_1");
    }

    #[test]
    fn default_surrogate_drives_a_generation() {
        let dir = seeded_run();
        let search = orchestrator(dir.path(), 1, Vec::new());
        assert_eq!(search.config.surrogate.tail, PolynomialTail::default());

        let summary = search.run(&ProgressReporter::new()).unwrap();

        assert_eq!(summary.generations.len(), 1);
        assert_eq!(summary.generations[0].evaluated, 4);
        assert!(search.layout().batch(2).is_file());
    }

    #[test]
    fn generation_writes_archive_and_reserve_before_the_next_batch() {
        let dir = seeded_run();
        let search = orchestrator(dir.path(), 1, Vec::new());
        let layout = search.layout();
        // A directory where the reserve file belongs makes its write fail.
        std::fs::remove_file(layout.reserve()).unwrap();
        std::fs::create_dir(layout.reserve()).unwrap();

        assert!(search.run(&ProgressReporter::new()).is_err());

        assert!(!layout.batch(2).exists());
        assert_eq!(read_table(&layout.archive()).unwrap().len(), 28);
    }

    #[test]
    fn run_resumes_from_the_latest_batch() {
        let dir = seeded_run();
        orchestrator(dir.path(), 1, Vec::new())
            .run(&ProgressReporter::new())
            .unwrap();

        let summary = orchestrator(dir.path(), 2, Vec::new())
            .run(&ProgressReporter::new())
            .unwrap();

        assert_eq!(summary.generations.len(), 1);
        assert_eq!(summary.generations[0].generation, 2);
    }

    #[test]
    fn generation_with_no_records_and_no_reserve_is_exhausted() {
        let dir = tempdir().unwrap();
        seed::run(
            &alloy_template(),
            &config(dir.path(), 1),
            Arc::new(BondCountingRelaxer),
            Arc::new(FixedMemory(u64::MAX)),
            &ProgressReporter::new(),
        )
        .unwrap();

        let search = GenerationOrchestrator::new(
            config(dir.path(), 1),
            "Co13Fe14",
            Arc::new(ShufflingGenerator {
                template: alloy_template(),
                fail_ids: Vec::new(),
            }),
            Arc::new(FailingRelaxer),
            Arc::new(FixedMemory(u64::MAX)),
        )
        .unwrap();

        assert!(matches!(
            search.run(&ProgressReporter::new()),
            Err(EngineError::Exhausted { generation: 1 })
        ));
    }

    #[test]
    fn empty_run_directory_has_nothing_to_resume() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            orchestrator(dir.path(), 1, Vec::new()).run(&ProgressReporter::new()),
            Err(EngineError::NothingToResume(_))
        ));
    }

    #[test]
    fn generation_progress_events_are_reported() {
        let dir = seeded_run();
        let events = std::sync::Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if matches!(
                event,
                Progress::GenerationStart { .. } | Progress::GenerationFinish { .. }
            ) {
                events.lock().unwrap().push(event);
            }
        }));

        orchestrator(dir.path(), 1, Vec::new()).run(&reporter).unwrap();
        drop(reporter);

        assert_eq!(
            events.into_inner().unwrap(),
            vec![
                Progress::GenerationStart {
                    generation: 1,
                    total: 1
                },
                Progress::GenerationFinish {
                    generation: 1,
                    evaluated: 4
                },
            ]
        );
    }
}

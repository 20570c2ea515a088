use crate::core::descriptor::min_interatomic_distance;
use crate::core::io::poscar::{PoscarError, PoscarFile};
use crate::core::io::traits::StructureFile;
use crate::engine::config::SchedulerConfig;
use crate::engine::memory::MemoryProbe;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::relax::{RelaxError, Relaxer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, mpsc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to create task root '{path}': {source}")]
    TaskRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why a single task produced no energy.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to prepare task directory '{path}': {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid input structure: {0}")]
    Structure(#[from] PoscarError),
    #[error(transparent)]
    Relax(#[from] RelaxError),
}

/// One structure to relax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxationTask {
    pub material_id: String,
    pub input: PathBuf,
}

#[derive(Debug)]
pub enum TaskOutcome {
    Relaxed {
        material_id: String,
        energy: f64,
        structure: PathBuf,
    },
    /// The structure failed the minimum-distance check and was not relaxed.
    Skipped {
        material_id: String,
        min_distance: f64,
    },
    Failed {
        material_id: String,
        error: TaskError,
    },
}

impl TaskOutcome {
    pub fn material_id(&self) -> &str {
        match self {
            TaskOutcome::Relaxed { material_id, .. }
            | TaskOutcome::Skipped { material_id, .. }
            | TaskOutcome::Failed { material_id, .. } => material_id,
        }
    }

    pub fn is_relaxed(&self) -> bool {
        matches!(self, TaskOutcome::Relaxed { .. })
    }
}

/// Admission control shared by the submitter and the workers.
///
/// A task is admitted only while fewer than `max_in_flight` tasks hold a
/// permit and the memory probe reports at least `threshold` bytes. Waiting
/// submitters wake on every task completion and at least once per
/// `poll_interval`, since memory can also be freed by other processes.
struct AdmissionGate<'p> {
    in_flight: Mutex<usize>,
    released: Condvar,
    max_in_flight: usize,
    threshold: u64,
    poll_interval: std::time::Duration,
    probe: &'p dyn MemoryProbe,
    unknown_memory_warned: AtomicBool,
}

struct Permit<'g, 'p> {
    gate: &'g AdmissionGate<'p>,
}

impl<'p> AdmissionGate<'p> {
    fn new(config: &SchedulerConfig, probe: &'p dyn MemoryProbe) -> Self {
        Self {
            in_flight: Mutex::new(0),
            released: Condvar::new(),
            max_in_flight: config.max_workers,
            threshold: config.memory_threshold_bytes,
            poll_interval: config.poll_interval,
            probe,
            unknown_memory_warned: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn memory_available(&self) -> Result<(), u64> {
        match self.probe.available_bytes() {
            Some(bytes) if bytes < self.threshold => Err(bytes),
            Some(_) => Ok(()),
            None => {
                if !self.unknown_memory_warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        threshold_bytes = self.threshold,
                        "Available memory is unknown; memory admission control is disabled."
                    );
                }
                Ok(())
            }
        }
    }

    fn acquire(&self) -> Permit<'_, 'p> {
        let mut in_flight = self.lock();
        let mut waiting_for_memory = false;
        loop {
            if *in_flight < self.max_in_flight {
                match self.memory_available() {
                    Ok(()) => {
                        if waiting_for_memory {
                            info!("Memory available again; resuming submission.");
                        }
                        *in_flight += 1;
                        return Permit { gate: self };
                    }
                    Err(bytes) => {
                        if !waiting_for_memory {
                            info!(
                                available_bytes = bytes,
                                threshold_bytes = self.threshold,
                                "Available memory below threshold; holding new tasks."
                            );
                            waiting_for_memory = true;
                        }
                    }
                }
            }
            in_flight = self
                .released
                .wait_timeout(in_flight, self.poll_interval)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}

impl Drop for Permit<'_, '_> {
    fn drop(&mut self) {
        let mut in_flight = self.gate.lock();
        *in_flight = in_flight.saturating_sub(1);
        self.gate.released.notify_all();
    }
}

/// Runs relaxation tasks on a bounded, memory-gated worker pool.
pub struct Scheduler {
    config: SchedulerConfig,
    relaxer: Arc<dyn Relaxer>,
    memory: Arc<dyn MemoryProbe>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        relaxer: Arc<dyn Relaxer>,
        memory: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            config,
            relaxer,
            memory,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Relaxes every task, each inside `task_root/<material_id>/`.
    ///
    /// Returns one outcome per task in completion order. Individual failures
    /// never abort the batch, and failed tasks are not retried.
    #[instrument(skip_all, name = "relaxation_scheduler")]
    pub fn run(
        &self,
        tasks: Vec<RelaxationTask>,
        task_root: &Path,
        reporter: &ProgressReporter,
    ) -> Result<Vec<TaskOutcome>, SchedulerError> {
        std::fs::create_dir_all(task_root).map_err(|source| SchedulerError::TaskRoot {
            path: task_root.to_path_buf(),
            source,
        })?;
        info!(
            tasks = tasks.len(),
            max_workers = self.config.max_workers,
            "Scheduling relaxation tasks."
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .thread_name(|i| format!("relax-worker-{i}"))
            .build()?;
        let gate = AdmissionGate::new(&self.config, self.memory.as_ref());
        let (tx, rx) = mpsc::channel();

        reporter.report(Progress::TaskStart {
            total_steps: tasks.len() as u64,
        });
        pool.in_place_scope(|scope| {
            for task in tasks {
                let permit = gate.acquire();
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = self.execute(task, task_root);
                    drop(permit);
                    reporter.report(Progress::TaskIncrement);
                    // The receiver outlives the scope.
                    let _ = tx.send(outcome);
                });
            }
        });
        drop(tx);
        reporter.report(Progress::TaskFinish);

        let outcomes: Vec<TaskOutcome> = rx.into_iter().collect();
        let relaxed = outcomes.iter().filter(|o| o.is_relaxed()).count();
        info!(
            relaxed,
            not_relaxed = outcomes.len() - relaxed,
            "Relaxation batch complete."
        );
        Ok(outcomes)
    }

    fn execute(&self, task: RelaxationTask, task_root: &Path) -> TaskOutcome {
        let material_id = task.material_id.clone();
        match self.try_execute(&task, task_root) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(material_id = %material_id, error = %error, "Relaxation task failed.");
                TaskOutcome::Failed { material_id, error }
            }
        }
    }

    fn try_execute(&self, task: &RelaxationTask, task_root: &Path) -> Result<TaskOutcome, TaskError> {
        let workdir = task_root.join(&task.material_id);
        let prepare_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| TaskError::Prepare { path, source }
        };
        std::fs::create_dir_all(&workdir).map_err(prepare_err(&workdir))?;
        let file_name = task
            .input
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&task.material_id));
        let input = workdir.join(file_name);
        std::fs::copy(&task.input, &input).map_err(prepare_err(&input))?;

        let (structure, _) = PoscarFile::read_from_path(&input)?;
        if let Some(min_distance) = min_interatomic_distance(&structure) {
            if min_distance < self.config.min_distance {
                warn!(
                    material_id = %task.material_id,
                    min_distance,
                    threshold = self.config.min_distance,
                    "Atoms too close; skipping relaxation."
                );
                return Ok(TaskOutcome::Skipped {
                    material_id: task.material_id.clone(),
                    min_distance,
                });
            }
        }

        let relaxation = self.relaxer.relax(&input, &workdir)?;
        debug!(
            material_id = %task.material_id,
            energy = relaxation.energy,
            "Relaxation task complete."
        );
        Ok(TaskOutcome::Relaxed {
            material_id: task.material_id.clone(),
            energy: relaxation.energy,
            structure: relaxation.structure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::{Lattice, Species, Structure};
    use crate::engine::memory::FixedMemory;
    use crate::engine::relax::Relaxation;
    use nalgebra::Vector3;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};
    use tempfile::{TempDir, tempdir};

    /// Records how many relaxations run at once.
    #[derive(Default)]
    struct CountingRelaxer {
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
        started: Mutex<Vec<Instant>>,
        workdirs: Mutex<Vec<PathBuf>>,
        fail_ids: HashSet<String>,
    }

    impl Relaxer for CountingRelaxer {
        fn relax(&self, input: &Path, workdir: &Path) -> Result<Relaxation, RelaxError> {
            self.started.lock().unwrap().push(Instant::now());
            self.workdirs.lock().unwrap().push(workdir.to_path_buf());
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(25));
            self.active.fetch_sub(1, Ordering::SeqCst);

            let id = workdir.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_ids.contains(&id) {
                return Err(RelaxError::MissingOutput(input.to_path_buf()));
            }
            Ok(Relaxation {
                energy: -1.0,
                structure: input.to_path_buf(),
            })
        }
    }

    /// Reports low memory until `release_after` has elapsed.
    struct DelayedMemory {
        start: Instant,
        release_after: Duration,
        calls: AtomicUsize,
    }

    impl MemoryProbe for DelayedMemory {
        fn available_bytes(&self) -> Option<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.start.elapsed() < self.release_after {
                Some(0)
            } else {
                Some(u64::MAX)
            }
        }
    }

    /// Sleeps for the delay listed against a task, zero otherwise.
    struct StaggeredRelaxer {
        delays_ms: Vec<(String, u64)>,
    }

    impl Relaxer for StaggeredRelaxer {
        fn relax(&self, input: &Path, workdir: &Path) -> Result<Relaxation, RelaxError> {
            let id = workdir.file_name().unwrap().to_string_lossy().into_owned();
            let delay = self
                .delays_ms
                .iter()
                .find(|(name, _)| *name == id)
                .map_or(0, |(_, ms)| *ms);
            std::thread::sleep(Duration::from_millis(delay));
            Ok(Relaxation {
                energy: -1.0,
                structure: input.to_path_buf(),
            })
        }
    }

    struct UnknownMemory;

    impl MemoryProbe for UnknownMemory {
        fn available_bytes(&self) -> Option<u64> {
            None
        }
    }

    fn config(max_workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_workers,
            memory_threshold_bytes: 1024,
            poll_interval: Duration::from_millis(5),
            min_distance: 0.6,
        }
    }

    fn write_structure(dir: &Path, name: &str, separation: f64) -> PathBuf {
        let structure = Structure::new(
            Lattice::cubic(10.0).unwrap(),
            vec![Species::new("Fe", 2)],
            vec![Vector3::zeros(), Vector3::new(separation, 0.0, 0.0)],
        )
        .unwrap();
        let path = dir.join(name);
        PoscarFile::write_structure_to_path(&structure, &path).unwrap();
        path
    }

    fn tasks(dir: &TempDir, n: usize) -> Vec<RelaxationTask> {
        let inputs = dir.path().join("inputs");
        std::fs::create_dir_all(&inputs).unwrap();
        (0..n)
            .map(|i| RelaxationTask {
                material_id: format!("POSCAR-Fe2-1_{i}"),
                input: write_structure(&inputs, &format!("POSCAR-Fe2-1_{i}"), 2.0),
            })
            .collect()
    }

    #[test]
    fn never_runs_more_than_max_workers_at_once() {
        let dir = tempdir().unwrap();
        let relaxer = Arc::new(CountingRelaxer::default());
        let scheduler = Scheduler::new(config(2), relaxer.clone(), Arc::new(FixedMemory(u64::MAX)));

        let outcomes = scheduler
            .run(tasks(&dir, 8), &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();

        assert_eq!(outcomes.len(), 8);
        assert!(outcomes.iter().all(TaskOutcome::is_relaxed));
        assert!(relaxer.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(relaxer.calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn each_task_runs_in_its_own_directory_with_a_copy_of_its_input() {
        let dir = tempdir().unwrap();
        let relaxer = Arc::new(CountingRelaxer::default());
        let scheduler = Scheduler::new(config(3), relaxer.clone(), Arc::new(FixedMemory(u64::MAX)));
        let root = dir.path().join("relax");

        scheduler.run(tasks(&dir, 4), &root, &ProgressReporter::new()).unwrap();

        let workdirs: HashSet<PathBuf> = relaxer.workdirs.lock().unwrap().iter().cloned().collect();
        assert_eq!(workdirs.len(), 4);
        for i in 0..4 {
            let id = format!("POSCAR-Fe2-1_{i}");
            assert!(workdirs.contains(&root.join(&id)));
            assert!(root.join(&id).join(&id).is_file());
        }
    }

    #[test]
    fn close_atoms_are_skipped_without_relaxation() {
        let dir = tempdir().unwrap();
        let mut batch = tasks(&dir, 2);
        batch.push(RelaxationTask {
            material_id: "POSCAR-bad".into(),
            input: write_structure(dir.path(), "POSCAR-bad", 0.3),
        });
        let relaxer = Arc::new(CountingRelaxer::default());
        let scheduler = Scheduler::new(config(2), relaxer.clone(), Arc::new(FixedMemory(u64::MAX)));

        let outcomes = scheduler
            .run(batch, &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();

        let skipped: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o, TaskOutcome::Skipped { .. }))
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].material_id(), "POSCAR-bad");
        assert_eq!(relaxer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_relaxation_does_not_abort_the_batch() {
        let dir = tempdir().unwrap();
        let relaxer = Arc::new(CountingRelaxer {
            fail_ids: ["POSCAR-Fe2-1_1".to_string()].into(),
            ..CountingRelaxer::default()
        });
        let scheduler = Scheduler::new(config(2), relaxer, Arc::new(FixedMemory(u64::MAX)));

        let outcomes = scheduler
            .run(tasks(&dir, 4), &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o, TaskOutcome::Failed { .. }))
            .map(TaskOutcome::material_id)
            .collect();
        assert_eq!(failed, ["POSCAR-Fe2-1_1"]);
    }

    #[test]
    fn malformed_input_fails_only_its_own_task() {
        let dir = tempdir().unwrap();
        let mut batch = tasks(&dir, 2);
        let malformed = dir.path().join("POSCAR-huge");
        std::fs::write(
            &malformed,
            "huge\n1.0\n10 0 0\n0 10 0\n0 0 10\nFe\n1000000000000000000\nDirect\n0 0 0\n",
        )
        .unwrap();
        batch.insert(
            0,
            RelaxationTask {
                material_id: "POSCAR-huge".into(),
                input: malformed,
            },
        );
        let relaxer = Arc::new(CountingRelaxer::default());
        let scheduler = Scheduler::new(config(2), relaxer.clone(), Arc::new(FixedMemory(u64::MAX)));

        let outcomes = scheduler
            .run(batch, &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    TaskOutcome::Failed {
                        error: TaskError::Structure(_),
                        ..
                    }
                )
            })
            .map(TaskOutcome::material_id)
            .collect();
        assert_eq!(failed, ["POSCAR-huge"]);
        assert_eq!(outcomes.iter().filter(|o| o.is_relaxed()).count(), 2);
        assert_eq!(relaxer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn outcomes_arrive_in_completion_order() {
        let dir = tempdir().unwrap();
        let batch = tasks(&dir, 3);
        let relaxer = Arc::new(StaggeredRelaxer {
            delays_ms: vec![("POSCAR-Fe2-1_0".to_string(), 200)],
        });
        let scheduler = Scheduler::new(config(2), relaxer, Arc::new(FixedMemory(u64::MAX)));

        let outcomes = scheduler
            .run(batch, &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();

        let ids: Vec<_> = outcomes.iter().map(TaskOutcome::material_id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[2], "POSCAR-Fe2-1_0");
    }

    #[test]
    fn missing_input_is_a_task_failure() {
        let dir = tempdir().unwrap();
        let scheduler = Scheduler::new(
            config(1),
            Arc::new(CountingRelaxer::default()),
            Arc::new(FixedMemory(u64::MAX)),
        );
        let outcomes = scheduler
            .run(
                vec![RelaxationTask {
                    material_id: "ghost".into(),
                    input: dir.path().join("does-not-exist"),
                }],
                &dir.path().join("relax"),
                &ProgressReporter::new(),
            )
            .unwrap();
        assert!(matches!(
            outcomes[0],
            TaskOutcome::Failed {
                error: TaskError::Prepare { .. },
                ..
            }
        ));
    }

    #[test]
    fn low_memory_holds_submission_until_memory_frees() {
        let dir = tempdir().unwrap();
        let relaxer = Arc::new(CountingRelaxer::default());
        let start = Instant::now();
        let probe = Arc::new(DelayedMemory {
            start,
            release_after: Duration::from_millis(60),
            calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(config(2), relaxer.clone(), probe.clone());

        let outcomes = scheduler
            .run(tasks(&dir, 3), &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        let first_start = relaxer.started.lock().unwrap().iter().min().copied().unwrap();
        assert!(first_start.duration_since(start) >= Duration::from_millis(60));
        assert!(probe.calls.load(Ordering::SeqCst) > 3);
    }

    #[test]
    fn unknown_memory_admits_work() {
        let dir = tempdir().unwrap();
        let scheduler = Scheduler::new(
            config(2),
            Arc::new(CountingRelaxer::default()),
            Arc::new(UnknownMemory),
        );
        let outcomes = scheduler
            .run(tasks(&dir, 2), &dir.path().join("relax"), &ProgressReporter::new())
            .unwrap();
        assert!(outcomes.iter().all(TaskOutcome::is_relaxed));
    }

    #[test]
    fn unknown_memory_is_reported_once() {
        let memory = UnknownMemory;
        let gate = AdmissionGate::new(&config(2), &memory);
        assert!(!gate.unknown_memory_warned.load(Ordering::Relaxed));

        let first = gate.acquire();
        let second = gate.acquire();
        assert!(gate.unknown_memory_warned.load(Ordering::Relaxed));
        assert_eq!(*gate.lock(), 2);
        drop((first, second));
        assert_eq!(*gate.lock(), 0);
    }

    #[test]
    fn progress_counts_every_task() {
        let dir = tempdir().unwrap();
        let increments = AtomicUsize::new(0);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if event == Progress::TaskIncrement {
                increments.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let scheduler = Scheduler::new(
            config(2),
            Arc::new(CountingRelaxer::default()),
            Arc::new(FixedMemory(u64::MAX)),
        );
        scheduler
            .run(tasks(&dir, 5), &dir.path().join("relax"), &reporter)
            .unwrap();
        drop(reporter);
        assert_eq!(increments.load(Ordering::SeqCst), 5);
    }
}

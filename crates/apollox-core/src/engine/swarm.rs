use crate::engine::config::SwarmConfig;
use rand::Rng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, instrument, trace};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SwarmError {
    #[error("Bounds need matching, non-empty lower and upper vectors ({lower} vs {upper})")]
    BoundsShape { lower: usize, upper: usize },
    #[error("Invalid bounds in dimension {dim}: [{lower}, {upper}]")]
    InvalidBounds { dim: usize, lower: f64, upper: f64 },
    #[error("Cannot derive bounds from an empty set of observations")]
    NoObservations,
    #[error("Observation has {found} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Swarm must contain at least one particle")]
    EmptySwarm,
    #[error("Objective returned {found} fitness values for {expected} particles")]
    FitnessCount { expected: usize, found: usize },
    #[error("Swarm has already terminated")]
    Terminated,
}

/// Per-dimension box constraint of the search space.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, SwarmError> {
        if lower.len() != upper.len() || lower.is_empty() {
            return Err(SwarmError::BoundsShape {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        for (dim, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(SwarmError::InvalidBounds {
                    dim,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// Scales the observed per-dimension minimum and maximum by
    /// `lower_scale` and `upper_scale`.
    ///
    /// The smaller of the two scaled minima becomes the lower bound and the
    /// larger of the two scaled maxima the upper bound, so negative
    /// observations still give an ordered box.
    pub fn from_observations(
        observations: &[Vec<f64>],
        lower_scale: f64,
        upper_scale: f64,
    ) -> Result<Self, SwarmError> {
        let dim = observations
            .first()
            .ok_or(SwarmError::NoObservations)?
            .len();
        let mut min = vec![f64::INFINITY; dim];
        let mut max = vec![f64::NEG_INFINITY; dim];
        for row in observations {
            if row.len() != dim {
                return Err(SwarmError::DimensionMismatch {
                    expected: dim,
                    found: row.len(),
                });
            }
            for (k, &v) in row.iter().enumerate() {
                min[k] = min[k].min(v);
                max[k] = max[k].max(v);
            }
        }
        let lower = min
            .iter()
            .map(|&lo| (lo * lower_scale).min(lo * upper_scale))
            .collect();
        let upper = max
            .iter()
            .map(|&hi| (hi * lower_scale).max(hi * upper_scale))
            .collect();
        Self::new(lower, upper)
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn clip(&self, point: &mut [f64]) {
        for ((x, &lo), &hi) in point.iter_mut().zip(&self.lower).zip(&self.upper) {
            *x = x.clamp(lo, hi);
        }
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(x, (lo, hi))| lo <= x && x <= hi)
    }
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmState {
    Initialized,
    Iterating,
    Terminated,
}

/// The result of a finished swarm run.
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    /// Final particle positions, rounded to integers and clipped to bounds.
    pub positions: Vec<Vec<f64>>,
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
    /// Global-best fitness of the initial population, then after each
    /// iteration.
    pub history: Vec<f64>,
}

/// One independent particle-swarm run.
///
/// All state lives in this value, so separate runs (one per generation, or
/// one per test) never share anything.
#[derive(Debug)]
pub struct ParticleSwarm {
    particles: Vec<Particle>,
    bounds: Bounds,
    inertia: f64,
    cognitive: f64,
    social: f64,
    global_best_position: Vec<f64>,
    global_best_fitness: f64,
    history: Vec<f64>,
    state: SwarmState,
    rng: StdRng,
}

impl ParticleSwarm {
    /// Draws `size` particles uniformly inside `bounds`, with velocities
    /// uniform in `[-(upper - lower), upper - lower]`, and evaluates them.
    ///
    /// The initial fitnesses seed every personal best, the global best and
    /// the first entry of [`history`](Self::history).
    pub fn new<E, F>(
        bounds: Bounds,
        size: usize,
        config: &SwarmConfig,
        mut rng: StdRng,
        objective: &mut F,
    ) -> Result<Self, E>
    where
        E: From<SwarmError>,
        F: FnMut(&[Vec<f64>]) -> Result<Vec<f64>, E>,
    {
        if size == 0 {
            return Err(SwarmError::EmptySwarm.into());
        }
        let particles: Vec<Particle> = (0..size)
            .map(|_| {
                let mut position = Vec::with_capacity(bounds.dim());
                let mut velocity = Vec::with_capacity(bounds.dim());
                for (&lo, &hi) in bounds.lower.iter().zip(&bounds.upper) {
                    let span = hi - lo;
                    position.push(rng.gen_range(lo..=hi));
                    velocity.push(rng.gen_range(-span..=span));
                }
                Particle {
                    best_position: position.clone(),
                    position,
                    velocity,
                    best_fitness: f64::INFINITY,
                }
            })
            .collect();
        let global_best_position = particles[0].position.clone();

        let mut swarm = Self {
            particles,
            bounds,
            inertia: config.inertia,
            cognitive: config.cognitive,
            social: config.social,
            global_best_position,
            global_best_fitness: f64::INFINITY,
            history: Vec::new(),
            state: SwarmState::Initialized,
            rng,
        };
        swarm.evaluate(objective)?;
        Ok(swarm)
    }

    pub fn state(&self) -> SwarmState {
        self.state
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn global_best(&self) -> (&[f64], f64) {
        (&self.global_best_position, self.global_best_fitness)
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    fn positions(&self) -> Vec<Vec<f64>> {
        self.particles.iter().map(|p| p.position.clone()).collect()
    }

    /// Scores the current positions, updates the bests and records the
    /// global best in the history.
    ///
    /// `objective` receives every current position at once and must return
    /// one fitness per particle, lower being better.
    fn evaluate<E, F>(&mut self, objective: &mut F) -> Result<(), E>
    where
        E: From<SwarmError>,
        F: FnMut(&[Vec<f64>]) -> Result<Vec<f64>, E>,
    {
        let fitness = objective(&self.positions())?;
        if fitness.len() != self.particles.len() {
            return Err(SwarmError::FitnessCount {
                expected: self.particles.len(),
                found: fitness.len(),
            }
            .into());
        }

        for (particle, &f) in self.particles.iter_mut().zip(&fitness) {
            if f < particle.best_fitness {
                particle.best_fitness = f;
                particle.best_position.clone_from(&particle.position);
            }
            if particle.best_fitness < self.global_best_fitness {
                self.global_best_fitness = particle.best_fitness;
                self.global_best_position.clone_from(&particle.best_position);
            }
        }
        self.history.push(self.global_best_fitness);
        Ok(())
    }

    /// Runs one iteration: move every particle, clip, then evaluate.
    pub fn step<E, F>(&mut self, objective: &mut F) -> Result<(), E>
    where
        E: From<SwarmError>,
        F: FnMut(&[Vec<f64>]) -> Result<Vec<f64>, E>,
    {
        if self.state == SwarmState::Terminated {
            return Err(SwarmError::Terminated.into());
        }
        self.state = SwarmState::Iterating;

        for particle in &mut self.particles {
            for k in 0..particle.position.len() {
                let r1: f64 = self.rng.gen_range(0.0..1.0);
                let r2: f64 = self.rng.gen_range(0.0..1.0);
                let x = particle.position[k];
                particle.velocity[k] = self.inertia * particle.velocity[k]
                    + self.cognitive * r1 * (particle.best_position[k] - x)
                    + self.social * r2 * (self.global_best_position[k] - x);
                particle.position[k] = x + particle.velocity[k];
            }
            self.bounds.clip(&mut particle.position);
        }
        self.evaluate(objective)?;

        trace!(
            iteration = self.history.len() - 1,
            best = self.global_best_fitness,
            "Swarm iteration complete."
        );
        Ok(())
    }

    /// Rounds every position to the nearest integer, re-clips, and ends the run.
    pub fn finish(&mut self) -> SwarmOutcome {
        self.state = SwarmState::Terminated;
        let positions = self
            .particles
            .iter()
            .map(|p| {
                let mut rounded: Vec<f64> = p.position.iter().map(|x| x.round()).collect();
                self.bounds.clip(&mut rounded);
                rounded
            })
            .collect();
        SwarmOutcome {
            positions,
            best_position: self.global_best_position.clone(),
            best_fitness: self.global_best_fitness,
            history: self.history.clone(),
        }
    }

    /// Runs `iterations` steps and finishes.
    #[instrument(skip_all, name = "particle_swarm")]
    pub fn run<E, F>(mut self, iterations: usize, mut objective: F) -> Result<SwarmOutcome, E>
    where
        E: From<SwarmError>,
        F: FnMut(&[Vec<f64>]) -> Result<Vec<f64>, E>,
    {
        for _ in 0..iterations {
            self.step(&mut objective)?;
        }
        let outcome = self.finish();
        debug!(
            iterations,
            best_fitness = outcome.best_fitness,
            "Particle swarm terminated."
        );
        Ok(outcome)
    }
}

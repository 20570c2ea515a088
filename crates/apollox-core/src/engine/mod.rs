//! # Engine Module
//!
//! The stateful machinery of a search run: configuration, the surrogate
//! energy model, the particle swarm, and the resource-gated scheduler that
//! drives the external relaxation engine.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Search, descriptor, swarm and scheduler parameters
//! - **Surrogate** ([`surrogate`]) - Linear-kernel RBF interpolant over (descriptor, energy) pairs
//! - **Swarm** ([`swarm`]) - Seeded particle-swarm minimization within observed bounds
//! - **Scaling** ([`scaler`]) - Optional z-score standardization of candidate vectors
//! - **Collaborators** ([`relax`], [`generator`], [`process`]) - Narrow interfaces to the
//!   external relaxation engine and generative model, plus process-backed implementations
//! - **Scheduling** ([`scheduler`], [`memory`]) - Bounded, memory-gated execution of relaxation tasks
//! - **Progress** ([`progress`]) and **Errors** ([`error`])

pub mod config;
pub mod error;
pub mod generator;
pub mod memory;
pub mod process;
pub mod progress;
pub mod relax;
pub mod scaler;
pub mod scheduler;
pub mod surrogate;
pub mod swarm;

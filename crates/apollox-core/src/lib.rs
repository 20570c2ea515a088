//! # ApolloX Core Library
//!
//! Surrogate-guided materials discovery over short-range-order descriptors.
//! Each generation fits an energy surrogate to evaluated structures, lets a
//! particle swarm propose descriptor vectors it expects to be low in energy,
//! and evaluates them through an external generative model and relaxation
//! engine.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`,
//!   `EvaluationTable`), structure-file and table I/O, and the SRO
//!   descriptor engine.
//!
//! - **[`engine`]: The Machinery.** Configuration, the RBF surrogate, the
//!   particle swarm, and the memory-gated scheduler that runs relaxations
//!   behind the narrow [`engine::relax::Relaxer`] and
//!   [`engine::generator::StructureGenerator`] interfaces.
//!
//! - **[`workflows`]: The Public API.** Seeding a run and orchestrating its
//!   generations.

pub mod core;
pub mod engine;
pub mod workflows;

//! # Workflows Module
//!
//! The top-level entry points of a search run. Both workflows persist their
//! state in a run directory described by [`layout::RunLayout`].
//!
//! - **Seeding** ([`seed`]) - Shuffles a template into an initial population,
//!   relaxes it, pins the descriptor schema, and writes the first batch and
//!   the reserve table.
//! - **Search** ([`search`]) - Runs generations of surrogate-guided proposal,
//!   external synthesis, relaxation, description and batch selection.

mod evaluate;
pub mod layout;
pub mod search;
pub mod seed;
#[cfg(test)]
pub(crate) mod testing;

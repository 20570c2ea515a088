//! Provides input/output for structure files and evaluation tables.
//!
//! Structure formats implement the [`traits::StructureFile`] trait, which
//! supplies path-based helpers on top of reader/writer primitives. Evaluation
//! tables are plain CSV with a fixed leading column layout.

pub mod poscar;
pub mod table;
pub mod traits;

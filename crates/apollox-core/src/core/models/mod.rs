//! # Core Models Module
//!
//! Data structures describing periodic atomic configurations and the results
//! of evaluating them.
//!
//! ## Key Components
//!
//! - [`structure`] - Lattice, composition, and Cartesian positions of one periodic cell
//! - [`element`] - Periodic-table symbol validation
//! - [`evaluation`] - Candidates, evaluation records, and the deduplicating evaluation table
//!
//! ```ignore
//! use apollox::core::models::structure::{Lattice, Species, Structure};
//!
//! let structure = Structure::from_fractional(
//!     Lattice::cubic(3.6)?,
//!     vec![Species::new("Cu", 1)],
//!     &[Vector3::zeros()],
//! )?;
//! assert_eq!(structure.formula(), "Cu1");
//! ```

pub mod element;
pub mod evaluation;
pub mod structure;

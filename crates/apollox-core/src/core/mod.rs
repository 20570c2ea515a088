//! # Core Module
//!
//! Stateless building blocks of the search: periodic structures, their
//! short-range-order descriptors, evaluation records, and the file formats
//! used to exchange them with external tools.
//!
//! ## Architecture
//!
//! - **Structure Representation** ([`models`]) - Lattices, compositions, positions, and evaluation records
//! - **Descriptors** ([`descriptor`]) - Minimum-image distances and SRO cluster counting
//! - **File I/O** ([`io`]) - VASP-style structure files and CSV evaluation tables
//!
//! Nothing in this layer holds state across calls; the search machinery that
//! does lives in [`crate::engine`].

pub mod descriptor;
pub mod io;
pub mod models;

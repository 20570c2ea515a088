//! Short-range-order (SRO) descriptors of periodic structures.
//!
//! A descriptor counts element-pair clusters whose minimum-image separation
//! lies strictly below a cutoff. Descriptors are flattened into numeric
//! vectors through a [`KeySchema`], which must stay fixed once a run has
//! established it.

pub mod batch;
pub mod distance;
pub mod schema;
pub mod sro;

pub use batch::{
    BatchDescription, BatchFailure, collect_structure_files, describe_batch, describe_structures,
};
pub use distance::{distance_matrix, min_interatomic_distance, periodic_distance};
pub use schema::{KeySchema, UnseenKeyPolicy};
pub use sro::{DescriptorError, DescriptorMode, SroDescriptor, compute_sro};

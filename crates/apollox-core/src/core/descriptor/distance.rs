use crate::core::models::structure::{Lattice, Structure};
use nalgebra::{DMatrix, Vector3};

/// Shortest distance between two Cartesian points under periodic boundary
/// conditions of `lattice`.
#[inline]
pub fn periodic_distance(lattice: &Lattice, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    lattice.minimum_image(&(b - a)).norm()
}

/// Computes the symmetric N×N matrix of minimum-image distances.
///
/// Every unordered pair is folded independently: the direct separation of two
/// atoms in a skewed or small cell can be arbitrarily larger than their true
/// nearest-image distance, so no neighbor-list shortcut is taken.
pub fn distance_matrix(structure: &Structure) -> DMatrix<f64> {
    let positions = structure.positions();
    let lattice = structure.lattice();
    let n = positions.len();

    let mut distances = DMatrix::from_fn(n, n, |i, j| (positions[j] - positions[i]).norm());
    for i in 0..n {
        for j in (i + 1)..n {
            let d = periodic_distance(lattice, &positions[i], &positions[j]);
            distances[(i, j)] = d;
            distances[(j, i)] = d;
        }
    }
    distances
}

/// The smallest minimum-image distance between any two distinct atoms, or
/// `None` for single-atom structures.
pub fn min_interatomic_distance(structure: &Structure) -> Option<f64> {
    let positions = structure.positions();
    let lattice = structure.lattice();
    let mut min: Option<f64> = None;
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let d = periodic_distance(lattice, &positions[i], &positions[j]);
            min = Some(min.map_or(d, |m| m.min(d)));
        }
    }
    min
}

use super::element::is_element_symbol;
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

const SINGULAR_DETERMINANT_EPSILON: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("Lattice vectors are linearly dependent (determinant {determinant:e})")]
    SingularLattice { determinant: f64 },
    #[error("Composition declares {declared} atoms but {found} positions were given")]
    CountMismatch { declared: usize, found: usize },
    #[error("Unknown element symbol '{0}'")]
    UnknownElement(String),
    #[error("Composition must contain at least one species with a non-zero count")]
    EmptyComposition,
    #[error("Scale factor must be finite and non-zero, got {0}")]
    InvalidScale(f64),
}

/// A periodic cell spanned by three lattice vectors.
///
/// The vectors are stored as the columns of `matrix`, so that a fractional
/// coordinate `f` maps to the Cartesian point `matrix * f`. The inverse is
/// computed once at construction and reused for every fractional conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Lattice {
    /// Builds a lattice from its three Cartesian basis vectors.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::SingularLattice`] if the vectors do not span
    /// a three-dimensional cell.
    pub fn from_vectors(
        a: Vector3<f64>,
        b: Vector3<f64>,
        c: Vector3<f64>,
    ) -> Result<Self, StructureError> {
        let matrix = Matrix3::from_columns(&[a, b, c]);
        let determinant = matrix.determinant();
        if !determinant.is_finite() || determinant.abs() < SINGULAR_DETERMINANT_EPSILON {
            return Err(StructureError::SingularLattice { determinant });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(StructureError::SingularLattice { determinant })?;
        Ok(Self { matrix, inverse })
    }

    /// Builds a lattice from row-major vectors, as they appear in structure files.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self, StructureError> {
        Self::from_vectors(
            Vector3::from(rows[0]),
            Vector3::from(rows[1]),
            Vector3::from(rows[2]),
        )
    }

    pub fn cubic(side: f64) -> Result<Self, StructureError> {
        Self::from_vectors(
            Vector3::new(side, 0.0, 0.0),
            Vector3::new(0.0, side, 0.0),
            Vector3::new(0.0, 0.0, side),
        )
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn vectors(&self) -> [Vector3<f64>; 3] {
        [
            self.matrix.column(0).into_owned(),
            self.matrix.column(1).into_owned(),
            self.matrix.column(2).into_owned(),
        ]
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Returns a copy of the lattice with every vector multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<Self, StructureError> {
        if !factor.is_finite() || factor == 0.0 {
            return Err(StructureError::InvalidScale(factor));
        }
        let [a, b, c] = self.vectors();
        Self::from_vectors(a * factor, b * factor, c * factor)
    }

    #[inline]
    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * fractional
    }

    #[inline]
    pub fn to_fractional(&self, cartesian: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * cartesian
    }

    /// Folds a Cartesian separation vector into its minimum-image equivalent.
    ///
    /// The vector is expressed in fractional coordinates, each component is
    /// shifted by its nearest integer, and the result is mapped back to
    /// Cartesian space.
    #[inline]
    pub fn minimum_image(&self, separation: &Vector3<f64>) -> Vector3<f64> {
        let fractional = self.to_fractional(separation);
        let folded = fractional - fractional.map(f64::round);
        self.to_cartesian(&folded)
    }
}

/// One entry of a composition: an element symbol and how many atoms of it
/// appear, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Species {
    pub symbol: String,
    pub count: usize,
}

impl Species {
    pub fn new(symbol: impl Into<String>, count: usize) -> Self {
        Self {
            symbol: symbol.into(),
            count,
        }
    }
}

/// A periodic atomic configuration.
///
/// Atoms are grouped by species in composition order: the first
/// `species[0].count` positions belong to `species[0].symbol`, and so on.
/// Positions are always held in Cartesian form.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    lattice: Lattice,
    species: Vec<Species>,
    positions: Vec<Vector3<f64>>,
}

impl Structure {
    /// Creates a structure from Cartesian positions.
    ///
    /// # Errors
    ///
    /// Fails if an element symbol is unknown, if the composition is empty, or
    /// if the number of positions differs from the sum of the species counts.
    pub fn new(
        lattice: Lattice,
        species: Vec<Species>,
        positions: Vec<Vector3<f64>>,
    ) -> Result<Self, StructureError> {
        if let Some(unknown) = species.iter().find(|s| !is_element_symbol(&s.symbol)) {
            return Err(StructureError::UnknownElement(unknown.symbol.clone()));
        }
        let declared: usize = species.iter().map(|s| s.count).sum();
        if declared == 0 {
            return Err(StructureError::EmptyComposition);
        }
        if declared != positions.len() {
            return Err(StructureError::CountMismatch {
                declared,
                found: positions.len(),
            });
        }
        Ok(Self {
            lattice,
            species,
            positions,
        })
    }

    /// Creates a structure from fractional coordinates of the given lattice.
    pub fn from_fractional(
        lattice: Lattice,
        species: Vec<Species>,
        fractional: &[Vector3<f64>],
    ) -> Result<Self, StructureError> {
        let positions = fractional
            .iter()
            .map(|f| lattice.to_cartesian(f))
            .collect();
        Self::new(lattice, species, positions)
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn fractional_positions(&self) -> Vec<Vector3<f64>> {
        self.positions
            .iter()
            .map(|p| self.lattice.to_fractional(p))
            .collect()
    }

    /// Expands the composition into one element symbol per atom.
    pub fn atom_symbols(&self) -> Vec<&str> {
        self.species
            .iter()
            .flat_map(|s| std::iter::repeat_n(s.symbol.as_str(), s.count))
            .collect()
    }

    /// The composition formula in file order, e.g. `Co12Fe12`.
    pub fn formula(&self) -> String {
        self.species
            .iter()
            .map(|s| format!("{}{}", s.symbol, s.count))
            .collect()
    }

    /// Returns a copy whose positions are randomly permuted among the atoms.
    ///
    /// The lattice and the species block order are untouched, so the result
    /// has the same composition with a different chemical arrangement.
    pub fn shuffled(&self, rng: &mut impl Rng) -> Self {
        let mut positions = self.positions.clone();
        positions.shuffle(rng);
        Self {
            lattice: self.lattice.clone(),
            species: self.species.clone(),
            positions,
        }
    }
}

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurrogateError {
    #[error("Surrogate needs at least {required} distinct training points, got {found}")]
    InsufficientPoints { required: usize, found: usize },
    #[error("Expected descriptor dimension {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("{descriptors} descriptors but {energies} energies")]
    LengthMismatch { descriptors: usize, energies: usize },
    #[error("Training data contains a non-finite value")]
    NonFinite,
    #[error("Interpolation system is singular (training points are degenerate)")]
    Singular,
}

/// Low-order polynomial appended to the radial-basis expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolynomialTail {
    /// A single constant term.
    #[default]
    Constant,
    /// Constant plus one linear term per dimension. Fails on descriptors
    /// that lie in a common hyperplane, such as bond counts with a fixed
    /// total.
    Affine,
}

impl PolynomialTail {
    /// Number of polynomial terms.
    pub fn terms(self, dim: usize) -> usize {
        match self {
            PolynomialTail::Constant => 1,
            PolynomialTail::Affine => dim + 1,
        }
    }

    fn basis(self, x: &[f64]) -> impl Iterator<Item = f64> + '_ {
        let linear: &[f64] = match self {
            PolynomialTail::Constant => &[],
            PolynomialTail::Affine => x,
        };
        std::iter::once(1.0).chain(linear.iter().copied())
    }
}

#[inline]
fn kernel(r: f64) -> f64 {
    -r
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Collapses identical rows into one point carrying their mean energy.
fn collapse_duplicates(x: &[Vec<f64>], y: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut points: Vec<Vec<f64>> = Vec::new();
    let mut sums: Vec<(f64, usize)> = Vec::new();
    for (row, &energy) in x.iter().zip(y) {
        match points.iter().position(|p| p == row) {
            Some(idx) => {
                sums[idx].0 += energy;
                sums[idx].1 += 1;
            }
            None => {
                points.push(row.clone());
                sums.push((energy, 1));
            }
        }
    }
    let energies = sums.into_iter().map(|(s, n)| s / n as f64).collect();
    (points, energies)
}

/// Radial-basis interpolant with the linear kernel `phi(r) = -r`.
///
/// Passes exactly through every distinct training point. Nothing is
/// guaranteed outside the convex hull of the training descriptors.
#[derive(Debug, Clone)]
pub struct RbfSurrogate {
    centers: Vec<Vec<f64>>,
    weights: DVector<f64>,
    coefficients: DVector<f64>,
    tail: PolynomialTail,
    dim: usize,
}

impl RbfSurrogate {
    #[instrument(skip_all, name = "surrogate_fit")]
    pub fn fit(
        descriptors: &[Vec<f64>],
        energies: &[f64],
        tail: PolynomialTail,
    ) -> Result<Self, SurrogateError> {
        if descriptors.len() != energies.len() {
            return Err(SurrogateError::LengthMismatch {
                descriptors: descriptors.len(),
                energies: energies.len(),
            });
        }
        let dim = descriptors.first().map_or(0, Vec::len);
        if let Some(bad) = descriptors.iter().find(|d| d.len() != dim) {
            return Err(SurrogateError::DimensionMismatch {
                expected: dim,
                found: bad.len(),
            });
        }
        if descriptors.iter().flatten().chain(energies).any(|v| !v.is_finite()) {
            return Err(SurrogateError::NonFinite);
        }

        let (centers, values) = collapse_duplicates(descriptors, energies);
        let n = centers.len();
        if n < dim + 1 {
            return Err(SurrogateError::InsufficientPoints {
                required: dim + 1,
                found: n,
            });
        }
        let m = tail.terms(dim);

        // The radial block is conditionally definite, so the system is
        // solvable exactly when the polynomial block has full column rank.
        let tail_block = DMatrix::from_fn(n, m, |i, k| {
            tail.basis(&centers[i]).nth(k).unwrap_or(0.0)
        });
        let scale = tail_block.amax().max(1.0);
        if tail_block.rank(1e-9 * scale) < m {
            return Err(SurrogateError::Singular);
        }

        let mut system = DMatrix::<f64>::zeros(n + m, n + m);
        for i in 0..n {
            for j in (i + 1)..n {
                let phi = kernel(euclidean(&centers[i], &centers[j]));
                system[(i, j)] = phi;
                system[(j, i)] = phi;
            }
            for k in 0..m {
                system[(i, n + k)] = tail_block[(i, k)];
                system[(n + k, i)] = tail_block[(i, k)];
            }
        }
        let mut rhs = DVector::<f64>::zeros(n + m);
        rhs.rows_mut(0, n).copy_from_slice(&values);

        let solution = system.lu().solve(&rhs).ok_or(SurrogateError::Singular)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(SurrogateError::Singular);
        }

        debug!(points = n, dim, ?tail, "Fitted RBF surrogate.");
        Ok(Self {
            centers,
            weights: solution.rows(0, n).into_owned(),
            coefficients: solution.rows(n, m).into_owned(),
            tail,
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_centers(&self) -> usize {
        self.centers.len()
    }

    /// Predicts the energy of every row of `points`.
    ///
    /// A single vector is predicted by passing a one-row batch.
    pub fn predict(&self, points: &[Vec<f64>]) -> Result<Vec<f64>, SurrogateError> {
        points.iter().map(|p| self.predict_one(p)).collect()
    }

    pub fn predict_one(&self, point: &[f64]) -> Result<f64, SurrogateError> {
        if point.len() != self.dim {
            return Err(SurrogateError::DimensionMismatch {
                expected: self.dim,
                found: point.len(),
            });
        }
        let radial: f64 = self
            .centers
            .iter()
            .zip(self.weights.iter())
            .map(|(c, w)| w * kernel(euclidean(point, c)))
            .sum();
        let polynomial: f64 = self
            .tail
            .basis(point)
            .zip(self.coefficients.iter())
            .map(|(p, c)| p * c)
            .sum();
        Ok(radial + polynomial)
    }
}

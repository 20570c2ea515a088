use super::distance::distance_matrix;
use crate::core::models::structure::Structure;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Short-range-order counts keyed by the alphabetically sorted, concatenated
/// element symbols of each cluster (e.g. `"CoFe"` for a Co–Fe pair).
pub type SroDescriptor = BTreeMap<String, u32>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("Cutoff must be positive and finite, got {0}")]
    InvalidCutoff(f64),
    #[error("At least one descriptor mode must be enabled")]
    NoModes,
    #[error("Descriptor key '{key}' is not part of the pinned schema")]
    UnseenKey { key: String },
    #[error("Vector has {found} columns but the schema has {expected}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Cluster orders that can contribute to a descriptor.
///
/// Triples and quadruples count atom sets whose members are all pairwise
/// within the cutoff. They are never enabled unless requested explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorMode {
    Pair,
    Triple,
    Quadruple,
}

impl DescriptorMode {
    pub fn default_modes() -> Vec<DescriptorMode> {
        vec![DescriptorMode::Pair]
    }
}

impl std::str::FromStr for DescriptorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pair" => Ok(Self::Pair),
            "triple" => Ok(Self::Triple),
            "quadruple" => Ok(Self::Quadruple),
            other => Err(format!(
                "unknown descriptor mode '{other}' (expected pair, triple or quadruple)"
            )),
        }
    }
}

fn cluster_key(symbols: &[&str]) -> String {
    symbols.iter().sorted().join("")
}

/// Computes the SRO descriptor of `structure` for every enabled mode.
///
/// A pair `(i, j)` with `i < j` contributes when its minimum-image distance is
/// strictly below `cutoff`. The engine does not reject physically invalid
/// structures; that decision belongs to the relaxation stage.
pub fn compute_sro(
    structure: &Structure,
    cutoff: f64,
    modes: &[DescriptorMode],
) -> Result<SroDescriptor, DescriptorError> {
    if !cutoff.is_finite() || cutoff <= 0.0 {
        return Err(DescriptorError::InvalidCutoff(cutoff));
    }
    if modes.is_empty() {
        return Err(DescriptorError::NoModes);
    }

    let symbols = structure.atom_symbols();
    let distances = distance_matrix(structure);
    let n = symbols.len();
    let within = |a: usize, b: usize| distances[(a, b)] < cutoff;

    let pairs = modes.contains(&DescriptorMode::Pair);
    let triples = modes.contains(&DescriptorMode::Triple);
    let quadruples = modes.contains(&DescriptorMode::Quadruple);

    let mut descriptor = SroDescriptor::new();
    for i in 0..n {
        let forward: Vec<usize> = ((i + 1)..n).filter(|&j| within(i, j)).collect();

        if pairs {
            for &j in &forward {
                *descriptor
                    .entry(cluster_key(&[symbols[i], symbols[j]]))
                    .or_insert(0) += 1;
            }
        }
        if triples {
            for (j, k) in forward.iter().copied().tuple_combinations() {
                if within(j, k) {
                    *descriptor
                        .entry(cluster_key(&[symbols[i], symbols[j], symbols[k]]))
                        .or_insert(0) += 1;
                }
            }
        }
        if quadruples {
            for (j, k, l) in forward.iter().copied().tuple_combinations() {
                if within(j, k) && within(j, l) && within(k, l) {
                    *descriptor
                        .entry(cluster_key(&[symbols[i], symbols[j], symbols[k], symbols[l]]))
                        .or_insert(0) += 1;
                }
            }
        }
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::{Lattice, Species};
    use nalgebra::Vector3;

    fn chain_structure() -> Structure {
        // Fe - Co - Fe along x, 1.0 apart, in a cell large enough to avoid images.
        Structure::new(
            Lattice::cubic(16.0).unwrap(),
            vec![Species::new("Fe", 2), Species::new("Co", 1)],
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn pair_keys_are_sorted_symbol_concatenations() {
        let descriptor = compute_sro(&chain_structure(), 1.5, &[DescriptorMode::Pair]).unwrap();
        assert_eq!(descriptor.get("CoFe"), Some(&2));
        assert_eq!(descriptor.get("FeFe"), None);
        assert_eq!(descriptor.len(), 1);
    }

    #[test]
    fn cutoff_is_strict() {
        let descriptor = compute_sro(&chain_structure(), 2.0, &[DescriptorMode::Pair]).unwrap();
        assert_eq!(descriptor.get("FeFe"), None);

        let descriptor = compute_sro(&chain_structure(), 2.0001, &[DescriptorMode::Pair]).unwrap();
        assert_eq!(descriptor.get("FeFe"), Some(&1));
    }

    #[test]
    fn periodic_neighbors_are_counted_through_the_boundary() {
        let structure = Structure::from_fractional(
            Lattice::cubic(10.0).unwrap(),
            vec![Species::new("Fe", 1), Species::new("Co", 1)],
            &[Vector3::new(0.05, 0.0, 0.0), Vector3::new(0.95, 0.0, 0.0)],
        )
        .unwrap();
        let descriptor = compute_sro(&structure, 1.5, &[DescriptorMode::Pair]).unwrap();
        assert_eq!(descriptor.get("CoFe"), Some(&1));
    }

    #[test]
    fn repeated_computation_is_deterministic() {
        let structure = chain_structure();
        let first = compute_sro(&structure, 5.0, &DescriptorMode::default_modes()).unwrap();
        for _ in 0..5 {
            let again = compute_sro(&structure, 5.0, &DescriptorMode::default_modes()).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn higher_order_clusters_require_all_pairs_within_cutoff() {
        let structure = chain_structure();

        let only_pairs = compute_sro(&structure, 1.5, &[DescriptorMode::Triple]).unwrap();
        assert!(only_pairs.is_empty());

        let all = compute_sro(
            &structure,
            2.5,
            &[DescriptorMode::Pair, DescriptorMode::Triple, DescriptorMode::Quadruple],
        )
        .unwrap();
        assert_eq!(all.get("CoFeFe"), Some(&1));
        assert_eq!(all.get("CoFe"), Some(&2));
        assert_eq!(all.get("FeFe"), Some(&1));
        assert!(all.keys().all(|k| k.len() <= 6));
    }

    #[test]
    fn invalid_cutoff_and_empty_modes_are_rejected() {
        let structure = chain_structure();
        assert_eq!(
            compute_sro(&structure, 0.0, &[DescriptorMode::Pair]),
            Err(DescriptorError::InvalidCutoff(0.0))
        );
        assert_eq!(compute_sro(&structure, 1.0, &[]), Err(DescriptorError::NoModes));
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("Pair".parse::<DescriptorMode>(), Ok(DescriptorMode::Pair));
        assert_eq!("TRIPLE".parse::<DescriptorMode>(), Ok(DescriptorMode::Triple));
        assert!("octet".parse::<DescriptorMode>().is_err());
    }
}
